//! 주기 루프 통합 테스트.

mod common;

use common::{sell_pair, usdt_setting, Harness};
use rust_decimal_macros::dec;
use settle_core::{AppConfig, OrderStatus, WithdrawalStatus};
use settle_engine::EngineRuntime;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

#[tokio::test(start_paused = true)]
async fn test_runtime_drives_both_engines() {
    let config = AppConfig::default();
    let engine_config = config.engine.clone();
    let h = Harness::with_config(config).await;
    let user = h.connected_user().await;
    h.repo.add_trading_pair(sell_pair(user)).await;
    h.repo.add_withdrawal_setting(usdt_setting(user, dec!(10))).await;
    h.set_balance("BTC", dec!(0.07));
    h.set_balance("USDT", dec!(100));
    h.script().order_status = OrderStatus::Completed;
    h.script().withdrawal_status = WithdrawalStatus::Completed;

    let runtime = EngineRuntime::start(&h.engines, &engine_config, CancellationToken::new());
    // 폴링 주기(20초, 30초)가 한 번 이상 지나도록 진행
    tokio::time::sleep(Duration::from_secs(45)).await;
    runtime.shutdown().await;

    let orders = h.repo.orders().await;
    assert!(!orders.is_empty());
    assert_eq!(orders[0].status, OrderStatus::Completed);

    let withdrawals = h.repo.withdrawals().await;
    assert_eq!(withdrawals.len(), 1);
    assert_eq!(withdrawals[0].status, WithdrawalStatus::Completed);
}

#[tokio::test(start_paused = true)]
async fn test_cancel_token_stops_loops() {
    let config = AppConfig::default();
    let engine_config = config.engine.clone();
    let h = Harness::with_config(config).await;
    let user = h.connected_user().await;
    h.repo.add_trading_pair(sell_pair(user)).await;
    h.set_balance("BTC", dec!(0.07));

    let cancel = CancellationToken::new();
    let runtime = EngineRuntime::start(&h.engines, &engine_config, cancel.clone());
    tokio::time::sleep(Duration::from_secs(1)).await;
    cancel.cancel();
    let submitted = h.script().orders.len();

    tokio::time::sleep(Duration::from_secs(120)).await;
    assert_eq!(h.script().orders.len(), submitted);
    runtime.shutdown().await;
}
