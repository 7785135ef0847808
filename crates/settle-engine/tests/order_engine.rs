//! 주문 엔진 시나리오 테스트.

mod common;

use common::{sell_pair, Harness, SLUG};
use rust_decimal_macros::dec;
use settle_core::{OrderStatus, TransferSetting};
use settle_engine::Repository;
use settle_exchange::ExchangeError;

#[tokio::test]
async fn test_scan_submits_and_poll_completes() {
    let h = Harness::new().await;
    let user = h.connected_user().await;
    h.repo.add_trading_pair(sell_pair(user)).await;
    h.set_balance("BTC", dec!(0.07));

    let stats = h.engines.orders.run_scan().await;
    assert_eq!(stats.success, 1);

    let orders = h.repo.orders().await;
    assert_eq!(orders.len(), 1);
    assert_eq!(orders[0].status, OrderStatus::InProgress);
    assert_eq!(orders[0].amount, dec!(0.07));
    assert_eq!(orders[0].exchange_order_id.as_deref(), Some("order-1"));
    assert!(orders[0].connection_hash.is_some());

    // 거래소가 아직 처리 중이면 변경 없음
    let stats = h.engines.orders.run_status_poll().await;
    assert_eq!(stats.skipped, 1);
    assert_eq!(h.repo.orders().await[0].status, OrderStatus::InProgress);

    h.script().order_status = OrderStatus::Completed;
    let stats = h.engines.orders.run_status_poll().await;
    assert_eq!(stats.success, 1);

    let order = &h.repo.orders().await[0];
    assert_eq!(order.status, OrderStatus::Completed);
    assert_eq!(order.amount_in_quote, Some(dec!(4200)));
    assert_eq!(order.fiat_amount, Some(dec!(4200)));
    assert!(h.repo.orders_in_progress().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_poll_marks_exchange_failure() {
    let h = Harness::new().await;
    let user = h.connected_user().await;
    h.repo.add_trading_pair(sell_pair(user)).await;
    h.set_balance("BTC", dec!(1));

    h.engines.orders.run_scan().await;
    h.script().order_status = OrderStatus::Failed;
    h.engines.orders.run_status_poll().await;

    let order = &h.repo.orders().await[0];
    assert_eq!(order.status, OrderStatus::Failed);
    assert_eq!(order.fail_reason.as_deref(), Some("rejected"));
}

#[tokio::test]
async fn test_business_errors_only_skip_cycle() {
    let h = Harness::new().await;
    let user = h.connected_user().await;
    h.repo.add_trading_pair(sell_pair(user)).await;

    for error in [
        (|| ExchangeError::InsufficientBalance("잔고 부족".to_string())) as fn() -> ExchangeError,
        || ExchangeError::SymbolTradingHalted("거래 중지".to_string()),
        || ExchangeError::Network("connection reset".to_string()),
        || ExchangeError::RateLimited("429".to_string()),
        || ExchangeError::SkipCycle("잔고 없음".to_string()),
    ] {
        h.script().order_error = Some(error);
        let stats = h.engines.orders.run_scan().await;
        assert_eq!(stats.skipped, 1);
        assert_eq!(stats.failed, 0);
    }

    assert!(h.repo.orders().await.is_empty());
    assert!(h.repo.transfer_setting(user, SLUG).await.unwrap().is_none());
}

#[tokio::test]
async fn test_unexpected_error_fails_record_and_suspends() {
    let h = Harness::new().await;
    let user = h.connected_user().await;
    h.repo.add_trading_pair(sell_pair(user)).await;
    h.script().order_error = Some(|| ExchangeError::Exchange {
        code: "-1111".to_string(),
        message: "Precision is over the maximum defined for this asset.".to_string(),
    });

    let stats = h.engines.orders.run_scan().await;
    assert_eq!(stats.failed, 1);

    let orders = h.repo.orders().await;
    assert_eq!(orders.len(), 1);
    assert_eq!(orders[0].status, OrderStatus::Failed);
    assert!(orders[0].fail_reason.as_deref().unwrap().contains("Precision is over"));

    let setting = h.repo.transfer_setting(user, SLUG).await.unwrap().unwrap();
    assert!(!setting.enabled);
    assert!(setting.suspended_by_system);

    // 중지된 동안에는 주문을 시도하지 않음
    h.script().order_error = None;
    let stats = h.engines.orders.run_scan().await;
    assert_eq!(stats.skipped, 1);
    assert!(h.script().orders.is_empty());
}

#[tokio::test]
async fn test_user_disabled_transfers_are_skipped() {
    let h = Harness::new().await;
    let user = h.connected_user().await;
    h.repo.add_trading_pair(sell_pair(user)).await;
    h.set_balance("BTC", dec!(1));
    let mut setting = TransferSetting::enabled(user, SLUG);
    setting.enabled = false;
    h.repo.put_transfer_setting(setting).await;

    let stats = h.engines.orders.run_scan().await;
    assert_eq!(stats.skipped, 1);
    assert!(h.repo.orders().await.is_empty());
}

#[tokio::test]
async fn test_one_user_failure_does_not_stop_others() {
    let h = Harness::new().await;
    let connected = h.connected_user().await;
    let missing_credential = uuid::Uuid::new_v4();
    h.repo.add_trading_pair(sell_pair(connected)).await;
    h.repo.add_trading_pair(sell_pair(missing_credential)).await;
    h.set_balance("BTC", dec!(0.5));

    let stats = h.engines.orders.run_scan().await;
    assert_eq!(stats.total, 2);
    assert_eq!(stats.success, 1);
    assert_eq!(stats.failed, 1);

    let orders = h.repo.orders().await;
    assert_eq!(orders.len(), 1);
    assert_eq!(orders[0].user_id, connected);
}

#[tokio::test]
async fn test_order_rule_is_cached_across_scans() {
    let h = Harness::new().await;
    let user = h.connected_user().await;
    h.repo.add_trading_pair(sell_pair(user)).await;
    h.set_balance("BTC", dec!(0.5));

    h.engines.orders.run_scan().await;
    h.engines.orders.run_scan().await;

    assert_eq!(h.script().orders.len(), 2);
    assert_eq!(h.script().order_rule_calls, 1);
}
