//! 주문 엔진.
//!
//! 상태 전이: `New → InProgress → {Completed, Failed}`.
//!
//! - 스캔: 활성 페어마다 전체 잔고로 시장가 주문을 제출합니다.
//! - 폴링: 진행 중인 주문의 거래소 상태를 반영합니다.
//!
//! 사용자 단위로 병렬 처리하고, 한 사용자의 페어는 순서대로 처리합니다.

use settle_core::{engine_span, OrderRecord, OrderStatus, TradingPairConfig};
use settle_exchange::{ExchangeClient, OrderQuery};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, warn, Instrument};
use uuid::Uuid;

use crate::error::EngineResult;
use crate::manager::ExchangeManager;
use crate::repository::{suspend_transfers, Repository};
use crate::rule_cache::RuleCache;
use crate::runtime::fan_out_users;
use crate::stats::{CycleStats, Outcome};

/// 주문 엔진.
pub struct OrderEngine {
    repository: Arc<dyn Repository>,
    manager: Arc<ExchangeManager>,
    rules: Arc<RuleCache>,
    max_concurrent_users: usize,
}

impl OrderEngine {
    pub fn new(
        repository: Arc<dyn Repository>,
        manager: Arc<ExchangeManager>,
        rules: Arc<RuleCache>,
        max_concurrent_users: usize,
    ) -> Self {
        Self {
            repository,
            manager,
            rules,
            max_concurrent_users: max_concurrent_users.max(1),
        }
    }

    // ==================== 스캔 ====================

    /// 활성 페어 전체에 대해 주문을 한 번 시도합니다.
    pub async fn run_scan(&self) -> CycleStats {
        let started = Instant::now();
        let pairs = match self.repository.trading_pairs().await {
            Ok(pairs) => pairs,
            Err(e) => {
                error!(error = %e, "거래 페어 조회 실패");
                return CycleStats::new();
            }
        };

        let mut by_user: BTreeMap<Uuid, Vec<TradingPairConfig>> = BTreeMap::new();
        for pair in pairs {
            by_user.entry(pair.user_id).or_default().push(pair);
        }

        let mut stats = fan_out_users(by_user, self.max_concurrent_users, |pairs| {
            self.scan_user(pairs)
        })
        .await;
        stats.elapsed = started.elapsed();
        stats
    }

    async fn scan_user(&self, pairs: Vec<TradingPairConfig>) -> CycleStats {
        let mut stats = CycleStats::new();
        for pair in pairs {
            let span = engine_span!("order_scan", pair.user_id, pair.exchange);
            let outcome = match self.process_pair(&pair).instrument(span).await {
                Ok(outcome) => outcome,
                Err(e) => {
                    warn!(symbol = %pair.symbol, error = %e, "주문 처리 중단");
                    Outcome::from(&e)
                }
            };
            stats.record(outcome);
        }
        stats
    }

    async fn process_pair(&self, pair: &TradingPairConfig) -> EngineResult<Outcome> {
        if let Some(setting) = self
            .repository
            .transfer_setting(pair.user_id, &pair.exchange)
            .await?
        {
            if !setting.enabled {
                debug!(symbol = %pair.symbol, "송금 중지 상태, 건너뜀");
                return Ok(Outcome::Skipped);
            }
        }

        let client = self.manager.client_for(&pair.exchange, pair.user_id).await?;
        let rule = self.rules.order_rule(&pair.exchange, &pair.symbol, None).await?;

        let mut tx = self.repository.begin().await?;
        let mut record = OrderRecord::new(
            pair,
            client.connection_hash().map(|h| h.as_str().to_string()),
        );

        match client.create_spot_order(pair.side, &pair.symbol, &rule).await {
            Ok(result) => {
                record.mark_in_progress(
                    result.exchange_order_id,
                    result.client_order_id,
                    result.amount,
                )?;
                tx.save_order(&record).await?;
                tx.commit().await?;
                info!(
                    symbol = %pair.symbol,
                    side = %pair.side,
                    amount = %record.amount,
                    order_id = ?record.exchange_order_id,
                    "주문 접수"
                );
                Ok(Outcome::Success)
            }
            Err(e) if e.is_cycle_local() => {
                debug!(symbol = %pair.symbol, kind = e.kind().as_str(), error = %e, "이번 주기 건너뜀");
                Ok(Outcome::Skipped)
            }
            Err(e) => {
                record.mark_failed(e.to_string())?;
                tx.save_order(&record).await?;
                let suspended = suspend_transfers(tx.as_mut(), pair.user_id, &pair.exchange).await?;
                tx.commit().await?;
                error!(
                    symbol = %pair.symbol,
                    kind = e.kind().as_str(),
                    error = %e,
                    suspended,
                    "주문 실패"
                );
                Ok(Outcome::Failed)
            }
        }
    }

    // ==================== 상태 폴링 ====================

    /// 진행 중인 주문의 거래소 상태를 반영합니다.
    pub async fn run_status_poll(&self) -> CycleStats {
        let started = Instant::now();
        let orders = match self.repository.orders_in_progress().await {
            Ok(orders) => orders,
            Err(e) => {
                error!(error = %e, "진행 중인 주문 조회 실패");
                return CycleStats::new();
            }
        };

        let mut by_user: BTreeMap<Uuid, Vec<OrderRecord>> = BTreeMap::new();
        for order in orders {
            by_user.entry(order.user_id).or_default().push(order);
        }

        let mut stats = fan_out_users(by_user, self.max_concurrent_users, |orders| {
            self.poll_user(orders)
        })
        .await;
        stats.elapsed = started.elapsed();
        stats
    }

    async fn poll_user(&self, orders: Vec<OrderRecord>) -> CycleStats {
        let mut stats = CycleStats::new();
        let mut clients: BTreeMap<String, Arc<dyn ExchangeClient>> = BTreeMap::new();
        for order in orders {
            let span = engine_span!("order_poll", order.user_id, order.exchange, order.id);
            let outcome = async {
                let client = match clients.get(&order.exchange) {
                    Some(client) => client.clone(),
                    None => {
                        let client = self.manager.client_for(&order.exchange, order.user_id).await?;
                        clients.insert(order.exchange.clone(), client.clone());
                        client
                    }
                };
                self.poll_order(client.as_ref(), &order).await
            }
            .instrument(span)
            .await;

            stats.record(match outcome {
                Ok(outcome) => outcome,
                Err(e) => {
                    warn!(order_id = %order.id, error = %e, "주문 상태 조회 실패");
                    Outcome::Skipped
                }
            });
        }
        stats
    }

    async fn poll_order(
        &self,
        client: &dyn ExchangeClient,
        order: &OrderRecord,
    ) -> EngineResult<Outcome> {
        let Some(exchange_order_id) = order.exchange_order_id.clone() else {
            return Ok(Outcome::Skipped);
        };
        let details = client
            .get_order_details(&OrderQuery {
                symbol: order.symbol.clone(),
                side: order.side,
                base_currency: order.base_currency.clone(),
                quote_currency: order.quote_currency.clone(),
                exchange_order_id,
                client_order_id: order.client_order_id.clone(),
            })
            .await?;

        let mut tx = self.repository.begin().await?;
        let Some(mut record) = tx.order(order.id).await? else {
            return Ok(Outcome::Skipped);
        };
        if record.status != OrderStatus::InProgress {
            return Ok(Outcome::Skipped);
        }

        match details.status {
            OrderStatus::Completed => {
                record.mark_completed(Some(details.amount_in_quote), details.fiat_amount)?;
                info!(
                    symbol = %record.symbol,
                    filled = %details.filled_amount,
                    amount_in_quote = %details.amount_in_quote,
                    "주문 체결 완료"
                );
            }
            OrderStatus::Failed => {
                let reason = details
                    .reason
                    .unwrap_or_else(|| "거래소에서 주문 실패".to_string());
                record.mark_failed(reason)?;
                warn!(symbol = %record.symbol, reason = ?record.fail_reason, "주문 실패 확인");
            }
            OrderStatus::New | OrderStatus::InProgress => return Ok(Outcome::Skipped),
        }

        tx.save_order(&record).await?;
        tx.commit().await?;
        Ok(Outcome::Success)
    }
}
