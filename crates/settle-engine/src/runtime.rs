//! 백그라운드 루프 실행기.
//!
//! 주문 스캔, 주문 상태 폴링, 출금 스캔, 출금 상태 폴링, 규칙 갱신을
//! 각각 독립된 주기 태스크로 실행하고 취소 토큰으로 함께 종료합니다.

use futures::stream::{self, StreamExt};
use settle_core::{AppConfig, CredentialEncryptor, CurrencyConverter, EngineConfig};
use std::collections::BTreeMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::info;
use uuid::Uuid;

use crate::manager::{ExchangeManager, ExchangeRegistry};
use crate::order_engine::OrderEngine;
use crate::repository::Repository;
use crate::rule_cache::RuleCache;
use crate::stats::CycleStats;
use crate::withdrawal_engine::WithdrawalEngine;

/// 이보다 오래 쓰이지 않은 요청 한도 버킷은 규칙 갱신 주기에 정리합니다.
const RATE_LIMIT_IDLE: Duration = Duration::from_secs(10 * 60);

/// 사용자별 작업을 최대 `limit`개씩 동시에 실행하고 통계를 합칩니다.
///
/// 각 사용자 작업은 자기 에러를 스스로 기록하므로 한 사용자의 실패가
/// 다른 사용자의 처리를 중단시키지 않습니다.
pub(crate) async fn fan_out_users<T, F, Fut>(
    by_user: BTreeMap<Uuid, Vec<T>>,
    limit: usize,
    work: F,
) -> CycleStats
where
    F: Fn(Vec<T>) -> Fut,
    Fut: Future<Output = CycleStats>,
{
    let results: Vec<CycleStats> = stream::iter(by_user.into_values().map(work))
        .buffer_unordered(limit.max(1))
        .collect()
        .await;

    let mut stats = CycleStats::new();
    for user_stats in &results {
        stats.merge(user_stats);
    }
    stats
}

/// 엔진 구성 요소 묶음.
pub struct Engines {
    pub manager: Arc<ExchangeManager>,
    pub rules: Arc<RuleCache>,
    pub orders: Arc<OrderEngine>,
    pub withdrawals: Arc<WithdrawalEngine>,
}

impl Engines {
    /// 설정과 외부 협력자(저장소, 환산기)로 엔진을 조립합니다.
    pub fn new(
        config: Arc<AppConfig>,
        registry: ExchangeRegistry,
        repository: Arc<dyn Repository>,
        encryptor: Arc<CredentialEncryptor>,
        converter: Arc<dyn CurrencyConverter>,
        cancel: CancellationToken,
    ) -> Self {
        let max_users = config.engine.max_concurrent_users;
        let rule_ttl = config.engine.rule_ttl();
        let manager = Arc::new(ExchangeManager::new(
            registry,
            repository.clone(),
            encryptor,
            converter,
            config,
            cancel,
        ));
        let rules = Arc::new(RuleCache::new(manager.clone(), repository.clone(), rule_ttl));
        let orders = Arc::new(OrderEngine::new(
            repository.clone(),
            manager.clone(),
            rules.clone(),
            max_users,
        ));
        let withdrawals = Arc::new(WithdrawalEngine::new(
            repository,
            manager.clone(),
            rules.clone(),
            max_users,
        ));
        Self {
            manager,
            rules,
            orders,
            withdrawals,
        }
    }
}

/// 실행 중인 백그라운드 루프.
pub struct EngineRuntime {
    cancel: CancellationToken,
    handles: Vec<JoinHandle<()>>,
}

impl EngineRuntime {
    /// 다섯 개의 주기 루프를 시작합니다.
    pub fn start(engines: &Engines, config: &EngineConfig, cancel: CancellationToken) -> Self {
        let delay = config.startup_delay();
        let mut handles = Vec::with_capacity(5);

        let orders = engines.orders.clone();
        handles.push(spawn_loop(
            "주문 스캔",
            config.order_scan_interval(),
            delay,
            cancel.clone(),
            move || {
                let engine = orders.clone();
                async move { engine.run_scan().await }
            },
        ));

        let orders = engines.orders.clone();
        handles.push(spawn_loop(
            "주문 상태 폴링",
            config.order_poll_interval(),
            delay,
            cancel.clone(),
            move || {
                let engine = orders.clone();
                async move { engine.run_status_poll().await }
            },
        ));

        let withdrawals = engines.withdrawals.clone();
        handles.push(spawn_loop(
            "출금 스캔",
            config.withdrawal_scan_interval(),
            delay,
            cancel.clone(),
            move || {
                let engine = withdrawals.clone();
                async move { engine.run_scan().await }
            },
        ));

        let withdrawals = engines.withdrawals.clone();
        handles.push(spawn_loop(
            "출금 상태 폴링",
            config.withdrawal_poll_interval(),
            delay,
            cancel.clone(),
            move || {
                let engine = withdrawals.clone();
                async move { engine.run_status_poll().await }
            },
        ));

        let rules = engines.rules.clone();
        let manager = engines.manager.clone();
        handles.push(spawn_loop(
            "규칙 갱신",
            config.rule_refresh_interval(),
            delay,
            cancel.clone(),
            move || {
                let cache = rules.clone();
                let manager = manager.clone();
                async move {
                    let stats = cache.refresh_all().await;
                    manager.cleanup_rate_limits(RATE_LIMIT_IDLE).await;
                    stats
                }
            },
        ));

        info!(loops = handles.len(), "엔진 시작");
        Self { cancel, handles }
    }

    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// 모든 루프를 취소하고 종료를 기다립니다.
    pub async fn shutdown(self) {
        self.cancel.cancel();
        for handle in self.handles {
            if let Err(e) = handle.await {
                tracing::error!(error = %e, "루프 종료 중 에러");
            }
        }
        info!("엔진 종료");
    }
}

/// 취소될 때까지 `period`마다 `task`를 실행합니다.
///
/// 주기가 밀리면 건너뛰고, 실행 중인 작업도 취소 시 중단합니다.
/// 중단된 작업의 트랜잭션은 커밋되지 않았으므로 롤백됩니다.
fn spawn_loop<F, Fut>(
    name: &'static str,
    period: Duration,
    delay: Duration,
    cancel: CancellationToken,
    task: F,
) -> JoinHandle<()>
where
    F: Fn() -> Fut + Send + 'static,
    Fut: Future<Output = CycleStats> + Send + 'static,
{
    tokio::spawn(async move {
        if !delay.is_zero() {
            tokio::select! {
                _ = cancel.cancelled() => return,
                _ = tokio::time::sleep(delay) => {}
            }
        }

        let mut interval = tokio::time::interval(period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        info!(task = name, period_secs = period.as_secs(), "루프 시작");

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    info!(task = name, "종료 신호 수신, 루프 종료");
                    break;
                }
                _ = interval.tick() => {
                    tokio::select! {
                        _ = cancel.cancelled() => {
                            info!(task = name, "실행 중 취소");
                            break;
                        }
                        stats = task() => stats.log_summary(name),
                    }
                }
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stats::Outcome;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test(start_paused = true)]
    async fn test_loop_runs_until_cancelled() {
        let runs = Arc::new(AtomicUsize::new(0));
        let cancel = CancellationToken::new();

        let counter = runs.clone();
        let handle = spawn_loop(
            "test",
            Duration::from_secs(10),
            Duration::ZERO,
            cancel.clone(),
            move || {
                let counter = counter.clone();
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    CycleStats::new()
                }
            },
        );

        tokio::time::sleep(Duration::from_secs(25)).await;
        cancel.cancel();
        handle.await.unwrap();

        // t=0, 10, 20
        assert_eq!(runs.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_startup_delay_cancelled() {
        let runs = Arc::new(AtomicUsize::new(0));
        let cancel = CancellationToken::new();

        let counter = runs.clone();
        let handle = spawn_loop(
            "test",
            Duration::from_secs(1),
            Duration::from_secs(60),
            cancel.clone(),
            move || {
                let counter = counter.clone();
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    CycleStats::new()
                }
            },
        );

        tokio::time::sleep(Duration::from_secs(5)).await;
        cancel.cancel();
        handle.await.unwrap();
        assert_eq!(runs.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_fan_out_merges_user_stats() {
        let mut by_user = BTreeMap::new();
        by_user.insert(Uuid::new_v4(), vec![Outcome::Success, Outcome::Failed]);
        by_user.insert(Uuid::new_v4(), vec![Outcome::Skipped]);

        let stats = fan_out_users(by_user, 1, |outcomes| async move {
            let mut stats = CycleStats::new();
            for outcome in outcomes {
                stats.record(outcome);
            }
            stats
        })
        .await;

        assert_eq!(stats.total, 3);
        assert_eq!(stats.success, 1);
        assert_eq!(stats.skipped, 1);
        assert_eq!(stats.failed, 1);
    }
}
