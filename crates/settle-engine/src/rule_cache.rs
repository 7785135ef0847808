//! 주문/출금 규칙 캐시.
//!
//! 항목은 저장소에 보관되어 모든 프로세스 인스턴스가 공유합니다.
//! TTL 안의 항목은 거래소를 다시 호출하지 않고, 없거나 만료된 항목은
//! 거래소에서 다시 받아 저장한 뒤 반환합니다.

use chrono::Utc;
use serde::de::DeserializeOwned;
use serde::Serialize;
use settle_core::{CurrencyChain, CurrencyMap, OrderRule, SettleError, WithdrawalRule};
use settle_exchange::{ExchangeClient, ExchangeError};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::{EngineError, EngineResult};
use crate::manager::ExchangeManager;
use crate::repository::{Repository, RuleEntry, RuleKey};
use crate::stats::{CycleStats, Outcome};

/// 규칙 캐시.
pub struct RuleCache {
    manager: Arc<ExchangeManager>,
    repository: Arc<dyn Repository>,
    ttl: Duration,
}

impl RuleCache {
    pub fn new(
        manager: Arc<ExchangeManager>,
        repository: Arc<dyn Repository>,
        ttl: Duration,
    ) -> Self {
        Self {
            manager,
            repository,
            ttl,
        }
    }

    /// 심볼 주문 규칙. `user_id`가 없으면 공개 클라이언트로 조회합니다.
    pub async fn order_rule(
        &self,
        exchange: &str,
        symbol: &str,
        user_id: Option<Uuid>,
    ) -> EngineResult<OrderRule> {
        let key = RuleKey::order(exchange, symbol, user_id);
        if let Some(rule) = self.cached(&key).await? {
            return Ok(rule);
        }
        let client = self.client(exchange, user_id).await?;
        self.fetch_order_rule(client.as_ref(), key).await
    }

    /// 통화/체인 출금 규칙. `user_id`가 없으면 공개 클라이언트로 조회합니다.
    pub async fn withdrawal_rule(
        &self,
        exchange: &str,
        chain: &CurrencyChain,
        user_id: Option<Uuid>,
    ) -> EngineResult<WithdrawalRule> {
        let key = RuleKey::withdrawal(exchange, chain, user_id);
        if let Some(rule) = self.cached(&key).await? {
            return Ok(rule);
        }
        let client = self.client(exchange, user_id).await?;
        self.fetch_withdrawal_rule(client.as_ref(), chain, key).await
    }

    /// 기본(공개) 규칙과 연결된 모든 사용자의 규칙을 TTL과 무관하게 갱신합니다.
    pub async fn refresh_all(&self) -> CycleStats {
        let started = Instant::now();
        let mut stats = CycleStats::new();

        let pairs = match self.repository.trading_pairs().await {
            Ok(pairs) => pairs,
            Err(e) => {
                warn!(error = %e, "거래 페어 조회 실패, 규칙 갱신 중단");
                return stats;
            }
        };
        let mut symbols: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();
        for pair in pairs {
            symbols.entry(pair.exchange).or_default().insert(pair.symbol);
        }

        for exchange in self.manager.registry().slugs() {
            let chains = match self.repository.currency_mappings(&exchange).await {
                Ok(mappings) => CurrencyMap::new(mappings).currency_chains(),
                Err(e) => {
                    warn!(exchange = %exchange, error = %e, "통화 매핑 조회 실패");
                    stats.record(Outcome::Failed);
                    continue;
                }
            };
            let exchange_symbols = symbols.get(&exchange).cloned().unwrap_or_default();

            match self.manager.public_client(&exchange).await {
                Ok(client) => {
                    self.refresh_with(
                        client.as_ref(),
                        &exchange,
                        None,
                        &exchange_symbols,
                        &chains,
                        &mut stats,
                    )
                    .await
                }
                Err(e) => debug!(exchange = %exchange, error = %e, "공개 규칙 갱신 생략"),
            }
        }

        let connections = match self.repository.connections().await {
            Ok(connections) => connections,
            Err(e) => {
                warn!(error = %e, "연결 조회 실패, 사용자 규칙 갱신 생략");
                stats.elapsed = started.elapsed();
                return stats;
            }
        };
        for connection in connections {
            let exchange = connection.exchange;
            let chains = match self.repository.currency_mappings(&exchange).await {
                Ok(mappings) => CurrencyMap::new(mappings).currency_chains(),
                Err(e) => {
                    warn!(exchange = %exchange, error = %e, "통화 매핑 조회 실패");
                    stats.record(Outcome::Failed);
                    continue;
                }
            };
            match self.manager.client_for(&exchange, connection.user_id).await {
                Ok(client) => {
                    self.refresh_with(
                        client.as_ref(),
                        &exchange,
                        Some(connection.user_id),
                        &BTreeSet::new(),
                        &chains,
                        &mut stats,
                    )
                    .await
                }
                Err(e) => {
                    warn!(
                        exchange = %exchange,
                        user_id = %connection.user_id,
                        error = %e,
                        "사용자 규칙 갱신 실패"
                    );
                    stats.record(Outcome::Failed);
                }
            }
        }

        stats.elapsed = started.elapsed();
        stats
    }

    async fn refresh_with(
        &self,
        client: &dyn ExchangeClient,
        exchange: &str,
        user_id: Option<Uuid>,
        symbols: &BTreeSet<String>,
        chains: &[CurrencyChain],
        stats: &mut CycleStats,
    ) {
        for symbol in symbols {
            let key = RuleKey::order(exchange, symbol, user_id);
            match self.fetch_order_rule(client, key).await {
                Ok(_) => stats.record(Outcome::Success),
                Err(e) => {
                    debug!(exchange, symbol = %symbol, error = %e, "주문 규칙 갱신 실패");
                    stats.record(Outcome::Failed);
                }
            }
        }
        for chain in chains {
            let key = RuleKey::withdrawal(exchange, chain, user_id);
            match self.fetch_withdrawal_rule(client, chain, key).await {
                Ok(_) => stats.record(Outcome::Success),
                Err(e) => {
                    debug!(
                        exchange,
                        ticker = %chain.ticker,
                        chain = %chain.chain,
                        error = %e,
                        "출금 규칙 갱신 실패"
                    );
                    stats.record(Outcome::Failed);
                }
            }
        }
    }

    async fn client(
        &self,
        exchange: &str,
        user_id: Option<Uuid>,
    ) -> EngineResult<Arc<dyn ExchangeClient>> {
        match user_id {
            Some(user_id) => self.manager.client_for(exchange, user_id).await,
            None => self.manager.public_client(exchange).await,
        }
    }

    async fn fetch_order_rule(
        &self,
        client: &dyn ExchangeClient,
        key: RuleKey,
    ) -> EngineResult<OrderRule> {
        let rule = client.get_order_rule(&key.subject).await?;
        self.store(key, &rule).await?;
        Ok(rule)
    }

    async fn fetch_withdrawal_rule(
        &self,
        client: &dyn ExchangeClient,
        chain: &CurrencyChain,
        key: RuleKey,
    ) -> EngineResult<WithdrawalRule> {
        let rule = client
            .get_withdrawal_rules(std::slice::from_ref(chain))
            .await?
            .into_iter()
            .find(|r| {
                r.ticker.eq_ignore_ascii_case(&chain.ticker)
                    && r.chain.eq_ignore_ascii_case(&chain.chain)
            })
            .ok_or_else(|| {
                ExchangeError::NotFound(format!("출금 규칙 없음: {} {}", chain.ticker, chain.chain))
            })?;
        self.store(key, &rule).await?;
        Ok(rule)
    }

    /// TTL 안의 항목이면 역직렬화해서 반환합니다.
    async fn cached<T: DeserializeOwned>(&self, key: &RuleKey) -> EngineResult<Option<T>> {
        let Some(entry) = self.repository.rule_entry(key).await? else {
            return Ok(None);
        };
        let age = (Utc::now() - entry.fetched_at).to_std().unwrap_or_default();
        if age >= self.ttl {
            return Ok(None);
        }
        let rule = serde_json::from_value(entry.payload).map_err(SettleError::from)?;
        Ok(Some(rule))
    }

    async fn store<T: Serialize>(&self, key: RuleKey, rule: &T) -> EngineResult<()> {
        let payload = serde_json::to_value(rule).map_err(SettleError::from)?;
        self.repository
            .save_rule_entry(RuleEntry {
                key,
                payload,
                fetched_at: Utc::now(),
            })
            .await
            .map_err(EngineError::from)
    }
}
