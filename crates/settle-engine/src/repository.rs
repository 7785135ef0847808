//! 저장소 포트와 메모리 구현.
//!
//! 엔진은 `Repository` 트레이트만 사용합니다. 상태를 바꾸는 작업은
//! 모두 `Transaction` 안에서 "현재 상태 읽기 → 거래소 호출 → 새 상태 쓰기"
//! 순서로 수행하고, 커밋하지 않은 트랜잭션은 버려지면 롤백됩니다.
//! 출금만은 거래소 호출 전에 `New` 레코드를 먼저 커밋해 자리를 선점합니다.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use settle_core::{
    CurrencyChain, CurrencyMapping, OrderRecord, OrderStatus, SealedCredential,
    TradingPairConfig, TransferSetting, WithdrawalRecord, WithdrawalSetting, WithdrawalStatus,
};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::error::{RepositoryError, RepositoryResult};

// ==================== 레코드 타입 ====================

/// 저장된 거래소 연결 (봉인된 자격증명 포함).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExchangeConnection {
    pub user_id: Uuid,
    pub exchange: String,
    pub credential: SealedCredential,
}

/// 캐시된 규칙 종류.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleKind {
    Order,
    Withdrawal,
}

/// 규칙 캐시 키. 사용자별 규칙이면 `user_id`가 채워집니다.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RuleKey {
    pub kind: RuleKind,
    pub exchange: String,
    /// 주문 규칙은 심볼, 출금 규칙은 "티커:체인"
    pub subject: String,
    pub user_id: Option<Uuid>,
}

impl RuleKey {
    pub fn order(exchange: &str, symbol: &str, user_id: Option<Uuid>) -> Self {
        Self {
            kind: RuleKind::Order,
            exchange: exchange.to_string(),
            subject: symbol.to_string(),
            user_id,
        }
    }

    pub fn withdrawal(exchange: &str, chain: &CurrencyChain, user_id: Option<Uuid>) -> Self {
        Self {
            kind: RuleKind::Withdrawal,
            exchange: exchange.to_string(),
            subject: format!("{}:{}", chain.ticker, chain.chain),
            user_id,
        }
    }
}

/// 저장된 규칙 캐시 항목.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleEntry {
    pub key: RuleKey,
    /// 직렬화된 규칙
    pub payload: serde_json::Value,
    pub fetched_at: DateTime<Utc>,
}

// ==================== 포트 ====================

/// 영속 저장소.
#[async_trait]
pub trait Repository: Send + Sync {
    /// 트랜잭션 시작.
    async fn begin(&self) -> RepositoryResult<Box<dyn Transaction>>;

    /// 모든 거래소 연결.
    async fn connections(&self) -> RepositoryResult<Vec<ExchangeConnection>>;

    /// (user, exchange)의 봉인된 자격증명.
    async fn sealed_credential(
        &self,
        user_id: Uuid,
        exchange: &str,
    ) -> RepositoryResult<Option<SealedCredential>>;

    /// 거래소의 통화 매핑.
    async fn currency_mappings(&self, exchange: &str) -> RepositoryResult<Vec<CurrencyMapping>>;

    /// 활성화된 거래 페어 설정.
    async fn trading_pairs(&self) -> RepositoryResult<Vec<TradingPairConfig>>;

    /// 활성화된 출금 설정.
    async fn withdrawal_settings(&self) -> RepositoryResult<Vec<WithdrawalSetting>>;

    /// 진행 중인 주문.
    async fn orders_in_progress(&self) -> RepositoryResult<Vec<OrderRecord>>;

    /// 거래소 처리 중(InProgress/Recovery)인 출금.
    async fn withdrawals_in_flight(&self) -> RepositoryResult<Vec<WithdrawalRecord>>;

    /// (user, exchange)의 송금 설정.
    async fn transfer_setting(
        &self,
        user_id: Uuid,
        exchange: &str,
    ) -> RepositoryResult<Option<TransferSetting>>;

    async fn rule_entry(&self, key: &RuleKey) -> RepositoryResult<Option<RuleEntry>>;

    async fn save_rule_entry(&self, entry: RuleEntry) -> RepositoryResult<()>;
}

/// 저장소 트랜잭션.
#[async_trait]
pub trait Transaction: Send {
    async fn order(&mut self, id: Uuid) -> RepositoryResult<Option<OrderRecord>>;

    async fn save_order(&mut self, record: &OrderRecord) -> RepositoryResult<()>;

    async fn withdrawal(&mut self, id: Uuid) -> RepositoryResult<Option<WithdrawalRecord>>;

    /// (user, exchange)의 최종 상태가 아닌 출금.
    async fn pending_withdrawal(
        &mut self,
        user_id: Uuid,
        exchange: &str,
    ) -> RepositoryResult<Option<WithdrawalRecord>>;

    async fn save_withdrawal(&mut self, record: &WithdrawalRecord) -> RepositoryResult<()>;

    /// 거래소가 접수하지 않은 출금 선점 레코드를 지웁니다.
    async fn discard_withdrawal(&mut self, id: Uuid) -> RepositoryResult<()>;

    async fn transfer_setting(
        &mut self,
        user_id: Uuid,
        exchange: &str,
    ) -> RepositoryResult<Option<TransferSetting>>;

    async fn save_transfer_setting(&mut self, setting: &TransferSetting) -> RepositoryResult<()>;

    /// 커밋. 호출하지 않고 버리면 롤백됩니다.
    async fn commit(self: Box<Self>) -> RepositoryResult<()>;
}

/// 송금을 중지합니다. 활성 상태였을 때만 기록하며 변경 여부를 반환합니다.
pub async fn suspend_transfers(
    tx: &mut dyn Transaction,
    user_id: Uuid,
    exchange: &str,
) -> RepositoryResult<bool> {
    let mut setting = tx
        .transfer_setting(user_id, exchange)
        .await?
        .unwrap_or_else(|| TransferSetting::enabled(user_id, exchange));
    if !setting.suspend() {
        return Ok(false);
    }
    tx.save_transfer_setting(&setting).await?;
    Ok(true)
}

/// 시스템이 중지한 송금만 재개합니다. 변경 여부를 반환합니다.
pub async fn resume_transfers(
    tx: &mut dyn Transaction,
    user_id: Uuid,
    exchange: &str,
) -> RepositoryResult<bool> {
    let Some(mut setting) = tx.transfer_setting(user_id, exchange).await? else {
        return Ok(false);
    };
    if !setting.resume_if_system_suspended() {
        return Ok(false);
    }
    tx.save_transfer_setting(&setting).await?;
    Ok(true)
}

// ==================== 메모리 구현 ====================

#[derive(Debug, Default)]
struct MemoryState {
    connections: HashMap<(Uuid, String), SealedCredential>,
    mappings: Vec<CurrencyMapping>,
    pairs: Vec<TradingPairConfig>,
    withdrawal_settings: Vec<WithdrawalSetting>,
    orders: HashMap<Uuid, OrderRecord>,
    withdrawals: HashMap<Uuid, WithdrawalRecord>,
    transfer_settings: HashMap<(Uuid, String), TransferSetting>,
    rules: HashMap<RuleKey, RuleEntry>,
}

/// 프로세스 내 저장소.
///
/// 트랜잭션은 쓰기를 모아 두었다가 커밋 시 한 번에 반영합니다.
/// 커밋 시점에 같은 (user, exchange)의 미종결 출금이 둘 이상이 되면
/// `RepositoryError::Conflict`로 거부합니다.
#[derive(Debug, Clone, Default)]
pub struct MemoryRepository {
    state: Arc<RwLock<MemoryState>>,
}

impl MemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn add_connection(&self, user_id: Uuid, exchange: &str, sealed: SealedCredential) {
        let mut state = self.state.write().await;
        state.connections.insert((user_id, exchange.to_string()), sealed);
    }

    pub async fn add_currency_mapping(&self, mapping: CurrencyMapping) {
        self.state.write().await.mappings.push(mapping);
    }

    pub async fn add_trading_pair(&self, pair: TradingPairConfig) {
        self.state.write().await.pairs.push(pair);
    }

    pub async fn add_withdrawal_setting(&self, setting: WithdrawalSetting) {
        self.state.write().await.withdrawal_settings.push(setting);
    }

    pub async fn put_transfer_setting(&self, setting: TransferSetting) {
        let mut state = self.state.write().await;
        state
            .transfer_settings
            .insert((setting.user_id, setting.exchange.clone()), setting);
    }

    /// 저장된 모든 주문 (생성 순).
    pub async fn orders(&self) -> Vec<OrderRecord> {
        let state = self.state.read().await;
        let mut orders: Vec<_> = state.orders.values().cloned().collect();
        orders.sort_by_key(|o| o.created_at);
        orders
    }

    /// 저장된 모든 출금 (생성 순).
    pub async fn withdrawals(&self) -> Vec<WithdrawalRecord> {
        let state = self.state.read().await;
        let mut withdrawals: Vec<_> = state.withdrawals.values().cloned().collect();
        withdrawals.sort_by_key(|w| w.created_at);
        withdrawals
    }
}

#[async_trait]
impl Repository for MemoryRepository {
    async fn begin(&self) -> RepositoryResult<Box<dyn Transaction>> {
        Ok(Box::new(MemoryTransaction {
            state: self.state.clone(),
            orders: HashMap::new(),
            withdrawals: HashMap::new(),
            discarded: HashSet::new(),
            transfer_settings: HashMap::new(),
        }))
    }

    async fn connections(&self) -> RepositoryResult<Vec<ExchangeConnection>> {
        let state = self.state.read().await;
        let mut connections: Vec<_> = state
            .connections
            .iter()
            .map(|((user_id, exchange), credential)| ExchangeConnection {
                user_id: *user_id,
                exchange: exchange.clone(),
                credential: credential.clone(),
            })
            .collect();
        connections.sort_by(|a, b| (a.user_id, &a.exchange).cmp(&(b.user_id, &b.exchange)));
        Ok(connections)
    }

    async fn sealed_credential(
        &self,
        user_id: Uuid,
        exchange: &str,
    ) -> RepositoryResult<Option<SealedCredential>> {
        let state = self.state.read().await;
        Ok(state
            .connections
            .get(&(user_id, exchange.to_string()))
            .cloned())
    }

    async fn currency_mappings(&self, exchange: &str) -> RepositoryResult<Vec<CurrencyMapping>> {
        let state = self.state.read().await;
        Ok(state
            .mappings
            .iter()
            .filter(|m| m.exchange == exchange)
            .cloned()
            .collect())
    }

    async fn trading_pairs(&self) -> RepositoryResult<Vec<TradingPairConfig>> {
        let state = self.state.read().await;
        Ok(state.pairs.iter().filter(|p| p.enabled).cloned().collect())
    }

    async fn withdrawal_settings(&self) -> RepositoryResult<Vec<WithdrawalSetting>> {
        let state = self.state.read().await;
        Ok(state
            .withdrawal_settings
            .iter()
            .filter(|s| s.enabled)
            .cloned()
            .collect())
    }

    async fn orders_in_progress(&self) -> RepositoryResult<Vec<OrderRecord>> {
        let state = self.state.read().await;
        Ok(state
            .orders
            .values()
            .filter(|o| o.status == OrderStatus::InProgress)
            .cloned()
            .collect())
    }

    async fn withdrawals_in_flight(&self) -> RepositoryResult<Vec<WithdrawalRecord>> {
        let state = self.state.read().await;
        Ok(state
            .withdrawals
            .values()
            .filter(|w| {
                matches!(
                    w.status,
                    WithdrawalStatus::InProgress | WithdrawalStatus::Recovery
                )
            })
            .cloned()
            .collect())
    }

    async fn transfer_setting(
        &self,
        user_id: Uuid,
        exchange: &str,
    ) -> RepositoryResult<Option<TransferSetting>> {
        let state = self.state.read().await;
        Ok(state
            .transfer_settings
            .get(&(user_id, exchange.to_string()))
            .cloned())
    }

    async fn rule_entry(&self, key: &RuleKey) -> RepositoryResult<Option<RuleEntry>> {
        Ok(self.state.read().await.rules.get(key).cloned())
    }

    async fn save_rule_entry(&self, entry: RuleEntry) -> RepositoryResult<()> {
        let mut state = self.state.write().await;
        state.rules.insert(entry.key.clone(), entry);
        Ok(())
    }
}

/// `MemoryRepository` 트랜잭션.
struct MemoryTransaction {
    state: Arc<RwLock<MemoryState>>,
    orders: HashMap<Uuid, OrderRecord>,
    withdrawals: HashMap<Uuid, WithdrawalRecord>,
    discarded: HashSet<Uuid>,
    transfer_settings: HashMap<(Uuid, String), TransferSetting>,
}

/// 커밋된 출금과 대기 중인 쓰기를 합친 뷰.
fn merged_withdrawals(
    committed: &HashMap<Uuid, WithdrawalRecord>,
    staged: &HashMap<Uuid, WithdrawalRecord>,
    discarded: &HashSet<Uuid>,
) -> HashMap<Uuid, WithdrawalRecord> {
    let mut merged = committed.clone();
    merged.retain(|id, _| !discarded.contains(id));
    merged.extend(staged.iter().map(|(id, w)| (*id, w.clone())));
    merged
}

#[async_trait]
impl Transaction for MemoryTransaction {
    async fn order(&mut self, id: Uuid) -> RepositoryResult<Option<OrderRecord>> {
        if let Some(order) = self.orders.get(&id) {
            return Ok(Some(order.clone()));
        }
        Ok(self.state.read().await.orders.get(&id).cloned())
    }

    async fn save_order(&mut self, record: &OrderRecord) -> RepositoryResult<()> {
        self.orders.insert(record.id, record.clone());
        Ok(())
    }

    async fn withdrawal(&mut self, id: Uuid) -> RepositoryResult<Option<WithdrawalRecord>> {
        if self.discarded.contains(&id) {
            return Ok(None);
        }
        if let Some(withdrawal) = self.withdrawals.get(&id) {
            return Ok(Some(withdrawal.clone()));
        }
        Ok(self.state.read().await.withdrawals.get(&id).cloned())
    }

    async fn pending_withdrawal(
        &mut self,
        user_id: Uuid,
        exchange: &str,
    ) -> RepositoryResult<Option<WithdrawalRecord>> {
        let state = self.state.read().await;
        Ok(merged_withdrawals(&state.withdrawals, &self.withdrawals, &self.discarded)
            .into_values()
            .find(|w| w.user_id == user_id && w.exchange == exchange && !w.status.is_terminal()))
    }

    async fn save_withdrawal(&mut self, record: &WithdrawalRecord) -> RepositoryResult<()> {
        self.discarded.remove(&record.id);
        self.withdrawals.insert(record.id, record.clone());
        Ok(())
    }

    async fn discard_withdrawal(&mut self, id: Uuid) -> RepositoryResult<()> {
        self.withdrawals.remove(&id);
        self.discarded.insert(id);
        Ok(())
    }

    async fn transfer_setting(
        &mut self,
        user_id: Uuid,
        exchange: &str,
    ) -> RepositoryResult<Option<TransferSetting>> {
        let key = (user_id, exchange.to_string());
        if let Some(setting) = self.transfer_settings.get(&key) {
            return Ok(Some(setting.clone()));
        }
        Ok(self.state.read().await.transfer_settings.get(&key).cloned())
    }

    async fn save_transfer_setting(&mut self, setting: &TransferSetting) -> RepositoryResult<()> {
        self.transfer_settings
            .insert((setting.user_id, setting.exchange.clone()), setting.clone());
        Ok(())
    }

    async fn commit(self: Box<Self>) -> RepositoryResult<()> {
        let MemoryTransaction {
            state,
            orders,
            withdrawals,
            discarded,
            transfer_settings,
        } = *self;
        let mut state = state.write().await;

        let merged = merged_withdrawals(&state.withdrawals, &withdrawals, &discarded);
        for staged in withdrawals.values().filter(|w| !w.status.is_terminal()) {
            let open = merged
                .values()
                .filter(|w| {
                    w.user_id == staged.user_id
                        && w.exchange == staged.exchange
                        && !w.status.is_terminal()
                })
                .count();
            if open > 1 {
                return Err(RepositoryError::Conflict(format!(
                    "미종결 출금 중복: user={} exchange={}",
                    staged.user_id, staged.exchange
                )));
            }
        }

        state.orders.extend(orders);
        state.withdrawals.retain(|id, _| !discarded.contains(id));
        state.withdrawals.extend(withdrawals);
        state.transfer_settings.extend(transfer_settings);
        Ok(())
    }
}
