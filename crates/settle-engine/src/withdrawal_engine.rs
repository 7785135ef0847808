//! 출금 엔진.
//!
//! 상태 전이: `New → InProgress → {Completed, Failed, Recovery}`,
//! `Recovery → {Completed, Failed, InProgress}`.
//!
//! (user, exchange)마다 미종결 출금은 하나뿐입니다. 거래소에 출금을 요청하기
//! 전에 `New` 레코드를 커밋해 자리를 선점하고, 결과는 두 번째 트랜잭션으로
//! 기록합니다. 선점 충돌은 프로세스 내 잠금이 아니라 저장소 커밋이 판정하므로
//! 여러 인스턴스가 동시에 돌아도 됩니다.

use rust_decimal::Decimal;
use settle_core::{
    engine_span, CurrencyChain, CurrencyMap, WithdrawalRecord, WithdrawalSetting, WithdrawalStatus,
};
use settle_exchange::{
    ErrorKind, ExchangeClient, ExchangeError, WithdrawalParams, WithdrawalQuery,
};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, warn, Instrument};
use uuid::Uuid;

use crate::error::{EngineError, EngineResult, RepositoryError};
use crate::manager::ExchangeManager;
use crate::repository::{resume_transfers, suspend_transfers, Repository};
use crate::rule_cache::RuleCache;
use crate::runtime::fan_out_users;
use crate::stats::{CycleStats, Outcome};

/// 출금 엔진.
pub struct WithdrawalEngine {
    repository: Arc<dyn Repository>,
    manager: Arc<ExchangeManager>,
    rules: Arc<RuleCache>,
    max_concurrent_users: usize,
}

impl WithdrawalEngine {
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

    /// 활성 출금 설정 전체에 대해 출금을 한 번 시도합니다.
    pub async fn run_scan(&self) -> CycleStats {
        let started = Instant::now();
        let settings = match self.repository.withdrawal_settings().await {
            Ok(settings) => settings,
            Err(e) => {
                error!(error = %e, "출금 설정 조회 실패");
                return CycleStats::new();
            }
        };

        let mut by_user: BTreeMap<Uuid, Vec<WithdrawalSetting>> = BTreeMap::new();
        for setting in settings {
            by_user.entry(setting.user_id).or_default().push(setting);
        }

        let mut stats = fan_out_users(by_user, self.max_concurrent_users, |settings| {
            self.scan_user(settings)
        })
        .await;
        stats.elapsed = started.elapsed();
        stats
    }

    async fn scan_user(&self, settings: Vec<WithdrawalSetting>) -> CycleStats {
        let mut stats = CycleStats::new();
        for setting in settings {
            let span =
                engine_span!("withdrawal_scan", setting.user_id, setting.exchange, setting.id);
            let outcome = match self.process_setting(&setting).instrument(span).await {
                Ok(outcome) => outcome,
                Err(e) if e.is_cycle_local() => {
                    debug!(setting_id = %setting.id, reason = %e, "출금 건너뜀");
                    Outcome::Skipped
                }
                Err(e) => {
                    warn!(setting_id = %setting.id, error = %e, "출금 처리 중단");
                    Outcome::from(&e)
                }
            };
            stats.record(outcome);
        }
        stats
    }

    async fn process_setting(&self, setting: &WithdrawalSetting) -> EngineResult<Outcome> {
        if !setting.enabled {
            return Ok(Outcome::Skipped);
        }
        if let Some(transfer) = self
            .repository
            .transfer_setting(setting.user_id, &setting.exchange)
            .await?
        {
            if !transfer.enabled {
                debug!("송금 중지 상태, 건너뜀");
                return Ok(Outcome::Skipped);
            }
        }

        let mappings = self.repository.currency_mappings(&setting.exchange).await?;
        let currency_map = CurrencyMap::new(mappings);
        let mapping = currency_map
            .resolve(&setting.currency_id)
            .cloned()
            .ok_or_else(|| EngineError::CurrencyNotMapped {
                exchange: setting.exchange.clone(),
                currency_id: setting.currency_id.clone(),
            })?;
        let chain = CurrencyChain::new(&mapping.ticker, &mapping.chain);
        let client = self.manager.client_for(&setting.exchange, setting.user_id).await?;

        // 잔고 조회 전에 가볍게 확인. 최종 판단은 선점 커밋에서 합니다.
        {
            let mut tx = self.repository.begin().await?;
            if tx
                .pending_withdrawal(setting.user_id, &setting.exchange)
                .await?
                .is_some()
            {
                return Err(pending_error(setting));
            }
        }

        let balance = client.get_currency_balance(&chain.ticker).await?;
        if balance.amount <= Decimal::ZERO || balance.amount < setting.min_threshold {
            return Err(EngineError::ThresholdNotMet {
                balance: balance.amount,
                threshold: setting.min_threshold,
            });
        }

        let rule = self
            .rules
            .withdrawal_rule(&setting.exchange, &chain, Some(setting.user_id))
            .await?;

        let record = WithdrawalRecord::new(
            setting,
            &chain.ticker,
            &chain.chain,
            client.connection_hash().map(|h| h.as_str().to_string()),
        );
        self.claim(setting, &record).await?;

        let params = WithdrawalParams {
            internal_order_id: record.internal_order_id.clone(),
            ticker: chain.ticker.clone(),
            chain: chain.chain.clone(),
            address: setting.address.clone(),
            tag: setting.tag.clone(),
            amount: balance.amount,
            rule,
        };

        match client.create_withdrawal_order(&params).await {
            Ok(result) => {
                let fiat_amount = self
                    .fiat_value(&setting.exchange, &chain.ticker, result.amount)
                    .await;
                let mut tx = self.repository.begin().await?;
                let mut current = tx.withdrawal(record.id).await?.unwrap_or(record);
                current.mark_in_progress(
                    result.exchange_order_id.clone(),
                    result.amount,
                    Some(result.fee),
                    fiat_amount,
                    result.retry_reason,
                )?;
                tx.save_withdrawal(&current).await?;
                if let Err(e) = tx.commit().await {
                    // 거래소는 접수했으므로 선점 레코드(New)는 그대로 두고 수동 대조에 맡김
                    error!(
                        withdrawal_id = %current.id,
                        exchange_order_id = %result.exchange_order_id,
                        error = %e,
                        "출금 접수 후 기록 실패"
                    );
                    return Err(e.into());
                }
                info!(
                    ticker = %current.ticker,
                    chain = %current.chain,
                    amount = %current.amount,
                    attempts = result.attempts,
                    "출금 접수"
                );
                Ok(Outcome::Success)
            }
            Err(e) => self.handle_submit_error(record, e).await,
        }
    }

    /// `New` 레코드를 커밋해 (user, exchange)의 출금 자리를 선점합니다.
    ///
    /// 다른 스캔이 먼저 커밋했다면 커밋 시점의 제약 검사가 실패하고
    /// `WithdrawalPending`으로 이번 주기를 건너뜁니다.
    async fn claim(
        &self,
        setting: &WithdrawalSetting,
        record: &WithdrawalRecord,
    ) -> EngineResult<()> {
        let mut tx = self.repository.begin().await?;
        if tx
            .pending_withdrawal(setting.user_id, &setting.exchange)
            .await?
            .is_some()
        {
            return Err(pending_error(setting));
        }
        tx.save_withdrawal(record).await?;
        match tx.commit().await {
            Ok(()) => Ok(()),
            Err(RepositoryError::Conflict(reason)) => {
                debug!(reason = %reason, "출금 선점 충돌");
                Err(pending_error(setting))
            }
            Err(e) => Err(e.into()),
        }
    }

    /// 제출 실패 처리.
    ///
    /// 잔고 잠김, 최소 금액 미달, 보안 잠금, 화이트리스트 미등록 주소는
    /// 선점 레코드를 지우고 다음 주기에 다시 시도합니다. 연결 문제는 거래소가
    /// 접수했는지 알 수 없으므로 선점을 남겨 중복 출금을 막습니다.
    /// 분류되지 않은 에러만 송금을 중지합니다.
    async fn handle_submit_error(
        &self,
        record: WithdrawalRecord,
        err: ExchangeError,
    ) -> EngineResult<Outcome> {
        let kind = err.kind();
        let mut tx = self.repository.begin().await?;
        match kind {
            ErrorKind::WithdrawalBalanceLocked
            | ErrorKind::MinWithdrawalNotMet
            | ErrorKind::SecurityActionLock
            | ErrorKind::WithdrawalAddressNotWhitelisted => {
                tx.discard_withdrawal(record.id).await?;
                tx.commit().await?;
                info!(kind = kind.as_str(), error = %err, "출금 보류, 다음 주기에 재시도");
                Ok(Outcome::Skipped)
            }
            ErrorKind::TransientNetwork => {
                warn!(
                    withdrawal_id = %record.id,
                    internal_order_id = %record.internal_order_id,
                    error = %err,
                    "출금 접수 여부 불명, 선점 유지"
                );
                Ok(Outcome::Skipped)
            }
            kind if kind.is_cycle_local() => {
                tx.discard_withdrawal(record.id).await?;
                tx.commit().await?;
                debug!(kind = kind.as_str(), error = %err, "이번 주기 건너뜀");
                Ok(Outcome::Skipped)
            }
            _ => {
                let mut current = tx.withdrawal(record.id).await?.unwrap_or(record);
                current.mark_failed(err.to_string())?;
                tx.save_withdrawal(&current).await?;
                let suspended = if kind == ErrorKind::Unknown {
                    suspend_transfers(tx.as_mut(), current.user_id, &current.exchange).await?
                } else {
                    false
                };
                tx.commit().await?;
                error!(kind = kind.as_str(), error = %err, suspended, "출금 실패");
                Ok(Outcome::Failed)
            }
        }
    }

    async fn fiat_value(&self, exchange: &str, ticker: &str, amount: Decimal) -> Option<Decimal> {
        let fiat = &self.manager.config().fiat_currency;
        match self
            .manager
            .converter()
            .convert(exchange, ticker, fiat, amount)
            .await
        {
            Ok(value) => Some(value),
            Err(e) => {
                debug!(ticker, error = %e, "법정화폐 환산 실패");
                None
            }
        }
    }

    // ==================== 상태 폴링 ====================

    /// 처리 중인 출금의 거래소 상태를 반영합니다.
    pub async fn run_status_poll(&self) -> CycleStats {
        let started = Instant::now();
        let withdrawals = match self.repository.withdrawals_in_flight().await {
            Ok(withdrawals) => withdrawals,
            Err(e) => {
                error!(error = %e, "처리 중인 출금 조회 실패");
                return CycleStats::new();
            }
        };

        let mut by_user: BTreeMap<Uuid, Vec<WithdrawalRecord>> = BTreeMap::new();
        for withdrawal in withdrawals {
            by_user.entry(withdrawal.user_id).or_default().push(withdrawal);
        }

        let mut stats = fan_out_users(by_user, self.max_concurrent_users, |records| {
            self.poll_user(records)
        })
        .await;
        stats.elapsed = started.elapsed();
        stats
    }

    async fn poll_user(&self, records: Vec<WithdrawalRecord>) -> CycleStats {
        let mut stats = CycleStats::new();
        for record in records {
            let span = engine_span!("withdrawal_poll", record.user_id, record.exchange, record.id);
            let outcome = async {
                let client = self.manager.client_for(&record.exchange, record.user_id).await?;
                self.poll_withdrawal(client.as_ref(), &record).await
            }
            .instrument(span)
            .await;

            // 조회 실패는 연결 문제일 수 있으므로 송금 설정을 바꾸지 않음
            stats.record(match outcome {
                Ok(outcome) => outcome,
                Err(e) => {
                    warn!(withdrawal_id = %record.id, error = %e, "출금 상태 조회 실패");
                    Outcome::Skipped
                }
            });
        }
        stats
    }

    async fn poll_withdrawal(
        &self,
        client: &dyn ExchangeClient,
        record: &WithdrawalRecord,
    ) -> EngineResult<Outcome> {
        let Some(exchange_order_id) = record.exchange_order_id.clone() else {
            return Ok(Outcome::Skipped);
        };
        let details = client
            .get_withdrawal_by_id(&WithdrawalQuery {
                ticker: record.ticker.clone(),
                chain: record.chain.clone(),
                exchange_order_id,
                internal_order_id: record.internal_order_id.clone(),
            })
            .await?;

        let mut tx = self.repository.begin().await?;
        let Some(mut current) = tx.withdrawal(record.id).await? else {
            return Ok(Outcome::Skipped);
        };
        if current.status.is_terminal() || details.status == WithdrawalStatus::New {
            return Ok(Outcome::Skipped);
        }

        let before = current.clone();
        if details.tx_hash.is_some() {
            current.tx_hash = details.tx_hash.clone();
        }
        if let Some(fee) = details.fee {
            current.fee = Some(fee);
        }

        match details.status {
            WithdrawalStatus::Completed => {
                current.transition(WithdrawalStatus::Completed)?;
                let resumed =
                    resume_transfers(tx.as_mut(), current.user_id, &current.exchange).await?;
                info!(tx_hash = ?current.tx_hash, resumed, "출금 완료");
            }
            WithdrawalStatus::Failed => {
                current.mark_failed(format!("거래소 출금 실패 (상태: {})", details.raw_status))?;
                let suspended =
                    suspend_transfers(tx.as_mut(), current.user_id, &current.exchange).await?;
                warn!(raw_status = %details.raw_status, suspended, "출금 실패 확인");
            }
            WithdrawalStatus::Recovery => {
                current.transition(WithdrawalStatus::Recovery)?;
                if before.status != WithdrawalStatus::Recovery {
                    warn!(raw_status = %details.raw_status, "출금 수동 조치 필요");
                }
            }
            WithdrawalStatus::InProgress | WithdrawalStatus::New => {
                current.transition(WithdrawalStatus::InProgress)?;
            }
        }

        if current == before {
            return Ok(Outcome::Skipped);
        }
        tx.save_withdrawal(&current).await?;
        tx.commit().await?;
        Ok(Outcome::Success)
    }
}

fn pending_error(setting: &WithdrawalSetting) -> EngineError {
    EngineError::WithdrawalPending {
        user_id: setting.user_id,
        exchange: setting.exchange.clone(),
    }
}
