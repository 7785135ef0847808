//! 출금 상태 머신 타입.
//!
//! 상태 전이:
//!
//! ```text
//! New ──> InProgress ──> Completed
//!  │          │  ↑
//!  │          │  └── Recovery ──> Completed
//!  │          ↓          │
//!  └──────> Failed <─────┘
//! ```
//!
//! (user, exchange)마다 최종 상태가 아닌 레코드는 최대 하나만 존재할 수 있습니다.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{SettleError, SettleResult};

/// 출금 레코드 상태.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WithdrawalStatus {
    /// 출금 시도 시작
    New,
    /// 거래소 접수 완료, 처리 중
    InProgress,
    /// 완료
    Completed,
    /// 실패
    Failed,
    /// 수동 조치 대기 (예: 추가 인증 요구)
    Recovery,
}

impl WithdrawalStatus {
    /// 최종 상태인지 확인합니다.
    pub fn is_terminal(&self) -> bool {
        matches!(self, WithdrawalStatus::Completed | WithdrawalStatus::Failed)
    }

    /// 허용된 전이인지 확인합니다.
    pub fn can_transition_to(&self, next: WithdrawalStatus) -> bool {
        use WithdrawalStatus::*;
        matches!(
            (self, next),
            (New, InProgress)
                | (New, Failed)
                | (InProgress, Completed)
                | (InProgress, Failed)
                | (InProgress, Recovery)
                | (Recovery, Completed)
                | (Recovery, Failed)
                | (Recovery, InProgress)
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            WithdrawalStatus::New => "new",
            WithdrawalStatus::InProgress => "in_progress",
            WithdrawalStatus::Completed => "completed",
            WithdrawalStatus::Failed => "failed",
            WithdrawalStatus::Recovery => "recovery",
        }
    }
}

impl std::fmt::Display for WithdrawalStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 사용자별 자동 출금 설정.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WithdrawalSetting {
    pub id: Uuid,
    pub user_id: Uuid,
    pub exchange: String,
    /// 내부 통화 ID
    pub currency_id: String,
    /// 출금 주소
    pub address: String,
    /// 메모/태그 (필요한 체인만)
    pub tag: Option<String>,
    /// 이 금액 미만이면 출금하지 않음 (출금 통화 단위)
    pub min_threshold: Decimal,
    pub enabled: bool,
}

/// (user, exchange)별 송금 안전 설정.
///
/// 예기치 않은 실패가 발생하면 시스템이 송금을 중지하고
/// `suspended_by_system`을 기록합니다. 시스템이 중지한 경우에만
/// 이후 성공 시 자동으로 재개합니다.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransferSetting {
    pub user_id: Uuid,
    pub exchange: String,
    pub enabled: bool,
    pub suspended_by_system: bool,
    pub updated_at: DateTime<Utc>,
}

impl TransferSetting {
    pub fn enabled(user_id: Uuid, exchange: impl Into<String>) -> Self {
        Self {
            user_id,
            exchange: exchange.into(),
            enabled: true,
            suspended_by_system: false,
            updated_at: Utc::now(),
        }
    }

    /// 송금 중지. 현재 활성 상태일 때만 변경하며 변경 여부를 반환합니다.
    pub fn suspend(&mut self) -> bool {
        if !self.enabled {
            return false;
        }
        self.enabled = false;
        self.suspended_by_system = true;
        self.updated_at = Utc::now();
        true
    }

    /// 시스템이 중지한 경우에만 재개. 변경 여부를 반환합니다.
    pub fn resume_if_system_suspended(&mut self) -> bool {
        if self.enabled || !self.suspended_by_system {
            return false;
        }
        self.enabled = true;
        self.suspended_by_system = false;
        self.updated_at = Utc::now();
        true
    }
}

/// 출금 시도 한 건의 레코드.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WithdrawalRecord {
    pub id: Uuid,
    pub user_id: Uuid,
    pub exchange: String,
    pub setting_id: Uuid,
    pub address: String,
    pub tag: Option<String>,
    pub currency_id: String,
    pub ticker: String,
    pub chain: String,
    /// 제출된 출금액 (출금 통화 단위)
    pub amount: Decimal,
    /// 기준 법정화폐 환산액
    pub fiat_amount: Option<Decimal>,
    pub fee: Option<Decimal>,
    /// 내부 출금 주문 ID (거래소에 전달한 클라이언트 ID)
    pub internal_order_id: String,
    /// 거래소 출금 ID
    pub exchange_order_id: Option<String>,
    pub tx_hash: Option<String>,
    pub status: WithdrawalStatus,
    pub fail_reason: Option<String>,
    /// 잔고 잠김 재시도 등 관측용 사유
    pub retry_reason: Option<String>,
    pub connection_hash: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl WithdrawalRecord {
    /// 새 출금 시도 레코드 생성.
    pub fn new(
        setting: &WithdrawalSetting,
        ticker: impl Into<String>,
        chain: impl Into<String>,
        connection_hash: Option<String>,
    ) -> Self {
        let id = Uuid::new_v4();
        let now = Utc::now();
        Self {
            id,
            user_id: setting.user_id,
            exchange: setting.exchange.clone(),
            setting_id: setting.id,
            address: setting.address.clone(),
            tag: setting.tag.clone(),
            currency_id: setting.currency_id.clone(),
            ticker: ticker.into(),
            chain: chain.into(),
            amount: Decimal::ZERO,
            fiat_amount: None,
            fee: None,
            internal_order_id: id.simple().to_string(),
            exchange_order_id: None,
            tx_hash: None,
            status: WithdrawalStatus::New,
            fail_reason: None,
            retry_reason: None,
            connection_hash,
            created_at: now,
            updated_at: now,
        }
    }

    /// 상태 전이. 같은 상태로의 전이는 무시합니다.
    pub fn transition(&mut self, next: WithdrawalStatus) -> SettleResult<()> {
        if self.status == next {
            return Ok(());
        }
        if !self.status.can_transition_to(next) {
            return Err(SettleError::InvalidTransition {
                from: self.status.to_string(),
                to: next.to_string(),
            });
        }
        self.status = next;
        self.updated_at = Utc::now();
        Ok(())
    }

    /// 거래소 접수: New → InProgress.
    pub fn mark_in_progress(
        &mut self,
        exchange_order_id: String,
        amount: Decimal,
        fee: Option<Decimal>,
        fiat_amount: Option<Decimal>,
        retry_reason: Option<String>,
    ) -> SettleResult<()> {
        if self.status != WithdrawalStatus::New {
            return Err(SettleError::InvalidTransition {
                from: self.status.to_string(),
                to: WithdrawalStatus::InProgress.to_string(),
            });
        }
        self.transition(WithdrawalStatus::InProgress)?;
        self.exchange_order_id = Some(exchange_order_id);
        self.amount = amount;
        self.fee = fee;
        self.fiat_amount = fiat_amount;
        self.retry_reason = retry_reason;
        Ok(())
    }

    /// 실패 처리.
    pub fn mark_failed(&mut self, reason: impl Into<String>) -> SettleResult<()> {
        self.transition(WithdrawalStatus::Failed)?;
        self.fail_reason = Some(reason.into());
        Ok(())
    }
}
