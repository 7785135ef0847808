//! 엔진 에러 타입.

use settle_core::{CryptoError, SettleError};
use settle_exchange::{ErrorKind, ExchangeError};
use thiserror::Error;
use uuid::Uuid;

/// 저장소 에러.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RepositoryError {
    /// 레코드 없음
    #[error("레코드 없음: {0}")]
    NotFound(String),

    /// 유일성 제약 위반 (예: 진행 중인 출금 중복)
    #[error("제약 위반: {0}")]
    Conflict(String),

    /// 저장소 자체 에러
    #[error("저장소 에러: {0}")]
    Storage(String),
}

pub type RepositoryResult<T> = Result<T, RepositoryError>;

/// 엔진 에러.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Exchange(#[from] ExchangeError),

    #[error(transparent)]
    Repository(#[from] RepositoryError),

    #[error("자격증명 복호화 실패: {0}")]
    Crypto(#[from] CryptoError),

    #[error(transparent)]
    Settle(#[from] SettleError),

    /// 등록되지 않은 거래소
    #[error("알 수 없는 거래소: {0}")]
    UnknownExchange(String),

    /// 설정에서 비활성화된 거래소
    #[error("비활성화된 거래소: {0}")]
    ExchangeDisabled(String),

    /// 공개 클라이언트를 지원하지 않는 거래소
    #[error("공개 클라이언트 미지원: {0}")]
    PublicClientUnavailable(String),

    /// 저장된 자격증명 없음
    #[error("자격증명 없음: user={user_id} exchange={exchange}")]
    CredentialNotFound { user_id: Uuid, exchange: String },

    /// 내부 통화 ID에 대한 거래소 매핑 없음
    #[error("통화 매핑 없음: exchange={exchange} currency={currency_id}")]
    CurrencyNotMapped { exchange: String, currency_id: String },

    /// 같은 (user, exchange)에 진행 중인 출금 존재
    #[error("진행 중인 출금 존재: user={user_id} exchange={exchange}")]
    WithdrawalPending { user_id: Uuid, exchange: String },

    /// 잔고가 최소 출금 기준 미만
    #[error("출금 기준 미달: 잔고 {balance} < 기준 {threshold}")]
    ThresholdNotMet {
        balance: rust_decimal::Decimal,
        threshold: rust_decimal::Decimal,
    },
}

impl EngineError {
    /// 거래소 에러라면 그 분류를 반환합니다.
    pub fn exchange_kind(&self) -> Option<ErrorKind> {
        match self {
            EngineError::Exchange(e) => Some(e.kind()),
            _ => None,
        }
    }

    /// 현재 주기만 건너뛰면 되는 에러인지 확인합니다.
    pub fn is_cycle_local(&self) -> bool {
        match self {
            EngineError::Exchange(e) => e.is_cycle_local(),
            EngineError::WithdrawalPending { .. } | EngineError::ThresholdNotMet { .. } => true,
            _ => false,
        }
    }
}

pub type EngineResult<T> = Result<T, EngineError>;

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_cycle_local_classification() {
        let pending = EngineError::WithdrawalPending {
            user_id: Uuid::nil(),
            exchange: "binance".to_string(),
        };
        assert!(pending.is_cycle_local());

        let threshold = EngineError::ThresholdNotMet {
            balance: dec!(1),
            threshold: dec!(10),
        };
        assert!(threshold.is_cycle_local());

        let network: EngineError = ExchangeError::Network("reset".to_string()).into();
        assert!(network.is_cycle_local());
        assert_eq!(network.exchange_kind(), Some(ErrorKind::TransientNetwork));

        let creds: EngineError = ExchangeError::InvalidCredentials("bad".to_string()).into();
        assert!(!creds.is_cycle_local());

        let unknown = EngineError::UnknownExchange("ftx".to_string());
        assert!(!unknown.is_cycle_local());
        assert_eq!(unknown.exchange_kind(), None);
    }
}
