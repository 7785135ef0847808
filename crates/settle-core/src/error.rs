//! 정산 시스템 공통 에러 타입.
//!
//! 거래소 계층과 엔진 계층이 함께 사용하는 기본 에러를 정의합니다.
//! 거래소별 세부 에러는 `settle-exchange`의 `ExchangeError`가 담당합니다.

use thiserror::Error;

/// 핵심 정산 에러.
#[derive(Debug, Error)]
pub enum SettleError {
    /// 설정 에러
    #[error("설정 에러: {0}")]
    Config(String),

    /// 알 수 없는 통화/체인 매핑
    #[error("통화 매핑 없음: {0}")]
    CurrencyMapping(String),

    /// 정밀도/수량 계산 에러
    #[error("수량 계산 에러: {0}")]
    Amount(String),

    /// 상태 전이 에러
    #[error("잘못된 상태 전이: {from} -> {to}")]
    InvalidTransition { from: String, to: String },

    /// 직렬화 에러
    #[error("직렬화 에러: {0}")]
    Serialization(String),

    /// 잘못된 입력
    #[error("잘못된 입력: {0}")]
    InvalidInput(String),
}

/// 정산 작업을 위한 Result 타입.
pub type SettleResult<T> = Result<T, SettleError>;

impl From<serde_json::Error> for SettleError {
    fn from(err: serde_json::Error) -> Self {
        SettleError::Serialization(err.to_string())
    }
}

impl From<config::ConfigError> for SettleError {
    fn from(err: config::ConfigError) -> Self {
        SettleError::Config(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transition_message() {
        let err = SettleError::InvalidTransition {
            from: "completed".to_string(),
            to: "in_progress".to_string(),
        };
        assert_eq!(err.to_string(), "잘못된 상태 전이: completed -> in_progress");
    }

    #[test]
    fn test_from_json_error() {
        let json_err = serde_json::from_str::<u32>("not-a-number").unwrap_err();
        let err: SettleError = json_err.into();
        assert!(matches!(err, SettleError::Serialization(_)));
    }
}
