//! 거래소 에러 타입과 정규화된 에러 분류.
//!
//! 거래소별 에러 코드는 각 커넥터의 `ErrorDecoder`가 `ExchangeError`로
//! 변환합니다. 엔진은 메시지 문자열이 아니라 `ExchangeError::kind()`만 보고
//! 분기합니다.

use settle_core::ConversionError;
use thiserror::Error;

/// 정규화된 에러 분류.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    InvalidCredentials,
    InvalidIPWhitelist,
    IncorrectPermissions,
    RateLimited,
    InsufficientBalance,
    SymbolTradingHalted,
    WithdrawalBalanceLocked,
    MinWithdrawalNotMet,
    WithdrawalAddressNotWhitelisted,
    /// 보안 이벤트 이후 거래소 측 일시 잠금
    SecurityActionLock,
    /// 명시적인 건너뛰기 신호 (에러 아님)
    SkipCycle,
    /// 연결 재설정/타임아웃/거부 등
    TransientNetwork,
    Unknown,
}

impl ErrorKind {
    /// 현재 사이클만 종료하고 레코드를 변경하지 않는 분류.
    pub fn is_cycle_local(&self) -> bool {
        matches!(
            self,
            ErrorKind::TransientNetwork
                | ErrorKind::RateLimited
                | ErrorKind::SkipCycle
                | ErrorKind::InsufficientBalance
                | ErrorKind::SymbolTradingHalted
        )
    }

    /// 연결 수준 에러 (자격증명, IP, 권한, 네트워크).
    pub fn is_connection_level(&self) -> bool {
        matches!(
            self,
            ErrorKind::InvalidCredentials
                | ErrorKind::InvalidIPWhitelist
                | ErrorKind::IncorrectPermissions
                | ErrorKind::TransientNetwork
                | ErrorKind::RateLimited
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::InvalidCredentials => "invalid_credentials",
            ErrorKind::InvalidIPWhitelist => "invalid_ip_whitelist",
            ErrorKind::IncorrectPermissions => "incorrect_permissions",
            ErrorKind::RateLimited => "rate_limited",
            ErrorKind::InsufficientBalance => "insufficient_balance",
            ErrorKind::SymbolTradingHalted => "symbol_trading_halted",
            ErrorKind::WithdrawalBalanceLocked => "withdrawal_balance_locked",
            ErrorKind::MinWithdrawalNotMet => "min_withdrawal_not_met",
            ErrorKind::WithdrawalAddressNotWhitelisted => "withdrawal_address_not_whitelisted",
            ErrorKind::SecurityActionLock => "security_action_lock",
            ErrorKind::SkipCycle => "skip_cycle",
            ErrorKind::TransientNetwork => "transient_network",
            ErrorKind::Unknown => "unknown",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 거래소 관련 에러.
#[derive(Debug, Error)]
pub enum ExchangeError {
    /// 잘못된 API 키/시크릿
    #[error("자격증명 오류: {0}")]
    InvalidCredentials(String),

    /// 허용되지 않은 IP
    #[error("IP 화이트리스트 오류: {0}")]
    InvalidIpWhitelist(String),

    /// API 키 권한 부족
    #[error("권한 부족: {0}")]
    IncorrectPermissions(String),

    /// 요청 한도 초과
    #[error("요청 한도 초과: {0}")]
    RateLimited(String),

    /// 잔고 부족
    #[error("잔고 부족: {0}")]
    InsufficientBalance(String),

    /// 거래 중지된 심볼
    #[error("거래 중지: {0}")]
    SymbolTradingHalted(String),

    /// 입금 미확정 등으로 출금 잔고가 잠김
    #[error("출금 잔고 잠김: {0}")]
    WithdrawalBalanceLocked(String),

    /// 최소 출금액 미달
    #[error("최소 출금액 미달: {0}")]
    MinWithdrawalNotMet(String),

    /// 출금 주소가 화이트리스트에 없음
    #[error("출금 주소 미등록: {0}")]
    WithdrawalAddressNotWhitelisted(String),

    /// 보안 조치로 인한 일시 잠금
    #[error("보안 잠금: {0}")]
    SecurityActionLock(String),

    /// 이번 사이클 건너뛰기
    #[error("사이클 건너뜀: {0}")]
    SkipCycle(String),

    /// 입금/출금이 일시 중지된 체인
    #[error("체인 중지: {0}")]
    ChainSuspended(String),

    /// 네트워크/연결 에러
    #[error("네트워크 에러: {0}")]
    Network(String),

    /// 요청 타임아웃
    #[error("요청 타임아웃: {0}")]
    Timeout(String),

    /// 요청 대기 중 취소됨
    #[error("요청 취소됨")]
    Cancelled,

    /// 매핑되지 않은 거래소 에러 코드
    #[error("거래소 에러 {code}: {message}")]
    Exchange { code: String, message: String },

    /// 심볼/통화/주문을 찾을 수 없음
    #[error("찾을 수 없음: {0}")]
    NotFound(String),

    /// 응답 파싱 에러
    #[error("파싱 에러: {0}")]
    Parse(String),

    /// 환산 에러
    #[error("환산 에러: {0}")]
    Conversion(#[from] ConversionError),

    /// 지원되지 않는 작업
    #[error("지원되지 않음: {0}")]
    NotSupported(String),
}

/// 거래소 작업을 위한 Result 타입.
pub type ExchangeResult<T> = Result<T, ExchangeError>;

impl ExchangeError {
    /// 정규화된 분류.
    pub fn kind(&self) -> ErrorKind {
        match self {
            ExchangeError::InvalidCredentials(_) => ErrorKind::InvalidCredentials,
            ExchangeError::InvalidIpWhitelist(_) => ErrorKind::InvalidIPWhitelist,
            ExchangeError::IncorrectPermissions(_) => ErrorKind::IncorrectPermissions,
            ExchangeError::RateLimited(_) => ErrorKind::RateLimited,
            ExchangeError::InsufficientBalance(_) => ErrorKind::InsufficientBalance,
            ExchangeError::SymbolTradingHalted(_) => ErrorKind::SymbolTradingHalted,
            ExchangeError::WithdrawalBalanceLocked(_) => ErrorKind::WithdrawalBalanceLocked,
            ExchangeError::MinWithdrawalNotMet(_) => ErrorKind::MinWithdrawalNotMet,
            ExchangeError::WithdrawalAddressNotWhitelisted(_) => {
                ErrorKind::WithdrawalAddressNotWhitelisted
            }
            ExchangeError::SecurityActionLock(_) => ErrorKind::SecurityActionLock,
            ExchangeError::SkipCycle(_) | ExchangeError::ChainSuspended(_) => ErrorKind::SkipCycle,
            ExchangeError::Network(_) | ExchangeError::Timeout(_) | ExchangeError::Cancelled => {
                ErrorKind::TransientNetwork
            }
            ExchangeError::Exchange { .. }
            | ExchangeError::NotFound(_)
            | ExchangeError::Parse(_)
            | ExchangeError::Conversion(_)
            | ExchangeError::NotSupported(_) => ErrorKind::Unknown,
        }
    }

    /// 현재 사이클만 종료하는 에러인지 확인.
    pub fn is_cycle_local(&self) -> bool {
        self.kind().is_cycle_local()
    }

    /// 연결 수준 에러인지 확인.
    pub fn is_connection_level(&self) -> bool {
        self.kind().is_connection_level()
    }

    /// 재시도 가능한 에러인지 확인.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self.kind(),
            ErrorKind::TransientNetwork | ErrorKind::RateLimited | ErrorKind::SkipCycle
        )
    }
}

impl From<reqwest::Error> for ExchangeError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            ExchangeError::Timeout(err.to_string())
        } else if err.is_connect() || err.is_request() || err.is_body() {
            ExchangeError::Network(err.to_string())
        } else if err.is_decode() {
            ExchangeError::Parse(err.to_string())
        } else {
            ExchangeError::Network(err.to_string())
        }
    }
}

impl From<serde_json::Error> for ExchangeError {
    fn from(err: serde_json::Error) -> Self {
        ExchangeError::Parse(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cancelled_is_retryable_network() {
        let err = ExchangeError::Cancelled;
        assert_eq!(err.kind(), ErrorKind::TransientNetwork);
        assert!(err.is_retryable());
        assert!(err.is_cycle_local());
    }

    #[test]
    fn test_business_errors_are_cycle_local() {
        assert!(ExchangeError::InsufficientBalance("x".into()).is_cycle_local());
        assert!(ExchangeError::SymbolTradingHalted("x".into()).is_cycle_local());
        assert!(ExchangeError::ChainSuspended("TRX".into()).is_cycle_local());
        assert!(!ExchangeError::WithdrawalBalanceLocked("x".into()).is_cycle_local());
    }

    #[test]
    fn test_unmapped_code_is_unknown() {
        let err = ExchangeError::Exchange {
            code: "-9999".to_string(),
            message: "weird".to_string(),
        };
        assert_eq!(err.kind(), ErrorKind::Unknown);
        assert_eq!(err.to_string(), "거래소 에러 -9999: weird");
        assert!(!err.is_connection_level());
    }

    #[test]
    fn test_credential_errors_are_connection_level() {
        assert!(ExchangeError::InvalidCredentials("k".into()).is_connection_level());
        assert!(ExchangeError::InvalidIpWhitelist("ip".into()).is_connection_level());
        assert!(!ExchangeError::InvalidCredentials("k".into()).is_cycle_local());
    }
}
