//! 설정 관리.
//!
//! TOML 파일과 `SETTLE__` 접두사 환경 변수에서 설정을 로드합니다.
//! 모든 섹션에 기본값이 있으므로 `AppConfig::default()`만으로도 동작합니다.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

/// 애플리케이션 설정.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AppConfig {
    /// 로깅 설정
    pub logging: LoggingConfig,
    /// 엔진 주기/동시성 설정
    pub engine: EngineConfig,
    /// 출금 알고리즘 설정
    pub withdrawal: WithdrawalConfig,
    /// 보안 설정
    pub security: SecurityConfig,
    /// 기준 법정화폐
    pub fiat_currency: String,
    /// 거래소별 설정 (slug → 설정)
    pub exchanges: HashMap<String, ExchangeConfig>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            logging: LoggingConfig::default(),
            engine: EngineConfig::default(),
            withdrawal: WithdrawalConfig::default(),
            security: SecurityConfig::default(),
            fiat_currency: "USD".to_string(),
            exchanges: HashMap::new(),
        }
    }
}

/// 로깅 설정.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// 로그 레벨
    pub level: String,
    /// 로그 형식 (pretty, json, compact)
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "pretty".to_string(),
        }
    }
}

/// 엔진 설정.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct EngineConfig {
    /// 주문 스캔 간격 (초)
    pub order_scan_interval_secs: u64,
    /// 주문 상태 폴링 간격 (초)
    pub order_poll_interval_secs: u64,
    /// 출금 스캔 간격 (초)
    pub withdrawal_scan_interval_secs: u64,
    /// 출금 상태 폴링 간격 (초)
    pub withdrawal_poll_interval_secs: u64,
    /// 규칙 갱신 간격 (초)
    pub rule_refresh_interval_secs: u64,
    /// 규칙 캐시 TTL (초)
    pub rule_ttl_secs: u64,
    /// 틱당 동시에 처리할 최대 사용자 수
    pub max_concurrent_users: usize,
    /// 시작 지연 (초)
    pub startup_delay_secs: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            order_scan_interval_secs: 15,
            order_poll_interval_secs: 20,
            withdrawal_scan_interval_secs: 60,
            withdrawal_poll_interval_secs: 30,
            rule_refresh_interval_secs: 30 * 60,
            rule_ttl_secs: 30 * 60,
            max_concurrent_users: 16,
            startup_delay_secs: 0,
        }
    }
}

impl EngineConfig {
    pub fn order_scan_interval(&self) -> Duration {
        Duration::from_secs(self.order_scan_interval_secs.max(1))
    }

    pub fn order_poll_interval(&self) -> Duration {
        Duration::from_secs(self.order_poll_interval_secs.max(1))
    }

    pub fn withdrawal_scan_interval(&self) -> Duration {
        Duration::from_secs(self.withdrawal_scan_interval_secs.max(1))
    }

    pub fn withdrawal_poll_interval(&self) -> Duration {
        Duration::from_secs(self.withdrawal_poll_interval_secs.max(1))
    }

    pub fn rule_refresh_interval(&self) -> Duration {
        Duration::from_secs(self.rule_refresh_interval_secs.max(1))
    }

    pub fn rule_ttl(&self) -> Duration {
        Duration::from_secs(self.rule_ttl_secs)
    }

    pub fn startup_delay(&self) -> Duration {
        Duration::from_secs(self.startup_delay_secs)
    }
}

/// 출금 알고리즘 설정.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct WithdrawalConfig {
    /// 잔고 잠김 재시도 시 감액 단위 (step_currency 기준)
    pub step_amount: Decimal,
    /// 감액 단위 통화
    pub step_currency: String,
    /// 최소 입금액 합성 기준 (step_currency 기준)
    pub min_deposit_reference: Decimal,
}

impl Default for WithdrawalConfig {
    fn default() -> Self {
        Self {
            step_amount: Decimal::new(10, 0),
            step_currency: "USDT".to_string(),
            min_deposit_reference: Decimal::ONE,
        }
    }
}

/// 보안 설정.
#[derive(Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SecurityConfig {
    /// 연결 해시 솔트
    pub connection_hash_salt: String,
    /// 자격증명 마스터 키를 담은 환경 변수 이름
    pub master_key_env: String,
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            connection_hash_salt: "settle".to_string(),
            master_key_env: "SETTLE_MASTER_KEY".to_string(),
        }
    }
}

impl std::fmt::Debug for SecurityConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SecurityConfig")
            .field("connection_hash_salt", &"[REDACTED]")
            .field("master_key_env", &self.master_key_env)
            .finish()
    }
}

/// 거래소 설정.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ExchangeConfig {
    /// 이 거래소 활성화 여부
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// REST API 기본 URL (없으면 커넥터 기본값)
    #[serde(default)]
    pub base_url: Option<String>,
    /// 요청 타임아웃 (초)
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
    /// 서명 유효 시간 (밀리초)
    #[serde(default = "default_recv_window")]
    pub recv_window_ms: u64,
    /// 공개 클라이언트 허용 여부
    #[serde(default = "default_true")]
    pub public_client: bool,
}

impl Default for ExchangeConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            base_url: None,
            timeout_secs: default_timeout(),
            recv_window_ms: default_recv_window(),
            public_client: true,
        }
    }
}

fn default_true() -> bool {
    true
}
fn default_timeout() -> u64 {
    10
}
fn default_recv_window() -> u64 {
    5000
}

impl AppConfig {
    /// 파일과 환경 변수에서 설정을 로드합니다.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, config::ConfigError> {
        let builder = config::Config::builder()
            .add_source(config::File::from(path.as_ref()).required(false))
            .add_source(
                config::Environment::with_prefix("SETTLE")
                    .separator("__")
                    .try_parsing(true),
            );

        builder.build()?.try_deserialize()
    }

    /// 기본 경로에서 설정을 로드합니다.
    pub fn load_default() -> Result<Self, config::ConfigError> {
        Self::load("config/settle.toml")
    }

    /// 거래소 설정 (없으면 기본값).
    pub fn exchange(&self, slug: &str) -> ExchangeConfig {
        self.exchanges.get(slug).cloned().unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = AppConfig::default();
        assert_eq!(config.fiat_currency, "USD");
        assert_eq!(config.engine.rule_ttl(), Duration::from_secs(1800));
        assert_eq!(config.engine.max_concurrent_users, 16);
        assert_eq!(config.withdrawal.step_amount, dec!(10));
        assert!(config.exchange("binance").enabled);
    }

    #[test]
    fn test_load_from_file_with_partial_sections() {
        let path =
            std::env::temp_dir().join(format!("settle-config-{}.toml", uuid::Uuid::new_v4()));
        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(
            file,
            r#"
fiat_currency = "EUR"

[engine]
withdrawal_scan_interval_secs = 120

[exchanges.kucoin]
base_url = "http://localhost:9999"
public_client = false
"#
        )
        .unwrap();

        let config = AppConfig::load(&path).unwrap();
        std::fs::remove_file(&path).ok();

        assert_eq!(config.fiat_currency, "EUR");
        assert_eq!(config.engine.withdrawal_scan_interval_secs, 120);
        assert_eq!(config.engine.order_scan_interval_secs, 15);

        let kucoin = config.exchange("kucoin");
        assert_eq!(kucoin.base_url.as_deref(), Some("http://localhost:9999"));
        assert!(!kucoin.public_client);
        assert_eq!(kucoin.recv_window_ms, 5000);
    }

    #[test]
    fn test_security_debug_is_masked() {
        let security = SecurityConfig {
            connection_hash_salt: "pepper".to_string(),
            ..Default::default()
        };
        assert!(!format!("{:?}", security).contains("pepper"));
    }
}
