//! tracing 기반 로깅 초기화.
//!
//! 출력 형식:
//! - **pretty**: 개발용
//! - **json**: 운영 로그 수집용
//! - **compact**: 한 줄 형식

use tracing_subscriber::{
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter, Layer, Registry,
};

use crate::config::LoggingConfig;

/// 로그 출력 형식.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
    Compact,
}

impl std::str::FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "pretty" => Ok(Self::Pretty),
            "json" => Ok(Self::Json),
            "compact" => Ok(Self::Compact),
            other => Err(format!("알 수 없는 로그 형식: {}", other)),
        }
    }
}

/// 로깅 설정.
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// 필터 지시문 (예: "info", "settle_engine=debug")
    pub level: String,
    pub format: LogFormat,
    /// span 진입/종료 이벤트 출력 여부
    pub with_span_events: bool,
    /// 파일명과 줄 번호 출력 여부
    pub with_file: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Pretty,
            with_span_events: false,
            with_file: false,
        }
    }
}

impl LogConfig {
    pub fn new(level: impl Into<String>) -> Self {
        Self {
            level: level.into(),
            ..Default::default()
        }
    }

    pub fn with_format(mut self, format: LogFormat) -> Self {
        self.format = format;
        self
    }

    pub fn with_span_events(mut self, enabled: bool) -> Self {
        self.with_span_events = enabled;
        self
    }

    /// `RUST_LOG`와 `LOG_FORMAT` 환경 변수에서 생성.
    pub fn from_env() -> Self {
        let level = std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string());
        let format = std::env::var("LOG_FORMAT")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or_default();

        Self {
            level,
            format,
            ..Default::default()
        }
    }
}

impl From<&LoggingConfig> for LogConfig {
    fn from(config: &LoggingConfig) -> Self {
        Self {
            level: config.level.clone(),
            format: config.format.parse().unwrap_or_default(),
            ..Default::default()
        }
    }
}

/// 형식별 fmt 레이어.
fn fmt_layer(config: &LogConfig) -> Box<dyn Layer<Registry> + Send + Sync> {
    let span_events = if config.with_span_events {
        FmtSpan::NEW | FmtSpan::CLOSE
    } else {
        FmtSpan::NONE
    };

    let base = fmt::layer()
        .with_file(config.with_file)
        .with_line_number(config.with_file)
        .with_span_events(span_events);

    match config.format {
        LogFormat::Pretty => base.pretty().boxed(),
        LogFormat::Json => base.json().with_current_span(true).boxed(),
        LogFormat::Compact => base.compact().boxed(),
    }
}

/// 로깅 시스템을 초기화합니다. `RUST_LOG`가 설정되어 있으면 우선합니다.
///
/// ```no_run
/// use settle_core::logging::{init_logging, LogConfig, LogFormat};
///
/// init_logging(LogConfig::new("debug").with_format(LogFormat::Json)).unwrap();
/// ```
pub fn init_logging(config: LogConfig) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let filter = EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new(&config.level))?;

    tracing_subscriber::registry()
        .with(fmt_layer(&config))
        .with(filter)
        .try_init()?;

    tracing::info!(format = ?config.format, level = %config.level, "로깅 초기화 완료");
    Ok(())
}

/// 환경 변수에서 로깅을 초기화합니다.
pub fn init_logging_from_env() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    init_logging(LogConfig::from_env())
}

/// 엔진 작업 단위 span. 사용자/거래소 컨텍스트를 공통 필드로 붙입니다.
#[macro_export]
macro_rules! engine_span {
    ($name:expr, $user_id:expr, $exchange:expr) => {
        tracing::info_span!($name, user_id = %$user_id, exchange = %$exchange)
    };
    ($name:expr, $user_id:expr, $exchange:expr, $record_id:expr) => {
        tracing::info_span!(
            $name,
            user_id = %$user_id,
            exchange = %$exchange,
            record_id = %$record_id
        )
    };
}
