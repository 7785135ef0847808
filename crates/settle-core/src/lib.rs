//! # Settle Core
//!
//! 정산 거래소 연동 엔진의 핵심 도메인 모델과 공통 인프라를 제공합니다.
//!
//! - 잔고, 통화 매핑, 주문/출금 규칙
//! - 주문 및 출금 상태 머신 레코드
//! - 자격증명, 연결 해시, 자격증명 암호화
//! - 통화 환산 포트
//! - 설정 및 로깅

pub mod config;
pub mod converter;
pub mod credential;
pub mod crypto;
pub mod domain;
pub mod error;
pub mod logging;
pub mod types;

pub use config::*;
pub use converter::{ConversionError, CurrencyConverter, FixedRateConverter};
pub use credential::{ConnectionHash, Credential};
pub use crypto::{CredentialEncryptor, CryptoError, SealedCredential};
pub use domain::*;
pub use error::*;
pub use logging::*;
pub use types::*;
