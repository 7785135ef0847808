//! 요청 서명.
//!
//! 거래소마다 서명 방식이 다르지만 어댑터는 `Signer` 트레이트 하나만
//! 사용합니다. 서명은 타임스탬프가 주어지면 결정적이므로 알려진 벡터로
//! 검증할 수 있습니다.
//!
//! | 방식 | 구현 | 서명 대상 |
//! |---|---|---|
//! | A | [`QueryHmacSigner`] | 쿼리 + `recvWindow` + `timestamp` |
//! | B | [`HeaderHmacSigner`] | `timestamp + apiKey + recvWindow + payload` |
//! | C | [`CanonicalSha512Signer`] | `METHOD\nPATH\nQUERY\nSHA512(body)\nTIMESTAMP` |
//! | D | [`PassphraseHmacSigner`] | `timestamp + METHOD + path + body` |

mod canonical;
mod header;
mod passphrase;
mod query;

pub use canonical::CanonicalSha512Signer;
pub use header::HeaderHmacSigner;
pub use passphrase::PassphraseHmacSigner;
pub use query::QueryHmacSigner;

use hmac::{Hmac, Mac};
use reqwest::Method;
use sha2::{Sha256, Sha512};

use crate::error::{ExchangeError, ExchangeResult};

type HmacSha256 = Hmac<Sha256>;
type HmacSha512 = Hmac<Sha512>;

/// 서명 방식.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SigningStyle {
    /// 쿼리 파라미터 HMAC-SHA256
    QueryHmac,
    /// 헤더 HMAC-SHA256
    HeaderHmac,
    /// 정규 문자열 HMAC-SHA512
    CanonicalSha512,
    /// 패스프레이즈 포함 base64 HMAC-SHA256
    PassphraseHmac,
}

/// 서명 입력.
#[derive(Debug, Clone)]
pub struct SignContext<'a> {
    pub method: &'a Method,
    /// 요청 경로 (예: "/api/v3/account")
    pub path: &'a str,
    /// 인코딩된 쿼리 문자열 (`?` 제외, 비어 있을 수 있음)
    pub query: &'a str,
    /// 요청 본문 (없으면 빈 문자열)
    pub body: &'a str,
    /// 밀리초 타임스탬프
    pub timestamp_ms: u64,
}

/// 서명 결과.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SignedParts {
    /// 최종 쿼리 문자열 (서명 파라미터 포함 가능)
    pub query: String,
    /// 추가할 헤더
    pub headers: Vec<(&'static str, String)>,
}

/// 요청 서명기.
pub trait Signer: Send + Sync {
    fn style(&self) -> SigningStyle;

    /// 요청에 서명합니다.
    fn sign(&self, ctx: &SignContext<'_>) -> ExchangeResult<SignedParts>;
}

fn hmac_sha256(secret: &str, message: &[u8]) -> ExchangeResult<Vec<u8>> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|e| ExchangeError::InvalidCredentials(format!("HMAC 키 오류: {}", e)))?;
    mac.update(message);
    Ok(mac.finalize().into_bytes().to_vec())
}

fn hmac_sha512(secret: &str, message: &[u8]) -> ExchangeResult<Vec<u8>> {
    let mut mac = HmacSha512::new_from_slice(secret.as_bytes())
        .map_err(|e| ExchangeError::InvalidCredentials(format!("HMAC 키 오류: {}", e)))?;
    mac.update(message);
    Ok(mac.finalize().into_bytes().to_vec())
}
