//! 방식 A: 쿼리 파라미터 HMAC-SHA256 (Binance).

use settle_core::Credential;

use super::{hmac_sha256, SignContext, SignedParts, Signer, SigningStyle};
use crate::error::ExchangeResult;

/// 쿼리 문자열 끝에 `recvWindow`, `timestamp`를 붙이고 전체를 서명합니다.
/// API 키는 `X-MBX-APIKEY` 헤더로 전달합니다.
pub struct QueryHmacSigner {
    credential: Credential,
    recv_window_ms: u64,
}

impl QueryHmacSigner {
    pub fn new(credential: Credential, recv_window_ms: u64) -> Self {
        Self {
            credential,
            recv_window_ms,
        }
    }
}

impl Signer for QueryHmacSigner {
    fn style(&self) -> SigningStyle {
        SigningStyle::QueryHmac
    }

    fn sign(&self, ctx: &SignContext<'_>) -> ExchangeResult<SignedParts> {
        let auth = format!(
            "recvWindow={}&timestamp={}",
            self.recv_window_ms, ctx.timestamp_ms
        );
        let mut payload = if ctx.query.is_empty() {
            auth
        } else {
            format!("{}&{}", ctx.query, auth)
        };
        // POST 본문이 폼 인코딩인 경우 함께 서명
        if !ctx.body.is_empty() {
            payload = format!("{}&{}", payload, ctx.body);
        }

        let signature = hex::encode(hmac_sha256(self.credential.api_secret(), payload.as_bytes())?);

        Ok(SignedParts {
            query: format!("{}&signature={}", payload, signature),
            headers: vec![("X-MBX-APIKEY", self.credential.api_key().to_string())],
        })
    }
}
