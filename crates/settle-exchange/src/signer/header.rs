//! 방식 B: 헤더 HMAC-SHA256 (Bybit v5).

use reqwest::Method;
use settle_core::Credential;

use super::{hmac_sha256, SignContext, SignedParts, Signer, SigningStyle};
use crate::error::ExchangeResult;

/// 서명 타입 고정값 (HMAC).
const SIGN_TYPE: &str = "2";

/// `timestamp + apiKey + recvWindow + payload`를 서명합니다.
/// payload는 GET이면 쿼리 문자열, 그 외에는 JSON 본문입니다.
pub struct HeaderHmacSigner {
    credential: Credential,
    recv_window_ms: u64,
}

impl HeaderHmacSigner {
    pub fn new(credential: Credential, recv_window_ms: u64) -> Self {
        Self {
            credential,
            recv_window_ms,
        }
    }
}

impl Signer for HeaderHmacSigner {
    fn style(&self) -> SigningStyle {
        SigningStyle::HeaderHmac
    }

    fn sign(&self, ctx: &SignContext<'_>) -> ExchangeResult<SignedParts> {
        let payload = if *ctx.method == Method::GET {
            ctx.query
        } else {
            ctx.body
        };
        let timestamp = ctx.timestamp_ms.to_string();
        let recv_window = self.recv_window_ms.to_string();
        let prehash = format!(
            "{}{}{}{}",
            timestamp,
            self.credential.api_key(),
            recv_window,
            payload
        );
        let signature = hex::encode(hmac_sha256(self.credential.api_secret(), prehash.as_bytes())?);

        Ok(SignedParts {
            query: ctx.query.to_string(),
            headers: vec![
                ("X-BAPI-API-KEY", self.credential.api_key().to_string()),
                ("X-BAPI-TIMESTAMP", timestamp),
                ("X-BAPI-RECV-WINDOW", recv_window),
                ("X-BAPI-SIGN", signature),
                ("X-BAPI-SIGN-TYPE", SIGN_TYPE.to_string()),
            ],
        })
    }
}
