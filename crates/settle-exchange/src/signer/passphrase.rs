//! 방식 D: 패스프레이즈 포함 base64 HMAC-SHA256 (KuCoin, 키 버전 2).

use base64::Engine;
use settle_core::Credential;

use super::{hmac_sha256, SignContext, SignedParts, Signer, SigningStyle};
use crate::error::{ExchangeError, ExchangeResult};

const KEY_VERSION: &str = "2";

/// `timestamp + METHOD + path(?query) + body`를 서명하고,
/// 패스프레이즈도 같은 시크릿으로 HMAC 후 base64로 전달합니다.
pub struct PassphraseHmacSigner {
    credential: Credential,
    signed_passphrase: String,
}

impl PassphraseHmacSigner {
    /// 패스프레이즈가 없는 자격증명이면 `InvalidCredentials`.
    pub fn new(credential: Credential) -> ExchangeResult<Self> {
        let passphrase = credential
            .passphrase()
            .ok_or_else(|| ExchangeError::InvalidCredentials("패스프레이즈 없음".to_string()))?;
        let signed_passphrase = base64::engine::general_purpose::STANDARD
            .encode(hmac_sha256(credential.api_secret(), passphrase.as_bytes())?);

        Ok(Self {
            credential,
            signed_passphrase,
        })
    }
}

impl Signer for PassphraseHmacSigner {
    fn style(&self) -> SigningStyle {
        SigningStyle::PassphraseHmac
    }

    fn sign(&self, ctx: &SignContext<'_>) -> ExchangeResult<SignedParts> {
        let timestamp = ctx.timestamp_ms.to_string();
        let endpoint = if ctx.query.is_empty() {
            ctx.path.to_string()
        } else {
            format!("{}?{}", ctx.path, ctx.query)
        };
        let prehash = format!("{}{}{}{}", timestamp, ctx.method.as_str(), endpoint, ctx.body);
        let signature = base64::engine::general_purpose::STANDARD
            .encode(hmac_sha256(self.credential.api_secret(), prehash.as_bytes())?);

        Ok(SignedParts {
            query: ctx.query.to_string(),
            headers: vec![
                ("KC-API-KEY", self.credential.api_key().to_string()),
                ("KC-API-SIGN", signature),
                ("KC-API-TIMESTAMP", timestamp),
                ("KC-API-PASSPHRASE", self.signed_passphrase.clone()),
                ("KC-API-KEY-VERSION", KEY_VERSION.to_string()),
            ],
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::Method;

    fn signer() -> PassphraseHmacSigner {
        PassphraseHmacSigner::new(
            Credential::new("kucoin-key", "kucoin-secret").with_passphrase("kucoin-pass"),
        )
        .unwrap()
    }

    #[test]
    fn test_get_with_query() {
        let signed = signer()
            .sign(&SignContext {
                method: &Method::GET,
                path: "/api/v1/accounts",
                query: "type=trade",
                body: "",
                timestamp_ms: 1700000000000,
            })
            .unwrap();

        assert_eq!(signed.headers[1].1, "ewFSXDfsbaVXODyHAYRK6JmkqdNyS1CkSu71ZqaoGPM=");
        assert_eq!(signed.headers[3].1, "OplStk3M/IYYslJlMpTMb7auKQZQhD1g+JEQkER3KkA=");
        assert_eq!(signed.headers[4], ("KC-API-KEY-VERSION", "2".to_string()));
    }

    #[test]
    fn test_post_with_body() {
        let signed = signer()
            .sign(&SignContext {
                method: &Method::POST,
                path: "/api/v1/accounts/inner-transfer",
                query: "",
                body: r#"{"amount":"1"}"#,
                timestamp_ms: 1700000000000,
            })
            .unwrap();
        assert_eq!(signed.headers[1].1, "Es6PprVkNHUpRbqM5Jj0jyJ6bCaAnuFGxIoNE0FTzpM=");
    }

    #[test]
    fn test_missing_passphrase() {
        let result = PassphraseHmacSigner::new(Credential::new("k", "s"));
        assert!(matches!(result, Err(ExchangeError::InvalidCredentials(_))));
    }
}
