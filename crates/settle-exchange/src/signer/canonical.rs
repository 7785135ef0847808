//! 방식 C: 정규 문자열 HMAC-SHA512 (Gate.io v4).

use settle_core::Credential;
use sha2::{Digest, Sha512};

use super::{hmac_sha512, SignContext, SignedParts, Signer, SigningStyle};
use crate::error::ExchangeResult;

/// `METHOD\nPATH\nQUERY\nhex(SHA512(body))\nTIMESTAMP`를 HMAC-SHA512로 서명합니다.
/// 타임스탬프는 초 단위입니다.
pub struct CanonicalSha512Signer {
    credential: Credential,
}

impl CanonicalSha512Signer {
    pub fn new(credential: Credential) -> Self {
        Self { credential }
    }

    fn canonical(ctx: &SignContext<'_>, timestamp: &str) -> String {
        let body_hash = hex::encode(Sha512::digest(ctx.body.as_bytes()));
        format!(
            "{}\n{}\n{}\n{}\n{}",
            ctx.method.as_str(),
            ctx.path,
            ctx.query,
            body_hash,
            timestamp
        )
    }
}

impl Signer for CanonicalSha512Signer {
    fn style(&self) -> SigningStyle {
        SigningStyle::CanonicalSha512
    }

    fn sign(&self, ctx: &SignContext<'_>) -> ExchangeResult<SignedParts> {
        let timestamp = (ctx.timestamp_ms / 1000).to_string();
        let canonical = Self::canonical(ctx, &timestamp);
        let digest = hmac_sha512(self.credential.api_secret(), canonical.as_bytes())?;
        let signature = hex::encode(digest);

        Ok(SignedParts {
            query: ctx.query.to_string(),
            headers: vec![
                ("KEY", self.credential.api_key().to_string()),
                ("Timestamp", timestamp),
                ("SIGN", signature),
            ],
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::Method;

    #[test]
    fn test_known_vector() {
        let signer = CanonicalSha512Signer::new(Credential::new("gate-key", "gate-secret"));
        let ctx = SignContext {
            method: &Method::GET,
            path: "/api/v4/spot/accounts",
            query: "currency=BTC",
            body: "",
            timestamp_ms: 1_700_000_000_123,
        };

        let canonical = CanonicalSha512Signer::canonical(&ctx, "1700000000");
        assert!(canonical.contains(
            "cf83e1357eefb8bdf1542850d66d8007d620e4050b5715dc83f4a921d36ce9ce47d0d13c5d85f2b0ff8318d2877eec2f63b931bd47417a81a538327af927da3e"
        ));

        let signed = signer.sign(&ctx).unwrap();
        assert_eq!(signed.headers[1], ("Timestamp", "1700000000".to_string()));
        assert_eq!(
            signed.headers[2].1,
            "dd04251abeeb8bff3d2b1ebebba91c2f70cf7b2dd891023323fce74d341a3182fe167ce75ce39594fbaa932f23279989a0f61625b9c005ab0e69fbcaad1c806f"
        );
    }
}
