//! 거래소 API 자격증명과 연결 해시.
//!
//! 비밀값은 `SecretString`으로 보관하며 `Debug` 출력 시 마스킹됩니다.
//! 연결 해시는 비밀값을 저장하지 않고 "어떤 키가 이 결과를 만들었는지"를
//! 추적하기 위한 파생 식별자입니다.

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

/// 사용자별/거래소별 API 자격증명.
pub struct Credential {
    api_key: SecretString,
    api_secret: SecretString,
    passphrase: Option<SecretString>,
}

impl Credential {
    pub fn new(api_key: impl Into<String>, api_secret: impl Into<String>) -> Self {
        Self {
            api_key: SecretString::from(api_key.into()),
            api_secret: SecretString::from(api_secret.into()),
            passphrase: None,
        }
    }

    pub fn with_passphrase(mut self, passphrase: impl Into<String>) -> Self {
        self.passphrase = Some(SecretString::from(passphrase.into()));
        self
    }

    pub fn api_key(&self) -> &str {
        self.api_key.expose_secret()
    }

    pub fn api_secret(&self) -> &str {
        self.api_secret.expose_secret()
    }

    pub fn passphrase(&self) -> Option<&str> {
        self.passphrase.as_ref().map(|p| p.expose_secret())
    }

    /// 저장용 평문 페이로드로 변환 (암호화 직전에만 사용).
    pub(crate) fn to_payload(&self) -> CredentialPayload {
        CredentialPayload {
            api_key: self.api_key().to_string(),
            api_secret: self.api_secret().to_string(),
            passphrase: self.passphrase().map(str::to_string),
        }
    }
}

impl Clone for Credential {
    fn clone(&self) -> Self {
        let cloned = Self::new(self.api_key(), self.api_secret());
        match self.passphrase() {
            Some(p) => cloned.with_passphrase(p),
            None => cloned,
        }
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let key = self.api_key();
        let masked = if key.is_ascii() && key.len() > 8 {
            format!("{}...{}", &key[..4], &key[key.len() - 4..])
        } else {
            "***".to_string()
        };
        f.debug_struct("Credential")
            .field("api_key", &masked)
            .field("api_secret", &"[REDACTED]")
            .field("passphrase", &self.passphrase.as_ref().map(|_| "[REDACTED]"))
            .finish()
    }
}

/// 암호화 저장용 직렬화 형태.
#[derive(Serialize, Deserialize)]
pub(crate) struct CredentialPayload {
    pub api_key: String,
    pub api_secret: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub passphrase: Option<String>,
}

impl From<CredentialPayload> for Credential {
    fn from(payload: CredentialPayload) -> Self {
        let credential = Credential::new(payload.api_key, payload.api_secret);
        match payload.passphrase {
            Some(p) => credential.with_passphrase(p),
            None => credential,
        }
    }
}

/// 자격증명에서 파생된 비밀이 아닌 식별자.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ConnectionHash(String);

impl ConnectionHash {
    /// `salt | slug | key | secret | passphrase`의 SHA-256 hex.
    pub fn derive(salt: &str, slug: &str, credential: &Credential) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(salt.as_bytes());
        hasher.update(b"|");
        hasher.update(slug.as_bytes());
        hasher.update(b"|");
        hasher.update(credential.api_key().as_bytes());
        hasher.update(b"|");
        hasher.update(credential.api_secret().as_bytes());
        hasher.update(b"|");
        hasher.update(credential.passphrase().unwrap_or_default().as_bytes());
        Self(hex::encode(hasher.finalize()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ConnectionHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_debug_masks_secrets() {
        let credential = Credential::new("abcd1234efgh5678", "super-secret").with_passphrase("pw");
        let debug = format!("{:?}", credential);
        assert!(debug.contains("abcd...5678"));
        assert!(!debug.contains("super-secret"));
        assert!(!debug.contains("\"pw\""));
    }

    #[test]
    fn test_connection_hash_is_stable_and_key_sensitive() {
        let a = Credential::new("key", "secret");
        let b = Credential::new("key", "secret");
        let rotated = Credential::new("key", "secret-2");

        let h1 = ConnectionHash::derive("salt", "binance", &a);
        let h2 = ConnectionHash::derive("salt", "binance", &b);
        assert_eq!(h1, h2);
        assert_eq!(h1.as_str().len(), 64);

        assert_ne!(h1, ConnectionHash::derive("salt", "binance", &rotated));
        assert_ne!(h1, ConnectionHash::derive("salt", "bybit", &a));
        assert_ne!(h1, ConnectionHash::derive("other", "binance", &a));
    }

    #[test]
    fn test_passphrase_changes_hash() {
        let plain = Credential::new("key", "secret");
        let with_pass = plain.clone().with_passphrase("pass");
        assert_ne!(
            ConnectionHash::derive("s", "kucoin", &plain),
            ConnectionHash::derive("s", "kucoin", &with_pass)
        );
    }
}
