//! # 자격증명 암호화
//!
//! 저장소에 보관되는 거래소 자격증명을 AES-256-GCM으로 봉인/개봉합니다.
//!
//! - 마스터 키는 base64로 인코딩된 32바이트 값이며 환경변수에서 로드합니다.
//! - 봉인할 때마다 새 12바이트 nonce를 생성해 암호문과 함께 저장합니다.

use aes_gcm::{
    aead::{Aead, KeyInit, OsRng},
    Aes256Gcm, Nonce,
};
use base64::Engine;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::credential::{Credential, CredentialPayload};

/// 암호화 에러
#[derive(Error, Debug)]
pub enum CryptoError {
    #[error("마스터 키 길이 오류: 32바이트 필요, 실제 {0}바이트")]
    InvalidKeyLength(usize),

    #[error("암호화 실패: {0}")]
    EncryptionFailed(String),

    #[error("복호화 실패: {0}")]
    DecryptionFailed(String),

    #[error("nonce 길이 오류: 12바이트 필요, 실제 {0}바이트")]
    InvalidNonceLength(usize),

    #[error("Base64 디코드 에러: {0}")]
    Base64(#[from] base64::DecodeError),

    #[error("마스터 키 환경변수 {0} 가 설정되지 않음")]
    MasterKeyNotConfigured(String),
}

/// AES-256-GCM nonce 크기 (바이트)
pub const NONCE_SIZE: usize = 12;

/// AES-256 키 크기 (바이트)
pub const KEY_SIZE: usize = 32;

/// 저장소에 보관되는 봉인된 자격증명.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SealedCredential {
    pub ciphertext: Vec<u8>,
    pub nonce: Vec<u8>,
}

/// 자격증명 암호화 관리자
pub struct CredentialEncryptor {
    cipher: Aes256Gcm,
}

impl CredentialEncryptor {
    /// base64 마스터 키로 생성.
    pub fn new(master_key: &str) -> Result<Self, CryptoError> {
        let key_bytes = base64::engine::general_purpose::STANDARD.decode(master_key.trim())?;
        if key_bytes.len() != KEY_SIZE {
            return Err(CryptoError::InvalidKeyLength(key_bytes.len()));
        }

        let cipher = Aes256Gcm::new_from_slice(&key_bytes)
            .map_err(|e| CryptoError::EncryptionFailed(e.to_string()))?;
        Ok(Self { cipher })
    }

    /// 환경변수에서 마스터 키를 읽어 생성.
    pub fn from_env(var: &str) -> Result<Self, CryptoError> {
        let key = std::env::var(var)
            .map_err(|_| CryptoError::MasterKeyNotConfigured(var.to_string()))?;
        Self::new(&key)
    }

    /// 자격증명 봉인.
    pub fn seal(&self, credential: &Credential) -> Result<SealedCredential, CryptoError> {
        let json = serde_json::to_vec(&credential.to_payload())
            .map_err(|e| CryptoError::EncryptionFailed(e.to_string()))?;

        let mut nonce_bytes = [0u8; NONCE_SIZE];
        OsRng.fill_bytes(&mut nonce_bytes);

        let ciphertext = self
            .cipher
            .encrypt(Nonce::from_slice(&nonce_bytes), json.as_slice())
            .map_err(|e| CryptoError::EncryptionFailed(e.to_string()))?;

        Ok(SealedCredential {
            ciphertext,
            nonce: nonce_bytes.to_vec(),
        })
    }

    /// 봉인된 자격증명 개봉.
    pub fn open(&self, sealed: &SealedCredential) -> Result<Credential, CryptoError> {
        if sealed.nonce.len() != NONCE_SIZE {
            return Err(CryptoError::InvalidNonceLength(sealed.nonce.len()));
        }

        let plaintext = self
            .cipher
            .decrypt(Nonce::from_slice(&sealed.nonce), sealed.ciphertext.as_slice())
            .map_err(|e| CryptoError::DecryptionFailed(e.to_string()))?;

        let payload: CredentialPayload = serde_json::from_slice(&plaintext)
            .map_err(|e| CryptoError::DecryptionFailed(e.to_string()))?;
        Ok(payload.into())
    }
}

/// 새 마스터 키 생성 (초기 설정용).
pub fn generate_master_key() -> String {
    let mut key = [0u8; KEY_SIZE];
    OsRng.fill_bytes(&mut key);
    base64::engine::general_purpose::STANDARD.encode(key)
}
