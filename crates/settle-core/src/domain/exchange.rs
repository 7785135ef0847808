//! 거래소 식별 정보.

use serde::{Deserialize, Serialize};

/// 거래소 참조 데이터. 생성 후 변경되지 않습니다.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExchangeIdentity {
    /// 논리적 거래소 ID (예: "binance")
    pub slug: String,
    /// 표시 이름
    pub name: String,
    /// REST API 기본 URL
    pub base_url: String,
    /// 자격증명 없는 공개 클라이언트 지원 여부
    pub supports_public_client: bool,
    /// 패스프레이즈 필요 여부
    pub requires_passphrase: bool,
}

impl ExchangeIdentity {
    pub fn new(
        slug: impl Into<String>,
        name: impl Into<String>,
        base_url: impl Into<String>,
    ) -> Self {
        Self {
            slug: slug.into(),
            name: name.into(),
            base_url: base_url.into(),
            supports_public_client: true,
            requires_passphrase: false,
        }
    }

    pub fn with_passphrase(mut self) -> Self {
        self.requires_passphrase = true;
        self
    }

    pub fn with_public_client(mut self, supported: bool) -> Self {
        self.supports_public_client = supported;
        self
    }

    /// 기본 URL을 교체합니다 (설정 오버라이드, 테스트 서버).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }
}
