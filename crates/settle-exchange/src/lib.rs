//! 거래소 프로토콜 어댑터와 통합 현물 클라이언트.
//!
//! 이 크레이트는 다음을 제공합니다:
//! - `ExchangeClient` trait: 엔진이 사용하는 통합 거래소 인터페이스
//! - 4가지 서명 방식 (쿼리 HMAC, 헤더 HMAC, 정규 문자열 SHA512, 패스프레이즈)
//! - 엔드포인트 x 자격증명 단위 요청 한도 관리
//! - 거래소 에러 코드 정규화 (`ErrorKind`)
//! - Binance, Bybit, Gate.io, KuCoin 커넥터와 팩토리

pub mod adapter;
pub mod client;
pub mod connector;
pub mod error;
pub mod factory;
pub mod filters;
pub mod rate_limit;
pub mod signer;
pub mod traits;
pub mod venue;

pub use adapter::{AdapterConfig, ErrorDecoder, ProtocolAdapter, RequestParams, SignedRequest};
pub use client::{ClientSettings, SpotClient};
pub use error::*;
pub use factory::{default_factories, ClientContext, ClientFactory, ConnectorFactory};
pub use rate_limit::{Quota, QuotaTable, RateLimiter};
pub use signer::{SigningStyle, Signer};
pub use traits::*;
pub use venue::{
    ChainInfo, Instrument, InstrumentStatus, MarketOrder, Venue, VenueOrder, WithdrawalSubmit,
};
