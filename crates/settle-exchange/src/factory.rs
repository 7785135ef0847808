//! 거래소 클라이언트 팩토리.
//!
//! 거래소 ID → 팩토리 레지스트리에서 사용합니다. 새 거래소를 추가하려면
//! 팩토리를 하나 더 등록하면 되고 분기 코드는 건드리지 않습니다.

use settle_core::{
    ConnectionHash, Credential, CurrencyConverter, CurrencyMap, ExchangeConfig, ExchangeIdentity,
};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use crate::client::ClientSettings;
use crate::connector::{binance, bybit, gateio, kucoin};
use crate::error::ExchangeResult;
use crate::rate_limit::RateLimiter;
use crate::traits::ExchangeClient;

/// 클라이언트 생성에 필요한 입력.
pub struct ClientContext {
    /// 자격증명 (공개 클라이언트는 None)
    pub credential: Option<Credential>,
    pub connection_hash: Option<ConnectionHash>,
    pub converter: Arc<dyn CurrencyConverter>,
    pub currency_map: CurrencyMap,
    pub settings: ClientSettings,
    pub exchange: ExchangeConfig,
    /// 거래소 단위로 공유하는 요청 한도 관리자
    pub limiter: Arc<RateLimiter>,
    pub cancel: CancellationToken,
}

impl ClientContext {
    /// 공개 클라이언트용 컨텍스트.
    pub fn public(converter: Arc<dyn CurrencyConverter>) -> Self {
        Self {
            credential: None,
            connection_hash: None,
            converter,
            currency_map: CurrencyMap::default(),
            settings: ClientSettings::default(),
            exchange: ExchangeConfig::default(),
            limiter: Arc::new(RateLimiter::new()),
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_credential(mut self, credential: Credential, hash: ConnectionHash) -> Self {
        self.credential = Some(credential);
        self.connection_hash = Some(hash);
        self
    }

    /// 설정에 지정된 기본 URL, 없으면 거래소 기본값.
    pub fn base_url<'a>(&'a self, identity: &'a ExchangeIdentity) -> &'a str {
        self.exchange.base_url.as_deref().unwrap_or(&identity.base_url)
    }
}

/// 거래소 클라이언트 팩토리.
pub trait ClientFactory: Send + Sync {
    fn identity(&self) -> &ExchangeIdentity;

    fn create(&self, ctx: ClientContext) -> ExchangeResult<Arc<dyn ExchangeClient>>;
}

type BuildFn = fn(&ExchangeIdentity, ClientContext) -> ExchangeResult<Arc<dyn ExchangeClient>>;

/// 커넥터 모듈의 생성 함수를 감싸는 팩토리.
pub struct ConnectorFactory {
    identity: ExchangeIdentity,
    build: BuildFn,
}

impl ConnectorFactory {
    pub fn new(identity: ExchangeIdentity, build: BuildFn) -> Self {
        Self { identity, build }
    }
}

impl ClientFactory for ConnectorFactory {
    fn identity(&self) -> &ExchangeIdentity {
        &self.identity
    }

    fn create(&self, ctx: ClientContext) -> ExchangeResult<Arc<dyn ExchangeClient>> {
        (self.build)(&self.identity, ctx)
    }
}

/// 기본 제공 커넥터 팩토리 (binance, bybit, gateio, kucoin).
pub fn default_factories() -> Vec<Arc<dyn ClientFactory>> {
    vec![
        Arc::new(ConnectorFactory::new(binance::identity(), binance::build)),
        Arc::new(ConnectorFactory::new(bybit::identity(), bybit::build)),
        Arc::new(ConnectorFactory::new(gateio::identity(), gateio::build)),
        Arc::new(ConnectorFactory::new(kucoin::identity(), kucoin::build)),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use settle_core::FixedRateConverter;

    #[test]
    fn test_default_factories_cover_four_styles() {
        let slugs: Vec<_> = default_factories()
            .iter()
            .map(|f| f.identity().slug.clone())
            .collect();
        assert_eq!(slugs, vec!["binance", "bybit", "gateio", "kucoin"]);
    }

    #[test]
    fn test_public_client_has_no_hash() {
        let converter = Arc::new(FixedRateConverter::new());
        for factory in default_factories() {
            let client = factory.create(ClientContext::public(converter.clone())).unwrap();
            assert_eq!(client.slug(), factory.identity().slug);
            assert!(client.connection_hash().is_none());
        }
    }

    #[test]
    fn test_kucoin_requires_passphrase() {
        let factory = ConnectorFactory::new(kucoin::identity(), kucoin::build);
        let ctx = ClientContext::public(Arc::new(FixedRateConverter::new())).with_credential(
            Credential::new("k", "s"),
            ConnectionHash::derive("salt", "kucoin", &Credential::new("k", "s")),
        );
        assert!(factory.create(ctx).is_err());
    }
}
