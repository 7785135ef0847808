//! 거래소 매니저.
//!
//! `(slug, user)`로 자격증명과 통화 매핑을 읽어 알맞은 거래소 클라이언트를
//! 만듭니다. 거래소 추가는 `ExchangeRegistry`에 팩토리를 등록하는 것으로 끝납니다.

use settle_core::{AppConfig, ConnectionHash, CredentialEncryptor, CurrencyConverter, CurrencyMap};
use settle_exchange::{
    default_factories, ClientContext, ClientFactory, ClientSettings, ExchangeClient, RateLimiter,
};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use uuid::Uuid;

use crate::error::{EngineError, EngineResult};
use crate::repository::Repository;

/// 거래소 ID → 클라이언트 팩토리.
#[derive(Clone, Default)]
pub struct ExchangeRegistry {
    factories: BTreeMap<String, Arc<dyn ClientFactory>>,
}

impl ExchangeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// 기본 커넥터 4종을 등록한 레지스트리.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        for factory in default_factories() {
            registry.register(factory);
        }
        registry
    }

    /// 팩토리 등록. 같은 ID가 있으면 교체합니다.
    pub fn register(&mut self, factory: Arc<dyn ClientFactory>) {
        self.factories
            .insert(factory.identity().slug.clone(), factory);
    }

    pub fn get(&self, slug: &str) -> Option<&Arc<dyn ClientFactory>> {
        self.factories.get(slug)
    }

    /// 등록된 거래소 ID (정렬됨).
    pub fn slugs(&self) -> Vec<String> {
        self.factories.keys().cloned().collect()
    }
}

/// 거래소 클라이언트 생성 관리자.
pub struct ExchangeManager {
    registry: ExchangeRegistry,
    repository: Arc<dyn Repository>,
    encryptor: Arc<CredentialEncryptor>,
    converter: Arc<dyn CurrencyConverter>,
    config: Arc<AppConfig>,
    cancel: CancellationToken,
    public_clients: RwLock<HashMap<String, Arc<dyn ExchangeClient>>>,
    /// 거래소별 요청 한도 관리자. 같은 거래소의 모든 클라이언트가 공유
    limiters: HashMap<String, Arc<RateLimiter>>,
}

impl ExchangeManager {
    pub fn new(
        registry: ExchangeRegistry,
        repository: Arc<dyn Repository>,
        encryptor: Arc<CredentialEncryptor>,
        converter: Arc<dyn CurrencyConverter>,
        config: Arc<AppConfig>,
        cancel: CancellationToken,
    ) -> Self {
        let limiters = registry
            .slugs()
            .into_iter()
            .map(|slug| (slug, Arc::new(RateLimiter::new())))
            .collect();
        Self {
            registry,
            repository,
            encryptor,
            converter,
            config,
            cancel,
            public_clients: RwLock::new(HashMap::new()),
            limiters,
        }
    }

    pub fn registry(&self) -> &ExchangeRegistry {
        &self.registry
    }

    pub fn converter(&self) -> &Arc<dyn CurrencyConverter> {
        &self.converter
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn rate_limiter(&self, slug: &str) -> Option<&Arc<RateLimiter>> {
        self.limiters.get(slug)
    }

    /// `idle` 동안 쓰이지 않은 요청 한도 버킷을 정리하고 제거한 수를 반환합니다.
    pub async fn cleanup_rate_limits(&self, idle: Duration) -> usize {
        let mut evicted = 0;
        for (slug, limiter) in &self.limiters {
            let removed = limiter.cleanup(idle).await;
            if removed > 0 {
                debug!(exchange = %slug, removed, "요청 한도 버킷 정리");
            }
            evicted += removed;
        }
        evicted
    }

    fn factory(&self, slug: &str) -> EngineResult<&Arc<dyn ClientFactory>> {
        let factory = self
            .registry
            .get(slug)
            .ok_or_else(|| EngineError::UnknownExchange(slug.to_string()))?;
        if !self.config.exchange(slug).enabled {
            return Err(EngineError::ExchangeDisabled(slug.to_string()));
        }
        Ok(factory)
    }

    async fn context(&self, slug: &str) -> EngineResult<ClientContext> {
        let mappings = self.repository.currency_mappings(slug).await?;
        Ok(ClientContext {
            credential: None,
            connection_hash: None,
            converter: self.converter.clone(),
            currency_map: CurrencyMap::new(mappings),
            settings: ClientSettings::new(&self.config.fiat_currency, &self.config.withdrawal),
            exchange: self.config.exchange(slug),
            limiter: self.limiters.get(slug).cloned().unwrap_or_default(),
            cancel: self.cancel.child_token(),
        })
    }

    /// 사용자 자격증명으로 인증된 클라이언트를 만듭니다.
    ///
    /// 매 호출마다 저장된 자격증명을 다시 읽으므로 키 교체가 즉시 반영됩니다.
    pub async fn client_for(
        &self,
        slug: &str,
        user_id: Uuid,
    ) -> EngineResult<Arc<dyn ExchangeClient>> {
        let factory = self.factory(slug)?;
        let sealed = self
            .repository
            .sealed_credential(user_id, slug)
            .await?
            .ok_or_else(|| EngineError::CredentialNotFound {
                user_id,
                exchange: slug.to_string(),
            })?;
        let credential = self.encryptor.open(&sealed)?;
        let hash =
            ConnectionHash::derive(&self.config.security.connection_hash_salt, slug, &credential);

        let ctx = self.context(slug).await?.with_credential(credential, hash);
        let client = factory.create(ctx)?;
        debug!(exchange = slug, user_id = %user_id, "인증 클라이언트 생성");
        Ok(client)
    }

    /// 자격증명 없는 공개 클라이언트 (거래소별로 하나를 재사용).
    pub async fn public_client(&self, slug: &str) -> EngineResult<Arc<dyn ExchangeClient>> {
        if let Some(client) = self.public_clients.read().await.get(slug) {
            return Ok(client.clone());
        }

        let factory = self.factory(slug)?;
        if !factory.identity().supports_public_client || !self.config.exchange(slug).public_client {
            return Err(EngineError::PublicClientUnavailable(slug.to_string()));
        }
        let client = factory.create(self.context(slug).await?)?;

        let mut clients = self.public_clients.write().await;
        let client = clients.entry(slug.to_string()).or_insert(client).clone();
        debug!(exchange = slug, "공개 클라이언트 생성");
        Ok(client)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::MemoryRepository;
    use settle_core::crypto::generate_master_key;
    use settle_core::{Credential, ExchangeConfig, FixedRateConverter};

    fn manager(
        repo: MemoryRepository,
        encryptor: Arc<CredentialEncryptor>,
        config: AppConfig,
    ) -> ExchangeManager {
        ExchangeManager::new(
            ExchangeRegistry::with_defaults(),
            Arc::new(repo),
            encryptor,
            Arc::new(FixedRateConverter::new()),
            Arc::new(config),
            CancellationToken::new(),
        )
    }

    #[test]
    fn test_default_registry_slugs() {
        assert_eq!(
            ExchangeRegistry::with_defaults().slugs(),
            vec!["binance", "bybit", "gateio", "kucoin"]
        );
    }

    #[tokio::test]
    async fn test_client_for_derives_connection_hash() {
        let encryptor = Arc::new(CredentialEncryptor::new(&generate_master_key()).unwrap());
        let credential = Credential::new("key", "secret");
        let repo = MemoryRepository::new();
        let user = Uuid::new_v4();
        repo.add_connection(user, "binance", encryptor.seal(&credential).unwrap())
            .await;

        let config = AppConfig::default();
        let expected =
            ConnectionHash::derive(&config.security.connection_hash_salt, "binance", &credential);
        let manager = manager(repo, encryptor, config);

        let client = manager.client_for("binance", user).await.unwrap();
        assert_eq!(client.slug(), "binance");
        assert_eq!(client.connection_hash(), Some(&expected));
    }

    #[tokio::test]
    async fn test_client_for_errors() {
        let encryptor = Arc::new(CredentialEncryptor::new(&generate_master_key()).unwrap());
        let mut config = AppConfig::default();
        config.exchanges.insert(
            "gateio".to_string(),
            ExchangeConfig {
                enabled: false,
                ..ExchangeConfig::default()
            },
        );
        let manager = manager(MemoryRepository::new(), encryptor, config);
        let user = Uuid::new_v4();

        assert!(matches!(
            manager.client_for("ftx", user).await,
            Err(EngineError::UnknownExchange(_))
        ));
        assert!(matches!(
            manager.client_for("gateio", user).await,
            Err(EngineError::ExchangeDisabled(_))
        ));
        assert!(matches!(
            manager.client_for("bybit", user).await,
            Err(EngineError::CredentialNotFound { .. })
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_idle_rate_limit_buckets_are_cleaned() {
        let encryptor = Arc::new(CredentialEncryptor::new(&generate_master_key()).unwrap());
        let manager = manager(MemoryRepository::new(), encryptor, AppConfig::default());
        let limiter = manager.rate_limiter("binance").unwrap().clone();
        let quota = settle_exchange::Quota::per_second(5);
        let cancel = CancellationToken::new();

        limiter.acquire("/a", "hash-1", quota, &cancel).await.unwrap();
        limiter.acquire("/a", "hash-2", quota, &cancel).await.unwrap();
        tokio::time::advance(Duration::from_secs(600)).await;
        limiter.acquire("/a", "hash-2", quota, &cancel).await.unwrap();

        assert_eq!(manager.cleanup_rate_limits(Duration::from_secs(300)).await, 1);
        assert_eq!(limiter.tracked_buckets().await, 1);
        assert!(Arc::ptr_eq(&limiter, manager.rate_limiter("binance").unwrap()));
        assert!(manager.rate_limiter("ftx").is_none());
    }

    #[tokio::test]
    async fn test_public_client_is_reused() {
        let encryptor = Arc::new(CredentialEncryptor::new(&generate_master_key()).unwrap());
        let manager = manager(MemoryRepository::new(), encryptor, AppConfig::default());

        let first = manager.public_client("kucoin").await.unwrap();
        let second = manager.public_client("kucoin").await.unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert!(first.connection_hash().is_none());
    }
}
