//! 엔진 테스트 공용 도구: 스크립트로 동작하는 가짜 거래소와 조립 헬퍼.

#![allow(dead_code)]

use async_trait::async_trait;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use settle_core::crypto::generate_master_key;
use settle_core::{
    AppConfig, ConnectionHash, Credential, CredentialEncryptor, CurrencyBalance, CurrencyChain,
    CurrencyMapping, ExchangeIdentity, FixedRateConverter, OrderRule, OrderStatus, Side,
    TradingPairConfig, WithdrawalFee, WithdrawalRule, WithdrawalSetting, WithdrawalStatus,
};
use settle_engine::{Engines, ExchangeRegistry, MemoryRepository};
use settle_exchange::{
    ClientContext, ClientFactory, DepositAddress, ExchangeClient, ExchangeError, ExchangeResult,
    OrderDetails, OrderQuery, RateLimiter, SpotOrderResult, SymbolEntry, WithdrawalDetails,
    WithdrawalParams, WithdrawalQuery, WithdrawalResult,
};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

pub const SLUG: &str = "fake";
pub const USDT_TRC20: &str = "USDT_TRC20";

/// 가짜 거래소의 응답 스크립트와 호출 기록.
pub struct Script {
    pub balances: HashMap<String, Decimal>,
    pub order_error: Option<fn() -> ExchangeError>,
    pub withdrawal_error: Option<fn() -> ExchangeError>,
    pub order_status: OrderStatus,
    pub withdrawal_status: WithdrawalStatus,
    pub order_rule_calls: usize,
    pub withdrawal_rule_calls: usize,
    pub orders: Vec<(Side, String, Decimal)>,
    /// 거래소에 도달한 출금 요청 (연결 해시, 순수량)
    pub withdrawals: Vec<(Option<String>, Decimal)>,
}

impl Script {
    /// 연결 해시별 출금 요청 수.
    pub fn withdrawals_per_connection(&self) -> HashMap<Option<String>, usize> {
        let mut counts = HashMap::new();
        for (hash, _) in &self.withdrawals {
            *counts.entry(hash.clone()).or_insert(0) += 1;
        }
        counts
    }
}

impl Default for Script {
    fn default() -> Self {
        Self {
            balances: HashMap::new(),
            order_error: None,
            withdrawal_error: None,
            order_status: OrderStatus::InProgress,
            withdrawal_status: WithdrawalStatus::InProgress,
            order_rule_calls: 0,
            withdrawal_rule_calls: 0,
            orders: Vec::new(),
            withdrawals: Vec::new(),
        }
    }
}

pub type SharedScript = Arc<Mutex<Script>>;

pub struct FakeClient {
    hash: Option<ConnectionHash>,
    script: SharedScript,
}

#[async_trait]
impl ExchangeClient for FakeClient {
    fn slug(&self) -> &str {
        SLUG
    }

    fn connection_hash(&self) -> Option<&ConnectionHash> {
        self.hash.as_ref()
    }

    async fn test_connection(&self) -> ExchangeResult<()> {
        Ok(())
    }

    async fn get_account_balance(&self) -> ExchangeResult<Vec<CurrencyBalance>> {
        Ok(Vec::new())
    }

    async fn get_currency_balance(&self, ticker: &str) -> ExchangeResult<CurrencyBalance> {
        let amount = self
            .script
            .lock()
            .unwrap()
            .balances
            .get(ticker)
            .copied()
            .unwrap_or_default();
        Ok(CurrencyBalance {
            ticker: ticker.to_string(),
            amount,
            fiat_value: None,
            fiat_currency: "USD".to_string(),
            breakdown: Vec::new(),
        })
    }

    async fn get_exchange_symbols(&self) -> ExchangeResult<Vec<SymbolEntry>> {
        Ok(Vec::new())
    }

    async fn get_deposit_addresses(
        &self,
        ticker: &str,
        chain: &str,
    ) -> ExchangeResult<DepositAddress> {
        Ok(DepositAddress {
            ticker: ticker.to_string(),
            chain: chain.to_string(),
            address: "deposit".to_string(),
            tag: None,
        })
    }

    async fn get_order_rule(&self, symbol: &str) -> ExchangeResult<OrderRule> {
        self.script.lock().unwrap().order_rule_calls += 1;
        Ok(OrderRule {
            symbol: symbol.to_string(),
            base_currency: "BTC".to_string(),
            quote_currency: "USDT".to_string(),
            min_order_amount: dec!(0.0001),
            max_order_amount: Decimal::ZERO,
            min_order_value: dec!(5),
            max_order_value: Decimal::ZERO,
            amount_precision: 5,
            value_precision: 2,
            price_precision: 2,
        })
    }

    async fn get_withdrawal_rules(
        &self,
        currencies: &[CurrencyChain],
    ) -> ExchangeResult<Vec<WithdrawalRule>> {
        self.script.lock().unwrap().withdrawal_rule_calls += 1;
        Ok(currencies
            .iter()
            .map(|c| WithdrawalRule {
                ticker: c.ticker.to_uppercase(),
                chain: c.chain.to_uppercase(),
                min_withdrawal: dec!(5),
                max_withdrawal: Decimal::ZERO,
                min_deposit: dec!(1),
                fee: WithdrawalFee::Fixed(dec!(1)),
                confirmations: 1,
                precision: 2,
            })
            .collect())
    }

    async fn create_spot_order(
        &self,
        side: Side,
        symbol: &str,
        rule: &OrderRule,
    ) -> ExchangeResult<SpotOrderResult> {
        let mut script = self.script.lock().unwrap();
        if let Some(error) = script.order_error {
            return Err(error());
        }
        let amount = script
            .balances
            .get(rule.spend_currency(side))
            .copied()
            .unwrap_or_default();
        script.orders.push((side, symbol.to_string(), amount));
        Ok(SpotOrderResult {
            exchange_order_id: format!("order-{}", script.orders.len()),
            client_order_id: format!("client-{}", script.orders.len()),
            amount,
        })
    }

    async fn create_withdrawal_order(
        &self,
        params: &WithdrawalParams,
    ) -> ExchangeResult<WithdrawalResult> {
        // 실제 네트워크 호출처럼 다른 작업에 실행을 양보
        tokio::task::yield_now().await;
        let mut script = self.script.lock().unwrap();
        let fee = params.rule.fee.amount_for(params.amount);
        let net = params.rule.net_amount(params.amount);
        let hash = self.hash.as_ref().map(|h| h.as_str().to_string());
        script.withdrawals.push((hash, net));
        if let Some(error) = script.withdrawal_error {
            return Err(error());
        }
        Ok(WithdrawalResult {
            internal_order_id: params.internal_order_id.clone(),
            exchange_order_id: format!("wd-{}", script.withdrawals.len()),
            amount: net,
            fee,
            retry_reason: None,
            attempts: 1,
        })
    }

    async fn get_order_details(&self, _query: &OrderQuery) -> ExchangeResult<OrderDetails> {
        let status = self.script.lock().unwrap().order_status;
        Ok(OrderDetails {
            status,
            filled_amount: dec!(0.07),
            amount_in_quote: dec!(4200),
            fiat_amount: Some(dec!(4200)),
            reason: (status == OrderStatus::Failed).then(|| "rejected".to_string()),
        })
    }

    async fn get_withdrawal_by_id(
        &self,
        _query: &WithdrawalQuery,
    ) -> ExchangeResult<WithdrawalDetails> {
        let status = self.script.lock().unwrap().withdrawal_status;
        Ok(WithdrawalDetails {
            status,
            tx_hash: (status == WithdrawalStatus::Completed).then(|| "0xabc".to_string()),
            amount: None,
            fee: None,
            raw_status: status.as_str().to_string(),
        })
    }
}

pub struct FakeFactory {
    identity: ExchangeIdentity,
    script: SharedScript,
    limiters: Arc<Mutex<Vec<Arc<RateLimiter>>>>,
}

impl ClientFactory for FakeFactory {
    fn identity(&self) -> &ExchangeIdentity {
        &self.identity
    }

    fn create(&self, ctx: ClientContext) -> ExchangeResult<Arc<dyn ExchangeClient>> {
        self.limiters.lock().unwrap().push(ctx.limiter.clone());
        Ok(Arc::new(FakeClient {
            hash: ctx.connection_hash,
            script: self.script.clone(),
        }))
    }
}

/// 메모리 저장소와 가짜 거래소로 조립한 엔진.
pub struct Harness {
    pub repo: MemoryRepository,
    pub engines: Engines,
    pub script: SharedScript,
    pub encryptor: Arc<CredentialEncryptor>,
    /// 팩토리가 받은 요청 한도 관리자 (생성 순서)
    pub limiters: Arc<Mutex<Vec<Arc<RateLimiter>>>>,
}

impl Harness {
    pub async fn new() -> Self {
        Self::with_config(AppConfig::default()).await
    }

    pub async fn with_config(config: AppConfig) -> Self {
        let script: SharedScript = Arc::new(Mutex::new(Script::default()));
        let encryptor = Arc::new(CredentialEncryptor::new(&generate_master_key()).unwrap());
        let repo = MemoryRepository::new();
        repo.add_currency_mapping(CurrencyMapping {
            currency_id: USDT_TRC20.to_string(),
            exchange: SLUG.to_string(),
            ticker: "USDT".to_string(),
            chain: "TRX".to_string(),
        })
        .await;

        let limiters = Arc::new(Mutex::new(Vec::new()));
        let mut registry = ExchangeRegistry::new();
        registry.register(Arc::new(FakeFactory {
            identity: ExchangeIdentity::new(SLUG, "Fake", "http://localhost"),
            script: script.clone(),
            limiters: limiters.clone(),
        }));
        let converter = FixedRateConverter::new()
            .with_price("USD", dec!(1))
            .with_price("USDT", dec!(1))
            .with_price("BTC", dec!(60000));

        let engines = Engines::new(
            Arc::new(config),
            registry,
            Arc::new(repo.clone()),
            encryptor.clone(),
            Arc::new(converter),
            CancellationToken::new(),
        );

        Self {
            repo,
            engines,
            script,
            encryptor,
            limiters,
        }
    }

    /// 자격증명을 저장한 새 사용자.
    pub async fn connected_user(&self) -> Uuid {
        let user = Uuid::new_v4();
        let sealed = self
            .encryptor
            .seal(&Credential::new(format!("key-{user}"), "secret"))
            .unwrap();
        self.repo.add_connection(user, SLUG, sealed).await;
        user
    }

    pub fn set_balance(&self, ticker: &str, amount: Decimal) {
        self.script
            .lock()
            .unwrap()
            .balances
            .insert(ticker.to_string(), amount);
    }

    pub fn script(&self) -> std::sync::MutexGuard<'_, Script> {
        self.script.lock().unwrap()
    }
}

pub fn sell_pair(user_id: Uuid) -> TradingPairConfig {
    TradingPairConfig {
        id: Uuid::new_v4(),
        user_id,
        exchange: SLUG.to_string(),
        symbol: "BTCUSDT".to_string(),
        side: Side::Sell,
        base_currency: "BTC".to_string(),
        quote_currency: "USDT".to_string(),
        enabled: true,
    }
}

pub fn usdt_setting(user_id: Uuid, min_threshold: Decimal) -> WithdrawalSetting {
    WithdrawalSetting {
        id: Uuid::new_v4(),
        user_id,
        exchange: SLUG.to_string(),
        currency_id: USDT_TRC20.to_string(),
        address: "TXyz".to_string(),
        tag: None,
        min_threshold,
        enabled: true,
    }
}
