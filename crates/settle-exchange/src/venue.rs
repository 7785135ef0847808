//! 거래소별 저수준 프리미티브.
//!
//! 커넥터는 `Venue`만 구현하면 되고, 잔고 합산이나 출금 재시도 같은
//! 알고리즘은 `SpotClient`에서 공유합니다.

use async_trait::async_trait;
use rust_decimal::Decimal;
use settle_core::{ExchangeIdentity, OrderStatus, Side, SubAccount, WithdrawalFee};
use std::collections::HashMap;

use crate::error::{ExchangeError, ExchangeResult};
use crate::traits::{DepositAddress, OrderQuery, WithdrawalDetails, WithdrawalQuery};

/// 거래 상태.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstrumentStatus {
    Trading,
    Halted,
}

/// 심볼 참조 데이터.
#[derive(Debug, Clone, PartialEq)]
pub struct Instrument {
    pub symbol: String,
    pub base: String,
    pub quote: String,
    pub status: InstrumentStatus,
    /// 거래소가 직접 제공하는 최소 주문 수량 (없으면 None)
    pub min_qty: Option<Decimal>,
    pub max_qty: Decimal,
    /// 최소 주문 금액 (견적 통화)
    pub min_notional: Decimal,
    pub max_notional: Decimal,
    pub amount_precision: u32,
    pub value_precision: u32,
    pub price_precision: u32,
}

impl Instrument {
    pub fn is_tradable(&self) -> bool {
        self.status == InstrumentStatus::Trading
    }
}

/// 시장가 주문 요청.
#[derive(Debug, Clone, PartialEq)]
pub struct MarketOrder {
    pub symbol: String,
    pub side: Side,
    /// 매도: 기준 통화 수량, 매수: 견적 통화 금액
    pub amount: Decimal,
    pub client_order_id: String,
}

/// 거래소 주문 조회 결과.
#[derive(Debug, Clone, PartialEq)]
pub struct VenueOrder {
    pub status: OrderStatus,
    pub filled_base: Decimal,
    pub filled_quote: Decimal,
    pub raw_status: String,
}

/// 통화/체인 정보.
#[derive(Debug, Clone, PartialEq)]
pub struct ChainInfo {
    pub ticker: String,
    pub chain: String,
    pub withdraw_enabled: bool,
    pub deposit_enabled: bool,
    pub min_withdrawal: Decimal,
    pub max_withdrawal: Decimal,
    pub min_deposit: Decimal,
    pub fee: WithdrawalFee,
    pub confirmations: u32,
    pub precision: u32,
}

/// 출금 제출 요청.
#[derive(Debug, Clone, PartialEq)]
pub struct WithdrawalSubmit {
    pub ticker: String,
    pub chain: String,
    pub address: String,
    pub tag: Option<String>,
    /// 수수료 차감 후 금액
    pub amount: Decimal,
    pub client_id: String,
}

/// 거래소별 저수준 API.
#[async_trait]
pub trait Venue: Send + Sync {
    fn identity(&self) -> &ExchangeIdentity;

    /// 인증된 어댑터인지.
    fn is_authenticated(&self) -> bool;

    /// 자금을 보관할 수 있는 하위 계정 (거래 계정 포함).
    fn sub_accounts(&self) -> &[SubAccount];

    /// 주문에 쓰이는 하위 계정.
    fn trading_account(&self) -> SubAccount;

    /// 출금이 나가는 하위 계정.
    fn withdrawal_account(&self) -> SubAccount;

    /// 읽기 전용 인증 호출로 키/IP/권한 검증.
    async fn verify_credentials(&self) -> ExchangeResult<()>;

    /// 하위 계정의 사용 가능 잔고 (대문자 티커 → 수량, 0 제외).
    async fn sub_account_balances(&self, account: SubAccount)
        -> ExchangeResult<HashMap<String, Decimal>>;

    /// 하위 계정 간 이체.
    async fn transfer(
        &self,
        ticker: &str,
        amount: Decimal,
        from: SubAccount,
        to: SubAccount,
    ) -> ExchangeResult<()>;

    async fn instruments(&self) -> ExchangeResult<Vec<Instrument>>;

    /// 심볼 하나 조회. 기본 구현은 전체 목록에서 찾습니다.
    async fn instrument(&self, symbol: &str) -> ExchangeResult<Instrument> {
        self.instruments()
            .await?
            .into_iter()
            .find(|i| i.symbol.eq_ignore_ascii_case(symbol))
            .ok_or_else(|| ExchangeError::NotFound(format!("심볼 {}", symbol)))
    }

    async fn last_price(&self, symbol: &str) -> ExchangeResult<Decimal>;

    /// 시장가 주문 제출, 거래소 주문 ID 반환.
    async fn place_market_order(&self, order: &MarketOrder) -> ExchangeResult<String>;

    async fn query_order(&self, query: &OrderQuery) -> ExchangeResult<VenueOrder>;

    /// 통화의 체인별 정보.
    async fn chain_infos(&self, ticker: &str) -> ExchangeResult<Vec<ChainInfo>>;

    /// 입금 주소 조회 또는 생성.
    async fn deposit_address(&self, ticker: &str, chain: &str) -> ExchangeResult<DepositAddress>;

    /// 출금 제출, 거래소 출금 ID 반환.
    async fn submit_withdrawal(&self, request: &WithdrawalSubmit) -> ExchangeResult<String>;

    async fn query_withdrawal(&self, query: &WithdrawalQuery) -> ExchangeResult<WithdrawalDetails>;
}
