//! 통합 거래소 클라이언트 계약.
//!
//! 엔진은 이 트레이트만 사용합니다. 거래소별 구현 차이는 `Venue`
//! 프리미티브에 숨겨지고, 공통 알고리즘은 `SpotClient`가 담당합니다.

use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use settle_core::{
    ConnectionHash, CurrencyBalance, CurrencyChain, OrderRule, OrderStatus, Side, WithdrawalRule,
    WithdrawalStatus,
};

use crate::error::ExchangeResult;

/// 거래 방향별 심볼 항목.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SymbolEntry {
    /// 거래소 심볼 (예: "BTCUSDT")
    pub symbol: String,
    pub side: Side,
    pub base_currency: String,
    pub quote_currency: String,
    /// 파는 통화 → 받는 통화 순서의 표시 이름 (예: 매도 "BTC/USDT", 매수 "USDT/BTC")
    pub display_name: String,
}

/// 입금 주소.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DepositAddress {
    pub ticker: String,
    pub chain: String,
    pub address: String,
    pub tag: Option<String>,
}

/// 현물 주문 제출 결과.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpotOrderResult {
    pub exchange_order_id: String,
    pub client_order_id: String,
    /// 제출 수량 (매도: 기준 통화, 매수: 견적 통화)
    pub amount: Decimal,
}

/// 출금 요청.
#[derive(Debug, Clone, PartialEq)]
pub struct WithdrawalParams {
    /// 내부 출금 주문 ID (거래소 클라이언트 ID로 전달)
    pub internal_order_id: String,
    pub ticker: String,
    pub chain: String,
    pub address: String,
    pub tag: Option<String>,
    /// 요청 금액 (수수료 포함 총액)
    pub amount: Decimal,
    pub rule: WithdrawalRule,
}

/// 출금 제출 결과.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WithdrawalResult {
    pub internal_order_id: String,
    pub exchange_order_id: String,
    /// 실제 제출 금액 (수수료 차감 후)
    pub amount: Decimal,
    pub fee: Decimal,
    /// 재시도가 있었던 경우 그 사유
    pub retry_reason: Option<String>,
    /// 제출 시도 횟수
    pub attempts: u32,
}

/// 주문 조회 키.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderQuery {
    pub symbol: String,
    pub side: Side,
    pub base_currency: String,
    pub quote_currency: String,
    pub exchange_order_id: String,
    pub client_order_id: String,
}

/// 주문 상세.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderDetails {
    pub status: OrderStatus,
    /// 체결 수량 (기준 통화)
    pub filled_amount: Decimal,
    /// 체결 금액 (견적 통화)
    pub amount_in_quote: Decimal,
    /// 기준 법정화폐 환산액
    pub fiat_amount: Option<Decimal>,
    /// 실패 사유 (취소/거부)
    pub reason: Option<String>,
}

/// 출금 조회 키.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WithdrawalQuery {
    pub ticker: String,
    pub chain: String,
    pub exchange_order_id: String,
    pub internal_order_id: String,
}

/// 출금 상세.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WithdrawalDetails {
    pub status: WithdrawalStatus,
    pub tx_hash: Option<String>,
    pub amount: Option<Decimal>,
    pub fee: Option<Decimal>,
    /// 거래소 원본 상태 문자열
    pub raw_status: String,
}

/// 통합 거래소 클라이언트.
#[async_trait]
pub trait ExchangeClient: Send + Sync {
    /// 거래소 식별자.
    fn slug(&self) -> &str;

    /// 이 클라이언트를 만든 자격증명의 연결 해시 (공개 클라이언트는 None).
    fn connection_hash(&self) -> Option<&ConnectionHash>;

    /// 읽기 전용 인증 호출로 자격증명을 검증합니다.
    async fn test_connection(&self) -> ExchangeResult<()>;

    /// 모든 하위 계정을 합산한 통화별 잔고.
    async fn get_account_balance(&self) -> ExchangeResult<Vec<CurrencyBalance>>;

    /// 한 통화의 합산 잔고.
    async fn get_currency_balance(&self, ticker: &str) -> ExchangeResult<CurrencyBalance>;

    /// 거래 가능한 심볼 목록 (심볼당 매수/매도 2개).
    async fn get_exchange_symbols(&self) -> ExchangeResult<Vec<SymbolEntry>>;

    /// 입금 주소 조회 (없으면 생성).
    async fn get_deposit_addresses(&self, ticker: &str, chain: &str)
        -> ExchangeResult<DepositAddress>;

    /// 심볼 주문 규칙.
    async fn get_order_rule(&self, symbol: &str) -> ExchangeResult<OrderRule>;

    /// 통화/체인별 출금 규칙.
    async fn get_withdrawal_rules(
        &self,
        currencies: &[CurrencyChain],
    ) -> ExchangeResult<Vec<WithdrawalRule>>;

    /// 전체 잔고로 시장가 주문을 제출합니다.
    async fn create_spot_order(
        &self,
        side: Side,
        symbol: &str,
        rule: &OrderRule,
    ) -> ExchangeResult<SpotOrderResult>;

    /// 출금을 제출합니다 (잔고 잠김 시 감액 재시도).
    async fn create_withdrawal_order(&self, params: &WithdrawalParams)
        -> ExchangeResult<WithdrawalResult>;

    /// 주문 상태 조회.
    async fn get_order_details(&self, query: &OrderQuery) -> ExchangeResult<OrderDetails>;

    /// 출금 상태 조회.
    async fn get_withdrawal_by_id(&self, query: &WithdrawalQuery)
        -> ExchangeResult<WithdrawalDetails>;
}
