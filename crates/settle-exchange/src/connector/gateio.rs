//! Gate.io v4 현물 커넥터.
//!
//! 서명 방식 C (정규 문자열 HMAC-SHA512). 현물 계정 하나에서 거래와
//! 출금을 모두 처리합니다. 에러는 HTTP 상태와 `label` 문자열로 옵니다.

use async_trait::async_trait;
use reqwest::{Method, StatusCode};
use rust_decimal::Decimal;
use serde::Deserialize;
use serde_json::json;
use settle_core::{
    parse_decimal, ExchangeIdentity, OrderStatus, SubAccount, WithdrawalFee, WithdrawalStatus,
};
use std::collections::HashMap;
use std::sync::Arc;

use super::build_adapter;
use crate::adapter::{ErrorDecoder, ProtocolAdapter, RequestParams};
use crate::client::SpotClient;
use crate::error::{ExchangeError, ExchangeResult};
use crate::factory::ClientContext;
use crate::rate_limit::{Quota, QuotaTable};
use crate::signer::{CanonicalSha512Signer, Signer};
use crate::traits::{DepositAddress, ExchangeClient, OrderQuery, WithdrawalDetails, WithdrawalQuery};
use crate::venue::{
    ChainInfo, Instrument, InstrumentStatus, MarketOrder, Venue, VenueOrder, WithdrawalSubmit,
};

pub const BASE_URL: &str = "https://api.gateio.ws";

const SUB_ACCOUNTS: &[SubAccount] = &[SubAccount::Spot];

/// 주문 `text` 필드 최대 길이 (`t-` 접두어 포함).
const ORDER_TEXT_MAX: usize = 28;

pub fn identity() -> ExchangeIdentity {
    ExchangeIdentity::new("gateio", "Gate.io", BASE_URL)
}

pub fn build(
    identity: &ExchangeIdentity,
    ctx: ClientContext,
) -> ExchangeResult<Arc<dyn ExchangeClient>> {
    let venue = GateioVenue::new(identity.clone(), &ctx)?;
    let client = SpotClient::new(venue, ctx.converter, ctx.currency_map, ctx.settings);
    Ok(match ctx.connection_hash {
        Some(hash) => Arc::new(client.with_connection_hash(hash)),
        None => Arc::new(client),
    })
}

fn quotas() -> QuotaTable {
    QuotaTable::new(Quota::per_second(10))
        .with("/api/v4/spot/orders", Quota::per_second(10))
        .with("/api/v4/withdrawals", Quota::per_second(1))
        .with("/api/v4/wallet/withdraw_status", Quota::per_second(2))
}

// ============================================================================
// 에러 디코딩
// ============================================================================

#[derive(Debug, Deserialize)]
struct GateError {
    label: String,
    #[serde(default)]
    message: String,
}

/// `label` 기반 에러 디코더.
pub struct GateioErrorDecoder;

impl GateioErrorDecoder {
    pub fn map_label(label: &str, message: &str) -> ExchangeError {
        let msg = if message.is_empty() {
            label.to_string()
        } else {
            message.to_string()
        };
        match label {
            "INVALID_KEY" | "INVALID_SIGNATURE" | "MISSING_REQUIRED_HEADER" => {
                ExchangeError::InvalidCredentials(msg)
            }
            "IP_FORBIDDEN" => ExchangeError::InvalidIpWhitelist(msg),
            "FORBIDDEN" | "READ_ONLY" => ExchangeError::IncorrectPermissions(msg),
            "TOO_MANY_REQUESTS" => ExchangeError::RateLimited(msg),
            "REQUEST_EXPIRED" | "SERVER_ERROR" | "TOO_BUSY" => ExchangeError::Network(msg),
            "BALANCE_NOT_ENOUGH" => ExchangeError::InsufficientBalance(msg),
            "INVALID_CURRENCY_PAIR" | "ORDER_NOT_FOUND" | "INVALID_CURRENCY" => {
                ExchangeError::NotFound(msg)
            }
            "TRADE_RESTRICTED" | "CURRENCY_PAIR_TRADE_DISABLED" => {
                ExchangeError::SymbolTradingHalted(msg)
            }
            "WITHDRAW_BALANCE_LOCKED" | "INSUFFICIENT_AVAILABLE" => {
                ExchangeError::WithdrawalBalanceLocked(msg)
            }
            "AMOUNT_TOO_LITTLE" | "WITHDRAWAL_AMOUNT_TOO_SMALL" => {
                ExchangeError::MinWithdrawalNotMet(msg)
            }
            "ADDRESS_NOT_IN_WHITELIST" => ExchangeError::WithdrawalAddressNotWhitelisted(msg),
            "WITHDRAWAL_LOCKED" | "ACCOUNT_LOCKED" => ExchangeError::SecurityActionLock(msg),
            "CHAIN_DISABLED" | "WITHDRAWAL_SUSPENDED" => ExchangeError::ChainSuspended(msg),
            _ => ExchangeError::Exchange {
                code: label.to_string(),
                message: msg,
            },
        }
    }
}

impl ErrorDecoder for GateioErrorDecoder {
    fn decode(&self, status: StatusCode, body: &str) -> Option<ExchangeError> {
        if status.is_success() {
            return None;
        }
        let parsed: GateError = serde_json::from_str(body).ok()?;
        Some(Self::map_label(&parsed.label, &parsed.message))
    }
}

// ============================================================================
// API 응답 타입
// ============================================================================

#[derive(Debug, Deserialize)]
struct AccountDetail {
    #[serde(default)]
    ip_whitelist: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct SpotBalance {
    currency: String,
    available: String,
}

#[derive(Debug, Deserialize)]
struct CurrencyPair {
    id: String,
    base: String,
    quote: String,
    trade_status: String,
    #[serde(default)]
    min_base_amount: Option<String>,
    #[serde(default)]
    min_quote_amount: Option<String>,
    #[serde(default)]
    max_base_amount: Option<String>,
    #[serde(default)]
    max_quote_amount: Option<String>,
    #[serde(default)]
    amount_precision: u32,
    #[serde(default)]
    precision: u32,
}

impl CurrencyPair {
    fn into_instrument(self) -> Instrument {
        let min_qty = self
            .min_base_amount
            .as_deref()
            .map(parse_decimal)
            .filter(|v| *v > Decimal::ZERO);
        let opt = |v: &Option<String>| v.as_deref().map(parse_decimal).unwrap_or_default();
        Instrument {
            status: if self.trade_status == "tradable" {
                InstrumentStatus::Trading
            } else {
                InstrumentStatus::Halted
            },
            min_qty,
            max_qty: opt(&self.max_base_amount),
            min_notional: opt(&self.min_quote_amount),
            max_notional: opt(&self.max_quote_amount),
            amount_precision: self.amount_precision,
            value_precision: self.precision,
            price_precision: self.precision,
            symbol: self.id,
            base: self.base,
            quote: self.quote,
        }
    }
}

#[derive(Debug, Deserialize)]
struct TickerRow {
    last: String,
}

#[derive(Debug, Deserialize)]
struct OrderRow {
    id: String,
    status: String,
    #[serde(default)]
    filled_amount: Option<String>,
    #[serde(default)]
    filled_total: String,
    #[serde(default)]
    amount: String,
    #[serde(default)]
    left: String,
    #[serde(default)]
    side: String,
}

impl OrderRow {
    /// 체결된 기준 통화 수량. 구버전 응답은 `amount - left`로 계산합니다.
    fn filled_base(&self) -> Decimal {
        match self.filled_amount.as_deref() {
            Some(v) => parse_decimal(v),
            None if self.side == "sell" => parse_decimal(&self.amount) - parse_decimal(&self.left),
            None => Decimal::ZERO,
        }
    }
}

#[derive(Debug, Deserialize)]
struct CurrencyChainRow {
    chain: String,
    #[serde(default)]
    is_disabled: i32,
    #[serde(default)]
    is_deposit_disabled: i32,
    #[serde(default)]
    is_withdraw_disabled: i32,
    #[serde(default)]
    decimal: String,
}

#[derive(Debug, Deserialize)]
struct WithdrawStatus {
    currency: String,
    #[serde(default)]
    withdraw_amount_mini: String,
    #[serde(default)]
    withdraw_eachtime_limit: String,
    #[serde(default)]
    withdraw_fix_on_chains: HashMap<String, String>,
    #[serde(default)]
    withdraw_percent_on_chains: HashMap<String, String>,
}

#[derive(Debug, Deserialize)]
struct DepositAddressResponse {
    #[serde(default)]
    multichain_addresses: Vec<MultichainAddress>,
}

#[derive(Debug, Deserialize)]
struct MultichainAddress {
    chain: String,
    address: String,
    #[serde(default)]
    payment_id: String,
    #[serde(default)]
    obtain_failed: i32,
}

#[derive(Debug, Deserialize)]
struct WithdrawalRow {
    id: String,
    status: String,
    #[serde(default)]
    txid: String,
    #[serde(default)]
    withdraw_order_id: String,
    #[serde(default)]
    amount: String,
    #[serde(default)]
    fee: String,
}

/// "0.1%" 형식 비율을 소수(0.001)로 변환.
fn parse_percent(raw: &str) -> Decimal {
    let trimmed = raw.trim();
    match trimmed.strip_suffix('%') {
        Some(value) => parse_decimal(value) / Decimal::ONE_HUNDRED,
        None => parse_decimal(trimmed),
    }
}

fn order_text(client_order_id: &str) -> String {
    let mut text = format!("t-{}", client_order_id);
    text.truncate(ORDER_TEXT_MAX);
    text
}

fn map_order_status(status: &str, filled_quote: Decimal) -> OrderStatus {
    match status {
        "closed" => OrderStatus::Completed,
        "cancelled" if filled_quote > Decimal::ZERO => OrderStatus::Completed,
        "cancelled" => OrderStatus::Failed,
        _ => OrderStatus::InProgress,
    }
}

fn map_withdrawal_status(status: &str) -> WithdrawalStatus {
    match status {
        "DONE" => WithdrawalStatus::Completed,
        "CANCEL" | "FAIL" | "INVALID" | "REJECT" => WithdrawalStatus::Failed,
        "MANUAL" | "REVIEW" => WithdrawalStatus::Recovery,
        _ => WithdrawalStatus::InProgress,
    }
}

// ============================================================================
// Venue 구현
// ============================================================================

pub struct GateioVenue {
    identity: ExchangeIdentity,
    adapter: ProtocolAdapter,
}

impl GateioVenue {
    pub fn new(identity: ExchangeIdentity, ctx: &ClientContext) -> ExchangeResult<Self> {
        let signer = ctx.credential.as_ref().map(|credential| {
            Arc::new(CanonicalSha512Signer::new(credential.clone())) as Arc<dyn Signer>
        });
        let adapter =
            build_adapter(&identity, ctx, quotas(), Arc::new(GateioErrorDecoder), signer)?;
        Ok(Self { identity, adapter })
    }
}

#[async_trait]
impl Venue for GateioVenue {
    fn identity(&self) -> &ExchangeIdentity {
        &self.identity
    }

    fn is_authenticated(&self) -> bool {
        self.adapter.is_authenticated()
    }

    fn sub_accounts(&self) -> &[SubAccount] {
        SUB_ACCOUNTS
    }

    fn trading_account(&self) -> SubAccount {
        SubAccount::Spot
    }

    fn withdrawal_account(&self) -> SubAccount {
        SubAccount::Spot
    }

    async fn verify_credentials(&self) -> ExchangeResult<()> {
        let detail: AccountDetail = self
            .adapter
            .call(Method::GET, "/api/v4/account/detail", RequestParams::new(), true)
            .await?;
        if detail.ip_whitelist.is_empty() {
            return Err(ExchangeError::InvalidIpWhitelist(
                "IP 화이트리스트가 비어 있는 API 키".to_string(),
            ));
        }
        // 출금 권한은 읽기 전용 호출로만 확인 가능
        let _: Vec<WithdrawStatus> = self
            .adapter
            .call(
                Method::GET,
                "/api/v4/wallet/withdraw_status",
                RequestParams::new().query("currency", "USDT"),
                true,
            )
            .await?;
        Ok(())
    }

    async fn sub_account_balances(
        &self,
        account: SubAccount,
    ) -> ExchangeResult<HashMap<String, Decimal>> {
        if account != SubAccount::Spot {
            return Err(ExchangeError::NotSupported(format!("gateio {} 계정", account)));
        }
        let balances: Vec<SpotBalance> = self
            .adapter
            .call(Method::GET, "/api/v4/spot/accounts", RequestParams::new(), true)
            .await?;
        Ok(balances
            .into_iter()
            .map(|b| (b.currency.to_uppercase(), parse_decimal(&b.available)))
            .filter(|(_, amount)| *amount > Decimal::ZERO)
            .collect())
    }

    async fn transfer(
        &self,
        _ticker: &str,
        _amount: Decimal,
        from: SubAccount,
        to: SubAccount,
    ) -> ExchangeResult<()> {
        Err(ExchangeError::NotSupported(format!(
            "gateio 이체 {} -> {}",
            from, to
        )))
    }

    async fn instruments(&self) -> ExchangeResult<Vec<Instrument>> {
        let pairs: Vec<CurrencyPair> = self
            .adapter
            .call(
                Method::GET,
                "/api/v4/spot/currency_pairs",
                RequestParams::new(),
                false,
            )
            .await?;
        Ok(pairs.into_iter().map(CurrencyPair::into_instrument).collect())
    }

    async fn instrument(&self, symbol: &str) -> ExchangeResult<Instrument> {
        let path = format!("/api/v4/spot/currency_pairs/{}", symbol.to_uppercase());
        let pair: CurrencyPair = self
            .adapter
            .call(Method::GET, &path, RequestParams::new(), false)
            .await?;
        Ok(pair.into_instrument())
    }

    async fn last_price(&self, symbol: &str) -> ExchangeResult<Decimal> {
        let tickers: Vec<TickerRow> = self
            .adapter
            .call(
                Method::GET,
                "/api/v4/spot/tickers",
                RequestParams::new().query("currency_pair", symbol.to_uppercase()),
                false,
            )
            .await?;
        tickers
            .first()
            .map(|t| parse_decimal(&t.last))
            .ok_or_else(|| ExchangeError::NotFound(format!("시세 {}", symbol)))
    }

    async fn place_market_order(&self, order: &MarketOrder) -> ExchangeResult<String> {
        let body = json!({
            "text": order_text(&order.client_order_id),
            "currency_pair": order.symbol.to_uppercase(),
            "type": "market",
            "account": "spot",
            "side": order.side.to_string().to_lowercase(),
            "amount": order.amount.to_string(),
            "time_in_force": "ioc",
        });
        let created: OrderRow = self
            .adapter
            .call(
                Method::POST,
                "/api/v4/spot/orders",
                RequestParams::new().json(body),
                true,
            )
            .await?;
        Ok(created.id)
    }

    async fn query_order(&self, query: &OrderQuery) -> ExchangeResult<VenueOrder> {
        let path = format!("/api/v4/spot/orders/{}", query.exchange_order_id);
        let row: OrderRow = self
            .adapter
            .call(
                Method::GET,
                &path,
                RequestParams::new().query("currency_pair", query.symbol.to_uppercase()),
                true,
            )
            .await?;
        let filled_quote = parse_decimal(&row.filled_total);
        Ok(VenueOrder {
            status: map_order_status(&row.status, filled_quote),
            filled_base: row.filled_base(),
            filled_quote,
            raw_status: row.status,
        })
    }

    async fn chain_infos(&self, ticker: &str) -> ExchangeResult<Vec<ChainInfo>> {
        let ticker = ticker.to_uppercase();
        let chains: Vec<CurrencyChainRow> = self
            .adapter
            .call(
                Method::GET,
                "/api/v4/wallet/currency_chains",
                RequestParams::new().query("currency", &ticker),
                false,
            )
            .await?;
        let statuses: Vec<WithdrawStatus> = self
            .adapter
            .call(
                Method::GET,
                "/api/v4/wallet/withdraw_status",
                RequestParams::new().query("currency", &ticker),
                true,
            )
            .await?;
        let status = statuses
            .into_iter()
            .find(|s| s.currency.eq_ignore_ascii_case(&ticker))
            .ok_or_else(|| ExchangeError::NotFound(format!("통화 {}", ticker)))?;

        Ok(chains
            .into_iter()
            .map(|c| {
                let percent = status
                    .withdraw_percent_on_chains
                    .get(&c.chain)
                    .map(|v| parse_percent(v))
                    .unwrap_or_default();
                let fixed = status
                    .withdraw_fix_on_chains
                    .get(&c.chain)
                    .map(|v| parse_decimal(v))
                    .unwrap_or_default();
                ChainInfo {
                    ticker: ticker.clone(),
                    withdraw_enabled: c.is_disabled == 0 && c.is_withdraw_disabled == 0,
                    deposit_enabled: c.is_disabled == 0 && c.is_deposit_disabled == 0,
                    min_withdrawal: parse_decimal(&status.withdraw_amount_mini),
                    max_withdrawal: parse_decimal(&status.withdraw_eachtime_limit),
                    // 최소 입금액은 제공되지 않음
                    min_deposit: Decimal::ZERO,
                    fee: if percent > Decimal::ZERO {
                        WithdrawalFee::Percentage(percent)
                    } else {
                        WithdrawalFee::Fixed(fixed)
                    },
                    confirmations: 0,
                    precision: c.decimal.trim().parse().unwrap_or(8),
                    chain: c.chain,
                }
            })
            .collect())
    }

    async fn deposit_address(&self, ticker: &str, chain: &str) -> ExchangeResult<DepositAddress> {
        let response: DepositAddressResponse = self
            .adapter
            .call(
                Method::GET,
                "/api/v4/wallet/deposit_address",
                RequestParams::new().query("currency", ticker.to_uppercase()),
                true,
            )
            .await?;

        let found = response
            .multichain_addresses
            .into_iter()
            .find(|a| a.chain.eq_ignore_ascii_case(chain) && a.obtain_failed == 0)
            .ok_or_else(|| ExchangeError::NotFound(format!("{} {} 입금 주소", ticker, chain)))?;

        Ok(DepositAddress {
            ticker: ticker.to_uppercase(),
            chain: found.chain,
            address: found.address,
            tag: (!found.payment_id.is_empty()).then_some(found.payment_id),
        })
    }

    async fn submit_withdrawal(&self, request: &WithdrawalSubmit) -> ExchangeResult<String> {
        let mut body = json!({
            "withdraw_order_id": request.client_id,
            "currency": request.ticker.to_uppercase(),
            "address": request.address,
            "amount": request.amount.to_string(),
            "chain": request.chain,
        });
        if let Some(tag) = &request.tag {
            body["memo"] = json!(tag);
        }
        let created: WithdrawalRow = self
            .adapter
            .call(
                Method::POST,
                "/api/v4/withdrawals",
                RequestParams::new().json(body),
                true,
            )
            .await?;
        Ok(created.id)
    }

    async fn query_withdrawal(&self, query: &WithdrawalQuery) -> ExchangeResult<WithdrawalDetails> {
        let rows: Vec<WithdrawalRow> = self
            .adapter
            .call(
                Method::GET,
                "/api/v4/wallet/withdrawals",
                RequestParams::new()
                    .query("currency", query.ticker.to_uppercase())
                    .query("withdraw_id", &query.exchange_order_id),
                true,
            )
            .await?;

        let row = rows
            .into_iter()
            .find(|r| {
                r.id == query.exchange_order_id || r.withdraw_order_id == query.internal_order_id
            })
            .ok_or_else(|| ExchangeError::NotFound(format!("출금 {}", query.exchange_order_id)))?;

        Ok(WithdrawalDetails {
            status: map_withdrawal_status(&row.status),
            tx_hash: (!row.txid.is_empty()).then_some(row.txid),
            amount: Some(parse_decimal(&row.amount)),
            fee: Some(parse_decimal(&row.fee)),
            raw_status: row.status,
        })
    }
}
