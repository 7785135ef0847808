//! KuCoin 현물 커넥터.
//!
//! 서명 방식 D (패스프레이즈 포함 base64 HMAC-SHA256). 주문은 trade 계정,
//! 출금은 main 계정에서 나갑니다. 응답 봉투의 `code`가 `"200000"`이
//! 아니면 에러입니다.

use async_trait::async_trait;
use reqwest::{Method, StatusCode};
use rust_decimal::Decimal;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use settle_core::{
    parse_decimal, precision_of_step, ExchangeIdentity, OrderStatus, Side, SubAccount,
    WithdrawalFee, WithdrawalStatus,
};
use std::collections::HashMap;
use std::sync::Arc;
use uuid::Uuid;

use super::build_adapter;
use crate::adapter::{ErrorDecoder, ProtocolAdapter, RequestParams};
use crate::client::SpotClient;
use crate::error::{ExchangeError, ExchangeResult};
use crate::factory::ClientContext;
use crate::rate_limit::{Quota, QuotaTable};
use crate::signer::{PassphraseHmacSigner, Signer};
use crate::traits::{DepositAddress, ExchangeClient, OrderQuery, WithdrawalDetails, WithdrawalQuery};
use crate::venue::{
    ChainInfo, Instrument, InstrumentStatus, MarketOrder, Venue, VenueOrder, WithdrawalSubmit,
};

pub const BASE_URL: &str = "https://api.kucoin.com";

/// 성공 응답 코드.
const SUCCESS_CODE: &str = "200000";

const SUB_ACCOUNTS: &[SubAccount] = &[SubAccount::Trade, SubAccount::Main];

pub fn identity() -> ExchangeIdentity {
    ExchangeIdentity::new("kucoin", "KuCoin", BASE_URL).with_passphrase()
}

pub fn build(
    identity: &ExchangeIdentity,
    ctx: ClientContext,
) -> ExchangeResult<Arc<dyn ExchangeClient>> {
    let venue = KucoinVenue::new(identity.clone(), &ctx)?;
    let client = SpotClient::new(venue, ctx.converter, ctx.currency_map, ctx.settings);
    Ok(match ctx.connection_hash {
        Some(hash) => Arc::new(client.with_connection_hash(hash)),
        None => Arc::new(client),
    })
}

fn quotas() -> QuotaTable {
    QuotaTable::new(Quota::per_second(15))
        .with("/api/v1/orders", Quota::per_second(10))
        .with("/api/v1/withdrawals", Quota::per_second(2))
        .with("/api/v2/accounts/inner-transfer", Quota::per_second(5))
}

fn account_type(account: SubAccount) -> ExchangeResult<&'static str> {
    match account {
        SubAccount::Trade => Ok("trade"),
        SubAccount::Main => Ok("main"),
        other => Err(ExchangeError::NotSupported(format!("kucoin {} 계정", other))),
    }
}

// ============================================================================
// 에러 디코딩
// ============================================================================

#[derive(Debug, Deserialize)]
struct CodeStatus {
    code: Value,
    #[serde(default)]
    msg: String,
}

/// `code` 기반 에러 디코더.
pub struct KucoinErrorDecoder;

impl KucoinErrorDecoder {
    pub fn map_code(code: &str, msg: &str) -> ExchangeError {
        let msg = msg.to_string();
        match code {
            "400001" | "400003" | "400004" | "400005" => ExchangeError::InvalidCredentials(msg),
            "400006" => ExchangeError::InvalidIpWhitelist(msg),
            "400007" => ExchangeError::IncorrectPermissions(msg),
            "429000" => ExchangeError::RateLimited(msg),
            "400002" | "500000" => ExchangeError::Network(msg),
            "200004" => ExchangeError::InsufficientBalance(msg),
            "900001" => ExchangeError::NotFound(msg),
            "600100" => ExchangeError::SymbolTradingHalted(msg),
            "260200" => ExchangeError::WithdrawalBalanceLocked(msg),
            "260100" => ExchangeError::MinWithdrawalNotMet(msg),
            "260220" => ExchangeError::WithdrawalAddressNotWhitelisted(msg),
            "411100" | "260300" => ExchangeError::SecurityActionLock(msg),
            "260400" => ExchangeError::ChainSuspended(msg),
            _ => ExchangeError::Exchange {
                code: code.to_string(),
                message: msg,
            },
        }
    }
}

impl ErrorDecoder for KucoinErrorDecoder {
    fn decode(&self, _status: StatusCode, body: &str) -> Option<ExchangeError> {
        let parsed: CodeStatus = serde_json::from_str(body).ok()?;
        let code = match &parsed.code {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        };
        if code == SUCCESS_CODE {
            return None;
        }
        Some(Self::map_code(&code, &parsed.msg))
    }
}

// ============================================================================
// API 응답 타입
// ============================================================================

#[derive(Debug, Deserialize)]
struct Envelope<T> {
    data: T,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ApiKeyInfo {
    #[serde(default)]
    permission: String,
    #[serde(default)]
    ip_whitelist: String,
}

#[derive(Debug, Deserialize)]
struct AccountRow {
    currency: String,
    available: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct OrderIdResponse {
    order_id: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SymbolRow {
    symbol: String,
    base_currency: String,
    quote_currency: String,
    #[serde(default)]
    base_min_size: String,
    #[serde(default)]
    base_max_size: String,
    #[serde(default)]
    quote_max_size: String,
    #[serde(default)]
    base_increment: String,
    #[serde(default)]
    quote_increment: String,
    #[serde(default)]
    price_increment: String,
    #[serde(default)]
    min_funds: Option<String>,
    enable_trading: bool,
}

impl SymbolRow {
    fn into_instrument(self) -> Instrument {
        let min_qty = parse_decimal(&self.base_min_size);
        Instrument {
            status: if self.enable_trading {
                InstrumentStatus::Trading
            } else {
                InstrumentStatus::Halted
            },
            min_qty: (min_qty > Decimal::ZERO).then_some(min_qty),
            max_qty: parse_decimal(&self.base_max_size),
            min_notional: self.min_funds.as_deref().map(parse_decimal).unwrap_or_default(),
            max_notional: parse_decimal(&self.quote_max_size),
            amount_precision: precision_of_step(parse_decimal(&self.base_increment)),
            value_precision: precision_of_step(parse_decimal(&self.quote_increment)),
            price_precision: precision_of_step(parse_decimal(&self.price_increment)),
            symbol: self.symbol,
            base: self.base_currency,
            quote: self.quote_currency,
        }
    }
}

#[derive(Debug, Deserialize)]
struct Level1 {
    #[serde(default)]
    price: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct OrderInfo {
    is_active: bool,
    #[serde(default)]
    cancel_exist: bool,
    #[serde(default)]
    deal_size: String,
    #[serde(default)]
    deal_funds: String,
}

#[derive(Debug, Deserialize)]
struct CurrencyDetail {
    currency: String,
    #[serde(default)]
    precision: u32,
    #[serde(default)]
    chains: Vec<CurrencyChainRow>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CurrencyChainRow {
    chain_id: String,
    #[serde(default)]
    withdrawal_min_size: String,
    #[serde(default)]
    deposit_min_size: Option<String>,
    #[serde(default)]
    withdrawal_min_fee: String,
    #[serde(default)]
    withdraw_fee_rate: Option<String>,
    #[serde(default)]
    max_withdraw: Option<String>,
    #[serde(default)]
    is_withdraw_enabled: bool,
    #[serde(default)]
    is_deposit_enabled: bool,
    #[serde(default)]
    confirms: u32,
    #[serde(default)]
    withdraw_precision: Option<u32>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DepositAddressRow {
    address: String,
    #[serde(default)]
    memo: String,
    #[serde(default)]
    chain_id: String,
    #[serde(default)]
    chain_name: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WithdrawalCreated {
    withdrawal_id: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WithdrawalRow {
    status: String,
    #[serde(default)]
    amount: String,
    #[serde(default)]
    fee: String,
    #[serde(default)]
    wallet_tx_id: Option<String>,
}

fn map_order_status(info: &OrderInfo) -> OrderStatus {
    if info.is_active {
        OrderStatus::InProgress
    } else if parse_decimal(&info.deal_size) > Decimal::ZERO {
        OrderStatus::Completed
    } else {
        OrderStatus::Failed
    }
}

fn map_withdrawal_status(status: &str) -> WithdrawalStatus {
    match status {
        "SUCCESS" => WithdrawalStatus::Completed,
        "FAILURE" => WithdrawalStatus::Failed,
        "REVIEW" => WithdrawalStatus::Recovery,
        _ => WithdrawalStatus::InProgress,
    }
}

// ============================================================================
// Venue 구현
// ============================================================================

pub struct KucoinVenue {
    identity: ExchangeIdentity,
    adapter: ProtocolAdapter,
}

impl KucoinVenue {
    /// 자격증명이 있는데 패스프레이즈가 없으면 `InvalidCredentials`.
    pub fn new(identity: ExchangeIdentity, ctx: &ClientContext) -> ExchangeResult<Self> {
        let signer = match &ctx.credential {
            Some(credential) => {
                Some(Arc::new(PassphraseHmacSigner::new(credential.clone())?) as Arc<dyn Signer>)
            }
            None => None,
        };
        let adapter =
            build_adapter(&identity, ctx, quotas(), Arc::new(KucoinErrorDecoder), signer)?;
        Ok(Self { identity, adapter })
    }

    async fn call<T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        params: RequestParams,
        requires_auth: bool,
    ) -> ExchangeResult<T> {
        let envelope: Envelope<T> = self.adapter.call(method, path, params, requires_auth).await?;
        Ok(envelope.data)
    }
}

#[async_trait]
impl Venue for KucoinVenue {
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
        SubAccount::Trade
    }

    fn withdrawal_account(&self) -> SubAccount {
        SubAccount::Main
    }

    async fn verify_credentials(&self) -> ExchangeResult<()> {
        let info: ApiKeyInfo = self
            .call(Method::GET, "/api/v1/user/api-key", RequestParams::new(), true)
            .await?;

        if info.ip_whitelist.trim().is_empty() {
            return Err(ExchangeError::InvalidIpWhitelist(
                "IP 화이트리스트가 비어 있는 API 키".to_string(),
            ));
        }
        let permissions: Vec<&str> = info.permission.split(',').map(str::trim).collect();
        if !permissions.contains(&"Spot") || !permissions.contains(&"Withdrawal") {
            return Err(ExchangeError::IncorrectPermissions(format!(
                "Spot/Withdrawal 권한 필요 (현재: {})",
                info.permission
            )));
        }
        Ok(())
    }

    async fn sub_account_balances(
        &self,
        account: SubAccount,
    ) -> ExchangeResult<HashMap<String, Decimal>> {
        let rows: Vec<AccountRow> = self
            .call(
                Method::GET,
                "/api/v1/accounts",
                RequestParams::new().query("type", account_type(account)?),
                true,
            )
            .await?;
        let mut balances: HashMap<String, Decimal> = HashMap::new();
        for row in rows {
            let amount = parse_decimal(&row.available);
            if amount > Decimal::ZERO {
                *balances.entry(row.currency.to_uppercase()).or_default() += amount;
            }
        }
        Ok(balances)
    }

    async fn transfer(
        &self,
        ticker: &str,
        amount: Decimal,
        from: SubAccount,
        to: SubAccount,
    ) -> ExchangeResult<()> {
        let body = json!({
            "clientOid": Uuid::new_v4().simple().to_string(),
            "currency": ticker.to_uppercase(),
            "from": account_type(from)?,
            "to": account_type(to)?,
            "amount": amount.to_string(),
        });
        let response: OrderIdResponse = self
            .call(
                Method::POST,
                "/api/v2/accounts/inner-transfer",
                RequestParams::new().json(body),
                true,
            )
            .await?;
        tracing::debug!(order_id = %response.order_id, "kucoin 내부 이체 완료");
        Ok(())
    }

    async fn instruments(&self) -> ExchangeResult<Vec<Instrument>> {
        let rows: Vec<SymbolRow> = self
            .call(Method::GET, "/api/v2/symbols", RequestParams::new(), false)
            .await?;
        Ok(rows.into_iter().map(SymbolRow::into_instrument).collect())
    }

    async fn instrument(&self, symbol: &str) -> ExchangeResult<Instrument> {
        let path = format!("/api/v2/symbols/{}", symbol.to_uppercase());
        let row: Option<SymbolRow> = self
            .call(Method::GET, &path, RequestParams::new(), false)
            .await?;
        row.map(SymbolRow::into_instrument)
            .ok_or_else(|| ExchangeError::NotFound(format!("심볼 {}", symbol)))
    }

    async fn last_price(&self, symbol: &str) -> ExchangeResult<Decimal> {
        let level1: Option<Level1> = self
            .call(
                Method::GET,
                "/api/v1/market/orderbook/level1",
                RequestParams::new().query("symbol", symbol.to_uppercase()),
                false,
            )
            .await?;
        level1
            .and_then(|l| l.price)
            .map(|p| parse_decimal(&p))
            .ok_or_else(|| ExchangeError::NotFound(format!("시세 {}", symbol)))
    }

    async fn place_market_order(&self, order: &MarketOrder) -> ExchangeResult<String> {
        let mut body = json!({
            "clientOid": order.client_order_id,
            "side": order.side.to_string().to_lowercase(),
            "symbol": order.symbol.to_uppercase(),
            "type": "market",
        });
        match order.side {
            Side::Sell => body["size"] = json!(order.amount.to_string()),
            Side::Buy => body["funds"] = json!(order.amount.to_string()),
        }
        let response: OrderIdResponse = self
            .call(
                Method::POST,
                "/api/v1/orders",
                RequestParams::new().json(body),
                true,
            )
            .await?;
        Ok(response.order_id)
    }

    async fn query_order(&self, query: &OrderQuery) -> ExchangeResult<VenueOrder> {
        let path = format!("/api/v1/orders/{}", query.exchange_order_id);
        let info: OrderInfo = self
            .call(Method::GET, &path, RequestParams::new(), true)
            .await?;
        let raw_status = match (info.is_active, info.cancel_exist) {
            (true, _) => "active",
            (false, true) => "cancelled",
            (false, false) => "done",
        };
        Ok(VenueOrder {
            status: map_order_status(&info),
            filled_base: parse_decimal(&info.deal_size),
            filled_quote: parse_decimal(&info.deal_funds),
            raw_status: raw_status.to_string(),
        })
    }

    async fn chain_infos(&self, ticker: &str) -> ExchangeResult<Vec<ChainInfo>> {
        let path = format!("/api/v3/currencies/{}", ticker.to_uppercase());
        let detail: CurrencyDetail = self
            .call(Method::GET, &path, RequestParams::new(), false)
            .await?;

        Ok(detail
            .chains
            .into_iter()
            .map(|c| {
                let rate = c
                    .withdraw_fee_rate
                    .as_deref()
                    .map(parse_decimal)
                    .unwrap_or_default();
                ChainInfo {
                    ticker: detail.currency.to_uppercase(),
                    withdraw_enabled: c.is_withdraw_enabled,
                    deposit_enabled: c.is_deposit_enabled,
                    min_withdrawal: parse_decimal(&c.withdrawal_min_size),
                    max_withdrawal: c
                        .max_withdraw
                        .as_deref()
                        .map(parse_decimal)
                        .unwrap_or_default(),
                    min_deposit: c
                        .deposit_min_size
                        .as_deref()
                        .map(parse_decimal)
                        .unwrap_or_default(),
                    fee: if rate > Decimal::ZERO {
                        WithdrawalFee::Percentage(rate)
                    } else {
                        WithdrawalFee::Fixed(parse_decimal(&c.withdrawal_min_fee))
                    },
                    confirmations: c.confirms,
                    precision: c.withdraw_precision.unwrap_or(detail.precision),
                    chain: c.chain_id,
                }
            })
            .collect())
    }

    async fn deposit_address(&self, ticker: &str, chain: &str) -> ExchangeResult<DepositAddress> {
        let rows: Vec<DepositAddressRow> = self
            .call(
                Method::GET,
                "/api/v3/deposit-addresses",
                RequestParams::new()
                    .query("currency", ticker.to_uppercase())
                    .query("chain", chain),
                true,
            )
            .await?;

        let found = rows
            .into_iter()
            .find(|r| {
                r.chain_id.eq_ignore_ascii_case(chain) || r.chain_name.eq_ignore_ascii_case(chain)
            })
            .ok_or_else(|| ExchangeError::NotFound(format!("{} {} 입금 주소", ticker, chain)))?;

        Ok(DepositAddress {
            ticker: ticker.to_uppercase(),
            chain: chain.to_string(),
            address: found.address,
            tag: (!found.memo.is_empty()).then_some(found.memo),
        })
    }

    async fn submit_withdrawal(&self, request: &WithdrawalSubmit) -> ExchangeResult<String> {
        let mut body = json!({
            "currency": request.ticker.to_uppercase(),
            "address": request.address,
            "amount": request.amount.to_string(),
            "chain": request.chain,
            "isInner": false,
            "remark": request.client_id,
        });
        if let Some(tag) = &request.tag {
            body["memo"] = json!(tag);
        }
        let created: WithdrawalCreated = self
            .call(
                Method::POST,
                "/api/v1/withdrawals",
                RequestParams::new().json(body),
                true,
            )
            .await?;
        Ok(created.withdrawal_id)
    }

    async fn query_withdrawal(&self, query: &WithdrawalQuery) -> ExchangeResult<WithdrawalDetails> {
        let path = format!("/api/v1/withdrawals/{}", query.exchange_order_id);
        let row: WithdrawalRow = self
            .call(Method::GET, &path, RequestParams::new(), true)
            .await?;
        Ok(WithdrawalDetails {
            status: map_withdrawal_status(&row.status),
            tx_hash: row.wallet_tx_id.filter(|t| !t.is_empty()),
            amount: Some(parse_decimal(&row.amount)),
            fee: Some(parse_decimal(&row.fee)),
            raw_status: row.status,
        })
    }
}
