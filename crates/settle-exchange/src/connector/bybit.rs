//! Bybit v5 현물 커넥터.
//!
//! 서명 방식 B (헤더 HMAC-SHA256). 주문은 통합(UNIFIED) 계정에서,
//! 출금은 펀딩(FUND) 계정에서만 가능합니다. 모든 응답은
//! `{"retCode":0,"retMsg":"OK","result":{...}}` 형태로 감싸져 있습니다.

use async_trait::async_trait;
use reqwest::{Method, StatusCode};
use rust_decimal::Decimal;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::json;
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
use crate::signer::{HeaderHmacSigner, Signer};
use crate::traits::{DepositAddress, ExchangeClient, OrderQuery, WithdrawalDetails, WithdrawalQuery};
use crate::venue::{
    ChainInfo, Instrument, InstrumentStatus, MarketOrder, Venue, VenueOrder, WithdrawalSubmit,
};

pub const BASE_URL: &str = "https://api.bybit.com";

const SUB_ACCOUNTS: &[SubAccount] = &[SubAccount::Unified, SubAccount::Funding];

pub fn identity() -> ExchangeIdentity {
    ExchangeIdentity::new("bybit", "Bybit", BASE_URL)
}

pub fn build(
    identity: &ExchangeIdentity,
    ctx: ClientContext,
) -> ExchangeResult<Arc<dyn ExchangeClient>> {
    let venue = BybitVenue::new(identity.clone(), &ctx)?;
    let client = SpotClient::new(venue, ctx.converter, ctx.currency_map, ctx.settings);
    Ok(match ctx.connection_hash {
        Some(hash) => Arc::new(client.with_connection_hash(hash)),
        None => Arc::new(client),
    })
}

fn quotas() -> QuotaTable {
    QuotaTable::new(Quota::per_second(10))
        .with("/v5/order/create", Quota::per_second(10))
        .with("/v5/asset/withdraw/create", Quota::per_second(5))
        .with("/v5/asset/coin/query-info", Quota::per_second(2))
        .with("/v5/asset/transfer/inter-transfer", Quota::per_second(5))
}

fn account_type(account: SubAccount) -> ExchangeResult<&'static str> {
    match account {
        SubAccount::Unified => Ok("UNIFIED"),
        SubAccount::Funding => Ok("FUND"),
        other => Err(ExchangeError::NotSupported(format!("bybit {} 계정", other))),
    }
}

// ============================================================================
// 에러 디코딩
// ============================================================================

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RetStatus {
    ret_code: i64,
    #[serde(default)]
    ret_msg: String,
}

/// `retCode` 기반 에러 디코더.
pub struct BybitErrorDecoder;

impl BybitErrorDecoder {
    pub fn map_code(code: i64, msg: &str) -> ExchangeError {
        let msg = msg.to_string();
        match code {
            10003 | 10004 | 33004 => ExchangeError::InvalidCredentials(msg),
            10010 => ExchangeError::InvalidIpWhitelist(msg),
            10005 | 10007 => ExchangeError::IncorrectPermissions(msg),
            10006 | 10018 => ExchangeError::RateLimited(msg),
            10002 | 10016 => ExchangeError::Network(msg),
            170131 => ExchangeError::InsufficientBalance(msg),
            170213 => ExchangeError::NotFound(msg),
            131212 => ExchangeError::WithdrawalBalanceLocked(msg),
            131211 | 131213 => ExchangeError::MinWithdrawalNotMet(msg),
            131066 | 131067 => ExchangeError::WithdrawalAddressNotWhitelisted(msg),
            131214 | 131221 => ExchangeError::SecurityActionLock(msg),
            131093 | 131200 => ExchangeError::ChainSuspended(msg),
            _ => ExchangeError::Exchange {
                code: code.to_string(),
                message: msg,
            },
        }
    }
}

impl ErrorDecoder for BybitErrorDecoder {
    fn decode(&self, _status: StatusCode, body: &str) -> Option<ExchangeError> {
        let parsed: RetStatus = serde_json::from_str(body).ok()?;
        if parsed.ret_code == 0 {
            return None;
        }
        Some(Self::map_code(parsed.ret_code, &parsed.ret_msg))
    }
}

// ============================================================================
// API 응답 타입
// ============================================================================

#[derive(Debug, Deserialize)]
struct Envelope<T> {
    result: T,
}

#[derive(Debug, Deserialize)]
struct ListResult<T> {
    #[serde(default = "Vec::new")]
    list: Vec<T>,
}

#[derive(Debug, Deserialize)]
struct RowsResult<T> {
    #[serde(default = "Vec::new")]
    rows: Vec<T>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ApiKeyInfo {
    #[serde(default)]
    read_only: i32,
    #[serde(default)]
    ips: Vec<String>,
    #[serde(default)]
    permissions: HashMap<String, Vec<String>>,
}

impl ApiKeyInfo {
    fn has_permission(&self, group: &str, permission: &str) -> bool {
        self.permissions
            .get(group)
            .map(|perms| perms.iter().any(|p| p == permission))
            .unwrap_or(false)
    }
}

#[derive(Debug, Deserialize)]
struct UnifiedAccount {
    #[serde(default)]
    coin: Vec<UnifiedCoin>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UnifiedCoin {
    coin: String,
    #[serde(default)]
    wallet_balance: String,
    #[serde(default)]
    locked: String,
}

#[derive(Debug, Deserialize)]
struct FundBalances {
    #[serde(default)]
    balance: Vec<FundCoin>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FundCoin {
    coin: String,
    #[serde(default)]
    transfer_balance: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TransferResult {
    transfer_id: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct InstrumentInfo {
    symbol: String,
    base_coin: String,
    quote_coin: String,
    status: String,
    lot_size_filter: LotSizeFilter,
    price_filter: PriceFilter,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LotSizeFilter {
    #[serde(default)]
    base_precision: String,
    #[serde(default)]
    quote_precision: String,
    #[serde(default)]
    min_order_qty: String,
    #[serde(default)]
    max_order_qty: String,
    #[serde(default)]
    min_order_amt: String,
    #[serde(default)]
    max_order_amt: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PriceFilter {
    #[serde(default)]
    tick_size: String,
}

impl InstrumentInfo {
    fn into_instrument(self) -> Instrument {
        let lot = &self.lot_size_filter;
        let min_qty = parse_decimal(&lot.min_order_qty);
        Instrument {
            status: if self.status == "Trading" {
                InstrumentStatus::Trading
            } else {
                InstrumentStatus::Halted
            },
            min_qty: (min_qty > Decimal::ZERO).then_some(min_qty),
            max_qty: parse_decimal(&lot.max_order_qty),
            min_notional: parse_decimal(&lot.min_order_amt),
            max_notional: parse_decimal(&lot.max_order_amt),
            amount_precision: precision_of_step(parse_decimal(&lot.base_precision)),
            value_precision: precision_of_step(parse_decimal(&lot.quote_precision)),
            price_precision: precision_of_step(parse_decimal(&self.price_filter.tick_size)),
            symbol: self.symbol,
            base: self.base_coin,
            quote: self.quote_coin,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Ticker {
    last_price: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct OrderCreated {
    order_id: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct OrderRow {
    order_status: String,
    #[serde(default)]
    cum_exec_qty: String,
    #[serde(default)]
    cum_exec_value: String,
}

#[derive(Debug, Deserialize)]
struct CoinInfo {
    coin: String,
    #[serde(default)]
    chains: Vec<CoinChain>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CoinChain {
    chain: String,
    #[serde(default)]
    confirmation: String,
    #[serde(default)]
    withdraw_fee: String,
    #[serde(default)]
    deposit_min: String,
    #[serde(default)]
    withdraw_min: String,
    #[serde(default)]
    min_accuracy: String,
    #[serde(default)]
    chain_deposit: String,
    #[serde(default)]
    chain_withdraw: String,
    #[serde(default)]
    withdraw_percentage_fee: String,
}

#[derive(Debug, Deserialize)]
struct DepositAddressResult {
    #[serde(default)]
    chains: Vec<DepositChain>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DepositChain {
    chain: String,
    address_deposit: String,
    #[serde(default)]
    tag_deposit: String,
}

#[derive(Debug, Deserialize)]
struct WithdrawCreated {
    id: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WithdrawRow {
    withdraw_id: String,
    status: String,
    #[serde(default)]
    amount: String,
    #[serde(default)]
    withdraw_fee: String,
    #[serde(rename = "txID", default)]
    tx_id: String,
}

fn map_order_status(status: &str, executed: Decimal) -> OrderStatus {
    match status {
        "Filled" | "PartiallyFilledCanceled" => OrderStatus::Completed,
        "Cancelled" | "Deactivated" if executed > Decimal::ZERO => OrderStatus::Completed,
        "Cancelled" | "Rejected" | "Deactivated" => OrderStatus::Failed,
        _ => OrderStatus::InProgress,
    }
}

fn map_withdrawal_status(status: &str) -> WithdrawalStatus {
    match status {
        "success" | "BlockchainConfirmed" => WithdrawalStatus::Completed,
        "CancelByUser" | "Reject" | "Fail" => WithdrawalStatus::Failed,
        "MoreInformationRequired" => WithdrawalStatus::Recovery,
        _ => WithdrawalStatus::InProgress,
    }
}

// ============================================================================
// Venue 구현
// ============================================================================

pub struct BybitVenue {
    identity: ExchangeIdentity,
    adapter: ProtocolAdapter,
}

impl BybitVenue {
    pub fn new(identity: ExchangeIdentity, ctx: &ClientContext) -> ExchangeResult<Self> {
        let signer = ctx.credential.as_ref().map(|credential| {
            Arc::new(HeaderHmacSigner::new(
                credential.clone(),
                ctx.exchange.recv_window_ms,
            )) as Arc<dyn Signer>
        });
        let adapter = build_adapter(&identity, ctx, quotas(), Arc::new(BybitErrorDecoder), signer)?;
        Ok(Self { identity, adapter })
    }

    /// 응답 봉투를 벗겨 `result`만 반환.
    async fn call<T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        params: RequestParams,
        requires_auth: bool,
    ) -> ExchangeResult<T> {
        let envelope: Envelope<T> = self.adapter.call(method, path, params, requires_auth).await?;
        Ok(envelope.result)
    }

    async fn instruments_with(&self, params: RequestParams) -> ExchangeResult<Vec<Instrument>> {
        let result: ListResult<InstrumentInfo> = self
            .call(
                Method::GET,
                "/v5/market/instruments-info",
                params.query("category", "spot"),
                false,
            )
            .await?;
        Ok(result
            .list
            .into_iter()
            .map(InstrumentInfo::into_instrument)
            .collect())
    }

    async fn find_order(&self, path: &str, order_id: &str) -> ExchangeResult<Option<OrderRow>> {
        let result: ListResult<OrderRow> = self
            .call(
                Method::GET,
                path,
                RequestParams::new()
                    .query("category", "spot")
                    .query("orderId", order_id),
                true,
            )
            .await?;
        Ok(result.list.into_iter().next())
    }
}

#[async_trait]
impl Venue for BybitVenue {
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
        SubAccount::Unified
    }

    fn withdrawal_account(&self) -> SubAccount {
        SubAccount::Funding
    }

    async fn verify_credentials(&self) -> ExchangeResult<()> {
        let info: ApiKeyInfo = self
            .call(Method::GET, "/v5/user/query-api", RequestParams::new(), true)
            .await?;

        if info.ips.is_empty() || info.ips.iter().any(|ip| ip == "*") {
            return Err(ExchangeError::InvalidIpWhitelist(
                "IP 제한이 설정되지 않은 API 키".to_string(),
            ));
        }
        if info.read_only == 1
            || !info.has_permission("Spot", "SpotTrade")
            || !info.has_permission("Wallet", "AccountTransfer")
            || !info.has_permission("Wallet", "Withdraw")
        {
            return Err(ExchangeError::IncorrectPermissions(
                "현물 거래/계정 이체/출금 권한 필요".to_string(),
            ));
        }
        Ok(())
    }

    async fn sub_account_balances(
        &self,
        account: SubAccount,
    ) -> ExchangeResult<HashMap<String, Decimal>> {
        let balances: HashMap<String, Decimal> = match account {
            SubAccount::Unified => {
                let result: ListResult<UnifiedAccount> = self
                    .call(
                        Method::GET,
                        "/v5/account/wallet-balance",
                        RequestParams::new().query("accountType", "UNIFIED"),
                        true,
                    )
                    .await?;
                result
                    .list
                    .into_iter()
                    .flat_map(|a| a.coin)
                    .map(|c| {
                        let available =
                            parse_decimal(&c.wallet_balance) - parse_decimal(&c.locked);
                        (c.coin.to_uppercase(), available)
                    })
                    .collect()
            }
            SubAccount::Funding => {
                let result: FundBalances = self
                    .call(
                        Method::GET,
                        "/v5/asset/transfer/query-account-coins-balance",
                        RequestParams::new().query("accountType", "FUND"),
                        true,
                    )
                    .await?;
                result
                    .balance
                    .into_iter()
                    .map(|c| (c.coin.to_uppercase(), parse_decimal(&c.transfer_balance)))
                    .collect()
            }
            other => {
                return Err(ExchangeError::NotSupported(format!("bybit {} 계정", other)))
            }
        };
        Ok(balances
            .into_iter()
            .filter(|(_, amount)| *amount > Decimal::ZERO)
            .collect())
    }

    async fn transfer(
        &self,
        ticker: &str,
        amount: Decimal,
        from: SubAccount,
        to: SubAccount,
    ) -> ExchangeResult<()> {
        let body = json!({
            "transferId": Uuid::new_v4().to_string(),
            "coin": ticker.to_uppercase(),
            "amount": amount.to_string(),
            "fromAccountType": account_type(from)?,
            "toAccountType": account_type(to)?,
        });
        let result: TransferResult = self
            .call(
                Method::POST,
                "/v5/asset/transfer/inter-transfer",
                RequestParams::new().json(body),
                true,
            )
            .await?;
        tracing::debug!(transfer_id = %result.transfer_id, "bybit 내부 이체 완료");
        Ok(())
    }

    async fn instruments(&self) -> ExchangeResult<Vec<Instrument>> {
        self.instruments_with(RequestParams::new().query("limit", 1000))
            .await
    }

    async fn instrument(&self, symbol: &str) -> ExchangeResult<Instrument> {
        self.instruments_with(RequestParams::new().query("symbol", symbol.to_uppercase()))
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| ExchangeError::NotFound(format!("심볼 {}", symbol)))
    }

    async fn last_price(&self, symbol: &str) -> ExchangeResult<Decimal> {
        let result: ListResult<Ticker> = self
            .call(
                Method::GET,
                "/v5/market/tickers",
                RequestParams::new()
                    .query("category", "spot")
                    .query("symbol", symbol.to_uppercase()),
                false,
            )
            .await?;
        result
            .list
            .first()
            .map(|t| parse_decimal(&t.last_price))
            .ok_or_else(|| ExchangeError::NotFound(format!("시세 {}", symbol)))
    }

    async fn place_market_order(&self, order: &MarketOrder) -> ExchangeResult<String> {
        let (side, market_unit) = match order.side {
            Side::Sell => ("Sell", "baseCoin"),
            Side::Buy => ("Buy", "quoteCoin"),
        };
        let body = json!({
            "category": "spot",
            "symbol": order.symbol.to_uppercase(),
            "side": side,
            "orderType": "Market",
            "qty": order.amount.to_string(),
            "marketUnit": market_unit,
            "orderLinkId": order.client_order_id,
        });
        let created: OrderCreated = self
            .call(
                Method::POST,
                "/v5/order/create",
                RequestParams::new().json(body),
                true,
            )
            .await?;
        Ok(created.order_id)
    }

    async fn query_order(&self, query: &OrderQuery) -> ExchangeResult<VenueOrder> {
        // 체결이 끝난 주문은 실시간 목록에서 빠지므로 이력도 조회합니다.
        let row = match self
            .find_order("/v5/order/realtime", &query.exchange_order_id)
            .await?
        {
            Some(row) => row,
            None => self
                .find_order("/v5/order/history", &query.exchange_order_id)
                .await?
                .ok_or_else(|| {
                    ExchangeError::NotFound(format!("주문 {}", query.exchange_order_id))
                })?,
        };

        let filled_base = parse_decimal(&row.cum_exec_qty);
        Ok(VenueOrder {
            status: map_order_status(&row.order_status, filled_base),
            filled_base,
            filled_quote: parse_decimal(&row.cum_exec_value),
            raw_status: row.order_status,
        })
    }

    async fn chain_infos(&self, ticker: &str) -> ExchangeResult<Vec<ChainInfo>> {
        let result: RowsResult<CoinInfo> = self
            .call(
                Method::GET,
                "/v5/asset/coin/query-info",
                RequestParams::new().query("coin", ticker.to_uppercase()),
                true,
            )
            .await?;

        let coin = result
            .rows
            .into_iter()
            .find(|c| c.coin.eq_ignore_ascii_case(ticker))
            .ok_or_else(|| ExchangeError::NotFound(format!("통화 {}", ticker)))?;

        Ok(coin
            .chains
            .into_iter()
            .map(|c| {
                let percentage = parse_decimal(&c.withdraw_percentage_fee);
                ChainInfo {
                    ticker: coin.coin.to_uppercase(),
                    withdraw_enabled: c.chain_withdraw == "1",
                    deposit_enabled: c.chain_deposit == "1",
                    min_withdrawal: parse_decimal(&c.withdraw_min),
                    max_withdrawal: Decimal::ZERO,
                    min_deposit: parse_decimal(&c.deposit_min),
                    fee: if percentage > Decimal::ZERO {
                        WithdrawalFee::Percentage(percentage)
                    } else {
                        WithdrawalFee::Fixed(parse_decimal(&c.withdraw_fee))
                    },
                    confirmations: c.confirmation.trim().parse().unwrap_or(0),
                    precision: c.min_accuracy.trim().parse().unwrap_or(8),
                    chain: c.chain,
                }
            })
            .collect())
    }

    async fn deposit_address(&self, ticker: &str, chain: &str) -> ExchangeResult<DepositAddress> {
        let result: DepositAddressResult = self
            .call(
                Method::GET,
                "/v5/asset/deposit/query-address",
                RequestParams::new()
                    .query("coin", ticker.to_uppercase())
                    .query("chainType", chain),
                true,
            )
            .await?;

        let found = result
            .chains
            .into_iter()
            .find(|c| c.chain.eq_ignore_ascii_case(chain))
            .ok_or_else(|| ExchangeError::NotFound(format!("{} {} 입금 주소", ticker, chain)))?;

        Ok(DepositAddress {
            ticker: ticker.to_uppercase(),
            chain: found.chain,
            address: found.address_deposit,
            tag: (!found.tag_deposit.is_empty()).then_some(found.tag_deposit),
        })
    }

    async fn submit_withdrawal(&self, request: &WithdrawalSubmit) -> ExchangeResult<String> {
        let mut body = json!({
            "coin": request.ticker.to_uppercase(),
            "chain": request.chain,
            "address": request.address,
            "amount": request.amount.to_string(),
            "timestamp": chrono::Utc::now().timestamp_millis(),
            "accountType": "FUND",
            "requestId": request.client_id,
        });
        if let Some(tag) = &request.tag {
            body["tag"] = json!(tag);
        }

        let created: WithdrawCreated = self
            .call(
                Method::POST,
                "/v5/asset/withdraw/create",
                RequestParams::new().json(body),
                true,
            )
            .await?;
        Ok(created.id)
    }

    async fn query_withdrawal(&self, query: &WithdrawalQuery) -> ExchangeResult<WithdrawalDetails> {
        let result: RowsResult<WithdrawRow> = self
            .call(
                Method::GET,
                "/v5/asset/withdraw/query-record",
                RequestParams::new().query("withdrawID", &query.exchange_order_id),
                true,
            )
            .await?;

        let row = result
            .rows
            .into_iter()
            .find(|r| r.withdraw_id == query.exchange_order_id)
            .ok_or_else(|| ExchangeError::NotFound(format!("출금 {}", query.exchange_order_id)))?;

        Ok(WithdrawalDetails {
            status: map_withdrawal_status(&row.status),
            tx_hash: (!row.tx_id.is_empty()).then_some(row.tx_id),
            amount: Some(parse_decimal(&row.amount)),
            fee: Some(parse_decimal(&row.withdraw_fee)),
            raw_status: row.status,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use rust_decimal_macros::dec;

    #[test]
    fn test_ret_code_decoding() {
        let decoder = BybitErrorDecoder;
        assert!(decoder
            .decode(StatusCode::OK, r#"{"retCode":0,"retMsg":"OK","result":{}}"#)
            .is_none());

        // HTTP 200이어도 retCode가 0이 아니면 에러
        let err = decoder
            .decode(
                StatusCode::OK,
                r#"{"retCode":10010,"retMsg":"Unmatched IP","result":{}}"#,
            )
            .unwrap();
        assert_eq!(err.kind(), ErrorKind::InvalidIPWhitelist);

        let err = decoder
            .decode(StatusCode::OK, r#"{"retCode":131212,"retMsg":"locked"}"#)
            .unwrap();
        assert_eq!(err.kind(), ErrorKind::WithdrawalBalanceLocked);
    }

    #[test]
    fn test_instrument_parsing() {
        let info: InstrumentInfo = serde_json::from_str(
            r#"{
                "symbol": "ETHUSDT",
                "baseCoin": "ETH",
                "quoteCoin": "USDT",
                "status": "Trading",
                "lotSizeFilter": {
                    "basePrecision": "0.00001",
                    "quotePrecision": "0.0000001",
                    "minOrderQty": "0.00062",
                    "maxOrderQty": "1000",
                    "minOrderAmt": "1",
                    "maxOrderAmt": "2000000"
                },
                "priceFilter": {"tickSize": "0.01"}
            }"#,
        )
        .unwrap();
        let instrument = info.into_instrument();
        assert_eq!(instrument.amount_precision, 5);
        assert_eq!(instrument.value_precision, 7);
        assert_eq!(instrument.min_qty, Some(dec!(0.00062)));
        assert!(instrument.is_tradable());
    }

    #[test]
    fn test_status_mapping() {
        assert_eq!(
            map_order_status("PartiallyFilledCanceled", dec!(0.1)),
            OrderStatus::Completed
        );
        assert_eq!(map_order_status("Cancelled", Decimal::ZERO), OrderStatus::Failed);
        assert_eq!(map_order_status("New", Decimal::ZERO), OrderStatus::InProgress);
        assert_eq!(map_withdrawal_status("success"), WithdrawalStatus::Completed);
        assert_eq!(map_withdrawal_status("Reject"), WithdrawalStatus::Failed);
        assert_eq!(map_withdrawal_status("SecurityCheck"), WithdrawalStatus::InProgress);
    }

    #[test]
    fn test_account_types() {
        assert_eq!(account_type(SubAccount::Funding).unwrap(), "FUND");
        assert!(account_type(SubAccount::Main).is_err());
    }
}
