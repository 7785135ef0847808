//! Binance 현물 커넥터.
//!
//! 서명 방식 A (쿼리 HMAC-SHA256). 현물 계정에서 거래와 출금을 모두 하며,
//! 펀딩 계정 잔고는 필요할 때 현물 계정으로 이체합니다.

use async_trait::async_trait;
use reqwest::{Method, StatusCode};
use rust_decimal::Decimal;
use serde::Deserialize;
use settle_core::{
    parse_decimal, precision_of_step, ExchangeIdentity, OrderStatus, Side, SubAccount,
    WithdrawalFee, WithdrawalStatus,
};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

use super::build_adapter;
use crate::adapter::{ErrorDecoder, ProtocolAdapter, RequestParams};
use crate::client::SpotClient;
use crate::error::{ExchangeError, ExchangeResult};
use crate::factory::ClientContext;
use crate::rate_limit::{Quota, QuotaTable};
use crate::signer::{QueryHmacSigner, Signer};
use crate::traits::{DepositAddress, ExchangeClient, OrderQuery, WithdrawalDetails, WithdrawalQuery};
use crate::venue::{
    ChainInfo, Instrument, InstrumentStatus, MarketOrder, Venue, VenueOrder, WithdrawalSubmit,
};

/// REST API 기본 URL.
pub const BASE_URL: &str = "https://api.binance.com";

const SUB_ACCOUNTS: &[SubAccount] = &[SubAccount::Spot, SubAccount::Funding];

pub fn identity() -> ExchangeIdentity {
    ExchangeIdentity::new("binance", "Binance", BASE_URL)
}

/// `ClientContext`로 Binance 클라이언트를 생성합니다.
pub fn build(
    identity: &ExchangeIdentity,
    ctx: ClientContext,
) -> ExchangeResult<Arc<dyn ExchangeClient>> {
    let venue = BinanceVenue::new(identity.clone(), &ctx)?;
    let client = SpotClient::new(venue, ctx.converter, ctx.currency_map, ctx.settings);
    Ok(match ctx.connection_hash {
        Some(hash) => Arc::new(client.with_connection_hash(hash)),
        None => Arc::new(client),
    })
}

fn quotas() -> QuotaTable {
    QuotaTable::new(Quota::per_second(20))
        .with("/api/v3/order", Quota::per_second(10))
        .with("/api/v3/exchangeInfo", Quota::per_minute(60))
        .with("/sapi/v1/capital/config/getall", Quota::per_second(2))
        .with("/sapi/v1/capital/withdraw/apply", Quota::per_second(5))
        .with("/sapi/v1/asset/transfer", Quota::per_second(5))
}

// ============================================================================
// 에러 디코딩
// ============================================================================

#[derive(Debug, Deserialize)]
struct BinanceErrorBody {
    code: i64,
    #[serde(default)]
    msg: String,
}

/// Binance 에러 응답 디코더.
pub struct BinanceErrorDecoder;

impl BinanceErrorDecoder {
    /// Binance 에러 코드를 `ExchangeError`로 매핑.
    pub fn map_code(code: i64, msg: &str) -> ExchangeError {
        let msg = msg.to_string();
        match code {
            -1003 | -1015 => ExchangeError::RateLimited(msg),
            -1001 | -1007 | -1021 => ExchangeError::Network(msg),
            -1002 | -4007 => ExchangeError::IncorrectPermissions(msg),
            -1022 | -2014 | -2015 => ExchangeError::InvalidCredentials(msg),
            -1121 => ExchangeError::NotFound(msg),
            // 필터 위반 (대부분 최소 주문 금액 미달)
            -1013 | -2010 => ExchangeError::InsufficientBalance(msg),
            -4003 | -4004 => ExchangeError::MinWithdrawalNotMet(msg),
            -4006 => ExchangeError::WithdrawalAddressNotWhitelisted(msg),
            -4014 => ExchangeError::SecurityActionLock(msg),
            -4019 => ExchangeError::ChainSuspended(msg),
            -4026 => ExchangeError::WithdrawalBalanceLocked(msg),
            _ => ExchangeError::Exchange {
                code: code.to_string(),
                message: msg,
            },
        }
    }
}

impl ErrorDecoder for BinanceErrorDecoder {
    fn decode(&self, status: StatusCode, body: &str) -> Option<ExchangeError> {
        if status == StatusCode::IM_A_TEAPOT {
            return Some(ExchangeError::RateLimited("IP 차단됨 (418)".to_string()));
        }
        let parsed: BinanceErrorBody = serde_json::from_str(body).ok()?;
        if parsed.code >= 0 && status.is_success() {
            return None;
        }
        Some(Self::map_code(parsed.code, &parsed.msg))
    }
}

// ============================================================================
// API 응답 타입
// ============================================================================

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ApiRestrictions {
    ip_restrict: bool,
    enable_reading: bool,
    #[serde(default)]
    enable_withdrawals: bool,
    #[serde(default)]
    enable_spot_and_margin_trading: bool,
}

#[derive(Debug, Deserialize)]
struct SpotAccount {
    balances: Vec<AssetBalance>,
}

#[derive(Debug, Deserialize)]
struct AssetBalance {
    asset: String,
    free: Decimal,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TransferResponse {
    tran_id: i64,
}

#[derive(Debug, Deserialize)]
struct ExchangeInfo {
    symbols: Vec<SymbolInfo>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SymbolInfo {
    symbol: String,
    status: String,
    base_asset: String,
    quote_asset: String,
    #[serde(default = "default_precision")]
    quote_asset_precision: u32,
    #[serde(default)]
    filters: Vec<SymbolFilter>,
}

fn default_precision() -> u32 {
    8
}

#[derive(Debug, Deserialize)]
#[serde(tag = "filterType", rename_all = "SCREAMING_SNAKE_CASE")]
enum SymbolFilter {
    LotSize {
        #[serde(rename = "minQty")]
        min_qty: Decimal,
        #[serde(rename = "maxQty")]
        max_qty: Decimal,
        #[serde(rename = "stepSize")]
        step_size: Decimal,
    },
    PriceFilter {
        #[serde(rename = "tickSize")]
        tick_size: Decimal,
    },
    Notional {
        #[serde(rename = "minNotional")]
        min_notional: Decimal,
        #[serde(rename = "maxNotional", default)]
        max_notional: Decimal,
    },
    MinNotional {
        #[serde(rename = "minNotional")]
        min_notional: Decimal,
    },
    #[serde(other)]
    Other,
}

impl SymbolInfo {
    fn into_instrument(self) -> Instrument {
        let mut instrument = Instrument {
            status: if self.status == "TRADING" {
                InstrumentStatus::Trading
            } else {
                InstrumentStatus::Halted
            },
            symbol: self.symbol,
            base: self.base_asset,
            quote: self.quote_asset,
            min_qty: None,
            max_qty: Decimal::ZERO,
            min_notional: Decimal::ZERO,
            max_notional: Decimal::ZERO,
            amount_precision: 8,
            value_precision: self.quote_asset_precision,
            price_precision: 8,
        };

        for filter in self.filters {
            match filter {
                SymbolFilter::LotSize {
                    min_qty,
                    max_qty,
                    step_size,
                } => {
                    instrument.min_qty = Some(min_qty);
                    instrument.max_qty = max_qty;
                    instrument.amount_precision = precision_of_step(step_size);
                }
                SymbolFilter::PriceFilter { tick_size } => {
                    instrument.price_precision = precision_of_step(tick_size);
                }
                SymbolFilter::Notional {
                    min_notional,
                    max_notional,
                } => {
                    instrument.min_notional = min_notional;
                    instrument.max_notional = max_notional;
                }
                SymbolFilter::MinNotional { min_notional } => {
                    instrument.min_notional = min_notional;
                }
                SymbolFilter::Other => {}
            }
        }
        instrument
    }
}

#[derive(Debug, Deserialize)]
struct TickerPrice {
    price: Decimal,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct OrderAck {
    order_id: i64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct OrderInfo {
    status: String,
    executed_qty: Decimal,
    cummulative_quote_qty: Decimal,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CoinConfig {
    coin: String,
    #[serde(default)]
    network_list: Vec<NetworkConfig>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct NetworkConfig {
    network: String,
    withdraw_enable: bool,
    deposit_enable: bool,
    withdraw_fee: Decimal,
    withdraw_min: Decimal,
    withdraw_max: Decimal,
    #[serde(default)]
    withdraw_integer_multiple: String,
    #[serde(default)]
    min_confirm: u32,
}

#[derive(Debug, Deserialize)]
struct DepositAddressResponse {
    address: String,
    #[serde(default)]
    tag: String,
}

#[derive(Debug, Deserialize)]
struct WithdrawApply {
    id: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WithdrawRecord {
    id: String,
    amount: Decimal,
    #[serde(default)]
    transaction_fee: Decimal,
    status: i32,
    #[serde(default)]
    tx_id: Option<String>,
    #[serde(default)]
    withdraw_order_id: Option<String>,
}

/// 주문 상태 매핑. 부분 체결 후 만료된 시장가 주문은 완료로 봅니다.
fn map_order_status(status: &str, executed: Decimal) -> OrderStatus {
    match status {
        "FILLED" => OrderStatus::Completed,
        "CANCELED" | "EXPIRED" | "EXPIRED_IN_MATCH" if executed > Decimal::ZERO => {
            OrderStatus::Completed
        }
        "CANCELED" | "REJECTED" | "EXPIRED" | "EXPIRED_IN_MATCH" => OrderStatus::Failed,
        _ => OrderStatus::InProgress,
    }
}

/// 출금 상태 매핑.
///
/// 0: 이메일 확인 대기, 1: 취소, 2: 승인 대기, 3: 거부, 4: 처리 중, 5: 실패, 6: 완료
fn map_withdrawal_status(status: i32) -> WithdrawalStatus {
    match status {
        6 => WithdrawalStatus::Completed,
        1 | 3 | 5 => WithdrawalStatus::Failed,
        0 => WithdrawalStatus::Recovery,
        _ => WithdrawalStatus::InProgress,
    }
}

// ============================================================================
// Venue 구현
// ============================================================================

/// Binance 저수준 API.
pub struct BinanceVenue {
    identity: ExchangeIdentity,
    adapter: ProtocolAdapter,
}

impl BinanceVenue {
    pub fn new(identity: ExchangeIdentity, ctx: &ClientContext) -> ExchangeResult<Self> {
        let signer = ctx.credential.as_ref().map(|credential| {
            Arc::new(QueryHmacSigner::new(
                credential.clone(),
                ctx.exchange.recv_window_ms,
            )) as Arc<dyn Signer>
        });
        let adapter =
            build_adapter(&identity, ctx, quotas(), Arc::new(BinanceErrorDecoder), signer)?;
        Ok(Self { identity, adapter })
    }

    async fn spot_balances(&self) -> ExchangeResult<HashMap<String, Decimal>> {
        let account: SpotAccount = self
            .adapter
            .call(
                Method::GET,
                "/api/v3/account",
                RequestParams::new().query("omitZeroBalances", "true"),
                true,
            )
            .await?;
        Ok(account
            .balances
            .into_iter()
            .filter(|b| b.free > Decimal::ZERO)
            .map(|b| (b.asset.to_uppercase(), b.free))
            .collect())
    }

    async fn funding_balances(&self) -> ExchangeResult<HashMap<String, Decimal>> {
        let assets: Vec<AssetBalance> = self
            .adapter
            .call(
                Method::POST,
                "/sapi/v1/asset/get-funding-asset",
                RequestParams::new(),
                true,
            )
            .await?;
        Ok(assets
            .into_iter()
            .filter(|b| b.free > Decimal::ZERO)
            .map(|b| (b.asset.to_uppercase(), b.free))
            .collect())
    }
}

#[async_trait]
impl Venue for BinanceVenue {
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
        let restrictions: ApiRestrictions = self
            .adapter
            .call(
                Method::GET,
                "/sapi/v1/account/apiRestrictions",
                RequestParams::new(),
                true,
            )
            .await?;

        if !restrictions.ip_restrict {
            return Err(ExchangeError::InvalidIpWhitelist(
                "IP 제한이 설정되지 않은 API 키".to_string(),
            ));
        }
        if !restrictions.enable_reading
            || !restrictions.enable_spot_and_margin_trading
            || !restrictions.enable_withdrawals
        {
            return Err(ExchangeError::IncorrectPermissions(
                "읽기/현물 거래/출금 권한 필요".to_string(),
            ));
        }
        Ok(())
    }

    async fn sub_account_balances(
        &self,
        account: SubAccount,
    ) -> ExchangeResult<HashMap<String, Decimal>> {
        match account {
            SubAccount::Spot => self.spot_balances().await,
            SubAccount::Funding => self.funding_balances().await,
            other => Err(ExchangeError::NotSupported(format!("binance {} 계정", other))),
        }
    }

    async fn transfer(
        &self,
        ticker: &str,
        amount: Decimal,
        from: SubAccount,
        to: SubAccount,
    ) -> ExchangeResult<()> {
        let transfer_type = match (from, to) {
            (SubAccount::Funding, SubAccount::Spot) => "FUNDING_MAIN",
            (SubAccount::Spot, SubAccount::Funding) => "MAIN_FUNDING",
            _ => {
                return Err(ExchangeError::NotSupported(format!(
                    "binance 이체 {} -> {}",
                    from, to
                )))
            }
        };

        let response: TransferResponse = self
            .adapter
            .call(
                Method::POST,
                "/sapi/v1/asset/transfer",
                RequestParams::new()
                    .query("type", transfer_type)
                    .query("asset", ticker.to_uppercase())
                    .query("amount", amount),
                true,
            )
            .await?;
        debug!(tran_id = response.tran_id, "binance 내부 이체 완료");
        Ok(())
    }

    async fn instruments(&self) -> ExchangeResult<Vec<Instrument>> {
        let info: ExchangeInfo = self
            .adapter
            .call(
                Method::GET,
                "/api/v3/exchangeInfo",
                RequestParams::new(),
                false,
            )
            .await?;
        Ok(info
            .symbols
            .into_iter()
            .map(SymbolInfo::into_instrument)
            .collect())
    }

    async fn instrument(&self, symbol: &str) -> ExchangeResult<Instrument> {
        let info: ExchangeInfo = self
            .adapter
            .call(
                Method::GET,
                "/api/v3/exchangeInfo",
                RequestParams::new().query("symbol", symbol.to_uppercase()),
                false,
            )
            .await?;
        info.symbols
            .into_iter()
            .next()
            .map(SymbolInfo::into_instrument)
            .ok_or_else(|| ExchangeError::NotFound(format!("심볼 {}", symbol)))
    }

    async fn last_price(&self, symbol: &str) -> ExchangeResult<Decimal> {
        let ticker: TickerPrice = self
            .adapter
            .call(
                Method::GET,
                "/api/v3/ticker/price",
                RequestParams::new().query("symbol", symbol.to_uppercase()),
                false,
            )
            .await?;
        Ok(ticker.price)
    }

    async fn place_market_order(&self, order: &MarketOrder) -> ExchangeResult<String> {
        let amount_key = match order.side {
            Side::Sell => "quantity",
            Side::Buy => "quoteOrderQty",
        };
        let ack: OrderAck = self
            .adapter
            .call(
                Method::POST,
                "/api/v3/order",
                RequestParams::new()
                    .query("symbol", order.symbol.to_uppercase())
                    .query("side", order.side)
                    .query("type", "MARKET")
                    .query(amount_key, order.amount)
                    .query("newClientOrderId", &order.client_order_id),
                true,
            )
            .await?;
        Ok(ack.order_id.to_string())
    }

    async fn query_order(&self, query: &OrderQuery) -> ExchangeResult<VenueOrder> {
        let info: OrderInfo = self
            .adapter
            .call(
                Method::GET,
                "/api/v3/order",
                RequestParams::new()
                    .query("symbol", query.symbol.to_uppercase())
                    .query("orderId", &query.exchange_order_id),
                true,
            )
            .await?;
        Ok(VenueOrder {
            status: map_order_status(&info.status, info.executed_qty),
            filled_base: info.executed_qty,
            filled_quote: info.cummulative_quote_qty,
            raw_status: info.status,
        })
    }

    async fn chain_infos(&self, ticker: &str) -> ExchangeResult<Vec<ChainInfo>> {
        let coins: Vec<CoinConfig> = self
            .adapter
            .call(
                Method::GET,
                "/sapi/v1/capital/config/getall",
                RequestParams::new(),
                true,
            )
            .await?;

        let coin = coins
            .into_iter()
            .find(|c| c.coin.eq_ignore_ascii_case(ticker))
            .ok_or_else(|| ExchangeError::NotFound(format!("통화 {}", ticker)))?;

        Ok(coin
            .network_list
            .into_iter()
            .map(|n| ChainInfo {
                ticker: coin.coin.to_uppercase(),
                chain: n.network,
                withdraw_enabled: n.withdraw_enable,
                deposit_enabled: n.deposit_enable,
                min_withdrawal: n.withdraw_min,
                max_withdrawal: n.withdraw_max,
                min_deposit: Decimal::ZERO,
                fee: WithdrawalFee::Fixed(n.withdraw_fee),
                confirmations: n.min_confirm,
                precision: match parse_decimal(&n.withdraw_integer_multiple) {
                    step if step > Decimal::ZERO => precision_of_step(step),
                    _ => 8,
                },
            })
            .collect())
    }

    async fn deposit_address(&self, ticker: &str, chain: &str) -> ExchangeResult<DepositAddress> {
        let response: DepositAddressResponse = self
            .adapter
            .call(
                Method::GET,
                "/sapi/v1/capital/deposit/address",
                RequestParams::new()
                    .query("coin", ticker.to_uppercase())
                    .query("network", chain),
                true,
            )
            .await?;
        Ok(DepositAddress {
            ticker: ticker.to_uppercase(),
            chain: chain.to_string(),
            address: response.address,
            tag: (!response.tag.is_empty()).then_some(response.tag),
        })
    }

    async fn submit_withdrawal(&self, request: &WithdrawalSubmit) -> ExchangeResult<String> {
        let response: WithdrawApply = self
            .adapter
            .call(
                Method::POST,
                "/sapi/v1/capital/withdraw/apply",
                RequestParams::new()
                    .query("coin", request.ticker.to_uppercase())
                    .query("network", &request.chain)
                    .query("address", &request.address)
                    .query_opt("addressTag", request.tag.as_ref())
                    .query("amount", request.amount)
                    .query("withdrawOrderId", &request.client_id),
                true,
            )
            .await?;
        Ok(response.id)
    }

    async fn query_withdrawal(&self, query: &WithdrawalQuery) -> ExchangeResult<WithdrawalDetails> {
        let records: Vec<WithdrawRecord> = self
            .adapter
            .call(
                Method::GET,
                "/sapi/v1/capital/withdraw/history",
                RequestParams::new()
                    .query("coin", query.ticker.to_uppercase())
                    .query("withdrawOrderId", &query.internal_order_id),
                true,
            )
            .await?;

        let record = records
            .into_iter()
            .find(|r| {
                r.id == query.exchange_order_id
                    || r.withdraw_order_id.as_deref() == Some(query.internal_order_id.as_str())
            })
            .ok_or_else(|| ExchangeError::NotFound(format!("출금 {}", query.exchange_order_id)))?;

        Ok(WithdrawalDetails {
            status: map_withdrawal_status(record.status),
            tx_hash: record.tx_id.filter(|t| !t.is_empty()),
            amount: Some(record.amount),
            fee: Some(record.transaction_fee),
            raw_status: record.status.to_string(),
        })
    }
}
