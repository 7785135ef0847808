//! 공통 현물 클라이언트.
//!
//! `Venue` 프리미티브 위에 `ExchangeClient` 계약을 한 번만 구현합니다.
//! 잔고 합산, 주문 규칙 계산, 전체 잔고 시장가 주문, 출금 감액 재시도가
//! 모든 거래소에서 동일하게 동작합니다.

use async_trait::async_trait;
use rust_decimal::Decimal;
use settle_core::{
    AmountExt, ConnectionHash, CurrencyBalance, CurrencyChain, CurrencyConverter, CurrencyMap,
    OrderRule, Side, SubAccount, WithdrawalConfig, WithdrawalRule,
};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::{ErrorKind, ExchangeError, ExchangeResult};
use crate::filters::{is_fiat, is_leveraged_token, normalize_deposit_address};
use crate::traits::{
    DepositAddress, ExchangeClient, OrderDetails, OrderQuery, SpotOrderResult, SymbolEntry,
    WithdrawalDetails, WithdrawalParams, WithdrawalQuery, WithdrawalResult,
};
use crate::venue::{MarketOrder, Venue, WithdrawalSubmit};

/// 클라이언트 공통 설정.
#[derive(Debug, Clone)]
pub struct ClientSettings {
    /// 기준 법정화폐
    pub fiat_currency: String,
    /// 출금 감액 단위
    pub step_amount: Decimal,
    /// 감액 단위 통화
    pub step_currency: String,
    /// 최소 입금액 합성 기준
    pub min_deposit_reference: Decimal,
}

impl Default for ClientSettings {
    fn default() -> Self {
        Self::new("USD", &WithdrawalConfig::default())
    }
}

impl ClientSettings {
    pub fn new(fiat_currency: impl Into<String>, withdrawal: &WithdrawalConfig) -> Self {
        Self {
            fiat_currency: fiat_currency.into(),
            step_amount: withdrawal.step_amount,
            step_currency: withdrawal.step_currency.clone(),
            min_deposit_reference: withdrawal.min_deposit_reference,
        }
    }
}

/// 하위 계정별 잔고 합산 결과.
#[derive(Debug, Clone, Default)]
struct Holdings {
    total: Decimal,
    breakdown: Vec<(SubAccount, Decimal)>,
}

/// `Venue` 기반 통합 현물 클라이언트.
pub struct SpotClient<V: Venue> {
    venue: V,
    converter: Arc<dyn CurrencyConverter>,
    currency_map: CurrencyMap,
    settings: ClientSettings,
    connection_hash: Option<ConnectionHash>,
}

impl<V: Venue> SpotClient<V> {
    pub fn new(
        venue: V,
        converter: Arc<dyn CurrencyConverter>,
        currency_map: CurrencyMap,
        settings: ClientSettings,
    ) -> Self {
        Self {
            venue,
            converter,
            currency_map,
            settings,
            connection_hash: None,
        }
    }

    pub fn with_connection_hash(mut self, hash: ConnectionHash) -> Self {
        self.connection_hash = Some(hash);
        self
    }

    pub fn venue(&self) -> &V {
        &self.venue
    }

    fn require_auth(&self) -> ExchangeResult<()> {
        if self.venue.is_authenticated() {
            Ok(())
        } else {
            Err(ExchangeError::InvalidCredentials(format!(
                "{}: 자격증명 없는 클라이언트",
                self.slug()
            )))
        }
    }

    /// 모든 하위 계정의 잔고를 티커별로 합산합니다.
    async fn collect_holdings(&self) -> ExchangeResult<BTreeMap<String, Holdings>> {
        let mut holdings: BTreeMap<String, Holdings> = BTreeMap::new();
        for account in self.venue.sub_accounts() {
            let balances = self.venue.sub_account_balances(*account).await?;
            for (ticker, amount) in balances {
                if amount <= Decimal::ZERO {
                    continue;
                }
                let entry = holdings.entry(ticker.to_uppercase()).or_default();
                entry.total += amount;
                entry.breakdown.push((*account, amount));
            }
        }
        Ok(holdings)
    }

    async fn holdings_of(&self, ticker: &str) -> ExchangeResult<Holdings> {
        Ok(self
            .collect_holdings()
            .await?
            .remove(&ticker.to_uppercase())
            .unwrap_or_default())
    }

    async fn fiat_value(&self, ticker: &str, amount: Decimal) -> Option<Decimal> {
        match self
            .converter
            .convert(self.slug(), ticker, &self.settings.fiat_currency, amount)
            .await
        {
            Ok(value) => Some(value),
            Err(e) => {
                debug!(exchange = %self.slug(), ticker, error = %e, "법정화폐 환산 실패");
                None
            }
        }
    }

    async fn to_balance(&self, ticker: String, holdings: Holdings) -> CurrencyBalance {
        let fiat_value = self.fiat_value(&ticker, holdings.total).await;
        CurrencyBalance {
            ticker,
            amount: holdings.total,
            fiat_value,
            fiat_currency: self.settings.fiat_currency.clone(),
            breakdown: holdings.breakdown,
        }
    }

    /// 기준 단위(`step_currency`) 금액을 티커 단위로 환산.
    async fn reference_amount(&self, ticker: &str, amount: Decimal) -> ExchangeResult<Decimal> {
        if ticker.eq_ignore_ascii_case(&self.settings.step_currency) {
            return Ok(amount);
        }
        Ok(self
            .converter
            .convert(self.slug(), &self.settings.step_currency, ticker, amount)
            .await?)
    }

    /// 출금 감액 단위. 재시도마다 현재 환율로 다시 계산합니다.
    async fn withdrawal_step(&self, ticker: &str) -> ExchangeResult<Decimal> {
        let step = self
            .reference_amount(ticker, self.settings.step_amount)
            .await?;
        if step <= Decimal::ZERO {
            return Err(ExchangeError::Exchange {
                code: "invalid_step".to_string(),
                message: format!("{} 출금 감액 단위가 0 이하: {}", ticker, step),
            });
        }
        Ok(step)
    }

    /// 출금 계정 잔고가 부족하면 다른 하위 계정에서 이체합니다.
    async fn fund_withdrawal_account(&self, ticker: &str, amount: Decimal) -> ExchangeResult<()> {
        let target = self.venue.withdrawal_account();
        let holdings = self.holdings_of(ticker).await?;
        let available = holdings
            .breakdown
            .iter()
            .filter(|(a, _)| *a == target)
            .map(|(_, v)| *v)
            .sum::<Decimal>();

        let mut shortfall = amount - available;
        for (account, balance) in holdings.breakdown.iter().filter(|(a, _)| *a != target) {
            if shortfall <= Decimal::ZERO {
                break;
            }
            let moved = (*balance).min(shortfall);
            info!(
                exchange = %self.slug(),
                ticker,
                from = %account,
                to = %target,
                amount = %moved,
                "출금 계정으로 이체"
            );
            self.venue.transfer(ticker, moved, *account, target).await?;
            shortfall -= moved;
        }
        Ok(())
    }
}

#[async_trait]
impl<V: Venue> ExchangeClient for SpotClient<V> {
    fn slug(&self) -> &str {
        &self.venue.identity().slug
    }

    fn connection_hash(&self) -> Option<&ConnectionHash> {
        self.connection_hash.as_ref()
    }

    async fn test_connection(&self) -> ExchangeResult<()> {
        self.require_auth()?;
        self.venue.verify_credentials().await
    }

    async fn get_account_balance(&self) -> ExchangeResult<Vec<CurrencyBalance>> {
        self.require_auth()?;
        let holdings = self.collect_holdings().await?;

        let mut balances = Vec::with_capacity(holdings.len());
        for (ticker, held) in holdings {
            if !self.currency_map.is_empty() && !self.currency_map.contains_ticker(&ticker) {
                continue;
            }
            balances.push(self.to_balance(ticker, held).await);
        }
        Ok(balances)
    }

    async fn get_currency_balance(&self, ticker: &str) -> ExchangeResult<CurrencyBalance> {
        self.require_auth()?;
        let held = self.holdings_of(ticker).await?;
        Ok(self.to_balance(ticker.to_uppercase(), held).await)
    }

    async fn get_exchange_symbols(&self) -> ExchangeResult<Vec<SymbolEntry>> {
        let mut instruments: Vec<_> = self
            .venue
            .instruments()
            .await?
            .into_iter()
            .filter(|i| i.is_tradable())
            .filter(|i| !is_leveraged_token(&i.base))
            .filter(|i| !is_fiat(&i.base) && !is_fiat(&i.quote))
            .collect();
        instruments.sort_by(|a, b| a.symbol.cmp(&b.symbol));
        instruments.dedup_by(|a, b| a.symbol == b.symbol);

        let mut entries = Vec::with_capacity(instruments.len() * 2);
        for instrument in instruments {
            for side in [Side::Buy, Side::Sell] {
                let (from, to) = match side {
                    Side::Sell => (&instrument.base, &instrument.quote),
                    Side::Buy => (&instrument.quote, &instrument.base),
                };
                entries.push(SymbolEntry {
                    symbol: instrument.symbol.clone(),
                    side,
                    base_currency: instrument.base.clone(),
                    quote_currency: instrument.quote.clone(),
                    display_name: format!("{}/{}", from, to),
                });
            }
        }
        Ok(entries)
    }

    async fn get_deposit_addresses(
        &self,
        ticker: &str,
        chain: &str,
    ) -> ExchangeResult<DepositAddress> {
        self.require_auth()?;
        let infos = self.venue.chain_infos(&ticker.to_uppercase()).await?;
        if let Some(info) = infos.iter().find(|i| i.chain.eq_ignore_ascii_case(chain)) {
            if !info.deposit_enabled {
                return Err(ExchangeError::ChainSuspended(format!(
                    "{} {} 입금 중지",
                    ticker, chain
                )));
            }
        }
        let mut address = self.venue.deposit_address(ticker, chain).await?;
        address.address = normalize_deposit_address(ticker, &address.address);
        Ok(address)
    }

    async fn get_order_rule(&self, symbol: &str) -> ExchangeResult<OrderRule> {
        let instrument = self.venue.instrument(symbol).await?;
        if !instrument.is_tradable() {
            return Err(ExchangeError::SymbolTradingHalted(symbol.to_string()));
        }

        // 수량 하한과 최소 주문 금액 환산 수량 중 큰 쪽
        let min_qty = instrument.min_qty.unwrap_or_default().max(Decimal::ZERO);
        let min_order_amount = if instrument.min_notional > Decimal::ZERO {
            let price = self.venue.last_price(symbol).await?;
            if price <= Decimal::ZERO {
                return Err(ExchangeError::Parse(format!("{} 가격이 0", symbol)));
            }
            let from_notional =
                (instrument.min_notional / price).ceil_to(instrument.amount_precision);
            min_qty.max(from_notional)
        } else {
            min_qty
        };

        Ok(OrderRule {
            symbol: instrument.symbol,
            base_currency: instrument.base,
            quote_currency: instrument.quote,
            min_order_amount,
            max_order_amount: instrument.max_qty,
            min_order_value: instrument.min_notional,
            max_order_value: instrument.max_notional,
            amount_precision: instrument.amount_precision,
            value_precision: instrument.value_precision,
            price_precision: instrument.price_precision,
        })
    }

    async fn get_withdrawal_rules(
        &self,
        currencies: &[CurrencyChain],
    ) -> ExchangeResult<Vec<WithdrawalRule>> {
        let mut by_ticker: HashMap<String, Vec<_>> = HashMap::new();
        let mut rules = Vec::with_capacity(currencies.len());

        for wanted in currencies {
            let ticker = wanted.ticker.to_uppercase();
            if !by_ticker.contains_key(&ticker) {
                let infos = self.venue.chain_infos(&ticker).await?;
                by_ticker.insert(ticker.clone(), infos);
            }
            let info = by_ticker
                .get(&ticker)
                .and_then(|infos| {
                    infos
                        .iter()
                        .find(|i| i.chain.eq_ignore_ascii_case(&wanted.chain))
                })
                .cloned()
                .ok_or_else(|| {
                    ExchangeError::NotFound(format!("{} {} 체인", ticker, wanted.chain))
                })?;
            if !info.withdraw_enabled {
                return Err(ExchangeError::ChainSuspended(format!(
                    "{} {} 출금 중지",
                    ticker, info.chain
                )));
            }

            let min_deposit = if info.min_deposit > Decimal::ZERO {
                info.min_deposit
            } else {
                match self
                    .reference_amount(&ticker, self.settings.min_deposit_reference)
                    .await
                {
                    Ok(reference) => reference.ceil_to(info.precision),
                    Err(e) => {
                        warn!(
                            exchange = %self.slug(),
                            ticker = %ticker,
                            error = %e,
                            "최소 입금액 합성 실패"
                        );
                        Decimal::ZERO
                    }
                }
            };

            rules.push(WithdrawalRule {
                ticker: info.ticker,
                chain: info.chain,
                min_withdrawal: info.min_withdrawal,
                max_withdrawal: info.max_withdrawal,
                min_deposit,
                fee: info.fee,
                confirmations: info.confirmations,
                precision: info.precision,
            });
        }
        Ok(rules)
    }

    async fn create_spot_order(
        &self,
        side: Side,
        symbol: &str,
        rule: &OrderRule,
    ) -> ExchangeResult<SpotOrderResult> {
        self.require_auth()?;

        let instrument = self.venue.instrument(symbol).await?;
        if !instrument.is_tradable() {
            return Err(ExchangeError::SymbolTradingHalted(symbol.to_string()));
        }

        let spend = rule.spend_currency(side).to_string();
        let holdings = self.holdings_of(&spend).await?;
        let minimum = rule.minimum_for(side);
        if holdings.total <= Decimal::ZERO || holdings.total < minimum {
            return Err(ExchangeError::InsufficientBalance(format!(
                "{} {} < 최소 {}",
                spend, holdings.total, minimum
            )));
        }

        let trading = self.venue.trading_account();
        for (account, amount) in holdings.breakdown.iter().filter(|(a, _)| *a != trading) {
            info!(
                exchange = %self.slug(),
                ticker = %spend,
                from = %account,
                to = %trading,
                amount = %amount,
                "거래 계정으로 이체"
            );
            self.venue.transfer(&spend, *amount, *account, trading).await?;
        }

        let amount = rule.submittable(side, holdings.total);
        if amount <= Decimal::ZERO || amount < minimum {
            return Err(ExchangeError::InsufficientBalance(format!(
                "{} 정밀도 처리 후 {} < 최소 {}",
                spend, amount, minimum
            )));
        }

        let client_order_id = Uuid::new_v4().simple().to_string();
        let exchange_order_id = self
            .venue
            .place_market_order(&MarketOrder {
                symbol: symbol.to_string(),
                side,
                amount,
                client_order_id: client_order_id.clone(),
            })
            .await?;

        info!(
            exchange = %self.slug(),
            symbol,
            side = %side,
            amount = %amount,
            order_id = %exchange_order_id,
            "시장가 주문 제출"
        );

        Ok(SpotOrderResult {
            exchange_order_id,
            client_order_id,
            amount,
        })
    }

    async fn create_withdrawal_order(
        &self,
        params: &WithdrawalParams,
    ) -> ExchangeResult<WithdrawalResult> {
        self.require_auth()?;
        let rule = &params.rule;

        let mut amount = params.amount;
        if rule.max_withdrawal > Decimal::ZERO && amount > rule.max_withdrawal {
            amount = rule.max_withdrawal;
        }
        amount = amount.floor_to(rule.precision);

        if self.venue.sub_accounts().len() > 1 {
            self.fund_withdrawal_account(&params.ticker, amount).await?;
        }

        let mut attempts = 0u32;
        let mut retry_reason: Option<String> = None;

        loop {
            let submit = rule.net_amount(amount);
            if submit <= Decimal::ZERO || submit < rule.min_withdrawal {
                return Err(ExchangeError::MinWithdrawalNotMet(format!(
                    "{} {} < 최소 {}",
                    params.ticker, submit, rule.min_withdrawal
                )));
            }

            attempts += 1;
            let request = WithdrawalSubmit {
                ticker: params.ticker.clone(),
                chain: params.chain.clone(),
                address: params.address.clone(),
                tag: params.tag.clone(),
                amount: submit,
                client_id: params.internal_order_id.clone(),
            };

            match self.venue.submit_withdrawal(&request).await {
                Ok(exchange_order_id) => {
                    info!(
                        exchange = %self.slug(),
                        ticker = %params.ticker,
                        amount = %submit,
                        attempts,
                        withdrawal_id = %exchange_order_id,
                        "출금 제출"
                    );
                    return Ok(WithdrawalResult {
                        internal_order_id: params.internal_order_id.clone(),
                        exchange_order_id,
                        amount: submit,
                        fee: amount - submit,
                        retry_reason,
                        attempts,
                    });
                }
                Err(e) if e.kind() == ErrorKind::WithdrawalBalanceLocked => {
                    let step = self.withdrawal_step(&params.ticker).await?;
                    warn!(
                        exchange = %self.slug(),
                        ticker = %params.ticker,
                        amount = %submit,
                        step = %step,
                        "출금 잔고 잠김, 감액 후 재시도"
                    );
                    retry_reason = Some(format!(
                        "잔고 잠김으로 {}회 감액 재시도 ({} {} 단위)",
                        attempts, step, params.ticker
                    ));
                    amount = (amount - step).floor_to(rule.precision);
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn get_order_details(&self, query: &OrderQuery) -> ExchangeResult<OrderDetails> {
        self.require_auth()?;
        let order = self.venue.query_order(query).await?;

        let fiat = &self.settings.fiat_currency;
        let unfilled = order.filled_quote <= Decimal::ZERO && order.filled_base <= Decimal::ZERO;
        let fiat_amount = if unfilled {
            None
        } else if query.quote_currency.eq_ignore_ascii_case(fiat) {
            Some(order.filled_quote)
        } else {
            match self
                .converter
                .convert(self.slug(), &query.quote_currency, fiat, order.filled_quote)
                .await
            {
                Ok(value) => Some(value),
                Err(_) => self.fiat_value(&query.base_currency, order.filled_base).await,
            }
        };

        let reason = matches!(order.status, settle_core::OrderStatus::Failed)
            .then(|| format!("거래소 상태 {}", order.raw_status));

        Ok(OrderDetails {
            status: order.status,
            filled_amount: order.filled_base,
            amount_in_quote: order.filled_quote,
            fiat_amount,
            reason,
        })
    }

    async fn get_withdrawal_by_id(
        &self,
        query: &WithdrawalQuery,
    ) -> ExchangeResult<WithdrawalDetails> {
        self.require_auth()?;
        self.venue.query_withdrawal(query).await
    }
}
