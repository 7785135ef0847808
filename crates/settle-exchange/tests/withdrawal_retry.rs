//! 출금 감액 재시도 루프의 종료 조건 검증.

use async_trait::async_trait;
use proptest::prelude::*;
use rust_decimal::Decimal;
use settle_core::{
    ExchangeIdentity, FixedRateConverter, CurrencyMap, SubAccount, WithdrawalFee, WithdrawalRule,
};
use settle_exchange::{
    ChainInfo, ClientSettings, DepositAddress, ErrorKind, ExchangeClient, ExchangeError,
    ExchangeResult, Instrument, MarketOrder, OrderQuery, SpotClient, Venue, VenueOrder,
    WithdrawalDetails, WithdrawalParams, WithdrawalQuery, WithdrawalSubmit,
};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

/// 금액이 `accept_below` 이하가 될 때까지 잔고 잠김으로 거절하는 거래소.
struct LockedVenue {
    identity: ExchangeIdentity,
    accept_below: Decimal,
    submitted: Mutex<Vec<Decimal>>,
}

impl LockedVenue {
    fn new(accept_below: Decimal) -> Self {
        Self {
            identity: ExchangeIdentity::new("fake", "Fake", "http://localhost"),
            accept_below,
            submitted: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl Venue for LockedVenue {
    fn identity(&self) -> &ExchangeIdentity {
        &self.identity
    }

    fn is_authenticated(&self) -> bool {
        true
    }

    fn sub_accounts(&self) -> &[SubAccount] {
        &[SubAccount::Spot]
    }

    fn trading_account(&self) -> SubAccount {
        SubAccount::Spot
    }

    fn withdrawal_account(&self) -> SubAccount {
        SubAccount::Spot
    }

    async fn verify_credentials(&self) -> ExchangeResult<()> {
        Ok(())
    }

    async fn sub_account_balances(
        &self,
        _account: SubAccount,
    ) -> ExchangeResult<HashMap<String, Decimal>> {
        Ok(HashMap::new())
    }

    async fn transfer(
        &self,
        _ticker: &str,
        _amount: Decimal,
        _from: SubAccount,
        _to: SubAccount,
    ) -> ExchangeResult<()> {
        Ok(())
    }

    async fn instruments(&self) -> ExchangeResult<Vec<Instrument>> {
        Ok(Vec::new())
    }

    async fn last_price(&self, _symbol: &str) -> ExchangeResult<Decimal> {
        Ok(Decimal::ONE)
    }

    async fn place_market_order(&self, _order: &MarketOrder) -> ExchangeResult<String> {
        Err(ExchangeError::NotSupported("주문".to_string()))
    }

    async fn query_order(&self, _query: &OrderQuery) -> ExchangeResult<VenueOrder> {
        Err(ExchangeError::NotSupported("주문".to_string()))
    }

    async fn chain_infos(&self, _ticker: &str) -> ExchangeResult<Vec<ChainInfo>> {
        Ok(Vec::new())
    }

    async fn deposit_address(&self, ticker: &str, chain: &str) -> ExchangeResult<DepositAddress> {
        Ok(DepositAddress {
            ticker: ticker.to_string(),
            chain: chain.to_string(),
            address: "addr".to_string(),
            tag: None,
        })
    }

    async fn submit_withdrawal(&self, request: &WithdrawalSubmit) -> ExchangeResult<String> {
        self.submitted.lock().unwrap().push(request.amount);
        if request.amount <= self.accept_below {
            Ok(format!("w-{}", request.amount))
        } else {
            Err(ExchangeError::WithdrawalBalanceLocked("locked".to_string()))
        }
    }

    async fn query_withdrawal(
        &self,
        _query: &WithdrawalQuery,
    ) -> ExchangeResult<WithdrawalDetails> {
        Err(ExchangeError::NotSupported("조회".to_string()))
    }
}

fn params(amount: Decimal, min: Decimal, fee: Decimal) -> WithdrawalParams {
    WithdrawalParams {
        internal_order_id: "wd".to_string(),
        ticker: "USDT".to_string(),
        chain: "TRX".to_string(),
        address: "addr".to_string(),
        tag: None,
        amount,
        rule: WithdrawalRule {
            ticker: "USDT".to_string(),
            chain: "TRX".to_string(),
            min_withdrawal: min,
            max_withdrawal: Decimal::ZERO,
            min_deposit: Decimal::ZERO,
            fee: WithdrawalFee::Fixed(fee),
            confirmations: 1,
            precision: 2,
        },
    }
}

proptest! {
    #[test]
    fn retry_loop_is_bounded(
        amount in 1u32..500,
        min in 1u32..50,
        fee in 0u32..5,
        step in 1u32..40,
        accept_below in 0u32..500,
    ) {
        let amount = Decimal::from(amount);
        let min = Decimal::from(min);
        let fee = Decimal::from(fee);
        let step = Decimal::from(step);

        let venue = LockedVenue::new(Decimal::from(accept_below));
        let mut settings = ClientSettings::default();
        settings.step_amount = step;
        settings.step_currency = "USDT".to_string();
        let client = SpotClient::new(
            venue,
            Arc::new(FixedRateConverter::new()),
            CurrencyMap::default(),
            settings,
        );

        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();
        let outcome = runtime.block_on(client.create_withdrawal_order(&params(amount, min, fee)));

        let submitted = client.venue().submitted.lock().unwrap().clone();
        let first_net = amount - fee;
        let bound = if first_net >= min {
            ((first_net - min) / step).ceil() + Decimal::ONE
        } else {
            Decimal::ZERO
        };
        prop_assert!(Decimal::from(submitted.len() as u64) <= bound);
        prop_assert!(submitted.iter().all(|s| *s >= min));

        match outcome {
            Ok(result) => {
                prop_assert!(result.amount >= min);
                prop_assert_eq!(result.attempts as usize, submitted.len());
            }
            Err(err) => prop_assert_eq!(err.kind(), ErrorKind::MinWithdrawalNotMet),
        }
    }
}
