//! Bybit, KuCoin, Gate.io 커넥터 통합 테스트.

use mockito::{Matcher, Server, ServerGuard};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use settle_core::{
    ConnectionHash, Credential, FixedRateConverter, Side, SubAccount, WithdrawalFee,
    WithdrawalRule,
};
use settle_exchange::connector::{bybit, gateio, kucoin};
use settle_exchange::{ClientContext, ExchangeClient, WithdrawalParams};
use std::sync::Arc;

fn context(server: &ServerGuard, slug: &str, credential: Option<Credential>) -> ClientContext {
    let converter = FixedRateConverter::new()
        .with_price("USD", dec!(1))
        .with_price("USDT", dec!(1))
        .with_price("BTC", dec!(60000));
    let mut ctx = ClientContext::public(Arc::new(converter));
    if let Some(credential) = credential {
        let hash = ConnectionHash::derive("salt", slug, &credential);
        ctx = ctx.with_credential(credential, hash);
    }
    ctx.exchange.base_url = Some(server.url());
    ctx
}

#[tokio::test]
async fn test_bybit_withdrawal_funds_fund_account_first() {
    let mut server = Server::new_async().await;

    server
        .mock("GET", "/v5/account/wallet-balance")
        .match_query(Matcher::UrlEncoded("accountType".into(), "UNIFIED".into()))
        .match_header("X-BAPI-API-KEY", "bybit-key")
        .match_header("X-BAPI-SIGN-TYPE", "2")
        .with_body(
            r#"{"retCode":0,"retMsg":"OK","result":{"list":[{"accountType":"UNIFIED","coin":[{"coin":"USDT","walletBalance":"50","locked":"0"}]}]}}"#,
        )
        .create_async()
        .await;
    server
        .mock("GET", "/v5/asset/transfer/query-account-coins-balance")
        .match_query(Matcher::UrlEncoded("accountType".into(), "FUND".into()))
        .with_body(
            r#"{"retCode":0,"retMsg":"success","result":{"accountType":"FUND","balance":[{"coin":"USDT","walletBalance":"60","transferBalance":"60"}]}}"#,
        )
        .create_async()
        .await;
    let transfer = server
        .mock("POST", "/v5/asset/transfer/inter-transfer")
        .match_body(Matcher::PartialJson(serde_json::json!({
            "coin": "USDT",
            "amount": "40",
            "fromAccountType": "UNIFIED",
            "toAccountType": "FUND",
        })))
        .with_body(r#"{"retCode":0,"retMsg":"success","result":{"transferId":"42c0cfb0-6bca-c242-bc76-4e6df6cbab16"}}"#)
        .expect(1)
        .create_async()
        .await;
    let withdraw = server
        .mock("POST", "/v5/asset/withdraw/create")
        .match_body(Matcher::PartialJson(serde_json::json!({
            "coin": "USDT",
            "chain": "TRX",
            "amount": "99",
            "accountType": "FUND",
        })))
        .with_body(r#"{"retCode":0,"retMsg":"success","result":{"id":"10195"}}"#)
        .expect(1)
        .create_async()
        .await;

    let ctx = context(&server, "bybit", Some(Credential::new("bybit-key", "bybit-secret")));
    let client = bybit::build(&bybit::identity(), ctx).unwrap();

    let result = client
        .create_withdrawal_order(&WithdrawalParams {
            internal_order_id: "wd0002".to_string(),
            ticker: "USDT".to_string(),
            chain: "TRX".to_string(),
            address: "TXyz".to_string(),
            tag: None,
            amount: dec!(100),
            rule: WithdrawalRule {
                ticker: "USDT".to_string(),
                chain: "TRX".to_string(),
                min_withdrawal: dec!(5),
                max_withdrawal: Decimal::ZERO,
                min_deposit: dec!(1),
                fee: WithdrawalFee::Fixed(dec!(1)),
                confirmations: 1,
                precision: 2,
            },
        })
        .await
        .unwrap();

    assert_eq!(result.exchange_order_id, "10195");
    assert_eq!(result.amount, dec!(99));
    assert_eq!(result.attempts, 1);
    assert!(result.retry_reason.is_none());
    transfer.assert_async().await;
    withdraw.assert_async().await;
}

#[tokio::test]
async fn test_kucoin_balance_sums_trade_and_main() {
    let mut server = Server::new_async().await;

    server
        .mock("GET", "/api/v1/accounts")
        .match_query(Matcher::UrlEncoded("type".into(), "trade".into()))
        .match_header("KC-API-KEY", "kc-key")
        .match_header("KC-API-KEY-VERSION", "2")
        .match_header("KC-API-PASSPHRASE", Matcher::Any)
        .with_body(
            r#"{"code":"200000","data":[{"id":"1","currency":"BTC","type":"trade","balance":"0.1","available":"0.1","holds":"0"}]}"#,
        )
        .create_async()
        .await;
    server
        .mock("GET", "/api/v1/accounts")
        .match_query(Matcher::UrlEncoded("type".into(), "main".into()))
        .with_body(
            r#"{"code":"200000","data":[
                {"id":"2","currency":"BTC","type":"main","balance":"0.2","available":"0.2","holds":"0"},
                {"id":"3","currency":"USDT","type":"main","balance":"5","available":"5","holds":"0"}
            ]}"#,
        )
        .create_async()
        .await;

    let credential = Credential::new("kc-key", "kc-secret").with_passphrase("kc-pass");
    let ctx = context(&server, "kucoin", Some(credential));
    let client = kucoin::build(&kucoin::identity(), ctx).unwrap();

    let balances = client.get_account_balance().await.unwrap();
    assert_eq!(balances.len(), 2);

    let btc = &balances[0];
    assert_eq!(btc.ticker, "BTC");
    assert_eq!(btc.amount, dec!(0.3));
    assert_eq!(btc.fiat_value, Some(dec!(18000)));
    assert_eq!(
        btc.breakdown,
        vec![(SubAccount::Trade, dec!(0.1)), (SubAccount::Main, dec!(0.2))]
    );

    let usdt = &balances[1];
    assert_eq!(usdt.ticker, "USDT");
    assert_eq!(usdt.fiat_value, Some(dec!(5)));
}

#[tokio::test]
async fn test_kucoin_envelope_error_on_http_200() {
    let mut server = Server::new_async().await;
    server
        .mock("GET", "/api/v1/user/api-key")
        .with_body(r#"{"code":"400006","msg":"Invalid request ip"}"#)
        .create_async()
        .await;

    let credential = Credential::new("kc-key", "kc-secret").with_passphrase("kc-pass");
    let ctx = context(&server, "kucoin", Some(credential));
    let client = kucoin::build(&kucoin::identity(), ctx).unwrap();

    let err = client.test_connection().await.unwrap_err();
    assert!(err.is_connection_level());
}

#[tokio::test]
async fn test_gateio_rule_derives_minimum_from_notional() {
    let mut server = Server::new_async().await;
    server
        .mock("GET", "/api/v4/spot/currency_pairs/DOGE_USDT")
        .with_body(
            r#"{"id":"DOGE_USDT","base":"DOGE","quote":"USDT","fee":"0.2","min_quote_amount":"3","amount_precision":2,"precision":6,"trade_status":"tradable"}"#,
        )
        .create_async()
        .await;
    server
        .mock("GET", "/api/v4/spot/tickers")
        .match_query(Matcher::UrlEncoded("currency_pair".into(), "DOGE_USDT".into()))
        .with_body(r#"[{"currency_pair":"DOGE_USDT","last":"0.15"}]"#)
        .create_async()
        .await;

    let ctx = context(&server, "gateio", None);
    let client = gateio::build(&gateio::identity(), ctx).unwrap();

    let rule = client.get_order_rule("DOGE_USDT").await.unwrap();
    assert_eq!(rule.min_order_amount, dec!(20));
    assert_eq!(rule.min_order_value, dec!(3));
    assert_eq!(rule.amount_precision, 2);
}

#[tokio::test]
async fn test_gateio_symbols_filter_and_direction() {
    let mut server = Server::new_async().await;
    server
        .mock("GET", "/api/v4/spot/currency_pairs")
        .with_body(
            r#"[
                {"id":"DOGE_USDT","base":"DOGE","quote":"USDT","amount_precision":2,"precision":6,"trade_status":"tradable"},
                {"id":"BTC3L_USDT","base":"BTC3L","quote":"USDT","amount_precision":2,"precision":6,"trade_status":"tradable"},
                {"id":"USDT_EUR","base":"USDT","quote":"EUR","amount_precision":2,"precision":4,"trade_status":"tradable"},
                {"id":"OLD_USDT","base":"OLD","quote":"USDT","amount_precision":2,"precision":6,"trade_status":"untradable"}
            ]"#,
        )
        .create_async()
        .await;

    let ctx = context(&server, "gateio", None);
    let client = gateio::build(&gateio::identity(), ctx).unwrap();

    let symbols = client.get_exchange_symbols().await.unwrap();
    assert_eq!(symbols.len(), 2);
    assert!(symbols.iter().all(|s| s.symbol == "DOGE_USDT"));

    let buy = symbols.iter().find(|s| s.side == Side::Buy).unwrap();
    let sell = symbols.iter().find(|s| s.side == Side::Sell).unwrap();
    assert_eq!(buy.display_name, "USDT/DOGE");
    assert_eq!(sell.display_name, "DOGE/USDT");
}
