//! 내부 통화 ID와 거래소 (티커, 체인) 간 매핑.
//!
//! 여러 체인이 같은 티커를 공유할 수 있으므로 티커 → 통화 방향은
//! 다대일 관계입니다. 잔고 합산은 티커 기준으로 중복 제거해야 합니다.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};

/// 거래소별 통화 매핑 한 건.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CurrencyMapping {
    /// 내부 통화 ID (예: "USDT_TRC20")
    pub currency_id: String,
    /// 거래소 식별자
    pub exchange: String,
    /// 거래소 티커 (예: "USDT")
    pub ticker: String,
    /// 거래소 체인 이름 (예: "TRX")
    pub chain: String,
}

/// 티커와 체인 쌍.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CurrencyChain {
    pub ticker: String,
    pub chain: String,
}

impl CurrencyChain {
    pub fn new(ticker: impl Into<String>, chain: impl Into<String>) -> Self {
        Self {
            ticker: ticker.into(),
            chain: chain.into(),
        }
    }
}

/// 한 거래소의 통화 매핑 집합.
#[derive(Debug, Clone, Default)]
pub struct CurrencyMap {
    by_id: HashMap<String, CurrencyMapping>,
}

impl CurrencyMap {
    /// 매핑 목록으로 생성.
    pub fn new(mappings: impl IntoIterator<Item = CurrencyMapping>) -> Self {
        let by_id = mappings
            .into_iter()
            .map(|m| (m.currency_id.clone(), m))
            .collect();
        Self { by_id }
    }

    /// 내부 통화 ID로 조회.
    pub fn resolve(&self, currency_id: &str) -> Option<&CurrencyMapping> {
        self.by_id.get(currency_id)
    }

    /// (티커, 체인)으로 내부 통화 ID 역조회.
    pub fn currency_id_for(&self, ticker: &str, chain: &str) -> Option<&str> {
        self.by_id
            .values()
            .find(|m| m.ticker.eq_ignore_ascii_case(ticker) && m.chain.eq_ignore_ascii_case(chain))
            .map(|m| m.currency_id.as_str())
    }

    /// 중복 제거된 티커 목록 (정렬됨).
    pub fn unique_tickers(&self) -> Vec<String> {
        self.by_id
            .values()
            .map(|m| m.ticker.to_uppercase())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    /// 모든 (티커, 체인) 쌍 (정렬됨).
    pub fn currency_chains(&self) -> Vec<CurrencyChain> {
        self.by_id
            .values()
            .map(|m| CurrencyChain::new(m.ticker.to_uppercase(), m.chain.clone()))
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    /// 티커가 매핑에 포함되어 있는지.
    pub fn contains_ticker(&self, ticker: &str) -> bool {
        self.by_id
            .values()
            .any(|m| m.ticker.eq_ignore_ascii_case(ticker))
    }

    pub fn is_empty(&self) -> bool {
        self.by_id.is_empty()
    }

    pub fn len(&self) -> usize {
        self.by_id.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mapping(id: &str, ticker: &str, chain: &str) -> CurrencyMapping {
        CurrencyMapping {
            currency_id: id.to_string(),
            exchange: "binance".to_string(),
            ticker: ticker.to_string(),
            chain: chain.to_string(),
        }
    }

    #[test]
    fn test_unique_tickers_dedupes_chains() {
        let map = CurrencyMap::new(vec![
            mapping("USDT_TRC20", "USDT", "TRX"),
            mapping("USDT_ERC20", "USDT", "ETH"),
            mapping("BTC", "BTC", "BTC"),
        ]);

        assert_eq!(map.unique_tickers(), vec!["BTC".to_string(), "USDT".to_string()]);
        assert_eq!(map.currency_chains().len(), 3);
        assert_eq!(map.currency_id_for("usdt", "ETH"), Some("USDT_ERC20"));
        assert!(map.contains_ticker("btc"));
        assert!(!map.contains_ticker("ETH"));
    }
}
