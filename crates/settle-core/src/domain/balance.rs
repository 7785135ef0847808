//! 잔고 및 하위 계정 타입.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

/// 거래소 내부 지갑 구분.
///
/// 거래소마다 자금을 보관하는 하위 계정이 다르며, 거래나 출금 전에
/// 내부 이체가 필요한 경우가 많습니다.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubAccount {
    /// 현물 계정
    Spot,
    /// 펀딩 계정
    Funding,
    /// 통합 거래 계정
    Unified,
    /// 거래 계정 (KuCoin trade)
    Trade,
    /// 메인 계정 (KuCoin main)
    Main,
}

impl fmt::Display for SubAccount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SubAccount::Spot => write!(f, "spot"),
            SubAccount::Funding => write!(f, "funding"),
            SubAccount::Unified => write!(f, "unified"),
            SubAccount::Trade => write!(f, "trade"),
            SubAccount::Main => write!(f, "main"),
        }
    }
}

/// 통화별 합산 잔고.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CurrencyBalance {
    /// 거래소 티커 (예: "BTC")
    pub ticker: String,
    /// 모든 하위 계정 합계
    pub amount: Decimal,
    /// 기준 법정화폐 환산액 (환산 실패 시 None)
    pub fiat_value: Option<Decimal>,
    /// 기준 법정화폐
    pub fiat_currency: String,
    /// 하위 계정별 내역
    pub breakdown: Vec<(SubAccount, Decimal)>,
}

impl CurrencyBalance {
    /// 특정 하위 계정의 잔고.
    pub fn in_account(&self, account: SubAccount) -> Decimal {
        self.breakdown
            .iter()
            .filter(|(a, _)| *a == account)
            .map(|(_, v)| *v)
            .sum()
    }
}
