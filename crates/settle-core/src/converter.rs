//! 통화 환산 포트.
//!
//! 가격 서비스는 외부 협력자입니다. 엔진과 거래소 클라이언트는
//! `CurrencyConverter` 트레이트만 의존합니다.

use async_trait::async_trait;
use rust_decimal::Decimal;
use std::collections::HashMap;
use thiserror::Error;

/// 환산 에러.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ConversionError {
    /// 환율 정보 없음
    #[error("환율 없음: {source_name} {from} -> {to}")]
    RateUnavailable {
        source_name: String,
        from: String,
        to: String,
    },

    /// 가격 서비스 호출 실패
    #[error("환산 서비스 에러: {0}")]
    Service(String),
}

/// 통화 환산기.
#[async_trait]
pub trait CurrencyConverter: Send + Sync {
    /// `source` 거래소 가격 기준으로 `amount`를 `from`에서 `to`로 환산합니다.
    async fn convert(
        &self,
        source: &str,
        from: &str,
        to: &str,
        amount: Decimal,
    ) -> Result<Decimal, ConversionError>;
}

/// 고정 환율 환산기.
///
/// 모든 환율은 기준 통화(보통 USD) 대비 단가로 등록합니다.
/// `from`과 `to`가 같으면 항상 원래 금액을 반환합니다.
#[derive(Debug, Clone, Default)]
pub struct FixedRateConverter {
    prices: HashMap<String, Decimal>,
}

impl FixedRateConverter {
    pub fn new() -> Self {
        Self::default()
    }

    /// 통화 단가 등록 (기준 통화 단위).
    pub fn with_price(mut self, ticker: impl Into<String>, price: Decimal) -> Self {
        self.prices.insert(ticker.into().to_uppercase(), price);
        self
    }

    fn price_of(&self, ticker: &str) -> Option<Decimal> {
        self.prices.get(&ticker.to_uppercase()).copied()
    }
}

#[async_trait]
impl CurrencyConverter for FixedRateConverter {
    async fn convert(
        &self,
        source: &str,
        from: &str,
        to: &str,
        amount: Decimal,
    ) -> Result<Decimal, ConversionError> {
        if from.eq_ignore_ascii_case(to) {
            return Ok(amount);
        }

        let unavailable = || ConversionError::RateUnavailable {
            source_name: source.to_string(),
            from: from.to_string(),
            to: to.to_string(),
        };

        let from_price = self.price_of(from).ok_or_else(unavailable)?;
        let to_price = self.price_of(to).ok_or_else(unavailable)?;
        if to_price.is_zero() {
            return Err(unavailable());
        }

        Ok(amount * from_price / to_price)
    }
}
