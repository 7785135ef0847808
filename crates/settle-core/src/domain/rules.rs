//! 주문 규칙 및 출금 규칙.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::Side;
use crate::types::AmountExt;

/// 심볼별 주문 규칙.
///
/// 수량(amount)은 기준 통화, 금액(value)은 견적 통화 단위입니다.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderRule {
    /// 거래소 심볼 (예: "BTCUSDT")
    pub symbol: String,
    /// 기준 통화
    pub base_currency: String,
    /// 견적 통화
    pub quote_currency: String,
    /// 최소 주문 수량 (기준 통화)
    pub min_order_amount: Decimal,
    /// 최대 주문 수량 (기준 통화, 0 = 제한 없음)
    pub max_order_amount: Decimal,
    /// 최소 주문 금액 (견적 통화)
    pub min_order_value: Decimal,
    /// 최대 주문 금액 (견적 통화, 0 = 제한 없음)
    pub max_order_value: Decimal,
    /// 수량 소수점 자릿수
    pub amount_precision: u32,
    /// 금액 소수점 자릿수
    pub value_precision: u32,
    /// 가격 소수점 자릿수
    pub price_precision: u32,
}

impl OrderRule {
    /// 주문 방향에 따라 매도되는 통화 (매수: 견적, 매도: 기준).
    pub fn spend_currency(&self, side: Side) -> &str {
        match side {
            Side::Buy => &self.quote_currency,
            Side::Sell => &self.base_currency,
        }
    }

    /// 주문 방향별 최소값.
    pub fn minimum_for(&self, side: Side) -> Decimal {
        match side {
            Side::Buy => self.min_order_value,
            Side::Sell => self.min_order_amount,
        }
    }

    /// 주문 방향별 최대값 (0 = 제한 없음).
    pub fn maximum_for(&self, side: Side) -> Decimal {
        match side {
            Side::Buy => self.max_order_value,
            Side::Sell => self.max_order_amount,
        }
    }

    /// 주문 방향별 정밀도.
    pub fn precision_for(&self, side: Side) -> u32 {
        match side {
            Side::Buy => self.value_precision,
            Side::Sell => self.amount_precision,
        }
    }

    /// 사용 가능 잔고를 실제 제출 수량으로 변환 (최대값 제한 후 내림).
    pub fn submittable(&self, side: Side, available: Decimal) -> Decimal {
        let max = self.maximum_for(side);
        let capped = if max > Decimal::ZERO && available > max {
            max
        } else {
            available
        };
        capped.floor_to(self.precision_for(side))
    }
}

/// 출금 수수료.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum WithdrawalFee {
    /// 고정 수수료 (출금 통화 단위)
    Fixed(Decimal),
    /// 비율 수수료 (0.001 = 0.1%)
    Percentage(Decimal),
}

impl WithdrawalFee {
    /// 출금 금액에 대한 수수료.
    pub fn amount_for(&self, gross: Decimal) -> Decimal {
        match self {
            WithdrawalFee::Fixed(fee) => *fee,
            WithdrawalFee::Percentage(rate) => gross * rate,
        }
    }
}

/// 통화/체인별 출금 규칙.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WithdrawalRule {
    /// 티커
    pub ticker: String,
    /// 체인
    pub chain: String,
    /// 최소 출금액
    pub min_withdrawal: Decimal,
    /// 최대 출금액 (0 = 제한 없음)
    pub max_withdrawal: Decimal,
    /// 최소 입금액 (거래소가 0을 보고하면 약 1 USDT 상당액으로 합성)
    pub min_deposit: Decimal,
    /// 수수료
    pub fee: WithdrawalFee,
    /// 입금 확인 수
    pub confirmations: u32,
    /// 출금 소수점 자릿수
    pub precision: u32,
}

impl WithdrawalRule {
    /// 총액에서 수수료를 뺀 실제 제출액 (정밀도 내림).
    pub fn net_amount(&self, gross: Decimal) -> Decimal {
        (gross - self.fee.amount_for(gross)).floor_to(self.precision)
    }
}
