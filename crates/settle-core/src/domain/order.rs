//! 자동 환전 주문 타입.
//!
//! 이 모듈은 주문 엔진이 사용하는 타입을 정의합니다:
//! - `Side` - 주문 방향 (매수/매도)
//! - `OrderStatus` - 주문 레코드 상태 (`New → InProgress → {Completed, Failed}`)
//! - `TradingPairConfig` - 사용자가 선택한 자동 환전 페어
//! - `OrderRecord` - 주문 시도 한 건의 영속 레코드

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{SettleError, SettleResult};

/// 주문 방향 (매수 또는 매도).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    /// 매수
    Buy,
    /// 매도
    Sell,
}

impl Side {
    /// 반대 방향을 반환합니다.
    pub fn opposite(&self) -> Self {
        match self {
            Side::Buy => Side::Sell,
            Side::Sell => Side::Buy,
        }
    }
}

impl std::fmt::Display for Side {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Side::Buy => write!(f, "BUY"),
            Side::Sell => write!(f, "SELL"),
        }
    }
}

/// 주문 레코드 상태.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    /// 주문 시도 시작
    New,
    /// 거래소가 주문을 접수함
    InProgress,
    /// 체결 완료
    Completed,
    /// 실패
    Failed,
}

impl OrderStatus {
    /// 최종 상태인지 확인합니다.
    pub fn is_terminal(&self) -> bool {
        matches!(self, OrderStatus::Completed | OrderStatus::Failed)
    }

    /// 허용된 전이인지 확인합니다.
    pub fn can_transition_to(&self, next: OrderStatus) -> bool {
        matches!(
            (self, next),
            (OrderStatus::New, OrderStatus::InProgress)
                | (OrderStatus::New, OrderStatus::Failed)
                | (OrderStatus::InProgress, OrderStatus::Completed)
                | (OrderStatus::InProgress, OrderStatus::Failed)
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::New => "new",
            OrderStatus::InProgress => "in_progress",
            OrderStatus::Completed => "completed",
            OrderStatus::Failed => "failed",
        }
    }
}

impl std::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 사용자가 설정한 자동 환전 페어.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradingPairConfig {
    pub id: Uuid,
    pub user_id: Uuid,
    /// 거래소 식별자
    pub exchange: String,
    /// 거래소 심볼 (예: "BTCUSDT")
    pub symbol: String,
    pub side: Side,
    pub base_currency: String,
    pub quote_currency: String,
    pub enabled: bool,
}

/// 주문 시도 한 건의 레코드.
///
/// 시도가 시작될 때 생성되며 소유 엔진만 수정합니다. 삭제되지 않습니다.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderRecord {
    pub id: Uuid,
    pub user_id: Uuid,
    pub exchange: String,
    pub pair_id: Uuid,
    /// 거래소 주문 ID
    pub exchange_order_id: Option<String>,
    /// 클라이언트 주문 ID (거래소에 전달한 값)
    pub client_order_id: String,
    pub symbol: String,
    pub side: Side,
    pub base_currency: String,
    pub quote_currency: String,
    /// 제출/체결 수량 (매도: 기준 통화, 매수: 견적 통화)
    pub amount: Decimal,
    /// 견적 통화 환산 체결 금액
    pub amount_in_quote: Option<Decimal>,
    /// 기준 법정화폐 환산액
    pub fiat_amount: Option<Decimal>,
    pub status: OrderStatus,
    pub fail_reason: Option<String>,
    /// 레코드를 생성한 자격증명의 연결 해시
    pub connection_hash: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl OrderRecord {
    /// 새 주문 시도 레코드 생성.
    pub fn new(pair: &TradingPairConfig, connection_hash: Option<String>) -> Self {
        let id = Uuid::new_v4();
        let now = Utc::now();
        Self {
            id,
            user_id: pair.user_id,
            exchange: pair.exchange.clone(),
            pair_id: pair.id,
            exchange_order_id: None,
            client_order_id: id.simple().to_string(),
            symbol: pair.symbol.clone(),
            side: pair.side,
            base_currency: pair.base_currency.clone(),
            quote_currency: pair.quote_currency.clone(),
            amount: Decimal::ZERO,
            amount_in_quote: None,
            fiat_amount: None,
            status: OrderStatus::New,
            fail_reason: None,
            connection_hash,
            created_at: now,
            updated_at: now,
        }
    }

    fn transition(&mut self, next: OrderStatus) -> SettleResult<()> {
        if !self.status.can_transition_to(next) {
            return Err(SettleError::InvalidTransition {
                from: self.status.to_string(),
                to: next.to_string(),
            });
        }
        self.status = next;
        self.updated_at = Utc::now();
        Ok(())
    }

    /// 거래소 접수: New → InProgress.
    pub fn mark_in_progress(
        &mut self,
        exchange_order_id: String,
        client_order_id: String,
        amount: Decimal,
    ) -> SettleResult<()> {
        self.transition(OrderStatus::InProgress)?;
        self.exchange_order_id = Some(exchange_order_id);
        self.client_order_id = client_order_id;
        self.amount = amount;
        Ok(())
    }

    /// 체결 완료: InProgress → Completed.
    pub fn mark_completed(
        &mut self,
        amount_in_quote: Option<Decimal>,
        fiat_amount: Option<Decimal>,
    ) -> SettleResult<()> {
        self.transition(OrderStatus::Completed)?;
        self.amount_in_quote = amount_in_quote;
        self.fiat_amount = fiat_amount;
        Ok(())
    }

    /// 실패 처리.
    pub fn mark_failed(&mut self, reason: impl Into<String>) -> SettleResult<()> {
        self.transition(OrderStatus::Failed)?;
        self.fail_reason = Some(reason.into());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn pair() -> TradingPairConfig {
        TradingPairConfig {
            id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            exchange: "binance".to_string(),
            symbol: "BTCUSDT".to_string(),
            side: Side::Sell,
            base_currency: "BTC".to_string(),
            quote_currency: "USDT".to_string(),
            enabled: true,
        }
    }

    #[test]
    fn test_order_lifecycle() {
        let mut record = OrderRecord::new(&pair(), Some("hash".to_string()));
        assert_eq!(record.status, OrderStatus::New);
        assert_eq!(record.client_order_id.len(), 32);

        record
            .mark_in_progress("123".to_string(), "abc".to_string(), dec!(0.07))
            .unwrap();
        assert_eq!(record.status, OrderStatus::InProgress);
        assert_eq!(record.amount, dec!(0.07));

        record.mark_completed(Some(dec!(4200)), Some(dec!(4200))).unwrap();
        assert!(record.status.is_terminal());
    }

    #[test]
    fn test_terminal_is_final() {
        let mut record = OrderRecord::new(&pair(), None);
        record.mark_failed("boom").unwrap();
        assert_eq!(record.fail_reason.as_deref(), Some("boom"));
        assert!(record.mark_in_progress("1".into(), "2".into(), dec!(1)).is_err());
        assert!(record.mark_failed("again").is_err());
    }

    #[test]
    fn test_completed_requires_in_progress() {
        let mut record = OrderRecord::new(&pair(), None);
        assert!(record.mark_completed(None, None).is_err());
    }
}
