//! 거래소 정밀도 처리를 위한 Decimal 유틸리티.
//!
//! 거래소로 전송되는 모든 수량은 거래소가 선언한 소수점 자릿수로
//! **내림** 처리되어야 합니다. 최소 주문 수량처럼 하한을 보장해야 하는
//! 값은 올림 처리합니다.

use rust_decimal::{Decimal, RoundingStrategy};

/// 수량 정밀도 처리를 위한 확장 트레이트.
pub trait AmountExt {
    /// 지정 자릿수로 내림 (0 방향).
    fn floor_to(&self, precision: u32) -> Decimal;

    /// 지정 자릿수로 올림 (0에서 먼 방향).
    fn ceil_to(&self, precision: u32) -> Decimal;

    /// `10^-precision`의 배수인지 확인.
    fn fits_precision(&self, precision: u32) -> bool;
}

impl AmountExt for Decimal {
    fn floor_to(&self, precision: u32) -> Decimal {
        self.round_dp_with_strategy(precision, RoundingStrategy::ToZero)
            .normalize()
    }

    fn ceil_to(&self, precision: u32) -> Decimal {
        self.round_dp_with_strategy(precision, RoundingStrategy::AwayFromZero)
            .normalize()
    }

    fn fits_precision(&self, precision: u32) -> bool {
        self.normalize().scale() <= precision
    }
}

/// 스텝 크기(예: "0.001")에서 소수점 자릿수를 계산합니다.
///
/// `1`, `10` 처럼 정수 스텝은 0을 반환합니다.
pub fn precision_of_step(step: Decimal) -> u32 {
    if step <= Decimal::ZERO {
        return 0;
    }
    step.normalize().scale()
}

/// 문자열 스텝 크기에서 소수점 자릿수를 계산합니다.
pub fn precision_of_step_str(step: &str) -> Option<u32> {
    step.trim().parse::<Decimal>().ok().map(precision_of_step)
}

/// 문자열에서 Decimal 파싱. 빈 문자열이나 잘못된 값은 0.
pub fn parse_decimal(s: &str) -> Decimal {
    s.trim().parse().unwrap_or(Decimal::ZERO)
}

/// 선택적 문자열에서 Decimal 파싱.
pub fn parse_decimal_opt(s: Option<&str>) -> Option<Decimal> {
    s.and_then(|v| v.trim().parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_floor_to() {
        assert_eq!(dec!(0.0799).floor_to(2), dec!(0.07));
        assert_eq!(dec!(99.999).floor_to(0), dec!(99));
        assert_eq!(dec!(-2.55).floor_to(1), dec!(-2.5));
        assert_eq!(dec!(1.5).floor_to(8), dec!(1.5));
    }

    #[test]
    fn test_ceil_to() {
        assert_eq!(dec!(0.00012).ceil_to(4), dec!(0.0002));
        assert_eq!(dec!(0.0002).ceil_to(4), dec!(0.0002));
    }

    #[test]
    fn test_precision_of_step() {
        assert_eq!(precision_of_step(dec!(0.001)), 3);
        assert_eq!(precision_of_step(dec!(0.00100000)), 3);
        assert_eq!(precision_of_step(dec!(1)), 0);
        assert_eq!(precision_of_step(dec!(10)), 0);
        assert_eq!(precision_of_step(Decimal::ZERO), 0);
        assert_eq!(precision_of_step_str("0.000001"), Some(6));
        assert_eq!(precision_of_step_str("abc"), None);
    }

    #[test]
    fn test_parse_decimal() {
        assert_eq!(parse_decimal("1.25"), dec!(1.25));
        assert_eq!(parse_decimal(""), Decimal::ZERO);
        assert_eq!(parse_decimal_opt(Some(" 3 ")), Some(dec!(3)));
        assert_eq!(parse_decimal_opt(None), None);
    }

    proptest! {
        #[test]
        fn floor_never_exceeds_and_fits(
            mantissa in 0i64..1_000_000_000_000,
            scale in 0u32..12,
            precision in 0u32..10,
        ) {
            let value = Decimal::new(mantissa, scale);
            let floored = value.floor_to(precision);
            prop_assert!(floored <= value);
            prop_assert!(floored.fits_precision(precision));
            prop_assert!(value - floored < Decimal::new(1, precision));
        }

        #[test]
        fn ceil_never_below(
            mantissa in 0i64..1_000_000_000_000,
            scale in 0u32..12,
            precision in 0u32..10,
        ) {
            let value = Decimal::new(mantissa, scale);
            let ceiled = value.ceil_to(precision);
            prop_assert!(ceiled >= value);
            prop_assert!(ceiled.fits_precision(precision));
        }
    }
}
