//! 심볼 필터와 주소 정규화.

/// 법정화폐 티커.
pub const FIAT_CURRENCIES: &[&str] = &[
    "USD", "EUR", "GBP", "TRY", "BRL", "AUD", "RUB", "UAH", "NGN", "PLN", "RON", "ZAR", "ARS", "JPY",
    "KRW", "IDR", "MXN", "CZK",
];

const LEVERAGED_SUFFIXES: &[&str] = &["UP", "DOWN", "BULL", "BEAR"];

/// 법정화폐 여부.
pub fn is_fiat(ticker: &str) -> bool {
    FIAT_CURRENCIES
        .iter()
        .any(|fiat| fiat.eq_ignore_ascii_case(ticker))
}

/// 레버리지 토큰 여부.
///
/// 기준 통화가 3자 이상의 티커 + `UP`/`DOWN`/`BULL`/`BEAR`이거나
/// 숫자 + `L`/`S` (예: `ETH3L`, `BTC5S`)로 끝나면 레버리지 토큰입니다.
pub fn is_leveraged_token(base: &str) -> bool {
    let upper = base.to_ascii_uppercase();

    if LEVERAGED_SUFFIXES
        .iter()
        .any(|suffix| upper.len() >= suffix.len() + 3 && upper.ends_with(suffix))
    {
        return true;
    }

    let bytes = upper.as_bytes();
    bytes.len() >= 3
        && matches!(bytes[bytes.len() - 1], b'L' | b'S')
        && bytes[bytes.len() - 2].is_ascii_digit()
}

/// 거래소 주소 형식을 내부 표현으로 정규화합니다.
pub fn normalize_deposit_address(ticker: &str, address: &str) -> String {
    if ticker.eq_ignore_ascii_case("BCH") {
        if let Some(stripped) = address.strip_prefix("bitcoincash:") {
            return stripped.to_string();
        }
    }
    address.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_leveraged_tokens() {
        for base in ["BTCUP", "ETHDOWN", "XRPBULL", "EOSBEAR", "ETH3L", "BTC5S"] {
            assert!(is_leveraged_token(base), "{}", base);
        }
        for base in ["BTC", "UP", "SOL", "JUP", "DOWN", "ATOMS", "3L"] {
            assert!(!is_leveraged_token(base), "{}", base);
        }
    }

    #[test]
    fn test_fiat() {
        assert!(is_fiat("usd"));
        assert!(is_fiat("TRY"));
        assert!(!is_fiat("USDT"));
    }

    #[test]
    fn test_bch_prefix_stripped() {
        assert_eq!(
            normalize_deposit_address("BCH", "bitcoincash:qpm2qsznhks23z7629mms6s4cwef74vcwvy22gdx6a"),
            "qpm2qsznhks23z7629mms6s4cwef74vcwvy22gdx6a"
        );
        assert_eq!(
            normalize_deposit_address("BTC", "bitcoincash:abc"),
            "bitcoincash:abc"
        );
    }
}
