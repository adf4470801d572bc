//! Two-decimal money arithmetic shared by the ledger and settlement code.

use bigdecimal::BigDecimal;
use std::str::FromStr;

/// Number of decimal places every stored amount carries.
pub const MONEY_SCALE: i64 = 2;

pub fn zero() -> BigDecimal {
    BigDecimal::from(0).with_scale(MONEY_SCALE)
}

/// Rounds half away from zero to two decimals and normalises the scale so
/// `280` and `280.00` render the same way.
pub fn round2(value: &BigDecimal) -> BigDecimal {
    value.round(MONEY_SCALE).with_scale(MONEY_SCALE)
}

/// True when the value carries no fractional part, whatever its scale.
pub fn is_whole(value: &BigDecimal) -> bool {
    value.with_scale(0) == *value
}

pub fn is_positive(value: &BigDecimal) -> bool {
    value > &BigDecimal::from(0)
}

/// `amount * percent / 100`, rounded to two decimals.
pub fn percent_of(amount: &BigDecimal, percent: u32) -> BigDecimal {
    let scaled = amount.clone() * BigDecimal::from(percent);
    round2(&(scaled / BigDecimal::from(100)))
}

/// Half of a value, rounded to two decimals.
pub fn half(value: &BigDecimal) -> BigDecimal {
    round2(&(value.clone() / BigDecimal::from(2)))
}

/// Converts a wire-level float into a decimal using its shortest round-trip
/// representation. Non-finite values are rejected.
pub fn from_f64(value: f64) -> Option<BigDecimal> {
    if !value.is_finite() {
        return None;
    }
    BigDecimal::from_str(&value.to_string()).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dec(s: &str) -> BigDecimal {
        BigDecimal::from_str(s).unwrap()
    }

    #[test]
    fn test_round2_half_up() {
        assert_eq!(round2(&dec("10.005")), dec("10.01"));
        assert_eq!(round2(&dec("10.004")), dec("10.00"));
        assert_eq!(round2(&dec("7")).to_string(), "7.00");
    }

    #[test]
    fn test_is_whole_ignores_scale() {
        assert!(is_whole(&dec("200")));
        assert!(is_whole(&dec("200.00")));
        assert!(!is_whole(&dec("50.50")));
        assert!(!is_whole(&dec("0.01")));
    }

    #[test]
    fn test_percent_of() {
        assert_eq!(percent_of(&dec("1000"), 10), dec("100"));
        assert_eq!(percent_of(&dec("1000"), 4), dec("40"));
        assert_eq!(percent_of(&dec("125.50"), 4), dec("5.02"));
    }

    #[test]
    fn test_half() {
        assert_eq!(half(&dec("125.50")), dec("62.75"));
        assert_eq!(half(&dec("0.05")), dec("0.03"));
    }

    #[test]
    fn test_from_f64_uses_shortest_representation() {
        assert_eq!(from_f64(12.3).unwrap(), dec("12.3"));
        assert_eq!(from_f64(1234.56).unwrap(), dec("1234.56"));
        assert!(from_f64(f64::NAN).is_none());
        assert!(from_f64(f64::INFINITY).is_none());
    }
}
