//! Fixed-point decimal helpers for prices and sizes
//!
//! Uses rust_decimal for deterministic arithmetic (no floating-point errors).
//! Multiplication is exact and overflow-checked. Division, which only ever
//! turns a quote-token amount back into base-token units, truncates toward
//! zero at [`SIZE_SCALE`] fractional digits so a taker is never promised
//! more base token than the maker's order holds.

use rust_decimal::{Decimal, RoundingStrategy};

use crate::errors::NumericError;

/// Price of one base token in quote-token units
pub type Price = Decimal;

/// Quantity, in base-token units unless stated otherwise
pub type Size = Decimal;

/// Fractional digits kept on divided amounts (ERC-20 style 18 decimals)
pub const SIZE_SCALE: u32 = 18;

/// Rounding applied to every division result
pub const DIVISION_ROUNDING: RoundingStrategy = RoundingStrategy::ToZero;

/// `a * b`, failing instead of wrapping or panicking on overflow
pub fn checked_mul(a: Decimal, b: Decimal) -> Result<Decimal, NumericError> {
    a.checked_mul(b).ok_or(NumericError::Overflow {
        op: "mul",
        lhs: a.to_string(),
        rhs: b.to_string(),
    })
}

/// `numerator / divisor` truncated toward zero at [`SIZE_SCALE`] digits
pub fn truncating_div(numerator: Decimal, divisor: Decimal) -> Result<Decimal, NumericError> {
    if divisor.is_zero() {
        return Err(NumericError::DivisionByZero {
            numerator: numerator.to_string(),
        });
    }
    let quotient = numerator.checked_div(divisor).ok_or(NumericError::Overflow {
        op: "div",
        lhs: numerator.to_string(),
        rhs: divisor.to_string(),
    })?;
    Ok(quotient
        .round_dp_with_strategy(SIZE_SCALE, DIVISION_ROUNDING)
        .normalize())
}

/// Strictly greater than zero
pub fn is_positive(value: Decimal) -> bool {
    value > Decimal::ZERO
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    fn d(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    #[test]
    fn test_exact_division() {
        assert_eq!(truncating_div(d("501"), d("1000")).unwrap(), d("0.501"));
        assert_eq!(truncating_div(d("2002"), d("1001")).unwrap(), d("2"));
    }

    #[test]
    fn test_division_truncates_toward_zero() {
        // 1/3 = 0.333... cut at 18 digits, never rounded up
        let third = truncating_div(d("1"), d("3")).unwrap();
        assert_eq!(third, d("0.333333333333333333"));
        let two_thirds = truncating_div(d("2"), d("3")).unwrap();
        assert_eq!(two_thirds, d("0.666666666666666666"));
    }

    #[test]
    fn test_division_by_zero() {
        assert!(matches!(
            truncating_div(d("1"), Decimal::ZERO),
            Err(NumericError::DivisionByZero { .. })
        ));
    }

    #[test]
    fn test_checked_mul_overflow() {
        assert!(checked_mul(Decimal::MAX, d("2")).is_err());
        assert_eq!(checked_mul(d("1002"), d("3")).unwrap(), d("3006"));
    }

    #[test]
    fn test_is_positive() {
        assert!(is_positive(d("0.000001")));
        assert!(!is_positive(Decimal::ZERO));
        assert!(!is_positive(d("-1")));
    }
}
