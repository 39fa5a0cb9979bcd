//! Money Conversion
//!
//! Dollar amounts are `rust_decimal::Decimal` everywhere in the domain.
//! Payment processors speak integer minor units (cents), so conversion
//! happens exactly once, at the processor boundary.

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};

/// Convert a dollar amount to integer cents, rounding half away from zero.
///
/// Returns `None` if the amount does not fit in an `i64` after scaling.
pub fn to_cents(amount: Decimal) -> Option<i64> {
    (amount * Decimal::ONE_HUNDRED)
        .round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero)
        .to_i64()
}

/// Convert integer cents back to a dollar amount.
pub fn from_cents(cents: i64) -> Decimal {
    Decimal::new(cents, 2)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_to_cents_whole_dollars() {
        assert_eq!(to_cents(dec!(500)), Some(50000));
        assert_eq!(to_cents(dec!(2000)), Some(200000));
    }

    #[test]
    fn test_to_cents_rounds_half_up() {
        assert_eq!(to_cents(dec!(19.995)), Some(2000));
        assert_eq!(to_cents(dec!(19.994)), Some(1999));
    }

    #[test]
    fn test_from_cents() {
        assert_eq!(from_cents(50000), dec!(500.00));
        assert_eq!(from_cents(1), dec!(0.01));
    }

    #[test]
    fn test_round_trip() {
        let amount = dec!(1499.99);
        assert_eq!(from_cents(to_cents(amount).unwrap()), amount);
    }
}
