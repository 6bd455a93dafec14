//! Currency arithmetic helpers

use rust_decimal::{Decimal, RoundingStrategy};

/// Minor-unit precision of the single supported currency.
pub const CURRENCY_DECIMAL_PLACES: u32 = 2;

/// Round an amount to currency precision, half-up.
pub fn round_currency(amount: Decimal) -> Decimal {
    amount.round_dp_with_strategy(CURRENCY_DECIMAL_PLACES, RoundingStrategy::MidpointAwayFromZero)
}

/// `stake * multiplier`, rounded to currency precision.
pub fn apply_multiplier(stake: Decimal, multiplier: Decimal) -> Decimal {
    round_currency(stake * multiplier)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_round_half_up() {
        assert_eq!(round_currency(dec!(1.005)), dec!(1.01));
        assert_eq!(round_currency(dec!(1.004)), dec!(1.00));
        assert_eq!(round_currency(dec!(2.125)), dec!(2.13));
    }

    #[test]
    fn test_apply_multiplier() {
        assert_eq!(apply_multiplier(dec!(10.00), dec!(240.00)), dec!(2400.00));
        assert_eq!(apply_multiplier(dec!(0.33), dec!(1.20)), dec!(0.40));
    }
}
