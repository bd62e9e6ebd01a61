use rust_decimal::{Decimal, RoundingStrategy};

/// Round to two decimal places, half-up (midpoints move away from zero).
///
/// Apply once per stored or displayed amount; re-rounding an already rounded
/// value is a no-op, but rounding intermediate products is not.
pub fn round2(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn midpoints_round_up() {
        assert_eq!(round2(dec!(1.005)), dec!(1.01));
        assert_eq!(round2(dec!(2.345)), dec!(2.35));
        assert_eq!(round2(dec!(2.344)), dec!(2.34));
        assert_eq!(round2(dec!(10)), dec!(10));
    }
}
