//! Position sizing for the autonomous entry path.

use rust_decimal::Decimal;

/// Risk-bounded notional for an autonomous entry.
///
/// The result is `balance * risk_fraction` clamped to `[0, min(cap, balance)]`.
/// Sizing is notional-based; callers divide by price afterwards if they need
/// a unit count. Manually initiated trades bypass this entirely.
pub fn safe_size(balance: Decimal, risk_fraction: Decimal, cap: Decimal) -> Decimal {
    if balance <= Decimal::ZERO {
        return Decimal::ZERO;
    }

    (balance * risk_fraction)
        .min(cap)
        .min(balance)
        .max(Decimal::ZERO)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_fraction_of_balance() {
        let size = safe_size(dec!(10000), dec!(0.05), dec!(1000));
        assert_eq!(size, dec!(500));
    }

    #[test]
    fn test_cap_binds() {
        let size = safe_size(dec!(100000), dec!(0.05), dec!(500));
        assert_eq!(size, dec!(500));
    }

    #[test]
    fn test_never_exceeds_balance() {
        // A fraction above 1.0 still cannot outsize the account
        let size = safe_size(dec!(100), dec!(2), dec!(10000));
        assert_eq!(size, dec!(100));
    }

    #[test]
    fn test_never_negative() {
        assert_eq!(safe_size(dec!(-50), dec!(0.05), dec!(500)), Decimal::ZERO);
        assert_eq!(safe_size(Decimal::ZERO, dec!(0.05), dec!(500)), Decimal::ZERO);
        assert_eq!(safe_size(dec!(1000), dec!(-0.05), dec!(500)), Decimal::ZERO);
    }

    #[test]
    fn test_bounds_property() {
        let cases = [
            (dec!(10000), dec!(0.05), dec!(500)),
            (dec!(1), dec!(0.9), dec!(500)),
            (dec!(250), dec!(0.5), dec!(50)),
            (dec!(0), dec!(0.5), dec!(50)),
        ];

        for (balance, fraction, cap) in cases {
            let size = safe_size(balance, fraction, cap);
            assert!(size >= Decimal::ZERO);
            assert!(size <= cap);
            assert!(size <= balance.max(Decimal::ZERO));
            assert!(size <= (balance * fraction).max(Decimal::ZERO));
        }
    }
}
