//! Fixed-precision conversion of floating coefficients to exact fractions.
//!
//! The encoding downstream is exact-rational, so every floating coefficient
//! of a regional piece is converted once, here, at [`PRECISION`]. The
//! conversion scales `|x|` by the precision, rounds to the nearest integer,
//! and reduces the resulting fraction by its gcd with the precision. Any
//! information beyond six decimal digits is discarded; this is an accepted
//! approximation, not an error.

use num_integer::Integer;
use num_rational::Ratio;

/// Exact coefficient of a regional piece. The denominator is always positive.
pub type Coefficient = Ratio<i64>;

/// Decimal scale of [`decimal_to_fraction`]: six decimal digits.
pub const PRECISION: i64 = 1_000_000;

/// Convert a float to `numerator / denominator` at [`PRECISION`].
///
/// The denominator always divides [`PRECISION`]. Converting the float value
/// of a result again yields the same fraction.
///
/// Rounds to nearest rather than truncating, so a result can differ from a
/// truncating conversion by one unit in the sixth decimal digit.
pub fn decimal_to_fraction(value: f64) -> Coefficient {
    let scaled = (value.abs() * PRECISION as f64).round() as i64;
    let factor = scaled.gcd(&PRECISION);
    let numerator = scaled / factor;
    let denominator = PRECISION / factor;
    if value < 0.0 {
        Ratio::new_raw(-numerator, denominator)
    } else {
        Ratio::new_raw(numerator, denominator)
    }
}

/// Float value of an exact coefficient.
#[inline]
pub fn to_f64(coefficient: &Coefficient) -> f64 {
    *coefficient.numer() as f64 / *coefficient.denom() as f64
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_simple_fractions() {
        assert_eq!(decimal_to_fraction(0.5), Ratio::new(1, 2));
        assert_eq!(decimal_to_fraction(-0.25), Ratio::new(-1, 4));
        assert_eq!(decimal_to_fraction(1.0), Ratio::new(1, 1));
        assert_eq!(decimal_to_fraction(0.0), Ratio::new(0, 1));
        assert_eq!(decimal_to_fraction(-1.25), Ratio::new(-5, 4));
    }

    #[test]
    fn test_precision_is_six_digits() {
        assert_eq!(decimal_to_fraction(0.1234564), Ratio::new(123456, 1_000_000));
        assert_eq!(decimal_to_fraction(2.3), Ratio::new(23, 10));
        assert_eq!(decimal_to_fraction(1e-7), Ratio::new(0, 1));
    }

    #[test]
    fn test_rounds_rather_than_truncates() {
        assert_eq!(decimal_to_fraction(0.1234567), Ratio::new(123457, 1_000_000));
        assert_eq!(decimal_to_fraction(-0.1234567), Ratio::new(-123457, 1_000_000));
        assert_eq!(decimal_to_fraction(0.9999996), Ratio::new(1, 1));
    }

    #[test]
    fn test_result_is_reduced() {
        let frac = decimal_to_fraction(0.75);
        assert_eq!(*frac.numer(), 3);
        assert_eq!(*frac.denom(), 4);
        let frac = decimal_to_fraction(-0.000002);
        assert_eq!(*frac.numer(), -1);
        assert_eq!(*frac.denom(), 500_000);
    }

    proptest! {
        #[test]
        fn conversion_is_idempotent(x in -1000.0f64..1000.0) {
            let first = decimal_to_fraction(x);
            let again = decimal_to_fraction(to_f64(&first));
            prop_assert_eq!(first, again);
        }

        #[test]
        fn denominator_divides_precision(x in -50.0f64..50.0) {
            let frac = decimal_to_fraction(x);
            prop_assert!(*frac.denom() > 0);
            prop_assert_eq!(PRECISION % *frac.denom(), 0);
        }

        #[test]
        fn conversion_error_is_bounded(x in -50.0f64..50.0) {
            let frac = decimal_to_fraction(x);
            prop_assert!((to_f64(&frac) - x).abs() <= 0.5 / PRECISION as f64 + 1e-12);
        }
    }
}
