//! Exact rational scale factors
//!
//! Register tables specify multipliers such as `0.1` or `0.01 * CT`. Keeping
//! them as reduced fractions means `2305 * 1/10` is computed as one integer
//! product and one division, so the result is exactly `230.5`.

use crate::error::ScaleError;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Scale {
    numerator: i64,
    denominator: u32,
}

impl Scale {
    pub const ONE: Self = Self {
        numerator: 1,
        denominator: 1,
    };

    /// `numerator / denominator`, reduced to lowest terms
    pub fn ratio(numerator: i64, denominator: u32) -> Result<Self, ScaleError> {
        if denominator == 0 {
            return Err(ScaleError::ZeroDenominator);
        }
        Self::reduced(i128::from(numerator), i128::from(denominator))
    }

    /// `mantissa * 10^exponent`, e.g. `decimal(1, -2)` is 0.01
    pub fn decimal(mantissa: i64, exponent: i8) -> Result<Self, ScaleError> {
        if !(-9..=9).contains(&exponent) {
            return Err(ScaleError::ExponentOutOfRange(exponent));
        }
        let power = 10i128.pow(u32::from(exponent.unsigned_abs()));
        if exponent < 0 {
            Self::reduced(i128::from(mantissa), power)
        } else {
            Self::reduced(i128::from(mantissa) * power, 1)
        }
    }

    /// Composite factor, e.g. a base multiplier times a transformer ratio
    pub fn times(self, other: Scale) -> Result<Self, ScaleError> {
        Self::reduced(
            i128::from(self.numerator) * i128::from(other.numerator),
            i128::from(self.denominator) * i128::from(other.denominator),
        )
    }

    pub fn numerator(&self) -> i64 {
        self.numerator
    }

    pub fn denominator(&self) -> u32 {
        self.denominator
    }

    pub fn is_one(&self) -> bool {
        *self == Self::ONE
    }

    pub fn as_f64(&self) -> f64 {
        self.numerator as f64 / f64::from(self.denominator)
    }

    /// Raw register integer to engineering value
    pub fn apply(&self, raw: i128) -> f64 {
        match raw.checked_mul(i128::from(self.numerator)) {
            Some(product) => product as f64 / f64::from(self.denominator),
            None => raw as f64 * self.as_f64(),
        }
    }

    /// Integral engineering value back to a raw register integer
    ///
    /// `None` when the result is not an integer.
    pub fn unapply_integer(&self, engineering: i128) -> Option<i128> {
        if self.numerator == 0 {
            return None;
        }
        let scaled = engineering.checked_mul(i128::from(self.denominator))?;
        let numerator = i128::from(self.numerator);
        if scaled % numerator != 0 {
            return None;
        }
        Some(scaled / numerator)
    }

    /// Floating engineering value back to a raw register integer
    ///
    /// `None` unless the quotient is integral to within 1e-9 (relative).
    pub fn unapply_float(&self, engineering: f64) -> Option<i128> {
        if self.numerator == 0 || !engineering.is_finite() {
            return None;
        }
        let raw = engineering * f64::from(self.denominator) / self.numerator as f64;
        let rounded = raw.round();
        let tolerance = 1e-9 * rounded.abs().max(1.0);
        if (raw - rounded).abs() > tolerance || rounded.abs() > i128::MAX as f64 {
            return None;
        }
        Some(rounded as i128)
    }

    fn reduced(numerator: i128, denominator: i128) -> Result<Self, ScaleError> {
        let divisor = gcd(numerator.unsigned_abs(), denominator.unsigned_abs()).max(1) as i128;
        let numerator =
            i64::try_from(numerator / divisor).map_err(|_| ScaleError::Overflow)?;
        let denominator =
            u32::try_from(denominator / divisor).map_err(|_| ScaleError::Overflow)?;
        Ok(Self {
            numerator,
            denominator,
        })
    }
}

impl Default for Scale {
    fn default() -> Self {
        Self::ONE
    }
}

impl fmt::Display for Scale {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.denominator == 1 {
            write!(f, "x{}", self.numerator)
        } else {
            write!(f, "x{}/{}", self.numerator, self.denominator)
        }
    }
}

fn gcd(mut a: u128, mut b: u128) -> u128 {
    while b != 0 {
        (a, b) = (b, a % b);
    }
    a
}

#[cfg(test)]
#[allow(clippy::disallowed_methods)] // Test code - unwrap is acceptable
mod tests {
    use super::*;

    #[test]
    fn test_decimal_is_exact() {
        let tenth = Scale::decimal(1, -1).unwrap();
        assert_eq!(tenth, Scale::ratio(1, 10).unwrap());
        assert_eq!(tenth.apply(2305), 230.5);
        assert_eq!(Scale::decimal(1, 1).unwrap().apply(7), 70.0);
    }

    #[test]
    fn test_reduction() {
        let s = Scale::ratio(40, 100).unwrap();
        assert_eq!((s.numerator(), s.denominator()), (2, 5));
        assert!(Scale::ratio(3, 3).unwrap().is_one());
    }

    #[test]
    fn test_composite_meter_factor() {
        let current = Scale::decimal(1, -2)
            .unwrap()
            .times(Scale::ratio(40, 1).unwrap())
            .unwrap();
        assert_eq!(current, Scale::ratio(2, 5).unwrap());
        assert_eq!(current.apply(1000), 400.0);
    }

    #[test]
    fn test_invalid_scales() {
        assert_eq!(Scale::ratio(1, 0), Err(ScaleError::ZeroDenominator));
        assert_eq!(Scale::decimal(1, 12), Err(ScaleError::ExponentOutOfRange(12)));
    }

    #[test]
    fn test_unapply() {
        let tenth = Scale::decimal(1, -1).unwrap();
        assert_eq!(tenth.unapply_integer(23), Some(230));
        assert_eq!(tenth.unapply_float(23.5), Some(235));
        assert_eq!(tenth.unapply_float(23.55), None);

        let ten = Scale::ratio(10, 1).unwrap();
        assert_eq!(ten.unapply_integer(30), Some(3));
        assert_eq!(ten.unapply_integer(35), None);
    }

    #[test]
    fn test_negative_apply() {
        assert_eq!(Scale::decimal(1, -3).unwrap().apply(-34949), -34.949);
    }
}
