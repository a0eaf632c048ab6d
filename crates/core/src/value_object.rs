//! Value objects: equality by value, not identity.

use serde::{Deserialize, Serialize};

/// Marker trait for value objects.
///
/// Value objects are **immutable** and **compared by value**: two instances with the
/// same attributes are interchangeable. To "modify" one, build a new one.
pub trait ValueObject: Clone + PartialEq + core::fmt::Debug {}

/// Monetary amount in the smallest currency unit (e.g. cents).
///
/// Single-currency by construction; arithmetic saturates instead of wrapping.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Money(i64);

impl ValueObject for Money {}

impl Money {
    pub const ZERO: Money = Money(0);

    pub const fn from_minor(minor: i64) -> Self {
        Self(minor)
    }

    pub const fn minor(self) -> i64 {
        self.0
    }

    pub fn is_negative(self) -> bool {
        self.0 < 0
    }

    pub fn is_positive(self) -> bool {
        self.0 > 0
    }

    /// `self * quantity`, saturating.
    pub fn times(self, quantity: i64) -> Money {
        Money(self.0.saturating_mul(quantity))
    }

    pub fn plus(self, other: Money) -> Money {
        Money(self.0.saturating_add(other.0))
    }

    pub fn minus(self, other: Money) -> Money {
        Money(self.0.saturating_sub(other.0))
    }

    /// Divide by a positive quantity, rounding half away from zero.
    ///
    /// Returns `None` when `quantity <= 0`.
    pub fn per_unit(self, quantity: i64) -> Option<Money> {
        if quantity <= 0 {
            return None;
        }
        let value = self.0 as i128;
        let q = quantity as i128;
        let half = q / 2;
        let rounded = if value >= 0 {
            (value + half) / q
        } else {
            (value - half) / q
        };
        Some(Money(rounded as i64))
    }

    /// Scale by a floating-point factor (rates, percentages), rounded to the nearest unit.
    pub fn scale(self, factor: f64) -> Money {
        Money((self.0 as f64 * factor).round() as i64)
    }

    pub fn as_f64(self) -> f64 {
        self.0 as f64
    }
}

impl core::fmt::Display for Money {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        let abs = self.0.unsigned_abs();
        write!(f, "{sign}{}.{:02}", abs / 100, abs % 100)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn per_unit_rounds_half_away_from_zero() {
        assert_eq!(Money::from_minor(1000).per_unit(3), Some(Money::from_minor(333)));
        assert_eq!(Money::from_minor(1001).per_unit(2), Some(Money::from_minor(501)));
        assert_eq!(Money::from_minor(-1001).per_unit(2), Some(Money::from_minor(-501)));
        assert_eq!(Money::from_minor(10).per_unit(0), None);
    }

    #[test]
    fn display_formats_minor_units() {
        assert_eq!(Money::from_minor(1205).to_string(), "12.05");
        assert_eq!(Money::from_minor(-7).to_string(), "-0.07");
    }
}
