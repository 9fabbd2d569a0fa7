//! Decimal price and size types for order book levels.
//!
//! Venue levels arrive as decimal strings or JSON numbers; keeping them as
//! `Decimal` preserves ordering and equality exactly. Ratios shown to consumers
//! (bps, percentages) are converted to `f64` at the edge.

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::{Add, Sub};
use std::str::FromStr;

/// Price of one book level or trade.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Price(pub Decimal);

impl Price {
    pub const ZERO: Self = Self(Decimal::ZERO);

    #[inline]
    pub fn new(value: Decimal) -> Self {
        Self(value)
    }

    #[inline]
    pub fn inner(&self) -> Decimal {
        self.0
    }

    #[inline]
    pub fn is_positive(&self) -> bool {
        self.0.is_sign_positive() && !self.0.is_zero()
    }

    /// Midpoint of two prices.
    #[inline]
    pub fn midpoint(a: Price, b: Price) -> Price {
        Self((a.0 + b.0) / Decimal::TWO)
    }

    /// Signed distance from `reference` in basis points.
    ///
    /// Returns `None` when the reference is zero.
    pub fn bps_from(&self, reference: Price) -> Option<f64> {
        if reference.0.is_zero() {
            return None;
        }
        ((self.0 - reference.0) / reference.0 * Decimal::from(10_000)).to_f64()
    }

    /// Lossy conversion for display math.
    #[inline]
    pub fn to_f64(&self) -> f64 {
        self.0.to_f64().unwrap_or(0.0)
    }
}

impl fmt::Display for Price {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for Price {
    type Err = rust_decimal::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(s.parse()?))
    }
}

impl From<Decimal> for Price {
    fn from(d: Decimal) -> Self {
        Self(d)
    }
}

impl Sub for Price {
    type Output = Self;

    fn sub(self, rhs: Self) -> Self::Output {
        Self(self.0 - rhs.0)
    }
}

/// Resting size of one book level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Size(pub Decimal);

impl Size {
    pub const ZERO: Self = Self(Decimal::ZERO);

    #[inline]
    pub fn new(value: Decimal) -> Self {
        Self(value)
    }

    #[inline]
    pub fn inner(&self) -> Decimal {
        self.0
    }

    #[inline]
    pub fn is_zero(&self) -> bool {
        self.0.is_zero()
    }

    #[inline]
    pub fn is_positive(&self) -> bool {
        self.0.is_sign_positive() && !self.0.is_zero()
    }

    /// Ratio of this size to `max`, in `[0, 1]` for non-negative inputs.
    pub fn ratio_of(&self, max: Size) -> f64 {
        if max.is_zero() {
            return 0.0;
        }
        (self.0 / max.0).to_f64().unwrap_or(0.0)
    }

    #[inline]
    pub fn to_f64(&self) -> f64 {
        self.0.to_f64().unwrap_or(0.0)
    }
}

impl fmt::Display for Size {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for Size {
    type Err = rust_decimal::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(s.parse()?))
    }
}

impl From<Decimal> for Size {
    fn from(d: Decimal) -> Self {
        Self(d)
    }
}

impl Add for Size {
    type Output = Self;

    fn add(self, rhs: Self) -> Self::Output {
        Self(self.0 + rhs.0)
    }
}

impl std::iter::Sum for Size {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(Size::ZERO, |acc, s| acc + s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_price_bps_from() {
        let p1 = Price::new(dec!(100));
        let p2 = Price::new(dec!(101));

        let bps = p2.bps_from(p1).unwrap();
        assert!((bps - 100.0).abs() < 1e-9); // 1% = 100 bps
        assert!(p2.bps_from(Price::ZERO).is_none());
    }

    #[test]
    fn test_price_midpoint() {
        let mid = Price::midpoint(Price::new(dec!(100)), Price::new(dec!(101)));
        assert_eq!(mid.inner(), dec!(100.5));
    }

    #[test]
    fn test_size_ratio_and_sum() {
        let total: Size = [dec!(1.5), dec!(2.5)].into_iter().map(Size::new).sum();
        assert_eq!(total.inner(), dec!(4));
        assert!((Size::new(dec!(1)).ratio_of(total) - 0.25).abs() < 1e-12);
        assert_eq!(Size::new(dec!(1)).ratio_of(Size::ZERO), 0.0);
    }
}
