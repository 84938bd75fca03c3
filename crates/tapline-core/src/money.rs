//! # Money Module
//!
//! Integer money and the tax-inclusive split used by the sale processor.
//!
//! ## Why Integer Money?
//! ```text
//! Floating point:  0.1 + 0.2 = 0.30000000000000004   WRONG
//! Integer cents:   10 + 20 = 30                       exact
//! ```
//! Every monetary value in the system is i64 cents. Only the UI converts to
//! a display currency.
//!
//! ## Tax-Inclusive Pricing
//! Menu prices in this domain already include tax. The recorded breakdown is
//! derived from the charged total, not the other way around:
//! `net = total / (1 + rate)`, `tax = total − net`.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::{Add, AddAssign, Mul, Sub, SubAssign};
use ts_rs::TS;

// =============================================================================
// Tax Rate
// =============================================================================

/// Tax rate represented in basis points (1 bps = 0.01%).
///
/// 1600 bps = 16%, the venue default (see `DEFAULT_TAX_RATE_BPS`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct TaxRate(u32);

impl TaxRate {
    /// Creates a tax rate from basis points.
    #[inline]
    pub const fn from_bps(bps: u32) -> Self {
        TaxRate(bps)
    }

    /// Returns the rate in basis points.
    #[inline]
    pub const fn bps(&self) -> u32 {
        self.0
    }

    /// Returns the rate as a percentage (for display only).
    #[inline]
    pub fn percentage(&self) -> f64 {
        self.0 as f64 / 100.0
    }

    /// Zero tax rate.
    #[inline]
    pub const fn zero() -> Self {
        TaxRate(0)
    }
}

impl Default for TaxRate {
    fn default() -> Self {
        TaxRate(crate::DEFAULT_TAX_RATE_BPS)
    }
}

// =============================================================================
// Money Type
// =============================================================================

/// A monetary value in the smallest currency unit (cents).
///
/// Signed so that differences (declared minus expected cash) can go negative.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct Money(i64);

impl Money {
    /// Creates a Money value from cents.
    #[inline]
    pub const fn from_cents(cents: i64) -> Self {
        Money(cents)
    }

    /// Returns the value in cents.
    #[inline]
    pub const fn cents(&self) -> i64 {
        self.0
    }

    /// Zero money value.
    #[inline]
    pub const fn zero() -> Self {
        Money(0)
    }

    /// Checks if the value is zero.
    #[inline]
    pub const fn is_zero(&self) -> bool {
        self.0 == 0
    }

    /// Checks if the value is negative.
    #[inline]
    pub const fn is_negative(&self) -> bool {
        self.0 < 0
    }

    /// Multiplies money by a quantity (line totals).
    #[inline]
    pub const fn multiply_quantity(&self, qty: i64) -> Self {
        Money(self.0 * qty)
    }

    /// Splits a tax-inclusive total into `(net, tax)`.
    ///
    /// `net = total / (1 + rate)` with round-half-up integer math, then
    /// `tax = total − net`, so `net + tax == total` always holds exactly.
    ///
    /// ## Example
    /// ```rust
    /// use tapline_core::money::{Money, TaxRate};
    ///
    /// let total = Money::from_cents(11600);
    /// let (net, tax) = total.split_inclusive_tax(TaxRate::from_bps(1600));
    /// assert_eq!(net.cents(), 10000);
    /// assert_eq!(tax.cents(), 1600);
    /// ```
    pub fn split_inclusive_tax(&self, rate: TaxRate) -> (Money, Money) {
        if rate.bps() == 0 {
            return (*self, Money::zero());
        }
        // i128 to prevent overflow on large totals.
        let denom = 10_000i128 + rate.bps() as i128;
        let net = ((self.0 as i128 * 10_000 + denom / 2) / denom) as i64;
        (Money(net), Money(self.0 - net))
    }
}

// =============================================================================
// Trait Implementations
// =============================================================================

/// Debug-friendly display; real formatting belongs to the UI layer.
impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        write!(f, "{}{}.{:02}", sign, (self.0 / 100).abs(), (self.0 % 100).abs())
    }
}

impl Default for Money {
    fn default() -> Self {
        Money::zero()
    }
}

impl Add for Money {
    type Output = Self;

    #[inline]
    fn add(self, other: Self) -> Self {
        Money(self.0 + other.0)
    }
}

impl AddAssign for Money {
    #[inline]
    fn add_assign(&mut self, other: Self) {
        self.0 += other.0;
    }
}

impl Sub for Money {
    type Output = Self;

    #[inline]
    fn sub(self, other: Self) -> Self {
        Money(self.0 - other.0)
    }
}

impl SubAssign for Money {
    #[inline]
    fn sub_assign(&mut self, other: Self) {
        self.0 -= other.0;
    }
}

impl Mul<i64> for Money {
    type Output = Self;

    #[inline]
    fn mul(self, qty: i64) -> Self {
        Money(self.0 * qty)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_cents() {
        let money = Money::from_cents(1099);
        assert_eq!(money.cents(), 1099);
    }

    #[test]
    fn test_display() {
        assert_eq!(format!("{}", Money::from_cents(1099)), "10.99");
        assert_eq!(format!("{}", Money::from_cents(-550)), "-5.50");
        assert_eq!(format!("{}", Money::from_cents(0)), "0.00");
    }

    #[test]
    fn test_arithmetic() {
        let a = Money::from_cents(1000);
        let b = Money::from_cents(500);

        assert_eq!((a + b).cents(), 1500);
        assert_eq!((a - b).cents(), 500);
        assert_eq!((a * 3).cents(), 3000);
        assert_eq!(a.multiply_quantity(4).cents(), 4000);
    }

    #[test]
    fn test_inclusive_split_exact() {
        // 11600 at 16% splits exactly into 10000 + 1600
        let (net, tax) = Money::from_cents(11600).split_inclusive_tax(TaxRate::from_bps(1600));
        assert_eq!(net.cents(), 10000);
        assert_eq!(tax.cents(), 1600);
    }

    #[test]
    fn test_inclusive_split_reconstructs_total() {
        // The split must reconstruct the total exactly even when rounding.
        let rate = TaxRate::from_bps(1600);
        for total in [1, 3, 99, 11599, 11601, 999_999] {
            let money = Money::from_cents(total);
            let (net, tax) = money.split_inclusive_tax(rate);
            assert_eq!(net.cents() + tax.cents(), total);
        }
    }

    #[test]
    fn test_inclusive_split_zero_rate() {
        let (net, tax) = Money::from_cents(500).split_inclusive_tax(TaxRate::zero());
        assert_eq!(net.cents(), 500);
        assert!(tax.is_zero());
    }

    #[test]
    fn test_default_rate_is_sixteen_percent() {
        assert_eq!(TaxRate::default().bps(), 1600);
        assert!((TaxRate::default().percentage() - 16.0).abs() < f64::EPSILON);
    }
}
