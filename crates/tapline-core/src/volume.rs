//! # Volume Module
//!
//! Normalized keg volume bookkeeping.
//!
//! Keg capacities and serving sizes arrive in operator-friendly units
//! (litres, centilitres, kilograms). All bookkeeping happens in integer base
//! units: millilitres for liquids, grams for solids. A keg never mixes the
//! two families; the numeric ledger treats both as plain i64 base units.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::{Add, Sub};
use ts_rs::TS;

use crate::error::ValidationError;

// =============================================================================
// Volume Unit
// =============================================================================

/// Unit a capacity or serving size was entered in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum VolumeUnit {
    Milliliter,
    Centiliter,
    Liter,
    Gram,
    Kilogram,
}

impl VolumeUnit {
    /// Base units (ml or g) per one of this unit.
    #[inline]
    pub const fn base_factor(&self) -> i64 {
        match self {
            VolumeUnit::Milliliter | VolumeUnit::Gram => 1,
            VolumeUnit::Centiliter => 10,
            VolumeUnit::Liter | VolumeUnit::Kilogram => 1000,
        }
    }

    /// Stable string form used by the ledger store.
    pub const fn as_str(&self) -> &'static str {
        match self {
            VolumeUnit::Milliliter => "ml",
            VolumeUnit::Centiliter => "cl",
            VolumeUnit::Liter => "l",
            VolumeUnit::Gram => "g",
            VolumeUnit::Kilogram => "kg",
        }
    }

    /// Parses the ledger string form.
    pub fn parse(s: &str) -> Result<Self, ValidationError> {
        match s {
            "ml" => Ok(VolumeUnit::Milliliter),
            "cl" => Ok(VolumeUnit::Centiliter),
            "l" => Ok(VolumeUnit::Liter),
            "g" => Ok(VolumeUnit::Gram),
            "kg" => Ok(VolumeUnit::Kilogram),
            other => Err(ValidationError::InvalidFormat {
                field: "unit".to_string(),
                reason: format!("unknown unit '{other}'"),
            }),
        }
    }
}

// =============================================================================
// Volume
// =============================================================================

/// A normalized volume/mass in integer base units (ml or g).
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, TS, Default,
)]
#[ts(export)]
pub struct Volume(i64);

impl Volume {
    /// Creates a volume already expressed in base units.
    #[inline]
    pub const fn from_base(units: i64) -> Self {
        Volume(units)
    }

    /// Normalizes an operator-entered amount to base units.
    ///
    /// ## Example
    /// ```rust
    /// use tapline_core::volume::{Volume, VolumeUnit};
    ///
    /// assert_eq!(Volume::normalize(0.5, VolumeUnit::Liter).base(), 500);
    /// assert_eq!(Volume::normalize(50.0, VolumeUnit::Centiliter).base(), 500);
    /// ```
    pub fn normalize(amount: f64, unit: VolumeUnit) -> Self {
        Volume((amount * unit.base_factor() as f64).round() as i64)
    }

    /// Returns the value in base units.
    #[inline]
    pub const fn base(&self) -> i64 {
        self.0
    }

    /// Checks if the volume is zero.
    #[inline]
    pub const fn is_zero(&self) -> bool {
        self.0 == 0
    }

    /// Zero volume.
    #[inline]
    pub const fn zero() -> Self {
        Volume(0)
    }

    /// Multiplies by a serving count.
    #[inline]
    pub const fn multiply(&self, qty: i64) -> Self {
        Volume(self.0 * qty)
    }

    /// Subtraction clamped at zero; the volume ledger never goes negative.
    #[inline]
    pub fn saturating_sub(&self, other: Volume) -> Volume {
        Volume((self.0 - other.0).max(0))
    }
}

impl fmt::Display for Volume {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ml", self.0)
    }
}

impl Add for Volume {
    type Output = Self;

    #[inline]
    fn add(self, other: Self) -> Self {
        Volume(self.0 + other.0)
    }
}

impl Sub for Volume {
    type Output = Self;

    #[inline]
    fn sub(self, other: Self) -> Self {
        Volume(self.0 - other.0)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalization() {
        assert_eq!(Volume::normalize(20.0, VolumeUnit::Liter).base(), 20000);
        assert_eq!(Volume::normalize(0.5, VolumeUnit::Liter).base(), 500);
        assert_eq!(Volume::normalize(50.0, VolumeUnit::Centiliter).base(), 500);
        assert_eq!(Volume::normalize(500.0, VolumeUnit::Milliliter).base(), 500);
        assert_eq!(Volume::normalize(2.5, VolumeUnit::Kilogram).base(), 2500);
    }

    #[test]
    fn test_unit_round_trip() {
        for unit in [
            VolumeUnit::Milliliter,
            VolumeUnit::Centiliter,
            VolumeUnit::Liter,
            VolumeUnit::Gram,
            VolumeUnit::Kilogram,
        ] {
            assert_eq!(VolumeUnit::parse(unit.as_str()).unwrap(), unit);
        }
        assert!(VolumeUnit::parse("pints").is_err());
    }

    #[test]
    fn test_saturating_sub() {
        let a = Volume::from_base(500);
        let b = Volume::from_base(700);
        assert_eq!(a.saturating_sub(b), Volume::zero());
        assert_eq!(b.saturating_sub(a).base(), 200);
    }

    #[test]
    fn test_multiply() {
        assert_eq!(Volume::from_base(500).multiply(40).base(), 20000);
    }
}
