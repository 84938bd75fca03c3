//! # Engine Configuration
//!
//! Business constants with deterministic defaults. Deserializable so a
//! deployment can override them from its settings file.

use serde::Deserialize;

use tapline_core::{TaxRate, DEFAULT_TAX_RATE_BPS, KEG_RESIDUAL_WARN_BPS};

/// Tunable business parameters.
#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Tax rate in basis points. Totals are tax-inclusive.
    pub tax_rate_bps: u32,

    /// Residual keg volume (bps of capacity) above which closing a keg
    /// raises a write-off warning for the operator to confirm.
    pub keg_residual_warn_bps: u32,
}

impl EngineConfig {
    pub fn tax_rate(&self) -> TaxRate {
        TaxRate::from_bps(self.tax_rate_bps)
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            tax_rate_bps: DEFAULT_TAX_RATE_BPS,
            keg_residual_warn_bps: KEG_RESIDUAL_WARN_BPS,
        }
    }
}
