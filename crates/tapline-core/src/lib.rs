//! # tapline-core: Pure Business Logic for Tapline
//!
//! This crate is the heart of the Tapline POS core. It contains the business
//! rules as pure functions with zero I/O dependencies.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Tapline Architecture                            │
//! │                                                                         │
//! │  UI collaborator (out of scope)                                        │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  tapline-engine  ── sale processor, keg lifecycle, shift machine       │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  ★ tapline-core (THIS CRATE) ★                                         │
//! │                                                                         │
//! │   ┌───────────┐  ┌───────────┐  ┌───────────┐  ┌───────────┐          │
//! │   │   types   │  │   money   │  │  volume   │  │   guard   │          │
//! │   │  Product  │  │   Money   │  │  Volume   │  │ inventory │          │
//! │   │  TimeLog  │  │  TaxRate  │  │   units   │  │  checks   │          │
//! │   └───────────┘  └───────────┘  └───────────┘  └───────────┘          │
//! │                                                                         │
//! │   NO I/O • NO DATABASE • NO NETWORK • PURE FUNCTIONS                   │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  tapline-db  ── Ledger Store boundary (SQLite / in-memory)             │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Design Principles
//!
//! 1. **Pure functions**: same input, same output; the Inventory Guard never
//!    mutates anything, it only judges a snapshot.
//! 2. **Integer money**: all monetary values are cents (i64); prices on sale
//!    lines are snapshots, never live references.
//! 3. **Integer volume**: keg volumes are normalized base units (ml / g).
//! 4. **Explicit errors**: every business rejection is a typed enum variant.

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod guard;
pub mod money;
pub mod types;
pub mod volume;

// =============================================================================
// Re-exports for Convenience
// =============================================================================

pub use error::{CoreError, CoreResult, ValidationError};
pub use money::{Money, TaxRate};
pub use types::*;
pub use volume::{Volume, VolumeUnit};

// =============================================================================
// Crate-Level Constants
// =============================================================================

/// Default tax rate for the venue: 16%, expressed in basis points.
///
/// Totals are tax-inclusive in this business domain; see
/// [`Money::split_inclusive_tax`]. Configurable per deployment through the
/// engine configuration, but the default is deterministic.
pub const DEFAULT_TAX_RATE_BPS: u32 = 1600;

/// Residual-volume threshold for the keg close write-off warning,
/// in basis points of capacity (100 bps = 1%).
pub const KEG_RESIDUAL_WARN_BPS: u32 = 100;

/// Maximum quantity of a single line in an order.
///
/// Prevents accidental over-ordering (e.g. typing 1000 instead of 10).
pub const MAX_LINE_QUANTITY: i64 = 999;
