//! # tapline-engine: The Transactional Consistency Core
//!
//! Guarantees that inventory, keg volume, and cash-shift state never
//! diverge from recorded business events, even under partial failure of
//! the underlying Ledger Store.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  UI collaborator (forms, receipts, printers - out of scope)            │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │               ★ tapline-engine (THIS CRATE) ★                   │   │
//! │  │                                                                 │   │
//! │  │   ┌───────────┐  ┌───────────┐  ┌───────────┐  ┌───────────┐  │   │
//! │  │   │   sale    │  │    keg    │  │   shift   │  │  healer   │  │   │
//! │  │   │ processor │─►│ lifecycle │  │  machine  │◄─│           │  │   │
//! │  │   └───────────┘  └───────────┘  └───────────┘  └───────────┘  │   │
//! │  │         │            compensate + audit              │         │   │
//! │  └─────────┼────────────────────────────────────────────┼─────────┘   │
//! │            ▼                                            ▼             │
//! │  Ledger trait: row CRUD only, NO cross-table transactions            │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Consistency Model
//!
//! - **Read-verify-write**: guarded transitions re-read authoritative rows
//!   immediately before writing; cached client state is never trusted.
//! - **Ordered writes**: sale header before lines, lines before inventory
//!   decrements. Violating this order would risk visible sales with no
//!   recorded items.
//! - **Compensation, not transactions**: when a later step of a multi-step
//!   write fails, an explicit undo write runs (delete the orphaned sale
//!   header, restore the prior time log). See [`compensate`].
//! - **Documented drift window**: a post-commit inventory decrement that
//!   fails does not void the sale; it is logged and audited as
//!   `inventory_drift`. Stock/volume overwrites computed from a fresh read
//!   can race across terminals; both gaps are inherited from the business
//!   process and surfaced in the audit trail rather than hidden.

// =============================================================================
// Module Declarations
// =============================================================================

pub mod audit;
pub mod compensate;
pub mod config;
pub mod error;
pub mod healer;
pub mod keg;
pub mod sale;
pub mod shift;

// =============================================================================
// Re-exports
// =============================================================================

pub use config::EngineConfig;
pub use error::{ServiceError, ServiceResult};
pub use healer::StateHealer;
pub use keg::{KegCloseOutcome, KegManager};
pub use sale::{SaleProcessor, SaleRequest};
pub use shift::ShiftService;

use std::sync::Arc;

use tapline_db::Ledger;

/// Facade bundling the four services over one ledger handle.
///
/// ## Usage
/// ```rust,ignore
/// let db = Database::new(DbConfig::new("./tapline.db")).await?;
/// let engine = Engine::new(Arc::new(db.ledger()), EngineConfig::default());
/// let sale = engine.sales().process_sale(request).await?;
/// ```
#[derive(Clone)]
pub struct Engine {
    ledger: Arc<dyn Ledger>,
    config: EngineConfig,
}

impl Engine {
    pub fn new(ledger: Arc<dyn Ledger>, config: EngineConfig) -> Self {
        Engine { ledger, config }
    }

    /// The sale transaction processor.
    pub fn sales(&self) -> SaleProcessor {
        SaleProcessor::new(Arc::clone(&self.ledger), self.config.tax_rate())
    }

    /// The keg lifecycle manager.
    pub fn kegs(&self) -> KegManager {
        KegManager::new(Arc::clone(&self.ledger), self.config.keg_residual_warn_bps)
    }

    /// The shift/time-clock state machine.
    pub fn shifts(&self) -> ShiftService {
        ShiftService::new(Arc::clone(&self.ledger))
    }

    /// The state healer.
    pub fn healer(&self) -> StateHealer {
        StateHealer::new(Arc::clone(&self.ledger))
    }
}
