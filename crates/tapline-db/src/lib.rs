//! # tapline-db: Ledger Store Boundary for Tapline
//!
//! This crate is the persistence boundary the transactional core writes
//! through. It deliberately exposes **row-level CRUD per entity table and
//! nothing more**: no cross-table transaction primitive exists on the
//! [`Ledger`] trait, so every multi-step business operation in
//! `tapline-engine` must order its writes and compensate explicitly when a
//! later step fails.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  tapline-engine                                                         │
//! │       │  Ledger trait (users, products, keg_instances, sales,          │
//! │       │                sale_items, time_logs, audit_log)               │
//! │       ▼                                                                 │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                    tapline-db (THIS CRATE)                      │   │
//! │  │                                                                 │   │
//! │  │   ┌───────────────┐    ┌───────────────┐    ┌──────────────┐  │   │
//! │  │   │   Database    │    │ SqliteLedger  │    │ MemoryLedger │  │   │
//! │  │   │   (pool.rs)   │◄───│ (sqlite.rs)   │    │ (memory.rs)  │  │   │
//! │  │   │  WAL, FK on   │    │ runtime sqlx  │    │ tests/tools  │  │   │
//! │  │   └───────────────┘    └───────────────┘    └──────────────┘  │   │
//! │  │            embedded migrations (migrations/sqlite)             │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Organization
//!
//! - [`ledger`] - The `Ledger` trait: the entire store surface
//! - [`pool`] - Connection pool creation and configuration
//! - [`migrations`] - Embedded database migrations
//! - [`sqlite`] - SQLite implementation of the trait
//! - [`memory`] - In-memory implementation with fault injection
//! - [`error`] - Database error types

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod ledger;
pub mod memory;
pub mod migrations;
pub mod pool;
pub mod sqlite;

// =============================================================================
// Re-exports
// =============================================================================

pub use error::{DbError, DbResult};
pub use ledger::Ledger;
pub use memory::MemoryLedger;
pub use pool::{Database, DbConfig};
pub use sqlite::SqliteLedger;
