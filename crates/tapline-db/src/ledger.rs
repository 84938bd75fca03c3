//! # The Ledger Trait
//!
//! The entire persistence surface the transactional core is allowed to use.
//!
//! ## Contract
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  - Row-level CRUD per entity table. NO cross-table transactions.        │
//! │  - Every call is an independent await point that can fail on its own.  │
//! │  - Updates are direct overwrites computed from a freshly-read value    │
//! │    (read-verify-write); no atomic increment primitive is offered.      │
//! │  - Callers own write ordering and compensation for multi-step ops.     │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Implementations: [`crate::SqliteLedger`] for production,
//! [`crate::MemoryLedger`] for tests and local tooling.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::DbResult;
use tapline_core::{
    AuditEvent, KegInstance, KegSaleEntry, Product, Sale, SaleLine, TimeClockStatus, TimeLog,
    UserRecord,
};

/// Row-oriented persistence service for the Tapline core.
#[async_trait]
pub trait Ledger: Send + Sync {
    // -------------------------------------------------------------------------
    // users
    // -------------------------------------------------------------------------

    async fn get_user(&self, id: &str) -> DbResult<Option<UserRecord>>;

    async fn insert_user(&self, user: &UserRecord) -> DbResult<()>;

    /// Overwrites the cached clock fields on the user row.
    async fn update_user_clock(
        &self,
        id: &str,
        status: TimeClockStatus,
        clock_in_time: Option<DateTime<Utc>>,
    ) -> DbResult<()>;

    // -------------------------------------------------------------------------
    // products
    // -------------------------------------------------------------------------

    async fn get_product(&self, id: &str) -> DbResult<Option<Product>>;

    async fn insert_product(&self, product: &Product) -> DbResult<()>;

    /// Overwrites the stock counter with a value the caller computed from a
    /// fresh read. Concurrent writers can race; see the engine's design
    /// notes on this inherited gap.
    async fn update_product_stock(&self, id: &str, stock: i64) -> DbResult<()>;

    // -------------------------------------------------------------------------
    // keg_instances
    // -------------------------------------------------------------------------

    /// Fetches one instance, sales attributions hydrated.
    async fn get_keg_instance(&self, id: &str) -> DbResult<Option<KegInstance>>;

    /// All instances of one keg product, sales attributions hydrated.
    async fn list_keg_instances(&self, product_id: &str) -> DbResult<Vec<KegInstance>>;

    async fn insert_keg_instance(&self, instance: &KegInstance) -> DbResult<()>;

    /// Overwrites the scalar fields (status, volume, actors). The sales
    /// attribution list is append-only and only grows through
    /// [`Ledger::append_keg_sale`].
    async fn update_keg_instance(&self, instance: &KegInstance) -> DbResult<()>;

    async fn append_keg_sale(&self, instance_id: &str, entry: &KegSaleEntry) -> DbResult<()>;

    // -------------------------------------------------------------------------
    // sales / sale_items
    // -------------------------------------------------------------------------

    /// Writes the sale header only. Line items are a separate write.
    async fn insert_sale(&self, sale: &Sale) -> DbResult<()>;

    /// Writes all line items for a sale as one call that fails as a unit.
    async fn insert_sale_lines(&self, sale_id: &str, lines: &[SaleLine]) -> DbResult<()>;

    /// Compensating delete for an orphaned header (removes its lines too).
    async fn delete_sale(&self, sale_id: &str) -> DbResult<()>;

    async fn count_sales(&self) -> DbResult<i64>;

    /// Sales rung up by one server at or after `since`, lines hydrated,
    /// oldest first.
    async fn list_sales_for_server_since(
        &self,
        server_id: &str,
        since: DateTime<Utc>,
    ) -> DbResult<Vec<Sale>>;

    // -------------------------------------------------------------------------
    // time_logs
    // -------------------------------------------------------------------------

    async fn get_time_log(&self, id: &str) -> DbResult<Option<TimeLog>>;

    /// The newest log for the user whose status is Ongoing or
    /// PendingApproval. The shift machine's uniqueness invariant says at
    /// most one such log exists.
    async fn find_open_time_log(&self, user_id: &str) -> DbResult<Option<TimeLog>>;

    async fn insert_time_log(&self, log: &TimeLog) -> DbResult<()>;

    /// Full-row overwrite, also used to restore prior values when a
    /// compensating rollback runs.
    async fn update_time_log(&self, log: &TimeLog) -> DbResult<()>;

    // -------------------------------------------------------------------------
    // audit_log
    // -------------------------------------------------------------------------

    async fn insert_audit(&self, event: &AuditEvent) -> DbResult<()>;

    async fn list_audit_events(&self) -> DbResult<Vec<AuditEvent>>;
}
