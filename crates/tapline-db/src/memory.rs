//! # In-Memory Ledger
//!
//! A `HashMap`-backed [`Ledger`] used by the engine test suites and local
//! tooling. Behaves like the SQLite implementation at the trait surface,
//! including the absence of cross-table transactions: every call succeeds
//! or fails on its own.
//!
//! ## Fault Injection
//! Partial-write scenarios (the whole reason the engine carries
//! compensation logic) need a store that fails on demand:
//!
//! ```rust
//! use tapline_db::MemoryLedger;
//!
//! let ledger = MemoryLedger::new();
//! ledger.fail_next("insert_sale_lines");
//! // the next insert_sale_lines call returns QueryFailed, later calls pass
//! ```

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::{DbError, DbResult};
use crate::ledger::Ledger;
use tapline_core::{
    AuditEvent, KegInstance, KegSaleEntry, Product, Sale, SaleLine, TimeClockStatus, TimeLog,
    UserRecord,
};

/// Plain rows, keyed by id where lookup by id exists.
#[derive(Default)]
struct Store {
    users: HashMap<String, UserRecord>,
    products: HashMap<String, Product>,
    kegs: HashMap<String, KegInstance>,
    sales: HashMap<String, Sale>,
    time_logs: HashMap<String, TimeLog>,
    audit: Vec<AuditEvent>,
}

/// In-memory ledger with per-operation fault injection.
#[derive(Default)]
pub struct MemoryLedger {
    store: Mutex<Store>,
    /// Operation names whose next invocation fails.
    fail_next: Mutex<HashSet<&'static str>>,
}

impl MemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes the next call to the named trait operation fail with
    /// `DbError::QueryFailed`. One-shot: the failure is consumed.
    pub fn fail_next(&self, op: &'static str) {
        self.fail_next
            .lock()
            .expect("fault set poisoned")
            .insert(op);
    }

    fn maybe_fail(&self, op: &'static str) -> DbResult<()> {
        let mut set = self.fail_next.lock().expect("fault set poisoned");
        if set.remove(op) {
            return Err(DbError::QueryFailed(format!("injected failure: {op}")));
        }
        Ok(())
    }

    fn with_store<T>(&self, f: impl FnOnce(&mut Store) -> T) -> T {
        let mut store = self.store.lock().expect("store poisoned");
        f(&mut store)
    }
}

#[async_trait]
impl Ledger for MemoryLedger {
    // -------------------------------------------------------------------------
    // users
    // -------------------------------------------------------------------------

    async fn get_user(&self, id: &str) -> DbResult<Option<UserRecord>> {
        self.maybe_fail("get_user")?;
        Ok(self.with_store(|s| s.users.get(id).cloned()))
    }

    async fn insert_user(&self, user: &UserRecord) -> DbResult<()> {
        self.maybe_fail("insert_user")?;
        self.with_store(|s| s.users.insert(user.id.clone(), user.clone()));
        Ok(())
    }

    async fn update_user_clock(
        &self,
        id: &str,
        status: TimeClockStatus,
        clock_in_time: Option<DateTime<Utc>>,
    ) -> DbResult<()> {
        self.maybe_fail("update_user_clock")?;
        self.with_store(|s| match s.users.get_mut(id) {
            Some(user) => {
                user.time_clock_status = status;
                user.clock_in_time = clock_in_time;
                Ok(())
            }
            None => Err(DbError::not_found("User", id)),
        })
    }

    // -------------------------------------------------------------------------
    // products
    // -------------------------------------------------------------------------

    async fn get_product(&self, id: &str) -> DbResult<Option<Product>> {
        self.maybe_fail("get_product")?;
        Ok(self.with_store(|s| s.products.get(id).cloned()))
    }

    async fn insert_product(&self, product: &Product) -> DbResult<()> {
        self.maybe_fail("insert_product")?;
        self.with_store(|s| s.products.insert(product.id.clone(), product.clone()));
        Ok(())
    }

    async fn update_product_stock(&self, id: &str, stock: i64) -> DbResult<()> {
        self.maybe_fail("update_product_stock")?;
        self.with_store(|s| match s.products.get_mut(id) {
            Some(product) => {
                product.stock = Some(stock);
                product.updated_at = Utc::now();
                Ok(())
            }
            None => Err(DbError::not_found("Product", id)),
        })
    }

    // -------------------------------------------------------------------------
    // keg_instances
    // -------------------------------------------------------------------------

    async fn get_keg_instance(&self, id: &str) -> DbResult<Option<KegInstance>> {
        self.maybe_fail("get_keg_instance")?;
        Ok(self.with_store(|s| s.kegs.get(id).cloned()))
    }

    async fn list_keg_instances(&self, product_id: &str) -> DbResult<Vec<KegInstance>> {
        self.maybe_fail("list_keg_instances")?;
        Ok(self.with_store(|s| {
            let mut instances: Vec<KegInstance> = s
                .kegs
                .values()
                .filter(|k| k.product_id == product_id)
                .cloned()
                .collect();
            instances.sort_by(|a, b| a.created_at.cmp(&b.created_at));
            instances
        }))
    }

    async fn insert_keg_instance(&self, instance: &KegInstance) -> DbResult<()> {
        self.maybe_fail("insert_keg_instance")?;
        self.with_store(|s| s.kegs.insert(instance.id.clone(), instance.clone()));
        Ok(())
    }

    async fn update_keg_instance(&self, instance: &KegInstance) -> DbResult<()> {
        self.maybe_fail("update_keg_instance")?;
        self.with_store(|s| match s.kegs.get_mut(&instance.id) {
            Some(existing) => {
                // Scalar fields only; the attribution list is append-only.
                existing.capacity = instance.capacity;
                existing.current_volume = instance.current_volume;
                existing.status = instance.status;
                existing.tapped_by = instance.tapped_by.clone();
                existing.tapped_at = instance.tapped_at;
                existing.closed_by = instance.closed_by.clone();
                existing.closed_at = instance.closed_at;
                Ok(())
            }
            None => Err(DbError::not_found("KegInstance", &instance.id)),
        })
    }

    async fn append_keg_sale(&self, instance_id: &str, entry: &KegSaleEntry) -> DbResult<()> {
        self.maybe_fail("append_keg_sale")?;
        self.with_store(|s| match s.kegs.get_mut(instance_id) {
            Some(keg) => {
                keg.sales.push(entry.clone());
                Ok(())
            }
            None => Err(DbError::not_found("KegInstance", instance_id)),
        })
    }

    // -------------------------------------------------------------------------
    // sales
    // -------------------------------------------------------------------------

    async fn insert_sale(&self, sale: &Sale) -> DbResult<()> {
        self.maybe_fail("insert_sale")?;
        self.with_store(|s| {
            // Header only; lines arrive through insert_sale_lines.
            let mut header = sale.clone();
            header.lines.clear();
            s.sales.insert(sale.id.clone(), header);
        });
        Ok(())
    }

    async fn insert_sale_lines(&self, sale_id: &str, lines: &[SaleLine]) -> DbResult<()> {
        self.maybe_fail("insert_sale_lines")?;
        self.with_store(|s| match s.sales.get_mut(sale_id) {
            Some(sale) => {
                sale.lines = lines.to_vec();
                Ok(())
            }
            None => Err(DbError::not_found("Sale", sale_id)),
        })
    }

    async fn delete_sale(&self, sale_id: &str) -> DbResult<()> {
        self.maybe_fail("delete_sale")?;
        self.with_store(|s| s.sales.remove(sale_id));
        Ok(())
    }

    async fn count_sales(&self) -> DbResult<i64> {
        self.maybe_fail("count_sales")?;
        Ok(self.with_store(|s| s.sales.len() as i64))
    }

    async fn list_sales_for_server_since(
        &self,
        server_id: &str,
        since: DateTime<Utc>,
    ) -> DbResult<Vec<Sale>> {
        self.maybe_fail("list_sales_for_server_since")?;
        Ok(self.with_store(|s| {
            let mut sales: Vec<Sale> = s
                .sales
                .values()
                .filter(|sale| sale.server_id == server_id && sale.at >= since)
                .cloned()
                .collect();
            sales.sort_by(|a, b| a.at.cmp(&b.at));
            sales
        }))
    }

    // -------------------------------------------------------------------------
    // time_logs
    // -------------------------------------------------------------------------

    async fn get_time_log(&self, id: &str) -> DbResult<Option<TimeLog>> {
        self.maybe_fail("get_time_log")?;
        Ok(self.with_store(|s| s.time_logs.get(id).cloned()))
    }

    async fn find_open_time_log(&self, user_id: &str) -> DbResult<Option<TimeLog>> {
        self.maybe_fail("find_open_time_log")?;
        Ok(self.with_store(|s| {
            s.time_logs
                .values()
                .filter(|log| log.user_id == user_id && log.status.is_open())
                .max_by_key(|log| log.clock_in)
                .cloned()
        }))
    }

    async fn insert_time_log(&self, log: &TimeLog) -> DbResult<()> {
        self.maybe_fail("insert_time_log")?;
        self.with_store(|s| s.time_logs.insert(log.id.clone(), log.clone()));
        Ok(())
    }

    async fn update_time_log(&self, log: &TimeLog) -> DbResult<()> {
        self.maybe_fail("update_time_log")?;
        self.with_store(|s| {
            if !s.time_logs.contains_key(&log.id) {
                return Err(DbError::not_found("TimeLog", &log.id));
            }
            s.time_logs.insert(log.id.clone(), log.clone());
            Ok(())
        })
    }

    // -------------------------------------------------------------------------
    // audit_log
    // -------------------------------------------------------------------------

    async fn insert_audit(&self, event: &AuditEvent) -> DbResult<()> {
        self.maybe_fail("insert_audit")?;
        self.with_store(|s| s.audit.push(event.clone()));
        Ok(())
    }

    async fn list_audit_events(&self) -> DbResult<Vec<AuditEvent>> {
        self.maybe_fail("list_audit_events")?;
        Ok(self.with_store(|s| s.audit.clone()))
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use tapline_core::{Role, TimeLogStatus};

    fn user(id: &str) -> UserRecord {
        UserRecord {
            id: id.to_string(),
            name: "Ana".to_string(),
            role: Role::Server,
            time_clock_status: TimeClockStatus::ClockedOut,
            clock_in_time: None,
        }
    }

    fn log(id: &str, user_id: &str, status: TimeLogStatus) -> TimeLog {
        TimeLog {
            id: id.to_string(),
            user_id: user_id.to_string(),
            user_name: "Ana".to_string(),
            clock_in: Utc::now(),
            clock_out: None,
            status,
            declared_cents: None,
            expected: None,
            counted_cents: None,
            difference_cents: None,
            rejection_reason: None,
            approved_by: None,
            duration_minutes: None,
        }
    }

    #[tokio::test]
    async fn test_user_clock_round_trip() {
        let ledger = MemoryLedger::new();
        ledger.insert_user(&user("u-1")).await.unwrap();

        let now = Utc::now();
        ledger
            .update_user_clock("u-1", TimeClockStatus::ClockedIn, Some(now))
            .await
            .unwrap();

        let fetched = ledger.get_user("u-1").await.unwrap().unwrap();
        assert_eq!(fetched.time_clock_status, TimeClockStatus::ClockedIn);
        assert_eq!(fetched.clock_in_time, Some(now));
    }

    #[tokio::test]
    async fn test_find_open_time_log_skips_closed() {
        let ledger = MemoryLedger::new();
        ledger
            .insert_time_log(&log("t-1", "u-1", TimeLogStatus::Completed))
            .await
            .unwrap();
        assert!(ledger.find_open_time_log("u-1").await.unwrap().is_none());

        ledger
            .insert_time_log(&log("t-2", "u-1", TimeLogStatus::Ongoing))
            .await
            .unwrap();
        let open = ledger.find_open_time_log("u-1").await.unwrap().unwrap();
        assert_eq!(open.id, "t-2");
    }

    #[tokio::test]
    async fn test_fault_injection_is_one_shot() {
        let ledger = MemoryLedger::new();
        ledger.fail_next("count_sales");

        assert!(matches!(
            ledger.count_sales().await,
            Err(DbError::QueryFailed(_))
        ));
        assert_eq!(ledger.count_sales().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_update_missing_row_is_not_found() {
        let ledger = MemoryLedger::new();
        let err = ledger
            .update_user_clock("ghost", TimeClockStatus::ClockedOut, None)
            .await
            .unwrap_err();
        assert!(matches!(err, DbError::NotFound { .. }));
    }
}
