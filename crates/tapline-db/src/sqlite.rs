//! # SQLite Ledger
//!
//! [`Ledger`] implementation over the SQLite pool.
//!
//! Uses the runtime sqlx query API with explicit binds and row mapping.
//! Each method is exactly one statement (or one statement per row for the
//! line/attribution loops); the crate intentionally never opens a
//! cross-table transaction, matching the contract the engine compensates
//! against.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};
use tracing::debug;

use crate::error::{DbError, DbResult};
use crate::ledger::Ledger;
use tapline_core::{
    AuditEvent, AuditKind, DiscountSnapshot, ExpectedSales, KegInstance, KegSaleEntry,
    KegStatus, PaymentMethod, Product, ProductType, Role, Sale, SaleLine, TimeClockStatus,
    TimeLog, TimeLogStatus, UserRecord, Volume, VolumeUnit,
};

/// Ledger implementation backed by a SQLite pool.
#[derive(Debug, Clone)]
pub struct SqliteLedger {
    pool: SqlitePool,
}

impl SqliteLedger {
    pub fn new(pool: SqlitePool) -> Self {
        SqliteLedger { pool }
    }

    /// Hydrates the append-only attribution list for one keg instance.
    async fn keg_sales(&self, instance_id: &str) -> DbResult<Vec<KegSaleEntry>> {
        let rows = sqlx::query(
            r#"
            SELECT id, server_id, server_name, volume_ml, revenue_cents, at
            FROM keg_sales
            WHERE keg_instance_id = ?1
            ORDER BY at
            "#,
        )
        .bind(instance_id)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(keg_sale_from_row).collect()
    }

    /// Hydrates the line items for one sale.
    async fn sale_lines(&self, sale_id: &str) -> DbResult<Vec<SaleLine>> {
        let rows = sqlx::query(
            r#"
            SELECT id, product_id, name_snapshot, unit_price_cents, quantity, line_total_cents
            FROM sale_items
            WHERE sale_id = ?1
            ORDER BY rowid
            "#,
        )
        .bind(sale_id)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(sale_line_from_row).collect()
    }
}

#[async_trait]
impl Ledger for SqliteLedger {
    // -------------------------------------------------------------------------
    // users
    // -------------------------------------------------------------------------

    async fn get_user(&self, id: &str) -> DbResult<Option<UserRecord>> {
        let row = sqlx::query(
            r#"
            SELECT id, name, role, time_clock_status, clock_in_time
            FROM users
            WHERE id = ?1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(user_from_row).transpose()
    }

    async fn insert_user(&self, user: &UserRecord) -> DbResult<()> {
        sqlx::query(
            r#"
            INSERT INTO users (id, name, role, time_clock_status, clock_in_time)
            VALUES (?1, ?2, ?3, ?4, ?5)
            "#,
        )
        .bind(&user.id)
        .bind(&user.name)
        .bind(user.role.as_str())
        .bind(user.time_clock_status.as_str())
        .bind(user.clock_in_time)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn update_user_clock(
        &self,
        id: &str,
        status: TimeClockStatus,
        clock_in_time: Option<DateTime<Utc>>,
    ) -> DbResult<()> {
        debug!(user_id = %id, status = status.as_str(), "Updating user clock");

        let result = sqlx::query(
            r#"
            UPDATE users SET time_clock_status = ?2, clock_in_time = ?3
            WHERE id = ?1
            "#,
        )
        .bind(id)
        .bind(status.as_str())
        .bind(clock_in_time)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("User", id));
        }
        Ok(())
    }

    // -------------------------------------------------------------------------
    // products
    // -------------------------------------------------------------------------

    async fn get_product(&self, id: &str) -> DbResult<Option<Product>> {
        let row = sqlx::query(
            r#"
            SELECT id, name, category, price_cents, product_type,
                   stock, low_stock_threshold,
                   capacity, capacity_unit,
                   linked_keg_product_id, serving_size, serving_unit,
                   is_active, created_at, updated_at
            FROM products
            WHERE id = ?1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(product_from_row).transpose()
    }

    async fn insert_product(&self, product: &Product) -> DbResult<()> {
        sqlx::query(
            r#"
            INSERT INTO products (
                id, name, category, price_cents, product_type,
                stock, low_stock_threshold,
                capacity, capacity_unit,
                linked_keg_product_id, serving_size, serving_unit,
                is_active, created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15)
            "#,
        )
        .bind(&product.id)
        .bind(&product.name)
        .bind(&product.category)
        .bind(product.price_cents)
        .bind(product.product_type.as_str())
        .bind(product.stock)
        .bind(product.low_stock_threshold)
        .bind(product.capacity)
        .bind(product.capacity_unit.map(|u| u.as_str()))
        .bind(&product.linked_keg_product_id)
        .bind(product.serving_size)
        .bind(product.serving_unit.map(|u| u.as_str()))
        .bind(product.is_active)
        .bind(product.created_at)
        .bind(product.updated_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn update_product_stock(&self, id: &str, stock: i64) -> DbResult<()> {
        debug!(product_id = %id, stock, "Overwriting stock counter");

        let result = sqlx::query(
            r#"
            UPDATE products SET stock = ?2, updated_at = ?3
            WHERE id = ?1
            "#,
        )
        .bind(id)
        .bind(stock)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("Product", id));
        }
        Ok(())
    }

    // -------------------------------------------------------------------------
    // keg_instances
    // -------------------------------------------------------------------------

    async fn get_keg_instance(&self, id: &str) -> DbResult<Option<KegInstance>> {
        let row = sqlx::query(
            r#"
            SELECT id, product_id, capacity_ml, current_volume_ml, status,
                   tapped_by, tapped_at, closed_by, closed_at, created_at
            FROM keg_instances
            WHERE id = ?1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => {
                let mut instance = keg_from_row(&row)?;
                instance.sales = self.keg_sales(&instance.id).await?;
                Ok(Some(instance))
            }
            None => Ok(None),
        }
    }

    async fn list_keg_instances(&self, product_id: &str) -> DbResult<Vec<KegInstance>> {
        let rows = sqlx::query(
            r#"
            SELECT id, product_id, capacity_ml, current_volume_ml, status,
                   tapped_by, tapped_at, closed_by, closed_at, created_at
            FROM keg_instances
            WHERE product_id = ?1
            ORDER BY created_at
            "#,
        )
        .bind(product_id)
        .fetch_all(&self.pool)
        .await?;

        let mut instances = Vec::with_capacity(rows.len());
        for row in &rows {
            let mut instance = keg_from_row(row)?;
            instance.sales = self.keg_sales(&instance.id).await?;
            instances.push(instance);
        }
        Ok(instances)
    }

    async fn insert_keg_instance(&self, instance: &KegInstance) -> DbResult<()> {
        debug!(id = %instance.id, product_id = %instance.product_id, "Inserting keg instance");

        sqlx::query(
            r#"
            INSERT INTO keg_instances (
                id, product_id, capacity_ml, current_volume_ml, status,
                tapped_by, tapped_at, closed_by, closed_at, created_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
            "#,
        )
        .bind(&instance.id)
        .bind(&instance.product_id)
        .bind(instance.capacity.base())
        .bind(instance.current_volume.base())
        .bind(instance.status.as_str())
        .bind(&instance.tapped_by)
        .bind(instance.tapped_at)
        .bind(&instance.closed_by)
        .bind(instance.closed_at)
        .bind(instance.created_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn update_keg_instance(&self, instance: &KegInstance) -> DbResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE keg_instances SET
                capacity_ml = ?2,
                current_volume_ml = ?3,
                status = ?4,
                tapped_by = ?5,
                tapped_at = ?6,
                closed_by = ?7,
                closed_at = ?8
            WHERE id = ?1
            "#,
        )
        .bind(&instance.id)
        .bind(instance.capacity.base())
        .bind(instance.current_volume.base())
        .bind(instance.status.as_str())
        .bind(&instance.tapped_by)
        .bind(instance.tapped_at)
        .bind(&instance.closed_by)
        .bind(instance.closed_at)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("KegInstance", &instance.id));
        }
        Ok(())
    }

    async fn append_keg_sale(&self, instance_id: &str, entry: &KegSaleEntry) -> DbResult<()> {
        sqlx::query(
            r#"
            INSERT INTO keg_sales (
                id, keg_instance_id, server_id, server_name,
                volume_ml, revenue_cents, at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            "#,
        )
        .bind(&entry.id)
        .bind(instance_id)
        .bind(&entry.server_id)
        .bind(&entry.server_name)
        .bind(entry.volume.base())
        .bind(entry.revenue_cents)
        .bind(entry.at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    // -------------------------------------------------------------------------
    // sales
    // -------------------------------------------------------------------------

    async fn insert_sale(&self, sale: &Sale) -> DbResult<()> {
        debug!(id = %sale.id, total = sale.total_cents, "Inserting sale header");

        sqlx::query(
            r#"
            INSERT INTO sales (
                id, at, payment_method, server_id, server_name, customer_type,
                subtotal_cents, tax_cents, total_cents,
                discount_name, discount_cents
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
            "#,
        )
        .bind(&sale.id)
        .bind(sale.at)
        .bind(sale.payment_method.as_str())
        .bind(&sale.server_id)
        .bind(&sale.server_name)
        .bind(&sale.customer_type)
        .bind(sale.subtotal_cents)
        .bind(sale.tax_cents)
        .bind(sale.total_cents)
        .bind(sale.discount.as_ref().map(|d| d.name.clone()))
        .bind(sale.discount.as_ref().map(|d| d.amount_cents))
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn insert_sale_lines(&self, sale_id: &str, lines: &[SaleLine]) -> DbResult<()> {
        for line in lines {
            sqlx::query(
                r#"
                INSERT INTO sale_items (
                    id, sale_id, product_id, name_snapshot,
                    unit_price_cents, quantity, line_total_cents
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
                "#,
            )
            .bind(&line.id)
            .bind(sale_id)
            .bind(&line.product_id)
            .bind(&line.name_snapshot)
            .bind(line.unit_price_cents)
            .bind(line.quantity)
            .bind(line.line_total_cents)
            .execute(&self.pool)
            .await?;
        }
        Ok(())
    }

    async fn delete_sale(&self, sale_id: &str) -> DbResult<()> {
        debug!(sale_id = %sale_id, "Deleting sale header");

        // ON DELETE CASCADE removes any lines that did land.
        sqlx::query("DELETE FROM sales WHERE id = ?1")
            .bind(sale_id)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    async fn count_sales(&self) -> DbResult<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM sales")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    async fn list_sales_for_server_since(
        &self,
        server_id: &str,
        since: DateTime<Utc>,
    ) -> DbResult<Vec<Sale>> {
        let rows = sqlx::query(
            r#"
            SELECT id, at, payment_method, server_id, server_name, customer_type,
                   subtotal_cents, tax_cents, total_cents,
                   discount_name, discount_cents
            FROM sales
            WHERE server_id = ?1 AND at >= ?2
            ORDER BY at
            "#,
        )
        .bind(server_id)
        .bind(since)
        .fetch_all(&self.pool)
        .await?;

        let mut sales = Vec::with_capacity(rows.len());
        for row in &rows {
            let mut sale = sale_from_row(row)?;
            sale.lines = self.sale_lines(&sale.id).await?;
            sales.push(sale);
        }
        Ok(sales)
    }

    // -------------------------------------------------------------------------
    // time_logs
    // -------------------------------------------------------------------------

    async fn get_time_log(&self, id: &str) -> DbResult<Option<TimeLog>> {
        let row = sqlx::query(
            r#"
            SELECT id, user_id, user_name, clock_in, clock_out, status,
                   declared_cents, expected_cash_cents, expected_card_cents,
                   expected_total_cents, counted_cents, difference_cents,
                   rejection_reason, approved_by, duration_minutes
            FROM time_logs
            WHERE id = ?1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(time_log_from_row).transpose()
    }

    async fn find_open_time_log(&self, user_id: &str) -> DbResult<Option<TimeLog>> {
        let row = sqlx::query(
            r#"
            SELECT id, user_id, user_name, clock_in, clock_out, status,
                   declared_cents, expected_cash_cents, expected_card_cents,
                   expected_total_cents, counted_cents, difference_cents,
                   rejection_reason, approved_by, duration_minutes
            FROM time_logs
            WHERE user_id = ?1 AND status IN ('ongoing', 'pending_approval')
            ORDER BY clock_in DESC
            LIMIT 1
            "#,
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(time_log_from_row).transpose()
    }

    async fn insert_time_log(&self, log: &TimeLog) -> DbResult<()> {
        debug!(id = %log.id, user_id = %log.user_id, "Inserting time log");

        sqlx::query(
            r#"
            INSERT INTO time_logs (
                id, user_id, user_name, clock_in, clock_out, status,
                declared_cents, expected_cash_cents, expected_card_cents,
                expected_total_cents, counted_cents, difference_cents,
                rejection_reason, approved_by, duration_minutes
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15)
            "#,
        )
        .bind(&log.id)
        .bind(&log.user_id)
        .bind(&log.user_name)
        .bind(log.clock_in)
        .bind(log.clock_out)
        .bind(log.status.as_str())
        .bind(log.declared_cents)
        .bind(log.expected.map(|e| e.cash_cents))
        .bind(log.expected.map(|e| e.card_cents))
        .bind(log.expected.map(|e| e.total_cents))
        .bind(log.counted_cents)
        .bind(log.difference_cents)
        .bind(&log.rejection_reason)
        .bind(&log.approved_by)
        .bind(log.duration_minutes)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn update_time_log(&self, log: &TimeLog) -> DbResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE time_logs SET
                user_name = ?2, clock_in = ?3, clock_out = ?4, status = ?5,
                declared_cents = ?6, expected_cash_cents = ?7,
                expected_card_cents = ?8, expected_total_cents = ?9,
                counted_cents = ?10, difference_cents = ?11,
                rejection_reason = ?12, approved_by = ?13, duration_minutes = ?14
            WHERE id = ?1
            "#,
        )
        .bind(&log.id)
        .bind(&log.user_name)
        .bind(log.clock_in)
        .bind(log.clock_out)
        .bind(log.status.as_str())
        .bind(log.declared_cents)
        .bind(log.expected.map(|e| e.cash_cents))
        .bind(log.expected.map(|e| e.card_cents))
        .bind(log.expected.map(|e| e.total_cents))
        .bind(log.counted_cents)
        .bind(log.difference_cents)
        .bind(&log.rejection_reason)
        .bind(&log.approved_by)
        .bind(log.duration_minutes)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("TimeLog", &log.id));
        }
        Ok(())
    }

    // -------------------------------------------------------------------------
    // audit_log
    // -------------------------------------------------------------------------

    async fn insert_audit(&self, event: &AuditEvent) -> DbResult<()> {
        sqlx::query(
            r#"
            INSERT INTO audit_log (id, kind, actor_id, entity_id, detail, at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            "#,
        )
        .bind(&event.id)
        .bind(event.kind.as_str())
        .bind(&event.actor_id)
        .bind(&event.entity_id)
        .bind(&event.detail)
        .bind(event.at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn list_audit_events(&self) -> DbResult<Vec<AuditEvent>> {
        let rows = sqlx::query(
            r#"
            SELECT id, kind, actor_id, entity_id, detail, at
            FROM audit_log
            ORDER BY at
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(audit_from_row).collect()
    }
}

// =============================================================================
// Row Mapping
// =============================================================================

fn user_from_row(row: &SqliteRow) -> DbResult<UserRecord> {
    Ok(UserRecord {
        id: row.try_get("id")?,
        name: row.try_get("name")?,
        role: Role::parse(row.try_get("role")?).map_err(|e| DbError::corrupt("users", e))?,
        time_clock_status: TimeClockStatus::parse(row.try_get("time_clock_status")?)
            .map_err(|e| DbError::corrupt("users", e))?,
        clock_in_time: row.try_get("clock_in_time")?,
    })
}

fn unit_from_column(row: &SqliteRow, column: &str) -> DbResult<Option<VolumeUnit>> {
    let raw: Option<String> = row.try_get(column)?;
    raw.map(|s| VolumeUnit::parse(&s).map_err(|e| DbError::corrupt("products", e)))
        .transpose()
}

fn product_from_row(row: &SqliteRow) -> DbResult<Product> {
    Ok(Product {
        id: row.try_get("id")?,
        name: row.try_get("name")?,
        category: row.try_get("category")?,
        price_cents: row.try_get("price_cents")?,
        product_type: ProductType::parse(row.try_get("product_type")?)
            .map_err(|e| DbError::corrupt("products", e))?,
        stock: row.try_get("stock")?,
        low_stock_threshold: row.try_get("low_stock_threshold")?,
        capacity: row.try_get("capacity")?,
        capacity_unit: unit_from_column(row, "capacity_unit")?,
        linked_keg_product_id: row.try_get("linked_keg_product_id")?,
        serving_size: row.try_get("serving_size")?,
        serving_unit: unit_from_column(row, "serving_unit")?,
        is_active: row.try_get("is_active")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

fn keg_from_row(row: &SqliteRow) -> DbResult<KegInstance> {
    Ok(KegInstance {
        id: row.try_get("id")?,
        product_id: row.try_get("product_id")?,
        capacity: Volume::from_base(row.try_get("capacity_ml")?),
        current_volume: Volume::from_base(row.try_get("current_volume_ml")?),
        status: KegStatus::parse(row.try_get("status")?)
            .map_err(|e| DbError::corrupt("keg_instances", e))?,
        tapped_by: row.try_get("tapped_by")?,
        tapped_at: row.try_get("tapped_at")?,
        closed_by: row.try_get("closed_by")?,
        closed_at: row.try_get("closed_at")?,
        sales: Vec::new(),
        created_at: row.try_get("created_at")?,
    })
}

fn keg_sale_from_row(row: &SqliteRow) -> DbResult<KegSaleEntry> {
    Ok(KegSaleEntry {
        id: row.try_get("id")?,
        server_id: row.try_get("server_id")?,
        server_name: row.try_get("server_name")?,
        volume: Volume::from_base(row.try_get("volume_ml")?),
        revenue_cents: row.try_get("revenue_cents")?,
        at: row.try_get("at")?,
    })
}

fn sale_from_row(row: &SqliteRow) -> DbResult<Sale> {
    let discount_name: Option<String> = row.try_get("discount_name")?;
    let discount_cents: Option<i64> = row.try_get("discount_cents")?;
    let discount = match (discount_name, discount_cents) {
        (Some(name), Some(amount_cents)) => Some(DiscountSnapshot { name, amount_cents }),
        _ => None,
    };

    Ok(Sale {
        id: row.try_get("id")?,
        at: row.try_get("at")?,
        lines: Vec::new(),
        payment_method: PaymentMethod::parse(row.try_get("payment_method")?)
            .map_err(|e| DbError::corrupt("sales", e))?,
        server_id: row.try_get("server_id")?,
        server_name: row.try_get("server_name")?,
        customer_type: row.try_get("customer_type")?,
        subtotal_cents: row.try_get("subtotal_cents")?,
        tax_cents: row.try_get("tax_cents")?,
        total_cents: row.try_get("total_cents")?,
        discount,
    })
}

fn sale_line_from_row(row: &SqliteRow) -> DbResult<SaleLine> {
    Ok(SaleLine {
        id: row.try_get("id")?,
        product_id: row.try_get("product_id")?,
        name_snapshot: row.try_get("name_snapshot")?,
        unit_price_cents: row.try_get("unit_price_cents")?,
        quantity: row.try_get("quantity")?,
        line_total_cents: row.try_get("line_total_cents")?,
    })
}

fn time_log_from_row(row: &SqliteRow) -> DbResult<TimeLog> {
    let expected = match (
        row.try_get::<Option<i64>, _>("expected_cash_cents")?,
        row.try_get::<Option<i64>, _>("expected_card_cents")?,
        row.try_get::<Option<i64>, _>("expected_total_cents")?,
    ) {
        (Some(cash_cents), Some(card_cents), Some(total_cents)) => Some(ExpectedSales {
            cash_cents,
            card_cents,
            total_cents,
        }),
        _ => None,
    };

    Ok(TimeLog {
        id: row.try_get("id")?,
        user_id: row.try_get("user_id")?,
        user_name: row.try_get("user_name")?,
        clock_in: row.try_get("clock_in")?,
        clock_out: row.try_get("clock_out")?,
        status: TimeLogStatus::parse(row.try_get("status")?)
            .map_err(|e| DbError::corrupt("time_logs", e))?,
        declared_cents: row.try_get("declared_cents")?,
        expected,
        counted_cents: row.try_get("counted_cents")?,
        difference_cents: row.try_get("difference_cents")?,
        rejection_reason: row.try_get("rejection_reason")?,
        approved_by: row.try_get("approved_by")?,
        duration_minutes: row.try_get("duration_minutes")?,
    })
}

fn audit_from_row(row: &SqliteRow) -> DbResult<AuditEvent> {
    Ok(AuditEvent {
        id: row.try_get("id")?,
        kind: AuditKind::parse(row.try_get("kind")?)
            .map_err(|e| DbError::corrupt("audit_log", e))?,
        actor_id: row.try_get("actor_id")?,
        entity_id: row.try_get("entity_id")?,
        detail: row.try_get("detail")?,
        at: row.try_get("at")?,
    })
}

// =============================================================================
// Unit Tests
// =============================================================================
