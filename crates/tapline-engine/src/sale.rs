//! # Sale Transaction Processor
//!
//! Orchestrates a sale as an ordered multi-entity write against a store
//! with no cross-table atomicity.
//!
//! ## Write Order
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  1. GUARD      fresh reads + Inventory Guard; reject before any write  │
//! │  2. TOTALS     gross − discount, tax-inclusive split                   │
//! │  3. HEADER     insert sale header; failure → abort, nothing written   │
//! │  4. LINES      insert all line items; failure → compensating delete   │
//! │                of the header (a header must never exist lineless)     │
//! │  5. INVENTORY  per-line stock / keg-volume decrements, independent;   │
//! │                failure → logged + audited drift, sale stands          │
//! │  6. AUDIT      sale_committed entry, best effort                      │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Step 5 is the documented inconsistency window: the sale is already
//! committed, so a failed decrement is recorded as `inventory_drift`
//! rather than voiding the sale.

use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::audit;
use crate::compensate::run_compensated;
use crate::error::{ServiceError, ServiceResult};
use tapline_core::{
    guard, AuditKind, CoreError, DiscountSnapshot, KegInstance, KegSaleEntry, Money, OrderLine,
    PaymentMethod, Product, Sale, SaleLine, TaxRate, ValidationError,
};
use tapline_db::Ledger;

/// A sale as handed over by the UI layer.
#[derive(Debug, Clone)]
pub struct SaleRequest {
    pub lines: Vec<OrderLine>,
    pub payment_method: PaymentMethod,
    /// Server ringing the sale up; attribution and shift reconciliation
    /// hang off this id.
    pub server_id: String,
    /// Customer-type tag, opaque to the core.
    pub customer_type: String,
    pub discount: Option<DiscountSnapshot>,
}

/// The sale transaction processor.
pub struct SaleProcessor {
    ledger: Arc<dyn Ledger>,
    tax_rate: TaxRate,
}

impl SaleProcessor {
    pub fn new(ledger: Arc<dyn Ledger>, tax_rate: TaxRate) -> Self {
        SaleProcessor { ledger, tax_rate }
    }

    /// Validates and commits a sale. See module docs for the write order.
    pub async fn process_sale(&self, request: SaleRequest) -> ServiceResult<Sale> {
        debug!(
            lines = request.lines.len(),
            server_id = %request.server_id,
            "Processing sale"
        );

        let server = self
            .ledger
            .get_user(&request.server_id)
            .await?
            .ok_or_else(|| CoreError::UserNotFound(request.server_id.clone()))?;

        // Fresh snapshot for the guard; nothing cached client-side counts.
        let (products, kegs) = self.load_snapshot(&request.lines).await?;
        guard::check_order(&request.lines, &products, &kegs)?;

        let sale = self.build_sale(&request, &server.name, &products)?;

        // Header first. A failure here aborts with no further effects.
        self.ledger.insert_sale(&sale).await?;

        // All lines or none: a failed line write deletes the header.
        let ledger = &self.ledger;
        let sale_id = sale.id.clone();
        run_compensated(
            "insert_sale_lines",
            ledger.insert_sale_lines(&sale.id, &sale.lines),
            move || async move { ledger.delete_sale(&sale_id).await },
        )
        .await?;

        // Inventory effects are applied per line, independently. The sale
        // is committed; a failure past this point is drift, not rollback.
        for line in &sale.lines {
            if let Err(err) = self.apply_inventory_effect(&sale, line, &products).await {
                warn!(
                    sale_id = %sale.id,
                    product_id = %line.product_id,
                    error = %err,
                    "Post-commit inventory update failed; sale stands"
                );
                audit::record(
                    self.ledger.as_ref(),
                    AuditKind::InventoryDrift,
                    &sale.server_id,
                    &sale.id,
                    format!(
                        "inventory update failed for product {}: {err}",
                        line.product_id
                    ),
                )
                .await;
            }
        }

        audit::record(
            self.ledger.as_ref(),
            AuditKind::SaleCommitted,
            &sale.server_id,
            &sale.id,
            format!(
                "{} lines, total {}, {}",
                sale.lines.len(),
                sale.total(),
                sale.payment_method.as_str()
            ),
        )
        .await;

        info!(
            sale_id = %sale.id,
            total_cents = sale.total_cents,
            lines = sale.lines.len(),
            "Sale committed"
        );

        Ok(sale)
    }

    /// Fresh product rows for every line plus keg instances for every
    /// linked keg product in the order.
    async fn load_snapshot(
        &self,
        lines: &[OrderLine],
    ) -> ServiceResult<(Vec<Product>, Vec<KegInstance>)> {
        let mut products: Vec<Product> = Vec::with_capacity(lines.len());
        for line in lines {
            if products.iter().any(|p| p.id == line.product_id) {
                continue;
            }
            let product = self
                .ledger
                .get_product(&line.product_id)
                .await?
                .ok_or_else(|| CoreError::ProductNotFound(line.product_id.clone()))?;
            products.push(product);
        }

        let mut kegs: Vec<KegInstance> = Vec::new();
        for product in &products {
            if let Some(keg_product_id) = product.linked_keg_product_id.as_deref() {
                if kegs.iter().any(|k| k.product_id == keg_product_id) {
                    continue;
                }
                kegs.extend(self.ledger.list_keg_instances(keg_product_id).await?);
            }
        }

        Ok((products, kegs))
    }

    /// Computes totals and snapshots the line items.
    fn build_sale(
        &self,
        request: &SaleRequest,
        server_name: &str,
        products: &[Product],
    ) -> ServiceResult<Sale> {
        let mut lines = Vec::with_capacity(request.lines.len());
        let mut gross = Money::zero();

        for order_line in &request.lines {
            // The guard already proved every product exists.
            let product = products
                .iter()
                .find(|p| p.id == order_line.product_id)
                .ok_or_else(|| CoreError::ProductNotFound(order_line.product_id.clone()))?;

            let line_total = product.price().multiply_quantity(order_line.quantity);
            gross += line_total;

            lines.push(SaleLine {
                id: Uuid::new_v4().to_string(),
                product_id: product.id.clone(),
                name_snapshot: product.name.clone(),
                unit_price_cents: product.price_cents,
                quantity: order_line.quantity,
                line_total_cents: line_total.cents(),
            });
        }

        let discount_amount = match &request.discount {
            Some(discount) => {
                if discount.amount_cents < 0 {
                    return Err(ServiceError::Rejected(
                        ValidationError::MustBePositive {
                            field: "discount.amount".to_string(),
                        }
                        .into(),
                    ));
                }
                if discount.amount_cents > gross.cents() {
                    return Err(ServiceError::Rejected(
                        ValidationError::OutOfRange {
                            field: "discount.amount".to_string(),
                            min: 0,
                            max: gross.cents(),
                        }
                        .into(),
                    ));
                }
                Money::from_cents(discount.amount_cents)
            }
            None => Money::zero(),
        };

        let total = gross - discount_amount;
        let (subtotal, tax) = total.split_inclusive_tax(self.tax_rate);

        Ok(Sale {
            id: Uuid::new_v4().to_string(),
            at: Utc::now(),
            lines,
            payment_method: request.payment_method,
            server_id: request.server_id.clone(),
            server_name: server_name.to_string(),
            customer_type: request.customer_type.clone(),
            subtotal_cents: subtotal.cents(),
            tax_cents: tax.cents(),
            total_cents: total.cents(),
            discount: request.discount.clone(),
        })
    }

    /// Applies one line's inventory effect from a fresh read of the row it
    /// touches: stock overwrite for stocked products, volume decrement plus
    /// an attribution append for keg-backed services.
    async fn apply_inventory_effect(
        &self,
        sale: &Sale,
        line: &SaleLine,
        snapshot: &[Product],
    ) -> Result<(), tapline_db::DbError> {
        let Some(product) = snapshot.iter().find(|p| p.id == line.product_id) else {
            return Ok(());
        };

        if product.tracks_stock() {
            // Re-read, then overwrite. Concurrent sales can race here; the
            // store offers no atomic decrement (see design notes).
            let fresh = self
                .ledger
                .get_product(&product.id)
                .await?
                .ok_or_else(|| tapline_db::DbError::not_found("Product", &product.id))?;

            let current = fresh.stock.unwrap_or(0);
            let new_stock = (current - line.quantity).max(0);
            if current < line.quantity {
                warn!(
                    product_id = %product.id,
                    current,
                    quantity = line.quantity,
                    "Stock below sold quantity at decrement time; clamping to zero"
                );
            }
            self.ledger.update_product_stock(&product.id, new_stock).await?;

            if let Some(threshold) = fresh.low_stock_threshold {
                if new_stock <= threshold {
                    warn!(
                        product_id = %product.id,
                        name = %fresh.name,
                        stock = new_stock,
                        threshold,
                        "Low stock"
                    );
                }
            }
            return Ok(());
        }

        if let Some(keg_product_id) = product.linked_keg_product_id.as_deref() {
            let Some(serving) = product.serving_volume() else {
                // Guard rejects missing serving sizes before any write.
                return Ok(());
            };

            let instances = self.ledger.list_keg_instances(keg_product_id).await?;
            let Some(tapped) = guard::find_tapped(&instances, keg_product_id) else {
                return Err(tapline_db::DbError::not_found(
                    "Tapped KegInstance",
                    keg_product_id,
                ));
            };

            let draw = serving.multiply(line.quantity);
            let mut updated = tapped.clone();
            updated.current_volume = tapped.current_volume.saturating_sub(draw);
            self.ledger.update_keg_instance(&updated).await?;

            self.ledger
                .append_keg_sale(
                    &updated.id,
                    &KegSaleEntry {
                        id: Uuid::new_v4().to_string(),
                        server_id: sale.server_id.clone(),
                        server_name: sale.server_name.clone(),
                        volume: draw,
                        revenue_cents: line.line_total_cents,
                        at: sale.at,
                    },
                )
                .await?;

            debug!(
                keg_instance = %updated.id,
                drawn = %draw,
                remaining = %updated.current_volume,
                "Keg volume drawn"
            );
        }

        Ok(())
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use chrono::Utc;
    use tapline_core::{
        KegStatus, ProductType, Role, TimeClockStatus, UserRecord, Volume, VolumeUnit,
    };
    use tapline_db::MemoryLedger;

    fn server(id: &str) -> UserRecord {
        UserRecord {
            id: id.to_string(),
            name: "Ana".to_string(),
            role: Role::Server,
            time_clock_status: TimeClockStatus::ClockedIn,
            clock_in_time: Some(Utc::now()),
        }
    }

    fn stocked(id: &str, price_cents: i64, stock: i64) -> Product {
        Product {
            id: id.to_string(),
            name: format!("Bottled {id}"),
            category: "bottles".to_string(),
            price_cents,
            product_type: ProductType::Stocked,
            stock: Some(stock),
            low_stock_threshold: Some(2),
            capacity: None,
            capacity_unit: None,
            linked_keg_product_id: None,
            serving_size: None,
            serving_unit: None,
            is_active: true,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn pint(id: &str, keg_product: &str, price_cents: i64, serving_ml: f64) -> Product {
        Product {
            id: id.to_string(),
            name: format!("Pint {id}"),
            category: "draft".to_string(),
            price_cents,
            product_type: ProductType::Service,
            stock: None,
            low_stock_threshold: None,
            capacity: None,
            capacity_unit: None,
            linked_keg_product_id: Some(keg_product.to_string()),
            serving_size: Some(serving_ml),
            serving_unit: Some(VolumeUnit::Milliliter),
            is_active: true,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn tapped_keg(id: &str, product_id: &str, current_ml: i64) -> KegInstance {
        KegInstance {
            id: id.to_string(),
            product_id: product_id.to_string(),
            capacity: Volume::from_base(20_000),
            current_volume: Volume::from_base(current_ml),
            status: KegStatus::Tapped,
            tapped_by: Some("u-1".to_string()),
            tapped_at: Some(Utc::now()),
            closed_by: None,
            closed_at: None,
            sales: vec![],
            created_at: Utc::now(),
        }
    }

    fn request(lines: Vec<OrderLine>) -> SaleRequest {
        SaleRequest {
            lines,
            payment_method: PaymentMethod::Cash,
            server_id: "u-1".to_string(),
            customer_type: "regular".to_string(),
            discount: None,
        }
    }

    fn line(product_id: &str, quantity: i64) -> OrderLine {
        OrderLine {
            product_id: product_id.to_string(),
            quantity,
        }
    }

    async fn processor_with_stocked() -> (Arc<MemoryLedger>, SaleProcessor) {
        let ledger = Arc::new(MemoryLedger::new());
        ledger.insert_user(&server("u-1")).await.unwrap();
        ledger
            .insert_product(&stocked("cola", 500, 5))
            .await
            .unwrap();
        let processor = SaleProcessor::new(ledger.clone(), TaxRate::default());
        (ledger, processor)
    }

    #[tokio::test]
    async fn test_sale_commits_and_decrements_stock() {
        let (ledger, processor) = processor_with_stocked().await;

        let sale = processor
            .process_sale(request(vec![line("cola", 2)]))
            .await
            .unwrap();

        assert_eq!(sale.total_cents, 1000);
        assert_eq!(sale.subtotal_cents + sale.tax_cents, sale.total_cents);
        assert_eq!(sale.lines.len(), 1);
        assert_eq!(sale.lines[0].name_snapshot, "Bottled cola");
        assert_eq!(sale.server_name, "Ana");

        let product = ledger.get_product("cola").await.unwrap().unwrap();
        assert_eq!(product.stock, Some(3));
        assert_eq!(ledger.count_sales().await.unwrap(), 1);

        let audit = ledger.list_audit_events().await.unwrap();
        assert!(audit.iter().any(|e| e.kind == AuditKind::SaleCommitted));
    }

    #[tokio::test]
    async fn test_stock_sold_to_zero_then_next_sale_rejected() {
        let (ledger, processor) = processor_with_stocked().await;

        processor
            .process_sale(request(vec![line("cola", 5)]))
            .await
            .unwrap();
        let product = ledger.get_product("cola").await.unwrap().unwrap();
        assert_eq!(product.stock, Some(0));

        let err = processor
            .process_sale(request(vec![line("cola", 1)]))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            ServiceError::Rejected(CoreError::InsufficientStock { .. })
        ));
        let product = ledger.get_product("cola").await.unwrap().unwrap();
        assert_eq!(product.stock, Some(0));
    }

    #[tokio::test]
    async fn test_insufficient_stock_rejected_with_no_writes() {
        let (ledger, processor) = processor_with_stocked().await;

        let err = processor
            .process_sale(request(vec![line("cola", 6)]))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            ServiceError::Rejected(CoreError::InsufficientStock { .. })
        ));

        assert_eq!(ledger.count_sales().await.unwrap(), 0);
        let product = ledger.get_product("cola").await.unwrap().unwrap();
        assert_eq!(product.stock, Some(5));
    }

    #[tokio::test]
    async fn test_keg_draw_decrements_volume_and_attributes_revenue() {
        let ledger = Arc::new(MemoryLedger::new());
        ledger.insert_user(&server("u-1")).await.unwrap();
        ledger
            .insert_product(&pint("pint", "keg-prod", 600, 500.0))
            .await
            .unwrap();
        ledger
            .insert_keg_instance(&tapped_keg("ki-1", "keg-prod", 20_000))
            .await
            .unwrap();
        let processor = SaleProcessor::new(ledger.clone(), TaxRate::default());

        processor
            .process_sale(request(vec![line("pint", 2)]))
            .await
            .unwrap();

        let keg = ledger.get_keg_instance("ki-1").await.unwrap().unwrap();
        assert_eq!(keg.current_volume.base(), 19_000);
        assert_eq!(keg.sales.len(), 1);
        assert_eq!(keg.sales[0].volume.base(), 1_000);
        assert_eq!(keg.sales[0].revenue_cents, 1_200);
        assert_eq!(keg.sales[0].server_name, "Ana");
    }

    #[tokio::test]
    async fn test_order_exceeding_keg_volume_rejected() {
        let ledger = Arc::new(MemoryLedger::new());
        ledger.insert_user(&server("u-1")).await.unwrap();
        ledger
            .insert_product(&pint("pint", "keg-prod", 600, 500.0))
            .await
            .unwrap();
        ledger
            .insert_keg_instance(&tapped_keg("ki-1", "keg-prod", 20_000))
            .await
            .unwrap();
        let processor = SaleProcessor::new(ledger.clone(), TaxRate::default());

        let err = processor
            .process_sale(request(vec![line("pint", 41)]))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            ServiceError::Rejected(CoreError::InsufficientVolume { .. })
        ));

        let keg = ledger.get_keg_instance("ki-1").await.unwrap().unwrap();
        assert_eq!(keg.current_volume.base(), 20_000);
        assert_eq!(ledger.count_sales().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_line_write_failure_deletes_header() {
        let (ledger, processor) = processor_with_stocked().await;
        ledger.fail_next("insert_sale_lines");

        let err = processor
            .process_sale(request(vec![line("cola", 2)]))
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::Store(_)));

        // No lineless header survives, and inventory was never touched.
        assert_eq!(ledger.count_sales().await.unwrap(), 0);
        let product = ledger.get_product("cola").await.unwrap().unwrap();
        assert_eq!(product.stock, Some(5));
    }

    #[tokio::test]
    async fn test_header_write_failure_aborts_cleanly() {
        let (ledger, processor) = processor_with_stocked().await;
        ledger.fail_next("insert_sale");

        assert!(processor
            .process_sale(request(vec![line("cola", 2)]))
            .await
            .is_err());
        assert_eq!(ledger.count_sales().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_post_commit_stock_failure_keeps_sale_and_records_drift() {
        let (ledger, processor) = processor_with_stocked().await;
        ledger.fail_next("update_product_stock");

        let sale = processor
            .process_sale(request(vec![line("cola", 2)]))
            .await
            .unwrap();

        assert_eq!(ledger.count_sales().await.unwrap(), 1);
        // Stock was never decremented, and the divergence is in the trail.
        let product = ledger.get_product("cola").await.unwrap().unwrap();
        assert_eq!(product.stock, Some(5));

        let audit = ledger.list_audit_events().await.unwrap();
        let drift = audit
            .iter()
            .find(|e| e.kind == AuditKind::InventoryDrift)
            .unwrap();
        assert_eq!(drift.entity_id, sale.id);
    }

    #[tokio::test]
    async fn test_discount_reduces_total_before_tax_split() {
        let (_, processor) = processor_with_stocked().await;

        let mut req = request(vec![line("cola", 2)]);
        req.discount = Some(DiscountSnapshot {
            name: "happy hour".to_string(),
            amount_cents: 200,
        });

        let sale = processor.process_sale(req).await.unwrap();
        assert_eq!(sale.total_cents, 800);
        assert_eq!(sale.gross_cents(), 1000);
        assert_eq!(sale.subtotal_cents + sale.tax_cents, 800);
    }

    #[tokio::test]
    async fn test_discount_exceeding_gross_rejected() {
        let (ledger, processor) = processor_with_stocked().await;

        let mut req = request(vec![line("cola", 1)]);
        req.discount = Some(DiscountSnapshot {
            name: "too much".to_string(),
            amount_cents: 501,
        });

        let err = processor.process_sale(req).await.unwrap_err();
        assert!(matches!(
            err,
            ServiceError::Rejected(CoreError::Validation(_))
        ));
        assert_eq!(ledger.count_sales().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_unknown_server_rejected() {
        let ledger = Arc::new(MemoryLedger::new());
        ledger
            .insert_product(&stocked("cola", 500, 5))
            .await
            .unwrap();
        let processor = SaleProcessor::new(ledger, TaxRate::default());

        let err = processor
            .process_sale(request(vec![line("cola", 1)]))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            ServiceError::Rejected(CoreError::UserNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_empty_order_rejected() {
        let (_, processor) = processor_with_stocked().await;
        let err = processor.process_sale(request(vec![])).await.unwrap_err();
        assert!(matches!(
            err,
            ServiceError::Rejected(CoreError::EmptyOrder)
        ));
    }
}
