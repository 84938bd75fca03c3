//! # Keg Lifecycle Manager
//!
//! Drives keg instances through `Full → Tapped → Empty` and keeps the
//! per-product invariant: at most one instance of a keg product is Tapped
//! at any time.
//!
//! ```text
//!          tap()                    close()
//!   Full ───────────▶ Tapped ───────────────▶ Empty
//!    ▲                   │
//!    │                   │ volume drawn per sale line
//!    └── add_instances() ┘ (SaleProcessor, not this module)
//! ```
//!
//! Transitions re-read the instance immediately before writing; stale
//! client state is not trusted.

use std::sync::Arc;

use chrono::Utc;
use tracing::{info, warn};
use uuid::Uuid;

use crate::audit;
use crate::error::ServiceResult;
use tapline_core::{
    AuditKind, CoreError, KegInstance, KegStatus, ProductType, ValidationError, Volume,
};
use tapline_db::Ledger;

/// Result of closing a keg, including the residual left in the container.
#[derive(Debug, Clone)]
pub struct KegCloseOutcome {
    /// The instance after the transition to Empty.
    pub instance: KegInstance,
    /// Volume still in the container at close time.
    pub residual: Volume,
    /// True when the residual exceeded the configured write-off threshold.
    pub write_off_warning: bool,
}

pub struct KegManager {
    ledger: Arc<dyn Ledger>,
    /// Residual fraction (basis points of capacity) above which a close is
    /// flagged as a write-off.
    residual_warn_bps: u32,
}

impl KegManager {
    pub fn new(ledger: Arc<dyn Ledger>, residual_warn_bps: u32) -> Self {
        KegManager {
            ledger,
            residual_warn_bps,
        }
    }

    /// Taps a Full keg instance.
    ///
    /// Rejected unless the instance is Full and no sibling instance of the
    /// same product is currently Tapped.
    pub async fn tap(&self, instance_id: &str, actor_id: &str) -> ServiceResult<KegInstance> {
        let instance = self
            .ledger
            .get_keg_instance(instance_id)
            .await?
            .ok_or_else(|| CoreError::KegInstanceNotFound(instance_id.to_string()))?;

        if instance.status != KegStatus::Full {
            return Err(CoreError::KegStateConflict {
                instance_id: instance.id,
                expected: KegStatus::Full,
                actual: instance.status,
            }
            .into());
        }

        // Siblings are re-listed here, not taken from the caller.
        let siblings = self.ledger.list_keg_instances(&instance.product_id).await?;
        if let Some(tapped) = siblings.iter().find(|k| k.status == KegStatus::Tapped) {
            return Err(CoreError::KegAlreadyTapped {
                product_id: instance.product_id,
                instance_id: tapped.id.clone(),
            }
            .into());
        }

        let mut updated = instance;
        updated.status = KegStatus::Tapped;
        updated.tapped_by = Some(actor_id.to_string());
        updated.tapped_at = Some(Utc::now());
        self.ledger.update_keg_instance(&updated).await?;

        audit::record(
            self.ledger.as_ref(),
            AuditKind::KegTapped,
            actor_id,
            &updated.id,
            format!("product {}", updated.product_id),
        )
        .await;

        info!(
            instance_id = %updated.id,
            product_id = %updated.product_id,
            "Keg tapped"
        );

        Ok(updated)
    }

    /// Closes a Tapped keg instance, zeroing its remaining volume.
    ///
    /// The residual at close time is returned in the outcome; a residual
    /// above the configured threshold raises the write-off flag and a
    /// warning log, but never blocks the close.
    pub async fn close(&self, instance_id: &str, actor_id: &str) -> ServiceResult<KegCloseOutcome> {
        let instance = self
            .ledger
            .get_keg_instance(instance_id)
            .await?
            .ok_or_else(|| CoreError::KegInstanceNotFound(instance_id.to_string()))?;

        if instance.status != KegStatus::Tapped {
            return Err(CoreError::KegStateConflict {
                instance_id: instance.id,
                expected: KegStatus::Tapped,
                actual: instance.status,
            }
            .into());
        }

        let residual = instance.current_volume;
        let write_off_warning = instance.residual_bps() > self.residual_warn_bps;
        if write_off_warning {
            warn!(
                instance_id = %instance.id,
                residual = %residual,
                capacity = %instance.capacity,
                "Keg closed with significant residual volume"
            );
        }

        let mut updated = instance;
        updated.status = KegStatus::Empty;
        updated.current_volume = Volume::zero();
        updated.closed_by = Some(actor_id.to_string());
        updated.closed_at = Some(Utc::now());
        self.ledger.update_keg_instance(&updated).await?;

        audit::record(
            self.ledger.as_ref(),
            AuditKind::KegClosed,
            actor_id,
            &updated.id,
            format!("residual {residual}, write_off={write_off_warning}"),
        )
        .await;

        info!(
            instance_id = %updated.id,
            residual = %residual,
            "Keg closed"
        );

        Ok(KegCloseOutcome {
            instance: updated,
            residual,
            write_off_warning,
        })
    }

    /// Registers `count` new Full instances of a Keg product, each at full
    /// capacity, and bumps the product's stock by the same count.
    pub async fn add_instances(
        &self,
        product_id: &str,
        count: i64,
    ) -> ServiceResult<Vec<KegInstance>> {
        if count <= 0 {
            return Err(CoreError::Validation(ValidationError::MustBePositive {
                field: "count".to_string(),
            })
            .into());
        }

        let product = self
            .ledger
            .get_product(product_id)
            .await?
            .ok_or_else(|| CoreError::ProductNotFound(product_id.to_string()))?;

        if product.product_type != ProductType::Keg {
            return Err(CoreError::NotAKegProduct(product_id.to_string()).into());
        }

        let capacity = product.capacity_volume().ok_or_else(|| {
            CoreError::Validation(ValidationError::Required {
                field: "capacity".to_string(),
            })
        })?;

        let now = Utc::now();
        let mut instances = Vec::with_capacity(count as usize);
        for _ in 0..count {
            let instance = KegInstance {
                id: Uuid::new_v4().to_string(),
                product_id: product_id.to_string(),
                capacity,
                current_volume: capacity,
                status: KegStatus::Full,
                tapped_by: None,
                tapped_at: None,
                closed_by: None,
                closed_at: None,
                sales: Vec::new(),
                created_at: now,
            };
            self.ledger.insert_keg_instance(&instance).await?;
            instances.push(instance);
        }

        // The Keg product's stock mirrors its instance count on hand.
        let stock = product.stock.unwrap_or(0) + count;
        self.ledger.update_product_stock(product_id, stock).await?;

        info!(
            product_id = %product_id,
            count,
            stock,
            "Keg instances registered"
        );

        Ok(instances)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use chrono::Utc;
    use tapline_core::{Product, VolumeUnit, KEG_RESIDUAL_WARN_BPS};
    use tapline_db::MemoryLedger;

    fn keg_product(id: &str, stock: i64) -> Product {
        Product {
            id: id.to_string(),
            name: format!("Keg {id}"),
            category: "kegs".to_string(),
            price_cents: 15_000,
            product_type: ProductType::Keg,
            stock: Some(stock),
            low_stock_threshold: Some(1),
            capacity: Some(20.0),
            capacity_unit: Some(VolumeUnit::Liter),
            linked_keg_product_id: None,
            serving_size: None,
            serving_unit: None,
            is_active: true,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn instance(id: &str, product_id: &str, status: KegStatus, current_ml: i64) -> KegInstance {
        KegInstance {
            id: id.to_string(),
            product_id: product_id.to_string(),
            capacity: Volume::from_base(20_000),
            current_volume: Volume::from_base(current_ml),
            status,
            tapped_by: None,
            tapped_at: None,
            closed_by: None,
            closed_at: None,
            sales: vec![],
            created_at: Utc::now(),
        }
    }

    fn manager(ledger: Arc<MemoryLedger>) -> KegManager {
        KegManager::new(ledger, KEG_RESIDUAL_WARN_BPS)
    }

    #[tokio::test]
    async fn test_tap_full_instance() {
        let ledger = Arc::new(MemoryLedger::new());
        ledger
            .insert_keg_instance(&instance("ki-1", "kp-1", KegStatus::Full, 20_000))
            .await
            .unwrap();

        let tapped = manager(ledger.clone()).tap("ki-1", "u-1").await.unwrap();
        assert_eq!(tapped.status, KegStatus::Tapped);
        assert_eq!(tapped.tapped_by.as_deref(), Some("u-1"));
        assert!(tapped.tapped_at.is_some());

        let stored = ledger.get_keg_instance("ki-1").await.unwrap().unwrap();
        assert_eq!(stored.status, KegStatus::Tapped);

        let audit = ledger.list_audit_events().await.unwrap();
        assert!(audit.iter().any(|e| e.kind == AuditKind::KegTapped));
    }

    #[tokio::test]
    async fn test_tap_blocked_while_sibling_tapped() {
        let ledger = Arc::new(MemoryLedger::new());
        ledger
            .insert_keg_instance(&instance("ki-1", "kp-1", KegStatus::Tapped, 8_000))
            .await
            .unwrap();
        ledger
            .insert_keg_instance(&instance("ki-2", "kp-1", KegStatus::Full, 20_000))
            .await
            .unwrap();

        let err = manager(ledger).tap("ki-2", "u-1").await.unwrap_err();
        assert!(matches!(
            err,
            crate::error::ServiceError::Rejected(CoreError::KegAlreadyTapped { .. })
        ));
    }

    #[tokio::test]
    async fn test_tap_rejects_non_full_instance() {
        let ledger = Arc::new(MemoryLedger::new());
        ledger
            .insert_keg_instance(&instance("ki-1", "kp-1", KegStatus::Empty, 0))
            .await
            .unwrap();

        let err = manager(ledger).tap("ki-1", "u-1").await.unwrap_err();
        assert!(matches!(
            err,
            crate::error::ServiceError::Rejected(CoreError::KegStateConflict { .. })
        ));
    }

    #[tokio::test]
    async fn test_close_reports_residual_and_zeroes_volume() {
        let ledger = Arc::new(MemoryLedger::new());
        ledger
            .insert_keg_instance(&instance("ki-1", "kp-1", KegStatus::Tapped, 5_000))
            .await
            .unwrap();

        // 5000/20000 = 2500 bps, well past the warn threshold
        let outcome = manager(ledger.clone()).close("ki-1", "u-1").await.unwrap();
        assert_eq!(outcome.residual.base(), 5_000);
        assert!(outcome.write_off_warning);
        assert_eq!(outcome.instance.status, KegStatus::Empty);
        assert!(outcome.instance.current_volume.is_zero());

        let stored = ledger.get_keg_instance("ki-1").await.unwrap().unwrap();
        assert_eq!(stored.status, KegStatus::Empty);
        assert!(stored.current_volume.is_zero());
        assert_eq!(stored.closed_by.as_deref(), Some("u-1"));
    }

    #[tokio::test]
    async fn test_close_near_empty_raises_no_warning() {
        let ledger = Arc::new(MemoryLedger::new());
        ledger
            .insert_keg_instance(&instance("ki-1", "kp-1", KegStatus::Tapped, 100))
            .await
            .unwrap();

        // 100/20000 = 50 bps, under the threshold
        let outcome = manager(ledger).close("ki-1", "u-1").await.unwrap();
        assert!(!outcome.write_off_warning);
    }

    #[tokio::test]
    async fn test_close_rejects_untapped_instance() {
        let ledger = Arc::new(MemoryLedger::new());
        ledger
            .insert_keg_instance(&instance("ki-1", "kp-1", KegStatus::Full, 20_000))
            .await
            .unwrap();

        let err = manager(ledger).close("ki-1", "u-1").await.unwrap_err();
        assert!(matches!(
            err,
            crate::error::ServiceError::Rejected(CoreError::KegStateConflict { .. })
        ));
    }

    #[tokio::test]
    async fn test_add_instances_creates_full_kegs_and_bumps_stock() {
        let ledger = Arc::new(MemoryLedger::new());
        ledger.insert_product(&keg_product("kp-1", 1)).await.unwrap();

        let instances = manager(ledger.clone())
            .add_instances("kp-1", 3)
            .await
            .unwrap();
        assert_eq!(instances.len(), 3);
        for instance in &instances {
            assert_eq!(instance.status, KegStatus::Full);
            assert_eq!(instance.capacity.base(), 20_000);
            assert_eq!(instance.current_volume, instance.capacity);
        }

        let product = ledger.get_product("kp-1").await.unwrap().unwrap();
        assert_eq!(product.stock, Some(4));
    }

    #[tokio::test]
    async fn test_add_instances_rejects_non_keg_product() {
        let ledger = Arc::new(MemoryLedger::new());
        let mut product = keg_product("p-1", 0);
        product.product_type = ProductType::Stocked;
        ledger.insert_product(&product).await.unwrap();

        let err = manager(ledger).add_instances("p-1", 1).await.unwrap_err();
        assert!(matches!(
            err,
            crate::error::ServiceError::Rejected(CoreError::NotAKegProduct(_))
        ));
    }

    #[tokio::test]
    async fn test_add_instances_rejects_zero_count() {
        let ledger = Arc::new(MemoryLedger::new());
        let err = manager(ledger).add_instances("kp-1", 0).await.unwrap_err();
        assert!(matches!(
            err,
            crate::error::ServiceError::Rejected(CoreError::Validation(_))
        ));
    }
}
