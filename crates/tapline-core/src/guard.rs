//! # Inventory Guard
//!
//! Pure validation of whether a proposed order can be fulfilled from a
//! snapshot of the catalog and keg instances.
//!
//! ## Validation Strategy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  For each line, in order:                                               │
//! │                                                                         │
//! │  product missing?            → reject the whole order                  │
//! │  Stocked:   qty ≤ stock?     → else InsufficientStock                  │
//! │  Service, no keg link        → always fulfillable                      │
//! │  Service, keg-linked:                                                   │
//! │      serving size configured? → else MissingServingSize                │
//! │      a Tapped instance?       → else NoTappedKeg                       │
//! │      serving × qty ≤ volume?  → else InsufficientVolume                │
//! │                                                                         │
//! │  First failing line rejects; nothing is mutated here.                  │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The guard judges a snapshot only. The sale processor re-reads the same
//! rows immediately before it writes (read-verify-write); this module stays
//! free of I/O so the rules are testable in isolation.

use crate::error::{CoreError, CoreResult, ValidationError};
use crate::types::{KegInstance, KegStatus, OrderLine, Product, ProductType};
use crate::volume::Volume;
use crate::MAX_LINE_QUANTITY;

/// Checks that every line of the order is fulfillable against the given
/// snapshot. Returns the rejection for the first failing line.
pub fn check_order(
    lines: &[OrderLine],
    products: &[Product],
    kegs: &[KegInstance],
) -> CoreResult<()> {
    if lines.is_empty() {
        return Err(CoreError::EmptyOrder);
    }

    for line in lines {
        check_line(line, products, kegs)?;
    }
    Ok(())
}

/// Checks a single order line. See module docs for the rules.
pub fn check_line(
    line: &OrderLine,
    products: &[Product],
    kegs: &[KegInstance],
) -> CoreResult<()> {
    if line.quantity <= 0 {
        return Err(ValidationError::MustBePositive {
            field: "quantity".to_string(),
        }
        .into());
    }
    if line.quantity > MAX_LINE_QUANTITY {
        return Err(ValidationError::OutOfRange {
            field: "quantity".to_string(),
            min: 1,
            max: MAX_LINE_QUANTITY,
        }
        .into());
    }

    let product = products
        .iter()
        .find(|p| p.id == line.product_id)
        .ok_or_else(|| CoreError::ProductNotFound(line.product_id.clone()))?;

    match product.product_type {
        ProductType::Stocked | ProductType::Keg => {
            let available = product.stock.unwrap_or(0);
            if line.quantity > available {
                return Err(CoreError::InsufficientStock {
                    name: product.name.clone(),
                    available,
                    requested: line.quantity,
                });
            }
        }
        ProductType::Service => {
            let Some(keg_product_id) = product.linked_keg_product_id.as_deref() else {
                // No physical constraint modeled for an unlinked service.
                return Ok(());
            };

            let serving = product.serving_volume().ok_or_else(|| {
                CoreError::MissingServingSize {
                    product: product.name.clone(),
                }
            })?;

            let tapped = find_tapped(kegs, keg_product_id).ok_or_else(|| {
                CoreError::NoTappedKeg {
                    product: product.name.clone(),
                }
            })?;

            let requested = serving.multiply(line.quantity);
            if requested > tapped.current_volume {
                return Err(CoreError::InsufficientVolume {
                    name: product.name.clone(),
                    available_ml: tapped.current_volume.base(),
                    requested_ml: requested.base(),
                });
            }
        }
    }

    Ok(())
}

/// The tapped instance of a keg product within the snapshot, if any.
///
/// The lifecycle manager enforces at most one; the guard just picks it.
pub fn find_tapped<'a>(kegs: &'a [KegInstance], product_id: &str) -> Option<&'a KegInstance> {
    kegs.iter()
        .find(|k| k.product_id == product_id && k.status == KegStatus::Tapped)
}

/// Total draw an order takes from one keg product, across all its lines.
pub fn total_draw(lines: &[OrderLine], products: &[Product], keg_product_id: &str) -> Volume {
    lines
        .iter()
        .filter_map(|line| {
            let product = products.iter().find(|p| p.id == line.product_id)?;
            if product.linked_keg_product_id.as_deref() != Some(keg_product_id) {
                return None;
            }
            Some(product.serving_volume()?.multiply(line.quantity))
        })
        .fold(Volume::zero(), |acc, v| acc + v)
}

// =============================================================================
// Unit Tests
// =============================================================================
