//! # Error Types
//!
//! Domain-specific error types for tapline-core.
//!
//! ## Error Hierarchy
//! ```text
//! tapline-core errors (this file)
//! ├── CoreError        - Business rule rejections (typed, pre-write)
//! └── ValidationError  - Input validation failures
//!
//! tapline-db errors    - DbError (ledger operation failures)
//! tapline-engine       - ServiceError (wraps both + divergence)
//! ```
//!
//! ## Design Principles
//! 1. Use `thiserror` for derive macros (not manual impl)
//! 2. Include context in error messages (product name, id, state)
//! 3. Errors are enum variants, never String
//! 4. Every variant maps to a specific user-facing message

use thiserror::Error;

use crate::types::{KegStatus, TimeClockStatus, TimeLogStatus};

// =============================================================================
// Core Error
// =============================================================================

/// Business rule rejections.
///
/// These are always raised *before* any mutating write; a `CoreError` never
/// leaves partial state behind.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Product id does not exist in the catalog. Rejects the whole order.
    #[error("Product not found: {0}")]
    ProductNotFound(String),

    /// Stocked product cannot cover the requested quantity.
    #[error("Insufficient stock for {name}: available {available}, requested {requested}")]
    InsufficientStock {
        name: String,
        available: i64,
        requested: i64,
    },

    /// Keg-linked service with no tapped instance to draw from.
    #[error("No tapped keg available for {product}")]
    NoTappedKeg { product: String },

    /// Keg-linked service whose serving size was never configured.
    ///
    /// This is a rejection, not a silent pass: selling a metered draw with
    /// no metering configured would corrupt the volume ledger.
    #[error("Serving size not configured for {product}")]
    MissingServingSize { product: String },

    /// Tapped keg does not hold enough volume for the requested servings.
    #[error(
        "Insufficient volume for {name}: available {available_ml} ml, requested {requested_ml} ml"
    )]
    InsufficientVolume {
        name: String,
        available_ml: i64,
        requested_ml: i64,
    },

    /// Keg instance id does not exist.
    #[error("Keg instance not found: {0}")]
    KegInstanceNotFound(String),

    /// Keg instance is not in the state the transition requires.
    #[error("Keg instance {instance_id} is {actual:?}, expected {expected:?}")]
    KegStateConflict {
        instance_id: String,
        expected: KegStatus,
        actual: KegStatus,
    },

    /// Another instance of the same product is already tapped.
    #[error("Product {product_id} already has a tapped keg ({instance_id})")]
    KegAlreadyTapped {
        product_id: String,
        instance_id: String,
    },

    /// Operation requires a Keg-type product.
    #[error("Product {0} is not a keg product")]
    NotAKegProduct(String),

    /// User id does not exist.
    #[error("User not found: {0}")]
    UserNotFound(String),

    /// User's clock status does not allow the requested shift transition.
    #[error("User {user_id} is {status:?}, cannot perform operation")]
    ShiftStateConflict {
        user_id: String,
        status: TimeClockStatus,
    },

    /// Time log id does not exist.
    #[error("Time log not found: {0}")]
    TimeLogNotFound(String),

    /// Time log is not in the state the transition requires.
    #[error("Time log {id} is {status:?}, cannot perform operation")]
    TimeLogStateConflict { id: String, status: TimeLogStatus },

    /// Operation is restricted to admins.
    #[error("User {user_id} is not authorized: admin role required")]
    AdminRequired { user_id: String },

    /// An order must carry at least one line.
    #[error("Order has no lines")]
    EmptyOrder,

    /// Validation error (wraps ValidationError).
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),
}

// =============================================================================
// Validation Error
// =============================================================================

/// Input validation errors, caught before business logic runs.
#[derive(Debug, Error)]
pub enum ValidationError {
    /// A required field is missing or empty.
    #[error("{field} is required")]
    Required { field: String },

    /// Value must be strictly positive.
    #[error("{field} must be positive")]
    MustBePositive { field: String },

    /// Numeric value is out of range.
    #[error("{field} must be between {min} and {max}")]
    OutOfRange { field: String, min: i64, max: i64 },

    /// Invalid format (e.g. unknown unit string).
    #[error("{field} has invalid format: {reason}")]
    InvalidFormat { field: String, reason: String },
}

// =============================================================================
// Result Type Alias
// =============================================================================

/// Convenience type alias for Results with CoreError.
pub type CoreResult<T> = Result<T, CoreError>;

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        let err = CoreError::InsufficientStock {
            name: "House Lager".to_string(),
            available: 3,
            requested: 5,
        };
        assert_eq!(
            err.to_string(),
            "Insufficient stock for House Lager: available 3, requested 5"
        );

        let err = CoreError::InsufficientVolume {
            name: "Pint of Stout".to_string(),
            available_ml: 400,
            requested_ml: 500,
        };
        assert!(err.to_string().contains("400 ml"));
    }

    #[test]
    fn test_validation_converts_to_core_error() {
        let validation_err = ValidationError::MustBePositive {
            field: "quantity".to_string(),
        };
        let core_err: CoreError = validation_err.into();
        assert!(matches!(core_err, CoreError::Validation(_)));
    }
}
