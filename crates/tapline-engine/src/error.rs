//! # Service Error Types
//!
//! The error taxonomy the engine surfaces to its callers:
//!
//! ```text
//! Rejected   - validation caught before any mutating write; specific,
//!              display-ready message
//! Store      - a ledger write/read failed; data may be inconsistent but
//!              not lost ("retry or contact support")
//! OutOfSync  - cached clock status disagrees with log history; never
//!              auto-fixed inside a normal operation, defer to the healer
//! ```
//!
//! Nothing in this crate is fatal to the process; every failure path
//! returns control to the caller.

use thiserror::Error;

use tapline_core::CoreError;
use tapline_db::DbError;

/// Errors surfaced by the engine's public operations.
#[derive(Debug, Error)]
pub enum ServiceError {
    /// Business rule rejection, raised before any write.
    #[error("{0}")]
    Rejected(#[from] CoreError),

    /// Ledger operation failure; possibly mid-sequence. Compensation has
    /// already run where one is defined.
    #[error("Ledger operation failed: {0}")]
    Store(#[from] DbError),

    /// The user's cached clock status disagrees with the log history.
    /// Normal operations refuse to touch it; run the State Healer so the
    /// correction is auditable.
    #[error("Clock state for user {user_id} is out of sync; run the state healer")]
    OutOfSync { user_id: String },
}

impl ServiceError {
    /// True for pre-write validation rejections (safe to show verbatim).
    pub fn is_rejection(&self) -> bool {
        matches!(self, ServiceError::Rejected(_))
    }
}

/// Convenience type alias for engine results.
pub type ServiceResult<T> = Result<T, ServiceError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejection_classification() {
        let err: ServiceError = CoreError::EmptyOrder.into();
        assert!(err.is_rejection());

        let err: ServiceError = DbError::QueryFailed("boom".to_string()).into();
        assert!(!err.is_rejection());

        let err = ServiceError::OutOfSync {
            user_id: "u-1".to_string(),
        };
        assert!(!err.is_rejection());
        assert!(err.to_string().contains("state healer"));
    }
}
