//! # Compensating Actions
//!
//! The single place the rollback policy for multi-step writes lives.
//!
//! ## The Pattern
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  earlier write succeeded (e.g. sale header inserted)                    │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  run_compensated(op, action, undo)                                     │
//! │       │                                                                 │
//! │       ├── action Ok  ──────────────────────────► Ok                    │
//! │       │                                                                 │
//! │       └── action Err ──► run undo                                      │
//! │                           ├── undo Ok  ► Err(primary), state restored  │
//! │                           └── undo Err ► Err(primary), orphan logged   │
//! │                                          for manual repair             │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The primary error always wins: a failed undo is logged loudly but never
//! masks what actually went wrong. Callers: the sale processor (delete the
//! orphaned header when the line write fails) and the shift machine's
//! admin self-clock-out (restore the prior time log when the user-status
//! write fails).

use std::future::Future;

use tracing::{error, warn};

use tapline_db::DbError;

/// Runs `action`; on failure runs `undo` and reports the primary error.
pub async fn run_compensated<T, A, U, UF>(op: &'static str, action: A, undo: U) -> Result<T, DbError>
where
    A: Future<Output = Result<T, DbError>>,
    U: FnOnce() -> UF,
    UF: Future<Output = Result<(), DbError>>,
{
    match action.await {
        Ok(value) => Ok(value),
        Err(primary) => {
            warn!(op, error = %primary, "Write failed mid-sequence, compensating");

            match undo().await {
                Ok(()) => {
                    warn!(op, "Compensating action applied, prior state restored");
                }
                Err(undo_err) => {
                    // Both writes failed; the orphan needs manual repair.
                    error!(
                        op,
                        primary = %primary,
                        undo_error = %undo_err,
                        "Compensating action FAILED, manual repair required"
                    );
                }
            }

            Err(primary)
        }
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};

    #[tokio::test]
    async fn test_success_skips_undo() {
        let undone = AtomicBool::new(false);

        let result = run_compensated("op", async { Ok::<_, DbError>(42) }, || async {
            undone.store(true, Ordering::SeqCst);
            Ok(())
        })
        .await;

        assert_eq!(result.unwrap(), 42);
        assert!(!undone.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_failure_runs_undo_and_keeps_primary_error() {
        let undone = AtomicBool::new(false);

        let result: Result<(), DbError> = run_compensated(
            "op",
            async { Err(DbError::QueryFailed("primary".to_string())) },
            || async {
                undone.store(true, Ordering::SeqCst);
                Ok(())
            },
        )
        .await;

        assert!(undone.load(Ordering::SeqCst));
        assert!(matches!(result, Err(DbError::QueryFailed(msg)) if msg == "primary"));
    }

    #[tokio::test]
    async fn test_undo_failure_does_not_mask_primary_error() {
        let result: Result<(), DbError> = run_compensated(
            "op",
            async { Err(DbError::QueryFailed("primary".to_string())) },
            || async { Err(DbError::QueryFailed("undo also broke".to_string())) },
        )
        .await;

        assert!(matches!(result, Err(DbError::QueryFailed(msg)) if msg == "primary"));
    }
}
