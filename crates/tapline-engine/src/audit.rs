//! # Audit Recording
//!
//! Appends typed events to the ledger's audit_log table. Audit appends are
//! best-effort: a failed append must never fail the business operation it
//! describes, so failures are logged and swallowed here.

use chrono::Utc;
use tracing::warn;
use uuid::Uuid;

use tapline_core::{AuditEvent, AuditKind};
use tapline_db::Ledger;

/// Actor id recorded for system-level corrections (the State Healer).
pub const SYSTEM_ACTOR: &str = "system";

/// Builds and appends one audit event.
pub async fn record(
    ledger: &dyn Ledger,
    kind: AuditKind,
    actor_id: &str,
    entity_id: &str,
    detail: impl Into<String>,
) {
    let event = AuditEvent {
        id: Uuid::new_v4().to_string(),
        kind,
        actor_id: actor_id.to_string(),
        entity_id: entity_id.to_string(),
        detail: detail.into(),
        at: Utc::now(),
    };

    if let Err(err) = ledger.insert_audit(&event).await {
        warn!(
            kind = kind.as_str(),
            entity_id = %event.entity_id,
            error = %err,
            "Audit append failed; event dropped"
        );
    }
}
