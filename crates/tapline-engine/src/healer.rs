//! # State Healer
//!
//! Detects and repairs divergence between a user's cached clock status
//! and their time logs. The one condition it corrects: a user marked
//! ClockedIn with no Ongoing log, which strands them unable to clock in
//! or out. The repair resets the cached status to ClockedOut and records
//! a system-actor audit entry.
//!
//! Other divergences (an open log behind a ClockedOut status) are left
//! alone; the services reject those as out-of-sync so an operator can
//! inspect them.

use std::sync::Arc;

use tracing::{debug, info};

use crate::audit::{self, SYSTEM_ACTOR};
use crate::error::ServiceResult;
use tapline_core::{AuditKind, CoreError, TimeClockStatus, TimeLogStatus};
use tapline_db::Ledger;

pub struct StateHealer {
    ledger: Arc<dyn Ledger>,
}

impl StateHealer {
    pub fn new(ledger: Arc<dyn Ledger>) -> Self {
        StateHealer { ledger }
    }

    /// Checks one user and repairs the stranded-ClockedIn condition.
    /// Returns true when a repair was applied.
    pub async fn heal(&self, user_id: &str) -> ServiceResult<bool> {
        let user = self
            .ledger
            .get_user(user_id)
            .await?
            .ok_or_else(|| CoreError::UserNotFound(user_id.to_string()))?;

        if user.time_clock_status != TimeClockStatus::ClockedIn {
            return Ok(false);
        }

        let has_ongoing = matches!(
            self.ledger.find_open_time_log(user_id).await?,
            Some(log) if log.status == TimeLogStatus::Ongoing
        );
        if has_ongoing {
            debug!(user_id = %user.id, "Clock status consistent, nothing to heal");
            return Ok(false);
        }

        self.ledger
            .update_user_clock(&user.id, TimeClockStatus::ClockedOut, None)
            .await?;

        audit::record(
            self.ledger.as_ref(),
            AuditKind::StateHealed,
            SYSTEM_ACTOR,
            &user.id,
            "reset clocked_in with no ongoing time log",
        )
        .await;

        info!(user_id = %user.id, "Healed stranded clocked-in status");
        Ok(true)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
