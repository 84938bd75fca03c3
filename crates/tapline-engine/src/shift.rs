//! # Shift and Time-Clock Service
//!
//! Runs the employee shift state machine across two records that must be
//! kept in agreement: the durable TimeLog and the cached clock status on
//! the user row.
//!
//! ```text
//!              clock_in()          request_clearance()       approve()
//! ClockedOut ────────────▶ ClockedIn ──────────────▶ AwaitingClearance ──▶ ClockedOut
//!                                                           │    ▲
//!                                                  reject() └────┘ (log → Rejected,
//!                                                                   user stays put)
//! ```
//!
//! Every transition re-reads the user row first and rejects on a stale
//! status. A user row that claims ClockedIn while no Ongoing log exists
//! is an out-of-sync condition, surfaced as such so a healer or operator
//! can repair it rather than masked by a generic rejection.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{debug, info};
use uuid::Uuid;

use crate::audit;
use crate::compensate::run_compensated;
use crate::error::{ServiceError, ServiceResult};
use tapline_core::{
    AuditKind, CoreError, ExpectedSales, PaymentMethod, Role, TimeClockStatus, TimeLog,
    TimeLogStatus, ValidationError,
};
use tapline_db::Ledger;

pub struct ShiftService {
    ledger: Arc<dyn Ledger>,
}

impl ShiftService {
    pub fn new(ledger: Arc<dyn Ledger>) -> Self {
        ShiftService { ledger }
    }

    /// Opens a shift: inserts an Ongoing time log, then marks the user
    /// ClockedIn with the mirrored clock-in time.
    pub async fn clock_in(&self, user_id: &str) -> ServiceResult<TimeLog> {
        let user = self
            .ledger
            .get_user(user_id)
            .await?
            .ok_or_else(|| CoreError::UserNotFound(user_id.to_string()))?;

        if user.time_clock_status != TimeClockStatus::ClockedOut {
            return Err(CoreError::ShiftStateConflict {
                user_id: user.id,
                status: user.time_clock_status,
            }
            .into());
        }

        // An open log behind a ClockedOut status means the two records
        // have diverged; do not stack a second shift on top of it.
        if self.ledger.find_open_time_log(user_id).await?.is_some() {
            return Err(ServiceError::OutOfSync {
                user_id: user.id,
            });
        }

        let now = Utc::now();
        let log = TimeLog {
            id: Uuid::new_v4().to_string(),
            user_id: user.id.clone(),
            user_name: user.name.clone(),
            clock_in: now,
            clock_out: None,
            status: TimeLogStatus::Ongoing,
            declared_cents: None,
            expected: None,
            counted_cents: None,
            difference_cents: None,
            rejection_reason: None,
            approved_by: None,
            duration_minutes: None,
        };
        self.ledger.insert_time_log(&log).await?;

        self.ledger
            .update_user_clock(&user.id, TimeClockStatus::ClockedIn, Some(now))
            .await?;

        audit::record(
            self.ledger.as_ref(),
            AuditKind::ClockIn,
            &user.id,
            &log.id,
            format!("{} clocked in", user.name),
        )
        .await;

        info!(user_id = %user.id, time_log_id = %log.id, "Clocked in");
        Ok(log)
    }

    /// Ends the working portion of a shift: the employee declares the cash
    /// they are handing over, expected sales are computed from the ledger,
    /// and the log moves to PendingApproval.
    pub async fn request_clearance(
        &self,
        user_id: &str,
        declared_cents: i64,
    ) -> ServiceResult<TimeLog> {
        let user = self
            .ledger
            .get_user(user_id)
            .await?
            .ok_or_else(|| CoreError::UserNotFound(user_id.to_string()))?;

        let log = match self.ledger.find_open_time_log(user_id).await? {
            Some(log) => log,
            // ClockedIn with no open log is the healer's case, not a
            // normal rejection.
            None if user.time_clock_status == TimeClockStatus::ClockedIn => {
                return Err(ServiceError::OutOfSync { user_id: user.id });
            }
            None => {
                return Err(CoreError::ShiftStateConflict {
                    user_id: user.id,
                    status: user.time_clock_status,
                }
                .into());
            }
        };

        if log.status != TimeLogStatus::Ongoing {
            return Err(CoreError::TimeLogStateConflict {
                id: log.id,
                status: log.status,
            }
            .into());
        }

        let now = Utc::now();
        let expected = self.expected_sales(user_id, log.clock_in).await?;
        let difference = declared_cents - expected.cash_cents;

        let mut updated = log;
        updated.status = TimeLogStatus::PendingApproval;
        updated.clock_out = Some(now);
        updated.duration_minutes = Some((now - updated.clock_in).num_minutes());
        updated.declared_cents = Some(declared_cents);
        updated.expected = Some(expected);
        updated.difference_cents = Some(difference);
        self.ledger.update_time_log(&updated).await?;

        self.ledger
            .update_user_clock(&user.id, TimeClockStatus::AwaitingClearance, None)
            .await?;

        audit::record(
            self.ledger.as_ref(),
            AuditKind::ClearanceRequested,
            &user.id,
            &updated.id,
            format!(
                "declared {declared_cents}, expected cash {}, difference {difference}",
                expected.cash_cents
            ),
        )
        .await;

        info!(
            user_id = %user.id,
            time_log_id = %updated.id,
            declared_cents,
            difference_cents = difference,
            "Clearance requested"
        );
        Ok(updated)
    }

    /// Manager approval: the physically counted cash becomes the final
    /// figure, the log completes, and the user returns to ClockedOut.
    pub async fn approve(
        &self,
        time_log_id: &str,
        approver_id: &str,
        counted_cents: i64,
    ) -> ServiceResult<TimeLog> {
        let log = self
            .ledger
            .get_time_log(time_log_id)
            .await?
            .ok_or_else(|| CoreError::TimeLogNotFound(time_log_id.to_string()))?;

        if log.status != TimeLogStatus::PendingApproval {
            return Err(CoreError::TimeLogStateConflict {
                id: log.id,
                status: log.status,
            }
            .into());
        }

        // Expected sales were frozen at clearance time; recompute only if
        // the log somehow lacks them.
        let expected = match log.expected {
            Some(expected) => expected,
            None => self.expected_sales(&log.user_id, log.clock_in).await?,
        };
        let difference = counted_cents - expected.cash_cents;

        let mut updated = log;
        updated.status = TimeLogStatus::Completed;
        updated.counted_cents = Some(counted_cents);
        updated.difference_cents = Some(difference);
        updated.expected = Some(expected);
        updated.approved_by = Some(approver_id.to_string());
        self.ledger.update_time_log(&updated).await?;

        // The user may have been deleted since the shift ran; the log
        // outlives the account.
        match self.ledger.get_user(&updated.user_id).await? {
            Some(user) => {
                self.ledger
                    .update_user_clock(&user.id, TimeClockStatus::ClockedOut, None)
                    .await?;
            }
            None => {
                info!(
                    user_id = %updated.user_id,
                    time_log_id = %updated.id,
                    "Approved shift for deleted user; log retained"
                );
            }
        }

        audit::record(
            self.ledger.as_ref(),
            AuditKind::ShiftApproved,
            approver_id,
            &updated.id,
            format!("counted {counted_cents}, difference {difference}"),
        )
        .await;

        info!(
            time_log_id = %updated.id,
            approver_id = %approver_id,
            counted_cents,
            "Shift approved"
        );
        Ok(updated)
    }

    /// Manager rejection: the log is marked Rejected with a mandatory
    /// reason and the user stays in AwaitingClearance until resolved.
    pub async fn reject(
        &self,
        time_log_id: &str,
        manager_id: &str,
        reason: &str,
    ) -> ServiceResult<TimeLog> {
        if reason.trim().is_empty() {
            return Err(CoreError::Validation(ValidationError::Required {
                field: "reason".to_string(),
            })
            .into());
        }

        let log = self
            .ledger
            .get_time_log(time_log_id)
            .await?
            .ok_or_else(|| CoreError::TimeLogNotFound(time_log_id.to_string()))?;

        if log.status != TimeLogStatus::PendingApproval {
            return Err(CoreError::TimeLogStateConflict {
                id: log.id,
                status: log.status,
            }
            .into());
        }

        let mut updated = log;
        updated.status = TimeLogStatus::Rejected;
        updated.rejection_reason = Some(reason.trim().to_string());
        self.ledger.update_time_log(&updated).await?;

        if let Some(user) = self.ledger.get_user(&updated.user_id).await? {
            self.ledger
                .update_user_clock(&user.id, TimeClockStatus::AwaitingClearance, None)
                .await?;
        }

        audit::record(
            self.ledger.as_ref(),
            AuditKind::ShiftRejected,
            manager_id,
            &updated.id,
            reason.trim(),
        )
        .await;

        info!(
            time_log_id = %updated.id,
            manager_id = %manager_id,
            "Shift rejected"
        );
        Ok(updated)
    }

    /// Self clock-out for admins: skips declaration and approval, closing
    /// the shift in one step with expected cash standing in for both the
    /// declared and counted figures.
    ///
    /// Two records change here; if the user row cannot be flipped back to
    /// ClockedOut after the log completes, the log update is rolled back
    /// to its prior contents so the pair stays consistent.
    pub async fn admin_self_clock_out(&self, user_id: &str) -> ServiceResult<TimeLog> {
        let user = self
            .ledger
            .get_user(user_id)
            .await?
            .ok_or_else(|| CoreError::UserNotFound(user_id.to_string()))?;

        if user.role != Role::Admin {
            return Err(CoreError::AdminRequired {
                user_id: user.id,
            }
            .into());
        }

        let log = match self.ledger.find_open_time_log(user_id).await? {
            Some(log) => log,
            None if user.time_clock_status == TimeClockStatus::ClockedIn => {
                return Err(ServiceError::OutOfSync { user_id: user.id });
            }
            None => {
                return Err(CoreError::ShiftStateConflict {
                    user_id: user.id,
                    status: user.time_clock_status,
                }
                .into());
            }
        };

        if log.status != TimeLogStatus::Ongoing {
            return Err(CoreError::TimeLogStateConflict {
                id: log.id,
                status: log.status,
            }
            .into());
        }

        let now = Utc::now();
        let expected = self.expected_sales(user_id, log.clock_in).await?;

        let prior = log.clone();
        let mut updated = log;
        updated.status = TimeLogStatus::Completed;
        updated.clock_out = Some(now);
        updated.duration_minutes = Some((now - updated.clock_in).num_minutes());
        updated.declared_cents = Some(expected.cash_cents);
        updated.counted_cents = Some(expected.cash_cents);
        updated.expected = Some(expected);
        updated.difference_cents = Some(0);
        updated.approved_by = Some(user.id.clone());
        self.ledger.update_time_log(&updated).await?;

        let ledger = &self.ledger;
        run_compensated(
            "update_user_clock",
            ledger.update_user_clock(&user.id, TimeClockStatus::ClockedOut, None),
            move || async move { ledger.update_time_log(&prior).await },
        )
        .await?;

        audit::record(
            self.ledger.as_ref(),
            AuditKind::AdminClockOut,
            &user.id,
            &updated.id,
            format!("expected cash {}", expected.cash_cents),
        )
        .await;

        info!(user_id = %user.id, time_log_id = %updated.id, "Admin self clock-out");
        Ok(updated)
    }

    /// Sums the server's sales since `since`, partitioned by payment
    /// method. Cash is the figure reconciled against the drawer.
    pub async fn expected_sales(
        &self,
        server_id: &str,
        since: DateTime<Utc>,
    ) -> ServiceResult<ExpectedSales> {
        let sales = self
            .ledger
            .list_sales_for_server_since(server_id, since)
            .await?;

        let mut expected = ExpectedSales::default();
        for sale in &sales {
            match sale.payment_method {
                PaymentMethod::Cash => expected.cash_cents += sale.total_cents,
                PaymentMethod::Card => expected.card_cents += sale.total_cents,
            }
            expected.total_cents += sale.total_cents;
        }

        debug!(
            server_id = %server_id,
            sales = sales.len(),
            cash_cents = expected.cash_cents,
            card_cents = expected.card_cents,
            "Expected sales computed"
        );
        Ok(expected)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use chrono::Duration;
    use tapline_core::{Sale, UserRecord};
    use tapline_db::{DbError, MemoryLedger};

    fn user(id: &str, role: Role, status: TimeClockStatus) -> UserRecord {
        UserRecord {
            id: id.to_string(),
            name: "Ana".to_string(),
            role,
            time_clock_status: status,
            clock_in_time: None,
        }
    }

    fn cash_sale(server_id: &str, total_cents: i64, at: DateTime<Utc>) -> Sale {
        sale(server_id, PaymentMethod::Cash, total_cents, at)
    }

    fn sale(
        server_id: &str,
        payment_method: PaymentMethod,
        total_cents: i64,
        at: DateTime<Utc>,
    ) -> Sale {
        Sale {
            id: uuid::Uuid::new_v4().to_string(),
            at,
            lines: vec![],
            payment_method,
            server_id: server_id.to_string(),
            server_name: "Ana".to_string(),
            customer_type: "regular".to_string(),
            subtotal_cents: total_cents,
            tax_cents: 0,
            total_cents,
            discount: None,
        }
    }

    async fn service_with_user(role: Role, status: TimeClockStatus) -> (Arc<MemoryLedger>, ShiftService) {
        let ledger = Arc::new(MemoryLedger::new());
        ledger.insert_user(&user("u-1", role, status)).await.unwrap();
        let service = ShiftService::new(ledger.clone());
        (ledger, service)
    }

    #[tokio::test]
    async fn test_clock_in_opens_log_and_marks_user() {
        let (ledger, service) =
            service_with_user(Role::Server, TimeClockStatus::ClockedOut).await;

        let log = service.clock_in("u-1").await.unwrap();
        assert_eq!(log.status, TimeLogStatus::Ongoing);
        assert_eq!(log.user_name, "Ana");

        let stored = ledger.get_user("u-1").await.unwrap().unwrap();
        assert_eq!(stored.time_clock_status, TimeClockStatus::ClockedIn);
        assert_eq!(stored.clock_in_time, Some(log.clock_in));

        let audit = ledger.list_audit_events().await.unwrap();
        assert!(audit.iter().any(|e| e.kind == AuditKind::ClockIn));
    }

    #[tokio::test]
    async fn test_clock_in_while_clocked_in_rejected() {
        let (_, service) = service_with_user(Role::Server, TimeClockStatus::ClockedIn).await;

        let err = service.clock_in("u-1").await.unwrap_err();
        assert!(matches!(
            err,
            ServiceError::Rejected(CoreError::ShiftStateConflict { .. })
        ));
    }

    #[tokio::test]
    async fn test_clock_in_over_stale_open_log_is_out_of_sync() {
        let (ledger, service) =
            service_with_user(Role::Server, TimeClockStatus::ClockedOut).await;
        // A leftover open log behind a ClockedOut status.
        let stale = TimeLog {
            id: "t-stale".to_string(),
            user_id: "u-1".to_string(),
            user_name: "Ana".to_string(),
            clock_in: Utc::now() - Duration::hours(30),
            clock_out: None,
            status: TimeLogStatus::Ongoing,
            declared_cents: None,
            expected: None,
            counted_cents: None,
            difference_cents: None,
            rejection_reason: None,
            approved_by: None,
            duration_minutes: None,
        };
        ledger.insert_time_log(&stale).await.unwrap();

        let err = service.clock_in("u-1").await.unwrap_err();
        assert!(matches!(err, ServiceError::OutOfSync { .. }));
    }

    #[tokio::test]
    async fn test_clearance_computes_expected_and_difference() {
        let (ledger, service) =
            service_with_user(Role::Server, TimeClockStatus::ClockedOut).await;

        let log = service.clock_in("u-1").await.unwrap();
        let after = log.clock_in + Duration::minutes(5);
        ledger.insert_sale(&cash_sale("u-1", 5_000, after)).await.unwrap();
        ledger
            .insert_sale(&sale("u-1", PaymentMethod::Card, 2_000, after))
            .await
            .unwrap();
        // Another server's cash stays out of this shift's expectation.
        ledger.insert_user(&user("u-2", Role::Server, TimeClockStatus::ClockedIn)).await.unwrap();
        ledger.insert_sale(&cash_sale("u-2", 9_000, after)).await.unwrap();

        let updated = service.request_clearance("u-1", 5_200).await.unwrap();
        assert_eq!(updated.status, TimeLogStatus::PendingApproval);
        let expected = updated.expected.unwrap();
        assert_eq!(expected.cash_cents, 5_000);
        assert_eq!(expected.card_cents, 2_000);
        assert_eq!(expected.total_cents, 7_000);
        assert_eq!(updated.declared_cents, Some(5_200));
        assert_eq!(updated.difference_cents, Some(200));
        assert!(updated.clock_out.is_some());

        let stored = ledger.get_user("u-1").await.unwrap().unwrap();
        assert_eq!(
            stored.time_clock_status,
            TimeClockStatus::AwaitingClearance
        );
        assert_eq!(stored.clock_in_time, None);
    }

    #[tokio::test]
    async fn test_clearance_without_log_while_clocked_in_is_out_of_sync() {
        let (_, service) = service_with_user(Role::Server, TimeClockStatus::ClockedIn).await;

        let err = service.request_clearance("u-1", 0).await.unwrap_err();
        assert!(matches!(err, ServiceError::OutOfSync { .. }));
    }

    #[tokio::test]
    async fn test_approve_counts_cash_and_releases_user() {
        let (ledger, service) =
            service_with_user(Role::Server, TimeClockStatus::ClockedOut).await;
        service.clock_in("u-1").await.unwrap();
        let pending = service.request_clearance("u-1", 5_000).await.unwrap();

        let approved = service.approve(&pending.id, "mgr-1", 4_900).await.unwrap();
        assert_eq!(approved.status, TimeLogStatus::Completed);
        assert_eq!(approved.counted_cents, Some(4_900));
        // No sales were rung up, so expected cash is zero.
        assert_eq!(approved.difference_cents, Some(4_900));
        assert_eq!(approved.approved_by.as_deref(), Some("mgr-1"));

        let stored = ledger.get_user("u-1").await.unwrap().unwrap();
        assert_eq!(stored.time_clock_status, TimeClockStatus::ClockedOut);

        let audit = ledger.list_audit_events().await.unwrap();
        assert!(audit.iter().any(|e| e.kind == AuditKind::ShiftApproved));
    }

    #[tokio::test]
    async fn test_approve_requires_pending_log() {
        let (_, service) =
            service_with_user(Role::Server, TimeClockStatus::ClockedOut).await;
        let log = service.clock_in("u-1").await.unwrap();

        let err = service.approve(&log.id, "mgr-1", 0).await.unwrap_err();
        assert!(matches!(
            err,
            ServiceError::Rejected(CoreError::TimeLogStateConflict { .. })
        ));
    }

    #[tokio::test]
    async fn test_reject_requires_reason() {
        let (_, service) = service_with_user(Role::Server, TimeClockStatus::ClockedOut).await;
        service.clock_in("u-1").await.unwrap();
        let pending = service.request_clearance("u-1", 5_000).await.unwrap();

        let err = service.reject(&pending.id, "mgr-1", "  ").await.unwrap_err();
        assert!(matches!(
            err,
            ServiceError::Rejected(CoreError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn test_reject_holds_user_in_awaiting_clearance() {
        let (ledger, service) =
            service_with_user(Role::Server, TimeClockStatus::ClockedOut).await;
        service.clock_in("u-1").await.unwrap();
        let pending = service.request_clearance("u-1", 5_000).await.unwrap();

        let rejected = service
            .reject(&pending.id, "mgr-1", "drawer short")
            .await
            .unwrap();
        assert_eq!(rejected.status, TimeLogStatus::Rejected);
        assert_eq!(rejected.rejection_reason.as_deref(), Some("drawer short"));

        let stored = ledger.get_user("u-1").await.unwrap().unwrap();
        assert_eq!(
            stored.time_clock_status,
            TimeClockStatus::AwaitingClearance
        );

        let audit = ledger.list_audit_events().await.unwrap();
        assert!(audit.iter().any(|e| e.kind == AuditKind::ShiftRejected));
    }

    #[tokio::test]
    async fn test_admin_self_clock_out_closes_in_one_step() {
        let (ledger, service) =
            service_with_user(Role::Admin, TimeClockStatus::ClockedOut).await;
        let log = service.clock_in("u-1").await.unwrap();
        let after = log.clock_in + Duration::minutes(1);
        ledger.insert_sale(&cash_sale("u-1", 3_000, after)).await.unwrap();

        let closed = service.admin_self_clock_out("u-1").await.unwrap();
        assert_eq!(closed.status, TimeLogStatus::Completed);
        assert_eq!(closed.declared_cents, Some(3_000));
        assert_eq!(closed.counted_cents, Some(3_000));
        assert_eq!(closed.difference_cents, Some(0));
        assert_eq!(closed.approved_by.as_deref(), Some("u-1"));

        let stored = ledger.get_user("u-1").await.unwrap().unwrap();
        assert_eq!(stored.time_clock_status, TimeClockStatus::ClockedOut);

        let audit = ledger.list_audit_events().await.unwrap();
        assert!(audit.iter().any(|e| e.kind == AuditKind::AdminClockOut));
    }

    #[tokio::test]
    async fn test_admin_self_clock_out_requires_admin_role() {
        let (_, service) = service_with_user(Role::Server, TimeClockStatus::ClockedOut).await;
        service.clock_in("u-1").await.unwrap();

        let err = service.admin_self_clock_out("u-1").await.unwrap_err();
        assert!(matches!(
            err,
            ServiceError::Rejected(CoreError::AdminRequired { .. })
        ));
    }

    #[tokio::test]
    async fn test_admin_clock_out_rolls_log_back_when_user_write_fails() {
        let (ledger, service) =
            service_with_user(Role::Admin, TimeClockStatus::ClockedOut).await;
        let log = service.clock_in("u-1").await.unwrap();

        ledger.fail_next("update_user_clock");
        let err = service.admin_self_clock_out("u-1").await.unwrap_err();
        assert!(matches!(err, ServiceError::Store(DbError::QueryFailed(_))));

        // The log was restored to Ongoing and the user stayed ClockedIn.
        let restored = ledger.get_time_log(&log.id).await.unwrap().unwrap();
        assert_eq!(restored.status, TimeLogStatus::Ongoing);
        assert_eq!(restored.clock_out, None);

        let stored = ledger.get_user("u-1").await.unwrap().unwrap();
        assert_eq!(stored.time_clock_status, TimeClockStatus::ClockedIn);
    }
}
