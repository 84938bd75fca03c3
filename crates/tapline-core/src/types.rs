//! # Domain Types
//!
//! Core domain types used throughout Tapline.
//!
//! ## Type Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                          Domain Types                                   │
//! │                                                                         │
//! │  Product ──┬── Stocked   (stock counter, low-stock threshold)          │
//! │            ├── Service   (optionally a metered draw against a keg)     │
//! │            └── Keg       (capacity; lives as KegInstance containers)   │
//! │                                                                         │
//! │  KegInstance: Full ──tap──► Tapped ──close──► Empty (terminal)         │
//! │                                                                         │
//! │  Sale: immutable header + snapshot lines, created atomically           │
//! │                                                                         │
//! │  TimeLog: Ongoing ──► PendingApproval ──► {Completed | Rejected}       │
//! │  UserRecord.time_clock_status mirrors the newest TimeLog               │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Every entity carries a UUID v4 `id` used for ledger relations. Enum
//! fields map to stable snake_case strings in the ledger store via
//! `as_str`/`parse`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::error::ValidationError;
use crate::money::Money;
use crate::volume::{Volume, VolumeUnit};

// =============================================================================
// Product
// =============================================================================

/// How a product participates in inventory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum ProductType {
    /// Carries an integer stock counter that sales decrement.
    Stocked,
    /// No stock of its own; may be a metered draw against a tapped keg.
    Service,
    /// A container product; physical units are tracked as KegInstances.
    Keg,
}

impl ProductType {
    pub const fn as_str(&self) -> &'static str {
        match self {
            ProductType::Stocked => "stocked",
            ProductType::Service => "service",
            ProductType::Keg => "keg",
        }
    }

    pub fn parse(s: &str) -> Result<Self, ValidationError> {
        match s {
            "stocked" => Ok(ProductType::Stocked),
            "service" => Ok(ProductType::Service),
            "keg" => Ok(ProductType::Keg),
            other => Err(ValidationError::InvalidFormat {
                field: "product_type".to_string(),
                reason: format!("unknown product type '{other}'"),
            }),
        }
    }
}

/// A product available for sale.
///
/// Optional fields only carry meaning for the matching `product_type`:
/// `stock`/`low_stock_threshold` for Stocked (and the unit count for Keg
/// products), `capacity`/`capacity_unit` for Keg, and the
/// `linked_keg_product_id`/`serving_size`/`serving_unit` triple for a
/// keg-backed Service.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct Product {
    /// Unique identifier (UUID v4).
    pub id: String,

    /// Display name shown to staff and on receipts.
    pub name: String,

    /// Menu category (for the UI; opaque to the core).
    pub category: String,

    /// Unit price in cents, tax inclusive.
    pub price_cents: i64,

    /// Inventory behavior of this product.
    pub product_type: ProductType,

    /// Current stock level. `None` for unlinked Service products, where
    /// stock has no meaning and is never decremented.
    pub stock: Option<i64>,

    /// Stock level at or below which a low-stock warning is raised.
    pub low_stock_threshold: Option<i64>,

    /// Keg products: container capacity as entered by the operator.
    pub capacity: Option<f64>,

    /// Unit the capacity was entered in.
    pub capacity_unit: Option<VolumeUnit>,

    /// Service products: parent Keg product this is a metered draw against.
    pub linked_keg_product_id: Option<String>,

    /// Volume/mass consumed per unit sale, in `serving_unit`.
    pub serving_size: Option<f64>,

    /// Unit the serving size was entered in.
    pub serving_unit: Option<VolumeUnit>,

    /// Whether the product is active (soft delete).
    pub is_active: bool,

    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,

    #[ts(as = "String")]
    pub updated_at: DateTime<Utc>,
}

impl Product {
    /// Returns the price as a Money type.
    #[inline]
    pub fn price(&self) -> Money {
        Money::from_cents(self.price_cents)
    }

    /// True when this is a Service product drawing against a keg.
    #[inline]
    pub fn is_keg_backed(&self) -> bool {
        self.product_type == ProductType::Service && self.linked_keg_product_id.is_some()
    }

    /// Normalized serving size, if configured.
    pub fn serving_volume(&self) -> Option<Volume> {
        match (self.serving_size, self.serving_unit) {
            (Some(size), Some(unit)) => Some(Volume::normalize(size, unit)),
            _ => None,
        }
    }

    /// Normalized container capacity, for Keg products.
    pub fn capacity_volume(&self) -> Option<Volume> {
        match (self.capacity, self.capacity_unit) {
            (Some(capacity), Some(unit)) => Some(Volume::normalize(capacity, unit)),
            _ => None,
        }
    }

    /// True when the stock counter has meaning for this product.
    #[inline]
    pub fn tracks_stock(&self) -> bool {
        matches!(self.product_type, ProductType::Stocked | ProductType::Keg)
    }
}

// =============================================================================
// Keg Instance
// =============================================================================

/// Lifecycle state of one physical keg container.
///
/// `Empty` is terminal; restocking creates new instances.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum KegStatus {
    Full,
    Tapped,
    Empty,
}

impl KegStatus {
    pub const fn as_str(&self) -> &'static str {
        match self {
            KegStatus::Full => "full",
            KegStatus::Tapped => "tapped",
            KegStatus::Empty => "empty",
        }
    }

    pub fn parse(s: &str) -> Result<Self, ValidationError> {
        match s {
            "full" => Ok(KegStatus::Full),
            "tapped" => Ok(KegStatus::Tapped),
            "empty" => Ok(KegStatus::Empty),
            other => Err(ValidationError::InvalidFormat {
                field: "keg_status".to_string(),
                reason: format!("unknown keg status '{other}'"),
            }),
        }
    }
}

/// One per-sale volume/revenue attribution on a keg instance.
///
/// The list is append-only: entries are never mutated after insertion.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct KegSaleEntry {
    /// Unique identifier (UUID v4).
    pub id: String,

    /// Server the draw is attributed to.
    pub server_id: String,
    pub server_name: String,

    /// Volume drawn, base units.
    pub volume: Volume,

    /// Revenue of the line the draw came from, cents.
    pub revenue_cents: i64,

    #[ts(as = "String")]
    pub at: DateTime<Utc>,
}

/// A single physical container of a Keg-type product.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct KegInstance {
    /// Unique identifier (UUID v4).
    pub id: String,

    /// Owning Keg product.
    pub product_id: String,

    /// Container capacity, base units.
    pub capacity: Volume,

    /// Remaining volume, base units. Invariant: 0 ≤ current ≤ capacity.
    pub current_volume: Volume,

    pub status: KegStatus,

    pub tapped_by: Option<String>,
    #[ts(as = "Option<String>")]
    pub tapped_at: Option<DateTime<Utc>>,

    pub closed_by: Option<String>,
    #[ts(as = "Option<String>")]
    pub closed_at: Option<DateTime<Utc>>,

    /// Append-only per-sale attributions.
    pub sales: Vec<KegSaleEntry>,

    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
}

impl KegInstance {
    /// Volume still in the container relative to capacity, in basis points.
    pub fn residual_bps(&self) -> u32 {
        if self.capacity.is_zero() {
            return 0;
        }
        ((self.current_volume.base() as i128 * 10_000) / self.capacity.base() as i128) as u32
    }
}

// =============================================================================
// Sale
// =============================================================================

/// How a sale was settled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    Cash,
    Card,
}

impl PaymentMethod {
    pub const fn as_str(&self) -> &'static str {
        match self {
            PaymentMethod::Cash => "cash",
            PaymentMethod::Card => "card",
        }
    }

    pub fn parse(s: &str) -> Result<Self, ValidationError> {
        match s {
            "cash" => Ok(PaymentMethod::Cash),
            "card" => Ok(PaymentMethod::Card),
            other => Err(ValidationError::InvalidFormat {
                field: "payment_method".to_string(),
                reason: format!("unknown payment method '{other}'"),
            }),
        }
    }
}

/// Discount applied to a sale, snapshotted at sale time.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct DiscountSnapshot {
    pub name: String,
    /// Absolute amount taken off the gross total, cents.
    pub amount_cents: i64,
}

/// A line item in a sale.
///
/// Snapshot pattern: name and price are copied from the product at sale
/// time, never referenced live.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct SaleLine {
    /// Unique identifier (UUID v4).
    pub id: String,

    pub product_id: String,

    /// Product name at time of sale (frozen).
    pub name_snapshot: String,

    /// Unit price in cents at time of sale (frozen).
    pub unit_price_cents: i64,

    pub quantity: i64,

    /// unit_price × quantity, cents.
    pub line_total_cents: i64,
}

/// An immutable, atomically-created sale.
///
/// Invariants: `total == subtotal + tax` and, with a discount applied,
/// `total == gross − discount.amount`.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct Sale {
    /// Unique identifier (UUID v4).
    pub id: String,

    #[ts(as = "String")]
    pub at: DateTime<Utc>,

    /// Ordered line items; all present or the sale does not exist.
    pub lines: Vec<SaleLine>,

    pub payment_method: PaymentMethod,

    /// Server who rang the sale up.
    pub server_id: String,
    pub server_name: String,

    /// Customer-type tag (opaque to the core, e.g. "regular", "member").
    pub customer_type: String,

    pub subtotal_cents: i64,
    pub tax_cents: i64,
    pub total_cents: i64,

    pub discount: Option<DiscountSnapshot>,
}

impl Sale {
    #[inline]
    pub fn total(&self) -> Money {
        Money::from_cents(self.total_cents)
    }

    /// Gross total before the discount was taken off.
    pub fn gross_cents(&self) -> i64 {
        self.total_cents + self.discount.as_ref().map_or(0, |d| d.amount_cents)
    }
}

/// A requested order line, as handed over by the UI layer.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct OrderLine {
    pub product_id: String,
    pub quantity: i64,
}

// =============================================================================
// Time Log / Shift
// =============================================================================

/// Status of one employee shift record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum TimeLogStatus {
    /// Shift in progress; exactly this or PendingApproval may exist once
    /// per user.
    Ongoing,
    /// Clearance requested, waiting for a manager count.
    PendingApproval,
    /// Manager rejected the declared cash; must be resolved before the
    /// user clocks in again.
    Rejected,
    /// Approved and closed.
    Completed,
}

impl TimeLogStatus {
    pub const fn as_str(&self) -> &'static str {
        match self {
            TimeLogStatus::Ongoing => "ongoing",
            TimeLogStatus::PendingApproval => "pending_approval",
            TimeLogStatus::Rejected => "rejected",
            TimeLogStatus::Completed => "completed",
        }
    }

    pub fn parse(s: &str) -> Result<Self, ValidationError> {
        match s {
            "ongoing" => Ok(TimeLogStatus::Ongoing),
            "pending_approval" => Ok(TimeLogStatus::PendingApproval),
            "rejected" => Ok(TimeLogStatus::Rejected),
            "completed" => Ok(TimeLogStatus::Completed),
            other => Err(ValidationError::InvalidFormat {
                field: "time_log_status".to_string(),
                reason: format!("unknown time log status '{other}'"),
            }),
        }
    }

    /// True for the states the per-user uniqueness invariant covers.
    #[inline]
    pub const fn is_open(&self) -> bool {
        matches!(self, TimeLogStatus::Ongoing | TimeLogStatus::PendingApproval)
    }
}

/// Expected sales for a shift, partitioned by payment method.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct ExpectedSales {
    pub cash_cents: i64,
    pub card_cents: i64,
    pub total_cents: i64,
}

/// The durable record of one employee shift.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct TimeLog {
    /// Unique identifier (UUID v4).
    pub id: String,

    pub user_id: String,
    pub user_name: String,

    #[ts(as = "String")]
    pub clock_in: DateTime<Utc>,

    #[ts(as = "Option<String>")]
    pub clock_out: Option<DateTime<Utc>>,

    pub status: TimeLogStatus,

    /// Cash the employee declared at clearance.
    pub declared_cents: Option<i64>,

    /// Sales attributed to the shift, computed at clearance.
    pub expected: Option<ExpectedSales>,

    /// Cash the manager physically counted at approval.
    pub counted_cents: Option<i64>,

    /// declared − expected.cash at clearance, counted − expected.cash
    /// after approval.
    pub difference_cents: Option<i64>,

    pub rejection_reason: Option<String>,

    /// Manager/admin who closed the log.
    pub approved_by: Option<String>,

    pub duration_minutes: Option<i64>,
}

// =============================================================================
// User
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Admin,
    Manager,
    Server,
}

impl Role {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::Manager => "manager",
            Role::Server => "server",
        }
    }

    pub fn parse(s: &str) -> Result<Self, ValidationError> {
        match s {
            "admin" => Ok(Role::Admin),
            "manager" => Ok(Role::Manager),
            "server" => Ok(Role::Server),
            other => Err(ValidationError::InvalidFormat {
                field: "role".to_string(),
                reason: format!("unknown role '{other}'"),
            }),
        }
    }
}

/// Cached clock state on the user record.
///
/// Must always be derivable from the newest TimeLog; divergence is a bug
/// state the State Healer corrects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum TimeClockStatus {
    ClockedOut,
    ClockedIn,
    AwaitingClearance,
}

impl TimeClockStatus {
    pub const fn as_str(&self) -> &'static str {
        match self {
            TimeClockStatus::ClockedOut => "clocked_out",
            TimeClockStatus::ClockedIn => "clocked_in",
            TimeClockStatus::AwaitingClearance => "awaiting_clearance",
        }
    }

    pub fn parse(s: &str) -> Result<Self, ValidationError> {
        match s {
            "clocked_out" => Ok(TimeClockStatus::ClockedOut),
            "clocked_in" => Ok(TimeClockStatus::ClockedIn),
            "awaiting_clearance" => Ok(TimeClockStatus::AwaitingClearance),
            other => Err(ValidationError::InvalidFormat {
                field: "time_clock_status".to_string(),
                reason: format!("unknown clock status '{other}'"),
            }),
        }
    }
}

/// The subset of a user record the core reads and writes.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct UserRecord {
    /// Unique identifier (UUID v4).
    pub id: String,

    pub name: String,

    pub role: Role,

    pub time_clock_status: TimeClockStatus,

    /// Mirror of the open log's clock-in time, cleared on clearance.
    #[ts(as = "Option<String>")]
    pub clock_in_time: Option<DateTime<Utc>>,
}

// =============================================================================
// Audit
// =============================================================================

/// Kind of audit event appended to the ledger's audit log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum AuditKind {
    SaleCommitted,
    KegTapped,
    KegClosed,
    ClockIn,
    ClearanceRequested,
    ShiftApproved,
    ShiftRejected,
    AdminClockOut,
    /// System-level correction by the State Healer, distinct from normal
    /// shift events.
    StateHealed,
    /// A post-commit inventory decrement failed; the sale stands, the
    /// divergence is recorded.
    InventoryDrift,
}

impl AuditKind {
    pub const fn as_str(&self) -> &'static str {
        match self {
            AuditKind::SaleCommitted => "sale_committed",
            AuditKind::KegTapped => "keg_tapped",
            AuditKind::KegClosed => "keg_closed",
            AuditKind::ClockIn => "clock_in",
            AuditKind::ClearanceRequested => "clearance_requested",
            AuditKind::ShiftApproved => "shift_approved",
            AuditKind::ShiftRejected => "shift_rejected",
            AuditKind::AdminClockOut => "admin_clock_out",
            AuditKind::StateHealed => "state_healed",
            AuditKind::InventoryDrift => "inventory_drift",
        }
    }

    pub fn parse(s: &str) -> Result<Self, ValidationError> {
        match s {
            "sale_committed" => Ok(AuditKind::SaleCommitted),
            "keg_tapped" => Ok(AuditKind::KegTapped),
            "keg_closed" => Ok(AuditKind::KegClosed),
            "clock_in" => Ok(AuditKind::ClockIn),
            "clearance_requested" => Ok(AuditKind::ClearanceRequested),
            "shift_approved" => Ok(AuditKind::ShiftApproved),
            "shift_rejected" => Ok(AuditKind::ShiftRejected),
            "admin_clock_out" => Ok(AuditKind::AdminClockOut),
            "state_healed" => Ok(AuditKind::StateHealed),
            "inventory_drift" => Ok(AuditKind::InventoryDrift),
            other => Err(ValidationError::InvalidFormat {
                field: "audit_kind".to_string(),
                reason: format!("unknown audit kind '{other}'"),
            }),
        }
    }
}

/// One append-only audit record.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct AuditEvent {
    /// Unique identifier (UUID v4).
    pub id: String,

    pub kind: AuditKind,

    /// Acting user, or "system" for healer corrections.
    pub actor_id: String,

    /// Entity the event is about (sale id, keg id, time log id, user id).
    pub entity_id: String,

    /// Human-readable detail for the audit trail.
    pub detail: String,

    #[ts(as = "String")]
    pub at: DateTime<Utc>,
}

// =============================================================================
// Unit Tests
// =============================================================================
