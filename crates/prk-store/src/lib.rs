//! Record Store contract and implementations.
//!
//! The reconcilers and the gate talk to one seam: [`RecordStore`]. Two
//! implementations ship here:
//!
//! - [`PgStore`] — PostgreSQL via sqlx. Every idempotency guard is part of
//!   the `WHERE` clause of the corresponding `UPDATE`, so the write itself
//!   is the atomic guard: `rows_affected == 0` means another pass (or the
//!   gate) already won, and the caller performs no side effect.
//! - [`MemoryStore`] — deterministic in-memory store for tests. Same
//!   conditional-update semantics, plus a row-failure injection hook so
//!   batch error handling can be exercised.

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use uuid::Uuid;

use prk_schemas::{Fine, FineReason, OverstayAlert, Reservation};

mod memory;
mod pg;

pub use memory::MemoryStore;
pub use pg::{connect_from_env, migrate, PgStore, ENV_DB_URL};

// ---------------------------------------------------------------------------
// WarningFlag
// ---------------------------------------------------------------------------

/// Which pre-expiry warning flag a conditional update targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WarningFlag {
    /// `notification_30_sent`
    Thirty,
    /// `notification_15_sent`
    Fifteen,
}

impl WarningFlag {
    pub fn column(&self) -> &'static str {
        match self {
            WarningFlag::Thirty => "notification_30_sent",
            WarningFlag::Fifteen => "notification_15_sent",
        }
    }
}

// ---------------------------------------------------------------------------
// RecordStore
// ---------------------------------------------------------------------------

/// Durable store of reservations, fines and overstay alerts with
/// conditional-update support.
///
/// Boolean-returning mutators report whether the conditional write landed:
/// `Ok(false)` is the normal "lost the race / nothing eligible" outcome,
/// never an error.
#[async_trait]
pub trait RecordStore: Send + Sync {
    // -- reservation reads --------------------------------------------------

    /// Today's batch for the expiry reconciler: `reservation_date = date`
    /// and `status = confirmed`.
    async fn list_confirmed(&self, date: NaiveDate) -> Result<Vec<Reservation>>;

    /// Today's batch for the overstay reconciler: `reservation_date = date`
    /// and `status = checked_in` (currently parked).
    async fn list_checked_in(&self, date: NaiveDate) -> Result<Vec<Reservation>>;

    async fn fetch_reservation(&self, id: Uuid) -> Result<Option<Reservation>>;

    // -- reservation conditional writes -------------------------------------

    /// No-show transition: `confirmed` → `expired` plus `fine_applied =
    /// true`, guarded by `status = 'confirmed' AND checked_in_at IS NULL
    /// AND fine_applied = false`. A concurrent check-in atomically
    /// invalidates the attempt.
    async fn expire_no_show(&self, id: Uuid) -> Result<bool>;

    /// Set one warning flag, guarded by that flag still being false.
    async fn mark_warning_sent(&self, id: Uuid, flag: WarningFlag) -> Result<bool>;

    /// Gate check-in: sets `status = checked_in` and `checked_in_at = at`,
    /// guarded by `reservation_date = date AND status IN
    /// ('pending','confirmed')`.
    async fn check_in(&self, id: Uuid, date: NaiveDate, at: DateTime<Utc>) -> Result<bool>;

    /// Gate check-out: `checked_in` → `completed`.
    async fn check_out(&self, id: Uuid) -> Result<bool>;

    // -- fines ---------------------------------------------------------------

    async fn insert_fine(&self, fine: &Fine) -> Result<()>;

    /// The at-most-one *pending* fine for (reservation, reason), if any.
    async fn find_pending_fine(
        &self,
        reservation_id: Uuid,
        reason: FineReason,
    ) -> Result<Option<Fine>>;

    /// Update the amount of a fine, guarded by `status = 'pending'`.
    async fn update_fine_amount(&self, fine_id: Uuid, amount_cents: i64) -> Result<bool>;

    /// Administrative waive: `pending` → `waived`.
    async fn waive_fine(&self, fine_id: Uuid) -> Result<bool>;

    async fn fetch_fine(&self, fine_id: Uuid) -> Result<Option<Fine>>;

    // -- overstay alerts -----------------------------------------------------

    /// The at-most-one *active* alert for (lot, vehicle), if any.
    async fn find_active_alert(
        &self,
        lot_id: Uuid,
        vehicle_plate: &str,
    ) -> Result<Option<OverstayAlert>>;

    async fn insert_alert(&self, alert: &OverstayAlert) -> Result<()>;

    /// Bump `overstay_minutes` on an alert, guarded by `status = 'active'`.
    async fn update_alert_minutes(&self, alert_id: Uuid, overstay_minutes: i64) -> Result<bool>;

    /// Checkout closes the loop: the active alert for (lot, vehicle), if
    /// any, becomes `cleared`.
    async fn clear_active_alert(&self, lot_id: Uuid, vehicle_plate: &str) -> Result<bool>;
}
