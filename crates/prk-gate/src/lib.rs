//! Check-in/check-out gate and the administrative fine ledger.
//!
//! The gate is the only writer of `checked_in_at`. Validation goes through
//! the declared state machine first, then the write itself is a conditional
//! store update — losing that race is reported as the same typed rejection
//! a stale request would get, with no side effects either way.

use std::sync::Arc;

use tracing::info;
use uuid::Uuid;

use prk_lifecycle::{transition, ReservationEvent, TransitionError};
use prk_policy::{to_wall_clock, Clock};
use prk_schemas::{Fine, Reservation};
use prk_store::RecordStore;

// ---------------------------------------------------------------------------
// GateError
// ---------------------------------------------------------------------------

/// Typed rejection from the gate. Everything except `Store` is a request
/// problem, not a system fault.
#[derive(Debug)]
pub enum GateError {
    /// No reservation with that id.
    NotFound(Uuid),
    /// The reservation is for a different calendar day.
    WrongDay {
        reservation_date: chrono::NaiveDate,
        today: chrono::NaiveDate,
    },
    /// The requested event is not legal from the current status.
    InvalidState(TransitionError),
    /// The store failed; retryable.
    Store(anyhow::Error),
}

impl std::fmt::Display for GateError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            GateError::NotFound(id) => write!(f, "reservation {id} not found"),
            GateError::WrongDay {
                reservation_date,
                today,
            } => write!(
                f,
                "reservation is for {reservation_date}, gate date is {today}"
            ),
            GateError::InvalidState(e) => write!(f, "{e}"),
            GateError::Store(e) => write!(f, "store error: {e:#}"),
        }
    }
}

impl std::error::Error for GateError {}

impl From<anyhow::Error> for GateError {
    fn from(e: anyhow::Error) -> Self {
        GateError::Store(e)
    }
}

// ---------------------------------------------------------------------------
// LedgerError
// ---------------------------------------------------------------------------

/// Typed rejection from the fine ledger operations.
#[derive(Debug)]
pub enum LedgerError {
    NotFound(Uuid),
    /// The fine is not `pending`; waive and adjust only touch pending fines.
    NotPending { fine_id: Uuid, status: String },
    /// Adjusted amounts must be non-negative.
    BadAmount(i64),
    Store(anyhow::Error),
}

impl std::fmt::Display for LedgerError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LedgerError::NotFound(id) => write!(f, "fine {id} not found"),
            LedgerError::NotPending { fine_id, status } => {
                write!(f, "fine {fine_id} is {status}, not pending")
            }
            LedgerError::BadAmount(a) => write!(f, "invalid fine amount {a}"),
            LedgerError::Store(e) => write!(f, "store error: {e:#}"),
        }
    }
}

impl std::error::Error for LedgerError {}

impl From<anyhow::Error> for LedgerError {
    fn from(e: anyhow::Error) -> Self {
        LedgerError::Store(e)
    }
}

// ---------------------------------------------------------------------------
// Gate
// ---------------------------------------------------------------------------

#[derive(Clone)]
pub struct Gate {
    store: Arc<dyn RecordStore>,
    clock: Arc<dyn Clock>,
}

impl Gate {
    pub fn new(store: Arc<dyn RecordStore>, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    /// Check a vehicle in. Valid only on the reservation's own calendar day
    /// from `pending` or `confirmed`; sets `checked_in_at` exactly once.
    pub async fn check_in(&self, id: Uuid) -> Result<Reservation, GateError> {
        let now = self.clock.now();
        let today = to_wall_clock(now).date();

        let r = self.fetch(id).await?;
        transition(r.status, ReservationEvent::CheckIn).map_err(GateError::InvalidState)?;
        if r.reservation_date != today {
            return Err(GateError::WrongDay {
                reservation_date: r.reservation_date,
                today,
            });
        }

        if !self.store.check_in(id, today, now).await? {
            // Lost the conditional update (e.g. the expiry reconciler got
            // there first). Report against the status as it is now.
            return Err(self.stale_rejection(id, ReservationEvent::CheckIn).await?);
        }

        info!(reservation = %id, at = %now, "vehicle checked in");
        self.fetch(id).await
    }

    /// Check a vehicle out: `checked_in` → `completed`, and the active
    /// overstay alert for (lot, vehicle), if any, is cleared. Any pending
    /// overstay fine keeps its last amount.
    pub async fn check_out(&self, id: Uuid) -> Result<Reservation, GateError> {
        let r = self.fetch(id).await?;
        transition(r.status, ReservationEvent::CheckOut).map_err(GateError::InvalidState)?;

        if !self.store.check_out(id).await? {
            return Err(self.stale_rejection(id, ReservationEvent::CheckOut).await?);
        }

        let cleared = self
            .store
            .clear_active_alert(r.lot_id, &r.vehicle_plate)
            .await?;
        info!(reservation = %id, alert_cleared = cleared, "vehicle checked out");
        self.fetch(id).await
    }

    async fn fetch(&self, id: Uuid) -> Result<Reservation, GateError> {
        self.store
            .fetch_reservation(id)
            .await?
            .ok_or(GateError::NotFound(id))
    }

    /// The conditional update found zero eligible rows: rebuild the typed
    /// rejection from current state so the caller sees why.
    async fn stale_rejection(
        &self,
        id: Uuid,
        event: ReservationEvent,
    ) -> Result<GateError, GateError> {
        let r = self.fetch(id).await?;
        Ok(GateError::InvalidState(TransitionError {
            from: r.status,
            event,
        }))
    }
}

// ---------------------------------------------------------------------------
// FineLedger
// ---------------------------------------------------------------------------

/// Administrative operations on fines. Only `pending` fines are mutable;
/// neither operation touches reservation idempotency flags.
#[derive(Clone)]
pub struct FineLedger {
    store: Arc<dyn RecordStore>,
}

impl FineLedger {
    pub fn new(store: Arc<dyn RecordStore>) -> Self {
        Self { store }
    }

    pub async fn waive(&self, fine_id: Uuid) -> Result<Fine, LedgerError> {
        if !self.store.waive_fine(fine_id).await? {
            return Err(self.rejection(fine_id).await?);
        }
        info!(fine = %fine_id, "fine waived");
        self.fetch(fine_id).await
    }

    pub async fn adjust(&self, fine_id: Uuid, amount_cents: i64) -> Result<Fine, LedgerError> {
        if amount_cents < 0 {
            return Err(LedgerError::BadAmount(amount_cents));
        }
        if !self.store.update_fine_amount(fine_id, amount_cents).await? {
            return Err(self.rejection(fine_id).await?);
        }
        info!(fine = %fine_id, amount_cents, "fine adjusted");
        self.fetch(fine_id).await
    }

    async fn fetch(&self, fine_id: Uuid) -> Result<Fine, LedgerError> {
        self.store
            .fetch_fine(fine_id)
            .await?
            .ok_or(LedgerError::NotFound(fine_id))
    }

    async fn rejection(&self, fine_id: Uuid) -> Result<LedgerError, LedgerError> {
        let f = self.fetch(fine_id).await?;
        Ok(LedgerError::NotPending {
            fine_id,
            status: f.status.as_str().to_string(),
        })
    }
}
