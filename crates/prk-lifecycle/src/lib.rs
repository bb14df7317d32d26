//! Reservation lifecycle state machine.
//!
//! # Design
//!
//! Status transitions are declared in one transition table instead of being
//! scattered as ad hoc field comparisons. Every writer (gate, reconcilers,
//! admin cancel) validates through [`transition`]; an event that is not in
//! the table returns [`TransitionError`] and must not be written back.
//!
//! # State diagram
//!
//! ```text
//!   pending ──CheckIn──────────────► checked_in ──CheckOut──► completed
//!      │                                ▲
//!   Confirm                             │
//!      ▼                                │
//!   confirmed ──CheckIn─────────────────┘
//!      │  │
//!      │  └──Expire──► expired          (terminal)
//!      └─────Cancel──► cancelled        (terminal; also from pending)
//! ```
//!
//! `completed`, `cancelled` and `expired` are terminal; rows in those
//! states are retained for history and accept no further events.

use prk_schemas::ReservationStatus;

// ---------------------------------------------------------------------------
// ReservationEvent
// ---------------------------------------------------------------------------

/// Events that drive reservation status transitions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReservationEvent {
    /// Booking flow confirmed a pending reservation.
    Confirm,
    /// Attendant scanned the vehicle in (gate only; also sets `checked_in_at`).
    CheckIn,
    /// Attendant scanned the vehicle out.
    CheckOut,
    /// Expiry reconciler declared a no-show.
    Expire,
    /// Administrative cancellation.
    Cancel,
}

impl ReservationEvent {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReservationEvent::Confirm => "confirm",
            ReservationEvent::CheckIn => "check_in",
            ReservationEvent::CheckOut => "check_out",
            ReservationEvent::Expire => "expire",
            ReservationEvent::Cancel => "cancel",
        }
    }
}

// ---------------------------------------------------------------------------
// TransitionError
// ---------------------------------------------------------------------------

/// Returned when an event is not declared for the current status.
///
/// Callers must treat this as a validation rejection and leave the row
/// untouched; it is not a system fault.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransitionError {
    pub from: ReservationStatus,
    pub event: ReservationEvent,
}

impl std::fmt::Display for TransitionError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "illegal reservation transition: {} + {}",
            self.from.as_str(),
            self.event.as_str()
        )
    }
}

impl std::error::Error for TransitionError {}

// ---------------------------------------------------------------------------
// Transition table
// ---------------------------------------------------------------------------

/// Apply `event` to `from`, returning the next status or a typed rejection.
pub fn transition(
    from: ReservationStatus,
    event: ReservationEvent,
) -> Result<ReservationStatus, TransitionError> {
    use ReservationEvent::*;
    use ReservationStatus::*;

    match (from, event) {
        (Pending, Confirm) => Ok(Confirmed),

        // The gate accepts both pending and confirmed walk-ins.
        (Pending | Confirmed, CheckIn) => Ok(CheckedIn),

        (CheckedIn, CheckOut) => Ok(Completed),

        // Only a confirmed, never-checked-in reservation can expire.
        (Confirmed, Expire) => Ok(Expired),

        (Pending | Confirmed, Cancel) => Ok(Cancelled),

        (from, event) => Err(TransitionError { from, event }),
    }
}

/// True when `event` is declared for `from` — convenience for guards that
/// only need the yes/no answer.
pub fn can_transition(from: ReservationStatus, event: ReservationEvent) -> bool {
    transition(from, event).is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use ReservationEvent::*;
    use ReservationStatus::*;

    #[test]
    fn happy_path_pending_to_completed() {
        let s = transition(Pending, Confirm).unwrap();
        let s = transition(s, CheckIn).unwrap();
        let s = transition(s, CheckOut).unwrap();
        assert_eq!(s, Completed);
        assert!(s.is_terminal());
    }

    #[test]
    fn pending_walk_in_skips_confirmation() {
        assert_eq!(transition(Pending, CheckIn).unwrap(), CheckedIn);
    }

    #[test]
    fn expire_only_from_confirmed() {
        assert_eq!(transition(Confirmed, Expire).unwrap(), Expired);
        assert!(transition(Pending, Expire).is_err());
        assert!(transition(CheckedIn, Expire).is_err());
        assert!(transition(Completed, Expire).is_err());
    }

    #[test]
    fn checked_in_cannot_expire_or_cancel() {
        // A parked vehicle is neither a no-show nor cancellable.
        assert!(transition(CheckedIn, Expire).is_err());
        assert!(transition(CheckedIn, Cancel).is_err());
    }

    #[test]
    fn terminal_states_accept_nothing() {
        for terminal in [Completed, Cancelled, Expired] {
            for ev in [Confirm, CheckIn, CheckOut, Expire, Cancel] {
                let err = transition(terminal, ev).unwrap_err();
                assert_eq!(err.from, terminal);
            }
        }
    }

    #[test]
    fn error_message_names_both_sides() {
        let err = transition(Expired, CheckIn).unwrap_err();
        assert_eq!(err.to_string(), "illegal reservation transition: expired + check_in");
    }
}
