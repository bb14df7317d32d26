//! Pure per-row decision functions.
//!
//! No IO. Given a reservation, "now" and the policy, these return what the
//! pass driver should attempt. The driver then applies the decision through
//! conditional store updates, which are the real idempotency guards — the
//! flags read here can be stale by the time the write lands, and that is
//! fine: the loser of the conditional update does nothing.

use chrono::NaiveDateTime;

use prk_policy::{minutes_since_start, minutes_until_end, overstay_minutes, Policy};
use prk_schemas::Reservation;

// ---------------------------------------------------------------------------
// Expiry
// ---------------------------------------------------------------------------

/// What the expiry pass should do for one `confirmed` reservation.
/// Branches are mutually exclusive per row per invocation; first match wins.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExpiryDecision {
    /// Past the no-show grace with no check-in: expire, fine, notify.
    ExpireNoShow,
    /// Inside the (15, 30]-minute window before the end: first warning.
    Warn30,
    /// Inside the (0, 15]-minute window before the end: urgent warning.
    Warn15,
    /// Nothing to do this tick.
    None,
}

pub fn decide_expiry(r: &Reservation, now: NaiveDateTime, policy: &Policy) -> ExpiryDecision {
    let since_start = minutes_since_start(now, r.reservation_date, r.start_time);
    let until_end = minutes_until_end(now, r.reservation_date, r.end_time);

    // 1) No-show takes priority: a reservation past its window without a
    //    check-in exits `confirmed` before warnings would fire.
    if since_start > policy.no_show_grace_minutes && r.checked_in_at.is_none() && !r.fine_applied {
        return ExpiryDecision::ExpireNoShow;
    }

    // 2) 30-minute warning: (15, 30] minutes remaining.
    if until_end > 15 && until_end <= 30 && !r.notification_30_sent {
        return ExpiryDecision::Warn30;
    }

    // 3) 15-minute warning: (0, 15] minutes remaining.
    if until_end > 0 && until_end <= 15 && !r.notification_15_sent {
        return ExpiryDecision::Warn15;
    }

    ExpiryDecision::None
}

// ---------------------------------------------------------------------------
// Overstay
// ---------------------------------------------------------------------------

/// What the overstay pass should do for one `checked_in` reservation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OverstayDecision {
    /// Inside the window or within the grace period.
    Skip,
    /// Overstaying: upsert the alert and converge the fine to `fine_cents`.
    Penalize {
        overstay_minutes: i64,
        fine_cents: i64,
    },
}

pub fn decide_overstay(r: &Reservation, now: NaiveDateTime, policy: &Policy) -> OverstayDecision {
    let minutes = overstay_minutes(now, r.reservation_date, r.end_time);
    if minutes <= policy.overstay_grace_minutes {
        return OverstayDecision::Skip;
    }
    OverstayDecision::Penalize {
        overstay_minutes: minutes,
        fine_cents: policy.overstay_fine_cents(minutes),
    }
}
