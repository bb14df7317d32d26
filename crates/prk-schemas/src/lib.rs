//! Shared domain types for the parking reservation core.
//!
//! Plain data only: everything here is `Serialize + Deserialize` so the
//! daemon can JSON-encode it and the store can persist it. No business
//! logic lives in this crate; status transition rules belong to
//! `prk-lifecycle` and window arithmetic to `prk-policy`.

use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ---------------------------------------------------------------------------
// ReservationStatus
// ---------------------------------------------------------------------------

/// Lifecycle status of a reservation, stored as lowercase text in the DB.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReservationStatus {
    Pending,
    Confirmed,
    CheckedIn,
    Completed,
    Cancelled,
    Expired,
}

impl ReservationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReservationStatus::Pending => "pending",
            ReservationStatus::Confirmed => "confirmed",
            ReservationStatus::CheckedIn => "checked_in",
            ReservationStatus::Completed => "completed",
            ReservationStatus::Cancelled => "cancelled",
            ReservationStatus::Expired => "expired",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(ReservationStatus::Pending),
            "confirmed" => Some(ReservationStatus::Confirmed),
            "checked_in" => Some(ReservationStatus::CheckedIn),
            "completed" => Some(ReservationStatus::Completed),
            "cancelled" => Some(ReservationStatus::Cancelled),
            "expired" => Some(ReservationStatus::Expired),
            _ => None,
        }
    }

    /// Terminal states are retained for history and never transition again.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ReservationStatus::Completed | ReservationStatus::Cancelled | ReservationStatus::Expired
        )
    }
}

// ---------------------------------------------------------------------------
// Reservation
// ---------------------------------------------------------------------------

/// A single parking reservation row.
///
/// The window (`reservation_date`, `start_time`, `end_time`) is wall-clock
/// local time on one calendar day. The three booleans are write-once
/// idempotency flags: once set they are never cleared for the same row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Reservation {
    pub id: Uuid,
    pub user_id: Uuid,
    pub lot_id: Uuid,
    /// Vehicle plate as scanned/entered at the lot.
    pub vehicle_plate: String,
    pub reservation_date: NaiveDate,
    pub start_time: NaiveTime,
    pub end_time: NaiveTime,
    pub status: ReservationStatus,
    /// Base price of the reservation in currency minor units (cents).
    pub amount_cents: i64,
    pub notification_30_sent: bool,
    pub notification_15_sent: bool,
    pub fine_applied: bool,
    /// Set exactly once by the check-in gate; reconcilers only read it.
    pub checked_in_at: Option<DateTime<Utc>>,
}

// ---------------------------------------------------------------------------
// Fine
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FineReason {
    NoShow,
    Overstay,
}

impl FineReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            FineReason::NoShow => "no_show",
            FineReason::Overstay => "overstay",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "no_show" => Some(FineReason::NoShow),
            "overstay" => Some(FineReason::Overstay),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FineStatus {
    Pending,
    Resolved,
    Waived,
}

impl FineStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            FineStatus::Pending => "pending",
            FineStatus::Resolved => "resolved",
            FineStatus::Waived => "waived",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(FineStatus::Pending),
            "resolved" => Some(FineStatus::Resolved),
            "waived" => Some(FineStatus::Waived),
            _ => None,
        }
    }
}

/// A monetary penalty attached to a reservation.
///
/// At most one *pending* fine exists per (reservation, reason); overstay
/// fines grow by in-place amount updates rather than duplicate rows.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Fine {
    pub id: Uuid,
    pub user_id: Uuid,
    pub reservation_id: Uuid,
    pub amount_cents: i64,
    pub reason: FineReason,
    pub status: FineStatus,
    pub created_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// OverstayAlert
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertStatus {
    Active,
    Cleared,
}

impl AlertStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AlertStatus::Active => "active",
            AlertStatus::Cleared => "cleared",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "active" => Some(AlertStatus::Active),
            "cleared" => Some(AlertStatus::Cleared),
            _ => None,
        }
    }
}

/// An open overstay observation keyed by (lot, vehicle).
///
/// At most one `active` alert exists per pair at any time; the overstay
/// reconciler bumps `overstay_minutes` in place until checkout clears it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OverstayAlert {
    pub id: Uuid,
    pub lot_id: Uuid,
    pub vehicle_plate: String,
    pub entry_time: DateTime<Utc>,
    pub expected_exit_time: NaiveTime,
    pub overstay_minutes: i64,
    pub status: AlertStatus,
}
