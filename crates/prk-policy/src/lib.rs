//! Policy constants and the shared time/fine arithmetic.
//!
//! Deterministic, pure logic. No IO. Both reconcilers and the gate depend
//! on this crate; nothing here touches the store or the dispatcher.
//!
//! All money is integer currency minor units (cents); all durations are
//! whole minutes. Sub-minute remainders are truncated toward zero, which
//! keeps every boundary in the reservation window inclusive/exclusive
//! exactly as documented on each function.

use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use serde::{Deserialize, Serialize};

mod clock;

pub use clock::{Clock, FixedClock, SystemClock};

// ---------------------------------------------------------------------------
// Policy
// ---------------------------------------------------------------------------

/// Tunable policy constants. Values are operational configuration, not
/// derived quantities; the defaults mirror the adopted municipal policy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Policy {
    /// Minutes after `start_time` before an un-checked-in reservation is a
    /// no-show. Exactly this many minutes late is still tolerated.
    pub no_show_grace_minutes: i64,
    /// No-show fine as an integer percentage of the reservation amount.
    pub no_show_fine_percent: i64,
    /// Minutes past `end_time` before an overstay is penalised.
    pub overstay_grace_minutes: i64,
    /// Size of one overstay billing block in minutes.
    pub overstay_block_minutes: i64,
    /// Fine per overstay block, in currency minor units.
    pub overstay_rate_cents_per_block: i64,
}

impl Default for Policy {
    fn default() -> Self {
        Self {
            no_show_grace_minutes: 15,
            no_show_fine_percent: 50,
            overstay_grace_minutes: 5,
            overstay_block_minutes: 15,
            overstay_rate_cents_per_block: 500,
        }
    }
}

impl Policy {
    /// Load policy overrides from `PRK_*` environment variables, falling
    /// back to the defaults for anything unset or unparsable.
    pub fn from_env() -> Self {
        let d = Self::default();
        Self {
            no_show_grace_minutes: env_i64("PRK_NO_SHOW_GRACE_MINUTES", d.no_show_grace_minutes),
            no_show_fine_percent: env_i64("PRK_NO_SHOW_FINE_PERCENT", d.no_show_fine_percent),
            overstay_grace_minutes: env_i64(
                "PRK_OVERSTAY_GRACE_MINUTES",
                d.overstay_grace_minutes,
            ),
            overstay_block_minutes: env_i64(
                "PRK_OVERSTAY_BLOCK_MINUTES",
                d.overstay_block_minutes,
            ),
            overstay_rate_cents_per_block: env_i64(
                "PRK_OVERSTAY_RATE_CENTS_PER_BLOCK",
                d.overstay_rate_cents_per_block,
            ),
        }
    }

    /// No-show penalty: `percent` of the booked amount, rounded half-up on
    /// cents.
    pub fn no_show_fine_cents(&self, amount_cents: i64) -> i64 {
        (amount_cents * self.no_show_fine_percent + 50) / 100
    }

    /// Number of billing blocks covering `overstay_minutes`
    /// (`ceil(minutes / block)`); zero for non-positive input.
    pub fn overstay_blocks(&self, overstay_minutes: i64) -> i64 {
        if overstay_minutes <= 0 {
            return 0;
        }
        (overstay_minutes + self.overstay_block_minutes - 1) / self.overstay_block_minutes
    }

    /// Overstay fine as a pure function of elapsed overstay time. The
    /// reconciler recomputes this each pass and updates the pending fine in
    /// place, so the amount is always re-derivable from current state.
    pub fn overstay_fine_cents(&self, overstay_minutes: i64) -> i64 {
        self.overstay_blocks(overstay_minutes) * self.overstay_rate_cents_per_block
    }
}

fn env_i64(key: &str, default: i64) -> i64 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

// ---------------------------------------------------------------------------
// Window arithmetic
// ---------------------------------------------------------------------------

/// Anchor a reservation's wall-clock time onto its calendar day.
pub fn window_instant(date: NaiveDate, time: NaiveTime) -> NaiveDateTime {
    date.and_time(time)
}

/// Whole minutes elapsed since `start_time` (negative before the window
/// opens). Sub-minute remainders truncate toward zero.
pub fn minutes_since_start(now: NaiveDateTime, date: NaiveDate, start_time: NaiveTime) -> i64 {
    (now - window_instant(date, start_time)).num_minutes()
}

/// Whole minutes remaining until `end_time` (negative once the window has
/// closed).
pub fn minutes_until_end(now: NaiveDateTime, date: NaiveDate, end_time: NaiveTime) -> i64 {
    (window_instant(date, end_time) - now).num_minutes()
}

/// Whole minutes of overstay past `end_time`; zero or negative while still
/// inside the window.
pub fn overstay_minutes(now: NaiveDateTime, date: NaiveDate, end_time: NaiveTime) -> i64 {
    (now - window_instant(date, end_time)).num_minutes()
}

/// Convert an instant from the clock into local-naive wall-clock time, the
/// frame all reservation windows are expressed in.
pub fn to_wall_clock(now: DateTime<Utc>) -> NaiveDateTime {
    now.naive_utc()
}
