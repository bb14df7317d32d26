//! Clock seam.
//!
//! The reconcilers never call `Utc::now()` directly; they take a `&dyn
//! Clock` so tests can pin or advance "now" deterministically.

use std::sync::Mutex;

use chrono::{DateTime, Utc};

/// Source of the current instant.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Production clock: wall time.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Test clock pinned to an explicit instant, advanceable between passes.
#[derive(Debug)]
pub struct FixedClock {
    now: Mutex<DateTime<Utc>>,
}

impl FixedClock {
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(now),
        }
    }

    /// Move the clock to a new instant (e.g. the next reconciler tick).
    pub fn set(&self, now: DateTime<Utc>) {
        *self.now.lock().expect("clock poisoned") = now;
    }

    pub fn advance_minutes(&self, minutes: i64) {
        let mut guard = self.now.lock().expect("clock poisoned");
        *guard += chrono::Duration::minutes(minutes);
    }
}

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().expect("clock poisoned")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn fixed_clock_advances() {
        let c = FixedClock::new(Utc.with_ymd_and_hms(2026, 3, 9, 9, 16, 0).unwrap());
        assert_eq!(c.now().to_rfc3339(), "2026-03-09T09:16:00+00:00");
        c.advance_minutes(4);
        assert_eq!(c.now().to_rfc3339(), "2026-03-09T09:20:00+00:00");
    }
}
