//! Batch run summaries, returned from the trigger endpoints as JSON.

use serde::{Deserialize, Serialize};

/// Outcome of one expiry pass.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExpirySummary {
    /// Rows read from the store for this pass.
    pub rows_examined: usize,
    pub notifications_sent: usize,
    pub reservations_expired: usize,
    /// Per-row failures; the pass still returns 200 with these attached.
    pub errors: Vec<String>,
}

/// Outcome of one overstay pass.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OverstaySummary {
    pub rows_examined: usize,
    pub notifications_sent: usize,
    pub fines_created: usize,
    pub fines_updated: usize,
    pub overstay_alerts_created: usize,
    pub errors: Vec<String>,
}
