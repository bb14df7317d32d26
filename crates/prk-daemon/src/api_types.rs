//! Request and response types for all prk-daemon HTTP endpoints.
//!
//! These types are `Serialize + Deserialize` so they can be JSON-encoded
//! by Axum and decoded by tests.  No business logic lives here.

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// /v1/health
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub ok: bool,
    pub service: &'static str,
    pub version: &'static str,
}

// ---------------------------------------------------------------------------
// Rejection body (404 / 409 / 422 / 500)
// ---------------------------------------------------------------------------

/// Response body for every non-2xx outcome.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RejectionResponse {
    pub error: String,
    /// Machine-readable discriminator: "not_found" | "invalid_state" |
    /// "wrong_day" | "bad_amount" | "store_error".
    pub code: String,
}

// ---------------------------------------------------------------------------
// POST /v1/fines/:id/adjust
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdjustFineRequest {
    pub amount_cents: i64,
}
