//! Axum router and all HTTP handlers for prk-daemon.
//!
//! `build_router` is the single entry point; `main.rs` calls it and attaches
//! middleware layers.  All handlers are `pub(crate)` so the scenario tests in
//! `tests/` can compose the router directly.

use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use tracing::error;
use uuid::Uuid;

use prk_gate::{GateError, LedgerError};

use crate::{
    api_types::{AdjustFineRequest, HealthResponse, RejectionResponse},
    state::AppState,
};

// ---------------------------------------------------------------------------
// Router
// ---------------------------------------------------------------------------

/// Build the complete application router wired to the given shared state.
///
/// Middleware layers (CORS, tracing) are **not** applied here; `main.rs`
/// attaches them after this call so tests can use the bare router.
pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/v1/health", get(health))
        .route("/v1/status", get(status_handler))
        .route("/v1/reconcile/expiry", post(reconcile_expiry))
        .route("/v1/reconcile/overstay", post(reconcile_overstay))
        .route("/v1/reservations/:id/check-in", post(check_in))
        .route("/v1/reservations/:id/check-out", post(check_out))
        .route("/v1/fines/:id/waive", post(waive_fine))
        .route("/v1/fines/:id/adjust", post(adjust_fine))
        .with_state(state)
}

// ---------------------------------------------------------------------------
// GET /v1/health
// ---------------------------------------------------------------------------

pub(crate) async fn health(State(st): State<Arc<AppState>>) -> impl IntoResponse {
    (
        StatusCode::OK,
        Json(HealthResponse {
            ok: true,
            service: st.build.service,
            version: st.build.version,
        }),
    )
}

// ---------------------------------------------------------------------------
// GET /v1/status
// ---------------------------------------------------------------------------

pub(crate) async fn status_handler(State(st): State<Arc<AppState>>) -> impl IntoResponse {
    let mut snap = st.status.read().await.clone();
    snap.daemon_uptime_secs = st.uptime_secs();
    (StatusCode::OK, Json(snap))
}

// ---------------------------------------------------------------------------
// POST /v1/reconcile/expiry
// ---------------------------------------------------------------------------

/// Trigger one expiry pass. Partial row failures still return 200 with the
/// failures in `errors`; only a failed batch read is a 500.
pub(crate) async fn reconcile_expiry(State(st): State<Arc<AppState>>) -> Response {
    match st.reconciler.run_expiry_pass().await {
        Ok(summary) => {
            st.record_expiry_run(&summary).await;
            (StatusCode::OK, Json(summary)).into_response()
        }
        Err(e) => batch_failure(e),
    }
}

// ---------------------------------------------------------------------------
// POST /v1/reconcile/overstay
// ---------------------------------------------------------------------------

pub(crate) async fn reconcile_overstay(State(st): State<Arc<AppState>>) -> Response {
    match st.reconciler.run_overstay_pass().await {
        Ok(summary) => {
            st.record_overstay_run(&summary).await;
            (StatusCode::OK, Json(summary)).into_response()
        }
        Err(e) => batch_failure(e),
    }
}

fn batch_failure(e: anyhow::Error) -> Response {
    error!(error = %format!("{e:#}"), "reconcile pass failed");
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(RejectionResponse {
            error: format!("{e:#}"),
            code: "store_error".to_string(),
        }),
    )
        .into_response()
}

// ---------------------------------------------------------------------------
// POST /v1/reservations/:id/check-in
// ---------------------------------------------------------------------------

pub(crate) async fn check_in(
    State(st): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Response {
    match st.gate.check_in(id).await {
        Ok(r) => (StatusCode::OK, Json(r)).into_response(),
        Err(e) => gate_rejection(e),
    }
}

// ---------------------------------------------------------------------------
// POST /v1/reservations/:id/check-out
// ---------------------------------------------------------------------------

pub(crate) async fn check_out(
    State(st): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Response {
    match st.gate.check_out(id).await {
        Ok(r) => (StatusCode::OK, Json(r)).into_response(),
        Err(e) => gate_rejection(e),
    }
}

fn gate_rejection(e: GateError) -> Response {
    let (status, code) = match &e {
        GateError::NotFound(_) => (StatusCode::NOT_FOUND, "not_found"),
        GateError::InvalidState(_) => (StatusCode::CONFLICT, "invalid_state"),
        GateError::WrongDay { .. } => (StatusCode::UNPROCESSABLE_ENTITY, "wrong_day"),
        GateError::Store(_) => (StatusCode::INTERNAL_SERVER_ERROR, "store_error"),
    };
    if status == StatusCode::INTERNAL_SERVER_ERROR {
        error!(error = %e, "gate store failure");
    }
    (
        status,
        Json(RejectionResponse {
            error: e.to_string(),
            code: code.to_string(),
        }),
    )
        .into_response()
}

// ---------------------------------------------------------------------------
// POST /v1/fines/:id/waive
// ---------------------------------------------------------------------------

pub(crate) async fn waive_fine(
    State(st): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Response {
    match st.ledger.waive(id).await {
        Ok(f) => (StatusCode::OK, Json(f)).into_response(),
        Err(e) => ledger_rejection(e),
    }
}

// ---------------------------------------------------------------------------
// POST /v1/fines/:id/adjust
// ---------------------------------------------------------------------------

pub(crate) async fn adjust_fine(
    State(st): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(req): Json<AdjustFineRequest>,
) -> Response {
    match st.ledger.adjust(id, req.amount_cents).await {
        Ok(f) => (StatusCode::OK, Json(f)).into_response(),
        Err(e) => ledger_rejection(e),
    }
}

fn ledger_rejection(e: LedgerError) -> Response {
    let (status, code) = match &e {
        LedgerError::NotFound(_) => (StatusCode::NOT_FOUND, "not_found"),
        LedgerError::NotPending { .. } => (StatusCode::CONFLICT, "invalid_state"),
        LedgerError::BadAmount(_) => (StatusCode::UNPROCESSABLE_ENTITY, "bad_amount"),
        LedgerError::Store(_) => (StatusCode::INTERNAL_SERVER_ERROR, "store_error"),
    };
    if status == StatusCode::INTERNAL_SERVER_ERROR {
        error!(error = %e, "ledger store failure");
    }
    (
        status,
        Json(RejectionResponse {
            error: e.to_string(),
            code: code.to_string(),
        }),
    )
        .into_response()
}
