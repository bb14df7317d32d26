//! In-process scenario tests for prk-daemon HTTP endpoints.
//!
//! These tests spin up the Axum router **without** binding a TCP socket.
//! Each test calls `routes::build_router` and drives it via
//! `tower::ServiceExt::oneshot` — no network I/O required.

use std::sync::Arc;

use axum::http::{Request, StatusCode};
use chrono::{NaiveDate, NaiveTime, TimeZone, Utc};
use http_body_util::BodyExt;
use tower::ServiceExt; // oneshot
use uuid::Uuid;

use prk_daemon::{routes, state};
use prk_notify::RecordingDispatcher;
use prk_policy::{FixedClock, Policy};
use prk_schemas::{Reservation, ReservationStatus};
use prk_store::MemoryStore;

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

struct Harness {
    store: Arc<MemoryStore>,
    clock: Arc<FixedClock>,
    state: Arc<state::AppState>,
}

impl Harness {
    fn router(&self) -> axum::Router {
        routes::build_router(Arc::clone(&self.state))
    }
}

/// Fresh in-memory app state with the clock pinned to 2026-03-09 hh:mm UTC.
fn harness(h: u32, m: u32) -> Harness {
    let store = Arc::new(MemoryStore::new());
    let clock = Arc::new(FixedClock::new(
        Utc.with_ymd_and_hms(2026, 3, 9, h, m, 0).unwrap(),
    ));
    let state = Arc::new(state::AppState::new(
        store.clone(),
        Arc::new(RecordingDispatcher::new()),
        clock.clone(),
        Policy::default(),
    ));
    Harness {
        store,
        clock,
        state,
    }
}

fn date() -> NaiveDate {
    NaiveDate::from_ymd_opt(2026, 3, 9).unwrap()
}

fn reservation() -> Reservation {
    Reservation {
        id: Uuid::new_v4(),
        user_id: Uuid::new_v4(),
        lot_id: Uuid::new_v4(),
        vehicle_plate: "ABC-123".to_string(),
        reservation_date: date(),
        start_time: NaiveTime::from_hms_opt(9, 0, 0).unwrap(),
        end_time: NaiveTime::from_hms_opt(10, 0, 0).unwrap(),
        status: ReservationStatus::Confirmed,
        amount_cents: 10_000,
        notification_30_sent: false,
        notification_15_sent: false,
        fine_applied: false,
        checked_in_at: None,
    }
}

fn post(uri: &str) -> Request<axum::body::Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .body(axum::body::Body::empty())
        .unwrap()
}

fn post_json(uri: &str, body: serde_json::Value) -> Request<axum::body::Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(axum::body::Body::from(body.to_string()))
        .unwrap()
}

fn get(uri: &str) -> Request<axum::body::Body> {
    Request::builder()
        .method("GET")
        .uri(uri)
        .body(axum::body::Body::empty())
        .unwrap()
}

/// Drive the router with a single request and return (status, body_bytes).
async fn call(router: axum::Router, req: Request<axum::body::Body>) -> (StatusCode, bytes::Bytes) {
    let resp = router.oneshot(req).await.expect("oneshot failed");
    let status = resp.status();
    let body = resp
        .into_body()
        .collect()
        .await
        .expect("body collect failed")
        .to_bytes();
    (status, body)
}

/// Parse body bytes as a `serde_json::Value`.
fn parse_json(b: bytes::Bytes) -> serde_json::Value {
    serde_json::from_slice(&b).expect("body is not valid JSON")
}

// ---------------------------------------------------------------------------
// GET /v1/health
// ---------------------------------------------------------------------------

#[tokio::test]
async fn health_returns_200_ok_true() {
    let h = harness(9, 0);
    let (status, body) = call(h.router(), get("/v1/health")).await;
    assert_eq!(status, StatusCode::OK);

    let json = parse_json(body);
    assert_eq!(json["ok"], true);
    assert_eq!(json["service"], "prk-daemon");
}

// ---------------------------------------------------------------------------
// GET /v1/status
// ---------------------------------------------------------------------------

#[tokio::test]
async fn status_uptime_is_anchored_at_state_construction() {
    let h = harness(9, 0);
    // The anchor is set when AppState is built, not on the first request.
    assert!(h.state.uptime_secs() < 2);

    let (status, body) = call(h.router(), get("/v1/status")).await;
    assert_eq!(status, StatusCode::OK);
    assert!(parse_json(body)["daemon_uptime_secs"].as_u64().unwrap() < 2);
}

// ---------------------------------------------------------------------------
// POST /v1/reconcile/expiry + GET /v1/status
// ---------------------------------------------------------------------------

#[tokio::test]
async fn expiry_trigger_expires_no_show_and_status_reflects_the_run() {
    let h = harness(9, 20);
    let r = reservation();
    h.store.seed_reservation(r);

    let (status, body) = call(h.router(), post("/v1/reconcile/expiry")).await;
    assert_eq!(status, StatusCode::OK);

    let json = parse_json(body);
    assert_eq!(json["rows_examined"], 1);
    assert_eq!(json["reservations_expired"], 1);
    assert_eq!(json["notifications_sent"], 1);
    assert_eq!(json["errors"].as_array().unwrap().len(), 0);

    let (status, body) = call(h.router(), get("/v1/status")).await;
    assert_eq!(status, StatusCode::OK);
    let json = parse_json(body);
    assert_eq!(json["last_expiry_summary"]["reservations_expired"], 1);
    assert!(!json["last_expiry_run_at"].is_null());
    assert!(json["last_overstay_run_at"].is_null());
}

#[tokio::test]
async fn partial_row_failure_still_returns_200_with_errors() {
    let h = harness(9, 20);
    let r = reservation();
    let id = r.id;
    h.store.seed_reservation(r);
    h.store.inject_row_failure(id);

    let (status, body) = call(h.router(), post("/v1/reconcile/expiry")).await;
    assert_eq!(status, StatusCode::OK);

    let json = parse_json(body);
    assert_eq!(json["reservations_expired"], 0);
    assert_eq!(json["errors"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn batch_read_failure_returns_500_with_store_error_body() {
    let h = harness(9, 20);
    h.store.seed_reservation(reservation());
    h.store.inject_batch_failure();

    let (status, body) = call(h.router(), post("/v1/reconcile/expiry")).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    let json = parse_json(body);
    assert_eq!(json["code"], "store_error");
    assert!(json["error"]
        .as_str()
        .unwrap()
        .contains("batch read failed"));

    let (status, body) = call(h.router(), post("/v1/reconcile/overstay")).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(parse_json(body)["code"], "store_error");

    // A failed pass is not recorded as a run.
    let (_, body) = call(h.router(), get("/v1/status")).await;
    let json = parse_json(body);
    assert!(json["last_expiry_run_at"].is_null());
    assert!(json["last_overstay_run_at"].is_null());
}

// ---------------------------------------------------------------------------
// POST /v1/reconcile/overstay
// ---------------------------------------------------------------------------

#[tokio::test]
async fn overstay_trigger_creates_alert_and_fine() {
    let h = harness(9, 5);
    let r = reservation();
    let id = r.id;
    h.store.seed_reservation(r);

    let (status, _) =
        call(h.router(), post(&format!("/v1/reservations/{id}/check-in"))).await;
    assert_eq!(status, StatusCode::OK);

    // 12 minutes past the end of the window.
    h.clock.set(Utc.with_ymd_and_hms(2026, 3, 9, 10, 12, 0).unwrap());
    let (status, body) = call(h.router(), post("/v1/reconcile/overstay")).await;
    assert_eq!(status, StatusCode::OK);

    let json = parse_json(body);
    assert_eq!(json["rows_examined"], 1);
    assert_eq!(json["fines_created"], 1);
    assert_eq!(json["overstay_alerts_created"], 1);
}

// ---------------------------------------------------------------------------
// Gate endpoints
// ---------------------------------------------------------------------------

#[tokio::test]
async fn check_in_then_check_out_round_trip() {
    let h = harness(9, 5);
    let r = reservation();
    let id = r.id;
    h.store.seed_reservation(r);

    let (status, body) =
        call(h.router(), post(&format!("/v1/reservations/{id}/check-in"))).await;
    assert_eq!(status, StatusCode::OK);
    let json = parse_json(body);
    assert_eq!(json["status"], "checked_in");
    assert!(!json["checked_in_at"].is_null());

    let (status, body) =
        call(h.router(), post(&format!("/v1/reservations/{id}/check-out"))).await;
    assert_eq!(status, StatusCode::OK);
    let json = parse_json(body);
    assert_eq!(json["status"], "completed");
}

#[tokio::test]
async fn gate_rejections_map_to_404_409_422() {
    let h = harness(9, 5);

    // Unknown id → 404.
    let missing = Uuid::new_v4();
    let (status, body) = call(
        h.router(),
        post(&format!("/v1/reservations/{missing}/check-in")),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(parse_json(body)["code"], "not_found");

    // Check-out without check-in → 409.
    let r = reservation();
    let id = r.id;
    h.store.seed_reservation(r);
    let (status, body) =
        call(h.router(), post(&format!("/v1/reservations/{id}/check-out"))).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(parse_json(body)["code"], "invalid_state");

    // Wrong day → 422.
    let mut tomorrow = reservation();
    tomorrow.reservation_date = NaiveDate::from_ymd_opt(2026, 3, 10).unwrap();
    let tid = tomorrow.id;
    h.store.seed_reservation(tomorrow);
    let (status, body) =
        call(h.router(), post(&format!("/v1/reservations/{tid}/check-in"))).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(parse_json(body)["code"], "wrong_day");
}

// ---------------------------------------------------------------------------
// Fine ledger endpoints
// ---------------------------------------------------------------------------

#[tokio::test]
async fn waive_and_adjust_fines_over_http() {
    let h = harness(9, 20);
    let r = reservation();
    let rid = r.id;
    h.store.seed_reservation(r);

    // Produce a no-show fine via the trigger endpoint.
    let (status, _) = call(h.router(), post("/v1/reconcile/expiry")).await;
    assert_eq!(status, StatusCode::OK);
    let fine_id = h.store.fines_for(rid)[0].id;

    let (status, body) = call(
        h.router(),
        post_json(
            &format!("/v1/fines/{fine_id}/adjust"),
            serde_json::json!({ "amount_cents": 2_500 }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(parse_json(body)["amount_cents"], 2_500);

    // Negative amounts are rejected before touching the store.
    let (status, body) = call(
        h.router(),
        post_json(
            &format!("/v1/fines/{fine_id}/adjust"),
            serde_json::json!({ "amount_cents": -1 }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(parse_json(body)["code"], "bad_amount");

    let (status, body) = call(h.router(), post(&format!("/v1/fines/{fine_id}/waive"))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(parse_json(body)["status"], "waived");

    // Waiving twice is a conflict.
    let (status, body) = call(h.router(), post(&format!("/v1/fines/{fine_id}/waive"))).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(parse_json(body)["code"], "invalid_state");
}
