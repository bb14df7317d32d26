//! End-to-end overstay pass scenarios: alert lifecycle and the escalating
//! block-based fine converging in place.

use std::sync::Arc;

use chrono::{NaiveDate, NaiveTime, TimeZone, Utc};
use uuid::Uuid;

use prk_notify::{NotificationKind, RecordingDispatcher};
use prk_policy::{FixedClock, Policy};
use prk_reconcile::Reconciler;
use prk_schemas::{AlertStatus, FineReason, Reservation, ReservationStatus};
use prk_store::{MemoryStore, RecordStore};

fn date() -> NaiveDate {
    NaiveDate::from_ymd_opt(2026, 3, 9).unwrap()
}

fn t(h: u32, m: u32) -> NaiveTime {
    NaiveTime::from_hms_opt(h, m, 0).unwrap()
}

fn parked(start: NaiveTime, end: NaiveTime) -> Reservation {
    Reservation {
        id: Uuid::new_v4(),
        user_id: Uuid::new_v4(),
        lot_id: Uuid::new_v4(),
        vehicle_plate: "XYZ-987".to_string(),
        reservation_date: date(),
        start_time: start,
        end_time: end,
        status: ReservationStatus::CheckedIn,
        amount_cents: 10_000,
        notification_30_sent: true,
        notification_15_sent: true,
        fine_applied: false,
        checked_in_at: Some(Utc.with_ymd_and_hms(2026, 3, 9, 9, 5, 0).unwrap()),
    }
}

struct Harness {
    store: Arc<MemoryStore>,
    dispatcher: Arc<RecordingDispatcher>,
    clock: Arc<FixedClock>,
    reconciler: Reconciler,
}

fn harness(h: u32, m: u32) -> Harness {
    let store = Arc::new(MemoryStore::new());
    let dispatcher = Arc::new(RecordingDispatcher::new());
    let clock = Arc::new(FixedClock::new(
        Utc.with_ymd_and_hms(2026, 3, 9, h, m, 0).unwrap(),
    ));
    let reconciler = Reconciler::new(
        store.clone(),
        dispatcher.clone(),
        clock.clone(),
        Policy::default(),
    );
    Harness {
        store,
        dispatcher,
        clock,
        reconciler,
    }
}

#[tokio::test]
async fn overstay_fine_escalates_in_place_without_renotifying() {
    let h = harness(10, 5);
    let r = parked(t(9, 0), t(10, 0));
    let (id, lot, plate) = (r.id, r.lot_id, r.vehicle_plate.clone());
    h.store.seed_reservation(r);

    // Five minutes past the end is still inside the grace period.
    let s = h.reconciler.run_overstay_pass().await.unwrap();
    assert_eq!(s.rows_examined, 1);
    assert_eq!(s.fines_created, 0);
    assert_eq!(s.overstay_alerts_created, 0);

    // Seven minutes over: first block, alert raised, one notification.
    h.clock.advance_minutes(2);
    let s = h.reconciler.run_overstay_pass().await.unwrap();
    assert_eq!(s.fines_created, 1);
    assert_eq!(s.overstay_alerts_created, 1);
    assert_eq!(s.notifications_sent, 1);

    let fines = h.store.fines_for(id);
    assert_eq!(fines.len(), 1);
    assert_eq!(fines[0].amount_cents, 500);
    assert_eq!(fines[0].reason, FineReason::Overstay);

    let alerts = h.store.alerts_for(lot, &plate);
    assert_eq!(alerts.len(), 1);
    assert_eq!(alerts[0].overstay_minutes, 7);
    assert_eq!(
        alerts[0].entry_time,
        Utc.with_ymd_and_hms(2026, 3, 9, 9, 5, 0).unwrap()
    );

    // Sixteen minutes over: second block. Same fine row, same alert row,
    // amounts converged, no second notification.
    h.clock.advance_minutes(9);
    let s = h.reconciler.run_overstay_pass().await.unwrap();
    assert_eq!(s.fines_created, 0);
    assert_eq!(s.fines_updated, 1);
    assert_eq!(s.overstay_alerts_created, 0);
    assert_eq!(s.notifications_sent, 0);

    let fines = h.store.fines_for(id);
    assert_eq!(fines.len(), 1);
    assert_eq!(fines[0].amount_cents, 1_000);

    let alerts = h.store.alerts_for(lot, &plate);
    assert_eq!(alerts.len(), 1);
    assert_eq!(alerts[0].overstay_minutes, 16);
    assert_eq!(h.dispatcher.count_of(NotificationKind::OverstayFine), 1);
}

#[tokio::test]
async fn rerun_in_the_same_minute_changes_nothing() {
    let h = harness(10, 20);
    let r = parked(t(9, 0), t(10, 0));
    let (id, lot, plate) = (r.id, r.lot_id, r.vehicle_plate.clone());
    h.store.seed_reservation(r);

    let first = h.reconciler.run_overstay_pass().await.unwrap();
    assert_eq!(first.fines_created, 1);

    let second = h.reconciler.run_overstay_pass().await.unwrap();
    assert_eq!(second.fines_created, 0);
    assert_eq!(second.fines_updated, 0, "amount already converged");
    assert_eq!(second.overstay_alerts_created, 0);
    assert_eq!(second.notifications_sent, 0);

    assert_eq!(h.store.fines_for(id).len(), 1);
    assert_eq!(h.store.alerts_for(lot, &plate).len(), 1);
}

#[tokio::test]
async fn checkout_clears_the_alert_and_ends_the_escalation() {
    let h = harness(10, 12);
    let r = parked(t(9, 0), t(10, 0));
    let (id, lot, plate) = (r.id, r.lot_id, r.vehicle_plate.clone());
    h.store.seed_reservation(r);

    let s = h.reconciler.run_overstay_pass().await.unwrap();
    assert_eq!(s.overstay_alerts_created, 1);

    // The gate checks the vehicle out and closes the alert.
    assert!(h.store.check_out(id).await.unwrap());
    assert!(h.store.clear_active_alert(lot, &plate).await.unwrap());

    h.clock.advance_minutes(30);
    let s = h.reconciler.run_overstay_pass().await.unwrap();
    assert_eq!(s.rows_examined, 0, "completed reservations leave the batch");

    let alerts = h.store.alerts_for(lot, &plate);
    assert_eq!(alerts.len(), 1);
    assert_eq!(alerts[0].status, AlertStatus::Cleared);
    // Fine amount is frozen where the escalation stopped.
    assert_eq!(h.store.fines_for(id)[0].amount_cents, 500);
}

#[tokio::test]
async fn one_failed_row_never_aborts_the_batch() {
    let h = harness(10, 30);
    let bad = parked(t(9, 0), t(10, 0));
    let mut good = parked(t(9, 0), t(10, 0));
    good.lot_id = Uuid::new_v4();
    good.vehicle_plate = "GOOD-1".to_string();
    let (bad_id, good_id) = (bad.id, good.id);
    h.store.seed_reservation(bad);
    h.store.seed_reservation(good);
    h.store.inject_row_failure(bad_id);

    let s = h.reconciler.run_overstay_pass().await.unwrap();
    assert_eq!(s.rows_examined, 2);
    assert_eq!(s.fines_created, 1);
    assert_eq!(s.errors.len(), 1);
    assert!(s.errors[0].contains(&bad_id.to_string()));
    assert_eq!(h.store.fines_for(good_id).len(), 1);
    assert!(h.store.fines_for(bad_id).is_empty());
}
