//! Deterministic in-memory [`RecordStore`] for tests.
//!
//! Same conditional-update semantics as the Postgres store: every mutator
//! re-checks its guard under the lock and reports whether the write landed.
//! Iteration order is stable (BTreeMap by id) so scenario tests are
//! reproducible.
//!
//! `inject_row_failure` poisons a single reservation id: any mutator
//! touching that row returns an error, which lets batch tests prove that
//! one bad row never aborts a pass. `inject_batch_failure` fails the list
//! reads themselves, the one error class that is fatal to a pass.

use std::collections::{BTreeMap, HashSet};
use std::sync::Mutex;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use uuid::Uuid;

use prk_schemas::{
    AlertStatus, Fine, FineReason, FineStatus, OverstayAlert, Reservation, ReservationStatus,
};

use crate::{RecordStore, WarningFlag};

#[derive(Default)]
struct Inner {
    reservations: BTreeMap<Uuid, Reservation>,
    fines: BTreeMap<Uuid, Fine>,
    alerts: BTreeMap<Uuid, OverstayAlert>,
    poisoned: HashSet<Uuid>,
    batch_poisoned: bool,
}

#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a reservation row (the booking flow is outside this core).
    pub fn seed_reservation(&self, r: Reservation) {
        self.lock().reservations.insert(r.id, r);
    }

    /// Make every mutator touching `id` fail, simulating a row-level
    /// transient store error.
    pub fn inject_row_failure(&self, id: Uuid) {
        self.lock().poisoned.insert(id);
    }

    pub fn clear_row_failure(&self, id: Uuid) {
        self.lock().poisoned.remove(&id);
    }

    /// Make the batch list reads fail, simulating the store being
    /// unreachable at the start of a pass.
    pub fn inject_batch_failure(&self) {
        self.lock().batch_poisoned = true;
    }

    pub fn clear_batch_failure(&self) {
        self.lock().batch_poisoned = false;
    }

    /// Snapshot accessors for assertions.
    pub fn reservation(&self, id: Uuid) -> Option<Reservation> {
        self.lock().reservations.get(&id).cloned()
    }

    pub fn fines_for(&self, reservation_id: Uuid) -> Vec<Fine> {
        self.lock()
            .fines
            .values()
            .filter(|f| f.reservation_id == reservation_id)
            .cloned()
            .collect()
    }

    pub fn alerts_for(&self, lot_id: Uuid, vehicle_plate: &str) -> Vec<OverstayAlert> {
        self.lock()
            .alerts
            .values()
            .filter(|a| a.lot_id == lot_id && a.vehicle_plate == vehicle_plate)
            .cloned()
            .collect()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        self.inner.lock().expect("memory store poisoned")
    }

    fn check_poison(inner: &Inner, id: Uuid) -> Result<()> {
        if inner.poisoned.contains(&id) {
            return Err(anyhow!("injected store failure for row {id}"));
        }
        Ok(())
    }
}

#[async_trait]
impl RecordStore for MemoryStore {
    async fn list_confirmed(&self, date: NaiveDate) -> Result<Vec<Reservation>> {
        let inner = self.lock();
        if inner.batch_poisoned {
            return Err(anyhow!("injected batch read failure"));
        }
        Ok(inner
            .reservations
            .values()
            .filter(|r| r.reservation_date == date && r.status == ReservationStatus::Confirmed)
            .cloned()
            .collect())
    }

    async fn list_checked_in(&self, date: NaiveDate) -> Result<Vec<Reservation>> {
        let inner = self.lock();
        if inner.batch_poisoned {
            return Err(anyhow!("injected batch read failure"));
        }
        Ok(inner
            .reservations
            .values()
            .filter(|r| r.reservation_date == date && r.status == ReservationStatus::CheckedIn)
            .cloned()
            .collect())
    }

    async fn fetch_reservation(&self, id: Uuid) -> Result<Option<Reservation>> {
        Ok(self.lock().reservations.get(&id).cloned())
    }

    async fn expire_no_show(&self, id: Uuid) -> Result<bool> {
        let mut inner = self.lock();
        Self::check_poison(&inner, id)?;
        let Some(r) = inner.reservations.get_mut(&id) else {
            return Ok(false);
        };
        if r.status != ReservationStatus::Confirmed || r.checked_in_at.is_some() || r.fine_applied {
            return Ok(false);
        }
        r.status = ReservationStatus::Expired;
        r.fine_applied = true;
        Ok(true)
    }

    async fn mark_warning_sent(&self, id: Uuid, flag: WarningFlag) -> Result<bool> {
        let mut inner = self.lock();
        Self::check_poison(&inner, id)?;
        let Some(r) = inner.reservations.get_mut(&id) else {
            return Ok(false);
        };
        if r.status != ReservationStatus::Confirmed {
            return Ok(false);
        }
        let slot = match flag {
            WarningFlag::Thirty => &mut r.notification_30_sent,
            WarningFlag::Fifteen => &mut r.notification_15_sent,
        };
        if *slot {
            return Ok(false);
        }
        *slot = true;
        Ok(true)
    }

    async fn check_in(&self, id: Uuid, date: NaiveDate, at: DateTime<Utc>) -> Result<bool> {
        let mut inner = self.lock();
        Self::check_poison(&inner, id)?;
        let Some(r) = inner.reservations.get_mut(&id) else {
            return Ok(false);
        };
        if r.reservation_date != date
            || !matches!(
                r.status,
                ReservationStatus::Pending | ReservationStatus::Confirmed
            )
        {
            return Ok(false);
        }
        r.status = ReservationStatus::CheckedIn;
        r.checked_in_at = Some(at);
        Ok(true)
    }

    async fn check_out(&self, id: Uuid) -> Result<bool> {
        let mut inner = self.lock();
        Self::check_poison(&inner, id)?;
        let Some(r) = inner.reservations.get_mut(&id) else {
            return Ok(false);
        };
        if r.status != ReservationStatus::CheckedIn {
            return Ok(false);
        }
        r.status = ReservationStatus::Completed;
        Ok(true)
    }

    async fn insert_fine(&self, fine: &Fine) -> Result<()> {
        let mut inner = self.lock();
        Self::check_poison(&inner, fine.reservation_id)?;
        // Mirror of uq_fines_pending_per_reason.
        let duplicate = inner.fines.values().any(|f| {
            f.reservation_id == fine.reservation_id
                && f.reason == fine.reason
                && f.status == FineStatus::Pending
        });
        if duplicate && fine.status == FineStatus::Pending {
            return Err(anyhow!(
                "pending fine already exists for reservation {} reason {}",
                fine.reservation_id,
                fine.reason.as_str()
            ));
        }
        inner.fines.insert(fine.id, fine.clone());
        Ok(())
    }

    async fn find_pending_fine(
        &self,
        reservation_id: Uuid,
        reason: FineReason,
    ) -> Result<Option<Fine>> {
        Ok(self
            .lock()
            .fines
            .values()
            .find(|f| {
                f.reservation_id == reservation_id
                    && f.reason == reason
                    && f.status == FineStatus::Pending
            })
            .cloned())
    }

    async fn update_fine_amount(&self, fine_id: Uuid, amount_cents: i64) -> Result<bool> {
        let mut inner = self.lock();
        let Some(f) = inner.fines.get_mut(&fine_id) else {
            return Ok(false);
        };
        if f.status != FineStatus::Pending {
            return Ok(false);
        }
        f.amount_cents = amount_cents;
        Ok(true)
    }

    async fn waive_fine(&self, fine_id: Uuid) -> Result<bool> {
        let mut inner = self.lock();
        let Some(f) = inner.fines.get_mut(&fine_id) else {
            return Ok(false);
        };
        if f.status != FineStatus::Pending {
            return Ok(false);
        }
        f.status = FineStatus::Waived;
        Ok(true)
    }

    async fn fetch_fine(&self, fine_id: Uuid) -> Result<Option<Fine>> {
        Ok(self.lock().fines.get(&fine_id).cloned())
    }

    async fn find_active_alert(
        &self,
        lot_id: Uuid,
        vehicle_plate: &str,
    ) -> Result<Option<OverstayAlert>> {
        Ok(self
            .lock()
            .alerts
            .values()
            .find(|a| {
                a.lot_id == lot_id
                    && a.vehicle_plate == vehicle_plate
                    && a.status == AlertStatus::Active
            })
            .cloned())
    }

    async fn insert_alert(&self, alert: &OverstayAlert) -> Result<()> {
        let mut inner = self.lock();
        // Mirror of uq_overstay_alerts_active_pair.
        let duplicate = inner.alerts.values().any(|a| {
            a.lot_id == alert.lot_id
                && a.vehicle_plate == alert.vehicle_plate
                && a.status == AlertStatus::Active
        });
        if duplicate && alert.status == AlertStatus::Active {
            return Err(anyhow!(
                "active alert already exists for lot {} plate {}",
                alert.lot_id,
                alert.vehicle_plate
            ));
        }
        inner.alerts.insert(alert.id, alert.clone());
        Ok(())
    }

    async fn update_alert_minutes(&self, alert_id: Uuid, overstay_minutes: i64) -> Result<bool> {
        let mut inner = self.lock();
        let Some(a) = inner.alerts.get_mut(&alert_id) else {
            return Ok(false);
        };
        if a.status != AlertStatus::Active {
            return Ok(false);
        }
        a.overstay_minutes = overstay_minutes;
        Ok(true)
    }

    async fn clear_active_alert(&self, lot_id: Uuid, vehicle_plate: &str) -> Result<bool> {
        let mut inner = self.lock();
        let mut cleared = false;
        for a in inner.alerts.values_mut() {
            if a.lot_id == lot_id
                && a.vehicle_plate == vehicle_plate
                && a.status == AlertStatus::Active
            {
                a.status = AlertStatus::Cleared;
                cleared = true;
            }
        }
        Ok(cleared)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, NaiveTime, TimeZone};

    fn sample(date: NaiveDate) -> Reservation {
        Reservation {
            id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            lot_id: Uuid::new_v4(),
            vehicle_plate: "ABC-123".to_string(),
            reservation_date: date,
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

    #[tokio::test]
    async fn expire_no_show_is_single_shot() {
        let store = MemoryStore::new();
        let date = NaiveDate::from_ymd_opt(2026, 3, 9).unwrap();
        let r = sample(date);
        let id = r.id;
        store.seed_reservation(r);

        assert!(store.expire_no_show(id).await.unwrap());
        // Second attempt loses the guard: status is no longer confirmed.
        assert!(!store.expire_no_show(id).await.unwrap());
        assert_eq!(
            store.reservation(id).unwrap().status,
            ReservationStatus::Expired
        );
    }

    #[tokio::test]
    async fn check_in_beats_expiry() {
        let store = MemoryStore::new();
        let date = NaiveDate::from_ymd_opt(2026, 3, 9).unwrap();
        let r = sample(date);
        let id = r.id;
        store.seed_reservation(r);

        let at = Utc.with_ymd_and_hms(2026, 3, 9, 9, 16, 0).unwrap();
        assert!(store.check_in(id, date, at).await.unwrap());
        // The expiry guard must now refuse the row.
        assert!(!store.expire_no_show(id).await.unwrap());
        assert_eq!(
            store.reservation(id).unwrap().status,
            ReservationStatus::CheckedIn
        );
    }

    #[tokio::test]
    async fn warning_flags_are_write_once() {
        let store = MemoryStore::new();
        let date = NaiveDate::from_ymd_opt(2026, 3, 9).unwrap();
        let r = sample(date);
        let id = r.id;
        store.seed_reservation(r);

        assert!(store.mark_warning_sent(id, WarningFlag::Thirty).await.unwrap());
        assert!(!store.mark_warning_sent(id, WarningFlag::Thirty).await.unwrap());
        assert!(store.mark_warning_sent(id, WarningFlag::Fifteen).await.unwrap());
    }

    #[tokio::test]
    async fn duplicate_active_alert_rejected() {
        let store = MemoryStore::new();
        let lot = Uuid::new_v4();
        let alert = OverstayAlert {
            id: Uuid::new_v4(),
            lot_id: lot,
            vehicle_plate: "XYZ-9".to_string(),
            entry_time: Utc.with_ymd_and_hms(2026, 3, 9, 9, 5, 0).unwrap(),
            expected_exit_time: NaiveTime::from_hms_opt(10, 0, 0).unwrap(),
            overstay_minutes: 12,
            status: AlertStatus::Active,
        };
        store.insert_alert(&alert).await.unwrap();

        let mut dup = alert.clone();
        dup.id = Uuid::new_v4();
        assert!(store.insert_alert(&dup).await.is_err());

        assert!(store.clear_active_alert(lot, "XYZ-9").await.unwrap());
        // Once cleared, a fresh active alert is allowed again.
        assert!(store.insert_alert(&dup).await.is_ok());
    }
}
