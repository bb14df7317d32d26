//! Batch pass drivers: apply pure decisions through the store and the
//! dispatcher, one row at a time.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use tracing::{info, warn};
use uuid::Uuid;

use prk_notify::{render, Dispatcher, NotificationKind};
use prk_policy::{to_wall_clock, Clock, Policy};
use prk_schemas::{AlertStatus, Fine, FineReason, FineStatus, OverstayAlert, Reservation};
use prk_store::{RecordStore, WarningFlag};

use crate::engine::{decide_expiry, decide_overstay, ExpiryDecision, OverstayDecision};
use crate::types::{ExpirySummary, OverstaySummary};

/// Default bound on one row's store + dispatch work.
pub const DEFAULT_ROW_TIMEOUT: Duration = Duration::from_secs(10);

/// Owns the collaborators of both passes. Cheap to clone via the contained
/// `Arc`s; one instance is shared by the daemon routes and the interval
/// tasks.
#[derive(Clone)]
pub struct Reconciler {
    store: Arc<dyn RecordStore>,
    dispatcher: Arc<dyn Dispatcher>,
    clock: Arc<dyn Clock>,
    policy: Policy,
    row_timeout: Duration,
}

impl Reconciler {
    pub fn new(
        store: Arc<dyn RecordStore>,
        dispatcher: Arc<dyn Dispatcher>,
        clock: Arc<dyn Clock>,
        policy: Policy,
    ) -> Self {
        Self {
            store,
            dispatcher,
            clock,
            policy,
            row_timeout: DEFAULT_ROW_TIMEOUT,
        }
    }

    pub fn with_row_timeout(mut self, row_timeout: Duration) -> Self {
        self.row_timeout = row_timeout;
        self
    }

    pub fn policy(&self) -> &Policy {
        &self.policy
    }

    // -----------------------------------------------------------------------
    // Expiry pass
    // -----------------------------------------------------------------------

    /// One expiry pass over today's `confirmed` reservations.
    ///
    /// Returns `Err` only when the batch read fails; row failures are
    /// collected in the summary.
    pub async fn run_expiry_pass(&self) -> Result<ExpirySummary> {
        let now = to_wall_clock(self.clock.now());
        let today = now.date();

        let batch = self
            .store
            .list_confirmed(today)
            .await
            .context("expiry pass: batch read failed")?;

        let mut summary = ExpirySummary {
            rows_examined: batch.len(),
            ..Default::default()
        };

        for r in batch {
            let decision = decide_expiry(&r, now, &self.policy);
            let outcome = tokio::time::timeout(self.row_timeout, self.apply_expiry(&r, decision))
                .await
                .unwrap_or_else(|_| Err(anyhow!("row timed out after {:?}", self.row_timeout)));

            match outcome {
                Ok(applied) => {
                    if applied.expired {
                        summary.reservations_expired += 1;
                    }
                    if applied.notified {
                        summary.notifications_sent += 1;
                    }
                }
                Err(e) => {
                    warn!(reservation = %r.id, error = %format!("{e:#}"), "expiry row failed");
                    summary.errors.push(format!("{}: {e:#}", r.id));
                }
            }
        }

        info!(
            rows = summary.rows_examined,
            expired = summary.reservations_expired,
            notified = summary.notifications_sent,
            errors = summary.errors.len(),
            "expiry pass complete"
        );
        Ok(summary)
    }

    async fn apply_expiry(&self, r: &Reservation, decision: ExpiryDecision) -> Result<RowOutcome> {
        match decision {
            ExpiryDecision::None => Ok(RowOutcome::default()),

            ExpiryDecision::ExpireNoShow => {
                // The conditional update is the guard: a concurrent check-in
                // or an overlapping pass leaves zero rows affected and we do
                // nothing further.
                if !self.store.expire_no_show(r.id).await? {
                    return Ok(RowOutcome::default());
                }

                let fine_cents = self.policy.no_show_fine_cents(r.amount_cents);
                let fine = Fine {
                    id: Uuid::new_v4(),
                    user_id: r.user_id,
                    reservation_id: r.id,
                    amount_cents: fine_cents,
                    reason: FineReason::NoShow,
                    status: FineStatus::Pending,
                    created_at: self.clock.now(),
                };
                self.store.insert_fine(&fine).await?;

                let notified = self
                    .dispatch(render(NotificationKind::NoShowExpiry, r, Some(fine_cents)))
                    .await;

                Ok(RowOutcome {
                    expired: true,
                    notified,
                })
            }

            ExpiryDecision::Warn30 => self.apply_warning(r, WarningFlag::Thirty).await,
            ExpiryDecision::Warn15 => self.apply_warning(r, WarningFlag::Fifteen).await,
        }
    }

    async fn apply_warning(&self, r: &Reservation, flag: WarningFlag) -> Result<RowOutcome> {
        // Flag first: winning the conditional update claims the one-shot
        // notification. A send failure after the claim is a missed (not
        // duplicated) notification, which the design accepts.
        if !self.store.mark_warning_sent(r.id, flag).await? {
            return Ok(RowOutcome::default());
        }
        let kind = match flag {
            WarningFlag::Thirty => NotificationKind::ExpiringSoon30,
            WarningFlag::Fifteen => NotificationKind::ExpiringSoon15,
        };
        let notified = self.dispatch(render(kind, r, None)).await;
        Ok(RowOutcome {
            expired: false,
            notified,
        })
    }

    // -----------------------------------------------------------------------
    // Overstay pass
    // -----------------------------------------------------------------------

    /// One overstay pass over today's `checked_in` reservations.
    pub async fn run_overstay_pass(&self) -> Result<OverstaySummary> {
        let now = to_wall_clock(self.clock.now());
        let today = now.date();

        let batch = self
            .store
            .list_checked_in(today)
            .await
            .context("overstay pass: batch read failed")?;

        let mut summary = OverstaySummary {
            rows_examined: batch.len(),
            ..Default::default()
        };

        for r in batch {
            let decision = decide_overstay(&r, now, &self.policy);
            let outcome = tokio::time::timeout(self.row_timeout, self.apply_overstay(&r, decision))
                .await
                .unwrap_or_else(|_| Err(anyhow!("row timed out after {:?}", self.row_timeout)));

            match outcome {
                Ok(applied) => {
                    summary.fines_created += applied.fines_created;
                    summary.fines_updated += applied.fines_updated;
                    summary.overstay_alerts_created += applied.alerts_created;
                    summary.notifications_sent += applied.notifications_sent;
                }
                Err(e) => {
                    warn!(reservation = %r.id, error = %format!("{e:#}"), "overstay row failed");
                    summary.errors.push(format!("{}: {e:#}", r.id));
                }
            }
        }

        info!(
            rows = summary.rows_examined,
            fines_created = summary.fines_created,
            fines_updated = summary.fines_updated,
            alerts_created = summary.overstay_alerts_created,
            errors = summary.errors.len(),
            "overstay pass complete"
        );
        Ok(summary)
    }

    async fn apply_overstay(
        &self,
        r: &Reservation,
        decision: OverstayDecision,
    ) -> Result<OverstayRowOutcome> {
        let OverstayDecision::Penalize {
            overstay_minutes,
            fine_cents,
        } = decision
        else {
            return Ok(OverstayRowOutcome::default());
        };

        let mut outcome = OverstayRowOutcome::default();

        // Alert: at most one active per (lot, vehicle). Query-before-insert,
        // with the partial unique index backstopping the race.
        match self
            .store
            .find_active_alert(r.lot_id, &r.vehicle_plate)
            .await?
        {
            Some(alert) => {
                self.store
                    .update_alert_minutes(alert.id, overstay_minutes)
                    .await?;
            }
            None => {
                let alert = OverstayAlert {
                    id: Uuid::new_v4(),
                    lot_id: r.lot_id,
                    vehicle_plate: r.vehicle_plate.clone(),
                    entry_time: r.checked_in_at.unwrap_or_else(|| self.clock.now()),
                    expected_exit_time: r.end_time,
                    overstay_minutes,
                    status: AlertStatus::Active,
                };
                self.store.insert_alert(&alert).await?;
                outcome.alerts_created += 1;
            }
        }

        // Fine: notify only on first creation, then converge the amount in
        // place on later passes without re-notifying.
        match self
            .store
            .find_pending_fine(r.id, FineReason::Overstay)
            .await?
        {
            Some(existing) => {
                if existing.amount_cents != fine_cents
                    && self
                        .store
                        .update_fine_amount(existing.id, fine_cents)
                        .await?
                {
                    outcome.fines_updated += 1;
                }
            }
            None => {
                let fine = Fine {
                    id: Uuid::new_v4(),
                    user_id: r.user_id,
                    reservation_id: r.id,
                    amount_cents: fine_cents,
                    reason: FineReason::Overstay,
                    status: FineStatus::Pending,
                    created_at: self.clock.now(),
                };
                self.store.insert_fine(&fine).await?;
                outcome.fines_created += 1;
                if self
                    .dispatch(render(NotificationKind::OverstayFine, r, Some(fine_cents)))
                    .await
                {
                    outcome.notifications_sent += 1;
                }
            }
        }

        Ok(outcome)
    }

    // -----------------------------------------------------------------------
    // Dispatch helper
    // -----------------------------------------------------------------------

    /// Fire-and-forget send: a failed delivery is logged, not retried, and
    /// does not fail the row — the store flags were already claimed.
    async fn dispatch(&self, n: prk_notify::Notification) -> bool {
        match self.dispatcher.send(&n).await {
            Ok(()) => true,
            Err(e) => {
                warn!(
                    reservation = %n.reservation_id,
                    template = n.kind.template_id(),
                    error = %e,
                    "notification send failed"
                );
                false
            }
        }
    }
}

#[derive(Debug, Default)]
struct RowOutcome {
    expired: bool,
    notified: bool,
}

#[derive(Debug, Default)]
struct OverstayRowOutcome {
    fines_created: usize,
    fines_updated: usize,
    alerts_created: usize,
    notifications_sent: usize,
}
