//! PostgreSQL implementation of [`RecordStore`].

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use sqlx::postgres::PgPoolOptions;
use sqlx::{PgPool, Row};
use uuid::Uuid;

use prk_schemas::{
    AlertStatus, Fine, FineReason, FineStatus, OverstayAlert, Reservation, ReservationStatus,
};

use crate::{RecordStore, WarningFlag};

pub const ENV_DB_URL: &str = "PRK_DATABASE_URL";

/// Connect to Postgres using PRK_DATABASE_URL.
pub async fn connect_from_env() -> Result<PgPool> {
    let url =
        std::env::var(ENV_DB_URL).with_context(|| format!("missing env var {ENV_DB_URL}"))?;

    let pool = PgPoolOptions::new()
        .max_connections(10)
        .connect(&url)
        .await
        .context("failed to connect to Postgres")?;

    Ok(pool)
}

/// Run embedded SQLx migrations.
pub async fn migrate(pool: &PgPool) -> Result<()> {
    sqlx::migrate!("./migrations")
        .run(pool)
        .await
        .context("db migrate failed")?;
    Ok(())
}

// ---------------------------------------------------------------------------
// PgStore
// ---------------------------------------------------------------------------

#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

const RESERVATION_COLUMNS: &str = "id, user_id, lot_id, vehicle_plate, reservation_date, \
     start_time, end_time, status, amount_cents, notification_30_sent, \
     notification_15_sent, fine_applied, checked_in_at";

fn reservation_from_row(row: &sqlx::postgres::PgRow) -> Result<Reservation> {
    let status_text: String = row.try_get("status")?;
    let status = ReservationStatus::parse(&status_text)
        .ok_or_else(|| anyhow!("invalid reservation status in DB: {status_text}"))?;

    Ok(Reservation {
        id: row.try_get("id")?,
        user_id: row.try_get("user_id")?,
        lot_id: row.try_get("lot_id")?,
        vehicle_plate: row.try_get("vehicle_plate")?,
        reservation_date: row.try_get("reservation_date")?,
        start_time: row.try_get("start_time")?,
        end_time: row.try_get("end_time")?,
        status,
        amount_cents: row.try_get("amount_cents")?,
        notification_30_sent: row.try_get("notification_30_sent")?,
        notification_15_sent: row.try_get("notification_15_sent")?,
        fine_applied: row.try_get("fine_applied")?,
        checked_in_at: row.try_get("checked_in_at")?,
    })
}

fn fine_from_row(row: &sqlx::postgres::PgRow) -> Result<Fine> {
    let reason_text: String = row.try_get("reason")?;
    let status_text: String = row.try_get("status")?;

    Ok(Fine {
        id: row.try_get("id")?,
        user_id: row.try_get("user_id")?,
        reservation_id: row.try_get("reservation_id")?,
        amount_cents: row.try_get("amount_cents")?,
        reason: FineReason::parse(&reason_text)
            .ok_or_else(|| anyhow!("invalid fine reason in DB: {reason_text}"))?,
        status: FineStatus::parse(&status_text)
            .ok_or_else(|| anyhow!("invalid fine status in DB: {status_text}"))?,
        created_at: row.try_get("created_at")?,
    })
}

fn alert_from_row(row: &sqlx::postgres::PgRow) -> Result<OverstayAlert> {
    let status_text: String = row.try_get("status")?;

    Ok(OverstayAlert {
        id: row.try_get("id")?,
        lot_id: row.try_get("lot_id")?,
        vehicle_plate: row.try_get("vehicle_plate")?,
        entry_time: row.try_get("entry_time")?,
        expected_exit_time: row.try_get("expected_exit_time")?,
        overstay_minutes: row.try_get("overstay_minutes")?,
        status: AlertStatus::parse(&status_text)
            .ok_or_else(|| anyhow!("invalid alert status in DB: {status_text}"))?,
    })
}

#[async_trait]
impl RecordStore for PgStore {
    async fn list_confirmed(&self, date: NaiveDate) -> Result<Vec<Reservation>> {
        let rows = sqlx::query(&format!(
            "select {RESERVATION_COLUMNS} from reservations \
             where reservation_date = $1 and status = 'confirmed' \
             order by start_time, id"
        ))
        .bind(date)
        .fetch_all(&self.pool)
        .await
        .context("list_confirmed failed")?;

        rows.iter().map(reservation_from_row).collect()
    }

    async fn list_checked_in(&self, date: NaiveDate) -> Result<Vec<Reservation>> {
        let rows = sqlx::query(&format!(
            "select {RESERVATION_COLUMNS} from reservations \
             where reservation_date = $1 and status = 'checked_in' \
             order by end_time, id"
        ))
        .bind(date)
        .fetch_all(&self.pool)
        .await
        .context("list_checked_in failed")?;

        rows.iter().map(reservation_from_row).collect()
    }

    async fn fetch_reservation(&self, id: Uuid) -> Result<Option<Reservation>> {
        let row = sqlx::query(&format!(
            "select {RESERVATION_COLUMNS} from reservations where id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .context("fetch_reservation failed")?;

        row.as_ref().map(reservation_from_row).transpose()
    }

    async fn expire_no_show(&self, id: Uuid) -> Result<bool> {
        // The WHERE clause is the atomic guard: a concurrent check-in or an
        // earlier pass leaves zero rows affected.
        let res = sqlx::query(
            r#"
            update reservations
            set status = 'expired',
                fine_applied = true
            where id = $1
              and status = 'confirmed'
              and checked_in_at is null
              and fine_applied = false
            "#,
        )
        .bind(id)
        .execute(&self.pool)
        .await
        .context("expire_no_show update failed")?;

        Ok(res.rows_affected() == 1)
    }

    async fn mark_warning_sent(&self, id: Uuid, flag: WarningFlag) -> Result<bool> {
        let col = flag.column();
        let res = sqlx::query(&format!(
            "update reservations set {col} = true \
             where id = $1 and status = 'confirmed' and {col} = false"
        ))
        .bind(id)
        .execute(&self.pool)
        .await
        .context("mark_warning_sent update failed")?;

        Ok(res.rows_affected() == 1)
    }

    async fn check_in(&self, id: Uuid, date: NaiveDate, at: DateTime<Utc>) -> Result<bool> {
        let res = sqlx::query(
            r#"
            update reservations
            set status = 'checked_in',
                checked_in_at = $2
            where id = $1
              and reservation_date = $3
              and status in ('pending', 'confirmed')
            "#,
        )
        .bind(id)
        .bind(at)
        .bind(date)
        .execute(&self.pool)
        .await
        .context("check_in update failed")?;

        Ok(res.rows_affected() == 1)
    }

    async fn check_out(&self, id: Uuid) -> Result<bool> {
        let res = sqlx::query(
            r#"
            update reservations
            set status = 'completed'
            where id = $1
              and status = 'checked_in'
            "#,
        )
        .bind(id)
        .execute(&self.pool)
        .await
        .context("check_out update failed")?;

        Ok(res.rows_affected() == 1)
    }

    async fn insert_fine(&self, fine: &Fine) -> Result<()> {
        sqlx::query(
            r#"
            insert into fines (
              id, user_id, reservation_id, amount_cents, reason, status, created_at
            ) values (
              $1, $2, $3, $4, $5, $6, $7
            )
            "#,
        )
        .bind(fine.id)
        .bind(fine.user_id)
        .bind(fine.reservation_id)
        .bind(fine.amount_cents)
        .bind(fine.reason.as_str())
        .bind(fine.status.as_str())
        .bind(fine.created_at)
        .execute(&self.pool)
        .await
        .context("insert_fine failed")?;

        Ok(())
    }

    async fn find_pending_fine(
        &self,
        reservation_id: Uuid,
        reason: FineReason,
    ) -> Result<Option<Fine>> {
        let row = sqlx::query(
            r#"
            select id, user_id, reservation_id, amount_cents, reason, status, created_at
            from fines
            where reservation_id = $1 and reason = $2 and status = 'pending'
            "#,
        )
        .bind(reservation_id)
        .bind(reason.as_str())
        .fetch_optional(&self.pool)
        .await
        .context("find_pending_fine failed")?;

        row.as_ref().map(fine_from_row).transpose()
    }

    async fn update_fine_amount(&self, fine_id: Uuid, amount_cents: i64) -> Result<bool> {
        let res = sqlx::query(
            "update fines set amount_cents = $2 where id = $1 and status = 'pending'",
        )
        .bind(fine_id)
        .bind(amount_cents)
        .execute(&self.pool)
        .await
        .context("update_fine_amount failed")?;

        Ok(res.rows_affected() == 1)
    }

    async fn waive_fine(&self, fine_id: Uuid) -> Result<bool> {
        let res =
            sqlx::query("update fines set status = 'waived' where id = $1 and status = 'pending'")
                .bind(fine_id)
                .execute(&self.pool)
                .await
                .context("waive_fine failed")?;

        Ok(res.rows_affected() == 1)
    }

    async fn fetch_fine(&self, fine_id: Uuid) -> Result<Option<Fine>> {
        let row = sqlx::query(
            r#"
            select id, user_id, reservation_id, amount_cents, reason, status, created_at
            from fines
            where id = $1
            "#,
        )
        .bind(fine_id)
        .fetch_optional(&self.pool)
        .await
        .context("fetch_fine failed")?;

        row.as_ref().map(fine_from_row).transpose()
    }

    async fn find_active_alert(
        &self,
        lot_id: Uuid,
        vehicle_plate: &str,
    ) -> Result<Option<OverstayAlert>> {
        let row = sqlx::query(
            r#"
            select id, lot_id, vehicle_plate, entry_time, expected_exit_time,
                   overstay_minutes, status
            from overstay_alerts
            where lot_id = $1 and vehicle_plate = $2 and status = 'active'
            "#,
        )
        .bind(lot_id)
        .bind(vehicle_plate)
        .fetch_optional(&self.pool)
        .await
        .context("find_active_alert failed")?;

        row.as_ref().map(alert_from_row).transpose()
    }

    async fn insert_alert(&self, alert: &OverstayAlert) -> Result<()> {
        sqlx::query(
            r#"
            insert into overstay_alerts (
              id, lot_id, vehicle_plate, entry_time, expected_exit_time,
              overstay_minutes, status
            ) values (
              $1, $2, $3, $4, $5, $6, $7
            )
            "#,
        )
        .bind(alert.id)
        .bind(alert.lot_id)
        .bind(&alert.vehicle_plate)
        .bind(alert.entry_time)
        .bind(alert.expected_exit_time)
        .bind(alert.overstay_minutes)
        .bind(alert.status.as_str())
        .execute(&self.pool)
        .await
        .context("insert_alert failed")?;

        Ok(())
    }

    async fn update_alert_minutes(&self, alert_id: Uuid, overstay_minutes: i64) -> Result<bool> {
        let res = sqlx::query(
            "update overstay_alerts set overstay_minutes = $2 \
             where id = $1 and status = 'active'",
        )
        .bind(alert_id)
        .bind(overstay_minutes)
        .execute(&self.pool)
        .await
        .context("update_alert_minutes failed")?;

        Ok(res.rows_affected() == 1)
    }

    async fn clear_active_alert(&self, lot_id: Uuid, vehicle_plate: &str) -> Result<bool> {
        let res = sqlx::query(
            "update overstay_alerts set status = 'cleared' \
             where lot_id = $1 and vehicle_plate = $2 and status = 'active'",
        )
        .bind(lot_id)
        .bind(vehicle_plate)
        .execute(&self.pool)
        .await
        .context("clear_active_alert failed")?;

        Ok(res.rows_affected() >= 1)
    }
}
