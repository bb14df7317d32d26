//! Shared runtime state for prk-daemon.
//!
//! All types here are `Clone`-able (via `Arc` or copy). Handlers receive
//! `State<Arc<AppState>>` from Axum; this module owns nothing async itself.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::{error, info};

use prk_gate::{FineLedger, Gate};
use prk_notify::{Dispatcher, WebhookDispatcher};
use prk_policy::{Clock, Policy, SystemClock};
use prk_reconcile::{ExpirySummary, OverstaySummary, Reconciler};
use prk_store::RecordStore;

// ---------------------------------------------------------------------------
// BuildInfo
// ---------------------------------------------------------------------------

/// Static build metadata included in health / status responses.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct BuildInfo {
    pub service: &'static str,
    pub version: &'static str,
}

// ---------------------------------------------------------------------------
// StatusSnapshot
// ---------------------------------------------------------------------------

/// Point-in-time snapshot of daemon state, returned by GET /v1/status.
/// Last-run summaries cover both trigger paths: HTTP and the interval tasks.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct StatusSnapshot {
    pub daemon_uptime_secs: u64,
    pub last_expiry_run_at: Option<DateTime<Utc>>,
    pub last_expiry_summary: Option<ExpirySummary>,
    pub last_overstay_run_at: Option<DateTime<Utc>>,
    pub last_overstay_summary: Option<OverstaySummary>,
}

// ---------------------------------------------------------------------------
// AppState
// ---------------------------------------------------------------------------

/// Cloneable (Arc) handle shared across all Axum handlers.
#[derive(Clone)]
pub struct AppState {
    pub build: BuildInfo,
    pub clock: Arc<dyn Clock>,
    pub reconciler: Reconciler,
    pub gate: Gate,
    pub ledger: FineLedger,
    /// Mutable last-run state.
    pub status: Arc<RwLock<StatusSnapshot>>,
    /// Process start anchor for uptime reporting.
    started_at: std::time::Instant,
}

impl AppState {
    pub fn new(
        store: Arc<dyn RecordStore>,
        dispatcher: Arc<dyn Dispatcher>,
        clock: Arc<dyn Clock>,
        policy: Policy,
    ) -> Self {
        let reconciler = Reconciler::new(
            store.clone(),
            dispatcher,
            clock.clone(),
            policy,
        )
        .with_row_timeout(row_timeout_from_env());

        Self {
            build: BuildInfo {
                service: "prk-daemon",
                version: env!("CARGO_PKG_VERSION"),
            },
            clock: clock.clone(),
            reconciler,
            gate: Gate::new(store.clone(), clock),
            ledger: FineLedger::new(store),
            status: Arc::new(RwLock::new(StatusSnapshot::default())),
            started_at: std::time::Instant::now(),
        }
    }

    /// Seconds since this state was built in `main`, i.e. process start.
    pub fn uptime_secs(&self) -> u64 {
        self.started_at.elapsed().as_secs()
    }

    /// Production wiring: Postgres store (migrations applied), webhook
    /// dispatcher, wall clock, policy from the environment.
    pub async fn from_env() -> anyhow::Result<Self> {
        let pool = prk_store::connect_from_env().await?;
        prk_store::migrate(&pool).await?;
        let store = Arc::new(prk_store::PgStore::new(pool));

        let dispatcher =
            Arc::new(WebhookDispatcher::from_env().context("notification dispatcher config")?);

        Ok(Self::new(
            store,
            dispatcher,
            Arc::new(SystemClock),
            Policy::from_env(),
        ))
    }

    pub async fn record_expiry_run(&self, summary: &ExpirySummary) {
        let mut s = self.status.write().await;
        s.last_expiry_run_at = Some(self.clock.now());
        s.last_expiry_summary = Some(summary.clone());
    }

    pub async fn record_overstay_run(&self, summary: &OverstaySummary) {
        let mut s = self.status.write().await;
        s.last_overstay_run_at = Some(self.clock.now());
        s.last_overstay_summary = Some(summary.clone());
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn row_timeout_from_env() -> Duration {
    let secs = std::env::var("PRK_ROW_TIMEOUT_SECS")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(10u64);
    Duration::from_secs(secs)
}

/// Interval from an env var in whole seconds; `None` (disabled) when unset,
/// unparsable or zero. The external cron is the primary trigger, these
/// interval tasks are a belt for deployments without one.
pub fn interval_from_env(key: &str) -> Option<Duration> {
    let secs: u64 = std::env::var(key).ok()?.parse().ok()?;
    if secs == 0 {
        return None;
    }
    Some(Duration::from_secs(secs))
}

/// Spawn a background task running the expiry pass every `interval`.
pub fn spawn_expiry_tick(state: Arc<AppState>, interval: Duration) {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        loop {
            ticker.tick().await;
            match state.reconciler.run_expiry_pass().await {
                Ok(summary) => {
                    state.record_expiry_run(&summary).await;
                }
                Err(e) => error!(error = %format!("{e:#}"), "expiry tick failed"),
            }
        }
    });
    info!(interval_secs = interval.as_secs(), "expiry tick scheduled");
}

/// Spawn a background task running the overstay pass every `interval`.
pub fn spawn_overstay_tick(state: Arc<AppState>, interval: Duration) {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        loop {
            ticker.tick().await;
            match state.reconciler.run_overstay_pass().await {
                Ok(summary) => {
                    state.record_overstay_run(&summary).await;
                }
                Err(e) => error!(error = %format!("{e:#}"), "overstay tick failed"),
            }
        }
    });
    info!(interval_secs = interval.as_secs(), "overstay tick scheduled");
}
