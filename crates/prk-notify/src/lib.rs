//! Notification dispatcher boundary.
//!
//! This crate defines **only** the notification payload, the dispatcher
//! trait and its implementations. No scheduling, no store access, no
//! decision logic belongs here — the reconcilers decide *whether* to
//! notify, this crate decides *how*.
//!
//! Delivery is fire-and-forget from the engine's perspective: a failed
//! send is logged and surfaced as an error for the batch summary, never
//! retried here. The idempotency flags in the store make the next tick
//! skip anything that was actually delivered.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Mutex;
use uuid::Uuid;

use prk_schemas::{FineReason, Reservation};

// ---------------------------------------------------------------------------
// NotificationKind
// ---------------------------------------------------------------------------

/// The templates the engine can send.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    /// Reservation expired as a no-show (fine attached).
    NoShowExpiry,
    /// Reservation ends within 30 minutes.
    ExpiringSoon30,
    /// Reservation ends within 15 minutes.
    ExpiringSoon15,
    /// A new overstay fine was issued.
    OverstayFine,
}

impl NotificationKind {
    pub fn template_id(&self) -> &'static str {
        match self {
            NotificationKind::NoShowExpiry => "reservation_expired_no_show",
            NotificationKind::ExpiringSoon30 => "reservation_expiring_30",
            NotificationKind::ExpiringSoon15 => "reservation_expiring_15",
            NotificationKind::OverstayFine => "overstay_fine_issued",
        }
    }
}

// ---------------------------------------------------------------------------
// Notification
// ---------------------------------------------------------------------------

/// A rendered message, ready for the transport.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    /// Recipient user id; the transport resolves the actual address.
    pub user_id: Uuid,
    pub reservation_id: Uuid,
    pub kind: NotificationKind,
    pub subject: String,
    pub body: String,
}

/// Render the message for `kind` against a reservation.
///
/// `fine_cents` is attached for the kinds that carry a monetary figure.
pub fn render(kind: NotificationKind, r: &Reservation, fine_cents: Option<i64>) -> Notification {
    let window = format!(
        "{} {}–{}",
        r.reservation_date,
        r.start_time.format("%H:%M"),
        r.end_time.format("%H:%M")
    );
    let (subject, body) = match kind {
        NotificationKind::NoShowExpiry => (
            "Reservation expired — no-show fine issued".to_string(),
            format!(
                "Your parking reservation ({window}, vehicle {}) expired because no \
                 check-in was recorded. A fine of {} has been issued ({}).",
                r.vehicle_plate,
                cents(fine_cents.unwrap_or(0)),
                FineReason::NoShow.as_str(),
            ),
        ),
        NotificationKind::ExpiringSoon30 => (
            "Your parking reservation ends in 30 minutes".to_string(),
            format!(
                "Reservation {window} for vehicle {} ends soon. Please return to \
                 your vehicle or extend your stay.",
                r.vehicle_plate
            ),
        ),
        NotificationKind::ExpiringSoon15 => (
            "Urgent: your parking reservation ends in 15 minutes".to_string(),
            format!(
                "Reservation {window} for vehicle {} is about to end. Overstay \
                 fines apply after the grace period.",
                r.vehicle_plate
            ),
        ),
        NotificationKind::OverstayFine => (
            "Overstay fine issued".to_string(),
            format!(
                "Vehicle {} has overstayed reservation {window}. A fine of {} has \
                 been issued and will grow with continued occupancy.",
                r.vehicle_plate,
                cents(fine_cents.unwrap_or(0)),
            ),
        ),
    };

    Notification {
        user_id: r.user_id,
        reservation_id: r.id,
        kind,
        subject,
        body,
    }
}

fn cents(amount: i64) -> String {
    format!("${}.{:02}", amount / 100, amount % 100)
}

// ---------------------------------------------------------------------------
// DispatchError
// ---------------------------------------------------------------------------

#[derive(Debug)]
pub enum DispatchError {
    /// Network or transport failure.
    Transport(String),
    /// The transport endpoint returned a non-success status.
    Endpoint { status: u16, message: String },
    /// Missing/invalid dispatcher configuration.
    Config(String),
}

impl fmt::Display for DispatchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DispatchError::Transport(m) => write!(f, "notification transport error: {m}"),
            DispatchError::Endpoint { status, message } => {
                write!(f, "notification endpoint refused ({status}): {message}")
            }
            DispatchError::Config(m) => write!(f, "notification config error: {m}"),
        }
    }
}

impl std::error::Error for DispatchError {}

// ---------------------------------------------------------------------------
// Dispatcher
// ---------------------------------------------------------------------------

/// Transport seam. Implementations must be cheap to call concurrently.
#[async_trait]
pub trait Dispatcher: Send + Sync {
    async fn send(&self, notification: &Notification) -> Result<(), DispatchError>;
}

// ---------------------------------------------------------------------------
// WebhookDispatcher
// ---------------------------------------------------------------------------

/// POSTs each notification as JSON to the municipal messaging relay, which
/// owns address resolution and email/SMS fan-out.
pub struct WebhookDispatcher {
    client: reqwest::Client,
    endpoint: String,
}

impl WebhookDispatcher {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint: endpoint.into(),
        }
    }

    /// Build from `PRK_NOTIFY_ENDPOINT`.
    pub fn from_env() -> Result<Self, DispatchError> {
        let endpoint = std::env::var("PRK_NOTIFY_ENDPOINT")
            .map_err(|_| DispatchError::Config("missing env var PRK_NOTIFY_ENDPOINT".into()))?;
        Ok(Self::new(endpoint))
    }
}

#[async_trait]
impl Dispatcher for WebhookDispatcher {
    async fn send(&self, notification: &Notification) -> Result<(), DispatchError> {
        let resp = self
            .client
            .post(&self.endpoint)
            .json(notification)
            .send()
            .await
            .map_err(|e| DispatchError::Transport(e.to_string()))?;

        let status = resp.status();
        if !status.is_success() {
            let message = resp.text().await.unwrap_or_default();
            tracing::warn!(
                status = status.as_u16(),
                template = notification.kind.template_id(),
                "notification endpoint refused"
            );
            return Err(DispatchError::Endpoint {
                status: status.as_u16(),
                message,
            });
        }

        tracing::debug!(
            template = notification.kind.template_id(),
            reservation = %notification.reservation_id,
            "notification dispatched"
        );
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// RecordingDispatcher
// ---------------------------------------------------------------------------

/// Test double: records everything, delivers nothing.
#[derive(Default)]
pub struct RecordingDispatcher {
    sent: Mutex<Vec<Notification>>,
    fail: Mutex<bool>,
}

impl RecordingDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sent(&self) -> Vec<Notification> {
        self.sent.lock().expect("dispatcher poisoned").clone()
    }

    pub fn sent_count(&self) -> usize {
        self.sent.lock().expect("dispatcher poisoned").len()
    }

    pub fn count_of(&self, kind: NotificationKind) -> usize {
        self.sent
            .lock()
            .expect("dispatcher poisoned")
            .iter()
            .filter(|n| n.kind == kind)
            .count()
    }

    /// Make every subsequent send fail with a transport error.
    pub fn fail_all(&self, fail: bool) {
        *self.fail.lock().expect("dispatcher poisoned") = fail;
    }
}

#[async_trait]
impl Dispatcher for RecordingDispatcher {
    async fn send(&self, notification: &Notification) -> Result<(), DispatchError> {
        if *self.fail.lock().expect("dispatcher poisoned") {
            return Err(DispatchError::Transport("injected send failure".into()));
        }
        self.sent
            .lock()
            .expect("dispatcher poisoned")
            .push(notification.clone());
        Ok(())
    }
}
