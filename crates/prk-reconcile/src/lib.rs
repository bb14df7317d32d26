//! prk-reconcile
//!
//! The reservation lifecycle reconcilers:
//!
//! - **Expiry pass** over today's `confirmed` reservations: no-show expiry
//!   with a 50% fine, plus the 30- and 15-minute pre-expiry warnings.
//! - **Overstay pass** over today's `checked_in` reservations: active
//!   alert upsert and the escalating block-based fine.
//!
//! Architectural decisions:
//! - Per-row *decisions* are pure functions of (reservation, now, policy);
//!   all IO happens in the pass drivers.
//! - Every side effect is guarded by a conditional store update; a pass
//!   that loses the guard performs no side effect, so overlapping passes
//!   converge without duplicate fines or notifications.
//! - A row failure is logged and collected; it never aborts the batch.
//!   Only a failed batch read is fatal.

mod engine;
mod pass;
mod types;

pub use engine::{decide_expiry, decide_overstay, ExpiryDecision, OverstayDecision};
pub use pass::Reconciler;
pub use types::{ExpirySummary, OverstaySummary};
