//! Alert-state logic shared by both evaluators.
//!
//! Submodules:
//! - `thresholds`: raw score → `Level` classification.
//! - `transitions`: previous vs current snapshot diff.
//! - `ledger`: already-notified bookkeeping that gates downgrades.
//! - `throttle`: minimum interval between outbound notifications.
pub mod ledger;
pub mod thresholds;
pub mod throttle;
pub mod transitions;

pub use ledger::{LedgerEntry, NotificationLedger};
pub use thresholds::Breakpoints;
pub use throttle::NotificationThrottle;
pub use transitions::{diff, AlertPolicy, Transition, TransitionKind};
