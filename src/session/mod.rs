//! Voice session lifecycle management
//!
//! This module provides the `SessionManager` abstraction that manages:
//! - Budget checks against the usage ledger before connecting
//! - Connection establishment through the signaling client
//! - The per-session budget clock and telemetry sampler
//! - Event processing and caller notifications
//! - Ordered teardown and usage persistence

mod clock;
mod config;
mod driver;
mod ledger;
mod manager;
mod stats;

pub use clock::BudgetClock;
pub(crate) use clock::MIN_PERIOD;
pub use config::SessionConfig;
pub use ledger::{InMemoryUsageLedger, UsageLedger};
pub use manager::{Collaborators, SessionManager};
pub use stats::{EndReason, LifecycleEvent, SessionEvent, SessionState, SessionStats};
