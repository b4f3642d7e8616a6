//! Session, relay and server statistics

pub mod metrics;

pub use metrics::{RelayCounters, RelayStats, ServerStats, SessionCounters, SessionStats};
