//! WebSocket server
//!
//! One TCP listener serves three endpoints:
//!
//! - `/ws`: signaling sessions (JSON offer/answer/candidate exchange)
//! - `/pub`: binary relay publisher
//! - `/sub`: binary relay subscriber
//!
//! Any other path is refused with HTTP 404 during the upgrade.

pub mod config;
pub mod listener;

pub use config::{PortRange, ServerConfig, ServerPaths};
pub use listener::RelayServer;
