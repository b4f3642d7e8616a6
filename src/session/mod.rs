//! Signaling sessions
//!
//! A session is one connected client: its role, its negotiation state and
//! the media engine that represents it. Sessions live in a
//! [`SessionManager`] from connect until cleanup.
//!
//! ```text
//!   connecting ──role──► negotiating ──engine connected──► connected
//!        │                    │                               │
//!        └────────────────────┴──── hangup / error / timeout ─┴──► closing ──► closed
//! ```

pub mod config;
pub mod context;
mod driver;
pub mod handle;
pub mod manager;
pub mod state;

pub use config::SessionConfig;
pub use context::SessionContext;
pub use handle::Session;
pub use manager::SessionManager;
pub use state::{check_message, CloseReason, Role, SessionId, SessionState};
