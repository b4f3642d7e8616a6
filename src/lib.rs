//! WebRTC signaling coordinator and single-publisher fan-out relay
//!
//! Clients connect over WebSocket and pick a role. A publisher offers its
//! media; the relay answers and records the tracks it receives in a shared
//! [`TrackRegistry`](registry::TrackRegistry). A subscriber gets an offer
//! that carries whatever tracks are live at that moment. A separate pair of
//! endpoints relays opaque binary frames from publishers to every connected
//! subscriber without any negotiation.
//!
//! # Architecture
//!
//! ```text
//!                      RelayServer (accept loop, path routing)
//!                 ┌───────────────┼──────────────────────┐
//!                 ▼               ▼                      ▼
//!               /ws             /pub                   /sub
//!                 │               │                      │
//!         SessionManager     serve_publisher       serve_subscriber
//!                 │               └──► RelayHub ◄────────┘
//!        Session (driver task)
//!           │           │
//!     MediaEngine   TrackRegistry
//! ```
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use signal_relay::engine::LoopbackFactory;
//! use signal_relay::server::{RelayServer, ServerConfig};
//!
//! #[tokio::main]
//! async fn main() -> signal_relay::Result<()> {
//!     let server = RelayServer::new(ServerConfig::default(), Arc::new(LoopbackFactory::new()));
//!     server
//!         .run_until(async {
//!             let _ = tokio::signal::ctrl_c().await;
//!         })
//!         .await
//! }
//! ```

pub mod engine;
pub mod error;
pub mod protocol;
pub mod registry;
pub mod relay;
pub mod server;
pub mod session;
pub mod stats;
pub mod transport;

pub use error::{Error, Result};
pub use registry::{PublishPolicy, RegistryConfig, TrackRegistry};
pub use server::{RelayServer, ServerConfig};
pub use session::{Session, SessionConfig, SessionId, SessionManager};
