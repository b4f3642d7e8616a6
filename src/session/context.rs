//! Session context
//!
//! Read-only view of a session for logging, stats and callers outside the
//! driver task.

use std::net::SocketAddr;

use super::state::{Role, SessionId, SessionState};
use crate::engine::MediaKind;
use crate::stats::SessionStats;

/// Snapshot of one session
#[derive(Debug, Clone)]
pub struct SessionContext {
    /// Unique session ID
    pub session_id: SessionId,

    /// Remote peer address, if the transport has one
    pub peer_addr: Option<SocketAddr>,

    /// Role picked by the client
    pub role: Role,

    /// Lifecycle state
    pub state: SessionState,

    /// Kinds this session has published
    pub published: Vec<MediaKind>,

    /// Counters at the time of the snapshot
    pub stats: SessionStats,
}

impl SessionContext {
    pub fn is_publisher(&self) -> bool {
        self.role == Role::Publisher
    }

    pub fn is_subscriber(&self) -> bool {
        self.role == Role::Subscriber
    }
}
