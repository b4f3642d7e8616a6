//! Session state machine
//!
//! Tracks a signaling session from connection to cleanup and decides which
//! client messages are acceptable at each point.

use std::fmt;

use crate::engine::ConnectionState;
use crate::error::{ProtocolError, TransportError};
use crate::protocol::{ClientMessage, RoleRequest};

/// Identifier of one client session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SessionId(u64);

impl SessionId {
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Role a client plays, fixed by its first `role` message
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Unassigned,
    Publisher,
    Subscriber,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Unassigned => "unassigned",
            Role::Publisher => "publisher",
            Role::Subscriber => "subscriber",
        }
    }
}

impl From<RoleRequest> for Role {
    fn from(req: RoleRequest) -> Self {
        match req {
            RoleRequest::Publisher => Role::Publisher,
            RoleRequest::Subscriber => Role::Subscriber,
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Session lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Transport open, waiting for a role
    Connecting,
    /// Offer/answer exchange in progress
    Negotiating,
    /// Media engine reports the peer connection is up
    Connected,
    /// Cleanup in progress
    Closing,
    /// Cleanup complete
    Closed,
}

impl SessionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionState::Connecting => "connecting",
            SessionState::Negotiating => "negotiating",
            SessionState::Connected => "connected",
            SessionState::Closing => "closing",
            SessionState::Closed => "closed",
        }
    }

    /// Whether the negotiation deadline still applies
    pub fn is_pending(&self) -> bool {
        matches!(self, SessionState::Connecting | SessionState::Negotiating)
    }

    pub fn is_open(&self) -> bool {
        !matches!(self, SessionState::Closing | SessionState::Closed)
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why a session was closed
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CloseReason {
    /// Client sent `hangup`
    Hangup,
    /// Client closed the connection
    TransportClosed,
    /// Connection failed
    TransportError(TransportError),
    /// Engine reported a terminal connection state
    EngineState(ConnectionState),
    /// An SDP step failed
    NegotiationFailed(String),
    /// Not connected within the negotiation timeout
    NegotiationTimeout,
    /// Server shutting down
    Shutdown,
}

impl fmt::Display for CloseReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CloseReason::Hangup => write!(f, "hangup"),
            CloseReason::TransportClosed => write!(f, "transport closed"),
            CloseReason::TransportError(e) => write!(f, "{}", e),
            CloseReason::EngineState(state) => write!(f, "peer connection {}", state),
            CloseReason::NegotiationFailed(e) => write!(f, "negotiation failed: {}", e),
            CloseReason::NegotiationTimeout => write!(f, "negotiation timed out"),
            CloseReason::Shutdown => write!(f, "server shutdown"),
        }
    }
}

/// Check `message` against the transition table
///
/// | message     | accepted when                               |
/// |-------------|---------------------------------------------|
/// | `role`      | state `connecting`, role unassigned         |
/// | `offer`     | role `publisher`, state `negotiating`       |
/// | `answer`    | role `subscriber`, state `negotiating`      |
/// | `candidate` | state `negotiating` or `connected`          |
/// | `hangup`    | always                                      |
pub fn check_message(
    message: &ClientMessage,
    state: SessionState,
    role: Role,
) -> Result<(), ProtocolError> {
    let allowed = match message {
        ClientMessage::Role(_) => {
            if role != Role::Unassigned {
                return Err(ProtocolError::RoleAlreadySet(role.as_str()));
            }
            state == SessionState::Connecting
        }
        ClientMessage::Offer { .. } => {
            role == Role::Publisher && state == SessionState::Negotiating
        }
        ClientMessage::Answer { .. } => {
            role == Role::Subscriber && state == SessionState::Negotiating
        }
        ClientMessage::Candidate(_) => {
            matches!(state, SessionState::Negotiating | SessionState::Connected)
        }
        ClientMessage::Hangup => true,
    };

    if allowed {
        Ok(())
    } else {
        Err(ProtocolError::Unexpected {
            message: message.name(),
            state: state.as_str(),
            role: role.as_str(),
        })
    }
}
