//! Error types
//!
//! Each layer has its own error enum so callers can decide locally whether a
//! failure is recoverable:
//!
//! - [`ProtocolError`]: a malformed or out-of-order signaling message. The
//!   session logs it and keeps going.
//! - [`NegotiationError`]: the media engine refused an SDP step. The session
//!   closes.
//! - [`CandidateError`]: a single ICE candidate could not be applied. Logged,
//!   never fatal.
//! - [`TransportError`]: the client connection broke. Triggers cleanup.
//!
//! [`Error`] wraps all of them for APIs that can fail in more than one way.

use crate::registry::RegistryError;

/// Malformed or unexpected signaling message
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProtocolError {
    /// Frame is not valid JSON or does not match the message schema
    #[error("malformed message: {0}")]
    Malformed(String),

    /// `type` tag is missing or unknown
    #[error("unknown message type: {0}")]
    UnknownType(String),

    /// Message is not allowed in the session's current state or role
    #[error("unexpected {message} message (state: {state}, role: {role})")]
    Unexpected {
        message: &'static str,
        state: &'static str,
        role: &'static str,
    },

    /// A second `role` message arrived
    #[error("role already assigned: {0}")]
    RoleAlreadySet(&'static str),
}

/// Media engine rejected a negotiation step
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum NegotiationError {
    /// SDP could not be parsed or applied
    #[error("malformed SDP: {0}")]
    MalformedSdp(String),

    /// Answer requested before a remote offer was applied
    #[error("no remote offer has been applied")]
    NoRemoteOffer,

    /// Engine was closed underneath the operation
    #[error("media engine is closed")]
    EngineClosed,

    /// Engine could not be created
    #[error("media engine initialization failed: {0}")]
    Init(String),

    /// Any other engine-reported failure
    #[error("media engine error: {0}")]
    Engine(String),
}

/// A single ICE candidate could not be applied
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CandidateError {
    /// Candidate line does not parse
    #[error("malformed candidate: {0}")]
    Malformed(String),

    /// Engine rejected the candidate
    #[error("candidate rejected: {0}")]
    Rejected(String),
}

/// Client connection failure
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    /// Peer went away
    #[error("transport closed")]
    Closed,

    /// Underlying connection reported an error
    #[error("transport error: {0}")]
    Io(String),
}

/// Invalid configuration value
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid port range {0:?}: expected \"low,high\" with 0 < low < high < 65536")]
    PortRange(String),
}

/// Crate-level error
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    #[error(transparent)]
    Negotiation(#[from] NegotiationError),

    #[error(transparent)]
    Candidate(#[from] CandidateError),

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    /// New work refused because shutdown has started
    #[error("shutting down")]
    ShuttingDown,
}

/// Convenience alias for `Result<T, Error>`
pub type Result<T> = std::result::Result<T, Error>;
