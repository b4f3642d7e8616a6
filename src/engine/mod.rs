//! Media engine adapter
//!
//! The core never touches ICE, DTLS or SDP internals. Everything it needs
//! from the media stack goes through [`MediaEngine`], one instance per
//! session, created by an [`EngineFactory`].
//!
//! Engine callbacks (track arrival, connection state, locally gathered
//! candidates) are not closures into session state. The factory hands each
//! engine an [`EngineEventSender`]; the session driver reads the other end
//! in the same `select!` loop as client messages, so engine events and
//! protocol messages are serialized per session.
//!
//! ```text
//!   client ──► Session driver ──► MediaEngine (create_offer, ...)
//!                  ▲                    │
//!                  └── EngineEvent ◄────┘  (mpsc)
//! ```

pub mod description;
pub mod loopback;
#[cfg(feature = "webrtc")]
pub mod rtc;
pub mod track;

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::error::{CandidateError, NegotiationError};
use crate::session::SessionId;

pub use description::{ConnectionState, IceCandidate, SdpType, SessionDescription};
pub use loopback::{LoopbackEngine, LoopbackFactory};
pub use track::{MediaKind, TrackHandle};

/// Capacity of the per-session engine event channel
pub const ENGINE_EVENT_CAPACITY: usize = 64;

/// Asynchronous notification from an engine to its session
#[derive(Debug, Clone)]
pub enum EngineEvent {
    /// Remote peer started sending a track
    TrackReceived(TrackHandle),
    /// Peer connection changed state
    ConnectionStateChanged(ConnectionState),
    /// Engine gathered a local candidate that must be trickled to the client
    LocalCandidate(IceCandidate),
}

/// Sending half handed to engines
pub type EngineEventSender = mpsc::Sender<EngineEvent>;

/// Receiving half read by the session driver
pub type EngineEventReceiver = mpsc::Receiver<EngineEvent>;

/// Create the event channel for one engine
pub fn event_channel() -> (EngineEventSender, EngineEventReceiver) {
    mpsc::channel(ENGINE_EVENT_CAPACITY)
}

/// Negotiation interface the session depends on
///
/// Every method may suspend. Implementations must tolerate calls after
/// [`close`](Self::close) by failing with [`NegotiationError::EngineClosed`].
#[async_trait]
pub trait MediaEngine: Send + Sync {
    /// Create an SDP offer for the tracks attached so far
    async fn create_offer(&self) -> Result<String, NegotiationError>;

    /// Create an SDP answer to the applied remote offer
    async fn create_answer(&self) -> Result<String, NegotiationError>;

    async fn set_local_description(&self, desc: SessionDescription) -> Result<(), NegotiationError>;

    async fn set_remote_description(&self, desc: SessionDescription) -> Result<(), NegotiationError>;

    /// Apply a remote candidate
    ///
    /// The end-of-candidates marker is accepted as a no-op.
    async fn add_ice_candidate(&self, candidate: IceCandidate) -> Result<(), CandidateError>;

    /// Send a published track to this peer
    async fn attach_track(&self, track: &TrackHandle) -> Result<(), NegotiationError>;

    /// Stop sending a previously attached track
    async fn detach_track(&self, track: &TrackHandle) -> Result<(), NegotiationError>;

    /// Release all engine resources (idempotent)
    async fn close(&self);
}

/// Builds one engine per session
#[async_trait]
pub trait EngineFactory: Send + Sync + 'static {
    async fn create(
        &self,
        session_id: SessionId,
        events: EngineEventSender,
    ) -> Result<Arc<dyn MediaEngine>, NegotiationError>;
}
