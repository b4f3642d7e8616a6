//! Shared session handle
//!
//! The driver task owns the inbound side of a session; everything else
//! (the manager, the server, tests) holds an `Arc<Session>`.

use std::collections::HashSet;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use tokio::sync::{mpsc, watch};
use tokio_util::sync::{CancellationToken, WaitForCancellationFuture};

use super::context::SessionContext;
use super::manager::SessionManager;
use super::state::{CloseReason, Role, SessionId, SessionState};
use crate::engine::{MediaEngine, MediaKind, TrackHandle};
use crate::error::TransportError;
use crate::protocol::{self, ServerMessage};
use crate::registry::{RegistryError, TrackRegistry};
use crate::stats::{SessionCounters, SessionStats};
use crate::transport::Frame;

/// One connected signaling client
pub struct Session {
    id: SessionId,
    peer_addr: Option<SocketAddr>,
    role: Mutex<Role>,
    state: watch::Sender<SessionState>,
    engine: Arc<dyn MediaEngine>,
    outbound: Mutex<Option<mpsc::Sender<Frame>>>,

    /// Kinds this session put in the registry. Held across the registry
    /// call so `close` cannot miss a concurrent publish.
    published: tokio::sync::Mutex<HashSet<MediaKind>>,

    closing: AtomicBool,
    close_reason: Mutex<Option<CloseReason>>,
    cancel: CancellationToken,
    registry: Arc<TrackRegistry>,
    manager: Weak<SessionManager>,
    counters: SessionCounters,
}

impl Session {
    pub(crate) fn new(
        id: SessionId,
        peer_addr: Option<SocketAddr>,
        engine: Arc<dyn MediaEngine>,
        outbound: mpsc::Sender<Frame>,
        registry: Arc<TrackRegistry>,
        manager: Weak<SessionManager>,
    ) -> Self {
        let (state, _) = watch::channel(SessionState::Connecting);

        Self {
            id,
            peer_addr,
            role: Mutex::new(Role::Unassigned),
            state,
            engine,
            outbound: Mutex::new(Some(outbound)),
            published: tokio::sync::Mutex::new(HashSet::new()),
            closing: AtomicBool::new(false),
            close_reason: Mutex::new(None),
            cancel: CancellationToken::new(),
            registry,
            manager,
            counters: SessionCounters::new(),
        }
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn peer_addr(&self) -> Option<SocketAddr> {
        self.peer_addr
    }

    pub fn role(&self) -> Role {
        *self.role.lock()
    }

    pub fn state(&self) -> SessionState {
        *self.state.borrow()
    }

    /// Watch state changes
    pub fn subscribe_state(&self) -> watch::Receiver<SessionState> {
        self.state.subscribe()
    }

    pub fn engine(&self) -> &Arc<dyn MediaEngine> {
        &self.engine
    }

    pub fn registry(&self) -> &Arc<TrackRegistry> {
        &self.registry
    }

    /// Whether cleanup has started
    pub fn is_closing(&self) -> bool {
        self.closing.load(Ordering::Acquire)
    }

    /// Reason given by whoever closed the session first
    pub fn close_reason(&self) -> Option<CloseReason> {
        self.close_reason.lock().clone()
    }

    pub fn stats(&self) -> SessionStats {
        self.counters.snapshot()
    }

    pub(crate) fn counters(&self) -> &SessionCounters {
        &self.counters
    }

    /// Snapshot for logging and inspection
    pub async fn context(&self) -> SessionContext {
        let mut published: Vec<MediaKind> = self.published.lock().await.iter().copied().collect();
        published.sort();

        SessionContext {
            session_id: self.id,
            peer_addr: self.peer_addr,
            role: self.role(),
            state: self.state(),
            published,
            stats: self.stats(),
        }
    }

    pub(crate) fn cancelled(&self) -> WaitForCancellationFuture<'_> {
        self.cancel.cancelled()
    }

    pub(crate) fn set_role(&self, role: Role) {
        *self.role.lock() = role;
    }

    /// Move from `from` to `to`; no-op if the session is elsewhere
    pub(crate) fn advance(&self, from: SessionState, to: SessionState) -> bool {
        self.state.send_if_modified(|state| {
            if *state == from {
                *state = to;
                true
            } else {
                false
            }
        })
    }

    /// Send a signaling message to the client
    pub(crate) async fn send(&self, msg: ServerMessage) -> Result<(), TransportError> {
        let tx = self.outbound.lock().clone().ok_or(TransportError::Closed)?;

        tracing::debug!(session_id = %self.id, message = msg.name(), "Sending signaling message");
        tx.send(Frame::Text(protocol::encode(&msg)))
            .await
            .map_err(|_| TransportError::Closed)?;
        self.counters.message_sent();
        Ok(())
    }

    /// Publish a track received from this session's client
    ///
    /// Does nothing once the session is closing.
    pub(crate) async fn publish_track(
        &self,
        handle: TrackHandle,
    ) -> Result<Option<SessionId>, RegistryError> {
        let kind = handle.kind();
        let mut published = self.published.lock().await;

        if self.is_closing() {
            tracing::debug!(session_id = %self.id, kind = %kind, "Session closing, track not published");
            return Ok(None);
        }

        let preempted = self.registry.publish(kind, self.id, handle).await?;
        published.insert(kind);
        self.counters.track_published();
        Ok(preempted)
    }

    /// Tear the session down
    ///
    /// Only the first call does the work: it closes the engine, releases
    /// the registry slots this session still owns, closes the transport and
    /// removes the session from its manager. Returns whether this call was
    /// the one that closed the session. Use [`closed`](Self::closed) to wait
    /// for completion.
    pub async fn close(&self, reason: CloseReason) -> bool {
        if self.closing.swap(true, Ordering::AcqRel) {
            return false;
        }

        let previous = self.state.send_replace(SessionState::Closing);
        tracing::info!(
            session_id = %self.id,
            role = %self.role(),
            state = %previous,
            reason = %reason,
            "Closing session"
        );
        *self.close_reason.lock() = Some(reason);
        self.cancel.cancel();

        self.engine.close().await;

        {
            let mut published = self.published.lock().await;
            for kind in published.drain() {
                self.registry.release(kind, self.id).await;
            }
        }

        let outbound = self.outbound.lock().take();
        if let Some(tx) = outbound {
            let _ = tx.try_send(Frame::Close);
        }

        if let Some(manager) = self.manager.upgrade() {
            manager.remove_session(self.id).await;
        }

        self.state.send_replace(SessionState::Closed);

        let stats = self.stats();
        tracing::debug!(
            session_id = %self.id,
            messages_received = stats.messages_received,
            messages_sent = stats.messages_sent,
            protocol_errors = stats.protocol_errors,
            duration_ms = stats.duration.as_millis() as u64,
            "Session closed"
        );
        true
    }

    /// Wait until cleanup has finished
    pub async fn closed(&self) {
        let mut rx = self.state.subscribe();
        let _ = rx.wait_for(|state| *state == SessionState::Closed).await;
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("role", &self.role())
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}
