//! Session manager
//!
//! Owns every live session, brokers their cleanup and closes them all at
//! shutdown.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use futures_util::future::join_all;
use tokio::sync::RwLock;

use super::config::SessionConfig;
use super::driver::Driver;
use super::handle::Session;
use super::state::{CloseReason, SessionId};
use crate::engine::{event_channel, EngineFactory};
use crate::error::{Error, Result};
use crate::registry::TrackRegistry;
use crate::transport::Transport;

/// Registry of live signaling sessions
pub struct SessionManager {
    sessions: RwLock<HashMap<SessionId, Arc<Session>>>,
    next_session_id: AtomicU64,
    /// Set by `shutdown` under the sessions write lock
    shutting_down: AtomicBool,
    registry: Arc<TrackRegistry>,
    engines: Arc<dyn EngineFactory>,
    config: SessionConfig,
}

impl SessionManager {
    pub fn new(
        registry: Arc<TrackRegistry>,
        engines: Arc<dyn EngineFactory>,
        config: SessionConfig,
    ) -> Arc<Self> {
        Arc::new(Self {
            sessions: RwLock::new(HashMap::new()),
            next_session_id: AtomicU64::new(1),
            shutting_down: AtomicBool::new(false),
            registry,
            engines,
            config,
        })
    }

    /// Shared track registry
    pub fn registry(&self) -> &Arc<TrackRegistry> {
        &self.registry
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Start a session on `transport`
    ///
    /// Builds the media engine, registers the session in `connecting` and
    /// spawns its driver. Fails if the engine cannot be created or once
    /// [`shutdown`](Self::shutdown) has started; the transport is dropped
    /// in both cases.
    pub async fn create_session(self: &Arc<Self>, transport: Transport) -> Result<Arc<Session>> {
        if self.is_shutting_down() {
            return Err(Error::ShuttingDown);
        }

        let id = SessionId::new(self.next_session_id.fetch_add(1, Ordering::Relaxed));
        let (events_tx, events_rx) = event_channel();

        let engine = match self.engines.create(id, events_tx).await {
            Ok(engine) => engine,
            Err(e) => {
                tracing::error!(session_id = %id, error = %e, "Failed to create media engine");
                return Err(e.into());
            }
        };

        let Transport {
            inbound,
            outbound,
            peer_addr,
        } = transport;

        let session = Arc::new(Session::new(
            id,
            peer_addr,
            engine,
            outbound,
            Arc::clone(&self.registry),
            Arc::downgrade(self),
        ));

        {
            let mut sessions = self.sessions.write().await;
            if self.is_shutting_down() {
                drop(sessions);
                tracing::debug!(session_id = %id, "Session refused: shutting down");
                session.engine().close().await;
                return Err(Error::ShuttingDown);
            }
            sessions.insert(id, Arc::clone(&session));
        }

        tracing::info!(session_id = %id, peer = ?peer_addr, "Session created");

        let driver = Driver::new(
            Arc::clone(&session),
            inbound,
            events_rx,
            self.config.negotiation_timeout,
        );
        tokio::spawn(driver.run());

        Ok(session)
    }

    /// Forget a session
    ///
    /// Called by session cleanup; removing an unknown id is a no-op.
    pub async fn remove_session(&self, id: SessionId) -> Option<Arc<Session>> {
        let removed = self.sessions.write().await.remove(&id);
        if removed.is_some() {
            tracing::debug!(session_id = %id, "Session removed");
        }
        removed
    }

    pub async fn get(&self, id: SessionId) -> Option<Arc<Session>> {
        self.sessions.read().await.get(&id).cloned()
    }

    /// Number of live sessions
    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.sessions.read().await.is_empty()
    }

    /// Ids of live sessions, ascending
    pub async fn session_ids(&self) -> Vec<SessionId> {
        let mut ids: Vec<SessionId> = self.sessions.read().await.keys().copied().collect();
        ids.sort();
        ids
    }

    /// Whether [`shutdown`](Self::shutdown) has been called
    pub fn is_shutting_down(&self) -> bool {
        self.shutting_down.load(Ordering::Acquire)
    }

    /// Close every live session and wait for all cleanups
    ///
    /// Sessions requested after this starts are refused.
    pub async fn shutdown(&self) {
        let sessions: Vec<Arc<Session>> = {
            let sessions = self.sessions.write().await;
            self.shutting_down.store(true, Ordering::Release);
            sessions.values().cloned().collect()
        };
        if sessions.is_empty() {
            return;
        }

        tracing::info!(sessions = sessions.len(), "Closing all sessions");

        join_all(sessions.iter().map(|session| async move {
            session.close(CloseReason::Shutdown).await;
            session.closed().await;
        }))
        .await;

        tracing::info!("All sessions closed");
    }
}
