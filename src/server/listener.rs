//! Server listener
//!
//! Handles the TCP accept loop, upgrades connections to WebSocket and routes
//! them by request path to a signaling session or the binary relay.

use std::future::Future;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::protocol::WebSocketConfig;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

use crate::engine::EngineFactory;
use crate::error::{Error, Result};
use crate::registry::TrackRegistry;
use crate::relay::{self, RelayHub};
use crate::server::config::{ServerConfig, ServerPaths};
use crate::session::SessionManager;
use crate::stats::ServerStats;
use crate::transport::websocket;

#[derive(Debug, Default)]
struct ConnectionCounters {
    total: AtomicU64,
    rejected: AtomicU64,
}

/// Everything a connection task needs
#[derive(Clone)]
struct ConnectionContext {
    manager: Arc<SessionManager>,
    hub: Arc<RelayHub>,
    paths: ServerPaths,
    ws_config: WebSocketConfig,
    handshake_timeout: std::time::Duration,
    queue: usize,
    shutdown: CancellationToken,
}

/// Signaling and relay server
pub struct RelayServer {
    config: ServerConfig,
    manager: Arc<SessionManager>,
    hub: Arc<RelayHub>,
    connection_semaphore: Option<Arc<Semaphore>>,
    counters: Arc<ConnectionCounters>,
    started_at: Instant,
    connections: TaskTracker,
    shutdown: CancellationToken,
}

impl RelayServer {
    /// Create a new server using `engines` to build one media engine per session
    pub fn new(config: ServerConfig, engines: Arc<dyn EngineFactory>) -> Self {
        let connection_semaphore = if config.max_connections > 0 {
            Some(Arc::new(Semaphore::new(config.max_connections)))
        } else {
            None
        };

        let registry = Arc::new(TrackRegistry::with_config(config.registry.clone()));
        let manager = SessionManager::new(registry, engines, config.session.clone());
        let hub = Arc::new(RelayHub::new(config.relay_capacity));

        Self {
            config,
            manager,
            hub,
            connection_semaphore,
            counters: Arc::new(ConnectionCounters::default()),
            started_at: Instant::now(),
            connections: TaskTracker::new(),
            shutdown: CancellationToken::new(),
        }
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Get a reference to the session manager
    pub fn manager(&self) -> &Arc<SessionManager> {
        &self.manager
    }

    /// Get a reference to the track registry
    pub fn registry(&self) -> &Arc<TrackRegistry> {
        self.manager.registry()
    }

    /// Get a reference to the binary relay hub
    pub fn hub(&self) -> &Arc<RelayHub> {
        &self.hub
    }

    /// Get the bind address
    pub fn bind_addr(&self) -> SocketAddr {
        self.config.bind_addr
    }

    /// Current server-wide counters
    pub async fn stats(&self) -> ServerStats {
        collect_stats(&self.manager, &self.hub, &self.counters, self.started_at).await
    }

    /// Run the server until the process is killed
    pub async fn run(&self) -> Result<()> {
        self.run_until(std::future::pending()).await
    }

    /// Run the server with graceful shutdown
    ///
    /// When `shutdown` resolves the accept loop stops, every live session is
    /// closed and every connection task (handshakes in flight, relay
    /// publishers and subscribers) has finished before this returns.
    pub async fn run_until<F>(&self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()>,
    {
        let listener = TcpListener::bind(self.config.bind_addr).await?;
        self.serve(listener, shutdown).await
    }

    /// Serve on an already bound listener
    pub async fn serve<F>(&self, listener: TcpListener, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()>,
    {
        tracing::info!(
            addr = %listener.local_addr()?,
            signaling = %self.config.paths.signaling,
            relay_publish = %self.config.paths.relay_publish,
            relay_subscribe = %self.config.paths.relay_subscribe,
            "Server listening"
        );

        let stats_handle = self.spawn_stats_task();

        let result = tokio::select! {
            _ = shutdown => {
                tracing::info!("Shutdown signal received");
                Ok(())
            }
            result = self.accept_loop(&listener) => result,
        };

        if let Some(handle) = stats_handle {
            handle.abort();
        }

        drop(listener);
        self.shutdown.cancel();
        self.manager.shutdown().await;

        self.connections.close();
        self.connections.wait().await;
        tracing::info!("All connections closed");

        result
    }

    async fn accept_loop(&self, listener: &TcpListener) -> Result<()> {
        loop {
            match listener.accept().await {
                Ok((socket, peer_addr)) => {
                    self.handle_connection(socket, peer_addr);
                }
                Err(e) => {
                    tracing::error!(error = %e, "Failed to accept connection");
                }
            }
        }
    }

    fn handle_connection(&self, socket: TcpStream, peer_addr: SocketAddr) {
        // The permit moves into the connection task and is held until the
        // connection ends.
        let permit = if let Some(ref sem) = self.connection_semaphore {
            match sem.clone().try_acquire_owned() {
                Ok(permit) => Some(permit),
                Err(_) => {
                    self.counters.rejected.fetch_add(1, Ordering::Relaxed);
                    tracing::warn!(peer = %peer_addr, "Connection rejected: limit reached");
                    return;
                }
            }
        } else {
            None
        };

        self.counters.total.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(peer = %peer_addr, "New connection");

        if self.config.tcp_nodelay {
            if let Err(e) = socket.set_nodelay(true) {
                tracing::error!(error = %e, "Failed to configure socket");
                return;
            }
        }

        let ctx = ConnectionContext {
            manager: Arc::clone(&self.manager),
            hub: Arc::clone(&self.hub),
            paths: self.config.paths.clone(),
            ws_config: websocket::ws_config(self.config.max_message_size),
            handshake_timeout: self.config.handshake_timeout,
            queue: self.config.outbound_queue,
            shutdown: self.shutdown.clone(),
        };

        self.connections.spawn(async move {
            let _permit = permit;

            if let Err(e) = serve_connection(socket, peer_addr, ctx).await {
                tracing::debug!(peer = %peer_addr, error = %e, "Connection error");
            }

            tracing::debug!(peer = %peer_addr, "Connection closed");
        });
    }

    fn spawn_stats_task(&self) -> Option<JoinHandle<()>> {
        let interval = self.config.stats_interval;
        if interval.is_zero() {
            return None;
        }

        let manager = Arc::clone(&self.manager);
        let hub = Arc::clone(&self.hub);
        let counters = Arc::clone(&self.counters);
        let started_at = self.started_at;

        Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let stats = collect_stats(&manager, &hub, &counters, started_at).await;
                tracing::info!(
                    sessions = stats.active_sessions,
                    published_tracks = stats.published_tracks,
                    relay_publishers = stats.relay.publishers,
                    relay_subscribers = stats.relay.subscribers,
                    relay_frames = stats.relay.frames_in,
                    connections = stats.total_connections,
                    rejected = stats.rejected_connections,
                    "Server stats"
                );
            }
        }))
    }
}

async fn collect_stats(
    manager: &SessionManager,
    hub: &RelayHub,
    counters: &ConnectionCounters,
    started_at: Instant,
) -> ServerStats {
    ServerStats {
        total_connections: counters.total.load(Ordering::Relaxed),
        rejected_connections: counters.rejected.load(Ordering::Relaxed),
        active_sessions: manager.len().await as u64,
        published_tracks: manager.registry().len().await as u64,
        relay: hub.stats(),
        uptime: started_at.elapsed(),
    }
}

async fn serve_connection(
    socket: TcpStream,
    peer_addr: SocketAddr,
    ctx: ConnectionContext,
) -> Result<()> {
    let paths = &ctx.paths;
    let is_known = |path: &str| {
        path == paths.signaling || path == paths.relay_publish || path == paths.relay_subscribe
    };

    let handshake = websocket::accept(socket, ctx.ws_config, is_known);
    let handshake = tokio::time::timeout(ctx.handshake_timeout, handshake);
    let (ws, path) = tokio::select! {
        _ = ctx.shutdown.cancelled() => return Ok(()),
        result = handshake => match result {
            Ok(result) => result?,
            Err(_) => {
                tracing::debug!(peer = %peer_addr, "WebSocket handshake timed out");
                return Ok(());
            }
        },
    };

    tracing::debug!(peer = %peer_addr, path = %path, "WebSocket connected");
    let transport = websocket::bridge(ws, peer_addr, ctx.queue);

    if path == paths.signaling {
        let session = match ctx.manager.create_session(transport).await {
            Ok(session) => session,
            Err(Error::ShuttingDown) => return Ok(()),
            Err(e) => return Err(e),
        };
        session.closed().await;
    } else {
        // Dropping the relay handler drops its transport, which makes the
        // bridge send a close frame.
        let relay = async {
            if path == paths.relay_publish {
                relay::serve_publisher(Arc::clone(&ctx.hub), transport).await;
            } else {
                relay::serve_subscriber(ctx.hub.subscribe(), transport).await;
            }
        };
        tokio::select! {
            _ = ctx.shutdown.cancelled() => {
                tracing::debug!(peer = %peer_addr, path = %path, "Relay connection closed by shutdown");
            }
            _ = relay => {}
        }
    }

    Ok(())
}
