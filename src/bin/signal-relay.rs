//! Signaling and relay server binary
//!
//! ```bash
//! # Loopback engine (no media, signaling only)
//! signal-relay --bind 0.0.0.0:8080
//!
//! # Real WebRTC media
//! cargo run --features webrtc --bin signal-relay -- \
//!   --engine webrtc \
//!   --ice-server stun:stun.l.google.com:19302 \
//!   --ice-port-range 50000,50050
//! ```

use std::net::SocketAddr;
use std::process;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, ValueEnum};
use tracing_subscriber::EnvFilter;

use signal_relay::engine::{EngineFactory, LoopbackFactory};
use signal_relay::server::{PortRange, RelayServer, ServerConfig};
use signal_relay::{PublishPolicy, RegistryConfig, SessionConfig};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum EngineKind {
    /// In-process engine that negotiates without moving media
    Loopback,
    /// WebRTC peer connections (requires the `webrtc` feature)
    Webrtc,
}

/// WebRTC signaling coordinator and fan-out relay
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Listen address (host:port)
    #[arg(long, short, default_value = "0.0.0.0:8080", env = "SIGNAL_RELAY_BIND")]
    bind: SocketAddr,

    /// Maximum concurrent connections (0 = unlimited)
    #[arg(long, default_value_t = 0, env = "SIGNAL_RELAY_MAX_CONNECTIONS")]
    max_connections: usize,

    /// Media engine backing signaling sessions
    #[arg(long, value_enum, default_value = "loopback", env = "SIGNAL_RELAY_ENGINE")]
    engine: EngineKind,

    /// ICE server URLs (comma-separated or repeated)
    #[arg(
        long = "ice-server",
        value_delimiter = ',',
        default_value = "stun:stun.l.google.com:19302"
    )]
    ice_servers: Vec<String>,

    /// UDP port range for media, as "low,high"
    #[arg(long, default_value = "50000,50050", env = "ICE_PORT_RANGE")]
    ice_port_range: String,

    /// Seconds a session may spend negotiating (0 disables)
    #[arg(long, default_value_t = 30, env = "SIGNAL_RELAY_NEGOTIATION_TIMEOUT")]
    negotiation_timeout_secs: u64,

    /// Refuse a second publisher instead of letting it take over the slot
    #[arg(long, default_value_t = false)]
    reject_preemption: bool,

    /// Seconds between stats log lines (0 disables)
    #[arg(long, default_value_t = 30)]
    stats_interval_secs: u64,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args = Args::parse();

    let port_range = match PortRange::parse(&args.ice_port_range) {
        Ok(range) => range,
        Err(e) => {
            eprintln!("Invalid configuration: {}", e);
            process::exit(1);
        }
    };

    let engines = match build_engines(&args, port_range) {
        Ok(engines) => engines,
        Err(e) => {
            eprintln!("Failed to start media engine: {}", e);
            process::exit(1);
        }
    };

    let session = if args.negotiation_timeout_secs == 0 {
        SessionConfig::default().disable_negotiation_timeout()
    } else {
        SessionConfig::default().negotiation_timeout(Duration::from_secs(args.negotiation_timeout_secs))
    };

    let policy = if args.reject_preemption {
        PublishPolicy::Reject
    } else {
        PublishPolicy::Preempt
    };

    let config = ServerConfig::with_addr(args.bind)
        .max_connections(args.max_connections)
        .stats_interval(Duration::from_secs(args.stats_interval_secs))
        .session(session)
        .registry(RegistryConfig::default().publish_policy(policy));

    tracing::info!(
        bind = %args.bind,
        engine = ?args.engine,
        ice_port_range = %port_range,
        "Starting signal-relay"
    );

    let server = RelayServer::new(config, engines);
    let result = server
        .run_until(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await;

    if let Err(e) = result {
        eprintln!("Server error: {}", e);
        process::exit(1);
    }
}

fn build_engines(args: &Args, port_range: PortRange) -> Result<Arc<dyn EngineFactory>, String> {
    match args.engine {
        EngineKind::Loopback => Ok(Arc::new(LoopbackFactory::new())),
        #[cfg(feature = "webrtc")]
        EngineKind::Webrtc => {
            use signal_relay::engine::rtc::{RtcEngineConfig, RtcEngineFactory};

            let config = RtcEngineConfig::default()
                .ice_servers(args.ice_servers.clone())
                .port_range(Some(port_range));
            let factory = RtcEngineFactory::new(config).map_err(|e| e.to_string())?;
            Ok(Arc::new(factory))
        }
        #[cfg(not(feature = "webrtc"))]
        EngineKind::Webrtc => {
            let _ = (&args.ice_servers, port_range);
            Err("this build does not include the `webrtc` feature".to_string())
        }
    }
}
