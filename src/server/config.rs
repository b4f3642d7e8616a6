//! Server configuration

use std::fmt;
use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;

use crate::error::ConfigError;
use crate::registry::RegistryConfig;
use crate::relay::DEFAULT_RELAY_CAPACITY;
use crate::session::SessionConfig;

/// Default listen address
pub const DEFAULT_BIND_ADDR: &str = "0.0.0.0:8080";

/// Largest accepted WebSocket message (1 MiB)
pub const DEFAULT_MAX_MESSAGE_SIZE: usize = 1 << 20;

/// Inclusive UDP port range for media
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PortRange {
    pub low: u16,
    pub high: u16,
}

impl PortRange {
    /// Parse `"low,high"`, requiring `0 < low < high < 65536`
    pub fn parse(s: &str) -> Result<Self, ConfigError> {
        let invalid = || ConfigError::PortRange(s.to_string());

        let (low, high) = s.split_once(',').ok_or_else(invalid)?;
        let low: u16 = low.trim().parse().map_err(|_| invalid())?;
        let high: u16 = high.trim().parse().map_err(|_| invalid())?;

        if low == 0 || low >= high {
            return Err(invalid());
        }
        Ok(Self { low, high })
    }
}

impl Default for PortRange {
    fn default() -> Self {
        Self {
            low: 50000,
            high: 50050,
        }
    }
}

impl FromStr for PortRange {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for PortRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{},{}", self.low, self.high)
    }
}

/// Request paths served over WebSocket
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerPaths {
    /// Signaling endpoint
    pub signaling: String,
    /// Binary relay publisher endpoint
    pub relay_publish: String,
    /// Binary relay subscriber endpoint
    pub relay_subscribe: String,
}

impl Default for ServerPaths {
    fn default() -> Self {
        Self {
            signaling: "/ws".to_string(),
            relay_publish: "/pub".to_string(),
            relay_subscribe: "/sub".to_string(),
        }
    }
}

/// Server configuration options
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address to bind to
    pub bind_addr: SocketAddr,

    /// Maximum concurrent connections (0 = unlimited)
    pub max_connections: usize,

    /// WebSocket endpoints
    pub paths: ServerPaths,

    /// WebSocket upgrade must complete within this time
    pub handshake_timeout: Duration,

    /// Largest WebSocket message accepted from clients
    pub max_message_size: usize,

    /// Frames queued per connection and direction
    pub outbound_queue: usize,

    /// Frames buffered per relay subscriber before it starts skipping
    pub relay_capacity: usize,

    /// Enable TCP_NODELAY (disable Nagle's algorithm)
    pub tcp_nodelay: bool,

    /// Stats log interval (zero disables)
    pub stats_interval: Duration,

    /// Settings applied to every signaling session
    pub session: SessionConfig,

    /// Track registry settings
    pub registry: RegistryConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 8080)),
            max_connections: 0, // Unlimited
            paths: ServerPaths::default(),
            handshake_timeout: Duration::from_secs(10),
            max_message_size: DEFAULT_MAX_MESSAGE_SIZE,
            outbound_queue: 128,
            relay_capacity: DEFAULT_RELAY_CAPACITY,
            tcp_nodelay: true,
            stats_interval: Duration::from_secs(30),
            session: SessionConfig::default(),
            registry: RegistryConfig::default(),
        }
    }
}

impl ServerConfig {
    /// Create a new config with custom bind address
    pub fn with_addr(addr: SocketAddr) -> Self {
        Self {
            bind_addr: addr,
            ..Default::default()
        }
    }

    /// Set the bind address
    pub fn bind(mut self, addr: SocketAddr) -> Self {
        self.bind_addr = addr;
        self
    }

    /// Set maximum connections
    pub fn max_connections(mut self, max: usize) -> Self {
        self.max_connections = max;
        self
    }

    /// Set the WebSocket endpoints
    pub fn paths(mut self, paths: ServerPaths) -> Self {
        self.paths = paths;
        self
    }

    /// Set handshake timeout
    pub fn handshake_timeout(mut self, timeout: Duration) -> Self {
        self.handshake_timeout = timeout;
        self
    }

    /// Set the maximum WebSocket message size
    pub fn max_message_size(mut self, size: usize) -> Self {
        self.max_message_size = size;
        self
    }

    /// Set the per-connection queue depth (at least 1)
    pub fn outbound_queue(mut self, depth: usize) -> Self {
        self.outbound_queue = depth.max(1);
        self
    }

    /// Set the relay buffer per subscriber (at least 1)
    pub fn relay_capacity(mut self, capacity: usize) -> Self {
        self.relay_capacity = capacity.max(1);
        self
    }

    /// Set the stats log interval
    pub fn stats_interval(mut self, interval: Duration) -> Self {
        self.stats_interval = interval;
        self
    }

    /// Set session settings
    pub fn session(mut self, session: SessionConfig) -> Self {
        self.session = session;
        self
    }

    /// Set registry settings
    pub fn registry(mut self, registry: RegistryConfig) -> Self {
        self.registry = registry;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::PublishPolicy;

    #[test]
    fn test_default_config() {
        let config = ServerConfig::default();

        assert_eq!(config.bind_addr, DEFAULT_BIND_ADDR.parse().unwrap());
        assert_eq!(config.max_connections, 0);
        assert_eq!(config.paths.signaling, "/ws");
        assert_eq!(config.paths.relay_publish, "/pub");
        assert_eq!(config.paths.relay_subscribe, "/sub");
        assert_eq!(config.handshake_timeout, Duration::from_secs(10));
        assert_eq!(config.max_message_size, 1024 * 1024);
        assert_eq!(config.outbound_queue, 128);
        assert_eq!(config.relay_capacity, 256);
        assert!(config.tcp_nodelay);
        assert_eq!(config.session.negotiation_timeout, Some(Duration::from_secs(30)));
        assert_eq!(config.registry.publish_policy, PublishPolicy::Preempt);
    }

    #[test]
    fn test_with_addr() {
        let addr: SocketAddr = "127.0.0.1:9000".parse().unwrap();
        let config = ServerConfig::with_addr(addr);

        assert_eq!(config.bind_addr.port(), 9000);
    }

    #[test]
    fn test_builder_queue_minimums() {
        let config = ServerConfig::default().outbound_queue(0).relay_capacity(0);

        assert_eq!(config.outbound_queue, 1);
        assert_eq!(config.relay_capacity, 1);
    }

    #[test]
    fn test_builder_chaining() {
        let addr: SocketAddr = "127.0.0.1:8081".parse().unwrap();
        let config = ServerConfig::default()
            .bind(addr)
            .max_connections(50)
            .handshake_timeout(Duration::from_secs(5))
            .max_message_size(4096)
            .stats_interval(Duration::ZERO)
            .session(SessionConfig::default().disable_negotiation_timeout())
            .registry(RegistryConfig::default().publish_policy(PublishPolicy::Reject));

        assert_eq!(config.bind_addr, addr);
        assert_eq!(config.max_connections, 50);
        assert_eq!(config.handshake_timeout, Duration::from_secs(5));
        assert_eq!(config.max_message_size, 4096);
        assert_eq!(config.stats_interval, Duration::ZERO);
        assert!(config.session.negotiation_timeout.is_none());
        assert_eq!(config.registry.publish_policy, PublishPolicy::Reject);
    }

    #[test]
    fn test_port_range_parse() {
        assert_eq!(
            PortRange::parse("50000,50050"),
            Ok(PortRange {
                low: 50000,
                high: 50050
            })
        );
        assert_eq!(PortRange::parse(" 1 , 2 ").map(|r| r.to_string()), Ok("1,2".into()));
        assert_eq!(PortRange::default().to_string(), "50000,50050");
    }

    #[test]
    fn test_port_range_invalid() {
        for bad in ["", "50000", "0,10", "10,10", "20,10", "1,65536", "a,b", "1,2,3"] {
            assert!(PortRange::parse(bad).is_err(), "{:?} should be rejected", bad);
        }
    }
}
