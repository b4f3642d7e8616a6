//! Statistics for signaling sessions and the binary relay

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// Session-level statistics
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionStats {
    /// Signaling messages decoded from the client
    pub messages_received: u64,
    /// Signaling messages sent to the client
    pub messages_sent: u64,
    /// Messages rejected as malformed or out of order
    pub protocol_errors: u64,
    /// Remote candidates applied
    pub candidates_applied: u64,
    /// Remote candidates the engine refused
    pub candidate_errors: u64,
    /// Tracks this session published
    pub tracks_published: u64,
    /// Connection duration
    pub duration: Duration,
}

/// Live counters behind [`SessionStats`]
#[derive(Debug)]
pub struct SessionCounters {
    started_at: Instant,
    messages_received: AtomicU64,
    messages_sent: AtomicU64,
    protocol_errors: AtomicU64,
    candidates_applied: AtomicU64,
    candidate_errors: AtomicU64,
    tracks_published: AtomicU64,
}

impl SessionCounters {
    pub fn new() -> Self {
        Self {
            started_at: Instant::now(),
            messages_received: AtomicU64::new(0),
            messages_sent: AtomicU64::new(0),
            protocol_errors: AtomicU64::new(0),
            candidates_applied: AtomicU64::new(0),
            candidate_errors: AtomicU64::new(0),
            tracks_published: AtomicU64::new(0),
        }
    }

    pub fn message_received(&self) {
        self.messages_received.fetch_add(1, Ordering::Relaxed);
    }

    pub fn message_sent(&self) {
        self.messages_sent.fetch_add(1, Ordering::Relaxed);
    }

    pub fn protocol_error(&self) {
        self.protocol_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn candidate_applied(&self) {
        self.candidates_applied.fetch_add(1, Ordering::Relaxed);
    }

    pub fn candidate_error(&self) {
        self.candidate_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn track_published(&self) {
        self.tracks_published.fetch_add(1, Ordering::Relaxed);
    }

    /// Point-in-time copy of the counters
    pub fn snapshot(&self) -> SessionStats {
        SessionStats {
            messages_received: self.messages_received.load(Ordering::Relaxed),
            messages_sent: self.messages_sent.load(Ordering::Relaxed),
            protocol_errors: self.protocol_errors.load(Ordering::Relaxed),
            candidates_applied: self.candidates_applied.load(Ordering::Relaxed),
            candidate_errors: self.candidate_errors.load(Ordering::Relaxed),
            tracks_published: self.tracks_published.load(Ordering::Relaxed),
            duration: self.started_at.elapsed(),
        }
    }
}

impl Default for SessionCounters {
    fn default() -> Self {
        Self::new()
    }
}

/// Binary relay statistics
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RelayStats {
    /// Connected publishers
    pub publishers: u64,
    /// Connected subscribers
    pub subscribers: u64,
    /// Frames received from publishers
    pub frames_in: u64,
    /// Payload bytes received from publishers
    pub bytes_in: u64,
    /// Frames delivered to subscribers
    pub frames_out: u64,
    /// Frames skipped by subscribers that fell behind
    pub frames_skipped: u64,
}

/// Live counters behind [`RelayStats`]
#[derive(Debug, Default)]
pub struct RelayCounters {
    publishers: AtomicU64,
    subscribers: AtomicU64,
    frames_in: AtomicU64,
    bytes_in: AtomicU64,
    frames_out: AtomicU64,
    frames_skipped: AtomicU64,
}

impl RelayCounters {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn publisher_joined(&self) {
        self.publishers.fetch_add(1, Ordering::Relaxed);
    }

    pub fn publisher_left(&self) {
        self.publishers.fetch_sub(1, Ordering::Relaxed);
    }

    pub fn subscriber_joined(&self) {
        self.subscribers.fetch_add(1, Ordering::Relaxed);
    }

    pub fn subscriber_left(&self) {
        self.subscribers.fetch_sub(1, Ordering::Relaxed);
    }

    pub fn frame_in(&self, len: usize) {
        self.frames_in.fetch_add(1, Ordering::Relaxed);
        self.bytes_in.fetch_add(len as u64, Ordering::Relaxed);
    }

    pub fn frame_out(&self) {
        self.frames_out.fetch_add(1, Ordering::Relaxed);
    }

    pub fn frames_skipped(&self, n: u64) {
        self.frames_skipped.fetch_add(n, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> RelayStats {
        RelayStats {
            publishers: self.publishers.load(Ordering::Relaxed),
            subscribers: self.subscribers.load(Ordering::Relaxed),
            frames_in: self.frames_in.load(Ordering::Relaxed),
            bytes_in: self.bytes_in.load(Ordering::Relaxed),
            frames_out: self.frames_out.load(Ordering::Relaxed),
            frames_skipped: self.frames_skipped.load(Ordering::Relaxed),
        }
    }
}

/// Server-wide statistics
#[derive(Debug, Clone, Default)]
pub struct ServerStats {
    /// Total connections ever accepted
    pub total_connections: u64,
    /// Connections refused because of the connection limit
    pub rejected_connections: u64,
    /// Live signaling sessions
    pub active_sessions: u64,
    /// Occupied registry slots
    pub published_tracks: u64,
    /// Binary relay counters
    pub relay: RelayStats,
    /// Uptime
    pub uptime: Duration,
}

impl ServerStats {
    pub fn new() -> Self {
        Self::default()
    }
}
