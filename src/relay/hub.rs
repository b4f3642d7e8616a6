//! Broadcast hub for binary frames

use std::sync::Arc;

use bytes::Bytes;
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::RecvError;

use crate::stats::{RelayCounters, RelayStats};

/// Default number of frames buffered per subscriber
pub const DEFAULT_RELAY_CAPACITY: usize = 256;

/// Fan-out point shared by every relay publisher and subscriber
///
/// `Bytes` is reference counted, so each subscriber gets the same
/// allocation rather than a copy.
pub struct RelayHub {
    tx: broadcast::Sender<Bytes>,
    counters: Arc<RelayCounters>,
}

impl RelayHub {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self {
            tx,
            counters: Arc::new(RelayCounters::new()),
        }
    }

    /// Send a frame to every current subscriber
    ///
    /// Returns the number of subscribers it was queued for, or 0 if there are
    /// none.
    pub fn publish(&self, frame: Bytes) -> usize {
        self.counters.frame_in(frame.len());
        self.tx.send(frame).unwrap_or(0)
    }

    /// Register a new subscriber
    ///
    /// It only sees frames published after this call.
    pub fn subscribe(&self) -> RelaySubscription {
        self.counters.subscriber_joined();
        RelaySubscription {
            rx: self.tx.subscribe(),
            counters: Arc::clone(&self.counters),
        }
    }

    /// Number of live subscriptions
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }

    pub fn stats(&self) -> RelayStats {
        self.counters.snapshot()
    }

    pub(crate) fn counters(&self) -> &RelayCounters {
        &self.counters
    }
}

impl Default for RelayHub {
    fn default() -> Self {
        Self::new(DEFAULT_RELAY_CAPACITY)
    }
}

/// Receiving end of a [`RelayHub`]
pub struct RelaySubscription {
    rx: broadcast::Receiver<Bytes>,
    counters: Arc<RelayCounters>,
}

impl RelaySubscription {
    /// Next frame in publish order
    ///
    /// A subscriber that fell behind skips the frames it missed and carries
    /// on with the oldest one still buffered. `None` once the hub is gone.
    pub async fn recv(&mut self) -> Option<Bytes> {
        loop {
            match self.rx.recv().await {
                Ok(frame) => return Some(frame),
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped = skipped, "Relay subscriber lagging, frames skipped");
                    self.counters.frames_skipped(skipped);
                }
                Err(RecvError::Closed) => return None,
            }
        }
    }
}

impl RelaySubscription {
    pub(super) fn delivered(&self) {
        self.counters.frame_out();
    }
}

impl Drop for RelaySubscription {
    fn drop(&mut self) {
        self.counters.subscriber_left();
    }
}
