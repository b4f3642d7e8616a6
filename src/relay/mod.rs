//! Binary fan-out relay
//!
//! The negotiation-free variant of the server: every binary frame a
//! publisher connection sends is forwarded verbatim, in order, to every
//! subscriber connected at that moment.
//!
//! ```text
//!   /pub ──► serve_publisher ──► RelayHub (broadcast<Bytes>) ──┬──► serve_subscriber ──► /sub
//!                                                              └──► serve_subscriber ──► /sub
//! ```
//!
//! Subscribers are independent: one whose connection fails is dropped
//! without affecting the others, and one that falls behind skips frames.

pub mod hub;

use std::sync::Arc;

use crate::stats::RelayCounters;
use crate::transport::{Frame, Transport};

/// Keeps the publisher count right even when the handler is dropped mid-stream
struct PublisherGuard<'a>(&'a RelayCounters);

impl<'a> PublisherGuard<'a> {
    fn join(counters: &'a RelayCounters) -> Self {
        counters.publisher_joined();
        Self(counters)
    }
}

impl Drop for PublisherGuard<'_> {
    fn drop(&mut self) {
        self.0.publisher_left();
    }
}

pub use hub::{RelayHub, RelaySubscription, DEFAULT_RELAY_CAPACITY};

/// Forward binary frames from a publisher connection into `hub`
///
/// Text frames are ignored. Returns when the connection ends.
pub async fn serve_publisher(hub: Arc<RelayHub>, transport: Transport) {
    let Transport {
        mut inbound,
        outbound: _outbound,
        peer_addr,
    } = transport;

    let _guard = PublisherGuard::join(hub.counters());
    tracing::info!(peer = ?peer_addr, "Relay publisher connected");

    while let Some(frame) = inbound.recv().await {
        match frame {
            Ok(Frame::Binary(data)) => {
                let receivers = hub.publish(data);
                tracing::trace!(peer = ?peer_addr, receivers = receivers, "Relayed frame");
            }
            Ok(Frame::Text(_)) => {
                tracing::debug!(peer = ?peer_addr, "Ignoring text frame from relay publisher");
            }
            Ok(Frame::Close) => break,
            Err(e) => {
                tracing::debug!(peer = ?peer_addr, error = %e, "Relay publisher connection failed");
                break;
            }
        }
    }

    tracing::info!(peer = ?peer_addr, "Relay publisher disconnected");
}

/// Deliver frames from `subscription` to a subscriber connection
///
/// Returns when the subscriber goes away or the hub is dropped.
pub async fn serve_subscriber(mut subscription: RelaySubscription, transport: Transport) {
    let Transport {
        mut inbound,
        outbound,
        peer_addr,
    } = transport;

    tracing::info!(peer = ?peer_addr, "Relay subscriber connected");

    loop {
        tokio::select! {
            frame = subscription.recv() => {
                let Some(data) = frame else {
                    let _ = outbound.send(Frame::Close).await;
                    break;
                };
                if outbound.send(Frame::Binary(data)).await.is_err() {
                    tracing::debug!(peer = ?peer_addr, "Relay subscriber send failed");
                    break;
                }
                subscription.delivered();
            }
            frame = inbound.recv() => match frame {
                Some(Ok(Frame::Close)) | Some(Err(_)) | None => break,
                // Subscribers have nothing to say
                Some(Ok(_)) => {}
            },
        }
    }

    tracing::info!(peer = ?peer_addr, "Relay subscriber disconnected");
}
