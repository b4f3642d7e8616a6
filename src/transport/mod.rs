//! Duplex frame channel between a client connection and the core
//!
//! Sessions and relay handlers never see sockets. They get a [`Transport`]:
//! an inbound queue of frames (or the error that ended the connection) and
//! an outbound queue. The other end, [`TransportPeer`], is driven by the
//! WebSocket bridge in production and directly by tests.
//!
//! ```text
//!   WebSocket ──► bridge reader ──► peer.outgoing ──► transport.inbound  ──► Session
//!   WebSocket ◄── bridge writer ◄── peer.incoming ◄── transport.outbound ◄── Session
//! ```

pub mod websocket;

use std::net::SocketAddr;

use bytes::Bytes;
use tokio::sync::mpsc;

use crate::error::TransportError;

/// One message on the client connection
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    Text(String),
    Binary(Bytes),
    /// Orderly close of the connection
    Close,
}

/// Core side of a client connection
pub struct Transport {
    /// Frames from the client; an `Err` is the last item before the end
    pub inbound: mpsc::Receiver<Result<Frame, TransportError>>,

    /// Frames to the client
    pub outbound: mpsc::Sender<Frame>,

    /// Remote address, when the connection has one
    pub peer_addr: Option<SocketAddr>,
}

impl Transport {
    /// Create a connected transport/peer pair with `capacity` slots per direction
    pub fn channel(capacity: usize) -> (Transport, TransportPeer) {
        let (in_tx, in_rx) = mpsc::channel(capacity);
        let (out_tx, out_rx) = mpsc::channel(capacity);

        (
            Transport {
                inbound: in_rx,
                outbound: out_tx,
                peer_addr: None,
            },
            TransportPeer {
                outgoing: in_tx,
                incoming: out_rx,
            },
        )
    }

    /// Attach the remote address
    pub fn with_peer_addr(mut self, addr: SocketAddr) -> Self {
        self.peer_addr = Some(addr);
        self
    }
}

/// Client side of a [`Transport`]
pub struct TransportPeer {
    /// Frames toward the core
    pub outgoing: mpsc::Sender<Result<Frame, TransportError>>,

    /// Frames the core sent
    pub incoming: mpsc::Receiver<Frame>,
}

impl TransportPeer {
    /// Deliver a frame to the core; false once the core has hung up
    pub async fn send(&self, frame: Frame) -> bool {
        self.outgoing.send(Ok(frame)).await.is_ok()
    }

    pub async fn send_text(&self, text: impl Into<String>) -> bool {
        self.send(Frame::Text(text.into())).await
    }

    pub async fn send_binary(&self, data: impl Into<Bytes>) -> bool {
        self.send(Frame::Binary(data.into())).await
    }

    /// Report a connection failure to the core
    pub async fn fail(&self, error: TransportError) -> bool {
        self.outgoing.send(Err(error)).await.is_ok()
    }

    /// Next frame from the core; `None` once the core dropped its sender
    pub async fn recv(&mut self) -> Option<Frame> {
        self.incoming.recv().await
    }

    /// Split into the two halves
    pub fn split(
        self,
    ) -> (
        mpsc::Sender<Result<Frame, TransportError>>,
        mpsc::Receiver<Frame>,
    ) {
        (self.outgoing, self.incoming)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_channel_pair() {
        let (mut transport, mut peer) = Transport::channel(4);

        assert!(peer.send_text("hello").await);
        assert_eq!(
            transport.inbound.recv().await,
            Some(Ok(Frame::Text("hello".into())))
        );

        transport
            .outbound
            .send(Frame::Binary(Bytes::from_static(b"\x01\x02")))
            .await
            .unwrap();
        assert_eq!(
            peer.recv().await,
            Some(Frame::Binary(Bytes::from_static(b"\x01\x02")))
        );

        assert!(peer.fail(TransportError::Closed).await);
        assert_eq!(
            transport.inbound.recv().await,
            Some(Err(TransportError::Closed))
        );
    }

    #[tokio::test]
    async fn test_peer_sees_core_hangup() {
        let (transport, mut peer) = Transport::channel(4);
        drop(transport);

        assert!(!peer.send_text("late").await);
        assert_eq!(peer.recv().await, None);
    }
}
