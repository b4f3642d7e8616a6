//! WebSocket bridge
//!
//! Upgrades a TCP connection, then runs two tasks that move frames between
//! the socket and a [`Transport`]:
//!
//! - the reader turns WebSocket messages into [`Frame`]s on the inbound
//!   queue and ends with `Frame::Close` or the error that broke the socket;
//! - the writer drains the outbound queue onto the socket and closes it when
//!   the core sends `Frame::Close` or drops its sender.

use std::net::SocketAddr;

use bytes::Bytes;
use futures_util::{SinkExt, StreamExt};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::http::StatusCode;
use tokio_tungstenite::tungstenite::protocol::WebSocketConfig;
use tokio_tungstenite::tungstenite::{self, Message};
use tokio_tungstenite::WebSocketStream;

use super::{Frame, Transport};
use crate::error::TransportError;

/// WebSocket limits applied to every connection
pub fn ws_config(max_message_size: usize) -> WebSocketConfig {
    let mut config = WebSocketConfig::default();
    config.max_message_size = Some(max_message_size);
    config.max_frame_size = Some(max_message_size);
    config
}

/// Perform the server handshake and return the stream with its request path
///
/// Requests whose path `is_known` rejects are answered with HTTP 404.
pub async fn accept<S, F>(
    stream: S,
    config: WebSocketConfig,
    is_known: F,
) -> Result<(WebSocketStream<S>, String), tungstenite::Error>
where
    S: AsyncRead + AsyncWrite + Unpin,
    F: Fn(&str) -> bool,
{
    let mut path = String::new();

    let callback = |req: &Request, resp: Response| -> Result<Response, ErrorResponse> {
        let requested = req.uri().path();
        if !is_known(requested) {
            let mut err = ErrorResponse::new(Some(format!("no endpoint at {}", requested)));
            *err.status_mut() = StatusCode::NOT_FOUND;
            return Err(err);
        }
        path = requested.to_string();
        Ok(resp)
    };

    let ws = tokio_tungstenite::accept_hdr_async_with_config(stream, callback, Some(config)).await?;
    Ok((ws, path))
}

/// Connect a WebSocket to a new [`Transport`]
///
/// `queue` bounds each direction. The bridge tasks exit on their own once
/// either side goes away.
pub fn bridge<S>(ws: WebSocketStream<S>, peer_addr: SocketAddr, queue: usize) -> Transport
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    let (transport, peer) = Transport::channel(queue);
    let (inbound, outbound) = peer.split();
    let (sink, stream) = ws.split();

    tokio::spawn(read_loop(stream, inbound, peer_addr));
    tokio::spawn(write_loop(sink, outbound, peer_addr));

    transport.with_peer_addr(peer_addr)
}

async fn read_loop<St>(
    mut stream: St,
    inbound: mpsc::Sender<Result<Frame, TransportError>>,
    peer_addr: SocketAddr,
) where
    St: futures_util::Stream<Item = Result<Message, tungstenite::Error>> + Unpin,
{
    while let Some(msg) = stream.next().await {
        let frame = match msg {
            Ok(Message::Text(text)) => Frame::Text(text),
            Ok(Message::Binary(data)) => Frame::Binary(Bytes::from(data)),
            Ok(Message::Close(_)) => {
                tracing::debug!(peer = %peer_addr, "WebSocket closed by client");
                let _ = inbound.send(Ok(Frame::Close)).await;
                return;
            }
            // Pings are answered by tungstenite itself
            Ok(_) => continue,
            Err(e) => {
                tracing::debug!(peer = %peer_addr, error = %e, "WebSocket read failed");
                let _ = inbound.send(Err(TransportError::Io(e.to_string()))).await;
                return;
            }
        };

        if inbound.send(Ok(frame)).await.is_err() {
            return;
        }
    }

    let _ = inbound.send(Err(TransportError::Closed)).await;
}

async fn write_loop<Si>(mut sink: Si, mut outbound: mpsc::Receiver<Frame>, peer_addr: SocketAddr)
where
    Si: futures_util::Sink<Message, Error = tungstenite::Error> + Unpin,
{
    while let Some(frame) = outbound.recv().await {
        let msg = match frame {
            Frame::Text(text) => Message::Text(text),
            Frame::Binary(data) => Message::Binary(data.to_vec()),
            Frame::Close => break,
        };

        if let Err(e) = sink.send(msg).await {
            tracing::debug!(peer = %peer_addr, error = %e, "WebSocket write failed");
            return;
        }
    }

    let _ = sink.send(Message::Close(None)).await;
    let _ = sink.close().await;
}
