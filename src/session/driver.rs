//! Per-session driver task
//!
//! One task per session reads client frames, engine events, the
//! negotiation deadline and the cancellation token in a single `select!`
//! loop, so everything that touches a session happens in order.
//!
//! ```text
//!               ┌──────────── select! ────────────┐
//!   cancel ────►│ stop                            │
//!   events ────►│ TrackReceived / state / cand.   │──► registry, client
//!   inbound ───►│ decode → check → dispatch       │──► engine, client
//!   deadline ──►│ close (timeout)                 │
//!               └─────────────────────────────────┘
//! ```

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::{self, Instant};

use super::handle::Session;
use super::state::{check_message, CloseReason, Role, SessionState};
use crate::engine::{
    ConnectionState, EngineEvent, EngineEventReceiver, IceCandidate, SessionDescription,
};
use crate::error::{Error, TransportError};
use crate::protocol::{self, ClientMessage, RoleRequest, ServerMessage};
use crate::transport::Frame;

/// What the loop does after handling one input
enum Flow {
    Continue,
    Close(CloseReason),
}

pub(crate) struct Driver {
    session: Arc<Session>,
    inbound: mpsc::Receiver<Result<Frame, TransportError>>,
    events: EngineEventReceiver,
    negotiation_timeout: Option<Duration>,
}

impl Driver {
    pub(crate) fn new(
        session: Arc<Session>,
        inbound: mpsc::Receiver<Result<Frame, TransportError>>,
        events: EngineEventReceiver,
        negotiation_timeout: Option<Duration>,
    ) -> Self {
        Self {
            session,
            inbound,
            events,
            negotiation_timeout,
        }
    }

    pub(crate) async fn run(mut self) {
        let deadline = self.negotiation_timeout.map(|t| Instant::now() + t);
        let session = Arc::clone(&self.session);

        tracing::debug!(session_id = %session.id(), "Session driver started");

        loop {
            let armed = deadline.is_some() && session.state().is_pending();

            // Engine events go first: they are consequences of messages
            // that were already handled.
            let flow = tokio::select! {
                biased;
                _ = session.cancelled() => break,
                Some(event) = self.events.recv() => self.on_event(event).await,
                frame = self.inbound.recv() => self.on_frame(frame).await,
                _ = time::sleep_until(deadline.unwrap_or_else(Instant::now)), if armed => {
                    Flow::Close(CloseReason::NegotiationTimeout)
                }
            };

            if let Flow::Close(reason) = flow {
                session.close(reason).await;
                break;
            }
        }

        tracing::debug!(session_id = %session.id(), "Session driver stopped");
    }

    async fn on_frame(&mut self, frame: Option<Result<Frame, TransportError>>) -> Flow {
        match frame {
            Some(Ok(Frame::Text(text))) => {
                let result = match protocol::decode(&text) {
                    Ok(msg) => {
                        self.session.counters().message_received();
                        self.on_message(msg).await
                    }
                    Err(e) => Err(e.into()),
                };
                self.settle(result)
            }
            Some(Ok(Frame::Binary(data))) => {
                tracing::debug!(
                    session_id = %self.session.id(),
                    len = data.len(),
                    "Ignoring binary frame on signaling connection"
                );
                Flow::Continue
            }
            Some(Ok(Frame::Close)) | None => Flow::Close(CloseReason::TransportClosed),
            Some(Err(e)) => Flow::Close(CloseReason::TransportError(e)),
        }
    }

    /// Turn a handler result into the next step
    ///
    /// Protocol, candidate and registry failures are logged and counted;
    /// the session carries on. Anything else ends it.
    fn settle(&self, result: Result<Flow, Error>) -> Flow {
        let session = &self.session;

        match result {
            Ok(flow) => flow,
            Err(Error::Protocol(e)) => {
                tracing::warn!(
                    session_id = %session.id(),
                    role = %session.role(),
                    state = %session.state(),
                    error = %e,
                    "Rejected signaling message"
                );
                session.counters().protocol_error();
                Flow::Continue
            }
            Err(Error::Candidate(e)) => {
                tracing::warn!(session_id = %session.id(), error = %e, "Failed to add ICE candidate");
                session.counters().candidate_error();
                Flow::Continue
            }
            Err(Error::Registry(e)) => {
                tracing::warn!(session_id = %session.id(), error = %e, "Track not published");
                Flow::Continue
            }
            Err(Error::Transport(e)) => Flow::Close(CloseReason::TransportError(e)),
            Err(e) => {
                tracing::warn!(session_id = %session.id(), error = %e, "Negotiation failed");
                Flow::Close(CloseReason::NegotiationFailed(e.to_string()))
            }
        }
    }

    async fn on_message(&mut self, msg: ClientMessage) -> Result<Flow, Error> {
        check_message(&msg, self.session.state(), self.session.role())?;

        tracing::debug!(
            session_id = %self.session.id(),
            message = msg.name(),
            "Signaling message"
        );

        match msg {
            ClientMessage::Role(req) => self.on_role(req).await,
            ClientMessage::Offer { sdp } => self.on_offer(sdp).await,
            ClientMessage::Answer { sdp } => self.on_answer(sdp).await,
            ClientMessage::Candidate(candidate) => self.on_candidate(candidate).await,
            ClientMessage::Hangup => Ok(Flow::Close(CloseReason::Hangup)),
        }
    }

    async fn on_role(&mut self, req: RoleRequest) -> Result<Flow, Error> {
        let session = &self.session;
        let role = Role::from(req);
        session.set_role(role);

        tracing::info!(
            session_id = %session.id(),
            peer = ?session.peer_addr(),
            role = %role,
            "Role assigned"
        );

        if role == Role::Subscriber {
            let engine = session.engine();
            let tracks = session.registry().snapshot().await;
            for track in &tracks {
                engine.attach_track(track).await?;
            }

            let sdp = engine.create_offer().await?;
            engine
                .set_local_description(SessionDescription::offer(sdp.clone()))
                .await?;
            session.advance(SessionState::Connecting, SessionState::Negotiating);
            session.send(ServerMessage::Offer { sdp }).await?;

            tracing::info!(
                session_id = %session.id(),
                tracks = tracks.len(),
                "Offer sent to subscriber"
            );
        } else {
            session.advance(SessionState::Connecting, SessionState::Negotiating);
        }

        Ok(Flow::Continue)
    }

    async fn on_offer(&mut self, sdp: String) -> Result<Flow, Error> {
        let engine = self.session.engine();

        engine
            .set_remote_description(SessionDescription::offer(sdp))
            .await?;
        let answer = engine.create_answer().await?;
        engine
            .set_local_description(SessionDescription::answer(answer.clone()))
            .await?;
        self.session.send(ServerMessage::Answer { sdp: answer }).await?;

        tracing::debug!(session_id = %self.session.id(), "Answer sent to publisher");
        Ok(Flow::Continue)
    }

    async fn on_answer(&mut self, sdp: String) -> Result<Flow, Error> {
        self.session
            .engine()
            .set_remote_description(SessionDescription::answer(sdp))
            .await?;
        Ok(Flow::Continue)
    }

    async fn on_candidate(&mut self, candidate: IceCandidate) -> Result<Flow, Error> {
        if candidate.is_end_of_candidates() {
            tracing::debug!(session_id = %self.session.id(), "End of remote candidates");
            return Ok(Flow::Continue);
        }

        self.session.engine().add_ice_candidate(candidate).await?;
        self.session.counters().candidate_applied();
        Ok(Flow::Continue)
    }

    async fn on_event(&mut self, event: EngineEvent) -> Flow {
        let session = Arc::clone(&self.session);

        match event {
            EngineEvent::TrackReceived(handle) => {
                if session.role() != Role::Publisher {
                    tracing::debug!(
                        session_id = %session.id(),
                        kind = %handle.kind(),
                        "Ignoring remote track from non-publisher"
                    );
                    return Flow::Continue;
                }
                let result = session
                    .publish_track(handle)
                    .await
                    .map(|_| Flow::Continue)
                    .map_err(Error::from);
                self.settle(result)
            }
            EngineEvent::ConnectionStateChanged(state) => {
                tracing::debug!(session_id = %session.id(), state = %state, "Peer connection state");

                if state == ConnectionState::Connected {
                    if session.advance(SessionState::Negotiating, SessionState::Connected) {
                        tracing::info!(
                            session_id = %session.id(),
                            role = %session.role(),
                            "Peer connection established"
                        );
                    }
                    Flow::Continue
                } else if state.is_terminal() {
                    Flow::Close(CloseReason::EngineState(state))
                } else {
                    Flow::Continue
                }
            }
            EngineEvent::LocalCandidate(candidate) => {
                match session.send(ServerMessage::Candidate(candidate)).await {
                    Ok(()) => Flow::Continue,
                    Err(e) => Flow::Close(CloseReason::TransportError(e)),
                }
            }
        }
    }
}
