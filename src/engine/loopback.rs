//! In-process media engine with deterministic behaviour
//!
//! `LoopbackEngine` performs no networking. It checks that descriptions look
//! like SDP, synthesizes offers and answers from the tracks it knows about,
//! and reports a remote track for every `m=` section of an applied offer.
//! The server uses it in `--engine loopback` mode and the test suite drives
//! whole publisher/subscriber sessions through it.

use std::sync::{Arc, Weak};

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::mpsc::error::TrySendError;

use super::{
    ConnectionState, EngineEvent, EngineEventSender, EngineFactory, IceCandidate, MediaEngine,
    MediaKind, SdpType, SessionDescription, TrackHandle,
};
use crate::error::{CandidateError, NegotiationError};
use crate::session::SessionId;

/// Source object carried by loopback track handles
#[derive(Debug, PartialEq, Eq)]
pub struct LoopbackTrack {
    /// Session whose engine received the track
    pub origin: SessionId,
    /// Index of the `m=` section the track came from
    pub mline: usize,
    pub kind: MediaKind,
}

#[derive(Default)]
struct Inner {
    closed: bool,
    connected: bool,
    local: Option<SessionDescription>,
    remote: Option<SessionDescription>,
    attached: Vec<TrackHandle>,
    candidates: Vec<IceCandidate>,
}

/// Deterministic [`MediaEngine`] used for development and tests
pub struct LoopbackEngine {
    session_id: SessionId,
    events: EngineEventSender,
    inner: Mutex<Inner>,
}

impl LoopbackEngine {
    pub fn new(session_id: SessionId, events: EngineEventSender) -> Self {
        Self {
            session_id,
            events,
            inner: Mutex::new(Inner::default()),
        }
    }

    pub fn session_id(&self) -> SessionId {
        self.session_id
    }

    /// Tracks currently attached for sending
    pub fn attached_tracks(&self) -> Vec<TrackHandle> {
        self.inner.lock().attached.clone()
    }

    /// Remote candidates applied so far (end-of-candidates markers excluded)
    pub fn remote_candidates(&self) -> Vec<IceCandidate> {
        self.inner.lock().candidates.clone()
    }

    pub fn local_description(&self) -> Option<SessionDescription> {
        self.inner.lock().local.clone()
    }

    pub fn remote_description(&self) -> Option<SessionDescription> {
        self.inner.lock().remote.clone()
    }

    pub fn is_closed(&self) -> bool {
        self.inner.lock().closed
    }

    /// Push an event to the owning session as if the media stack raised it
    pub async fn emit(&self, event: EngineEvent) -> bool {
        self.events.send(event).await.is_ok()
    }

    fn notify(&self, event: EngineEvent) {
        match self.events.try_send(event) {
            Ok(()) | Err(TrySendError::Closed(_)) => {}
            Err(TrySendError::Full(event)) => {
                tracing::warn!(
                    session_id = %self.session_id,
                    ?event,
                    "Engine event queue full, dropping event"
                );
            }
        }
    }

    fn ensure_open(inner: &Inner) -> Result<(), NegotiationError> {
        if inner.closed {
            Err(NegotiationError::EngineClosed)
        } else {
            Ok(())
        }
    }

    fn header(&self) -> String {
        format!(
            "v=0\r\no=- {} 0 IN IP4 127.0.0.1\r\ns=loopback\r\nt=0 0\r\n",
            self.session_id.as_u64()
        )
    }

    fn maybe_connected(&self, inner: &mut Inner) {
        if !inner.connected && inner.local.is_some() && inner.remote.is_some() {
            inner.connected = true;
            self.notify(EngineEvent::ConnectionStateChanged(ConnectionState::Connected));
        }
    }
}

/// Check the SDP prefix and collect the media kinds of its `m=` lines
///
/// Unknown media types are skipped.
fn parse_media_sections(sdp: &str) -> Result<Vec<MediaKind>, NegotiationError> {
    if !sdp.trim_start().starts_with("v=0") {
        return Err(NegotiationError::MalformedSdp(
            "description does not start with v=0".into(),
        ));
    }

    Ok(sdp
        .lines()
        .filter_map(|line| line.trim().strip_prefix("m="))
        .filter_map(|rest| rest.split_whitespace().next())
        .filter_map(MediaKind::from_sdp_media)
        .collect())
}

fn media_line(kind: MediaKind, direction: &str) -> String {
    format!(
        "m={} 9 UDP/TLS/RTP/SAVPF 96\r\nc=IN IP4 0.0.0.0\r\na={}\r\n",
        kind.as_str(),
        direction
    )
}

#[async_trait]
impl MediaEngine for LoopbackEngine {
    async fn create_offer(&self) -> Result<String, NegotiationError> {
        let inner = self.inner.lock();
        Self::ensure_open(&inner)?;

        let mut sdp = self.header();
        for track in &inner.attached {
            sdp.push_str(&media_line(track.kind(), "sendonly"));
            sdp.push_str(&format!("a=msid:{}\r\n", track.id()));
        }
        Ok(sdp)
    }

    async fn create_answer(&self) -> Result<String, NegotiationError> {
        let inner = self.inner.lock();
        Self::ensure_open(&inner)?;

        let remote = match &inner.remote {
            Some(desc) if desc.sdp_type == SdpType::Offer => desc,
            _ => return Err(NegotiationError::NoRemoteOffer),
        };

        let mut sdp = self.header();
        for kind in parse_media_sections(&remote.sdp)? {
            sdp.push_str(&media_line(kind, "recvonly"));
        }
        Ok(sdp)
    }

    async fn set_local_description(&self, desc: SessionDescription) -> Result<(), NegotiationError> {
        parse_media_sections(&desc.sdp)?;

        let mut inner = self.inner.lock();
        Self::ensure_open(&inner)?;
        inner.local = Some(desc);
        self.maybe_connected(&mut inner);
        Ok(())
    }

    async fn set_remote_description(&self, desc: SessionDescription) -> Result<(), NegotiationError> {
        let kinds = parse_media_sections(&desc.sdp)?;

        let mut inner = self.inner.lock();
        Self::ensure_open(&inner)?;

        if desc.sdp_type == SdpType::Offer {
            for (mline, kind) in kinds.into_iter().enumerate() {
                let source = Arc::new(LoopbackTrack {
                    origin: self.session_id,
                    mline,
                    kind,
                });
                let id = format!("{}-{}-{}", self.session_id, kind, mline);
                self.notify(EngineEvent::TrackReceived(TrackHandle::new(id, kind, source)));
            }
        }

        inner.remote = Some(desc);
        self.maybe_connected(&mut inner);
        Ok(())
    }

    async fn add_ice_candidate(&self, candidate: IceCandidate) -> Result<(), CandidateError> {
        if candidate.is_end_of_candidates() {
            return Ok(());
        }
        if !candidate.candidate.trim_start().starts_with("candidate:") {
            return Err(CandidateError::Malformed(candidate.candidate));
        }

        let mut inner = self.inner.lock();
        if inner.closed {
            return Err(CandidateError::Rejected("engine closed".into()));
        }
        inner.candidates.push(candidate);
        Ok(())
    }

    async fn attach_track(&self, track: &TrackHandle) -> Result<(), NegotiationError> {
        let mut inner = self.inner.lock();
        Self::ensure_open(&inner)?;

        if !inner.attached.iter().any(|t| t.same_track(track)) {
            inner.attached.push(track.clone());
        }
        Ok(())
    }

    async fn detach_track(&self, track: &TrackHandle) -> Result<(), NegotiationError> {
        let mut inner = self.inner.lock();
        Self::ensure_open(&inner)?;
        inner.attached.retain(|t| !t.same_track(track));
        Ok(())
    }

    async fn close(&self) {
        {
            let mut inner = self.inner.lock();
            if inner.closed {
                return;
            }
            inner.closed = true;
            inner.attached.clear();
        }
        self.notify(EngineEvent::ConnectionStateChanged(ConnectionState::Closed));
    }
}

/// Factory producing [`LoopbackEngine`]s
///
/// Engines are tracked weakly so callers can look at what a live session
/// did with its engine. An engine is forgotten once its session drops it.
#[derive(Default)]
pub struct LoopbackFactory {
    engines: Mutex<Vec<Weak<LoopbackEngine>>>,
}

impl LoopbackFactory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Engine created for the given session, if it is still alive
    pub fn engine(&self, session_id: SessionId) -> Option<Arc<LoopbackEngine>> {
        self.engines
            .lock()
            .iter()
            .filter_map(Weak::upgrade)
            .find(|e| e.session_id == session_id)
    }

    /// Live engines, in creation order
    pub fn engines(&self) -> Vec<Arc<LoopbackEngine>> {
        self.engines.lock().iter().filter_map(Weak::upgrade).collect()
    }
}

#[async_trait]
impl EngineFactory for LoopbackFactory {
    async fn create(
        &self,
        session_id: SessionId,
        events: EngineEventSender,
    ) -> Result<Arc<dyn MediaEngine>, NegotiationError> {
        let engine = Arc::new(LoopbackEngine::new(session_id, events));

        let mut engines = self.engines.lock();
        engines.retain(|e| e.strong_count() > 0);
        engines.push(Arc::downgrade(&engine));
        drop(engines);

        Ok(engine)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{event_channel, EngineEventReceiver};

    const OFFER: &str = "v=0\r\no=- 1 0 IN IP4 127.0.0.1\r\ns=-\r\nt=0 0\r\n\
                         m=audio 9 UDP/TLS/RTP/SAVPF 111\r\n\
                         m=video 9 UDP/TLS/RTP/SAVPF 96\r\n";

    fn engine() -> (LoopbackEngine, EngineEventReceiver) {
        let (tx, rx) = event_channel();
        (LoopbackEngine::new(SessionId::new(7), tx), rx)
    }

    #[tokio::test]
    async fn test_remote_offer_reports_tracks() {
        let (engine, mut rx) = engine();

        engine
            .set_remote_description(SessionDescription::offer(OFFER))
            .await
            .unwrap();

        let mut kinds = Vec::new();
        while let Ok(EngineEvent::TrackReceived(track)) = rx.try_recv() {
            kinds.push(track.kind());
            let source = track.source::<LoopbackTrack>().unwrap();
            assert_eq!(source.origin, SessionId::new(7));
        }
        assert_eq!(kinds, vec![MediaKind::Audio, MediaKind::Video]);
    }

    #[tokio::test]
    async fn test_answer_requires_offer() {
        let (engine, _rx) = engine();
        assert_eq!(
            engine.create_answer().await,
            Err(NegotiationError::NoRemoteOffer)
        );

        engine
            .set_remote_description(SessionDescription::offer(OFFER))
            .await
            .unwrap();
        let answer = engine.create_answer().await.unwrap();
        assert!(answer.starts_with("v=0"));
        assert_eq!(answer.matches("a=recvonly").count(), 2);
    }

    #[tokio::test]
    async fn test_malformed_sdp() {
        let (engine, _rx) = engine();
        let result = engine
            .set_remote_description(SessionDescription::offer("garbage"))
            .await;
        assert!(matches!(result, Err(NegotiationError::MalformedSdp(_))));
    }

    #[tokio::test]
    async fn test_connected_after_both_descriptions() {
        let (engine, mut rx) = engine();

        let offer = engine.create_offer().await.unwrap();
        engine
            .set_local_description(SessionDescription::offer(offer))
            .await
            .unwrap();
        assert!(rx.try_recv().is_err());

        engine
            .set_remote_description(SessionDescription::answer("v=0\r\n"))
            .await
            .unwrap();
        assert!(matches!(
            rx.try_recv(),
            Ok(EngineEvent::ConnectionStateChanged(ConnectionState::Connected))
        ));
    }

    #[tokio::test]
    async fn test_candidates() {
        let (engine, _rx) = engine();

        engine
            .add_ice_candidate(IceCandidate::end_of_candidates())
            .await
            .unwrap();
        engine
            .add_ice_candidate(IceCandidate::new("candidate:1 1 udp 1 10.0.0.1 5000 typ host"))
            .await
            .unwrap();
        assert!(matches!(
            engine.add_ice_candidate(IceCandidate::new("bogus")).await,
            Err(CandidateError::Malformed(_))
        ));

        assert_eq!(engine.remote_candidates().len(), 1);
    }

    #[tokio::test]
    async fn test_offer_lists_attached_tracks() {
        let (engine, _rx) = engine();
        let track = TrackHandle::new("pub-video", MediaKind::Video, Arc::new(()));

        engine.attach_track(&track).await.unwrap();
        engine.attach_track(&track).await.unwrap();
        assert_eq!(engine.attached_tracks().len(), 1);

        let offer = engine.create_offer().await.unwrap();
        assert!(offer.contains("m=video"));
        assert!(offer.contains("a=msid:pub-video"));

        engine.detach_track(&track).await.unwrap();
        assert!(engine.attached_tracks().is_empty());
    }

    #[tokio::test]
    async fn test_close_is_idempotent() {
        let (engine, mut rx) = engine();

        engine.close().await;
        engine.close().await;

        assert!(engine.is_closed());
        assert!(matches!(
            rx.try_recv(),
            Ok(EngineEvent::ConnectionStateChanged(ConnectionState::Closed))
        ));
        assert!(rx.try_recv().is_err());
        assert_eq!(
            engine.create_offer().await,
            Err(NegotiationError::EngineClosed)
        );
    }

    #[tokio::test]
    async fn test_factory_tracks_live_engines() {
        let factory = LoopbackFactory::new();
        let (tx, _rx) = event_channel();

        let first = factory.create(SessionId::new(1), tx.clone()).await.unwrap();
        let second = factory.create(SessionId::new(2), tx.clone()).await.unwrap();

        assert_eq!(factory.engines().len(), 2);
        assert!(factory.engine(SessionId::new(2)).is_some());
        assert!(factory.engine(SessionId::new(3)).is_none());

        drop(first);
        assert!(factory.engine(SessionId::new(1)).is_none());
        assert_eq!(factory.engines().len(), 1);

        drop(second);
        assert!(factory.engines().is_empty());

        // Dead entries are pruned on the next create
        let _third = factory.create(SessionId::new(3), tx).await.unwrap();
        assert_eq!(factory.engines.lock().len(), 1);
    }
}
