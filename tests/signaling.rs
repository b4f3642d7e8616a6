//! End-to-end signaling sessions driven through the loopback engine

use std::sync::Arc;
use std::time::Duration;

use futures_util::future::join_all;
use serde_json::{json, Value};
use tokio::time::timeout;

use signal_relay::engine::loopback::LoopbackTrack;
use signal_relay::engine::{ConnectionState, EngineEvent, LoopbackFactory, MediaKind};
use signal_relay::session::{CloseReason, Role, Session, SessionState};
use signal_relay::transport::{Frame, Transport, TransportPeer};
use signal_relay::{PublishPolicy, RegistryConfig, SessionConfig, SessionManager, TrackRegistry};

const PUBLISHER_OFFER: &str = "v=0\r\n\
                               o=- 42 0 IN IP4 127.0.0.1\r\n\
                               s=-\r\n\
                               t=0 0\r\n\
                               m=audio 9 UDP/TLS/RTP/SAVPF 111\r\n\
                               a=sendonly\r\n\
                               m=video 9 UDP/TLS/RTP/SAVPF 96\r\n\
                               a=sendonly\r\n";

const SUBSCRIBER_ANSWER: &str = "v=0\r\no=- 7 0 IN IP4 127.0.0.1\r\ns=-\r\nt=0 0\r\n";

struct Harness {
    manager: Arc<SessionManager>,
    factory: Arc<LoopbackFactory>,
}

impl Harness {
    fn new(config: SessionConfig, registry: RegistryConfig) -> Self {
        let factory = Arc::new(LoopbackFactory::new());
        let manager = SessionManager::new(
            Arc::new(TrackRegistry::with_config(registry)),
            factory.clone(),
            config,
        );
        Self { manager, factory }
    }

    fn standard() -> Self {
        Self::new(SessionConfig::default(), RegistryConfig::default())
    }

    fn registry(&self) -> &Arc<TrackRegistry> {
        self.manager.registry()
    }

    async fn connect(&self) -> Client {
        let (transport, peer) = Transport::channel(32);
        let session = self.manager.create_session(transport).await.unwrap();
        Client { session, peer }
    }

    /// Connect a publisher and wait until both of its tracks are registered
    async fn publisher(&self) -> Client {
        let mut client = self.connect().await;
        client.send(json!({"type": "role", "role": "publisher"})).await;
        client.send(json!({"type": "offer", "sdp": PUBLISHER_OFFER})).await;

        let answer = client.next_message().await;
        assert_eq!(answer["type"], "answer");

        let id = client.session.id();
        let registry = Arc::clone(self.registry());
        wait_until(|| {
            let registry = Arc::clone(&registry);
            async move {
                registry.owner(MediaKind::Audio).await == Some(id)
                    && registry.owner(MediaKind::Video).await == Some(id)
            }
        })
        .await;
        client
    }
}

struct Client {
    session: Arc<Session>,
    peer: TransportPeer,
}

impl Client {
    async fn send(&self, msg: Value) {
        assert!(self.peer.send_text(msg.to_string()).await);
    }

    async fn next_message(&mut self) -> Value {
        match timeout(Duration::from_secs(2), self.peer.recv()).await {
            Ok(Some(Frame::Text(text))) => serde_json::from_str(&text).unwrap(),
            other => panic!("expected a signaling message, got {:?}", other),
        }
    }

    async fn wait_state(&self, state: SessionState) {
        let mut rx = self.session.subscribe_state();
        timeout(Duration::from_secs(2), rx.wait_for(|s| *s == state))
            .await
            .unwrap_or_else(|_| panic!("session never reached {}", state))
            .unwrap();
    }

    async fn wait_closed(&self) {
        timeout(Duration::from_secs(2), self.session.closed())
            .await
            .expect("session did not close");
    }
}

async fn wait_until<F, Fut>(mut cond: F)
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    let poll = async {
        while !cond().await {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    };
    timeout(Duration::from_secs(2), poll)
        .await
        .expect("condition not reached");
}

#[tokio::test]
async fn publisher_tracks_reach_later_subscriber() {
    let harness = Harness::standard();
    let publisher = harness.publisher().await;
    publisher.wait_state(SessionState::Connected).await;
    assert_eq!(publisher.session.role(), Role::Publisher);
    assert_eq!(publisher.session.stats().tracks_published, 2);

    let mut subscriber = harness.connect().await;
    subscriber
        .send(json!({"type": "role", "role": "subscriber"}))
        .await;

    let offer = subscriber.next_message().await;
    assert_eq!(offer["type"], "offer");
    let sdp = offer["sdp"].as_str().unwrap();
    assert!(sdp.contains("m=audio"));
    assert!(sdp.contains("m=video"));

    let engine = harness.factory.engine(subscriber.session.id()).unwrap();
    let attached = engine.attached_tracks();
    assert_eq!(attached.len(), 2);
    for track in &attached {
        let published = harness.registry().subscribe(track.kind()).await.unwrap();
        assert!(track.same_track(&published));

        let source = track.source::<LoopbackTrack>().unwrap();
        assert_eq!(source.origin, publisher.session.id());
    }

    subscriber
        .send(json!({"type": "answer", "sdp": SUBSCRIBER_ANSWER}))
        .await;
    subscriber.wait_state(SessionState::Connected).await;
    assert!(engine.remote_description().is_some());
}

#[tokio::test]
async fn publisher_disconnect_releases_tracks() {
    let harness = Harness::standard();
    let publisher = harness.publisher().await;
    let publisher_id = publisher.session.id();

    drop(publisher.peer);
    timeout(Duration::from_secs(2), publisher.session.closed())
        .await
        .unwrap();

    assert_eq!(
        publisher.session.close_reason(),
        Some(CloseReason::TransportClosed)
    );
    assert!(harness.registry().is_empty().await);
    assert!(harness.manager.get(publisher_id).await.is_none());
    assert!(harness.factory.engine(publisher_id).unwrap().is_closed());

    let mut subscriber = harness.connect().await;
    subscriber
        .send(json!({"type": "role", "role": "subscriber"}))
        .await;
    let offer = subscriber.next_message().await;
    assert_eq!(offer["type"], "offer");

    let engine = harness.factory.engine(subscriber.session.id()).unwrap();
    assert!(engine.attached_tracks().is_empty());
}

#[tokio::test]
async fn second_role_is_rejected_without_closing() {
    let harness = Harness::standard();
    let mut client = harness.connect().await;

    client.send(json!({"type": "role", "role": "subscriber"})).await;
    assert_eq!(client.next_message().await["type"], "offer");

    client.send(json!({"type": "role", "role": "publisher"})).await;
    client.send(json!({"type": "not-a-message"})).await;
    client.send(json!({"type": "offer", "sdp": PUBLISHER_OFFER})).await;

    let session = Arc::clone(&client.session);
    wait_until(|| {
        let session = Arc::clone(&session);
        async move { session.stats().protocol_errors == 3 }
    })
    .await;

    assert_eq!(client.session.role(), Role::Subscriber);
    assert_eq!(client.session.state(), SessionState::Negotiating);
    assert!(!client.session.is_closing());
    assert!(harness.registry().is_empty().await);
}

#[tokio::test]
async fn candidates_are_applied_and_end_marker_ignored() {
    let harness = Harness::standard();
    let client = harness.connect().await;
    let engine = harness.factory.engine(client.session.id()).unwrap();

    client.send(json!({"type": "role", "role": "publisher"})).await;
    client
        .send(json!({
            "type": "candidate",
            "candidate": {
                "candidate": "candidate:1 1 udp 2122260223 10.0.0.1 5000 typ host",
                "sdpMid": "0",
                "sdpMLineIndex": 0
            }
        }))
        .await;
    client
        .send(json!({"type": "candidate", "candidate": ""}))
        .await;
    client
        .send(json!({"type": "candidate", "candidate": "not a candidate"}))
        .await;

    let session = Arc::clone(&client.session);
    wait_until(|| {
        let session = Arc::clone(&session);
        async move { session.stats().candidate_errors == 1 }
    })
    .await;

    let stats = client.session.stats();
    assert_eq!(stats.candidates_applied, 1);
    assert_eq!(stats.protocol_errors, 0);
    assert_eq!(engine.remote_candidates().len(), 1);
    assert_eq!(engine.remote_candidates()[0].sdp_mid.as_deref(), Some("0"));
    assert!(!client.session.is_closing());
}

#[tokio::test]
async fn candidate_before_role_is_a_protocol_error() {
    let harness = Harness::standard();
    let client = harness.connect().await;

    client
        .send(json!({"type": "candidate", "candidate": "candidate:1 1 udp 1 10.0.0.1 5000 typ host"}))
        .await;

    let session = Arc::clone(&client.session);
    wait_until(|| {
        let session = Arc::clone(&session);
        async move { session.stats().protocol_errors == 1 }
    })
    .await;
    assert_eq!(client.session.state(), SessionState::Connecting);
}

#[tokio::test]
async fn concurrent_close_runs_cleanup_once() {
    let harness = Harness::standard();
    let publisher = harness.publisher().await;
    let session = Arc::clone(&publisher.session);

    let results = join_all((0..8).map(|i| {
        let session = Arc::clone(&session);
        tokio::spawn(async move {
            let reason = if i % 2 == 0 {
                CloseReason::Hangup
            } else {
                CloseReason::Shutdown
            };
            session.close(reason).await
        })
    }))
    .await;

    let winners = results
        .into_iter()
        .map(|r| r.unwrap())
        .filter(|closed| *closed)
        .count();
    assert_eq!(winners, 1);

    publisher.wait_closed().await;
    assert!(harness.registry().is_empty().await);
    assert!(harness.manager.is_empty().await);
}

#[tokio::test]
async fn hangup_closes_session() {
    let harness = Harness::standard();
    let mut client = harness.connect().await;

    client.send(json!({"type": "hangup"})).await;
    client.wait_closed().await;

    assert_eq!(client.session.close_reason(), Some(CloseReason::Hangup));
    assert_eq!(client.peer.recv().await, Some(Frame::Close));
    assert_eq!(client.peer.recv().await, None);
}

#[tokio::test]
async fn negotiation_timeout_closes_stalled_session() {
    let harness = Harness::new(
        SessionConfig::default().negotiation_timeout(Duration::from_millis(100)),
        RegistryConfig::default(),
    );

    let stalled = harness.connect().await;
    stalled.send(json!({"type": "role", "role": "publisher"})).await;
    stalled.wait_closed().await;
    assert_eq!(
        stalled.session.close_reason(),
        Some(CloseReason::NegotiationTimeout)
    );

    // A session that made it to connected is no longer bound by the deadline
    let connected = harness.publisher().await;
    connected.wait_state(SessionState::Connected).await;
    tokio::time::sleep(Duration::from_millis(250)).await;
    assert_eq!(connected.session.state(), SessionState::Connected);
}

#[tokio::test]
async fn newer_publisher_preempts_and_survives_old_one_leaving() {
    let harness = Harness::standard();
    let first = harness.publisher().await;
    let second = harness.publisher().await;
    let second_id = second.session.id();

    first.send(json!({"type": "hangup"})).await;
    first.wait_closed().await;

    assert_eq!(harness.registry().owner(MediaKind::Audio).await, Some(second_id));
    assert_eq!(harness.registry().owner(MediaKind::Video).await, Some(second_id));
    assert!(!second.session.is_closing());
}

#[tokio::test]
async fn reject_policy_keeps_first_publisher() {
    let harness = Harness::new(
        SessionConfig::default(),
        RegistryConfig::default().publish_policy(PublishPolicy::Reject),
    );
    let first = harness.publisher().await;
    let first_id = first.session.id();

    let mut second = harness.connect().await;
    second.send(json!({"type": "role", "role": "publisher"})).await;
    second.send(json!({"type": "offer", "sdp": PUBLISHER_OFFER})).await;
    assert_eq!(second.next_message().await["type"], "answer");
    second.wait_state(SessionState::Connected).await;

    assert_eq!(harness.registry().owner(MediaKind::Audio).await, Some(first_id));
    assert_eq!(harness.registry().owner(MediaKind::Video).await, Some(first_id));
    assert_eq!(second.session.stats().tracks_published, 0);
    assert!(!second.session.is_closing());
}

#[tokio::test]
async fn shutdown_closes_every_session() {
    let harness = Harness::standard();
    let publisher = harness.publisher().await;
    let idle = harness.connect().await;

    timeout(Duration::from_secs(2), harness.manager.shutdown())
        .await
        .unwrap();

    for client in [&publisher, &idle] {
        assert_eq!(client.session.state(), SessionState::Closed);
        assert_eq!(client.session.close_reason(), Some(CloseReason::Shutdown));
    }
    assert!(harness.registry().is_empty().await);
}

#[tokio::test]
async fn engine_failure_closes_publisher_and_frees_tracks() {
    let harness = Harness::standard();
    let publisher = harness.publisher().await;
    publisher.wait_state(SessionState::Connected).await;

    let engine = harness.factory.engine(publisher.session.id()).unwrap();
    assert!(
        engine
            .emit(EngineEvent::ConnectionStateChanged(ConnectionState::Failed))
            .await
    );
    publisher.wait_closed().await;

    assert_eq!(
        publisher.session.close_reason(),
        Some(CloseReason::EngineState(ConnectionState::Failed))
    );
    assert!(engine.is_closed());
    assert!(harness.registry().is_empty().await);
    assert!(harness.manager.is_empty().await);
}

#[tokio::test]
async fn malformed_offer_fails_negotiation() {
    let harness = Harness::standard();
    let client = harness.connect().await;
    client.send(json!({"type": "role", "role": "publisher"})).await;
    client
        .send(json!({"type": "offer", "sdp": "this is not sdp"}))
        .await;
    client.wait_closed().await;

    assert!(matches!(
        client.session.close_reason(),
        Some(CloseReason::NegotiationFailed(_))
    ));
    assert_eq!(client.session.stats().protocol_errors, 0);
    assert!(harness.registry().is_empty().await);
    assert!(harness.manager.is_empty().await);
}

#[tokio::test]
async fn closed_sessions_do_not_pin_engines() {
    let harness = Harness::standard();

    for _ in 0..20 {
        let client = harness.connect().await;
        client.send(json!({"type": "role", "role": "publisher"})).await;
        client.send(json!({"type": "hangup"})).await;
        client.wait_closed().await;
    }

    assert!(harness.manager.is_empty().await);
    let factory = Arc::clone(&harness.factory);
    wait_until(|| {
        let factory = Arc::clone(&factory);
        async move { factory.engines().is_empty() }
    })
    .await;
}
