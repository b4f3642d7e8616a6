//! WebRTC media engine built on the `webrtc` crate
//!
//! One `RTCPeerConnection` per session. Remote tracks received from a
//! publisher are copied packet by packet into a `TrackLocalStaticRTP`, which
//! is what the registry hands out: any number of subscriber peer connections
//! can add the same local track and receive the same RTP stream.
//!
//! ```text
//!   publisher PC ── on_track ──► TrackRemote ── read_rtp loop ──┐
//!                                                               ▼
//!                                         TrackLocalStaticRTP (TrackHandle)
//!                                               │          │
//!                                   subscriber PC 1   subscriber PC 2
//! ```

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use webrtc::api::interceptor_registry::register_default_interceptors;
use webrtc::api::media_engine::MediaEngine as CodecRegistry;
use webrtc::api::setting_engine::SettingEngine;
use webrtc::api::{APIBuilder, API};
use webrtc::ice::udp_network::{EphemeralUDP, UDPNetwork};
use webrtc::ice_transport::ice_candidate::{RTCIceCandidate, RTCIceCandidateInit};
use webrtc::ice_transport::ice_server::RTCIceServer;
use webrtc::interceptor::registry::Registry;
use webrtc::peer_connection::configuration::RTCConfiguration;
use webrtc::peer_connection::peer_connection_state::RTCPeerConnectionState;
use webrtc::peer_connection::sdp::session_description::RTCSessionDescription;
use webrtc::peer_connection::RTCPeerConnection;
use webrtc::rtp_transceiver::rtp_codec::RTPCodecType;
use webrtc::rtp_transceiver::rtp_sender::RTCRtpSender;
use webrtc::track::track_local::track_local_static_rtp::TrackLocalStaticRTP;
use webrtc::track::track_local::{TrackLocal, TrackLocalWriter};
use webrtc::track::track_remote::TrackRemote;

use super::{
    ConnectionState, EngineEvent, EngineEventSender, EngineFactory, IceCandidate, MediaEngine,
    MediaKind, SdpType, SessionDescription, TrackHandle,
};
use crate::error::{CandidateError, NegotiationError};
use crate::server::config::PortRange;
use crate::session::SessionId;

/// Default public STUN server
pub const DEFAULT_STUN_SERVER: &str = "stun:stun.l.google.com:19302";

/// Stream id given to relayed local tracks
const RELAY_STREAM_ID: &str = "signal-relay";

/// Configuration for [`RtcEngineFactory`]
#[derive(Debug, Clone)]
pub struct RtcEngineConfig {
    /// ICE server URLs
    pub ice_servers: Vec<String>,

    /// UDP port range for host candidates (None = OS-assigned)
    pub port_range: Option<PortRange>,
}

impl Default for RtcEngineConfig {
    fn default() -> Self {
        Self {
            ice_servers: vec![DEFAULT_STUN_SERVER.to_string()],
            port_range: Some(PortRange::default()),
        }
    }
}

impl RtcEngineConfig {
    pub fn ice_servers(mut self, servers: Vec<String>) -> Self {
        self.ice_servers = servers;
        self
    }

    pub fn port_range(mut self, range: Option<PortRange>) -> Self {
        self.port_range = range;
        self
    }
}

fn engine_err(e: webrtc::Error) -> NegotiationError {
    NegotiationError::Engine(e.to_string())
}

/// Builds an [`RtcEngine`] per session from one shared `webrtc` API object
pub struct RtcEngineFactory {
    api: API,
    rtc_config: RTCConfiguration,
}

impl RtcEngineFactory {
    pub fn new(config: RtcEngineConfig) -> Result<Self, NegotiationError> {
        let mut codecs = CodecRegistry::default();
        codecs.register_default_codecs().map_err(engine_err)?;

        let registry = register_default_interceptors(Registry::new(), &mut codecs)
            .map_err(engine_err)?;

        let mut settings = SettingEngine::default();
        if let Some(range) = config.port_range {
            let udp = EphemeralUDP::new(range.low, range.high)
                .map_err(|e| NegotiationError::Init(format!("port range {}: {}", range, e)))?;
            settings.set_udp_network(UDPNetwork::Ephemeral(udp));
            tracing::info!(ports = %range, "WebRTC UDP port range");
        }

        let api = APIBuilder::new()
            .with_media_engine(codecs)
            .with_interceptor_registry(registry)
            .with_setting_engine(settings)
            .build();

        let ice_servers = if config.ice_servers.is_empty() {
            Vec::new()
        } else {
            vec![RTCIceServer {
                urls: config.ice_servers,
                ..Default::default()
            }]
        };

        Ok(Self {
            api,
            rtc_config: RTCConfiguration {
                ice_servers,
                ..Default::default()
            },
        })
    }
}

#[async_trait]
impl EngineFactory for RtcEngineFactory {
    async fn create(
        &self,
        session_id: SessionId,
        events: EngineEventSender,
    ) -> Result<Arc<dyn MediaEngine>, NegotiationError> {
        let pc = self
            .api
            .new_peer_connection(self.rtc_config.clone())
            .await
            .map_err(|e| NegotiationError::Init(e.to_string()))?;
        let pc = Arc::new(pc);

        install_callbacks(&pc, session_id, events);

        Ok(Arc::new(RtcEngine {
            session_id,
            pc,
            senders: Mutex::new(HashMap::new()),
            closed: AtomicBool::new(false),
        }))
    }
}

fn install_callbacks(pc: &Arc<RTCPeerConnection>, session_id: SessionId, events: EngineEventSender) {
    let tx = events.clone();
    pc.on_ice_candidate(Box::new(move |candidate: Option<RTCIceCandidate>| {
        let tx = tx.clone();
        Box::pin(async move {
            // Gathering complete is signalled with None; nothing to trickle.
            let Some(candidate) = candidate else {
                return;
            };
            match candidate.to_json() {
                Ok(init) => {
                    let candidate = IceCandidate {
                        candidate: init.candidate,
                        sdp_mid: init.sdp_mid,
                        sdp_mline_index: init.sdp_mline_index,
                    };
                    let _ = tx.send(EngineEvent::LocalCandidate(candidate)).await;
                }
                Err(e) => {
                    tracing::warn!(session_id = %session_id, error = %e, "Failed to serialize local candidate");
                }
            }
        })
    }));

    let tx = events.clone();
    pc.on_peer_connection_state_change(Box::new(move |state: RTCPeerConnectionState| {
        let tx = tx.clone();
        Box::pin(async move {
            let state = match state {
                RTCPeerConnectionState::New | RTCPeerConnectionState::Unspecified => {
                    ConnectionState::New
                }
                RTCPeerConnectionState::Connecting => ConnectionState::Connecting,
                RTCPeerConnectionState::Connected => ConnectionState::Connected,
                RTCPeerConnectionState::Disconnected => ConnectionState::Disconnected,
                RTCPeerConnectionState::Failed => ConnectionState::Failed,
                RTCPeerConnectionState::Closed => ConnectionState::Closed,
            };
            let _ = tx.send(EngineEvent::ConnectionStateChanged(state)).await;
        })
    }));

    let tx = events;
    pc.on_track(Box::new(move |remote: Arc<TrackRemote>, _receiver, _transceiver| {
        let tx = tx.clone();
        Box::pin(async move {
            let kind = match remote.kind() {
                RTPCodecType::Audio => MediaKind::Audio,
                RTPCodecType::Video => MediaKind::Video,
                _ => return,
            };

            let local = Arc::new(TrackLocalStaticRTP::new(
                remote.codec().capability,
                format!("{}-{}", session_id, kind),
                RELAY_STREAM_ID.to_string(),
            ));

            tracing::info!(
                session_id = %session_id,
                kind = %kind,
                ssrc = remote.ssrc(),
                "Remote track received"
            );

            spawn_forwarder(session_id, kind, remote, Arc::clone(&local));

            let handle = TrackHandle::new(local.id().to_string(), kind, local);
            let _ = tx.send(EngineEvent::TrackReceived(handle)).await;
        })
    }));
}

/// Copy RTP from the remote track into the relayed local track until the
/// remote side ends
fn spawn_forwarder(
    session_id: SessionId,
    kind: MediaKind,
    remote: Arc<TrackRemote>,
    local: Arc<TrackLocalStaticRTP>,
) {
    tokio::spawn(async move {
        loop {
            match remote.read_rtp().await {
                Ok((packet, _)) => {
                    if let Err(e) = local.write_rtp(&packet).await {
                        if e != webrtc::Error::ErrClosedPipe {
                            tracing::debug!(session_id = %session_id, kind = %kind, error = %e, "RTP write failed");
                        }
                    }
                }
                Err(e) => {
                    tracing::debug!(session_id = %session_id, kind = %kind, error = %e, "Remote track ended");
                    break;
                }
            }
        }
    });
}

/// [`MediaEngine`] backed by an `RTCPeerConnection`
pub struct RtcEngine {
    session_id: SessionId,
    pc: Arc<RTCPeerConnection>,
    senders: Mutex<HashMap<String, Arc<RTCRtpSender>>>,
    closed: AtomicBool,
}

impl RtcEngine {
    fn ensure_open(&self) -> Result<(), NegotiationError> {
        if self.closed.load(Ordering::Acquire) {
            Err(NegotiationError::EngineClosed)
        } else {
            Ok(())
        }
    }

    fn to_rtc(desc: SessionDescription) -> Result<RTCSessionDescription, NegotiationError> {
        let parsed = match desc.sdp_type {
            SdpType::Offer => RTCSessionDescription::offer(desc.sdp),
            SdpType::Answer => RTCSessionDescription::answer(desc.sdp),
        };
        parsed.map_err(|e| NegotiationError::MalformedSdp(e.to_string()))
    }
}

#[async_trait]
impl MediaEngine for RtcEngine {
    async fn create_offer(&self) -> Result<String, NegotiationError> {
        self.ensure_open()?;
        let offer = self.pc.create_offer(None).await.map_err(engine_err)?;
        Ok(offer.sdp)
    }

    async fn create_answer(&self) -> Result<String, NegotiationError> {
        self.ensure_open()?;
        if self.pc.remote_description().await.is_none() {
            return Err(NegotiationError::NoRemoteOffer);
        }
        let answer = self.pc.create_answer(None).await.map_err(engine_err)?;
        Ok(answer.sdp)
    }

    async fn set_local_description(&self, desc: SessionDescription) -> Result<(), NegotiationError> {
        self.ensure_open()?;
        let desc = Self::to_rtc(desc)?;
        self.pc.set_local_description(desc).await.map_err(engine_err)
    }

    async fn set_remote_description(&self, desc: SessionDescription) -> Result<(), NegotiationError> {
        self.ensure_open()?;
        let desc = Self::to_rtc(desc)?;
        self.pc
            .set_remote_description(desc)
            .await
            .map_err(|e| NegotiationError::MalformedSdp(e.to_string()))
    }

    async fn add_ice_candidate(&self, candidate: IceCandidate) -> Result<(), CandidateError> {
        if candidate.is_end_of_candidates() {
            return Ok(());
        }
        if self.closed.load(Ordering::Acquire) {
            return Err(CandidateError::Rejected("engine closed".into()));
        }

        let init = RTCIceCandidateInit {
            candidate: candidate.candidate,
            sdp_mid: candidate.sdp_mid,
            sdp_mline_index: candidate.sdp_mline_index,
            username_fragment: None,
        };
        self.pc
            .add_ice_candidate(init)
            .await
            .map_err(|e| CandidateError::Rejected(e.to_string()))
    }

    async fn attach_track(&self, track: &TrackHandle) -> Result<(), NegotiationError> {
        self.ensure_open()?;
        if self.senders.lock().contains_key(track.id()) {
            return Ok(());
        }

        let local = track.source::<TrackLocalStaticRTP>().ok_or_else(|| {
            NegotiationError::Engine(format!("track {} was not produced by this engine", track.id()))
        })?;

        let sender = self
            .pc
            .add_track(local as Arc<dyn TrackLocal + Send + Sync>)
            .await
            .map_err(engine_err)?;

        // Drain RTCP so the interceptors keep running.
        let reader = Arc::clone(&sender);
        tokio::spawn(async move {
            let mut buf = vec![0u8; 1500];
            while reader.read(&mut buf).await.is_ok() {}
        });

        self.senders.lock().insert(track.id().to_string(), sender);
        tracing::debug!(session_id = %self.session_id, track = track.id(), "Track attached");
        Ok(())
    }

    async fn detach_track(&self, track: &TrackHandle) -> Result<(), NegotiationError> {
        self.ensure_open()?;
        let sender = self.senders.lock().remove(track.id());
        if let Some(sender) = sender {
            self.pc.remove_track(&sender).await.map_err(engine_err)?;
        }
        Ok(())
    }

    async fn close(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        self.senders.lock().clear();
        if let Err(e) = self.pc.close().await {
            tracing::debug!(session_id = %self.session_id, error = %e, "Peer connection close failed");
        }
    }
}
