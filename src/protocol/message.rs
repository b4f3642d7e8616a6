//! Signaling message types
//!
//! Both directions use the same JSON envelope: an object whose `type` field
//! names the message, with the payload fields alongside it.

use serde::{Deserialize, Serialize};

use crate::engine::IceCandidate;

/// Role a client asks for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RoleRequest {
    Publisher,
    Subscriber,
}

impl RoleRequest {
    pub fn as_str(&self) -> &'static str {
        match self {
            RoleRequest::Publisher => "publisher",
            RoleRequest::Subscriber => "subscriber",
        }
    }
}

/// Message received from a client
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientMessage {
    Role(RoleRequest),
    Offer { sdp: String },
    Answer { sdp: String },
    /// Trickled candidate; an empty candidate string marks end-of-candidates
    Candidate(IceCandidate),
    Hangup,
}

impl ClientMessage {
    /// Wire name of the message, used in logs and errors
    pub fn name(&self) -> &'static str {
        match self {
            ClientMessage::Role(_) => "role",
            ClientMessage::Offer { .. } => "offer",
            ClientMessage::Answer { .. } => "answer",
            ClientMessage::Candidate(_) => "candidate",
            ClientMessage::Hangup => "hangup",
        }
    }
}

/// Message sent to a client
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServerMessage {
    Offer { sdp: String },
    Answer { sdp: String },
    Candidate(IceCandidate),
}

impl ServerMessage {
    pub fn name(&self) -> &'static str {
        match self {
            ServerMessage::Offer { .. } => "offer",
            ServerMessage::Answer { .. } => "answer",
            ServerMessage::Candidate(_) => "candidate",
        }
    }
}

/// `RTCIceCandidateInit` as browsers serialize it
///
/// `usernameFragment` and any other extra fields are ignored.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub(crate) struct CandidateInit {
    #[serde(default)]
    pub candidate: Option<String>,

    #[serde(rename = "sdpMid", default, skip_serializing_if = "Option::is_none")]
    pub sdp_mid: Option<String>,

    #[serde(rename = "sdpMLineIndex", default, skip_serializing_if = "Option::is_none")]
    pub sdp_mline_index: Option<u16>,
}

impl From<CandidateInit> for IceCandidate {
    fn from(init: CandidateInit) -> Self {
        IceCandidate {
            candidate: init.candidate.unwrap_or_default(),
            sdp_mid: init.sdp_mid,
            sdp_mline_index: init.sdp_mline_index,
        }
    }
}

impl From<&IceCandidate> for CandidateInit {
    fn from(c: &IceCandidate) -> Self {
        CandidateInit {
            candidate: Some(c.candidate.clone()),
            sdp_mid: c.sdp_mid.clone(),
            sdp_mline_index: c.sdp_mline_index,
        }
    }
}

/// Candidate payload as it may appear on the wire
///
/// Some clients send the init object JSON-encoded inside a string, others
/// send the bare `candidate:` line.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub(crate) enum WireCandidate {
    Init(CandidateInit),
    Text(String),
}

impl WireCandidate {
    pub fn into_candidate(self) -> IceCandidate {
        match self {
            WireCandidate::Init(init) => init.into(),
            WireCandidate::Text(text) => match serde_json::from_str::<CandidateInit>(&text) {
                Ok(init) => init.into(),
                Err(_) => IceCandidate::new(text),
            },
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub(crate) enum WireClient {
    Role {
        role: RoleRequest,
    },
    Offer {
        sdp: String,
    },
    Answer {
        sdp: String,
    },
    Candidate {
        #[serde(default)]
        candidate: Option<WireCandidate>,
    },
    Hangup,
}

impl From<WireClient> for ClientMessage {
    fn from(wire: WireClient) -> Self {
        match wire {
            WireClient::Role { role } => ClientMessage::Role(role),
            WireClient::Offer { sdp } => ClientMessage::Offer { sdp },
            WireClient::Answer { sdp } => ClientMessage::Answer { sdp },
            WireClient::Candidate { candidate } => ClientMessage::Candidate(
                candidate
                    .map(WireCandidate::into_candidate)
                    .unwrap_or_else(IceCandidate::end_of_candidates),
            ),
            WireClient::Hangup => ClientMessage::Hangup,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub(crate) enum WireServer<'a> {
    Offer { sdp: &'a str },
    Answer { sdp: &'a str },
    Candidate { candidate: CandidateInit },
}

impl<'a> From<&'a ServerMessage> for WireServer<'a> {
    fn from(msg: &'a ServerMessage) -> Self {
        match msg {
            ServerMessage::Offer { sdp } => WireServer::Offer { sdp },
            ServerMessage::Answer { sdp } => WireServer::Answer { sdp },
            ServerMessage::Candidate(c) => WireServer::Candidate {
                candidate: c.into(),
            },
        }
    }
}
