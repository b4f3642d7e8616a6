//! JSON encoding and decoding of signaling messages

use serde_json::Value;

use super::message::{ClientMessage, ServerMessage, WireClient, WireServer};
use crate::error::ProtocolError;

const CLIENT_TYPES: &[&str] = &["role", "offer", "answer", "candidate", "hangup"];

/// Decode one text frame from a client
///
/// Never panics; anything that is not a well-formed client message comes
/// back as a [`ProtocolError`].
pub fn decode(text: &str) -> Result<ClientMessage, ProtocolError> {
    let value: Value =
        serde_json::from_str(text).map_err(|e| ProtocolError::Malformed(e.to_string()))?;

    let kind = match value.get("type") {
        Some(Value::String(kind)) => kind,
        Some(other) => return Err(ProtocolError::UnknownType(other.to_string())),
        None => return Err(ProtocolError::Malformed("missing \"type\" field".into())),
    };

    if !CLIENT_TYPES.contains(&kind.as_str()) {
        return Err(ProtocolError::UnknownType(kind.clone()));
    }

    let wire: WireClient =
        serde_json::from_value(value).map_err(|e| ProtocolError::Malformed(e.to_string()))?;
    Ok(wire.into())
}

/// Encode a server message as a JSON text frame
pub fn encode(msg: &ServerMessage) -> String {
    // Serializing plain strings and integers cannot fail.
    serde_json::to_string(&WireServer::from(msg)).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::engine::IceCandidate;
    use crate::protocol::RoleRequest;

    #[test]
    fn test_decode_role() {
        assert_eq!(
            decode(r#"{"type":"role","role":"publisher"}"#).unwrap(),
            ClientMessage::Role(RoleRequest::Publisher)
        );
        assert_eq!(
            decode(r#"{"type":"role","role":"subscriber"}"#).unwrap(),
            ClientMessage::Role(RoleRequest::Subscriber)
        );
        assert!(matches!(
            decode(r#"{"type":"role","role":"admin"}"#),
            Err(ProtocolError::Malformed(_))
        ));
    }

    #[test]
    fn test_decode_sdp_messages() {
        assert_eq!(
            decode(r#"{"type":"offer","sdp":"v=0"}"#).unwrap(),
            ClientMessage::Offer { sdp: "v=0".into() }
        );
        assert_eq!(
            decode(r#"{"type":"answer","sdp":"v=0"}"#).unwrap(),
            ClientMessage::Answer { sdp: "v=0".into() }
        );
        assert!(matches!(
            decode(r#"{"type":"offer"}"#),
            Err(ProtocolError::Malformed(_))
        ));
    }

    #[test]
    fn test_decode_candidate_object() {
        let msg = decode(
            r#"{"type":"candidate","candidate":{"candidate":"candidate:1 1 udp 1 10.0.0.1 5000 typ host","sdpMid":"0","sdpMLineIndex":0,"usernameFragment":"abcd"}}"#,
        )
        .unwrap();

        assert_eq!(
            msg,
            ClientMessage::Candidate(IceCandidate {
                candidate: "candidate:1 1 udp 1 10.0.0.1 5000 typ host".into(),
                sdp_mid: Some("0".into()),
                sdp_mline_index: Some(0),
            })
        );
    }

    #[test]
    fn test_decode_candidate_string_forms() {
        let encoded = json!({
            "type": "candidate",
            "candidate": r#"{"candidate":"candidate:2 1 udp 1 10.0.0.2 5001 typ host","sdpMid":"1"}"#,
        });
        let ClientMessage::Candidate(c) = decode(&encoded.to_string()).unwrap() else {
            panic!("expected candidate");
        };
        assert_eq!(c.candidate, "candidate:2 1 udp 1 10.0.0.2 5001 typ host");
        assert_eq!(c.sdp_mid.as_deref(), Some("1"));

        let ClientMessage::Candidate(c) =
            decode(r#"{"type":"candidate","candidate":"candidate:3 1 udp 1 10.0.0.3 5002 typ host"}"#)
                .unwrap()
        else {
            panic!("expected candidate");
        };
        assert_eq!(c.candidate, "candidate:3 1 udp 1 10.0.0.3 5002 typ host");
        assert!(c.sdp_mid.is_none());
    }

    #[test]
    fn test_decode_end_of_candidates() {
        for text in [
            r#"{"type":"candidate"}"#,
            r#"{"type":"candidate","candidate":null}"#,
            r#"{"type":"candidate","candidate":""}"#,
            r#"{"type":"candidate","candidate":{"candidate":"","sdpMid":"0"}}"#,
        ] {
            match decode(text) {
                Ok(ClientMessage::Candidate(c)) => assert!(c.is_end_of_candidates(), "{}", text),
                other => panic!("{} decoded to {:?}", text, other),
            }
        }
    }

    #[test]
    fn test_decode_errors() {
        assert!(matches!(decode("not json"), Err(ProtocolError::Malformed(_))));
        assert!(matches!(decode("{}"), Err(ProtocolError::Malformed(_))));
        assert!(matches!(decode("[1,2]"), Err(ProtocolError::Malformed(_))));
        assert_eq!(
            decode(r#"{"type":"bye"}"#),
            Err(ProtocolError::UnknownType("bye".into()))
        );
        assert!(matches!(
            decode(r#"{"type":7}"#),
            Err(ProtocolError::UnknownType(_))
        ));
    }

    #[test]
    fn test_decode_hangup() {
        assert_eq!(decode(r#"{"type":"hangup"}"#).unwrap(), ClientMessage::Hangup);
    }

    #[test]
    fn test_encode() {
        let offer: Value =
            serde_json::from_str(&encode(&ServerMessage::Offer { sdp: "v=0".into() })).unwrap();
        assert_eq!(offer, json!({"type": "offer", "sdp": "v=0"}));

        let candidate: Value = serde_json::from_str(&encode(&ServerMessage::Candidate(IceCandidate {
            candidate: "candidate:1 1 udp 1 10.0.0.1 5000 typ host".into(),
            sdp_mid: Some("0".into()),
            sdp_mline_index: Some(0),
        })))
        .unwrap();
        assert_eq!(
            candidate,
            json!({
                "type": "candidate",
                "candidate": {
                    "candidate": "candidate:1 1 udp 1 10.0.0.1 5000 typ host",
                    "sdpMid": "0",
                    "sdpMLineIndex": 0,
                }
            })
        );
    }
}
