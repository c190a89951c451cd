//! Signaling wire protocol: JSON text frames over a websocket.
//!
//! Envelopes are tagged on `type`. The hub only interprets envelope
//! metadata (room ids, target sessions); SDP offers, answers, and ICE
//! candidates pass through as opaque JSON values.
//!
//! Server-stamped fields (`session_id`, `sender_session`, `joined_at`) are
//! authoritative; clients cannot forge them because the hub rebuilds every
//! outbound envelope.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Frames a client may send to the hub.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientEvent {
    JoinRoom {
        room_id: String,
        #[serde(default)]
        device_name: Option<String>,
    },
    WebrtcOffer {
        target_session: Uuid,
        offer: serde_json::Value,
    },
    WebrtcAnswer {
        target_session: Uuid,
        answer: serde_json::Value,
    },
    IceCandidate {
        target_session: Uuid,
        candidate: serde_json::Value,
    },
    LeaveRoom,
    Ping,
}

/// A peer as visible to other members of the same room.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PeerInfo {
    pub session_id: Uuid,
    #[serde(default)]
    pub device_name: Option<String>,
    pub joined_at: DateTime<Utc>,
}

/// Frames the hub sends to clients.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerEvent {
    Joined {
        session_id: Uuid,
        peers: Vec<PeerInfo>,
    },
    PeerJoined {
        session_id: Uuid,
        #[serde(default)]
        device_name: Option<String>,
        joined_at: DateTime<Utc>,
    },
    PeerLeft {
        session_id: Uuid,
    },
    WebrtcOffer {
        sender_session: Uuid,
        offer: serde_json::Value,
    },
    WebrtcAnswer {
        sender_session: Uuid,
        answer: serde_json::Value,
    },
    IceCandidate {
        sender_session: Uuid,
        candidate: serde_json::Value,
    },
    Pong,
    Error {
        code: SignalErrorCode,
        message: String,
    },
}

/// Error codes the hub reports over the signaling channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignalErrorCode {
    ValidationFailed,
    Unauthenticated,
    RateLimited,
    UnknownPeer,
    CrossRoomForbidden,
    FrameTooLarge,
    SendBufferExhausted,
    Unavailable,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn join_room_round_trips_through_type_tag() {
        let frame = r#"{"type":"join_room","room_id":"abc123","device_name":"laptop"}"#;
        let event: ClientEvent = serde_json::from_str(frame).unwrap();
        match event {
            ClientEvent::JoinRoom {
                room_id,
                device_name,
            } => {
                assert_eq!(room_id, "abc123");
                assert_eq!(device_name.as_deref(), Some("laptop"));
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[test]
    fn ping_parses_without_extra_fields() {
        let event: ClientEvent = serde_json::from_str(r#"{"type":"ping"}"#).unwrap();
        assert!(matches!(event, ClientEvent::Ping));
    }

    #[test]
    fn unknown_type_is_rejected() {
        let result = serde_json::from_str::<ClientEvent>(r#"{"type":"teleport"}"#);
        assert!(result.is_err());
    }

    #[test]
    fn client_supplied_sender_session_is_ignored_on_parse() {
        // The hub stamps sender_session itself; a spoofed copy in the inbound
        // frame is just an ignored unknown field.
        let frame = r#"{"type":"webrtc_offer","target_session":"7b1c9f04-98a3-4a82-bb1e-0a5f8bca1a11","sender_session":"11111111-1111-1111-1111-111111111111","offer":{"sdp":"v=0"}}"#;
        let event: ClientEvent = serde_json::from_str(frame).unwrap();
        assert!(matches!(event, ClientEvent::WebrtcOffer { .. }));
    }

    #[test]
    fn error_code_serializes_snake_case() {
        let event = ServerEvent::Error {
            code: SignalErrorCode::CrossRoomForbidden,
            message: "target session is in another room".into(),
        };
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains(r#""code":"cross_room_forbidden""#));
    }
}
