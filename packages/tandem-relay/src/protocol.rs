//! Relay protocol message definitions.
//!
//! The relay speaks a JSON-over-WebSocket protocol. Every frame is an
//! internally tagged object (`{"type": "...", ...}`); anything that does not
//! match a known shape is rejected at the boundary.
//!
//! Signaling payloads (session descriptions and candidates) stay opaque
//! `serde_json::Value`s here. The relay only checks their outline before
//! forwarding them to the current partner.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Connection handle assigned by the relay on upgrade.
pub type ConnectionId = String;

/// Conversation medium a participant asked for.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatMode {
    #[default]
    Video,
    Voice,
    Text,
}

// ── Client → Relay ────────────────────────────────────────────────────────────

/// Messages sent from a client to the relay server.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Enter matchmaking with the given preferences.
    Join {
        /// Stable id that survives reconnects.
        session_id: String,
        #[serde(default)]
        interests: Vec<String>,
        #[serde(default)]
        chat_mode: ChatMode,
        #[serde(default)]
        safe_mode: bool,
    },

    /// Text chat message for the current partner.
    SendMessage {
        text: String,
    },

    /// Typing indicator for the current partner.
    Typing {
        typing: bool,
    },

    /// Emoji reaction for the current partner.
    Reaction {
        emoji: String,
    },

    /// End the current pairing and go back to the pool.
    Skip,

    /// Connection offer for the partner.
    Proposal {
        to: ConnectionId,
        payload: Value,
    },

    /// Connection answer for the partner.
    Acceptance {
        to: ConnectionId,
        payload: Value,
    },

    /// Network reachability hint for the partner.
    Candidate {
        to: ConnectionId,
        payload: Value,
    },

    /// Keep the session alive.
    Heartbeat,
}

// ── Relay → Client ────────────────────────────────────────────────────────────

/// Pool buffer details attached to queue feedback.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BufferInfo {
    pub buffer_size: usize,
    /// Seconds until the next batch sweep.
    pub next_batch_in: u64,
}

/// Messages sent from the relay server to a client.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// Sent once after upgrade with the handle assigned to this connection.
    Connected {
        connection_id: ConnectionId,
    },

    /// The participant entered the waiting pool.
    Queued {
        position: usize,
        total_in_queue: usize,
        /// Seconds.
        estimated_wait: u64,
        /// Re-entered ahead of fresh arrivals after a skip or disconnect.
        priority: bool,
        buffer: BufferInfo,
    },

    /// Periodic refresh of a queued participant's place in line.
    QueuePositionUpdated {
        position: usize,
        total_in_queue: usize,
        estimated_wait: u64,
        priority: bool,
        buffer: BufferInfo,
    },

    /// A partner was found.
    Matched {
        partner_id: ConnectionId,
        partner_interests: Vec<String>,
        score: f64,
        /// This side sends the connection proposal.
        initiator: bool,
    },

    /// The current partner is gone (skip, disconnect or expiry).
    PartnerDisconnected,

    /// Chat text from the partner.
    ChatMessage {
        from: ConnectionId,
        text: String,
        /// Unix milliseconds.
        timestamp: i64,
    },

    PartnerTyping {
        typing: bool,
    },

    PartnerReaction {
        emoji: String,
    },

    /// An outgoing chat message was refused by the sanitizer.
    MessageBlocked {
        reason: String,
    },

    /// Forwarded connection offer.
    Proposal {
        from: ConnectionId,
        payload: Value,
    },

    /// Forwarded connection answer.
    Acceptance {
        from: ConnectionId,
        payload: Value,
    },

    /// Forwarded network candidate.
    Candidate {
        from: ConnectionId,
        payload: Value,
    },

    /// A signaling message was refused and not forwarded.
    SignalingError {
        code: String,
        message: String,
    },

    /// The session idled out and the connection is about to close.
    SessionExpired,

    /// Generic protocol error.
    Error {
        message: String,
    },
}

impl ServerMessage {
    /// Short name used in logs.
    pub fn kind(&self) -> &'static str {
        match self {
            ServerMessage::Connected { .. } => "connected",
            ServerMessage::Queued { .. } => "queued",
            ServerMessage::QueuePositionUpdated { .. } => "queue_position_updated",
            ServerMessage::Matched { .. } => "matched",
            ServerMessage::PartnerDisconnected => "partner_disconnected",
            ServerMessage::ChatMessage { .. } => "chat_message",
            ServerMessage::PartnerTyping { .. } => "partner_typing",
            ServerMessage::PartnerReaction { .. } => "partner_reaction",
            ServerMessage::MessageBlocked { .. } => "message_blocked",
            ServerMessage::Proposal { .. } => "proposal",
            ServerMessage::Acceptance { .. } => "acceptance",
            ServerMessage::Candidate { .. } => "candidate",
            ServerMessage::SignalingError { .. } => "signaling_error",
            ServerMessage::SessionExpired => "session_expired",
            ServerMessage::Error { .. } => "error",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_join_defaults() {
        let parsed: ClientMessage =
            serde_json::from_str(r#"{"type":"join","session_id":"s-1"}"#).unwrap();
        match parsed {
            ClientMessage::Join {
                session_id,
                interests,
                chat_mode,
                safe_mode,
            } => {
                assert_eq!(session_id, "s-1");
                assert!(interests.is_empty());
                assert_eq!(chat_mode, ChatMode::Video);
                assert!(!safe_mode);
            }
            _ => panic!("Wrong variant"),
        }
    }

    #[test]
    fn test_join_with_preferences() {
        let parsed: ClientMessage = serde_json::from_str(
            r#"{"type":"join","session_id":"s-2","interests":["music","art"],"chat_mode":"text","safe_mode":true}"#,
        )
        .unwrap();
        match parsed {
            ClientMessage::Join {
                interests,
                chat_mode,
                safe_mode,
                ..
            } => {
                assert_eq!(interests, vec!["music", "art"]);
                assert_eq!(chat_mode, ChatMode::Text);
                assert!(safe_mode);
            }
            _ => panic!("Wrong variant"),
        }
    }

    #[test]
    fn test_unknown_type_rejected() {
        let result = serde_json::from_str::<ClientMessage>(r#"{"type":"teleport"}"#);
        assert!(result.is_err());
    }

    #[test]
    fn test_proposal_missing_destination_rejected() {
        let result = serde_json::from_str::<ClientMessage>(
            r#"{"type":"proposal","payload":{"type":"offer","sdp":"v=0"}}"#,
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_skip_and_heartbeat_parse() {
        assert!(matches!(
            serde_json::from_str::<ClientMessage>(r#"{"type":"skip"}"#).unwrap(),
            ClientMessage::Skip
        ));
        assert!(matches!(
            serde_json::from_str::<ClientMessage>(r#"{"type":"heartbeat"}"#).unwrap(),
            ClientMessage::Heartbeat
        ));
    }

    #[test]
    fn test_server_matched_serialization() {
        let msg = ServerMessage::Matched {
            partner_id: "conn-b".to_string(),
            partner_interests: vec!["music".to_string()],
            score: 0.75,
            initiator: true,
        };
        let json = serde_json::to_string(&msg).unwrap();
        assert!(json.contains("\"type\":\"matched\""));
        assert!(json.contains("\"partner_id\":\"conn-b\""));
        assert!(json.contains("\"initiator\":true"));
    }

    #[test]
    fn test_server_queued_serialization() {
        let msg = ServerMessage::Queued {
            position: 2,
            total_in_queue: 5,
            estimated_wait: 30,
            priority: false,
            buffer: BufferInfo {
                buffer_size: 3,
                next_batch_in: 5,
            },
        };
        let value = serde_json::to_value(&msg).unwrap();
        assert_eq!(value["type"], "queued");
        assert_eq!(value["buffer"]["buffer_size"], 3);
        assert_eq!(value["estimated_wait"], 30);
    }

    #[test]
    fn test_forwarded_candidate_keeps_payload() {
        let payload = json!({"candidate": "candidate:1 1 udp 2122260223 10.0.0.1 5000 typ host"});
        let msg = ServerMessage::Candidate {
            from: "conn-a".to_string(),
            payload: payload.clone(),
        };
        let value = serde_json::to_value(&msg).unwrap();
        assert_eq!(value["type"], "candidate");
        assert_eq!(value["from"], "conn-a");
        assert_eq!(value["payload"], payload);
    }

    #[test]
    fn test_unit_variants_serialization() {
        let json = serde_json::to_string(&ServerMessage::PartnerDisconnected).unwrap();
        assert_eq!(json, r#"{"type":"partner_disconnected"}"#);
        let json = serde_json::to_string(&ServerMessage::SessionExpired).unwrap();
        assert_eq!(json, r#"{"type":"session_expired"}"#);
    }

    #[test]
    fn test_kind_matches_tag() {
        let msg = ServerMessage::SignalingError {
            code: "not_partner".to_string(),
            message: "x".to_string(),
        };
        let value = serde_json::to_value(&msg).unwrap();
        assert_eq!(value["type"], msg.kind());
    }
}
