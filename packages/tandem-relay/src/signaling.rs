//! Signaling relay.
//!
//! Proposal, acceptance and candidate frames are only forwarded to the
//! sender's current partner, re-addressed with the sender as origin.
//! Proposal/acceptance refusals are reported back; candidate refusals are
//! dropped silently since candidates are frequent and individually
//! unimportant.

use serde_json::Value;
use thiserror::Error;

use crate::protocol::{ConnectionId, ServerMessage};
use crate::session::SessionManager;

/// The three handshake message kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignalKind {
    Proposal,
    Acceptance,
    Candidate,
}

impl SignalKind {
    pub fn as_str(self) -> &'static str {
        match self {
            SignalKind::Proposal => "proposal",
            SignalKind::Acceptance => "acceptance",
            SignalKind::Candidate => "candidate",
        }
    }
}

/// Why a signaling frame was not forwarded.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SignalRejection {
    /// Destination is not the sender's partner (or there is none).
    #[error("destination {0} is not your current partner")]
    NotPartner(ConnectionId),

    /// Session description without a type tag or body.
    #[error("session description must carry a type and an sdp body")]
    MalformedDescription,

    #[error("candidate payload is malformed")]
    MalformedCandidate,
}

impl SignalRejection {
    /// Stable code sent in `signaling_error`.
    pub fn code(&self) -> &'static str {
        match self {
            SignalRejection::NotPartner(_) => "not_partner",
            SignalRejection::MalformedDescription => "malformed_description",
            SignalRejection::MalformedCandidate => "malformed_candidate",
        }
    }

    /// Build the error frame reported to the sender.
    pub fn to_message(&self) -> ServerMessage {
        ServerMessage::SignalingError {
            code: self.code().to_string(),
            message: self.to_string(),
        }
    }
}

/// A validated frame ready to deliver.
#[derive(Debug, Clone)]
pub struct Forward {
    pub to: ConnectionId,
    pub message: ServerMessage,
}

/// Whether a rejection of this kind is reported to the sender.
pub fn reports_rejection(kind: SignalKind) -> bool {
    !matches!(kind, SignalKind::Candidate)
}

/// Validate a signaling frame from `from` against the authoritative
/// pairing and build the forwarded message.
pub fn route(
    sessions: &SessionManager,
    from: &str,
    kind: SignalKind,
    to: &str,
    payload: Value,
) -> Result<Forward, SignalRejection> {
    if sessions.partner_of(from).map(String::as_str) != Some(to) {
        return Err(SignalRejection::NotPartner(to.to_string()));
    }

    let from = from.to_string();
    let message = match kind {
        SignalKind::Proposal | SignalKind::Acceptance => {
            if !is_session_description(&payload) {
                return Err(SignalRejection::MalformedDescription);
            }
            if kind == SignalKind::Proposal {
                ServerMessage::Proposal { from, payload }
            } else {
                ServerMessage::Acceptance { from, payload }
            }
        }
        SignalKind::Candidate => {
            if !is_candidate(&payload) {
                return Err(SignalRejection::MalformedCandidate);
            }
            ServerMessage::Candidate { from, payload }
        }
    };

    Ok(Forward {
        to: to.to_string(),
        message,
    })
}

fn non_empty_str(value: &Value, field: &str) -> bool {
    value
        .get(field)
        .and_then(Value::as_str)
        .is_some_and(|s| !s.is_empty())
}

fn is_session_description(payload: &Value) -> bool {
    non_empty_str(payload, "type") && non_empty_str(payload, "sdp")
}

/// The candidate string may be empty (end-of-candidates) but must exist.
fn is_candidate(payload: &Value) -> bool {
    payload.get("candidate").is_some_and(Value::is_string)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::ConnectionRegistry;
    use chrono::Utc;
    use serde_json::json;

    fn paired() -> SessionManager {
        let mut registry = ConnectionRegistry::new();
        let mut sessions = SessionManager::new();
        for id in ["a", "b", "c"] {
            registry.register(id, Utc::now());
            registry.bind_session(id, &format!("s-{}", id));
        }
        sessions.create(&mut registry, "a", "b").unwrap();
        sessions
    }

    #[test]
    fn test_forwards_proposal_to_partner() {
        let sessions = paired();
        let payload = json!({"type": "offer", "sdp": "v=0"});
        let forward = route(&sessions, "a", SignalKind::Proposal, "b", payload.clone()).unwrap();

        assert_eq!(forward.to, "b");
        match forward.message {
            ServerMessage::Proposal { from, payload: p } => {
                assert_eq!(from, "a");
                assert_eq!(p, payload);
            }
            _ => panic!("Wrong variant"),
        }
    }

    #[test]
    fn test_acceptance_forwarded_as_acceptance() {
        let sessions = paired();
        let forward = route(
            &sessions,
            "b",
            SignalKind::Acceptance,
            "a",
            json!({"type": "answer", "sdp": "v=0"}),
        )
        .unwrap();
        assert!(matches!(forward.message, ServerMessage::Acceptance { .. }));
    }

    #[test]
    fn test_rejects_non_partner() {
        let sessions = paired();
        let err = route(
            &sessions,
            "a",
            SignalKind::Proposal,
            "c",
            json!({"type": "offer", "sdp": "v=0"}),
        )
        .unwrap_err();
        assert_eq!(err, SignalRejection::NotPartner("c".to_string()));
        assert_eq!(err.code(), "not_partner");
    }

    #[test]
    fn test_rejects_unpaired_sender() {
        let sessions = paired();
        let err = route(&sessions, "c", SignalKind::Candidate, "a", json!({"candidate": ""}))
            .unwrap_err();
        assert_eq!(err.code(), "not_partner");
    }

    #[test]
    fn test_rejects_description_without_type_or_body() {
        let sessions = paired();
        for payload in [
            json!({"sdp": "v=0"}),
            json!({"type": "offer"}),
            json!({"type": "", "sdp": "v=0"}),
            json!("v=0"),
        ] {
            let err = route(&sessions, "a", SignalKind::Proposal, "b", payload).unwrap_err();
            assert_eq!(err, SignalRejection::MalformedDescription);
        }
    }

    #[test]
    fn test_candidate_validation() {
        let sessions = paired();
        assert!(route(&sessions, "a", SignalKind::Candidate, "b", json!({"candidate": ""})).is_ok());
        assert!(route(
            &sessions,
            "a",
            SignalKind::Candidate,
            "b",
            json!({"candidate": "candidate:1 1 udp 1 10.0.0.1 5000 typ host", "sdp_mid": "0"})
        )
        .is_ok());
        assert_eq!(
            route(&sessions, "a", SignalKind::Candidate, "b", json!({"sdp_mid": "0"})).unwrap_err(),
            SignalRejection::MalformedCandidate
        );
    }

    #[test]
    fn test_candidate_rejections_not_reported() {
        assert!(reports_rejection(SignalKind::Proposal));
        assert!(reports_rejection(SignalKind::Acceptance));
        assert!(!reports_rejection(SignalKind::Candidate));
    }

    #[test]
    fn test_rejection_message() {
        match SignalRejection::MalformedDescription.to_message() {
            ServerMessage::SignalingError { code, .. } => assert_eq!(code, "malformed_description"),
            _ => panic!("Wrong variant"),
        }
    }
}
