//! # Peer Transport
//!
//! The seam between the coordinator and whatever actually moves media:
//! a browser `RTCPeerConnection`, a native WebRTC stack, or a test double.
//! Implementations key every call by the remote peer id.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Kind of a session description
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SdpType {
    /// Connection proposal
    Offer,
    /// Connection acceptance
    Answer,
}

/// An SDP offer or answer as carried over the relay
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionDescription {
    /// Offer or answer
    #[serde(rename = "type")]
    pub sdp_type: SdpType,
    /// The SDP body
    pub sdp: String,
}

impl SessionDescription {
    /// Build an offer.
    pub fn offer(sdp: impl Into<String>) -> Self {
        Self {
            sdp_type: SdpType::Offer,
            sdp: sdp.into(),
        }
    }

    /// Build an answer.
    pub fn answer(sdp: impl Into<String>) -> Self {
        Self {
            sdp_type: SdpType::Answer,
            sdp: sdp.into(),
        }
    }
}

/// A single ICE candidate
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IceCandidate {
    /// The candidate string (empty marks end-of-candidates)
    pub candidate: String,
    /// SDP mid
    #[serde(default)]
    pub sdp_mid: Option<String>,
    /// SDP m-line index
    #[serde(default)]
    pub sdp_m_line_index: Option<u16>,
}

impl IceCandidate {
    /// Candidate with no media section hints.
    pub fn new(candidate: impl Into<String>) -> Self {
        Self {
            candidate: candidate.into(),
            sdp_mid: None,
            sdp_m_line_index: None,
        }
    }
}

/// Operations the coordinator needs from a peer connection stack.
#[async_trait]
pub trait PeerTransport: Send + Sync {
    /// Create the connection object for `peer_id` and attach local media.
    async fn open(&self, peer_id: &str) -> Result<()>;

    /// Create an offer and install it as the local description.
    async fn create_offer(&self, peer_id: &str) -> Result<SessionDescription>;

    /// Create an answer and install it as the local description.
    async fn create_answer(&self, peer_id: &str) -> Result<SessionDescription>;

    /// Apply the remote side's offer or answer.
    async fn set_remote_description(
        &self,
        peer_id: &str,
        description: SessionDescription,
    ) -> Result<()>;

    /// Apply one remote network candidate.
    async fn add_ice_candidate(&self, peer_id: &str, candidate: IceCandidate) -> Result<()>;

    /// Ask the stack to gather fresh paths for a failed connection.
    async fn restart_ice(&self, peer_id: &str) -> Result<()>;

    /// Close the connection. Closing an unknown or closed peer is a no-op.
    async fn close(&self, peer_id: &str);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_description_wire_shape() {
        let json = serde_json::to_value(SessionDescription::offer("v=0")).unwrap();
        assert_eq!(json["type"], "offer");
        assert_eq!(json["sdp"], "v=0");

        let parsed: SessionDescription =
            serde_json::from_str(r#"{"type":"answer","sdp":"v=0"}"#).unwrap();
        assert_eq!(parsed, SessionDescription::answer("v=0"));
    }

    #[test]
    fn test_candidate_optional_fields() {
        let parsed: IceCandidate = serde_json::from_str(r#"{"candidate":"c1"}"#).unwrap();
        assert_eq!(parsed, IceCandidate::new("c1"));
    }
}
