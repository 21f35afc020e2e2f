//! # Peer Management
//!
//! Per-peer connection state held by the coordinator.

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};

use super::transport::IceCandidate;

/// State of a peer connection
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PeerState {
    /// Not connected
    #[default]
    Disconnected,
    /// Connection in progress
    Connecting,
    /// Connected and ready
    Connected,
    /// Connection failed
    Failed,
}

/// Progress of the remote session description for one peer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum RemoteDescription {
    /// Not applied yet; candidates are queued.
    #[default]
    Pending,
    /// Applied; the queue is being drained in order.
    Flushing,
    /// Applied and drained; candidates go straight to the transport.
    Applied,
}

/// Everything the coordinator tracks about one remote peer.
#[derive(Debug, Clone)]
pub struct PeerSlot {
    /// The remote peer's connection id
    pub peer_id: String,
    /// Connection state
    pub state: PeerState,
    /// Whether a transport connection has been opened (or is opening)
    pub opened: bool,
    /// Whether this side sent the offer
    pub initiator: bool,
    /// Remote description progress
    pub remote: RemoteDescription,
    /// Candidates waiting for the remote description, in arrival order
    pub pending: VecDeque<IceCandidate>,
    /// Whether the one allowed ICE restart was used
    pub restarted: bool,
    /// When the connection reached `Connected`
    pub connected_at: Option<i64>,
}

impl PeerSlot {
    /// Slot created by an early candidate, before any connection exists.
    pub fn pending(peer_id: impl Into<String>) -> Self {
        Self {
            peer_id: peer_id.into(),
            state: PeerState::Disconnected,
            opened: false,
            initiator: false,
            remote: RemoteDescription::Pending,
            pending: VecDeque::new(),
            restarted: false,
            connected_at: None,
        }
    }

    /// Mark the slot as opening a connection.
    pub fn connecting(&mut self, initiator: bool) {
        self.opened = true;
        self.initiator = initiator;
        self.state = PeerState::Connecting;
    }

    /// Mark the slot as connected
    pub fn connected(&mut self) {
        self.state = PeerState::Connected;
        self.connected_at = Some(chrono::Utc::now().timestamp());
    }

    /// Whether candidates can be applied directly.
    pub fn accepts_candidates(&self) -> bool {
        self.opened && self.remote == RemoteDescription::Applied
    }
}

// ============================================================================
// TESTS
// ============================================================================
