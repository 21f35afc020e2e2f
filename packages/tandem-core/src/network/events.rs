//! # Network Events
//!
//! Events emitted by the coordinator for the application to handle.

/// Why a peer went away
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisconnectReason {
    /// The connection reported `disconnected`
    Remote,
    /// The connection failed again after its one restart
    Failed,
    /// Connection setup exceeded the attempt cap
    AttemptsExhausted,
    /// The content classifier asked to leave
    ContentFlagged,
}

/// Events emitted by the peer connection coordinator
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PeerEvent {
    /// Media is flowing with this peer
    Connected {
        /// The connected peer's id
        peer_id: String,
    },

    /// A failed connection is attempting an ICE restart
    Restarting {
        /// The peer being restarted
        peer_id: String,
    },

    /// The peer is gone; the application should requeue or leave
    PartnerDisconnected {
        /// The disconnected peer's id
        peer_id: String,
        /// Reason for disconnection
        reason: DisconnectReason,
    },
}

impl PeerEvent {
    /// Get the peer id associated with this event
    pub fn peer_id(&self) -> &str {
        match self {
            PeerEvent::Connected { peer_id }
            | PeerEvent::Restarting { peer_id }
            | PeerEvent::PartnerDisconnected { peer_id, .. } => peer_id,
        }
    }

    /// Check if this is a disconnect event
    pub fn is_disconnect(&self) -> bool {
        matches!(self, PeerEvent::PartnerDisconnected { .. })
    }
}
