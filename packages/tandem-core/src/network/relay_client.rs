//! # Relay Protocol
//!
//! Client-side mirror of the relay's WebSocket protocol. Frames are JSON
//! objects tagged by `type`; signaling payloads are typed here instead of
//! being opaque values.
//!
//! ```text
//! ┌─────────────┐   join / skip / proposal / ...   ┌─────────────┐
//! │   Client    │ ───────────────────────────────► │    Relay    │
//! │             │ ◄─────────────────────────────── │             │
//! └─────────────┘   matched / candidate / ...      └─────────────┘
//! ```

use serde::{Deserialize, Serialize};

use super::transport::{IceCandidate, SessionDescription};

/// Which kind of chat a participant wants
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatMode {
    /// Video and audio
    #[default]
    Video,
    /// Audio only
    Voice,
    /// Text only
    Text,
}

/// Buffer figures attached to queue notifications
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BufferInfo {
    /// Participants held back from the current sweep
    pub buffer_size: usize,
    /// Seconds until the next sweep
    pub next_batch_in: u64,
}

/// Messages sent from client to relay
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RelayClientMessage {
    /// Enter the waiting pool
    Join {
        /// Browser session identifier
        session_id: String,
        /// Declared interests
        #[serde(default)]
        interests: Vec<String>,
        /// Requested chat mode
        #[serde(default)]
        chat_mode: ChatMode,
        /// Safe-mode preference
        #[serde(default)]
        safe_mode: bool,
    },
    /// Text chat message to the partner
    SendMessage {
        /// Message body
        text: String,
    },
    /// Typing indicator
    Typing {
        /// Whether the user is typing
        typing: bool,
    },
    /// Emoji reaction
    Reaction {
        /// The emoji
        emoji: String,
    },
    /// Leave the current partner
    Skip,
    /// Connection proposal for the partner
    Proposal {
        /// Partner's connection id
        to: String,
        /// The offer
        payload: SessionDescription,
    },
    /// Connection acceptance for the partner
    Acceptance {
        /// Partner's connection id
        to: String,
        /// The answer
        payload: SessionDescription,
    },
    /// Network candidate for the partner
    Candidate {
        /// Partner's connection id
        to: String,
        /// The candidate
        payload: IceCandidate,
    },
    /// Keep-alive
    Heartbeat,
}

/// Messages sent from relay to client
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RelayServerMessage {
    /// Handshake with the assigned connection id
    Connected {
        /// This client's connection id
        connection_id: String,
    },
    /// Admitted to the waiting pool
    Queued {
        /// 1-based queue position
        position: usize,
        /// Pool size
        total_in_queue: usize,
        /// Estimated wait in seconds
        estimated_wait: u64,
        /// Whether this entry was placed at the front
        priority: bool,
        /// Buffer figures
        buffer: BufferInfo,
    },
    /// Periodic queue position push
    QueuePositionUpdated {
        /// 1-based queue position
        position: usize,
        /// Pool size
        total_in_queue: usize,
        /// Estimated wait in seconds
        estimated_wait: u64,
        /// Whether this entry was placed at the front
        priority: bool,
        /// Buffer figures
        buffer: BufferInfo,
    },
    /// Paired with a partner
    Matched {
        /// Partner's connection id
        partner_id: String,
        /// Partner's declared interests
        #[serde(default)]
        partner_interests: Vec<String>,
        /// Compatibility score
        score: f64,
        /// Whether this side sends the proposal
        initiator: bool,
    },
    /// The partner left, skipped, or timed out
    PartnerDisconnected,
    /// Text from the partner
    ChatMessage {
        /// Sender's connection id
        from: String,
        /// Sanitized body
        text: String,
        /// Milliseconds since the epoch
        timestamp: i64,
    },
    /// Partner typing indicator
    PartnerTyping {
        /// Whether the partner is typing
        typing: bool,
    },
    /// Partner emoji reaction
    PartnerReaction {
        /// The emoji
        emoji: String,
    },
    /// Own message was refused
    MessageBlocked {
        /// Refusal reason
        reason: String,
    },
    /// Connection proposal from the partner
    Proposal {
        /// Partner's connection id
        from: String,
        /// The offer
        payload: SessionDescription,
    },
    /// Connection acceptance from the partner
    Acceptance {
        /// Partner's connection id
        from: String,
        /// The answer
        payload: SessionDescription,
    },
    /// Network candidate from the partner
    Candidate {
        /// Partner's connection id
        from: String,
        /// The candidate
        payload: IceCandidate,
    },
    /// A signaling message was refused
    SignalingError {
        /// Machine-readable code
        code: String,
        /// Human-readable message
        message: String,
    },
    /// Idle timeout reached; the socket will close
    SessionExpired,
    /// Generic error
    Error {
        /// Error message
        message: String,
    },
}
