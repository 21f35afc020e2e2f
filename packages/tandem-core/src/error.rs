//! # Error Handling
//!
//! Error types for Tandem Core.
//!
//! ## Error Hierarchy
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                           ERROR HIERARCHY                               │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │                                                                         │
//! │  Error (top-level)                                                     │
//! │  │                                                                      │
//! │  ├── Peer Errors                                                       │
//! │  │   ├── TooManyAttempts       - Connection attempt cap reached        │
//! │  │   ├── MediaNotReady         - Local media never became ready        │
//! │  │   └── UnknownPeer           - No connection for this peer           │
//! │  │                                                                      │
//! │  ├── Transport Errors                                                  │
//! │  │   ├── Transport             - Underlying connection failure         │
//! │  │   ├── RemoteDescription     - Remote offer/answer rejected          │
//! │  │   └── Candidate             - Candidate could not be applied        │
//! │  │                                                                      │
//! │  └── Protocol Errors                                                   │
//! │      ├── UnexpectedDescription - Offer where answer expected, etc.     │
//! │      ├── Serialization         - Malformed relay frame                 │
//! │      └── SignalChannelClosed   - Nobody is forwarding to the relay     │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Peer errors are fatal for that peer only; the coordinator tears the
//! peer down and surfaces a disconnect instead of retrying forever.

use std::time::Duration;

use thiserror::Error;

/// Result type alias for Tandem Core operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for Tandem Core
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    // ========================================================================
    // Peer Errors (100-199)
    // ========================================================================

    /// Too many connection attempts were made for one peer
    #[error("Gave up on peer {peer} after {attempts} connection attempts")]
    TooManyAttempts {
        /// The peer that was abandoned
        peer: String,
        /// Attempts made, including the refused one
        attempts: u32,
    },

    /// Local media did not become ready in time
    #[error("Local media was not ready within {0:?}")]
    MediaNotReady(Duration),

    /// No connection exists for the peer
    #[error("Unknown peer: {0}")]
    UnknownPeer(String),

    // ========================================================================
    // Transport Errors (200-299)
    // ========================================================================

    /// The underlying connection failed
    #[error("Transport error: {0}")]
    Transport(String),

    /// The remote session description could not be applied.
    /// Returned by [`PeerTransport`](crate::network::PeerTransport)
    /// implementations; the coordinator propagates it.
    #[error("Failed to apply remote description: {0}")]
    RemoteDescription(String),

    /// A network candidate could not be applied.
    /// Returned by [`PeerTransport`](crate::network::PeerTransport)
    /// implementations; the coordinator logs it and keeps flushing.
    #[error("Failed to apply candidate: {0}")]
    Candidate(String),

    // ========================================================================
    // Protocol Errors (300-399)
    // ========================================================================

    /// A session description of the wrong kind arrived
    #[error("Unexpected session description: {0}")]
    UnexpectedDescription(String),

    /// A relay frame could not be (de)serialized
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// The outbound signaling channel is closed
    #[error("Signaling channel closed")]
    SignalChannelClosed,
}

impl Error {
    /// Numeric code, grouped by category.
    pub fn code(&self) -> i32 {
        match self {
            // Peer (100-199)
            Error::TooManyAttempts { .. } => 100,
            Error::MediaNotReady(_) => 101,
            Error::UnknownPeer(_) => 102,

            // Transport (200-299)
            Error::Transport(_) => 200,
            Error::RemoteDescription(_) => 201,
            Error::Candidate(_) => 202,

            // Protocol (300-399)
            Error::UnexpectedDescription(_) => 300,
            Error::Serialization(_) => 301,
            Error::SignalChannelClosed => 302,
        }
    }

    /// Whether a later attempt for the same peer may succeed.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Error::MediaNotReady(_) | Error::Transport(_) | Error::Candidate(_)
        )
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Serialization(err.to_string())
    }
}

// ============================================================================
// TESTS
// ============================================================================
