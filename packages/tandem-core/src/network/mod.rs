//! # Network Module
//!
//! Client side of a Tandem pairing: the relay protocol and the peer
//! connection coordinator.
//!
//! ## Connection Flow
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      PEER CONNECTION FLOW                               │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │                                                                         │
//! │   Initiator                    Relay                    Responder       │
//! │   ─────────                    ─────                    ─────────       │
//! │                                                                         │
//! │   matched{initiator}  ◄──────────┼──────────►  matched{!initiator}      │
//! │       │                          │                                      │
//! │   wait for media                 │                                      │
//! │   open + offer                   │                                      │
//! │       │ ──── proposal ─────────► │ ──── proposal ───────►  │            │
//! │       │                          │                  wait for media      │
//! │       │                          │                  open + apply        │
//! │       │                          │                  flush candidates    │
//! │       │ ◄─── acceptance ──────── │ ◄─── acceptance ────────│            │
//! │   apply + flush                  │                                      │
//! │       │ ◄──── candidate ───────► │ ◄──── candidate ──────► │            │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The relay only forwards between current partners; everything else is
//! refused before it reaches the other side.

mod coordinator;
mod events;
mod peer;
mod relay_client;
mod transport;

pub use coordinator::{CoordinatorConfig, PeerConnectionCoordinator};
pub use events::{DisconnectReason, PeerEvent};
pub use peer::{PeerSlot, PeerState, RemoteDescription};
pub use relay_client::{BufferInfo, ChatMode, RelayClientMessage, RelayServerMessage};
pub use transport::{IceCandidate, PeerTransport, SdpType, SessionDescription};
