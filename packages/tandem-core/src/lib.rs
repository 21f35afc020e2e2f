//! # Tandem Core
//!
//! Client library for Tandem, the anonymous one-to-one chat service.
//! The relay pairs strangers and forwards their handshake; this crate
//! drives the peer connection on each side of the pair.
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         TANDEM CORE MODULES                             │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │                                                                         │
//! │  ┌──────────────────┐    frames    ┌──────────────────────────────┐    │
//! │  │   Application    │ ───────────► │  PeerConnectionCoordinator   │    │
//! │  │                  │ ◄─────────── │                              │    │
//! │  │ - Relay socket   │  PeerEvent   │ - Media readiness gate       │    │
//! │  │ - Local media    │              │ - Candidate queue per peer   │    │
//! │  │ - Classifier     │              │ - Attempt cap / ICE restart  │    │
//! │  └──────────────────┘              └──────────────┬───────────────┘    │
//! │                                                   │                     │
//! │                                                   ▼                     │
//! │                                    ┌──────────────────────────────┐    │
//! │                                    │       PeerTransport          │    │
//! │                                    │  (WebRTC stack or test fake) │    │
//! │                                    └──────────────────────────────┘    │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Hierarchy
//!
//! - [`error`] - Error types for the entire library
//! - [`network`] - Relay protocol and peer connection coordination

#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]

// ============================================================================
// MODULE DECLARATIONS
// ============================================================================

pub mod error;
pub mod network;

// ============================================================================
// RE-EXPORTS
// ============================================================================

pub use error::{Error, Result};
pub use network::{
    CoordinatorConfig, PeerConnectionCoordinator, PeerEvent, PeerState, PeerTransport,
    RelayClientMessage, RelayServerMessage,
};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
