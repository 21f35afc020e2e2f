//! # Peer Connection Coordinator
//!
//! Drives the client side of a pairing: creates the peer connection once
//! local media is ready, exchanges proposal/acceptance/candidate frames
//! through the relay, and reports connection outcomes to the application.
//!
//! ## Candidate Ordering
//!
//! ```text
//!   candidate ──► Pending ──(queue)──────────────┐
//!                   │                            │
//!   remote desc ────┘                            ▼
//!                 Flushing ──(drain in order)── Applied ──► candidate applied
//!                   ▲                                        directly
//!   candidate ──────┘ (appended, drained by the same flush)
//! ```
//!
//! Candidates that arrive before the remote description are applied in
//! arrival order, each exactly once, after it is installed.
//!
//! ## Failure Handling
//!
//! - Connection setup is capped per peer. Past the cap the peer is abandoned
//!   and a disconnect is reported.
//! - A failed connection gets one ICE restart. A second failure tears it down.
//! - Removal is idempotent: a peer is reported gone at most once.
//!
//! Internal locks are never held across an `.await`.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::{mpsc, watch};

use super::events::{DisconnectReason, PeerEvent};
use super::peer::{PeerSlot, PeerState, RemoteDescription};
use super::relay_client::{RelayClientMessage, RelayServerMessage};
use super::transport::{IceCandidate, PeerTransport, SdpType, SessionDescription};
use crate::error::{Error, Result};

/// Coordinator tunables
#[derive(Debug, Clone)]
pub struct CoordinatorConfig {
    /// A peer is abandoned once more than this many setups were made for it
    pub max_attempts: u32,
    /// How long to wait for local media before failing a setup
    pub media_ready_timeout: Duration,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            media_ready_timeout: Duration::from_secs(10),
        }
    }
}

/// Client-side peer connection coordinator.
///
/// Outbound relay frames go to `signals`; lifecycle notices go to `events`.
/// The embedding application forwards relay frames into
/// [`handle_server_message`](Self::handle_server_message), locally gathered
/// candidates into [`local_candidate`](Self::local_candidate) and transport
/// state changes into [`on_connection_state`](Self::on_connection_state).
pub struct PeerConnectionCoordinator {
    transport: Arc<dyn PeerTransport>,
    config: CoordinatorConfig,
    media_ready: watch::Receiver<bool>,
    signals: mpsc::UnboundedSender<RelayClientMessage>,
    events: mpsc::UnboundedSender<PeerEvent>,
    peers: Mutex<HashMap<String, PeerSlot>>,
    attempts: Mutex<HashMap<String, u32>>,
    /// Partners announced by the relay whose connection is not torn down yet
    expected: Mutex<HashSet<String>>,
}

impl PeerConnectionCoordinator {
    /// Create a coordinator.
    ///
    /// `media_ready` flips to `true` once local capture is available.
    pub fn new(
        transport: Arc<dyn PeerTransport>,
        media_ready: watch::Receiver<bool>,
        signals: mpsc::UnboundedSender<RelayClientMessage>,
        events: mpsc::UnboundedSender<PeerEvent>,
        config: CoordinatorConfig,
    ) -> Self {
        Self {
            transport,
            config,
            media_ready,
            signals,
            events,
            peers: Mutex::new(HashMap::new()),
            attempts: Mutex::new(HashMap::new()),
            expected: Mutex::new(HashSet::new()),
        }
    }

    // ========================================================================
    // RELAY DISPATCH
    // ========================================================================

    /// Route one relay frame.
    pub async fn handle_server_message(&self, message: RelayServerMessage) -> Result<()> {
        match message {
            RelayServerMessage::Matched {
                partner_id,
                initiator,
                ..
            } => self.on_matched(&partner_id, initiator).await,
            RelayServerMessage::Proposal { from, payload } => {
                self.handle_proposal(&from, payload).await
            }
            RelayServerMessage::Acceptance { from, payload } => {
                self.handle_acceptance(&from, payload).await
            }
            RelayServerMessage::Candidate { from, payload } => {
                self.handle_candidate(&from, payload).await;
                Ok(())
            }
            RelayServerMessage::PartnerDisconnected | RelayServerMessage::SessionExpired => {
                self.remove_all().await;
                Ok(())
            }
            RelayServerMessage::SignalingError { code, message } => {
                tracing::warn!("Relay refused signaling message ({}): {}", code, message);
                Ok(())
            }
            _ => Ok(()),
        }
    }

    /// A partner was assigned. The initiating side opens the connection
    /// and sends the proposal; the other side waits for it.
    pub async fn on_matched(&self, partner_id: &str, initiator: bool) -> Result<()> {
        self.expected.lock().insert(partner_id.to_string());
        if initiator {
            self.create_peer_connection(partner_id, true).await?;
        } else {
            tracing::debug!("Waiting for proposal from {}", partner_id);
        }
        Ok(())
    }

    // ========================================================================
    // CONNECTION SETUP
    // ========================================================================

    /// Open a connection to `peer_id`.
    ///
    /// Returns `Ok(false)` when one already exists. Waits for local media,
    /// then opens the transport; an initiator also sends the proposal.
    /// Once more than `max_attempts` setups were made, the next one abandons
    /// the peer and reports a disconnect.
    pub async fn create_peer_connection(&self, peer_id: &str, initiator: bool) -> Result<bool> {
        let (attempt, exhausted) = {
            let mut peers = self.peers.lock();
            if peers.get(peer_id).is_some_and(|slot| slot.opened) {
                return Ok(false);
            }

            let mut attempts = self.attempts.lock();
            let count = attempts.entry(peer_id.to_string()).or_insert(0);
            let exhausted = *count > self.config.max_attempts;
            *count += 1;
            if !exhausted {
                peers
                    .entry(peer_id.to_string())
                    .or_insert_with(|| PeerSlot::pending(peer_id))
                    .connecting(initiator);
            }
            (*count, exhausted)
        };

        if exhausted {
            tracing::warn!(
                "Abandoning peer {} after {} connection attempts",
                peer_id,
                attempt
            );
            self.remove_peer(peer_id).await;
            self.emit(PeerEvent::PartnerDisconnected {
                peer_id: peer_id.to_string(),
                reason: DisconnectReason::AttemptsExhausted,
            });
            return Err(Error::TooManyAttempts {
                peer: peer_id.to_string(),
                attempts: attempt,
            });
        }

        tracing::debug!("Connection attempt {} for {}", attempt, peer_id);

        if let Err(err) = self.open_connection(peer_id, initiator).await {
            if let Some(slot) = self.peers.lock().get_mut(peer_id) {
                slot.opened = false;
                slot.state = PeerState::Failed;
            }
            return Err(err);
        }
        Ok(true)
    }

    async fn open_connection(&self, peer_id: &str, initiator: bool) -> Result<()> {
        self.wait_for_media().await?;
        self.transport.open(peer_id).await?;

        // The peer may have been removed while media was pending.
        let still_wanted = self.peers.lock().contains_key(peer_id);
        if !still_wanted {
            self.transport.close(peer_id).await;
            return Err(Error::UnknownPeer(peer_id.to_string()));
        }

        if initiator {
            self.send_proposal(peer_id).await?;
        }
        Ok(())
    }

    async fn wait_for_media(&self) -> Result<()> {
        let timeout = self.config.media_ready_timeout;
        let mut media_ready = self.media_ready.clone();
        let ready = tokio::time::timeout(timeout, async move {
            media_ready.wait_for(|ready| *ready).await.map(|_| ())
        })
        .await;

        match ready {
            Ok(Ok(())) => Ok(()),
            _ => Err(Error::MediaNotReady(timeout)),
        }
    }

    async fn send_proposal(&self, peer_id: &str) -> Result<()> {
        let offer = self.transport.create_offer(peer_id).await?;
        self.signal(RelayClientMessage::Proposal {
            to: peer_id.to_string(),
            payload: offer,
        })
    }

    // ========================================================================
    // HANDSHAKE
    // ========================================================================

    /// Remote proposal: open (if needed), apply it, flush queued candidates
    /// and reply with an acceptance.
    pub async fn handle_proposal(&self, from: &str, offer: SessionDescription) -> Result<()> {
        if offer.sdp_type != SdpType::Offer {
            return Err(Error::UnexpectedDescription(format!(
                "expected offer from {}",
                from
            )));
        }

        self.create_peer_connection(from, false).await?;
        self.apply_remote_description(from, offer).await?;

        let answer = self.transport.create_answer(from).await?;
        self.signal(RelayClientMessage::Acceptance {
            to: from.to_string(),
            payload: answer,
        })
    }

    /// Remote acceptance for our proposal.
    pub async fn handle_acceptance(&self, from: &str, answer: SessionDescription) -> Result<()> {
        if answer.sdp_type != SdpType::Answer {
            return Err(Error::UnexpectedDescription(format!(
                "expected answer from {}",
                from
            )));
        }
        if !self.peers.lock().get(from).is_some_and(|slot| slot.opened) {
            return Err(Error::UnknownPeer(from.to_string()));
        }
        self.apply_remote_description(from, answer).await
    }

    /// Remote candidate. Queued until the remote description is applied.
    ///
    /// Candidates from a peer that is neither tracked nor an announced
    /// partner (for example one already torn down) are dropped.
    pub async fn handle_candidate(&self, from: &str, candidate: IceCandidate) {
        let ready = {
            let mut peers = self.peers.lock();
            if !peers.contains_key(from) && !self.expected.lock().contains(from) {
                tracing::debug!("Dropping candidate from unknown peer {}", from);
                return;
            }
            let slot = peers
                .entry(from.to_string())
                .or_insert_with(|| PeerSlot::pending(from));
            if slot.accepts_candidates() {
                Some(candidate)
            } else {
                slot.pending.push_back(candidate);
                None
            }
        };

        if let Some(candidate) = ready {
            if let Err(err) = self.transport.add_ice_candidate(from, candidate).await {
                tracing::warn!("Failed to add candidate from {}: {}", from, err);
            }
        }
    }

    /// Forward a locally gathered candidate to the peer.
    pub fn local_candidate(&self, peer_id: &str, candidate: IceCandidate) -> Result<()> {
        self.signal(RelayClientMessage::Candidate {
            to: peer_id.to_string(),
            payload: candidate,
        })
    }

    async fn apply_remote_description(
        &self,
        peer_id: &str,
        description: SessionDescription,
    ) -> Result<()> {
        self.transport
            .set_remote_description(peer_id, description)
            .await?;

        let known = match self.peers.lock().get_mut(peer_id) {
            Some(slot) => {
                slot.remote = RemoteDescription::Flushing;
                true
            }
            None => false,
        };
        if !known {
            return Err(Error::UnknownPeer(peer_id.to_string()));
        }

        self.flush_candidates(peer_id).await;
        Ok(())
    }

    async fn flush_candidates(&self, peer_id: &str) {
        loop {
            let next = {
                let mut peers = self.peers.lock();
                let Some(slot) = peers.get_mut(peer_id) else {
                    return;
                };
                match slot.pending.pop_front() {
                    Some(candidate) => candidate,
                    None => {
                        slot.remote = RemoteDescription::Applied;
                        return;
                    }
                }
            };

            if let Err(err) = self.transport.add_ice_candidate(peer_id, next).await {
                tracing::warn!("Failed to add queued candidate for {}: {}", peer_id, err);
            }
        }
    }

    // ========================================================================
    // CONNECTION STATE
    // ========================================================================

    /// Transport state change for `peer_id`.
    pub async fn on_connection_state(&self, peer_id: &str, state: PeerState) {
        match state {
            PeerState::Connecting => {
                if let Some(slot) = self.peers.lock().get_mut(peer_id) {
                    slot.state = PeerState::Connecting;
                }
            }
            PeerState::Connected => {
                let known = match self.peers.lock().get_mut(peer_id) {
                    Some(slot) => {
                        slot.connected();
                        true
                    }
                    None => false,
                };
                if known {
                    self.attempts.lock().remove(peer_id);
                    tracing::info!("Connected to {}", peer_id);
                    self.emit(PeerEvent::Connected {
                        peer_id: peer_id.to_string(),
                    });
                }
            }
            PeerState::Failed => {
                let restart = match self.peers.lock().get_mut(peer_id) {
                    Some(slot) if slot.opened => {
                        slot.state = PeerState::Failed;
                        !std::mem::replace(&mut slot.restarted, true)
                    }
                    _ => return,
                };

                if restart {
                    tracing::info!("Connection to {} failed, restarting ICE", peer_id);
                    self.emit(PeerEvent::Restarting {
                        peer_id: peer_id.to_string(),
                    });
                    match self.restart(peer_id).await {
                        Ok(()) => return,
                        Err(err) => tracing::warn!("ICE restart for {} failed: {}", peer_id, err),
                    }
                }
                self.teardown(peer_id, DisconnectReason::Failed).await;
            }
            PeerState::Disconnected => {
                self.teardown(peer_id, DisconnectReason::Remote).await;
            }
        }
    }

    async fn restart(&self, peer_id: &str) -> Result<()> {
        self.transport.restart_ice(peer_id).await?;
        let initiator = self
            .peers
            .lock()
            .get(peer_id)
            .is_some_and(|slot| slot.initiator);
        if initiator {
            self.send_proposal(peer_id).await?;
        }
        Ok(())
    }

    /// The content classifier flagged the remote stream.
    pub async fn on_content_flagged(&self, peer_id: &str) {
        tracing::info!("Content from {} flagged, leaving", peer_id);
        self.teardown(peer_id, DisconnectReason::ContentFlagged).await;
    }

    // ========================================================================
    // TEARDOWN
    // ========================================================================

    async fn teardown(&self, peer_id: &str, reason: DisconnectReason) {
        if self.remove_peer(peer_id).await {
            self.emit(PeerEvent::PartnerDisconnected {
                peer_id: peer_id.to_string(),
                reason,
            });
        }
    }

    /// Close and forget `peer_id`, dropping its queued candidates.
    ///
    /// Returns `false` if the peer was already gone.
    pub async fn remove_peer(&self, peer_id: &str) -> bool {
        let removed = self.peers.lock().remove(peer_id);
        self.attempts.lock().remove(peer_id);
        self.expected.lock().remove(peer_id);

        match removed {
            Some(slot) => {
                if slot.opened {
                    self.transport.close(peer_id).await;
                }
                tracing::debug!("Removed peer {}", peer_id);
                true
            }
            None => false,
        }
    }

    /// Close every connection. Returns how many were removed.
    pub async fn remove_all(&self) -> usize {
        let peer_ids: Vec<String> = self.peers.lock().keys().cloned().collect();
        self.expected.lock().clear();
        let mut removed = 0;
        for peer_id in peer_ids {
            if self.remove_peer(&peer_id).await {
                removed += 1;
            }
        }
        removed
    }

    // ========================================================================
    // INTROSPECTION
    // ========================================================================

    /// Current state of `peer_id`, if tracked.
    pub fn peer_state(&self, peer_id: &str) -> Option<PeerState> {
        self.peers.lock().get(peer_id).map(|slot| slot.state)
    }

    /// Candidates queued for `peer_id`, if tracked.
    pub fn pending_candidates(&self, peer_id: &str) -> Option<usize> {
        self.peers.lock().get(peer_id).map(|slot| slot.pending.len())
    }

    /// Connection attempts counted for `peer_id` since it last connected.
    pub fn attempts(&self, peer_id: &str) -> u32 {
        self.attempts.lock().get(peer_id).copied().unwrap_or(0)
    }

    /// Number of tracked peers.
    pub fn peer_count(&self) -> usize {
        self.peers.lock().len()
    }

    fn signal(&self, message: RelayClientMessage) -> Result<()> {
        self.signals
            .send(message)
            .map_err(|_| Error::SignalChannelClosed)
    }

    fn emit(&self, event: PeerEvent) {
        if self.events.send(event).is_err() {
            tracing::debug!("Peer event dropped, no listener");
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================
