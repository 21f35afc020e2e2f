//! The matchmaker: one owned object holding every matchmaking table.
//!
//! All mutations go through `&mut Matchmaker`, so a single lock around it
//! (see `state.rs`) serializes every event. Operations that must happen
//! later (a delayed re-admission, the second half of a skip) are returned
//! as [`Deferred`] steps; the caller sleeps and then hands them back to
//! [`Matchmaker::run_deferred`].
//!
//! Ordering of the skip path:
//!
//! ```text
//!   skip(A)                          after skip_notify_delay
//!   ├─ tear down A⇄B                 ├─ notify A: partner_disconnected
//!   ├─ remember A/B as last skip     ├─ readmit A (priority)
//!   └─ notify B: partner_disconnected└─ readmit B (priority)
//! ```
//!
//! The delay only narrows the window in which A's next handshake could
//! overtake B's teardown; it is not an ordering guarantee.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde_json::Value;

use crate::config::MatchConfig;
use crate::matching::MatchingPolicy;
use crate::moderation::{MessageSanitizer, Sanitized};
use crate::participant::{Entry, Presence};
use crate::pool::{self, PoolStats, WaitingPool};
use crate::protocol::{BufferInfo, ChatMode, ConnectionId, ServerMessage};
use crate::registry::ConnectionRegistry;
use crate::session::{SessionError, SessionManager};
use crate::signaling::{self, SignalKind};

/// Delivers server messages to connected clients.
pub trait Notifier: Send + Sync {
    /// Queue a message for a client. Returns false if it is not connected.
    fn notify(&self, to: &str, message: ServerMessage) -> bool;

    /// Drop the client's outbound channel so its socket closes.
    fn close(&self, to: &str);
}

/// Preferences carried by a join.
#[derive(Debug, Clone, Default)]
pub struct JoinRequest {
    pub session_id: String,
    pub interests: Vec<String>,
    pub chat_mode: ChatMode,
    pub safe_mode: bool,
}

/// Work to run after a delay.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Deferred {
    /// Put a participant back in the pool.
    Readmit {
        handle: ConnectionId,
        entry: Entry,
        after: Duration,
    },
    /// Notify the skipping side, then re-admit both.
    FinishSkip {
        initiator: ConnectionId,
        partner: ConnectionId,
        after: Duration,
    },
}

impl Deferred {
    pub fn delay(&self) -> Duration {
        match self {
            Deferred::Readmit { after, .. } | Deferred::FinishSkip { after, .. } => *after,
        }
    }
}

/// Counts served on `/health`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Occupancy {
    pub connected: usize,
    pub queued: usize,
    pub active_chats: usize,
}

pub struct Matchmaker {
    config: MatchConfig,
    registry: ConnectionRegistry,
    pool: WaitingPool,
    sessions: SessionManager,
    policy: MatchingPolicy,
    sanitizer: Box<dyn MessageSanitizer>,
    notifier: Arc<dyn Notifier>,
}

impl Matchmaker {
    pub fn new(
        config: MatchConfig,
        policy: MatchingPolicy,
        sanitizer: Box<dyn MessageSanitizer>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            config,
            registry: ConnectionRegistry::new(),
            pool: WaitingPool::new(),
            sessions: SessionManager::new(),
            policy,
            sanitizer,
            notifier,
        }
    }

    #[cfg(test)]
    pub fn config(&self) -> &MatchConfig {
        &self.config
    }

    #[cfg(test)]
    pub fn registry(&self) -> &ConnectionRegistry {
        &self.registry
    }

    #[cfg(test)]
    pub fn pool(&self) -> &WaitingPool {
        &self.pool
    }

    #[cfg(test)]
    pub fn sessions(&self) -> &SessionManager {
        &self.sessions
    }

    // ── Connection lifecycle ──────────────────────────────────────────────

    /// Register a freshly upgraded connection.
    pub fn connect(&mut self, handle: &str, now: DateTime<Utc>) {
        self.registry.register(handle, now);
        tracing::info!(connection_id = handle, "Participant registered");
    }

    pub fn touch(&mut self, handle: &str, now: DateTime<Utc>) {
        self.registry.touch(handle, now);
    }

    /// Remove a participant and everything hanging off it: pool slot,
    /// pairing, session binding, stale partner references. The partner, if
    /// any, is told right away and re-admitted after `requeue_delay`.
    pub fn deregister(&mut self, handle: &str) -> Vec<Deferred> {
        if !self.registry.contains(handle) {
            return Vec::new();
        }

        let mut deferred = Vec::new();
        self.pool.remove(handle);

        if let Some(partner) = self.sessions.end(&mut self.registry, handle) {
            self.notifier.notify(&partner, ServerMessage::PartnerDisconnected);
            if let Some(p) = self.registry.get_mut(&partner) {
                p.entry = Entry::FromDisconnect;
            }
            deferred.push(Deferred::Readmit {
                handle: partner,
                entry: Entry::FromDisconnect,
                after: self.config.requeue_delay,
            });
        }

        self.registry.remove(handle);
        tracing::info!(connection_id = handle, "Participant deregistered");

        if self.pool.len() >= 2 {
            self.run_batch_sweep();
        }
        debug_assert!(self.is_consistent());

        deferred
    }

    // ── Joining ───────────────────────────────────────────────────────────

    /// Enter matchmaking: try a direct match while the pool is small,
    /// otherwise wait in the pool.
    pub fn join(&mut self, handle: &str, request: JoinRequest) -> Vec<Deferred> {
        let Some(participant) = self.registry.get(handle) else {
            tracing::warn!(connection_id = handle, "Join from unregistered connection");
            return Vec::new();
        };
        if !participant.is_idle() {
            tracing::debug!(connection_id = handle, "Duplicate join ignored");
            return Vec::new();
        }

        let mut deferred = Vec::new();
        if let Some(stale) = self.registry.by_session(&request.session_id).cloned() {
            if stale != handle {
                tracing::info!(
                    connection_id = handle,
                    stale = stale.as_str(),
                    "Evicting stale connection for returning session"
                );
                self.notifier.close(&stale);
                deferred.extend(self.deregister(&stale));
            }
        }

        if let Some(p) = self.registry.get_mut(handle) {
            p.interests = request.interests;
            p.chat_mode = request.chat_mode;
            p.safe_mode = request.safe_mode;
            p.entry = Entry::Fresh;
        }
        self.registry.bind_session(handle, &request.session_id);

        if pool::should_attempt_immediate(self.pool.len(), &self.config)
            && self.try_immediate(handle)
        {
            return deferred;
        }

        self.admit(handle, Entry::Fresh);
        deferred
    }

    /// Search the pool for `handle` and pair on success.
    fn try_immediate(&mut self, handle: &str) -> bool {
        let Some(found) = self
            .pool
            .find_immediate(handle, &self.registry, &mut self.policy)
        else {
            return false;
        };
        self.start_session(handle, &found, None).is_ok()
    }

    /// Put a participant in the pool and tell it where it stands.
    fn admit(&mut self, handle: &str, entry: Entry) {
        let Some(p) = self.registry.get_mut(handle) else {
            return;
        };
        p.presence = Presence::Queued;
        p.entry = entry;
        self.pool.enqueue(handle, entry.is_priority());

        let position = self.pool.position_of(handle).unwrap_or(self.pool.len());
        let priority = entry.is_priority();
        let message = ServerMessage::Queued {
            position,
            total_in_queue: self.pool.len(),
            estimated_wait: self.config.estimated_wait_secs(position, priority),
            priority,
            buffer: self.buffer_info(),
        };
        self.notifier.notify(handle, message);
        tracing::debug!(connection_id = handle, position = position, priority = priority, "Queued");
    }

    /// Re-enter a participant that lost its partner. Tries a direct match
    /// first regardless of pool size.
    fn readmit(&mut self, handle: &str, entry: Entry) {
        let idle = self.registry.get(handle).map(|p| p.is_idle()).unwrap_or(false);
        if !idle {
            tracing::debug!(connection_id = handle, "Readmit skipped; participant gone or busy");
            return;
        }
        if let Some(p) = self.registry.get_mut(handle) {
            p.entry = entry;
        }
        if !self.try_immediate(handle) {
            self.admit(handle, entry);
        }
    }

    // ── Sessions ──────────────────────────────────────────────────────────

    /// Pair `a` (the initiator) with `b` and notify both.
    pub fn start_session(&mut self, a: &str, b: &str, score: Option<f64>) -> Result<(), SessionError> {
        if let Err(e) = self.sessions.create(&mut self.registry, a, b) {
            tracing::debug!(a = a, b = b, error = %e, "Pairing attempt skipped");
            return Err(e);
        }
        self.pool.remove(a);
        self.pool.remove(b);

        let (Some(first), Some(second)) = (self.registry.get(a), self.registry.get(b)) else {
            return Ok(());
        };
        let score = match score {
            Some(score) => score,
            None => self.policy.score(first, second),
        };
        let first_interests = first.interests.clone();
        let second_interests = second.interests.clone();

        self.notifier.notify(
            a,
            ServerMessage::Matched {
                partner_id: b.to_string(),
                partner_interests: second_interests,
                score,
                initiator: true,
            },
        );
        self.notifier.notify(
            b,
            ServerMessage::Matched {
                partner_id: a.to_string(),
                partner_interests: first_interests,
                score,
                initiator: false,
            },
        );
        debug_assert!(self.is_consistent());
        Ok(())
    }

    /// First half of a skip: tear down, notify the skipped side.
    pub fn skip(&mut self, initiator: &str) -> Vec<Deferred> {
        match self.sessions.skip(&mut self.registry, initiator) {
            Ok(partner) => {
                self.notifier.notify(&partner, ServerMessage::PartnerDisconnected);
                tracing::info!(connection_id = initiator, partner = partner.as_str(), "Skipped");
                vec![Deferred::FinishSkip {
                    initiator: initiator.to_string(),
                    partner,
                    after: self.config.skip_notify_delay,
                }]
            }
            Err(e) => {
                tracing::debug!(connection_id = initiator, error = %e, "Skip refused");
                self.notifier.notify(
                    initiator,
                    ServerMessage::Error {
                        message: "No active partner to skip".to_string(),
                    },
                );
                Vec::new()
            }
        }
    }

    /// Run a step previously returned as [`Deferred`].
    pub fn run_deferred(&mut self, step: Deferred) {
        match step {
            Deferred::Readmit { handle, entry, .. } => self.readmit(&handle, entry),
            Deferred::FinishSkip {
                initiator, partner, ..
            } => {
                let initiator_idle = self
                    .registry
                    .get(&initiator)
                    .map(|p| p.is_idle())
                    .unwrap_or(false);
                if initiator_idle {
                    self.notifier
                        .notify(&initiator, ServerMessage::PartnerDisconnected);
                }
                self.readmit(&initiator, Entry::FromSkip);
                self.readmit(&partner, Entry::FromSkip);
            }
        }
    }

    // ── Timers ────────────────────────────────────────────────────────────

    /// Batch-pair the matchable prefix of the pool. Returns sessions made.
    pub fn run_batch_sweep(&mut self) -> usize {
        let pairs = self
            .pool
            .batch_sweep(&self.registry, &mut self.policy, &self.config);
        let created = pairs
            .into_iter()
            .filter(|pair| {
                self.start_session(&pair.first, &pair.second, Some(pair.score))
                    .is_ok()
            })
            .count();
        if created > 0 {
            tracing::info!(created = created, remaining = self.pool.len(), "Batch sweep");
        }
        created
    }

    /// Expire participants idle longer than the session timeout.
    pub fn expire_idle(&mut self, now: DateTime<Utc>) -> Vec<Deferred> {
        let expired = self.registry.expired(now, self.config.session_timeout);
        let mut deferred = Vec::new();
        for handle in expired {
            tracing::info!(connection_id = handle.as_str(), "Session expired");
            self.notifier.notify(&handle, ServerMessage::SessionExpired);
            self.notifier.close(&handle);
            deferred.extend(self.deregister(&handle));
        }
        deferred
    }

    /// Push every queued participant its current position.
    pub fn broadcast_positions(&self) {
        let total = self.pool.len();
        let buffer = self.buffer_info();
        for (index, handle) in self.pool.iter().enumerate() {
            let priority = self
                .registry
                .get(handle)
                .map(|p| p.entry.is_priority())
                .unwrap_or(false);
            let position = index + 1;
            self.notifier.notify(
                handle,
                ServerMessage::QueuePositionUpdated {
                    position,
                    total_in_queue: total,
                    estimated_wait: self.config.estimated_wait_secs(position, priority),
                    priority,
                    buffer: buffer.clone(),
                },
            );
        }
    }

    // ── Partner traffic ───────────────────────────────────────────────────

    pub fn send_message(&mut self, handle: &str, text: &str, now: DateTime<Utc>) {
        let Some(partner) = self.sessions.partner_of(handle).cloned() else {
            self.notifier.notify(
                handle,
                ServerMessage::Error {
                    message: "No active chat partner".to_string(),
                },
            );
            return;
        };

        match self.sanitizer.sanitize(text) {
            Sanitized::Clean(text) => {
                self.notifier.notify(
                    &partner,
                    ServerMessage::ChatMessage {
                        from: handle.to_string(),
                        text,
                        timestamp: now.timestamp_millis(),
                    },
                );
            }
            Sanitized::Blocked { reason } => {
                tracing::debug!(connection_id = handle, "Chat message blocked");
                self.notifier
                    .notify(handle, ServerMessage::MessageBlocked { reason });
            }
            Sanitized::Empty => {}
        }
    }

    pub fn typing(&self, handle: &str, typing: bool) {
        if let Some(partner) = self.sessions.partner_of(handle) {
            self.notifier
                .notify(partner, ServerMessage::PartnerTyping { typing });
        }
    }

    pub fn reaction(&self, handle: &str, emoji: String) {
        if let Some(partner) = self.sessions.partner_of(handle) {
            self.notifier
                .notify(partner, ServerMessage::PartnerReaction { emoji });
        }
    }

    /// Forward a handshake frame to the sender's partner, or refuse it.
    pub fn signal(&self, handle: &str, kind: SignalKind, to: &str, payload: Value) {
        match signaling::route(&self.sessions, handle, kind, to, payload) {
            Ok(forward) => {
                tracing::debug!(from = handle, to = to, kind = kind.as_str(), "Relaying signal");
                self.notifier.notify(&forward.to, forward.message);
            }
            Err(rejection) => {
                tracing::debug!(
                    from = handle,
                    to = to,
                    kind = kind.as_str(),
                    code = rejection.code(),
                    "Signal refused"
                );
                if signaling::reports_rejection(kind) {
                    self.notifier.notify(handle, rejection.to_message());
                }
            }
        }
    }

    // ── Introspection ─────────────────────────────────────────────────────

    fn buffer_info(&self) -> BufferInfo {
        BufferInfo {
            buffer_size: pool::buffer_size(self.pool.len(), &self.config),
            next_batch_in: self.config.next_batch_in_secs(),
        }
    }

    pub fn pool_stats(&self) -> PoolStats {
        self.pool.stats(&self.config)
    }

    pub fn occupancy(&self) -> Occupancy {
        Occupancy {
            connected: self.registry.len(),
            queued: self.pool.len(),
            active_chats: self.sessions.active_count(),
        }
    }

    /// Pairings are symmetric, pool members are exactly the queued
    /// participants.
    pub fn is_consistent(&self) -> bool {
        let pool_members_queued = self
            .pool
            .iter()
            .all(|h| self.registry.get(h).map(|p| p.in_queue()).unwrap_or(false));
        let queued_in_pool = self
            .registry
            .iter()
            .filter(|p| p.in_queue())
            .all(|p| self.pool.contains(&p.id));
        self.sessions.is_consistent(&self.registry) && pool_members_queued && queued_in_pool
    }
}
