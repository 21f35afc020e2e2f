//! Server state management.
//!
//! `RelayState` is the cheap-to-clone handle every connection task and
//! timer holds. Matchmaking tables live in one [`Matchmaker`] behind a
//! single async mutex; outbound channels live in a `DashMap` so sends never
//! wait on that lock.

use std::sync::Arc;

use chrono::Utc;
use dashmap::DashMap;
use serde_json::Value;
use tokio::sync::{mpsc, Mutex};

use crate::config::MatchConfig;
use crate::matching::MatchingPolicy;
use crate::matchmaker::{Deferred, JoinRequest, Matchmaker, Notifier, Occupancy};
use crate::moderation::WordListSanitizer;
use crate::pool::PoolStats;
use crate::protocol::{ConnectionId, ServerMessage};
use crate::signaling::SignalKind;

/// Default listen port.
const DEFAULT_PORT: u16 = 8080;

/// Server configuration.
#[derive(Debug, Clone)]
pub struct RelayConfig {
    pub port: u16,
    pub matching: MatchConfig,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            matching: MatchConfig::default(),
        }
    }
}

/// A connected client's sender channel.
pub type ClientSender = mpsc::UnboundedSender<ServerMessage>;

/// Connection id → outbound channel for every live socket.
#[derive(Clone, Default)]
pub struct ClientChannels {
    senders: Arc<DashMap<ConnectionId, ClientSender>>,
}

impl ClientChannels {
    pub fn insert(&self, handle: &str, sender: ClientSender) {
        self.senders.insert(handle.to_string(), sender);
    }

    pub fn len(&self) -> usize {
        self.senders.len()
    }
}

impl Notifier for ClientChannels {
    fn notify(&self, to: &str, message: ServerMessage) -> bool {
        match self.senders.get(to) {
            Some(sender) => sender.send(message).is_ok(),
            None => {
                tracing::debug!(to = to, kind = message.kind(), "Dropping message for offline client");
                false
            }
        }
    }

    fn close(&self, to: &str) {
        self.senders.remove(to);
    }
}

/// Shared server state.
#[derive(Clone)]
pub struct RelayState {
    /// All matchmaking tables. One event at a time.
    pub matchmaker: Arc<Mutex<Matchmaker>>,

    /// Outbound channels, shared with the matchmaker's notifier.
    pub clients: ClientChannels,

    pub config: RelayConfig,
}

impl RelayState {
    /// Create a new relay state with the given configuration.
    pub fn new(config: RelayConfig) -> Self {
        Self::with_policy(config, MatchingPolicy::new())
    }

    /// Create a relay state with a specific scoring policy.
    pub fn with_policy(config: RelayConfig, policy: MatchingPolicy) -> Self {
        let clients = ClientChannels::default();
        let matchmaker = Matchmaker::new(
            config.matching.clone(),
            policy,
            Box::new(WordListSanitizer::new(config.matching.max_message_length)),
            Arc::new(clients.clone()),
        );
        Self {
            matchmaker: Arc::new(Mutex::new(matchmaker)),
            clients,
            config,
        }
    }

    // ── Client Management ─────────────────────────────────────────────────

    /// Register a connection's sender and greet it with its handle.
    pub async fn register_client(&self, handle: &str, sender: ClientSender) {
        self.clients.insert(handle, sender);
        self.matchmaker.lock().await.connect(handle, Utc::now());
        self.clients.notify(
            handle,
            ServerMessage::Connected {
                connection_id: handle.to_string(),
            },
        );
    }

    /// Drop a connection and cascade through the matchmaker.
    pub async fn unregister_client(&self, handle: &str) {
        self.clients.close(handle);
        let deferred = self.matchmaker.lock().await.deregister(handle);
        self.schedule(deferred);
    }

    /// Send a message to one client. Returns true if it was queued.
    pub fn send_to_client(&self, handle: &str, message: ServerMessage) -> bool {
        self.clients.notify(handle, message)
    }

    pub async fn touch(&self, handle: &str) {
        self.matchmaker.lock().await.touch(handle, Utc::now());
    }

    // ── Matchmaking ───────────────────────────────────────────────────────

    pub async fn join(&self, handle: &str, request: JoinRequest) {
        let deferred = self.matchmaker.lock().await.join(handle, request);
        self.schedule(deferred);
    }

    pub async fn skip(&self, handle: &str) {
        let deferred = self.matchmaker.lock().await.skip(handle);
        self.schedule(deferred);
    }

    pub async fn send_message(&self, handle: &str, text: &str) {
        self.matchmaker
            .lock()
            .await
            .send_message(handle, text, Utc::now());
    }

    pub async fn typing(&self, handle: &str, typing: bool) {
        self.matchmaker.lock().await.typing(handle, typing);
    }

    pub async fn reaction(&self, handle: &str, emoji: String) {
        self.matchmaker.lock().await.reaction(handle, emoji);
    }

    pub async fn signal(&self, handle: &str, kind: SignalKind, to: &str, payload: Value) {
        self.matchmaker.lock().await.signal(handle, kind, to, payload);
    }

    /// Run each deferred step on its own task once its delay has passed.
    /// Other events may be handled in between.
    fn schedule(&self, steps: Vec<Deferred>) {
        for step in steps {
            let state = self.clone();
            tokio::spawn(async move {
                tokio::time::sleep(step.delay()).await;
                state.matchmaker.lock().await.run_deferred(step);
            });
        }
    }

    // ── Timers ────────────────────────────────────────────────────────────

    pub async fn run_batch_sweep(&self) -> usize {
        self.matchmaker.lock().await.run_batch_sweep()
    }

    pub async fn expire_idle(&self) {
        let deferred = self.matchmaker.lock().await.expire_idle(Utc::now());
        self.schedule(deferred);
    }

    pub async fn broadcast_positions(&self) {
        self.matchmaker.lock().await.broadcast_positions();
    }

    // ── Stats ─────────────────────────────────────────────────────────────

    pub fn online_count(&self) -> usize {
        self.clients.len()
    }

    pub async fn occupancy(&self) -> Occupancy {
        self.matchmaker.lock().await.occupancy()
    }

    pub async fn pool_stats(&self) -> PoolStats {
        self.matchmaker.lock().await.pool_stats()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn test_config() -> RelayConfig {
        RelayConfig {
            port: 0,
            matching: MatchConfig {
                skip_notify_delay: Duration::from_millis(100),
                requeue_delay: Duration::from_millis(1000),
                ..MatchConfig::default()
            },
        }
    }

    fn test_state() -> RelayState {
        RelayState::with_policy(test_config(), MatchingPolicy::seeded(21).with_clock(|| 0))
    }

    async fn connect(state: &RelayState, handle: &str) -> mpsc::UnboundedReceiver<ServerMessage> {
        let (tx, rx) = mpsc::unbounded_channel();
        state.register_client(handle, tx).await;
        rx
    }

    fn request(session: &str) -> JoinRequest {
        JoinRequest {
            session_id: session.to_string(),
            ..JoinRequest::default()
        }
    }

    fn drain(rx: &mut mpsc::UnboundedReceiver<ServerMessage>) -> Vec<&'static str> {
        let mut kinds = Vec::new();
        while let Ok(msg) = rx.try_recv() {
            kinds.push(msg.kind());
        }
        kinds
    }

    #[tokio::test]
    async fn test_register_sends_connection_id() {
        let state = test_state();
        let mut rx = connect(&state, "conn-a").await;

        match rx.try_recv().unwrap() {
            ServerMessage::Connected { connection_id } => assert_eq!(connection_id, "conn-a"),
            other => panic!("Expected Connected, got {:?}", other),
        }
        assert_eq!(state.online_count(), 1);
        assert_eq!(state.occupancy().await.connected, 1);
    }

    #[tokio::test]
    async fn test_send_to_offline_client_returns_false() {
        let state = test_state();
        assert!(!state.send_to_client("nobody", ServerMessage::SessionExpired));
    }

    #[tokio::test]
    async fn test_join_and_match() {
        let state = test_state();
        let mut rx_a = connect(&state, "a").await;
        let mut rx_b = connect(&state, "b").await;

        state.join("a", request("s-a")).await;
        state.join("b", request("s-b")).await;

        assert_eq!(drain(&mut rx_a), vec!["connected", "queued", "matched"]);
        assert_eq!(drain(&mut rx_b), vec!["connected", "matched"]);
        assert_eq!(state.occupancy().await.active_chats, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_skip_notifies_initiator_after_delay() {
        let state = test_state();
        let mut rx_a = connect(&state, "a").await;
        let mut rx_b = connect(&state, "b").await;
        state.join("a", request("s-a")).await;
        state.join("b", request("s-b")).await;
        drain(&mut rx_a);
        drain(&mut rx_b);

        state.skip("a").await;
        assert_eq!(drain(&mut rx_a), Vec::<&str>::new());
        assert_eq!(drain(&mut rx_b), vec!["partner_disconnected"]);

        tokio::time::sleep(Duration::from_millis(150)).await;
        tokio::task::yield_now().await;

        assert_eq!(drain(&mut rx_a), vec!["partner_disconnected", "queued"]);
        assert_eq!(drain(&mut rx_b), vec!["queued"]);
        assert_eq!(state.pool_stats().await.total_in_queue, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_disconnect_requeues_partner_after_delay() {
        let state = test_state();
        let _rx_a = connect(&state, "a").await;
        let mut rx_b = connect(&state, "b").await;
        state.join("a", request("s-a")).await;
        state.join("b", request("s-b")).await;
        drain(&mut rx_b);

        state.unregister_client("a").await;
        assert_eq!(drain(&mut rx_b), vec!["partner_disconnected"]);
        assert_eq!(state.online_count(), 1);

        tokio::time::sleep(Duration::from_millis(500)).await;
        assert!(drain(&mut rx_b).is_empty());

        tokio::time::sleep(Duration::from_millis(600)).await;
        tokio::task::yield_now().await;
        assert_eq!(drain(&mut rx_b), vec!["queued"]);
    }

    #[tokio::test]
    async fn test_expiry_closes_channel() {
        let mut config = test_config();
        config.matching.session_timeout = Duration::ZERO;
        let state = RelayState::with_policy(config, MatchingPolicy::seeded(1));
        let mut rx = connect(&state, "a").await;
        drain(&mut rx);

        tokio::time::sleep(Duration::from_millis(5)).await;
        state.expire_idle().await;

        assert!(matches!(rx.recv().await, Some(ServerMessage::SessionExpired)));
        assert!(rx.recv().await.is_none());
        assert_eq!(state.occupancy().await.connected, 0);
    }

    #[tokio::test]
    async fn test_chat_between_partners() {
        let state = test_state();
        let _rx_a = connect(&state, "a").await;
        let mut rx_b = connect(&state, "b").await;
        state.join("a", request("s-a")).await;
        state.join("b", request("s-b")).await;
        drain(&mut rx_b);

        state.send_message("a", "hello").await;
        state.typing("a", false).await;
        assert_eq!(drain(&mut rx_b), vec!["chat_message", "partner_typing"]);
    }
}
