//! Connection registry.
//!
//! Process-wide table of live participants plus the session index that maps
//! a stable session id to the handle currently using it. Cascading removal
//! (pool, pairing) is driven by the matchmaker; the registry only keeps its
//! own tables consistent.

use std::collections::HashMap;

use chrono::{DateTime, Utc};

use crate::participant::{Participant, Presence};
use crate::protocol::ConnectionId;

#[derive(Debug, Default)]
pub struct ConnectionRegistry {
    participants: HashMap<ConnectionId, Participant>,
    /// session id → handle; at most one live handle per session.
    sessions: HashMap<String, ConnectionId>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handle with fresh state. Re-registering an existing handle
    /// returns the existing participant untouched.
    pub fn register(&mut self, handle: &str, now: DateTime<Utc>) -> &Participant {
        self.participants
            .entry(handle.to_string())
            .or_insert_with(|| Participant::new(handle, now))
    }

    /// Refresh last-active. Returns false for unknown handles.
    pub fn touch(&mut self, handle: &str, now: DateTime<Utc>) -> bool {
        match self.participants.get_mut(handle) {
            Some(p) => {
                p.touch(now);
                true
            }
            None => false,
        }
    }

    pub fn by_session(&self, session_id: &str) -> Option<&ConnectionId> {
        self.sessions.get(session_id)
    }

    /// Bind a session id to a handle, replacing any previous binding.
    pub fn bind_session(&mut self, handle: &str, session_id: &str) {
        if let Some(p) = self.participants.get_mut(handle) {
            p.session_id = Some(session_id.to_string());
            self.sessions
                .insert(session_id.to_string(), handle.to_string());
        }
    }

    pub fn get(&self, handle: &str) -> Option<&Participant> {
        self.participants.get(handle)
    }

    pub fn get_mut(&mut self, handle: &str) -> Option<&mut Participant> {
        self.participants.get_mut(handle)
    }

    pub fn contains(&self, handle: &str) -> bool {
        self.participants.contains_key(handle)
    }

    pub fn len(&self) -> usize {
        self.participants.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Participant> {
        self.participants.values()
    }

    /// Handles idle longer than `timeout`.
    pub fn expired(&self, now: DateTime<Utc>, timeout: std::time::Duration) -> Vec<ConnectionId> {
        self.participants
            .values()
            .filter(|p| p.is_expired(now, timeout))
            .map(|p| p.id.clone())
            .collect()
    }

    /// Remove a participant, its session binding, and any `Paired` back-
    /// references other participants still hold to it.
    pub fn remove(&mut self, handle: &str) -> Option<Participant> {
        let removed = self.participants.remove(handle)?;

        if let Some(session_id) = &removed.session_id {
            if self.sessions.get(session_id).map(String::as_str) == Some(handle) {
                self.sessions.remove(session_id);
            }
        }

        for other in self.participants.values_mut() {
            if other.partner_id().map(String::as_str) == Some(handle) {
                tracing::debug!(
                    connection_id = other.id.as_str(),
                    stale = handle,
                    "Scrubbed stale partner reference"
                );
                other.presence = Presence::Idle;
            }
        }

        Some(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_and_remove() {
        let mut registry = ConnectionRegistry::new();
        let p = registry.register("conn-a", Utc::now());
        assert!(p.is_idle());
        assert!(registry.contains("conn-a"));
        assert_eq!(registry.len(), 1);

        assert!(registry.remove("conn-a").is_some());
        assert!(!registry.contains("conn-a"));
        assert!(registry.remove("conn-a").is_none());
    }

    #[test]
    fn test_touch_unknown_handle() {
        let mut registry = ConnectionRegistry::new();
        assert!(!registry.touch("nobody", Utc::now()));
    }

    #[test]
    fn test_touch_updates_last_active() {
        let mut registry = ConnectionRegistry::new();
        let start = Utc::now();
        registry.register("conn-a", start);
        let later = start + chrono::Duration::seconds(10);
        assert!(registry.touch("conn-a", later));
        assert_eq!(registry.get("conn-a").unwrap().last_active, later);
    }

    #[test]
    fn test_session_index() {
        let mut registry = ConnectionRegistry::new();
        registry.register("conn-a", Utc::now());
        registry.bind_session("conn-a", "s-1");
        assert_eq!(registry.by_session("s-1").map(String::as_str), Some("conn-a"));

        registry.register("conn-b", Utc::now());
        registry.bind_session("conn-b", "s-1");
        assert_eq!(registry.by_session("s-1").map(String::as_str), Some("conn-b"));

        // Removing the stale handle must not clear the newer binding.
        registry.remove("conn-a");
        assert_eq!(registry.by_session("s-1").map(String::as_str), Some("conn-b"));

        registry.remove("conn-b");
        assert!(registry.by_session("s-1").is_none());
    }

    #[test]
    fn test_bind_session_unknown_handle_is_noop() {
        let mut registry = ConnectionRegistry::new();
        registry.bind_session("ghost", "s-1");
        assert!(registry.by_session("s-1").is_none());
    }

    #[test]
    fn test_remove_scrubs_partner_references() {
        let mut registry = ConnectionRegistry::new();
        let now = Utc::now();
        registry.register("conn-a", now);
        registry.register("conn-b", now);
        registry.get_mut("conn-b").unwrap().presence = Presence::Paired("conn-a".to_string());

        registry.remove("conn-a");
        let b = registry.get("conn-b").unwrap();
        assert!(b.is_idle());
        assert!(b.is_unpaired());
    }

    #[test]
    fn test_expired_handles() {
        let mut registry = ConnectionRegistry::new();
        let start = Utc::now();
        registry.register("old", start);
        registry.register("fresh", start + chrono::Duration::seconds(100));

        let expired = registry.expired(
            start + chrono::Duration::seconds(120),
            std::time::Duration::from_secs(60),
        );
        assert_eq!(expired, vec!["old".to_string()]);
    }
}
