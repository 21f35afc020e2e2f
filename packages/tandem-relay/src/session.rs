//! Chat session pairings.
//!
//! A pairing is stored as a bidirectional map so that
//! `partner_of(a) == b ⇔ partner_of(b) == a` can be checked directly. Every
//! mutation here updates both directions and both participants' presence in
//! the same call.

use std::collections::HashMap;

use thiserror::Error;

use crate::participant::{Entry, Presence};
use crate::protocol::ConnectionId;
use crate::registry::ConnectionRegistry;

/// Why a pairing could not be created or ended.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SessionError {
    #[error("cannot pair a connection with itself")]
    SelfMatch,

    #[error("both connections belong to the same session")]
    SameSession,

    /// Not registered, or already paired.
    #[error("connection {0} is not available for pairing")]
    Unavailable(ConnectionId),

    #[error("connection {0} has no active partner")]
    NoPartner(ConnectionId),
}

#[derive(Debug, Default)]
pub struct SessionManager {
    pairs: HashMap<ConnectionId, ConnectionId>,
}

impl SessionManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn partner_of(&self, handle: &str) -> Option<&ConnectionId> {
        self.pairs.get(handle)
    }

    /// Number of live pairings.
    pub fn active_count(&self) -> usize {
        self.pairs.len() / 2
    }

    /// Pair `a` with `b`. Both must be registered and unpaired.
    pub fn create(
        &mut self,
        registry: &mut ConnectionRegistry,
        a: &str,
        b: &str,
    ) -> Result<(), SessionError> {
        if a == b {
            return Err(SessionError::SelfMatch);
        }

        let first = registry
            .get(a)
            .filter(|p| p.is_unpaired() && !self.pairs.contains_key(a))
            .ok_or_else(|| SessionError::Unavailable(a.to_string()))?;
        let second = registry
            .get(b)
            .filter(|p| p.is_unpaired() && !self.pairs.contains_key(b))
            .ok_or_else(|| SessionError::Unavailable(b.to_string()))?;
        if first.shares_session_with(second) {
            return Err(SessionError::SameSession);
        }

        self.pairs.insert(a.to_string(), b.to_string());
        self.pairs.insert(b.to_string(), a.to_string());

        for (me, partner) in [(a, b), (b, a)] {
            if let Some(p) = registry.get_mut(me) {
                p.presence = Presence::Paired(partner.to_string());
                p.entry = Entry::Fresh;
                p.last_skipped = None;
            }
        }

        tracing::info!(a = a, b = b, "Session created");
        Ok(())
    }

    /// Tear down `handle`'s pairing. Both sides become idle. Returns the
    /// former partner, or `None` if there was no pairing.
    pub fn end(&mut self, registry: &mut ConnectionRegistry, handle: &str) -> Option<ConnectionId> {
        let partner = self.pairs.remove(handle)?;
        self.pairs.remove(&partner);

        for id in [handle, partner.as_str()] {
            if let Some(p) = registry.get_mut(id) {
                p.presence = Presence::Idle;
            }
        }

        tracing::info!(connection_id = handle, partner = partner.as_str(), "Session ended");
        Some(partner)
    }

    /// End the pairing because `initiator` skipped. Each side remembers the
    /// other as its last skip so they are not re-paired straight away.
    pub fn skip(
        &mut self,
        registry: &mut ConnectionRegistry,
        initiator: &str,
    ) -> Result<ConnectionId, SessionError> {
        let partner = self
            .end(registry, initiator)
            .ok_or_else(|| SessionError::NoPartner(initiator.to_string()))?;

        for (me, other) in [(initiator, partner.as_str()), (partner.as_str(), initiator)] {
            if let Some(p) = registry.get_mut(me) {
                p.last_skipped = Some(other.to_string());
                p.entry = Entry::FromSkip;
            }
        }

        Ok(partner)
    }

    /// Every pairing is mirrored and agrees with participant presence.
    pub fn is_consistent(&self, registry: &ConnectionRegistry) -> bool {
        let mirrored = self
            .pairs
            .iter()
            .all(|(a, b)| self.pairs.get(b) == Some(a) && a != b);
        let presence_agrees = registry.iter().all(|p| {
            p.partner_id() == self.pairs.get(&p.id)
        });
        mirrored && presence_agrees
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn setup(ids: &[&str]) -> (SessionManager, ConnectionRegistry) {
        let mut registry = ConnectionRegistry::new();
        for id in ids {
            registry.register(id, Utc::now());
            registry.bind_session(id, &format!("session-{}", id));
        }
        (SessionManager::new(), registry)
    }

    #[test]
    fn test_create_is_symmetric() {
        let (mut sessions, mut registry) = setup(&["a", "b"]);
        sessions.create(&mut registry, "a", "b").unwrap();

        assert_eq!(sessions.partner_of("a").map(String::as_str), Some("b"));
        assert_eq!(sessions.partner_of("b").map(String::as_str), Some("a"));
        assert_eq!(registry.get("a").unwrap().partner_id().map(String::as_str), Some("b"));
        assert!(sessions.is_consistent(&registry));
        assert_eq!(sessions.active_count(), 1);
    }

    #[test]
    fn test_create_rejects_self_match() {
        let (mut sessions, mut registry) = setup(&["a"]);
        assert_eq!(
            sessions.create(&mut registry, "a", "a"),
            Err(SessionError::SelfMatch)
        );
    }

    #[test]
    fn test_create_rejects_same_session() {
        let (mut sessions, mut registry) = setup(&["a", "b"]);
        registry.bind_session("b", "session-a");
        assert_eq!(
            sessions.create(&mut registry, "a", "b"),
            Err(SessionError::SameSession)
        );
        assert!(sessions.partner_of("a").is_none());
    }

    #[test]
    fn test_create_rejects_stale_or_paired() {
        let (mut sessions, mut registry) = setup(&["a", "b", "c"]);
        assert_eq!(
            sessions.create(&mut registry, "a", "ghost"),
            Err(SessionError::Unavailable("ghost".to_string()))
        );

        sessions.create(&mut registry, "a", "b").unwrap();
        assert_eq!(
            sessions.create(&mut registry, "c", "a"),
            Err(SessionError::Unavailable("a".to_string()))
        );
        assert!(sessions.is_consistent(&registry));
    }

    #[test]
    fn test_create_clears_skip_memory() {
        let (mut sessions, mut registry) = setup(&["a", "b"]);
        registry.get_mut("a").unwrap().last_skipped = Some("z".to_string());
        sessions.create(&mut registry, "a", "b").unwrap();
        assert!(registry.get("a").unwrap().last_skipped.is_none());
    }

    #[test]
    fn test_end_returns_partner_once() {
        let (mut sessions, mut registry) = setup(&["a", "b"]);
        sessions.create(&mut registry, "a", "b").unwrap();

        assert_eq!(sessions.end(&mut registry, "b").as_deref(), Some("a"));
        assert!(sessions.end(&mut registry, "a").is_none());
        assert!(registry.get("a").unwrap().is_idle());
        assert!(registry.get("b").unwrap().is_idle());
        assert!(sessions.is_consistent(&registry));
    }

    #[test]
    fn test_skip_records_memory_both_ways() {
        let (mut sessions, mut registry) = setup(&["a", "b"]);
        sessions.create(&mut registry, "a", "b").unwrap();

        let partner = sessions.skip(&mut registry, "a").unwrap();
        assert_eq!(partner, "b");
        let a = registry.get("a").unwrap();
        let b = registry.get("b").unwrap();
        assert_eq!(a.last_skipped.as_deref(), Some("b"));
        assert_eq!(b.last_skipped.as_deref(), Some("a"));
        assert_eq!(a.entry, Entry::FromSkip);
        assert!(sessions.is_consistent(&registry));
    }

    #[test]
    fn test_skip_without_partner() {
        let (mut sessions, mut registry) = setup(&["a"]);
        assert_eq!(
            sessions.skip(&mut registry, "a"),
            Err(SessionError::NoPartner("a".to_string()))
        );
    }
}
