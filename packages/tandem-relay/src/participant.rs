//! Participant model.

use chrono::{DateTime, Utc};

use crate::protocol::{ChatMode, ConnectionId};

/// Where a participant currently sits in the matchmaking lifecycle.
///
/// Queued and paired are variants of one enum, so a participant can never be
/// both at once.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum Presence {
    /// Connected but neither waiting nor chatting.
    #[default]
    Idle,
    /// In the waiting pool.
    Queued,
    /// In a chat session with the given partner.
    Paired(ConnectionId),
}

/// How a participant arrived in the pool.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Entry {
    #[default]
    Fresh,
    /// Came back after skipping or being skipped.
    FromSkip,
    /// Came back after the partner disconnected.
    FromDisconnect,
}

impl Entry {
    /// Priority entrants go to the front of the pool.
    pub fn is_priority(self) -> bool {
        !matches!(self, Entry::Fresh)
    }
}

/// One connected user and its matching/session state.
#[derive(Debug, Clone)]
pub struct Participant {
    pub id: ConnectionId,
    /// Set on join; stable across reconnects.
    pub session_id: Option<String>,
    pub chat_mode: ChatMode,
    pub safe_mode: bool,
    pub interests: Vec<String>,
    pub joined_at: DateTime<Utc>,
    pub last_active: DateTime<Utc>,
    pub presence: Presence,
    pub entry: Entry,
    /// Most recent partner this participant skipped or was skipped by.
    pub last_skipped: Option<ConnectionId>,
}

impl Participant {
    /// Fresh participant: not queued, no partner.
    pub fn new(id: impl Into<ConnectionId>, now: DateTime<Utc>) -> Self {
        Self {
            id: id.into(),
            session_id: None,
            chat_mode: ChatMode::default(),
            safe_mode: false,
            interests: Vec::new(),
            joined_at: now,
            last_active: now,
            presence: Presence::Idle,
            entry: Entry::Fresh,
            last_skipped: None,
        }
    }

    pub fn in_queue(&self) -> bool {
        self.presence == Presence::Queued
    }

    pub fn has_partner(&self) -> bool {
        matches!(self.presence, Presence::Paired(_))
    }

    pub fn partner_id(&self) -> Option<&ConnectionId> {
        match &self.presence {
            Presence::Paired(partner) => Some(partner),
            _ => None,
        }
    }

    pub fn is_idle(&self) -> bool {
        self.presence == Presence::Idle
    }

    /// Registered and available for a new pairing.
    pub fn is_unpaired(&self) -> bool {
        !self.has_partner()
    }

    pub fn shares_session_with(&self, other: &Participant) -> bool {
        matches!(
            (&self.session_id, &other.session_id),
            (Some(a), Some(b)) if a == b
        )
    }

    pub fn touch(&mut self, now: DateTime<Utc>) {
        self.last_active = now;
    }

    pub fn is_expired(&self, now: DateTime<Utc>, timeout: std::time::Duration) -> bool {
        let idle = now.signed_duration_since(self.last_active);
        idle.to_std().map(|idle| idle > timeout).unwrap_or(false)
    }
}
