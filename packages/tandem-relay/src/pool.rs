//! Waiting pool.
//!
//! Ordered admission queue. Priority entrants (back from a skip or a
//! partner disconnect) go to the front, fresh arrivals to the back. A
//! buffer suffix is held out of each batch sweep so late arrivals still
//! have a pool deep enough to score against.

use std::collections::{HashSet, VecDeque};

use serde::Serialize;

use crate::config::MatchConfig;
use crate::matching::{compatible, MatchingPolicy};
use crate::protocol::ConnectionId;
use crate::registry::ConnectionRegistry;

/// How many top-scoring candidates an immediate match picks from.
const IMMEDIATE_TOP_N: usize = 3;

/// Size of the buffer suffix for a pool of `n` members.
pub fn buffer_size(n: usize, config: &MatchConfig) -> usize {
    if n < config.immediate_match_threshold {
        return config.min_buffer_size;
    }
    let pct = config.buffer_percentage as usize;
    let scaled = (n * pct).div_ceil(100);
    scaled.min(config.max_buffer_size)
}

/// Whether a new arrival should search the whole pool directly.
pub fn should_attempt_immediate(n: usize, config: &MatchConfig) -> bool {
    n < config.immediate_match_threshold
}

/// A pairing chosen by a batch sweep.
#[derive(Debug, Clone, PartialEq)]
pub struct ProposedPair {
    pub first: ConnectionId,
    pub second: ConnectionId,
    pub score: f64,
}

/// Snapshot served on `/stats`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PoolStats {
    pub total_in_queue: usize,
    pub buffer_size: usize,
    pub matchable_users: usize,
    pub available_matches: usize,
    pub utilization_percent: u32,
}

#[derive(Debug, Default)]
pub struct WaitingPool {
    members: VecDeque<ConnectionId>,
}

impl WaitingPool {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    pub fn contains(&self, handle: &str) -> bool {
        self.members.iter().any(|m| m == handle)
    }

    pub fn iter(&self) -> impl Iterator<Item = &ConnectionId> {
        self.members.iter()
    }

    /// Add a member. Priority members go to the front. A handle already in
    /// the pool is not added twice.
    pub fn enqueue(&mut self, handle: &str, priority: bool) {
        if self.contains(handle) {
            return;
        }
        if priority {
            self.members.push_front(handle.to_string());
        } else {
            self.members.push_back(handle.to_string());
        }
    }

    pub fn remove(&mut self, handle: &str) -> bool {
        match self.members.iter().position(|m| m == handle) {
            Some(index) => {
                self.members.remove(index);
                true
            }
            None => false,
        }
    }

    /// 1-based position of a member.
    pub fn position_of(&self, handle: &str) -> Option<usize> {
        self.members.iter().position(|m| m == handle).map(|i| i + 1)
    }

    /// Pick a partner for `candidate` from the whole pool: score every
    /// compatible, available member, keep the best three, choose one of
    /// those uniformly.
    pub fn find_immediate(
        &self,
        candidate: &str,
        registry: &ConnectionRegistry,
        policy: &mut MatchingPolicy,
    ) -> Option<ConnectionId> {
        let seeker = registry.get(candidate)?;

        let mut scored: Vec<(ConnectionId, f64)> = Vec::new();
        for member in self.members.iter().filter(|m| m.as_str() != candidate) {
            let Some(other) = registry.get(member) else {
                continue;
            };
            if !other.is_unpaired() || !compatible(seeker, other) {
                continue;
            }
            let score = policy.score(seeker, other);
            scored.push((member.clone(), score));
        }

        if scored.is_empty() {
            return None;
        }

        scored.sort_by(|a, b| b.1.total_cmp(&a.1));
        scored.truncate(IMMEDIATE_TOP_N);
        let pick = policy.pick_index(scored.len());
        Some(scored.swap_remove(pick).0)
    }

    /// Greedy one-pass pairing over the matchable prefix.
    ///
    /// Walks members in pool order; each unmatched member takes its highest
    /// scoring compatible partner among the unmatched members after it.
    /// Members in the buffer suffix are never considered. The pool itself is
    /// left untouched; the caller removes members once their session exists.
    pub fn batch_sweep(
        &self,
        registry: &ConnectionRegistry,
        policy: &mut MatchingPolicy,
        config: &MatchConfig,
    ) -> Vec<ProposedPair> {
        let total = self.members.len();
        let matchable = total.saturating_sub(buffer_size(total, config));
        if matchable < 2 {
            return Vec::new();
        }

        let window: Vec<&ConnectionId> = self.members.iter().take(matchable).collect();
        let mut matched: HashSet<&str> = HashSet::new();
        let mut pairs = Vec::new();

        for (i, first_id) in window.iter().enumerate() {
            if matched.contains(first_id.as_str()) {
                continue;
            }
            let Some(first) = registry.get(first_id).filter(|p| p.is_unpaired()) else {
                continue;
            };

            let mut best: Option<(&ConnectionId, f64)> = None;
            for second_id in window.iter().skip(i + 1) {
                if matched.contains(second_id.as_str()) {
                    continue;
                }
                let Some(second) = registry.get(second_id).filter(|p| p.is_unpaired()) else {
                    continue;
                };
                if !compatible(first, second) {
                    continue;
                }
                let score = policy.score(first, second);
                if best.map_or(true, |(_, best_score)| score > best_score) {
                    best = Some((*second_id, score));
                }
            }

            if let Some((second_id, score)) = best {
                matched.insert(first_id.as_str());
                matched.insert(second_id.as_str());
                pairs.push(ProposedPair {
                    first: (*first_id).clone(),
                    second: second_id.clone(),
                    score,
                });
            }
        }

        pairs
    }

    pub fn stats(&self, config: &MatchConfig) -> PoolStats {
        let total = self.members.len();
        let buffer = buffer_size(total, config);
        let matchable = total.saturating_sub(buffer);
        let utilization_percent = if total == 0 {
            0
        } else {
            ((matchable as f64 / total as f64) * 100.0).round() as u32
        };
        PoolStats {
            total_in_queue: total,
            buffer_size: buffer,
            matchable_users: matchable,
            available_matches: matchable / 2,
            utilization_percent,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::participant::Presence;
    use crate::protocol::ChatMode;
    use chrono::Utc;

    fn config() -> MatchConfig {
        MatchConfig::default()
    }

    fn add(registry: &mut ConnectionRegistry, pool: &mut WaitingPool, id: &str, interests: &[&str]) {
        registry.register(id, Utc::now());
        registry.bind_session(id, &format!("session-{}", id));
        let p = registry.get_mut(id).unwrap();
        p.interests = interests.iter().map(|s| s.to_string()).collect();
        p.presence = Presence::Queued;
        pool.enqueue(id, false);
    }

    #[test]
    fn test_buffer_formula() {
        let config = config();
        assert_eq!(buffer_size(5, &config), 3);
        assert_eq!(buffer_size(10, &config), 2);
        assert_eq!(buffer_size(20, &config), 4);
        assert_eq!(buffer_size(21, &config), 5);
        assert_eq!(buffer_size(100, &config), 15);
    }

    #[test]
    fn test_immediate_threshold() {
        let config = config();
        assert!(should_attempt_immediate(0, &config));
        assert!(should_attempt_immediate(7, &config));
        assert!(!should_attempt_immediate(8, &config));
    }

    #[test]
    fn test_priority_enqueue_goes_first() {
        let mut pool = WaitingPool::new();
        pool.enqueue("a", false);
        pool.enqueue("b", false);
        pool.enqueue("skipper", true);
        assert_eq!(pool.position_of("skipper"), Some(1));
        assert_eq!(pool.position_of("a"), Some(2));
        assert_eq!(pool.position_of("b"), Some(3));
    }

    #[test]
    fn test_enqueue_is_deduplicated() {
        let mut pool = WaitingPool::new();
        pool.enqueue("a", false);
        pool.enqueue("a", true);
        assert_eq!(pool.len(), 1);
        assert!(pool.remove("a"));
        assert!(!pool.remove("a"));
        assert!(pool.is_empty());
    }

    #[test]
    fn test_find_immediate_case_insensitive_interests() {
        let mut registry = ConnectionRegistry::new();
        let mut pool = WaitingPool::new();
        add(&mut registry, &mut pool, "a", &["music"]);
        add(&mut registry, &mut pool, "b", &["Music"]);

        let mut policy = MatchingPolicy::seeded(5);
        assert_eq!(
            pool.find_immediate("a", &registry, &mut policy).as_deref(),
            Some("b")
        );
        assert_eq!(
            pool.find_immediate("b", &registry, &mut policy).as_deref(),
            Some("a")
        );
    }

    #[test]
    fn test_find_immediate_skips_incompatible() {
        let mut registry = ConnectionRegistry::new();
        let mut pool = WaitingPool::new();
        add(&mut registry, &mut pool, "a", &[]);
        add(&mut registry, &mut pool, "b", &[]);
        registry.get_mut("b").unwrap().chat_mode = ChatMode::Voice;

        let mut policy = MatchingPolicy::seeded(5);
        assert!(pool.find_immediate("a", &registry, &mut policy).is_none());
    }

    #[test]
    fn test_find_immediate_picks_from_top_three() {
        let mut registry = ConnectionRegistry::new();
        let mut pool = WaitingPool::new();
        add(&mut registry, &mut pool, "seeker", &["music"]);
        add(&mut registry, &mut pool, "m1", &["music"]);
        add(&mut registry, &mut pool, "m2", &["music"]);
        add(&mut registry, &mut pool, "m3", &["music"]);
        add(&mut registry, &mut pool, "none1", &["knitting"]);
        add(&mut registry, &mut pool, "none2", &["knitting"]);

        let mut policy = MatchingPolicy::seeded(9).with_clock(|| 0);
        for _ in 0..30 {
            let pick = pool.find_immediate("seeker", &registry, &mut policy).unwrap();
            assert!(pick.starts_with('m'), "picked {}", pick);
        }
    }

    #[test]
    fn test_batch_sweep_respects_buffer() {
        let mut registry = ConnectionRegistry::new();
        let mut pool = WaitingPool::new();
        for i in 0..10 {
            add(&mut registry, &mut pool, &format!("u{}", i), &[]);
        }

        let mut policy = MatchingPolicy::seeded(1);
        let pairs = pool.batch_sweep(&registry, &mut policy, &config());
        assert_eq!(pairs.len(), 4);

        let touched: HashSet<String> = pairs
            .iter()
            .flat_map(|p| [p.first.clone(), p.second.clone()])
            .collect();
        assert_eq!(touched.len(), 8);
        assert!(!touched.contains("u8"));
        assert!(!touched.contains("u9"));
    }

    #[test]
    fn test_batch_sweep_small_pool_does_nothing() {
        let mut registry = ConnectionRegistry::new();
        let mut pool = WaitingPool::new();
        for i in 0..4 {
            add(&mut registry, &mut pool, &format!("u{}", i), &[]);
        }
        // 4 members, buffer 3 → one matchable member.
        let mut policy = MatchingPolicy::seeded(1);
        assert!(pool.batch_sweep(&registry, &mut policy, &config()).is_empty());
    }

    #[test]
    fn test_batch_sweep_greedy_first_come() {
        let mut registry = ConnectionRegistry::new();
        let mut pool = WaitingPool::new();
        add(&mut registry, &mut pool, "a", &["music"]);
        add(&mut registry, &mut pool, "b", &["knitting"]);
        add(&mut registry, &mut pool, "c", &["music"]);
        add(&mut registry, &mut pool, "d", &["knitting"]);
        add(&mut registry, &mut pool, "e", &[]);
        // buffer of 3 at this size → zero-buffer config to see the whole pool
        let config = MatchConfig {
            min_buffer_size: 0,
            ..MatchConfig::default()
        };

        let mut policy = MatchingPolicy::seeded(2).with_clock(|| 0);
        let pairs = pool.batch_sweep(&registry, &mut policy, &config);
        assert_eq!(pairs[0].first, "a");
        assert_eq!(pairs[0].second, "c");
        assert_eq!(pairs[1].first, "b");
        assert_eq!(pairs[1].second, "d");
        assert_eq!(pairs.len(), 2);
    }

    #[test]
    fn test_batch_sweep_ignores_paired_members() {
        let mut registry = ConnectionRegistry::new();
        let mut pool = WaitingPool::new();
        add(&mut registry, &mut pool, "a", &[]);
        add(&mut registry, &mut pool, "b", &[]);
        registry.get_mut("b").unwrap().presence = Presence::Paired("z".to_string());
        let config = MatchConfig {
            min_buffer_size: 0,
            ..MatchConfig::default()
        };

        let mut policy = MatchingPolicy::seeded(2);
        assert!(pool.batch_sweep(&registry, &mut policy, &config).is_empty());
    }

    #[test]
    fn test_stats() {
        let mut pool = WaitingPool::new();
        for i in 0..10 {
            pool.enqueue(&format!("u{}", i), false);
        }
        let stats = pool.stats(&config());
        assert_eq!(stats.total_in_queue, 10);
        assert_eq!(stats.buffer_size, 2);
        assert_eq!(stats.matchable_users, 8);
        assert_eq!(stats.available_matches, 4);
        assert_eq!(stats.utilization_percent, 80);

        let empty = WaitingPool::new().stats(&config());
        assert_eq!(empty.matchable_users, 0);
        assert_eq!(empty.utilization_percent, 0);
    }
}
