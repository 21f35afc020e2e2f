//! Matchmaking tunables.
//!
//! Every timing and sizing knob the matchmaker uses lives here. Values are
//! parsed from CLI flags / environment in `main.rs` and injected into the
//! state; nothing downstream reads globals.

use std::time::Duration;

/// Default idle timeout before a participant's session expires (30 minutes).
const DEFAULT_SESSION_TIMEOUT_SECS: u64 = 30 * 60;

/// Default interval of the idle-expiry sweep (5 minutes).
const DEFAULT_CLEANUP_INTERVAL_SECS: u64 = 5 * 60;

/// Default interval of the batch matching sweep.
const DEFAULT_BATCH_INTERVAL_MS: u64 = 5_000;

/// Default interval of queue position pushes.
const DEFAULT_POSITION_UPDATE_INTERVAL_SECS: u64 = 10;

const DEFAULT_MIN_BUFFER_SIZE: usize = 3;
const DEFAULT_BUFFER_PERCENTAGE: u32 = 20;
const DEFAULT_MAX_BUFFER_SIZE: usize = 15;
const DEFAULT_IMMEDIATE_MATCH_THRESHOLD: usize = 8;

/// Delay before a partner whose peer disconnected is put back in the pool.
const DEFAULT_REQUEUE_DELAY_MS: u64 = 1_000;

/// Delay between notifying the skipped side and the skipping side.
const DEFAULT_SKIP_NOTIFY_DELAY_MS: u64 = 100;

const DEFAULT_ESTIMATED_WAIT_PER_POSITION_SECS: u64 = 15;
const DEFAULT_MIN_ESTIMATED_WAIT_SECS: u64 = 10;
const DEFAULT_PRIORITY_ESTIMATED_WAIT_SECS: u64 = 5;

/// Longest chat message forwarded before truncation.
const DEFAULT_MAX_MESSAGE_LENGTH: usize = 500;

/// Matchmaker configuration.
#[derive(Debug, Clone)]
pub struct MatchConfig {
    pub session_timeout: Duration,
    pub cleanup_interval: Duration,
    pub batch_interval: Duration,
    pub position_update_interval: Duration,
    /// Buffer held back while the pool is below the immediate threshold.
    pub min_buffer_size: usize,
    /// Share of the pool (percent) held back once the pool is large.
    pub buffer_percentage: u32,
    pub max_buffer_size: usize,
    /// Pools smaller than this try a direct match on every arrival.
    pub immediate_match_threshold: usize,
    pub requeue_delay: Duration,
    pub skip_notify_delay: Duration,
    pub estimated_wait_per_position_secs: u64,
    pub min_estimated_wait_secs: u64,
    pub priority_estimated_wait_secs: u64,
    pub max_message_length: usize,
}

impl Default for MatchConfig {
    fn default() -> Self {
        Self {
            session_timeout: Duration::from_secs(DEFAULT_SESSION_TIMEOUT_SECS),
            cleanup_interval: Duration::from_secs(DEFAULT_CLEANUP_INTERVAL_SECS),
            batch_interval: Duration::from_millis(DEFAULT_BATCH_INTERVAL_MS),
            position_update_interval: Duration::from_secs(DEFAULT_POSITION_UPDATE_INTERVAL_SECS),
            min_buffer_size: DEFAULT_MIN_BUFFER_SIZE,
            buffer_percentage: DEFAULT_BUFFER_PERCENTAGE,
            max_buffer_size: DEFAULT_MAX_BUFFER_SIZE,
            immediate_match_threshold: DEFAULT_IMMEDIATE_MATCH_THRESHOLD,
            requeue_delay: Duration::from_millis(DEFAULT_REQUEUE_DELAY_MS),
            skip_notify_delay: Duration::from_millis(DEFAULT_SKIP_NOTIFY_DELAY_MS),
            estimated_wait_per_position_secs: DEFAULT_ESTIMATED_WAIT_PER_POSITION_SECS,
            min_estimated_wait_secs: DEFAULT_MIN_ESTIMATED_WAIT_SECS,
            priority_estimated_wait_secs: DEFAULT_PRIORITY_ESTIMATED_WAIT_SECS,
            max_message_length: DEFAULT_MAX_MESSAGE_LENGTH,
        }
    }
}

impl MatchConfig {
    /// Seconds until the next batch sweep, as advertised to queued clients.
    pub fn next_batch_in_secs(&self) -> u64 {
        self.batch_interval.as_secs().max(1)
    }

    /// Estimated wait for a queue position (1-based).
    pub fn estimated_wait_secs(&self, position: usize, priority: bool) -> u64 {
        if priority {
            return self.priority_estimated_wait_secs;
        }
        (position as u64 * self.estimated_wait_per_position_secs).max(self.min_estimated_wait_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = MatchConfig::default();
        assert_eq!(config.session_timeout, Duration::from_secs(1800));
        assert_eq!(config.cleanup_interval, Duration::from_secs(300));
        assert_eq!(config.batch_interval, Duration::from_millis(5000));
        assert_eq!(config.min_buffer_size, 3);
        assert_eq!(config.buffer_percentage, 20);
        assert_eq!(config.max_buffer_size, 15);
        assert_eq!(config.immediate_match_threshold, 8);
        assert_eq!(config.requeue_delay, Duration::from_millis(1000));
    }

    #[test]
    fn test_estimated_wait() {
        let config = MatchConfig::default();
        assert_eq!(config.estimated_wait_secs(1, false), 15);
        assert_eq!(config.estimated_wait_secs(4, false), 60);
        assert_eq!(config.estimated_wait_secs(1, true), 5);

        let config = MatchConfig {
            estimated_wait_per_position_secs: 2,
            ..MatchConfig::default()
        };
        assert_eq!(config.estimated_wait_secs(1, false), 10);
    }

    #[test]
    fn test_next_batch_in_never_zero() {
        let config = MatchConfig {
            batch_interval: Duration::from_millis(200),
            ..MatchConfig::default()
        };
        assert_eq!(config.next_batch_in_secs(), 1);
        assert_eq!(MatchConfig::default().next_batch_in_secs(), 5);
    }
}
