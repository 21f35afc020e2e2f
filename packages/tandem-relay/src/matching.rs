//! Compatibility and scoring.
//!
//! `compatible` is a hard gate applied before any scoring: identity, chat
//! mode, safe mode and the recent-skip memory. `score` ranks compatible
//! pairs by interest overlap, with a bounded random term and a slow
//! time-based wobble so the same pair is not always ranked first.
//!
//! Randomness and the clock are owned by [`MatchingPolicy`] and can be
//! pinned in tests.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::participant::Participant;

/// Score when only one side declared interests.
pub const ONE_SIDED_SCORE: f64 = 0.3;

/// Half-width of the random perturbation.
const JITTER_SPAN: f64 = 0.3;

/// Amplitude of the time-based oscillation.
const OSCILLATION_AMPLITUDE: f64 = 0.1;

/// Period divisor of the oscillation, in milliseconds.
const OSCILLATION_PERIOD_MS: f64 = 100_000.0;

const EXACT_MATCH_POINTS: f64 = 2.0;
const CATEGORY_MATCH_POINTS: f64 = 1.0;

/// Keyword → category table used for partial interest matches.
const INTEREST_CATEGORIES: &[(&str, &[&str])] = &[
    (
        "gaming",
        &["gaming", "games", "xbox", "playstation", "pc", "nintendo", "steam", "esports"],
    ),
    (
        "music",
        &["music", "songs", "bands", "concerts", "instruments", "spotify", "singing"],
    ),
    (
        "movies",
        &["movies", "films", "cinema", "netflix", "series", "tv", "shows"],
    ),
    (
        "sports",
        &["sports", "football", "basketball", "soccer", "tennis", "hockey", "gym"],
    ),
    (
        "technology",
        &["tech", "programming", "coding", "computers", "ai", "software"],
    ),
    (
        "art",
        &["art", "drawing", "painting", "design", "photography", "creative"],
    ),
    (
        "books",
        &["books", "reading", "novels", "literature", "writing", "poetry"],
    ),
    (
        "travel",
        &["travel", "vacation", "countries", "culture", "adventure", "explore"],
    ),
];

/// Category of an interest keyword, if it is in the table.
pub fn category_of(interest: &str) -> Option<&'static str> {
    let needle = interest.trim().to_lowercase();
    INTEREST_CATEGORIES
        .iter()
        .find(|(_, keywords)| keywords.iter().any(|k| *k == needle))
        .map(|(category, _)| *category)
}

/// Hard gate: may these two ever be paired right now?
pub fn compatible(a: &Participant, b: &Participant) -> bool {
    if a.id == b.id || a.shares_session_with(b) {
        return false;
    }
    if a.chat_mode != b.chat_mode || a.safe_mode != b.safe_mode {
        return false;
    }
    if a.last_skipped.as_ref() == Some(&b.id) || b.last_skipped.as_ref() == Some(&a.id) {
        return false;
    }
    true
}

/// Normalized interest overlap in `[0, 1]` when both sides declared
/// interests; `None` otherwise.
///
/// Every pair of interests earns 2 points for an exact (case-insensitive)
/// match, otherwise 1 point when both fall in the same category. The sum is
/// divided by the longer list and capped at 1, so the result does not
/// depend on argument order.
pub fn interest_overlap(a: &[String], b: &[String]) -> Option<f64> {
    if a.is_empty() || b.is_empty() {
        return None;
    }

    let a_norm: Vec<String> = a.iter().map(|i| i.trim().to_lowercase()).collect();
    let b_norm: Vec<String> = b.iter().map(|i| i.trim().to_lowercase()).collect();

    // Every pair counts, so one interest can score against several others.
    let points: f64 = a_norm
        .iter()
        .flat_map(|x| b_norm.iter().map(move |y| pair_points(x, y)))
        .sum();

    let denominator = a.len().max(b.len()) as f64;
    Some((points / denominator).min(1.0))
}

fn pair_points(x: &str, y: &str) -> f64 {
    if x == y {
        EXACT_MATCH_POINTS
    } else if category_of(x).is_some_and(|c| category_of(y) == Some(c)) {
        CATEGORY_MATCH_POINTS
    } else {
        0.0
    }
}

/// Scoring policy with an owned random source and clock.
pub struct MatchingPolicy {
    rng: StdRng,
    clock: fn() -> i64,
}

impl Default for MatchingPolicy {
    fn default() -> Self {
        Self::new()
    }
}

impl MatchingPolicy {
    pub fn new() -> Self {
        Self {
            rng: StdRng::from_entropy(),
            clock: wall_clock_millis,
        }
    }

    /// Deterministic policy for tests and replays.
    #[cfg(test)]
    pub fn seeded(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
            clock: wall_clock_millis,
        }
    }

    /// Replace the clock feeding the oscillation term.
    #[cfg(test)]
    pub fn with_clock(mut self, clock: fn() -> i64) -> Self {
        self.clock = clock;
        self
    }

    /// Preference score in `[0, 1]`.
    pub fn score(&mut self, a: &Participant, b: &Participant) -> f64 {
        match (a.interests.is_empty(), b.interests.is_empty()) {
            (true, true) => self.rng.gen::<f64>(),
            (true, false) | (false, true) => ONE_SIDED_SCORE,
            (false, false) => {
                let base = interest_overlap(&a.interests, &b.interests).unwrap_or(0.0);
                let jitter = (self.rng.gen::<f64>() - 0.5) * JITTER_SPAN;
                let now_ms = (self.clock)() as f64;
                let wobble = (now_ms / OSCILLATION_PERIOD_MS).sin() * OSCILLATION_AMPLITUDE;
                (base + jitter + wobble).clamp(0.0, 1.0)
            }
        }
    }

    /// Uniform index in `0..len`. `len` must be non-zero.
    pub fn pick_index(&mut self, len: usize) -> usize {
        self.rng.gen_range(0..len)
    }
}

fn wall_clock_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}
