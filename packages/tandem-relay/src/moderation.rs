//! Chat message sanitizing.

/// Outcome of sanitizing one chat message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Sanitized {
    /// Forward this text.
    Clean(String),
    /// Nothing left to send after trimming.
    Empty,
    /// Refused; the sender is told why.
    Blocked { reason: String },
}

/// Cleans or refuses outgoing chat text.
pub trait MessageSanitizer: Send + Sync {
    fn sanitize(&self, text: &str) -> Sanitized;
}

const BANNED_WORDS: &[&str] = &[
    "fuck", "shit", "damn", "bitch", "asshole", "bastard", "porn", "sex", "nude", "naked",
    "dick", "pussy", "cock", "tits", "boobs", "ass",
];

const BLOCKED_REASON: &str = "Message contains inappropriate content";

/// Word-list sanitizer: trims, blocks on any banned substring
/// (case-insensitive), truncates long messages.
#[derive(Debug, Clone)]
pub struct WordListSanitizer {
    max_length: usize,
}

impl WordListSanitizer {
    pub fn new(max_length: usize) -> Self {
        Self { max_length }
    }
}

impl MessageSanitizer for WordListSanitizer {
    fn sanitize(&self, text: &str) -> Sanitized {
        let trimmed = text.trim();
        if trimmed.is_empty() {
            return Sanitized::Empty;
        }

        let lowered = trimmed.to_lowercase();
        if BANNED_WORDS.iter().any(|word| lowered.contains(word)) {
            return Sanitized::Blocked {
                reason: BLOCKED_REASON.to_string(),
            };
        }

        if trimmed.chars().count() > self.max_length {
            let mut cut: String = trimmed.chars().take(self.max_length).collect();
            cut.push_str("...");
            return Sanitized::Clean(cut);
        }

        Sanitized::Clean(trimmed.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clean_message_is_trimmed() {
        let s = WordListSanitizer::new(500);
        assert_eq!(s.sanitize("  hello there "), Sanitized::Clean("hello there".into()));
    }

    #[test]
    fn test_empty_message() {
        let s = WordListSanitizer::new(500);
        assert_eq!(s.sanitize("   "), Sanitized::Empty);
        assert_eq!(s.sanitize(""), Sanitized::Empty);
    }

    #[test]
    fn test_banned_word_blocked_case_insensitive() {
        let s = WordListSanitizer::new(500);
        match s.sanitize("well DAMN") {
            Sanitized::Blocked { reason } => assert_eq!(reason, BLOCKED_REASON),
            other => panic!("Expected Blocked, got {:?}", other),
        }
    }

    #[test]
    fn test_long_message_truncated() {
        let s = WordListSanitizer::new(10);
        assert_eq!(
            s.sanitize("abcdefghijklmnop"),
            Sanitized::Clean("abcdefghij...".into())
        );
    }

    #[test]
    fn test_truncation_respects_char_boundaries() {
        let s = WordListSanitizer::new(3);
        assert_eq!(s.sanitize("ééééé"), Sanitized::Clean("ééé...".into()));
    }
}
