//! Approximate token estimators.
//!
//! Neither estimator is a tokenizer. Both are cheap per-message heuristics
//! whose transcript estimate is the sum of per-message costs, so the
//! estimate never shrinks when a message is added and never changes for an
//! unchanged transcript.

use std::fmt::Debug;

use crate::Message;

/// Default characters per token for [`CharRatio`].
/// Most tokenizers average 3-4 chars per token; 3.5 is the middle ground.
pub const DEFAULT_CHARS_PER_TOKEN: f64 = 3.5;

/// Fixed framing overhead charged for every message (role markers, separators).
pub const PER_MESSAGE_OVERHEAD: usize = 4;

/// Estimates how many tokens a message costs in a model request.
pub trait TokenEstimator: Send + Sync + Debug {
    /// Token cost of a single message. Must be deterministic.
    fn message_tokens(&self, message: &Message) -> usize;

    /// Token cost of a whole transcript: the sum of its message costs.
    fn estimate(&self, messages: &[Message]) -> usize {
        messages.iter().map(|m| self.message_tokens(m)).sum()
    }
}

/// Word-count heuristic: about 1.3 tokens per whitespace-separated word,
/// plus a quarter token per character of the sender label and a fixed
/// per-message overhead.
#[derive(Debug, Clone, Copy, Default)]
pub struct WordHeuristic;

impl TokenEstimator for WordHeuristic {
    fn message_tokens(&self, message: &Message) -> usize {
        let words = message.content.split_whitespace().count();
        // ceil(words * 1.3) in integer arithmetic.
        let content_tokens = (words * 13).div_ceil(10);
        PER_MESSAGE_OVERHEAD + message.from.len() / 4 + content_tokens
    }
}

/// Character-ratio heuristic: characters of sender and content divided by a
/// characters-per-token ratio, rounded up, plus the per-message overhead.
#[derive(Debug, Clone, Copy)]
pub struct CharRatio {
    chars_per_token: f64,
}

impl CharRatio {
    /// Ratios at or below zero fall back to [`DEFAULT_CHARS_PER_TOKEN`].
    pub fn new(chars_per_token: f64) -> Self {
        let chars_per_token = if chars_per_token > 0.0 {
            chars_per_token
        } else {
            DEFAULT_CHARS_PER_TOKEN
        };
        Self { chars_per_token }
    }

    pub fn chars_per_token(&self) -> f64 {
        self.chars_per_token
    }
}

impl Default for CharRatio {
    fn default() -> Self {
        Self::new(DEFAULT_CHARS_PER_TOKEN)
    }
}

impl TokenEstimator for CharRatio {
    fn message_tokens(&self, message: &Message) -> usize {
        let chars = message.from.chars().count() + message.content.chars().count();
        PER_MESSAGE_OVERHEAD + (chars as f64 / self.chars_per_token).ceil() as usize
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn msg(from: &str, content: &str) -> Message {
        Message::new(from, content)
    }

    #[test]
    fn word_heuristic_counts_overhead_label_and_words() {
        // 4 overhead + "abcdefgh".len()/4 = 2 + ceil(10 * 1.3) = 13
        let m = msg("abcdefgh", "one two three four five six seven eight nine ten");
        assert_eq!(WordHeuristic.message_tokens(&m), 4 + 2 + 13);
    }

    #[test]
    fn word_heuristic_rounds_up_partial_tokens() {
        // ceil(1 * 1.3) = 2
        assert_eq!(WordHeuristic.message_tokens(&msg("", "word")), 4 + 2);
        assert_eq!(WordHeuristic.message_tokens(&msg("", "")), 4);
    }

    #[test]
    fn char_ratio_rounds_up() {
        let est = CharRatio::new(4.0);
        // 1 + 4 chars = 5 / 4.0 = 1.25 -> 2
        assert_eq!(est.message_tokens(&msg("A", "abcd")), 4 + 2);
    }

    #[test]
    fn char_ratio_rejects_non_positive_ratio() {
        assert_eq!(CharRatio::new(0.0).chars_per_token(), DEFAULT_CHARS_PER_TOKEN);
        assert_eq!(CharRatio::new(-2.0).chars_per_token(), DEFAULT_CHARS_PER_TOKEN);
    }

    #[test]
    fn estimates_are_monotonic_in_transcript_size() {
        let estimators: Vec<Box<dyn TokenEstimator>> =
            vec![Box::new(WordHeuristic), Box::new(CharRatio::default())];
        for est in estimators {
            let mut transcript = Vec::new();
            let mut previous = est.estimate(&transcript);
            assert_eq!(previous, 0);
            for i in 0..20 {
                transcript.push(msg("User 1 (gpt-4)", &"word ".repeat(i)));
                let current = est.estimate(&transcript);
                assert!(current > previous, "{est:?} shrank at {i}");
                previous = current;
            }
        }
    }

    #[test]
    fn estimates_are_stable() {
        let transcript = vec![msg("System", "be brief"), msg("A", "hello there")];
        let first = WordHeuristic.estimate(&transcript);
        for _ in 0..5 {
            assert_eq!(WordHeuristic.estimate(&transcript), first);
        }
    }
}
