//! Anchor-preserving transcript trimming.
//!
//! Every request an agent sees must leave room for the agent's response
//! inside its model's context window. [`ContextWindowManager::fit`] drops the
//! oldest non-anchor messages until that holds:
//!
//! ```text
//! [S, m1, m2, m3, m4]  ->  [S, m2, m3, m4]  ->  [S, m3, m4]  ...
//!  ^ anchor kept            oldest after the anchor goes first
//! ```
//!
//! The anchor (the opening System instruction) survives as long as any other
//! message does, the most recent messages always survive, and trimming stops
//! at a single message even if that message alone is over budget.

use tracing::debug;

use super::estimate::{TokenEstimator, WordHeuristic};
use crate::Message;

/// Token limits of one model.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Budget {
    /// Total tokens the model accepts for prompt plus response.
    pub context_window_tokens: usize,
    /// Tokens reserved for the response.
    pub max_response_tokens: usize,
}

impl Budget {
    pub fn new(context_window_tokens: usize, max_response_tokens: usize) -> Self {
        Self {
            context_window_tokens,
            max_response_tokens,
        }
    }

    /// Tokens available for the prompt once the response is reserved.
    pub fn prompt_tokens(&self) -> usize {
        self.context_window_tokens
            .saturating_sub(self.max_response_tokens)
    }

    /// Whether a prompt of `estimated_tokens` leaves room for the response.
    pub fn fits(&self, estimated_tokens: usize) -> bool {
        estimated_tokens.saturating_add(self.max_response_tokens) <= self.context_window_tokens
    }
}

/// Result of [`ContextWindowManager::fit_with_report`].
#[derive(Debug, Clone)]
pub struct FittedView {
    /// The trimmed transcript view.
    pub messages: Vec<Message>,
    /// How many messages were dropped after the anchor.
    pub dropped: usize,
    /// Estimated prompt tokens of `messages`.
    pub estimated_tokens: usize,
}

impl FittedView {
    /// Format as a short log-friendly string.
    pub fn to_log_string(&self, budget: &Budget) -> String {
        format!(
            "context: ~{} tokens of {} ({} reserved for response), {} kept, {} dropped",
            self.estimated_tokens,
            budget.context_window_tokens,
            budget.max_response_tokens,
            self.messages.len(),
            self.dropped,
        )
    }
}

/// Produces per-agent transcript views that fit the agent's budget.
///
/// Trimming never fails; the worst case is a single-message view.
#[derive(Debug)]
pub struct ContextWindowManager {
    estimator: Box<dyn TokenEstimator>,
}

impl Default for ContextWindowManager {
    fn default() -> Self {
        Self::new(WordHeuristic)
    }
}

impl ContextWindowManager {
    pub fn new(estimator: impl TokenEstimator + 'static) -> Self {
        Self {
            estimator: Box::new(estimator),
        }
    }

    pub fn estimator(&self) -> &dyn TokenEstimator {
        self.estimator.as_ref()
    }

    /// Estimated prompt tokens of a transcript.
    pub fn estimate(&self, transcript: &[Message]) -> usize {
        self.estimator.estimate(transcript)
    }

    /// Trimmed copy of `transcript` that fits `budget`. The input is untouched.
    pub fn fit(&self, transcript: &[Message], budget: Budget) -> Vec<Message> {
        self.fit_with_report(transcript, budget).messages
    }

    /// Like [`fit`](Self::fit), also reporting what was dropped.
    pub fn fit_with_report(&self, transcript: &[Message], budget: Budget) -> FittedView {
        let costs: Vec<usize> = transcript
            .iter()
            .map(|m| self.estimator.message_tokens(m))
            .collect();
        let mut sum: usize = costs.iter().sum();

        // Dropping index 1 repeatedly removes costs[1], costs[2], ... in order.
        let mut dropped = 0;
        while !budget.fits(sum) && transcript.len() - dropped > 1 {
            sum -= costs[1 + dropped];
            dropped += 1;
        }

        let mut messages: Vec<Message> = if dropped == 0 {
            transcript.to_vec()
        } else {
            std::iter::once(&transcript[0])
                .chain(&transcript[1 + dropped..])
                .cloned()
                .collect()
        };

        // The per-message sum is only a lower bound when an estimator
        // overrides `estimate`; the whole-view estimate is authoritative.
        let mut total = self.estimator.estimate(&messages);
        while !budget.fits(total) && messages.len() > 1 {
            messages.remove(1);
            dropped += 1;
            total = self.estimator.estimate(&messages);
        }

        if dropped > 0 {
            debug!(
                "Trimmed {} of {} messages to fit {} tokens",
                dropped,
                transcript.len(),
                budget.context_window_tokens
            );
        }

        FittedView {
            messages,
            dropped,
            estimated_tokens: total,
        }
    }
}
