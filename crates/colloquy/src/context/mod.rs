//! Context window management: token estimation and budget trimming.
//!
//! Each agent's request must fit its model's window with room left for the
//! response. Two pieces cooperate:
//!
//! 1. **[`estimate`]**: [`TokenEstimator`] implementations. Deliberately
//!    approximate ([`WordHeuristic`] by default, [`CharRatio`] as an
//!    alternative); swap in another implementation if exact counts matter.
//!
//! 2. **[`window`]**: [`ContextWindowManager::fit`] produces a trimmed
//!    per-agent view, keeping the System anchor and the newest messages and
//!    dropping from just after the anchor.

pub mod estimate;
pub mod window;

pub use estimate::{CharRatio, DEFAULT_CHARS_PER_TOKEN, TokenEstimator, WordHeuristic};
pub use window::{Budget, ContextWindowManager, FittedView};
