//! Turn taking: the [`Conversation`] state machine and the driver that runs
//! it against a [`HistoryHub`](crate::history::HistoryHub).

pub mod driver;
pub mod engine;

pub use driver::{RunOutcome, RunReport, run_conversation, spawn_conversation};
pub use engine::{Conversation, ConversationState};
