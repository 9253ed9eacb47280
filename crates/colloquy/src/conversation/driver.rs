//! Bounded driving loop: start, take N turns, publish everything.

use serde::Serialize;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use super::engine::Conversation;
use crate::Error;
use crate::history::HistoryHub;

/// How a driving loop ended.
#[derive(Serialize, Clone, Debug, PartialEq, Eq)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum RunOutcome {
    /// All requested turns were taken.
    Completed,
    /// A turn failed and the conversation was aborted.
    Aborted {
        /// Index of the turn that failed.
        turn: usize,
        agent: String,
        cause: String,
    },
    /// The cancellation token fired before the requested turns were taken.
    Cancelled,
}

/// Summary of one driving loop.
#[derive(Serialize, Clone, Debug)]
pub struct RunReport {
    pub requested_turns: usize,
    pub turns_completed: usize,
    /// Transcript length at the end of the run, System message included.
    pub transcript_len: usize,
    #[serde(flatten)]
    pub outcome: RunOutcome,
}

impl RunReport {
    pub fn is_success(&self) -> bool {
        self.outcome == RunOutcome::Completed
    }

    /// One-line human-readable summary.
    pub fn summary(&self) -> String {
        match &self.outcome {
            RunOutcome::Completed => format!(
                "completed {}/{} turns ({} messages)",
                self.turns_completed, self.requested_turns, self.transcript_len
            ),
            RunOutcome::Aborted { turn, agent, cause } => format!(
                "aborted at turn {turn} by {agent}: {cause} ({}/{} turns taken)",
                self.turns_completed, self.requested_turns
            ),
            RunOutcome::Cancelled => format!(
                "cancelled after {}/{} turns",
                self.turns_completed, self.requested_turns
            ),
        }
    }
}

/// Start `conversation` with `prompt` and take up to `turns` turns,
/// publishing the System message and every reply to `hub`.
///
/// `cancel` is checked before every turn and also interrupts a turn that is
/// still waiting on its agent; an interrupted turn is not applied.
///
/// Returns `Err` only when the run could not proceed at all: the
/// conversation was already started, or the hub was shut down. Turn
/// failures are reported through [`RunOutcome::Aborted`].
pub async fn run_conversation(
    conversation: &mut Conversation,
    hub: &HistoryHub,
    prompt: impl Into<String>,
    turns: usize,
    cancel: &CancellationToken,
) -> Result<RunReport, Error> {
    let opening = conversation.start(prompt)?;
    if let Err(e) = hub.publish(opening) {
        conversation.abort();
        return Err(e);
    }

    let outcome = loop {
        if conversation.turn() >= turns {
            break RunOutcome::Completed;
        }
        if cancel.is_cancelled() {
            break RunOutcome::Cancelled;
        }

        let turn = conversation.turn();
        let result = tokio::select! {
            _ = cancel.cancelled() => break RunOutcome::Cancelled,
            result = conversation.next_turn() => result,
        };

        match result {
            Ok(message) => {
                info!("[turn {turn}] {}", message);
                if let Err(e) = hub.publish(message) {
                    warn!("History hub closed mid-run at turn {turn}, stopping");
                    conversation.abort();
                    return Err(e);
                }
            }
            Err(Error::AgentGenerationFailed { agent, cause }) => {
                break RunOutcome::Aborted {
                    turn,
                    agent,
                    cause: cause.to_string(),
                };
            }
            Err(other) => {
                break RunOutcome::Aborted {
                    turn,
                    agent: conversation.active_agent().name().to_string(),
                    cause: other.to_string(),
                };
            }
        }
    };

    match &outcome {
        RunOutcome::Completed => conversation.complete()?,
        RunOutcome::Aborted { turn, agent, cause } => {
            warn!("Conversation aborted at turn {turn} ({agent}): {cause}");
            conversation.abort();
        }
        RunOutcome::Cancelled => {
            info!("Conversation cancelled at turn {}", conversation.turn());
            conversation.abort();
        }
    }

    Ok(RunReport {
        requested_turns: turns,
        turns_completed: conversation.turn(),
        transcript_len: conversation.transcript().len(),
        outcome,
    })
}

/// [`run_conversation`] on a background task. Returns immediately.
pub fn spawn_conversation(
    mut conversation: Conversation,
    hub: HistoryHub,
    prompt: impl Into<String>,
    turns: usize,
    cancel: CancellationToken,
) -> JoinHandle<Result<RunReport, Error>> {
    let prompt = prompt.into();
    tokio::spawn(async move {
        run_conversation(&mut conversation, &hub, prompt, turns, &cancel).await
    })
}
