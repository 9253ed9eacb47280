//! The turn-taking state machine.

use std::fmt;
use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::agent::SharedAgent;
use crate::context::ContextWindowManager;
use crate::{Error, Message};

/// Lifecycle of a [`Conversation`].
///
/// `NotStarted → Running → (Completed | Aborted)`.
#[derive(Serialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ConversationState {
    NotStarted,
    Running,
    Completed,
    Aborted,
}

impl fmt::Display for ConversationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConversationState::NotStarted => write!(f, "not started"),
            ConversationState::Running => write!(f, "running"),
            ConversationState::Completed => write!(f, "completed"),
            ConversationState::Aborted => write!(f, "aborted"),
        }
    }
}

/// A round-robin conversation over a fixed roster of agents.
///
/// Turn `t` is always served by `roster[t % roster.len()]`. The transcript
/// only ever grows: a successful turn appends exactly one message, a failed
/// turn appends nothing and leaves the turn counter where it was.
///
/// # Example
///
/// ```ignore
/// let mut conversation = Conversation::new(vec![agent_a, agent_b])?;
/// conversation.start("Discuss open source AI.")?;
/// for _ in 0..4 {
///     let message = conversation.next_turn().await?;
///     println!("{message}");
/// }
/// conversation.complete()?;
/// ```
pub struct Conversation {
    roster: Vec<SharedAgent>,
    transcript: Vec<Message>,
    turn: usize,
    state: ConversationState,
    context: ContextWindowManager,
}

impl fmt::Debug for Conversation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Conversation")
            .field("roster", &self.roster_names())
            .field("transcript_len", &self.transcript.len())
            .field("turn", &self.turn)
            .field("state", &self.state)
            .finish()
    }
}

impl Conversation {
    /// Create a conversation over `roster`. Fails with [`Error::EmptyRoster`]
    /// when there is nobody to take turns.
    pub fn new(roster: Vec<SharedAgent>) -> Result<Self, Error> {
        if roster.is_empty() {
            return Err(Error::EmptyRoster);
        }
        Ok(Self {
            roster,
            transcript: Vec::new(),
            turn: 0,
            state: ConversationState::NotStarted,
            context: ContextWindowManager::default(),
        })
    }

    /// Replace the context window manager (e.g. to use a different estimator).
    pub fn with_context_manager(mut self, context: ContextWindowManager) -> Self {
        self.context = context;
        self
    }

    /// Append the opening System message and begin taking turns.
    ///
    /// Returns the appended message. Only valid once.
    pub fn start(&mut self, initial_system_message: impl Into<String>) -> Result<Message, Error> {
        if self.state != ConversationState::NotStarted {
            return Err(self.invalid("start"));
        }
        let message = Message::system(initial_system_message);
        self.transcript.push(message.clone());
        self.state = ConversationState::Running;
        info!(
            "Conversation started with {} participant(s): {}",
            self.roster.len(),
            self.roster_names().join(", ")
        );
        Ok(message)
    }

    /// Run one turn: the active agent answers its budget-trimmed view of the
    /// transcript and the answer is appended.
    ///
    /// On [`Error::AgentGenerationFailed`] nothing changes and the same agent
    /// is up again on the next call.
    pub async fn next_turn(&mut self) -> Result<Message, Error> {
        if self.state != ConversationState::Running {
            return Err(self.invalid("take a turn"));
        }

        let agent = Arc::clone(&self.roster[self.active_agent_index()]);
        let budget = agent.profile().budget();
        let view = self.context.fit_with_report(&self.transcript, budget);
        debug!(
            "Turn {} -> {} ({})",
            self.turn,
            agent.name(),
            view.to_log_string(&budget)
        );

        match agent.generate(&view.messages).await {
            Ok(content) => {
                let message = Message::new(agent.name(), content);
                self.transcript.push(message.clone());
                self.turn += 1;
                Ok(message)
            }
            Err(cause) => {
                warn!("Turn {} failed for {}: {cause}", self.turn, agent.name());
                Err(Error::AgentGenerationFailed {
                    agent: agent.name().to_string(),
                    cause,
                })
            }
        }
    }

    /// Mark the run as finished. Only valid while running.
    pub fn complete(&mut self) -> Result<(), Error> {
        if self.state != ConversationState::Running {
            return Err(self.invalid("complete"));
        }
        self.state = ConversationState::Completed;
        info!("Conversation completed after {} turn(s)", self.turn);
        Ok(())
    }

    /// Stop taking turns after a failure or cancellation. No-op once the
    /// conversation has already finished.
    pub fn abort(&mut self) {
        if matches!(
            self.state,
            ConversationState::NotStarted | ConversationState::Running
        ) {
            self.state = ConversationState::Aborted;
            info!("Conversation aborted after {} turn(s)", self.turn);
        }
    }

    /// Index into the roster of the agent whose turn is next.
    pub fn active_agent_index(&self) -> usize {
        self.turn % self.roster.len()
    }

    /// The agent whose turn is next.
    pub fn active_agent(&self) -> &SharedAgent {
        &self.roster[self.active_agent_index()]
    }

    /// Number of successful turns so far.
    pub fn turn(&self) -> usize {
        self.turn
    }

    pub fn state(&self) -> ConversationState {
        self.state
    }

    pub fn transcript(&self) -> &[Message] {
        &self.transcript
    }

    pub fn roster(&self) -> &[SharedAgent] {
        &self.roster
    }

    pub fn roster_names(&self) -> Vec<&str> {
        self.roster.iter().map(|a| a.name()).collect()
    }

    fn invalid(&self, operation: &'static str) -> Error {
        Error::InvalidState {
            operation,
            state: self.state,
        }
    }
}
