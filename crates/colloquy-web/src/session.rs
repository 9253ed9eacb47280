//! Server-side owner of the one conversation this process runs.
//!
//! A [`ConversationSession`] holds the editable [`ConversationConfig`], the
//! [`HistoryHub`] observers subscribe to, and the status of the background
//! run. Exactly one run may be started per session.

use std::sync::{Arc, Mutex, MutexGuard};

use colloquy::Error;
use colloquy::agent::SharedAgent;
use colloquy::config::ConversationConfig;
use colloquy::conversation::{Conversation, RunOutcome, RunReport, run_conversation};
use colloquy::history::{HistoryHub, HubConfig};
use colloquy::roster::{EnvCredentials, build_roster};
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Builds the roster for a run from the current configuration.
pub type RosterFactory =
    Arc<dyn Fn(&ConversationConfig) -> Result<Vec<SharedAgent>, Error> + Send + Sync>;

/// Why a session operation was refused.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("a conversation has already been started")]
    AlreadyStarted,

    #[error("no participants available for the current configuration")]
    EmptyRoster,

    #[error("no conversation is running")]
    NotRunning,

    #[error(transparent)]
    Conversation(#[from] Error),
}

/// Progress of the session's single run.
#[derive(Clone, Debug)]
enum RunStatus {
    Idle,
    Running { participants: Vec<String> },
    Finished { participants: Vec<String>, report: RunReport },
    Failed { participants: Vec<String>, error: String },
}

/// JSON view of a session, served by `GET /api/state`.
#[derive(Serialize, Clone, Debug)]
pub struct SessionSnapshot {
    /// `idle`, `running`, `completed`, `aborted`, `cancelled` or `failed`.
    pub state: &'static str,
    pub participants: Vec<String>,
    /// Successful turns published so far.
    pub turns_completed: usize,
    /// Messages published so far, System message included.
    pub transcript_len: usize,
    pub subscriber_count: usize,
    pub config: ConversationConfig,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub report: Option<RunReport>,
    /// Cause of the last failed or aborted run.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_failure: Option<String>,
}

/// Configuration, history hub, and run status for one conversation.
pub struct ConversationSession {
    config: Mutex<ConversationConfig>,
    hub: HistoryHub,
    roster_factory: RosterFactory,
    status: Arc<Mutex<RunStatus>>,
    cancel: CancellationToken,
}

impl ConversationSession {
    pub fn new(config: ConversationConfig, roster_factory: RosterFactory) -> Self {
        let hub = HistoryHub::new(HubConfig::default().with_buffer_capacity(config.hub_buffer));
        Self {
            config: Mutex::new(config),
            hub,
            roster_factory,
            status: Arc::new(Mutex::new(RunStatus::Idle)),
            cancel: CancellationToken::new(),
        }
    }

    /// A session whose roster comes from the process environment at start time.
    pub fn from_env(config: ConversationConfig) -> Self {
        Self::new(
            config,
            Arc::new(|config: &ConversationConfig| {
                build_roster(config, &EnvCredentials::from_env())
            }),
        )
    }

    pub fn hub(&self) -> &HistoryHub {
        &self.hub
    }

    pub fn config(&self) -> ConversationConfig {
        lock(&self.config).clone()
    }

    /// Replace the configuration. Refused once a run has started.
    pub fn configure(&self, config: ConversationConfig) -> Result<(), SessionError> {
        let status = lock(&self.status);
        if !matches!(*status, RunStatus::Idle) {
            return Err(SessionError::AlreadyStarted);
        }
        info!(
            "Configuration updated: {} turn(s), {} participant(s) requested",
            config.turns,
            config.requested_participants()
        );
        *lock(&self.config) = config;
        Ok(())
    }

    /// Build the roster and start the run on a background task.
    ///
    /// Returns the participants' display names as soon as the run is under
    /// way; progress is observable through the hub.
    pub fn start(&self) -> Result<Vec<String>, SessionError> {
        let mut status = lock(&self.status);
        if !matches!(*status, RunStatus::Idle) {
            return Err(SessionError::AlreadyStarted);
        }

        let config = self.config();
        let roster = match (self.roster_factory)(&config) {
            Ok(roster) => roster,
            Err(Error::EmptyRoster) => return Err(SessionError::EmptyRoster),
            Err(e) => return Err(e.into()),
        };
        let participants: Vec<String> = roster.iter().map(|a| a.name().to_string()).collect();
        let prompt = config.rendered_prompt(roster.len());
        let mut conversation = Conversation::new(roster)?;

        *status = RunStatus::Running {
            participants: participants.clone(),
        };
        drop(status);

        let hub = self.hub.clone();
        let shared_status = Arc::clone(&self.status);
        let cancel = self.cancel.child_token();
        let names = participants.clone();
        tokio::spawn(async move {
            let result =
                run_conversation(&mut conversation, &hub, prompt, config.turns, &cancel).await;
            let next = match result {
                Ok(report) => {
                    info!("Run finished: {}", report.summary());
                    RunStatus::Finished {
                        participants: names,
                        report,
                    }
                }
                Err(e) => {
                    warn!("Run failed: {e}");
                    RunStatus::Failed {
                        participants: names,
                        error: e.to_string(),
                    }
                }
            };
            *lock(&shared_status) = next;
        });

        info!("Conversation started with {} participant(s)", participants.len());
        Ok(participants)
    }

    /// Cancel the running conversation. A turn still waiting on its agent is
    /// dropped, not applied.
    pub fn stop(&self) -> Result<(), SessionError> {
        if !matches!(*lock(&self.status), RunStatus::Running { .. }) {
            return Err(SessionError::NotRunning);
        }
        info!("Stop requested");
        self.cancel.cancel();
        Ok(())
    }

    /// Cancel any run and close every observer stream.
    pub fn shutdown(&self) {
        self.cancel.cancel();
        self.hub.shutdown();
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        let status = lock(&self.status).clone();
        let transcript_len = self.hub.len();
        let (state, participants, report, last_failure) = match status {
            RunStatus::Idle => ("idle", Vec::new(), None, None),
            RunStatus::Running { participants } => ("running", participants, None, None),
            RunStatus::Finished {
                participants,
                report,
            } => {
                let (state, failure) = match &report.outcome {
                    RunOutcome::Completed => ("completed", None),
                    RunOutcome::Cancelled => ("cancelled", None),
                    RunOutcome::Aborted { turn, agent, cause } => (
                        "aborted",
                        Some(format!("turn {turn} ({agent}): {cause}")),
                    ),
                };
                (state, participants, Some(report), failure)
            }
            RunStatus::Failed {
                participants,
                error,
            } => ("failed", participants, None, Some(error)),
        };

        SessionSnapshot {
            state,
            participants,
            turns_completed: transcript_len.saturating_sub(1),
            transcript_len,
            subscriber_count: self.hub.subscriber_count(),
            config: self.config(),
            report,
            last_failure,
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}
