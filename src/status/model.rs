use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::backend::ProtocolError;

/// The phases a generation job moves through, as seen by the client.
///
/// Jobs flow: SUBMITTING → PROCESSING → {INTERRUPTED | COMPLETED | FAILED},
/// and INTERRUPTED → SUBMITTING again when feedback is sent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Submitting,
    Processing,
    Interrupted,
    Completed,
    Failed,
}

impl Phase {
    /// Completed and failed jobs never transition again.
    pub fn is_terminal(self) -> bool {
        matches!(self, Phase::Completed | Phase::Failed)
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Phase::Submitting => write!(f, "SUBMITTING"),
            Phase::Processing => write!(f, "PROCESSING"),
            Phase::Interrupted => write!(f, "INTERRUPTED"),
            Phase::Completed => write!(f, "COMPLETED"),
            Phase::Failed => write!(f, "FAILED"),
        }
    }
}

/// Phase plus the payload that belongs to it.
///
/// Carrying the payload inside the variant means a status can never hold a
/// result and an error (or interrupt messages) at the same time.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "phase", rename_all = "snake_case")]
pub enum JobState {
    Submitting,
    Processing,
    Interrupted { interrupt_messages: Vec<String> },
    Completed { result: Value },
    Failed { error: String },
}

impl JobState {
    pub fn phase(&self) -> Phase {
        match self {
            JobState::Submitting => Phase::Submitting,
            JobState::Processing => Phase::Processing,
            JobState::Interrupted { .. } => Phase::Interrupted,
            JobState::Completed { .. } => Phase::Completed,
            JobState::Failed { .. } => Phase::Failed,
        }
    }
}

/// Unified view of a job's progress, independent of the endpoint that reported it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatusModel {
    /// Backend-assigned identifier, stable for the job's lifetime.
    pub job_id: String,
    /// Sub-session identifier; empty until the backend allocates one.
    pub session_id: String,
    #[serde(flatten)]
    pub state: JobState,
    /// Advisory label of the backend stage currently running.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_stage: Option<String>,
}

impl StatusModel {
    pub fn new(job_id: impl Into<String>, state: JobState) -> Self {
        Self {
            job_id: job_id.into(),
            session_id: String::new(),
            state,
            current_stage: None,
        }
    }

    pub fn processing(job_id: impl Into<String>) -> Self {
        Self::new(job_id, JobState::Processing)
    }

    pub fn phase(&self) -> Phase {
        self.state.phase()
    }

    pub fn result(&self) -> Option<&Value> {
        match &self.state {
            JobState::Completed { result } => Some(result),
            _ => None,
        }
    }

    pub fn error(&self) -> Option<&str> {
        match &self.state {
            JobState::Failed { error } => Some(error),
            _ => None,
        }
    }

    pub fn interrupt_messages(&self) -> Option<&[String]> {
        match &self.state {
            JobState::Interrupted { interrupt_messages } => Some(interrupt_messages),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.phase().is_terminal()
    }

    /// Fold a newer observation of the same job into this one.
    ///
    /// The job id must match (an empty incoming id is taken as "same job").
    /// A session id, once set, is never cleared by a later observation that
    /// omits it. The stage label sticks until a newer one arrives.
    pub fn advance(&mut self, next: StatusModel) -> Result<(), ProtocolError> {
        if !next.job_id.is_empty() && next.job_id != self.job_id {
            return Err(ProtocolError::JobIdMismatch {
                expected: self.job_id.clone(),
                actual: next.job_id,
            });
        }
        if !next.session_id.is_empty() {
            self.session_id = next.session_id;
        }
        if next.current_stage.is_some() {
            self.current_stage = next.current_stage;
        }
        self.state = next.state;
        Ok(())
    }
}
