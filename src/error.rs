use thiserror::Error;

use crate::backend::{ProtocolError, TransportError};
use crate::status::Phase;

/// Everything that can go wrong while driving a job.
#[derive(Debug, Error)]
pub enum JobError {
    /// No response was received (network failure or timeout).
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    /// A response arrived but did not match the expected shape.
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// The backend reported the job as failed. Terminal.
    #[error("job failed: {0}")]
    Backend(String),

    /// The caller used the session out of order.
    #[error("invalid session state: {0}")]
    State(#[from] StateError),
}

impl JobError {
    /// Only transport failures are worth retrying; the rest need a code or backend fix.
    pub fn is_retryable(&self) -> bool {
        matches!(self, JobError::Transport(_))
    }
}

/// Caller misuse of a [`JobSession`](crate::session::JobSession).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StateError {
    #[error("a job was already submitted on this session")]
    AlreadySubmitted,

    #[error("another request is still in flight")]
    RequestInFlight,

    #[error("feedback is only accepted while interrupted (phase: {phase})")]
    NotInterrupted { phase: String },

    #[error("polling can only be retried while processing (phase: {phase})")]
    NotRetryable { phase: String },

    #[error("session was cancelled")]
    Cancelled,

    #[error("no job is being tracked")]
    NoJob,

    #[error("primary content must not be empty")]
    EmptyContent,
}

impl StateError {
    pub(crate) fn not_interrupted(phase: Option<Phase>) -> Self {
        StateError::NotInterrupted {
            phase: describe(phase),
        }
    }

    pub(crate) fn not_retryable(phase: Option<Phase>) -> Self {
        StateError::NotRetryable {
            phase: describe(phase),
        }
    }
}

fn describe(phase: Option<Phase>) -> String {
    phase.map_or_else(|| "IDLE".to_string(), |p| p.to_string())
}
