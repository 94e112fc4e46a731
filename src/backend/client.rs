use super::transport::Transport;
use super::types::{FeedbackInput, JobInput, PollSource};
use crate::error::JobError;
use crate::status::{StatusModel, map_poll_response, map_submit_response};

/// Stateless job operations: a transport round trip followed by mapping.
///
/// Owns no lifecycle state and never retries; that is the polling
/// controller's concern.
pub struct JobClient<T> {
    transport: T,
    source: PollSource,
}

impl<T: Transport> JobClient<T> {
    pub fn new(transport: T, source: PollSource) -> Self {
        Self { transport, source }
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn source(&self) -> PollSource {
        self.source
    }

    /// Start a new job.
    pub async fn submit(&self, input: &JobInput) -> Result<StatusModel, JobError> {
        let raw = self.transport.submit(input).await?;
        Ok(map_submit_response(&raw, None)?)
    }

    /// Fetch the current state of a previously submitted job.
    pub async fn poll(&self, job_id: &str) -> Result<StatusModel, JobError> {
        let raw = self.transport.poll(job_id, self.source).await?;
        Ok(map_poll_response(self.source, &raw, job_id)?)
    }

    /// Resume an interrupted job with human feedback.
    pub async fn feedback(&self, input: &FeedbackInput) -> Result<StatusModel, JobError> {
        let raw = self.transport.feedback(input).await?;
        Ok(map_submit_response(&raw, Some(&input.job_id))?)
    }
}
