//! Consumer-facing facade over one job's lifecycle.
//!
//! A [`JobSession`] submits a job, hands it to a [`PollingController`] while
//! the backend works, routes feedback when the job pauses for a human, and
//! reports the outcome through the registered callbacks. Each session tracks
//! at most one job; build a new session for the next one.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use crate::backend::{Attachment, FeedbackInput, JobClient, JobInput, ProtocolError, Transport};
use crate::error::{JobError, StateError};
use crate::polling::{DEFAULT_POLL_INTERVAL, Hooks, PollingController};
use crate::status::{Phase, StatusModel};
use crate::telemetry::{ClientEvent, NoopNotifier, Notifier, api_error_event};

/// What a feedback request needs to repeat from the original submission.
#[derive(Debug, Clone, Default)]
struct Origin {
    content: String,
    user_id: Option<String>,
}

pub struct JobSession<T: Transport> {
    client: Arc<JobClient<T>>,
    controller: PollingController<T>,
    notifier: Arc<dyn Notifier>,
    origin: Mutex<Origin>,
}

pub struct JobSessionBuilder<T: Transport> {
    client: Arc<JobClient<T>>,
    interval: Duration,
    hooks: Hooks,
    notifier: Arc<dyn Notifier>,
}

impl<T: Transport> JobSessionBuilder<T> {
    pub fn poll_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    pub fn notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifier = notifier;
        self
    }

    /// Called when the job pauses for human feedback.
    pub fn on_interrupt(mut self, hook: impl Fn(&StatusModel) + Send + Sync + 'static) -> Self {
        self.hooks = self.hooks.on_interrupt(hook);
        self
    }

    /// Called once when the job finishes successfully.
    pub fn on_complete(mut self, hook: impl Fn(&StatusModel) + Send + Sync + 'static) -> Self {
        self.hooks = self.hooks.on_complete(hook);
        self
    }

    /// Called when the backend fails the job or polling stops on an error.
    pub fn on_error(mut self, hook: impl Fn(&JobError) + Send + Sync + 'static) -> Self {
        self.hooks = self.hooks.on_error(hook);
        self
    }

    pub fn build(self) -> JobSession<T> {
        let controller = PollingController::new(
            Arc::clone(&self.client),
            self.interval,
            self.hooks,
            Arc::clone(&self.notifier),
        );
        JobSession {
            client: self.client,
            controller,
            notifier: self.notifier,
            origin: Mutex::new(Origin::default()),
        }
    }
}

impl<T: Transport> JobSession<T> {
    pub fn builder(client: Arc<JobClient<T>>) -> JobSessionBuilder<T> {
        JobSessionBuilder {
            client,
            interval: DEFAULT_POLL_INTERVAL,
            hooks: Hooks::default(),
            notifier: Arc::new(NoopNotifier),
        }
    }

    /// Submit a new job.
    ///
    /// An accepted job starts polling. A job that pauses or finishes
    /// immediately fires the matching callback before this returns.
    /// Request failures are returned here and do not reach `on_error`.
    pub async fn submit(&self, input: JobInput) -> Result<StatusModel, JobError> {
        if input.content.trim().is_empty() {
            return Err(StateError::EmptyContent.into());
        }
        let checkpoint = self.controller.begin_request(|phase| match phase {
            None => Ok(()),
            Some(_) => Err(StateError::AlreadySubmitted),
        })?;

        tracing::info!(
            attachments = input.attachments.len(),
            hitl = input.settings.enable_hitl,
            "Submitting job"
        );
        let status = match self.client.submit(&input).await {
            Ok(status) => status,
            Err(err) => {
                self.controller.restore(checkpoint);
                tracing::warn!(error = %err, "Submission failed");
                return Err(err);
            }
        };

        *self.origin.lock().unwrap_or_else(PoisonError::into_inner) = Origin {
            content: input.content,
            user_id: input.user_id,
        };
        self.apply(status)
    }

    /// Answer the pending interrupt and resume the job.
    pub async fn send_feedback(
        &self,
        message: impl Into<String>,
        attachments: Vec<Attachment>,
    ) -> Result<StatusModel, JobError> {
        let checkpoint = self.controller.begin_request(|phase| match phase {
            Some(Phase::Interrupted) => Ok(()),
            other => Err(StateError::not_interrupted(other)),
        })?;
        let Some(job_id) = self.controller.job_id() else {
            self.controller.restore(checkpoint);
            return Err(StateError::NoJob.into());
        };

        let current_node = self.controller.status().and_then(|s| s.current_stage);
        let origin = self.origin.lock().unwrap_or_else(PoisonError::into_inner).clone();
        let request = FeedbackInput {
            job_id: job_id.clone(),
            message: message.into(),
            content: origin.content,
            user_id: origin.user_id,
            attachments,
        };

        tracing::info!(%job_id, "Sending feedback");
        let outcome = match self.client.feedback(&request).await {
            Ok(status) if !status.job_id.is_empty() && status.job_id != job_id => {
                Err(ProtocolError::JobIdMismatch {
                    expected: job_id.clone(),
                    actual: status.job_id,
                }
                .into())
            }
            other => other,
        };
        let status = match outcome {
            Ok(status) => status,
            Err(err) => {
                self.controller.restore(checkpoint);
                tracing::warn!(%job_id, error = %err, "Feedback failed");
                if !self.controller.is_disposed() {
                    if let Some(event) = api_error_event(&err) {
                        self.notifier.notify(&job_id, event);
                    }
                }
                return Err(err);
            }
        };

        let applied = self.apply(status)?;
        self.notifier.notify(
            &job_id,
            ClientEvent::FeedbackSubmitted {
                current_node,
                feedback_length: request.message.chars().count(),
            },
        );
        Ok(applied)
    }

    /// Follow a job submitted elsewhere, starting from the processing phase.
    ///
    /// `content` is what feedback requests will repeat as the original question.
    pub fn attach(
        &self,
        job_id: &str,
        content: impl Into<String>,
        user_id: Option<String>,
    ) -> Result<(), JobError> {
        self.controller.track(job_id)?;
        *self.origin.lock().unwrap_or_else(PoisonError::into_inner) = Origin {
            content: content.into(),
            user_id,
        };
        self.controller.start(job_id);
        Ok(())
    }

    /// Resume polling after it stopped on a transport or protocol error.
    pub fn retry_polling(&self) -> Result<(), JobError> {
        if self.controller.is_disposed() {
            return Err(StateError::Cancelled.into());
        }
        let phase = self.controller.last_known_phase();
        if phase != Some(Phase::Processing) {
            return Err(StateError::not_retryable(phase).into());
        }
        let job_id = self.controller.job_id().ok_or(StateError::NoJob)?;
        self.controller.start(&job_id);
        Ok(())
    }

    /// Stop polling and discard anything still in flight. The session is
    /// inert afterwards: no callback fires and every operation fails.
    pub fn cancel(&self) {
        if !self.controller.is_disposed() {
            tracing::info!(job_id = ?self.controller.job_id(), "Session cancelled");
        }
        self.controller.dispose();
    }

    pub fn status(&self) -> Option<StatusModel> {
        self.controller.status()
    }

    /// `None` until something has been submitted.
    pub fn phase(&self) -> Option<Phase> {
        self.controller.last_known_phase()
    }

    pub fn job_id(&self) -> Option<String> {
        self.controller.job_id()
    }

    pub fn is_polling(&self) -> bool {
        self.controller.is_running()
    }

    pub fn is_cancelled(&self) -> bool {
        self.controller.is_disposed()
    }

    fn apply(&self, status: StatusModel) -> Result<StatusModel, JobError> {
        let Some(applied) = self.controller.deliver(status) else {
            tracing::debug!("Response arrived after cancel, discarded");
            return Err(StateError::Cancelled.into());
        };
        if applied.phase() == Phase::Processing {
            self.controller.start(&applied.job_id);
        }
        Ok(applied)
    }
}
