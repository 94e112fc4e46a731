//! Fire-and-forget client events reported back to the backend.
//!
//! Delivery is best effort: failures are logged at debug level and never
//! reach the job's lifecycle.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use reqwest::{Client, Url};
use serde_json::{Value, json};

use crate::backend::{HttpTransport, ProtocolError, TokenProvider, TransportError};
use crate::error::JobError;

const EVENT_TIMEOUT: Duration = Duration::from_secs(5);

/// Something worth reporting about a job from the client's side.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientEvent {
    /// The job paused and the human was asked for feedback.
    InterruptOpened { current_node: Option<String> },
    /// Feedback was accepted by the backend.
    FeedbackSubmitted {
        current_node: Option<String>,
        feedback_length: usize,
    },
    /// A request failed or returned something unusable.
    ApiError { message: String, status: Option<u16> },
}

impl ClientEvent {
    pub fn event_type(&self) -> &'static str {
        match self {
            ClientEvent::InterruptOpened { .. } => "hitl_opened",
            ClientEvent::FeedbackSubmitted { .. } => "hitl_submitted",
            ClientEvent::ApiError { .. } => "api_error",
        }
    }

    fn payload(&self) -> Value {
        match self {
            ClientEvent::InterruptOpened { current_node } => {
                json!({ "current_node": current_node })
            }
            ClientEvent::FeedbackSubmitted {
                current_node,
                feedback_length,
            } => json!({
                "current_node": current_node,
                "feedback_length": feedback_length,
            }),
            ClientEvent::ApiError { message, status } => json!({
                "message": message,
                "status": status,
            }),
        }
    }

    /// Request body for the client-event endpoint.
    pub fn to_body(&self, job_id: &str) -> Value {
        json!({
            "thread_id": job_id,
            "event_type": self.event_type(),
            "payload": self.payload(),
            "occurred_at": Utc::now().to_rfc3339(),
        })
    }
}

/// The `api_error` event for a failed request, if the failure is worth reporting.
///
/// Only transport and protocol failures qualify; backend-reported failures and
/// caller misuse are not API errors.
pub(crate) fn api_error_event(err: &JobError) -> Option<ClientEvent> {
    let status = match err {
        JobError::Protocol(ProtocolError::UnexpectedStatus { status, .. }) => Some(*status),
        JobError::Protocol(ProtocolError::Unauthorized) => Some(401),
        JobError::Protocol(_) | JobError::Transport(_) => None,
        JobError::Backend(_) | JobError::State(_) => return None,
    };
    Some(ClientEvent::ApiError {
        message: err.to_string(),
        status,
    })
}

/// Sink for [`ClientEvent`]s. Must not block.
pub trait Notifier: Send + Sync {
    fn notify(&self, job_id: &str, event: ClientEvent);
}

/// Drops every event.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopNotifier;

impl Notifier for NoopNotifier {
    fn notify(&self, _job_id: &str, _event: ClientEvent) {}
}

/// Posts events to `{base}/opik/client-event` on a background task.
pub struct HttpNotifier {
    client: Client,
    url: Url,
    tokens: Arc<dyn TokenProvider>,
}

impl HttpNotifier {
    /// Reuse the transport's HTTP client, base URL and credentials.
    pub fn new(transport: &HttpTransport) -> Result<Self, TransportError> {
        Ok(Self {
            client: transport.client().clone(),
            url: transport.endpoint(&["opik", "client-event"])?,
            tokens: transport.tokens(),
        })
    }
}

impl Notifier for HttpNotifier {
    fn notify(&self, job_id: &str, event: ClientEvent) {
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            tracing::debug!(job_id, event = event.event_type(), "No runtime, client event dropped");
            return;
        };

        let mut request = self
            .client
            .post(self.url.clone())
            .timeout(EVENT_TIMEOUT)
            .json(&event.to_body(job_id));
        if let Some(token) = self.tokens.bearer_token() {
            request = request.bearer_auth(token);
        }

        let event_type = event.event_type();
        runtime.spawn(async move {
            match request.send().await {
                Ok(response) if !response.status().is_success() => {
                    let status = response.status().as_u16();
                    tracing::debug!(event_type, status, "Client event rejected");
                }
                Ok(_) => tracing::debug!(event_type, "Client event delivered"),
                Err(e) => tracing::debug!(event_type, error = %e, "Client event not delivered"),
            }
        });
    }
}
