//! Test doubles shared by the unit tests.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::backend::{FeedbackInput, JobInput, PollSource, RawResponse, Transport, TransportError};
use crate::polling::Hooks;
use crate::telemetry::{ClientEvent, Notifier};

/// One scripted transport reply, optionally delayed.
pub(crate) struct Scripted {
    delay: Duration,
    result: Result<RawResponse, TransportError>,
}

impl Scripted {
    pub(crate) fn reply(raw: RawResponse) -> Self {
        Self {
            delay: Duration::ZERO,
            result: Ok(raw),
        }
    }

    pub(crate) fn fail(err: TransportError) -> Self {
        Self {
            delay: Duration::ZERO,
            result: Err(err),
        }
    }

    pub(crate) fn after(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }
}

/// Transport that plays back queued replies.
///
/// An exhausted poll queue answers `202` (still working); exhausted submit
/// and feedback queues answer with a network error.
#[derive(Default)]
pub(crate) struct ScriptedTransport {
    submits: Mutex<VecDeque<Scripted>>,
    polls: Mutex<VecDeque<Scripted>>,
    feedbacks: Mutex<VecDeque<Scripted>>,
    submitted: Mutex<Vec<JobInput>>,
    feedback_sent: Mutex<Vec<FeedbackInput>>,
    poll_calls: AtomicUsize,
    finished_polls: AtomicUsize,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl ScriptedTransport {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn on_submit(self, step: Scripted) -> Self {
        self.submits.lock().unwrap().push_back(step);
        self
    }

    pub(crate) fn on_poll(self, step: Scripted) -> Self {
        self.polls.lock().unwrap().push_back(step);
        self
    }

    pub(crate) fn on_feedback(self, step: Scripted) -> Self {
        self.feedbacks.lock().unwrap().push_back(step);
        self
    }

    pub(crate) fn submitted(&self) -> Vec<JobInput> {
        self.submitted.lock().unwrap().clone()
    }

    pub(crate) fn feedback_sent(&self) -> Vec<FeedbackInput> {
        self.feedback_sent.lock().unwrap().clone()
    }

    /// Polls started, including ones still in flight.
    pub(crate) fn poll_calls(&self) -> usize {
        self.poll_calls.load(Ordering::SeqCst)
    }

    pub(crate) fn finished_polls(&self) -> usize {
        self.finished_polls.load(Ordering::SeqCst)
    }

    /// Highest number of requests ever outstanding at once.
    pub(crate) fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    async fn play(&self, step: Scripted) -> Result<RawResponse, TransportError> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        if !step.delay.is_zero() {
            tokio::time::sleep(step.delay).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        step.result
    }
}

impl Transport for ScriptedTransport {
    async fn submit(&self, input: &JobInput) -> Result<RawResponse, TransportError> {
        self.submitted.lock().unwrap().push(input.clone());
        let step = self.submits.lock().unwrap().pop_front();
        match step {
            Some(step) => self.play(step).await,
            None => Err(TransportError::Network("unscripted submit".into())),
        }
    }

    async fn poll(
        &self,
        _job_id: &str,
        _source: PollSource,
    ) -> Result<RawResponse, TransportError> {
        self.poll_calls.fetch_add(1, Ordering::SeqCst);
        let step = self
            .polls
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Scripted::reply(RawResponse::new(202, "")));
        let result = self.play(step).await;
        self.finished_polls.fetch_add(1, Ordering::SeqCst);
        result
    }

    async fn feedback(&self, input: &FeedbackInput) -> Result<RawResponse, TransportError> {
        self.feedback_sent.lock().unwrap().push(input.clone());
        let step = self.feedbacks.lock().unwrap().pop_front();
        match step {
            Some(step) => self.play(step).await,
            None => Err(TransportError::Network("unscripted feedback".into())),
        }
    }
}

/// Collects lifecycle callbacks as short strings, in order.
#[derive(Clone, Default)]
pub(crate) struct Recorder(Arc<Mutex<Vec<String>>>);

impl Recorder {
    pub(crate) fn push(&self, event: String) {
        self.0.lock().unwrap().push(event);
    }

    pub(crate) fn events(&self) -> Vec<String> {
        self.0.lock().unwrap().clone()
    }

    /// Hooks recording `interrupt:<messages>`, `complete:<job id>` and `error:<message>`.
    pub(crate) fn hooks(&self) -> Hooks {
        let interrupts = self.clone();
        let completions = self.clone();
        let errors = self.clone();
        Hooks::default()
            .on_interrupt(move |status| {
                let messages = status.interrupt_messages().unwrap_or_default().join("|");
                interrupts.push(format!("interrupt:{messages}"));
            })
            .on_complete(move |status| completions.push(format!("complete:{}", status.job_id)))
            .on_error(move |err| errors.push(format!("error:{err}")))
    }
}

/// Notifier that keeps every event it is handed.
#[derive(Default)]
pub(crate) struct RecordingNotifier(Mutex<Vec<(String, ClientEvent)>>);

impl RecordingNotifier {
    pub(crate) fn events(&self) -> Vec<(String, ClientEvent)> {
        self.0.lock().unwrap().clone()
    }
}

impl Notifier for RecordingNotifier {
    fn notify(&self, job_id: &str, event: ClientEvent) {
        self.0.lock().unwrap().push((job_id.to_owned(), event));
    }
}
