//! Poll loop that drives a submitted job until it pauses, finishes or fails.
//!
//! A [`PollingController`] owns one timer task per `start`. The task polls
//! immediately, then on a fixed interval, and never has more than one poll
//! outstanding: a tick that fires while the previous request is pending is
//! skipped. Stopping cancels the timer; a request already on the wire is left
//! to finish and its response is thrown away. A run started meanwhile waits
//! for that request before putting its own on the wire.
//!
//! Lifecycle callbacks run outside the state lock, on the poll task (or on the
//! caller's task for results delivered directly by the session). `stop` and
//! `dispose` wait for a callback in progress before returning.

use std::cell::Cell;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::time::{self, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::backend::{JobClient, Transport};
use crate::error::{JobError, StateError};
use crate::status::{JobState, Phase, StatusModel};
use crate::telemetry::{ClientEvent, Notifier, api_error_event};

/// Default time between polls.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(3);

/// Lower bound applied to configured intervals.
const MIN_POLL_INTERVAL: Duration = Duration::from_millis(10);

pub type StatusHook = Box<dyn Fn(&StatusModel) + Send + Sync>;
pub type ErrorHook = Box<dyn Fn(&JobError) + Send + Sync>;

/// Lifecycle callbacks registered by the consumer.
#[derive(Default)]
pub struct Hooks {
    on_interrupt: Option<StatusHook>,
    on_complete: Option<StatusHook>,
    on_error: Option<ErrorHook>,
}

impl Hooks {
    pub fn on_interrupt(mut self, hook: impl Fn(&StatusModel) + Send + Sync + 'static) -> Self {
        self.on_interrupt = Some(Box::new(hook));
        self
    }

    pub fn on_complete(mut self, hook: impl Fn(&StatusModel) + Send + Sync + 'static) -> Self {
        self.on_complete = Some(Box::new(hook));
        self
    }

    pub fn on_error(mut self, hook: impl Fn(&JobError) + Send + Sync + 'static) -> Self {
        self.on_error = Some(Box::new(hook));
        self
    }
}

/// Snapshot taken before a submission so a failed request can be rolled back.
#[derive(Debug)]
pub(crate) struct Checkpoint {
    phase: Option<Phase>,
    state: Option<JobState>,
}

enum Notice {
    Interrupted(StatusModel),
    Completed(StatusModel),
    Failed(JobError),
}

enum Flow {
    Continue,
    Halt,
}

/// Answer to a run asking to put a poll on the wire.
enum Issue {
    /// Go ahead; the token is released when the request finishes or is dropped.
    Go(CancellationToken),
    /// A request from an earlier run is still outstanding.
    Wait(CancellationToken),
    Stopped,
}

thread_local! {
    /// Set while a hook runs, so a hook that stops or disposes its own
    /// controller does not wait on the dispatch gate it already holds.
    static DISPATCHING: Cell<bool> = const { Cell::new(false) };
}

/// Restores the previous flag on drop, so nested dispatches unwind correctly.
struct Dispatching(bool);

impl Dispatching {
    fn enter() -> Self {
        Dispatching(DISPATCHING.replace(true))
    }
}

impl Drop for Dispatching {
    fn drop(&mut self) {
        DISPATCHING.set(self.0);
    }
}

#[derive(Default)]
struct ControllerState {
    running: bool,
    job_id: Option<String>,
    /// `None` while idle.
    last_known_phase: Option<Phase>,
    status: Option<StatusModel>,
    /// Cancellation handle of the current timer task.
    run: Option<CancellationToken>,
    disposed: bool,
    /// Job for which completion has already been announced.
    completed_job: Option<String>,
    /// Released when the last poll put on the wire finishes, whichever run issued it.
    outstanding: Option<CancellationToken>,
}

impl ControllerState {
    fn halt(&mut self) {
        self.running = false;
        if let Some(run) = self.run.take() {
            run.cancel();
        }
    }

    fn observe(&mut self, incoming: StatusModel) -> (Flow, Option<Notice>) {
        let status = match self.status.take() {
            Some(mut current) => match current.advance(incoming) {
                Ok(()) => current,
                Err(err) => {
                    self.status = Some(current);
                    self.halt();
                    return (Flow::Halt, Some(Notice::Failed(err.into())));
                }
            },
            None => incoming,
        };

        let phase = status.phase();
        tracing::debug!(job_id = %status.job_id, %phase, "Observed job status");
        self.job_id = Some(status.job_id.clone());
        self.last_known_phase = Some(phase);
        self.status = Some(status.clone());

        match phase {
            Phase::Submitting | Phase::Processing => (Flow::Continue, None),
            Phase::Interrupted => {
                self.halt();
                (Flow::Halt, Some(Notice::Interrupted(status)))
            }
            Phase::Completed => {
                self.halt();
                if self.completed_job.as_deref() == Some(status.job_id.as_str()) {
                    tracing::debug!(job_id = %status.job_id, "Completion already announced");
                    return (Flow::Halt, None);
                }
                self.completed_job = Some(status.job_id.clone());
                (Flow::Halt, Some(Notice::Completed(status)))
            }
            Phase::Failed => {
                self.halt();
                let detail = status.error().unwrap_or_default().to_string();
                (Flow::Halt, Some(Notice::Failed(JobError::Backend(detail))))
            }
        }
    }
}

struct Shared {
    state: Mutex<ControllerState>,
    /// Held from the disposal check until the hooks have returned.
    gate: Mutex<()>,
    hooks: Hooks,
    notifier: Arc<dyn Notifier>,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, ControllerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Wait for any hook in progress on another task. `None` when called from a hook.
    fn gate(&self) -> Option<MutexGuard<'_, ()>> {
        if DISPATCHING.get() {
            return None;
        }
        Some(self.gate.lock().unwrap_or_else(PoisonError::into_inner))
    }

    fn issue(&self, run: &CancellationToken) -> Issue {
        let mut state = self.lock();
        if state.disposed || run.is_cancelled() {
            return Issue::Stopped;
        }
        if let Some(previous) = state.outstanding.as_ref().filter(|t| !t.is_cancelled()) {
            return Issue::Wait(previous.clone());
        }
        let done = CancellationToken::new();
        state.outstanding = Some(done.clone());
        Issue::Go(done)
    }

    /// Apply one outcome. Returns `None` when the outcome was discarded
    /// because the run was stopped or the controller disposed.
    fn settle(
        &self,
        run: Option<&CancellationToken>,
        outcome: Result<StatusModel, JobError>,
    ) -> Option<Flow> {
        let _gate = self.gate();
        let (flow, notice, job_id) = {
            let mut state = self.lock();
            if state.disposed || run.is_some_and(CancellationToken::is_cancelled) {
                tracing::debug!(job_id = ?state.job_id, "Discarding response after stop");
                return None;
            }
            let (flow, notice) = match outcome {
                Ok(status) => state.observe(status),
                Err(err) => {
                    state.halt();
                    (Flow::Halt, Some(Notice::Failed(err)))
                }
            };
            (flow, notice, state.job_id.clone().unwrap_or_default())
        };

        if let Some(notice) = notice {
            let _dispatching = Dispatching::enter();
            self.dispatch(&job_id, notice);
        }
        Some(flow)
    }

    fn dispatch(&self, job_id: &str, notice: Notice) {
        match notice {
            Notice::Interrupted(status) => {
                tracing::info!(
                    job_id,
                    stage = ?status.current_stage,
                    "Job is waiting for feedback"
                );
                self.notifier.notify(
                    job_id,
                    ClientEvent::InterruptOpened {
                        current_node: status.current_stage.clone(),
                    },
                );
                if let Some(hook) = &self.hooks.on_interrupt {
                    hook(&status);
                }
            }
            Notice::Completed(status) => {
                tracing::info!(job_id, session_id = %status.session_id, "Job completed");
                if let Some(hook) = &self.hooks.on_complete {
                    hook(&status);
                }
            }
            Notice::Failed(err) => {
                tracing::warn!(job_id, error = %err, "Job stopped with error");
                if let Some(event) = api_error_event(&err) {
                    self.notifier.notify(job_id, event);
                }
                if let Some(hook) = &self.hooks.on_error {
                    hook(&err);
                }
            }
        }
    }
}

/// Drives one job's poll loop and owns its observable state.
pub struct PollingController<T: Transport> {
    client: Arc<JobClient<T>>,
    interval: Duration,
    shared: Arc<Shared>,
}

impl<T: Transport> PollingController<T> {
    pub fn new(
        client: Arc<JobClient<T>>,
        interval: Duration,
        hooks: Hooks,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            client,
            interval: interval.max(MIN_POLL_INTERVAL),
            shared: Arc::new(Shared {
                state: Mutex::new(ControllerState::default()),
                gate: Mutex::new(()),
                hooks,
                notifier,
            }),
        }
    }

    /// Begin polling `job_id`: one poll now, then one per interval.
    ///
    /// Returns `false` without doing anything when already polling this job
    /// or when the controller has been disposed. Starting a different job
    /// replaces the current run.
    pub fn start(&self, job_id: &str) -> bool {
        let run = {
            let mut state = self.shared.lock();
            if state.disposed {
                tracing::warn!(job_id, "Ignoring start on disposed controller");
                return false;
            }
            if state.running && state.job_id.as_deref() == Some(job_id) {
                tracing::debug!(job_id, "Already polling, start ignored");
                return false;
            }
            state.halt();
            if state.job_id.as_deref() != Some(job_id) {
                state.status = None;
                state.job_id = Some(job_id.to_owned());
            }
            let run = CancellationToken::new();
            state.running = true;
            state.run = Some(run.clone());
            run
        };

        tracing::info!(
            job_id,
            interval_ms = self.interval.as_millis() as u64,
            source = %self.client.source(),
            "Polling started"
        );
        tokio::spawn(poll_loop(
            Arc::clone(&self.client),
            Arc::clone(&self.shared),
            job_id.to_owned(),
            self.interval,
            run,
        ));
        true
    }

    /// Cancel the timer. Safe to call any number of times.
    ///
    /// Once this returns no hook fires for the stopped run.
    pub fn stop(&self) {
        let _gate = self.shared.gate();
        let mut state = self.shared.lock();
        if state.running {
            tracing::info!(job_id = ?state.job_id, "Polling stopped");
        }
        state.halt();
    }

    /// Stop for good: late responses are dropped and `start` becomes a no-op.
    pub fn dispose(&self) {
        let _gate = self.shared.gate();
        let mut state = self.shared.lock();
        state.halt();
        state.disposed = true;
    }

    pub fn is_running(&self) -> bool {
        self.shared.lock().running
    }

    pub fn is_disposed(&self) -> bool {
        self.shared.lock().disposed
    }

    pub fn job_id(&self) -> Option<String> {
        self.shared.lock().job_id.clone()
    }

    /// `None` while idle.
    pub fn last_known_phase(&self) -> Option<Phase> {
        self.shared.lock().last_known_phase
    }

    pub fn status(&self) -> Option<StatusModel> {
        self.shared.lock().status.clone()
    }

    /// Apply a result obtained outside the poll loop (submission or feedback).
    /// Returns the resulting status, or `None` if the controller was disposed.
    pub(crate) fn deliver(&self, status: StatusModel) -> Option<StatusModel> {
        self.shared.settle(None, Ok(status))?;
        self.status()
    }

    /// Mark a submission as in flight after `precondition` accepts the current phase.
    pub(crate) fn begin_request(
        &self,
        precondition: impl FnOnce(Option<Phase>) -> Result<(), StateError>,
    ) -> Result<Checkpoint, StateError> {
        let mut state = self.shared.lock();
        if state.disposed {
            return Err(StateError::Cancelled);
        }
        if state.last_known_phase == Some(Phase::Submitting) {
            return Err(StateError::RequestInFlight);
        }
        precondition(state.last_known_phase)?;

        let checkpoint = Checkpoint {
            phase: state.last_known_phase,
            state: state
                .status
                .as_mut()
                .map(|status| std::mem::replace(&mut status.state, JobState::Submitting)),
        };
        state.last_known_phase = Some(Phase::Submitting);
        Ok(checkpoint)
    }

    /// Roll back a failed submission.
    pub(crate) fn restore(&self, checkpoint: Checkpoint) {
        let mut state = self.shared.lock();
        if state.last_known_phase != Some(Phase::Submitting) {
            return;
        }
        state.last_known_phase = checkpoint.phase;
        if let (Some(status), Some(previous)) = (state.status.as_mut(), checkpoint.state) {
            status.state = previous;
        }
    }

    /// Adopt a job submitted elsewhere, as if its submission had just been accepted.
    pub(crate) fn track(&self, job_id: &str) -> Result<(), StateError> {
        let mut state = self.shared.lock();
        if state.disposed {
            return Err(StateError::Cancelled);
        }
        if state.last_known_phase.is_some() {
            return Err(StateError::AlreadySubmitted);
        }
        state.job_id = Some(job_id.to_owned());
        state.last_known_phase = Some(Phase::Processing);
        state.status = Some(StatusModel::processing(job_id));
        Ok(())
    }
}

impl<T: Transport> Drop for PollingController<T> {
    fn drop(&mut self) {
        self.dispose();
    }
}

type PollFuture = Pin<Box<dyn Future<Output = Result<StatusModel, JobError>> + Send>>;

fn request<T: Transport>(
    client: &Arc<JobClient<T>>,
    job_id: &str,
    done: CancellationToken,
) -> PollFuture {
    let client = Arc::clone(client);
    let job_id = job_id.to_owned();
    let release = done.drop_guard();
    Box::pin(async move {
        let _release = release;
        client.poll(&job_id).await
    })
}

async fn released(previous: &Option<CancellationToken>) {
    match previous {
        Some(token) => token.cancelled().await,
        None => std::future::pending().await,
    }
}

/// Resolves with the in-flight poll's outcome, or never when nothing is in flight.
async fn settle_in_flight(in_flight: &mut Option<PollFuture>) -> Result<StatusModel, JobError> {
    match in_flight.as_mut() {
        Some(pending) => pending.await,
        None => std::future::pending().await,
    }
}

async fn poll_loop<T: Transport>(
    client: Arc<JobClient<T>>,
    shared: Arc<Shared>,
    job_id: String,
    interval: Duration,
    run: CancellationToken,
) {
    let mut ticker = time::interval_at(Instant::now() + interval, interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut in_flight: Option<PollFuture> = None;
    let mut previous: Option<CancellationToken> = None;
    let mut due = true;

    loop {
        if due && in_flight.is_none() && previous.is_none() {
            match shared.issue(&run) {
                Issue::Go(done) => {
                    in_flight = Some(request(&client, &job_id, done));
                    due = false;
                }
                Issue::Wait(token) => {
                    tracing::debug!(%job_id, "Earlier poll still outstanding, holding this one");
                    previous = Some(token);
                }
                Issue::Stopped => break,
            }
        }

        tokio::select! {
            biased;
            () = run.cancelled() => {
                if let Some(pending) = in_flight.take() {
                    // Let the request finish; nobody is listening for it anymore.
                    tokio::spawn(async move {
                        let _ = pending.await;
                    });
                }
                break;
            }
            () = released(&previous) => {
                previous = None;
            }
            outcome = settle_in_flight(&mut in_flight) => {
                in_flight = None;
                match shared.settle(Some(&run), outcome) {
                    Some(Flow::Continue) => {}
                    Some(Flow::Halt) | None => break,
                }
            }
            _ = ticker.tick() => {
                if in_flight.is_some() || previous.is_some() {
                    tracing::debug!(%job_id, "Previous poll still in flight, skipping tick");
                } else {
                    due = true;
                }
            }
        }
    }
    tracing::debug!(%job_id, "Poll loop exited");
}
