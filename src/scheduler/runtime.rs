//! Tokio driver for the review controller.
//!
//! One task owns the [`ReviewController`] and processes [`SchedulerEvent`]s
//! strictly in order, so timer firings, presenter signals and user commands
//! never interleave inside a transition. Everything else talks to it through
//! a [`SchedulerHandle`] or [`SessionSignals`].

use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

use super::{
    OpResult, Presenter, ReviewController, SchedulerStatus, SessionId, SettingsStore,
    SystemClock, TimerToken, TokioTimer, TriggerReport, WordStore,
};
use crate::error::StoreError;
use crate::models::{ReviewOutcome, Stats};
use crate::settings::SettingsPatch;

const CHANNEL_CAPACITY: usize = 32;

const LOOP_GONE: &str = "Scheduler is not running";

#[derive(Debug)]
pub enum SchedulerEvent {
    TimerFired(TimerToken),
    Answered {
        session: SessionId,
        outcome: ReviewOutcome,
    },
    Closed(SessionId),
    Start(oneshot::Sender<OpResult>),
    Stop(oneshot::Sender<OpResult>),
    UpdateSettings(SettingsPatch, oneshot::Sender<OpResult>),
    TriggerNow(oneshot::Sender<TriggerReport>),
    Status(oneshot::Sender<SchedulerStatus>),
    Stats(oneshot::Sender<Result<Stats, StoreError>>),
    Shutdown,
}

/// Caller-side handle for the scheduler task.
#[derive(Debug, Clone)]
pub struct SchedulerHandle {
    events: mpsc::Sender<SchedulerEvent>,
}

impl SchedulerHandle {
    pub async fn start(&self) -> OpResult {
        self.request(SchedulerEvent::Start)
            .await
            .unwrap_or_else(|| OpResult::fail(LOOP_GONE))
    }

    pub async fn stop(&self) -> OpResult {
        self.request(SchedulerEvent::Stop)
            .await
            .unwrap_or_else(|| OpResult::fail(LOOP_GONE))
    }

    pub async fn update_settings(&self, patch: SettingsPatch) -> OpResult {
        self.request(|reply| SchedulerEvent::UpdateSettings(patch, reply))
            .await
            .unwrap_or_else(|| OpResult::fail(LOOP_GONE))
    }

    pub async fn trigger_now(&self) -> TriggerReport {
        self.request(SchedulerEvent::TriggerNow)
            .await
            .unwrap_or_else(|| TriggerReport::failed(LOOP_GONE))
    }

    pub async fn status(&self) -> Option<SchedulerStatus> {
        self.request(SchedulerEvent::Status).await
    }

    pub async fn stats(&self) -> Result<Stats, StoreError> {
        self.request(SchedulerEvent::Stats)
            .await
            .unwrap_or_else(|| Err(StoreError::Unavailable(LOOP_GONE.to_string())))
    }

    /// Ask the loop to run cleanup and exit.
    pub async fn shutdown(&self) {
        let _ = self.events.send(SchedulerEvent::Shutdown).await;
    }

    async fn request<R>(
        &self,
        make: impl FnOnce(oneshot::Sender<R>) -> SchedulerEvent,
    ) -> Option<R> {
        let (reply, response) = oneshot::channel();
        self.events.send(make(reply)).await.ok()?;
        response.await.ok()
    }
}

/// Terminal signals a presenter sends for a presented word.
#[derive(Debug, Clone)]
pub struct SessionSignals {
    events: mpsc::Sender<SchedulerEvent>,
}

impl SessionSignals {
    #[cfg(test)]
    pub async fn answered(&self, session: SessionId, outcome: ReviewOutcome) {
        self.send(SchedulerEvent::Answered { session, outcome }).await;
    }

    #[cfg(test)]
    pub async fn closed(&self, session: SessionId) {
        self.send(SchedulerEvent::Closed(session)).await;
    }

    /// For presenters running on a plain thread. Must not be called from
    /// inside the tokio runtime.
    pub fn blocking_answered(&self, session: SessionId, outcome: ReviewOutcome) {
        self.blocking_send(SchedulerEvent::Answered { session, outcome });
    }

    /// See [`SessionSignals::blocking_answered`].
    pub fn blocking_closed(&self, session: SessionId) {
        self.blocking_send(SchedulerEvent::Closed(session));
    }

    #[cfg(test)]
    async fn send(&self, event: SchedulerEvent) {
        if self.events.send(event).await.is_err() {
            log::debug!("Scheduler loop gone, dropping session signal");
        }
    }

    fn blocking_send(&self, event: SchedulerEvent) {
        if self.events.blocking_send(event).is_err() {
            log::debug!("Scheduler loop gone, dropping session signal");
        }
    }
}

pub struct SpawnedScheduler {
    pub handle: SchedulerHandle,
    pub signals: SessionSignals,
    pub task: JoinHandle<()>,
}

/// Start the scheduler task. The controller is initialised inside the task,
/// so it begins stopped; call [`SchedulerHandle::start`] to enter study mode.
pub fn spawn<S, P>(store: S, presenter: P) -> SpawnedScheduler
where
    S: WordStore + SettingsStore + Send + 'static,
    P: Presenter + Send + 'static,
{
    let (tx, rx) = mpsc::channel(CHANNEL_CAPACITY);
    let timer = TokioTimer::new(tx.clone());

    let task = tokio::spawn(async move {
        let controller = ReviewController::init(store, presenter, timer, SystemClock);
        scheduler_loop(controller, rx).await;
    });

    SpawnedScheduler {
        handle: SchedulerHandle { events: tx.clone() },
        signals: SessionSignals { events: tx },
        task,
    }
}

async fn scheduler_loop<S, P>(
    mut controller: ReviewController<S, P, TokioTimer, SystemClock>,
    mut events: mpsc::Receiver<SchedulerEvent>,
) where
    S: WordStore + SettingsStore,
    P: Presenter,
{
    while let Some(event) = events.recv().await {
        match event {
            SchedulerEvent::TimerFired(token) => {
                controller.on_timer_fired(token);
            }
            SchedulerEvent::Answered { session, outcome } => {
                controller.answered(session, outcome);
            }
            SchedulerEvent::Closed(session) => {
                controller.closed(session);
            }
            SchedulerEvent::Start(reply) => {
                let _ = reply.send(controller.start());
            }
            SchedulerEvent::Stop(reply) => {
                let _ = reply.send(controller.stop());
            }
            SchedulerEvent::UpdateSettings(patch, reply) => {
                let _ = reply.send(controller.update_settings(patch));
            }
            SchedulerEvent::TriggerNow(reply) => {
                let _ = reply.send(controller.trigger_now());
            }
            SchedulerEvent::Status(reply) => {
                let _ = reply.send(controller.status());
            }
            SchedulerEvent::Stats(reply) => {
                let _ = reply.send(controller.stats());
            }
            SchedulerEvent::Shutdown => break,
        }
    }

    controller.cleanup();
}
