use rand::Rng;

use super::{
    Clock, CycleState, OpResult, Presenter, SchedulerStatus, SessionId, SettingsStore, Timer,
    TimerToken, TriggerReport, WordStore,
};
use crate::error::{StateError, StoreError};
use crate::models::{ReviewOutcome, Stats, Word};
use crate::settings::{self, Settings, SettingsPatch};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Idle,
    Armed { token: TimerToken },
    Presenting { session: SessionId, word_id: i64 },
}

/// Study-mode state machine.
///
/// While running, the controller is always either waiting on exactly one
/// timer or waiting on exactly one presented word. Every arm cancels the
/// previous timer first, and a timer firing is acted on only if its token is
/// still the pending one, so a firing racing with `stop()` does nothing.
pub struct ReviewController<S, P, T, C> {
    store: S,
    presenter: P,
    timer: T,
    clock: C,
    settings: Settings,
    running: bool,
    phase: Phase,
    next_token: u64,
    next_session: SessionId,
}

impl<S, P, T, C> ReviewController<S, P, T, C>
where
    S: WordStore + SettingsStore,
    P: Presenter,
    T: Timer,
    C: Clock,
{
    /// Load settings and clear any running flag left by an unclean exit.
    /// The controller always starts stopped.
    pub fn init(store: S, presenter: P, timer: T, clock: C) -> Self {
        let settings = match settings::load(&store) {
            Ok(settings) => settings,
            Err(e) => {
                log::warn!("Failed to load settings, using defaults: {}", e);
                Settings::default()
            }
        };

        match settings::reset_stale_running_flag(&store) {
            Ok(true) => log::warn!("Study mode was left active by a previous run; not resuming"),
            Ok(false) => {}
            Err(e) => log::warn!("Failed to check study mode flag: {}", e),
        }

        log::info!(
            "Review scheduler ready (interval {}s)",
            settings.study_interval_seconds
        );

        Self {
            store,
            presenter,
            timer,
            clock,
            settings,
            running: false,
            phase: Phase::Idle,
            next_token: 0,
            next_session: 0,
        }
    }

    pub fn start(&mut self) -> OpResult {
        if self.running {
            return OpResult::fail(StateError::AlreadyRunning.to_string());
        }

        if let Err(e) = settings::save_running_flag(&self.store, true) {
            log::error!("Failed to start study mode: {}", e);
            return OpResult::fail(format!("Failed to start: {}", e));
        }

        self.running = true;
        log::info!("Study mode started");

        // An open manual review arms on its close instead
        if !matches!(self.phase, Phase::Presenting { .. }) {
            self.arm();
        }

        OpResult::ok("Study mode started")
    }

    pub fn stop(&mut self) -> OpResult {
        if !self.running {
            return OpResult::fail(StateError::NotRunning.to_string());
        }

        self.running = false;
        self.disarm();
        log::info!("Study mode stopped");

        if let Err(e) = settings::save_running_flag(&self.store, false) {
            log::error!("Failed to save stopped study mode: {}", e);
            return OpResult::fail(format!("Stopped, but failed to save state: {}", e));
        }

        OpResult::ok("Study mode stopped")
    }

    /// Run the trigger procedure for a fired timer. Returns `None` when the
    /// token is stale.
    pub fn on_timer_fired(&mut self, token: TimerToken) -> Option<TriggerReport> {
        match self.phase {
            Phase::Armed { token: pending } if pending == token && self.running => {}
            _ => {
                log::debug!("Ignoring stale {}", token);
                return None;
            }
        }

        self.phase = Phase::Idle;
        let report = match self.select_due_word() {
            Ok(Some(word)) => self.present(word),
            Ok(None) => {
                log::info!("No words due for review");
                TriggerReport::nothing_due()
            }
            Err(e) => {
                log::warn!("Review trigger failed: {}", e);
                TriggerReport::failed(format!("Failed to trigger review: {}", e))
            }
        };

        if self.phase == Phase::Idle {
            self.arm();
        }

        Some(report)
    }

    /// Manually run the trigger procedure outside the timer.
    pub fn trigger_now(&mut self) -> TriggerReport {
        if matches!(self.phase, Phase::Presenting { .. }) {
            return TriggerReport::failed(StateError::ReviewInProgress.to_string());
        }

        let word = match self.select_due_word() {
            Ok(Some(word)) => word,
            Ok(None) => return TriggerReport::nothing_due(),
            Err(e) => {
                log::warn!("Manual review trigger failed: {}", e);
                return TriggerReport::failed(format!("Failed to trigger review: {}", e));
            }
        };

        self.disarm();
        let report = self.present(word);
        if self.phase == Phase::Idle {
            self.arm();
        }
        report
    }

    /// Record the user's answer for the open session, then close it.
    pub fn answered(&mut self, session: SessionId, outcome: ReviewOutcome) -> OpResult {
        let word_id = match self.phase {
            Phase::Presenting {
                session: current,
                word_id,
            } if current == session => word_id,
            _ => {
                log::debug!("Ignoring answer for closed session {}", session);
                return OpResult::fail("Review session is no longer open");
            }
        };

        let result = match self.store.apply_review_result(word_id, outcome.is_correct()) {
            Ok(()) => {
                log::info!("Recorded {} answer for word {}", outcome.as_str(), word_id);
                OpResult::ok(self.answer_summary(word_id, outcome))
            }
            Err(e) => {
                log::error!("Failed to record review for word {}: {}", word_id, e);
                OpResult::fail(format!("Failed to record answer: {}", e))
            }
        };

        self.closed(session);
        result
    }

    /// Terminal signal for a presented word. Only the first close of the open
    /// session has any effect; returns whether this call closed it.
    pub fn closed(&mut self, session: SessionId) -> bool {
        match self.phase {
            Phase::Presenting {
                session: current,
                word_id,
            } if current == session => {
                log::info!("Review of word {} closed", word_id);
                self.phase = Phase::Idle;
                self.arm();
                true
            }
            _ => {
                log::debug!("Ignoring duplicate close for session {}", session);
                false
            }
        }
    }

    pub fn update_settings(&mut self, patch: SettingsPatch) -> OpResult {
        if let Err(e) = patch.validate() {
            return OpResult::fail(e.to_string());
        }

        let updated = self.settings.merged(&patch);
        if let Err(e) = settings::save(&self.store, &updated) {
            log::error!("Failed to save settings: {}", e);
            return OpResult::fail(format!("Failed to update settings: {}", e));
        }
        self.settings = updated;
        log::info!(
            "Settings updated (interval {}s)",
            self.settings.study_interval_seconds
        );

        // Restart the wait from now; an open review picks it up on close
        if matches!(self.phase, Phase::Armed { .. }) {
            self.arm();
        }

        OpResult::ok("Settings updated")
    }

    pub fn status(&self) -> SchedulerStatus {
        let state = match (self.running, self.phase) {
            (false, _) => CycleState::Stopped,
            (true, Phase::Presenting { .. }) => CycleState::Presenting,
            (true, _) => CycleState::Armed,
        };
        let current_word_id = match self.phase {
            Phase::Presenting { word_id, .. } => Some(word_id),
            _ => None,
        };

        SchedulerStatus {
            is_running: self.running,
            state,
            settings: self.settings.clone(),
            has_pending_timer: matches!(self.phase, Phase::Armed { .. }),
            current_word_id,
        }
    }

    #[cfg(test)]
    fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn stats(&self) -> Result<Stats, StoreError> {
        self.store.get_stats()
    }

    /// Process-exit teardown.
    pub fn cleanup(&mut self) {
        self.disarm();
        self.phase = Phase::Idle;
        self.running = false;
        if let Err(e) = settings::save_running_flag(&self.store, false) {
            log::warn!("Failed to clear study mode flag on shutdown: {}", e);
        }
        log::info!("Review scheduler shut down");
    }

    fn arm(&mut self) {
        if !self.running {
            return;
        }
        self.disarm();

        self.next_token += 1;
        let token = TimerToken(self.next_token);
        self.timer.arm(token, self.settings.study_interval());
        self.phase = Phase::Armed { token };
        log::info!(
            "Next review in {}s ({})",
            self.settings.study_interval_seconds,
            token
        );
    }

    fn disarm(&mut self) {
        if let Phase::Armed { token } = self.phase {
            self.timer.cancel(token);
            self.phase = Phase::Idle;
        }
    }

    // Uniform pick among due words so the stalest word is not always drilled
    fn select_due_word(&self) -> Result<Option<Word>, StoreError> {
        let mut due = self.store.get_due(self.clock.now())?;
        if due.is_empty() {
            return Ok(None);
        }

        let index = rand::thread_rng().gen_range(0..due.len());
        log::debug!("{} words due, picked index {}", due.len(), index);
        Ok(Some(due.swap_remove(index)))
    }

    // Re-read the word so the message reflects the new schedule
    fn answer_summary(&self, word_id: i64, outcome: ReviewOutcome) -> String {
        match self.store.get_by_id(word_id) {
            Ok(Some(word)) => format!(
                "Answer recorded as {} (level {}, next review {})",
                outcome.as_str(),
                word.proficiency,
                word.next_review_time.format("%Y-%m-%d %H:%M")
            ),
            Ok(None) => format!("Answer recorded as {}", outcome.as_str()),
            Err(e) => {
                log::warn!("Failed to reload word {}: {}", word_id, e);
                format!("Answer recorded as {}", outcome.as_str())
            }
        }
    }

    fn present(&mut self, word: Word) -> TriggerReport {
        self.next_session += 1;
        let session = self.next_session;
        self.phase = Phase::Presenting {
            session,
            word_id: word.id,
        };

        match self.presenter.present(session, &word, &self.settings) {
            Ok(()) => {
                log::info!("Presenting '{}' (session {})", word.word, session);
                TriggerReport::presented(word)
            }
            Err(e) => {
                log::error!("Failed to present '{}': {}", word.word, e);
                self.phase = Phase::Idle;
                TriggerReport::failed(format!("Failed to present '{}': {}", word.word, e))
            }
        }
    }

    #[cfg(test)]
    fn timer(&self) -> &T {
        &self.timer
    }

    #[cfg(test)]
    fn timer_mut(&mut self) -> &mut T {
        &mut self.timer
    }

    #[cfg(test)]
    fn presenter_mut(&mut self) -> &mut P {
        &mut self.presenter
    }

    #[cfg(test)]
    fn store(&self) -> &S {
        &self.store
    }
}
