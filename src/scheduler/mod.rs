//! Review scheduling engine.
//!
//! The [`ReviewController`] owns the study-mode state machine and talks to the
//! outside world only through the traits below. In production it is driven by
//! the tokio event loop in [`runtime`]; tests drive it directly with fakes.

mod controller;
pub mod runtime;
mod timer;

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;

use crate::error::{PresentError, StoreError};
use crate::models::{Stats, Word};
use crate::settings::Settings;

pub use controller::ReviewController;
pub use runtime::{SchedulerHandle, SessionSignals};
pub use timer::{Clock, SystemClock, Timer, TimerToken, TokioTimer};

/// Identifies one presented word, from hand-off to its close signal.
pub type SessionId = u64;

pub trait WordStore {
    fn get_due(&self, now: DateTime<Utc>) -> Result<Vec<Word>, StoreError>;
    fn get_by_id(&self, id: i64) -> Result<Option<Word>, StoreError>;
    /// Step the word through the interval policy and persist the result.
    fn apply_review_result(&self, id: i64, was_correct: bool) -> Result<(), StoreError>;
    fn get_stats(&self) -> Result<Stats, StoreError>;
}

/// Generic key/value persistence. Values are opaque JSON.
pub trait SettingsStore {
    fn get(&self, key: &str) -> Result<Option<Value>, StoreError>;
    fn set(&self, key: &str, value: &Value) -> Result<(), StoreError>;
}

/// Shows a word to the user. The hand-off is fire-and-forget: the presenter
/// later reports exactly one `answered` or `closed` for the session via
/// [`SessionSignals`] or direct controller calls.
pub trait Presenter {
    fn present(
        &mut self,
        session: SessionId,
        word: &Word,
        settings: &Settings,
    ) -> Result<(), PresentError>;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OpResult {
    pub success: bool,
    pub message: String,
}

impl OpResult {
    pub fn ok(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
        }
    }

    pub fn fail(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
        }
    }
}

/// Result of one run of the trigger procedure.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TriggerReport {
    pub success: bool,
    pub message: String,
    pub word: Option<Word>,
}

impl TriggerReport {
    fn presented(word: Word) -> Self {
        Self {
            success: true,
            message: format!("Presenting '{}'", word.word),
            word: Some(word),
        }
    }

    fn nothing_due() -> Self {
        Self {
            success: true,
            message: "No words due for review".to_string(),
            word: None,
        }
    }

    fn failed(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
            word: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CycleState {
    Stopped,
    Armed,
    Presenting,
}

impl CycleState {
    pub fn label(&self) -> &'static str {
        match self {
            CycleState::Stopped => "stopped",
            CycleState::Armed => "armed",
            CycleState::Presenting => "presenting",
        }
    }
}

/// Read-only snapshot of the controller.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SchedulerStatus {
    pub is_running: bool,
    pub state: CycleState,
    pub settings: Settings,
    pub has_pending_timer: bool,
    pub current_word_id: Option<i64>,
}
