//! Persisted application settings and the study-mode running flag.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{ConfigError, StoreError};
use crate::scheduler::SettingsStore;

pub const SETTINGS_KEY: &str = "app_settings";
pub const STUDY_MODE_KEY: &str = "study_mode_active";

pub const DEFAULT_STUDY_INTERVAL_SECS: u64 = 30;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Settings {
    pub study_interval_seconds: u64,
    pub sound_enabled: bool,
    pub tray_enabled: bool,
    pub auto_start: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            study_interval_seconds: DEFAULT_STUDY_INTERVAL_SECS,
            sound_enabled: true,
            tray_enabled: true,
            auto_start: false,
        }
    }
}

impl Settings {
    pub fn study_interval(&self) -> Duration {
        Duration::from_secs(self.study_interval_seconds)
    }

    /// Copy of these settings with every field present in `patch` replaced.
    /// The patch must already be validated.
    pub fn merged(&self, patch: &SettingsPatch) -> Settings {
        Settings {
            study_interval_seconds: patch
                .study_interval_seconds
                .map(|secs| secs as u64)
                .unwrap_or(self.study_interval_seconds),
            sound_enabled: patch.sound_enabled.unwrap_or(self.sound_enabled),
            tray_enabled: patch.tray_enabled.unwrap_or(self.tray_enabled),
            auto_start: patch.auto_start.unwrap_or(self.auto_start),
        }
    }
}

/// A partial settings update. The interval is signed so that nonpositive
/// input can be reported instead of wrapping.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SettingsPatch {
    pub study_interval_seconds: Option<i64>,
    pub sound_enabled: Option<bool>,
    pub tray_enabled: Option<bool>,
    pub auto_start: Option<bool>,
}

impl SettingsPatch {
    pub fn interval(secs: i64) -> Self {
        Self {
            study_interval_seconds: Some(secs),
            ..Self::default()
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        match self.study_interval_seconds {
            Some(secs) if secs <= 0 => Err(ConfigError::InvalidInterval(secs)),
            _ => Ok(()),
        }
    }

    /// Parse a single `key value` pair as typed on the command line.
    pub fn from_key_value(key: &str, value: &str) -> Result<Self, ConfigError> {
        let mut patch = Self::default();
        match normalize_key(key).as_str() {
            "studyinterval" | "studyintervalseconds" | "interval" => {
                let secs = value
                    .trim()
                    .parse::<i64>()
                    .map_err(|_| ConfigError::NotNumeric(value.to_string()))?;
                patch.study_interval_seconds = Some(secs);
            }
            "soundenabled" | "sound" => patch.sound_enabled = Some(parse_flag(key, value)?),
            "trayenabled" | "tray" => patch.tray_enabled = Some(parse_flag(key, value)?),
            "autostart" => patch.auto_start = Some(parse_flag(key, value)?),
            _ => return Err(ConfigError::UnknownKey(key.to_string())),
        }
        patch.validate()?;
        Ok(patch)
    }
}

// Accepts camelCase, snake_case and kebab-case spellings
fn normalize_key(key: &str) -> String {
    key.chars()
        .filter(|c| *c != '_' && *c != '-')
        .flat_map(char::to_lowercase)
        .collect()
}

fn parse_flag(key: &str, value: &str) -> Result<bool, ConfigError> {
    match value.trim().to_lowercase().as_str() {
        "true" | "on" | "yes" | "1" => Ok(true),
        "false" | "off" | "no" | "0" => Ok(false),
        _ => Err(ConfigError::InvalidFlag {
            key: key.to_string(),
            value: value.to_string(),
        }),
    }
}

/// Persisted settings merged over the defaults.
///
/// Each stored key is read on its own. A missing key keeps its default, and
/// so does a key with an unusable value (logged). Only a failing store call
/// is an error; corrupt content yields the defaults.
pub fn load(store: &impl SettingsStore) -> Result<Settings, StoreError> {
    match store.get(SETTINGS_KEY) {
        Ok(Some(value)) => Ok(from_stored(&value)),
        Ok(None) => Ok(Settings::default()),
        Err(StoreError::Json(e)) => {
            log::warn!("Stored settings are unreadable, using defaults: {}", e);
            Ok(Settings::default())
        }
        Err(e) => Err(e),
    }
}

fn from_stored(value: &Value) -> Settings {
    let mut settings = Settings::default();
    let Some(stored) = value.as_object() else {
        log::warn!("Stored settings are not an object, using defaults");
        return settings;
    };

    if let Some(raw) = stored.get("studyIntervalSeconds") {
        match raw.as_i64() {
            Some(secs) if secs > 0 => settings.study_interval_seconds = secs as u64,
            _ => log::warn!(
                "Stored study interval {} is not usable, using default of {}s",
                raw,
                DEFAULT_STUDY_INTERVAL_SECS
            ),
        }
    }
    read_flag(stored, "soundEnabled", &mut settings.sound_enabled);
    read_flag(stored, "trayEnabled", &mut settings.tray_enabled);
    read_flag(stored, "autoStart", &mut settings.auto_start);

    settings
}

fn read_flag(stored: &Map<String, Value>, key: &str, slot: &mut bool) {
    match stored.get(key) {
        None => {}
        Some(Value::Bool(flag)) => *slot = *flag,
        Some(other) => log::warn!("Stored {} is not a boolean ({}), keeping default", key, other),
    }
}

pub fn save(store: &impl SettingsStore, settings: &Settings) -> Result<(), StoreError> {
    store.set(SETTINGS_KEY, &serde_json::to_value(settings)?)
}

pub fn load_running_flag(store: &impl SettingsStore) -> Result<bool, StoreError> {
    Ok(store
        .get(STUDY_MODE_KEY)?
        .and_then(|v| v.as_bool())
        .unwrap_or(false))
}

pub fn save_running_flag(store: &impl SettingsStore, running: bool) -> Result<(), StoreError> {
    store.set(STUDY_MODE_KEY, &Value::Bool(running))
}

/// Clear a running flag left behind by an unclean exit. Returns true when a
/// stale flag was found.
pub fn reset_stale_running_flag(store: &impl SettingsStore) -> Result<bool, StoreError> {
    if load_running_flag(store)? {
        save_running_flag(store, false)?;
        return Ok(true);
    }
    Ok(false)
}

#[cfg(test)]
pub(crate) mod test_support {
    use std::cell::{Cell, RefCell};
    use std::collections::HashMap;

    use super::*;

    /// In-memory settings store with a failure switch.
    #[derive(Default)]
    pub struct MemorySettings {
        pub values: RefCell<HashMap<String, Value>>,
        pub fail: Cell<bool>,
    }

    impl SettingsStore for MemorySettings {
        fn get(&self, key: &str) -> Result<Option<Value>, StoreError> {
            if self.fail.get() {
                return Err(StoreError::Unavailable("settings offline".to_string()));
            }
            Ok(self.values.borrow().get(key).cloned())
        }

        fn set(&self, key: &str, value: &Value) -> Result<(), StoreError> {
            if self.fail.get() {
                return Err(StoreError::Unavailable("settings offline".to_string()));
            }
            self.values
                .borrow_mut()
                .insert(key.to_string(), value.clone());
            Ok(())
        }
    }
}
