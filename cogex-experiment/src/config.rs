use crate::error::ConfigError;
use crate::log::SessionInfo;
use cogex_core::{Key, KeySet};
use cogex_hardware::HardwareConfig;
use cogex_timing::FrameTimingConfig;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Everything needed to run one session. Missing JSON fields take defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    pub participant: String,
    pub session: String,
    pub task_name: String,
    pub output_dir: PathBuf,
    pub scheduler: SchedulerConfig,
    pub keys: KeyConfig,
    pub codes: TriggerCodes,
    pub hardware: HardwareConfig,
    pub frame_timing: FrameTimingConfig,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            participant: "anonymous".into(),
            session: "01".into(),
            task_name: "Task".into(),
            output_dir: PathBuf::from("data"),
            scheduler: SchedulerConfig::default(),
            keys: KeyConfig::default(),
            codes: TriggerCodes::default(),
            hardware: HardwareConfig::default(),
            frame_timing: FrameTimingConfig::default(),
        }
    }
}

impl SessionConfig {
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json_str(&text)
    }

    pub fn from_json_str(text: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.participant.trim().is_empty() {
            return Err(ConfigError::Invalid("participant must not be empty".into()));
        }
        self.scheduler.validate()?;
        validate_frame_timing(&self.frame_timing)?;
        self.keys.validate()
    }

    pub fn session_info(&self) -> SessionInfo {
        SessionInfo::new(&self.participant, &self.session, &self.task_name)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// `frame_tolerance = frame_tolerance_factor * refresh_interval`.
    pub frame_tolerance_factor: f64,
    /// Absolute drift (s) above which a trial is flagged.
    pub drift_tolerance: f64,
    /// Longest single pause (s) inside a wait loop.
    pub poll_quantum: f64,
    /// Keep every flip timestamp for the post-run flip report.
    pub record_flips: bool,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            frame_tolerance_factor: 0.75,
            drift_tolerance: 0.004,
            poll_quantum: 0.001,
            record_flips: true,
        }
    }
}

impl SchedulerConfig {
    /// Pause length used while waiting: never more than a quarter of the
    /// frame tolerance.
    pub fn effective_quantum(&self, frame_tolerance: f64) -> f64 {
        let cap = frame_tolerance / 4.0;
        if cap > 0.0 {
            self.poll_quantum.min(cap)
        } else {
            self.poll_quantum
        }
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if !(self.frame_tolerance_factor > 0.0 && self.frame_tolerance_factor <= 1.0) {
            return Err(ConfigError::Invalid(format!(
                "frame_tolerance_factor must be in (0, 1], got {}",
                self.frame_tolerance_factor
            )));
        }
        if !(self.poll_quantum > 0.0 && self.poll_quantum.is_finite()) {
            return Err(ConfigError::Invalid(format!(
                "poll_quantum must be positive, got {}",
                self.poll_quantum
            )));
        }
        if !(self.drift_tolerance >= 0.0) {
            return Err(ConfigError::Invalid(format!(
                "drift_tolerance must be non-negative, got {}",
                self.drift_tolerance
            )));
        }
        Ok(())
    }
}

fn validate_frame_timing(config: &FrameTimingConfig) -> Result<(), ConfigError> {
    if !(config.default_refresh_hz > 0.0 && config.default_refresh_hz.is_finite()) {
        return Err(ConfigError::Invalid(format!(
            "default_refresh_hz must be positive, got {}",
            config.default_refresh_hz
        )));
    }
    if config.n_identical < 2 || config.n_identical > config.max_frames {
        return Err(ConfigError::Invalid(format!(
            "n_identical must be in [2, max_frames = {}], got {}",
            config.max_frames, config.n_identical
        )));
    }
    if !(config.threshold_ms > 0.0) {
        return Err(ConfigError::Invalid(format!(
            "threshold_ms must be positive, got {}",
            config.threshold_ms
        )));
    }
    Ok(())
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct KeyConfig {
    /// Key sent by the scanner when acquisition starts.
    pub trigger: String,
    /// Always accepted; pressing one cancels the session.
    pub quit: Vec<String>,
    pub response: Vec<String>,
}

impl Default for KeyConfig {
    fn default() -> Self {
        Self {
            trigger: "t".into(),
            quit: vec!["escape".into(), "q".into()],
            response: vec!["space".into()],
        }
    }
}

impl KeyConfig {
    pub fn trigger_key(&self) -> Key {
        Key::new(&self.trigger)
    }

    pub fn quit_keys(&self) -> KeySet {
        self.quit.iter().map(String::as_str).collect()
    }

    pub fn response_keys(&self) -> KeySet {
        self.response.iter().map(String::as_str).collect()
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.trigger.is_empty() {
            return Err(ConfigError::Invalid("trigger key must not be empty".into()));
        }
        if self.quit.contains(&self.trigger) {
            return Err(ConfigError::Invalid(format!(
                "trigger key {:?} is also a quit key",
                self.trigger
            )));
        }
        if let Some(k) = self.response.iter().find(|k| self.quit.contains(k)) {
            return Err(ConfigError::Invalid(format!(
                "response key {k:?} is also a quit key"
            )));
        }
        Ok(())
    }
}

/// Hardware codes for session-level events. Trial onset codes come from the
/// trial payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TriggerCodes {
    pub start: u8,
    pub end: u8,
    pub response: u8,
    pub timeout: u8,
    /// Sent on the stimulus offset flip; 0 sends nothing.
    pub fixation: u8,
    pub rest_start: u8,
    pub rest_end: u8,
}

impl Default for TriggerCodes {
    fn default() -> Self {
        Self {
            start: 255,
            end: 250,
            response: 128,
            timeout: 199,
            fixation: 0,
            rest_start: 200,
            rest_end: 201,
        }
    }
}
