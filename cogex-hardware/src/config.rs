use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct HardwareConfig {
    pub parallel_port: ParallelPortConfig,
    pub eye_tracker: EyeTrackerConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ParallelPortConfig {
    pub enabled: bool,
    /// ppdev character device.
    pub device: PathBuf,
    /// How long a code stays on the data lines before they are lowered.
    pub pulse_width_ms: f64,
}

impl ParallelPortConfig {
    pub fn pulse_width(&self) -> Duration {
        Duration::from_secs_f64(self.pulse_width_ms.max(0.0) / 1000.0)
    }
}

impl Default for ParallelPortConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            device: PathBuf::from("/dev/parport0"),
            pulse_width_ms: 10.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EyeTrackerConfig {
    pub enabled: bool,
    /// Two or three letters prefixed to the tracker's data file name.
    pub file_prefix: String,
}

impl Default for EyeTrackerConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            file_prefix: "TSK".into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_json_keeps_defaults() {
        let cfg: HardwareConfig =
            serde_json::from_str(r#"{"parallel_port": {"enabled": true}}"#).unwrap();
        assert!(cfg.parallel_port.enabled);
        assert_eq!(cfg.parallel_port.device, PathBuf::from("/dev/parport0"));
        assert_eq!(cfg.parallel_port.pulse_width(), Duration::from_millis(10));
        assert!(!cfg.eye_tracker.enabled);
    }
}
