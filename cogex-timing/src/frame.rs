use serde::{Deserialize, Serialize};
use std::fmt::Display;
use tracing::{info, warn};

/// Frame statistics over the window used for the estimate.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CalibrationStats {
    pub average_frame_time_ns: f64,
    pub jitter_ns: f64,
    pub min_frame_time_ns: f64,
    pub max_frame_time_ns: f64,
    pub effective_fps: f64,
}

impl CalibrationStats {
    /// Population statistics over intervals given in seconds.
    pub fn from_intervals(intervals: &[f64]) -> Self {
        if intervals.is_empty() {
            return Self::default();
        }
        let times: Vec<f64> = intervals.iter().map(|s| s * 1e9).collect();
        let avg = times.iter().sum::<f64>() / times.len() as f64;
        let var = times.iter().map(|x| (x - avg).powi(2)).sum::<f64>() / times.len() as f64;
        let min = times.iter().copied().fold(f64::INFINITY, f64::min);
        let max = times.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        CalibrationStats {
            average_frame_time_ns: avg,
            jitter_ns: var.sqrt(),
            min_frame_time_ns: min,
            max_frame_time_ns: max,
            effective_fps: if avg > 0.0 { 1e9 / avg } else { 0.0 },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FrameTimingConfig {
    /// Consecutive intervals that must agree before the rate is accepted.
    pub n_identical: usize,
    /// Upper bound on frames sampled before falling back.
    pub max_frames: usize,
    /// Maximum standard deviation (ms) of the agreeing window.
    pub threshold_ms: f64,
    pub default_refresh_hz: f64,
}

impl Default for FrameTimingConfig {
    fn default() -> Self {
        Self {
            n_identical: 10,
            max_frames: 100,
            threshold_ms: 1.0,
            default_refresh_hz: 60.0,
        }
    }
}

/// Result of a one-off refresh measurement.
#[derive(Debug, Clone, PartialEq)]
pub struct FrameTiming {
    pub refresh_interval: f64,
    /// False when the documented default was used.
    pub measured: bool,
    pub frames_sampled: usize,
    pub stats: CalibrationStats,
}

impl FrameTiming {
    pub fn fallback(config: &FrameTimingConfig, frames_sampled: usize) -> Self {
        Self {
            refresh_interval: 1.0 / config.default_refresh_hz,
            measured: false,
            frames_sampled,
            stats: CalibrationStats::default(),
        }
    }

    pub fn refresh_hz(&self) -> f64 {
        1.0 / self.refresh_interval
    }

    /// Margin before a deadline at which busy-waiting stops.
    pub fn frame_tolerance(&self, factor: f64) -> f64 {
        factor * self.refresh_interval
    }
}

/// Measures the display refresh interval before any trial runs.
///
/// Not a control loop: call [`FrameTimingEstimator::measure`] once at startup,
/// never from the per-trial path.
#[derive(Debug, Clone)]
pub struct FrameTimingEstimator {
    config: FrameTimingConfig,
}

impl FrameTimingEstimator {
    pub fn new(config: FrameTimingConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &FrameTimingConfig {
        &self.config
    }

    /// `next_flip` blocks until the next frame is shown and returns its
    /// timestamp in seconds. Errors end the measurement with the fallback.
    pub fn measure<E, F>(&self, mut next_flip: F) -> FrameTiming
    where
        E: Display,
        F: FnMut() -> Result<f64, E>,
    {
        let n = self.config.n_identical.max(2);
        let mut intervals: Vec<f64> = Vec::with_capacity(self.config.max_frames);

        let mut last = match next_flip() {
            Ok(t) => t,
            Err(e) => {
                warn!(error = %e, "frame timing: first flip failed, using default rate");
                return FrameTiming::fallback(&self.config, 0);
            }
        };

        for frame in 1..=self.config.max_frames {
            let t = match next_flip() {
                Ok(t) => t,
                Err(e) => {
                    warn!(error = %e, frame, "frame timing: flip failed, using default rate");
                    return FrameTiming::fallback(&self.config, frame);
                }
            };
            intervals.push(t - last);
            last = t;

            if intervals.len() >= n {
                let window = &intervals[intervals.len() - n..];
                let stats = CalibrationStats::from_intervals(window);
                if stats.average_frame_time_ns > 0.0
                    && stats.jitter_ns / 1e6 < self.config.threshold_ms
                {
                    let timing = FrameTiming {
                        refresh_interval: stats.average_frame_time_ns / 1e9,
                        measured: true,
                        frames_sampled: frame,
                        stats,
                    };
                    info!(
                        refresh_hz = timing.refresh_hz(),
                        jitter_ms = timing.stats.jitter_ns / 1e6,
                        frames = frame,
                        "frame timing measured"
                    );
                    return timing;
                }
            }
        }

        warn!(
            frames = self.config.max_frames,
            default_hz = self.config.default_refresh_hz,
            "frame timing: no stable refresh rate found, using default"
        );
        FrameTiming::fallback(&self.config, self.config.max_frames)
    }
}

impl Default for FrameTimingEstimator {
    fn default() -> Self {
        Self::new(FrameTimingConfig::default())
    }
}
