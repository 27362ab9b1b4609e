/// Post-hoc quality report over flip timestamps collected during a run.
#[derive(Debug, Clone, PartialEq)]
pub struct FlipReport {
    pub expected_interval: f64,
    pub mean_interval: f64,
    /// Standard deviation of `interval - expected_interval`, seconds.
    pub jitter: f64,
    pub measured_hz: f64,
    /// Intervals longer than 1.5 expected frames.
    pub dropped_frames: usize,
    /// Per-flip delay relative to a perfect grid anchored on the first flip.
    pub onset_delays: Vec<f64>,
}

impl FlipReport {
    /// Returns `None` with fewer than two timestamps.
    pub fn from_flip_times(times: &[f64], expected_hz: f64) -> Option<Self> {
        if times.len() < 2 || expected_hz <= 0.0 {
            return None;
        }
        let expected = 1.0 / expected_hz;
        let first = times[0];
        let ifi: Vec<f64> = times.windows(2).map(|w| w[1] - w[0]).collect();

        let mean = ifi.iter().sum::<f64>() / ifi.len() as f64;
        let dev: Vec<f64> = ifi.iter().map(|i| i - expected).collect();
        let dev_mean = dev.iter().sum::<f64>() / dev.len() as f64;
        let jitter =
            (dev.iter().map(|d| (d - dev_mean).powi(2)).sum::<f64>() / dev.len() as f64).sqrt();
        let dropped = ifi.iter().filter(|&&i| i > expected * 1.5).count();
        let onset_delays = times
            .iter()
            .enumerate()
            .map(|(k, t)| (t - first) - k as f64 * expected)
            .collect();

        Some(Self {
            expected_interval: expected,
            mean_interval: mean,
            jitter,
            measured_hz: if mean > 0.0 { 1.0 / mean } else { 0.0 },
            dropped_frames: dropped,
            onset_delays,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn perfect_grid_has_no_jitter() {
        let times: Vec<f64> = (0..61).map(|k| k as f64 / 60.0).collect();
        let r = FlipReport::from_flip_times(&times, 60.0).unwrap();
        assert!((r.measured_hz - 60.0).abs() < 1e-9);
        assert!(r.jitter < 1e-12);
        assert_eq!(r.dropped_frames, 0);
        assert!(r.onset_delays.iter().all(|d| d.abs() < 1e-12));
    }

    #[test]
    fn skipped_frame_is_counted() {
        let f = 1.0 / 60.0;
        let times = [0.0, f, 3.0 * f, 4.0 * f];
        let r = FlipReport::from_flip_times(&times, 60.0).unwrap();
        assert_eq!(r.dropped_frames, 1);
        assert!((r.onset_delays[2] - f).abs() < 1e-12);
        assert!((r.onset_delays[3] - f).abs() < 1e-12);
    }

    #[test]
    fn too_few_times() {
        assert!(FlipReport::from_flip_times(&[0.0], 60.0).is_none());
    }
}
