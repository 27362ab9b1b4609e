use cogex_core::{TrialResult, TrialStatus};
use cogex_timing::FlipReport;
use std::fmt;

/// Post-run timing and outcome summary.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionReport {
    pub trials: usize,
    pub status_counts: [(TrialStatus, usize); 4],
    /// Over trials whose stimulus was actually shown.
    pub mean_drift: f64,
    pub max_abs_drift: f64,
    /// Share of shown trials whose drift exceeded the tolerance.
    pub out_of_tolerance: f64,
    /// Trials whose onset goal had already passed when the scheduler got to them.
    pub missed_deadlines: usize,
    pub flips: Option<FlipReport>,
}

impl SessionReport {
    pub fn new(results: &[TrialResult], missed_deadlines: usize, flips: Option<FlipReport>) -> Self {
        let mut status_counts = TrialStatus::ALL.map(|s| (s, 0));
        for r in results {
            if let Some(slot) = status_counts.iter_mut().find(|(s, _)| *s == r.status) {
                slot.1 += 1;
            }
        }

        let shown: Vec<&TrialResult> = results.iter().filter(|r| r.drift.is_finite()).collect();
        let (mean_drift, max_abs_drift, out_of_tolerance) = if shown.is_empty() {
            (0.0, 0.0, 0.0)
        } else {
            let n = shown.len() as f64;
            let mean = shown.iter().map(|r| r.drift).sum::<f64>() / n;
            let max = shown.iter().map(|r| r.drift.abs()).fold(0.0, f64::max);
            let exceeded = shown.iter().filter(|r| r.drift_exceeded).count() as f64 / n;
            (mean, max, exceeded)
        };

        Self {
            trials: results.len(),
            status_counts,
            mean_drift,
            max_abs_drift,
            out_of_tolerance,
            missed_deadlines,
            flips,
        }
    }

    pub fn count(&self, status: TrialStatus) -> usize {
        self.status_counts
            .iter()
            .find(|(s, _)| *s == status)
            .map_or(0, |(_, n)| *n)
    }
}

impl fmt::Display for SessionReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} trials |", self.trials)?;
        for (status, n) in &self.status_counts {
            write!(f, " {status} {n}")?;
        }
        writeln!(f)?;
        writeln!(
            f,
            "drift mean {:.2} ms, max |{:.2}| ms, {:.1}% out of tolerance, {} missed deadlines",
            self.mean_drift * 1e3,
            self.max_abs_drift * 1e3,
            self.out_of_tolerance * 100.0,
            self.missed_deadlines
        )?;
        if let Some(flips) = &self.flips {
            write!(
                f,
                "flips: {:.2} Hz measured, jitter {:.3} ms, {} dropped",
                flips.measured_hz,
                flips.jitter * 1e3,
                flips.dropped_frames
            )?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn result(index: usize, drift: f64, exceeded: bool, status: TrialStatus) -> TrialResult {
        TrialResult {
            index,
            condition: "c".into(),
            onset_goal: index as f64,
            onset_actual: index as f64 + drift,
            drift,
            drift_exceeded: exceeded,
            trigger_codes_sent: vec![1],
            response: None,
            status,
        }
    }

    #[test]
    fn aggregates_drift_and_status() {
        let results = [
            result(0, 0.001, false, TrialStatus::Hit),
            result(1, -0.003, false, TrialStatus::Miss),
            result(2, 0.010, true, TrialStatus::Hit),
            result(3, f64::NAN, false, TrialStatus::Aborted),
        ];
        let r = SessionReport::new(&results, 1, None);
        assert_eq!(r.trials, 4);
        assert_eq!(r.count(TrialStatus::Hit), 2);
        assert_eq!(r.count(TrialStatus::Timeout), 0);
        assert_eq!(r.count(TrialStatus::Aborted), 1);
        assert!((r.mean_drift - 0.008 / 3.0).abs() < 1e-12);
        assert!((r.max_abs_drift - 0.010).abs() < 1e-12);
        assert!((r.out_of_tolerance - 1.0 / 3.0).abs() < 1e-12);
        assert!(r.to_string().contains("HIT 2"));
    }

    #[test]
    fn empty_run() {
        let r = SessionReport::new(&[], 0, None);
        assert_eq!(r.trials, 0);
        assert_eq!(r.mean_drift, 0.0);
    }
}
