use cogex_core::{PlanError, TrialDescriptor, TrialPlan};
use rand::Rng;

/// Lays trials out back to back on absolute onset goals.
///
/// `onset(i + 1) = onset(i) + stimulus_duration + response_window + isi(i)`,
/// with `isi(i)` drawn uniformly from the ISI range.
#[derive(Debug, Clone)]
pub struct TrialPlanBuilder<P> {
    start_at: f64,
    stimulus_duration: f64,
    response_window: f64,
    isi: (f64, f64),
    trials: Vec<(String, P)>,
}

impl<P> TrialPlanBuilder<P> {
    pub fn new(stimulus_duration: f64, response_window: f64) -> Self {
        Self {
            start_at: 0.0,
            stimulus_duration,
            response_window,
            isi: (0.0, 0.0),
            trials: Vec::new(),
        }
    }

    /// Onset goal of the first trial, seconds after the trigger.
    pub fn start_at(mut self, t: f64) -> Self {
        self.start_at = t;
        self
    }

    /// Fixed inter-trial gap.
    pub fn isi(self, gap: f64) -> Self {
        self.isi_range(gap, gap)
    }

    pub fn isi_range(mut self, min: f64, max: f64) -> Self {
        self.isi = if min <= max { (min, max) } else { (max, min) };
        self
    }

    pub fn trial(mut self, condition: impl Into<String>, payload: P) -> Self {
        self.trials.push((condition.into(), payload));
        self
    }

    pub fn trials<I, S>(mut self, trials: I) -> Self
    where
        I: IntoIterator<Item = (S, P)>,
        S: Into<String>,
    {
        self.trials
            .extend(trials.into_iter().map(|(c, p)| (c.into(), p)));
        self
    }

    pub fn len(&self) -> usize {
        self.trials.len()
    }

    pub fn is_empty(&self) -> bool {
        self.trials.is_empty()
    }

    /// Builds with a thread-local generator.
    pub fn build(self) -> Result<TrialPlan<P>, PlanError> {
        self.build_with(&mut rand::rng())
    }

    pub fn build_with<R: Rng>(self, rng: &mut R) -> Result<TrialPlan<P>, PlanError> {
        let (lo, hi) = self.isi;
        if !(lo.is_finite() && hi.is_finite()) || lo < 0.0 {
            return Err(PlanError::InvalidDuration {
                index: 0,
                field: "isi",
                value: lo,
            });
        }

        let mut onset = self.start_at;
        let mut descriptors = Vec::with_capacity(self.trials.len());
        for (index, (condition, payload)) in self.trials.into_iter().enumerate() {
            descriptors.push(TrialDescriptor {
                index,
                condition,
                onset_goal: onset,
                stimulus_duration: self.stimulus_duration,
                response_window: self.response_window,
                payload,
            });
            let gap = if hi > lo { rng.random_range(lo..=hi) } else { lo };
            onset += self.stimulus_duration + self.response_window + gap;
        }
        TrialPlan::new(descriptors)
    }
}
