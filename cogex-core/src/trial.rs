use crate::event::{EventRecord, event_type};
use crate::key::Key;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Slack allowed when checking that consecutive trials do not overlap.
const PLAN_EPSILON_S: f64 = 1e-9;

/// Display state inside a trial.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrialState {
    /// Stimulus not on screen yet.
    Waiting,
    Stimulus,
    /// Stimulus offset reached, fixation shown until the trial end deadline.
    Fixation,
    Complete,
}

impl TrialState {
    /// State at session time `now`. The stimulus starts when it actually
    /// appeared (`onset`, `None` before the flip) and ends on the goal-anchored
    /// offset deadline, so an early flip lengthens it rather than cutting it.
    pub fn of<P>(trial: &TrialDescriptor<P>, onset: Option<f64>, now: f64) -> Self {
        if onset.is_none_or(|t| now < t) {
            TrialState::Waiting
        } else if now < trial.offset_deadline() {
            TrialState::Stimulus
        } else if now < trial.end_deadline() {
            TrialState::Fixation
        } else {
            TrialState::Complete
        }
    }
}

/// Outcome of a trial as judged by the task's classifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TrialStatus {
    Hit,
    Miss,
    Timeout,
    Aborted,
}

impl TrialStatus {
    pub const ALL: [TrialStatus; 4] = [
        TrialStatus::Hit,
        TrialStatus::Miss,
        TrialStatus::Timeout,
        TrialStatus::Aborted,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            TrialStatus::Hit => "HIT",
            TrialStatus::Miss => "MISS",
            TrialStatus::Timeout => "TIMEOUT",
            TrialStatus::Aborted => "ABORTED",
        }
    }
}

impl std::fmt::Display for TrialStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Accepted response, timed relative to the actual onset.
#[derive(Debug, Clone, PartialEq)]
pub struct Response {
    pub key: Key,
    pub time_since_onset: f64,
}

/// One planned trial. Times are seconds from the session origin.
#[derive(Debug, Clone)]
pub struct TrialDescriptor<P> {
    pub index: usize,
    pub condition: String,
    pub onset_goal: f64,
    pub stimulus_duration: f64,
    pub response_window: f64,
    pub payload: P,
}

impl<P> TrialDescriptor<P> {
    /// Stimulus plus response window.
    pub fn length(&self) -> f64 {
        self.stimulus_duration + self.response_window
    }

    /// Absolute end deadline, anchored on the goal and never on the actual onset.
    pub fn end_deadline(&self) -> f64 {
        self.onset_goal + self.length()
    }

    pub fn offset_deadline(&self) -> f64 {
        self.onset_goal + self.stimulus_duration
    }
}

#[derive(Debug, Error, PartialEq)]
pub enum PlanError {
    #[error("trial {index}: {field} must be finite and non-negative, got {value}")]
    InvalidDuration {
        index: usize,
        field: &'static str,
        value: f64,
    },
    #[error("trial {index} onset goal {onset_goal}s does not come after {previous_goal}s")]
    NotIncreasing {
        index: usize,
        onset_goal: f64,
        previous_goal: f64,
    },
    #[error("trial {index} starts at {onset_goal}s before the previous trial ends at {previous_end}s")]
    Overlap {
        index: usize,
        onset_goal: f64,
        previous_end: f64,
    },
}

/// Ordered, finite sequence of trials, consumed by a single run.
#[derive(Debug, Clone)]
pub struct TrialPlan<P> {
    trials: Vec<TrialDescriptor<P>>,
}

impl<P> TrialPlan<P> {
    /// Validates that every duration is sane and that onset goals strictly
    /// increase without any trial starting before its predecessor ends.
    pub fn new(trials: Vec<TrialDescriptor<P>>) -> Result<Self, PlanError> {
        let mut previous: Option<(f64, f64)> = None;
        for t in &trials {
            for (field, value) in [
                ("onset_goal", t.onset_goal),
                ("stimulus_duration", t.stimulus_duration),
                ("response_window", t.response_window),
            ] {
                if !value.is_finite() || value < 0.0 {
                    return Err(PlanError::InvalidDuration {
                        index: t.index,
                        field,
                        value,
                    });
                }
            }
            if let Some((goal, end)) = previous {
                if t.onset_goal <= goal {
                    return Err(PlanError::NotIncreasing {
                        index: t.index,
                        onset_goal: t.onset_goal,
                        previous_goal: goal,
                    });
                }
                if t.onset_goal + PLAN_EPSILON_S < end {
                    return Err(PlanError::Overlap {
                        index: t.index,
                        onset_goal: t.onset_goal,
                        previous_end: end,
                    });
                }
            }
            previous = Some((t.onset_goal, t.end_deadline()));
        }
        Ok(Self { trials })
    }

    pub fn len(&self) -> usize {
        self.trials.len()
    }

    pub fn is_empty(&self) -> bool {
        self.trials.is_empty()
    }

    pub fn trials(&self) -> &[TrialDescriptor<P>] {
        &self.trials
    }

    pub fn onset_goals(&self) -> Vec<f64> {
        self.trials.iter().map(|t| t.onset_goal).collect()
    }

    /// End of the last trial, or zero for an empty plan.
    pub fn end_deadline(&self) -> f64 {
        self.trials.last().map_or(0.0, |t| t.end_deadline())
    }
}

impl<P> IntoIterator for TrialPlan<P> {
    type Item = TrialDescriptor<P>;
    type IntoIter = std::vec::IntoIter<TrialDescriptor<P>>;

    fn into_iter(self) -> Self::IntoIter {
        self.trials.into_iter()
    }
}

/// Recorded result per trial. Built once at the end of the trial.
#[derive(Debug, Clone, PartialEq)]
pub struct TrialResult {
    pub index: usize,
    pub condition: String,
    pub onset_goal: f64,
    pub onset_actual: f64,
    pub drift: f64,
    pub drift_exceeded: bool,
    pub trigger_codes_sent: Vec<u8>,
    pub response: Option<Response>,
    pub status: TrialStatus,
}

impl TrialResult {
    /// Record appended at the end of the trial.
    pub fn to_record(&self, time_s: f64) -> EventRecord {
        let codes = self
            .trigger_codes_sent
            .iter()
            .map(|c| c.to_string())
            .collect::<Vec<_>>()
            .join(";");
        EventRecord::new(event_type::TRIAL_END, time_s)
            .for_trial(self.index)
            .with("condition", self.condition.clone())
            .with("onset_goal", self.onset_goal)
            .with("onset_actual", finite(self.onset_actual))
            .with("drift", finite(self.drift))
            .with("drift_exceeded", self.drift_exceeded)
            .with("trigger_codes", codes)
            .with(
                "response_key",
                self.response.as_ref().map(|r| r.key.to_string()),
            )
            .with("rt", self.response.as_ref().map(|r| r.time_since_onset))
            .with("status", self.status.as_str())
    }
}

/// Missing instead of NaN for trials whose stimulus never appeared.
fn finite(x: f64) -> Option<f64> {
    x.is_finite().then_some(x)
}
