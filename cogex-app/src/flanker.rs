use anyhow::Result;
use cogex_core::{ArrowDirection, EventRecord, Response, StimulusType, TrialPayload, TrialPlan, TrialStatus};
use cogex_experiment::TrialPlanBuilder;
use rand::seq::SliceRandom;
use rand::Rng;

pub const RESPONSE_KEYS: [&str; 2] = ["left", "right"];

pub const STIMULUS_DURATION: f64 = 0.2;
pub const RESPONSE_WINDOW: f64 = 1.3;
pub const ISI_RANGE: (f64, f64) = (0.5, 1.0);
/// Lead-in between the trigger (or the end of a rest block) and the first
/// onset.
pub const LEAD_IN: f64 = 2.0;

const ARROW_SIZE: f32 = 30.0;

/// Eriksen flanker trial: respond to the direction of the centre arrow.
#[derive(Debug, Clone, PartialEq)]
pub struct FlankerTrial {
    pub target: ArrowDirection,
    pub congruent: bool,
    stimulus: StimulusType,
}

impl FlankerTrial {
    pub fn new(target: ArrowDirection, congruent: bool) -> Self {
        let flankers = if congruent { target } else { target.opposite() };
        Self {
            target,
            congruent,
            stimulus: StimulusType::Flanker {
                target,
                flankers,
                size: ARROW_SIZE,
                color: StimulusType::WHITE,
            },
        }
    }

    pub fn condition(&self) -> &'static str {
        if self.congruent { "congruent" } else { "incongruent" }
    }

    pub fn correct_key(&self) -> &'static str {
        self.target.key_name()
    }
}

impl TrialPayload for FlankerTrial {
    type Content = StimulusType;

    fn stimulus(&self) -> &StimulusType {
        &self.stimulus
    }

    /// 1-2 congruent left/right, 3-4 incongruent left/right.
    fn trigger_code(&self) -> u8 {
        let base = if self.congruent { 1 } else { 3 };
        match self.target {
            ArrowDirection::Right => base + 1,
            _ => base,
        }
    }

    fn classify(&self, response: Option<&Response>) -> TrialStatus {
        match response {
            None => TrialStatus::Timeout,
            Some(r) if r.key.as_str() == self.correct_key() => TrialStatus::Hit,
            Some(_) => TrialStatus::Miss,
        }
    }

    fn describe(&self, record: &mut EventRecord) {
        record.insert("target", self.correct_key());
        record.insert("congruent", self.congruent);
        record.insert("stimulus", self.stimulus.describe());
    }
}

/// Balanced, shuffled set of `n` trials: every target and congruency
/// combination appears equally often, up to rounding.
pub fn trials<R: Rng>(n: usize, rng: &mut R) -> Vec<FlankerTrial> {
    let cells = [
        (ArrowDirection::Left, true),
        (ArrowDirection::Right, true),
        (ArrowDirection::Left, false),
        (ArrowDirection::Right, false),
    ];
    let mut trials: Vec<FlankerTrial> = cells
        .iter()
        .cycle()
        .take(n)
        .map(|&(target, congruent)| FlankerTrial::new(target, congruent))
        .collect();
    trials.shuffle(rng);
    trials
}

/// Lays `trials` out from `start_at` seconds after the trigger.
pub fn plan<R: Rng>(trials: Vec<FlankerTrial>, start_at: f64, rng: &mut R) -> Result<TrialPlan<FlankerTrial>> {
    let plan = TrialPlanBuilder::new(STIMULUS_DURATION, RESPONSE_WINDOW)
        .start_at(start_at)
        .isi_range(ISI_RANGE.0, ISI_RANGE.1)
        .trials(trials.into_iter().map(|t| (t.condition(), t)))
        .build_with(rng)?;
    Ok(plan)
}

#[cfg(test)]
mod tests {
    use super::*;
    use cogex_core::Key;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn response(key: &str) -> Response {
        Response {
            key: Key::new(key),
            time_since_onset: 0.45,
        }
    }

    #[test]
    fn incongruent_flankers_point_away() {
        let t = FlankerTrial::new(ArrowDirection::Left, false);
        assert_eq!(t.stimulus().describe(), ">><>>");
        assert_eq!(t.trigger_code(), 3);
        assert_eq!(FlankerTrial::new(ArrowDirection::Right, true).trigger_code(), 2);
    }

    #[test]
    fn classifies_against_centre_arrow() {
        let t = FlankerTrial::new(ArrowDirection::Right, false);
        assert_eq!(t.classify(Some(&response("right"))), TrialStatus::Hit);
        assert_eq!(t.classify(Some(&response("left"))), TrialStatus::Miss);
        assert_eq!(t.classify(None), TrialStatus::Timeout);
    }

    #[test]
    fn set_is_balanced() {
        let mut rng = StdRng::seed_from_u64(3);
        let set = trials(40, &mut rng);
        assert_eq!(set.len(), 40);
        assert_eq!(set.iter().filter(|t| t.congruent).count(), 20);
        assert_eq!(set.iter().filter(|t| t.target == ArrowDirection::Left).count(), 20);
    }

    #[test]
    fn plan_starts_after_lead_in() {
        let mut rng = StdRng::seed_from_u64(3);
        let set = trials(8, &mut rng);
        let plan = plan(set, LEAD_IN, &mut rng).unwrap();
        let goals = plan.onset_goals();
        assert_eq!(goals[0], LEAD_IN);
        for w in goals.windows(2) {
            let gap = w[1] - w[0] - STIMULUS_DURATION - RESPONSE_WINDOW;
            assert!(gap >= ISI_RANGE.0 - 1e-9 && gap <= ISI_RANGE.1 + 1e-9);
        }
        assert_eq!(plan.trials()[0].condition, plan.trials()[0].payload.condition());
    }
}
