//! Dry run against simulated time: a 60 Hz surface and a keyboard that
//! answers like a reasonably attentive participant.

use crate::flanker::FlankerTrial;
use cogex_core::{StimulusType, TrialPlan};
use cogex_experiment::sim::{ScriptedInput, SimulatedSurface};
use cogex_timing::SimulatedTime;
use rand::Rng;

const REFRESH_HZ: f64 = 60.0;
/// Source time of the scripted trigger press.
const TRIGGER_AT: f64 = 1.0;
const ACCURACY: f64 = 0.9;
const OMISSIONS: f64 = 0.05;

pub fn collaborators<R: Rng>(
    plan: &TrialPlan<FlankerTrial>,
    trigger_key: &str,
    rng: &mut R,
) -> (SimulatedTime, SimulatedSurface<StimulusType>, ScriptedInput) {
    let time = SimulatedTime::new();
    let surface = SimulatedSurface::new(time.clone()).with_refresh_rate(REFRESH_HZ);
    let mut input = ScriptedInput::new(time.clone()).press(TRIGGER_AT, trigger_key);

    for trial in plan.trials() {
        if rng.random_bool(OMISSIONS) {
            continue;
        }
        let payload = &trial.payload;
        let key = if rng.random_bool(ACCURACY) {
            payload.correct_key()
        } else {
            payload.target.opposite().key_name()
        };
        // Incongruent flankers slow responses down a little.
        let slowdown = if payload.congruent { 0.0 } else { 0.06 };
        let rt = rng.random_range(0.3..0.7) + slowdown;
        input.push(TRIGGER_AT + trial.onset_goal + rt, key);
    }
    (time, surface, input)
}
