#![allow(dead_code)]

use cogex_core::{EventRecord, Response, StimulusType, TrialPayload, TrialStatus};
use cogex_experiment::sim::{ScriptedInput, SimulatedSurface};
use cogex_experiment::{RunOutcome, Scheduler, SessionConfig};
use cogex_timing::{SimulatedTime, TimeSource};
use std::cell::Cell;
use std::rc::Rc;

pub type SimScheduler = Scheduler<SimulatedTime, SimulatedSurface<StimulusType>, ScriptedInput>;

/// Minimal task: one correct key per trial.
#[derive(Debug, Clone)]
pub struct Probe {
    pub correct: &'static str,
    pub code: u8,
    pub stimulus: StimulusType,
    pub classified: Rc<Cell<usize>>,
}

impl Probe {
    pub fn new(correct: &'static str, code: u8, classified: &Rc<Cell<usize>>) -> Self {
        Self {
            correct,
            code,
            stimulus: StimulusType::Circle {
                radius: 40.0,
                color: StimulusType::WHITE,
            },
            classified: Rc::clone(classified),
        }
    }
}

impl TrialPayload for Probe {
    type Content = StimulusType;

    fn stimulus(&self) -> &StimulusType {
        &self.stimulus
    }

    fn trigger_code(&self) -> u8 {
        self.code
    }

    fn classify(&self, response: Option<&Response>) -> TrialStatus {
        self.classified.set(self.classified.get() + 1);
        match response {
            None => TrialStatus::Timeout,
            Some(r) if r.key.as_str() == self.correct => TrialStatus::Hit,
            Some(_) => TrialStatus::Miss,
        }
    }

    fn describe(&self, record: &mut EventRecord) {
        record.insert("correct_key", self.correct);
    }
}

pub fn config() -> SessionConfig {
    let mut cfg = SessionConfig::default();
    cfg.participant = "P01".into();
    cfg.task_name = "Probe".into();
    cfg.keys.response = vec!["x".into(), "y".into()];
    cfg
}

pub fn scheduler(time: &SimulatedTime) -> SimScheduler {
    scheduler_with(time, &config())
}

pub fn scheduler_with(time: &SimulatedTime, cfg: &SessionConfig) -> SimScheduler {
    let surface = SimulatedSurface::new(time.clone());
    let input = ScriptedInput::new(time.clone());
    let mut s = Scheduler::new(cfg, time.clone(), surface, input);
    s.set_frame_tolerance(0.002);
    s
}

/// Presses the trigger half a second from now and returns the source time of
/// the clock origin.
pub fn start(time: &SimulatedTime, sched: &mut SimScheduler) -> f64 {
    let at = time.now() + 0.5;
    sched.input_mut().push(at, "t");
    assert_eq!(sched.wait_for_trigger().unwrap(), RunOutcome::Completed);
    time.now()
}

pub fn records_of<'a>(sched: &'a SimScheduler, event_type: &'a str) -> impl Iterator<Item = &'a EventRecord> + 'a {
    sched.log().records().iter().filter(move |r| r.is(event_type))
}

pub fn approx(a: f64, b: f64) -> bool {
    (a - b).abs() < 1e-9
}
