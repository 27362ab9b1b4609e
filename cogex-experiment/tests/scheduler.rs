mod common;

use common::{approx, records_of, scheduler, start, Probe};
use cogex_core::{event_type, EventValue, SessionState, TrialPlan, TrialStatus};
use cogex_experiment::{BackgroundControl, RunOutcome, SessionError, TrialPlanBuilder};
use cogex_hardware::{
    MarkerCall, MarkerDispatcher, RecordingMarkerSink, RecordingTriggerSink, TextMarkerSink,
    TriggerDispatcher,
};
use cogex_timing::SimulatedTime;
use std::cell::Cell;
use std::rc::Rc;
use std::time::Duration;

fn five_trials(classified: &Rc<Cell<usize>>) -> TrialPlan<Probe> {
    TrialPlanBuilder::new(0.5, 1.0)
        .isi(0.5)
        .trials((0..5).map(|i| (format!("c{i}"), Probe::new("x", 10 + i as u8, classified))))
        .build()
        .unwrap()
}

#[test]
fn drift_is_measured_against_fixed_goals() {
    let time = SimulatedTime::new();
    let mut sched = scheduler(&time);
    let origin = start(&time, &mut sched);
    sched
        .surface_mut()
        .push_onsets([0.0, 2.001, 3.999, 6.01, 8.0].map(|t| origin + t));

    let classified = Rc::new(Cell::new(0));
    let plan = five_trials(&classified);
    assert_eq!(plan.onset_goals(), vec![0.0, 2.0, 4.0, 6.0, 8.0]);
    assert_eq!(sched.run(plan).unwrap(), RunOutcome::Completed);

    let results = sched.results();
    let drifts: Vec<f64> = results.iter().map(|r| r.drift).collect();
    for (got, want) in drifts.iter().zip([0.0, 0.001, -0.001, 0.01, 0.0]) {
        assert!(approx(*got, want), "drift {got} != {want}");
    }
    let goals: Vec<f64> = results.iter().map(|r| r.onset_goal).collect();
    assert_eq!(goals, vec![0.0, 2.0, 4.0, 6.0, 8.0]);

    let exceeded: Vec<bool> = results.iter().map(|r| r.drift_exceeded).collect();
    assert_eq!(exceeded, vec![false, false, false, true, false]);
    assert_eq!(classified.get(), 5);
}

#[test]
fn late_onset_does_not_push_later_deadlines() {
    let time = SimulatedTime::new();
    let mut sched = scheduler(&time);
    let origin = start(&time, &mut sched);
    sched
        .surface_mut()
        .push_onsets([0.0, 2.001, 3.999, 6.01, 8.0].map(|t| origin + t));

    let classified = Rc::new(Cell::new(0));
    sched.run(five_trials(&classified)).unwrap();

    // Each window closes at goal + 1.5 however late the stimulus appeared.
    let timeouts: Vec<f64> = records_of(&sched, event_type::RESPONSE_TIMEOUT)
        .map(|r| r.time_s)
        .collect();
    assert_eq!(timeouts.len(), 5);
    for (i, t) in timeouts.iter().enumerate() {
        let end = i as f64 * 2.0 + 1.5;
        assert!(*t >= end - 1e-9 && *t < end + 0.001, "trial {i} ended at {t}");
    }

    let offsets: Vec<f64> = records_of(&sched, event_type::STIM_OFFSET)
        .map(|r| r.time_s)
        .collect();
    assert!(offsets[3] >= 6.5 - 1e-9 && offsets[3] < 6.501);
}

#[test]
fn early_onset_keeps_the_full_stimulus() {
    let time = SimulatedTime::new();
    let mut sched = scheduler(&time);
    let origin = start(&time, &mut sched);
    sched
        .surface_mut()
        .push_onsets([0.0, 2.001, 3.999, 6.01, 8.0].map(|t| origin + t));

    let classified = Rc::new(Cell::new(0));
    sched.run(five_trials(&classified)).unwrap();

    // Fixation replaces the stimulus at goal + 0.5, whether the flip came
    // early or late.
    let offsets: Vec<f64> = records_of(&sched, event_type::STIM_OFFSET)
        .map(|r| r.time_s)
        .collect();
    assert_eq!(offsets.len(), 5);
    for (i, t) in offsets.iter().enumerate() {
        let due = i as f64 * 2.0 + 0.5;
        assert!(*t >= due - 1e-9 && *t < due + 0.001, "trial {i} offset at {t}");
    }
    assert!(offsets[2] - sched.results()[2].onset_actual >= 0.5);
}

#[test]
fn every_trial_ends_exactly_once() {
    let time = SimulatedTime::new();
    let mut sched = scheduler(&time);
    start(&time, &mut sched);

    let classified = Rc::new(Cell::new(0));
    sched.run(five_trials(&classified)).unwrap();
    let report = sched.finish();

    let ends: Vec<_> = records_of(&sched, event_type::TRIAL_END).collect();
    assert_eq!(ends.len(), 5);
    for (i, r) in ends.iter().enumerate() {
        assert_eq!(r.trial_index, Some(i));
        let status = r.get("status").and_then(EventValue::as_str).unwrap();
        assert!(TrialStatus::ALL.iter().any(|s| s.as_str() == status));
    }
    assert_eq!(report.trials, 5);
    assert_eq!(report.count(TrialStatus::Timeout), 5);
    assert_eq!(sched.state(), SessionState::Finished);
    assert_eq!(records_of(&sched, event_type::SESSION_END).count(), 1);

    // Finishing again changes nothing.
    sched.finish();
    assert_eq!(records_of(&sched, event_type::SESSION_END).count(), 1);
}

#[test]
fn first_listed_press_wins() {
    let time = SimulatedTime::new();
    let mut sched = scheduler(&time);
    let origin = start(&time, &mut sched);
    let input = sched.input_mut();
    input.push(origin + 0.2, "z");
    input.push(origin + 0.4, "x");
    input.push(origin + 0.5, "y");

    let classified = Rc::new(Cell::new(0));
    let plan = TrialPlanBuilder::new(0.5, 1.0)
        .trial("only", Probe::new("x", 10, &classified))
        .build()
        .unwrap();
    sched.run(plan).unwrap();

    let result = &sched.results()[0];
    let response = result.response.as_ref().unwrap();
    assert_eq!(response.key.as_str(), "x");
    assert!(approx(response.time_since_onset, 0.4));
    assert_eq!(result.status, TrialStatus::Hit);
    assert_eq!(result.trigger_codes_sent, vec![10, 128]);

    let given: Vec<_> = records_of(&sched, event_type::RESPONSE_GIVEN).collect();
    assert_eq!(given.len(), 1);
    assert_eq!(records_of(&sched, event_type::RESPONSE_TIMEOUT).count(), 0);
}

#[test]
fn codes_and_markers_follow_the_trial() {
    let time = SimulatedTime::new();
    let sink = RecordingTriggerSink::new();
    let lines = sink.lines();
    let markers = RecordingMarkerSink::new();
    let calls = markers.calls();
    let mut sched = scheduler(&time)
        .with_triggers(TriggerDispatcher::new(Box::new(sink), Duration::ZERO))
        .with_markers(MarkerDispatcher::new(Box::new(markers)));
    let origin = start(&time, &mut sched);
    sched.input_mut().push(origin + 2.3, "y");

    let classified = Rc::new(Cell::new(0));
    let plan = TrialPlanBuilder::new(0.5, 1.0)
        .isi(0.5)
        .trials([("a", Probe::new("x", 11, &classified)), ("b", Probe::new("x", 12, &classified))])
        .build()
        .unwrap();
    sched.run(plan).unwrap();
    sched.finish();

    let codes: Vec<u8> = lines.borrow().iter().copied().filter(|c| *c != 0).collect();
    assert_eq!(codes, vec![255, 11, 199, 12, 128, 250]);
    assert_eq!(sched.results()[1].status, TrialStatus::Miss);

    let calls = calls.borrow();
    let messages: Vec<&str> = calls
        .iter()
        .filter_map(|c| match c {
            MarkerCall::Message(m) => Some(m.as_str()),
            _ => None,
        })
        .collect();
    assert_eq!(
        messages,
        vec!["START_PROBE", "TRIAL_0_STIM", "RESP_TIMEOUT", "TRIAL_1_STIM", "RESP_MISS", "END_PROBE"]
    );
    assert_eq!(calls.first(), Some(&MarkerCall::StartRecording));
    assert_eq!(calls.last(), Some(&MarkerCall::StopRecording));
}

#[test]
fn failed_stimulus_aborts_only_that_trial() {
    let time = SimulatedTime::new();
    let surface = cogex_experiment::sim::SimulatedSurface::new(time.clone()).failing_stimulus(1);
    let input = cogex_experiment::sim::ScriptedInput::new(time.clone());
    let mut sched = cogex_experiment::Scheduler::new(&common::config(), time.clone(), surface, input);
    sched.set_frame_tolerance(0.002);
    start(&time, &mut sched);

    let classified = Rc::new(Cell::new(0));
    assert_eq!(sched.run(five_trials(&classified)).unwrap(), RunOutcome::Completed);

    let statuses: Vec<TrialStatus> = sched.results().iter().map(|r| r.status).collect();
    assert_eq!(
        statuses,
        vec![
            TrialStatus::Timeout,
            TrialStatus::Aborted,
            TrialStatus::Timeout,
            TrialStatus::Timeout,
            TrialStatus::Timeout
        ]
    );
    assert_eq!(classified.get(), 4);
    assert!(sched.results()[1].drift.is_nan());
    assert_eq!(records_of(&sched, event_type::TRIAL_END).count(), 5);
    assert_eq!(records_of(&sched, event_type::STIM_ONSET).count(), 4);

    let aborted = records_of(&sched, event_type::TRIAL_END).nth(1).unwrap();
    assert!(aborted.get("drift").unwrap().is_missing());

    // Later trials still hold their goals.
    assert!(approx(sched.results()[2].onset_goal, 4.0));
    assert!(sched.results()[2].drift.abs() <= 0.002 + 1e-9);
}

#[test]
fn lost_input_aborts_remaining_trials() {
    let time = SimulatedTime::new();
    let surface = cogex_experiment::sim::SimulatedSurface::new(time.clone());
    // Origin lands half a second after the first poll.
    let input = cogex_experiment::sim::ScriptedInput::new(time.clone()).disconnect_at(3.0);
    let mut sched = cogex_experiment::Scheduler::new(&common::config(), time.clone(), surface, input);
    sched.set_frame_tolerance(0.002);
    start(&time, &mut sched);

    let classified = Rc::new(Cell::new(0));
    sched.run(five_trials(&classified)).unwrap();

    let statuses: Vec<TrialStatus> = sched.results().iter().map(|r| r.status).collect();
    assert_eq!(statuses[0], TrialStatus::Timeout);
    assert!(statuses[2..].iter().all(|s| *s == TrialStatus::Aborted));
    assert_eq!(sched.results().len(), 5);
}

#[test]
fn hardware_failures_never_stop_the_session() {
    let time = SimulatedTime::new();
    let triggers = TriggerDispatcher::new(Box::new(RecordingTriggerSink::failing_after(2)), Duration::ZERO);
    let mut sched = scheduler(&time)
        .with_triggers(triggers)
        .with_markers(MarkerDispatcher::new(Box::new(RecordingMarkerSink::broken())));
    start(&time, &mut sched);

    let classified = Rc::new(Cell::new(0));
    assert_eq!(sched.run(five_trials(&classified)).unwrap(), RunOutcome::Completed);
    let report = sched.finish();

    assert!(sched.triggers().is_dummy());
    assert_eq!(report.trials, 5);
    // Codes are still recorded as intended even once the port is gone.
    assert!(sched.results().iter().all(|r| r.trigger_codes_sent.len() == 2));
}

#[derive(Default)]
struct Background {
    suspended: Cell<bool>,
    suspends: Cell<usize>,
    resumes: Cell<usize>,
}

impl BackgroundControl for Background {
    fn suspend(&self) {
        assert!(!self.suspended.replace(true), "nested suspend");
        self.suspends.set(self.suspends.get() + 1);
    }

    fn resume(&self) {
        assert!(self.suspended.replace(false), "resume without suspend");
        self.resumes.set(self.resumes.get() + 1);
    }
}

#[test]
fn background_work_is_suspended_around_each_trial() {
    let time = SimulatedTime::new();
    let background = Rc::new(Background::default());
    let mut sched = scheduler(&time).with_background(background.clone());
    let origin = start(&time, &mut sched);
    // Cancel mid-trial to check the guard also resumes on early exit.
    sched.input_mut().push(origin + 4.2, "escape");

    let classified = Rc::new(Cell::new(0));
    assert_eq!(sched.run(five_trials(&classified)).unwrap(), RunOutcome::Cancelled);

    assert_eq!(background.suspends.get(), 3);
    assert_eq!(background.resumes.get(), 3);
    assert!(!background.suspended.get());
}

#[test]
fn rest_block_is_bracketed_by_codes() {
    let time = SimulatedTime::new();
    let sink = RecordingTriggerSink::new();
    let lines = sink.lines();
    let mut sched = scheduler(&time).with_triggers(TriggerDispatcher::new(Box::new(sink), Duration::ZERO));
    start(&time, &mut sched);

    assert_eq!(sched.rest(1.0).unwrap(), RunOutcome::Completed);
    let begin = records_of(&sched, event_type::REST_START).next().unwrap().time_s;
    let end = records_of(&sched, event_type::REST_END).next().unwrap().time_s;
    assert!(approx(begin, 0.0));
    assert!(end >= 1.0 - 1e-9 && end < 1.001);

    let classified = Rc::new(Cell::new(0));
    let plan = TrialPlanBuilder::new(0.5, 1.0)
        .start_at(2.0)
        .trial("after_rest", Probe::new("x", 20, &classified))
        .build()
        .unwrap();
    sched.run(plan).unwrap();
    assert_eq!(sched.missed_deadlines(), 0);

    let codes: Vec<u8> = lines.borrow().iter().copied().filter(|c| *c != 0).collect();
    assert_eq!(codes, vec![255, 200, 201, 20, 199]);
}

#[test]
fn calls_out_of_order_are_rejected() {
    let time = SimulatedTime::new();
    let mut sched = scheduler(&time);
    let classified = Rc::new(Cell::new(0));

    let err = sched.run(five_trials(&classified)).unwrap_err();
    assert!(matches!(
        err,
        SessionError::InvalidState {
            expected: SessionState::Running,
            actual: SessionState::AwaitingTrigger
        }
    ));
    assert!(sched.rest(1.0).is_err());

    start(&time, &mut sched);
    assert!(matches!(
        sched.calibrate(),
        Err(SessionError::InvalidState { .. })
    ));
    assert!(sched.wait_for_trigger().is_err());

    sched.finish();
    assert!(sched.run(five_trials(&classified)).is_err());
    assert_eq!(classified.get(), 0);
}

#[test]
fn calibration_measures_the_simulated_refresh() {
    let time = SimulatedTime::new();
    let surface = cogex_experiment::sim::SimulatedSurface::new(time.clone()).with_refresh_rate(100.0);
    let input = cogex_experiment::sim::ScriptedInput::new(time.clone());
    let mut sched = cogex_experiment::Scheduler::new(&common::config(), time.clone(), surface, input);

    let timing = sched.calibrate().unwrap();
    assert!(timing.measured);
    assert!((timing.refresh_interval - 0.01).abs() < 1e-6);
    // Three quarters of a frame.
    assert!((sched.frame_tolerance() - 0.0075).abs() < 1e-6);

    start(&time, &mut sched);
    let report = sched.finish();
    let flips = report.flips.unwrap();
    assert!((flips.measured_hz - 100.0).abs() < 0.1);
    assert_eq!(flips.dropped_frames, 0);
}

/// Writer that notes the simulated time of every write.
struct StampedWriter {
    time: SimulatedTime,
    writes: Rc<std::cell::RefCell<Vec<f64>>>,
}

impl std::io::Write for StampedWriter {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.writes.borrow_mut().push(cogex_timing::TimeSource::now(&self.time));
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

#[test]
fn marker_file_is_written_between_trials() {
    let time = SimulatedTime::new();
    let writes = Rc::new(std::cell::RefCell::new(Vec::new()));
    let writer = StampedWriter {
        time: time.clone(),
        writes: Rc::clone(&writes),
    };
    let markers = MarkerDispatcher::new(Box::new(TextMarkerSink::new(writer)));
    let mut sched = scheduler(&time).with_markers(markers);
    let origin = start(&time, &mut sched);

    let classified = Rc::new(Cell::new(0));
    let plan = TrialPlanBuilder::new(0.5, 1.0)
        .start_at(1.0)
        .trial("only", Probe::new("x", 10, &classified))
        .build()
        .unwrap();
    sched.run(plan).unwrap();
    sched.finish();

    let writes = writes.borrow();
    assert!(!writes.is_empty());
    // Nothing reaches the writer between the wake time and the trial end.
    for t in writes.iter().map(|t| t - origin) {
        assert!(t < 1.0 - 0.002 || t >= 2.5 - 1e-9, "marker write at {t}");
    }
    assert!(writes.iter().any(|t| t - origin >= 2.5 - 1e-9));
}

#[test]
fn unvalidated_refresh_rate_gives_zero_tolerance() {
    let time = SimulatedTime::new();
    let mut cfg = common::config();
    cfg.frame_timing.default_refresh_hz = 0.0;
    assert!(cfg.validate().is_err());

    let surface = cogex_experiment::sim::SimulatedSurface::<cogex_core::StimulusType>::new(time.clone());
    let input = cogex_experiment::sim::ScriptedInput::new(time.clone());
    let mut sched = cogex_experiment::Scheduler::new(&cfg, time.clone(), surface, input);
    assert_eq!(sched.frame_tolerance(), 0.0);
    sched.set_frame_tolerance(f64::NAN);
    assert_eq!(sched.frame_tolerance(), 0.0);
}
