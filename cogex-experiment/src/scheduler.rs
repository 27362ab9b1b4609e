use crate::collector::{InputSource, ResponseCollector};
use crate::config::{SchedulerConfig, SessionConfig, TriggerCodes};
use crate::error::{InputError, PresentationError, SessionError};
use crate::log::EventLog;
use crate::report::SessionReport;
use crate::surface::{Frame, PresentationSurface};
use cogex_core::{
    event_type, EventRecord, Key, KeyPress, KeySet, Response, SessionState, TrialDescriptor,
    TrialPayload, TrialPlan, TrialResult, TrialState, TrialStatus,
};
use cogex_hardware::{MarkerDispatcher, TriggerDispatcher};
use cogex_timing::{Clock, FlipReport, FrameTiming, FrameTimingConfig, FrameTimingEstimator, TimeSource};
use std::fmt::Write as _;
use std::path::{Path, PathBuf};
use std::rc::Rc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Upper bound on records appended per trial: onset, offset, response or
/// timeout, end.
const RECORDS_PER_TRIAL: usize = 4;

/// Cooperative stop signal, checked on every polling iteration.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

/// Work that must stay quiet while a stimulus is being timed.
pub trait BackgroundControl {
    fn suspend(&self);
    fn resume(&self);
}

/// Non-negative and finite; anything else waits right up to the goal.
fn sane_tolerance(tolerance: f64) -> f64 {
    if tolerance.is_finite() { tolerance.max(0.0) } else { 0.0 }
}

/// Suspends background work for its lifetime.
struct CriticalSection(Option<Rc<dyn BackgroundControl>>);

impl CriticalSection {
    fn enter(background: Option<&Rc<dyn BackgroundControl>>) -> Self {
        let background = background.cloned();
        if let Some(bg) = &background {
            bg.suspend();
        }
        Self(background)
    }
}

impl Drop for CriticalSection {
    fn drop(&mut self) {
        if let Some(bg) = &self.0 {
            bg.resume();
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    Completed,
    /// A quit key or the cancellation token stopped the session.
    Cancelled,
}

enum Wait {
    Reached,
    Cancelled,
}

/// What actually happened during a trial's timed section.
#[derive(Default)]
struct Timeline {
    late_start: bool,
    onset_actual: Option<f64>,
    offset_actual: Option<f64>,
    response: Option<KeyPress>,
    timeout_at: Option<f64>,
    fault: Option<SessionError>,
}

/// Owns the session clock and runs trials against absolute onset goals.
///
/// Per trial: wait until one frame tolerance before the goal, commit the
/// stimulus with its trigger attached to the flip, then poll for a response
/// until `onset_goal + stimulus_duration + response_window`. Deadlines never
/// depend on when the previous stimulus actually appeared.
pub struct Scheduler<T: TimeSource, S, I> {
    clock: Clock<T>,
    surface: S,
    input: I,
    triggers: TriggerDispatcher,
    markers: MarkerDispatcher,
    log: EventLog,
    collector: ResponseCollector,
    config: SchedulerConfig,
    frame_config: FrameTimingConfig,
    codes: TriggerCodes,
    task_name: String,
    output_dir: PathBuf,
    trigger_key: Key,
    trigger_keys: KeySet,
    key_buffer: Vec<KeyPress>,
    frame_timing: FrameTiming,
    frame_tolerance: f64,
    quantum: f64,
    state: SessionState,
    cancel: CancellationToken,
    background: Option<Rc<dyn BackgroundControl>>,
    results: Vec<TrialResult>,
    codes_sent: Vec<u8>,
    marker_text: String,
    flip_times: Vec<f64>,
    missed_deadlines: usize,
}

impl<T, S, I> Scheduler<T, S, I>
where
    T: TimeSource,
    S: PresentationSurface,
    I: InputSource,
{
    /// Triggers start in dummy mode and markers disabled; attach real ones
    /// with [`with_triggers`](Self::with_triggers) and
    /// [`with_markers`](Self::with_markers).
    pub fn new(config: &SessionConfig, time: T, surface: S, input: I) -> Self {
        let quit = config.keys.quit_keys();
        let trigger_key = config.keys.trigger_key();
        let mut trigger_keys = quit.clone();
        trigger_keys.insert(trigger_key.clone());

        let frame_timing = FrameTiming::fallback(&config.frame_timing, 0);
        let frame_tolerance =
            sane_tolerance(frame_timing.frame_tolerance(config.scheduler.frame_tolerance_factor));

        Self {
            clock: Clock::new(time),
            surface,
            input,
            triggers: TriggerDispatcher::dummy(),
            markers: MarkerDispatcher::disabled(),
            log: EventLog::new(config.session_info()),
            collector: ResponseCollector::new(&config.keys.response_keys(), &quit),
            config: config.scheduler.clone(),
            frame_config: config.frame_timing.clone(),
            codes: config.codes.clone(),
            task_name: config.task_name.clone(),
            output_dir: config.output_dir.clone(),
            trigger_key,
            trigger_keys,
            key_buffer: Vec::with_capacity(16),
            frame_timing,
            frame_tolerance,
            quantum: config.scheduler.effective_quantum(frame_tolerance),
            state: SessionState::AwaitingTrigger,
            cancel: CancellationToken::new(),
            background: None,
            results: Vec::new(),
            codes_sent: Vec::with_capacity(4),
            marker_text: String::with_capacity(32),
            flip_times: Vec::new(),
            missed_deadlines: 0,
        }
    }

    pub fn with_triggers(mut self, triggers: TriggerDispatcher) -> Self {
        self.triggers = triggers;
        self
    }

    pub fn with_markers(mut self, markers: MarkerDispatcher) -> Self {
        self.markers = markers;
        self
    }

    pub fn with_background(mut self, background: Rc<dyn BackgroundControl>) -> Self {
        self.background = Some(background);
        self
    }

    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    /// Writes the log to the session's default file if the scheduler is
    /// dropped before [`save`](Self::save) succeeds.
    pub fn with_autosave(mut self) -> Self {
        let path = self.log.default_path(&self.output_dir);
        self.log = self.log.with_teardown_path(path);
        self
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn clock(&self) -> &Clock<T> {
        &self.clock
    }

    pub fn log(&self) -> &EventLog {
        &self.log
    }

    pub fn log_mut(&mut self) -> &mut EventLog {
        &mut self.log
    }

    pub fn results(&self) -> &[TrialResult] {
        &self.results
    }

    pub fn surface(&self) -> &S {
        &self.surface
    }

    pub fn surface_mut(&mut self) -> &mut S {
        &mut self.surface
    }

    pub fn input_mut(&mut self) -> &mut I {
        &mut self.input
    }

    pub fn triggers(&self) -> &TriggerDispatcher {
        &self.triggers
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn frame_timing(&self) -> &FrameTiming {
        &self.frame_timing
    }

    pub fn frame_tolerance(&self) -> f64 {
        self.frame_tolerance
    }

    pub fn missed_deadlines(&self) -> usize {
        self.missed_deadlines
    }

    /// Measures the refresh interval by flipping blank frames. Only valid
    /// before the trigger.
    pub fn calibrate(&mut self) -> Result<FrameTiming, SessionError> {
        self.expect_state(SessionState::AwaitingTrigger)?;
        let estimator = FrameTimingEstimator::new(self.frame_config.clone());

        let record = self.config.record_flips;
        if record {
            self.flip_times.reserve(estimator.config().max_frames + 1);
        }
        let surface = &mut self.surface;
        let clock = &self.clock;
        let flips = &mut self.flip_times;
        let timing = estimator.measure(|| -> Result<f64, PresentationError> {
            surface.prepare(Frame::Blank)?;
            surface.commit(&mut || {})?;
            let t = clock.now();
            if record {
                flips.push(t);
            }
            Ok(t)
        });

        self.set_frame_timing(timing.clone());
        Ok(timing)
    }

    pub fn set_frame_timing(&mut self, timing: FrameTiming) {
        let tolerance = timing.frame_tolerance(self.config.frame_tolerance_factor);
        self.frame_timing = timing;
        self.set_frame_tolerance(tolerance);
    }

    /// Overrides the margin before each onset goal at which waiting stops.
    pub fn set_frame_tolerance(&mut self, tolerance: f64) {
        self.frame_tolerance = sane_tolerance(tolerance);
        self.quantum = self.config.effective_quantum(self.frame_tolerance);
        debug!(
            frame_tolerance_ms = self.frame_tolerance * 1e3,
            quantum_ms = self.quantum * 1e3,
            "scheduler tolerance set"
        );
    }

    /// Blocks until the trigger key, then anchors the clock, emits the start
    /// code and starts marker recording. A quit key cancels the session.
    pub fn wait_for_trigger(&mut self) -> Result<RunOutcome, SessionError> {
        self.expect_state(SessionState::AwaitingTrigger)?;
        self.surface.prepare(Frame::Fixation)?;
        self.surface.commit(&mut || {})?;
        self.input.clear();
        info!(key = %self.trigger_key, "waiting for trigger");

        loop {
            if self.cancel.is_cancelled() {
                self.cancelled(None);
                return Ok(RunOutcome::Cancelled);
            }
            self.input
                .poll(&self.trigger_keys, &self.clock.reader(), &mut self.key_buffer)?;
            let mut triggered = false;
            for press in self.key_buffer.drain(..) {
                if press.key == self.trigger_key {
                    triggered = true;
                } else {
                    self.cancel.cancel();
                }
            }
            if self.cancel.is_cancelled() {
                self.cancelled(None);
                return Ok(RunOutcome::Cancelled);
            }
            if triggered {
                break;
            }
            self.clock.pause(Duration::from_secs_f64(self.quantum));
        }

        self.clock.reset();
        if let Some(next) = self.state.next() {
            self.state = next;
        }
        let code = self.codes.start;
        self.triggers.emit(code);
        self.markers.start_recording();
        self.markers
            .send_message(&format!("START_{}", self.task_name.to_uppercase()));
        self.markers.flush();
        self.log
            .append(EventRecord::new(event_type::TRIGGER_RECEIVED, 0.0).with("code", code));
        info!(code, "trigger received, clock anchored");
        Ok(RunOutcome::Completed)
    }

    /// Runs every trial of `plan` in order. The session stays running
    /// afterwards so rest blocks or further plans can follow; call
    /// [`finish`](Self::finish) to end it.
    pub fn run<P>(&mut self, plan: TrialPlan<P>) -> Result<RunOutcome, SessionError>
    where
        P: TrialPayload<Content = S::Content>,
    {
        self.expect_state(SessionState::Running)?;
        let total = plan.len();
        self.log.reserve(total * RECORDS_PER_TRIAL + 2);
        self.results.reserve(total);
        info!(
            trials = total,
            first_onset = plan.trials().first().map_or(0.0, |t| t.onset_goal),
            last_end = plan.end_deadline(),
            "run started"
        );

        for trial in plan {
            if let Wait::Cancelled = self.run_trial(&trial, total) {
                self.cancelled(Some(trial.index));
                return Ok(RunOutcome::Cancelled);
            }
        }
        Ok(RunOutcome::Completed)
    }

    /// Shows fixation for `duration` seconds between rest start and end codes.
    pub fn rest(&mut self, duration: f64) -> Result<RunOutcome, SessionError> {
        self.expect_state(SessionState::Running)?;
        self.surface.prepare(Frame::Fixation)?;
        let code = self.codes.rest_start;
        let triggers = &mut self.triggers;
        self.surface.commit(&mut || triggers.emit(code))?;
        let start = self.clock.now();
        self.markers.send_message("REST_START");
        self.markers.flush();
        self.log.append(
            EventRecord::new(event_type::REST_START, start)
                .with("code", code)
                .with("duration", duration),
        );
        info!(duration, "resting state");

        if let Wait::Cancelled = self.wait_until(start + duration)? {
            self.cancelled(None);
            return Ok(RunOutcome::Cancelled);
        }

        let end = self.clock.now();
        let code = self.codes.rest_end;
        self.triggers.emit(code);
        self.markers.send_message("REST_END");
        self.markers.flush();
        self.log
            .append(EventRecord::new(event_type::REST_END, end).with("code", code));
        Ok(RunOutcome::Completed)
    }

    /// Ends the session and returns its report. Safe to call more than once.
    pub fn finish(&mut self) -> SessionReport {
        match self.state {
            SessionState::Running => {
                let now = self.clock.now();
                self.log.append(
                    EventRecord::new(event_type::SESSION_END, now)
                        .with("trials", self.results.len())
                        .with("code", self.codes.end),
                );
                self.end_session();
                info!(trials = self.results.len(), "session finished");
            }
            SessionState::AwaitingTrigger => self.state = SessionState::Finished,
            SessionState::Finished => {}
        }
        self.report()
    }

    pub fn report(&self) -> SessionReport {
        let flips = if self.config.record_flips {
            FlipReport::from_flip_times(&self.flip_times, self.frame_timing.refresh_hz())
        } else {
            None
        };
        SessionReport::new(&self.results, self.missed_deadlines, flips)
    }

    /// Flushes the log to its teardown path, or to the session's default file
    /// in the output directory.
    pub fn save(&mut self) -> Result<PathBuf, SessionError> {
        let path = match self.log.teardown_path() {
            Some(p) => p.to_path_buf(),
            None => self.log.default_path(&self.output_dir),
        };
        self.save_to(&path)?;
        Ok(path)
    }

    pub fn save_to(&mut self, path: &Path) -> Result<(), SessionError> {
        self.log.flush_to_path(path)?;
        Ok(())
    }

    fn expect_state(&self, expected: SessionState) -> Result<(), SessionError> {
        if self.state == expected {
            Ok(())
        } else {
            Err(SessionError::InvalidState {
                expected,
                actual: self.state,
            })
        }
    }

    fn run_trial<P>(&mut self, trial: &TrialDescriptor<P>, total: usize) -> Wait
    where
        P: TrialPayload<Content = S::Content>,
    {
        let mut timeline = Timeline::default();
        self.codes_sent.clear();
        self.marker_text.clear();
        let _ = write!(self.marker_text, "TRIAL_{}_STIM", trial.index);
        self.input.clear();
        timeline.late_start = self.clock.now() > trial.onset_goal - self.frame_tolerance;

        let presented = {
            let _critical = CriticalSection::enter(self.background.as_ref());
            self.present(trial, &mut timeline)
        };

        match presented {
            Ok(Wait::Cancelled) => {
                self.append_timeline(trial, &timeline);
                Wait::Cancelled
            }
            Ok(Wait::Reached) => {
                self.complete(trial, timeline, total);
                Wait::Reached
            }
            Err(fault) => {
                timeline.fault = Some(fault);
                self.complete(trial, timeline, total);
                Wait::Reached
            }
        }
    }

    /// The timed section of a trial. Nothing here logs, allocates or writes
    /// to disk.
    fn present<P>(&mut self, trial: &TrialDescriptor<P>, timeline: &mut Timeline) -> Result<Wait, SessionError>
    where
        P: TrialPayload<Content = S::Content>,
    {
        if let Wait::Cancelled = self.wait_until(trial.onset_goal - self.frame_tolerance)? {
            return Ok(Wait::Cancelled);
        }

        self.surface.prepare(Frame::Stimulus(trial.payload.stimulus()))?;
        let code = trial.payload.trigger_code();
        {
            let triggers = &mut self.triggers;
            let markers = &mut self.markers;
            let codes_sent = &mut self.codes_sent;
            let text = &self.marker_text;
            self.surface.commit(&mut || {
                triggers.emit(code);
                codes_sent.push(code);
                markers.send_message(text);
            })?;
        }
        let onset = self.clock.now();
        timeline.onset_actual = Some(onset);

        let end = trial.end_deadline();
        self.collector.arm(onset, end);
        let mut shown = TrialState::Stimulus;

        loop {
            if self.cancel.is_cancelled() {
                return Ok(Wait::Cancelled);
            }
            self.triggers.service();
            let now = self.clock.now();
            if now >= end {
                break;
            }

            if shown == TrialState::Stimulus
                && TrialState::of(trial, Some(onset), now) == TrialState::Fixation
            {
                shown = TrialState::Fixation;
                timeline.offset_actual = Some(self.show_fixation()?);
            }

            let polled = self.collector.poll(&mut self.input, &self.clock.reader())?;
            if let Some(press) = polled.response {
                self.triggers.emit(self.codes.response);
                self.codes_sent.push(self.codes.response);
                timeline.response = Some(press);
            }
            if polled.quit {
                self.cancel.cancel();
                return Ok(Wait::Cancelled);
            }

            let remaining = self.clock.remaining(end);
            if remaining > 0.0 {
                self.clock
                    .pause(Duration::from_secs_f64(remaining.min(self.quantum)));
            }
        }

        if timeline.response.is_none() {
            self.triggers.emit(self.codes.timeout);
            self.codes_sent.push(self.codes.timeout);
            timeline.timeout_at = Some(self.clock.now());
        }
        Ok(Wait::Reached)
    }

    fn show_fixation(&mut self) -> Result<f64, PresentationError> {
        self.surface.prepare(Frame::Fixation)?;
        let code = self.codes.fixation;
        let triggers = &mut self.triggers;
        let codes_sent = &mut self.codes_sent;
        self.surface.commit(&mut || {
            if code != 0 {
                triggers.emit(code);
                codes_sent.push(code);
            }
        })?;
        Ok(self.clock.now())
    }

    /// Polls quit keys until `deadline`.
    fn wait_until(&mut self, deadline: f64) -> Result<Wait, InputError> {
        loop {
            if self.cancel.is_cancelled() {
                return Ok(Wait::Cancelled);
            }
            self.triggers.service();
            if self.collector.poll_quit(&mut self.input, &self.clock.reader())? {
                self.cancel.cancel();
                return Ok(Wait::Cancelled);
            }
            let remaining = self.clock.remaining(deadline);
            if remaining <= 0.0 {
                return Ok(Wait::Reached);
            }
            self.clock
                .pause(Duration::from_secs_f64(remaining.min(self.quantum)));
        }
    }

    /// Classifies the trial, appends its records and reports it.
    fn complete<P>(&mut self, trial: &TrialDescriptor<P>, timeline: Timeline, total: usize)
    where
        P: TrialPayload,
    {
        let onset_actual = timeline.onset_actual.unwrap_or(f64::NAN);
        let drift = onset_actual - trial.onset_goal;
        let drift_exceeded = drift.abs() > self.config.drift_tolerance;
        let response = timeline.response.as_ref().map(|p| Response {
            key: p.key.clone(),
            time_since_onset: p.time - onset_actual,
        });
        let status = match timeline.fault {
            Some(_) => TrialStatus::Aborted,
            None => trial.payload.classify(response.as_ref()),
        };
        if timeline.late_start {
            self.missed_deadlines += 1;
        }

        self.append_timeline(trial, &timeline);
        let result = TrialResult {
            index: trial.index,
            condition: trial.condition.clone(),
            onset_goal: trial.onset_goal,
            onset_actual,
            drift,
            drift_exceeded,
            trigger_codes_sent: std::mem::replace(&mut self.codes_sent, Vec::with_capacity(4)),
            response,
            status,
        };
        self.log.append(result.to_record(self.clock.now()));
        self.markers.send_message(&format!("RESP_{status}"));
        // The onset marker was only buffered during the flip.
        self.markers.flush();

        if let Some(fault) = &timeline.fault {
            warn!(trial = trial.index, error = %fault, "trial aborted");
        }
        if timeline.late_start {
            warn!(
                trial = trial.index,
                onset_goal = trial.onset_goal,
                "trial reached after its wake time"
            );
        }
        if drift_exceeded {
            warn!(
                trial = trial.index,
                drift_ms = drift * 1e3,
                tolerance_ms = self.config.drift_tolerance * 1e3,
                "onset drift beyond tolerance"
            );
        }
        let rt = result
            .response
            .as_ref()
            .map_or_else(|| "-".to_string(), |r| format!("{:.3} s", r.time_since_onset));
        info!(
            "Trial {}/{} | drift {:.1} ms | RT {} | {}",
            trial.index + 1,
            total,
            drift * 1e3,
            rt,
            status
        );

        self.results.push(result);
    }

    /// Appends the onset, offset and response records of whatever happened.
    fn append_timeline<P>(&mut self, trial: &TrialDescriptor<P>, timeline: &Timeline)
    where
        P: TrialPayload,
    {
        if let Some(t) = timeline.onset_actual {
            let mut record = EventRecord::new(event_type::STIM_ONSET, t)
                .for_trial(trial.index)
                .with("condition", trial.condition.clone())
                .with("onset_goal", trial.onset_goal)
                .with("code", trial.payload.trigger_code());
            trial.payload.describe(&mut record);
            self.log.append(record);
        }
        if let Some(t) = timeline.offset_actual {
            self.log
                .append(EventRecord::new(event_type::STIM_OFFSET, t).for_trial(trial.index));
        }
        if let (Some(press), Some(onset)) = (&timeline.response, timeline.onset_actual) {
            self.log.append(
                EventRecord::new(event_type::RESPONSE_GIVEN, press.time)
                    .for_trial(trial.index)
                    .with("key", press.key.to_string())
                    .with("rt", press.time - onset),
            );
        } else if let Some(t) = timeline.timeout_at {
            self.log
                .append(EventRecord::new(event_type::RESPONSE_TIMEOUT, t).for_trial(trial.index));
        }
    }

    fn cancelled(&mut self, trial: Option<usize>) {
        let mut record = EventRecord::new(event_type::SESSION_CANCELLED, self.clock.now());
        if let Some(i) = trial {
            record = record.for_trial(i);
        }
        self.log.append(record);
        warn!(trial = ?trial, completed = self.results.len(), "session cancelled");
        self.end_session();
    }

    fn end_session(&mut self) {
        if self.state == SessionState::Running {
            self.triggers.emit(self.codes.end);
            self.triggers.settle();
            self.markers
                .send_message(&format!("END_{}", self.task_name.to_uppercase()));
            self.markers.stop_recording();
        }
        self.markers.flush();
        self.state = SessionState::Finished;
    }
}
