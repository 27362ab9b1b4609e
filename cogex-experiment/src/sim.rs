//! Deterministic collaborators driven by [`SimulatedTime`], for tests and
//! dry runs without a display or keyboard.

use crate::collector::InputSource;
use crate::error::{InputError, PresentationError};
use crate::surface::{Frame, PresentationSurface};
use cogex_core::{KeyPress, KeySet};
use cogex_timing::{ClockReader, SimulatedTime, TimeSource};
use std::collections::VecDeque;
use std::marker::PhantomData;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameKind {
    Stimulus,
    Fixation,
    Blank,
}

/// Surface whose flips happen at scripted times.
///
/// Each stimulus commit jumps time to the next scripted onset, or stays put
/// if that time has already passed. Without a script, commits land on the
/// next refresh boundary when a refresh rate is set and are instant otherwise.
#[derive(Debug)]
pub struct SimulatedSurface<C> {
    time: SimulatedTime,
    onsets: VecDeque<f64>,
    refresh_interval: Option<f64>,
    staged: FrameKind,
    flips: Vec<(f64, FrameKind)>,
    stimulus_commits: usize,
    fail_stimulus: Vec<usize>,
    _content: PhantomData<fn(&C)>,
}

impl<C> SimulatedSurface<C> {
    pub fn new(time: SimulatedTime) -> Self {
        Self {
            time,
            onsets: VecDeque::new(),
            refresh_interval: None,
            staged: FrameKind::Blank,
            flips: Vec::new(),
            stimulus_commits: 0,
            fail_stimulus: Vec::new(),
            _content: PhantomData,
        }
    }

    /// Source times at which successive stimulus flips happen.
    pub fn with_onsets(mut self, onsets: impl IntoIterator<Item = f64>) -> Self {
        self.push_onsets(onsets);
        self
    }

    pub fn push_onsets(&mut self, onsets: impl IntoIterator<Item = f64>) {
        self.onsets.extend(onsets);
    }

    pub fn with_refresh_rate(mut self, hz: f64) -> Self {
        self.refresh_interval = (hz > 0.0).then(|| 1.0 / hz);
        self
    }

    /// Makes the `n`th stimulus commit (zero-based) fail.
    pub fn failing_stimulus(mut self, n: usize) -> Self {
        self.fail_stimulus.push(n);
        self
    }

    /// Every flip so far as `(source time, kind)`.
    pub fn flips(&self) -> &[(f64, FrameKind)] {
        &self.flips
    }

    fn next_boundary(&self, now: f64) -> f64 {
        match self.refresh_interval {
            // A time within rounding of a boundary counts as on it.
            Some(ifi) => ((now / ifi + 1e-6).floor() + 1.0) * ifi,
            None => now,
        }
    }
}

impl<C> PresentationSurface for SimulatedSurface<C> {
    type Content = C;

    fn prepare(&mut self, frame: Frame<'_, C>) -> Result<(), PresentationError> {
        self.staged = match frame {
            Frame::Stimulus(_) => FrameKind::Stimulus,
            Frame::Fixation => FrameKind::Fixation,
            Frame::Blank => FrameKind::Blank,
        };
        Ok(())
    }

    fn commit(&mut self, on_flip: &mut dyn FnMut()) -> Result<(), PresentationError> {
        let now = self.time.now();
        let at = if self.staged == FrameKind::Stimulus {
            let n = self.stimulus_commits;
            self.stimulus_commits += 1;
            let scripted = self.onsets.pop_front();
            if self.fail_stimulus.contains(&n) {
                return Err(PresentationError::Render(format!("scripted failure on stimulus {n}")));
            }
            match scripted {
                Some(t) => t.max(now),
                None => self.next_boundary(now),
            }
        } else {
            self.next_boundary(now)
        };
        self.time.advance_to(at);
        on_flip();
        self.flips.push((self.time.now(), self.staged));
        Ok(())
    }
}

/// Keyboard replaying presses at scripted source times.
///
/// A press becomes visible once simulated time reaches it and is stamped with
/// its scripted time converted to the polling clock's frame.
#[derive(Debug, Clone)]
pub struct ScriptedInput {
    time: SimulatedTime,
    presses: VecDeque<(f64, String)>,
    fail_at: Option<f64>,
}

impl ScriptedInput {
    pub fn new(time: SimulatedTime) -> Self {
        Self {
            time,
            presses: VecDeque::new(),
            fail_at: None,
        }
    }

    /// Adds a press, keeping the script ordered by time.
    pub fn press(mut self, at: f64, key: &str) -> Self {
        self.push(at, key);
        self
    }

    pub fn push(&mut self, at: f64, key: &str) {
        let pos = self.presses.partition_point(|(t, _)| *t <= at);
        self.presses.insert(pos, (at, key.to_owned()));
    }

    /// Polls fail once simulated time reaches `at`.
    pub fn disconnect_at(mut self, at: f64) -> Self {
        self.fail_at = Some(at);
        self
    }

    pub fn pending(&self) -> usize {
        self.presses.len()
    }
}

impl InputSource for ScriptedInput {
    fn poll<T: TimeSource>(
        &mut self,
        allowed: &KeySet,
        clock: &ClockReader<'_, T>,
        out: &mut Vec<KeyPress>,
    ) -> Result<(), InputError> {
        let now = self.time.now();
        if self.fail_at.is_some_and(|t| now >= t) {
            return Err(InputError::Disconnected);
        }
        let offset = clock.now() - now;
        while let Some((at, _)) = self.presses.front() {
            if *at > now {
                break;
            }
            let Some((at, name)) = self.presses.pop_front() else {
                break;
            };
            if let Some(key) = allowed.get(&name) {
                out.push(KeyPress {
                    key: key.clone(),
                    time: at + offset,
                });
            }
        }
        Ok(())
    }

    fn clear(&mut self) {
        let now = self.time.now();
        while self.presses.front().is_some_and(|(at, _)| *at <= now) {
            self.presses.pop_front();
        }
    }
}
