use crate::error::InputError;
use cogex_core::{KeyPress, KeySet};
use cogex_timing::{ClockReader, TimeSource};

/// Keyboard-like device polled by the scheduler.
pub trait InputSource {
    /// Moves presses of keys in `allowed` observed since the last call into
    /// `out`, stamped with `clock` time at observation. Presses of other keys
    /// are discarded. Must not block.
    fn poll<T: TimeSource>(
        &mut self,
        allowed: &KeySet,
        clock: &ClockReader<'_, T>,
        out: &mut Vec<KeyPress>,
    ) -> Result<(), InputError>;

    /// Drops everything pressed so far.
    fn clear(&mut self);
}

/// What a single [`ResponseCollector::poll`] saw.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Polled {
    /// Newly accepted response. Reported once per trial.
    pub response: Option<KeyPress>,
    /// A quit key was pressed.
    pub quit: bool,
}

/// Per-trial response window with first-match-wins semantics.
///
/// Quit keys are always polled. Once a response has been accepted only quit
/// keys are polled, so later presses are discarded by the source.
#[derive(Debug)]
pub struct ResponseCollector {
    allowed: KeySet,
    quit: KeySet,
    buffer: Vec<KeyPress>,
    window_start: f64,
    deadline: f64,
    accepted: bool,
}

impl ResponseCollector {
    pub fn new(response_keys: &KeySet, quit_keys: &KeySet) -> Self {
        Self {
            allowed: response_keys.union(quit_keys),
            quit: quit_keys.clone(),
            buffer: Vec::with_capacity(16),
            window_start: 0.0,
            deadline: f64::NEG_INFINITY,
            accepted: false,
        }
    }

    pub fn quit_keys(&self) -> &KeySet {
        &self.quit
    }

    /// Opens a window `[start, deadline)` for a new trial.
    pub fn arm(&mut self, start: f64, deadline: f64) {
        self.window_start = start;
        self.deadline = deadline;
        self.accepted = false;
        self.buffer.clear();
    }

    pub fn has_response(&self) -> bool {
        self.accepted
    }

    pub fn poll<I, T>(&mut self, input: &mut I, clock: &ClockReader<'_, T>) -> Result<Polled, InputError>
    where
        I: InputSource,
        T: TimeSource,
    {
        let keys = if self.accepted { &self.quit } else { &self.allowed };
        input.poll(keys, clock, &mut self.buffer)?;

        let mut polled = Polled::default();
        for press in self.buffer.drain(..) {
            if self.quit.contains(&press.key) {
                polled.quit = true;
            } else if !self.accepted && press.time >= self.window_start && press.time < self.deadline {
                self.accepted = true;
                polled.response = Some(press);
            }
        }
        Ok(polled)
    }

    /// Quit-only poll used outside response windows.
    pub fn poll_quit<I, T>(&mut self, input: &mut I, clock: &ClockReader<'_, T>) -> Result<bool, InputError>
    where
        I: InputSource,
        T: TimeSource,
    {
        input.poll(&self.quit, clock, &mut self.buffer)?;
        let quit = self.buffer.iter().any(|p| self.quit.contains(&p.key));
        self.buffer.clear();
        Ok(quit)
    }
}
