use crate::timer::TimeSource;
use std::cell::Cell;
use std::rc::Rc;
use std::time::Duration;

/// Deterministic time source. `pause` advances time instead of sleeping.
///
/// Clones share the same timeline, so a simulated surface or input source can
/// move time forward alongside the clock that reads it.
#[derive(Debug, Clone, Default)]
pub struct SimulatedTime {
    now: Rc<Cell<f64>>,
}

impl SimulatedTime {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, t: f64) {
        self.now.set(t);
    }

    /// Moves time forward to `t`; never backwards.
    pub fn advance_to(&self, t: f64) {
        if t > self.now.get() {
            self.now.set(t);
        }
    }

    pub fn advance(&self, dt: f64) {
        self.now.set(self.now.get() + dt);
    }
}

impl TimeSource for SimulatedTime {
    fn now(&self) -> f64 {
        self.now.get()
    }

    /// Advances by `max`, and always by at least a nanosecond so polling
    /// loops make progress.
    fn pause(&self, max: Duration) {
        self.advance(max.as_secs_f64().max(1e-9));
    }
}
