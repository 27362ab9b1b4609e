use crate::timer::TimeSource;
use std::time::Duration;

/// Session clock: elapsed seconds since an origin fixed at trigger receipt.
///
/// Exactly one owner (the scheduler) holds a `Clock`. Everyone else gets a
/// [`ClockReader`] or plain `f64` seconds, neither of which can move the
/// origin.
#[derive(Debug)]
pub struct Clock<T: TimeSource> {
    source: T,
    origin: f64,
    anchored: bool,
}

impl<T: TimeSource> Clock<T> {
    /// Origin starts at construction; [`Clock::reset`] re-anchors it.
    pub fn new(source: T) -> Self {
        let origin = source.now();
        Self {
            source,
            origin,
            anchored: false,
        }
    }

    pub fn now(&self) -> f64 {
        self.source.now() - self.origin
    }

    /// Fixes the origin to the current instant. Returns the raw source time
    /// of the new origin.
    pub fn reset(&mut self) -> f64 {
        self.origin = self.source.now();
        self.anchored = true;
        self.origin
    }

    /// True once [`Clock::reset`] has run.
    pub fn is_anchored(&self) -> bool {
        self.anchored
    }

    /// Seconds left until `target`, clamped at zero.
    pub fn remaining(&self, target: f64) -> f64 {
        (target - self.now()).max(0.0)
    }

    pub fn pause(&self, max: Duration) {
        self.source.pause(max)
    }

    pub fn reader(&self) -> ClockReader<'_, T> {
        ClockReader {
            source: &self.source,
            origin: self.origin,
        }
    }
}

/// Read-only view of a [`Clock`] for collaborators that must stamp events
/// at the moment they observe them.
#[derive(Debug)]
pub struct ClockReader<'a, T: TimeSource> {
    source: &'a T,
    origin: f64,
}

impl<T: TimeSource> Clone for ClockReader<'_, T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T: TimeSource> Copy for ClockReader<'_, T> {}

impl<T: TimeSource> ClockReader<'_, T> {
    pub fn now(&self) -> f64 {
        self.source.now() - self.origin
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::SimulatedTime;

    #[test]
    fn reset_moves_origin() {
        let time = SimulatedTime::new();
        time.set(5.0);
        let mut clock = Clock::new(time.clone());
        time.advance(1.0);
        assert!((clock.now() - 1.0).abs() < 1e-12);
        assert!(!clock.is_anchored());

        clock.reset();
        assert!(clock.is_anchored());
        assert_eq!(clock.now(), 0.0);
        time.advance(0.25);
        assert!((clock.now() - 0.25).abs() < 1e-12);
    }

    #[test]
    fn reader_follows_clock() {
        let time = SimulatedTime::new();
        let mut clock = Clock::new(time.clone());
        time.advance(3.0);
        clock.reset();
        time.advance(0.4);
        let reader = clock.reader();
        assert!((reader.now() - 0.4).abs() < 1e-12);
    }

    #[test]
    fn remaining_clamps() {
        let time = SimulatedTime::new();
        let clock = Clock::new(time.clone());
        time.advance(2.0);
        assert_eq!(clock.remaining(1.0), 0.0);
        assert!((clock.remaining(2.5) - 0.5).abs() < 1e-12);
    }
}
