use std::time::{Duration, Instant};

/// Below this, pauses spin instead of asking the OS to sleep.
const SPIN_THRESHOLD: Duration = Duration::from_micros(200);

/// Monotonic time source used by [`Clock`](crate::Clock).
pub trait TimeSource {
    /// Seconds since a fixed, arbitrary epoch. Never goes backwards.
    fn now(&self) -> f64;

    /// Yields for at most `max`. Implementations must not overshoot by more
    /// than the OS scheduling slack.
    fn pause(&self, max: Duration);
}

impl<T: TimeSource + ?Sized> TimeSource for &T {
    fn now(&self) -> f64 {
        (**self).now()
    }
    fn pause(&self, max: Duration) {
        (**self).pause(max)
    }
}

/// Wall-clock time source with platform-specific precise sleeps.
#[derive(Debug, Clone)]
pub struct HighPrecisionTimer {
    start: Instant,
}

impl TimeSource for HighPrecisionTimer {
    fn now(&self) -> f64 {
        self.start.elapsed().as_secs_f64()
    }

    fn pause(&self, max: Duration) {
        if max <= SPIN_THRESHOLD {
            self.spin(max);
        } else {
            self.high_precision_sleep(max);
        }
    }
}

impl HighPrecisionTimer {
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
        }
    }

    pub fn spin(&self, duration: Duration) {
        let until = Instant::now() + duration;
        while Instant::now() < until {
            std::hint::spin_loop();
        }
    }

    pub fn high_precision_sleep(&self, duration: Duration) {
        #[cfg(target_os = "linux")]
        self.linux_sleep(duration);
        #[cfg(not(target_os = "linux"))]
        std::thread::sleep(duration);
    }

    #[cfg(target_os = "linux")]
    fn linux_sleep(&self, duration: Duration) {
        use libc::{clock_nanosleep, timespec, CLOCK_MONOTONIC};

        let req = timespec {
            tv_sec: duration.as_secs() as libc::time_t,
            tv_nsec: duration.subsec_nanos() as libc::c_long,
        };

        // An interrupted sleep just returns early; the caller re-checks the clock.
        unsafe {
            clock_nanosleep(CLOCK_MONOTONIC, 0, &req, std::ptr::null_mut());
        }
    }
}

impl Default for HighPrecisionTimer {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn now_is_monotonic() {
        let t = HighPrecisionTimer::new();
        let a = t.now();
        t.pause(Duration::from_millis(2));
        let b = t.now();
        assert!(b > a);
        assert!(b - a >= 0.0015);
    }

    #[test]
    fn short_pause_spins() {
        let t = HighPrecisionTimer::new();
        let a = t.now();
        t.pause(Duration::from_micros(50));
        assert!(t.now() - a >= 50e-6);
    }
}
