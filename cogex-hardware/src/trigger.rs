use crate::config::ParallelPortConfig;
use crate::error::HardwareError;
use crate::parport::ParallelPort;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Something that can put an 8-bit code on a set of output lines.
pub trait TriggerSink {
    fn emit(&mut self, code: u8) -> Result<(), HardwareError>;

    /// Lowers all lines.
    fn reset(&mut self) -> Result<(), HardwareError>;
}

/// Accepts and discards every code.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullTriggerSink;

impl TriggerSink for NullTriggerSink {
    fn emit(&mut self, _code: u8) -> Result<(), HardwareError> {
        Ok(())
    }

    fn reset(&mut self) -> Result<(), HardwareError> {
        Ok(())
    }
}

/// Wraps a [`TriggerSink`] so callers never see hardware errors.
///
/// The first failure is logged and the dispatcher switches to dummy mode for
/// the rest of the session. Lines raised by [`emit`](Self::emit) are lowered
/// by [`service`](Self::service) once the pulse width has elapsed, so the
/// timing path never sleeps for a pulse.
pub struct TriggerDispatcher {
    sink: Option<Box<dyn TriggerSink>>,
    pulse_width: Duration,
    raised_at: Option<Instant>,
    emitted: usize,
}

impl TriggerDispatcher {
    pub fn new(sink: Box<dyn TriggerSink>, pulse_width: Duration) -> Self {
        Self {
            sink: Some(sink),
            pulse_width,
            raised_at: None,
            emitted: 0,
        }
    }

    pub fn dummy() -> Self {
        Self {
            sink: None,
            pulse_width: Duration::ZERO,
            raised_at: None,
            emitted: 0,
        }
    }

    /// Opens the configured port, or returns a dummy dispatcher when output is
    /// disabled or the device cannot be claimed.
    pub fn from_config(config: &ParallelPortConfig) -> Self {
        if !config.enabled {
            debug!("parallel port disabled, triggers run in dummy mode");
            return Self::dummy();
        }
        match ParallelPort::open(&config.device) {
            Ok(port) => {
                debug!(device = %config.device.display(), "parallel port claimed");
                Self::new(Box::new(port), config.pulse_width())
            }
            Err(e) => {
                warn!(error = %e, "parallel port unavailable, triggers run in dummy mode");
                Self::dummy()
            }
        }
    }

    pub fn is_dummy(&self) -> bool {
        self.sink.is_none()
    }

    /// Codes accepted by the real sink so far.
    pub fn emitted(&self) -> usize {
        self.emitted
    }

    pub fn pulse_width(&self) -> Duration {
        self.pulse_width
    }

    pub fn emit(&mut self, code: u8) {
        let Some(sink) = self.sink.as_mut() else {
            return;
        };
        match sink.emit(code) {
            Ok(()) => {
                self.emitted += 1;
                self.raised_at = if code == 0 { None } else { Some(Instant::now()) };
            }
            Err(e) => self.degrade(e),
        }
    }

    /// Lowers the lines if a pulse has been up for at least the pulse width.
    /// Cheap to call from any polling loop.
    pub fn service(&mut self) {
        if let Some(at) = self.raised_at {
            if at.elapsed() >= self.pulse_width {
                self.reset();
            }
        }
    }

    /// Blocks for whatever is left of the current pulse, then lowers the
    /// lines. For session teardown only, never inside a trial.
    pub fn settle(&mut self) {
        if let Some(at) = self.raised_at {
            let left = self.pulse_width.saturating_sub(at.elapsed());
            if !left.is_zero() {
                std::thread::sleep(left);
            }
            self.reset();
        }
    }

    pub fn pulse_pending(&self) -> bool {
        self.raised_at.is_some()
    }

    pub fn reset(&mut self) {
        self.raised_at = None;
        let Some(sink) = self.sink.as_mut() else {
            return;
        };
        if let Err(e) = sink.reset() {
            self.degrade(e);
        }
    }

    fn degrade(&mut self, e: HardwareError) {
        warn!(error = %e, "trigger output failed, continuing in dummy mode");
        self.sink = None;
        self.raised_at = None;
    }
}

impl Default for TriggerDispatcher {
    fn default() -> Self {
        Self::dummy()
    }
}

impl Drop for TriggerDispatcher {
    fn drop(&mut self) {
        if let Some(sink) = self.sink.as_mut() {
            let _ = sink.reset();
        }
    }
}

impl std::fmt::Debug for TriggerDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TriggerDispatcher")
            .field("dummy", &self.is_dummy())
            .field("pulse_width", &self.pulse_width)
            .field("emitted", &self.emitted)
            .finish()
    }
}
