//! Session clock, time sources and display timing measurement.

pub mod analysis;
pub mod clock;
pub mod frame;
pub mod sim;
pub mod timer;

pub use analysis::FlipReport;
pub use clock::{Clock, ClockReader};
pub use frame::{CalibrationStats, FrameTiming, FrameTimingConfig, FrameTimingEstimator};
pub use sim::SimulatedTime;
pub use timer::{HighPrecisionTimer, TimeSource};
