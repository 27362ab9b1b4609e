//! Trigger and marker outputs. Every device here may be absent: the
//! dispatchers fall back to dummy mode instead of failing a session.

pub mod config;
pub mod error;
pub mod marker;
pub mod parport;
pub mod recording;
pub mod trigger;

pub use config::{EyeTrackerConfig, HardwareConfig, ParallelPortConfig};
pub use error::HardwareError;
pub use marker::{edf_file_name, MarkerDispatcher, MarkerSink, NullMarkerSink, TextMarkerSink};
pub use parport::ParallelPort;
pub use recording::{MarkerCall, RecordingMarkerSink, RecordingTriggerSink};
pub use trigger::{NullTriggerSink, TriggerDispatcher, TriggerSink};
