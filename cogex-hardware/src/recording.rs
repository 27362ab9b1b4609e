//! In-memory sinks for dry runs and tests.

use crate::error::HardwareError;
use crate::marker::MarkerSink;
use crate::trigger::TriggerSink;
use std::cell::RefCell;
use std::rc::Rc;

/// Records every value written to the lines, including the lowering zeros.
#[derive(Debug, Default, Clone)]
pub struct RecordingTriggerSink {
    lines: Rc<RefCell<Vec<u8>>>,
    fail_after: Option<usize>,
}

impl RecordingTriggerSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Accepts `n` writes, then fails every call.
    pub fn failing_after(n: usize) -> Self {
        Self {
            lines: Rc::default(),
            fail_after: Some(n),
        }
    }

    /// Shared view of the written values; stays valid after the sink moves.
    pub fn lines(&self) -> Rc<RefCell<Vec<u8>>> {
        Rc::clone(&self.lines)
    }

    fn write(&mut self, code: u8) -> Result<(), HardwareError> {
        let mut lines = self.lines.borrow_mut();
        if self.fail_after.is_some_and(|n| lines.len() >= n) {
            return Err(HardwareError::Write {
                code,
                source: std::io::Error::other("recording sink exhausted"),
            });
        }
        lines.push(code);
        Ok(())
    }
}

impl TriggerSink for RecordingTriggerSink {
    fn emit(&mut self, code: u8) -> Result<(), HardwareError> {
        self.write(code)
    }

    fn reset(&mut self) -> Result<(), HardwareError> {
        self.write(0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MarkerCall {
    OpenDataFile(String),
    Message(String),
    StartRecording,
    StopRecording,
}

#[derive(Debug, Default, Clone)]
pub struct RecordingMarkerSink {
    calls: Rc<RefCell<Vec<MarkerCall>>>,
    fail: bool,
}

impl RecordingMarkerSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// A sink whose every call fails.
    pub fn broken() -> Self {
        Self {
            calls: Rc::default(),
            fail: true,
        }
    }

    pub fn calls(&self) -> Rc<RefCell<Vec<MarkerCall>>> {
        Rc::clone(&self.calls)
    }

    fn record(&mut self, call: MarkerCall) -> Result<(), HardwareError> {
        if self.fail {
            return Err(HardwareError::Marker("recording sink broken".into()));
        }
        self.calls.borrow_mut().push(call);
        Ok(())
    }
}

impl MarkerSink for RecordingMarkerSink {
    fn open_data_file(&mut self, name: &str) -> Result<(), HardwareError> {
        self.record(MarkerCall::OpenDataFile(name.to_owned()))
    }

    fn send_message(&mut self, text: &str) -> Result<(), HardwareError> {
        self.record(MarkerCall::Message(text.to_owned()))
    }

    fn start_recording(&mut self) -> Result<(), HardwareError> {
        self.record(MarkerCall::StartRecording)
    }

    fn stop_recording(&mut self) -> Result<(), HardwareError> {
        self.record(MarkerCall::StopRecording)
    }
}
