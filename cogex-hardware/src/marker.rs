use crate::error::HardwareError;
use std::fmt::Write as _;
use std::io::Write;
use std::time::Instant;
use tracing::warn;

/// Data files on the tracker host are limited to eight characters.
pub const MAX_DATA_FILE_NAME: usize = 8;

/// Text-message channel into an external recording device (an eye tracker).
pub trait MarkerSink {
    /// Opens the device-side data file. Sinks without files ignore it.
    fn open_data_file(&mut self, _name: &str) -> Result<(), HardwareError> {
        Ok(())
    }

    fn send_message(&mut self, text: &str) -> Result<(), HardwareError>;

    fn start_recording(&mut self) -> Result<(), HardwareError>;

    fn stop_recording(&mut self) -> Result<(), HardwareError>;

    /// Pushes buffered messages out to the device. Called between trials,
    /// never from the timed section.
    fn flush(&mut self) -> Result<(), HardwareError> {
        Ok(())
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct NullMarkerSink;

impl MarkerSink for NullMarkerSink {
    fn send_message(&mut self, _text: &str) -> Result<(), HardwareError> {
        Ok(())
    }

    fn start_recording(&mut self) -> Result<(), HardwareError> {
        Ok(())
    }

    fn stop_recording(&mut self) -> Result<(), HardwareError> {
        Ok(())
    }
}

/// Writes each marker as a `seconds<TAB>text` line, timed from sink creation.
/// Stands in for a tracker link when only a message file is wanted.
///
/// Lines are stamped when sent but held in memory until [`flush`](MarkerSink::flush),
/// so sending from a flip callback never touches the writer.
pub struct TextMarkerSink<W: Write> {
    writer: W,
    started: Instant,
    pending: String,
}

impl<W: Write> TextMarkerSink<W> {
    pub fn new(writer: W) -> Self {
        Self {
            writer,
            started: Instant::now(),
            pending: String::with_capacity(4096),
        }
    }

    /// Returns the writer. Lines not flushed yet are dropped.
    pub fn into_inner(self) -> W {
        self.writer
    }

    fn line(&mut self, parts: &[&str]) {
        let t = self.started.elapsed().as_secs_f64();
        let _ = write!(self.pending, "{t:.6}\t");
        for part in parts {
            self.pending.push_str(part);
        }
        self.pending.push('\n');
    }
}

impl<W: Write> MarkerSink for TextMarkerSink<W> {
    fn open_data_file(&mut self, name: &str) -> Result<(), HardwareError> {
        self.line(&["DATA_FILE ", name]);
        self.flush()
    }

    fn send_message(&mut self, text: &str) -> Result<(), HardwareError> {
        self.line(&[text]);
        Ok(())
    }

    fn start_recording(&mut self) -> Result<(), HardwareError> {
        self.line(&["RECORDING_START"]);
        Ok(())
    }

    fn stop_recording(&mut self) -> Result<(), HardwareError> {
        self.line(&["RECORDING_STOP"]);
        Ok(())
    }

    fn flush(&mut self) -> Result<(), HardwareError> {
        if self.pending.is_empty() {
            return Ok(());
        }
        self.writer
            .write_all(self.pending.as_bytes())
            .and_then(|_| self.writer.flush())
            .map_err(|e| HardwareError::Marker(e.to_string()))?;
        self.pending.clear();
        Ok(())
    }
}

/// Builds `{prefix}_{first three characters of participant}{session}`,
/// truncated to [`MAX_DATA_FILE_NAME`] characters.
pub fn edf_file_name(prefix: &str, participant: &str, session: &str) -> String {
    let short: String = participant.chars().take(3).collect();
    let name = format!("{prefix}_{short}{session}");
    if name.chars().count() > MAX_DATA_FILE_NAME {
        let truncated: String = name.chars().take(MAX_DATA_FILE_NAME).collect();
        warn!(original = %name, truncated = %truncated, "marker data file name truncated");
        truncated
    } else {
        name
    }
}

/// Forwards markers to a [`MarkerSink`], going quiet after the first failure.
pub struct MarkerDispatcher {
    sink: Option<Box<dyn MarkerSink>>,
}

impl MarkerDispatcher {
    pub fn new(sink: Box<dyn MarkerSink>) -> Self {
        Self { sink: Some(sink) }
    }

    pub fn disabled() -> Self {
        Self { sink: None }
    }

    pub fn is_active(&self) -> bool {
        self.sink.is_some()
    }

    pub fn open_data_file(&mut self, name: &str) {
        self.call(|s| s.open_data_file(name));
    }

    pub fn send_message(&mut self, text: &str) {
        self.call(|s| s.send_message(text));
    }

    pub fn start_recording(&mut self) {
        self.call(|s| s.start_recording());
    }

    pub fn stop_recording(&mut self) {
        self.call(|s| s.stop_recording());
    }

    pub fn flush(&mut self) {
        self.call(|s| s.flush());
    }

    fn call<F>(&mut self, f: F)
    where
        F: FnOnce(&mut dyn MarkerSink) -> Result<(), HardwareError>,
    {
        let Some(sink) = self.sink.as_mut() else {
            return;
        };
        if let Err(e) = f(sink.as_mut()) {
            warn!(error = %e, "marker output failed, markers disabled for this session");
            self.sink = None;
        }
    }
}

impl Drop for MarkerDispatcher {
    fn drop(&mut self) {
        if let Some(sink) = self.sink.as_mut() {
            if let Err(e) = sink.flush() {
                warn!(error = %e, "marker flush on teardown failed");
            }
        }
    }
}

impl Default for MarkerDispatcher {
    fn default() -> Self {
        Self::disabled()
    }
}

impl std::fmt::Debug for MarkerDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MarkerDispatcher")
            .field("active", &self.is_active())
            .finish()
    }
}
