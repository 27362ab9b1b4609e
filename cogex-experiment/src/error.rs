use cogex_core::{PlanError, SessionState};
use std::path::PathBuf;
use thiserror::Error;

/// Failure reported by a presentation surface.
#[derive(Error, Debug)]
pub enum PresentationError {
    #[error("display surface lost: {0}")]
    SurfaceLost(String),

    #[error("frame could not be rendered: {0}")]
    Render(String),

    #[error("window closed")]
    Closed,
}

/// Failure reported by an input source.
#[derive(Error, Debug)]
pub enum InputError {
    #[error("input device disconnected")]
    Disconnected,

    #[error("input device failure: {0}")]
    Device(String),
}

#[derive(Error, Debug)]
pub enum LogError {
    #[error("failed to write event log: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to persist event log to {path}: {source}")]
    Persistence {
        path: PathBuf,
        #[source]
        source: std::io::Error,
        /// JSON-lines dump written next to `path`, if that succeeded.
        fallback: Option<PathBuf>,
    },
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("cannot read config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config JSON: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}

#[derive(Error, Debug)]
pub enum SessionError {
    #[error("session is {actual:?}, expected {expected:?}")]
    InvalidState {
        expected: SessionState,
        actual: SessionState,
    },

    #[error(transparent)]
    Presentation(#[from] PresentationError),

    #[error(transparent)]
    Input(#[from] InputError),

    #[error(transparent)]
    Log(#[from] LogError),

    #[error(transparent)]
    Plan(#[from] PlanError),
}
