use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum HardwareError {
    #[error("device {device} unavailable: {source}")]
    Unavailable {
        device: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("unsupported on this platform: {0}")]
    Unsupported(&'static str),

    #[error("failed to write code {code}: {source}")]
    Write {
        code: u8,
        #[source]
        source: std::io::Error,
    },

    #[error("marker sink failure: {0}")]
    Marker(String),
}
