// THEORY:
// Errors are split by the layer that produces them. Camera and recording
// failures come from external devices and are the only ones that can end a
// run or reject a command; configuration errors surface when the shell tries
// to enable a feature it has not configured. Everything that happens inside a
// processing cycle other than a frame read (sound, mail, writer append) is
// logged where it happens and never reaches these types.

use std::path::PathBuf;
use thiserror::Error;

/// Failures of the frame source.
#[derive(Debug, Error)]
pub enum CameraError {
    #[error("could not open camera {index}: {reason}")]
    Open { index: i32, reason: String },
    #[error("camera stream ended")]
    EndOfStream,
    #[error("frame capture failed: {0}")]
    Capture(String),
    #[error("camera is closed")]
    Closed,
}

/// Failures while opening, feeding or closing a video writer.
#[derive(Debug, Error)]
pub enum RecordingError {
    #[error("recording directory error: {0}")]
    Io(#[from] std::io::Error),
    #[error("video writer error for {path}: {reason}")]
    Writer { path: PathBuf, reason: String },
}

/// Incomplete or malformed configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing configuration value: {0}")]
    MissingField(&'static str),
    #[error("invalid mailbox address `{0}`")]
    InvalidAddress(String),
    #[error("invalid SMTP port {0}")]
    InvalidPort(u16),
}

/// Errors returned by the command surface of the detection controller.
#[derive(Debug, Error)]
pub enum SentryError {
    #[error("detection is not running")]
    NotRunning,
    #[error("detection is already running")]
    AlreadyRunning,
    #[error(transparent)]
    Camera(#[from] CameraError),
    #[error(transparent)]
    Recording(#[from] RecordingError),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("email alerts are not configured")]
    EmailUnavailable,
    #[error("{name} must be within {min}..={max}, got {value}")]
    InvalidParameter {
        name: &'static str,
        value: u32,
        min: u32,
        max: u32,
    },
    #[error("processing worker failed: {0}")]
    Worker(String),
}

pub type Result<T, E = SentryError> = std::result::Result<T, E>;
