//! Error types for clip editing, capture and playback

use std::path::PathBuf;
use thiserror::Error;

/// Errors surfaced by editor operations.
///
/// Every variant is recoverable: the session turns it into a status message
/// and leaves its state untouched.
#[derive(Debug, Error)]
pub enum ClipError {
    #[error("Invalid selection: {start:.3}s to {end:.3}s (clip is {duration:.3}s)")]
    InvalidRange { start: f64, end: f64, duration: f64 },

    #[error("Gain out of range: {0} dB")]
    InvalidGain(f64),

    #[error("Invalid cursor position: {0}")]
    InvalidPosition(f64),

    #[error("No audio loaded")]
    NoAudio,

    #[error("Please place start and end markers to select a region")]
    NoSelection,

    #[error("Cannot decode {path}: {reason}")]
    DecodeUnavailable { path: PathBuf, reason: String },

    #[error("Cannot encode {path}: {reason}")]
    EncodeUnavailable { path: PathBuf, reason: String },

    #[error("Playback unavailable: {0}")]
    PlayerUnavailable(String),

    #[error("Cursor cannot be moved during playback")]
    SeekWhilePlaying,

    #[error("No audio recorded")]
    NoFramesCaptured,

    #[error("Capture already running")]
    CaptureActive,

    #[error("Capture not running")]
    CaptureInactive,

    #[error("Capture device error: {0}")]
    CaptureDevice(String),

    #[error("Temp file error for {path}: {source}")]
    TempFileIo {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

pub type Result<T> = std::result::Result<T, ClipError>;

impl ClipError {
    pub(crate) fn decode(path: impl Into<PathBuf>, reason: impl ToString) -> Self {
        ClipError::DecodeUnavailable {
            path: path.into(),
            reason: reason.to_string(),
        }
    }

    pub(crate) fn encode(path: impl Into<PathBuf>, reason: impl ToString) -> Self {
        ClipError::EncodeUnavailable {
            path: path.into(),
            reason: reason.to_string(),
        }
    }
}
