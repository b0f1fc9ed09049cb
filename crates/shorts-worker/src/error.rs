//! Worker error types.

use thiserror::Error;

use shorts_media::MediaError;
use shorts_speech::SpeechError;

pub type WorkerResult<T> = Result<T, WorkerError>;

#[derive(Debug, Error)]
pub enum WorkerError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid manifest: {0}")]
    Manifest(String),

    #[error("Campaign cancelled")]
    Cancelled,

    #[error("Media error: {0}")]
    Media(#[from] MediaError),

    #[error("Speech error: {0}")]
    Speech(#[from] SpeechError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl WorkerError {
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    pub fn manifest(msg: impl Into<String>) -> Self {
        Self::Manifest(msg.into())
    }

    /// Whether the campaign stopped because cancellation was requested,
    /// whichever stage noticed it.
    pub fn is_cancelled(&self) -> bool {
        match self {
            WorkerError::Cancelled => true,
            WorkerError::Media(e) => e.is_cancelled(),
            WorkerError::Speech(SpeechError::Cancelled) => true,
            WorkerError::Speech(SpeechError::Media(e)) => e.is_cancelled(),
            _ => false,
        }
    }
}
