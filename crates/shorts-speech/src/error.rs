//! Speech error types.

use shorts_media::MediaError;
use thiserror::Error;

pub type SpeechResult<T> = Result<T, SpeechError>;

#[derive(Debug, Error)]
pub enum SpeechError {
    #[error("Synthesis failed: {0}")]
    SynthesisFailed(String),

    #[error("Alignment failed: {0}")]
    AlignmentFailed(String),

    #[error("Speech service unavailable: {0}")]
    ServiceUnavailable(String),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Timeout after {0} seconds")]
    Timeout(u64),

    #[error("Operation cancelled")]
    Cancelled,

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Media error: {0}")]
    Media(#[from] MediaError),
}

impl SpeechError {
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            SpeechError::ServiceUnavailable(_) | SpeechError::Timeout(_) | SpeechError::Network(_)
        )
    }
}
