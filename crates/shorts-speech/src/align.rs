//! Word-level alignment.
//!
//! The primary path posts narration audio to an alignment service running a
//! speech-to-text model with word timestamps enabled. When that fails the
//! engine falls back to [`uniform_slices`].

use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use reqwest::Client;
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;
use tracing::{debug, warn};

#[cfg(test)]
use mockall::automock;

use shorts_models::{normalize_words, WordTimestamp};

use crate::error::{SpeechError, SpeechResult};

/// Produces word timestamps for a narration file.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait WordAligner: Send + Sync {
    /// Align `audio` (whose transcript is `text`) into ordered words.
    async fn align(&self, audio: &Path, text: &str) -> SpeechResult<Vec<WordTimestamp>>;

    /// Whether the aligner can take requests right now.
    async fn is_available(&self) -> bool {
        true
    }
}

#[derive(Debug, Deserialize)]
struct RawWord {
    #[serde(alias = "text")]
    word: String,
    #[serde(alias = "start_sec")]
    start: f64,
    #[serde(alias = "end_sec")]
    end: f64,
}

#[derive(Debug, Deserialize)]
struct RawSegment {
    #[serde(default)]
    words: Vec<RawWord>,
}

#[derive(Debug, Deserialize)]
struct AlignResponse {
    #[serde(default)]
    words: Vec<RawWord>,
    #[serde(default)]
    segments: Vec<RawSegment>,
}

#[derive(Debug, Deserialize)]
struct HealthResponse {
    status: String,
}

/// Parse an alignment service reply. Accepts either a flat `words` list or
/// Whisper-style `segments[].words`.
pub fn parse_alignment(body: &[u8]) -> SpeechResult<Vec<WordTimestamp>> {
    let response: AlignResponse = serde_json::from_slice(body)?;

    let raw = if response.words.is_empty() {
        response
            .segments
            .into_iter()
            .flat_map(|s| s.words)
            .collect::<Vec<_>>()
    } else {
        response.words
    };

    let words = normalize_words(
        raw.into_iter()
            .map(|w| WordTimestamp::new(w.word, w.start, w.end))
            .collect(),
    );

    if words.is_empty() {
        return Err(SpeechError::AlignmentFailed(
            "alignment returned no words".to_string(),
        ));
    }
    Ok(words)
}

/// Client for the alignment service.
pub struct AlignmentServiceClient {
    http: Client,
    base_url: String,
    language: String,
    max_retries: u32,
}

impl AlignmentServiceClient {
    pub fn new(
        base_url: impl Into<String>,
        language: impl Into<String>,
        timeout: Duration,
        max_retries: u32,
    ) -> SpeechResult<Self> {
        let http = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(SpeechError::Network)?;

        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            language: language.into(),
            max_retries,
        })
    }

    /// Check if the alignment service is healthy.
    pub async fn health_check(&self) -> bool {
        let url = format!("{}/health", self.base_url);

        match self.http.get(&url).send().await {
            Ok(response) if response.status().is_success() => {
                match response.json::<HealthResponse>().await {
                    Ok(health) => health.status == "healthy" || health.status == "ok",
                    Err(_) => false,
                }
            }
            Ok(response) => {
                warn!("Alignment service health check failed: {}", response.status());
                false
            }
            Err(e) => {
                warn!("Alignment service health check error: {}", e);
                false
            }
        }
    }

    async fn post_once(&self, audio: &[u8], file_name: &str, text: &str) -> SpeechResult<Vec<u8>> {
        let url = format!("{}/align", self.base_url);

        let part = Part::bytes(audio.to_vec())
            .file_name(file_name.to_string())
            .mime_str("audio/mpeg")?;
        let form = Form::new()
            .part("file", part)
            .text("text", text.to_string())
            .text("language", self.language.clone())
            .text("word_timestamps", "true");

        let response = self
            .http
            .post(&url)
            .multipart(form)
            .send()
            .await
            .map_err(|e| {
                if e.is_connect() {
                    SpeechError::ServiceUnavailable(e.to_string())
                } else {
                    SpeechError::Network(e)
                }
            })?;

        let status = response.status();
        if status.is_server_error() {
            return Err(SpeechError::ServiceUnavailable(format!(
                "alignment service returned {}",
                status
            )));
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(SpeechError::AlignmentFailed(format!(
                "alignment service returned {}: {}",
                status, body
            )));
        }

        Ok(response.bytes().await?.to_vec())
    }
}

#[async_trait]
impl WordAligner for AlignmentServiceClient {
    async fn align(&self, audio: &Path, text: &str) -> SpeechResult<Vec<WordTimestamp>> {
        let bytes = tokio::fs::read(audio).await?;
        let file_name = audio
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "narration.mp3".to_string());

        debug!("Aligning {} ({} bytes)", audio.display(), bytes.len());

        let mut attempt = 0;
        let body = loop {
            match self.post_once(&bytes, &file_name, text).await {
                Ok(body) => break body,
                Err(e) if e.is_retryable() && attempt < self.max_retries => {
                    let delay = Duration::from_millis(500 * 2u64.pow(attempt));
                    warn!(
                        "Alignment request failed (attempt {}), retrying in {:?}: {}",
                        attempt + 1,
                        delay,
                        e
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        };

        parse_alignment(&body)
    }

    async fn is_available(&self) -> bool {
        self.health_check().await
    }
}

/// Partition `duration` into fixed-width pseudo-words `[word_0]`, `[word_1]`…
/// The last slice ends exactly at `duration`.
pub fn uniform_slices(duration: f64, width: f64) -> Vec<WordTimestamp> {
    if !duration.is_finite() || duration <= 0.0 {
        return Vec::new();
    }
    let width = if width.is_finite() && width > 0.0 { width } else { 0.3 };

    let count = (duration / width).ceil() as usize;
    let mut words = Vec::with_capacity(count);
    for i in 0..count {
        let start = round_millis(i as f64 * width);
        if start >= duration {
            break;
        }
        let end = round_millis(((i + 1) as f64 * width).min(duration));
        words.push(WordTimestamp::new(format!("[word_{}]", i), start, end));
    }
    words
}

fn round_millis(v: f64) -> f64 {
    (v * 1000.0).round() / 1000.0
}
