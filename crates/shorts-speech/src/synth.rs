//! Speech synthesis backends.

use async_trait::async_trait;
use reqwest::Client;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

#[cfg(test)]
use mockall::automock;

use shorts_media::{CommandRunner, MediaError};
use shorts_models::ProsodyPreset;

use crate::error::{SpeechError, SpeechResult};
use crate::ssml::build_ssml;

/// Audio format requested from SSML endpoints.
pub const SSML_OUTPUT_FORMAT: &str = "audio-24khz-48kbitrate-mono-mp3";

/// One narration line to synthesize.
#[derive(Debug, Clone, PartialEq)]
pub struct SynthesisRequest {
    pub text: String,
    pub voice: String,
    pub locale: String,
    pub prosody: ProsodyPreset,
}

/// Turns text into an audio file.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait SpeechSynthesizer: Send + Sync {
    /// Write narration audio for `request` to `output`.
    async fn synthesize(
        &self,
        request: &SynthesisRequest,
        output: &Path,
        timeout: Duration,
    ) -> SpeechResult<()>;
}

/// Synthesizer driving the `edge-tts` command line tool.
pub struct EdgeTtsSynthesizer {
    runner: Arc<dyn CommandRunner>,
}

impl EdgeTtsSynthesizer {
    pub fn new(runner: Arc<dyn CommandRunner>) -> Self {
        Self { runner }
    }

    pub fn build_args(request: &SynthesisRequest, output: &Path) -> Vec<String> {
        vec![
            "--voice".to_string(),
            request.voice.clone(),
            format!("--rate={}", request.prosody.rate()),
            format!("--pitch={}", request.prosody.pitch()),
            format!("--volume={}", request.prosody.volume()),
            "--text".to_string(),
            request.text.trim().to_string(),
            "--write-media".to_string(),
            output.to_string_lossy().into_owned(),
        ]
    }
}

#[async_trait]
impl SpeechSynthesizer for EdgeTtsSynthesizer {
    async fn synthesize(
        &self,
        request: &SynthesisRequest,
        output: &Path,
        timeout: Duration,
    ) -> SpeechResult<()> {
        let args = Self::build_args(request, output);
        let result = self
            .runner
            .run("edge-tts", &args, timeout)
            .await
            .map_err(|e| match e {
                MediaError::Timeout(secs) => SpeechError::Timeout(secs),
                MediaError::ToolNotFound(tool) => {
                    SpeechError::ServiceUnavailable(format!("{} not installed", tool))
                }
                other => SpeechError::Media(other),
            })?;

        if !result.success() {
            return Err(SpeechError::SynthesisFailed(format!(
                "edge-tts exited with {:?}: {}",
                result.exit_code,
                result.stderr_tail(500)
            )));
        }

        Ok(())
    }
}

/// Synthesizer posting SSML documents to an HTTP endpoint that answers with
/// raw audio bytes.
pub struct SsmlHttpSynthesizer {
    http: Client,
    endpoint: String,
    max_retries: u32,
}

impl SsmlHttpSynthesizer {
    pub fn new(endpoint: impl Into<String>, max_retries: u32) -> SpeechResult<Self> {
        let http = Client::builder().build().map_err(SpeechError::Network)?;
        Ok(Self {
            http,
            endpoint: endpoint.into(),
            max_retries,
        })
    }

    async fn post_once(&self, ssml: &str, timeout: Duration) -> SpeechResult<Vec<u8>> {
        let response = self
            .http
            .post(&self.endpoint)
            .timeout(timeout)
            .header("Content-Type", "application/ssml+xml")
            .header("X-Microsoft-OutputFormat", SSML_OUTPUT_FORMAT)
            .body(ssml.to_string())
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    SpeechError::Timeout(timeout.as_secs())
                } else {
                    SpeechError::Network(e)
                }
            })?;

        let status = response.status();
        if status.is_server_error() || status.as_u16() == 429 {
            return Err(SpeechError::ServiceUnavailable(format!(
                "TTS endpoint returned {}",
                status
            )));
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(SpeechError::SynthesisFailed(format!(
                "TTS endpoint returned {}: {}",
                status, body
            )));
        }

        Ok(response.bytes().await?.to_vec())
    }
}

#[async_trait]
impl SpeechSynthesizer for SsmlHttpSynthesizer {
    async fn synthesize(
        &self,
        request: &SynthesisRequest,
        output: &Path,
        timeout: Duration,
    ) -> SpeechResult<()> {
        let ssml = build_ssml(&request.text, &request.voice, &request.locale, &request.prosody);
        debug!("Posting {} bytes of SSML to {}", ssml.len(), self.endpoint);

        let mut attempt = 0;
        let audio = loop {
            match self.post_once(&ssml, timeout).await {
                Ok(audio) => break audio,
                Err(e) if e.is_retryable() && attempt < self.max_retries => {
                    let delay = Duration::from_millis(500 * 2u64.pow(attempt));
                    warn!(
                        "TTS request failed (attempt {}), retrying in {:?}: {}",
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

        tokio::fs::write(output, &audio).await?;
        Ok(())
    }
}
