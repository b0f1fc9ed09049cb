//! Narration configuration.

use std::path::PathBuf;
use std::time::Duration;

use shorts_models::DEFAULT_FALLBACK_DURATION_SECS;

/// Which synthesis backend to use.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SynthesisBackend {
    /// The `edge-tts` command line tool
    EdgeTts,
    /// An HTTP endpoint accepting SSML
    SsmlHttp { endpoint: String },
}

/// Configuration for narration synthesis and alignment.
#[derive(Debug, Clone)]
pub struct NarrationConfig {
    pub backend: SynthesisBackend,
    /// Voice identity passed to the synthesizer
    pub voice: String,
    /// BCP-47 locale of the voice
    pub locale: String,
    /// Pause between consecutive synthesis calls
    pub inter_call_delay: Duration,
    /// Timeout for one synthesis call
    pub synthesis_timeout: Duration,
    /// Files smaller than this are treated as failed synthesis
    pub min_audio_bytes: u64,
    /// Duration assigned when synthesis fails
    pub fallback_duration_secs: f64,
    /// Directory for narration files
    pub audio_dir: PathBuf,
    /// Alignment service base URL; uniform slicing only when unset
    pub alignment_url: Option<String>,
    pub alignment_language: String,
    pub alignment_timeout: Duration,
    /// Width of one fallback pseudo-word
    pub slice_width_secs: f64,
    pub max_retries: u32,
}

impl Default for NarrationConfig {
    fn default() -> Self {
        Self {
            backend: SynthesisBackend::EdgeTts,
            voice: "ko-KR-SunHiNeural".to_string(),
            locale: "ko-KR".to_string(),
            inter_call_delay: Duration::from_millis(500),
            synthesis_timeout: Duration::from_secs(60),
            min_audio_bytes: 500,
            fallback_duration_secs: DEFAULT_FALLBACK_DURATION_SECS,
            audio_dir: PathBuf::from("/tmp/shorts/tts"),
            alignment_url: None,
            alignment_language: "ko".to_string(),
            alignment_timeout: Duration::from_secs(120),
            slice_width_secs: 0.3,
            max_retries: 2,
        }
    }
}

impl NarrationConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        let d = Self::default();
        Self {
            backend: match std::env::var("TTS_ENDPOINT") {
                Ok(endpoint) if !endpoint.trim().is_empty() => {
                    SynthesisBackend::SsmlHttp { endpoint }
                }
                _ => SynthesisBackend::EdgeTts,
            },
            voice: std::env::var("TTS_VOICE").unwrap_or(d.voice),
            locale: std::env::var("TTS_LOCALE").unwrap_or(d.locale),
            inter_call_delay: Duration::from_millis(
                std::env::var("TTS_DELAY_MS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(500),
            ),
            synthesis_timeout: Duration::from_secs(
                std::env::var("TTS_TIMEOUT")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(60),
            ),
            min_audio_bytes: std::env::var("TTS_MIN_AUDIO_BYTES")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(d.min_audio_bytes),
            fallback_duration_secs: std::env::var("FALLBACK_SCENE_DURATION")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(d.fallback_duration_secs),
            audio_dir: std::env::var("TTS_AUDIO_DIR")
                .map(PathBuf::from)
                .unwrap_or(d.audio_dir),
            alignment_url: std::env::var("ALIGNMENT_SERVICE_URL")
                .ok()
                .filter(|s| !s.trim().is_empty()),
            alignment_language: std::env::var("ALIGNMENT_LANGUAGE").unwrap_or(d.alignment_language),
            alignment_timeout: Duration::from_secs(
                std::env::var("ALIGNMENT_TIMEOUT")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(120),
            ),
            slice_width_secs: std::env::var("ALIGNMENT_SLICE_WIDTH")
                .ok()
                .and_then(|s| s.parse().ok())
                .filter(|w: &f64| *w > 0.0)
                .unwrap_or(d.slice_width_secs),
            max_retries: std::env::var("SPEECH_SERVICE_RETRIES")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(d.max_retries),
        }
    }
}
