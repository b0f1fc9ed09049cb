//! FFprobe media information and encoder detection.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use shorts_models::{EncoderChoice, EncodingConfig};

use crate::error::{MediaError, MediaResult};
use crate::runner::CommandRunner;

/// Default timeout for a single ffprobe call.
pub const DEFAULT_PROBE_TIMEOUT: Duration = Duration::from_secs(30);

/// Timeout for each encoder detection step.
const DETECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Frame rate assumed when the stream does not report one.
const DEFAULT_FRAME_RATE: f64 = 30.0;

/// Media file information.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MediaInfo {
    /// Width in pixels, 0 for audio-only files
    pub width: u32,
    /// Height in pixels, 0 for audio-only files
    pub height: u32,
    /// Duration in seconds
    pub duration_seconds: f64,
    /// Frame rate (fps)
    pub frame_rate: f64,
    pub has_video: bool,
    pub has_audio: bool,
    /// Primary codec (video if present, otherwise audio)
    pub codec_name: String,
    /// File size in bytes
    pub size_bytes: u64,
}

/// FFprobe JSON output format.
#[derive(Debug, Deserialize)]
struct FfprobeOutput {
    format: Option<FfprobeFormat>,
    #[serde(default)]
    streams: Vec<FfprobeStream>,
}

#[derive(Debug, Deserialize)]
struct FfprobeFormat {
    duration: Option<String>,
    size: Option<String>,
}

#[derive(Debug, Deserialize)]
struct FfprobeStream {
    codec_type: Option<String>,
    codec_name: Option<String>,
    width: Option<u32>,
    height: Option<u32>,
    r_frame_rate: Option<String>,
    avg_frame_rate: Option<String>,
    duration: Option<String>,
}

/// Parse `ffprobe -print_format json` output.
pub fn parse_probe_output(path: &Path, stdout: &[u8]) -> MediaResult<MediaInfo> {
    let probe: FfprobeOutput = serde_json::from_slice(stdout)
        .map_err(|e| MediaError::probe_failed(path, format!("unreadable ffprobe output: {}", e)))?;

    let video = probe
        .streams
        .iter()
        .find(|s| s.codec_type.as_deref() == Some("video"));
    let audio = probe
        .streams
        .iter()
        .find(|s| s.codec_type.as_deref() == Some("audio"));

    if video.is_none() && audio.is_none() {
        return Err(MediaError::probe_failed(path, "no audio or video stream"));
    }

    let format_duration = probe
        .format
        .as_ref()
        .and_then(|f| f.duration.as_deref())
        .and_then(|d| d.parse::<f64>().ok());
    let stream_duration = video
        .or(audio)
        .and_then(|s| s.duration.as_deref())
        .and_then(|d| d.parse::<f64>().ok());

    let duration_seconds = format_duration
        .or(stream_duration)
        .filter(|d| d.is_finite() && *d >= 0.0)
        .ok_or_else(|| MediaError::probe_failed(path, "missing duration"))?;

    let size_bytes = probe
        .format
        .as_ref()
        .and_then(|f| f.size.as_deref())
        .and_then(|s| s.parse::<u64>().ok())
        .unwrap_or(0);

    let frame_rate = video
        .and_then(|v| {
            v.r_frame_rate
                .as_deref()
                .and_then(parse_frame_rate)
                .or_else(|| v.avg_frame_rate.as_deref().and_then(parse_frame_rate))
        })
        .map(|fps| (fps * 100.0).round() / 100.0)
        .unwrap_or(DEFAULT_FRAME_RATE);

    Ok(MediaInfo {
        width: video.and_then(|v| v.width).unwrap_or(0),
        height: video.and_then(|v| v.height).unwrap_or(0),
        duration_seconds,
        frame_rate,
        has_video: video.is_some(),
        has_audio: audio.is_some(),
        codec_name: video
            .or(audio)
            .and_then(|s| s.codec_name.clone())
            .unwrap_or_default(),
        size_bytes,
    })
}

/// Parse frame rate string (e.g., "30/1" or "29.97").
pub fn parse_frame_rate(s: &str) -> Option<f64> {
    let rate = if let Some((num, den)) = s.split_once('/') {
        let num: f64 = num.trim().parse().ok()?;
        let den: f64 = den.trim().parse().ok()?;
        if den == 0.0 {
            return None;
        }
        num / den
    } else {
        s.trim().parse().ok()?
    };

    (rate.is_finite() && rate > 0.0).then_some(rate)
}

/// Wraps ffprobe/ffmpeg queries behind a [`CommandRunner`].
#[derive(Clone)]
pub struct MediaProbe {
    runner: Arc<dyn CommandRunner>,
    timeout: Duration,
}

impl MediaProbe {
    pub fn new(runner: Arc<dyn CommandRunner>) -> Self {
        Self {
            runner,
            timeout: DEFAULT_PROBE_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// The runner used for every tool invocation.
    pub fn runner(&self) -> &dyn CommandRunner {
        self.runner.as_ref()
    }

    pub fn shared_runner(&self) -> Arc<dyn CommandRunner> {
        Arc::clone(&self.runner)
    }

    /// Read dimensions, duration, frame rate and stream layout of a media file.
    pub async fn probe(&self, path: &Path) -> MediaResult<MediaInfo> {
        if !path.exists() {
            return Err(MediaError::FileNotFound(path.to_path_buf()));
        }

        let args = vec![
            "-v".to_string(),
            "quiet".to_string(),
            "-print_format".to_string(),
            "json".to_string(),
            "-show_format".to_string(),
            "-show_streams".to_string(),
            path.to_string_lossy().to_string(),
        ];

        let output = self.runner.run("ffprobe", &args, self.timeout).await?;
        if !output.success() {
            return Err(MediaError::probe_failed(
                path,
                format!(
                    "ffprobe exited with {:?}: {}",
                    output.exit_code,
                    output.stderr_tail(300)
                ),
            ));
        }

        parse_probe_output(path, &output.stdout)
    }

    /// Duration in seconds.
    pub async fn duration(&self, path: &Path) -> MediaResult<f64> {
        Ok(self.probe(path).await?.duration_seconds)
    }

    /// Decide whether the hardware encoder is usable on this machine.
    ///
    /// The codec must appear in `ffmpeg -encoders` and a one-frame encode
    /// must succeed. Any error selects the software encoder.
    pub async fn detect_encoder(&self, encoding: &EncodingConfig) -> EncoderChoice {
        let codec = &encoding.hardware_codec;

        let listing = self
            .runner
            .run(
                "ffmpeg",
                &["-hide_banner".to_string(), "-encoders".to_string()],
                DETECT_TIMEOUT,
            )
            .await;

        match listing {
            Ok(out) if out.success() && lists_encoder(&out.stdout_lossy(), codec) => {}
            Ok(_) => {
                info!("{} not listed by ffmpeg, using software encoder", codec);
                return EncoderChoice::SoftwareFallback;
            }
            Err(e) => {
                warn!("Encoder listing failed ({}), using software encoder", e);
                return EncoderChoice::SoftwareFallback;
            }
        }

        let smoke = vec![
            "-hide_banner".to_string(),
            "-v".to_string(),
            "error".to_string(),
            "-f".to_string(),
            "lavfi".to_string(),
            "-i".to_string(),
            "color=c=black:s=64x64:d=0.1".to_string(),
            "-c:v".to_string(),
            codec.clone(),
            "-frames:v".to_string(),
            "1".to_string(),
            "-f".to_string(),
            "null".to_string(),
            "-".to_string(),
        ];

        match self.runner.run("ffmpeg", &smoke, DETECT_TIMEOUT).await {
            Ok(out) if out.success() => {
                info!("Hardware encoder {} is usable", codec);
                EncoderChoice::HardwareAccelerated
            }
            Ok(out) => {
                debug!("Smoke encode stderr: {}", out.stderr_tail(300));
                warn!(
                    "{} is listed but cannot encode, using software encoder",
                    codec
                );
                EncoderChoice::SoftwareFallback
            }
            Err(e) => {
                warn!("Smoke encode with {} failed ({}), using software encoder", codec, e);
                EncoderChoice::SoftwareFallback
            }
        }
    }
}

/// Whether an `ffmpeg -encoders` listing contains `codec` as an encoder name.
fn lists_encoder(listing: &str, codec: &str) -> bool {
    listing
        .lines()
        .filter_map(|line| line.split_whitespace().nth(1))
        .any(|name| name == codec)
}
