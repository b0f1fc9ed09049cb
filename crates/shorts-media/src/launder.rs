//! Clip laundering: randomized crop, retime, sharpen and color shift.
//!
//! Each clip gets its own crop fraction and speed factor drawn from the
//! configured ranges, so two launders of the same source differ.

use futures::stream::{self, StreamExt};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

use shorts_models::EncoderChoice;

use crate::cancel::CancelToken;
use crate::command::FfmpegCommand;
use crate::encoder::EncoderRegistry;
use crate::error::{MediaError, MediaResult};
use crate::filters::{ColorGrade, CropRect, LaunderFilter};
use crate::metrics;
use crate::probe::{MediaInfo, MediaProbe};

/// Laundering configuration.
#[derive(Debug, Clone)]
pub struct LaunderConfig {
    /// Fraction of width/height trimmed, sampled from this range
    pub crop_fraction_min: f64,
    pub crop_fraction_max: f64,
    /// Playback speed multiplier, sampled from this range
    pub speed_min: f64,
    pub speed_max: f64,
    /// `unsharp` luma amount
    pub sharpen_amount: f64,
    pub contrast: f64,
    pub saturation: f64,
    pub brightness: f64,
    /// Output frame rate
    pub fps: u32,
    pub target_width: u32,
    pub target_height: u32,
    /// Directory for laundered clips
    pub output_dir: PathBuf,
    /// Timeout for one encode attempt
    pub encode_timeout: Duration,
    /// Clips laundered concurrently by `launder_all`
    pub max_parallel: usize,
}

impl Default for LaunderConfig {
    fn default() -> Self {
        Self {
            crop_fraction_min: 0.03,
            crop_fraction_max: 0.06,
            speed_min: 1.10,
            speed_max: 1.20,
            sharpen_amount: 1.0,
            contrast: 1.05,
            saturation: 1.10,
            brightness: 0.02,
            fps: 30,
            target_width: 1080,
            target_height: 1920,
            output_dir: PathBuf::from("/tmp/shorts/laundered"),
            encode_timeout: Duration::from_secs(600),
            max_parallel: 1,
        }
    }
}

impl LaunderConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        let d = Self::default();
        Self {
            crop_fraction_min: env_or("LAUNDER_CROP_MIN", d.crop_fraction_min),
            crop_fraction_max: env_or("LAUNDER_CROP_MAX", d.crop_fraction_max),
            speed_min: env_or("LAUNDER_SPEED_MIN", d.speed_min),
            speed_max: env_or("LAUNDER_SPEED_MAX", d.speed_max),
            sharpen_amount: env_or("LAUNDER_SHARPEN", d.sharpen_amount),
            contrast: env_or("LAUNDER_CONTRAST", d.contrast),
            saturation: env_or("LAUNDER_SATURATION", d.saturation),
            brightness: env_or("LAUNDER_BRIGHTNESS", d.brightness),
            fps: env_or("LAUNDER_FPS", d.fps),
            target_width: env_or("TARGET_WIDTH", d.target_width),
            target_height: env_or("TARGET_HEIGHT", d.target_height),
            output_dir: std::env::var("LAUNDER_OUTPUT_DIR")
                .map(PathBuf::from)
                .unwrap_or(d.output_dir),
            encode_timeout: Duration::from_secs(env_or(
                "LAUNDER_ENCODE_TIMEOUT",
                d.encode_timeout.as_secs(),
            )),
            max_parallel: env_or("LAUNDER_MAX_PARALLEL", d.max_parallel),
        }
    }

    /// Check ranges are ordered and within sane bounds.
    pub fn validate(&self) -> MediaResult<()> {
        if !(0.0..0.25).contains(&self.crop_fraction_min)
            || !(0.0..0.25).contains(&self.crop_fraction_max)
            || self.crop_fraction_min > self.crop_fraction_max
        {
            return Err(MediaError::InvalidConfig(format!(
                "crop range {}..{} must be ordered and below 0.25",
                self.crop_fraction_min, self.crop_fraction_max
            )));
        }
        if self.speed_min <= 0.0 || self.speed_min > self.speed_max || !self.speed_max.is_finite() {
            return Err(MediaError::InvalidConfig(format!(
                "speed range {}..{} must be positive and ordered",
                self.speed_min, self.speed_max
            )));
        }
        if self.target_width == 0 || self.target_height == 0 || self.fps == 0 {
            return Err(MediaError::InvalidConfig(
                "target resolution and fps must be non-zero".to_string(),
            ));
        }
        Ok(())
    }
}

fn env_or<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(default)
}

/// Randomized parameters for one launder run.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LaunderParams {
    pub crop_fraction: f64,
    pub speed_factor: f64,
}

impl LaunderParams {
    /// Duration of the laundered output for a source of `source_secs`.
    pub fn output_duration(&self, source_secs: f64) -> f64 {
        source_secs / self.speed_factor
    }
}

/// A successfully laundered clip.
#[derive(Debug, Clone)]
pub struct LaunderedClip {
    pub source: PathBuf,
    pub output: PathBuf,
    pub params: LaunderParams,
    pub source_info: MediaInfo,
    pub encoder: EncoderChoice,
    /// Hardware encode failed and software was used
    pub encoder_fell_back: bool,
}

/// A clip that could not be laundered.
#[derive(Debug, Clone)]
pub struct LaunderFailure {
    /// Position in the input list
    pub index: usize,
    pub source: PathBuf,
    pub reason: String,
}

/// Outcome of a batch launder.
#[derive(Debug, Clone, Default)]
pub struct LaunderReport {
    /// Successful clips, in input order
    pub outputs: Vec<LaunderedClip>,
    pub failures: Vec<LaunderFailure>,
    /// Inputs not attempted because cancellation was requested
    pub skipped: usize,
    pub cancelled: bool,
}

impl LaunderReport {
    pub fn output_paths(&self) -> Vec<PathBuf> {
        self.outputs.iter().map(|c| c.output.clone()).collect()
    }
}

/// Progress callback: `(current, total, source)`.
pub type LaunderProgressFn<'a> = dyn Fn(usize, usize, &Path) + Send + Sync + 'a;

/// Launders clips through FFmpeg with a cached encoder choice.
pub struct Launderer {
    probe: MediaProbe,
    registry: Arc<EncoderRegistry>,
    config: LaunderConfig,
    rng: Mutex<StdRng>,
}

impl Launderer {
    pub fn new(probe: MediaProbe, registry: Arc<EncoderRegistry>, config: LaunderConfig) -> Self {
        Self {
            probe,
            registry,
            config,
            rng: Mutex::new(StdRng::from_os_rng()),
        }
    }

    /// Use a fixed RNG seed so parameter draws are reproducible.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.rng = Mutex::new(StdRng::seed_from_u64(seed));
        self
    }

    pub fn config(&self) -> &LaunderConfig {
        &self.config
    }

    /// Draw crop fraction and speed factor from the configured ranges.
    pub fn sample_params(&self) -> LaunderParams {
        let mut rng = self.rng.lock().unwrap_or_else(|e| e.into_inner());
        let crop = sample(&mut rng, self.config.crop_fraction_min, self.config.crop_fraction_max);
        let speed = sample(&mut rng, self.config.speed_min, self.config.speed_max);

        LaunderParams {
            crop_fraction: round_within(
                crop,
                10_000.0,
                self.config.crop_fraction_min,
                self.config.crop_fraction_max,
            ),
            speed_factor: round_within(speed, 1000.0, self.config.speed_min, self.config.speed_max),
        }
    }

    /// Launder one clip.
    ///
    /// Writes `<stem>_laundered_<id>.mp4` into the output directory unless
    /// `output` is given. The result has no audio track.
    pub async fn launder(&self, source: &Path, output: Option<&Path>) -> MediaResult<LaunderedClip> {
        self.launder_sized(
            source,
            output,
            self.config.target_width,
            self.config.target_height,
        )
        .await
    }

    /// Launder one clip to an explicit target resolution.
    pub async fn launder_sized(
        &self,
        source: &Path,
        output: Option<&Path>,
        target_width: u32,
        target_height: u32,
    ) -> MediaResult<LaunderedClip> {
        let started = Instant::now();
        let result = self
            .launder_inner(source, output, target_width, target_height)
            .await;
        metrics::record_launder(result.is_ok(), started.elapsed().as_secs_f64());
        result
    }

    async fn launder_inner(
        &self,
        source: &Path,
        output: Option<&Path>,
        target_width: u32,
        target_height: u32,
    ) -> MediaResult<LaunderedClip> {
        if target_width == 0 || target_height == 0 {
            return Err(MediaError::InvalidConfig(format!(
                "target resolution {}x{} is empty",
                target_width, target_height
            )));
        }

        if !source.exists() {
            return Err(MediaError::FileNotFound(source.to_path_buf()));
        }

        let info = self.probe.probe(source).await?;
        if !info.has_video || info.width == 0 || info.height == 0 {
            return Err(MediaError::InvalidVideo(format!(
                "{} has no usable video stream",
                source.display()
            )));
        }

        let params = self.sample_params();
        let output = match output {
            Some(p) => p.to_path_buf(),
            None => self.default_output_path(source),
        };
        if let Some(parent) = output.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }

        let filter = LaunderFilter {
            crop: CropRect::inset(info.width, info.height, params.crop_fraction),
            target_width,
            target_height,
            speed_factor: params.speed_factor,
            sharpen_amount: self.config.sharpen_amount,
            color: ColorGrade {
                brightness: self.config.brightness,
                contrast: self.config.contrast,
                saturation: self.config.saturation,
            },
            fps: self.config.fps,
        }
        .build();

        debug!(
            source = %source.display(),
            crop = params.crop_fraction,
            speed = params.speed_factor,
            "Laundering clip"
        );

        let encoded = self
            .registry
            .encode_with_fallback(&self.probe, "launder", self.config.encode_timeout, |choice, enc| {
                FfmpegCommand::new(&output)
                    .input_with(enc.input_args(choice), source)
                    .video_filter(filter.clone())
                    .output_args(enc.video_args(choice))
                    .no_audio()
                    .faststart()
            })
            .await;

        let outcome = match encoded {
            Ok(outcome) => outcome,
            Err(e) => {
                // Partial output from a failed attempt
                let _ = tokio::fs::remove_file(&output).await;
                return Err(e);
            }
        };

        info!(
            source = %source.display(),
            output = %output.display(),
            encoder = %outcome.choice,
            "Laundered clip ({}x{} -> {}x{}, speed {:.3})",
            info.width,
            info.height,
            target_width,
            target_height,
            params.speed_factor
        );

        Ok(LaunderedClip {
            source: source.to_path_buf(),
            output,
            params,
            source_info: info,
            encoder: outcome.choice,
            encoder_fell_back: outcome.fell_back,
        })
    }

    /// Launder every source, keeping input order in the report.
    ///
    /// Per-clip failures are collected, never propagated. Cancellation is
    /// checked before each clip starts.
    pub async fn launder_all(
        &self,
        sources: &[PathBuf],
        progress: Option<&LaunderProgressFn<'_>>,
        cancel: &CancelToken,
    ) -> LaunderReport {
        let total = sources.len();
        let done = AtomicUsize::new(0);
        let done = &done;

        let results: Vec<(usize, &PathBuf, Option<MediaResult<LaunderedClip>>)> =
            stream::iter(sources.iter().enumerate())
                .map(|(index, source)| async move {
                    if cancel.is_cancelled() {
                        return (index, source, None);
                    }

                    let result = self.launder(source, None).await;
                    let current = done.fetch_add(1, Ordering::SeqCst) + 1;
                    if let Some(callback) = progress {
                        notify_progress(callback, current, total, source);
                    }
                    (index, source, Some(result))
                })
                .buffered(self.config.max_parallel.max(1))
                .collect()
                .await;

        let mut report = LaunderReport::default();
        for (index, source, result) in results {
            match result {
                Some(Ok(clip)) => report.outputs.push(clip),
                Some(Err(e)) => {
                    error!(source = %source.display(), "Launder failed: {}", e);
                    report.failures.push(LaunderFailure {
                        index,
                        source: source.clone(),
                        reason: e.to_string(),
                    });
                }
                None => report.skipped += 1,
            }
        }
        report.cancelled = report.skipped > 0;

        info!(
            "Laundered {}/{} clips ({} failed, {} skipped)",
            report.outputs.len(),
            total,
            report.failures.len(),
            report.skipped
        );
        report
    }

    fn default_output_path(&self, source: &Path) -> PathBuf {
        let stem = source
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_else(|| "clip".to_string());
        let id = uuid::Uuid::new_v4().simple().to_string();
        self.config
            .output_dir
            .join(format!("{}_laundered_{}.mp4", stem, &id[..6]))
    }
}

fn sample(rng: &mut StdRng, min: f64, max: f64) -> f64 {
    if max > min {
        rng.random_range(min..=max)
    } else {
        min
    }
}

/// Round to `1/scale` steps without leaving `[min, max]`.
fn round_within(value: f64, scale: f64, min: f64, max: f64) -> f64 {
    let rounded = (value * scale).round() / scale;
    if max > min {
        rounded.clamp(min, max)
    } else {
        min
    }
}

fn notify_progress(callback: &LaunderProgressFn<'_>, current: usize, total: usize, source: &Path) {
    if catch_unwind(AssertUnwindSafe(|| callback(current, total, source))).is_err() {
        warn!("Launder progress callback panicked; continuing");
    }
}
