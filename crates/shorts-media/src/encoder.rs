//! Process-wide encoder choice with one-way hardware-to-software fallback.

use std::sync::RwLock;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{info, warn};

use shorts_models::{EncoderChoice, EncodingConfig};

use crate::command::FfmpegCommand;
use crate::error::{MediaError, MediaResult};
use crate::fs_utils::is_nonempty_file;
use crate::metrics;
use crate::probe::MediaProbe;

/// Characters of ffmpeg stderr kept in encode errors.
const STDERR_TAIL_CHARS: usize = 500;

/// Caches the detected encoder for the lifetime of the process.
///
/// Detection runs at most once per [`reset`](Self::reset). After a hardware
/// failure the registry switches to software and never switches back on
/// its own.
pub struct EncoderRegistry {
    encoding: EncodingConfig,
    state: RwLock<Option<EncoderChoice>>,
    detect_lock: Mutex<()>,
}

/// How an encode finished.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EncodeOutcome {
    /// Encoder that produced the output
    pub choice: EncoderChoice,
    /// Whether a hardware failure forced a software retry
    pub fell_back: bool,
}

impl EncoderRegistry {
    pub fn new(encoding: EncodingConfig) -> Self {
        Self {
            encoding,
            state: RwLock::new(None),
            detect_lock: Mutex::new(()),
        }
    }

    /// Registry with a fixed starting choice; detection is skipped.
    pub fn with_choice(encoding: EncodingConfig, choice: EncoderChoice) -> Self {
        Self {
            encoding,
            state: RwLock::new(Some(choice)),
            detect_lock: Mutex::new(()),
        }
    }

    pub fn encoding(&self) -> &EncodingConfig {
        &self.encoding
    }

    /// The cached choice, if detection already ran.
    pub fn cached(&self) -> Option<EncoderChoice> {
        *self.state.read().unwrap_or_else(|e| e.into_inner())
    }

    /// Current choice, detecting it on first use.
    pub async fn resolve(&self, probe: &MediaProbe) -> EncoderChoice {
        if let Some(choice) = self.cached() {
            return choice;
        }

        let _guard = self.detect_lock.lock().await;
        // Another task may have finished detection while we waited
        if let Some(choice) = self.cached() {
            return choice;
        }

        let choice = probe.detect_encoder(&self.encoding).await;
        let mut state = self.state.write().unwrap_or_else(|e| e.into_inner());
        // A concurrent hardware failure wins over a fresh detection
        let choice = match *state {
            Some(EncoderChoice::SoftwareFallback) => EncoderChoice::SoftwareFallback,
            _ => choice,
        };
        *state = Some(choice);
        info!("Encoder selected: {}", choice);
        choice
    }

    /// Record a hardware failure. Returns true if this call flipped the choice.
    pub fn mark_hardware_failed(&self) -> bool {
        let mut state = self.state.write().unwrap_or_else(|e| e.into_inner());
        let flipped = *state != Some(EncoderChoice::SoftwareFallback);
        *state = Some(EncoderChoice::SoftwareFallback);
        flipped
    }

    /// Forget the cached choice so the next [`resolve`](Self::resolve) re-detects.
    pub fn reset(&self) {
        *self.state.write().unwrap_or_else(|e| e.into_inner()) = None;
    }

    /// Run an encode with the current choice, retrying once in software if
    /// the hardware attempt fails.
    ///
    /// `build` must produce the full command for a given choice. An attempt
    /// only counts as successful if its output file exists and is non-empty.
    pub async fn encode_with_fallback<F>(
        &self,
        probe: &MediaProbe,
        stage: &str,
        timeout: Duration,
        build: F,
    ) -> MediaResult<EncodeOutcome>
    where
        F: Fn(EncoderChoice, &EncodingConfig) -> FfmpegCommand,
    {
        let choice = self.resolve(probe).await;

        match self.attempt(probe, choice, timeout, &build).await {
            Ok(()) => Ok(EncodeOutcome {
                choice,
                fell_back: false,
            }),
            Err(e) if choice.is_hardware() && !e.is_cancelled() => {
                warn!(
                    stage = stage,
                    "Hardware encode failed ({}), retrying with {}",
                    e,
                    self.encoding.software_codec
                );
                if self.mark_hardware_failed() {
                    metrics::record_encoder_fallback(stage);
                }

                self.attempt(probe, EncoderChoice::SoftwareFallback, timeout, &build)
                    .await?;
                Ok(EncodeOutcome {
                    choice: EncoderChoice::SoftwareFallback,
                    fell_back: true,
                })
            }
            Err(e) => Err(e),
        }
    }

    async fn attempt<F>(
        &self,
        probe: &MediaProbe,
        choice: EncoderChoice,
        timeout: Duration,
        build: &F,
    ) -> MediaResult<()>
    where
        F: Fn(EncoderChoice, &EncodingConfig) -> FfmpegCommand,
    {
        let cmd = build(choice, &self.encoding);
        let codec = self.encoding.codec(choice).to_string();

        let output = probe
            .runner()
            .run("ffmpeg", &cmd.build_args(), timeout)
            .await
            .map_err(|e| match e {
                MediaError::Timeout(_) | MediaError::ToolNotFound(_) => e,
                other => MediaError::encode_failed(&codec, other.to_string(), None, None),
            })?;

        if !output.success() {
            return Err(MediaError::encode_failed(
                codec,
                format!("ffmpeg exited with {:?}", output.exit_code),
                Some(output.stderr_tail(STDERR_TAIL_CHARS)),
                output.exit_code,
            ));
        }

        if !is_nonempty_file(cmd.output_path()).await {
            return Err(MediaError::encode_failed(
                codec,
                format!("no output written to {}", cmd.output_path().display()),
                Some(output.stderr_tail(STDERR_TAIL_CHARS)),
                output.exit_code,
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runner::{CommandOutput, MockCommandRunner};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn build_into(path: std::path::PathBuf) -> impl Fn(EncoderChoice, &EncodingConfig) -> FfmpegCommand {
        move |choice, enc| {
            FfmpegCommand::new(&path)
                .input_with(enc.input_args(choice), "in.mp4")
                .output_args(enc.video_args(choice))
        }
    }

    /// Runner whose encodes fail for `fail_codec` and write `out` otherwise.
    fn scripted_runner(fail_codec: &'static str, out: std::path::PathBuf) -> MockCommandRunner {
        let mut runner = MockCommandRunner::new();
        runner.expect_run().returning(move |_, args, _| {
            if args.iter().any(|a| a == fail_codec) {
                Ok(CommandOutput::failed(1, "OpenEncodeSessionEx failed"))
            } else {
                std::fs::write(&out, b"video").unwrap();
                Ok(CommandOutput::ok(Vec::new()))
            }
        });
        runner
    }

    #[tokio::test]
    async fn test_resolve_detects_once() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let mut runner = MockCommandRunner::new();
        runner.expect_run().returning(move |_, _, _| {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(CommandOutput::ok(Vec::new()))
        });

        let probe = MediaProbe::new(Arc::new(runner));
        let registry = EncoderRegistry::new(EncodingConfig::default());

        // Empty listing means no hardware encoder
        assert_eq!(registry.resolve(&probe).await, EncoderChoice::SoftwareFallback);
        assert_eq!(registry.resolve(&probe).await, EncoderChoice::SoftwareFallback);
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        registry.reset();
        assert_eq!(registry.cached(), None);
        registry.resolve(&probe).await;
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_mark_hardware_failed_is_one_way() {
        let registry = EncoderRegistry::with_choice(
            EncodingConfig::default(),
            EncoderChoice::HardwareAccelerated,
        );
        assert!(registry.mark_hardware_failed());
        assert!(!registry.mark_hardware_failed());
        assert_eq!(registry.cached(), Some(EncoderChoice::SoftwareFallback));
    }

    #[tokio::test]
    async fn test_hardware_failure_retries_in_software() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("out.mp4");

        let probe = MediaProbe::new(Arc::new(scripted_runner("h264_nvenc", out.clone())));
        let registry = EncoderRegistry::with_choice(
            EncodingConfig::default(),
            EncoderChoice::HardwareAccelerated,
        );

        let outcome = registry
            .encode_with_fallback(&probe, "test", Duration::from_secs(5), build_into(out))
            .await
            .unwrap();

        assert_eq!(outcome.choice, EncoderChoice::SoftwareFallback);
        assert!(outcome.fell_back);
        assert_eq!(registry.cached(), Some(EncoderChoice::SoftwareFallback));
    }

    #[tokio::test]
    async fn test_hardware_then_software_failure_tries_exactly_twice() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("out.mp4");

        let mut runner = MockCommandRunner::new();
        runner
            .expect_run()
            .times(2)
            .returning(|_, _, _| Ok(CommandOutput::failed(1, "encoder error")));

        let probe = MediaProbe::new(Arc::new(runner));
        let registry = EncoderRegistry::with_choice(
            EncodingConfig::default(),
            EncoderChoice::HardwareAccelerated,
        );

        let err = registry
            .encode_with_fallback(&probe, "test", Duration::from_secs(5), build_into(out))
            .await
            .unwrap_err();
        assert!(matches!(err, MediaError::EncodeFailed { ref encoder, .. } if encoder == "libx264"));
        assert_eq!(registry.cached(), Some(EncoderChoice::SoftwareFallback));
    }

    #[tokio::test]
    async fn test_software_failure_is_terminal() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("out.mp4");

        let probe = MediaProbe::new(Arc::new(scripted_runner("libx264", out.clone())));
        let registry = EncoderRegistry::with_choice(
            EncodingConfig::default(),
            EncoderChoice::SoftwareFallback,
        );

        let err = registry
            .encode_with_fallback(&probe, "test", Duration::from_secs(5), build_into(out))
            .await
            .unwrap_err();
        assert!(matches!(err, MediaError::EncodeFailed { ref encoder, .. } if encoder == "libx264"));
    }

    #[tokio::test]
    async fn test_success_without_output_is_failure() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("never-written.mp4");

        let mut runner = MockCommandRunner::new();
        runner
            .expect_run()
            .returning(|_, _, _| Ok(CommandOutput::ok(Vec::new())));

        let probe = MediaProbe::new(Arc::new(runner));
        let registry = EncoderRegistry::with_choice(
            EncodingConfig::default(),
            EncoderChoice::SoftwareFallback,
        );

        let err = registry
            .encode_with_fallback(&probe, "test", Duration::from_secs(5), build_into(out))
            .await
            .unwrap_err();
        assert!(matches!(err, MediaError::EncodeFailed { .. }));
    }
}
