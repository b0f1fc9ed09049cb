//! Per-scene narration synthesis and word alignment.
//!
//! Scenes are enriched in place and always in their given order. No scene
//! failure aborts the campaign: synthesis falls back to a fixed duration of
//! silence and alignment falls back to uniform slicing, each reported as a
//! [`RenderWarning`].

use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::Semaphore;
use tracing::{debug, info, warn};

use shorts_media::metrics::{record_alignment, record_synthesis};
use shorts_media::{CancelToken, CommandRunner, MediaProbe};
use shorts_models::{
    sanitize_duration, AlignmentSource, CampaignId, RenderWarning, Scene, WordTimestamp,
};

use crate::align::{uniform_slices, AlignmentServiceClient, WordAligner};
use crate::config::{NarrationConfig, SynthesisBackend};
use crate::error::{SpeechError, SpeechResult};
use crate::synth::{EdgeTtsSynthesizer, SpeechSynthesizer, SsmlHttpSynthesizer, SynthesisRequest};

pub struct NarrationEngine {
    synthesizer: Arc<dyn SpeechSynthesizer>,
    aligner: Option<Arc<dyn WordAligner>>,
    probe: MediaProbe,
    config: NarrationConfig,
    /// Single permit: one synthesis batch talks to the TTS backend at a time.
    gate: Semaphore,
}

impl NarrationEngine {
    pub fn new(
        synthesizer: Arc<dyn SpeechSynthesizer>,
        probe: MediaProbe,
        config: NarrationConfig,
    ) -> Self {
        Self {
            synthesizer,
            aligner: None,
            probe,
            config,
            gate: Semaphore::new(1),
        }
    }

    pub fn with_aligner(mut self, aligner: Arc<dyn WordAligner>) -> Self {
        self.aligner = Some(aligner);
        self
    }

    /// Build the backends named by `config`. The probe's runner also drives
    /// `edge-tts`.
    pub fn from_config(config: NarrationConfig, probe: MediaProbe) -> SpeechResult<Self> {
        let synthesizer: Arc<dyn SpeechSynthesizer> = match &config.backend {
            SynthesisBackend::EdgeTts => {
                let runner: Arc<dyn CommandRunner> = probe.shared_runner();
                Arc::new(EdgeTtsSynthesizer::new(runner))
            }
            SynthesisBackend::SsmlHttp { endpoint } => {
                Arc::new(SsmlHttpSynthesizer::new(endpoint.clone(), config.max_retries)?)
            }
        };

        let aligner = match &config.alignment_url {
            Some(url) => Some(Arc::new(AlignmentServiceClient::new(
                url.clone(),
                config.alignment_language.clone(),
                config.alignment_timeout,
                config.max_retries,
            )?) as Arc<dyn WordAligner>),
            None => {
                info!("No alignment service configured, subtitles will use uniform slicing");
                None
            }
        };

        let mut engine = Self::new(synthesizer, probe, config);
        engine.aligner = aligner;
        Ok(engine)
    }

    pub fn config(&self) -> &NarrationConfig {
        &self.config
    }

    /// Where the narration for `scene` is written.
    pub fn scene_audio_path(&self, campaign_id: &CampaignId, scene: &Scene) -> PathBuf {
        self.config
            .audio_dir
            .join(format!("{}_scene{}.mp3", campaign_id.as_str(), scene.index))
    }

    /// Synthesize narration for every scene, filling in audio path and
    /// measured duration.
    ///
    /// Returns one warning per scene that ended up with fallback silence.
    /// Only cancellation or an unusable audio directory is an error.
    pub async fn synthesize_scenes(
        &self,
        campaign_id: &CampaignId,
        scenes: &mut [Scene],
        cancel: &CancelToken,
    ) -> SpeechResult<Vec<RenderWarning>> {
        let _permit = self
            .gate
            .acquire()
            .await
            .map_err(|_| SpeechError::SynthesisFailed("synthesis gate closed".to_string()))?;

        tokio::fs::create_dir_all(&self.config.audio_dir).await?;

        let fallback = self.config.fallback_duration_secs;
        let mut warnings = Vec::new();
        let mut called = false;

        for scene in scenes.iter_mut() {
            if cancel.is_cancelled() {
                return Err(SpeechError::Cancelled);
            }

            if !scene.has_text() {
                let duration = sanitize_duration(scene.requested_duration, fallback);
                info!(scene = scene.index, "Blank narration, using {:.2}s of silence", duration);
                apply_fallback(scene, duration);
                warnings.push(RenderWarning::SynthesisFallback {
                    scene_index: scene.index,
                    duration_sec: duration,
                });
                record_synthesis(true);
                continue;
            }

            if called && !self.config.inter_call_delay.is_zero() {
                tokio::time::sleep(self.config.inter_call_delay).await;
            }
            called = true;

            match self.synthesize_one(campaign_id, scene).await {
                Ok((path, duration)) => {
                    debug!(
                        scene = scene.index,
                        emotion = %scene.emotion,
                        "Narration {:.3}s at {}",
                        duration,
                        path.display()
                    );
                    scene.narration_audio_path = Some(path);
                    scene.measured_duration = Some(duration);
                    scene.synthesis_fallback = false;
                    record_synthesis(false);
                }
                Err(e) => {
                    let duration = sanitize_duration(
                        scene.measured_duration.or(scene.requested_duration),
                        fallback,
                    );
                    warn!(
                        scene = scene.index,
                        "Synthesis failed, using {:.2}s of silence: {}", duration, e
                    );
                    apply_fallback(scene, duration);
                    warnings.push(RenderWarning::SynthesisFallback {
                        scene_index: scene.index,
                        duration_sec: duration,
                    });
                    record_synthesis(true);
                }
            }
        }

        Ok(warnings)
    }

    async fn synthesize_one(
        &self,
        campaign_id: &CampaignId,
        scene: &Scene,
    ) -> SpeechResult<(PathBuf, f64)> {
        let output = self.scene_audio_path(campaign_id, scene);
        let request = SynthesisRequest {
            text: scene.text.clone(),
            voice: self.config.voice.clone(),
            locale: self.config.locale.clone(),
            prosody: scene.emotion.prosody(),
        };

        let timeout = self.config.synthesis_timeout;
        match tokio::time::timeout(timeout, self.synthesizer.synthesize(&request, &output, timeout))
            .await
        {
            Ok(result) => result?,
            Err(_) => {
                discard(&output).await;
                return Err(SpeechError::Timeout(timeout.as_secs()));
            }
        }

        let size = tokio::fs::metadata(&output)
            .await
            .map(|m| m.len())
            .unwrap_or(0);
        if size < self.config.min_audio_bytes {
            discard(&output).await;
            return Err(SpeechError::SynthesisFailed(format!(
                "audio file too small ({} bytes)",
                size
            )));
        }

        let duration = match self.probe.duration(&output).await {
            Ok(d) if d.is_finite() && d > 0.0 => d,
            Ok(d) => {
                discard(&output).await;
                return Err(SpeechError::SynthesisFailed(format!(
                    "narration has unusable duration {}",
                    d
                )));
            }
            Err(e) => {
                discard(&output).await;
                return Err(e.into());
            }
        };

        Ok((output, duration))
    }

    /// Word timestamps for one narration file.
    ///
    /// Uses the alignment model when configured; any failure, timeout or
    /// empty result falls back to uniform slicing over `duration`.
    pub async fn align_words(
        &self,
        audio: &Path,
        text: &str,
        duration: f64,
    ) -> (Vec<WordTimestamp>, AlignmentSource) {
        self.align_with(self.aligner.as_deref(), audio, text, duration)
            .await
    }

    async fn align_with(
        &self,
        aligner: Option<&dyn WordAligner>,
        audio: &Path,
        text: &str,
        duration: f64,
    ) -> (Vec<WordTimestamp>, AlignmentSource) {
        if let Some(aligner) = aligner {
            let timeout = self.config.alignment_timeout;
            match tokio::time::timeout(timeout, aligner.align(audio, text)).await {
                Ok(Ok(words)) if !words.is_empty() => {
                    record_alignment(false);
                    return (words, AlignmentSource::Model);
                }
                Ok(Ok(_)) => warn!("Alignment returned no words for {}", audio.display()),
                Ok(Err(e)) => warn!("Alignment failed for {}: {}", audio.display(), e),
                Err(_) => warn!(
                    "Alignment timed out after {}s for {}",
                    timeout.as_secs(),
                    audio.display()
                ),
            }
        }

        warn!(
            "Using uniform {:.1}s word slicing for {}",
            self.config.slice_width_secs,
            audio.display()
        );
        record_alignment(true);
        (
            uniform_slices(duration, self.config.slice_width_secs),
            AlignmentSource::UniformFallback,
        )
    }

    /// Fill in word timestamps for every scene with text.
    pub async fn align_scenes(
        &self,
        scenes: &mut [Scene],
        cancel: &CancelToken,
    ) -> SpeechResult<Vec<RenderWarning>> {
        let fallback = self.config.fallback_duration_secs;
        let mut warnings = Vec::new();

        // One health check per batch; an unhealthy service is skipped entirely
        let mut aligner = self.aligner.as_deref();
        if let Some(service) = aligner {
            if !service.is_available().await {
                warn!("Alignment service unavailable, slicing every scene uniformly");
                aligner = None;
            }
        }

        for scene in scenes.iter_mut() {
            if cancel.is_cancelled() {
                return Err(SpeechError::Cancelled);
            }

            if !scene.has_text() {
                scene.word_timestamps.clear();
                scene.alignment_source = None;
                continue;
            }

            let duration = scene.duration_or(fallback);
            let (words, source) = match &scene.narration_audio_path {
                Some(audio) => self.align_with(aligner, audio, &scene.text, duration).await,
                None => {
                    record_alignment(true);
                    (
                        uniform_slices(duration, self.config.slice_width_secs),
                        AlignmentSource::UniformFallback,
                    )
                }
            };

            if source.is_degraded() {
                warnings.push(RenderWarning::AlignmentFallback {
                    scene_index: scene.index,
                });
            }
            debug!(scene = scene.index, words = words.len(), "Aligned ({:?})", source);

            scene.word_timestamps = words;
            scene.alignment_source = Some(source);
        }

        Ok(warnings)
    }
}

fn apply_fallback(scene: &mut Scene, duration: f64) {
    scene.narration_audio_path = None;
    scene.measured_duration = Some(duration);
    scene.synthesis_fallback = true;
}

async fn discard(path: &Path) {
    if let Err(e) = tokio::fs::remove_file(path).await {
        if e.kind() != std::io::ErrorKind::NotFound {
            warn!("Failed to remove {}: {}", path.display(), e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::align::MockWordAligner;
    use crate::synth::MockSpeechSynthesizer;
    use async_trait::async_trait;
    use shorts_media::{cancel_pair, CommandOutput, MediaResult};
    use shorts_models::EmotionTag;
    use std::sync::Mutex;
    use std::time::Duration;

    /// ffprobe stand-in reporting a duration derived from the file name.
    struct DurationRunner;

    #[async_trait]
    impl CommandRunner for DurationRunner {
        async fn run(
            &self,
            _program: &str,
            args: &[String],
            _timeout: Duration,
        ) -> MediaResult<CommandOutput> {
            let path = args.last().cloned().unwrap_or_default();
            let duration = if path.ends_with("scene0.mp3") {
                "2.512"
            } else if path.ends_with("scene1.mp3") {
                "1.800"
            } else {
                "3.250"
            };
            Ok(CommandOutput::ok(format!(
                r#"{{"format":{{"duration":"{}","size":"4096"}},"streams":[{{"codec_type":"audio","codec_name":"mp3"}}]}}"#,
                duration
            )))
        }
    }

    fn config(dir: &Path) -> NarrationConfig {
        NarrationConfig {
            audio_dir: dir.to_path_buf(),
            inter_call_delay: Duration::ZERO,
            ..NarrationConfig::default()
        }
    }

    fn probe() -> MediaProbe {
        MediaProbe::new(Arc::new(DurationRunner))
    }

    fn writing_synth(size: usize) -> MockSpeechSynthesizer {
        let mut synth = MockSpeechSynthesizer::new();
        synth.expect_synthesize().returning(move |_, out, _| {
            std::fs::write(out, vec![0u8; size]).unwrap();
            Ok(())
        });
        synth
    }

    #[tokio::test]
    async fn test_synthesize_scenes_uses_emotion_prosody() {
        let dir = tempfile::tempdir().unwrap();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let seen_in = seen.clone();

        let mut synth = MockSpeechSynthesizer::new();
        synth
            .expect_synthesize()
            .times(3)
            .returning(move |req, out, _| {
                seen_in.lock().unwrap().push(req.prosody);
                std::fs::write(out, vec![0u8; 2048]).unwrap();
                Ok(())
            });

        let engine = NarrationEngine::new(Arc::new(synth), probe(), config(dir.path()));
        let mut scenes = vec![
            Scene::new(0, "first", EmotionTag::Excited),
            Scene::new(1, "second", EmotionTag::Friendly),
            Scene::new(2, "third", EmotionTag::Urgent),
        ];

        let warnings = engine
            .synthesize_scenes(&CampaignId::from_string("c1"), &mut scenes, &CancelToken::never())
            .await
            .unwrap();

        assert!(warnings.is_empty());
        assert_eq!(scenes[0].measured_duration, Some(2.512));
        assert_eq!(scenes[1].measured_duration, Some(1.8));
        assert_eq!(scenes[2].measured_duration, Some(3.25));
        assert!(scenes.iter().all(|s| !s.synthesis_fallback));
        assert_eq!(
            scenes[0].narration_audio_path.as_deref(),
            Some(dir.path().join("c1_scene0.mp3").as_path())
        );

        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 3);
        assert_ne!(seen[0], seen[1]);
        assert_ne!(seen[1], seen[2]);
        assert_eq!(seen[2], EmotionTag::Urgent.prosody());
    }

    #[tokio::test]
    async fn test_failed_synthesis_keeps_known_duration() {
        let dir = tempfile::tempdir().unwrap();
        let mut synth = MockSpeechSynthesizer::new();
        synth
            .expect_synthesize()
            .returning(|_, _, _| Err(SpeechError::SynthesisFailed("boom".to_string())));

        let engine = NarrationEngine::new(Arc::new(synth), probe(), config(dir.path()));
        let mut scenes = vec![
            Scene::new(0, "a", EmotionTag::Calm).with_requested_duration(4.0),
            Scene::new(1, "b", EmotionTag::Calm),
        ];

        let warnings = engine
            .synthesize_scenes(&CampaignId::from_string("c"), &mut scenes, &CancelToken::never())
            .await
            .unwrap();

        assert_eq!(scenes[0].measured_duration, Some(4.0));
        assert_eq!(scenes[1].measured_duration, Some(3.0));
        assert!(scenes.iter().all(|s| s.synthesis_fallback && s.narration_audio_path.is_none()));
        assert_eq!(
            warnings,
            vec![
                RenderWarning::SynthesisFallback { scene_index: 0, duration_sec: 4.0 },
                RenderWarning::SynthesisFallback { scene_index: 1, duration_sec: 3.0 },
            ]
        );
    }

    #[tokio::test]
    async fn test_tiny_audio_is_rejected_and_removed() {
        let dir = tempfile::tempdir().unwrap();
        let engine = NarrationEngine::new(Arc::new(writing_synth(100)), probe(), config(dir.path()));
        let mut scenes = vec![Scene::new(0, "short", EmotionTag::Hyped)];

        let warnings = engine
            .synthesize_scenes(&CampaignId::from_string("c"), &mut scenes, &CancelToken::never())
            .await
            .unwrap();

        assert_eq!(warnings.len(), 1);
        assert_eq!(scenes[0].measured_duration, Some(3.0));
        assert!(!dir.path().join("c_scene0.mp3").exists());
    }

    #[tokio::test]
    async fn test_blank_scene_skips_synthesis() {
        let dir = tempfile::tempdir().unwrap();
        let mut synth = MockSpeechSynthesizer::new();
        synth.expect_synthesize().times(1).returning(|_, out, _| {
            std::fs::write(out, vec![0u8; 1024]).unwrap();
            Ok(())
        });

        let engine = NarrationEngine::new(Arc::new(synth), probe(), config(dir.path()));
        let mut scenes = vec![
            Scene::new(0, "spoken", EmotionTag::Friendly),
            Scene::new(1, "   ", EmotionTag::Friendly).with_requested_duration(1.5),
        ];

        let warnings = engine
            .synthesize_scenes(&CampaignId::from_string("c"), &mut scenes, &CancelToken::never())
            .await
            .unwrap();

        assert_eq!(scenes[1].measured_duration, Some(1.5));
        assert!(scenes[1].synthesis_fallback);
        assert_eq!(
            warnings,
            vec![RenderWarning::SynthesisFallback { scene_index: 1, duration_sec: 1.5 }]
        );
    }

    #[tokio::test]
    async fn test_synthesis_stops_when_cancelled() {
        let dir = tempfile::tempdir().unwrap();
        let mut synth = MockSpeechSynthesizer::new();
        synth.expect_synthesize().never();

        let engine = NarrationEngine::new(Arc::new(synth), probe(), config(dir.path()));
        let (handle, token) = cancel_pair();
        handle.cancel();

        let mut scenes = vec![Scene::new(0, "a", EmotionTag::Calm)];
        let err = engine
            .synthesize_scenes(&CampaignId::from_string("c"), &mut scenes, &token)
            .await
            .unwrap_err();

        assert!(matches!(err, SpeechError::Cancelled));
        assert!(scenes[0].measured_duration.is_none());
    }

    #[tokio::test]
    async fn test_align_scenes_model_and_fallback() {
        let dir = tempfile::tempdir().unwrap();
        let mut aligner = MockWordAligner::new();
        aligner.expect_is_available().times(1).returning(|| true);
        aligner.expect_align().returning(|audio, _| {
            if audio.ends_with("good.mp3") {
                Ok(vec![
                    WordTimestamp::new("hello", 0.0, 0.4),
                    WordTimestamp::new("world", 0.4, 0.9),
                ])
            } else {
                Err(SpeechError::AlignmentFailed("model crashed".to_string()))
            }
        });

        let engine = NarrationEngine::new(Arc::new(writing_synth(1024)), probe(), config(dir.path()))
            .with_aligner(Arc::new(aligner));

        let mut good = Scene::new(0, "hello world", EmotionTag::Calm);
        good.narration_audio_path = Some(dir.path().join("good.mp3"));
        good.measured_duration = Some(0.9);

        let mut bad = Scene::new(1, "again", EmotionTag::Calm);
        bad.narration_audio_path = Some(dir.path().join("bad.mp3"));
        bad.measured_duration = Some(1.0);

        let silent = Scene::new(2, "no audio", EmotionTag::Calm);

        let mut scenes = vec![good, bad, silent];
        let warnings = engine
            .align_scenes(&mut scenes, &CancelToken::never())
            .await
            .unwrap();

        assert_eq!(scenes[0].alignment_source, Some(AlignmentSource::Model));
        assert_eq!(scenes[0].word_timestamps.len(), 2);

        assert_eq!(scenes[1].alignment_source, Some(AlignmentSource::UniformFallback));
        assert_eq!(scenes[1].word_timestamps.len(), 4);
        assert_eq!(scenes[1].word_timestamps.last().unwrap().end_sec, 1.0);

        // no audio: sliced over the 3.0s fallback
        assert_eq!(scenes[2].word_timestamps.len(), 10);
        assert!(scenes[2].alignment_degraded());

        assert_eq!(
            warnings,
            vec![
                RenderWarning::AlignmentFallback { scene_index: 1 },
                RenderWarning::AlignmentFallback { scene_index: 2 },
            ]
        );
    }

    #[tokio::test]
    async fn test_unavailable_aligner_is_never_called() {
        let dir = tempfile::tempdir().unwrap();
        let mut aligner = MockWordAligner::new();
        aligner.expect_is_available().times(1).returning(|| false);
        aligner.expect_align().never();

        let engine = NarrationEngine::new(Arc::new(writing_synth(1024)), probe(), config(dir.path()))
            .with_aligner(Arc::new(aligner));

        let mut scene = Scene::new(0, "hello world", EmotionTag::Calm);
        scene.narration_audio_path = Some(dir.path().join("good.mp3"));
        scene.measured_duration = Some(0.9);
        let mut scenes = vec![scene];

        let warnings = engine
            .align_scenes(&mut scenes, &CancelToken::never())
            .await
            .unwrap();

        assert_eq!(scenes[0].alignment_source, Some(AlignmentSource::UniformFallback));
        assert_eq!(scenes[0].word_timestamps.len(), 3);
        assert_eq!(warnings, vec![RenderWarning::AlignmentFallback { scene_index: 0 }]);
    }

    #[tokio::test]
    async fn test_align_words_without_service_slices() {
        let dir = tempfile::tempdir().unwrap();
        let engine = NarrationEngine::new(Arc::new(writing_synth(1024)), probe(), config(dir.path()));

        let (words, source) = engine
            .align_words(Path::new("/tmp/x.mp3"), "text", 0.6)
            .await;

        assert_eq!(source, AlignmentSource::UniformFallback);
        assert_eq!(words.len(), 2);
    }
}
