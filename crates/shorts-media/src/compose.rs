//! Final shorts composition: trim, concatenate, narrate, mix and burn in.
//!
//! Every intermediate file lives in a per-render temp directory that is
//! removed when [`ShortsComposer::render`] returns, on success or failure.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use shorts_models::{
    CampaignId, CampaignRenderResult, RenderWarning, Scene, SubtitleTrack,
    DEFAULT_FALLBACK_DURATION_SECS,
};

use crate::cancel::CancelToken;
use crate::command::{run_ffmpeg, FfmpegCommand};
use crate::encoder::{EncodeOutcome, EncoderRegistry};
use crate::error::{MediaError, MediaResult};
use crate::filters::{final_mix_graph, narration_concat_graph, segment_filter, MusicMix};
use crate::fs_utils::{file_size, is_nonempty_file, move_file, write_concat_list};
use crate::metrics;
use crate::probe::MediaProbe;
use crate::subtitle::write_ass;

/// Composition configuration.
#[derive(Debug, Clone)]
pub struct ComposeConfig {
    pub width: u32,
    pub height: u32,
    pub fps: u32,
    /// Hard ceiling on the final video length
    pub max_duration_secs: f64,
    /// Duration for scenes without a measured duration
    pub fallback_duration_secs: f64,
    /// Below this much remaining budget the sequence ends
    pub min_segment_secs: f64,
    /// Linear gain of the background music bed
    pub music_volume: f64,
    pub music_fade_in_secs: f64,
    pub music_fade_out_secs: f64,
    /// Directory receiving final videos
    pub output_dir: PathBuf,
    /// Parent of per-render temp directories
    pub work_dir: PathBuf,
    /// Timeout for one per-scene trim encode
    pub segment_timeout: Duration,
    /// Timeout for concat and audio steps
    pub assembly_timeout: Duration,
    /// Timeout for the final encode
    pub final_timeout: Duration,
}

impl Default for ComposeConfig {
    fn default() -> Self {
        Self {
            width: 1080,
            height: 1920,
            fps: 30,
            max_duration_secs: 59.0,
            fallback_duration_secs: DEFAULT_FALLBACK_DURATION_SECS,
            min_segment_secs: 0.5,
            music_volume: 0.08,
            music_fade_in_secs: 1.5,
            music_fade_out_secs: 2.0,
            output_dir: PathBuf::from("/tmp/shorts/output"),
            work_dir: std::env::temp_dir(),
            segment_timeout: Duration::from_secs(300),
            assembly_timeout: Duration::from_secs(300),
            final_timeout: Duration::from_secs(900),
        }
    }
}

impl ComposeConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        let d = Self::default();
        Self {
            width: env_or("TARGET_WIDTH", d.width),
            height: env_or("TARGET_HEIGHT", d.height),
            fps: env_or("COMPOSE_FPS", d.fps),
            max_duration_secs: env_or("COMPOSE_MAX_DURATION", d.max_duration_secs),
            fallback_duration_secs: env_or("FALLBACK_SCENE_DURATION", d.fallback_duration_secs),
            min_segment_secs: env_or("COMPOSE_MIN_SEGMENT", d.min_segment_secs),
            music_volume: env_or("COMPOSE_MUSIC_VOLUME", d.music_volume),
            music_fade_in_secs: env_or("COMPOSE_MUSIC_FADE_IN", d.music_fade_in_secs),
            music_fade_out_secs: env_or("COMPOSE_MUSIC_FADE_OUT", d.music_fade_out_secs),
            output_dir: std::env::var("SHORTS_OUTPUT_DIR")
                .map(PathBuf::from)
                .unwrap_or(d.output_dir),
            work_dir: std::env::var("SHORTS_WORK_DIR")
                .map(PathBuf::from)
                .unwrap_or(d.work_dir),
            segment_timeout: Duration::from_secs(env_or(
                "COMPOSE_SEGMENT_TIMEOUT",
                d.segment_timeout.as_secs(),
            )),
            assembly_timeout: Duration::from_secs(env_or(
                "COMPOSE_ASSEMBLY_TIMEOUT",
                d.assembly_timeout.as_secs(),
            )),
            final_timeout: Duration::from_secs(env_or(
                "COMPOSE_FINAL_TIMEOUT",
                d.final_timeout.as_secs(),
            )),
        }
    }

    fn music_mix(&self) -> MusicMix {
        MusicMix {
            volume: self.music_volume,
            fade_in_secs: self.music_fade_in_secs,
            fade_out_secs: self.music_fade_out_secs,
        }
    }
}

fn env_or<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(default)
}

/// One scene's slot on the final timeline.
#[derive(Debug, Clone, PartialEq)]
pub struct PlannedSegment {
    pub scene_index: u32,
    pub clip: PathBuf,
    pub narration: Option<PathBuf>,
    /// Seconds this scene occupies, after the ceiling is applied
    pub duration: f64,
}

/// Timeline after clip filtering and ceiling enforcement.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SegmentPlan {
    pub segments: Vec<PlannedSegment>,
    pub warnings: Vec<RenderWarning>,
    pub total_secs: f64,
}

/// Split scenes into those with a clip on disk and warnings for the rest.
pub fn usable_scenes(scenes: &[Scene]) -> (Vec<Scene>, Vec<RenderWarning>) {
    let mut usable = Vec::with_capacity(scenes.len());
    let mut warnings = Vec::new();

    for scene in scenes {
        match &scene.video_clip_path {
            Some(clip) if clip.exists() => usable.push(scene.clone()),
            _ => {
                warn!(scene = scene.index, "Scene has no laundered clip; dropping it");
                warnings.push(RenderWarning::SceneWithoutClip {
                    scene_index: scene.index,
                });
            }
        }
    }

    (usable, warnings)
}

/// Lay scenes end to end under the duration ceiling.
///
/// The scene that crosses the ceiling is shortened. Once the remaining budget
/// drops below `min_segment_secs` the sequence ends and every later scene is
/// reported as cut.
pub fn plan_segments(scenes: &[Scene], config: &ComposeConfig) -> SegmentPlan {
    let mut plan = SegmentPlan::default();
    let mut ended = false;

    for scene in scenes {
        let Some(clip) = scene.video_clip_path.clone() else {
            plan.warnings.push(RenderWarning::SceneWithoutClip {
                scene_index: scene.index,
            });
            continue;
        };

        let requested = scene.duration_or(config.fallback_duration_secs);
        let remaining = round_millis(config.max_duration_secs - plan.total_secs);

        if !ended && remaining < requested && remaining < config.min_segment_secs {
            ended = true;
        }
        if ended {
            warn!(scene = scene.index, "Scene cut by the duration ceiling");
            plan.warnings.push(RenderWarning::CutByCeiling {
                scene_index: scene.index,
            });
            continue;
        }

        let used = requested.min(remaining);
        if used < requested {
            warn!(
                scene = scene.index,
                "Scene truncated from {:.2}s to {:.2}s by the duration ceiling",
                requested,
                used
            );
            plan.warnings.push(RenderWarning::TruncatedByCeiling {
                scene_index: scene.index,
                requested_sec: requested,
                used_sec: used,
            });
        }

        plan.segments.push(PlannedSegment {
            scene_index: scene.index,
            clip,
            narration: scene.narration_audio_path.clone(),
            duration: used,
        });
        plan.total_secs = round_millis(plan.total_secs + used);
    }

    plan
}

fn round_millis(v: f64) -> f64 {
    (v * 1000.0).round() / 1000.0
}

/// Renders the final vertical video for a campaign.
pub struct ShortsComposer {
    probe: MediaProbe,
    registry: Arc<EncoderRegistry>,
    config: ComposeConfig,
}

impl ShortsComposer {
    pub fn new(probe: MediaProbe, registry: Arc<EncoderRegistry>, config: ComposeConfig) -> Self {
        Self {
            probe,
            registry,
            config,
        }
    }

    pub fn config(&self) -> &ComposeConfig {
        &self.config
    }

    /// Render scenes into `<output_dir>/<campaign>_shorts_final.mp4`.
    ///
    /// Scenes without a clip are dropped with a warning. Subtitle cue times
    /// are taken as-is, so the track should be composed from the scenes
    /// that survive [`usable_scenes`].
    pub async fn render(
        &self,
        campaign_id: &CampaignId,
        scenes: &[Scene],
        background_music: Option<&Path>,
        subtitles: Option<&SubtitleTrack>,
        cancel: &CancelToken,
    ) -> MediaResult<CampaignRenderResult> {
        let started = Instant::now();
        let result = self
            .render_inner(campaign_id, scenes, background_music, subtitles, cancel)
            .await;

        let warnings = result.as_ref().map(|r| r.warnings.len()).unwrap_or(0);
        metrics::record_render(result.is_ok(), started.elapsed().as_secs_f64(), warnings);
        result
    }

    async fn render_inner(
        &self,
        campaign_id: &CampaignId,
        scenes: &[Scene],
        background_music: Option<&Path>,
        subtitles: Option<&SubtitleTrack>,
        cancel: &CancelToken,
    ) -> MediaResult<CampaignRenderResult> {
        cancel.check()?;

        let (usable, mut warnings) = usable_scenes(scenes);
        let plan = plan_segments(&usable, &self.config);
        warnings.extend(plan.warnings.iter().cloned());

        if plan.segments.is_empty() {
            return Err(MediaError::no_usable_scenes(format!(
                "none of {} scenes has a laundered clip that fits the timeline",
                scenes.len()
            )));
        }

        info!(
            campaign = %campaign_id,
            "Rendering {} segments ({:.2}s)",
            plan.segments.len(),
            plan.total_secs
        );

        tokio::fs::create_dir_all(&self.config.work_dir).await?;
        let workspace = tempfile::Builder::new()
            .prefix(&format!("{}_render_", campaign_id))
            .tempdir_in(&self.config.work_dir)?;
        let work = workspace.path();

        let trimmed = self
            .trim_segments(&plan, work, &mut warnings, cancel)
            .await?;

        cancel.check()?;
        let video = self.concat_segments(&trimmed, work).await?;

        cancel.check()?;
        let narration = self.build_narration(&plan, work, &mut warnings).await?;

        let ass_path = match subtitles {
            Some(track) if !track.is_empty() => {
                let path = work.join("subtitles.ass");
                write_ass(track, &path).await?;
                Some(path)
            }
            _ => None,
        };

        let music = match background_music {
            Some(path) if path.exists() => Some(path),
            Some(path) => {
                warn!("Background music {} not found; rendering without it", path.display());
                None
            }
            None => None,
        };

        cancel.check()?;
        let final_tmp = work.join("final.mp4");
        let mix = self.config.music_mix();
        let graph = final_mix_graph(ass_path.as_deref(), music.map(|_| &mix), plan.total_secs);
        let total = plan.total_secs;

        let outcome = self
            .registry
            .encode_with_fallback(&self.probe, "final", self.config.final_timeout, |choice, enc| {
                let mut cmd = FfmpegCommand::new(&final_tmp)
                    .input_with(enc.input_args(choice), &video)
                    .input(&narration);
                if let Some(music) = music {
                    cmd = cmd.input_with(["-stream_loop", "-1"], music);
                }
                cmd.filter_complex(graph.clone())
                    .map("[vout]")
                    .map("[aout]")
                    .output_args(enc.video_args(choice))
                    .output_args(enc.audio_args())
                    .duration(total)
                    .faststart()
            })
            .await?;
        if outcome.fell_back {
            warnings.push(RenderWarning::EncoderFallback {
                stage: "final".to_string(),
            });
        }

        let final_path = self
            .config
            .output_dir
            .join(format!("{}_shorts_final.mp4", campaign_id));
        move_file(&final_tmp, &final_path).await?;

        let (duration_seconds, size_bytes) = match self.probe.probe(&final_path).await {
            Ok(info) => {
                let size = if info.size_bytes > 0 {
                    info.size_bytes
                } else {
                    file_size(&final_path).await
                };
                (info.duration_seconds, size)
            }
            Err(e) => {
                warn!("Could not probe final video ({}); reporting planned duration", e);
                (total, file_size(&final_path).await)
            }
        };

        info!(
            campaign = %campaign_id,
            path = %final_path.display(),
            "Rendered {:.2}s video ({} bytes, {} warnings)",
            duration_seconds,
            size_bytes,
            warnings.len()
        );

        Ok(CampaignRenderResult {
            final_video_path: final_path,
            duration_seconds,
            size_bytes,
            warnings,
        })
    }

    /// Trim, letterbox and pad each clip to exactly its slot duration.
    ///
    /// All segments end up from the same encoder, since the concat step
    /// copies streams. A hardware failure partway through re-trims the
    /// earlier segments in software.
    async fn trim_segments(
        &self,
        plan: &SegmentPlan,
        work: &Path,
        warnings: &mut Vec<RenderWarning>,
        cancel: &CancelToken,
    ) -> MediaResult<Vec<PathBuf>> {
        let mut trimmed = Vec::with_capacity(plan.segments.len());
        let mut encoders = Vec::with_capacity(plan.segments.len());

        for (i, segment) in plan.segments.iter().enumerate() {
            cancel.check()?;

            let out = work.join(format!("trim_{:03}.mp4", i));
            let outcome = self.trim_one(segment, &out).await?;

            if outcome.fell_back {
                warnings.push(RenderWarning::EncoderFallback {
                    stage: "trim".to_string(),
                });
            }
            trimmed.push(out);
            encoders.push(outcome.choice);
        }

        let last = encoders.last().copied();
        for (i, segment) in plan.segments.iter().enumerate() {
            if Some(encoders[i]) == last {
                continue;
            }
            cancel.check()?;
            warn!(
                scene = segment.scene_index,
                "Re-trimming segment {} so every segment shares one encoder",
                i
            );
            let outcome = self.trim_one(segment, &trimmed[i]).await?;
            encoders[i] = outcome.choice;
        }

        if encoders.windows(2).any(|w| w[0] != w[1]) {
            return Err(MediaError::ffmpeg_failed(
                "trimmed segments were produced by different encoders",
                None,
                None,
            ));
        }

        Ok(trimmed)
    }

    async fn trim_one(&self, segment: &PlannedSegment, out: &Path) -> MediaResult<EncodeOutcome> {
        // Clone the last frame long enough to cover any shortfall
        let filter = segment_filter(
            self.config.width,
            self.config.height,
            self.config.fps,
            segment.duration,
        );

        let started = Instant::now();
        let outcome = self
            .registry
            .encode_with_fallback(&self.probe, "trim", self.config.segment_timeout, |choice, enc| {
                FfmpegCommand::new(out)
                    .input_with(enc.input_args(choice), &segment.clip)
                    .video_filter(filter.clone())
                    .output_args(enc.video_args(choice))
                    .no_audio()
                    .duration(segment.duration)
            })
            .await?;
        metrics::record_ffmpeg("trim", started.elapsed().as_secs_f64());

        debug!(
            scene = segment.scene_index,
            encoder = %outcome.choice,
            "Trimmed clip to {:.3}s",
            segment.duration
        );
        Ok(outcome)
    }

    /// Join trimmed clips with the concat demuxer, without re-encoding.
    async fn concat_segments(&self, trimmed: &[PathBuf], work: &Path) -> MediaResult<PathBuf> {
        let list = work.join("clips.txt");
        write_concat_list(&list, trimmed).await?;

        let out = work.join("concat.mp4");
        let cmd = FfmpegCommand::new(&out).concat_list_input(&list).stream_copy();
        run_ffmpeg(self.probe.runner(), &cmd, self.config.assembly_timeout).await?;

        if !is_nonempty_file(&out).await {
            return Err(MediaError::ffmpeg_failed(
                "concat produced no output",
                None,
                None,
            ));
        }
        Ok(out)
    }

    /// One mono WAV with each scene's narration in its slot.
    ///
    /// Scenes without a narration file get generated silence.
    async fn build_narration(
        &self,
        plan: &SegmentPlan,
        work: &Path,
        warnings: &mut Vec<RenderWarning>,
    ) -> MediaResult<PathBuf> {
        let runner = self.probe.runner();
        let mut inputs = Vec::with_capacity(plan.segments.len());

        for (i, segment) in plan.segments.iter().enumerate() {
            if let Some(path) = &segment.narration {
                if is_nonempty_file(path).await {
                    inputs.push(path.clone());
                    continue;
                }
                warn!(
                    scene = segment.scene_index,
                    "Narration {} missing; using silence",
                    path.display()
                );
                warnings.push(RenderWarning::NarrationMissing {
                    scene_index: segment.scene_index,
                });
            }

            let silence = work.join(format!("silence_{:03}.wav", i));
            let cmd = FfmpegCommand::new(&silence)
                .lavfi_input("anullsrc=r=44100:cl=mono")
                .duration(segment.duration)
                .output_args(["-c:a", "pcm_s16le"]);
            run_ffmpeg(runner, &cmd, self.config.assembly_timeout).await?;
            inputs.push(silence);
        }

        let durations: Vec<f64> = plan.segments.iter().map(|s| s.duration).collect();
        let out = work.join("narration.wav");
        let mut cmd = FfmpegCommand::new(&out);
        for input in &inputs {
            cmd = cmd.input(input);
        }
        let cmd = cmd
            .filter_complex(narration_concat_graph(&durations))
            .map("[narration]")
            .output_args(["-ar", "44100", "-ac", "1", "-c:a", "pcm_s16le"]);
        run_ffmpeg(runner, &cmd, self.config.assembly_timeout).await?;

        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cancel::cancel_pair;
    use crate::runner::{CommandOutput, MockCommandRunner};
    use shorts_models::{EmotionTag, EncoderChoice, EncodingConfig};
    use std::sync::Mutex;
    use tempfile::TempDir;

    fn scene_with_clip(index: u32, duration: f64, clip: &Path) -> Scene {
        let mut s = Scene::new(index, format!("scene {}", index), EmotionTag::Calm).with_clip(clip);
        s.measured_duration = Some(duration);
        s
    }

    fn touch(dir: &TempDir, name: &str) -> PathBuf {
        let p = dir.path().join(name);
        std::fs::write(&p, b"data").unwrap();
        p
    }

    fn final_probe_json(duration: f64) -> Vec<u8> {
        format!(
            r#"{{"streams": [{{"codec_type": "video", "width": 1080, "height": 1920, "r_frame_rate": "30/1"}},
                {{"codec_type": "audio"}}], "format": {{"duration": "{}", "size": "4096"}}}}"#,
            duration
        )
        .into_bytes()
    }

    /// Fake toolchain: every ffmpeg call writes its output, ffprobe reports `duration`.
    fn fake_runner(duration: f64, calls: Arc<Mutex<Vec<Vec<String>>>>) -> MockCommandRunner {
        let mut runner = MockCommandRunner::new();
        runner.expect_run().returning(move |program, args, _| {
            if program == "ffprobe" {
                return Ok(CommandOutput::ok(final_probe_json(duration)));
            }
            calls.lock().unwrap().push(args.to_vec());
            std::fs::write(args.last().unwrap(), b"media").unwrap();
            Ok(CommandOutput::ok(Vec::new()))
        });
        runner
    }

    fn composer(runner: MockCommandRunner, dir: &TempDir, max: f64) -> ShortsComposer {
        let config = ComposeConfig {
            max_duration_secs: max,
            output_dir: dir.path().join("out"),
            work_dir: dir.path().join("work"),
            ..ComposeConfig::default()
        };
        let registry = Arc::new(EncoderRegistry::with_choice(
            EncodingConfig::default(),
            EncoderChoice::SoftwareFallback,
        ));
        ShortsComposer::new(MediaProbe::new(Arc::new(runner)), registry, config)
    }

    #[test]
    fn test_plan_truncates_last_clip_at_ceiling() {
        let dir = TempDir::new().unwrap();
        let clip = touch(&dir, "c.mp4");
        let scenes = vec![
            scene_with_clip(0, 4.0, &clip),
            scene_with_clip(1, 4.0, &clip),
            scene_with_clip(2, 4.0, &clip),
        ];
        let config = ComposeConfig {
            max_duration_secs: 10.0,
            ..ComposeConfig::default()
        };

        let plan = plan_segments(&scenes, &config);
        let durations: Vec<f64> = plan.segments.iter().map(|s| s.duration).collect();
        assert_eq!(durations, vec![4.0, 4.0, 2.0]);
        assert_eq!(plan.total_secs, 10.0);
        assert_eq!(
            plan.warnings,
            vec![RenderWarning::TruncatedByCeiling {
                scene_index: 2,
                requested_sec: 4.0,
                used_sec: 2.0
            }]
        );
    }

    #[test]
    fn test_plan_ends_when_budget_too_small() {
        let dir = TempDir::new().unwrap();
        let clip = touch(&dir, "c.mp4");
        let scenes = vec![
            scene_with_clip(0, 9.8, &clip),
            scene_with_clip(1, 3.0, &clip),
            scene_with_clip(2, 0.1, &clip),
        ];
        let config = ComposeConfig {
            max_duration_secs: 10.0,
            ..ComposeConfig::default()
        };

        let plan = plan_segments(&scenes, &config);
        assert_eq!(plan.segments.len(), 1);
        assert_eq!(
            plan.warnings,
            vec![
                RenderWarning::CutByCeiling { scene_index: 1 },
                RenderWarning::CutByCeiling { scene_index: 2 },
            ]
        );
    }

    #[test]
    fn test_plan_uses_fallback_for_unmeasured_scene() {
        let dir = TempDir::new().unwrap();
        let clip = touch(&dir, "c.mp4");
        let mut scene = scene_with_clip(0, 1.0, &clip);
        scene.measured_duration = Some(f64::NAN);

        let plan = plan_segments(&[scene], &ComposeConfig::default());
        assert_eq!(plan.segments[0].duration, DEFAULT_FALLBACK_DURATION_SECS);
    }

    #[test]
    fn test_usable_scenes_drops_missing_clips() {
        let dir = TempDir::new().unwrap();
        let clip = touch(&dir, "c.mp4");
        let scenes = vec![
            scene_with_clip(0, 1.0, &clip),
            Scene::new(1, "no clip", EmotionTag::Calm),
            scene_with_clip(2, 1.0, &dir.path().join("gone.mp4")),
        ];

        let (usable, warnings) = usable_scenes(&scenes);
        assert_eq!(usable.len(), 1);
        assert_eq!(warnings.len(), 2);
    }

    #[tokio::test]
    async fn test_render_without_usable_scenes_fails() {
        let dir = TempDir::new().unwrap();
        let c = composer(MockCommandRunner::new(), &dir, 59.0);
        let scenes = vec![Scene::new(0, "x", EmotionTag::Calm)];

        let err = c
            .render(&CampaignId::from_string("c1"), &scenes, None, None, &CancelToken::never())
            .await
            .unwrap_err();
        assert!(matches!(err, MediaError::NoUsableScenes(_)));
    }

    #[tokio::test]
    async fn test_render_full_campaign() {
        let dir = TempDir::new().unwrap();
        let clip = touch(&dir, "clip.mp4");
        let narration = touch(&dir, "n0.mp3");
        let music = touch(&dir, "bgm.mp3");

        let mut first = scene_with_clip(0, 4.0, &clip);
        first.narration_audio_path = Some(narration.clone());
        let scenes = vec![
            first,
            scene_with_clip(1, 4.0, &clip),
            scene_with_clip(2, 4.0, &clip),
        ];
        let track = crate::subtitle::SubtitleComposer::default()
            .compose(&scenes)
            .unwrap();

        let calls = Arc::new(Mutex::new(Vec::new()));
        let c = composer(fake_runner(10.0, Arc::clone(&calls)), &dir, 10.0);

        let result = c
            .render(
                &CampaignId::from_string("spring"),
                &scenes,
                Some(&music),
                Some(&track),
                &CancelToken::never(),
            )
            .await
            .unwrap();

        assert_eq!(result.final_video_path, dir.path().join("out/spring_shorts_final.mp4"));
        assert!(result.final_video_path.exists());
        assert_eq!(result.duration_seconds, 10.0);
        assert_eq!(result.size_bytes, 4096);
        assert!(result.is_degraded());
        assert!(result
            .warnings
            .contains(&RenderWarning::TruncatedByCeiling {
                scene_index: 2,
                requested_sec: 4.0,
                used_sec: 2.0
            }));

        let calls = calls.lock().unwrap();
        // 3 trims, concat, 2 silences, narration join, final
        assert_eq!(calls.len(), 8);

        let last_trim = calls[2].join(" ");
        assert!(last_trim.contains("-t 2.000"));
        assert!(last_trim.contains("-an"));

        let final_args = calls.last().unwrap().join(" ");
        assert!(final_args.contains("-stream_loop -1"));
        assert!(final_args.contains("ass='"));
        assert!(final_args.contains("amix=inputs=2"));
        assert!(final_args.contains("-t 10.000"));
        assert!(final_args.contains("-movflags +faststart"));

        // Temp workspace is gone
        let leftovers: Vec<_> = std::fs::read_dir(dir.path().join("work")).unwrap().collect();
        assert!(leftovers.is_empty());
    }

    #[tokio::test]
    async fn test_midway_hardware_failure_retrims_earlier_segments() {
        let dir = TempDir::new().unwrap();
        let clip = touch(&dir, "clip.mp4");
        let scenes = vec![
            scene_with_clip(0, 2.0, &clip),
            scene_with_clip(1, 2.0, &clip),
            scene_with_clip(2, 2.0, &clip),
        ];

        // (output file name, codec) for every encode, in call order
        let encodes: Arc<Mutex<Vec<(String, String)>>> = Arc::new(Mutex::new(Vec::new()));
        let log = Arc::clone(&encodes);
        let mut nvenc_calls = 0;
        let mut runner = MockCommandRunner::new();
        runner.expect_run().returning(move |program, args, _| {
            if program == "ffprobe" {
                return Ok(CommandOutput::ok(final_probe_json(6.0)));
            }
            let out = args.last().unwrap().clone();
            let name = Path::new(&out)
                .file_name()
                .unwrap()
                .to_string_lossy()
                .into_owned();
            let codec = if args.iter().any(|a| a == "h264_nvenc") {
                nvenc_calls += 1;
                if nvenc_calls > 1 {
                    return Ok(CommandOutput::failed(1, "OpenEncodeSessionEx failed"));
                }
                "h264_nvenc"
            } else if args.iter().any(|a| a == "libx264") {
                "libx264"
            } else {
                "copy"
            };
            log.lock().unwrap().push((name, codec.to_string()));
            std::fs::write(&out, b"media").unwrap();
            Ok(CommandOutput::ok(Vec::new()))
        });

        let config = ComposeConfig {
            output_dir: dir.path().join("out"),
            work_dir: dir.path().join("work"),
            ..ComposeConfig::default()
        };
        let registry = Arc::new(EncoderRegistry::with_choice(
            EncodingConfig::default(),
            EncoderChoice::HardwareAccelerated,
        ));
        let c = ShortsComposer::new(MediaProbe::new(Arc::new(runner)), registry, config);

        let result = c
            .render(&CampaignId::from_string("mixed"), &scenes, None, None, &CancelToken::never())
            .await
            .unwrap();

        let encodes = encodes.lock().unwrap();
        let concat_at = encodes
            .iter()
            .position(|(name, _)| name == "concat.mp4")
            .unwrap();
        for segment in ["trim_000.mp4", "trim_001.mp4", "trim_002.mp4"] {
            let last = encodes[..concat_at]
                .iter()
                .rev()
                .find(|(name, _)| name == segment)
                .unwrap();
            assert_eq!(last.1, "libx264", "{} was not re-encoded in software", segment);
        }
        assert_eq!(
            result
                .warnings
                .iter()
                .filter(|w| matches!(w, RenderWarning::EncoderFallback { .. }))
                .count(),
            1
        );
    }

    #[tokio::test]
    async fn test_render_cleans_up_on_failure() {
        let dir = TempDir::new().unwrap();
        let clip = touch(&dir, "clip.mp4");
        let scenes = vec![scene_with_clip(0, 2.0, &clip)];

        let mut runner = MockCommandRunner::new();
        runner.expect_run().returning(|_, args, _| {
            let out = args.last().unwrap();
            if out.ends_with("concat.mp4") {
                return Ok(CommandOutput::failed(1, "Invalid data found"));
            }
            std::fs::write(out, b"media").unwrap();
            Ok(CommandOutput::ok(Vec::new()))
        });

        let c = composer(runner, &dir, 59.0);
        let err = c
            .render(&CampaignId::from_string("c2"), &scenes, None, None, &CancelToken::never())
            .await
            .unwrap_err();
        assert!(matches!(err, MediaError::FfmpegFailed { .. }));

        let leftovers: Vec<_> = std::fs::read_dir(dir.path().join("work")).unwrap().collect();
        assert!(leftovers.is_empty());
    }

    #[tokio::test]
    async fn test_render_honours_cancellation() {
        let dir = TempDir::new().unwrap();
        let clip = touch(&dir, "clip.mp4");
        let scenes = vec![scene_with_clip(0, 2.0, &clip)];
        let (handle, token) = cancel_pair();
        handle.cancel();

        let c = composer(MockCommandRunner::new(), &dir, 59.0);
        let err = c
            .render(&CampaignId::from_string("c3"), &scenes, None, None, &token)
            .await
            .unwrap_err();
        assert!(err.is_cancelled());
    }
}
