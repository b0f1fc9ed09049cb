//! End-to-end campaign rendering.
//!
//! Stages run strictly in order: launder source clips, synthesize narration,
//! align words, compose subtitles, render. Every recovered problem along the
//! way ends up in the result's warning list.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, warn, Instrument};

use shorts_media::{
    usable_scenes, CancelToken, CommandRunner, EncoderRegistry, LaunderProgressFn, LaunderReport,
    Launderer, MediaError, MediaProbe, ShortsComposer, SubtitleComposer,
};
use shorts_models::{CampaignManifest, CampaignRenderResult, RenderWarning, Scene, SubtitleTrack};
use shorts_speech::NarrationEngine;

use crate::config::ShortsConfig;
use crate::error::{WorkerError, WorkerResult};
use crate::logging::CampaignLogger;

/// Wires every stage of a campaign render around one shared encoder registry.
pub struct CampaignPipeline {
    config: ShortsConfig,
    probe: MediaProbe,
    registry: Arc<EncoderRegistry>,
    launderer: Launderer,
    narration: NarrationEngine,
    subtitles: SubtitleComposer,
    composer: ShortsComposer,
}

impl CampaignPipeline {
    pub fn new(config: ShortsConfig, runner: Arc<dyn CommandRunner>) -> WorkerResult<Self> {
        config.validate()?;

        let probe = MediaProbe::new(runner);
        let registry = Arc::new(match config.initial_encoder() {
            Some(choice) => EncoderRegistry::with_choice(config.encoding.clone(), choice),
            None => EncoderRegistry::new(config.encoding.clone()),
        });

        let launderer = Launderer::new(probe.clone(), Arc::clone(&registry), config.launder.clone());
        let narration = NarrationEngine::from_config(config.narration.clone(), probe.clone())?;
        let subtitles = SubtitleComposer::new(config.subtitle.clone());
        let composer = ShortsComposer::new(probe.clone(), Arc::clone(&registry), config.compose.clone());

        Ok(Self {
            config,
            probe,
            registry,
            launderer,
            narration,
            subtitles,
            composer,
        })
    }

    pub fn config(&self) -> &ShortsConfig {
        &self.config
    }

    /// Render one campaign.
    ///
    /// Laundered clips and narration files are removed afterwards, whether
    /// the render succeeded or not, unless `keep_intermediates` is set.
    pub async fn run(
        &self,
        manifest: &CampaignManifest,
        cancel: &CancelToken,
    ) -> WorkerResult<CampaignRenderResult> {
        manifest.validate().map_err(WorkerError::manifest)?;

        let logger = CampaignLogger::new(&manifest.campaign_id, "render_campaign");
        let span = logger.create_span();

        let mut artifacts = Vec::new();
        let result = self
            .run_stages(manifest, cancel, &logger, &mut artifacts)
            .instrument(span)
            .await;

        if !self.config.keep_intermediates {
            remove_artifacts(&artifacts).await;
        }

        match &result {
            Ok(render) => {
                logger.log_render_warnings(&render.warnings);
                logger.log_completion(&format!(
                    "{} ({:.2}s, {} warnings)",
                    render.final_video_path.display(),
                    render.duration_seconds,
                    render.warnings.len()
                ));
            }
            Err(e) if e.is_cancelled() => logger.log_warning("cancelled"),
            Err(e) => logger.log_error(&e.to_string()),
        }
        result
    }

    async fn run_stages(
        &self,
        manifest: &CampaignManifest,
        cancel: &CancelToken,
        logger: &CampaignLogger,
        artifacts: &mut Vec<PathBuf>,
    ) -> WorkerResult<CampaignRenderResult> {
        logger.log_start(&format!(
            "{} scenes, {} source clips",
            manifest.scenes.len(),
            manifest.source_clips.len()
        ));

        // Detect once up front so parallel launders share the result
        let encoder = self.registry.resolve(&self.probe).await;
        debug!("Starting with encoder {}", encoder);

        let progress_logger = logger.clone();
        let progress: &LaunderProgressFn = &move |current: usize, total: usize, source: &Path| {
            progress_logger.log_progress(&format!(
                "laundered {}/{} ({})",
                current,
                total,
                source.display()
            ));
        };
        let report = self
            .launderer
            .launder_all(&manifest.source_clips, Some(progress), cancel)
            .await;
        artifacts.extend(report.output_paths());
        if report.cancelled {
            return Err(WorkerError::Cancelled);
        }

        let mut warnings = launder_warnings(&report);
        let mut scenes = manifest.to_scenes();
        assign_clips(&mut scenes, &report.output_paths(), logger);

        warnings.extend(
            self.narration
                .synthesize_scenes(&manifest.campaign_id, &mut scenes, cancel)
                .await?,
        );
        artifacts.extend(scenes.iter().filter_map(|s| s.narration_audio_path.clone()));

        warnings.extend(self.narration.align_scenes(&mut scenes, cancel).await?);
        cancel.check()?;

        // Cue offsets must follow the scenes that actually reach the timeline
        let (usable, _) = usable_scenes(&scenes);
        let (track, subtitle_warnings) =
            compose_subtitles(&self.subtitles, &usable, self.config.allow_subtitle_degrade)?;
        warnings.extend(subtitle_warnings);

        let mut result = self
            .composer
            .render(
                &manifest.campaign_id,
                &scenes,
                manifest.background_music.as_deref(),
                track.as_ref(),
                cancel,
            )
            .await?;

        warnings.append(&mut result.warnings);
        result.warnings = warnings;
        Ok(result)
    }
}

/// One warning per failed source clip and per clip that needed the software
/// encoder.
fn launder_warnings(report: &LaunderReport) -> Vec<RenderWarning> {
    let failures = report.failures.iter().map(|f| RenderWarning::LaunderFailed {
        source: f.source.clone(),
        reason: f.reason.clone(),
    });
    let fallbacks = report
        .outputs
        .iter()
        .filter(|c| c.encoder_fell_back)
        .map(|_| RenderWarning::EncoderFallback {
            stage: "launder".to_string(),
        });
    failures.chain(fallbacks).collect()
}

/// Give the i-th laundered clip to the i-th scene.
pub fn assign_clips(scenes: &mut [Scene], clips: &[PathBuf], logger: &CampaignLogger) {
    for (i, scene) in scenes.iter_mut().enumerate() {
        scene.video_clip_path = clips.get(i).cloned();
        if scene.video_clip_path.is_none() {
            logger.log_warning(&format!("scene {} has no laundered clip", scene.index));
        }
    }
    if clips.len() > scenes.len() {
        debug!("{} laundered clips left unused", clips.len() - scenes.len());
    }
}

/// Build the subtitle track, degrading to no subtitles when allowed.
pub fn compose_subtitles(
    composer: &SubtitleComposer,
    scenes: &[Scene],
    allow_degrade: bool,
) -> WorkerResult<(Option<SubtitleTrack>, Vec<RenderWarning>)> {
    match composer.compose(scenes) {
        Ok(track) => Ok((Some(track), Vec::new())),
        Err(e @ MediaError::SubtitleFailed(_)) if allow_degrade => {
            warn!("Rendering without subtitles: {}", e);
            Ok((
                None,
                vec![RenderWarning::SubtitlesOmitted {
                    reason: e.to_string(),
                }],
            ))
        }
        Err(e) => Err(e.into()),
    }
}

async fn remove_artifacts(paths: &[PathBuf]) {
    for path in paths {
        if let Err(e) = tokio::fs::remove_file(path).await {
            if e.kind() != std::io::ErrorKind::NotFound {
                warn!("Failed to remove {}: {}", path.display(), e);
            }
        }
    }
}
