//! Campaign render result models.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// A recovered problem that changed the output but did not fail the campaign.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RenderWarning {
    /// Narration synthesis failed; silence of this length was used
    SynthesisFallback { scene_index: u32, duration_sec: f64 },
    /// Word alignment fell back to uniform slicing
    AlignmentFallback { scene_index: u32 },
    /// Scene was left out because it had no laundered clip
    SceneWithoutClip { scene_index: u32 },
    /// Scene was shortened to stay under the duration ceiling
    TruncatedByCeiling {
        scene_index: u32,
        requested_sec: f64,
        used_sec: f64,
    },
    /// Scene did not fit under the duration ceiling at all
    CutByCeiling { scene_index: u32 },
    /// Narration file was missing at render time; silence was used
    NarrationMissing { scene_index: u32 },
    /// Subtitles could not be built; the video has none burned in
    SubtitlesOmitted { reason: String },
    /// Hardware encoding failed and the software encoder was used
    EncoderFallback { stage: String },
    /// A source clip could not be laundered
    LaunderFailed { source: PathBuf, reason: String },
}

/// The deliverable of one campaign render.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct CampaignRenderResult {
    pub final_video_path: PathBuf,
    pub duration_seconds: f64,
    pub size_bytes: u64,
    #[serde(default)]
    pub warnings: Vec<RenderWarning>,
}

impl CampaignRenderResult {
    /// True when any fallback shaped the output ("successful with warnings").
    pub fn is_degraded(&self) -> bool {
        !self.warnings.is_empty()
    }

    pub fn push_warning(&mut self, warning: RenderWarning) {
        self.warnings.push(warning);
    }
}
