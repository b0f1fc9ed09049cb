//! Scene and word-timing models.
//!
//! A [`Scene`] is one narration beat of a campaign. It is created by the
//! caller and enriched in place as the pipeline runs: narration audio and
//! measured duration first, then word timestamps, then the laundered clip.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::EmotionTag;

/// Duration assumed for a scene whose narration could not be measured.
pub const DEFAULT_FALLBACK_DURATION_SECS: f64 = 3.0;

/// One spoken word and where it sits inside its narration audio.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct WordTimestamp {
    pub word: String,
    pub start_sec: f64,
    pub end_sec: f64,
}

impl WordTimestamp {
    pub fn new(word: impl Into<String>, start_sec: f64, end_sec: f64) -> Self {
        Self {
            word: word.into(),
            start_sec,
            end_sec,
        }
    }

    pub fn duration(&self) -> f64 {
        (self.end_sec - self.start_sec).max(0.0)
    }
}

/// Where a scene's word timestamps came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum AlignmentSource {
    /// Speech-to-text alignment model output
    Model,
    /// Fixed-width slicing of the measured duration (lower fidelity)
    UniformFallback,
}

impl AlignmentSource {
    pub fn is_degraded(&self) -> bool {
        matches!(self, AlignmentSource::UniformFallback)
    }
}

/// One narration beat of a campaign.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct Scene {
    /// Position in the campaign timeline (strictly increasing)
    pub index: u32,
    /// Narration text
    pub text: String,
    /// Duration the script asked for; advisory only
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub requested_duration: Option<f64>,
    #[serde(default)]
    pub emotion: EmotionTag,
    /// Synthesized narration audio
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub narration_audio_path: Option<PathBuf>,
    /// Probed duration of the narration (or the fallback duration)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub measured_duration: Option<f64>,
    /// True when synthesis failed or was skipped and the duration is a fallback
    #[serde(default)]
    pub synthesis_fallback: bool,
    /// Laundered clip assigned to this scene
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub video_clip_path: Option<PathBuf>,
    #[serde(default)]
    pub word_timestamps: Vec<WordTimestamp>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alignment_source: Option<AlignmentSource>,
}

impl Scene {
    pub fn new(index: u32, text: impl Into<String>, emotion: EmotionTag) -> Self {
        Self {
            index,
            text: text.into(),
            requested_duration: None,
            emotion,
            narration_audio_path: None,
            measured_duration: None,
            synthesis_fallback: false,
            video_clip_path: None,
            word_timestamps: Vec::new(),
            alignment_source: None,
        }
    }

    pub fn with_requested_duration(mut self, secs: f64) -> Self {
        self.requested_duration = Some(secs);
        self
    }

    pub fn with_clip(mut self, path: impl Into<PathBuf>) -> Self {
        self.video_clip_path = Some(path.into());
        self
    }

    /// Measured duration if usable, otherwise `fallback`.
    ///
    /// Never returns NaN, infinity or a non-positive value.
    pub fn duration_or(&self, fallback: f64) -> f64 {
        sanitize_duration(self.measured_duration, fallback)
    }

    pub fn has_text(&self) -> bool {
        !self.text.trim().is_empty()
    }

    /// Whether the scene's words came from the fallback slicer.
    pub fn alignment_degraded(&self) -> bool {
        self.alignment_source
            .map(|s| s.is_degraded())
            .unwrap_or(false)
    }
}

/// Replace a missing, non-finite or non-positive duration with `fallback`.
pub fn sanitize_duration(value: Option<f64>, fallback: f64) -> f64 {
    let fallback = if fallback.is_finite() && fallback > 0.0 {
        fallback
    } else {
        DEFAULT_FALLBACK_DURATION_SECS
    };
    match value {
        Some(v) if v.is_finite() && v > 0.0 => v,
        _ => fallback,
    }
}

/// Clean up raw aligner output into an ordered, non-overlapping word list.
///
/// Words are trimmed (empty ones dropped), times are rounded to milliseconds
/// and clamped so each word starts no earlier than the previous one ended.
pub fn normalize_words(words: Vec<WordTimestamp>) -> Vec<WordTimestamp> {
    let mut out: Vec<WordTimestamp> = Vec::with_capacity(words.len());
    let mut cursor = 0.0_f64;

    for w in words {
        let text = w.word.trim();
        if text.is_empty() || !w.start_sec.is_finite() || !w.end_sec.is_finite() {
            continue;
        }
        let start = round_millis(w.start_sec.max(cursor));
        let end = round_millis(w.end_sec.max(start));
        cursor = end;
        out.push(WordTimestamp::new(text, start, end));
    }

    out
}

fn round_millis(v: f64) -> f64 {
    (v * 1000.0).round() / 1000.0
}
