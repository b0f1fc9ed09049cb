//! Shared data models for the shorts rendering pipeline.
//!
//! This crate provides Serde-serializable types for:
//! - Scenes, word timestamps and emotion/prosody presets
//! - Encoder choice and encoding configuration
//! - Subtitle tracks and ASS timecodes
//! - Campaign manifests and render results

pub mod campaign;
pub mod emotion;
pub mod encoding;
pub mod render;
pub mod scene;
pub mod subtitle;
pub mod timestamp;

// Re-export common types
pub use campaign::{CampaignId, CampaignManifest, SceneSpec};
pub use emotion::{EmotionTag, ProsodyPreset};
pub use encoding::{EncoderChoice, EncodingConfig};
pub use render::{CampaignRenderResult, RenderWarning};
pub use scene::{
    normalize_words, sanitize_duration, AlignmentSource, Scene, WordTimestamp,
    DEFAULT_FALLBACK_DURATION_SECS,
};
pub use subtitle::{StyleName, SubtitleCue, SubtitleStyle, SubtitleTrack};
pub use timestamp::seconds_to_timecode;
