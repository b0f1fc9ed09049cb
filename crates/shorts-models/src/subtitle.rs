//! Subtitle track models.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Named caption styles available to cues.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
pub enum StyleName {
    Default,
    Highlight,
}

impl StyleName {
    pub fn as_str(&self) -> &'static str {
        match self {
            StyleName::Default => "Default",
            StyleName::Highlight => "Highlight",
        }
    }
}

impl std::fmt::Display for StyleName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Visual definition of a caption style.
///
/// Colors use the ASS `&HAABBGGRR` notation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct SubtitleStyle {
    pub name: StyleName,
    pub font_name: String,
    pub font_size: u32,
    pub primary_color: String,
    pub outline_color: String,
    pub back_color: String,
    pub bold: bool,
    pub outline: f32,
    pub shadow: f32,
    /// Numpad-style screen anchor (2 = bottom center)
    pub alignment: u8,
    pub margin_h: u32,
    pub margin_v: u32,
}

impl SubtitleStyle {
    /// Plain white caption anchored bottom-center.
    pub fn default_style(font_name: &str) -> Self {
        Self {
            name: StyleName::Default,
            font_name: font_name.to_string(),
            font_size: 74,
            primary_color: "&H00FFFFFF".to_string(),
            outline_color: "&H00000000".to_string(),
            back_color: "&H96000000".to_string(),
            bold: true,
            outline: 3.5,
            shadow: 1.0,
            alignment: 2,
            margin_h: 60,
            margin_v: 90,
        }
    }

    /// Larger amber caption for high-energy beats.
    pub fn highlight_style(font_name: &str) -> Self {
        Self {
            name: StyleName::Highlight,
            font_name: font_name.to_string(),
            font_size: 82,
            primary_color: "&H0000BFFF".to_string(),
            outline_color: "&H00000000".to_string(),
            back_color: "&H96000000".to_string(),
            bold: true,
            outline: 4.5,
            shadow: 2.0,
            alignment: 2,
            margin_h: 60,
            margin_v: 90,
        }
    }
}

/// One timed caption line.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct SubtitleCue {
    pub start_sec: f64,
    pub end_sec: f64,
    pub style: StyleName,
    pub text: String,
    /// Index of the scene this cue belongs to
    pub scene_index: u32,
    /// Timing came from fallback slicing rather than real alignment
    #[serde(default)]
    pub degraded: bool,
}

/// Ordered cues plus the styles they reference.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct SubtitleTrack {
    pub play_res_x: u32,
    pub play_res_y: u32,
    pub styles: Vec<SubtitleStyle>,
    pub cues: Vec<SubtitleCue>,
}

impl SubtitleTrack {
    pub fn is_empty(&self) -> bool {
        self.cues.is_empty()
    }

    /// Number of cues built from fallback timing.
    pub fn degraded_cue_count(&self) -> usize {
        self.cues.iter().filter(|c| c.degraded).count()
    }

    /// Cue start times never decrease across the track.
    pub fn is_monotonic(&self) -> bool {
        self.cues
            .windows(2)
            .all(|pair| pair[1].start_sec >= pair[0].start_sec)
    }

    pub fn style(&self, name: StyleName) -> Option<&SubtitleStyle> {
        self.styles.iter().find(|s| s.name == name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cue(start: f64, degraded: bool) -> SubtitleCue {
        SubtitleCue {
            start_sec: start,
            end_sec: start + 0.5,
            style: StyleName::Default,
            text: "x".to_string(),
            scene_index: 0,
            degraded,
        }
    }

    #[test]
    fn test_track_helpers() {
        let track = SubtitleTrack {
            play_res_x: 1080,
            play_res_y: 1920,
            styles: vec![
                SubtitleStyle::default_style("Pretendard"),
                SubtitleStyle::highlight_style("Pretendard"),
            ],
            cues: vec![cue(0.0, false), cue(1.0, true), cue(1.0, true)],
        };
        assert!(track.is_monotonic());
        assert_eq!(track.degraded_cue_count(), 2);
        assert_eq!(track.style(StyleName::Highlight).unwrap().font_size, 82);
    }

    #[test]
    fn test_non_monotonic_detected() {
        let track = SubtitleTrack {
            play_res_x: 1080,
            play_res_y: 1920,
            styles: Vec::new(),
            cues: vec![cue(2.0, false), cue(1.0, false)],
        };
        assert!(!track.is_monotonic());
    }
}
