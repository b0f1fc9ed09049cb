//! Emotion tags and the prosody presets they map to.

use schemars::JsonSchema;
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;
use std::str::FromStr;

/// Emotional delivery requested for a narration beat.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, JsonSchema, Default)]
#[serde(rename_all = "lowercase")]
pub enum EmotionTag {
    Excited,
    #[default]
    Friendly,
    Urgent,
    Dramatic,
    Calm,
    Hyped,
}

impl EmotionTag {
    /// All tags, in declaration order.
    pub const ALL: [EmotionTag; 6] = [
        EmotionTag::Excited,
        EmotionTag::Friendly,
        EmotionTag::Urgent,
        EmotionTag::Dramatic,
        EmotionTag::Calm,
        EmotionTag::Hyped,
    ];

    /// Prosody used when synthesizing speech for this emotion.
    pub fn prosody(&self) -> ProsodyPreset {
        match self {
            EmotionTag::Excited => ProsodyPreset::new(15, 8, 10),
            EmotionTag::Friendly => ProsodyPreset::new(5, 2, 0),
            EmotionTag::Urgent => ProsodyPreset::new(20, 5, 15),
            EmotionTag::Dramatic => ProsodyPreset::new(-5, -3, 5),
            EmotionTag::Calm => ProsodyPreset::new(-10, -2, -5),
            EmotionTag::Hyped => ProsodyPreset::new(25, 10, 20),
        }
    }

    /// High-energy emotions get the `Highlight` caption style.
    pub fn is_high_energy(&self) -> bool {
        matches!(
            self,
            EmotionTag::Excited | EmotionTag::Hyped | EmotionTag::Urgent
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            EmotionTag::Excited => "excited",
            EmotionTag::Friendly => "friendly",
            EmotionTag::Urgent => "urgent",
            EmotionTag::Dramatic => "dramatic",
            EmotionTag::Calm => "calm",
            EmotionTag::Hyped => "hyped",
        }
    }
}

impl fmt::Display for EmotionTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EmotionTag {
    type Err = std::convert::Infallible;

    /// Unknown tags fall back to `Friendly`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let tag = match s.trim().to_ascii_lowercase().as_str() {
            "excited" => EmotionTag::Excited,
            "urgent" => EmotionTag::Urgent,
            "dramatic" => EmotionTag::Dramatic,
            "calm" => EmotionTag::Calm,
            "hyped" => EmotionTag::Hyped,
            _ => EmotionTag::Friendly,
        };
        Ok(tag)
    }
}

impl<'de> Deserialize<'de> for EmotionTag {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        Ok(raw.parse().unwrap_or_default())
    }
}

/// Speech rate/pitch/volume offsets relative to the voice's neutral delivery.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct ProsodyPreset {
    /// Speaking rate offset in percent
    pub rate_pct: i32,
    /// Pitch offset in hertz
    pub pitch_hz: i32,
    /// Volume offset in percent
    pub volume_pct: i32,
}

impl ProsodyPreset {
    pub const fn new(rate_pct: i32, pitch_hz: i32, volume_pct: i32) -> Self {
        Self {
            rate_pct,
            pitch_hz,
            volume_pct,
        }
    }

    /// Rate formatted as a signed percentage, e.g. `+15%`.
    pub fn rate(&self) -> String {
        format!("{:+}%", self.rate_pct)
    }

    /// Pitch formatted as a signed hertz offset, e.g. `-3Hz`.
    pub fn pitch(&self) -> String {
        format!("{:+}Hz", self.pitch_hz)
    }

    /// Volume formatted as a signed percentage, e.g. `+0%`.
    pub fn volume(&self) -> String {
        format!("{:+}%", self.volume_pct)
    }
}
