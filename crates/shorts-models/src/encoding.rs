//! Video encoding configuration.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Default hardware encoder (NVENC H.264)
pub const DEFAULT_HARDWARE_CODEC: &str = "h264_nvenc";
/// Default software encoder
pub const DEFAULT_SOFTWARE_CODEC: &str = "libx264";
/// Default hardware decode acceleration
pub const DEFAULT_HWACCEL: &str = "cuda";
/// Default NVENC preset
pub const DEFAULT_HARDWARE_PRESET: &str = "p4";
/// Default x264 preset
pub const DEFAULT_SOFTWARE_PRESET: &str = "medium";
/// Default quality (QP for NVENC, CRF for x264)
pub const DEFAULT_QUALITY: u8 = 23;
/// Default audio codec
pub const DEFAULT_AUDIO_CODEC: &str = "aac";
/// Default audio bitrate
pub const DEFAULT_AUDIO_BITRATE: &str = "192k";
/// Output pixel format
pub const DEFAULT_PIXEL_FORMAT: &str = "yuv420p";

/// Which encoder family the process is currently using.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum EncoderChoice {
    HardwareAccelerated,
    SoftwareFallback,
}

impl EncoderChoice {
    pub fn is_hardware(&self) -> bool {
        matches!(self, EncoderChoice::HardwareAccelerated)
    }
}

impl std::fmt::Display for EncoderChoice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EncoderChoice::HardwareAccelerated => write!(f, "hardware"),
            EncoderChoice::SoftwareFallback => write!(f, "software"),
        }
    }
}

/// Video encoding configuration for both encoder families.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct EncodingConfig {
    /// Hardware codec name (e.g., "h264_nvenc")
    #[serde(default = "default_hardware_codec")]
    pub hardware_codec: String,

    /// Software codec name (e.g., "libx264")
    #[serde(default = "default_software_codec")]
    pub software_codec: String,

    /// Input `-hwaccel` value used with the hardware codec
    #[serde(default = "default_hwaccel")]
    pub hwaccel: String,

    /// Preset for the hardware codec
    #[serde(default = "default_hardware_preset")]
    pub hardware_preset: String,

    /// Preset for the software codec
    #[serde(default = "default_software_preset")]
    pub software_preset: String,

    /// Constant QP (hardware) / CRF (software), lower is better
    #[serde(default = "default_quality")]
    pub quality: u8,

    /// Pixel format
    #[serde(default = "default_pixel_format")]
    pub pixel_format: String,

    /// Audio codec
    #[serde(default = "default_audio_codec")]
    pub audio_codec: String,

    /// Audio bitrate
    #[serde(default = "default_audio_bitrate")]
    pub audio_bitrate: String,
}

fn default_hardware_codec() -> String {
    DEFAULT_HARDWARE_CODEC.to_string()
}
fn default_software_codec() -> String {
    DEFAULT_SOFTWARE_CODEC.to_string()
}
fn default_hwaccel() -> String {
    DEFAULT_HWACCEL.to_string()
}
fn default_hardware_preset() -> String {
    DEFAULT_HARDWARE_PRESET.to_string()
}
fn default_software_preset() -> String {
    DEFAULT_SOFTWARE_PRESET.to_string()
}
fn default_quality() -> u8 {
    DEFAULT_QUALITY
}
fn default_pixel_format() -> String {
    DEFAULT_PIXEL_FORMAT.to_string()
}
fn default_audio_codec() -> String {
    DEFAULT_AUDIO_CODEC.to_string()
}
fn default_audio_bitrate() -> String {
    DEFAULT_AUDIO_BITRATE.to_string()
}

impl Default for EncodingConfig {
    fn default() -> Self {
        Self {
            hardware_codec: default_hardware_codec(),
            software_codec: default_software_codec(),
            hwaccel: default_hwaccel(),
            hardware_preset: default_hardware_preset(),
            software_preset: default_software_preset(),
            quality: DEFAULT_QUALITY,
            pixel_format: default_pixel_format(),
            audio_codec: default_audio_codec(),
            audio_bitrate: default_audio_bitrate(),
        }
    }
}

impl EncodingConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a new config with updated quality.
    pub fn with_quality(mut self, quality: u8) -> Self {
        self.quality = quality;
        self
    }

    /// Codec name for an encoder choice.
    pub fn codec(&self, choice: EncoderChoice) -> &str {
        match choice {
            EncoderChoice::HardwareAccelerated => &self.hardware_codec,
            EncoderChoice::SoftwareFallback => &self.software_codec,
        }
    }

    /// Arguments placed before `-i` for an encoder choice.
    pub fn input_args(&self, choice: EncoderChoice) -> Vec<String> {
        match choice {
            EncoderChoice::HardwareAccelerated if !self.hwaccel.is_empty() => {
                vec!["-hwaccel".to_string(), self.hwaccel.clone()]
            }
            _ => Vec::new(),
        }
    }

    /// Video encoder output arguments (codec, preset, rate control, pixel format).
    pub fn video_args(&self, choice: EncoderChoice) -> Vec<String> {
        let mut args = vec!["-c:v".to_string(), self.codec(choice).to_string()];

        // NVENC has no CRF; constant QP is the closest equivalent
        match choice {
            EncoderChoice::HardwareAccelerated => args.extend([
                "-preset".to_string(),
                self.hardware_preset.clone(),
                "-rc".to_string(),
                "constqp".to_string(),
                "-qp".to_string(),
                self.quality.to_string(),
                "-b:v".to_string(),
                "0".to_string(),
            ]),
            EncoderChoice::SoftwareFallback => args.extend([
                "-preset".to_string(),
                self.software_preset.clone(),
                "-crf".to_string(),
                self.quality.to_string(),
            ]),
        }

        args.extend(["-pix_fmt".to_string(), self.pixel_format.clone()]);
        args
    }

    /// Audio encoder output arguments.
    pub fn audio_args(&self) -> Vec<String> {
        vec![
            "-c:a".to_string(),
            self.audio_codec.clone(),
            "-b:a".to_string(),
            self.audio_bitrate.clone(),
        ]
    }
}
