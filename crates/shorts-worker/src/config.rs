//! Worker configuration.

use shorts_media::{ComposeConfig, LaunderConfig, SubtitleConfig};
use shorts_models::{EncoderChoice, EncodingConfig};
use shorts_speech::NarrationConfig;

use crate::error::{WorkerError, WorkerResult};

/// Configuration for every stage of a campaign render.
#[derive(Debug, Clone)]
pub struct ShortsConfig {
    pub launder: LaunderConfig,
    pub narration: NarrationConfig,
    pub subtitle: SubtitleConfig,
    pub compose: ComposeConfig,
    pub encoding: EncodingConfig,
    /// Skip hardware detection and encode with the software codec
    pub force_software_encoder: bool,
    /// Render without burned-in subtitles when they cannot be built
    pub allow_subtitle_degrade: bool,
    /// Keep laundered clips and narration files after the render
    pub keep_intermediates: bool,
}

impl Default for ShortsConfig {
    fn default() -> Self {
        Self {
            launder: LaunderConfig::default(),
            narration: NarrationConfig::default(),
            subtitle: SubtitleConfig::default(),
            compose: ComposeConfig::default(),
            encoding: EncodingConfig::default(),
            force_software_encoder: false,
            allow_subtitle_degrade: true,
            keep_intermediates: false,
        }
    }
}

impl ShortsConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        let mut encoding = EncodingConfig::default();
        if let Some(quality) = std::env::var("ENCODER_QUALITY")
            .ok()
            .and_then(|s| s.parse().ok())
        {
            encoding = encoding.with_quality(quality);
        }

        Self {
            launder: LaunderConfig::from_env(),
            narration: NarrationConfig::from_env(),
            subtitle: SubtitleConfig::from_env(),
            compose: ComposeConfig::from_env(),
            encoding,
            force_software_encoder: env_flag("FORCE_SOFTWARE_ENCODER", false),
            allow_subtitle_degrade: env_flag("ALLOW_SUBTITLE_DEGRADE", true),
            keep_intermediates: env_flag("KEEP_INTERMEDIATES", false),
        }
    }

    pub fn validate(&self) -> WorkerResult<()> {
        self.launder
            .validate()
            .map_err(|e| WorkerError::config(e.to_string()))?;

        if !(self.compose.max_duration_secs.is_finite() && self.compose.max_duration_secs > 0.0) {
            return Err(WorkerError::config(format!(
                "duration ceiling must be positive, got {}",
                self.compose.max_duration_secs
            )));
        }
        if self.subtitle.words_per_cue == 0 {
            return Err(WorkerError::config("words per subtitle cue must be at least 1"));
        }
        if self.encoding.quality > 51 {
            return Err(WorkerError::config(format!(
                "encoder quality {} is outside 0..=51",
                self.encoding.quality
            )));
        }
        Ok(())
    }

    /// Encoder the registry starts with, if detection is to be skipped.
    pub fn initial_encoder(&self) -> Option<EncoderChoice> {
        self.force_software_encoder
            .then_some(EncoderChoice::SoftwareFallback)
    }
}

fn env_flag(key: &str, default: bool) -> bool {
    std::env::var(key)
        .map(|v| matches!(v.trim().to_lowercase().as_str(), "1" | "true" | "yes" | "on"))
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_defaults() {
        let config = ShortsConfig::default();
        assert!(config.allow_subtitle_degrade);
        assert!(!config.keep_intermediates);
        assert_eq!(config.compose.max_duration_secs, 59.0);
        assert_eq!(config.initial_encoder(), None);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut config = ShortsConfig::default();
        config.compose.max_duration_secs = 0.0;
        assert!(matches!(config.validate(), Err(WorkerError::Config(_))));

        let mut config = ShortsConfig::default();
        config.launder.crop_fraction_max = 0.5;
        assert!(config.validate().is_err());

        let mut config = ShortsConfig::default();
        config.subtitle.words_per_cue = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_forced_software_encoder() {
        let config = ShortsConfig {
            force_software_encoder: true,
            ..ShortsConfig::default()
        };
        assert_eq!(config.initial_encoder(), Some(EncoderChoice::SoftwareFallback));
    }
}
