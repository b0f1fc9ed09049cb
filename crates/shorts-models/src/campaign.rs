//! Campaign identifiers and the manifest describing one campaign render.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use uuid::Uuid;

use crate::{EmotionTag, Scene};

/// Unique identifier for a campaign.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(transparent)]
pub struct CampaignId(pub String);

impl CampaignId {
    /// Generate a short random campaign ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4().simple().to_string()[..8].to_string())
    }

    /// Create from an existing string.
    pub fn from_string(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    /// Get the inner string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for CampaignId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for CampaignId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One narration beat as written by the script author.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct SceneSpec {
    pub text: String,
    #[serde(default)]
    pub emotion: EmotionTag,
    /// Advisory duration from the script
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration: Option<f64>,
}

/// Everything needed to render one campaign.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct CampaignManifest {
    #[serde(default)]
    pub campaign_id: CampaignId,
    /// Narration beats, in timeline order
    pub scenes: Vec<SceneSpec>,
    /// Raw clips to launder; the i-th laundered clip backs the i-th scene
    pub source_clips: Vec<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub background_music: Option<PathBuf>,
}

impl CampaignManifest {
    /// Validate the manifest.
    pub fn validate(&self) -> Result<(), String> {
        if self.campaign_id.as_str().trim().is_empty() {
            return Err("Campaign ID cannot be empty".to_string());
        }

        if self
            .campaign_id
            .as_str()
            .chars()
            .any(|c| !(c.is_ascii_alphanumeric() || c == '-' || c == '_'))
        {
            return Err(format!(
                "Campaign ID '{}' may only contain letters, digits, '-' and '_'",
                self.campaign_id
            ));
        }

        if self.scenes.is_empty() {
            return Err("At least one scene is required".to_string());
        }

        if self.source_clips.is_empty() {
            return Err("At least one source clip is required".to_string());
        }

        if let Some(bad) = self
            .scenes
            .iter()
            .filter_map(|s| s.duration)
            .find(|d| !d.is_finite() || *d <= 0.0)
        {
            return Err(format!("Scene duration must be positive, got {}", bad));
        }

        Ok(())
    }

    /// Materialize pipeline scenes, indexed in manifest order.
    pub fn to_scenes(&self) -> Vec<Scene> {
        self.scenes
            .iter()
            .enumerate()
            .map(|(i, spec)| {
                let scene = Scene::new(i as u32, spec.text.clone(), spec.emotion);
                match spec.duration {
                    Some(d) => scene.with_requested_duration(d),
                    None => scene,
                }
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn manifest() -> CampaignManifest {
        serde_json::from_str(
            r#"{
                "campaign_id": "spring-sale_01",
                "scenes": [
                    {"text": "Look at this", "emotion": "excited"},
                    {"text": "Only today", "emotion": "urgent", "duration": 2.5}
                ],
                "source_clips": ["/clips/a.mp4", "/clips/b.mp4"]
            }"#,
        )
        .unwrap()
    }

    #[test]
    fn test_valid_manifest() {
        let m = manifest();
        assert!(m.validate().is_ok());

        let scenes = m.to_scenes();
        assert_eq!(scenes.len(), 2);
        assert_eq!(scenes[0].index, 0);
        assert_eq!(scenes[1].emotion, EmotionTag::Urgent);
        assert_eq!(scenes[1].requested_duration, Some(2.5));
    }

    #[test]
    fn test_invalid_manifests() {
        let mut m = manifest();
        m.scenes.clear();
        assert!(m.validate().is_err());

        let mut m = manifest();
        m.source_clips.clear();
        assert!(m.validate().is_err());

        let mut m = manifest();
        m.campaign_id = CampaignId::from_string("../etc");
        assert!(m.validate().is_err());

        let mut m = manifest();
        m.scenes[0].duration = Some(-1.0);
        assert!(m.validate().is_err());
    }

    #[test]
    fn test_unrecognised_emotions_load_as_friendly() {
        let m: CampaignManifest = serde_json::from_str(
            r#"{
                "campaign_id": "c1",
                "scenes": [
                    {"text": "Hmm", "emotion": "sarcastic"},
                    {"text": "Wow", "emotion": "Excited"}
                ],
                "source_clips": ["/clips/a.mp4"]
            }"#,
        )
        .unwrap();
        assert!(m.validate().is_ok());
        assert_eq!(m.scenes[0].emotion, EmotionTag::Friendly);
        assert_eq!(m.scenes[1].emotion, EmotionTag::Excited);
    }

    #[test]
    fn test_generated_id_is_short() {
        let id = CampaignId::new();
        assert_eq!(id.as_str().len(), 8);
    }
}
