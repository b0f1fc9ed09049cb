//! Campaign worker for the shorts pipeline.
//!
//! Loads a campaign manifest and renders it through laundering, narration,
//! alignment, subtitles and final composition.

pub mod config;
pub mod error;
pub mod logging;
pub mod pipeline;

pub use config::ShortsConfig;
pub use error::{WorkerError, WorkerResult};
pub use logging::CampaignLogger;
pub use pipeline::CampaignPipeline;

use shorts_models::CampaignManifest;
use std::path::Path;

/// Read and validate a campaign manifest from a JSON file.
pub async fn load_manifest(path: &Path) -> WorkerResult<CampaignManifest> {
    let bytes = tokio::fs::read(path).await?;
    let manifest: CampaignManifest = serde_json::from_slice(&bytes)?;
    manifest.validate().map_err(WorkerError::manifest)?;
    Ok(manifest)
}
