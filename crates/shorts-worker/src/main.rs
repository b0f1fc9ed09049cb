//! Campaign worker binary.
//!
//! Usage: `shorts-worker <manifest.json>`. Prints the render result as JSON.

use anyhow::Context;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use shorts_media::{cancel_pair, ProcessRunner};
use shorts_worker::{load_manifest, CampaignPipeline, ShortsConfig};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    init_tracing();

    let manifest_path: PathBuf = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .context("usage: shorts-worker <manifest.json>")?;

    info!("Starting shorts-worker");

    let config = ShortsConfig::from_env();
    info!("Worker config: {:?}", config);

    let manifest = load_manifest(&manifest_path)
        .await
        .with_context(|| format!("failed to load {}", manifest_path.display()))?;

    let pipeline = CampaignPipeline::new(config, Arc::new(ProcessRunner::new()))
        .context("failed to build pipeline")?;

    let (cancel_handle, cancel) = cancel_pair();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Received shutdown signal, cancelling campaign");
            cancel_handle.cancel();
        }
    });

    match pipeline.run(&manifest, &cancel).await {
        Ok(result) => {
            println!("{}", serde_json::to_string_pretty(&result)?);
            Ok(())
        }
        Err(e) if e.is_cancelled() => {
            error!("Campaign {} cancelled", manifest.campaign_id);
            std::process::exit(130);
        }
        Err(e) => Err(e).context(format!("campaign {} failed", manifest.campaign_id)),
    }
}

/// Colored output for dev, JSON for production.
fn init_tracing() {
    let use_json = std::env::var("LOG_FORMAT")
        .map(|v| v.to_lowercase() == "json")
        .unwrap_or(false);

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,shorts_media=info,shorts_speech=info"));

    if use_json {
        tracing_subscriber::registry()
            .with(fmt::layer().json())
            .with(env_filter)
            .init();
    } else {
        tracing_subscriber::registry()
            .with(
                fmt::layer()
                    .with_ansi(true)
                    .with_target(true)
                    .with_thread_ids(false)
                    .with_file(false)
                    .with_line_number(false),
            )
            .with(env_filter)
            .init();
    }
}
