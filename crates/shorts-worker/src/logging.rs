//! Structured campaign logging.

use chrono::{DateTime, Utc};
use tracing::{error, info, warn, Span};

use shorts_models::{CampaignId, RenderWarning};

/// Logs campaign lifecycle events with the campaign id and operation
/// attached to every line.
#[derive(Debug, Clone)]
pub struct CampaignLogger {
    campaign_id: String,
    operation: String,
    started_at: DateTime<Utc>,
}

impl CampaignLogger {
    pub fn new(campaign_id: &CampaignId, operation: &str) -> Self {
        Self {
            campaign_id: campaign_id.to_string(),
            operation: operation.to_string(),
            started_at: Utc::now(),
        }
    }

    pub fn log_start(&self, message: &str) {
        info!(
            campaign_id = %self.campaign_id,
            operation = %self.operation,
            started_at = %self.started_at.to_rfc3339(),
            "Campaign started: {}", message
        );
    }

    pub fn log_progress(&self, message: &str) {
        info!(
            campaign_id = %self.campaign_id,
            operation = %self.operation,
            "Campaign progress: {}", message
        );
    }

    pub fn log_warning(&self, message: &str) {
        warn!(
            campaign_id = %self.campaign_id,
            operation = %self.operation,
            "Campaign warning: {}", message
        );
    }

    /// Log every recovered problem of a render, one line each.
    pub fn log_render_warnings(&self, warnings: &[RenderWarning]) {
        for warning in warnings {
            let detail = serde_json::to_string(warning).unwrap_or_else(|_| format!("{:?}", warning));
            self.log_warning(&detail);
        }
    }

    pub fn log_error(&self, message: &str) {
        error!(
            campaign_id = %self.campaign_id,
            operation = %self.operation,
            elapsed_secs = self.elapsed_secs(),
            "Campaign error: {}", message
        );
    }

    pub fn log_completion(&self, message: &str) {
        info!(
            campaign_id = %self.campaign_id,
            operation = %self.operation,
            elapsed_secs = self.elapsed_secs(),
            "Campaign completed: {}", message
        );
    }

    pub fn campaign_id(&self) -> &str {
        &self.campaign_id
    }

    pub fn operation(&self) -> &str {
        &self.operation
    }

    /// Seconds since the logger was created.
    pub fn elapsed_secs(&self) -> f64 {
        (Utc::now() - self.started_at).num_milliseconds() as f64 / 1000.0
    }

    pub fn create_span(&self) -> Span {
        tracing::info_span!(
            "campaign",
            campaign_id = %self.campaign_id,
            operation = %self.operation
        )
    }
}
