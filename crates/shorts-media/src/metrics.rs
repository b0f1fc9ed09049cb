//! Pipeline metrics.
//!
//! Only the `metrics` facade is used here; installing a recorder is left to
//! the embedding binary. Without one every call is a no-op.

use metrics::{counter, histogram};

/// Metric names as constants for consistency.
pub mod names {
    // Laundering
    pub const LAUNDER_TOTAL: &str = "shorts_launder_total";
    pub const LAUNDER_DURATION_SECONDS: &str = "shorts_launder_duration_seconds";

    // Encoding
    pub const ENCODER_FALLBACK_TOTAL: &str = "shorts_encoder_fallback_total";
    pub const FFMPEG_DURATION_SECONDS: &str = "shorts_ffmpeg_duration_seconds";

    // Narration
    pub const SYNTHESIS_TOTAL: &str = "shorts_synthesis_total";
    pub const ALIGNMENT_TOTAL: &str = "shorts_alignment_total";

    // Rendering
    pub const RENDERS_TOTAL: &str = "shorts_renders_total";
    pub const RENDER_DURATION_SECONDS: &str = "shorts_render_duration_seconds";
    pub const RENDER_WARNINGS_TOTAL: &str = "shorts_render_warnings_total";
}

/// Record one laundered clip.
pub fn record_launder(success: bool, duration_secs: f64) {
    let labels = [("outcome", outcome(success).to_string())];

    counter!(names::LAUNDER_TOTAL, &labels).increment(1);
    histogram!(names::LAUNDER_DURATION_SECONDS, &labels).record(duration_secs);
}

/// Record a hardware-to-software encoder switch.
pub fn record_encoder_fallback(stage: &str) {
    let labels = [("stage", stage.to_string())];
    counter!(names::ENCODER_FALLBACK_TOTAL, &labels).increment(1);
}

/// Record one FFmpeg invocation.
pub fn record_ffmpeg(stage: &str, duration_secs: f64) {
    let labels = [("stage", stage.to_string())];
    histogram!(names::FFMPEG_DURATION_SECONDS, &labels).record(duration_secs);
}

/// Record one narration synthesis; `fallback` means silence was substituted.
pub fn record_synthesis(fallback: bool) {
    let labels = [("outcome", if fallback { "fallback" } else { "success" }.to_string())];
    counter!(names::SYNTHESIS_TOTAL, &labels).increment(1);
}

/// Record one scene alignment; `fallback` means uniform slicing was used.
pub fn record_alignment(fallback: bool) {
    let labels = [("outcome", if fallback { "fallback" } else { "success" }.to_string())];
    counter!(names::ALIGNMENT_TOTAL, &labels).increment(1);
}

/// Record a finished campaign render.
pub fn record_render(success: bool, duration_secs: f64, warnings: usize) {
    let labels = [("outcome", outcome(success).to_string())];

    counter!(names::RENDERS_TOTAL, &labels).increment(1);
    histogram!(names::RENDER_DURATION_SECONDS, &labels).record(duration_secs);
    counter!(names::RENDER_WARNINGS_TOTAL).increment(warnings as u64);
}

fn outcome(success: bool) -> &'static str {
    if success {
        "success"
    } else {
        "failure"
    }
}
