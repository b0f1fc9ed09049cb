#![deny(unreachable_patterns)]
//! FFmpeg CLI plumbing for the shorts pipeline.
//!
//! This crate provides:
//! - A [`CommandRunner`] seam over every external tool invocation
//! - Type-safe FFmpeg command and filter graph building
//! - Media probing and a process-wide encoder registry with
//!   hardware-to-software fallback
//! - Clip laundering, subtitle composition and final shorts rendering

pub mod cancel;
pub mod command;
pub mod compose;
pub mod encoder;
pub mod error;
pub mod filters;
pub mod fs_utils;
pub mod launder;
pub mod metrics;
pub mod probe;
pub mod runner;
pub mod subtitle;

pub use cancel::{cancel_pair, CancelHandle, CancelToken};
pub use command::{run_ffmpeg, FfmpegCommand};
pub use compose::{plan_segments, usable_scenes, ComposeConfig, SegmentPlan, ShortsComposer};
pub use encoder::{EncodeOutcome, EncoderRegistry};
pub use error::{MediaError, MediaResult};
pub use fs_utils::move_file;
pub use launder::{
    LaunderConfig, LaunderFailure, LaunderParams, LaunderProgressFn, LaunderReport,
    LaunderedClip, Launderer,
};
pub use probe::{MediaInfo, MediaProbe};
pub use runner::{CommandOutput, CommandRunner, ProcessRunner};
pub use subtitle::{render_ass, write_ass, SubtitleComposer, SubtitleConfig};
