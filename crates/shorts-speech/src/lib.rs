//! Narration synthesis and word alignment for the shorts pipeline.
//!
//! - [`SpeechSynthesizer`] backends: the `edge-tts` CLI and SSML over HTTP
//! - [`WordAligner`] backed by an alignment service, with uniform slicing
//!   as the fallback
//! - [`NarrationEngine`] enriching scenes with audio, duration and words

pub mod align;
pub mod config;
pub mod engine;
pub mod error;
pub mod ssml;
pub mod synth;

pub use align::{parse_alignment, uniform_slices, AlignmentServiceClient, WordAligner};
pub use config::{NarrationConfig, SynthesisBackend};
pub use engine::NarrationEngine;
pub use error::{SpeechError, SpeechResult};
pub use ssml::build_ssml;
pub use synth::{EdgeTtsSynthesizer, SpeechSynthesizer, SsmlHttpSynthesizer, SynthesisRequest};
