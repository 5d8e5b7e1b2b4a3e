//! cwdecode - Streaming Morse code decoder
//!
//! Audio samples in, dit/dah tokens out: tone detection, run-length
//! encoding, unit normalization, and token classification, each stage
//! on its own thread.

#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]
#![warn(clippy::let_underscore_must_use)]

pub mod audio;
#[cfg(feature = "cli")]
pub mod cli;
pub mod config;
pub mod defaults;
pub mod error;
pub mod output;
pub mod pipeline;

// Core traits (source → process → sink)
pub use audio::source::SampleSource;
pub use pipeline::sink::{CollectorSink, JsonLinesSink, PipelineReport, TokenSink, WriterSink};

// Pipeline
pub use pipeline::decoder::{Decoder, decode};
pub use pipeline::orchestrator::{Pipeline, PipelineConfig, PipelineHandle};
pub use pipeline::types::{Canonical, Run, Token, TrailingPolicy};

// Error handling
pub use error::{CwError, Result};

// Config
pub use config::Config;

// Station framework (for advanced users)
pub use pipeline::error::{ErrorReporter, StationError};
pub use pipeline::station::Station;

/// Build version string with optional git commit hash.
///
/// Returns `"0.1.0+abc1234"` when git hash is available, `"0.1.0"` otherwise.
pub fn version_string() -> String {
    let version = env!("CARGO_PKG_VERSION");
    match option_env!("GIT_HASH") {
        Some(hash) if !hash.is_empty() => format!("{}+{}", version, hash),
        _ => version.to_string(),
    }
}
