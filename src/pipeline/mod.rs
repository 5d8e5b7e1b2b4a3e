//! Streaming Morse decoder pipeline.
//!
//! Four stations, each on its own thread, connected by bounded crossbeam
//! channels for backpressure:
//!
//! samples → tone detector → rhythm encoder → unit normalizer → token classifier
//!
//! [`Decoder`] chains the same stages by direct calls when threads are unwanted.

pub mod classifier;
pub mod decoder;
pub mod error;
pub mod normalizer;
pub mod orchestrator;
pub mod rhythm;
pub mod sink;
pub mod station;
pub mod tone_detector;
pub mod types;

pub use classifier::{ClassifierStation, Expect, TokenClassifier};
pub use decoder::{Decoder, decode};
pub use error::{ErrorReporter, LogReporter, StationError};
pub use normalizer::{NormalizerStation, UnitNormalizer};
pub use orchestrator::{Pipeline, PipelineConfig, PipelineHandle};
pub use rhythm::{RhythmEncoder, RhythmStation};
pub use sink::{CollectorSink, JsonLinesSink, PipelineReport, TokenSink, WriterSink};
pub use station::{Station, StationRunner};
pub use tone_detector::{ToneDetector, ToneStation};
pub use types::{Canonical, Run, SampleChunk, Token, TrailingPolicy};
