//! Sample sources and audio file helpers.

#[cfg(feature = "cpal-audio")]
pub mod capture;
pub mod source;
pub mod synth;
pub mod wav;

#[cfg(feature = "cpal-audio")]
pub use capture::CaptureSource;
pub use source::{MemorySource, MockSource, SampleSource};
pub use synth::{SynthConfig, synthesize};
pub use wav::WavSource;
