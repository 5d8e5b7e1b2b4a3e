//! Default configuration constants for cwdecode.
//!
//! Shared by the file configuration and the runtime pipeline configuration
//! so both agree on the same starting values.

/// Amplitude values per quantization window.
///
/// Larger windows are more stable against noise but slower to follow a
/// change in transmission volume.
pub const WINDOW: usize = 100;

/// Runs per unit-estimation group (about 10 tones and 10 silences).
pub const GROUP_SIZE: usize = 20;

/// Samples per chunk when cutting file or memory input.
pub const CHUNK_SIZE: usize = 64;

/// Capacity of the sample chunk queue feeding the tone detector.
pub const CHUNK_BUFFER: usize = 64;

/// Capacity of the tone event queue. Events arrive in bursts of one window.
pub const EVENT_BUFFER: usize = 1024;

/// Capacity of the run queue.
pub const RUN_BUFFER: usize = 64;

/// Capacity of the canonical duration queue.
pub const DURATION_BUFFER: usize = 64;

/// Capacity of the token queue feeding the sink.
pub const TOKEN_BUFFER: usize = 64;

/// Device callbacks the capture queue holds before new audio is dropped.
pub const CAPTURE_BUFFER: usize = 256;

/// How long a capture read waits for the device before reporting a stall.
pub const CAPTURE_TIMEOUT_MS: u64 = 2000;

/// Synthesizer sample rate in Hz.
pub const SYNTH_SAMPLE_RATE: u32 = 8000;

/// Synthesizer tone frequency in Hz.
pub const SYNTH_TONE_HZ: u32 = 1000;

/// Length of one Morse unit (a dit) in milliseconds.
///
/// 64ms at 8kHz is exactly eight 64-sample chunks per unit.
pub const SYNTH_UNIT_MS: u32 = 64;

/// Peak amplitude of the synthesized tone.
pub const SYNTH_AMPLITUDE: i32 = 8000;

/// Ratio at or below which a duration counts as one unit.
pub const ONE_UNIT_MAX_RATIO: f64 = 2.0;

/// Ratio at or below which a duration counts as three units.
pub const THREE_UNIT_MAX_RATIO: f64 = 5.0;

/// Ratio at or below which a silence counts as a word gap (seven units).
pub const SEVEN_UNIT_MAX_RATIO: f64 = 8.0;
