//! Keyed tone synthesizer.
//!
//! Turns a dit/dah pattern into audio samples, giving the decoder a
//! deterministic source to run against without a radio or microphone.
//!
//! Pattern syntax:
//! - `.` dit, `-` or `_` dah
//! - whitespace: letter gap (3 units)
//! - `/` word gap (7 units)
//! - `|` pause (10 units)
//!
//! Tones inside a letter are separated by a one-unit gap automatically.
//! Adjacent gap symbols merge into the longest of them, so `... / ...` is
//! a single word gap.

use crate::defaults;
use crate::error::{CwError, Result};
use crate::pipeline::types::Run;
use serde::{Deserialize, Serialize};
use std::f64::consts::TAU;
use std::path::Path;

/// Synthesizer settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SynthConfig {
    pub sample_rate: u32,
    pub tone_hz: u32,
    pub unit_ms: u32,
    pub amplitude: i32,
}

impl Default for SynthConfig {
    fn default() -> Self {
        Self {
            sample_rate: defaults::SYNTH_SAMPLE_RATE,
            tone_hz: defaults::SYNTH_TONE_HZ,
            unit_ms: defaults::SYNTH_UNIT_MS,
            amplitude: defaults::SYNTH_AMPLITUDE,
        }
    }
}

impl SynthConfig {
    /// Samples in one Morse unit (at least 1).
    pub fn samples_per_unit(&self) -> usize {
        ((self.sample_rate as u64 * self.unit_ms as u64) / 1000).max(1) as usize
    }
}

/// Parses a keying pattern into runs measured in units.
pub fn parse_pattern(pattern: &str) -> Result<Vec<Run>> {
    let mut runs: Vec<Run> = Vec::new();
    let mut pending_gap: Option<u32> = None;

    for (position, symbol) in pattern.chars().enumerate() {
        let tone_units = match symbol {
            '.' => Some(1),
            '-' | '_' => Some(3),
            _ => None,
        };

        if let Some(units) = tone_units {
            let after_tone = runs.last().is_some_and(|r| r.tone);
            match pending_gap.take() {
                Some(gap) => runs.push(Run::silence(gap)),
                None if after_tone => runs.push(Run::silence(1)),
                None => {}
            }
            runs.push(Run::tone(units));
            continue;
        }

        let gap = match symbol {
            c if c.is_whitespace() => 3,
            '/' => 7,
            '|' => 10,
            _ => return Err(CwError::InvalidPattern { symbol, position }),
        };
        pending_gap = Some(pending_gap.map_or(gap, |g| g.max(gap)));
    }

    if let Some(gap) = pending_gap {
        runs.push(Run::silence(gap));
    }
    Ok(runs)
}

/// Renders unit runs as samples: a sine for tone, zeros for silence.
///
/// The sine phase runs continuously across the whole signal.
pub fn render(runs: &[Run], config: &SynthConfig) -> Vec<i32> {
    let per_unit = config.samples_per_unit();
    let total: usize = runs.iter().map(|r| r.duration as usize * per_unit).sum();
    let step = TAU * config.tone_hz as f64 / config.sample_rate.max(1) as f64;
    let amplitude = config.amplitude as f64;

    let mut samples = Vec::with_capacity(total);
    for run in runs {
        let len = run.duration as usize * per_unit;
        if run.tone {
            let start = samples.len();
            samples.extend((start..start + len).map(|n| (amplitude * (step * n as f64).sin()) as i32));
        } else {
            samples.extend(std::iter::repeat_n(0, len));
        }
    }
    samples
}

/// Parses and renders a pattern in one step.
pub fn synthesize(pattern: &str, config: &SynthConfig) -> Result<Vec<i32>> {
    Ok(render(&parse_pattern(pattern)?, config))
}

/// Renders a pattern straight into a mono 16-bit WAV file.
pub fn write_pattern_wav(path: &Path, pattern: &str, config: &SynthConfig) -> Result<usize> {
    let samples = synthesize(pattern, config)?;
    crate::audio::wav::write_wav(path, &samples, config.sample_rate)?;
    Ok(samples.len())
}
