//! Rhythm encoding: run-length encodes the tone event stream.
//!
//! `0001100111100` becomes `[3 silence, 2 tone, 2 silence, 4 tone, 2 silence]`,
//! the "rhythm" of the keyed message.

use crate::pipeline::error::StationError;
use crate::pipeline::station::Station;
use crate::pipeline::types::Run;

/// Online run-length encoder.
///
/// The first run takes the state of the first event; there is no assumed
/// initial state, so no zero-length run is ever produced.
#[derive(Debug, Clone, Default)]
pub struct RhythmEncoder {
    current: Option<Run>,
}

impl RhythmEncoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feeds one event. Returns the run it completed, if any.
    pub fn push(&mut self, tone: bool) -> Option<Run> {
        if let Some(run) = self.current.as_mut()
            && run.tone == tone
        {
            run.duration = run.duration.saturating_add(1);
            return None;
        }
        self.current.replace(Run::new(tone, 1))
    }

    /// Ends the stream, returning the outstanding run.
    pub fn finish(&mut self) -> Option<Run> {
        self.current.take()
    }

    /// The run being counted, if any.
    pub fn current(&self) -> Option<Run> {
        self.current
    }
}

/// Run-length encodes a whole event sequence.
pub fn encode(events: &[bool]) -> Vec<Run> {
    let mut encoder = RhythmEncoder::new();
    let mut runs: Vec<Run> = events.iter().filter_map(|&e| encoder.push(e)).collect();
    runs.extend(encoder.finish());
    runs
}

/// Expands runs back into the event sequence they encode.
pub fn expand(runs: &[Run]) -> Vec<bool> {
    runs.iter()
        .flat_map(|run| std::iter::repeat_n(run.tone, run.duration as usize))
        .collect()
}

/// Station wrapping a [`RhythmEncoder`].
#[derive(Default)]
pub struct RhythmStation {
    encoder: RhythmEncoder,
}

impl RhythmStation {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Station for RhythmStation {
    type Input = bool;
    type Output = Run;

    fn name(&self) -> &'static str {
        "rhythm"
    }

    fn process(&mut self, tone: bool, out: &mut Vec<Run>) -> Result<(), StationError> {
        if let Some(run) = self.encoder.push(tone) {
            tracing::trace!(tone = run.tone, duration = run.duration, "run");
            out.push(run);
        }
        Ok(())
    }

    fn flush(&mut self, out: &mut Vec<Run>) {
        out.extend(self.encoder.finish());
    }
}
