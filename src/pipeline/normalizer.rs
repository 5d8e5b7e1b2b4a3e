//! Unit normalization: finds the local dit length and expresses every run
//! as a canonical Morse unit count.
//!
//! Runs are taken in groups. The unit is estimated once per group and applied
//! to every run in it, so the time base can drift across the stream and each
//! group recalibrates. Output lags by one group and is never revised.

use crate::defaults::{ONE_UNIT_MAX_RATIO, SEVEN_UNIT_MAX_RATIO, THREE_UNIT_MAX_RATIO};
use crate::pipeline::error::StationError;
use crate::pipeline::station::Station;
use crate::pipeline::types::{Canonical, Run, TrailingPolicy};

/// Estimates the one-unit duration of a group: the 25th percentile.
///
/// One-unit intra-character gaps are the most common symbol in well-formed
/// Morse, so they fill the bottom of the sorted durations. Taking the value
/// at index `len / 4` rather than the minimum skips the odd runt produced by
/// quantization noise. Returns `None` for an empty group.
pub fn estimate_unit(durations: &[u32]) -> Option<u32> {
    let mut sorted = durations.to_vec();
    sorted.sort_unstable();
    sorted.get(sorted.len() / 4).copied()
}

/// Duration expressed in units, in floating point.
pub fn normalize(duration: u32, unit: u32) -> f64 {
    duration as f64 / unit as f64
}

/// Maps a unit ratio onto a canonical duration.
///
/// Band edges are inclusive on the lower band: 2.0 is one unit, 5.0 is
/// three, 8.0 is seven. Tones have no valid length beyond three units.
pub fn clamp(ratio: f64, tone: bool) -> Canonical {
    if ratio <= ONE_UNIT_MAX_RATIO {
        Canonical::One
    } else if ratio <= THREE_UNIT_MAX_RATIO {
        Canonical::Three
    } else if tone {
        Canonical::Unclassifiable
    } else if ratio <= SEVEN_UNIT_MAX_RATIO {
        Canonical::Seven
    } else {
        Canonical::Ten
    }
}

/// Grouped unit normalizer state.
#[derive(Debug, Clone)]
pub struct UnitNormalizer {
    group_size: usize,
    trailing: TrailingPolicy,
    group: Vec<Run>,
    /// Set once the first tone run arrives; silence before it is dropped.
    aligned: bool,
    last_unit: Option<u32>,
}

impl UnitNormalizer {
    /// Creates a normalizer with the given group size (at least 1).
    pub fn new(group_size: usize) -> Self {
        let group_size = group_size.max(1);
        Self {
            group_size,
            trailing: TrailingPolicy::default(),
            group: Vec::with_capacity(group_size),
            aligned: false,
            last_unit: None,
        }
    }

    /// Sets the end-of-stream policy for a partial group.
    pub fn with_trailing(mut self, trailing: TrailingPolicy) -> Self {
        self.trailing = trailing;
        self
    }

    /// Buffers one run, emitting a whole group when it fills.
    pub fn push(&mut self, run: Run, out: &mut Vec<Canonical>) {
        if !self.aligned {
            if !run.tone {
                tracing::debug!(duration = run.duration, "dropping leading silence");
                return;
            }
            self.aligned = true;
        }

        self.group.push(run);
        if self.group.len() == self.group_size {
            self.emit_group(out);
        }
    }

    /// Handles the partial group left at end-of-stream.
    pub fn flush(&mut self, out: &mut Vec<Canonical>) {
        if self.group.is_empty() {
            return;
        }
        match self.trailing {
            TrailingPolicy::Flush => match self.last_unit {
                // Too few runs for a percentile of their own.
                Some(unit) if self.group.len() < self.group_size / 2 => {
                    tracing::debug!(pending = self.group.len(), unit, "flushing short tail with previous unit");
                    self.emit_with_unit(unit, out);
                }
                _ => {
                    tracing::debug!(pending = self.group.len(), "flushing partial group");
                    self.emit_group(out);
                }
            },
            TrailingPolicy::Discard => {
                tracing::debug!(pending = self.group.len(), "discarding partial group");
                self.group.clear();
            }
        }
    }

    /// Runs waiting for the group to fill.
    pub fn pending(&self) -> usize {
        self.group.len()
    }

    /// Unit estimated for the most recent group.
    pub fn last_unit(&self) -> Option<u32> {
        self.last_unit
    }

    fn emit_group(&mut self, out: &mut Vec<Canonical>) {
        let durations: Vec<u32> = self.group.iter().map(|r| r.duration).collect();
        let Some(unit) = estimate_unit(&durations) else {
            return;
        };
        tracing::debug!(unit, runs = durations.len(), "estimated unit");
        self.last_unit = Some(unit);
        self.emit_with_unit(unit, out);
    }

    fn emit_with_unit(&mut self, unit: u32, out: &mut Vec<Canonical>) {
        out.extend(
            self.group
                .drain(..)
                .map(|run| clamp(normalize(run.duration, unit), run.tone)),
        );
    }
}

/// Station wrapping a [`UnitNormalizer`].
pub struct NormalizerStation {
    normalizer: UnitNormalizer,
}

impl NormalizerStation {
    pub fn new(normalizer: UnitNormalizer) -> Self {
        Self { normalizer }
    }
}

impl Station for NormalizerStation {
    type Input = Run;
    type Output = Canonical;

    fn name(&self) -> &'static str {
        "normalizer"
    }

    fn process(&mut self, run: Run, out: &mut Vec<Canonical>) -> Result<(), StationError> {
        self.normalizer.push(run, out);
        Ok(())
    }

    fn flush(&mut self, out: &mut Vec<Canonical>) {
        self.normalizer.flush(out);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_estimate_unit_takes_25th_percentile() {
        // sorted: 1 1 2 3 3 3 7 9 -> index 2
        assert_eq!(estimate_unit(&[3, 1, 7, 3, 9, 1, 2, 3]), Some(2));
        // len 3 -> index 0, the minimum
        assert_eq!(estimate_unit(&[5, 4, 6]), Some(4));
        assert_eq!(estimate_unit(&[8]), Some(8));
        assert_eq!(estimate_unit(&[]), None);
    }

    #[test]
    fn test_estimate_unit_is_scale_invariant() {
        let group = [4, 4, 12, 4, 12, 4, 28, 4, 12, 12, 4, 4, 40, 4, 12, 4, 4, 12, 4, 28];
        let unit = estimate_unit(&group).unwrap();
        for k in [2, 3, 7, 25] {
            let scaled: Vec<u32> = group.iter().map(|d| d * k).collect();
            assert_eq!(estimate_unit(&scaled), Some(unit * k));
        }
    }

    #[test]
    fn test_estimate_unit_does_not_mutate_input() {
        let group = vec![9, 1, 5];
        estimate_unit(&group);
        assert_eq!(group, vec![9, 1, 5]);
    }

    #[test]
    fn test_normalize_keeps_fractions() {
        assert_eq!(normalize(2, 4), 0.5);
        assert_eq!(normalize(10, 4), 2.5);
        assert_eq!(normalize(21, 3), 7.0);
    }

    #[test]
    fn test_clamp_tone_bands() {
        assert_eq!(clamp(0.5, true), Canonical::One);
        assert_eq!(clamp(2.0, true), Canonical::One);
        assert_eq!(clamp(2.01, true), Canonical::Three);
        assert_eq!(clamp(5.0, true), Canonical::Three);
        assert_eq!(clamp(5.5, true), Canonical::Unclassifiable);
        assert_eq!(clamp(8.0, true), Canonical::Unclassifiable);
        assert_eq!(clamp(30.0, true), Canonical::Unclassifiable);
    }

    #[test]
    fn test_clamp_silence_bands() {
        assert_eq!(clamp(1.0, false), Canonical::One);
        assert_eq!(clamp(2.0, false), Canonical::One);
        assert_eq!(clamp(3.0, false), Canonical::Three);
        assert_eq!(clamp(5.0, false), Canonical::Three);
        assert_eq!(clamp(5.01, false), Canonical::Seven);
        assert_eq!(clamp(8.0, false), Canonical::Seven);
        assert_eq!(clamp(8.01, false), Canonical::Ten);
        assert_eq!(clamp(f64::INFINITY, false), Canonical::Ten);
    }

    #[test]
    fn test_group_waits_then_emits_in_order() {
        let mut normalizer = UnitNormalizer::new(4);
        let mut out = Vec::new();

        normalizer.push(Run::tone(5), &mut out);
        normalizer.push(Run::silence(5), &mut out);
        normalizer.push(Run::tone(15), &mut out);
        assert!(out.is_empty());
        assert_eq!(normalizer.pending(), 3);

        normalizer.push(Run::silence(35), &mut out);
        assert_eq!(
            out,
            vec![
                Canonical::One,
                Canonical::One,
                Canonical::Three,
                Canonical::Seven
            ]
        );
        assert_eq!(normalizer.last_unit(), Some(5));
    }

    #[test]
    fn test_each_group_recalibrates() {
        let mut normalizer = UnitNormalizer::new(4);
        let mut out = Vec::new();

        // Unit 2, then the sender slows down to unit 10
        for run in [Run::tone(2), Run::silence(2), Run::tone(6), Run::silence(6)] {
            normalizer.push(run, &mut out);
        }
        assert_eq!(normalizer.last_unit(), Some(2));
        for run in [Run::tone(10), Run::silence(10), Run::tone(30), Run::silence(70)] {
            normalizer.push(run, &mut out);
        }
        assert_eq!(normalizer.last_unit(), Some(10));

        assert_eq!(
            out,
            vec![
                Canonical::One,
                Canonical::One,
                Canonical::Three,
                Canonical::Three,
                Canonical::One,
                Canonical::One,
                Canonical::Three,
                Canonical::Seven,
            ]
        );
    }

    #[test]
    fn test_leading_silence_is_dropped() {
        let mut normalizer = UnitNormalizer::new(2);
        let mut out = Vec::new();

        normalizer.push(Run::silence(400), &mut out);
        assert_eq!(normalizer.pending(), 0);

        normalizer.push(Run::tone(4), &mut out);
        normalizer.push(Run::silence(12), &mut out);
        assert_eq!(out, vec![Canonical::One, Canonical::Three]);
    }

    #[test]
    fn test_flush_partial_group_uses_partial_statistics() {
        let mut normalizer = UnitNormalizer::new(20);
        let mut out = Vec::new();
        for run in [Run::tone(3), Run::silence(3), Run::tone(9)] {
            normalizer.push(run, &mut out);
        }
        normalizer.flush(&mut out);
        assert_eq!(out, vec![Canonical::One, Canonical::One, Canonical::Three]);
        assert_eq!(normalizer.last_unit(), Some(3));
    }

    #[test]
    fn test_short_tail_reuses_previous_unit() {
        let mut normalizer = UnitNormalizer::new(4);
        let mut out = Vec::new();
        for run in [Run::tone(4), Run::silence(4), Run::tone(12), Run::silence(12)] {
            normalizer.push(run, &mut out);
        }
        assert_eq!(normalizer.last_unit(), Some(4));

        // A lone dah: on its own statistics it would be one unit long
        normalizer.push(Run::tone(12), &mut out);
        normalizer.flush(&mut out);
        assert_eq!(out[4], Canonical::Three);
        assert_eq!(normalizer.last_unit(), Some(4));
    }

    #[test]
    fn test_long_tail_estimates_its_own_unit() {
        let mut normalizer = UnitNormalizer::new(4);
        let mut out = Vec::new();
        for run in [Run::tone(4), Run::silence(4), Run::tone(12), Run::silence(12)] {
            normalizer.push(run, &mut out);
        }
        // Half a group or more recalibrates: the sender slowed to unit 8
        normalizer.push(Run::tone(8), &mut out);
        normalizer.push(Run::silence(24), &mut out);
        normalizer.flush(&mut out);
        assert_eq!(&out[4..], &[Canonical::One, Canonical::Three]);
        assert_eq!(normalizer.last_unit(), Some(8));
    }

    #[test]
    fn test_discard_partial_group() {
        let mut normalizer = UnitNormalizer::new(20).with_trailing(TrailingPolicy::Discard);
        let mut out = Vec::new();
        for run in [Run::tone(3), Run::silence(3), Run::tone(9)] {
            normalizer.push(run, &mut out);
        }
        normalizer.flush(&mut out);
        assert!(out.is_empty());
        assert_eq!(normalizer.pending(), 0);
    }

    #[test]
    fn test_station_delegates() {
        let mut station = NormalizerStation::new(UnitNormalizer::new(2));
        let mut out = Vec::new();
        station.process(Run::tone(1), &mut out).unwrap();
        station.process(Run::silence(3), &mut out).unwrap();
        station.process(Run::tone(3), &mut out).unwrap();
        station.flush(&mut out);
        assert_eq!(out, vec![Canonical::One, Canonical::Three, Canonical::One]);
        assert_eq!(station.name(), "normalizer");
    }
}
