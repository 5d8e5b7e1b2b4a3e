//! Tone detection: sample chunks in, tone/silence events out.
//!
//! There is no fixed amplitude threshold. Each window of chunk energies is
//! split at the midpoint of its own range, so the detector follows changes
//! in transmission volume and noise floor window by window.

use crate::error::CwError;
use crate::pipeline::error::StationError;
use crate::pipeline::station::Station;
use crate::pipeline::types::{SampleChunk, TrailingPolicy};

/// RMS deviation of the samples from their mean, rounded up.
///
/// Computed as `sqrt(n·Σx² − (Σx)²) / n` in exact integer arithmetic up to
/// the final square root, so the result is 0 if and only if every sample is
/// identical. Returns `None` for an empty chunk.
pub fn compute_energy(samples: &[i32]) -> Option<u32> {
    if samples.is_empty() {
        return None;
    }

    let n = samples.len() as i128;
    let (sum, sum_sq) = samples.iter().fold((0i128, 0i128), |(sum, sum_sq), &x| {
        let x = x as i128;
        (sum + x, sum_sq + x * x)
    });

    // n² times the population variance; never negative for integer input.
    let spread = n * sum_sq - sum * sum;
    if spread <= 0 {
        return Some(0);
    }

    let rms = (spread as f64).sqrt() / n as f64;
    Some(rms.ceil().max(1.0) as u32)
}

/// Midpoint of the window's amplitude range: `min + (max - min) / 2`.
///
/// Returns `None` for an empty window.
pub fn discriminator(window: &[u32]) -> Option<u32> {
    let min = window.iter().copied().min()?;
    let max = window.iter().copied().max()?;
    Some(min + (max - min) / 2)
}

/// Quantizes a window of amplitudes against its own discriminator.
pub fn quantize(window: &[u32]) -> Vec<bool> {
    match discriminator(window) {
        Some(threshold) => window.iter().map(|&a| a >= threshold).collect(),
        None => Vec::new(),
    }
}

/// Windowed tone detector state.
///
/// Buffers exactly one window of amplitudes, quantizes it, emits every
/// event of that window, then starts over.
#[derive(Debug, Clone)]
pub struct ToneDetector {
    window: usize,
    trailing: TrailingPolicy,
    amplitudes: Vec<u32>,
    last_threshold: Option<u32>,
    windows: u64,
}

impl ToneDetector {
    /// Creates a detector with the given window size (at least 1).
    pub fn new(window: usize) -> Self {
        let window = window.max(1);
        Self {
            window,
            trailing: TrailingPolicy::default(),
            amplitudes: Vec::with_capacity(window),
            last_threshold: None,
            windows: 0,
        }
    }

    /// Sets the end-of-stream policy for a partial window.
    pub fn with_trailing(mut self, trailing: TrailingPolicy) -> Self {
        self.trailing = trailing;
        self
    }

    /// Measures one chunk and buffers its amplitude.
    ///
    /// Fails with [`CwError::EmptyChunk`] if the chunk has no samples.
    pub fn push_chunk(
        &mut self,
        chunk: &SampleChunk,
        out: &mut Vec<bool>,
    ) -> crate::error::Result<()> {
        let amplitude = compute_energy(&chunk.samples).ok_or(CwError::EmptyChunk {
            sequence: chunk.sequence,
        })?;
        self.push_amplitude(amplitude, out);
        Ok(())
    }

    /// Buffers one amplitude, emitting a full window of events when ready.
    pub fn push_amplitude(&mut self, amplitude: u32, out: &mut Vec<bool>) {
        self.amplitudes.push(amplitude);
        if self.amplitudes.len() == self.window {
            self.emit_window(out);
        }
    }

    /// Handles the partial window left at end-of-stream.
    pub fn flush(&mut self, out: &mut Vec<bool>) {
        if self.amplitudes.is_empty() {
            return;
        }
        match self.trailing {
            TrailingPolicy::Flush => match self.last_threshold {
                // Too few amplitudes to trust their own range.
                Some(threshold) if self.amplitudes.len() < self.window / 2 => {
                    tracing::debug!(
                        pending = self.amplitudes.len(),
                        threshold,
                        "flushing short tail with previous threshold"
                    );
                    out.extend(self.amplitudes.drain(..).map(|a| a >= threshold));
                }
                _ => {
                    tracing::debug!(pending = self.amplitudes.len(), "flushing partial window");
                    self.emit_window(out);
                }
            },
            TrailingPolicy::Discard => {
                tracing::debug!(pending = self.amplitudes.len(), "discarding partial window");
                self.amplitudes.clear();
            }
        }
    }

    /// Number of amplitudes waiting for the window to fill.
    pub fn pending(&self) -> usize {
        self.amplitudes.len()
    }

    /// Threshold used for the most recent window that had any contrast.
    pub fn last_threshold(&self) -> Option<u32> {
        self.last_threshold
    }

    fn emit_window(&mut self, out: &mut Vec<bool>) {
        let (Some(min), Some(max)) = (
            self.amplitudes.iter().copied().min(),
            self.amplitudes.iter().copied().max(),
        ) else {
            return;
        };

        self.windows += 1;
        if max > min {
            let threshold = min + (max - min) / 2;
            self.last_threshold = Some(threshold);
            tracing::debug!(window = self.windows, min, max, threshold, "quantized window");
            out.extend(self.amplitudes.iter().map(|&a| a >= threshold));
        } else {
            // A flat window has no contrast of its own. The bare midpoint rule
            // would call all of it tone, turning dead air into one endless dah.
            match self.last_threshold {
                Some(threshold) => {
                    tracing::debug!(window = self.windows, threshold, "flat window, reusing threshold");
                    out.extend(self.amplitudes.iter().map(|&a| a >= threshold));
                }
                None => {
                    tracing::debug!(window = self.windows, level = min, "flat window, no history: silence");
                    out.extend(std::iter::repeat_n(false, self.amplitudes.len()));
                }
            }
        }
        self.amplitudes.clear();
    }
}

/// Station wrapping a [`ToneDetector`].
pub struct ToneStation {
    detector: ToneDetector,
}

impl ToneStation {
    pub fn new(detector: ToneDetector) -> Self {
        Self { detector }
    }
}

impl Station for ToneStation {
    type Input = SampleChunk;
    type Output = bool;

    fn name(&self) -> &'static str {
        "tone-detector"
    }

    fn process(&mut self, chunk: SampleChunk, out: &mut Vec<bool>) -> Result<(), StationError> {
        self.detector
            .push_chunk(&chunk, out)
            .map_err(|e| StationError::Fatal(e.to_string()))
    }

    fn flush(&mut self, out: &mut Vec<bool>) {
        self.detector.flush(out);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tone_chunk(amplitude: i32, len: usize) -> Vec<i32> {
        (0..len)
            .map(|i| if i % 2 == 0 { amplitude } else { -amplitude })
            .collect()
    }

    #[test]
    fn test_energy_of_constant_chunk_is_zero() {
        assert_eq!(compute_energy(&[0; 64]), Some(0));
        assert_eq!(compute_energy(&[12345; 64]), Some(0));
        assert_eq!(compute_energy(&[-7]), Some(0));
    }

    #[test]
    fn test_energy_of_square_wave() {
        assert_eq!(compute_energy(&tone_chunk(1000, 64)), Some(1000));
    }

    #[test]
    fn test_energy_ignores_dc_offset() {
        let shifted: Vec<i32> = tone_chunk(1000, 64).iter().map(|x| x + 5000).collect();
        assert_eq!(compute_energy(&shifted), Some(1000));
    }

    #[test]
    fn test_energy_nonzero_for_any_variation() {
        // Population std-dev is ~0.43, which must not round to zero
        assert_eq!(compute_energy(&[0, 0, 0, 1]), Some(1));
        assert!(compute_energy(&[5, 5, 5, 5, 5, 4]).unwrap() > 0);
    }

    #[test]
    fn test_energy_never_overflows_on_extremes() {
        let extremes = tone_chunk(i32::MAX, 1024);
        let energy = compute_energy(&extremes).unwrap();
        assert!(energy >= i32::MAX as u32);
    }

    #[test]
    fn test_energy_of_empty_chunk_is_none() {
        assert_eq!(compute_energy(&[]), None);
    }

    #[test]
    fn test_quantize_midpoint_threshold() {
        // min 10, max 30 -> threshold 20, inclusive
        assert_eq!(
            quantize(&[10, 19, 20, 30]),
            vec![false, false, true, true]
        );
        assert_eq!(discriminator(&[10, 19, 20, 30]), Some(20));
    }

    #[test]
    fn test_quantize_integer_midpoint() {
        // min 0, max 5 -> threshold 2
        assert_eq!(quantize(&[0, 1, 2, 5]), vec![false, false, true, true]);
    }

    #[test]
    fn test_quantize_empty_window() {
        assert!(quantize(&[]).is_empty());
        assert_eq!(discriminator(&[]), None);
    }

    #[test]
    fn test_detector_waits_for_full_window() {
        let mut detector = ToneDetector::new(4);
        let mut out = Vec::new();

        for a in [0, 100, 100] {
            detector.push_amplitude(a, &mut out);
        }
        assert!(out.is_empty());
        assert_eq!(detector.pending(), 3);

        detector.push_amplitude(0, &mut out);
        assert_eq!(out, vec![false, true, true, false]);
        assert_eq!(detector.pending(), 0);
        assert_eq!(detector.last_threshold(), Some(50));
    }

    #[test]
    fn test_detector_recalibrates_per_window() {
        let mut detector = ToneDetector::new(4);
        let mut out = Vec::new();

        // Loud window, then a quiet one: both fully resolved
        for a in [0, 1000, 1000, 0, 0, 40, 40, 0] {
            detector.push_amplitude(a, &mut out);
        }
        assert_eq!(
            out,
            vec![false, true, true, false, false, true, true, false]
        );
        assert_eq!(detector.last_threshold(), Some(20));
    }

    #[test]
    fn test_flat_window_reuses_previous_threshold() {
        let mut detector = ToneDetector::new(2);
        let mut out = Vec::new();

        for a in [0, 100, 0, 0, 100, 100] {
            detector.push_amplitude(a, &mut out);
        }
        assert_eq!(out, vec![false, true, false, false, true, true]);
    }

    #[test]
    fn test_flat_window_without_history_is_silence() {
        let mut detector = ToneDetector::new(3);
        let mut out = Vec::new();
        for _ in 0..3 {
            detector.push_amplitude(0, &mut out);
        }
        assert_eq!(out, vec![false, false, false]);
        assert_eq!(detector.last_threshold(), None);
    }

    #[test]
    fn test_flush_partial_window() {
        let mut detector = ToneDetector::new(100);
        let mut out = Vec::new();
        for a in [0, 80, 80, 0, 0] {
            detector.push_amplitude(a, &mut out);
        }
        detector.flush(&mut out);
        assert_eq!(out, vec![false, true, true, false, false]);
        assert_eq!(detector.pending(), 0);
    }

    #[test]
    fn test_short_tail_reuses_previous_threshold() {
        let mut detector = ToneDetector::new(10);
        let mut out = Vec::new();
        for a in [0, 100, 100, 0, 0, 100, 0, 0, 100, 0] {
            detector.push_amplitude(a, &mut out);
        }
        assert_eq!(detector.last_threshold(), Some(50));

        // Noise-floor jitter: split at its own midpoint, 7 and 9 would be tone
        for a in [5, 9, 7] {
            detector.push_amplitude(a, &mut out);
        }
        detector.flush(&mut out);
        assert_eq!(&out[10..], &[false, false, false]);
        assert_eq!(detector.last_threshold(), Some(50));
    }

    #[test]
    fn test_long_tail_uses_its_own_range() {
        let mut detector = ToneDetector::new(10);
        let mut out = Vec::new();
        for a in [0, 100, 100, 0, 0, 100, 0, 0, 100, 0] {
            detector.push_amplitude(a, &mut out);
        }
        for a in [2, 20, 20, 2, 2] {
            detector.push_amplitude(a, &mut out);
        }
        detector.flush(&mut out);
        assert_eq!(&out[10..], &[false, true, true, false, false]);
        assert_eq!(detector.last_threshold(), Some(11));
    }

    #[test]
    fn test_discard_partial_window() {
        let mut detector = ToneDetector::new(100).with_trailing(TrailingPolicy::Discard);
        let mut out = Vec::new();
        for a in [0, 80, 80, 0, 0] {
            detector.push_amplitude(a, &mut out);
        }
        detector.flush(&mut out);
        assert!(out.is_empty());
        assert_eq!(detector.pending(), 0);
    }

    #[test]
    fn test_flush_with_nothing_pending() {
        let mut detector = ToneDetector::new(2);
        let mut out = Vec::new();
        detector.push_amplitude(0, &mut out);
        detector.push_amplitude(9, &mut out);
        detector.flush(&mut out);
        assert_eq!(out, vec![false, true]);
    }

    #[test]
    fn test_push_empty_chunk_is_contract_violation() {
        let mut detector = ToneDetector::new(4);
        let mut out = Vec::new();
        let result = detector.push_chunk(&SampleChunk::new(Vec::new(), 42), &mut out);
        assert!(matches!(result, Err(CwError::EmptyChunk { sequence: 42 })));
    }

    #[test]
    fn test_station_maps_empty_chunk_to_fatal() {
        let mut station = ToneStation::new(ToneDetector::new(2));
        let mut out = Vec::new();

        station
            .process(SampleChunk::new(tone_chunk(500, 8), 0), &mut out)
            .unwrap();
        let err = station
            .process(SampleChunk::new(Vec::new(), 1), &mut out)
            .unwrap_err();
        assert!(matches!(err, StationError::Fatal(msg) if msg.contains("#1")));
    }

    #[test]
    fn test_station_emits_one_event_per_chunk() {
        let mut station = ToneStation::new(ToneDetector::new(4));
        let mut out = Vec::new();
        let chunks = [tone_chunk(900, 16), vec![0; 16], tone_chunk(900, 16), vec![0; 16]];
        for (i, samples) in chunks.into_iter().enumerate() {
            station
                .process(SampleChunk::new(samples, i as u64), &mut out)
                .unwrap();
        }
        assert_eq!(out, vec![true, false, true, false]);
        assert_eq!(station.name(), "tone-detector");
    }
}
