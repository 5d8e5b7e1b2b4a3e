//! Single-threaded decoder: the four stages chained by direct calls.
//!
//! Produces the same tokens as the threaded [`Pipeline`](crate::Pipeline)
//! without spawning anything. Handy for tests, benches, and embedding in a
//! caller that already owns its own loop.

use crate::error::Result;
use crate::pipeline::classifier::TokenClassifier;
use crate::pipeline::normalizer::UnitNormalizer;
use crate::pipeline::orchestrator::PipelineConfig;
use crate::pipeline::rhythm::RhythmEncoder;
use crate::pipeline::tone_detector::ToneDetector;
use crate::pipeline::types::{Canonical, SampleChunk, Token};

/// Pull-through decoder holding one instance of each stage.
#[derive(Debug, Clone)]
pub struct Decoder {
    detector: ToneDetector,
    encoder: RhythmEncoder,
    normalizer: UnitNormalizer,
    classifier: TokenClassifier,
    events: Vec<bool>,
    durations: Vec<Canonical>,
    sequence: u64,
}

impl Decoder {
    pub fn new(config: &PipelineConfig) -> Self {
        Self {
            detector: ToneDetector::new(config.window).with_trailing(config.trailing),
            encoder: RhythmEncoder::new(),
            normalizer: UnitNormalizer::new(config.group_size).with_trailing(config.trailing),
            classifier: TokenClassifier::new(),
            events: Vec::new(),
            durations: Vec::new(),
            sequence: 0,
        }
    }

    /// Feeds one chunk of samples, appending any tokens it completes.
    pub fn push_samples(&mut self, samples: Vec<i32>, out: &mut Vec<Token>) -> Result<()> {
        let chunk = SampleChunk::new(samples, self.sequence);
        self.sequence += 1;
        self.push_chunk(&chunk, out)
    }

    /// Feeds one chunk, appending any tokens it completes.
    pub fn push_chunk(&mut self, chunk: &SampleChunk, out: &mut Vec<Token>) -> Result<()> {
        self.detector.push_chunk(chunk, &mut self.events)?;
        self.drain_events(out);
        Ok(())
    }

    /// Ends the stream, flushing every stage in order.
    pub fn finish(mut self, out: &mut Vec<Token>) {
        self.detector.flush(&mut self.events);
        self.drain_events(out);

        if let Some(run) = self.encoder.finish() {
            self.normalizer.push(run, &mut self.durations);
        }
        self.normalizer.flush(&mut self.durations);
        self.drain_durations(out);
    }

    fn drain_events(&mut self, out: &mut Vec<Token>) {
        for tone in self.events.drain(..) {
            if let Some(run) = self.encoder.push(tone) {
                self.normalizer.push(run, &mut self.durations);
            }
        }
        self.drain_durations(out);
    }

    fn drain_durations(&mut self, out: &mut Vec<Token>) {
        out.extend(self.durations.drain(..).map(|d| self.classifier.classify(d)));
    }
}

/// Decodes a finite sequence of sample chunks to completion.
pub fn decode<I>(chunks: I, config: &PipelineConfig) -> Result<Vec<Token>>
where
    I: IntoIterator<Item = Vec<i32>>,
{
    let mut decoder = Decoder::new(config);
    let mut tokens = Vec::new();
    for samples in chunks {
        decoder.push_samples(samples, &mut tokens)?;
    }
    decoder.finish(&mut tokens);
    Ok(tokens)
}
