//! Threaded decoder pipeline: SampleSource → Tone → Rhythm → Normalizer → Classifier → TokenSink.

use crate::audio::source::SampleSource;
use crate::defaults;
use crate::error::{CwError, Result};
use crate::pipeline::classifier::ClassifierStation;
use crate::pipeline::error::{ErrorReporter, LogReporter, StationError};
use crate::pipeline::normalizer::{NormalizerStation, UnitNormalizer};
use crate::pipeline::rhythm::RhythmStation;
use crate::pipeline::sink::{PipelineReport, SinkStation, TokenSink};
use crate::pipeline::station::{Station, StationRunner};
use crate::pipeline::tone_detector::{ToneDetector, ToneStation};
use crate::pipeline::types::{SampleChunk, TrailingPolicy};
use crossbeam_channel::{Sender, bounded};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// Source reads that may fail back to back before the pipeline gives up.
const MAX_CONSECUTIVE_ERRORS: u32 = 10;

/// Pause between retries of a failing source read.
const RETRY_INTERVAL: Duration = Duration::from_millis(20);

/// Configuration for the pipeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineConfig {
    /// Amplitudes per tone detector window
    pub window: usize,
    /// Runs per normalizer group
    pub group_size: usize,
    /// What the windowed stages do with a partial window at end-of-stream
    pub trailing: TrailingPolicy,
    /// Channel buffer sizes. Zero makes a rendezvous channel.
    pub chunk_buffer: usize,
    pub event_buffer: usize,
    pub run_buffer: usize,
    pub duration_buffer: usize,
    pub token_buffer: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            window: defaults::WINDOW,
            group_size: defaults::GROUP_SIZE,
            trailing: TrailingPolicy::default(),
            chunk_buffer: defaults::CHUNK_BUFFER,
            event_buffer: defaults::EVENT_BUFFER,
            run_buffer: defaults::RUN_BUFFER,
            duration_buffer: defaults::DURATION_BUFFER,
            token_buffer: defaults::TOKEN_BUFFER,
        }
    }
}

/// Type-erased station runner so the handle can join all four in order.
trait JoinStation: Send {
    fn station_name(&self) -> &'static str;
    fn join_station(self: Box<Self>) -> std::result::Result<Option<StationError>, String>;
}

impl<S: Station> JoinStation for StationRunner<S> {
    fn station_name(&self) -> &'static str {
        self.name()
    }

    fn join_station(self: Box<Self>) -> std::result::Result<Option<StationError>, String> {
        self.join()
    }
}

/// Handle to a running pipeline.
pub struct PipelineHandle {
    /// Flag to signal shutdown
    running: Arc<AtomicBool>,
    /// Source polling thread; yields the number of chunks sent
    source: JoinHandle<Result<u64>>,
    /// Station runners in stream order
    stations: Vec<Box<dyn JoinStation>>,
    /// Terminal sink thread
    sink: JoinHandle<Result<PipelineReport>>,
}

impl PipelineHandle {
    /// Waits for the stream to drain and every thread to finish.
    ///
    /// A finite source ends the run on its own; a live source needs
    /// [`stop`](Self::stop). The first failure in stream order wins:
    /// source, then stations, then the sink.
    pub fn wait(self) -> Result<PipelineReport> {
        let source_result = match self.source.join() {
            Ok(result) => result,
            Err(_) => Err(CwError::AudioSource {
                message: "source thread panicked".to_string(),
            }),
        };

        let mut station_failure = None;
        for runner in self.stations {
            let station = runner.station_name();
            let failure = match runner.join_station() {
                Ok(None) => None,
                Ok(Some(error)) => Some(CwError::StationFailed {
                    station: station.to_string(),
                    message: error.to_string(),
                }),
                Err(message) => Some(CwError::StationFailed {
                    station: station.to_string(),
                    message,
                }),
            };
            if station_failure.is_none() {
                station_failure = failure;
            }
        }

        let sink_result = match self.sink.join() {
            Ok(result) => result,
            Err(_) => Err(CwError::Sink {
                message: "sink thread panicked".to_string(),
            }),
        };

        self.running.store(false, Ordering::SeqCst);

        let chunks = source_result?;
        if let Some(error) = station_failure {
            return Err(error);
        }
        let report = sink_result?;
        tracing::info!(
            chunks,
            tokens = report.tokens,
            errors = report.errors,
            "pipeline finished"
        );
        Ok(report)
    }

    /// Stops reading the source, then drains and flushes like end-of-stream.
    pub fn stop(self) -> Result<PipelineReport> {
        self.running.store(false, Ordering::SeqCst);
        self.wait()
    }

    /// Returns true until the source stops or [`stop`](Self::stop) is called.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst) && !self.source.is_finished()
    }
}

/// Decoder pipeline, one thread per stage.
pub struct Pipeline {
    config: PipelineConfig,
    error_reporter: Arc<dyn ErrorReporter>,
}

impl Pipeline {
    /// Creates a new pipeline with default error reporter.
    pub fn new(config: PipelineConfig) -> Self {
        Self {
            config,
            error_reporter: Arc::new(LogReporter),
        }
    }

    /// Sets a custom error reporter.
    pub fn with_error_reporter(mut self, reporter: Arc<dyn ErrorReporter>) -> Self {
        self.error_reporter = reporter;
        self
    }

    /// Starts the pipeline.
    ///
    /// # Arguments
    /// * `source` - Where sample chunks come from
    /// * `sink` - Token output handler (writer, collector, etc.)
    ///
    /// # Returns
    /// Handle to wait for or stop the pipeline
    pub fn start(
        self,
        source: Box<dyn SampleSource>,
        sink: Box<dyn TokenSink>,
    ) -> Result<PipelineHandle> {
        let config = &self.config;
        let running = Arc::new(AtomicBool::new(true));

        // Create channels between stations
        let (chunk_tx, chunk_rx) = bounded(config.chunk_buffer);
        let (event_tx, event_rx) = bounded(config.event_buffer);
        let (run_tx, run_rx) = bounded(config.run_buffer);
        let (duration_tx, duration_rx) = bounded(config.duration_buffer);
        let (token_tx, token_rx) = bounded(config.token_buffer);

        // Sink first so nothing upstream blocks on a missing consumer
        let sink = SinkStation::new(sink).spawn(token_rx)?;

        let detector = ToneDetector::new(config.window).with_trailing(config.trailing);
        let normalizer = UnitNormalizer::new(config.group_size).with_trailing(config.trailing);

        let stations: Vec<Box<dyn JoinStation>> = vec![
            Box::new(StationRunner::spawn(
                ToneStation::new(detector),
                chunk_rx,
                event_tx,
                self.error_reporter.clone(),
            )),
            Box::new(StationRunner::spawn(
                RhythmStation::new(),
                event_rx,
                run_tx,
                self.error_reporter.clone(),
            )),
            Box::new(StationRunner::spawn(
                NormalizerStation::new(normalizer),
                run_rx,
                duration_tx,
                self.error_reporter.clone(),
            )),
            Box::new(StationRunner::spawn(
                ClassifierStation::new(),
                duration_rx,
                token_tx,
                self.error_reporter.clone(),
            )),
        ];

        tracing::debug!(
            window = config.window,
            group_size = config.group_size,
            trailing = ?config.trailing,
            "pipeline started"
        );

        let source_running = running.clone();
        let source = thread::Builder::new()
            .name("cw-source".to_string())
            .spawn(move || run_source(source, chunk_tx, source_running))?;

        Ok(PipelineHandle {
            running,
            source,
            stations,
            sink,
        })
    }

    /// Runs the pipeline until a finite source is exhausted.
    ///
    /// A live source would never return; start it and [`PipelineHandle::stop`] it instead.
    pub fn run(
        self,
        source: Box<dyn SampleSource>,
        sink: Box<dyn TokenSink>,
    ) -> Result<PipelineReport> {
        if !source.is_finite() {
            return Err(CwError::AudioSource {
                message: "live source never ends, start the pipeline and stop it".to_string(),
            });
        }
        self.start(source, sink)?.wait()
    }
}

/// Source polling loop. Dropping `chunk_tx` on return is the end-of-stream signal.
fn run_source(
    mut source: Box<dyn SampleSource>,
    chunk_tx: Sender<SampleChunk>,
    running: Arc<AtomicBool>,
) -> Result<u64> {
    let mut consecutive_errors: u32 = 0;
    let mut sequence: u64 = 0;

    while running.load(Ordering::SeqCst) {
        let samples = match source.next_chunk() {
            Ok(Some(samples)) => {
                consecutive_errors = 0;
                samples
            }
            Ok(None) => break,
            Err(e) => {
                consecutive_errors += 1;
                tracing::warn!(attempt = consecutive_errors, "source read failed: {}", e);
                if consecutive_errors >= MAX_CONSECUTIVE_ERRORS {
                    running.store(false, Ordering::SeqCst);
                    return Err(CwError::AudioSource {
                        message: format!("failed {consecutive_errors} times in a row: {e}"),
                    });
                }
                thread::sleep(RETRY_INTERVAL);
                continue;
            }
        };

        // Blocking send: a slow consumer holds the source back instead of losing audio
        if chunk_tx.send(SampleChunk::new(samples, sequence)).is_err() {
            tracing::debug!("tone detector gone, source stopping");
            break;
        }
        sequence += 1;
    }

    tracing::debug!(chunks = sequence, "source finished");
    Ok(sequence)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::source::{MemorySource, MockSource};
    use crate::pipeline::decoder::decode;
    use crate::pipeline::sink::CollectorSink;
    use crate::pipeline::types::Token;

    /// Square-wave tone chunk or silent chunk.
    fn chunk(tone: bool) -> Vec<i32> {
        (0..8)
            .map(|i| match (tone, i % 2) {
                (false, _) => 0,
                (true, 0) => 1500,
                (true, _) => -1500,
            })
            .collect()
    }

    /// Alternating "N" letters (dah dit) at 2 chunks per unit.
    fn letters_n(count: usize) -> Vec<i32> {
        let mut samples = Vec::new();
        for _ in 0..count {
            for (tone, units) in [(true, 3), (false, 1), (true, 1), (false, 3)] {
                for _ in 0..units * 2 {
                    samples.extend(chunk(tone));
                }
            }
        }
        samples
    }

    fn small_config() -> PipelineConfig {
        PipelineConfig {
            window: 12,
            group_size: 8,
            ..PipelineConfig::default()
        }
    }

    #[test]
    fn test_default_config() {
        let config = PipelineConfig::default();
        assert_eq!(config.window, 100);
        assert_eq!(config.group_size, 20);
        assert_eq!(config.trailing, TrailingPolicy::Flush);
    }

    #[test]
    fn test_threaded_pipeline_matches_decoder() {
        let samples = letters_n(8);
        let config = small_config();

        let expected = decode(
            samples.chunks(8).map(|c| c.to_vec()).collect::<Vec<_>>(),
            &config,
        )
        .unwrap();

        let sink = CollectorSink::new();
        let tokens = sink.tokens();
        let report = Pipeline::new(config)
            .run(
                Box::new(MemorySource::with_chunk_size(samples, 8)),
                Box::new(sink),
            )
            .unwrap();

        assert_eq!(*tokens.lock().unwrap(), expected);
        assert_eq!(report.tokens, expected.len());
        assert!(report.dahs > 0);
    }

    #[test]
    fn test_rendezvous_channels() {
        let samples = letters_n(4);
        let config = PipelineConfig {
            chunk_buffer: 0,
            event_buffer: 0,
            run_buffer: 0,
            duration_buffer: 0,
            token_buffer: 0,
            ..small_config()
        };
        let expected = decode(
            samples.chunks(8).map(|c| c.to_vec()).collect::<Vec<_>>(),
            &config,
        )
        .unwrap();

        let sink = CollectorSink::new();
        let tokens = sink.tokens();
        Pipeline::new(config)
            .run(
                Box::new(MemorySource::with_chunk_size(samples, 8)),
                Box::new(sink),
            )
            .unwrap();
        assert_eq!(*tokens.lock().unwrap(), expected);
    }

    #[test]
    fn test_source_recovers_from_transient_failures() {
        let samples = letters_n(4);
        let source = MockSource::new(samples.clone(), 8).with_failures(3, 2);

        let sink = CollectorSink::new();
        let tokens = sink.tokens();
        Pipeline::new(small_config())
            .run(Box::new(source), Box::new(sink))
            .unwrap();

        let expected = decode(
            samples.chunks(8).map(|c| c.to_vec()).collect::<Vec<_>>(),
            &small_config(),
        )
        .unwrap();
        assert_eq!(*tokens.lock().unwrap(), expected);
    }

    #[test]
    fn test_source_gives_up_after_repeated_failures() {
        let source = MockSource::new(letters_n(2), 8)
            .with_failures(1, MAX_CONSECUTIVE_ERRORS as usize)
            .with_error_message("cable cut");

        let result = Pipeline::new(small_config()).run(Box::new(source), Box::new(CollectorSink::new()));
        match result {
            Err(CwError::AudioSource { message }) => assert!(message.contains("cable cut")),
            other => panic!("expected source failure, got {other:?}"),
        }
    }

    #[test]
    fn test_stop_live_source() {
        let source = MockSource::new(letters_n(2), 8).as_live();
        let handle = Pipeline::new(small_config())
            .start(Box::new(source), Box::new(CollectorSink::new()))
            .unwrap();
        assert!(handle.is_running());

        thread::sleep(Duration::from_millis(50));
        let report = handle.stop().unwrap();
        assert!(report.dahs > 0);
    }

    #[test]
    fn test_run_refuses_live_source() {
        let source = MockSource::new(letters_n(1), 8).as_live();
        let result = Pipeline::new(small_config()).run(Box::new(source), Box::new(CollectorSink::new()));
        assert!(matches!(result, Err(CwError::AudioSource { message }) if message.contains("live")));
    }

    #[test]
    fn test_empty_input_produces_no_tokens() {
        let report = Pipeline::new(PipelineConfig::default())
            .run(
                Box::new(MemorySource::new(Vec::new())),
                Box::new(CollectorSink::new()),
            )
            .unwrap();
        assert_eq!(report.tokens, 0);
        assert_eq!(report.output, Some(String::new()));
    }

    #[test]
    fn test_only_tones_are_counted_as_symbols() {
        let sink = CollectorSink::new();
        let tokens = sink.tokens();
        let report = Pipeline::new(small_config())
            .run(
                Box::new(MemorySource::with_chunk_size(letters_n(6), 8)),
                Box::new(sink),
            )
            .unwrap();
        let tones = tokens.lock().unwrap().iter().filter(|t| t.is_tone()).count();
        assert_eq!(report.dits + report.dahs, tones);
        assert!(!tokens.lock().unwrap().contains(&Token::Error));
    }
}
