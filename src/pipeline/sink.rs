use crate::error::{CwError, Result};
use crate::output::render_token;
use crate::pipeline::types::Token;
use crossbeam_channel::Receiver;
use serde::Serialize;
use std::io::Write;
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};

/// Pluggable token output handler for the pipeline.
/// Pairs with SampleSource for input - this handles decoded output.
pub trait TokenSink: Send + 'static {
    /// Handle one token. Called for every token in emission order.
    fn handle(&mut self, token: Token) -> Result<()>;

    /// Called on pipeline shutdown. Return accumulated text if applicable.
    fn finish(&mut self) -> Option<String> {
        None
    }

    /// Name for logging/debugging.
    fn name(&self) -> &'static str {
        "sink"
    }
}

/// Collects tokens in memory (for testing and library callers).
///
/// `finish()` returns the rendered text.
#[derive(Debug, Clone, Default)]
pub struct CollectorSink {
    tokens: Arc<Mutex<Vec<Token>>>,
}

impl CollectorSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Shared handle to the collected tokens, readable after the pipeline stops.
    pub fn tokens(&self) -> Arc<Mutex<Vec<Token>>> {
        self.tokens.clone()
    }
}

impl TokenSink for CollectorSink {
    fn handle(&mut self, token: Token) -> Result<()> {
        let mut tokens = self.tokens.lock().map_err(|_| CwError::Sink {
            message: "collector lock poisoned".to_string(),
        })?;
        tokens.push(token);
        Ok(())
    }

    fn finish(&mut self) -> Option<String> {
        let tokens = self.tokens.lock().ok()?;
        Some(tokens.iter().map(|&t| render_token(t)).collect())
    }

    fn name(&self) -> &'static str {
        "collector"
    }
}

/// Writes rendered tokens to any writer, typically stdout.
///
/// Flushes at word boundaries so live decoding shows up promptly.
pub struct WriterSink<W: Write + Send + 'static> {
    writer: W,
    written: bool,
}

impl<W: Write + Send + 'static> WriterSink<W> {
    pub fn new(writer: W) -> Self {
        Self {
            writer,
            written: false,
        }
    }
}

impl WriterSink<std::io::Stdout> {
    pub fn stdout() -> Self {
        Self::new(std::io::stdout())
    }
}

impl<W: Write + Send + 'static> TokenSink for WriterSink<W> {
    fn handle(&mut self, token: Token) -> Result<()> {
        let text = render_token(token);
        if !text.is_empty() {
            self.writer.write_all(text.as_bytes())?;
            self.written = true;
        }
        if matches!(token, Token::EndWord | Token::Pause) {
            self.writer.flush()?;
        }
        Ok(())
    }

    fn finish(&mut self) -> Option<String> {
        if self.written
            && let Err(e) = self.writer.write_all(b"\n")
        {
            tracing::warn!("failed to terminate output: {}", e);
        }
        if let Err(e) = self.writer.flush() {
            tracing::warn!("failed to flush output: {}", e);
        }
        None
    }

    fn name(&self) -> &'static str {
        "writer"
    }
}

#[derive(Serialize)]
struct TokenRecord {
    index: u64,
    token: Token,
}

/// Writes one JSON object per token: `{"index":0,"token":"dit"}`.
pub struct JsonLinesSink<W: Write + Send + 'static> {
    writer: W,
    index: u64,
}

impl<W: Write + Send + 'static> JsonLinesSink<W> {
    pub fn new(writer: W) -> Self {
        Self { writer, index: 0 }
    }
}

impl<W: Write + Send + 'static> TokenSink for JsonLinesSink<W> {
    fn handle(&mut self, token: Token) -> Result<()> {
        let record = TokenRecord {
            index: self.index,
            token,
        };
        serde_json::to_writer(&mut self.writer, &record)?;
        self.writer.write_all(b"\n")?;
        self.index += 1;
        Ok(())
    }

    fn finish(&mut self) -> Option<String> {
        if let Err(e) = self.writer.flush() {
            tracing::warn!("failed to flush JSON output: {}", e);
        }
        None
    }

    fn name(&self) -> &'static str {
        "json"
    }
}

/// Summary of a finished decoding run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PipelineReport {
    /// Every token delivered to the sink, NoOps included.
    pub tokens: usize,
    pub dits: usize,
    pub dahs: usize,
    /// Letter, word and pause boundaries.
    pub boundaries: usize,
    pub errors: usize,
    /// Whatever the sink returned from `finish()`.
    pub output: Option<String>,
}

impl PipelineReport {
    /// Records one token in the counters.
    pub fn record(&mut self, token: Token) {
        self.tokens += 1;
        match token {
            Token::Dit => self.dits += 1,
            Token::Dah => self.dahs += 1,
            Token::EndLetter | Token::EndWord | Token::Pause => self.boundaries += 1,
            Token::Error => self.errors += 1,
            Token::NoOp => {}
        }
    }
}

/// Terminal stage: feeds tokens to a [`TokenSink`] and keeps the tally.
pub(crate) struct SinkStation {
    sink: Box<dyn TokenSink>,
    report: PipelineReport,
}

impl SinkStation {
    pub(crate) fn new(sink: Box<dyn TokenSink>) -> Self {
        Self {
            sink,
            report: PipelineReport::default(),
        }
    }

    /// Runs the sink on its own thread until the token channel closes.
    ///
    /// A sink failure ends consumption; the closed channel then stops the
    /// upstream stations.
    pub(crate) fn spawn(mut self, tokens: Receiver<Token>) -> Result<JoinHandle<Result<PipelineReport>>> {
        let handle = thread::Builder::new()
            .name("cw-sink".to_string())
            .spawn(move || {
                let name = self.sink.name();
                while let Ok(token) = tokens.recv() {
                    if let Err(e) = self.sink.handle(token) {
                        tracing::error!(sink = name, "sink failed: {}", e);
                        self.sink.finish();
                        return Err(CwError::Sink {
                            message: e.to_string(),
                        });
                    }
                    self.report.record(token);
                }
                self.report.output = self.sink.finish();
                tracing::debug!(sink = name, tokens = self.report.tokens, "sink finished");
                Ok(self.report)
            })?;
        Ok(handle)
    }
}
