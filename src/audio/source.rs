use crate::defaults;
use crate::error::{CwError, Result};

/// Trait for sample sources feeding the decoder.
///
/// This trait allows swapping implementations (WAV file, synthesized keying, mock).
pub trait SampleSource: Send {
    /// Reads the next chunk of samples.
    ///
    /// # Returns
    /// `Some(chunk)` with a non-empty chunk, `None` at end-of-stream, or an error
    fn next_chunk(&mut self) -> Result<Option<Vec<i32>>>;

    /// Returns true if the source has a natural end (file, buffer).
    ///
    /// Live sources return false; the pipeline then runs until stopped.
    fn is_finite(&self) -> bool {
        true
    }
}

/// In-memory sample buffer cut into fixed-size chunks.
///
/// The last chunk may be shorter, but never empty.
#[derive(Debug, Clone)]
pub struct MemorySource {
    samples: Vec<i32>,
    position: usize,
    chunk_size: usize,
}

impl MemorySource {
    pub fn new(samples: Vec<i32>) -> Self {
        Self::with_chunk_size(samples, defaults::CHUNK_SIZE)
    }

    pub fn with_chunk_size(samples: Vec<i32>, chunk_size: usize) -> Self {
        Self {
            samples,
            position: 0,
            chunk_size: chunk_size.max(1),
        }
    }

    /// Samples not yet handed out.
    pub fn remaining(&self) -> usize {
        self.samples.len() - self.position
    }
}

impl SampleSource for MemorySource {
    fn next_chunk(&mut self) -> Result<Option<Vec<i32>>> {
        if self.position >= self.samples.len() {
            return Ok(None);
        }

        let end = std::cmp::min(self.position + self.chunk_size, self.samples.len());
        let chunk = self.samples[self.position..end].to_vec();
        self.position = end;

        Ok(Some(chunk))
    }
}

/// Mock sample source for testing failure handling.
#[derive(Debug, Clone)]
pub struct MockSource {
    inner: MemorySource,
    fail_after: Option<usize>,
    failures: usize,
    reads: usize,
    finite: bool,
    error_message: String,
}

impl MockSource {
    pub fn new(samples: Vec<i32>, chunk_size: usize) -> Self {
        Self {
            inner: MemorySource::with_chunk_size(samples, chunk_size),
            fail_after: None,
            failures: 0,
            reads: 0,
            finite: true,
            error_message: "mock source error".to_string(),
        }
    }

    /// Fails `count` times once `reads` chunks have been delivered.
    pub fn with_failures(mut self, reads: usize, count: usize) -> Self {
        self.fail_after = Some(reads);
        self.failures = count;
        self
    }

    /// Pretends to be a live source that never ends on its own.
    pub fn as_live(mut self) -> Self {
        self.finite = false;
        self
    }

    /// Configure the error message for failures
    pub fn with_error_message(mut self, message: &str) -> Self {
        self.error_message = message.to_string();
        self
    }
}

impl SampleSource for MockSource {
    fn next_chunk(&mut self) -> Result<Option<Vec<i32>>> {
        if let Some(after) = self.fail_after
            && self.reads >= after
            && self.failures > 0
        {
            self.failures -= 1;
            return Err(CwError::AudioSource {
                message: self.error_message.clone(),
            });
        }

        match self.inner.next_chunk()? {
            Some(chunk) => {
                self.reads += 1;
                Ok(Some(chunk))
            }
            // A live source idles rather than ending.
            None if !self.finite => Ok(Some(vec![0; self.inner.chunk_size])),
            None => Ok(None),
        }
    }

    fn is_finite(&self) -> bool {
        self.finite
    }
}
