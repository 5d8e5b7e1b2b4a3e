//! WAV file sample source.

use crate::audio::source::{MemorySource, SampleSource};
use crate::error::{CwError, Result};
use std::io::Read;
use std::path::Path;

/// Sample source reading integer PCM from WAV data.
/// Multi-channel audio is down-mixed to mono by averaging each frame.
pub struct WavSource {
    inner: MemorySource,
    sample_rate: u32,
    channels: u16,
}

impl WavSource {
    /// Create from any reader.
    pub fn from_reader<R: Read>(reader: R, chunk_size: usize) -> Result<Self> {
        let mut wav_reader = hound::WavReader::new(reader)?;
        let spec = wav_reader.spec();

        if spec.sample_format != hound::SampleFormat::Int {
            return Err(CwError::AudioFormat {
                message: "floating-point WAV is not supported, expected integer PCM".to_string(),
            });
        }
        if spec.channels == 0 {
            return Err(CwError::AudioFormat {
                message: "WAV header declares zero channels".to_string(),
            });
        }

        let raw: Vec<i32> = wav_reader
            .samples::<i32>()
            .collect::<std::result::Result<Vec<_>, _>>()?;

        let samples = downmix(&raw, spec.channels);
        tracing::debug!(
            sample_rate = spec.sample_rate,
            channels = spec.channels,
            bits = spec.bits_per_sample,
            frames = samples.len(),
            "loaded WAV"
        );

        Ok(Self {
            inner: MemorySource::with_chunk_size(samples, chunk_size),
            sample_rate: spec.sample_rate,
            channels: spec.channels,
        })
    }

    /// Open a WAV file on disk.
    pub fn from_path(path: &Path, chunk_size: usize) -> Result<Self> {
        let file = std::fs::File::open(path)?;
        Self::from_reader(std::io::BufReader::new(file), chunk_size)
    }

    /// Create from stdin.
    pub fn from_stdin(chunk_size: usize) -> Result<Self> {
        // Read everything first: StdinLock is not Send
        let mut buffer = Vec::new();
        std::io::stdin().lock().read_to_end(&mut buffer)?;
        Self::from_reader(std::io::Cursor::new(buffer), chunk_size)
    }

    /// Sample rate declared in the WAV header.
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Channel count before down-mixing.
    pub fn channels(&self) -> u16 {
        self.channels
    }

    /// Duration of the audio in milliseconds.
    pub fn duration_ms(&self) -> u64 {
        if self.sample_rate == 0 {
            return 0;
        }
        self.inner.remaining() as u64 * 1000 / self.sample_rate as u64
    }
}

impl SampleSource for WavSource {
    fn next_chunk(&mut self) -> Result<Option<Vec<i32>>> {
        self.inner.next_chunk()
    }
}

/// Averages interleaved frames down to one channel.
pub(crate) fn downmix(samples: &[i32], channels: u16) -> Vec<i32> {
    if channels <= 1 {
        return samples.to_vec();
    }
    let width = channels as usize;
    samples
        .chunks_exact(width)
        .map(|frame| {
            let sum: i64 = frame.iter().map(|&s| s as i64).sum();
            (sum / width as i64) as i32
        })
        .collect()
}

/// Writes mono 16-bit PCM samples to a WAV file.
pub fn write_wav(path: &Path, samples: &[i32], sample_rate: u32) -> Result<()> {
    let spec = wav_spec(sample_rate);
    let mut writer = hound::WavWriter::create(path, spec)?;
    for &s in samples {
        writer.write_sample(clip_i16(s))?;
    }
    writer.finalize()?;
    Ok(())
}

/// Encodes mono 16-bit PCM samples as in-memory WAV bytes.
pub fn wav_bytes(samples: &[i32], sample_rate: u32) -> Result<Vec<u8>> {
    let mut cursor = std::io::Cursor::new(Vec::new());
    {
        let mut writer = hound::WavWriter::new(&mut cursor, wav_spec(sample_rate))?;
        for &s in samples {
            writer.write_sample(clip_i16(s))?;
        }
        writer.finalize()?;
    }
    Ok(cursor.into_inner())
}

fn wav_spec(sample_rate: u32) -> hound::WavSpec {
    hound::WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    }
}

fn clip_i16(sample: i32) -> i16 {
    sample.clamp(i16::MIN as i32, i16::MAX as i32) as i16
}
