//! Live capture from an audio input device through cpal.
//!
//! The device callback down-mixes each buffer to mono and hands it to a
//! bounded queue; the source side cuts the queued audio into fixed chunks.
//! A live source never ends on its own, so the pipeline runs until stopped.

use crate::audio::source::SampleSource;
use crate::audio::wav::downmix;
use crate::defaults;
use crate::error::{CwError, Result};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, bounded};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// Device names preferred over the host default (desktop sound servers).
const PREFERRED_DEVICES: &[&str] = &["pipewire", "pulse"];

fn is_preferred_device(name: &str) -> bool {
    let lower = name.to_lowercase();
    PREFERRED_DEVICES.iter().any(|pref| lower.contains(pref))
}

/// Names of the host's input devices.
pub fn list_devices() -> Result<Vec<String>> {
    let host = cpal::default_host();
    let devices = host.input_devices().map_err(|e| CwError::AudioCapture {
        message: format!("failed to enumerate input devices: {e}"),
    })?;
    Ok(devices.filter_map(|device| device.name().ok()).collect())
}

fn find_device(name: Option<&str>) -> Result<cpal::Device> {
    let host = cpal::default_host();

    let Some(name) = name else {
        if let Ok(devices) = host.input_devices() {
            for device in devices {
                if let Ok(device_name) = device.name()
                    && is_preferred_device(&device_name)
                {
                    return Ok(device);
                }
            }
        }
        return host
            .default_input_device()
            .ok_or_else(|| CwError::AudioDeviceNotFound {
                device: "default".to_string(),
            });
    };

    let devices = host.input_devices().map_err(|e| CwError::AudioCapture {
        message: format!("failed to enumerate input devices: {e}"),
    })?;
    for device in devices {
        if device.name().is_ok_and(|n| n == name) {
            return Ok(device);
        }
    }
    Err(CwError::AudioDeviceNotFound {
        device: name.to_string(),
    })
}

/// Float samples are scaled onto the 16-bit range.
fn f32_to_i32(sample: f32) -> i32 {
    (sample.clamp(-1.0, 1.0) * i16::MAX as f32) as i32
}

/// Cuts queued device buffers into fixed-size chunks.
///
/// The queue closing ends the stream: whatever is pending goes out as a
/// final short chunk.
struct ChunkAssembler {
    receiver: Receiver<Vec<i32>>,
    pending: Vec<i32>,
    chunk_size: usize,
    timeout: Duration,
    /// Samples the callback could not queue since the last report
    dropped: Arc<AtomicU64>,
}

impl ChunkAssembler {
    fn new(receiver: Receiver<Vec<i32>>, chunk_size: usize, dropped: Arc<AtomicU64>) -> Self {
        let chunk_size = chunk_size.max(1);
        Self {
            receiver,
            pending: Vec::with_capacity(chunk_size * 2),
            chunk_size,
            timeout: Duration::from_millis(defaults::CAPTURE_TIMEOUT_MS),
            dropped,
        }
    }

    fn next_chunk(&mut self) -> Result<Option<Vec<i32>>> {
        while self.pending.len() < self.chunk_size {
            match self.receiver.recv_timeout(self.timeout) {
                Ok(samples) => self.pending.extend(samples),
                Err(RecvTimeoutError::Timeout) => {
                    return Err(CwError::AudioCapture {
                        message: format!("no audio from device in {} ms", self.timeout.as_millis()),
                    });
                }
                Err(RecvTimeoutError::Disconnected) => {
                    if self.pending.is_empty() {
                        return Ok(None);
                    }
                    return Ok(Some(std::mem::take(&mut self.pending)));
                }
            }
        }

        let dropped = self.dropped.swap(0, Ordering::Relaxed);
        if dropped > 0 {
            tracing::warn!(dropped, "capture queue full, samples lost");
        }
        Ok(Some(self.pending.drain(..self.chunk_size).collect()))
    }
}

/// Wrapper for cpal::Stream to make it Send.
///
/// SAFETY: after `play` the stream is never touched again; it is only held
/// to keep the callback alive and dropped once by the owning source.
struct SendableStream(#[allow(dead_code)] cpal::Stream);

unsafe impl Send for SendableStream {}

/// Sample source reading a live input device.
pub struct CaptureSource {
    _stream: SendableStream,
    assembler: ChunkAssembler,
    device_name: String,
}

impl CaptureSource {
    /// Opens a device (by exact name, or the preferred default) and starts capture.
    ///
    /// The device's native rate and channel layout are used as-is; the
    /// decoder adapts to any rate, and channels are averaged to mono.
    pub fn open(device_name: Option<&str>, chunk_size: usize) -> Result<Self> {
        let device = find_device(device_name)?;
        let device_name = device.name().unwrap_or_else(|_| "unknown".to_string());

        let supported = device
            .default_input_config()
            .map_err(|e| CwError::AudioCapture {
                message: format!("failed to query input config: {e}"),
            })?;
        let channels = supported.channels();
        let format = supported.sample_format();
        let config: cpal::StreamConfig = supported.into();

        let (tx, rx) = bounded(defaults::CAPTURE_BUFFER);
        let dropped = Arc::new(AtomicU64::new(0));

        let stream = match format {
            cpal::SampleFormat::I16 => {
                build_stream::<i16>(&device, &config, channels, tx, dropped.clone(), i32::from)?
            }
            cpal::SampleFormat::I32 => {
                build_stream::<i32>(&device, &config, channels, tx, dropped.clone(), |s| s)?
            }
            cpal::SampleFormat::F32 => {
                build_stream::<f32>(&device, &config, channels, tx, dropped.clone(), f32_to_i32)?
            }
            other => {
                return Err(CwError::AudioCapture {
                    message: format!("unsupported sample format {other:?}, try another --device"),
                });
            }
        };
        stream.play().map_err(|e| CwError::AudioCapture {
            message: format!("failed to start input stream: {e}"),
        })?;

        tracing::info!(device = %device_name, channels, format = ?format, "capturing");

        Ok(Self {
            _stream: SendableStream(stream),
            assembler: ChunkAssembler::new(rx, chunk_size, dropped),
            device_name,
        })
    }

    /// Name of the device being captured.
    pub fn device_name(&self) -> &str {
        &self.device_name
    }
}

fn build_stream<T>(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    channels: u16,
    tx: Sender<Vec<i32>>,
    dropped: Arc<AtomicU64>,
    convert: fn(T) -> i32,
) -> Result<cpal::Stream>
where
    T: cpal::SizedSample + Send + 'static,
{
    device
        .build_input_stream(
            config,
            move |data: &[T], _: &cpal::InputCallbackInfo| {
                let raw: Vec<i32> = data.iter().map(|&s| convert(s)).collect();
                let mono = downmix(&raw, channels);
                let len = mono.len() as u64;
                // Never block the audio thread
                if tx.try_send(mono).is_err() {
                    dropped.fetch_add(len, Ordering::Relaxed);
                }
            },
            |err| tracing::warn!("audio stream error: {}", err),
            None,
        )
        .map_err(|e| CwError::AudioCapture {
            message: format!("failed to build input stream: {e}"),
        })
}

impl SampleSource for CaptureSource {
    fn next_chunk(&mut self) -> Result<Option<Vec<i32>>> {
        self.assembler.next_chunk()
    }

    fn is_finite(&self) -> bool {
        false
    }
}
