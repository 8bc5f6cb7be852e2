//! Local audio output using cpal
//!
//! The router writes finalized 16kHz mono i16 PCM through the `PcmOutput`
//! trait. The cpal implementation bridges to whatever configuration the
//! device actually supports: samples are rate-converted and fanned out to
//! the device channel count on the writer side, then handed to the audio
//! callback through a lock-free ring buffer.

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Device, SampleFormat, Stream, StreamConfig};
use ringbuf::{
    traits::{Consumer, Producer, Split},
    HeapCons, HeapProd, HeapRb,
};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::{debug, error, info, warn};

use sonolink_common::pcm::TARGET_SAMPLE_RATE;

use crate::audio::convert;
use crate::audio::resampler::resample_linear;
use crate::error::{Error, Result};

/// Sink for finalized 16kHz mono i16-LE PCM.
///
/// Implementations must tolerate concurrent callers; the router is the only
/// writer in practice but holds the output behind an `Arc`.
pub trait PcmOutput: Send + Sync {
    /// Write a chunk of PCM, blocking while the device buffer is full.
    fn write(&self, pcm: &[u8]) -> Result<()>;

    /// Human-readable sink name for logs
    fn name(&self) -> String;
}

/// Ring capacity in device frames (~0.5s at 48kHz stereo)
const RING_CAPACITY: usize = 48_000;

/// Local speaker output backed by cpal.
pub struct CpalOutput {
    _stream: Stream,
    producer: Mutex<HeapProd<f32>>,
    device_name: String,
    device_rate: u32,
    device_channels: u16,
    running: Arc<AtomicBool>,
}

// cpal::Stream is !Send on some hosts; the stream is created and dropped on
// the owning thread and never touched through the shared handle.
unsafe impl Send for CpalOutput {}
unsafe impl Sync for CpalOutput {}

impl CpalOutput {
    /// List available output device names.
    pub fn list_devices() -> Result<Vec<String>> {
        let host = cpal::default_host();
        let devices: Vec<String> = host
            .output_devices()
            .map_err(|e| Error::AudioOutput(format!("Failed to enumerate devices: {}", e)))?
            .filter_map(|device| device.name().ok())
            .collect();
        debug!("Found {} output devices", devices.len());
        Ok(devices)
    }

    /// Open an output device and start its stream.
    ///
    /// If the requested device is missing the default device is used
    /// instead; local playback degrading beats refusing to start.
    pub fn new(device_name: Option<&str>) -> Result<Self> {
        let host = cpal::default_host();

        let device = if let Some(name) = device_name {
            let mut devices = host
                .output_devices()
                .map_err(|e| Error::AudioOutput(format!("Failed to enumerate devices: {}", e)))?;
            match devices.find(|d| d.name().ok().as_deref() == Some(name)) {
                Some(dev) => {
                    info!("Found requested audio device: {}", name);
                    dev
                }
                None => {
                    warn!(
                        "Requested device '{}' not found, falling back to default device",
                        name
                    );
                    host.default_output_device().ok_or_else(|| {
                        Error::AudioOutput(format!(
                            "Device '{}' not found and no default device available",
                            name
                        ))
                    })?
                }
            }
        } else {
            host.default_output_device()
                .ok_or_else(|| Error::AudioOutput("No default output device found".to_string()))?
        };

        let supported = device
            .default_output_config()
            .map_err(|e| Error::AudioOutput(format!("Failed to get default config: {}", e)))?;
        let sample_format = supported.sample_format();
        if sample_format != SampleFormat::F32 {
            return Err(Error::AudioOutput(format!(
                "Unsupported sample format: {:?}",
                sample_format
            )));
        }
        let config: StreamConfig = supported.config();
        let resolved_name = device.name().unwrap_or_else(|_| "Unknown".to_string());

        debug!(
            "Audio config: device={}, sample_rate={}, channels={}",
            resolved_name, config.sample_rate.0, config.channels
        );

        let ring = HeapRb::<f32>::new(RING_CAPACITY * config.channels as usize);
        let (producer, consumer) = ring.split();

        let running = Arc::new(AtomicBool::new(true));
        let stream = Self::build_stream(&device, &config, consumer)?;
        stream
            .play()
            .map_err(|e| Error::AudioOutput(format!("Failed to start stream: {}", e)))?;
        info!("Audio stream started on '{}'", resolved_name);

        Ok(CpalOutput {
            _stream: stream,
            producer: Mutex::new(producer),
            device_name: resolved_name,
            device_rate: config.sample_rate.0,
            device_channels: config.channels,
            running,
        })
    }

    fn build_stream(
        device: &Device,
        config: &StreamConfig,
        mut consumer: HeapCons<f32>,
    ) -> Result<Stream> {
        let stream = device
            .build_output_stream(
                config,
                move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                    let filled = consumer.pop_slice(data);
                    // Underrun: pad with silence rather than stale samples
                    for sample in &mut data[filled..] {
                        *sample = 0.0;
                    }
                },
                move |err| {
                    error!("Audio stream error: {}", err);
                },
                None,
            )
            .map_err(|e| Error::AudioOutput(format!("Failed to build stream: {}", e)))?;
        Ok(stream)
    }
}

impl PcmOutput for CpalOutput {
    fn write(&self, pcm: &[u8]) -> Result<()> {
        let mono: Vec<f32> = convert::bytes_to_i16(pcm)
            .iter()
            .map(|&s| s as f32 / 32_768.0)
            .collect();
        let at_device_rate = resample_linear(&mono, TARGET_SAMPLE_RATE, self.device_rate);

        let channels = self.device_channels as usize;
        let mut interleaved = Vec::with_capacity(at_device_rate.len() * channels);
        for sample in at_device_rate {
            for _ in 0..channels {
                interleaved.push(sample);
            }
        }

        let mut remaining = &interleaved[..];
        while !remaining.is_empty() {
            if !self.running.load(Ordering::Acquire) {
                return Err(Error::AudioOutput("Output stopped".to_string()));
            }
            let pushed = {
                let mut producer = self
                    .producer
                    .lock()
                    .map_err(|_| Error::AudioOutput("Output producer poisoned".to_string()))?;
                producer.push_slice(remaining)
            };
            remaining = &remaining[pushed..];
            if !remaining.is_empty() {
                // Device buffer full; let the callback drain
                std::thread::sleep(Duration::from_millis(5));
            }
        }
        Ok(())
    }

    fn name(&self) -> String {
        self.device_name.clone()
    }
}

impl Drop for CpalOutput {
    fn drop(&mut self) {
        self.running.store(false, Ordering::Release);
    }
}

/// Capturing output used by tests and headless runs.
pub struct MemoryOutput {
    written: Mutex<Vec<u8>>,
}

impl MemoryOutput {
    pub fn new() -> Self {
        MemoryOutput {
            written: Mutex::new(Vec::new()),
        }
    }

    /// All bytes written so far
    pub fn captured(&self) -> Vec<u8> {
        self.written.lock().map(|w| w.clone()).unwrap_or_default()
    }

    pub fn clear(&self) {
        if let Ok(mut w) = self.written.lock() {
            w.clear();
        }
    }
}

impl Default for MemoryOutput {
    fn default() -> Self {
        Self::new()
    }
}

impl PcmOutput for MemoryOutput {
    fn write(&self, pcm: &[u8]) -> Result<()> {
        self.written
            .lock()
            .map_err(|_| Error::AudioOutput("Capture buffer poisoned".to_string()))?
            .extend_from_slice(pcm);
        Ok(())
    }

    fn name(&self) -> String {
        "memory".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn list_devices_does_not_panic() {
        // Hardware-dependent; either outcome is acceptable
        let result = CpalOutput::list_devices();
        assert!(result.is_ok() || result.is_err());
    }

    #[test]
    fn memory_output_accumulates() {
        let out = MemoryOutput::new();
        out.write(&[1, 2, 3, 4]).unwrap();
        out.write(&[5, 6]).unwrap();
        assert_eq!(out.captured(), vec![1, 2, 3, 4, 5, 6]);
        out.clear();
        assert!(out.captured().is_empty());
    }
}
