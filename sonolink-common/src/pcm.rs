//! PCM format constants and byte/duration math
//!
//! All audio inside the engine is normalized to 16 kHz / mono / 16-bit
//! signed little-endian before it reaches the playback router. Remote
//! listeners receive exactly this format (raw or opus-compressed).

use serde::{Deserialize, Serialize};

/// Target sample rate for all routed audio
pub const TARGET_SAMPLE_RATE: u32 = 16_000;

/// Target channel count (mono)
pub const TARGET_CHANNELS: u16 = 1;

/// Target sample width in bytes (16-bit)
pub const TARGET_SAMPLE_WIDTH: usize = 2;

/// Bytes of target-format PCM per second of audio
pub const PCM_BYTES_PER_SECOND: usize =
    TARGET_SAMPLE_RATE as usize * TARGET_CHANNELS as usize * TARGET_SAMPLE_WIDTH;

/// Declared format of producer-supplied PCM
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PcmSpec {
    /// Sample rate in Hz
    pub sample_rate: u32,
    /// Channel count (1 = mono, 2 = stereo)
    pub channels: u16,
    /// Bits per sample (8, 16, or 32)
    pub bits_per_sample: u16,
}

impl PcmSpec {
    /// The engine's fixed target format
    pub fn target() -> Self {
        PcmSpec {
            sample_rate: TARGET_SAMPLE_RATE,
            channels: TARGET_CHANNELS,
            bits_per_sample: (TARGET_SAMPLE_WIDTH * 8) as u16,
        }
    }

    /// Whether this spec already matches the target format
    pub fn is_target(&self) -> bool {
        *self == Self::target()
    }

    /// Bytes per frame (one sample across all channels)
    pub fn bytes_per_frame(&self) -> usize {
        self.channels as usize * (self.bits_per_sample as usize / 8)
    }
}

/// Convert a duration in milliseconds to a byte count of target-format PCM,
/// aligned down to a whole sample.
pub fn ms_to_bytes(ms: u64) -> usize {
    let bytes = (ms as usize * PCM_BYTES_PER_SECOND) / 1000;
    bytes - bytes % TARGET_SAMPLE_WIDTH
}

/// Duration in seconds represented by a byte count of target-format PCM
pub fn bytes_to_secs(bytes: usize) -> f64 {
    bytes as f64 / PCM_BYTES_PER_SECOND as f64
}
