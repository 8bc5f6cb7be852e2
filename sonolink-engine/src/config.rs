//! Engine configuration
//!
//! Typed configuration for every engine component, loadable from a TOML
//! file (see `sonolink_common::config` for resolution order). Every field
//! has a compiled default matching the tuning the engine ships with, so an
//! absent file or partial file is always valid.

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::Result;

/// Top-level engine configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Local output device name (None = system default)
    pub local_device: Option<String>,
    pub router: RouterConfig,
    pub transport: TransportConfig,
    pub encoder: EncoderConfig,
    pub analyzer: AnalyzerConfig,
    pub queue: QueueConfig,
}

impl EngineConfig {
    /// Load from an optional config file path, falling back to defaults.
    pub fn load(cli_path: Option<&Path>) -> Result<Self> {
        let resolved = sonolink_common::config::resolve_config_file(cli_path);
        let config = sonolink_common::config::load_or_default(resolved.as_deref())?;
        Ok(config)
    }
}

/// Playback router tuning
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RouterConfig {
    /// Minimum buffered audio before a clip starts draining
    pub prefetch_ms: u64,
    /// Overlap blended between the tail of one clip and the head of the next
    pub crossfade_ms: u64,
    /// Maximum leading near-silence removed from each clip
    pub head_trim_ms: u64,
    /// i16 amplitude below which a sample counts as leading silence
    pub head_trim_threshold: i32,
    /// Idle time before the held-back crossfade tail is flushed
    pub tail_flush_ms: u64,
    /// Linear fade-in applied to every clip onset
    pub segment_fade_in_ms: u64,
    /// Additional fade-in when starting from cold (no tail buffered)
    pub first_extra_fade_in_ms: u64,
    /// Whether finalized chunks are written to the local device
    pub local_enabled: bool,
    /// Whether clips are offered to the remote transport
    pub remote_enabled: bool,
    /// Suppress local output while a remote clip session is active
    pub auto_disable_local_when_remote: bool,
}

impl Default for RouterConfig {
    fn default() -> Self {
        RouterConfig {
            prefetch_ms: 80,
            crossfade_ms: 20,
            head_trim_ms: 200,
            head_trim_threshold: 200,
            tail_flush_ms: 200,
            segment_fade_in_ms: 10,
            first_extra_fade_in_ms: 20,
            local_enabled: true,
            remote_enabled: true,
            auto_disable_local_when_remote: true,
        }
    }
}

/// Wire framing applied to remote deliveries
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "mode")]
pub enum FramingMode {
    /// One START marker at clip begin, raw PCM, one END marker at clip end.
    /// Legacy receivers emit audio only after the END marker arrives.
    LegacyClip,
    /// Every push wrapped in START/END so receivers can play incrementally
    ChunkPacket,
    /// Opus-compressed frames; versioned receivers expect a 4-byte
    /// `00 00 <u16 len BE>` prefix, legacy ones take bare frames
    OpusFrame { length_prefix: bool },
}

impl Default for FramingMode {
    fn default() -> Self {
        FramingMode::ChunkPacket
    }
}

/// Remote transport tuning
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TransportConfig {
    pub framing: FramingMode,
    /// Throttle sends to real time (disable for bulk transfer tests)
    pub pacing_enabled: bool,
    /// How far ahead of real time a send may run before sleeping
    pub max_send_ahead_ms: u64,
    /// Idle gap after which the pacing window restarts
    pub pacing_reset_gap_ms: u64,
}

impl Default for TransportConfig {
    fn default() -> Self {
        TransportConfig {
            framing: FramingMode::default(),
            pacing_enabled: true,
            max_send_ahead_ms: 20,
            pacing_reset_gap_ms: 800,
        }
    }
}

/// Opus stream encoder tuning
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EncoderConfig {
    /// Target bitrate in bits per second
    pub bitrate: u32,
    /// Encoded frame duration; 960 samples per frame at 60ms / 16kHz
    pub frame_duration_ms: u64,
    /// Encoder complexity 0-10
    pub complexity: u8,
}

impl Default for EncoderConfig {
    fn default() -> Self {
        EncoderConfig {
            bitrate: 24_000,
            frame_duration_ms: 60,
            complexity: 10,
        }
    }
}

/// Spectrum analyzer tuning
///
/// Band bounds and the gain filter constants were tuned empirically on the
/// reference hardware; they are parameters, not invariants.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalyzerConfig {
    /// Rate the analysis copy of the file is resampled to
    pub analysis_sample_rate: u32,
    /// FFT window length in samples
    pub n_fft: usize,
    /// Spectrum frame cadence
    pub update_interval_ms: u64,
    /// Inclusive lower / exclusive upper bound of each band in Hz
    pub bands: Vec<(f32, f32)>,
    /// Adaptive gain filter: fast-rise coefficient
    pub gain_alpha_rise: f32,
    /// Adaptive gain filter: slow-decay coefficient
    pub gain_alpha_decay: f32,
    /// Band values below this are zeroed
    pub noise_floor: u8,
}

impl Default for AnalyzerConfig {
    fn default() -> Self {
        AnalyzerConfig {
            analysis_sample_rate: 22_050,
            n_fft: 2048,
            update_interval_ms: 100,
            bands: vec![
                (20.0, 250.0),
                (250.0, 500.0),
                (500.0, 1_000.0),
                (1_000.0, 2_000.0),
                (2_000.0, 4_000.0),
                (4_000.0, 8_000.0),
                (8_000.0, 16_000.0),
                (16_000.0, 22_050.0),
            ],
            gain_alpha_rise: 0.99,
            gain_alpha_decay: 0.01,
            noise_floor: 10,
        }
    }
}

/// Priority queue tuning
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueConfig {
    /// Maximum items drained per batch
    pub max_batch: usize,
    /// Poller tick interval
    pub poll_interval_ms: u64,
    /// Upper bound on waiting for one item to finish playing
    pub item_timeout_secs: u64,
}

impl Default for QueueConfig {
    fn default() -> Self {
        QueueConfig {
            max_batch: 5,
            poll_interval_ms: 50,
            item_timeout_secs: 60,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_shipped_tuning() {
        let config = EngineConfig::default();
        assert_eq!(config.router.prefetch_ms, 80);
        assert_eq!(config.router.crossfade_ms, 20);
        assert_eq!(config.router.head_trim_ms, 200);
        assert_eq!(config.encoder.bitrate, 24_000);
        assert_eq!(config.analyzer.bands.len(), 8);
        assert_eq!(config.transport.framing, FramingMode::ChunkPacket);
    }

    #[test]
    fn partial_toml_keeps_defaults() {
        let config: EngineConfig = toml::from_str(
            r#"
            [router]
            crossfade_ms = 40

            [transport.framing]
            mode = "opus_frame"
            length_prefix = true
            "#,
        )
        .unwrap();

        assert_eq!(config.router.crossfade_ms, 40);
        assert_eq!(config.router.prefetch_ms, 80);
        assert_eq!(
            config.transport.framing,
            FramingMode::OpusFrame { length_prefix: true }
        );
    }
}
