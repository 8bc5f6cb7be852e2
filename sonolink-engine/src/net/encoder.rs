//! Persistent Opus stream encoder
//!
//! Converts an open-ended 16kHz mono i16-LE PCM stream into fixed-duration
//! Opus frames. One encoder instance lives for a whole clip sequence:
//! `reset` clears stream state between clips without releasing the codec,
//! so back-to-back short clips do not pay construction cost each time.
//!
//! When the Opus codec cannot be initialized the encoder degrades to a
//! pass-through backend that emits raw PCM "frames" of the same duration,
//! keeping the rest of the pipeline alive.

use audiopus::coder::{Encoder, GenericCtl};
use audiopus::{Application, Bitrate, Channels, SampleRate};
use tracing::{debug, info, warn};

use sonolink_common::pcm::TARGET_SAMPLE_RATE;

use crate::config::EncoderConfig;

/// Upper bound on one encoded Opus packet
const MAX_PACKET_BYTES: usize = 4000;

enum Backend {
    Opus(Encoder),
    /// Raw PCM frames; used when libopus is unavailable
    Passthrough,
}

pub struct OpusStreamEncoder {
    backend: Backend,
    config: EncoderConfig,
    /// Sub-frame PCM carried to the next push
    remainder: Vec<u8>,
    /// Monotonic across clips within one session
    frames_encoded: u64,
    frame_bytes: usize,
}

impl OpusStreamEncoder {
    /// Create an encoder session. Codec initialization failure downgrades
    /// to pass-through instead of failing the caller.
    pub fn new(config: EncoderConfig) -> Self {
        let samples_per_frame =
            (TARGET_SAMPLE_RATE as u64 * config.frame_duration_ms / 1000) as usize;
        let frame_bytes = samples_per_frame * 2;

        let backend = match Self::make_opus(&config) {
            Ok(encoder) => {
                info!(
                    bitrate = config.bitrate,
                    frame_ms = config.frame_duration_ms,
                    "opus encoder initialized"
                );
                Backend::Opus(encoder)
            }
            Err(e) => {
                warn!("opus unavailable, falling back to raw PCM frames: {}", e);
                Backend::Passthrough
            }
        };

        OpusStreamEncoder {
            backend,
            config,
            remainder: Vec::new(),
            frames_encoded: 0,
            frame_bytes,
        }
    }

    fn make_opus(config: &EncoderConfig) -> std::result::Result<Encoder, audiopus::Error> {
        let mut encoder = Encoder::new(SampleRate::Hz16000, Channels::Mono, Application::Audio)?;
        encoder.set_bitrate(Bitrate::BitsPerSecond(config.bitrate as i32))?;
        encoder.set_complexity(config.complexity)?;
        Ok(encoder)
    }

    /// True when real Opus compression is active
    pub fn is_compressed(&self) -> bool {
        matches!(self.backend, Backend::Opus(_))
    }

    /// Frames emitted since construction (persists across `reset`)
    pub fn frames_encoded(&self) -> u64 {
        self.frames_encoded
    }

    /// PCM bytes per encoded frame at the target format
    pub fn frame_bytes(&self) -> usize {
        self.frame_bytes
    }

    /// Append PCM and emit every complete frame that becomes available.
    ///
    /// With `end_of_stream` set, a trailing partial frame is zero-padded to
    /// full length and encoded too, leaving the remainder empty.
    pub fn push(&mut self, pcm: &[u8], end_of_stream: bool) -> Vec<Vec<u8>> {
        let mut frames = Vec::new();
        self.push_with(pcm, end_of_stream, |frame| frames.push(frame.to_vec()));
        frames
    }

    /// Like `push` but hands each frame to `emit` as soon as it is ready.
    pub fn push_with(&mut self, pcm: &[u8], end_of_stream: bool, mut emit: impl FnMut(&[u8])) {
        if pcm.is_empty() && self.remainder.is_empty() {
            return;
        }
        self.remainder.extend_from_slice(pcm);

        while self.remainder.len() >= self.frame_bytes {
            let frame: Vec<u8> = self.remainder.drain(..self.frame_bytes).collect();
            if let Some(encoded) = self.encode_with_recovery(&frame) {
                emit(&encoded);
            }
        }

        if end_of_stream && !self.remainder.is_empty() {
            let mut frame = std::mem::take(&mut self.remainder);
            frame.resize(self.frame_bytes, 0);
            if let Some(encoded) = self.encode_with_recovery(&frame) {
                emit(&encoded);
            }
        }
    }

    /// Encode one full frame, retrying once after an in-place codec reset.
    /// A frame that still fails is dropped; the session continues.
    fn encode_with_recovery(&mut self, frame: &[u8]) -> Option<Vec<u8>> {
        let encoder = match &mut self.backend {
            Backend::Passthrough => {
                self.frames_encoded += 1;
                return Some(frame.to_vec());
            }
            Backend::Opus(encoder) => encoder,
        };

        let samples: Vec<i16> = frame
            .chunks_exact(2)
            .map(|pair| i16::from_le_bytes([pair[0], pair[1]]))
            .collect();
        let mut out = vec![0u8; MAX_PACKET_BYTES];

        match encoder.encode(&samples, &mut out) {
            Ok(len) => {
                out.truncate(len);
                self.frames_encoded += 1;
                Some(out)
            }
            Err(first) => {
                warn!("opus encode failed, resetting codec: {}", first);
                if let Err(e) = encoder.reset_state() {
                    warn!("opus reset failed, recreating encoder: {}", e);
                    match Self::make_opus(&self.config) {
                        Ok(fresh) => self.backend = Backend::Opus(fresh),
                        Err(e) => {
                            warn!("opus recreation failed, frame dropped: {}", e);
                            return None;
                        }
                    }
                }
                let encoder = match &mut self.backend {
                    Backend::Opus(encoder) => encoder,
                    Backend::Passthrough => return None,
                };
                match encoder.encode(&samples, &mut out) {
                    Ok(len) => {
                        out.truncate(len);
                        self.frames_encoded += 1;
                        Some(out)
                    }
                    Err(e) => {
                        warn!("opus encode failed after reset, frame dropped: {}", e);
                        None
                    }
                }
            }
        }
    }

    /// Clear stream state between clips, keeping the codec object and the
    /// cumulative frame counter.
    pub fn reset(&mut self) {
        self.remainder.clear();
        if let Backend::Opus(encoder) = &mut self.backend {
            if let Err(e) = encoder.reset_state() {
                warn!("opus reset failed: {}", e);
            }
        }
        debug!(frames = self.frames_encoded, "encoder session reset");
    }
}
