//! Sample format conversion
//!
//! Byte-level PCM conversions between producer formats and the engine's
//! internal representations. Producers declare their format as a `PcmSpec`;
//! everything downstream of the resampler is 16-bit signed little-endian.

use sonolink_common::pcm::PcmSpec;

use crate::error::{Error, Result};

/// Decode declared-format PCM bytes into mono f32 samples in [-1.0, 1.0].
///
/// Multi-channel input is downmixed by averaging all channels of a frame.
/// Trailing bytes that do not form a whole frame are dropped.
pub fn to_mono_f32(data: &[u8], spec: &PcmSpec) -> Result<Vec<f32>> {
    if spec.channels == 0 {
        return Err(Error::Decode("PCM spec declares zero channels".to_string()));
    }
    let sample_bytes = match spec.bits_per_sample {
        8 => 1,
        16 => 2,
        32 => 4,
        other => {
            return Err(Error::Decode(format!(
                "Unsupported sample width: {} bits",
                other
            )))
        }
    };

    let frame_bytes = sample_bytes * spec.channels as usize;
    let frames = data.len() / frame_bytes;
    let channels = spec.channels as usize;
    let mut out = Vec::with_capacity(frames);

    for frame_idx in 0..frames {
        let frame = &data[frame_idx * frame_bytes..(frame_idx + 1) * frame_bytes];
        let mut acc = 0.0f32;
        for ch in 0..channels {
            let s = &frame[ch * sample_bytes..(ch + 1) * sample_bytes];
            acc += match spec.bits_per_sample {
                // WAV convention: 8-bit PCM is unsigned, centered at 128
                8 => (s[0] as f32 - 128.0) / 128.0,
                16 => i16::from_le_bytes([s[0], s[1]]) as f32 / 32_768.0,
                32 => i32::from_le_bytes([s[0], s[1], s[2], s[3]]) as f32 / 2_147_483_648.0,
                _ => unreachable!(),
            };
        }
        out.push(acc / channels as f32);
    }

    Ok(out)
}

/// Encode mono f32 samples as 16-bit signed little-endian bytes, clamping
/// out-of-range values.
pub fn f32_to_i16_bytes(samples: &[f32]) -> Vec<u8> {
    let mut out = Vec::with_capacity(samples.len() * 2);
    for &sample in samples {
        let scaled = (sample * 32_767.0).clamp(-32_768.0, 32_767.0) as i16;
        out.extend_from_slice(&scaled.to_le_bytes());
    }
    out
}

/// Reinterpret 16-bit LE PCM bytes as i16 samples.
/// A trailing odd byte is ignored.
pub fn bytes_to_i16(data: &[u8]) -> Vec<i16> {
    data.chunks_exact(2)
        .map(|pair| i16::from_le_bytes([pair[0], pair[1]]))
        .collect()
}

/// Root-mean-square level of 16-bit LE PCM bytes, normalized to [0.0, 1.0].
pub fn rms_level(data: &[u8]) -> f32 {
    let samples = data.len() / 2;
    if samples == 0 {
        return 0.0;
    }
    let sum_sq: f64 = data
        .chunks_exact(2)
        .map(|pair| {
            let v = i16::from_le_bytes([pair[0], pair[1]]) as f64;
            v * v
        })
        .sum();
    let rms = (sum_sq / samples as f64).sqrt();
    (rms / 32_768.0).min(1.0) as f32
}
