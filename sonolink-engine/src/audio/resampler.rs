//! Streaming audio resampling using rubato
//!
//! Producers hand the engine PCM at whatever rate their source runs at;
//! everything downstream operates at the 16kHz mono target. This resampler
//! is streaming: samples arrive in arbitrary-size pushes and are carried
//! across calls in a pending buffer until a full processing chunk is
//! available.

use rubato::{FastFixedIn, Resampler as RubatoResampler};
use tracing::debug;

use crate::error::{Error, Result};

/// Input frames fed to rubato per processing call
const CHUNK_SIZE: usize = 1024;

/// Streaming mono sample rate converter.
///
/// At equal input/output rates the converter is a passthrough and adds no
/// latency. Otherwise it wraps a `FastFixedIn` polynomial resampler and
/// buffers input until a full chunk is available.
pub struct StreamResampler {
    input_rate: u32,
    output_rate: u32,
    inner: Option<FastFixedIn<f32>>,
    /// Input samples waiting for a full chunk
    pending: Vec<f32>,
}

impl StreamResampler {
    /// Create a converter from `input_rate` to `output_rate` (both in Hz)
    pub fn new(input_rate: u32, output_rate: u32) -> Result<Self> {
        if input_rate == 0 || output_rate == 0 {
            return Err(Error::Decode(format!(
                "Invalid resample rates: {} -> {}",
                input_rate, output_rate
            )));
        }

        let inner = if input_rate == output_rate {
            None
        } else {
            debug!(input_rate, output_rate, "creating streaming resampler");
            Some(
                FastFixedIn::<f32>::new(
                    output_rate as f64 / input_rate as f64,
                    1.0,
                    rubato::PolynomialDegree::Septic,
                    CHUNK_SIZE,
                    1,
                )
                .map_err(|e| Error::Decode(format!("Failed to create resampler: {}", e)))?,
            )
        };

        Ok(StreamResampler {
            input_rate,
            output_rate,
            inner,
            pending: Vec::new(),
        })
    }

    pub fn input_rate(&self) -> u32 {
        self.input_rate
    }

    pub fn output_rate(&self) -> u32 {
        self.output_rate
    }

    /// Feed mono samples, returning whatever output is ready.
    ///
    /// May return an empty vec when not enough input has accumulated yet.
    pub fn push(&mut self, samples: &[f32]) -> Result<Vec<f32>> {
        let Some(inner) = self.inner.as_mut() else {
            return Ok(samples.to_vec());
        };

        self.pending.extend_from_slice(samples);

        let mut out = Vec::new();
        while self.pending.len() >= CHUNK_SIZE {
            let chunk: Vec<f32> = self.pending.drain(..CHUNK_SIZE).collect();
            let produced = inner
                .process(&[chunk], None)
                .map_err(|e| Error::Decode(format!("Resampling failed: {}", e)))?;
            out.extend_from_slice(&produced[0]);
        }
        Ok(out)
    }

    /// Drain the pending buffer and the resampler's internal delay line.
    ///
    /// Call once at end of stream; the converter is reusable afterward only
    /// for a fresh stream at the same rates.
    pub fn flush(&mut self) -> Result<Vec<f32>> {
        let Some(inner) = self.inner.as_mut() else {
            return Ok(Vec::new());
        };

        let mut out = Vec::new();
        if !self.pending.is_empty() {
            let chunk: Vec<f32> = std::mem::take(&mut self.pending);
            let produced = inner
                .process_partial(Some(&[chunk]), None)
                .map_err(|e| Error::Decode(format!("Resampler flush failed: {}", e)))?;
            out.extend_from_slice(&produced[0]);
        }
        // One empty partial call drains the filter tail
        let produced = inner
            .process_partial::<Vec<f32>>(None, None)
            .map_err(|e| Error::Decode(format!("Resampler flush failed: {}", e)))?;
        out.extend_from_slice(&produced[0]);
        Ok(out)
    }
}

/// One-shot linear-interpolation resample of a whole mono buffer.
///
/// Used by the analyzer, which loads the entire file up front and cares
/// about band energy rather than audible fidelity.
pub fn resample_linear(input: &[f32], input_rate: u32, output_rate: u32) -> Vec<f32> {
    if input_rate == output_rate || input.is_empty() {
        return input.to_vec();
    }

    let ratio = input_rate as f64 / output_rate as f64;
    let out_len = ((input.len() as f64) / ratio).floor() as usize;
    let mut out = Vec::with_capacity(out_len);

    for i in 0..out_len {
        let src = i as f64 * ratio;
        let idx = src as usize;
        let frac = (src - idx as f64) as f32;
        let a = input[idx];
        let b = if idx + 1 < input.len() {
            input[idx + 1]
        } else {
            a
        };
        out.push(a + (b - a) * frac);
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sine(rate: u32, freq: f32, frames: usize) -> Vec<f32> {
        (0..frames)
            .map(|i| {
                let t = i as f32 / rate as f32;
                (2.0 * std::f32::consts::PI * freq * t).sin() * 0.5
            })
            .collect()
    }

    #[test]
    fn passthrough_at_equal_rates() {
        let mut rs = StreamResampler::new(16_000, 16_000).unwrap();
        let input = sine(16_000, 440.0, 333);
        let out = rs.push(&input).unwrap();
        assert_eq!(out, input);
        assert!(rs.flush().unwrap().is_empty());
    }

    #[test]
    fn streamed_output_length_tracks_ratio() {
        let input_rate = 48_000;
        let mut rs = StreamResampler::new(input_rate, 16_000).unwrap();
        let input = sine(input_rate, 440.0, 9_600);

        let mut total = 0usize;
        // Deliver in uneven pushes to exercise the pending buffer
        for chunk in input.chunks(700) {
            total += rs.push(chunk).unwrap().len();
        }
        total += rs.flush().unwrap().len();

        let expected = input.len() / 3;
        let tolerance = CHUNK_SIZE / 3 + 16;
        assert!(
            total >= expected - tolerance && total <= expected + tolerance,
            "expected ~{} frames, got {}",
            expected,
            total
        );
    }

    #[test]
    fn small_pushes_produce_nothing_until_chunk_fills() {
        let mut rs = StreamResampler::new(44_100, 16_000).unwrap();
        let out = rs.push(&sine(44_100, 440.0, 100)).unwrap();
        assert!(out.is_empty());
        // Flush still recovers the buffered tail
        assert!(!rs.flush().unwrap().is_empty());
    }

    #[test]
    fn zero_rate_rejected() {
        assert!(StreamResampler::new(0, 16_000).is_err());
        assert!(StreamResampler::new(16_000, 0).is_err());
    }

    #[test]
    fn linear_resample_halves_length() {
        let input = sine(44_100, 440.0, 4_410);
        let out = resample_linear(&input, 44_100, 22_050);
        assert_eq!(out.len(), 2_205);
    }

    #[test]
    fn linear_resample_same_rate_is_copy() {
        let input = sine(22_050, 440.0, 100);
        assert_eq!(resample_linear(&input, 22_050, 22_050), input);
    }
}
