//! Audio file decoding using symphonia
//!
//! File-backed queue items (music beds, sound effects, cached TTS) are
//! decoded to PCM here. Decoding always runs from the start of the file;
//! clips are short enough that compressed seeking is not worth its
//! accuracy problems.

use std::path::Path;
use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{Decoder, DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::formats::{FormatOptions, FormatReader};
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use tracing::{debug, warn};

use sonolink_common::pcm::TARGET_SAMPLE_RATE;

use crate::audio::convert::f32_to_i16_bytes;
use crate::audio::resampler::StreamResampler;
use crate::error::{Error, Result};

/// Packet-by-packet decode of one file's default audio track.
struct DecodeStream {
    format: Box<dyn FormatReader>,
    decoder: Box<dyn Decoder>,
    track_id: u32,
    sample_rate: u32,
    channels: u16,
    sample_buf: Option<SampleBuffer<f32>>,
}

impl DecodeStream {
    fn open(path: &Path) -> Result<Self> {
        let file = std::fs::File::open(path).map_err(|e| {
            Error::Decode(format!("Failed to open file {}: {}", path.display(), e))
        })?;
        let mss = MediaSourceStream::new(Box::new(file), Default::default());

        let mut hint = Hint::new();
        if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
            hint.with_extension(ext);
        }

        let probed = symphonia::default::get_probe()
            .format(
                &hint,
                mss,
                &FormatOptions::default(),
                &MetadataOptions::default(),
            )
            .map_err(|e| Error::Decode(format!("Failed to probe format: {}", e)))?;
        let format = probed.format;

        let track = format
            .tracks()
            .iter()
            .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
            .ok_or_else(|| Error::Decode("No audio track found".to_string()))?;
        let track_id = track.id;

        let sample_rate = track
            .codec_params
            .sample_rate
            .ok_or_else(|| Error::Decode("Sample rate not found".to_string()))?;
        let channels = track
            .codec_params
            .channels
            .map(|c| c.count() as u16)
            .ok_or_else(|| Error::Decode("Channel count not found".to_string()))?;

        let decoder = symphonia::default::get_codecs()
            .make(&track.codec_params, &DecoderOptions::default())
            .map_err(|e| Error::Decode(format!("Failed to create decoder: {}", e)))?;

        debug!(
            "Opened {}: {}Hz, {} channel(s)",
            path.display(),
            sample_rate,
            channels
        );

        Ok(DecodeStream {
            format,
            decoder,
            track_id,
            sample_rate,
            channels,
            sample_buf: None,
        })
    }

    /// Decode until the next non-empty packet of interleaved f32 samples.
    /// Returns `None` at end of stream. Corrupt packets are skipped with a
    /// warning.
    fn next_samples(&mut self) -> Option<Vec<f32>> {
        loop {
            let packet = match self.format.next_packet() {
                Ok(packet) => packet,
                Err(symphonia::core::errors::Error::IoError(ref e))
                    if e.kind() == std::io::ErrorKind::UnexpectedEof =>
                {
                    return None;
                }
                Err(e) => {
                    warn!("Error reading packet: {}", e);
                    return None;
                }
            };

            if packet.track_id() != self.track_id {
                continue;
            }

            match self.decoder.decode(&packet) {
                Ok(decoded) => {
                    let buf = self.sample_buf.get_or_insert_with(|| {
                        SampleBuffer::new(decoded.capacity() as u64, *decoded.spec())
                    });
                    buf.copy_interleaved_ref(decoded);
                    if buf.samples().is_empty() {
                        continue;
                    }
                    return Some(buf.samples().to_vec());
                }
                Err(e) => {
                    warn!("Decode error: {}", e);
                    continue;
                }
            }
        }
    }
}

fn downmix(interleaved: &[f32], channels: u16) -> Vec<f32> {
    if channels <= 1 {
        return interleaved.to_vec();
    }
    let ch = channels as usize;
    interleaved
        .chunks_exact(ch)
        .map(|frame| frame.iter().sum::<f32>() / ch as f32)
        .collect()
}

/// Decode an entire audio file to interleaved f32 samples.
///
/// Returns `(samples, sample_rate, channels)` in the file's native rate and
/// channel layout.
pub fn decode_file(path: &Path) -> Result<(Vec<f32>, u32, u16)> {
    let mut stream = DecodeStream::open(path)?;
    let (sample_rate, channels) = (stream.sample_rate, stream.channels);

    let mut samples = Vec::new();
    while let Some(packet) = stream.next_samples() {
        samples.extend_from_slice(&packet);
    }

    debug!(
        "Decoded {} frames from {}",
        samples.len() / channels.max(1) as usize,
        path.display()
    );
    Ok((samples, sample_rate, channels))
}

/// Decode a file to mono f32 at its native sample rate.
pub fn load_mono_f32(path: &Path) -> Result<(Vec<f32>, u32)> {
    let (interleaved, sample_rate, channels) = decode_file(path)?;
    Ok((downmix(&interleaved, channels), sample_rate))
}

/// Stream a file as target-format PCM (16kHz mono i16-LE), handing each
/// chunk to `on_chunk` as it is decoded.
///
/// `on_chunk` returning false cancels the decode early; the function then
/// returns Ok without the remaining audio.
pub fn stream_target_pcm(path: &Path, mut on_chunk: impl FnMut(Vec<u8>) -> bool) -> Result<()> {
    let mut stream = DecodeStream::open(path)?;
    let channels = stream.channels;
    let mut resampler = StreamResampler::new(stream.sample_rate, TARGET_SAMPLE_RATE)?;

    loop {
        let mono = match stream.next_samples() {
            Some(packet) => downmix(&packet, channels),
            None => break,
        };
        let converted = resampler.push(&mono)?;
        if !converted.is_empty() && !on_chunk(f32_to_i16_bytes(&converted)) {
            return Ok(());
        }
    }

    let tail = resampler.flush()?;
    if !tail.is_empty() {
        on_chunk(f32_to_i16_bytes(&tail));
    }
    Ok(())
}

/// Decode a file straight to a single target-format PCM buffer.
pub fn load_target_pcm(path: &Path) -> Result<Vec<u8>> {
    let mut out = Vec::new();
    stream_target_pcm(path, |chunk| {
        out.extend_from_slice(&chunk);
        true
    })?;
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn write_wav(path: &Path, rate: u32, channels: u16, frames: usize) {
        let spec = hound::WavSpec {
            channels,
            sample_rate: rate,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut writer = hound::WavWriter::create(path, spec).unwrap();
        for i in 0..frames {
            let t = i as f32 / rate as f32;
            let v = ((2.0 * std::f32::consts::PI * 440.0 * t).sin() * 12_000.0) as i16;
            for _ in 0..channels {
                writer.write_sample(v).unwrap();
            }
        }
        writer.finalize().unwrap();
    }

    #[test]
    fn decodes_wav_with_native_rate() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("tone.wav");
        write_wav(&path, 44_100, 2, 4_410);

        let (samples, rate, channels) = decode_file(&path).unwrap();
        assert_eq!(rate, 44_100);
        assert_eq!(channels, 2);
        assert_eq!(samples.len(), 4_410 * 2);
    }

    #[test]
    fn mono_load_downmixes() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("tone.wav");
        write_wav(&path, 22_050, 2, 2_205);

        let (mono, rate) = load_mono_f32(&path).unwrap();
        assert_eq!(rate, 22_050);
        assert_eq!(mono.len(), 2_205);
    }

    #[test]
    fn target_pcm_is_16k_mono_i16() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("tone.wav");
        // 1 second at 48kHz should become ~1 second at 16kHz = ~32000 bytes
        write_wav(&path, 48_000, 1, 48_000);

        let pcm = load_target_pcm(&path).unwrap();
        let expected = 16_000 * 2;
        assert!(
            (pcm.len() as i64 - expected as i64).unsigned_abs() < 4_000,
            "got {} bytes",
            pcm.len()
        );
    }

    #[test]
    fn streaming_matches_one_shot() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("tone.wav");
        write_wav(&path, 16_000, 1, 8_000);

        let mut streamed = Vec::new();
        stream_target_pcm(&path, |chunk| {
            streamed.extend_from_slice(&chunk);
            true
        })
        .unwrap();
        assert_eq!(streamed, load_target_pcm(&path).unwrap());
        assert_eq!(streamed.len(), 16_000);
    }

    #[test]
    fn cancelled_stream_stops_early() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("tone.wav");
        write_wav(&path, 16_000, 1, 32_000);

        let mut chunks = 0;
        stream_target_pcm(&path, |_| {
            chunks += 1;
            false
        })
        .unwrap();
        assert_eq!(chunks, 1);
    }

    #[test]
    fn missing_file_is_an_error() {
        assert!(decode_file(Path::new("/nonexistent/clip.mp3")).is_err());
    }
}
