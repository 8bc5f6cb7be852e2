//! Background spectrum analysis for music playback
//!
//! While a music file plays, a dedicated thread follows the wall clock,
//! windows the file at the position currently being heard, and produces an
//! 8-band loudness vector per update interval. The consumer is a
//! visualization surface; sample-accurate lock-step with the device is not
//! attempted and drift up to roughly one update interval is acceptable.

use realfft::num_complex::Complex32;
use realfft::{RealFftPlanner, RealToComplex};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use sonolink_common::events::EngineEvent;

use crate::audio::decode;
use crate::audio::resampler::resample_linear;
use crate::config::AnalyzerConfig;
use crate::error::{Error, Result};
use crate::state::EngineState;

/// Bands per frame; fixed by the visualization protocol
pub const BAND_COUNT: usize = 8;

pub type FrameCallback = Box<dyn Fn(&[u8; BAND_COUNT]) + Send + Sync>;

/// Exponential filter with asymmetric rise/decay.
///
/// Tracks the running band maximum: a loud transient pulls the gain up
/// almost instantly, quiet passages let it fall slowly so the display does
/// not collapse to full-scale noise.
pub struct ExpFilter {
    value: f32,
    alpha_rise: f32,
    alpha_decay: f32,
}

impl ExpFilter {
    pub fn new(initial: f32, alpha_rise: f32, alpha_decay: f32) -> Self {
        ExpFilter {
            value: initial,
            alpha_rise,
            alpha_decay,
        }
    }

    pub fn update(&mut self, sample: f32) -> f32 {
        let alpha = if sample > self.value {
            self.alpha_rise
        } else {
            self.alpha_decay
        };
        self.value = alpha * sample + (1.0 - alpha) * self.value;
        self.value
    }

    pub fn value(&self) -> f32 {
        self.value
    }
}

struct AnalyzerRun {
    stop: Arc<AtomicBool>,
    thread: JoinHandle<()>,
}

pub struct SpectrumAnalyzer {
    config: AnalyzerConfig,
    state: Arc<EngineState>,
    run: Mutex<Option<AnalyzerRun>>,
    /// Latest frame packed one byte per band, read lock-free by consumers
    latest: Arc<AtomicU64>,
    callback: Arc<Mutex<Option<FrameCallback>>>,
}

impl SpectrumAnalyzer {
    pub fn new(config: AnalyzerConfig, state: Arc<EngineState>) -> Self {
        SpectrumAnalyzer {
            config,
            state,
            run: Mutex::new(None),
            latest: Arc::new(AtomicU64::new(0)),
            callback: Arc::new(Mutex::new(None)),
        }
    }

    /// Install or replace the visualization callback.
    pub fn set_callback(&self, callback: FrameCallback) {
        if let Ok(mut slot) = self.callback.lock() {
            *slot = Some(callback);
        }
    }

    /// Begin analyzing `path`, bound to a playback clock starting now.
    ///
    /// The file is loaded on the analysis thread; position tracking counts
    /// from this call, so load time is skipped over rather than replayed.
    pub fn start(&self, path: &Path) -> Result<()> {
        self.stop();

        let stop = Arc::new(AtomicBool::new(false));
        let worker = AnalyzerWorker {
            config: self.config.clone(),
            state: Arc::clone(&self.state),
            latest: Arc::clone(&self.latest),
            callback: Arc::clone(&self.callback),
            stop: Arc::clone(&stop),
            path: path.to_path_buf(),
            started: Instant::now(),
        };

        let thread = std::thread::Builder::new()
            .name("spectrum-analyzer".to_string())
            .spawn(move || worker.run())
            .map_err(|e| Error::Analyzer(format!("Failed to spawn analyzer: {}", e)))?;

        if let Ok(mut run) = self.run.lock() {
            *run = Some(AnalyzerRun { stop, thread });
        }
        info!(path = %path.display(), "spectrum analysis started");
        Ok(())
    }

    /// Stop analysis and join the worker. Idempotent.
    pub fn stop(&self) {
        let run = match self.run.lock() {
            Ok(mut slot) => slot.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        };
        if let Some(run) = run {
            run.stop.store(true, Ordering::Release);
            let _ = run.thread.join();
            debug!("spectrum analysis stopped");
        }
        self.latest.store(0, Ordering::Release);
    }

    pub fn is_running(&self) -> bool {
        self.run
            .lock()
            .map(|run| run.as_ref().map(|r| !r.thread.is_finished()).unwrap_or(false))
            .unwrap_or(false)
    }

    /// Most recent band vector; zeros when idle.
    pub fn latest_frame(&self) -> [u8; BAND_COUNT] {
        self.latest.load(Ordering::Acquire).to_le_bytes()
    }
}

impl Drop for SpectrumAnalyzer {
    fn drop(&mut self) {
        self.stop();
    }
}

struct AnalyzerWorker {
    config: AnalyzerConfig,
    state: Arc<EngineState>,
    latest: Arc<AtomicU64>,
    callback: Arc<Mutex<Option<FrameCallback>>>,
    stop: Arc<AtomicBool>,
    path: PathBuf,
    started: Instant,
}

impl AnalyzerWorker {
    fn run(self) {
        let samples = match self.load() {
            Ok(samples) => samples,
            Err(e) => {
                warn!(path = %self.path.display(), "analysis aborted: {}", e);
                return;
            }
        };

        let rate = self.config.analysis_sample_rate as f64;
        let mut fft = BandFft::new(&self.config);
        let interval = Duration::from_millis(self.config.update_interval_ms);

        while !self.stop.load(Ordering::Acquire) {
            let position = (self.started.elapsed().as_secs_f64() * rate) as usize;
            if position >= samples.len() {
                debug!("analysis reached end of file");
                break;
            }

            let frame = fft.analyze_at(&samples, position);
            self.latest
                .store(u64::from_le_bytes(frame), Ordering::Release);
            if let Ok(callback) = self.callback.lock() {
                if let Some(callback) = callback.as_ref() {
                    callback(&frame);
                }
            }
            self.state.broadcast_event(EngineEvent::SpectrumFrame {
                bands: frame,
                timestamp: EngineEvent::now(),
            });

            std::thread::sleep(interval);
        }
    }

    fn load(&self) -> Result<Vec<f32>> {
        let (mono, native_rate) = decode::load_mono_f32(&self.path)?;
        Ok(resample_linear(
            &mono,
            native_rate,
            self.config.analysis_sample_rate,
        ))
    }
}

/// Reusable FFT plan plus the per-frame band computation.
pub struct BandFft {
    plan: Arc<dyn RealToComplex<f32>>,
    window: Vec<f32>,
    input: Vec<f32>,
    spectrum: Vec<Complex32>,
    gain: ExpFilter,
    config: AnalyzerConfig,
    chunk_size: usize,
}

impl BandFft {
    pub fn new(config: &AnalyzerConfig) -> Self {
        let n_fft = config.n_fft;
        let chunk_size = n_fft / 2;
        let mut planner = RealFftPlanner::<f32>::new();
        let plan = planner.plan_fft_forward(n_fft);
        let input = plan.make_input_vec();
        let spectrum = plan.make_output_vec();

        // Hann window over the analysis chunk
        let window: Vec<f32> = (0..chunk_size)
            .map(|i| {
                let x = i as f32 / (chunk_size.max(2) - 1) as f32;
                0.5 - 0.5 * (2.0 * std::f32::consts::PI * x).cos()
            })
            .collect();

        BandFft {
            plan,
            window,
            input,
            spectrum,
            gain: ExpFilter::new(0.01, config.gain_alpha_rise, config.gain_alpha_decay),
            config: config.clone(),
            chunk_size,
        }
    }

    /// Band levels for the chunk centered on `position` (in samples at the
    /// analysis rate). Near boundaries the chunk is zero-padded.
    pub fn analyze_at(&mut self, samples: &[f32], position: usize) -> [u8; BAND_COUNT] {
        let start = position.saturating_sub(self.chunk_size / 2);
        let end = (start + self.chunk_size).min(samples.len());

        self.input.fill(0.0);
        for (i, &sample) in samples[start..end].iter().enumerate() {
            self.input[i] = sample * self.window[i];
        }

        if self.plan.process(&mut self.input, &mut self.spectrum).is_err() {
            return [0; BAND_COUNT];
        }

        let bin_hz = self.config.analysis_sample_rate as f32 / self.config.n_fft as f32;
        let mut raw = [0.0f32; BAND_COUNT];
        for (band, &(low, high)) in self.config.bands.iter().take(BAND_COUNT).enumerate() {
            let lo_bin = (low / bin_hz) as usize;
            let hi_bin = ((high / bin_hz) as usize).min(self.spectrum.len().saturating_sub(1));
            if hi_bin <= lo_bin {
                continue;
            }
            let sum: f32 = self.spectrum[lo_bin..=hi_bin].iter().map(|c| c.norm()).sum();
            raw[band] = sum / (hi_bin - lo_bin + 1) as f32;
        }

        let peak = raw.iter().cloned().fold(0.0f32, f32::max);
        let gain = self.gain.update(peak).max(1e-6);

        let mut out = [0u8; BAND_COUNT];
        for (band, &value) in raw.iter().enumerate() {
            let scaled = (value / gain * 255.0).clamp(0.0, 255.0) as u8;
            out[band] = if scaled < self.config.noise_floor { 0 } else { scaled };
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sine(rate: u32, freq: f32, secs: f32) -> Vec<f32> {
        let frames = (rate as f32 * secs) as usize;
        (0..frames)
            .map(|i| {
                let t = i as f32 / rate as f32;
                (2.0 * std::f32::consts::PI * freq * t).sin() * 0.8
            })
            .collect()
    }

    #[test]
    fn exp_filter_rises_fast_and_decays_slow() {
        let mut filter = ExpFilter::new(0.01, 0.99, 0.01);
        filter.update(1.0);
        assert!(filter.value() > 0.9);

        for _ in 0..10 {
            filter.update(0.0);
        }
        // Slow decay keeps the gain well above zero after a short lull
        assert!(filter.value() > 0.5);
    }

    #[test]
    fn dominant_band_tracks_tone_frequency() {
        let config = AnalyzerConfig::default();
        let rate = config.analysis_sample_rate;

        // 100Hz tone: band 0 (20-250Hz) must dominate
        let low = sine(rate, 100.0, 1.0);
        let mut fft = BandFft::new(&config);
        // Warm the gain filter
        for i in 0..5 {
            fft.analyze_at(&low, 2_048 + i * 1_000);
        }
        let frame = fft.analyze_at(&low, 11_025);
        let max_band = frame.iter().enumerate().max_by_key(|(_, &v)| v).unwrap().0;
        assert_eq!(max_band, 0, "frame = {:?}", frame);

        // 3kHz tone: band 4 (2k-4kHz)
        let mid = sine(rate, 3_000.0, 1.0);
        let mut fft = BandFft::new(&config);
        for i in 0..5 {
            fft.analyze_at(&mid, 2_048 + i * 1_000);
        }
        let frame = fft.analyze_at(&mid, 11_025);
        let max_band = frame.iter().enumerate().max_by_key(|(_, &v)| v).unwrap().0;
        assert_eq!(max_band, 4, "frame = {:?}", frame);
    }

    #[test]
    fn output_is_always_in_range_with_noise_zeroed() {
        let config = AnalyzerConfig::default();
        let mut fft = BandFft::new(&config);
        let silence = vec![0.0f32; 44_100];
        let frame = fft.analyze_at(&silence, 22_050);
        assert!(frame.iter().all(|&v| v == 0));
    }

    #[test]
    fn boundary_positions_are_zero_padded() {
        let config = AnalyzerConfig::default();
        let mut fft = BandFft::new(&config);
        let tone = sine(config.analysis_sample_rate, 440.0, 0.5);

        // Position at the very start and past-the-middle of the last chunk
        let _ = fft.analyze_at(&tone, 0);
        let _ = fft.analyze_at(&tone, tone.len() - 1);
    }
}
