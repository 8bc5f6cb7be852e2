//! Shared fixtures for integration tests.
#![allow(dead_code)]

use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use uuid::Uuid;

use sonolink_engine::audio::output::MemoryOutput;
use sonolink_engine::config::RouterConfig;
use sonolink_engine::error::{Error, Result};
use sonolink_engine::net::registry::RemoteListener;
use sonolink_engine::playback::router::PlaybackRouter;
use sonolink_engine::state::EngineState;

/// Router draining into an in-memory capture, no remote transport.
pub fn local_router(config: RouterConfig) -> (PlaybackRouter, Arc<MemoryOutput>, Arc<EngineState>) {
    let memory = Arc::new(MemoryOutput::new());
    let state = Arc::new(EngineState::new());
    let router = PlaybackRouter::new(
        config,
        Some(memory.clone() as Arc<dyn sonolink_engine::audio::output::PcmOutput>),
        None,
        Arc::clone(&state),
    );
    (router, memory, state)
}

/// i16 samples as target-format PCM bytes.
pub fn pcm_of(samples: &[i16]) -> Vec<u8> {
    samples.iter().flat_map(|s| s.to_le_bytes()).collect()
}

pub fn samples_of(pcm: &[u8]) -> Vec<i16> {
    pcm.chunks_exact(2)
        .map(|p| i16::from_le_bytes([p[0], p[1]]))
        .collect()
}

/// Constant-amplitude clip of `ms` milliseconds at the target format.
pub fn tone_ms(ms: u64, amplitude: i16) -> Vec<u8> {
    pcm_of(&vec![amplitude; (16 * ms) as usize])
}

/// Write a mono 16-bit WAV of a sine at `freq` for `secs` seconds.
pub fn write_sine_wav(path: &Path, rate: u32, freq: f32, secs: f32) {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate: rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut writer = hound::WavWriter::create(path, spec).unwrap();
    let frames = (rate as f32 * secs) as usize;
    for i in 0..frames {
        let t = i as f32 / rate as f32;
        let v = ((2.0 * std::f32::consts::PI * freq * t).sin() * 20_000.0) as i16;
        writer.write_sample(v).unwrap();
    }
    writer.finalize().unwrap();
}

/// In-memory remote listener for transport assertions.
pub struct CaptureListener {
    id: Uuid,
    name: String,
    target: Option<String>,
    pub sent: Mutex<Vec<Vec<u8>>>,
    closed: AtomicBool,
    pub fail_sends: AtomicBool,
}

impl CaptureListener {
    pub fn new(name: &str) -> Self {
        Self::bound_to(name, None)
    }

    pub fn bound_to(name: &str, target: Option<&str>) -> Self {
        CaptureListener {
            id: Uuid::new_v4(),
            name: name.to_string(),
            target: target.map(|t| t.to_string()),
            sent: Mutex::new(Vec::new()),
            closed: AtomicBool::new(false),
            fail_sends: AtomicBool::new(false),
        }
    }

    pub fn sent_flat(&self) -> Vec<u8> {
        self.sent
            .lock()
            .unwrap()
            .iter()
            .flat_map(|v| v.iter().copied())
            .collect()
    }
}

impl RemoteListener for CaptureListener {
    fn id(&self) -> Uuid {
        self.id
    }

    fn name(&self) -> String {
        self.name.clone()
    }

    fn target(&self) -> Option<String> {
        self.target.clone()
    }

    fn send(&self, bytes: &[u8]) -> Result<()> {
        if self.fail_sends.load(Ordering::Acquire) {
            self.closed.store(true, Ordering::Release);
            return Err(Error::Transport("injected failure".to_string()));
        }
        self.sent.lock().unwrap().push(bytes.to_vec());
        Ok(())
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    fn stop(&self) {
        self.closed.store(true, Ordering::Release);
    }
}
