//! Paced remote output transport
//!
//! Delivers clip audio to every registered listener, framed for the
//! receiver protocol in use and throttled to real time so embedded devices
//! with tiny buffers are not flooded. A slow or broken listener never
//! blocks local playback: its session is dropped and the rest continue.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};
use uuid::Uuid;

use sonolink_common::events::EngineEvent;
use sonolink_common::pcm::PCM_BYTES_PER_SECOND;

use crate::config::{EncoderConfig, FramingMode, TransportConfig};
use crate::net::encoder::OpusStreamEncoder;
use crate::net::registry::{DeviceRegistry, RemoteListener};
use crate::state::EngineState;

/// Clip-start marker understood by all receiver firmware revisions
pub const START_FLAG: [u8; 9] = [0, 1, 2, 3, 4, 5, 6, 7, 8];
/// Clip-end marker
pub const END_FLAG: [u8; 9] = [8, 7, 6, 5, 4, 3, 2, 1, 0];

/// Longest single pacing sleep
const MAX_PACE_SLEEP: Duration = Duration::from_millis(200);

/// Real-time send throttle.
///
/// Tracks cumulative PCM bytes against wall clock since a window start;
/// the window restarts after an idle gap so a new clip is not penalized
/// for silence between clips.
pub struct PacingWindow {
    window_start: Option<Instant>,
    bytes_in_window: u64,
    last_send: Option<Instant>,
}

impl PacingWindow {
    pub fn new() -> Self {
        PacingWindow {
            window_start: None,
            bytes_in_window: 0,
            last_send: None,
        }
    }

    /// Account `bytes` of PCM about to be sent at `now` and return how long
    /// the caller must sleep to stay within the send-ahead allowance.
    pub fn required_delay(&mut self, now: Instant, bytes: usize, config: &TransportConfig) -> Duration {
        if let Some(last) = self.last_send {
            if now.duration_since(last) > Duration::from_millis(config.pacing_reset_gap_ms) {
                self.window_start = None;
                self.bytes_in_window = 0;
            }
        }
        let start = *self.window_start.get_or_insert(now);

        self.bytes_in_window += bytes as u64;
        self.last_send = Some(now);

        let expected = self.bytes_in_window as f64 / PCM_BYTES_PER_SECOND as f64;
        let actual = now.duration_since(start).as_secs_f64();
        let look_ahead = config.max_send_ahead_ms as f64 / 1000.0;
        let ahead = expected - actual - look_ahead;
        if ahead <= 0.0 {
            return Duration::ZERO;
        }
        Duration::from_secs_f64(ahead).min(MAX_PACE_SLEEP)
    }

    pub fn reset(&mut self) {
        self.window_start = None;
        self.bytes_in_window = 0;
        self.last_send = None;
    }
}

impl Default for PacingWindow {
    fn default() -> Self {
        Self::new()
    }
}

struct ClipSession {
    listener: Arc<dyn RemoteListener>,
    wire_bytes: u64,
    chunks: u64,
}

struct TransportInner {
    sessions: HashMap<Uuid, ClipSession>,
    label: Option<String>,
    clip_started: Option<Instant>,
    pcm_bytes: u64,
    encoder: Option<OpusStreamEncoder>,
    pacing: PacingWindow,
}

pub struct RemoteOutputTransport {
    config: TransportConfig,
    encoder_config: EncoderConfig,
    registry: Arc<DeviceRegistry>,
    state: Arc<EngineState>,
    inner: Mutex<TransportInner>,
}

impl RemoteOutputTransport {
    pub fn new(
        config: TransportConfig,
        encoder_config: EncoderConfig,
        registry: Arc<DeviceRegistry>,
        state: Arc<EngineState>,
    ) -> Self {
        RemoteOutputTransport {
            config,
            encoder_config,
            registry,
            state,
            inner: Mutex::new(TransportInner {
                sessions: HashMap::new(),
                label: None,
                clip_started: None,
                pcm_bytes: 0,
                encoder: None,
                pacing: PacingWindow::new(),
            }),
        }
    }

    fn inner(&self) -> MutexGuard<'_, TransportInner> {
        match self.inner.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// At least one listener is currently reachable for `target`
    pub fn has_output_device(&self, target: Option<&str>) -> bool {
        self.registry.has_output(target)
    }

    /// Snapshot the listeners serving `target` into a clip session.
    ///
    /// Returns false when no listener is reachable; the router then keeps
    /// the clip local-only.
    pub fn begin_clip(&self, label: &str, target: Option<&str>) -> bool {
        let listeners = self.registry.snapshot_for(target);
        if listeners.is_empty() {
            return false;
        }

        let mut inner = self.inner();
        if !inner.sessions.is_empty() {
            warn!(label, "previous clip session still open, discarding it");
            inner.sessions.clear();
        }

        for listener in listeners {
            // Legacy receivers buffer everything between the markers, so the
            // start marker goes out once per clip. Chunk-packet and opus
            // receivers get self-delimited payloads instead.
            if self.config.framing == FramingMode::LegacyClip {
                if listener.send(&START_FLAG).is_err() {
                    listener.stop();
                    continue;
                }
            }
            inner.sessions.insert(
                listener.id(),
                ClipSession {
                    listener,
                    wire_bytes: 0,
                    chunks: 0,
                },
            );
        }
        if inner.sessions.is_empty() {
            return false;
        }

        if matches!(self.config.framing, FramingMode::OpusFrame { .. }) {
            let encoder_config = self.encoder_config.clone();
            inner
                .encoder
                .get_or_insert_with(|| OpusStreamEncoder::new(encoder_config))
                .reset();
        }

        inner.label = Some(label.to_string());
        inner.clip_started = Some(Instant::now());
        inner.pcm_bytes = 0;
        debug!(label, sessions = inner.sessions.len(), "remote clip started");
        true
    }

    /// Frame and deliver one PCM chunk to every session listener.
    ///
    /// Returns how many listeners accepted the chunk; 0 tells the router to
    /// fall back to local output.
    pub fn push_pcm(&self, pcm: &[u8]) -> usize {
        if pcm.is_empty() {
            return 0;
        }

        let sleep = if self.config.pacing_enabled {
            let mut inner = self.inner();
            if inner.sessions.is_empty() {
                return 0;
            }
            inner.pacing.required_delay(Instant::now(), pcm.len(), &self.config)
        } else {
            Duration::ZERO
        };
        // Sleep outside the lock; teardown callbacks also take it
        if sleep > Duration::ZERO {
            std::thread::sleep(sleep);
        }

        let mut inner = self.inner();
        if inner.sessions.is_empty() {
            return 0;
        }
        inner.pcm_bytes += pcm.len() as u64;

        let payloads = self.frame_payloads(&mut inner, pcm, false);
        if payloads.is_empty() {
            // Opus mode can legitimately buffer a sub-frame push; the bytes
            // are accepted, not lost.
            return inner.sessions.len();
        }
        Self::deliver(&mut inner, &payloads)
    }

    /// Close the clip session, flushing any buffered encoder tail and
    /// emitting per-listener delivery diagnostics.
    pub fn end_clip(&self, interrupted: bool) {
        let mut inner = self.inner();
        if inner.sessions.is_empty() {
            return;
        }

        if !interrupted {
            let tail = self.frame_payloads(&mut inner, &[], true);
            if !tail.is_empty() {
                Self::deliver(&mut inner, &tail);
            }
        } else if let Some(encoder) = inner.encoder.as_mut() {
            encoder.reset();
        }

        if self.config.framing == FramingMode::LegacyClip {
            let dead: Vec<Uuid> = inner
                .sessions
                .iter()
                .filter(|(_, s)| s.listener.send(&END_FLAG).is_err())
                .map(|(id, _)| *id)
                .collect();
            for id in dead {
                if let Some(session) = inner.sessions.remove(&id) {
                    session.listener.stop();
                }
            }
        }

        let label = inner.label.take().unwrap_or_default();
        let elapsed = inner
            .clip_started
            .take()
            .map(|t| t.elapsed().as_secs_f64())
            .unwrap_or(0.0);
        let audio_secs = inner.pcm_bytes as f64 / PCM_BYTES_PER_SECOND as f64;
        let speed_x = if elapsed > 0.0 { audio_secs / elapsed } else { 0.0 };

        for session in inner.sessions.values() {
            info!(
                label,
                listener = %session.listener.name(),
                bytes = session.wire_bytes,
                chunks = session.chunks,
                interrupted,
                speed_x = format!("{:.2}", speed_x),
                "remote clip finished"
            );
            self.state.broadcast_event(EngineEvent::RemoteClipDelivered {
                listener: session.listener.name(),
                label: label.clone(),
                bytes: session.wire_bytes,
                chunks: session.chunks,
                interrupted,
                speed_x,
                timestamp: EngineEvent::now(),
            });
        }

        inner.sessions.clear();
        inner.pcm_bytes = 0;
    }

    /// Wire payloads for one push under the configured framing mode.
    fn frame_payloads(
        &self,
        inner: &mut TransportInner,
        pcm: &[u8],
        end_of_stream: bool,
    ) -> Vec<Vec<u8>> {
        match self.config.framing {
            FramingMode::LegacyClip => {
                if pcm.is_empty() {
                    Vec::new()
                } else {
                    vec![pcm.to_vec()]
                }
            }
            FramingMode::ChunkPacket => {
                if pcm.is_empty() {
                    Vec::new()
                } else {
                    vec![frame_chunk_packet(pcm)]
                }
            }
            FramingMode::OpusFrame { length_prefix } => {
                let encoder_config = self.encoder_config.clone();
                let encoder = inner
                    .encoder
                    .get_or_insert_with(|| OpusStreamEncoder::new(encoder_config));
                encoder
                    .push(pcm, end_of_stream)
                    .into_iter()
                    .map(|frame| frame_opus(&frame, length_prefix))
                    .collect()
            }
        }
    }

    /// Send payloads to every session; listeners that error are removed and
    /// stopped. Returns the number of listeners that accepted everything.
    fn deliver(inner: &mut TransportInner, payloads: &[Vec<u8>]) -> usize {
        let mut dead = Vec::new();
        let mut delivered = 0usize;

        for (id, session) in inner.sessions.iter_mut() {
            let mut ok = true;
            for payload in payloads {
                if session.listener.send(payload).is_err() {
                    ok = false;
                    break;
                }
                session.wire_bytes += payload.len() as u64;
                session.chunks += 1;
            }
            if ok {
                delivered += 1;
            } else {
                dead.push(*id);
            }
        }

        for id in dead {
            if let Some(session) = inner.sessions.remove(&id) {
                warn!(listener = %session.listener.name(), "listener dropped from clip session");
                session.listener.stop();
            }
        }
        delivered
    }
}

/// START + payload + END, self-delimited so receivers can play each chunk
/// as it arrives.
pub fn frame_chunk_packet(pcm: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(pcm.len() + START_FLAG.len() + END_FLAG.len());
    out.extend_from_slice(&START_FLAG);
    out.extend_from_slice(pcm);
    out.extend_from_slice(&END_FLAG);
    out
}

/// Optional versioned-receiver header: `00 00 <u16 length BE>`.
pub fn frame_opus(frame: &[u8], length_prefix: bool) -> Vec<u8> {
    if !length_prefix {
        return frame.to_vec();
    }
    let mut out = Vec::with_capacity(frame.len() + 4);
    out.push(0);
    out.push(0);
    out.extend_from_slice(&(frame.len() as u16).to_be_bytes());
    out.extend_from_slice(frame);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::net::registry::test_support::CaptureListener;
    use std::sync::atomic::Ordering;

    fn transport(framing: FramingMode, registry: Arc<DeviceRegistry>) -> RemoteOutputTransport {
        let config = TransportConfig {
            framing,
            pacing_enabled: false,
            ..TransportConfig::default()
        };
        RemoteOutputTransport::new(
            config,
            EncoderConfig::default(),
            registry,
            Arc::new(EngineState::new()),
        )
    }

    #[test]
    fn chunk_packet_wraps_every_push() {
        let registry = Arc::new(DeviceRegistry::new());
        let listener = Arc::new(CaptureListener::new("esp"));
        registry.register(listener.clone());

        let t = transport(FramingMode::ChunkPacket, registry);
        assert!(t.begin_clip("hello", None));
        assert_eq!(t.push_pcm(&[10, 20, 30, 40]), 1);
        assert_eq!(t.push_pcm(&[50, 60]), 1);
        t.end_clip(false);

        let sent = listener.sent.lock().unwrap();
        assert_eq!(sent.len(), 2);
        let mut expected = START_FLAG.to_vec();
        expected.extend_from_slice(&[10, 20, 30, 40]);
        expected.extend_from_slice(&END_FLAG);
        assert_eq!(sent[0], expected);
    }

    #[test]
    fn legacy_clip_brackets_whole_clip() {
        let registry = Arc::new(DeviceRegistry::new());
        let listener = Arc::new(CaptureListener::new("esp"));
        registry.register(listener.clone());

        let t = transport(FramingMode::LegacyClip, registry);
        assert!(t.begin_clip("hello", None));
        t.push_pcm(&[1, 1]);
        t.push_pcm(&[2, 2]);
        t.end_clip(false);

        let flat = listener.sent_flat();
        let mut expected = START_FLAG.to_vec();
        expected.extend_from_slice(&[1, 1, 2, 2]);
        expected.extend_from_slice(&END_FLAG);
        assert_eq!(flat, expected);
    }

    #[test]
    fn no_listeners_means_zero_delivered() {
        let registry = Arc::new(DeviceRegistry::new());
        let t = transport(FramingMode::ChunkPacket, registry);
        assert!(!t.begin_clip("hello", None));
        assert_eq!(t.push_pcm(&[1, 2, 3, 4]), 0);
    }

    #[test]
    fn failing_listener_is_isolated() {
        let registry = Arc::new(DeviceRegistry::new());
        let good = Arc::new(CaptureListener::new("good"));
        let bad = Arc::new(CaptureListener::new("bad"));
        registry.register(good.clone());
        registry.register(bad.clone());

        let t = transport(FramingMode::ChunkPacket, registry);
        assert!(t.begin_clip("x", None));
        assert_eq!(t.push_pcm(&[1, 2]), 2);

        bad.fail_sends.store(true, Ordering::Release);
        assert_eq!(t.push_pcm(&[3, 4]), 1);
        // Dead listener is out of the session; the healthy one continues
        assert_eq!(t.push_pcm(&[5, 6]), 1);
        assert!(bad.is_closed());
        assert_eq!(good.sent.lock().unwrap().len(), 3);
    }

    #[test]
    fn opus_length_prefix_layout() {
        let framed = frame_opus(&[0xAA; 300], true);
        assert_eq!(&framed[..4], &[0, 0, 0x01, 0x2C]);
        assert_eq!(framed.len(), 304);

        let bare = frame_opus(&[0xAA; 300], false);
        assert_eq!(bare.len(), 300);
    }

    #[test]
    fn pacing_sleeps_when_ahead_of_real_time() {
        let config = TransportConfig::default();
        let mut window = PacingWindow::new();
        let start = Instant::now();

        // First second of audio sent instantly: expect ~1s - 20ms of delay
        assert_eq!(window.required_delay(start, 0, &config), Duration::ZERO);
        let delay = window.required_delay(start, PCM_BYTES_PER_SECOND as usize, &config);
        // Capped at the maximum single sleep
        assert_eq!(delay, MAX_PACE_SLEEP);
    }

    #[test]
    fn pacing_window_resets_after_idle_gap() {
        let config = TransportConfig::default();
        let mut window = PacingWindow::new();
        let start = Instant::now();
        window.required_delay(start, PCM_BYTES_PER_SECOND as usize, &config);

        // After a gap beyond the reset threshold the backlog is forgotten
        let later = start + Duration::from_millis(config.pacing_reset_gap_ms + 100);
        let delay = window.required_delay(later, 3_200, &config);
        assert_eq!(delay, Duration::from_secs_f64(0.1 - 0.02));
    }
}
