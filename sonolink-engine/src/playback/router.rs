//! Playback router
//!
//! Serializes independently produced clips into one gapless stream and
//! fans it out to the local device and/or the remote transport. The router
//! owns a single dedicated play thread that drains sinks in enqueue order,
//! trims leading silence, cross-fades clip boundaries, and applies onset
//! fade-ins so splices never click.
//!
//! The trailing `crossfade_ms` of the output stream is always held back
//! instead of written immediately: when the next clip arrives it is blended
//! with that tail, and only after `tail_flush_ms` of inactivity is the tail
//! flushed as-is.

use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use sonolink_common::events::{EngineEvent, OutputRoute};
use sonolink_common::pcm::{ms_to_bytes, PcmSpec};

use crate::audio::convert::{self, f32_to_i16_bytes, rms_level};
use crate::audio::decode;
use crate::audio::output::PcmOutput;
use crate::audio::resampler::StreamResampler;
use crate::config::RouterConfig;
use crate::net::transport::RemoteOutputTransport;
use crate::playback::sink::{SinkChunk, StreamSink};
use crate::state::EngineState;

/// Main loop tick when nothing is queued
const IDLE_TICK: Duration = Duration::from_millis(10);
/// How long one pop waits before re-checking the interrupt flag
const POP_TIMEOUT: Duration = Duration::from_millis(20);
/// Producer chunk size for byte and file payloads (100ms of target PCM)
const PRODUCER_CHUNK_BYTES: usize = 3200;
/// Minimum spacing between output-level events
const LEVEL_EVENT_INTERVAL: Duration = Duration::from_millis(30);
/// Spacing between throughput diagnostics log lines
const DIAG_LOG_INTERVAL: Duration = Duration::from_secs(2);

struct TailState {
    buf: Vec<u8>,
    last_activity: Instant,
}

struct RouterShared {
    config: RouterConfig,
    queue: Mutex<VecDeque<Arc<StreamSink>>>,
    tail: Mutex<TailState>,
    interrupt: AtomicBool,
    running: AtomicBool,
    local: Option<Arc<dyn PcmOutput>>,
    transport: Option<Arc<RemoteOutputTransport>>,
    state: Arc<EngineState>,
    bytes_local: AtomicU64,
    bytes_remote: AtomicU64,
    chunks_written: AtomicU64,
    last_level_event: Mutex<Instant>,
    last_diag_log: Mutex<Instant>,
}

pub struct PlaybackRouter {
    shared: Arc<RouterShared>,
    play_thread: Mutex<Option<JoinHandle<()>>>,
    producers: Mutex<Vec<JoinHandle<()>>>,
}

impl PlaybackRouter {
    /// Build the router and start its play thread.
    ///
    /// Outputs are injected: `local` may be absent on headless hosts and
    /// `transport` may be absent when no remote protocol is configured.
    pub fn new(
        config: RouterConfig,
        local: Option<Arc<dyn PcmOutput>>,
        transport: Option<Arc<RemoteOutputTransport>>,
        state: Arc<EngineState>,
    ) -> Self {
        let shared = Arc::new(RouterShared {
            config,
            queue: Mutex::new(VecDeque::new()),
            tail: Mutex::new(TailState {
                buf: Vec::new(),
                last_activity: Instant::now(),
            }),
            interrupt: AtomicBool::new(false),
            running: AtomicBool::new(true),
            local,
            transport,
            state,
            bytes_local: AtomicU64::new(0),
            bytes_remote: AtomicU64::new(0),
            chunks_written: AtomicU64::new(0),
            last_level_event: Mutex::new(Instant::now()),
            last_diag_log: Mutex::new(Instant::now()),
        });

        let loop_shared = Arc::clone(&shared);
        let handle = std::thread::Builder::new()
            .name("playback-router".to_string())
            .spawn(move || loop_shared.run())
            .ok();

        PlaybackRouter {
            shared,
            play_thread: Mutex::new(handle),
            producers: Mutex::new(Vec::new()),
        }
    }

    /// Append a fresh sink to the FIFO and return it to the producer.
    pub fn enqueue_stream(&self, label: &str) -> Arc<StreamSink> {
        self.enqueue_stream_for(label, None)
    }

    /// Like `enqueue_stream`, with a remote delivery target for the clip.
    pub fn enqueue_stream_for(&self, label: &str, target: Option<&str>) -> Arc<StreamSink> {
        let sink = Arc::new(StreamSink::new_for(label, target));
        if let Ok(mut queue) = self.shared.queue.lock() {
            queue.push_back(Arc::clone(&sink));
        }
        debug!(label, "sink enqueued");
        sink
    }

    /// Stream an audio file into a fresh sink from a background thread,
    /// decoding and resampling as it reads.
    pub fn enqueue_file(&self, path: PathBuf, label: &str, target: Option<&str>) -> Arc<StreamSink> {
        let sink = self.enqueue_stream_for(label, target);
        let producer_sink = Arc::clone(&sink);
        let shared = Arc::clone(&self.shared);
        let label = label.to_string();

        self.spawn_producer(move || {
            let result = decode::stream_target_pcm(&path, |chunk| {
                producer_sink.push(chunk);
                !shared.interrupt.load(Ordering::Acquire)
            });
            if let Err(e) = result {
                // Unreadable clip degrades to silence; queue continues
                warn!(label, path = %path.display(), "file clip failed: {}", e);
            }
            producer_sink.finish();
        });
        sink
    }

    /// Feed an in-memory PCM payload of a declared format into a fresh
    /// sink, converting to the target format on a background thread.
    pub fn enqueue_pcm(
        &self,
        pcm: Vec<u8>,
        spec: PcmSpec,
        label: &str,
        target: Option<&str>,
    ) -> Arc<StreamSink> {
        let sink = self.enqueue_stream_for(label, target);
        let producer_sink = Arc::clone(&sink);
        let label = label.to_string();

        self.spawn_producer(move || {
            let result = convert_to_target(&pcm, &spec, |chunk| producer_sink.push(chunk));
            if let Err(e) = result {
                warn!(label, "pcm clip failed: {}", e);
            }
            producer_sink.finish();
        });
        sink
    }

    fn spawn_producer(&self, work: impl FnOnce() + Send + 'static) {
        if let Ok(mut producers) = self.producers.lock() {
            // Reap producers that already finished
            let mut alive = Vec::new();
            for handle in producers.drain(..) {
                if handle.is_finished() {
                    let _ = handle.join();
                } else {
                    alive.push(handle);
                }
            }
            *producers = alive;
            if let Ok(handle) = std::thread::Builder::new()
                .name("clip-producer".to_string())
                .spawn(work)
            {
                producers.push(handle);
            }
        }
    }

    /// FIFO empty and nothing draining. The crossfade tail may still be
    /// held: the next clip enqueued within `tail_flush_ms` blends with it.
    pub fn is_drained(&self) -> bool {
        let queue_empty = self
            .shared
            .queue
            .lock()
            .map(|q| q.is_empty())
            .unwrap_or(true);
        queue_empty && !self.shared.state.is_playing()
    }

    /// Poll until drained or the timeout expires.
    pub fn wait_until_drained(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        loop {
            if self.is_drained() {
                return true;
            }
            if Instant::now() >= deadline {
                return false;
            }
            std::thread::sleep(IDLE_TICK);
        }
    }

    /// FIFO empty, nothing draining, no cross-fade tail held
    pub fn is_idle(&self) -> bool {
        let queue_empty = self
            .shared
            .queue
            .lock()
            .map(|q| q.is_empty())
            .unwrap_or(true);
        let tail_empty = self
            .shared
            .tail
            .lock()
            .map(|t| t.buf.is_empty())
            .unwrap_or(true);
        queue_empty && tail_empty && !self.shared.state.is_playing()
    }

    /// Poll until idle or the timeout expires.
    pub fn wait_until_idle(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        loop {
            if self.is_idle() {
                return true;
            }
            if Instant::now() >= deadline {
                return false;
            }
            std::thread::sleep(IDLE_TICK);
        }
    }

    /// Abort everything in flight: the flag is observed within one poll
    /// tick, the FIFO and held tail are discarded, and any active remote
    /// clip is marked aborted rather than cleanly ended.
    pub fn stop_all(&self) {
        info!("playback interrupt requested");
        self.shared.interrupt.store(true, Ordering::Release);
    }

    /// Stop the play thread and join all workers.
    pub fn shutdown(&self) {
        self.shared.running.store(false, Ordering::Release);
        self.shared.interrupt.store(true, Ordering::Release);
        if let Ok(mut thread) = self.play_thread.lock() {
            if let Some(handle) = thread.take() {
                let _ = handle.join();
            }
        }
        if let Ok(mut producers) = self.producers.lock() {
            for handle in producers.drain(..) {
                let _ = handle.join();
            }
        }
    }
}

impl Drop for PlaybackRouter {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl RouterShared {
    fn run(&self) {
        debug!("play loop started");
        while self.running.load(Ordering::Acquire) {
            if self.interrupt.load(Ordering::Acquire) {
                self.drain_interrupt();
                continue;
            }

            let next = match self.queue.lock() {
                Ok(mut queue) => queue.pop_front(),
                Err(poisoned) => poisoned.into_inner().pop_front(),
            };

            match next {
                Some(sink) => self.play_sink(&sink),
                None => {
                    self.maybe_flush_tail();
                    std::thread::sleep(IDLE_TICK);
                }
            }
        }
        debug!("play loop stopped");
    }

    /// Drop everything queued or held; runs once per interrupt request.
    fn drain_interrupt(&self) {
        if let Ok(mut queue) = self.queue.lock() {
            let dropped = queue.len();
            queue.clear();
            if dropped > 0 {
                info!(dropped, "queued clips discarded on interrupt");
            }
        }
        if let Ok(mut tail) = self.tail.lock() {
            tail.buf.clear();
        }
        self.state.set_playing(false);
        self.interrupt.store(false, Ordering::Release);
    }

    /// Flush the held crossfade tail after sufficient inactivity.
    fn maybe_flush_tail(&self) {
        let flushed = {
            let mut tail = match self.tail.lock() {
                Ok(t) => t,
                Err(poisoned) => poisoned.into_inner(),
            };
            if tail.buf.is_empty()
                || tail.last_activity.elapsed() < Duration::from_millis(self.config.tail_flush_ms)
            {
                return;
            }
            std::mem::take(&mut tail.buf)
        };
        // The remote clip session closed with `end_clip` long ago, so the
        // tail can only go to the local device.
        if self.config.local_enabled && self.local.is_some() {
            debug!(bytes = flushed.len(), "flushing idle crossfade tail");
            self.write_pcm(&flushed, false);
        } else {
            debug!(bytes = flushed.len(), "no local route for idle tail, dropped");
        }
    }

    fn play_sink(&self, sink: &StreamSink) {
        self.state.set_playing(true);

        let remote_active = self.config.remote_enabled
            && self
                .transport
                .as_deref()
                .map(|t| {
                    t.has_output_device(sink.target())
                        && t.begin_clip(sink.label(), sink.target())
                })
                .unwrap_or(false);

        let route = if remote_active {
            if self.config.local_enabled && !self.config.auto_disable_local_when_remote {
                OutputRoute::Dual
            } else {
                OutputRoute::RemoteOnly
            }
        } else {
            OutputRoute::LocalOnly
        };
        self.state.broadcast_event(EngineEvent::ClipStarted {
            sink_id: sink.id(),
            label: sink.label().to_string(),
            route,
            timestamp: EngineEvent::now(),
        });

        // Prefetch: give the producer a head start so the clip does not
        // stutter at onset, but never stall if it produces slowly.
        let prefetch_bytes = ms_to_bytes(self.config.prefetch_ms);
        while !self.interrupt.load(Ordering::Acquire)
            && sink.buffered_bytes() < prefetch_bytes
            && !sink.is_finished()
        {
            std::thread::sleep(Duration::from_millis(5));
        }

        let max_trim = ms_to_bytes(self.config.head_trim_ms);
        let mut trim_buf: Vec<u8> = Vec::new();
        let mut trimming = true;
        let mut first_output = true;
        let mut interrupted = false;

        loop {
            if self.interrupt.load(Ordering::Acquire) {
                interrupted = true;
                break;
            }
            match sink.pop(POP_TIMEOUT) {
                None => continue,
                Some(SinkChunk::Data(chunk)) => {
                    let ready = if trimming {
                        trim_buf.extend_from_slice(&chunk);
                        match scan_leading_silence(
                            &trim_buf,
                            self.config.head_trim_threshold,
                            max_trim,
                        ) {
                            TrimScan::FoundAt(offset) => {
                                trimming = false;
                                debug!(label = sink.label(), offset, "leading silence trimmed");
                                Some(trim_buf.split_off(offset))
                            }
                            TrimScan::Exhausted => {
                                trimming = false;
                                Some(trim_buf.split_off(max_trim))
                            }
                            TrimScan::NeedMore => None,
                        }
                    } else {
                        Some(chunk)
                    };

                    if let Some(out) = ready {
                        if out.is_empty() {
                            continue;
                        }
                        let out = if first_output {
                            first_output = false;
                            self.begin_clip_audio(out)
                        } else {
                            out
                        };
                        self.hold_and_write(out, remote_active);
                    }
                }
                Some(SinkChunk::End) => {
                    // A clip that stayed under the trim threshold for its
                    // whole (short) head is kept intact rather than dropped.
                    if trimming && !trim_buf.is_empty() {
                        let out = if first_output {
                            self.begin_clip_audio(std::mem::take(&mut trim_buf))
                        } else {
                            std::mem::take(&mut trim_buf)
                        };
                        self.hold_and_write(out, remote_active);
                    }
                    break;
                }
            }
        }

        if remote_active {
            if let Some(transport) = &self.transport {
                transport.end_clip(interrupted);
            }
        }
        self.state.broadcast_event(EngineEvent::ClipCompleted {
            sink_id: sink.id(),
            label: sink.label().to_string(),
            interrupted,
            timestamp: EngineEvent::now(),
        });
        self.state.set_playing(false);
    }

    /// First audible bytes of a clip: blend with the held tail of the
    /// previous clip when one exists, otherwise ramp in from silence.
    fn begin_clip_audio(&self, head: Vec<u8>) -> Vec<u8> {
        let held = {
            let mut tail = match self.tail.lock() {
                Ok(t) => t,
                Err(poisoned) => poisoned.into_inner(),
            };
            std::mem::take(&mut tail.buf)
        };

        if !held.is_empty() {
            return crossfade(&held, &head);
        }

        // Cold start: no previous tail, so the onset ramps from zero. The
        // extra fade hides the larger click a device makes when its stream
        // was fully drained.
        let fade_ms = self.config.segment_fade_in_ms + self.config.first_extra_fade_in_ms;
        let fade_samples = ms_to_bytes(fade_ms) / 2;
        let mut head = head;
        apply_fade_in(&mut head, fade_samples);
        head
    }

    /// Hold back the trailing crossfade window and write the surplus.
    fn hold_and_write(&self, bytes: Vec<u8>, remote_active: bool) {
        let hold_bytes = ms_to_bytes(self.config.crossfade_ms);
        let writable = {
            let mut tail = match self.tail.lock() {
                Ok(t) => t,
                Err(poisoned) => poisoned.into_inner(),
            };
            tail.buf.extend_from_slice(&bytes);
            tail.last_activity = Instant::now();
            if tail.buf.len() > hold_bytes {
                let cut = tail.buf.len() - hold_bytes;
                tail.buf.drain(..cut).collect::<Vec<u8>>()
            } else {
                return;
            }
        };
        self.write_pcm(&writable, remote_active);
    }

    /// Fan one finalized chunk out to the configured routes.
    fn write_pcm(&self, pcm: &[u8], remote_active: bool) {
        let mut delivered = 0usize;
        if remote_active {
            if let Some(transport) = &self.transport {
                delivered = transport.push_pcm(pcm);
                if delivered > 0 {
                    self.bytes_remote.fetch_add(pcm.len() as u64, Ordering::Relaxed);
                }
            }
        }

        let local_due = self.config.local_enabled
            && (!remote_active || !self.config.auto_disable_local_when_remote);
        // Remote placed nothing: audio must not vanish silently
        let fallback = remote_active
            && delivered == 0
            && self.config.local_enabled
            && self.config.auto_disable_local_when_remote;

        if local_due || fallback {
            if let Some(local) = &self.local {
                if let Err(e) = local.write(pcm) {
                    warn!("local write failed, chunk dropped: {}", e);
                } else {
                    self.bytes_local.fetch_add(pcm.len() as u64, Ordering::Relaxed);
                }
            }
        }
        self.chunks_written.fetch_add(1, Ordering::Relaxed);

        self.maybe_emit_level(pcm);
        self.maybe_log_diag();
    }

    fn maybe_emit_level(&self, pcm: &[u8]) {
        let due = {
            let mut last = match self.last_level_event.lock() {
                Ok(l) => l,
                Err(poisoned) => poisoned.into_inner(),
            };
            if last.elapsed() < LEVEL_EVENT_INTERVAL {
                false
            } else {
                *last = Instant::now();
                true
            }
        };
        if due {
            self.state.broadcast_event(EngineEvent::OutputLevel {
                level: rms_level(pcm),
                timestamp: EngineEvent::now(),
            });
        }
    }

    fn maybe_log_diag(&self) {
        let due = {
            let mut last = match self.last_diag_log.lock() {
                Ok(l) => l,
                Err(poisoned) => poisoned.into_inner(),
            };
            if last.elapsed() < DIAG_LOG_INTERVAL {
                false
            } else {
                *last = Instant::now();
                true
            }
        };
        if due {
            debug!(
                local_bytes = self.bytes_local.load(Ordering::Relaxed),
                remote_bytes = self.bytes_remote.load(Ordering::Relaxed),
                chunks = self.chunks_written.load(Ordering::Relaxed),
                "output throughput"
            );
        }
    }
}

/// Convert declared-format PCM to target-format chunks.
fn convert_to_target(
    pcm: &[u8],
    spec: &PcmSpec,
    mut push: impl FnMut(Vec<u8>),
) -> crate::error::Result<()> {
    if spec.is_target() {
        for chunk in pcm.chunks(PRODUCER_CHUNK_BYTES) {
            push(chunk.to_vec());
        }
        return Ok(());
    }

    let mono = convert::to_mono_f32(pcm, spec)?;
    let mut resampler = StreamResampler::new(spec.sample_rate, sonolink_common::pcm::TARGET_SAMPLE_RATE)?;
    let mut converted = resampler.push(&mono)?;
    converted.extend(resampler.flush()?);

    for chunk in f32_to_i16_bytes(&converted).chunks(PRODUCER_CHUNK_BYTES) {
        push(chunk.to_vec());
    }
    Ok(())
}

enum TrimScan {
    /// First loud sample starts at this byte offset
    FoundAt(usize),
    /// Scan budget used up with nothing loud found
    Exhausted,
    /// Everything so far is quiet and the budget is not exhausted
    NeedMore,
}

/// Look for the first sample at or above `threshold` within the first
/// `max_scan_bytes` of the buffer.
fn scan_leading_silence(buf: &[u8], threshold: i32, max_scan_bytes: usize) -> TrimScan {
    let scan_len = buf.len().min(max_scan_bytes);
    for (i, pair) in buf[..scan_len & !1].chunks_exact(2).enumerate() {
        let sample = i16::from_le_bytes([pair[0], pair[1]]) as i32;
        if sample.abs() >= threshold {
            return TrimScan::FoundAt(i * 2);
        }
    }
    if buf.len() >= max_scan_bytes {
        TrimScan::Exhausted
    } else {
        TrimScan::NeedMore
    }
}

/// Linearly blend the previous clip's tail into the new clip's head.
///
/// Over the overlap, sample i uses weight `t = i / (n - 1)`: the boundary
/// starts at exactly the tail's value and ends at exactly the head's.
/// Output is the mixed overlap followed by the rest of the head; tail
/// samples beyond the overlap are discarded.
fn crossfade(tail: &[u8], head: &[u8]) -> Vec<u8> {
    let mix_samples = (tail.len().min(head.len())) / 2;
    if mix_samples == 0 {
        return head.to_vec();
    }

    let mut out = Vec::with_capacity(head.len());
    for i in 0..mix_samples {
        let a = i16::from_le_bytes([tail[i * 2], tail[i * 2 + 1]]) as f32;
        let b = i16::from_le_bytes([head[i * 2], head[i * 2 + 1]]) as f32;
        let t = if mix_samples > 1 {
            i as f32 / (mix_samples - 1) as f32
        } else {
            1.0
        };
        let mixed = (a * (1.0 - t) + b * t).clamp(-32_768.0, 32_767.0) as i16;
        out.extend_from_slice(&mixed.to_le_bytes());
    }
    out.extend_from_slice(&head[mix_samples * 2..]);
    out
}

/// In-place linear ramp from zero over the first `fade_samples` samples.
fn apply_fade_in(pcm: &mut [u8], fade_samples: usize) {
    if fade_samples == 0 {
        return;
    }
    let total = (pcm.len() / 2).min(fade_samples);
    for i in 0..total {
        let sample = i16::from_le_bytes([pcm[i * 2], pcm[i * 2 + 1]]) as f32;
        let gain = i as f32 / fade_samples as f32;
        let faded = (sample * gain) as i16;
        let bytes = faded.to_le_bytes();
        pcm[i * 2] = bytes[0];
        pcm[i * 2 + 1] = bytes[1];
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pcm_of(samples: &[i16]) -> Vec<u8> {
        samples.iter().flat_map(|s| s.to_le_bytes()).collect()
    }

    fn samples_of(pcm: &[u8]) -> Vec<i16> {
        pcm.chunks_exact(2)
            .map(|p| i16::from_le_bytes([p[0], p[1]]))
            .collect()
    }

    #[test]
    fn crossfade_hits_both_boundaries() {
        let tail = pcm_of(&[10_000; 8]);
        let head = pcm_of(&[-10_000; 8]);
        let mixed = samples_of(&crossfade(&tail, &head));

        assert_eq!(mixed.len(), 8);
        assert_eq!(mixed[0], 10_000);
        assert_eq!(mixed[7], -10_000);
        // Monotonic in between
        for pair in mixed.windows(2) {
            assert!(pair[1] <= pair[0]);
        }
    }

    #[test]
    fn crossfade_emits_head_remainder_unmixed() {
        let tail = pcm_of(&[1_000; 4]);
        let head = pcm_of(&[5_000; 10]);
        let out = samples_of(&crossfade(&tail, &head));

        assert_eq!(out.len(), 10);
        assert_eq!(&out[4..], &[5_000; 6]);
    }

    #[test]
    fn crossfade_with_short_head_drops_surplus_tail() {
        let tail = pcm_of(&[1_000; 10]);
        let head = pcm_of(&[2_000; 4]);
        let out = samples_of(&crossfade(&tail, &head));
        assert_eq!(out.len(), 4);
        assert_eq!(out[0], 1_000);
        assert_eq!(out[3], 2_000);
    }

    #[test]
    fn crossfade_with_empty_tail_is_identity() {
        let head = pcm_of(&[123, 456]);
        assert_eq!(crossfade(&[], &head), head);
    }

    #[test]
    fn fade_in_ramps_from_zero() {
        let mut pcm = pcm_of(&[20_000; 10]);
        apply_fade_in(&mut pcm, 5);
        let out = samples_of(&pcm);

        assert_eq!(out[0], 0);
        assert!(out[1] > 0 && out[1] < out[2]);
        // Beyond the ramp, samples untouched
        assert_eq!(&out[5..], &[20_000; 5]);
    }

    #[test]
    fn trim_finds_first_loud_sample() {
        let mut samples = vec![0i16; 50];
        samples.extend_from_slice(&[500, 600, 700]);
        let buf = pcm_of(&samples);

        match scan_leading_silence(&buf, 200, 1_000) {
            TrimScan::FoundAt(offset) => assert_eq!(offset, 100),
            _ => panic!("expected a trim point"),
        }
    }

    #[test]
    fn trim_needs_more_while_quiet_and_under_budget() {
        let buf = pcm_of(&[10i16; 20]);
        assert!(matches!(
            scan_leading_silence(&buf, 200, 1_000),
            TrimScan::NeedMore
        ));
    }

    #[test]
    fn trim_caps_at_budget() {
        // Entire window quiet and budget exceeded: cap, never trim more
        let buf = pcm_of(&vec![10i16; 600]);
        assert!(matches!(
            scan_leading_silence(&buf, 200, 1_000),
            TrimScan::Exhausted
        ));
    }

    #[test]
    fn trim_respects_threshold_boundary() {
        let buf = pcm_of(&[199, -200, 0]);
        match scan_leading_silence(&buf, 200, 1_000) {
            TrimScan::FoundAt(offset) => assert_eq!(offset, 2),
            _ => panic!("negative sample at threshold must count"),
        }
    }
}
