//! Priority audio queue
//!
//! The conversation-facing front door. Producers submit tagged items; a
//! poller thread drains them in small batches, applies the staleness
//! heuristic, and plays the winners one at a time through the router.
//! Music items additionally get a spectrum analyzer bound to their
//! playback clock for exactly the duration they play.

use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::Duration;
use tracing::{debug, info, warn};

use sonolink_common::events::EngineEvent;
use sonolink_common::pcm::PcmSpec;

use crate::analyzer::SpectrumAnalyzer;
use crate::config::QueueConfig;
use crate::playback::router::PlaybackRouter;
use crate::state::EngineState;

/// What produced an item; drives analyzer lifetime and log context.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceKind {
    Tts,
    Effect,
    Music,
    Agent,
}

impl SourceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceKind::Tts => "tts",
            SourceKind::Effect => "effect",
            SourceKind::Music => "music",
            SourceKind::Agent => "agent",
        }
    }
}

#[derive(Debug, Clone)]
pub enum AudioPayload {
    File(PathBuf),
    Bytes { pcm: Vec<u8>, spec: PcmSpec },
}

/// One queued unit of audio.
#[derive(Debug, Clone)]
pub struct AudioItem {
    /// Higher is more urgent
    pub priority: i32,
    pub payload: AudioPayload,
    pub source: SourceKind,
    pub label: String,
    /// Remote delivery target for this item, when the producer named one
    pub target: Option<String>,
    /// Arrival order, assigned on submit
    pub(crate) seq: u64,
}

impl AudioItem {
    pub fn new(priority: i32, payload: AudioPayload, source: SourceKind, label: &str) -> Self {
        AudioItem {
            priority,
            payload,
            source,
            label: label.to_string(),
            target: None,
            seq: 0,
        }
    }

    /// Address the item's remote delivery to one target user.
    pub fn with_target(mut self, target: &str) -> Self {
        self.target = Some(target.to_string());
        self
    }
}

/// Staleness heuristic over one dequeued batch.
///
/// With a wide priority span the batch holds both a final result and stale
/// intermediate ones: keep every top-priority item plus the earliest
/// bottom-priority item (typically the opening utterance) and drop the
/// rest. A narrow span means everything is current; play it all in
/// priority order.
pub(crate) fn filter_batch(mut items: Vec<AudioItem>) -> Vec<AudioItem> {
    if items.len() < 2 {
        return items;
    }
    items.sort_by(|a, b| b.priority.cmp(&a.priority).then(a.seq.cmp(&b.seq)));

    let max = items.first().map(|i| i.priority).unwrap_or(0);
    let min = items.last().map(|i| i.priority).unwrap_or(0);
    if max - min >= 2 {
        let keep_min_seq = items
            .iter()
            .filter(|i| i.priority == min)
            .map(|i| i.seq)
            .min();
        let before = items.len();
        items.retain(|i| i.priority == max || Some(i.seq) == keep_min_seq);
        debug!(dropped = before - items.len(), span = max - min, "stale items dropped");
    }
    items
}

struct QueueShared {
    config: QueueConfig,
    pending: Mutex<VecDeque<AudioItem>>,
    running: AtomicBool,
    /// Bumped on every interrupt so an in-flight batch abandons itself
    epoch: AtomicU64,
    seq: AtomicU64,
    router: Arc<PlaybackRouter>,
    analyzer: Arc<SpectrumAnalyzer>,
    state: Arc<EngineState>,
}

pub struct PriorityAudioQueue {
    shared: Arc<QueueShared>,
    poller: Mutex<Option<JoinHandle<()>>>,
}

impl PriorityAudioQueue {
    pub fn new(
        config: QueueConfig,
        router: Arc<PlaybackRouter>,
        analyzer: Arc<SpectrumAnalyzer>,
        state: Arc<EngineState>,
    ) -> Self {
        let shared = Arc::new(QueueShared {
            config,
            pending: Mutex::new(VecDeque::new()),
            running: AtomicBool::new(true),
            epoch: AtomicU64::new(0),
            seq: AtomicU64::new(0),
            router,
            analyzer,
            state,
        });

        let poll_shared = Arc::clone(&shared);
        let poller = std::thread::Builder::new()
            .name("audio-queue".to_string())
            .spawn(move || poll_shared.run())
            .ok();

        PriorityAudioQueue {
            shared,
            poller: Mutex::new(poller),
        }
    }

    /// Accept an item for playback.
    pub fn submit(&self, mut item: AudioItem) {
        item.seq = self.shared.seq.fetch_add(1, Ordering::AcqRel);
        self.shared.state.set_speaking(true);
        let depth = {
            let mut pending = match self.shared.pending.lock() {
                Ok(p) => p,
                Err(poisoned) => poisoned.into_inner(),
            };
            pending.push_back(item);
            pending.len()
        };
        self.shared.emit_depth(depth);
    }

    /// Drop the backlog and abort whatever is playing. New input is
    /// accepted immediately afterward.
    pub fn interrupt(&self) {
        info!("queue interrupt");
        self.shared.epoch.fetch_add(1, Ordering::AcqRel);
        let depth = {
            let mut pending = match self.shared.pending.lock() {
                Ok(p) => p,
                Err(poisoned) => poisoned.into_inner(),
            };
            pending.clear();
            0
        };
        self.shared.analyzer.stop();
        self.shared.router.stop_all();
        self.shared.state.set_speaking(false);
        self.shared.emit_depth(depth);
    }

    pub fn depth(&self) -> usize {
        self.shared
            .pending
            .lock()
            .map(|p| p.len())
            .unwrap_or(0)
    }

    /// Backlog empty and nothing mid-utterance
    pub fn is_idle(&self) -> bool {
        self.depth() == 0 && !self.shared.state.is_speaking()
    }

    pub fn shutdown(&self) {
        self.shared.running.store(false, Ordering::Release);
        if let Ok(mut poller) = self.poller.lock() {
            if let Some(handle) = poller.take() {
                let _ = handle.join();
            }
        }
    }
}

impl Drop for PriorityAudioQueue {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl QueueShared {
    fn emit_depth(&self, depth: usize) {
        self.state.broadcast_event(EngineEvent::QueueChanged {
            depth,
            timestamp: EngineEvent::now(),
        });
    }

    fn run(&self) {
        debug!("queue poller started");
        let poll = Duration::from_millis(self.config.poll_interval_ms);

        while self.running.load(Ordering::Acquire) {
            std::thread::sleep(poll);

            let batch: Vec<AudioItem> = {
                let mut pending = match self.pending.lock() {
                    Ok(p) => p,
                    Err(poisoned) => poisoned.into_inner(),
                };
                let take = pending.len().min(self.config.max_batch);
                pending.drain(..take).collect()
            };
            if batch.is_empty() {
                if self.state.is_speaking() {
                    self.state.set_speaking(false);
                }
                continue;
            }

            let epoch = self.epoch.load(Ordering::Acquire);
            let batch = filter_batch(batch);
            self.emit_depth(self.pending.lock().map(|p| p.len()).unwrap_or(0));

            for item in batch {
                if !self.running.load(Ordering::Acquire)
                    || self.epoch.load(Ordering::Acquire) != epoch
                {
                    break;
                }
                self.play_item(item);
            }
        }
        debug!("queue poller stopped");
    }

    fn play_item(&self, item: AudioItem) {
        debug!(
            label = %item.label,
            source = item.source.as_str(),
            priority = item.priority,
            "playing queue item"
        );
        let is_music = item.source == SourceKind::Music;

        match item.payload {
            AudioPayload::File(path) => {
                // The analyzer binds to the playback clock before the file
                // is handed over, so its lifetime is a subset of playback.
                if is_music {
                    if let Err(e) = self.analyzer.start(&path) {
                        warn!(label = %item.label, "analyzer failed to start: {}", e);
                    }
                }
                self.router.enqueue_file(path, &item.label, item.target.as_deref());
            }
            AudioPayload::Bytes { pcm, spec } => {
                self.router.enqueue_pcm(pcm, spec, &item.label, item.target.as_deref());
            }
        }

        // Drained, not idle: the held crossfade tail must survive into the
        // next batch item so consecutive clips blend.
        let timeout = Duration::from_secs(self.config.item_timeout_secs);
        if !self.router.wait_until_drained(timeout) {
            warn!(label = %item.label, "item did not finish within timeout");
        }
        if is_music {
            self.analyzer.stop();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(priority: i32, seq: u64) -> AudioItem {
        AudioItem {
            priority,
            payload: AudioPayload::Bytes {
                pcm: Vec::new(),
                spec: PcmSpec::target(),
            },
            source: SourceKind::Tts,
            label: format!("p{}s{}", priority, seq),
            target: None,
            seq,
        }
    }

    #[test]
    fn wide_span_keeps_extremes_only() {
        let batch = vec![item(0, 0), item(5, 1), item(3, 2), item(5, 3)];
        let kept = filter_batch(batch);

        let priorities: Vec<i32> = kept.iter().map(|i| i.priority).collect();
        assert_eq!(priorities, vec![5, 5, 0]);
        // Equal priorities stay in arrival order
        assert_eq!(kept[0].seq, 1);
        assert_eq!(kept[1].seq, 3);
    }

    #[test]
    fn duplicate_bottom_priority_collapses_to_earliest() {
        let batch = vec![item(0, 0), item(0, 1), item(5, 2), item(0, 3)];
        let kept = filter_batch(batch);

        let priorities: Vec<i32> = kept.iter().map(|i| i.priority).collect();
        assert_eq!(priorities, vec![5, 0]);
        // Of the stale low-priority copies, only the first submitted plays
        assert_eq!(kept[1].seq, 0);
    }

    #[test]
    fn narrow_span_keeps_everything_in_priority_order() {
        let batch = vec![item(1, 0), item(2, 1)];
        let kept = filter_batch(batch);
        let priorities: Vec<i32> = kept.iter().map(|i| i.priority).collect();
        assert_eq!(priorities, vec![2, 1]);
    }

    #[test]
    fn uniform_batch_untouched() {
        let batch = vec![item(3, 0), item(3, 1), item(3, 2)];
        let kept = filter_batch(batch);
        assert_eq!(kept.len(), 3);
        let seqs: Vec<u64> = kept.iter().map(|i| i.seq).collect();
        assert_eq!(seqs, vec![0, 1, 2]);
    }

    #[test]
    fn span_of_exactly_two_triggers_filter() {
        let batch = vec![item(1, 0), item(2, 1), item(3, 2)];
        let kept = filter_batch(batch);
        let priorities: Vec<i32> = kept.iter().map(|i| i.priority).collect();
        assert_eq!(priorities, vec![3, 1]);
    }

    #[test]
    fn single_item_passes_through() {
        let kept = filter_batch(vec![item(7, 0)]);
        assert_eq!(kept.len(), 1);
    }
}
