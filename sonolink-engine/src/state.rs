//! Shared engine state
//!
//! Explicit context object passed by handle to the router, queue, transport,
//! and analyzer. Replaces module-global "is playing" style flags: every
//! component that needs to observe or mutate playback state receives an
//! `Arc<EngineState>` at construction.

use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::broadcast;
use tracing::debug;

use sonolink_common::events::{EngineEvent, PlaybackState};

/// Shared state accessible by all engine components
pub struct EngineState {
    /// Router is actively draining a sink
    playing: AtomicBool,

    /// Queue has accepted an item and playback has not finished yet
    speaking: AtomicBool,

    /// Event broadcaster for in-process collaborators
    event_tx: broadcast::Sender<EngineEvent>,
}

impl EngineState {
    /// Create new engine state with an idle playback status
    pub fn new() -> Self {
        let (event_tx, _) = broadcast::channel(256);
        EngineState {
            playing: AtomicBool::new(false),
            speaking: AtomicBool::new(false),
            event_tx,
        }
    }

    /// Broadcast an event to all subscribers.
    /// Send errors (no receivers) are ignored.
    pub fn broadcast_event(&self, event: EngineEvent) {
        let _ = self.event_tx.send(event);
    }

    /// Subscribe to the engine event stream
    pub fn subscribe_events(&self) -> broadcast::Receiver<EngineEvent> {
        self.event_tx.subscribe()
    }

    /// Whether the router is actively playing
    pub fn is_playing(&self) -> bool {
        self.playing.load(Ordering::Acquire)
    }

    /// Update the playing flag, emitting a state-change event on transitions
    pub fn set_playing(&self, playing: bool) {
        let was = self.playing.swap(playing, Ordering::AcqRel);
        if was == playing {
            return;
        }
        let state = if playing {
            PlaybackState::Playing
        } else {
            PlaybackState::Idle
        };
        debug!(?state, "playback state changed");
        self.broadcast_event(EngineEvent::PlaybackStateChanged {
            state,
            timestamp: EngineEvent::now(),
        });
    }

    /// Whether the queue is mid-utterance
    pub fn is_speaking(&self) -> bool {
        self.speaking.load(Ordering::Acquire)
    }

    /// Update the speaking flag (no event; queue-internal coordination)
    pub fn set_speaking(&self, speaking: bool) {
        self.speaking.store(speaking, Ordering::Release);
    }
}

impl Default for EngineState {
    fn default() -> Self {
        Self::new()
    }
}
