//! Per-clip stream sink
//!
//! A `StreamSink` is the handle for one in-flight clip: the producer thread
//! pushes finalized 16kHz mono i16-LE PCM into it and calls `finish`; the
//! router drains it from the other side. One writer, one reader, both
//! through `&self`.

use std::collections::VecDeque;
use std::sync::{Condvar, Mutex};
use std::time::Duration;
use tracing::trace;
use uuid::Uuid;

/// One unit handed to the router by `pop`.
#[derive(Debug, PartialEq, Eq)]
pub enum SinkChunk {
    /// PCM bytes in arrival order
    Data(Vec<u8>),
    /// Producer called `finish` and the queue is empty
    End,
}

struct SinkState {
    chunks: VecDeque<Vec<u8>>,
    buffered_bytes: usize,
    finished: bool,
}

/// Thread-safe byte FIFO for one clip.
pub struct StreamSink {
    id: Uuid,
    label: String,
    /// Remote delivery target, when the producer named one
    target: Option<String>,
    state: Mutex<SinkState>,
    available: Condvar,
}

impl StreamSink {
    pub fn new(label: &str) -> Self {
        Self::new_for(label, None)
    }

    pub fn new_for(label: &str, target: Option<&str>) -> Self {
        StreamSink {
            id: Uuid::new_v4(),
            label: label.to_string(),
            target: target.map(|t| t.to_string()),
            state: Mutex::new(SinkState {
                chunks: VecDeque::new(),
                buffered_bytes: 0,
                finished: false,
            }),
            available: Condvar::new(),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn target(&self) -> Option<&str> {
        self.target.as_deref()
    }

    /// Append PCM to the clip. Pushes after `finish` are ignored.
    pub fn push(&self, pcm: Vec<u8>) {
        if pcm.is_empty() {
            return;
        }
        let mut state = match self.state.lock() {
            Ok(s) => s,
            Err(poisoned) => poisoned.into_inner(),
        };
        if state.finished {
            trace!(label = %self.label, "push after finish ignored");
            return;
        }
        state.buffered_bytes += pcm.len();
        state.chunks.push_back(pcm);
        self.available.notify_one();
    }

    /// Mark the clip complete. Idempotent.
    pub fn finish(&self) {
        let mut state = match self.state.lock() {
            Ok(s) => s,
            Err(poisoned) => poisoned.into_inner(),
        };
        state.finished = true;
        self.available.notify_all();
    }

    /// Take the next chunk, waiting up to `timeout` for one to arrive.
    ///
    /// Returns `None` on timeout with the clip still open; the caller is
    /// expected to re-check its interrupt flag and call again.
    pub fn pop(&self, timeout: Duration) -> Option<SinkChunk> {
        let mut state = match self.state.lock() {
            Ok(s) => s,
            Err(poisoned) => poisoned.into_inner(),
        };
        if state.chunks.is_empty() && !state.finished {
            let (guard, _timeout_result) = match self.available.wait_timeout(state, timeout) {
                Ok(r) => r,
                Err(poisoned) => poisoned.into_inner(),
            };
            state = guard;
        }
        if let Some(chunk) = state.chunks.pop_front() {
            state.buffered_bytes -= chunk.len();
            return Some(SinkChunk::Data(chunk));
        }
        if state.finished {
            return Some(SinkChunk::End);
        }
        None
    }

    /// Bytes pushed but not yet popped
    pub fn buffered_bytes(&self) -> usize {
        match self.state.lock() {
            Ok(s) => s.buffered_bytes,
            Err(poisoned) => poisoned.into_inner().buffered_bytes,
        }
    }

    /// Producer has called `finish`
    pub fn is_finished(&self) -> bool {
        match self.state.lock() {
            Ok(s) => s.finished,
            Err(poisoned) => poisoned.into_inner().finished,
        }
    }
}
