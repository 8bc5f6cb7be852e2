//! # Sonolink Audio Engine (sonolink-engine)
//!
//! Streaming audio delivery engine with gapless clip splicing.
//!
//! **Purpose:** Route synthesized speech, sound-effect clips, and music to a
//! local speaker and/or remote embedded listeners with minimal latency,
//! crossfaded clip boundaries, priority-aware queueing, and time-synchronized
//! spectrum analysis for music visualization.
//!
//! **Architecture:** Dedicated playback thread draining per-clip stream
//! sinks, fanning finalized PCM out to a cpal device and a paced network
//! transport (raw PCM markers or opus frames), driven by a priority queue.

pub mod analyzer;
pub mod audio;
pub mod config;
pub mod engine;
pub mod error;
pub mod net;
pub mod playback;
pub mod state;

pub use config::EngineConfig;
pub use engine::AudioEngine;
pub use error::{Error, Result};
pub use state::EngineState;
