//! # Sonolink Common Library
//!
//! Shared code for the Sonolink audio delivery engine:
//! - Error types
//! - Engine event types (EngineEvent enum)
//! - Configuration file resolution and loading
//! - PCM format constants and byte/duration math

pub mod config;
pub mod error;
pub mod events;
pub mod pcm;

pub use error::{Error, Result};
pub use events::{EngineEvent, OutputRoute, PlaybackState};
pub use pcm::PcmSpec;
