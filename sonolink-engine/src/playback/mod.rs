//! Playback pipeline: per-clip stream sinks, the routing/crossfade loop,
//! and the priority front door that feeds it.

pub mod queue;
pub mod router;
pub mod sink;

pub use queue::{AudioItem, AudioPayload, PriorityAudioQueue, SourceKind};
pub use router::PlaybackRouter;
pub use sink::{SinkChunk, StreamSink};
