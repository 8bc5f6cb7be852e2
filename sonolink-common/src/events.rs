//! Event types for the Sonolink engine event system
//!
//! Events are broadcast to in-process collaborators (UI bridges, device
//! adapters, diagnostics) over a `tokio::sync::broadcast` channel owned by
//! the engine state.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Overall playback state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlaybackState {
    Playing,
    Idle,
}

/// Which outputs a clip is routed to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputRoute {
    LocalOnly,
    RemoteOnly,
    Dual,
}

impl OutputRoute {
    /// Stable name used in route logging
    pub fn as_str(&self) -> &'static str {
        match self {
            OutputRoute::LocalOnly => "local_only",
            OutputRoute::RemoteOnly => "remote_only",
            OutputRoute::Dual => "dual",
        }
    }
}

/// Engine event types
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum EngineEvent {
    /// Playback started or returned to idle
    PlaybackStateChanged {
        state: PlaybackState,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// A clip began playing and was routed
    ClipStarted {
        sink_id: Uuid,
        label: String,
        route: OutputRoute,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// A clip finished draining (or was interrupted)
    ClipCompleted {
        sink_id: Uuid,
        label: String,
        interrupted: bool,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Smoothed output loudness in [0.0, 1.0], emitted while playing
    OutputLevel {
        level: f32,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// One spectrum analysis frame: 8 band intensities in [0, 255]
    SpectrumFrame {
        bands: [u8; 8],
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Per-listener delivery diagnostics emitted at clip end
    RemoteClipDelivered {
        listener: String,
        label: String,
        bytes: u64,
        chunks: u64,
        interrupted: bool,
        /// Measured send-speed ratio: audio seconds / wall-clock send seconds
        speed_x: f64,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Queue depth changed (notification only)
    QueueChanged {
        depth: usize,
        timestamp: chrono::DateTime<chrono::Utc>,
    },
}

impl EngineEvent {
    /// Current UTC timestamp helper for event construction
    pub fn now() -> chrono::DateTime<chrono::Utc> {
        chrono::Utc::now()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn event_serializes_with_type_tag() {
        let event = EngineEvent::PlaybackStateChanged {
            state: PlaybackState::Playing,
            timestamp: EngineEvent::now(),
        };
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("\"type\":\"PlaybackStateChanged\""));
        assert!(json.contains("\"state\":\"playing\""));
    }

    #[test]
    fn route_names_are_stable() {
        assert_eq!(OutputRoute::LocalOnly.as_str(), "local_only");
        assert_eq!(OutputRoute::Dual.as_str(), "dual");
        assert_eq!(OutputRoute::RemoteOnly.as_str(), "remote_only");
    }
}
