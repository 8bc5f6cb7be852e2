//! Engine assembly
//!
//! Wires the shared state, device registry, transport, router, analyzer,
//! and priority queue into one owning object. Every component receives its
//! collaborators explicitly at construction; nothing is discovered through
//! globals.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::{info, warn};

use sonolink_common::events::EngineEvent;
use sonolink_common::pcm::PcmSpec;

use crate::analyzer::{FrameCallback, SpectrumAnalyzer, BAND_COUNT};
use crate::audio::output::{CpalOutput, PcmOutput};
use crate::config::EngineConfig;
use crate::error::Result;
use crate::net::registry::DeviceRegistry;
use crate::net::transport::RemoteOutputTransport;
use crate::playback::queue::{AudioItem, AudioPayload, PriorityAudioQueue, SourceKind};
use crate::playback::router::PlaybackRouter;
use crate::state::EngineState;

pub struct AudioEngine {
    state: Arc<EngineState>,
    registry: Arc<DeviceRegistry>,
    router: Arc<PlaybackRouter>,
    analyzer: Arc<SpectrumAnalyzer>,
    queue: Arc<PriorityAudioQueue>,
}

impl AudioEngine {
    /// Build the engine with a local cpal device per the configuration.
    ///
    /// A missing or failing local device is downgraded to a warning: remote
    /// delivery may still be the whole point of this deployment.
    pub fn new(config: EngineConfig) -> Result<Self> {
        let local: Option<Arc<dyn PcmOutput>> = if config.router.local_enabled {
            match CpalOutput::new(config.local_device.as_deref()) {
                Ok(output) => {
                    info!(device = %output.name(), "local output ready");
                    Some(Arc::new(output))
                }
                Err(e) => {
                    warn!("local output unavailable: {}", e);
                    None
                }
            }
        } else {
            None
        };
        Ok(Self::with_outputs(config, local, Arc::new(DeviceRegistry::new())))
    }

    /// Build the engine around injected outputs; used by headless hosts
    /// and tests.
    pub fn with_outputs(
        config: EngineConfig,
        local: Option<Arc<dyn PcmOutput>>,
        registry: Arc<DeviceRegistry>,
    ) -> Self {
        let state = Arc::new(EngineState::new());

        let transport = Arc::new(RemoteOutputTransport::new(
            config.transport.clone(),
            config.encoder.clone(),
            Arc::clone(&registry),
            Arc::clone(&state),
        ));
        let router = Arc::new(PlaybackRouter::new(
            config.router.clone(),
            local,
            Some(transport),
            Arc::clone(&state),
        ));
        let analyzer = Arc::new(SpectrumAnalyzer::new(
            config.analyzer.clone(),
            Arc::clone(&state),
        ));
        let queue = Arc::new(PriorityAudioQueue::new(
            config.queue.clone(),
            Arc::clone(&router),
            Arc::clone(&analyzer),
            Arc::clone(&state),
        ));

        AudioEngine {
            state,
            registry,
            router,
            analyzer,
            queue,
        }
    }

    /// Queue a file-backed clip.
    pub fn submit_file(&self, path: PathBuf, source: SourceKind, priority: i32, label: &str) {
        self.queue.submit(AudioItem::new(
            priority,
            AudioPayload::File(path),
            source,
            label,
        ));
    }

    /// Queue an in-memory PCM clip of a declared format.
    pub fn submit_pcm(
        &self,
        pcm: Vec<u8>,
        spec: PcmSpec,
        source: SourceKind,
        priority: i32,
        label: &str,
    ) {
        self.queue.submit(AudioItem::new(
            priority,
            AudioPayload::Bytes { pcm, spec },
            source,
            label,
        ));
    }

    /// Abort all playback and drop the backlog.
    pub fn interrupt(&self) {
        self.queue.interrupt();
    }

    /// Block until the queue is drained and the router is fully idle.
    pub fn wait_until_idle(&self, timeout: Duration) -> bool {
        let deadline = std::time::Instant::now() + timeout;
        loop {
            if self.queue.is_idle() && self.router.is_idle() {
                return true;
            }
            if std::time::Instant::now() >= deadline {
                return false;
            }
            std::thread::sleep(Duration::from_millis(10));
        }
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<EngineEvent> {
        self.state.subscribe_events()
    }

    /// Listener registry for the signaling layer to populate.
    pub fn registry(&self) -> &Arc<DeviceRegistry> {
        &self.registry
    }

    pub fn set_spectrum_callback(&self, callback: FrameCallback) {
        self.analyzer.set_callback(callback);
    }

    pub fn latest_spectrum(&self) -> [u8; BAND_COUNT] {
        self.analyzer.latest_frame()
    }

    pub fn shutdown(&self) {
        self.queue.shutdown();
        self.analyzer.stop();
        self.router.shutdown();
    }
}
