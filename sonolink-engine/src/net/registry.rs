//! Remote listener registry
//!
//! The signaling layer that discovers and authenticates devices lives
//! elsewhere; from the engine's point of view a listener is just a handle
//! that can accept bytes and report whether it is still alive. The router
//! and transport receive an explicit `DeviceRegistry` at construction
//! rather than discovering connections through any shared global.

use std::io::Write;
use std::net::TcpStream;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::{Error, Result};

/// Upper bound on one blocking socket write; a peer that stalls longer
/// surfaces as a send error and is dropped from its clip session.
const SEND_TIMEOUT: Duration = Duration::from_secs(2);

/// One reachable playback endpoint.
///
/// `send` failures mean the connection is unusable; callers drop the
/// listener from their session rather than retrying.
pub trait RemoteListener: Send + Sync {
    fn id(&self) -> Uuid;

    /// Human-readable name for logs
    fn name(&self) -> String;

    /// Target user this endpoint is bound to, when the signaling layer
    /// has told us. `None` accepts any clip.
    fn target(&self) -> Option<String> {
        None
    }

    /// Deliver one framed payload. Must not block indefinitely.
    fn send(&self, bytes: &[u8]) -> Result<()>;

    /// Connection has been torn down
    fn is_closed(&self) -> bool;

    /// Tear the connection down; idempotent
    fn stop(&self);
}

/// Registry of currently reachable listeners.
pub struct DeviceRegistry {
    listeners: Mutex<Vec<Arc<dyn RemoteListener>>>,
}

impl DeviceRegistry {
    pub fn new() -> Self {
        DeviceRegistry {
            listeners: Mutex::new(Vec::new()),
        }
    }

    pub fn register(&self, listener: Arc<dyn RemoteListener>) {
        info!(listener = %listener.name(), "remote listener registered");
        if let Ok(mut listeners) = self.listeners.lock() {
            listeners.push(listener);
        }
    }

    pub fn unregister(&self, id: Uuid) {
        if let Ok(mut listeners) = self.listeners.lock() {
            let before = listeners.len();
            listeners.retain(|l| l.id() != id);
            if listeners.len() != before {
                debug!(%id, "remote listener unregistered");
            }
        }
    }

    /// Snapshot of open listeners; closed ones are swept out as a side
    /// effect so the registry does not accumulate dead handles.
    pub fn snapshot(&self) -> Vec<Arc<dyn RemoteListener>> {
        self.snapshot_for(None)
    }

    /// Snapshot of open listeners for a delivery target.
    ///
    /// With a target, only listeners bound to that user are returned; an
    /// unknown target falls back to every open listener so audio is never
    /// silently withheld from a mistyped or stale user id.
    pub fn snapshot_for(&self, target: Option<&str>) -> Vec<Arc<dyn RemoteListener>> {
        let mut listeners = match self.listeners.lock() {
            Ok(l) => l,
            Err(poisoned) => poisoned.into_inner(),
        };
        listeners.retain(|l| !l.is_closed());

        if let Some(target) = target {
            let matched: Vec<Arc<dyn RemoteListener>> = listeners
                .iter()
                .filter(|l| l.target().as_deref() == Some(target))
                .cloned()
                .collect();
            if !matched.is_empty() {
                return matched;
            }
            debug!(target, "no listener bound to target, using all outputs");
        }
        listeners.clone()
    }

    /// At least one open listener can take clips for `target`
    pub fn has_output(&self, target: Option<&str>) -> bool {
        !self.snapshot_for(target).is_empty()
    }
}

impl Default for DeviceRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Listener backed by a plain TCP stream.
pub struct TcpRemoteListener {
    id: Uuid,
    name: String,
    stream: Mutex<TcpStream>,
    closed: AtomicBool,
    target: Mutex<Option<String>>,
}

impl TcpRemoteListener {
    pub fn new(stream: TcpStream) -> Self {
        let name = stream
            .peer_addr()
            .map(|a| a.to_string())
            .unwrap_or_else(|_| "unknown-peer".to_string());
        // A hung peer must fail the write, not wedge the router thread
        if let Err(e) = stream.set_write_timeout(Some(SEND_TIMEOUT)) {
            warn!(listener = %name, "set_write_timeout failed: {}", e);
        }
        TcpRemoteListener {
            id: Uuid::new_v4(),
            name,
            stream: Mutex::new(stream),
            closed: AtomicBool::new(false),
            target: Mutex::new(None),
        }
    }

    /// Bind this connection to a target user once signaling identifies it.
    pub fn bind_target(&self, user: &str) {
        if let Ok(mut target) = self.target.lock() {
            *target = Some(user.to_string());
        }
    }
}

impl RemoteListener for TcpRemoteListener {
    fn id(&self) -> Uuid {
        self.id
    }

    fn name(&self) -> String {
        self.name.clone()
    }

    fn target(&self) -> Option<String> {
        self.target.lock().map(|t| t.clone()).unwrap_or(None)
    }

    fn send(&self, bytes: &[u8]) -> Result<()> {
        if self.closed.load(Ordering::Acquire) {
            return Err(Error::Transport(format!("{}: connection closed", self.name)));
        }
        let mut stream = self
            .stream
            .lock()
            .map_err(|_| Error::Transport(format!("{}: stream lock poisoned", self.name)))?;
        stream.write_all(bytes).map_err(|e| {
            self.closed.store(true, Ordering::Release);
            warn!(listener = %self.name, "send failed: {}", e);
            Error::Transport(format!("{}: {}", self.name, e))
        })
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    fn stop(&self) {
        if !self.closed.swap(true, Ordering::AcqRel) {
            if let Ok(stream) = self.stream.lock() {
                let _ = stream.shutdown(std::net::Shutdown::Both);
            }
            debug!(listener = %self.name, "listener stopped");
        }
    }
}


#[cfg(test)]
mod tests {
    use super::test_support::CaptureListener;
    use super::*;

    #[test]
    fn registry_sweeps_closed_listeners() {
        let registry = DeviceRegistry::new();
        let a = Arc::new(CaptureListener::new("a"));
        let b = Arc::new(CaptureListener::new("b"));
        registry.register(a.clone());
        registry.register(b.clone());
        assert_eq!(registry.snapshot().len(), 2);
        assert!(registry.has_output(None));

        a.stop();
        assert_eq!(registry.snapshot().len(), 1);

        b.stop();
        assert!(!registry.has_output(None));
    }

    #[test]
    fn unregister_by_id() {
        let registry = DeviceRegistry::new();
        let a = Arc::new(CaptureListener::new("a"));
        let id = a.id();
        registry.register(a);
        registry.unregister(id);
        assert!(registry.snapshot().is_empty());
    }

    #[test]
    fn target_filters_with_unknown_target_fallback() {
        let registry = DeviceRegistry::new();
        let desk = Arc::new(CaptureListener::bound_to("desk", Some("alice")));
        let hall = Arc::new(CaptureListener::bound_to("hall", Some("alice")));
        let anon = Arc::new(CaptureListener::new("anon"));
        registry.register(desk);
        registry.register(hall);
        registry.register(anon);

        // Bound target: only the matching listeners
        let matched = registry.snapshot_for(Some("alice"));
        assert_eq!(matched.len(), 2);
        assert!(matched.iter().all(|l| l.target().as_deref() == Some("alice")));

        // Unknown target: audio falls back to every open listener
        assert_eq!(registry.snapshot_for(Some("bob")).len(), 3);
        assert!(registry.has_output(Some("bob")));

        // No target: everyone
        assert_eq!(registry.snapshot_for(None).len(), 3);
    }

    #[test]
    fn tcp_listener_sets_write_timeout() {
        let server = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = server.local_addr().unwrap();
        let client = TcpStream::connect(addr).unwrap();
        let _peer = server.accept().unwrap();

        let listener = TcpRemoteListener::new(client);
        let timeout = listener.stream.lock().unwrap().write_timeout().unwrap();
        assert_eq!(timeout, Some(SEND_TIMEOUT));

        listener.bind_target("alice");
        assert_eq!(listener.target().as_deref(), Some("alice"));
    }
}
