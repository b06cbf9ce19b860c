//! [`PeerRegistry`] – connected peers, their handles and the telemetry scalar.
//!
//! One readers-writer lock guards all three.  Connection-lifecycle handlers
//! and speed adjustments take the write side; broadcasts, publisher ticks and
//! UI refreshes take the read side and copy what they need out via
//! [`PeerRegistry::snapshot`].  Nothing sends on the network while the lock
//! is held.
//!
//! Peers and handles live in two index-aligned vectors: index `i` of one
//! always refers to the same peer as index `i` of the other.  Removal is a
//! swap-remove on both, so ordering is not preserved and carries no meaning.

use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use linkemu_types::Peer;
use tracing::debug;

use crate::transport::SharedHandle;

struct RegistryState {
    peers: Vec<Peer>,
    handles: Vec<SharedHandle>,
    telemetry: f64,
}

/// Result of [`PeerRegistry::adjust_telemetry`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TelemetryChange {
    Updated { previous: f64, current: f64 },
    /// Nobody is connected; the scalar was left alone.
    NoPeers,
    /// A decrease was requested while already at zero.
    AtFloor,
}

/// Point-in-time copy of the registry used for iteration without the lock.
///
/// A peer added after the snapshot was taken is not in it; a peer removed
/// afterwards still is, and sends to it fail quietly.
#[derive(Clone, Default)]
pub struct Snapshot {
    entries: Vec<(Peer, SharedHandle)>,
    telemetry: f64,
}

impl Snapshot {
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Peer, &SharedHandle)> {
        self.entries.iter().map(|(peer, handle)| (peer, handle))
    }

    pub fn peers(&self) -> Vec<Peer> {
        self.entries.iter().map(|(peer, _)| peer.clone()).collect()
    }

    /// Telemetry scalar as it was when the snapshot was taken.
    pub fn telemetry(&self) -> f64 {
        self.telemetry
    }
}

/// Thread-safe store of connected peers.
///
/// # Example
///
/// ```
/// use linkemu_middleware::PeerRegistry;
/// use linkemu_middleware::transport::ChannelHandle;
/// use linkemu_types::Peer;
///
/// let registry = PeerRegistry::new(60.0);
/// let (handle, _rx) = ChannelHandle::new("p1");
/// registry.add(Peer::new("p1", "127.0.0.1:40000"), handle);
/// assert_eq!(registry.len(), 1);
///
/// assert!(registry.remove("p1").is_some());
/// assert!(registry.remove("p1").is_none());
/// assert!(registry.snapshot().is_empty());
/// ```
pub struct PeerRegistry {
    state: RwLock<RegistryState>,
}

impl PeerRegistry {
    /// Empty registry whose telemetry scalar starts at `initial_telemetry`
    /// (negative values are clamped to zero).
    pub fn new(initial_telemetry: f64) -> Self {
        Self {
            state: RwLock::new(RegistryState {
                peers: Vec::new(),
                handles: Vec::new(),
                telemetry: initial_telemetry.max(0.0),
            }),
        }
    }

    /// Append `peer` and its `handle`.  Never fails.
    pub fn add(&self, peer: Peer, handle: SharedHandle) {
        let mut state = self.write();
        debug!(peer = %peer.id, address = %peer.address, "registry add");
        state.peers.push(peer);
        state.handles.push(handle);
    }

    /// Remove the peer with `peer_id`, returning it.
    ///
    /// Swap-removes from both collections.  Unknown ids are a no-op.
    pub fn remove(&self, peer_id: &str) -> Option<Peer> {
        let mut state = self.write();
        let idx = state.peers.iter().position(|p| p.id == peer_id)?;
        let peer = state.peers.swap_remove(idx);
        state.handles.swap_remove(idx);
        debug!(peer = %peer.id, remaining = state.peers.len(), "registry remove");
        Some(peer)
    }

    pub fn snapshot(&self) -> Snapshot {
        let state = self.read();
        Snapshot {
            entries: state
                .peers
                .iter()
                .cloned()
                .zip(state.handles.iter().cloned())
                .collect(),
            telemetry: state.telemetry,
        }
    }

    /// Copy of the current peer list, for display refreshes.
    pub fn peers(&self) -> Vec<Peer> {
        self.read().peers.clone()
    }

    pub fn len(&self) -> usize {
        self.read().peers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().peers.is_empty()
    }

    pub fn telemetry(&self) -> f64 {
        self.read().telemetry
    }

    /// Add `delta` to the telemetry scalar, clamping at zero.
    ///
    /// Only applies while at least one peer is connected, and a decrease is
    /// refused outright when the scalar is already zero.  There is no upper
    /// bound.
    pub fn adjust_telemetry(&self, delta: f64) -> TelemetryChange {
        let mut state = self.write();
        if state.peers.is_empty() {
            return TelemetryChange::NoPeers;
        }
        if delta < 0.0 && state.telemetry <= 0.0 {
            return TelemetryChange::AtFloor;
        }
        let previous = state.telemetry;
        state.telemetry = (previous + delta).max(0.0);
        TelemetryChange::Updated {
            previous,
            current: state.telemetry,
        }
    }

    // A panic while holding the lock leaves the vectors consistent (every
    // mutation is a single push/swap_remove pair), so poisoning is ignored.
    fn read(&self) -> RwLockReadGuard<'_, RegistryState> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, RegistryState> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for PeerRegistry {
    fn default() -> Self {
        Self::new(0.0)
    }
}
