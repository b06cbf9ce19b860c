//! Transport seams.
//!
//! The session never touches sockets directly.  A [`Transport`] is opened
//! once at startup and reports peers coming and going as [`TransportEvent`]s
//! on an unbounded channel.  Each connected peer comes with a
//! [`PeerHandle`] through which packets are sent and the connection closed.
//!
//! # Overview
//!
//! - [`Transport`] – opens the listener / dial and spawns its driver task.
//! - [`PeerHandle`] – per-peer best-effort send and close.
//! - [`ChannelHandle`] – in-process [`PeerHandle`] that forwards packets to
//!   an mpsc receiver; used for loopback peers and test harnesses.

use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use linkemu_types::{Channel, LinkError, Packet, Peer};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// Per-peer capability to send packets and drop the connection.
///
/// # Contract
///
/// * `send` is fire-and-forget: it queues the packet and returns without
///   waiting for the network.  An error means the peer is already gone.
/// * `close` requests the connection be torn down.  The matching
///   [`TransportEvent::Disconnected`] arrives later through the event stream.
pub trait PeerHandle: Send + Sync {
    fn send(&self, channel: Channel, packet: &Packet) -> Result<(), LinkError>;

    fn close(&self);
}

/// Reference-counted handle as stored in the registry.
pub type SharedHandle = Arc<dyn PeerHandle>;

/// Notifications produced by a running transport.
pub enum TransportEvent {
    Connected { peer: Peer, handle: SharedHandle },
    Disconnected { peer_id: String },
    /// Raw inbound payload.  `channel` is `None` when the frame did not name
    /// a known channel; the payload is then the whole frame.
    Inbound {
        peer_id: String,
        channel: Option<Channel>,
        payload: String,
    },
}

impl std::fmt::Debug for TransportEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TransportEvent::Connected { peer, .. } => {
                f.debug_struct("Connected").field("peer", peer).finish_non_exhaustive()
            }
            TransportEvent::Disconnected { peer_id } => f
                .debug_struct("Disconnected")
                .field("peer_id", peer_id)
                .finish(),
            TransportEvent::Inbound {
                peer_id,
                channel,
                payload,
            } => f
                .debug_struct("Inbound")
                .field("peer_id", peer_id)
                .field("channel", channel)
                .field("payload", payload)
                .finish(),
        }
    }
}

/// Sender half handed to [`Transport::open`].
pub type EventSender = mpsc::UnboundedSender<TransportEvent>;

/// A started transport: its driver task plus where it ended up.
pub struct TransportTask {
    /// Human-readable endpoint (`ws://…` URL or bound socket address).
    pub endpoint: String,
    /// Bound address for listening transports.
    pub local_addr: Option<SocketAddr>,
    task: JoinHandle<()>,
}

impl TransportTask {
    pub fn new(endpoint: impl Into<String>, local_addr: Option<SocketAddr>, task: JoinHandle<()>) -> Self {
        Self {
            endpoint: endpoint.into(),
            local_addr,
            task,
        }
    }

    /// Stop accepting / driving connections.
    pub fn abort(&self) {
        self.task.abort();
    }
}

/// A way of reaching peers: listen for them or dial one.
///
/// Failing to open is a startup failure and is returned to the caller;
/// everything after that is reported through `events`.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn open(&self, events: EventSender) -> Result<TransportTask, LinkError>;
}

// ─────────────────────────────────────────────────────────────────────────────
// In-process handle
// ─────────────────────────────────────────────────────────────────────────────

/// [`PeerHandle`] that forwards every packet to an mpsc receiver.
///
/// Once closed (or once the receiver is dropped) every send fails with
/// [`LinkError::PeerClosed`].
pub struct ChannelHandle {
    peer_id: String,
    tx: mpsc::UnboundedSender<(Channel, Packet)>,
    closed: AtomicBool,
}

impl ChannelHandle {
    pub fn new(peer_id: impl Into<String>) -> (Arc<Self>, mpsc::UnboundedReceiver<(Channel, Packet)>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let handle = Arc::new(Self {
            peer_id: peer_id.into(),
            tx,
            closed: AtomicBool::new(false),
        });
        (handle, rx)
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

impl PeerHandle for ChannelHandle {
    fn send(&self, channel: Channel, packet: &Packet) -> Result<(), LinkError> {
        if self.is_closed() {
            return Err(LinkError::PeerClosed(self.peer_id.clone()));
        }
        self.tx
            .send((channel, packet.clone()))
            .map_err(|_| LinkError::PeerClosed(self.peer_id.clone()))
    }

    fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use linkemu_types::{Intent, LinkId, PacketFactory, Role};

    fn packet() -> Packet {
        PacketFactory::new(Role::Game, LinkId::from("link")).build(Intent::StartSession)
    }

    #[tokio::test]
    async fn channel_handle_forwards_packets() {
        let (handle, mut rx) = ChannelHandle::new("p1");
        handle.send(Channel::Command, &packet()).unwrap();
        let (channel, received) = rx.recv().await.unwrap();
        assert_eq!(channel, Channel::Command);
        assert_eq!(received, packet());
    }

    #[test]
    fn closed_channel_handle_rejects_sends() {
        let (handle, _rx) = ChannelHandle::new("p1");
        handle.close();
        assert!(handle.is_closed());
        let err = handle.send(Channel::Command, &packet()).unwrap_err();
        assert!(matches!(err, LinkError::PeerClosed(ref id) if id == "p1"));
    }

    #[test]
    fn dropped_receiver_fails_send() {
        let (handle, rx) = ChannelHandle::new("p2");
        drop(rx);
        assert!(handle.send(Channel::Data, &packet()).is_err());
    }
}
