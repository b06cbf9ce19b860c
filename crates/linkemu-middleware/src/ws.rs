//! WebSocket transports.
//!
//! * [`WsServer`] listens on a TCP address; every accepted WebSocket becomes
//!   a peer with a fresh UUID.
//! * [`WsClient`] dials a single `ws://host:port/` endpoint; that connection
//!   is the only peer.
//!
//! Both speak the same framing: one JSON text frame per packet,
//! `{"event": "<channel>", "data": <payload>}`.  Inbound frames are not
//! validated; whatever arrives is surfaced as [`TransportEvent::Inbound`].

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use linkemu_types::{Channel, LinkError, Packet, Peer};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio_tungstenite::{WebSocketStream, accept_async, connect_async, tungstenite::Message};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::transport::{EventSender, PeerHandle, Transport, TransportEvent, TransportTask};

/// Pause after a failed `accept` before trying again.
const ACCEPT_BACKOFF: Duration = Duration::from_millis(100);

#[derive(Serialize)]
struct OutboundFrame<'a> {
    event: Channel,
    data: &'a Packet,
}

#[derive(Deserialize)]
struct InboundFrame {
    event: String,
    #[serde(default)]
    data: Value,
}

enum Outbound {
    Frame(String),
    Close,
}

/// [`PeerHandle`] backed by the writer half of one WebSocket connection.
struct WsHandle {
    peer_id: String,
    tx: mpsc::UnboundedSender<Outbound>,
}

impl PeerHandle for WsHandle {
    fn send(&self, channel: Channel, packet: &Packet) -> Result<(), LinkError> {
        let frame = encode_frame(channel, packet)?;
        self.tx
            .send(Outbound::Frame(frame))
            .map_err(|_| LinkError::PeerClosed(self.peer_id.clone()))
    }

    fn close(&self) {
        let _ = self.tx.send(Outbound::Close);
    }
}

/// Serialise a packet into its wire frame.
pub fn encode_frame(channel: Channel, packet: &Packet) -> Result<String, LinkError> {
    serde_json::to_string(&OutboundFrame {
        event: channel,
        data: packet,
    })
    .map_err(|e| LinkError::Serialization(e.to_string()))
}

/// Classify a raw inbound text frame.  Never fails.
pub(crate) fn decode_inbound(peer_id: &str, raw: &str) -> TransportEvent {
    let (channel, payload) = match serde_json::from_str::<InboundFrame>(raw) {
        Ok(frame) => match Channel::from_name(&frame.event) {
            Some(channel) => (Some(channel), frame.data.to_string()),
            None => (None, raw.to_string()),
        },
        Err(_) => (None, raw.to_string()),
    };
    TransportEvent::Inbound {
        peer_id: peer_id.to_string(),
        channel,
        payload,
    }
}

/// Pump one WebSocket until either side closes, reporting lifecycle events.
async fn drive_connection<S>(ws: WebSocketStream<S>, peer: Peer, events: EventSender)
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let (tx, mut outbound) = mpsc::unbounded_channel();
    let peer_id = peer.id.clone();
    let handle = Arc::new(WsHandle {
        peer_id: peer_id.clone(),
        tx,
    });
    if events.send(TransportEvent::Connected { peer, handle }).is_err() {
        return;
    }

    let (mut ws_tx, mut ws_rx) = ws.split();
    loop {
        tokio::select! {
            // ── Outbound: handle → socket ────────────────────────────────
            out = outbound.recv() => match out {
                Some(Outbound::Frame(text)) => {
                    if let Err(e) = ws_tx.send(Message::Text(text.into())).await {
                        debug!(peer = %peer_id, error = %e, "ws write failed");
                        break;
                    }
                }
                Some(Outbound::Close) | None => {
                    let _ = ws_tx.close().await;
                    break;
                }
            },
            // ── Inbound: socket → event stream ───────────────────────────
            msg = ws_rx.next() => match msg {
                Some(Ok(Message::Text(text))) => {
                    let _ = events.send(decode_inbound(&peer_id, text.as_str()));
                }
                Some(Ok(Message::Close(_))) | None => break,
                Some(Err(e)) => {
                    debug!(peer = %peer_id, error = %e, "ws read failed");
                    break;
                }
                _ => {}
            },
        }
    }

    let _ = events.send(TransportEvent::Disconnected { peer_id });
}

// ─────────────────────────────────────────────────────────────────────────────
// Server
// ─────────────────────────────────────────────────────────────────────────────

/// Listening transport: each accepted WebSocket is a peer.
#[derive(Debug, Clone)]
pub struct WsServer {
    addr: SocketAddr,
}

impl WsServer {
    pub fn new(addr: SocketAddr) -> Self {
        Self { addr }
    }

    /// Listen on `0.0.0.0:port`.
    pub fn on_port(port: u16) -> Self {
        Self::new(SocketAddr::from(([0, 0, 0, 0], port)))
    }
}

#[async_trait]
impl Transport for WsServer {
    async fn open(&self, events: EventSender) -> Result<TransportTask, LinkError> {
        let listener = TcpListener::bind(self.addr).await.map_err(|e| LinkError::Bind {
            addr: self.addr.to_string(),
            reason: e.to_string(),
        })?;
        let local_addr = listener.local_addr().map_err(|e| LinkError::Bind {
            addr: self.addr.to_string(),
            reason: e.to_string(),
        })?;
        info!(addr = %local_addr, "ws server listening");

        let task = tokio::spawn(async move {
            while !events.is_closed() {
                let (stream, remote) = match listener.accept().await {
                    Ok(accepted) => accepted,
                    Err(e) => {
                        // Persistent errors (fd exhaustion) would otherwise spin.
                        warn!(error = %e, "ws accept error");
                        tokio::time::sleep(ACCEPT_BACKOFF).await;
                        continue;
                    }
                };
                let events = events.clone();
                tokio::spawn(async move {
                    match accept_async(stream).await {
                        Ok(ws) => {
                            let peer = Peer::new(Uuid::new_v4().to_string(), remote.to_string());
                            drive_connection(ws, peer, events).await;
                        }
                        Err(e) => warn!(remote = %remote, error = %e, "ws handshake failed"),
                    }
                });
            }
        });

        Ok(TransportTask::new(
            format!("ws://{local_addr}/"),
            Some(local_addr),
            task,
        ))
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Client
// ─────────────────────────────────────────────────────────────────────────────

/// Dialling transport: the single connection to `url` is the only peer.
#[derive(Debug, Clone)]
pub struct WsClient {
    url: String,
}

impl WsClient {
    pub fn new(url: impl Into<String>) -> Self {
        Self { url: url.into() }
    }

    /// `ws://host:port/`.
    pub fn for_host(host: &str, port: u16) -> Self {
        Self::new(format!("ws://{host}:{port}/"))
    }
}

#[async_trait]
impl Transport for WsClient {
    async fn open(&self, events: EventSender) -> Result<TransportTask, LinkError> {
        let (ws, _response) = connect_async(self.url.as_str())
            .await
            .map_err(|e| LinkError::Dial {
                url: self.url.clone(),
                reason: e.to_string(),
            })?;
        info!(url = %self.url, "ws client connected");

        let peer = Peer::new(Uuid::new_v4().to_string(), self.url.clone());
        let task = tokio::spawn(drive_connection(ws, peer, events));
        Ok(TransportTask::new(self.url.clone(), None, task))
    }
}
