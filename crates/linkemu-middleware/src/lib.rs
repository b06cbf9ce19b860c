//! `linkemu-middleware` – peer bookkeeping and packet plumbing
//!
//! Everything between "an operator (or a timer) wants to say something" and
//! "bytes leave on a socket" lives here.
//!
//! # Modules
//!
//! - [`registry`] – [`PeerRegistry`]: the lock-guarded list of connected
//!   peers, their transport handles and the shared telemetry scalar.
//! - [`dispatch`] – snapshot-then-send fan-out of one packet to many peers.
//! - [`publisher`] – [`TelemetryPublisher`]: background task that emits the
//!   telemetry scalar to every peer on a fixed interval.
//! - [`display`] – [`DisplaySink`]: fire-and-forget log/peer-list updates for
//!   the single-consumer display task.
//! - [`transport`] – the [`Transport`] / [`PeerHandle`] seams and the
//!   [`TransportEvent`] stream they produce.
//! - [`ws`] – WebSocket server and client transports.

pub mod dispatch;
pub mod display;
pub mod publisher;
pub mod registry;
pub mod transport;
pub mod ws;

pub use dispatch::{BroadcastReport, broadcast, close_all, send_to};
pub use display::{DisplaySink, DisplayUpdate};
pub use publisher::{PublisherHandle, TelemetryPublisher};
pub use registry::{PeerRegistry, Snapshot, TelemetryChange};
pub use transport::{
    ChannelHandle, EventSender, PeerHandle, SharedHandle, Transport, TransportEvent, TransportTask,
};
pub use ws::{WsClient, WsServer};
