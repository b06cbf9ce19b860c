//! Snapshot-then-send fan-out.
//!
//! Callers capture a [`Snapshot`] (brief shared lock), drop the lock, then
//! hand the snapshot here.  Each send is fire-and-forget: a failure is logged
//! as an error response line and counted, the remaining peers are still
//! tried, and the registry is left alone (removal only happens on the
//! transport's disconnect event).

use linkemu_types::{LinkError, Packet, Peer};
use tracing::{debug, warn};

use crate::display::DisplaySink;
use crate::registry::Snapshot;
use crate::transport::PeerHandle;

/// Per-call delivery tally.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct BroadcastReport {
    pub delivered: usize,
    pub failed: usize,
}

impl BroadcastReport {
    pub fn attempted(&self) -> usize {
        self.delivered + self.failed
    }
}

/// Send `packet` to a single peer, logging the request line and any failure.
///
/// `label` is the operator-facing description, e.g. `"start linkage"`.
pub fn send_to(
    peer: &Peer,
    handle: &dyn PeerHandle,
    packet: &Packet,
    display: &DisplaySink,
    label: &str,
) -> Result<(), LinkError> {
    display.log_request(format!("{} > {label} ({})", peer.id, render(packet)));
    handle.send(packet.channel(), packet).inspect_err(|e| {
        warn!(peer = %peer.id, channel = %packet.channel(), error = %e, "send failed");
        display.log_error(format!("{} ! {label} failed: {e}", peer.id));
    })
}

/// Send `packet` to every peer in `snapshot`.
///
/// Iteration follows the snapshot's order, which carries no meaning.
pub fn broadcast(
    snapshot: &Snapshot,
    packet: &Packet,
    display: &DisplaySink,
    label: &str,
) -> BroadcastReport {
    let mut report = BroadcastReport::default();
    for (peer, handle) in snapshot.iter() {
        match send_to(peer, handle.as_ref(), packet, display, label) {
            Ok(()) => report.delivered += 1,
            Err(_) => report.failed += 1,
        }
    }
    debug!(
        label,
        delivered = report.delivered,
        failed = report.failed,
        "broadcast complete"
    );
    report
}

/// Ask every peer in `snapshot` to disconnect.  Returns how many were asked.
///
/// Registry entries are not touched; each peer leaves the registry when its
/// disconnect event comes back from the transport.
pub fn close_all(snapshot: &Snapshot, display: &DisplaySink) -> usize {
    for (peer, handle) in snapshot.iter() {
        display.log_request(format!("{} > disconnect", peer.id));
        handle.close();
    }
    snapshot.len()
}

fn render(packet: &Packet) -> String {
    packet.to_json().unwrap_or_else(|e| format!("<{e}>"))
}
