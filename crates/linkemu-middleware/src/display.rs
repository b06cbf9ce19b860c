//! [`DisplaySink`] – the write side of the operator display.
//!
//! The display owns its own redraw loop.  Every other actor (transport
//! events, operator actions, the telemetry publisher) hands it
//! [`DisplayUpdate`] messages over an unbounded channel instead of touching
//! display state directly, so no lock is ever held while rendering.

use linkemu_types::{Channel, Peer};
use tokio::sync::mpsc;
use tracing::trace;

/// One unit of work for the display task.
#[derive(Debug, Clone, PartialEq)]
pub enum DisplayUpdate {
    /// Outbound traffic: something this process sent.
    Request(String),
    /// Inbound traffic or lifecycle notice.  `channel` selects the styling;
    /// `Some(Channel::Error)` marks failures.
    Response {
        channel: Option<Channel>,
        line: String,
    },
    /// Replace the shown peer list.
    Peers(Vec<Peer>),
}

/// Cloneable, non-blocking handle onto the display task.
#[derive(Debug, Clone)]
pub struct DisplaySink {
    tx: mpsc::UnboundedSender<DisplayUpdate>,
}

impl DisplaySink {
    /// Create a sink and the receiver the display task drains.
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<DisplayUpdate>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    pub fn log_request(&self, line: impl Into<String>) {
        self.push(DisplayUpdate::Request(line.into()));
    }

    pub fn log_response(&self, line: impl Into<String>) {
        self.push(DisplayUpdate::Response {
            channel: None,
            line: line.into(),
        });
    }

    /// Log an inbound payload under the channel it arrived on.
    pub fn log_inbound(&self, channel: Channel, line: impl Into<String>) {
        self.push(DisplayUpdate::Response {
            channel: Some(channel),
            line: line.into(),
        });
    }

    /// Response-side error line (failed sends and the like).
    pub fn log_error(&self, line: impl Into<String>) {
        self.log_inbound(Channel::Error, line);
    }

    pub fn refresh_peers(&self, peers: Vec<Peer>) {
        self.push(DisplayUpdate::Peers(peers));
    }

    fn push(&self, update: DisplayUpdate) {
        // The display going away first (shutdown) is not an error for callers.
        if self.tx.send(update).is_err() {
            trace!("display task gone; update dropped");
        }
    }
}
