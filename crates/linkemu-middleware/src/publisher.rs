//! [`TelemetryPublisher`] – periodic RPM emission.
//!
//! One background task per hardware session.  On every tick it snapshots the
//! registry, builds a single `rpm` data packet from the scalar captured in
//! that snapshot, and broadcasts it.  The first tick fires immediately.
//!
//! The task runs until [`PublisherHandle::stop`] is called or the handle is
//! dropped.

use std::sync::Arc;
use std::time::Duration;

use linkemu_types::{Intent, PacketFactory};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info};

use crate::dispatch::{BroadcastReport, broadcast};
use crate::display::DisplaySink;
use crate::registry::PeerRegistry;

/// Shortest accepted interval; `tokio::time::interval` rejects zero.
const MIN_INTERVAL: Duration = Duration::from_millis(1);

/// Emits the registry's telemetry scalar to every peer on a fixed interval.
pub struct TelemetryPublisher {
    registry: Arc<PeerRegistry>,
    factory: PacketFactory,
    display: DisplaySink,
    interval: Duration,
}

impl TelemetryPublisher {
    pub fn new(
        registry: Arc<PeerRegistry>,
        factory: PacketFactory,
        display: DisplaySink,
        interval: Duration,
    ) -> Self {
        Self {
            registry,
            factory,
            display,
            interval: interval.max(MIN_INTERVAL),
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Run one publish cycle synchronously.
    pub fn tick(&self) -> BroadcastReport {
        let snapshot = self.registry.snapshot();
        if snapshot.is_empty() {
            return BroadcastReport::default();
        }
        let rpm = snapshot.telemetry();
        let packet = self.factory.build(Intent::Rpm(rpm));
        broadcast(&snapshot, &packet, &self.display, &format!("send RPM ({rpm})"))
    }

    /// Start the background loop.  Must be called from within a Tokio runtime.
    pub fn spawn(self) -> PublisherHandle {
        let (shutdown, mut stop_rx) = watch::channel(false);
        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(self.interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            info!(interval_ms = self.interval.as_millis() as u64, "telemetry publisher started");

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let report = self.tick();
                        if report.attempted() > 0 {
                            debug!(delivered = report.delivered, failed = report.failed, "rpm published");
                        }
                    }
                    changed = stop_rx.changed() => {
                        if changed.is_err() || *stop_rx.borrow() {
                            break;
                        }
                    }
                }
            }

            info!("telemetry publisher stopped");
        });

        PublisherHandle { shutdown, task }
    }
}

/// Cancellation handle for a running [`TelemetryPublisher`].
pub struct PublisherHandle {
    shutdown: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl PublisherHandle {
    /// Signal the loop to exit and wait for it.
    pub async fn stop(self) {
        let _ = self.shutdown.send(true);
        let _ = self.task.await;
    }
}
