//! [`Session`] – one emulated endpoint.
//!
//! Hardware and game share all connection-lifecycle wiring; the difference
//! is captured by a small [`RolePolicy`]:
//!
//! | | Hardware | Game |
//! |---|---|---|
//! | link packet on connect | yes | no |
//! | telemetry publisher | yes | no |
//! | move / speed actions | bound | unbound |

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use linkemu_middleware::{
    DisplaySink, PeerRegistry, PublisherHandle, SharedHandle, TelemetryPublisher, TransportEvent,
    send_to,
};
use linkemu_types::{Channel, Intent, LinkId, PacketFactory, Peer, Role};
use tokio::sync::mpsc;
use tracing::{debug, info};

use crate::router::{Action, ActionOutcome, CommandRouter, DEFAULT_SPEED_STEP, KeyBinding};

/// Starting RPM for the hardware role.
pub const DEFAULT_INITIAL_RPM: f64 = 60.0;
/// Publisher interval for the hardware role.
pub const DEFAULT_PUBLISH_INTERVAL: Duration = Duration::from_millis(250);

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HardwareSettings {
    pub initial_rpm: f64,
    pub publish_interval: Duration,
    pub speed_step: f64,
}

impl Default for HardwareSettings {
    fn default() -> Self {
        Self {
            initial_rpm: DEFAULT_INITIAL_RPM,
            publish_interval: DEFAULT_PUBLISH_INTERVAL,
            speed_step: DEFAULT_SPEED_STEP,
        }
    }
}

/// Role-specific behaviour of a [`Session`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RolePolicy {
    Hardware(HardwareSettings),
    Game,
}

impl RolePolicy {
    pub fn role(&self) -> Role {
        match self {
            RolePolicy::Hardware(_) => Role::Hardware,
            RolePolicy::Game => Role::Game,
        }
    }
}

pub struct Session {
    policy: RolePolicy,
    registry: Arc<PeerRegistry>,
    factory: PacketFactory,
    router: CommandRouter,
    display: DisplaySink,
    publisher: Mutex<Option<PublisherHandle>>,
}

impl Session {
    /// Build a session for `policy`.
    ///
    /// The hardware role starts its telemetry publisher here, so this must be
    /// called from within a Tokio runtime.
    pub fn register(policy: RolePolicy, link_id: LinkId, display: DisplaySink) -> Self {
        let factory = PacketFactory::new(policy.role(), link_id);
        let (initial, step) = match policy {
            RolePolicy::Hardware(s) => (s.initial_rpm, s.speed_step),
            RolePolicy::Game => (0.0, DEFAULT_SPEED_STEP),
        };
        let registry = Arc::new(PeerRegistry::new(initial));
        let router = CommandRouter::new(Arc::clone(&registry), factory.clone(), display.clone(), step);

        let publisher = match policy {
            RolePolicy::Hardware(s) => Some(
                TelemetryPublisher::new(
                    Arc::clone(&registry),
                    factory.clone(),
                    display.clone(),
                    s.publish_interval,
                )
                .spawn(),
            ),
            RolePolicy::Game => None,
        };

        info!(role = %policy.role(), link_id = %factory.link_id(), "session registered");
        Self {
            policy,
            registry,
            factory,
            router,
            display,
            publisher: Mutex::new(publisher),
        }
    }

    pub fn role(&self) -> Role {
        self.policy.role()
    }

    pub fn link_id(&self) -> &LinkId {
        self.factory.link_id()
    }

    pub fn registry(&self) -> &Arc<PeerRegistry> {
        &self.registry
    }

    pub fn bindings(&self) -> &'static [KeyBinding] {
        self.router.bindings()
    }

    pub fn dispatch(&self, action: Action) -> ActionOutcome {
        self.router.dispatch(action)
    }

    /// Register a new peer.  In the hardware role the link packet is queued
    /// before the peer becomes visible to publisher ticks, so it is always
    /// the first thing the peer receives.
    pub fn on_connect(&self, peer: Peer, handle: SharedHandle) {
        self.display.log_response(format!("client connection ('{}')", peer.id));

        if let RolePolicy::Hardware(_) = self.policy {
            let link = self.factory.build(Intent::Link);
            // Failure is already logged by send_to; the peer is still registered.
            let _ = send_to(&peer, &*handle, &link, &self.display, "start linkage");
        }

        self.registry.add(peer, handle);
        self.display.refresh_peers(self.registry.peers());
    }

    pub fn on_disconnect(&self, peer_id: &str) {
        match self.registry.remove(peer_id) {
            Some(peer) => {
                self.display.log_response(format!("client disconnection ('{}')", peer.id));
                self.display.refresh_peers(self.registry.peers());
            }
            None => debug!(peer = peer_id, "disconnect for unknown peer"),
        }
    }

    /// Inbound payloads are shown as-is; nothing is decoded.
    pub fn on_inbound(&self, peer_id: &str, channel: Option<Channel>, payload: &str) {
        let line = format!("{peer_id} < {payload}");
        match channel {
            Some(channel) => self.display.log_inbound(channel, line),
            None => self.display.log_response(line),
        }
    }

    pub fn handle_event(&self, event: TransportEvent) {
        match event {
            TransportEvent::Connected { peer, handle } => self.on_connect(peer, handle),
            TransportEvent::Disconnected { peer_id } => self.on_disconnect(&peer_id),
            TransportEvent::Inbound {
                peer_id,
                channel,
                payload,
            } => self.on_inbound(&peer_id, channel, &payload),
        }
    }

    /// Consume transport events until every sender is gone.
    pub async fn run(&self, mut events: mpsc::UnboundedReceiver<TransportEvent>) {
        while let Some(event) = events.recv().await {
            self.handle_event(event);
        }
        debug!("transport event stream closed");
    }

    /// Stop the telemetry publisher, if any.  Idempotent.
    pub async fn shutdown(&self) {
        let publisher = self
            .publisher
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(publisher) = publisher {
            publisher.stop().await;
        }
        info!(role = %self.role(), "session shut down");
    }
}
