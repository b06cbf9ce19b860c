//! [`CommandRouter`] – maps operator actions to protocol effects.
//!
//! The router never blocks on the network: broadcasts go through the
//! snapshot-then-send dispatcher, and speed changes only touch the
//! registry's telemetry scalar (the publisher carries them out on its next
//! tick).
//!
//! Each role has a fixed key-binding table.  An action missing from the
//! active role's table is reported as [`ActionOutcome::Unbound`] and has no
//! effect.

use std::sync::Arc;

use linkemu_middleware::{
    BroadcastReport, DisplaySink, PeerRegistry, TelemetryChange, broadcast, close_all,
};
use linkemu_types::{Intent, PacketFactory, Role};
use tracing::{debug, info};

/// Speed change applied per speed-up / speed-down.
pub const DEFAULT_SPEED_STEP: f64 = 5.0;

/// Operator-triggerable actions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Action {
    StartSession,
    EndSession,
    DisconnectAll,
    MoveLeft,
    MoveRight,
    SpeedUp,
    SpeedDown,
    Quit,
}

/// One row of a role's key table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyBinding {
    pub keys: &'static [&'static str],
    pub short_name: &'static str,
    pub long_name: &'static str,
    pub action: Action,
}

const fn bind(
    keys: &'static [&'static str],
    short_name: &'static str,
    long_name: &'static str,
    action: Action,
) -> KeyBinding {
    KeyBinding {
        keys,
        short_name,
        long_name,
        action,
    }
}

const GAME_BINDINGS: &[KeyBinding] = &[
    bind(&["s"], "s", "start", Action::StartSession),
    bind(&["x"], "x", "end", Action::EndSession),
    bind(&["d"], "d", "disconnect", Action::DisconnectAll),
    bind(&["q", "quit"], "q", "quit", Action::Quit),
];

const HARDWARE_BINDINGS: &[KeyBinding] = &[
    bind(&["s"], "s", "start", Action::StartSession),
    bind(&["x"], "x", "end", Action::EndSession),
    bind(&["d"], "d", "disconnect", Action::DisconnectAll),
    bind(&["up", "k"], "↑", "speed up", Action::SpeedUp),
    bind(&["down", "j"], "↓", "speed down", Action::SpeedDown),
    bind(&["left", "h"], "←", "move left", Action::MoveLeft),
    bind(&["right", "l"], "→", "move right", Action::MoveRight),
    bind(&["q", "quit"], "q", "quit", Action::Quit),
];

/// The key table for `role`.
pub fn bindings_for(role: Role) -> &'static [KeyBinding] {
    match role {
        Role::Hardware => HARDWARE_BINDINGS,
        Role::Game => GAME_BINDINGS,
    }
}

/// Look up the action bound to `key` for `role`.  Case-insensitive.
pub fn resolve_key(role: Role, key: &str) -> Option<Action> {
    let key = key.trim().to_ascii_lowercase();
    bindings_for(role)
        .iter()
        .find(|b| b.keys.contains(&key.as_str()))
        .map(|b| b.action)
}

/// What an action actually did.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ActionOutcome {
    Broadcast(BroadcastReport),
    /// Number of peers asked to disconnect.
    Closed(usize),
    Telemetry(TelemetryChange),
    /// The action is not available for this role.
    Unbound,
    Quit,
}

/// Role-bound dispatcher for operator actions.
pub struct CommandRouter {
    role: Role,
    registry: Arc<PeerRegistry>,
    factory: PacketFactory,
    display: DisplaySink,
    speed_step: f64,
}

impl CommandRouter {
    pub fn new(
        registry: Arc<PeerRegistry>,
        factory: PacketFactory,
        display: DisplaySink,
        speed_step: f64,
    ) -> Self {
        Self {
            role: factory.role(),
            registry,
            factory,
            display,
            speed_step: speed_step.abs(),
        }
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn bindings(&self) -> &'static [KeyBinding] {
        bindings_for(self.role)
    }

    pub fn is_bound(&self, action: Action) -> bool {
        self.bindings().iter().any(|b| b.action == action)
    }

    pub fn dispatch(&self, action: Action) -> ActionOutcome {
        if !self.is_bound(action) {
            debug!(role = %self.role, ?action, "action not bound for role");
            return ActionOutcome::Unbound;
        }
        match action {
            Action::StartSession => self.broadcast(Intent::StartSession, "start acquisition session"),
            Action::EndSession => self.broadcast(Intent::EndSession, "stop session"),
            Action::MoveLeft => self.broadcast(Intent::MoveLeft, "move left"),
            Action::MoveRight => self.broadcast(Intent::MoveRight, "move right"),
            Action::DisconnectAll => {
                let closed = close_all(&self.registry.snapshot(), &self.display);
                info!(closed, "disconnect requested");
                ActionOutcome::Closed(closed)
            }
            Action::SpeedUp => self.adjust_speed(self.speed_step, "speed up"),
            Action::SpeedDown => self.adjust_speed(-self.speed_step, "speed down"),
            Action::Quit => ActionOutcome::Quit,
        }
    }

    fn broadcast(&self, intent: Intent, label: &str) -> ActionOutcome {
        let snapshot = self.registry.snapshot();
        let packet = self.factory.build(intent);
        ActionOutcome::Broadcast(broadcast(&snapshot, &packet, &self.display, label))
    }

    fn adjust_speed(&self, delta: f64, label: &str) -> ActionOutcome {
        let change = self.registry.adjust_telemetry(delta);
        if let TelemetryChange::Updated { current, .. } = change {
            // Nothing is sent here; the line records the new value per peer.
            for peer in self.registry.peers() {
                self.display.log_request(format!("{} > {label} to {current}", peer.id));
            }
        }
        ActionOutcome::Telemetry(change)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use linkemu_middleware::ChannelHandle;
    use linkemu_types::{Channel, LinkId, Packet, Peer};

    fn router(role: Role, rpm: f64) -> (CommandRouter, Arc<PeerRegistry>) {
        let registry = Arc::new(PeerRegistry::new(rpm));
        let (display, _updates) = DisplaySink::channel();
        let router = CommandRouter::new(
            Arc::clone(&registry),
            PacketFactory::new(role, LinkId::from("link")),
            display,
            DEFAULT_SPEED_STEP,
        );
        (router, registry)
    }

    #[test]
    fn key_tables_match_role() {
        assert_eq!(resolve_key(Role::Hardware, "k"), Some(Action::SpeedUp));
        assert_eq!(resolve_key(Role::Hardware, "LEFT"), Some(Action::MoveLeft));
        assert_eq!(resolve_key(Role::Game, "s"), Some(Action::StartSession));
        assert_eq!(resolve_key(Role::Game, "quit"), Some(Action::Quit));
        assert_eq!(resolve_key(Role::Game, "up"), None);
        assert_eq!(resolve_key(Role::Hardware, "z"), None);
    }

    #[test]
    fn every_key_is_unique_within_a_role() {
        for role in [Role::Hardware, Role::Game] {
            let mut keys: Vec<&str> = bindings_for(role).iter().flat_map(|b| b.keys).copied().collect();
            let total = keys.len();
            keys.sort_unstable();
            keys.dedup();
            assert_eq!(keys.len(), total, "duplicate key in {role} table");
        }
    }

    #[test]
    fn start_session_broadcasts_start_game() {
        let (router, registry) = router(Role::Game, 0.0);
        let (handle, mut rx) = ChannelHandle::new("p1");
        registry.add(Peer::new("p1", "a"), handle);

        let outcome = router.dispatch(Action::StartSession);
        assert_eq!(outcome, ActionOutcome::Broadcast(BroadcastReport { delivered: 1, failed: 0 }));

        let (channel, packet) = rx.try_recv().unwrap();
        assert_eq!(channel, Channel::Command);
        match packet {
            Packet::Command(p) => {
                assert_eq!(p.body.command, "start_game");
                assert_eq!(p.role, Role::Game);
            }
            other => panic!("expected command packet, got {other:?}"),
        }
    }

    #[test]
    fn end_session_broadcasts_end_game() {
        let (router, registry) = router(Role::Hardware, 60.0);
        let (h1, mut rx1) = ChannelHandle::new("p1");
        let (h2, mut rx2) = ChannelHandle::new("p2");
        registry.add(Peer::new("p1", "a"), h1);
        registry.add(Peer::new("p2", "b"), h2);

        let outcome = router.dispatch(Action::EndSession);
        assert_eq!(outcome, ActionOutcome::Broadcast(BroadcastReport { delivered: 2, failed: 0 }));

        for rx in [&mut rx1, &mut rx2] {
            let (channel, packet) = rx.try_recv().unwrap();
            assert_eq!(channel, Channel::Command);
            match packet {
                Packet::Command(p) => {
                    assert_eq!(p.body.command, "end_game");
                    assert_eq!(p.role, Role::Hardware);
                }
                other => panic!("expected command packet, got {other:?}"),
            }
            assert!(rx.try_recv().is_err());
        }
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn hardware_only_actions_are_unbound_for_game() {
        let (router, registry) = router(Role::Game, 60.0);
        let (handle, mut rx) = ChannelHandle::new("p1");
        registry.add(Peer::new("p1", "a"), handle);

        for action in [Action::MoveLeft, Action::MoveRight, Action::SpeedUp, Action::SpeedDown] {
            assert_eq!(router.dispatch(action), ActionOutcome::Unbound);
        }
        assert!(rx.try_recv().is_err());
        assert_eq!(registry.telemetry(), 60.0);
    }

    #[test]
    fn move_actions_send_controller_values() {
        let (router, registry) = router(Role::Hardware, 0.0);
        let (handle, mut rx) = ChannelHandle::new("p1");
        registry.add(Peer::new("p1", "a"), handle);

        router.dispatch(Action::MoveLeft);
        router.dispatch(Action::MoveRight);

        let values: Vec<_> = std::iter::from_fn(|| rx.try_recv().ok())
            .map(|(_, packet)| match packet {
                Packet::Data(p) if p.body.module == "controller" => p.body.value,
                other => panic!("expected controller data, got {other:?}"),
            })
            .collect();
        assert_eq!(values, vec![serde_json::json!(0), serde_json::json!(1)]);
    }

    #[test]
    fn speed_changes_need_a_peer_and_send_nothing() {
        let (router, registry) = router(Role::Hardware, 60.0);
        assert_eq!(
            router.dispatch(Action::SpeedUp),
            ActionOutcome::Telemetry(TelemetryChange::NoPeers)
        );

        let (handle, mut rx) = ChannelHandle::new("p1");
        registry.add(Peer::new("p1", "a"), handle);
        assert_eq!(
            router.dispatch(Action::SpeedUp),
            ActionOutcome::Telemetry(TelemetryChange::Updated { previous: 60.0, current: 65.0 })
        );
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn disconnect_closes_without_removing() {
        let (router, registry) = router(Role::Game, 0.0);
        let (h1, _rx1) = ChannelHandle::new("p1");
        registry.add(Peer::new("p1", "a"), h1.clone());

        assert_eq!(router.dispatch(Action::DisconnectAll), ActionOutcome::Closed(1));
        assert!(h1.is_closed());
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn quit_is_bound_for_both_roles() {
        for role in [Role::Hardware, Role::Game] {
            let (router, _) = router(role, 0.0);
            assert_eq!(router.dispatch(Action::Quit), ActionOutcome::Quit);
        }
    }
}
