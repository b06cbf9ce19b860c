use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use thiserror::Error;
use uuid::Uuid;

/// Command name sent by the hardware role to every newly connected peer.
pub const COMMAND_LINK: &str = "link";
/// Command name that opens an acquisition session.
pub const COMMAND_START_GAME: &str = "start_game";
/// Command name that closes an acquisition session.
pub const COMMAND_END_GAME: &str = "end_game";

/// Data module carrying directional controller input (`0` = left, `1` = right).
pub const MODULE_CONTROLLER: &str = "controller";
/// Data module carrying the simulated rotational speed.
pub const MODULE_RPM: &str = "rpm";

/// Which endpoint of the control link this process emulates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// The physical sensor side: emits controller and RPM data.
    Hardware,
    /// The game side: only drives session control.
    Game,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Hardware => "hardware",
            Role::Game => "game",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Named transport channel a frame travels on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Channel {
    Command,
    Data,
    Error,
}

impl Channel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Channel::Command => "command",
            Channel::Data => "data",
            Channel::Error => "error",
        }
    }

    /// Resolve a wire event name. Returns `None` for anything else.
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "command" => Some(Channel::Command),
            "data" => Some(Channel::Data),
            "error" => Some(Channel::Error),
            _ => None,
        }
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-process correlation token attached to every outgoing packet.
///
/// Generated once at startup unless the operator supplies one. It carries no
/// handshake semantics of its own.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LinkId(String);

impl LinkId {
    /// Fresh random identifier (UUIDv4, hyphenated).
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for LinkId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<&str> for LinkId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl fmt::Display for LinkId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A connected remote endpoint. Two peers are the same peer iff their ids match.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Peer {
    /// Opaque identifier, unique per live connection.
    pub id: String,
    /// Network address, display only.
    pub address: String,
}

impl Peer {
    pub fn new(id: impl Into<String>, address: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            address: address.into(),
        }
    }
}

impl PartialEq for Peer {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Peer {}

impl fmt::Display for Peer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.id, self.address)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Packet model
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommandBody {
    pub command: String,
    #[serde(default)]
    pub args: Vec<Value>,
}

/// Session-control packet, sent on the `command` channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommandPacket {
    #[serde(rename = "type")]
    pub role: Role,
    pub link_id: LinkId,
    pub body: CommandBody,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataBody {
    pub module: String,
    pub value: Value,
}

/// Emulated-subsystem reading, sent on the `data` channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataPacket {
    #[serde(rename = "type")]
    pub role: Role,
    pub link_id: LinkId,
    pub body: DataBody,
}

/// Either protocol packet shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Packet {
    Command(CommandPacket),
    Data(DataPacket),
}

impl Packet {
    /// The transport channel this packet is emitted on.
    pub fn channel(&self) -> Channel {
        match self {
            Packet::Command(_) => Channel::Command,
            Packet::Data(_) => Channel::Data,
        }
    }

    pub fn link_id(&self) -> &LinkId {
        match self {
            Packet::Command(p) => &p.link_id,
            Packet::Data(p) => &p.link_id,
        }
    }

    /// Compact JSON projection, as used for logging and on the wire.
    pub fn to_json(&self) -> Result<String, LinkError> {
        serde_json::to_string(self).map_err(|e| LinkError::Serialization(e.to_string()))
    }
}

/// Discrete things an emulated endpoint can say on the link.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Intent {
    /// Link-establishment courtesy message.
    Link,
    StartSession,
    EndSession,
    MoveLeft,
    MoveRight,
    /// Current simulated rotational speed.
    Rpm(f64),
}

/// Builds packets stamped with a fixed role and link id.
///
/// Construction is pure: any telemetry value is passed in by the caller
/// through [`Intent::Rpm`].
#[derive(Debug, Clone)]
pub struct PacketFactory {
    role: Role,
    link_id: LinkId,
}

impl PacketFactory {
    pub fn new(role: Role, link_id: LinkId) -> Self {
        Self { role, link_id }
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn link_id(&self) -> &LinkId {
        &self.link_id
    }

    pub fn build(&self, intent: Intent) -> Packet {
        match intent {
            Intent::Link => self.command(COMMAND_LINK),
            Intent::StartSession => self.command(COMMAND_START_GAME),
            Intent::EndSession => self.command(COMMAND_END_GAME),
            Intent::MoveLeft => self.data(MODULE_CONTROLLER, json!(0)),
            Intent::MoveRight => self.data(MODULE_CONTROLLER, json!(1)),
            Intent::Rpm(value) => self.data(MODULE_RPM, json!(value)),
        }
    }

    fn command(&self, command: &str) -> Packet {
        Packet::Command(CommandPacket {
            role: self.role,
            link_id: self.link_id.clone(),
            body: CommandBody {
                command: command.to_string(),
                args: Vec::new(),
            },
        })
    }

    fn data(&self, module: &str, value: Value) -> Packet {
        Packet::Data(DataPacket {
            role: self.role,
            link_id: self.link_id.clone(),
            body: DataBody {
                module: module.to_string(),
                value,
            },
        })
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Errors
// ─────────────────────────────────────────────────────────────────────────────

/// Error type spanning startup failures and per-peer send failures.
#[derive(Error, Debug)]
pub enum LinkError {
    #[error("Bind Failure on {addr}: {reason}")]
    Bind { addr: String, reason: String },

    #[error("Dial Failure to {url}: {reason}")]
    Dial { url: String, reason: String },

    #[error("Display Initialisation Error: {0}")]
    Display(String),

    #[error("Configuration Error: {0}")]
    Config(String),

    #[error("Peer Closed: {0}")]
    PeerClosed(String),

    #[error("Transport Error: {0}")]
    Transport(String),

    #[error("Serialization Error: {0}")]
    Serialization(String),
}

impl LinkError {
    /// Process exit status for this failure. Each startup site has its own.
    pub fn exit_code(&self) -> i32 {
        match self {
            LinkError::Config(_) => 0x02,
            LinkError::Dial { .. } => 0x08,
            LinkError::Bind { .. } => 0x09,
            LinkError::Display(_) => 0x11,
            LinkError::PeerClosed(_) | LinkError::Transport(_) | LinkError::Serialization(_) => 1,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn factory(role: Role) -> PacketFactory {
        PacketFactory::new(role, LinkId::from("00000000-0000-0000-0000-000000000000"))
    }

    #[test]
    fn command_packet_wire_shape() {
        let packet = factory(Role::Game).build(Intent::StartSession);
        let value = serde_json::to_value(&packet).unwrap();
        assert_eq!(
            value,
            json!({
                "type": "game",
                "link_id": "00000000-0000-0000-0000-000000000000",
                "body": { "command": "start_game", "args": [] }
            })
        );
        assert_eq!(packet.channel(), Channel::Command);
    }

    #[test]
    fn data_packet_wire_shape() {
        let packet = factory(Role::Hardware).build(Intent::MoveRight);
        let value = serde_json::to_value(&packet).unwrap();
        assert_eq!(
            value,
            json!({
                "type": "hardware",
                "link_id": "00000000-0000-0000-0000-000000000000",
                "body": { "module": "controller", "value": 1 }
            })
        );
        assert_eq!(packet.channel(), Channel::Data);
    }

    #[test]
    fn intents_map_to_expected_bodies() {
        let f = factory(Role::Hardware);
        match f.build(Intent::Link) {
            Packet::Command(p) => assert_eq!(p.body.command, COMMAND_LINK),
            other => panic!("expected command, got {other:?}"),
        }
        match f.build(Intent::EndSession) {
            Packet::Command(p) => assert_eq!(p.body.command, COMMAND_END_GAME),
            other => panic!("expected command, got {other:?}"),
        }
        match f.build(Intent::MoveLeft) {
            Packet::Data(p) => {
                assert_eq!(p.body.module, MODULE_CONTROLLER);
                assert_eq!(p.body.value, json!(0));
            }
            other => panic!("expected data, got {other:?}"),
        }
        match f.build(Intent::Rpm(72.5)) {
            Packet::Data(p) => {
                assert_eq!(p.body.module, MODULE_RPM);
                assert_eq!(p.body.value.as_f64(), Some(72.5));
            }
            other => panic!("expected data, got {other:?}"),
        }
    }

    #[test]
    fn untagged_packet_parses_both_shapes() {
        let cmd: Packet = serde_json::from_str(
            r#"{"type":"game","link_id":"abc","body":{"command":"end_game"}}"#,
        )
        .unwrap();
        assert!(matches!(cmd, Packet::Command(ref p) if p.body.args.is_empty()));

        let data: Packet = serde_json::from_str(
            r#"{"type":"hardware","link_id":"abc","body":{"module":"rpm","value":60.0}}"#,
        )
        .unwrap();
        assert_eq!(data.channel(), Channel::Data);
        assert_eq!(data.link_id().as_str(), "abc");
    }

    #[test]
    fn generated_link_ids_are_distinct_uuids() {
        let a = LinkId::generate();
        let b = LinkId::generate();
        assert_ne!(a, b);
        assert!(Uuid::parse_str(a.as_str()).is_ok());
    }

    #[test]
    fn peers_compare_by_id_only() {
        let a = Peer::new("p1", "10.0.0.1:5000");
        let b = Peer::new("p1", "10.0.0.2:6000");
        let c = Peer::new("p2", "10.0.0.1:5000");
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(a.to_string(), "p1 (10.0.0.1:5000)");
    }

    #[test]
    fn channel_names_resolve() {
        for channel in [Channel::Command, Channel::Data, Channel::Error] {
            assert_eq!(Channel::from_name(channel.as_str()), Some(channel));
        }
        assert_eq!(Channel::from_name("telemetry"), None);
    }

    #[test]
    fn startup_errors_have_distinct_exit_codes() {
        let errors = [
            LinkError::Config("bad".into()),
            LinkError::Dial {
                url: "ws://localhost:8080/".into(),
                reason: "refused".into(),
            },
            LinkError::Bind {
                addr: "0.0.0.0:8080".into(),
                reason: "in use".into(),
            },
            LinkError::Display("no tty".into()),
        ];
        let mut codes: Vec<i32> = errors.iter().map(LinkError::exit_code).collect();
        codes.sort_unstable();
        codes.dedup();
        assert_eq!(codes.len(), 4);
        assert!(!codes.contains(&LinkError::PeerClosed("p1".into()).exit_code()));
    }

    #[test]
    fn link_error_display() {
        let err = LinkError::Dial {
            url: "ws://host:1/".into(),
            reason: "refused".into(),
        };
        assert!(err.to_string().contains("ws://host:1/"));
    }
}
