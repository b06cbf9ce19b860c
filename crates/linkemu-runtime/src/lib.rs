//! `linkemu-runtime` – the emulated endpoint itself
//!
//! Ties the middleware pieces into a running role.
//!
//! # Modules
//!
//! - [`router`] – [`CommandRouter`]: per-role key tables and the mapping of
//!   operator [`Action`]s to broadcasts, disconnects and speed changes.
//! - [`session`] – [`Session`]: connection-lifecycle wiring shared by both
//!   roles, parameterised by a [`RolePolicy`].  The hardware role also owns a
//!   telemetry publisher.
//! - [`telemetry`] – [`init_tracing`]: global `tracing` subscriber with
//!   optional OTLP export.

pub mod router;
pub mod session;
pub mod telemetry;

pub use router::{
    Action, ActionOutcome, CommandRouter, DEFAULT_SPEED_STEP, KeyBinding, bindings_for,
    resolve_key,
};
pub use session::{
    DEFAULT_INITIAL_RPM, DEFAULT_PUBLISH_INTERVAL, HardwareSettings, RolePolicy, Session,
};
pub use telemetry::{TracerProviderGuard, init_tracing};
