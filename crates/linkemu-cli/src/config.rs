//! Persistent defaults – reads/writes `~/.linkemu/config.toml`.
//!
//! Precedence, lowest first: built-in defaults, the config file,
//! `LINKEMU_*` environment variables, explicit command-line flags (applied
//! later by [`crate::args::Settings::resolve`]).

use linkemu_types::LinkError;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Port to listen on (`--server`) or dial.
    #[serde(default = "default_port")]
    pub port: u16,

    /// Host to dial when not in server mode.
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default)]
    pub server: bool,

    /// Hardware role: starting RPM.
    #[serde(default = "default_speed")]
    pub speed: f64,

    /// Hardware role: telemetry publish interval in milliseconds.
    #[serde(default = "default_refresh_ms")]
    pub refresh_ms: u64,

    /// Hardware role: RPM change per speed-up / speed-down.
    #[serde(default = "default_speed_step")]
    pub speed_step: f64,
}

fn default_port() -> u16 {
    8080
}
fn default_host() -> String {
    "localhost".to_string()
}
fn default_speed() -> f64 {
    60.0
}
fn default_refresh_ms() -> u64 {
    250
}
fn default_speed_step() -> f64 {
    5.0
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: default_port(),
            host: default_host(),
            server: false,
            speed: default_speed(),
            refresh_ms: default_refresh_ms(),
            speed_step: default_speed_step(),
        }
    }
}

/// `~/.linkemu/config.toml`.
pub fn config_path() -> PathBuf {
    config_path_for_home(
        &std::env::var("HOME")
            .or_else(|_| std::env::var("USERPROFILE"))
            .unwrap_or_else(|_| ".".to_string()),
    )
}

pub(crate) fn config_path_for_home(home: &str) -> PathBuf {
    PathBuf::from(home).join(".linkemu").join("config.toml")
}

/// Read the file at `path`.  `Ok(None)` when it does not exist.
pub fn load_from(path: &Path) -> Result<Option<Config>, LinkError> {
    if !path.exists() {
        return Ok(None);
    }
    let raw = fs::read_to_string(path).map_err(|e| {
        LinkError::Config(format!("failed to read {}: {e}", path.display()))
    })?;
    toml::from_str(&raw)
        .map(Some)
        .map_err(|e| LinkError::Config(format!("failed to parse {}: {e}", path.display())))
}

/// File (or defaults when missing) with environment overrides applied.
pub fn load_or_default(path: &Path) -> Result<Config, LinkError> {
    let mut cfg = load_from(path)?.unwrap_or_default();
    apply_env_overrides(&mut cfg);
    Ok(cfg)
}

/// Apply `LINKEMU_*` environment variable overrides to `cfg`.
///
/// | Variable | Config field |
/// |---|---|
/// | `LINKEMU_PORT` | `port` |
/// | `LINKEMU_HOST` | `host` |
/// | `LINKEMU_SPEED` | `speed` |
/// | `LINKEMU_REFRESH_MS` | `refresh_ms` |
///
/// Unparseable values are ignored.
pub fn apply_env_overrides(cfg: &mut Config) {
    if let Ok(v) = std::env::var("LINKEMU_PORT")
        && let Ok(port) = v.parse::<u16>()
    {
        cfg.port = port;
    }
    if let Ok(v) = std::env::var("LINKEMU_HOST")
        && !v.trim().is_empty()
    {
        cfg.host = v;
    }
    if let Ok(v) = std::env::var("LINKEMU_SPEED")
        && let Ok(speed) = v.parse::<f64>()
    {
        cfg.speed = speed;
    }
    if let Ok(v) = std::env::var("LINKEMU_REFRESH_MS")
        && let Ok(ms) = v.parse::<u64>()
    {
        cfg.refresh_ms = ms;
    }
}

/// Write `cfg` to `path`, creating the parent directory.
pub fn save_to(cfg: &Config, path: &Path) -> Result<(), LinkError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|e| {
            LinkError::Config(format!("failed to create {}: {e}", parent.display()))
        })?;
    }
    let raw = toml::to_string_pretty(cfg)
        .map_err(|e| LinkError::Config(format!("failed to serialize config: {e}")))?;
    fs::write(path, raw)
        .map_err(|e| LinkError::Config(format!("failed to write {}: {e}", path.display())))
}
