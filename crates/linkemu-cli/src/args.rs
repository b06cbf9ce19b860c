//! Command-line surface and its merge with [`Config`].

use std::path::PathBuf;
use std::time::Duration;

use clap::{Args, Parser, Subcommand};
use linkemu_middleware::{Transport, WsClient, WsServer};
use linkemu_runtime::{HardwareSettings, RolePolicy};
use linkemu_types::{LinkError, LinkId};

use crate::config::Config;

#[derive(Parser, Debug)]
#[command(
    name = "linkemu",
    about = "Emulate the hardware or game end of a real-time control link",
    version
)]
pub struct Cli {
    /// Port to listen on (with --server) or dial [default: 8080]
    #[arg(short, long, global = true)]
    pub port: Option<u16>,

    /// Host to dial [default: localhost]
    #[arg(long, global = true)]
    pub host: Option<String>,

    /// Listen for peers instead of dialling one
    #[arg(long, global = true)]
    pub server: bool,

    /// Config file [default: ~/.linkemu/config.toml]
    #[arg(long, global = true, value_name = "PATH", env = "LINKEMU_CONFIG")]
    pub config: Option<PathBuf>,

    /// Write the effective settings back to the config file
    #[arg(long, global = true)]
    pub save_config: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Emulate the sensor side: controller input and periodic RPM
    #[command(visible_alias = "hdw")]
    Hardware(HardwareArgs),
    /// Emulate the game side: session control only
    Game,
}

#[derive(Args, Debug, Clone, Default)]
pub struct HardwareArgs {
    /// Link id to stamp on packets [default: random UUID]
    #[arg(long, value_name = "LINK_ID")]
    pub id: Option<String>,

    /// Starting RPM [default: 60]
    #[arg(short, long)]
    pub speed: Option<f64>,

    /// Telemetry publish interval in milliseconds [default: 250]
    #[arg(short, long, value_name = "MS")]
    pub refresh: Option<u64>,

    /// RPM change per speed-up / speed-down [default: 5]
    #[arg(long)]
    pub step: Option<f64>,
}

/// Everything needed to start a session, after defaults, file, env and
/// flags have been merged.
#[derive(Debug, Clone)]
pub struct Settings {
    pub port: u16,
    pub host: String,
    pub server: bool,
    pub policy: RolePolicy,
    pub link_id: LinkId,
}

impl Settings {
    pub fn resolve(cli: &Cli, cfg: Config) -> Result<Self, LinkError> {
        let port = cli.port.unwrap_or(cfg.port);
        let host = cli.host.clone().unwrap_or(cfg.host);
        let server = cli.server || cfg.server;

        let (policy, link_id) = match &cli.command {
            Command::Hardware(args) => {
                let initial_rpm = args.speed.unwrap_or(cfg.speed);
                let refresh_ms = args.refresh.unwrap_or(cfg.refresh_ms);
                let speed_step = args.step.unwrap_or(cfg.speed_step);

                if !initial_rpm.is_finite() || initial_rpm < 0.0 {
                    return Err(LinkError::Config(format!(
                        "speed must be a non-negative number, got {initial_rpm}"
                    )));
                }
                if refresh_ms == 0 {
                    return Err(LinkError::Config("refresh interval must be positive".into()));
                }
                if !speed_step.is_finite() || speed_step <= 0.0 {
                    return Err(LinkError::Config(format!(
                        "speed step must be positive, got {speed_step}"
                    )));
                }

                let link_id = match args.id.as_deref().map(str::trim) {
                    Some(id) if !id.is_empty() => LinkId::from(id),
                    _ => LinkId::generate(),
                };
                let policy = RolePolicy::Hardware(HardwareSettings {
                    initial_rpm,
                    publish_interval: Duration::from_millis(refresh_ms),
                    speed_step,
                });
                (policy, link_id)
            }
            Command::Game => (RolePolicy::Game, LinkId::generate()),
        };

        Ok(Self {
            port,
            host,
            server,
            policy,
            link_id,
        })
    }

    /// Listening server or single-peer client, depending on `--server`.
    pub fn transport(&self) -> Box<dyn Transport> {
        if self.server {
            Box::new(WsServer::on_port(self.port))
        } else {
            Box::new(WsClient::for_host(&self.host, self.port))
        }
    }

    /// Where the transport listens or dials, for the banner.
    pub fn endpoint(&self) -> String {
        if self.server {
            format!("listening on 0.0.0.0:{}", self.port)
        } else {
            format!("dialling ws://{}:{}/", self.host, self.port)
        }
    }

    /// Project back onto the persisted shape for `--save-config`.
    pub fn to_config(&self) -> Config {
        let mut cfg = Config {
            port: self.port,
            host: self.host.clone(),
            server: self.server,
            ..Config::default()
        };
        if let RolePolicy::Hardware(hw) = self.policy {
            cfg.speed = hw.initial_rpm;
            cfg.refresh_ms = hw.publish_interval.as_millis() as u64;
            cfg.speed_step = hw.speed_step;
        }
        cfg
    }
}
