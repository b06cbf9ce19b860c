//! Operator console output.
//!
//! All traffic lines and peer-list refreshes arrive as [`DisplayUpdate`]s and
//! are printed by one task, so output from the transport, the publisher and
//! the operator never interleaves mid-line.

use chrono::Local;
use colored::Colorize;
use linkemu_middleware::DisplayUpdate;
use linkemu_runtime::{KeyBinding, RolePolicy};
use linkemu_types::{Channel, LinkId};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::args::Settings;

/// Spawn the display task.  It ends when every `DisplaySink` is dropped.
pub fn spawn(mut updates: mpsc::UnboundedReceiver<DisplayUpdate>) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(update) = updates.recv().await {
            let stamp = Local::now().format("%H:%M:%S%.3f").to_string();
            for line in render(&update, &stamp) {
                println!("{line}");
            }
        }
    })
}

pub(crate) fn render(update: &DisplayUpdate, stamp: &str) -> Vec<String> {
    let stamp = stamp.dimmed();
    match update {
        DisplayUpdate::Request(line) => vec![format!("{stamp} {}", line.cyan())],
        DisplayUpdate::Response { channel, line } => {
            let line = match channel {
                Some(Channel::Command) => line.yellow(),
                Some(Channel::Data) => line.cyan(),
                Some(Channel::Error) => line.red(),
                None => line.normal(),
            };
            vec![format!("{stamp} {line}")]
        }
        DisplayUpdate::Peers(peers) => {
            let mut out = Vec::with_capacity(peers.len() + 1);
            out.push(format!("[ Client list ({}) ]", peers.len()).bold().to_string());
            out.extend(peers.iter().map(|p| format!("  {p}")));
            out
        }
    }
}

pub fn print_banner(settings: &Settings) {
    println!();
    println!("  {} {}", "linkemu".bold().cyan(), format!("v{}", env!("CARGO_PKG_VERSION")).dimmed());
    println!("  role    : {}", role_line(&settings.policy).bold());
    println!("  link id : {}", link_line(&settings.link_id));
    println!("  {}", settings.endpoint().dimmed());
    println!();
}

pub fn print_bindings(bindings: &[KeyBinding]) {
    println!("{}", "Keys".bold().underline());
    for b in bindings {
        println!("  {} {}", format!("{:<12}", b.keys.join(" / ")).bold().cyan(), b.long_name);
    }
    println!("  {} show this list", format!("{:<12}", "help / ?").bold().cyan());
    println!();
}

fn role_line(policy: &RolePolicy) -> String {
    match policy {
        RolePolicy::Hardware(hw) => format!(
            "hardware ({} rpm, every {} ms, step {})",
            hw.initial_rpm,
            hw.publish_interval.as_millis(),
            hw.speed_step
        ),
        RolePolicy::Game => "game".to_string(),
    }
}

fn link_line(link_id: &LinkId) -> String {
    link_id.as_str().yellow().to_string()
}
