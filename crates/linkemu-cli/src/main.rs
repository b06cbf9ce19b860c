//! `linkemu` – control-link endpoint emulator
//!
//! 1. Merges defaults, `~/.linkemu/config.toml`, `LINKEMU_*` variables and
//!    command-line flags into one set of [`args::Settings`].
//! 2. Opens the WebSocket transport (listen with `--server`, dial otherwise).
//! 3. Registers the hardware or game session and feeds it transport events.
//! 4. Runs the operator key loop until quit.
//!
//! Startup failures exit with a distinct status per failure site (see
//! [`LinkError::exit_code`]).

mod args;
mod config;
mod console;
mod repl;

use std::sync::Arc;

use clap::Parser;
use colored::Colorize;
use linkemu_middleware::DisplaySink;
use linkemu_runtime::{Session, init_tracing};
use linkemu_types::LinkError;
use tokio::sync::mpsc;
use tracing::info;

use crate::args::{Cli, Settings};

fn main() {
    let cli = Cli::parse();
    let guard = init_tracing("linkemu");

    let code = match run(cli) {
        Ok(()) => 0,
        Err(e) => {
            eprintln!("{} {e}", "error:".red().bold());
            e.exit_code()
        }
    };

    // Flush spans before exiting; process::exit skips destructors.
    drop(guard);
    std::process::exit(code);
}

fn run(cli: Cli) -> Result<(), LinkError> {
    let config_path = cli.config.clone().unwrap_or_else(config::config_path);
    let cfg = config::load_or_default(&config_path)?;
    let settings = Settings::resolve(&cli, cfg)?;

    if cli.save_config {
        config::save_to(&settings.to_config(), &config_path)?;
        println!(
            "  {} {}",
            "✓ Settings saved to".green(),
            config_path.display().to_string().bold()
        );
    }

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|e| LinkError::Transport(format!("failed to start runtime: {e}")))?;
    runtime.block_on(serve(settings))
}

async fn serve(settings: Settings) -> Result<(), LinkError> {
    console::print_banner(&settings);

    let (events, events_rx) = mpsc::unbounded_channel();
    let transport = settings.transport().open(events).await?;
    info!(endpoint = %transport.endpoint, "transport open");

    let (display, updates) = DisplaySink::channel();
    let display_task = console::spawn(updates);
    let session = Arc::new(Session::register(
        settings.policy,
        settings.link_id.clone(),
        display,
    ));
    console::print_bindings(session.bindings());

    let runner = {
        let session = Arc::clone(&session);
        tokio::spawn(async move { session.run(events_rx).await })
    };

    let keys = {
        let session = Arc::clone(&session);
        tokio::task::spawn_blocking(move || repl::run(&session))
    };
    let result = keys
        .await
        .unwrap_or_else(|e| Err(LinkError::Display(format!("key loop aborted: {e}"))));

    session.shutdown().await;
    transport.abort();
    runner.abort();
    display_task.abort();
    result
}
