//! Operator key loop.
//!
//! One key token per line (`s`, `x`, `d`, `up`, `k`, …).  Runs on a blocking
//! thread; every action is dispatched synchronously through the session's
//! router, which never waits on the network.

use colored::Colorize;
use linkemu_middleware::TelemetryChange;
use linkemu_runtime::{Action, ActionOutcome, Session, resolve_key};
use linkemu_types::LinkError;
use rustyline::DefaultEditor;
use rustyline::error::ReadlineError;
use tracing::{debug, warn};

use crate::console;

/// What a single input line asks for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Input {
    Empty,
    Help,
    Action(Action),
    Unknown,
}

pub(crate) fn classify(session: &Session, line: &str) -> Input {
    let key = line.trim();
    if key.is_empty() {
        return Input::Empty;
    }
    if key == "?" || key.eq_ignore_ascii_case("help") {
        return Input::Help;
    }
    resolve_key(session.role(), key).map_or(Input::Unknown, Input::Action)
}

/// Read keys until quit, Ctrl-C or Ctrl-D.
///
/// Fails only if the terminal cannot be set up.
pub fn run(session: &Session) -> Result<(), LinkError> {
    let mut rl = DefaultEditor::new().map_err(|e| LinkError::Display(e.to_string()))?;
    let prompt = format!("{}> ", session.role());

    loop {
        let line = match rl.readline(&prompt) {
            Ok(line) => line,
            Err(ReadlineError::Interrupted | ReadlineError::Eof) => break,
            Err(e) => {
                warn!(error = %e, "console read failed");
                break;
            }
        };

        match classify(session, &line) {
            Input::Empty => continue,
            Input::Help => console::print_bindings(session.bindings()),
            Input::Unknown => println!(
                "{} '{}'. Type {} for the key list.",
                "Unknown key".red(),
                line.trim().yellow(),
                "help".bold()
            ),
            Input::Action(action) => {
                let _ = rl.add_history_entry(line.trim());
                if let ActionOutcome::Quit = report(session.dispatch(action)) {
                    break;
                }
            }
        }
    }

    debug!("key loop finished");
    Ok(())
}

fn report(outcome: ActionOutcome) -> ActionOutcome {
    match outcome {
        ActionOutcome::Broadcast(r) if r.attempted() == 0 => {
            println!("{}", "No clients connected.".dimmed());
        }
        ActionOutcome::Closed(0) => println!("{}", "No clients connected.".dimmed()),
        ActionOutcome::Telemetry(TelemetryChange::NoPeers) => {
            println!("{}", "No clients connected; speed unchanged.".dimmed());
        }
        ActionOutcome::Telemetry(TelemetryChange::AtFloor) => {
            println!("{}", "Speed already at 0.".dimmed());
        }
        ActionOutcome::Unbound => println!("{}", "Not available for this role.".yellow()),
        _ => {}
    }
    outcome
}
