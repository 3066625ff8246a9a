//! Opening commands in a new terminal window the operator can watch.

use crate::engine::shell::{self, Output, ShellCommand};
use crate::error::ActionError;
use std::process::Stdio;

/// Terminal emulators tried on non-macOS hosts, in order.
const TERMINALS: [&str; 4] = ["x-terminal-emulator", "gnome-terminal", "konsole", "xterm"];

/// AppleScript that makes Terminal.app run `command` in a new window.
fn terminal_app_script(command: &str) -> String {
    let escaped = command.replace('\\', "\\\\").replace('"', "\\\"");
    format!("tell application \"Terminal\" to do script \"{escaped}\"")
}

/// Arguments that make `terminal` run `command` through a login shell.
fn emulator_args(terminal: &str, command: &str) -> Vec<String> {
    let run = ["bash".to_string(), "-lc".to_string(), command.to_string()];
    let flag = if terminal == "gnome-terminal" { "--" } else { "-e" };
    std::iter::once(flag.to_string()).chain(run).collect()
}

/// Launch `command` in a new interactive terminal session. The session is not owned:
/// once it is open the launcher neither waits on it nor kills it.
pub async fn open_in_terminal(command: &str) -> Result<(), ActionError> {
    if cfg!(target_os = "macos") {
        let osascript = ShellCommand::new("osascript")
            .arg("-e")
            .arg(terminal_app_script(command));
        return shell::run(&osascript, &Output::Discard).await;
    }

    let Some(terminal) = TERMINALS.iter().find(|t| which::which(t).is_ok()) else {
        return Err(ActionError::NoTerminal {
            tried: TERMINALS.join(", "),
        });
    };
    tracing::info!(terminal, "opening interactive session");
    // Dropped children are reaped by the runtime in the background.
    tokio::process::Command::new(terminal)
        .args(emulator_args(terminal, command))
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .process_group(0)
        .spawn()
        .map(drop)
        .map_err(|source| ActionError::Spawn {
            program: terminal.to_string(),
            source,
        })
}
