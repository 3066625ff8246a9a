//! One-shot external commands: compose up/down, diagnostics, launchers.

use crate::error::ActionError;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::process::Command;

/// Where a command's stdout/stderr go.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Output {
    Discard,
    /// Appended to a log file, preceded by a header naming the command.
    Append(PathBuf),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShellCommand {
    program: String,
    args: Vec<String>,
    dir: Option<PathBuf>,
}

impl ShellCommand {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            dir: None,
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn current_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.dir = Some(dir.into());
        self
    }

    pub fn display(&self) -> String {
        std::iter::once(self.program.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ")
    }

    fn command(&self) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args).stdin(Stdio::null());
        if let Some(dir) = &self.dir {
            cmd.current_dir(dir);
        }
        cmd
    }
}

fn open_output(cmd: &ShellCommand, output: &Output) -> Result<(Stdio, Stdio), ActionError> {
    match output {
        Output::Discard => Ok((Stdio::null(), Stdio::null())),
        Output::Append(path) => {
            let log_err = |source| ActionError::LogFile {
                path: path.clone(),
                source,
            };
            let mut file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .map_err(log_err)?;
            let ts = time::OffsetDateTime::now_utc()
                .format(&time::format_description::well_known::Rfc3339)
                .unwrap_or_else(|_| "now".into());
            writeln!(file, "=== {ts} $ {} ===", cmd.display()).map_err(log_err)?;
            let err = file.try_clone().map_err(log_err)?;
            Ok((Stdio::from(file), Stdio::from(err)))
        }
    }
}

/// Run `cmd` to completion. A non-zero exit is an error, never a panic.
pub async fn run(cmd: &ShellCommand, output: &Output) -> Result<(), ActionError> {
    let (stdout, stderr) = open_output(cmd, output)?;
    tracing::debug!(command = %cmd.display(), "running command");
    let status = cmd
        .command()
        .stdout(stdout)
        .stderr(stderr)
        .status()
        .await
        .map_err(|source| ActionError::Spawn {
            program: cmd.program.clone(),
            source,
        })?;
    if status.success() {
        Ok(())
    } else {
        Err(ActionError::ToolFailed {
            program: cmd.display(),
            status,
        })
    }
}

/// Run `cmd` and report whether it exited with status 0. Output is discarded.
///
/// The child is killed if the returned future is dropped, so callers may wrap this
/// in a timeout.
pub async fn succeeds(cmd: &ShellCommand) -> bool {
    let mut command = cmd.command();
    command
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .kill_on_drop(true);
    matches!(command.status().await, Ok(status) if status.success())
}

/// How compose is invoked: the `docker compose` plugin first, then the standalone
/// binary when the first form fails.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComposeCli {
    pub primary: ShellCommand,
    pub legacy: ShellCommand,
}

impl Default for ComposeCli {
    fn default() -> Self {
        Self {
            primary: ShellCommand::new("docker").arg("compose"),
            legacy: ShellCommand::new("docker-compose"),
        }
    }
}

/// Run a compose subcommand in `dir`, falling back to the legacy form on any failure.
/// When both fail the legacy error is returned.
pub async fn run_compose(
    cli: &ComposeCli,
    dir: &Path,
    args: &[String],
    output: &Output,
) -> Result<(), ActionError> {
    let primary = cli
        .primary
        .clone()
        .args(args.iter().cloned())
        .current_dir(dir);
    match run(&primary, output).await {
        Ok(()) => Ok(()),
        Err(err) => {
            tracing::warn!(
                error = %err,
                legacy = %cli.legacy.display(),
                "compose failed, trying legacy form"
            );
            let legacy = cli
                .legacy
                .clone()
                .args(args.iter().cloned())
                .current_dir(dir);
            run(&legacy, output).await
        }
    }
}
