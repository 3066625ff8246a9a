//! Error types surfaced to the operator as status messages.

use crate::model::Service;
use std::path::PathBuf;
use std::process::ExitStatus;
use std::time::Duration;
use thiserror::Error;

/// Failure of an action's background work. Folded into the status message; never fatal.
#[derive(Debug, Error)]
pub enum ActionError {
    #[error("cannot open log file {}: {source}", .path.display())]
    LogFile {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to launch {program}: {source}")]
    Spawn {
        program: String,
        source: std::io::Error,
    },

    #[error("{program} exited with {status}")]
    ToolFailed { program: String, status: ExitStatus },

    #[error("service did not become ready at {target} within {timeout:?}")]
    Timeout { target: String, timeout: Duration },

    #[error("process exited before service became ready at {target}")]
    ExitedEarly { target: String },

    #[error("no terminal emulator found (tried {tried})")]
    NoTerminal { tried: String },

    #[error("background task failed: {0}")]
    Join(String),

    #[error("{source} (log: {})", .log.display())]
    Logged {
        source: Box<ActionError>,
        log: PathBuf,
    },
}

impl ActionError {
    /// Annotate with the log file the operator should inspect.
    pub fn with_log(self, log: impl Into<PathBuf>) -> Self {
        ActionError::Logged {
            source: Box::new(self),
            log: log.into(),
        }
    }

    /// The underlying error, skipping log annotations.
    pub fn root(&self) -> &ActionError {
        match self {
            ActionError::Logged { source, .. } => source.root(),
            other => other,
        }
    }
}

/// Why a requested action was refused before any work started.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum Rejection {
    #[error("Operation in progress. Please wait...")]
    Busy,

    #[error("⚠️  Please start {} first!", .0.label())]
    MissingDependency(Service),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn log_annotation_wraps_message() {
        let err = ActionError::ExitedEarly {
            target: "http://127.0.0.1:3202/docs".into(),
        }
        .with_log("/tmp/api.log");
        assert_eq!(
            err.to_string(),
            "process exited before service became ready at http://127.0.0.1:3202/docs (log: /tmp/api.log)"
        );
        assert!(matches!(err.root(), ActionError::ExitedEarly { .. }));
    }

    #[test]
    fn rejection_names_missing_dependency() {
        assert_eq!(
            Rejection::MissingDependency(Service::Api).to_string(),
            "⚠️  Please start API first!"
        );
        assert_eq!(
            Rejection::MissingDependency(Service::Database).to_string(),
            "⚠️  Please start Databases first!"
        );
    }
}
