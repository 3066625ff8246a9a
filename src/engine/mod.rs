//! Process, shell and network plumbing the orchestrator drives.
//!
//! Nothing in here knows about services or the menu; every function either
//! succeeds or returns an [`ActionError`](crate::error::ActionError) as data.

pub mod os;
pub mod process;
pub mod readiness;
pub mod recovery;
pub mod session;
pub mod shell;

pub use os::{ProcessTable, SystemProcessTable};
pub use process::{ManagedProcess, ProcessRegistry};
pub use readiness::Probe;
pub use recovery::{PidState, PidStore, Signature};
pub use shell::{ComposeCli, Output, ShellCommand};
