//! Access to the operating system's process table.
//!
//! Everything that signals or inspects a pid goes through [`ProcessTable`], so the
//! recovery and registry logic can be exercised against a fake table in tests.

use nix::errno::Errno;
use nix::sys::signal::{self, Signal};
use nix::unistd::Pid;
use sysinfo::System;

pub trait ProcessTable: Send + Sync {
    /// Zero-signal liveness probe.
    fn is_alive(&self, pid: u32) -> bool;

    /// Full command line of a running process, space-joined.
    fn command_line(&self, pid: u32) -> Option<String>;

    /// Forcefully terminate `pid` (and its process group when it leads one).
    /// Returns whether any signal was delivered.
    fn kill(&self, pid: u32) -> bool;
}

/// The live process table of this host.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemProcessTable;

fn to_pid(pid: u32) -> Option<Pid> {
    i32::try_from(pid).ok().filter(|p| *p > 0).map(Pid::from_raw)
}

impl ProcessTable for SystemProcessTable {
    fn is_alive(&self, pid: u32) -> bool {
        let Some(pid) = to_pid(pid) else {
            return false;
        };
        // EPERM means the pid exists but belongs to someone else.
        matches!(signal::kill(pid, None), Ok(()) | Err(Errno::EPERM))
    }

    fn command_line(&self, pid: u32) -> Option<String> {
        let pid = sysinfo::Pid::from_u32(pid);
        let mut sys = System::new();
        if !sys.refresh_process(pid) {
            return None;
        }
        let process = sys.process(pid)?;
        let cmd = process.cmd();
        if cmd.is_empty() {
            Some(process.name().to_string())
        } else {
            Some(cmd.join(" "))
        }
    }

    fn kill(&self, pid: u32) -> bool {
        let Some(pid) = to_pid(pid) else {
            return false;
        };
        let group = signal::killpg(pid, Signal::SIGKILL).is_ok();
        let leader = signal::kill(pid, Signal::SIGKILL).is_ok();
        group || leader
    }
}
