//! Long-running background processes owned by the launcher (API, frontend).

use crate::engine::{ProcessTable, SystemProcessTable};
use crate::error::ActionError;
use std::fs::OpenOptions;
use std::os::unix::process::CommandExt;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

/// How long to wait for a SIGKILLed child to be reaped.
const REAP_TIMEOUT: Duration = Duration::from_secs(2);

// Login shells pick up nix and yarn from the profile. Tests only run plain commands.
const SHELL_FLAG: &str = if cfg!(test) { "-c" } else { "-lc" };

/// Handle to a spawned `bash` process. Cheap to clone; all clones refer to the same child.
#[derive(Clone)]
pub struct ManagedProcess {
    inner: Arc<Inner>,
}

struct Inner {
    pid: u32,
    log_path: PathBuf,
    child: Mutex<Child>,
}

// The last handle going away with the child still running means nobody can stop it
// any more, e.g. an in-flight start abandoned at quit.
impl Drop for Inner {
    fn drop(&mut self) {
        let child = self
            .child
            .get_mut()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if matches!(child.try_wait(), Ok(None)) {
            tracing::info!(pid = self.pid, "killing unowned managed process");
            if SystemProcessTable.kill(self.pid) {
                reap(child, self.pid);
            }
        }
    }
}

/// Collect the exit status of a child that was just killed so it does not linger as a zombie.
fn reap(child: &mut Child, pid: u32) {
    let deadline = Instant::now() + REAP_TIMEOUT;
    loop {
        match child.try_wait() {
            Ok(None) if Instant::now() < deadline => std::thread::sleep(Duration::from_millis(5)),
            Ok(None) => {
                tracing::warn!(pid, "killed process has not exited yet");
                return;
            }
            Ok(Some(_)) => return,
            Err(e) => {
                tracing::warn!(pid, error = %e, "failed to reap killed process");
                return;
            }
        }
    }
}

impl ManagedProcess {
    pub fn pid(&self) -> u32 {
        self.inner.pid
    }

    pub fn log_path(&self) -> &Path {
        &self.inner.log_path
    }

    fn child(&self) -> MutexGuard<'_, Child> {
        self.inner
            .child
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Whether we have already reaped the child's exit status.
    fn has_exited(&self) -> bool {
        matches!(self.child().try_wait(), Ok(Some(_)))
    }
}

impl std::fmt::Debug for ManagedProcess {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ManagedProcess")
            .field("pid", &self.inner.pid)
            .field("log_path", &self.inner.log_path)
            .finish()
    }
}

impl PartialEq for ManagedProcess {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

/// Starts, probes and kills managed processes through a [`ProcessTable`].
#[derive(Clone)]
pub struct ProcessRegistry {
    table: Arc<dyn ProcessTable>,
}

impl Default for ProcessRegistry {
    fn default() -> Self {
        Self::new(Arc::new(SystemProcessTable))
    }
}

impl ProcessRegistry {
    pub fn new(table: Arc<dyn ProcessTable>) -> Self {
        Self { table }
    }

    pub fn table(&self) -> &dyn ProcessTable {
        self.table.as_ref()
    }

    /// Truncate `log_path`, then spawn `bash -lc <command>` in its own process group
    /// with stdout and stderr redirected to the log.
    pub fn start(&self, command: &str, log_path: &Path) -> Result<ManagedProcess, ActionError> {
        let log_err = |source| ActionError::LogFile {
            path: log_path.to_path_buf(),
            source,
        };
        let log = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(log_path)
            .map_err(log_err)?;
        let log_err_stream = log.try_clone().map_err(log_err)?;

        let child = Command::new("bash")
            .arg(SHELL_FLAG)
            .arg(command)
            .stdin(Stdio::null())
            .stdout(Stdio::from(log))
            .stderr(Stdio::from(log_err_stream))
            .process_group(0)
            .spawn()
            .map_err(|source| ActionError::Spawn {
                program: "bash".into(),
                source,
            })?;

        let pid = child.id();
        tracing::info!(pid, log = %log_path.display(), "spawned managed process");
        Ok(ManagedProcess {
            inner: Arc::new(Inner {
                pid,
                log_path: log_path.to_path_buf(),
                child: Mutex::new(child),
            }),
        })
    }

    /// False for a missing handle, a reaped child, or a pid that no longer answers signal 0.
    pub fn is_alive(&self, handle: Option<&ManagedProcess>) -> bool {
        let Some(process) = handle else {
            return false;
        };
        !process.has_exited() && self.table.is_alive(process.pid())
    }

    /// Best-effort SIGKILL of the process group. Missing or dead handles are ignored.
    pub fn kill(&self, handle: Option<&ManagedProcess>) {
        let Some(process) = handle else {
            return;
        };
        if !self.is_alive(Some(process)) {
            return;
        }
        if self.table.kill(process.pid()) {
            tracing::info!(pid = process.pid(), "killed managed process");
            reap(&mut process.child(), process.pid());
        } else {
            tracing::warn!(pid = process.pid(), "failed to signal managed process");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn wait_dead(registry: &ProcessRegistry, p: &ManagedProcess) -> bool {
        let deadline = Instant::now() + Duration::from_secs(30);
        while Instant::now() < deadline {
            if !registry.is_alive(Some(p)) {
                return true;
            }
            std::thread::sleep(Duration::from_millis(20));
        }
        false
    }

    #[test]
    fn output_is_redirected_to_truncated_log() {
        let dir = tempfile::tempdir().unwrap();
        let log = dir.path().join("api.log");
        std::fs::write(&log, "stale contents\n").unwrap();

        let registry = ProcessRegistry::default();
        let p = registry
            .start("echo hello; echo oops >&2", &log)
            .unwrap();
        assert!(wait_dead(&registry, &p));

        let text = std::fs::read_to_string(&log).unwrap();
        assert!(!text.contains("stale"));
        assert!(text.contains("hello"));
        assert!(text.contains("oops"));
        assert_eq!(p.log_path(), log.as_path());
    }

    #[test]
    fn kill_terminates_live_process() {
        let dir = tempfile::tempdir().unwrap();
        let registry = ProcessRegistry::default();
        let p = registry
            .start("sleep 30", &dir.path().join("sleep.log"))
            .unwrap();
        assert!(registry.is_alive(Some(&p)));

        registry.kill(Some(&p));
        assert!(wait_dead(&registry, &p));
    }

    #[test]
    fn nil_and_dead_handles_are_silent_noops() {
        let dir = tempfile::tempdir().unwrap();
        let registry = ProcessRegistry::default();
        assert!(!registry.is_alive(None));
        registry.kill(None);

        let p = registry.start("exit 0", &dir.path().join("x.log")).unwrap();
        assert!(wait_dead(&registry, &p));
        registry.kill(Some(&p));
        registry.kill(Some(&p));
        assert!(!registry.is_alive(Some(&p)));
    }

    /// Scheduler state from `/proc/<pid>/stat`, `None` once the pid is gone.
    fn proc_state(pid: u32) -> Option<char> {
        let stat = std::fs::read_to_string(format!("/proc/{pid}/stat")).ok()?;
        let (_, rest) = stat.rsplit_once(')')?;
        rest.trim_start().chars().next()
    }

    #[test]
    fn killed_processes_are_reaped() {
        let dir = tempfile::tempdir().unwrap();
        let registry = ProcessRegistry::default();
        for _ in 0..10 {
            let p = registry
                .start("sleep 30", &dir.path().join("sleep.log"))
                .unwrap();
            let pid = p.pid();
            registry.kill(Some(&p));
            drop(p);
            assert_ne!(proc_state(pid), Some('Z'), "pid {pid} left as a zombie");
        }
    }

    #[test]
    fn dropping_last_handle_kills_running_child() {
        let dir = tempfile::tempdir().unwrap();
        let registry = ProcessRegistry::default();
        let p = registry
            .start("sleep 30", &dir.path().join("sleep.log"))
            .unwrap();
        let pid = p.pid();
        let clone = p.clone();
        drop(p);
        assert!(registry.is_alive(Some(&clone)));

        drop(clone);
        assert_eq!(proc_state(pid), None, "pid {pid} still running or unreaped");
    }

    #[test]
    fn unopenable_log_fails_before_spawning() {
        let dir = tempfile::tempdir().unwrap();
        let registry = ProcessRegistry::default();
        let err = registry
            .start("true", &dir.path().join("no-such-dir").join("x.log"))
            .unwrap_err();
        assert!(matches!(err, ActionError::LogFile { .. }));
    }
}
