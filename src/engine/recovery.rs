//! Crash recovery for managed processes.
//!
//! The pid file mirrors the processes this launcher spawned. After an abnormal exit it
//! is the only record of them, but pids get reused, so an entry is only acted on after
//! the live command line is verified against a known launch signature.

use crate::engine::ProcessTable;
use crate::engine::process::ManagedProcess;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PidState {
    #[serde(default)]
    pub api_pid: i64,
    #[serde(default)]
    pub frontend_pid: i64,
}

impl PidState {
    pub fn from_handles(api: Option<&ManagedProcess>, frontend: Option<&ManagedProcess>) -> Self {
        Self {
            api_pid: api.map_or(0, |p| i64::from(p.pid())),
            frontend_pid: frontend.map_or(0, |p| i64::from(p.pid())),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.api_pid <= 0 && self.frontend_pid <= 0
    }

    fn pids(&self) -> impl Iterator<Item = u32> {
        [self.api_pid, self.frontend_pid]
            .into_iter()
            .filter_map(|pid| u32::try_from(pid).ok())
            .filter(|pid| *pid > 0)
    }
}

/// Allow-list of command lines the launcher itself produces.
#[derive(Debug, Clone)]
pub struct Signature {
    namespace: String,
    api: Vec<String>,
    frontend: Vec<String>,
}

impl Signature {
    pub fn for_namespace(namespace: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            api: vec!["worker/api".into(), "cargo run --release --bin api".into()],
            frontend: vec!["cd frontend".into(), "yarn dev".into()],
        }
    }

    pub fn matches(&self, cmdline: &str) -> bool {
        if !cmdline.contains(&self.namespace) {
            return false;
        }
        let any = |needles: &[String]| needles.iter().any(|n| cmdline.contains(n.as_str()));
        any(&self.api) || any(&self.frontend)
    }
}

#[derive(Debug, Clone)]
pub struct PidStore {
    path: PathBuf,
    signature: Signature,
}

impl PidStore {
    pub fn new(path: impl Into<PathBuf>, signature: Signature) -> Self {
        Self {
            path: path.into(),
            signature,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Write the current pid set, or delete the file when nothing is managed.
    pub fn persist(&self, state: &PidState) -> Result<()> {
        if state.is_empty() {
            return self.clear();
        }
        let body = serde_json::to_vec(state).context("serialize pid state")?;
        std::fs::write(&self.path, body)
            .with_context(|| format!("write {}", self.path.display()))
    }

    pub fn load(&self) -> Result<Option<PidState>> {
        let bytes = match std::fs::read(&self.path) {
            Ok(b) => b,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e).with_context(|| format!("read {}", self.path.display())),
        };
        let state = serde_json::from_slice(&bytes)
            .with_context(|| format!("parse {}", self.path.display()))?;
        Ok(Some(state))
    }

    pub fn clear(&self) -> Result<()> {
        match std::fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e).with_context(|| format!("remove {}", self.path.display())),
        }
    }

    /// Kill every persisted pid that is still alive and still looks like one of ours,
    /// then delete the file. Returns how many processes were killed.
    pub fn reconcile(&self, table: &dyn ProcessTable) -> Result<usize> {
        let loaded = self.load();
        let cleared = self.clear();
        let Some(state) = loaded? else {
            return cleared.map(|()| 0);
        };

        let mut killed = 0;
        for pid in state.pids() {
            if !table.is_alive(pid) {
                tracing::debug!(pid, "stale pid is gone");
                continue;
            }
            let cmdline = table.command_line(pid).unwrap_or_default();
            if !self.signature.matches(&cmdline) {
                tracing::warn!(pid, cmdline = %cmdline, "stale pid reused by an unrelated process, leaving it alone");
                continue;
            }
            if table.kill(pid) {
                tracing::info!(pid, "killed orphaned managed process");
                killed += 1;
            }
        }
        cleared?;
        Ok(killed)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Mutex;

    /// In-memory process table recording kills.
    #[derive(Default)]
    pub(crate) struct FakeTable {
        pub procs: Mutex<HashMap<u32, String>>,
        pub killed: Mutex<Vec<u32>>,
    }

    impl FakeTable {
        pub(crate) fn with(procs: &[(u32, &str)]) -> Self {
            let table = FakeTable::default();
            {
                let mut map = table.procs.lock().unwrap();
                for (pid, cmd) in procs {
                    map.insert(*pid, cmd.to_string());
                }
            }
            table
        }
    }

    impl ProcessTable for FakeTable {
        fn is_alive(&self, pid: u32) -> bool {
            self.procs.lock().unwrap().contains_key(&pid)
        }

        fn command_line(&self, pid: u32) -> Option<String> {
            self.procs.lock().unwrap().get(&pid).cloned()
        }

        fn kill(&self, pid: u32) -> bool {
            let removed = self.procs.lock().unwrap().remove(&pid).is_some();
            if removed {
                self.killed.lock().unwrap().push(pid);
            }
            removed
        }
    }

    pub(crate) const API_CMD: &str = "bash -lc cd '/home/dev/postal_converter_ja' && nix develop --command bash -lc 'cd worker/api && cargo run --release --bin api'";
    pub(crate) const FE_CMD: &str = "bash -lc cd '/home/dev/postal_converter_ja' && nix develop --command bash -lc 'cd frontend && yarn dev'";

    fn store(dir: &Path) -> PidStore {
        PidStore::new(dir.join("pids.json"), Signature::for_namespace("postal_converter_ja"))
    }

    #[test]
    fn signature_requires_marker_and_launch_pattern() {
        let sig = Signature::for_namespace("postal_converter_ja");
        assert!(sig.matches(API_CMD));
        assert!(sig.matches(FE_CMD));
        assert!(!sig.matches("yarn dev"));
        assert!(!sig.matches("vim /home/dev/postal_converter_ja/README.md"));
        assert!(!sig.matches(""));
    }

    #[test]
    fn persist_writes_json_and_empty_state_deletes_file() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(dir.path());

        let state = PidState {
            api_pid: 4242,
            frontend_pid: 0,
        };
        store.persist(&state).unwrap();
        let raw: serde_json::Value =
            serde_json::from_slice(&std::fs::read(store.path()).unwrap()).unwrap();
        assert_eq!(raw["api_pid"], 4242);
        assert_eq!(raw["frontend_pid"], 0);
        assert_eq!(store.load().unwrap(), Some(state));

        store.persist(&PidState::default()).unwrap();
        assert!(!store.path().exists());
    }

    #[test]
    fn reconcile_kills_only_verified_match() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(dir.path());
        store
            .persist(&PidState {
                api_pid: 100,
                frontend_pid: 200,
            })
            .unwrap();
        // 100 is our API; 200 was reused by an unrelated editor.
        let table = FakeTable::with(&[(100, API_CMD), (200, "vim notes.txt")]);

        let killed = store.reconcile(&table).unwrap();

        assert_eq!(killed, 1);
        assert_eq!(*table.killed.lock().unwrap(), vec![100]);
        assert!(table.is_alive(200));
        assert!(!store.path().exists());
    }

    #[test]
    fn reconcile_skips_dead_pids_and_still_deletes_file() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(dir.path());
        store
            .persist(&PidState {
                api_pid: 100,
                frontend_pid: 200,
            })
            .unwrap();
        let table = FakeTable::default();

        assert_eq!(store.reconcile(&table).unwrap(), 0);
        assert!(table.killed.lock().unwrap().is_empty());
        assert!(!store.path().exists());
    }

    #[test]
    fn reconcile_without_file_is_a_noop() {
        let dir = tempfile::tempdir().unwrap();
        let table = FakeTable::with(&[(100, API_CMD)]);
        assert_eq!(store(dir.path()).reconcile(&table).unwrap(), 0);
        assert!(table.killed.lock().unwrap().is_empty());
    }

    #[test]
    fn corrupt_file_is_reported_and_removed() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(dir.path());
        std::fs::write(store.path(), b"{not json").unwrap();
        let table = FakeTable::with(&[(100, API_CMD)]);

        assert!(store.reconcile(&table).is_err());
        assert!(!store.path().exists());
        assert!(table.killed.lock().unwrap().is_empty());
    }
}
