//! Launcher controller.
//!
//! Owns the [`ControllerState`], runs at most one background action at a time and
//! publishes a fresh view to presentation layers after every change.

use crate::engine::{PidStore, ProcessRegistry, Signature};
use crate::error::ActionError;
use crate::model::{Action, LauncherConfig, UiEvent};
use crate::orchestrator::actions::{self, ActionContext};
use crate::orchestrator::state::{Completion, ControllerState, Dispatch, Job};
use reqwest::Client;
use std::sync::Arc;
use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender};
use tokio::task::JoinHandle;

/// Commands emitted by UI layers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum UiCommand {
    CursorUp,
    CursorDown,
    /// Activate a menu row directly (number keys, mouse click).
    Activate(usize),
    ActivateCursor,
    Quit,
}

/// Reconcile the pid file left by a previous run and build the startup state.
/// Runs before the first frame is drawn.
pub(crate) fn initial_state(cfg: &LauncherConfig, registry: ProcessRegistry) -> ControllerState {
    let store = PidStore::new(
        &cfg.pid_state_path,
        Signature::for_namespace(cfg.namespace.clone()),
    );
    let recovered = match store.reconcile(registry.table()) {
        Ok(n) => n,
        Err(e) => {
            tracing::warn!(error = %format!("{e:#}"), "stale process recovery failed");
            0
        }
    };
    if recovered > 0 {
        tracing::info!(
            recovered,
            pid_file = %store.path().display(),
            "killed processes left over from a previous run"
        );
    }
    ControllerState::new(
        registry,
        store,
        &cfg.swagger_url,
        &cfg.frontend_url,
        recovered,
    )
}

fn spawn_job(
    job: Job,
    cfg: &Arc<LauncherConfig>,
    client: &Client,
    registry: &ProcessRegistry,
) -> JoinHandle<Completion> {
    let ctx = ActionContext {
        cfg: Arc::clone(cfg),
        client: client.clone(),
        registry: registry.clone(),
        existing: job.existing,
    };
    tokio::spawn(actions::execute(job.action, ctx))
}

/// Translate a UI command into a state transition. `None` means nothing to run.
fn apply(state: &mut ControllerState, cmd: UiCommand) -> Option<Dispatch> {
    let res = match cmd {
        UiCommand::CursorUp => state.move_cursor(-1).map(|()| None),
        UiCommand::CursorDown => state.move_cursor(1).map(|()| None),
        UiCommand::Activate(index) => match Action::from_index(index) {
            Some(action) => state.activate(action).map(Some),
            None => Ok(None),
        },
        UiCommand::ActivateCursor => match Action::from_index(state.cursor()) {
            Some(action) => state.request(action).map(Some),
            None => Ok(None),
        },
        UiCommand::Quit => Ok(Some(Dispatch::Quit)),
    };
    res.unwrap_or_else(|rejection| {
        tracing::debug!(?cmd, %rejection, "command rejected");
        None
    })
}

/// Drive the state machine from UI commands and background completions until quit.
pub(crate) async fn run_controller(
    cfg: Arc<LauncherConfig>,
    mut state: ControllerState,
    client: Client,
    event_tx: UnboundedSender<UiEvent>,
    mut cmd_rx: UnboundedReceiver<UiCommand>,
) {
    let publish = |state: &ControllerState| {
        let _ = event_tx.send(UiEvent::State(Box::new(state.view())));
    };
    let registry = state.registry().clone();
    let mut running: Option<(Action, JoinHandle<Completion>)> = None;
    publish(&state);

    loop {
        tokio::select! {
            cmd = cmd_rx.recv() => {
                let Some(cmd) = cmd else {
                    break;
                };
                match apply(&mut state, cmd) {
                    Some(Dispatch::Quit) => break,
                    Some(Dispatch::Run(job)) => {
                        let action = job.action;
                        running = Some((action, spawn_job(job, &cfg, &client, &registry)));
                    }
                    None => {}
                }
                publish(&state);
            }
            // Do not take the JoinHandle before this branch wins; otherwise it can be dropped
            // if another select branch is chosen, and we'll never observe completion.
            maybe_done = async {
                if let Some((_, h)) = running.as_mut() {
                    return Some(h.await);
                }
                futures::future::pending().await
            } => {
                if let (Some(join_res), Some((action, _))) = (maybe_done, running.take()) {
                    let completion = join_res.unwrap_or_else(|e| Completion {
                        action,
                        result: Err(ActionError::Join(e.to_string())),
                    });
                    state.fold(completion);
                    tracing::debug!(message = state.message(), "state updated");
                    publish(&state);
                }
            }
        }
    }

    // In-flight work is abandoned, not joined.
    if let Some((action, handle)) = running.take() {
        tracing::info!(?action, "abandoning in-flight action");
        handle.abort();
    }
    state.shutdown();
    tracing::info!("controller stopped");
    let _ = event_tx.send(UiEvent::Exited);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::{build_config, Cli};
    use crate::engine::readiness::http_client;
    use crate::engine::recovery::tests::{FakeTable, API_CMD};
    use crate::engine::{PidState, ProcessTable};
    use crate::model::Status;
    use clap::Parser;
    use std::path::Path;
    use tokio::sync::mpsc;

    fn config(dir: &Path) -> LauncherConfig {
        build_config(&Cli::parse_from([
            "postal-launcher",
            "--project-root",
            dir.to_str().unwrap(),
            "--state-dir",
            dir.to_str().unwrap(),
        ]))
    }

    #[test]
    fn startup_reconciles_previous_run() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = config(dir.path());
        std::fs::write(
            &cfg.pid_state_path,
            serde_json::to_vec(&PidState {
                api_pid: 100,
                frontend_pid: 0,
            })
            .unwrap(),
        )
        .unwrap();
        let table = Arc::new(FakeTable::with(&[(100, API_CMD)]));

        let state = initial_state(&cfg, ProcessRegistry::new(table.clone()));

        assert!(state.message().starts_with("Recovered 1 stale process(es)."));
        assert!(!table.is_alive(100));
        assert!(!cfg.pid_state_path.exists());
    }

    #[test]
    fn unreadable_pid_file_does_not_block_startup() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = config(dir.path());
        std::fs::write(&cfg.pid_state_path, b"garbage").unwrap();

        let state = initial_state(&cfg, ProcessRegistry::new(Arc::new(FakeTable::default())));

        assert_eq!(state.message(), "Please start the Databases first.");
        assert!(!cfg.pid_state_path.exists());
    }

    #[tokio::test]
    async fn rejected_commands_publish_and_quit_exits() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = Arc::new(config(dir.path()));
        let state = initial_state(&cfg, ProcessRegistry::new(Arc::new(FakeTable::default())));
        let (event_tx, mut event_rx) = mpsc::unbounded_channel();
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();

        cmd_tx.send(UiCommand::Activate(Action::StartFrontend.index())).unwrap();
        cmd_tx.send(UiCommand::CursorDown).unwrap();
        cmd_tx.send(UiCommand::Activate(42)).unwrap();
        cmd_tx.send(UiCommand::Quit).unwrap();
        run_controller(cfg, state, http_client().unwrap(), event_tx, cmd_rx).await;

        let mut views = Vec::new();
        let mut exited = false;
        while let Ok(ev) = event_rx.try_recv() {
            match ev {
                UiEvent::State(v) => views.push(*v),
                UiEvent::Exited => exited = true,
            }
        }
        assert!(exited);
        assert_eq!(views.len(), 4);
        assert_eq!(views[1].message, "⚠️  Please start API first!");
        assert_eq!(views[1].cursor, Action::StartFrontend.index());
        assert_eq!(views[2].cursor, Action::StopDatabase.index());
        assert!(views.iter().all(|v| v.loading.is_none()));
        assert!(views.iter().all(|v| v.statuses == [Status::Pending; 4]));
    }

    #[tokio::test]
    async fn closed_command_channel_stops_controller() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = Arc::new(config(dir.path()));
        let state = initial_state(&cfg, ProcessRegistry::new(Arc::new(FakeTable::default())));
        let (event_tx, mut event_rx) = mpsc::unbounded_channel();
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel::<UiCommand>();
        drop(cmd_tx);

        run_controller(cfg, state, http_client().unwrap(), event_tx, cmd_rx).await;

        assert!(matches!(event_rx.recv().await, Some(UiEvent::State(_))));
        assert!(matches!(event_rx.recv().await, Some(UiEvent::Exited)));
    }
}
