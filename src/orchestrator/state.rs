//! The orchestration state machine.
//!
//! Owns service statuses, the in-flight action and managed process handles. It is
//! mutated only by validated dispatches and by folding [`Completion`]s, both on the
//! controller loop.

use crate::engine::{ManagedProcess, PidState, PidStore, ProcessRegistry};
use crate::error::{ActionError, Rejection};
use crate::model::{Action, ControllerView, LoadingView, Service, Status};

/// What a successful action produced.
#[derive(Debug)]
pub enum Outcome {
    Ready,
    /// A new managed process answered its readiness probe.
    Spawned(ManagedProcess),
    /// The endpoint was already answering; nothing was spawned.
    AlreadyRunning,
}

/// Immutable result message sent from a background unit back to the controller loop.
#[derive(Debug)]
pub struct Completion {
    pub action: Action,
    pub result: Result<Outcome, ActionError>,
}

/// Work handed to a background unit: the action plus a snapshot of the handle it may reuse.
#[derive(Debug, Clone)]
pub struct Job {
    pub action: Action,
    pub existing: Option<ManagedProcess>,
}

#[derive(Debug)]
pub enum Dispatch {
    Run(Job),
    Quit,
}

pub struct ControllerState {
    statuses: [Status; 4],
    in_flight: Option<Action>,
    cursor: usize,
    message: String,
    api: Option<ManagedProcess>,
    frontend: Option<ManagedProcess>,
    swagger_url: String,
    frontend_url: String,
    registry: ProcessRegistry,
    store: PidStore,
}

impl ControllerState {
    pub fn new(
        registry: ProcessRegistry,
        store: PidStore,
        swagger_url: impl Into<String>,
        frontend_url: impl Into<String>,
        recovered: usize,
    ) -> Self {
        let message = if recovered > 0 {
            format!("Recovered {recovered} stale process(es). Please start the Databases first.")
        } else {
            "Please start the Databases first.".to_string()
        };
        Self {
            statuses: [Status::Pending; 4],
            in_flight: None,
            cursor: 0,
            message,
            api: None,
            frontend: None,
            swagger_url: swagger_url.into(),
            frontend_url: frontend_url.into(),
            registry,
            store,
        }
    }

    pub fn status(&self, service: Service) -> Status {
        self.statuses[service.slot()]
    }

    fn set_status(&mut self, service: Service, status: Status) {
        self.statuses[service.slot()] = status;
    }

    pub fn in_flight(&self) -> Option<Action> {
        self.in_flight
    }

    pub fn is_busy(&self) -> bool {
        self.in_flight.is_some()
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }

    pub fn registry(&self) -> &ProcessRegistry {
        &self.registry
    }

    pub fn api_handle(&self) -> Option<&ManagedProcess> {
        self.api.as_ref()
    }

    pub fn frontend_handle(&self) -> Option<&ManagedProcess> {
        self.frontend.as_ref()
    }

    pub fn view(&self) -> ControllerView {
        ControllerView {
            statuses: Service::ALL.map(|s| self.status(s)),
            loading: self.in_flight().map(|a| LoadingView {
                index: a.index(),
                label: a.loading_label(),
            }),
            cursor: self.cursor,
            message: self.message().to_string(),
            api_pid: self.api_handle().map(ManagedProcess::pid),
            frontend_pid: self.frontend_handle().map(ManagedProcess::pid),
        }
    }

    fn reject(&mut self, rejection: Rejection) -> Rejection {
        self.message = rejection.to_string();
        rejection
    }

    pub fn move_cursor(&mut self, delta: isize) -> Result<(), Rejection> {
        if self.is_busy() {
            return Err(self.reject(Rejection::Busy));
        }
        let last = Action::MENU.len() - 1;
        self.cursor = self.cursor.saturating_add_signed(delta).min(last);
        Ok(())
    }

    /// Move the cursor onto `action`'s row and request it.
    pub fn activate(&mut self, action: Action) -> Result<Dispatch, Rejection> {
        if self.is_busy() {
            return Err(self.reject(Rejection::Busy));
        }
        self.cursor = action.index();
        self.request(action)
    }

    /// Validate `action` against the busy flag and the dependency graph. On success the
    /// controller becomes busy and the caller must run the returned job.
    pub fn request(&mut self, action: Action) -> Result<Dispatch, Rejection> {
        if self.is_busy() {
            return Err(self.reject(Rejection::Busy));
        }
        if let Some(dep) = action.requires() {
            if self.status(dep) != Status::Done {
                tracing::info!(?action, missing = dep.label(), "precondition not met");
                return Err(self.reject(Rejection::MissingDependency(dep)));
            }
        }
        if action == Action::Quit {
            self.message = action.progress_message().to_string();
            return Ok(Dispatch::Quit);
        }

        let existing = match action {
            Action::StartApi => self.api.clone(),
            Action::StartFrontend => self.frontend.clone(),
            _ => None,
        };
        self.in_flight = Some(action);
        self.message = action.progress_message().to_string();
        tracing::info!(?action, "dispatching");
        Ok(Dispatch::Run(Job { action, existing }))
    }

    /// Fold a completion message back into state. Returns false if nothing was in flight.
    pub fn fold(&mut self, completion: Completion) -> bool {
        let Some(in_flight) = self.in_flight.take() else {
            tracing::warn!(action = ?completion.action, "completion with no action in flight");
            return false;
        };
        if in_flight != completion.action {
            tracing::warn!(?in_flight, action = ?completion.action, "completion for unexpected action");
        }

        match (completion.action, completion.result) {
            (action, Err(err)) => {
                tracing::warn!(?action, error = %err, "action failed");
                self.message = format!("{}: {err}", action.failure_prefix());
                match action {
                    Action::StartApi => self.forget_exited(Service::Api),
                    Action::StartFrontend => self.forget_exited(Service::Frontend),
                    _ => {}
                }
            }
            (Action::StartDatabase, Ok(_)) => {
                self.set_status(Service::Database, Status::Done);
                self.message = "Databases started! Now you can start Crawler or API.".into();
                if self.cursor == Action::StartDatabase.index() {
                    self.cursor = Action::StartCrawler.index();
                }
            }
            (Action::StartCrawler, Ok(_)) => {
                self.set_status(Service::Crawler, Status::Done);
                self.message = "Crawler terminal opened.".into();
            }
            (Action::StartApi, Ok(outcome)) => {
                self.adopt(Service::Api, outcome);
                self.set_status(Service::Api, Status::Done);
                self.message = match &self.api {
                    Some(p) => format!(
                        "API started. Swagger: {} (log: {})",
                        self.swagger_url,
                        p.log_path().display()
                    ),
                    None => format!("API already running. Swagger: {}", self.swagger_url),
                };
                if self.cursor == Action::StartApi.index() {
                    self.cursor = Action::StartFrontend.index();
                }
            }
            (Action::StartFrontend, Ok(outcome)) => {
                self.adopt(Service::Frontend, outcome);
                self.set_status(Service::Frontend, Status::Done);
                self.message = match &self.frontend {
                    Some(p) => format!(
                        "Frontend started: {} (log: {})",
                        self.frontend_url,
                        p.log_path().display()
                    ),
                    None => format!("Frontend already running: {}", self.frontend_url),
                };
            }
            (Action::StopDatabase, Ok(_)) => {
                self.release_managed();
                self.statuses = [Status::Pending; 4];
                self.message = "Databases stopped. Resetting state.".into();
                self.cursor = 0;
            }
            (Action::Quit, Ok(_)) => {}
        }
        tracing::info!(action = ?completion.action, "completion folded");
        true
    }

    /// Install a freshly spawned handle and persist it; an already-running endpoint leaves
    /// the current handle untouched.
    fn adopt(&mut self, service: Service, outcome: Outcome) {
        let Outcome::Spawned(process) = outcome else {
            return;
        };
        let slot = match service {
            Service::Api => &mut self.api,
            Service::Frontend => &mut self.frontend,
            Service::Database | Service::Crawler => return,
        };
        if let Some(old) = slot.replace(process) {
            self.registry.kill(Some(&old));
        }
        self.persist();
    }

    /// Drop a handle whose process is gone, such as a stuck one killed by a failed restart.
    fn forget_exited(&mut self, service: Service) {
        let slot = match service {
            Service::Api => &mut self.api,
            Service::Frontend => &mut self.frontend,
            Service::Database | Service::Crawler => return,
        };
        if slot.is_none() || self.registry.is_alive(slot.as_ref()) {
            return;
        }
        if let Some(old) = slot.take() {
            tracing::info!(?service, pid = old.pid(), "forgetting exited managed process");
        }
        self.persist();
    }

    fn persist(&self) {
        let state = PidState::from_handles(self.api.as_ref(), self.frontend.as_ref());
        if let Err(e) = self.store.persist(&state) {
            tracing::warn!(error = %e, "failed to persist managed pids");
        }
    }

    /// Kill both managed processes and forget them.
    fn release_managed(&mut self) {
        self.registry.kill(self.api.take().as_ref());
        self.registry.kill(self.frontend.take().as_ref());
        self.persist();
    }

    /// Quit teardown: kill owned processes, then sweep anything still named in the pid file.
    pub fn shutdown(&mut self) {
        self.release_managed();
        match self.store.reconcile(self.registry.table()) {
            Ok(0) => {}
            Ok(n) => tracing::info!(killed = n, "killed stale processes on exit"),
            Err(e) => tracing::warn!(error = %e, "stale process cleanup failed"),
        }
    }
}
