use crate::engine::{ComposeCli, ShellCommand};
use std::path::PathBuf;
use std::time::Duration;

/// Immutable launcher settings, built once from CLI arguments.
#[derive(Debug, Clone)]
pub struct LauncherConfig {
    pub project_root: PathBuf,
    pub api_base_url: String,
    pub swagger_url: String,
    pub frontend_url: String,
    pub api_log_path: PathBuf,
    pub frontend_log_path: PathBuf,
    pub compose_log_path: PathBuf,
    pub launcher_log_path: PathBuf,
    pub pid_state_path: PathBuf,
    pub compose_profile: String,
    pub compose_services: Vec<String>,
    pub compose: ComposeCli,
    /// Exits 0 once Postgres accepts connections.
    pub db_ready_command: ShellCommand,
    pub database_url: String,
    pub redis_url: String,
    /// Marker every command line we launch contains (the project directory name).
    pub namespace: String,
    pub ready_timeout: Duration,
    pub poll_interval: Duration,
    pub db_poll_interval: Duration,
    pub probe_timeout: Duration,
    pub crawler_settle: Duration,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Service {
    Database,
    Crawler,
    Api,
    Frontend,
}

impl Service {
    pub const ALL: [Service; 4] = [
        Service::Database,
        Service::Crawler,
        Service::Api,
        Service::Frontend,
    ];

    /// The service that must be `Done` before this one may start.
    pub fn dependency(self) -> Option<Service> {
        match self {
            Service::Database => None,
            Service::Crawler | Service::Api => Some(Service::Database),
            Service::Frontend => Some(Service::Api),
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Service::Database => "Databases",
            Service::Crawler => "Crawler",
            Service::Api => "API",
            Service::Frontend => "Frontend",
        }
    }

    pub(crate) fn slot(self) -> usize {
        match self {
            Service::Database => 0,
            Service::Crawler => 1,
            Service::Api => 2,
            Service::Frontend => 3,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Status {
    #[default]
    Pending,
    Done,
}

/// The fixed menu of operator actions, in display order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    StartDatabase,
    StartCrawler,
    StartApi,
    StartFrontend,
    StopDatabase,
    Quit,
}

impl Action {
    pub const MENU: [Action; 6] = [
        Action::StartDatabase,
        Action::StartCrawler,
        Action::StartApi,
        Action::StartFrontend,
        Action::StopDatabase,
        Action::Quit,
    ];

    pub fn from_index(index: usize) -> Option<Action> {
        Self::MENU.get(index).copied()
    }

    pub fn index(self) -> usize {
        match self {
            Action::StartDatabase => 0,
            Action::StartCrawler => 1,
            Action::StartApi => 2,
            Action::StartFrontend => 3,
            Action::StopDatabase => 4,
            Action::Quit => 5,
        }
    }

    /// Service whose status this action moves to `Done` on success.
    pub fn target(self) -> Option<Service> {
        match self {
            Action::StartDatabase => Some(Service::Database),
            Action::StartCrawler => Some(Service::Crawler),
            Action::StartApi => Some(Service::Api),
            Action::StartFrontend => Some(Service::Frontend),
            Action::StopDatabase | Action::Quit => None,
        }
    }

    pub fn requires(self) -> Option<Service> {
        self.target().and_then(Service::dependency)
    }

    pub fn menu_label(self) -> &'static str {
        match self {
            Action::StartDatabase => "🚀 Start Databases (Docker)",
            Action::StartCrawler => "🕷️  Start Crawler (New Terminal)",
            Action::StartApi => "🔌 Start API Server",
            Action::StartFrontend => "💻 Start Frontend",
            Action::StopDatabase => "🛑 Stop Databases",
            Action::Quit => "🚪 Exit",
        }
    }

    pub fn loading_label(self) -> &'static str {
        match self {
            Action::StartDatabase => "Starting Databases",
            Action::StartCrawler => "Starting Crawler",
            Action::StartApi => "Starting API",
            Action::StartFrontend => "Starting Frontend",
            Action::StopDatabase => "Stopping Databases",
            Action::Quit => "Exiting",
        }
    }

    pub fn progress_message(self) -> &'static str {
        match self {
            Action::StartDatabase => "Starting databases...",
            Action::StartCrawler => "Opening Crawler terminal...",
            Action::StartApi => "Starting API process...",
            Action::StartFrontend => "Starting Frontend process...",
            Action::StopDatabase => "Stopping databases...",
            Action::Quit => "Shutting down...",
        }
    }

    /// Prefix for failure messages, e.g. "Error starting API".
    pub fn failure_prefix(self) -> &'static str {
        match self {
            Action::StartDatabase => "Error starting DB",
            Action::StartCrawler => "Error starting Crawler",
            Action::StartApi => "Error starting API",
            Action::StartFrontend => "Error starting Frontend",
            Action::StopDatabase => "Error stopping DB",
            Action::Quit => "Error exiting",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadingView {
    pub index: usize,
    pub label: &'static str,
}

/// Read-only snapshot of controller state handed to presentation layers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControllerView {
    pub statuses: [Status; 4],
    pub loading: Option<LoadingView>,
    pub cursor: usize,
    pub message: String,
    pub api_pid: Option<u32>,
    pub frontend_pid: Option<u32>,
}

impl ControllerView {
    pub fn status(&self, service: Service) -> Status {
        self.statuses[service.slot()]
    }

    /// Whether a menu item is selectable and whether its service is already `Done`.
    pub fn item_state(&self, index: usize) -> (bool, bool) {
        let Some(action) = Action::from_index(index) else {
            return (false, false);
        };
        let enabled = action
            .requires()
            .map_or(true, |dep| self.status(dep) == Status::Done);
        let done = action
            .target()
            .is_some_and(|svc| self.status(svc) == Status::Done);
        (enabled, done)
    }
}

/// Events emitted by the controller and consumed by presentation layers.
#[derive(Debug, Clone)]
pub enum UiEvent {
    State(Box<ControllerView>),
    Exited,
}
