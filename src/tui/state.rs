use crate::model::{ControllerView, LauncherConfig, Status};
use std::time::{Duration, Instant};

const SPINNER: [char; 4] = ['|', '/', '-', '\\'];
const SPIN_INTERVAL: Duration = Duration::from_millis(120);

/// Endpoints shown in the footer.
#[derive(Debug, Clone)]
pub struct Links {
    pub api: String,
    pub swagger: String,
    pub frontend: String,
}

impl Links {
    pub fn from_config(cfg: &LauncherConfig) -> Self {
        Self {
            api: cfg.api_base_url.clone(),
            swagger: cfg.swagger_url.clone(),
            frontend: cfg.frontend_url.clone(),
        }
    }
}

/// Owned by the UI thread only; the controller's view is replaced wholesale on every event.
pub struct UiState {
    pub view: ControllerView,
    pub links: Links,
    spinner: usize,
    last_spin: Instant,
}

impl UiState {
    pub fn new(links: Links) -> Self {
        Self {
            view: ControllerView {
                statuses: [Status::Pending; 4],
                loading: None,
                cursor: 0,
                message: String::new(),
                api_pid: None,
                frontend_pid: None,
            },
            links,
            spinner: 0,
            last_spin: Instant::now(),
        }
    }

    pub fn apply(&mut self, view: ControllerView) {
        if view.loading.is_none() {
            self.spinner = 0;
        }
        self.view = view;
    }

    /// Advance the spinner while something is loading. Returns whether the frame changed.
    pub fn tick(&mut self, now: Instant) -> bool {
        if self.view.loading.is_none() || now.duration_since(self.last_spin) < SPIN_INTERVAL {
            return false;
        }
        self.spinner = (self.spinner + 1) % SPINNER.len();
        self.last_spin = now;
        true
    }

    pub fn spinner_frame(&self) -> char {
        SPINNER[self.spinner]
    }

    pub fn is_loading(&self) -> bool {
        self.view.loading.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::LoadingView;

    fn links() -> Links {
        Links {
            api: "http://127.0.0.1:3202".into(),
            swagger: "http://127.0.0.1:3202/docs".into(),
            frontend: "http://127.0.0.1:3203".into(),
        }
    }

    #[test]
    fn spinner_only_turns_while_loading() {
        let mut state = UiState::new(links());
        let start = Instant::now();
        assert!(!state.tick(start + Duration::from_secs(1)));
        assert_eq!(state.spinner_frame(), '|');

        let mut view = state.view.clone();
        view.loading = Some(LoadingView {
            index: 2,
            label: "Starting API",
        });
        state.apply(view.clone());
        let t = state.last_spin;
        assert!(!state.tick(t + Duration::from_millis(50)));
        assert!(state.tick(t + Duration::from_millis(130)));
        assert_eq!(state.spinner_frame(), '/');

        view.loading = None;
        state.apply(view);
        assert_eq!(state.spinner_frame(), '|');
    }
}
