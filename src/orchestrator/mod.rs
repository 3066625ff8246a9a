//! Application-level orchestration.
//!
//! The state machine, the background unit for each action and the controller loop
//! that ties them to UI commands. Presentation layers only send [`UiCommand`]s and
//! render the views they get back.

mod actions;
mod controller;
mod state;

pub(crate) use controller::{initial_state, run_controller, UiCommand};
