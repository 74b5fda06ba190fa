//! Application-level orchestration.
//!
//! This module owns the harvest request lifecycle (submit/reset/auto-dismiss), the
//! roster merge, and post-harvest processing such as exports. UI/CLI layers call
//! into this module to keep responsibilities separated.

mod controller;
mod merge;
mod post_process;

pub(crate) use controller::{run_controller, ControllerCommand};
#[cfg(test)]
pub(crate) use controller::ControllerSnapshot;
pub(crate) use merge::Roster;
pub(crate) use post_process::process_harvest_completion;
