//! Application-level orchestration utilities.
//!
//! This module owns batch lifecycle control (start/cancel) and post-batch processing
//! such as history recording and folder memory. CLI layers call into this module to
//! keep responsibilities separated.

mod controller;
mod post_process;

pub(crate) use controller::{run_controller, UiCommand};
pub(crate) use post_process::process_batch_completion;
