//! Progress bars for the `run` command
//!
//! The bar is driven by the event bus: every task completion or failure
//! advances it by one, and tasks skipped because a dependency failed are
//! accounted for when the run ends.

use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use std::time::Duration;
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::task::JoinHandle;

use crate::services::{EventPayload, UnifiedEvent};

const PROGRESS_TEMPLATE: &str =
    "[{elapsed_precise}] {bar:40.cyan/blue} {pos}/{len} {msg}";
const SPINNER_TEMPLATE: &str = "[{elapsed_precise}] {spinner:.green} {msg}";

const PROGRESS_CHARS: &str = "█▓▒░ ";
const SPINNER_CHARS: &str = "⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏";

/// Progress bar over `total` tasks. Hidden when `hidden` is set, which
/// keeps `--json` output clean.
pub fn create_progress_bar(total: u64, hidden: bool) -> ProgressBar {
    let pb = ProgressBar::new(total);
    if hidden {
        pb.set_draw_target(ProgressDrawTarget::hidden());
        return pb;
    }
    let style = ProgressStyle::default_bar()
        .template(PROGRESS_TEMPLATE)
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars(PROGRESS_CHARS);
    pb.set_style(style);
    pb.enable_steady_tick(Duration::from_millis(100));
    pb
}

/// Spinner for steps of unknown length, such as conflict resolution.
pub fn create_spinner(message: impl Into<String>, hidden: bool) -> ProgressBar {
    let spinner = ProgressBar::new_spinner();
    if hidden {
        spinner.set_draw_target(ProgressDrawTarget::hidden());
    } else {
        let style = ProgressStyle::default_spinner()
            .template(SPINNER_TEMPLATE)
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_chars(SPINNER_CHARS);
        spinner.set_style(style);
        spinner.enable_steady_tick(Duration::from_millis(80));
    }
    spinner.set_message(message.into());
    spinner
}

pub trait ProgressBarExt {
    fn finish_success(&self, message: impl Into<String>);

    fn finish_warning(&self, message: impl Into<String>);
}

impl ProgressBarExt for ProgressBar {
    fn finish_success(&self, message: impl Into<String>) {
        self.finish_with_message(format!("✓ {}", message.into()));
    }

    fn finish_warning(&self, message: impl Into<String>) {
        self.finish_with_message(format!("! {}", message.into()));
    }
}

/// Advance `pb` from task events until the run completes or the bus closes.
pub fn track_run(pb: ProgressBar, mut rx: broadcast::Receiver<UnifiedEvent>) -> JoinHandle<ProgressBar> {
    tokio::spawn(async move {
        loop {
            match rx.recv().await {
                Ok(event) => match event.payload {
                    EventPayload::LayerStarted { layer, task_count } => {
                        pb.set_message(format!("layer {layer}: {task_count} task(s)"));
                    }
                    EventPayload::TaskCompleted { .. } | EventPayload::TaskFailed { .. } => {
                        pb.inc(1);
                    }
                    EventPayload::RunCompleted { .. } => break,
                    _ => {}
                },
                Err(RecvError::Lagged(missed)) => {
                    tracing::debug!(missed, "progress listener lagged");
                }
                Err(RecvError::Closed) => break,
            }
        }
        pb
    })
}
