use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Exit code reported when the process never produced one.
pub const NO_EXIT_CODE: i32 = -1;

/// Outcome of one sandboxed execution.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionResult {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: i32,
    pub timed_out: bool,
    /// Set only when the process could not be started at all.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ExecutionResult {
    pub fn completed(stdout: impl Into<String>, stderr: impl Into<String>, exit_code: i32) -> Self {
        Self {
            stdout: stdout.into(),
            stderr: stderr.into(),
            exit_code,
            timed_out: false,
            error: None,
        }
    }

    pub fn timed_out(timeout: Duration, stdout: impl Into<String>) -> Self {
        Self {
            stdout: stdout.into(),
            stderr: format!("Process timed out after {}s", timeout.as_secs_f64()),
            exit_code: NO_EXIT_CODE,
            timed_out: true,
            error: None,
        }
    }

    pub fn startup_failure(error: impl Into<String>) -> Self {
        Self {
            stdout: String::new(),
            stderr: String::new(),
            exit_code: NO_EXIT_CODE,
            timed_out: false,
            error: Some(error.into()),
        }
    }

    pub const fn is_success(&self) -> bool {
        self.exit_code == 0 && !self.timed_out && self.error.is_none()
    }
}
