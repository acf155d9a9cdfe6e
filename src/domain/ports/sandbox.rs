//! Isolated execution port.
//!
//! Implementations never return an error: startup failures, timeouts and
//! non-zero exits are all reported through [`ExecutionResult`].

use async_trait::async_trait;
use std::time::Duration;

use crate::domain::models::ExecutionResult;

#[async_trait]
pub trait Sandbox: Send + Sync {
    /// `"container"` or `"process"`.
    fn name(&self) -> &'static str;

    /// Run a source program with the configured interpreter.
    async fn execute_code(&self, source: &str, timeout: Duration) -> ExecutionResult;

    /// Run a command line through `sh -c`.
    async fn execute_shell(&self, command: &str, timeout: Duration) -> ExecutionResult;
}
