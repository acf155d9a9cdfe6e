//! Container sandbox driven through a docker-compatible CLI.
//!
//! Every execution gets a fresh, uniquely named container with networking
//! disabled and memory/CPU caps. Source code is streamed over stdin so
//! nothing from the host filesystem is mounted.

use async_trait::async_trait;
use std::time::Duration;
use tokio::process::Command;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::detector::probe_runtime;
use super::process::{SupervisedProcess, Waited};
use crate::domain::models::{ExecutionResult, SandboxConfig, NO_EXIT_CODE};
use crate::domain::ports::Sandbox;

/// Seconds the runtime gets to stop a container before it is removed.
const STOP_TIMEOUT_SECS: u64 = 2;

/// Extra time the CLI gets beyond the execution timeout, covering container
/// startup.
const STARTUP_ALLOWANCE: Duration = Duration::from_secs(5);

#[derive(Debug, Clone)]
pub struct ContainerSandbox {
    runtime: String,
    image: String,
    interpreter: String,
    memory_limit: String,
    cpu_limit: f64,
}

impl ContainerSandbox {
    pub fn from_config(config: &SandboxConfig) -> Self {
        Self {
            runtime: config.runtime.clone(),
            image: config.image.clone(),
            interpreter: config.interpreter.clone(),
            memory_limit: config.memory_limit.clone(),
            cpu_limit: config.cpu_limit,
        }
    }

    /// Build a container sandbox if the runtime answers its probe.
    pub async fn connect(config: &SandboxConfig) -> Option<Self> {
        let probe_timeout = Duration::from_secs(config.probe_timeout_secs);
        if probe_runtime(&config.runtime, probe_timeout).await {
            Some(Self::from_config(config))
        } else {
            None
        }
    }

    /// Arguments for `run`, up to and including the image name.
    pub(crate) fn run_args(&self, name: &str, interactive: bool) -> Vec<String> {
        let mut args = vec![
            "run".to_string(),
            "--rm".to_string(),
            "--name".to_string(),
            name.to_string(),
            "--network".to_string(),
            "none".to_string(),
            "--memory".to_string(),
            self.memory_limit.clone(),
            "--cpus".to_string(),
            self.cpu_limit.to_string(),
        ];
        if interactive {
            args.push("-i".to_string());
        }
        args.push(self.image.clone());
        args
    }

    async fn run(&self, extra: &[&str], stdin: Option<&str>, timeout: Duration) -> ExecutionResult {
        let name = format!("sandbox-{}", Uuid::new_v4().simple());
        let mut cmd = Command::new(&self.runtime);
        cmd.args(self.run_args(&name, stdin.is_some())).args(extra);

        debug!(container = %name, image = %self.image, "starting container");

        let mut process = match SupervisedProcess::spawn(&mut cmd, stdin).await {
            Ok(process) => process,
            Err(e) => {
                warn!(error = %e, runtime = %self.runtime, "failed to start container");
                return ExecutionResult::startup_failure(e.to_string());
            }
        };

        let grace = Duration::from_secs(STOP_TIMEOUT_SECS);
        match process.wait_for(timeout + STARTUP_ALLOWANCE).await {
            Waited::Exited(status) => {
                let (stdout, stderr) = process.into_output(grace).await;
                ExecutionResult::completed(stdout, stderr, status.code().unwrap_or(NO_EXIT_CODE))
            }
            Waited::Failed(e) => {
                self.remove(&name).await;
                ExecutionResult::startup_failure(e.to_string())
            }
            Waited::TimedOut => {
                warn!(container = %name, "container timed out, stopping");
                self.stop(&name).await;
                process.reap(grace).await;
                self.remove(&name).await;
                let (stdout, _) = process.into_output(grace).await;
                ExecutionResult::timed_out(timeout, stdout)
            }
        }
    }

    async fn stop(&self, name: &str) {
        let result = Command::new(&self.runtime)
            .args(["stop", "--time", &STOP_TIMEOUT_SECS.to_string(), name])
            .output()
            .await;
        if let Err(e) = result {
            warn!(container = %name, error = %e, "failed to stop container");
        }
    }

    async fn remove(&self, name: &str) {
        let result = Command::new(&self.runtime)
            .args(["rm", "--force", name])
            .output()
            .await;
        match result {
            Ok(output) if output.status.success() => info!(container = %name, "container removed"),
            // --rm usually wins the race
            Ok(_) => debug!(container = %name, "container already gone"),
            Err(e) => warn!(container = %name, error = %e, "failed to remove container"),
        }
    }
}

#[async_trait]
impl Sandbox for ContainerSandbox {
    fn name(&self) -> &'static str {
        "container"
    }

    async fn execute_code(&self, source: &str, timeout: Duration) -> ExecutionResult {
        self.run(&[self.interpreter.as_str(), "-"], Some(source), timeout)
            .await
    }

    async fn execute_shell(&self, command: &str, timeout: Duration) -> ExecutionResult {
        self.run(&["sh", "-c", command], None, timeout).await
    }
}
