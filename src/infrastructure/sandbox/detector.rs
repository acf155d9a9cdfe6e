//! Sandbox selection.

use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;
use tokio::process::Command;
use tracing::{info, warn};

use super::container::ContainerSandbox;
use super::process::ProcessSandbox;
use crate::domain::models::{SandboxConfig, SandboxMode};
use crate::domain::ports::Sandbox;

/// Ask the container runtime whether its daemon is reachable. Any failure,
/// including a missing binary or a probe slower than `timeout`, is `false`.
pub async fn probe_runtime(runtime: &str, timeout: Duration) -> bool {
    let probe = Command::new(runtime)
        .arg("info")
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .kill_on_drop(true)
        .status();

    match tokio::time::timeout(timeout, probe).await {
        Ok(Ok(status)) => status.success(),
        Ok(Err(e)) => {
            info!(runtime, error = %e, "container runtime not available");
            false
        }
        Err(_) => {
            warn!(runtime, timeout_secs = timeout.as_secs(), "container runtime probe timed out");
            false
        }
    }
}

/// Mechanism actually selected for a configuration.
pub async fn detect(config: &SandboxConfig) -> SandboxMode {
    match config.mode {
        SandboxMode::Process => SandboxMode::Process,
        SandboxMode::Auto | SandboxMode::Container => {
            let timeout = Duration::from_secs(config.probe_timeout_secs);
            if probe_runtime(&config.runtime, timeout).await {
                SandboxMode::Container
            } else {
                SandboxMode::Process
            }
        }
    }
}

/// Build the strongest sandbox the configuration allows. A requested
/// container runtime that fails its probe degrades to host processes.
pub async fn create_sandbox(config: &SandboxConfig) -> Arc<dyn Sandbox> {
    if config.mode != SandboxMode::Process {
        if let Some(container) = ContainerSandbox::connect(config).await {
            info!(runtime = %config.runtime, image = %config.image, "using container sandbox");
            return Arc::new(container);
        }
        if config.mode == SandboxMode::Container {
            warn!(runtime = %config.runtime, "container sandbox requested but unavailable, using processes");
        }
    }

    info!(interpreter = %config.interpreter, "using process sandbox");
    Arc::new(ProcessSandbox::from_config(config))
}
