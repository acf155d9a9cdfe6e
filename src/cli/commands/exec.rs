//! Implementation of the `research-swarm exec` command.

use anyhow::{Context, Result};
use clap::Args;
use serde::Serialize;
use std::path::PathBuf;
use std::time::Duration;

use crate::cli::output::{output, CommandOutput};
use crate::cli::service;
use crate::domain::models::{Config, ExecutionResult};

#[derive(Args, Debug)]
pub struct ExecArgs {
    /// Source file to run with the configured interpreter
    #[arg(required_unless_present = "shell", conflicts_with = "shell")]
    pub file: Option<PathBuf>,

    /// Shell command to run instead of a file
    #[arg(long)]
    pub shell: Option<String>,

    /// Timeout in seconds; defaults to the sandbox setting
    #[arg(long)]
    pub timeout: Option<u64>,
}

#[derive(Debug, Serialize)]
pub struct ExecOutput {
    pub sandbox: &'static str,
    #[serde(flatten)]
    pub result: ExecutionResult,
}

impl CommandOutput for ExecOutput {
    fn to_human(&self) -> String {
        let mut lines = Vec::new();
        if !self.result.stdout.is_empty() {
            lines.push(self.result.stdout.trim_end().to_string());
        }
        if !self.result.stderr.is_empty() {
            lines.push(format!("--- stderr ---\n{}", self.result.stderr.trim_end()));
        }
        if let Some(error) = &self.result.error {
            lines.push(format!("Failed to start: {error}"));
        }
        let status = if self.result.timed_out {
            "timed out".to_string()
        } else {
            format!("exit code {}", self.result.exit_code)
        };
        lines.push(format!("[{}] {status}", self.sandbox));
        lines.join("\n")
    }
}

pub async fn execute(args: ExecArgs, config: &Config, json_mode: bool) -> Result<()> {
    let timeout = Duration::from_secs(args.timeout.unwrap_or(config.sandbox.timeout_secs));
    let sandbox = service::sandbox(config).await;

    let result = match (&args.shell, &args.file) {
        (Some(command), _) => sandbox.execute_shell(command, timeout).await,
        (None, Some(path)) => {
            let source = tokio::fs::read_to_string(path)
                .await
                .with_context(|| format!("Failed to read {}", path.display()))?;
            sandbox.execute_code(&source, timeout).await
        }
        (None, None) => anyhow::bail!("Either a file or --shell is required"),
    };

    let success = result.is_success();
    output(
        &ExecOutput {
            sandbox: sandbox.name(),
            result,
        },
        json_mode,
    );
    if !success {
        anyhow::bail!("Execution did not succeed");
    }
    Ok(())
}
