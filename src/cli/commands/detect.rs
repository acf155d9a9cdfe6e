//! Implementation of the `research-swarm detect` command.

use anyhow::Result;
use clap::Args;
use serde::Serialize;

use crate::cli::output::{output, CommandOutput};
use crate::domain::models::{Config, SandboxMode};
use crate::infrastructure::sandbox::detect;

#[derive(Args, Debug)]
pub struct DetectArgs {}

#[derive(Debug, Serialize)]
pub struct DetectOutput {
    pub configured: SandboxMode,
    pub selected: SandboxMode,
    pub runtime: String,
    pub image: String,
    pub interpreter: String,
}

impl CommandOutput for DetectOutput {
    fn to_human(&self) -> String {
        let mut lines = vec![format!("Sandbox: {}", mode_label(self.selected))];
        match self.selected {
            SandboxMode::Container => {
                lines.push(format!("  Runtime: {}", self.runtime));
                lines.push(format!("  Image:   {}", self.image));
            }
            _ => lines.push(format!("  Interpreter: {}", self.interpreter)),
        }
        if self.configured == SandboxMode::Container && self.selected != SandboxMode::Container {
            lines.push(format!(
                "  Note: container mode requested but {} is not reachable",
                self.runtime
            ));
        }
        lines.join("\n")
    }
}

const fn mode_label(mode: SandboxMode) -> &'static str {
    match mode {
        SandboxMode::Auto => "auto",
        SandboxMode::Container => "container",
        SandboxMode::Process => "process",
    }
}

pub async fn execute(_args: DetectArgs, config: &Config, json_mode: bool) -> Result<()> {
    let selected = detect(&config.sandbox).await;
    let result = DetectOutput {
        configured: config.sandbox.mode,
        selected,
        runtime: config.sandbox.runtime.clone(),
        image: config.sandbox.image.clone(),
        interpreter: config.sandbox.interpreter.clone(),
    };
    output(&result, json_mode);
    Ok(())
}
