//! Implementation of the `research-swarm layers` command.

use anyhow::{Context, Result};
use clap::Args;
use serde::Serialize;
use std::path::{Path, PathBuf};

use crate::cli::output::{output, CommandOutput, TableFormatter};
use crate::domain::models::{PlanFile, TaskGraph};

#[derive(Args, Debug)]
pub struct LayersArgs {
    /// Plan file (YAML or JSON)
    pub plan: PathBuf,
}

#[derive(Debug, Serialize)]
pub struct LayersOutput {
    pub layers: Vec<Vec<String>>,
    #[serde(skip)]
    graph: TaskGraph,
}

impl CommandOutput for LayersOutput {
    fn to_human(&self) -> String {
        format!(
            "{}\n{} task(s) in {} layer(s)",
            TableFormatter::new().format_layers(&self.graph, &self.layers),
            self.graph.len(),
            self.layers.len()
        )
    }
}

/// Read and validate a plan file into a task graph.
pub async fn load_plan(path: &Path) -> Result<TaskGraph> {
    let raw = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("Failed to read plan {}", path.display()))?;
    let graph = PlanFile::parse(&raw)
        .and_then(PlanFile::into_graph)
        .with_context(|| format!("Invalid plan {}", path.display()))?;
    Ok(graph)
}

pub async fn execute(args: LayersArgs, json_mode: bool) -> Result<()> {
    let graph = load_plan(&args.plan).await?;
    let layers = graph
        .get_topological_layers()
        .context("Plan cannot be scheduled")?;
    output(&LayersOutput { layers, graph }, json_mode);
    Ok(())
}
