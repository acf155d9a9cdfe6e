//! Implementation of the `research-swarm plan` command.

use anyhow::{Context, Result};
use clap::Args;
use std::path::PathBuf;

use crate::domain::models::PlanFile;
use crate::services::{ResearchOutline, TaskGraphBuilder};

#[derive(Args, Debug)]
pub struct PlanArgs {
    /// Research outline (YAML or JSON) with perspectives and sub-questions
    pub outline: PathBuf,

    /// Write the plan here instead of stdout
    #[arg(long, short)]
    pub output: Option<PathBuf>,
}

pub async fn execute(args: PlanArgs, json_mode: bool) -> Result<()> {
    let raw = tokio::fs::read_to_string(&args.outline)
        .await
        .with_context(|| format!("Failed to read outline {}", args.outline.display()))?;
    let outline = ResearchOutline::parse(&raw).context("Invalid research outline")?;
    let graph = TaskGraphBuilder::build(&outline)?;

    let mut plan = PlanFile::from(&graph);
    if !outline.query.is_empty() {
        plan.topic = Some(outline.query.clone());
    }

    let rendered = if json_mode {
        serde_json::to_string_pretty(&plan)?
    } else {
        serde_yaml::to_string(&plan)?
    };

    match args.output {
        Some(path) => {
            tokio::fs::write(&path, rendered)
                .await
                .with_context(|| format!("Failed to write plan {}", path.display()))?;
            if !json_mode {
                println!("Wrote {} task(s) to {}", graph.len(), path.display());
            }
        }
        None => println!("{rendered}"),
    }
    Ok(())
}
