//! Implementation of the `research-swarm run` command.

use anyhow::{Context, Result};
use clap::Args;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{info, warn};

use super::layers::load_plan;
use crate::cli::output::progress::{create_progress_bar, create_spinner, track_run, ProgressBarExt};
use crate::cli::output::{output, CommandOutput, TableFormatter};
use crate::cli::service::Pipeline;
use crate::domain::models::{Config, GraphStatistics, KnowledgeGraph, TaskGraph};
use crate::services::{run_conflict_resolution, ConflictReport, EventBus, SwarmReport};

#[derive(Args, Debug)]
pub struct RunArgs {
    /// Plan file (YAML or JSON)
    pub plan: PathBuf,

    /// Schedule the plan without calling any external service
    #[arg(long)]
    pub dry_run: bool,

    /// Skip conflict detection and resolution after the run
    #[arg(long)]
    pub skip_conflicts: bool,

    /// Write the final knowledge graph as JSON
    #[arg(long)]
    pub knowledge_out: Option<PathBuf>,
}

#[derive(Debug, Serialize)]
pub struct RunOutput {
    pub report: SwarmReport,
    pub knowledge: GraphStatistics,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub conflicts: Option<ConflictReport>,
    #[serde(skip)]
    graph: TaskGraph,
}

impl CommandOutput for RunOutput {
    fn to_human(&self) -> String {
        let formatter = TableFormatter::new();
        let mut sections = vec![
            formatter.format_tasks(&self.graph),
            formatter.format_report(&self.report),
            format!(
                "Knowledge graph: {} node(s), {} edge(s)",
                self.knowledge.total_nodes, self.knowledge.total_edges
            ),
        ];
        if let Some(conflicts) = &self.conflicts {
            if conflicts.conflicts.is_empty() {
                sections.push("No conflicts detected".to_string());
            } else {
                sections.push(formatter.format_conflicts(&conflicts.conflicts));
                sections.push(format!(
                    "Conflicts: {} resolved, {} by fallback, {} unresolved",
                    conflicts.resolved, conflicts.fallback, conflicts.unresolved
                ));
            }
        }
        sections.join("\n\n")
    }
}

pub async fn execute(args: RunArgs, config: &Config, json_mode: bool) -> Result<()> {
    let graph = load_plan(&args.plan).await?;
    let total = graph.len() as u64;

    let event_bus = Arc::new(EventBus::default());
    let pipeline = if args.dry_run {
        Pipeline::dry_run(config, Arc::clone(&event_bus))
    } else {
        Pipeline::connect(config, Arc::clone(&event_bus)).await?
    };

    let progress = track_run(create_progress_bar(total, json_mode), event_bus.subscribe());
    let graph = Arc::new(RwLock::new(graph));
    let report = pipeline
        .coordinator
        .run(Arc::clone(&graph))
        .await
        .context("Plan cannot be executed")?;

    let pb = progress.await.context("Progress listener stopped unexpectedly")?;
    if report.is_clean() {
        pb.finish_success(format!("{} task(s) completed", report.completed));
    } else {
        pb.finish_warning(format!(
            "{} completed, {} failed, {} skipped",
            report.completed, report.failed, report.skipped
        ));
    }

    let conflicts = match (&pipeline.detector, &pipeline.resolver) {
        (Some(detector), Some(resolver)) if !args.skip_conflicts => {
            let spinner = create_spinner("Checking consistency", json_mode);
            let conflict_report =
                run_conflict_resolution(detector, resolver, &pipeline.knowledge, &pipeline.event_bus)
                    .await?;
            spinner.finish_success(format!("{} conflict(s)", conflict_report.conflicts.len()));
            Some(conflict_report)
        }
        _ => None,
    };

    if let Some(path) = &args.knowledge_out {
        write_knowledge(&pipeline.knowledge, path).await?;
        info!(path = %path.display(), "knowledge graph written");
    }

    if !report.is_clean() {
        warn!(failed = report.failed, skipped = report.skipped, "run finished with incomplete tasks");
    }

    let knowledge = pipeline.knowledge.read().await.statistics();
    let graph = graph.read().await.clone();
    output(
        &RunOutput {
            report,
            knowledge,
            conflicts,
            graph,
        },
        json_mode,
    );
    Ok(())
}

async fn write_knowledge(knowledge: &RwLock<KnowledgeGraph>, path: &Path) -> Result<()> {
    let rendered = serde_json::to_string_pretty(&*knowledge.read().await)?;
    tokio::fs::write(path, rendered)
        .await
        .with_context(|| format!("Failed to write knowledge graph {}", path.display()))
}
