//! Table output formatting for CLI commands
//!
//! Tasks, layers and conflict reports rendered with comfy-table. Colors are
//! dropped for `NO_COLOR` and dumb terminals and replaced with status icons.

use comfy_table::{presets, Attribute, Cell, Color, ContentArrangement, Table};
use std::env;

use super::truncate;
use crate::domain::models::{Conflict, ResolutionOutcome, Severity, TaskGraph, TaskStatus};
use crate::services::SwarmReport;

pub struct TableFormatter {
    use_colors: bool,
    max_width: Option<u16>,
}

impl TableFormatter {
    pub fn new() -> Self {
        Self {
            use_colors: supports_color(),
            max_width: None,
        }
    }

    pub const fn with_config(use_colors: bool, max_width: Option<u16>) -> Self {
        Self {
            use_colors,
            max_width,
        }
    }

    /// One row per task, grouped by layer. `layers` comes from
    /// [`TaskGraph::get_topological_layers`].
    pub fn format_layers(&self, graph: &TaskGraph, layers: &[Vec<String>]) -> String {
        let mut table = self.create_base_table();
        table.set_header(header(&["Layer", "ID", "Kind", "Priority", "Depends On", "Query"]));

        for (index, layer) in layers.iter().enumerate() {
            for id in layer {
                let Some(task) = graph.get_task(id) else {
                    continue;
                };
                let deps = if task.dependencies.is_empty() {
                    "-".to_string()
                } else {
                    task.dependencies.join(", ")
                };
                table.add_row(vec![
                    Cell::new(index),
                    Cell::new(truncate(&task.id, 12)),
                    Cell::new(task.kind),
                    Cell::new(task.priority),
                    Cell::new(truncate(&deps, 30)),
                    Cell::new(truncate(&task.query, 50)),
                ]);
            }
        }

        table.to_string()
    }

    /// Final task states after a run.
    pub fn format_tasks(&self, graph: &TaskGraph) -> String {
        let mut table = self.create_base_table();
        table.set_header(header(&["ID", "Kind", "Status", "Results", "Query / Error"]));

        for task in graph.tasks() {
            let status_cell = if self.use_colors {
                Cell::new(task.status).fg(status_color(task.status))
            } else {
                Cell::new(format!("{} {}", status_icon(task.status), task.status))
            };
            let detail = task.error().unwrap_or(&task.query);

            table.add_row(vec![
                Cell::new(truncate(&task.id, 12)),
                Cell::new(task.kind),
                status_cell,
                Cell::new(task.results.len()),
                Cell::new(truncate(detail, 50)),
            ]);
        }

        table.to_string()
    }

    pub fn format_report(&self, report: &SwarmReport) -> String {
        let mut table = self.create_base_table();
        table.set_header(header(&["Layers", "Total", "Completed", "Failed", "Skipped", "Duration"]));

        let failed = Cell::new(report.failed);
        let failed = if self.use_colors && report.failed > 0 {
            failed.fg(Color::Red)
        } else {
            failed
        };

        table.add_row(vec![
            Cell::new(report.layers),
            Cell::new(report.total),
            Cell::new(report.completed),
            failed,
            Cell::new(report.skipped),
            Cell::new(format!("{}ms", report.duration_ms)),
        ]);

        table.to_string()
    }

    pub fn format_conflicts(&self, conflicts: &[Conflict]) -> String {
        let mut table = self.create_base_table();
        table.set_header(header(&["Level", "Severity", "Nodes", "Outcome", "Winner", "Description"]));

        for conflict in conflicts {
            let severity = if self.use_colors {
                Cell::new(conflict.severity).fg(severity_color(conflict.severity))
            } else {
                Cell::new(conflict.severity)
            };
            let (outcome, winner) = conflict.resolution.as_ref().map_or_else(
                || ("-".to_string(), "-".to_string()),
                |r| {
                    (
                        outcome_label(r.outcome).to_string(),
                        r.winning_node_id.clone().unwrap_or_else(|| "-".to_string()),
                    )
                },
            );

            table.add_row(vec![
                Cell::new(conflict.level),
                severity,
                Cell::new(conflict.node_ids.len()),
                Cell::new(outcome),
                Cell::new(truncate(&winner, 12)),
                Cell::new(truncate(&conflict.description, 50)),
            ]);
        }

        table.to_string()
    }

    fn create_base_table(&self) -> Table {
        let mut table = Table::new();
        table
            .load_preset(presets::UTF8_FULL)
            .set_content_arrangement(ContentArrangement::Dynamic);

        if let Some(width) = self.max_width {
            table.set_width(width);
        }

        table
    }
}

impl Default for TableFormatter {
    fn default() -> Self {
        Self::new()
    }
}

fn header(names: &[&str]) -> Vec<Cell> {
    names
        .iter()
        .map(|name| Cell::new(name).add_attribute(Attribute::Bold))
        .collect()
}

fn supports_color() -> bool {
    if env::var("NO_COLOR").is_ok() {
        return false;
    }

    if let Ok(term) = env::var("TERM") {
        if term == "dumb" {
            return false;
        }
    }

    true
}

const fn status_color(status: TaskStatus) -> Color {
    match status {
        TaskStatus::Completed => Color::Green,
        TaskStatus::Running => Color::Cyan,
        TaskStatus::Failed => Color::Red,
        TaskStatus::Pending => Color::DarkGrey,
    }
}

const fn status_icon(status: TaskStatus) -> &'static str {
    match status {
        TaskStatus::Completed => "✓",
        TaskStatus::Running => "⟳",
        TaskStatus::Failed => "✗",
        TaskStatus::Pending => "○",
    }
}

const fn severity_color(severity: Severity) -> Color {
    match severity {
        Severity::Low => Color::White,
        Severity::Medium => Color::Yellow,
        Severity::High => Color::Magenta,
        Severity::Critical => Color::Red,
    }
}

const fn outcome_label(outcome: ResolutionOutcome) -> &'static str {
    match outcome {
        ResolutionOutcome::Resolved => "resolved",
        ResolutionOutcome::ResolvedFallback => "fallback",
        ResolutionOutcome::Unresolved => "unresolved",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::{Task, TaskKind};

    fn graph() -> TaskGraph {
        TaskGraph::from_tasks([
            Task::new("fetch", TaskKind::Retrieval, "solar output"),
            Task::new("debate", TaskKind::Discourse, "is solar viable").depends_on("fetch"),
        ])
        .unwrap()
    }

    #[test]
    fn test_layers_table_lists_every_task() {
        let graph = graph();
        let layers = graph.get_topological_layers().unwrap();
        let rendered = TableFormatter::with_config(false, None).format_layers(&graph, &layers);
        assert!(rendered.contains("fetch"));
        assert!(rendered.contains("debate"));
        assert!(rendered.contains("discourse"));
    }

    #[test]
    fn test_plain_status_uses_icons() {
        let rendered = TableFormatter::with_config(false, None).format_tasks(&graph());
        assert!(rendered.contains("○ pending"));
    }
}
