//! Dependency graph of research tasks.
//!
//! Tasks are stored by id with a derived adjacency map from each task to the
//! tasks that depend on it. Layering uses Kahn's algorithm one frontier at a
//! time so that every layer only depends on earlier layers.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{HashMap, HashSet};

use super::task::{Task, TaskProgress, TaskStatus};
use crate::domain::errors::{DomainError, DomainResult};

/// Raw outcome of layering: the layers produced plus how many tasks were
/// emitted. `emitted < total` means the remainder sits on a cycle.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LayerPartition {
    pub layers: Vec<Vec<String>>,
    pub emitted: usize,
    pub total: usize,
}

impl LayerPartition {
    pub const fn has_cycle(&self) -> bool {
        self.emitted < self.total
    }
}

/// Directed acyclic graph of tasks.
#[derive(Debug, Clone, Default)]
pub struct TaskGraph {
    tasks: HashMap<String, Task>,
    /// dependency id -> ids of tasks that depend on it
    dependents: HashMap<String, Vec<String>>,
    /// Insertion order, used to keep layers deterministic.
    order: Vec<String>,
}

impl TaskGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a graph from a list of tasks and validate it.
    pub fn from_tasks(tasks: impl IntoIterator<Item = Task>) -> DomainResult<Self> {
        let mut graph = Self::new();
        for task in tasks {
            graph.add_task(task)?;
        }
        graph.validate()?;
        graph.ensure_undispatched()?;
        Ok(graph)
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.tasks.contains_key(id)
    }

    pub fn get_task(&self, id: &str) -> Option<&Task> {
        self.tasks.get(id)
    }

    pub fn get_task_mut(&mut self, id: &str) -> Option<&mut Task> {
        self.tasks.get_mut(id)
    }

    fn task_mut(&mut self, id: &str) -> DomainResult<&mut Task> {
        self.tasks
            .get_mut(id)
            .ok_or_else(|| DomainError::TaskNotFound(id.to_string()))
    }

    /// Tasks in insertion order.
    pub fn tasks(&self) -> impl Iterator<Item = &Task> {
        self.order.iter().filter_map(|id| self.tasks.get(id))
    }

    /// Ids of tasks that declared `id` as a dependency.
    pub fn dependents_of(&self, id: &str) -> &[String] {
        self.dependents.get(id).map_or(&[], Vec::as_slice)
    }

    /// Insert a task and register it as a dependent of each declared
    /// dependency. Dependencies are not required to exist yet; see
    /// [`TaskGraph::validate`].
    pub fn add_task(&mut self, task: Task) -> DomainResult<()> {
        if self.tasks.contains_key(&task.id) {
            return Err(DomainError::ValidationFailed(format!(
                "duplicate task id: {}",
                task.id
            )));
        }
        for dep in &task.dependencies {
            let entry = self.dependents.entry(dep.clone()).or_default();
            if !entry.contains(&task.id) {
                entry.push(task.id.clone());
            }
        }
        self.dependents.entry(task.id.clone()).or_default();
        self.order.push(task.id.clone());
        self.tasks.insert(task.id.clone(), task);
        Ok(())
    }

    /// Append a task while the graph is live. Every dependency must already
    /// exist so the new edges cannot introduce a cycle.
    pub fn add_dynamic_task(&mut self, task: Task) -> DomainResult<()> {
        if let Some(missing) = task.dependencies.iter().find(|d| !self.contains(d)) {
            return Err(DomainError::MissingDependency {
                task_id: task.id.clone(),
                dependency_id: missing.clone(),
            });
        }
        self.add_task(task)
    }

    /// Add an edge `task_id` depends on `depends_on_id`. Duplicate edges are
    /// ignored.
    pub fn add_dependency(&mut self, task_id: &str, depends_on_id: &str) -> DomainResult<()> {
        if !self.contains(depends_on_id) {
            return Err(DomainError::TaskNotFound(depends_on_id.to_string()));
        }
        let task = self.task_mut(task_id)?;
        if task.dependencies.iter().any(|d| d == depends_on_id) {
            return Ok(());
        }
        task.dependencies.push(depends_on_id.to_string());
        self.dependents
            .entry(depends_on_id.to_string())
            .or_default()
            .push(task_id.to_string());
        Ok(())
    }

    /// Pending tasks whose dependencies have all completed, most urgent first.
    pub fn get_ready_tasks(&self) -> Vec<&Task> {
        let completed: HashSet<&str> = self
            .tasks
            .values()
            .filter(|t| t.status == TaskStatus::Completed)
            .map(|t| t.id.as_str())
            .collect();

        let mut ready: Vec<&Task> = self
            .tasks()
            .filter(|t| t.status == TaskStatus::Pending)
            .filter(|t| t.dependencies.iter().all(|d| completed.contains(d.as_str())))
            .collect();
        ready.sort_by_key(|t| t.priority);
        ready
    }

    /// Layered Kahn's algorithm. In-degree only counts dependencies that
    /// exist in the graph; missing ones are reported by `validate`.
    pub fn layer_partition(&self) -> LayerPartition {
        let mut in_degree: HashMap<&str, usize> = self
            .tasks
            .values()
            .map(|t| {
                let known = t
                    .dependencies
                    .iter()
                    .filter(|d| self.tasks.contains_key(d.as_str()))
                    .collect::<HashSet<_>>()
                    .len();
                (t.id.as_str(), known)
            })
            .collect();

        let mut frontier: Vec<&str> = self
            .order
            .iter()
            .map(String::as_str)
            .filter(|id| in_degree.get(id) == Some(&0))
            .collect();

        let mut layers = Vec::new();
        let mut emitted = 0;

        while !frontier.is_empty() {
            self.sort_layer(&mut frontier);
            emitted += frontier.len();

            let mut next = Vec::new();
            for id in &frontier {
                for dependent in self.dependents_of(id) {
                    if let Some(degree) = in_degree.get_mut(dependent.as_str()) {
                        *degree = degree.saturating_sub(1);
                        if *degree == 0 {
                            next.push(dependent.as_str());
                        }
                    }
                }
            }

            layers.push(frontier.iter().map(|id| (*id).to_string()).collect());
            frontier = next;
        }

        LayerPartition {
            layers,
            emitted,
            total: self.tasks.len(),
        }
    }

    /// Priority first, then insertion order.
    fn sort_layer(&self, layer: &mut [&str]) {
        let position: HashMap<&str, usize> = self
            .order
            .iter()
            .enumerate()
            .map(|(i, id)| (id.as_str(), i))
            .collect();
        layer.sort_by_key(|id| {
            (
                self.tasks.get(*id).map_or(0, |t| t.priority),
                position.get(id).copied().unwrap_or(usize::MAX),
            )
        });
    }

    /// Topological layers, or `DependencyCycle` naming every task that could
    /// not be scheduled.
    pub fn get_topological_layers(&self) -> DomainResult<Vec<Vec<String>>> {
        let partition = self.layer_partition();
        if partition.has_cycle() {
            let emitted: HashSet<&String> = partition.layers.iter().flatten().collect();
            let stuck = self
                .order
                .iter()
                .filter(|id| !emitted.contains(id))
                .cloned()
                .collect();
            return Err(DomainError::DependencyCycle(stuck));
        }
        Ok(partition.layers)
    }

    /// Check that every dependency exists and the graph is acyclic.
    pub fn validate(&self) -> DomainResult<()> {
        for task in self.tasks() {
            if let Some(missing) = task.dependencies.iter().find(|d| !self.contains(d)) {
                return Err(DomainError::MissingDependency {
                    task_id: task.id.clone(),
                    dependency_id: missing.clone(),
                });
            }
        }
        self.get_topological_layers().map(|_| ())
    }

    /// Check that no task has started or carries results yet.
    pub fn ensure_undispatched(&self) -> DomainResult<()> {
        if let Some(task) = self
            .tasks()
            .find(|t| t.status != TaskStatus::Pending || !t.results.is_empty())
        {
            return Err(DomainError::ValidationFailed(format!(
                "task {} is {} before dispatch",
                task.id, task.status
            )));
        }
        Ok(())
    }

    pub fn get_progress(&self) -> TaskProgress {
        let mut progress = TaskProgress {
            total: self.tasks.len(),
            ..TaskProgress::default()
        };
        for task in self.tasks.values() {
            match task.status {
                TaskStatus::Completed => progress.completed += 1,
                TaskStatus::Failed => progress.failed += 1,
                TaskStatus::Running => progress.running += 1,
                TaskStatus::Pending => {}
            }
        }
        progress.pending =
            progress.total - progress.completed - progress.failed - progress.running;
        progress
    }

    pub fn mark_running(&mut self, id: &str) -> DomainResult<()> {
        self.task_mut(id)?.mark_running()
    }

    pub fn mark_completed(&mut self, id: &str, results: Vec<Value>) -> DomainResult<()> {
        self.task_mut(id)?.mark_completed(results)
    }

    pub fn mark_failed(&mut self, id: &str, reason: impl Into<String>) -> DomainResult<()> {
        self.task_mut(id)?.mark_failed(reason)
    }
}

/// On-disk description of a task graph.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PlanFile {
    #[serde(default)]
    pub topic: Option<String>,
    pub tasks: Vec<Task>,
}

impl PlanFile {
    /// Parse YAML or JSON. JSON is a subset of YAML so one parser covers both.
    pub fn parse(raw: &str) -> DomainResult<Self> {
        Ok(serde_yaml::from_str(raw)?)
    }

    pub fn into_graph(self) -> DomainResult<TaskGraph> {
        TaskGraph::from_tasks(self.tasks)
    }
}

impl From<&TaskGraph> for PlanFile {
    fn from(graph: &TaskGraph) -> Self {
        Self {
            topic: None,
            tasks: graph.tasks().cloned().collect(),
        }
    }
}
