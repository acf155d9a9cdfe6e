//! Layered execution of a task graph.
//!
//! Layers run strictly in order. Inside a layer every ready task is spawned
//! at once; external call volume is bounded by one semaphore per resource
//! class (retrieval and text generation). A task whose dependency failed
//! never becomes ready and is skipped.

use async_trait::async_trait;
use futures::future::join_all;
use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{RwLock, Semaphore};
use tracing::{error, info, instrument, warn};

use crate::domain::errors::DomainResult;
use crate::domain::models::{ConcurrencyConfig, KnowledgeGraph, Task, TaskGraph, TaskKind};
use crate::services::event_bus::{EventBus, EventPayload};

/// What a handler reports back for one task.
#[derive(Debug, Clone, PartialEq)]
pub enum TaskOutcome {
    Completed(Vec<Value>),
    Failed(String),
}

/// Shared state a handler may read and write.
#[derive(Clone)]
pub struct HandlerContext {
    pub knowledge: Arc<RwLock<KnowledgeGraph>>,
    pub event_bus: Arc<EventBus>,
}

impl HandlerContext {
    pub fn new(knowledge: Arc<RwLock<KnowledgeGraph>>, event_bus: Arc<EventBus>) -> Self {
        Self {
            knowledge,
            event_bus,
        }
    }

    /// Fresh, empty knowledge graph and event bus.
    pub fn detached() -> Self {
        Self::new(
            Arc::new(RwLock::new(KnowledgeGraph::new())),
            Arc::new(EventBus::default()),
        )
    }
}

#[async_trait]
pub trait TaskHandler: Send + Sync {
    async fn handle(&self, task: Task, ctx: HandlerContext) -> TaskOutcome;
}

/// Completes every task with no results.
pub struct PassThroughHandler;

#[async_trait]
impl TaskHandler for PassThroughHandler {
    async fn handle(&self, _task: Task, _ctx: HandlerContext) -> TaskOutcome {
        TaskOutcome::Completed(Vec::new())
    }
}

/// Kind → handler dispatch table with a pass-through default.
pub struct HandlerRegistry {
    handlers: HashMap<TaskKind, Arc<dyn TaskHandler>>,
    fallback: Arc<dyn TaskHandler>,
}

impl Default for HandlerRegistry {
    fn default() -> Self {
        Self {
            handlers: HashMap::new(),
            fallback: Arc::new(PassThroughHandler),
        }
    }
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(mut self, kind: TaskKind, handler: Arc<dyn TaskHandler>) -> Self {
        self.handlers.insert(kind, handler);
        self
    }

    pub fn handler_for(&self, kind: TaskKind) -> Arc<dyn TaskHandler> {
        self.handlers
            .get(&kind)
            .cloned()
            .unwrap_or_else(|| Arc::clone(&self.fallback))
    }

    pub fn is_registered(&self, kind: TaskKind) -> bool {
        self.handlers.contains_key(&kind)
    }
}

/// External resource a task kind draws on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceClass {
    Retrieval,
    Generation,
}

impl ResourceClass {
    pub const fn for_kind(kind: TaskKind) -> Option<Self> {
        match kind {
            TaskKind::Retrieval => Some(Self::Retrieval),
            TaskKind::Discourse | TaskKind::Verification => Some(Self::Generation),
            TaskKind::Synthesis => None,
        }
    }
}

/// Summary of one run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SwarmReport {
    pub layers: usize,
    pub total: usize,
    pub completed: usize,
    pub failed: usize,
    /// Tasks never dispatched because a dependency did not complete.
    pub skipped: usize,
    pub duration_ms: u64,
}

impl SwarmReport {
    pub const fn is_clean(&self) -> bool {
        self.failed == 0 && self.skipped == 0
    }
}

pub struct SwarmCoordinator {
    registry: HandlerRegistry,
    knowledge: Arc<RwLock<KnowledgeGraph>>,
    event_bus: Arc<EventBus>,
    retrieval_permits: Arc<Semaphore>,
    generation_permits: Arc<Semaphore>,
}

impl SwarmCoordinator {
    pub fn new(
        registry: HandlerRegistry,
        knowledge: Arc<RwLock<KnowledgeGraph>>,
        event_bus: Arc<EventBus>,
        limits: &ConcurrencyConfig,
    ) -> Self {
        Self {
            registry,
            knowledge,
            event_bus,
            retrieval_permits: Arc::new(Semaphore::new(limits.retrieval_limit.max(1))),
            generation_permits: Arc::new(Semaphore::new(limits.generation_limit.max(1))),
        }
    }

    pub fn knowledge(&self) -> Arc<RwLock<KnowledgeGraph>> {
        Arc::clone(&self.knowledge)
    }

    fn permits_for(&self, kind: TaskKind) -> Option<Arc<Semaphore>> {
        ResourceClass::for_kind(kind).map(|class| match class {
            ResourceClass::Retrieval => Arc::clone(&self.retrieval_permits),
            ResourceClass::Generation => Arc::clone(&self.generation_permits),
        })
    }

    /// Execute the graph layer by layer. Only a malformed graph (missing
    /// dependency or cycle) is an error; task failures are recorded on the
    /// tasks and the run carries on.
    #[instrument(skip_all)]
    pub async fn run(&self, graph: Arc<RwLock<TaskGraph>>) -> DomainResult<SwarmReport> {
        let started = Instant::now();
        let (layers, total) = {
            let graph = graph.read().await;
            graph.validate()?;
            graph.ensure_undispatched()?;
            (graph.get_topological_layers()?, graph.len())
        };

        let correlation = self.event_bus.start_correlation().await;
        info!(%correlation, total, layers = layers.len(), "swarm run started");
        self.event_bus
            .emit(EventPayload::RunStarted {
                total_tasks: total,
                layer_count: layers.len(),
            })
            .await;

        for (index, layer) in layers.iter().enumerate() {
            let layer_number = index + 1;
            self.run_layer(layer_number, layer, &graph).await?;

            let progress = graph.read().await.get_progress();
            self.event_bus
                .emit(EventPayload::Progress {
                    layer: layer_number,
                    progress,
                })
                .await;
        }

        let progress = graph.read().await.get_progress();
        let report = SwarmReport {
            layers: layers.len(),
            total,
            completed: progress.completed,
            failed: progress.failed,
            skipped: total - progress.completed - progress.failed - progress.running,
            duration_ms: u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX),
        };

        self.event_bus
            .emit(EventPayload::RunCompleted {
                completed: report.completed,
                failed: report.failed,
                skipped: report.skipped,
                duration_ms: report.duration_ms,
            })
            .await;
        self.event_bus.end_correlation().await;
        info!(
            completed = report.completed,
            failed = report.failed,
            skipped = report.skipped,
            duration_ms = report.duration_ms,
            "swarm run finished"
        );
        Ok(report)
    }

    async fn run_layer(
        &self,
        layer_number: usize,
        layer: &[String],
        graph: &Arc<RwLock<TaskGraph>>,
    ) -> DomainResult<()> {
        // Pick the ready tasks and mark them running in one critical section.
        let dispatched: Vec<Task> = {
            let mut graph = graph.write().await;
            let ready: Vec<String> = graph
                .get_ready_tasks()
                .into_iter()
                .filter(|t| layer.contains(&t.id))
                .map(|t| t.id.clone())
                .collect();
            let mut tasks = Vec::with_capacity(ready.len());
            for id in &ready {
                graph.mark_running(id)?;
                if let Some(task) = graph.get_task(id) {
                    tasks.push(task.clone());
                }
            }
            tasks
        };

        let skipped = layer.len() - dispatched.len();
        if skipped > 0 {
            warn!(layer = layer_number, skipped, "tasks skipped after failed dependencies");
        }
        self.event_bus
            .emit(EventPayload::LayerStarted {
                layer: layer_number,
                task_count: dispatched.len(),
            })
            .await;

        let ctx = HandlerContext::new(Arc::clone(&self.knowledge), Arc::clone(&self.event_bus));
        let mut handles = Vec::with_capacity(dispatched.len());
        for task in dispatched {
            self.event_bus
                .emit(EventPayload::TaskStarted {
                    task_id: task.id.clone(),
                    kind: task.kind.to_string(),
                    query: task.query.clone(),
                })
                .await;

            let task_id = task.id.clone();
            let handler = self.registry.handler_for(task.kind);
            let permits = self.permits_for(task.kind);
            let ctx = ctx.clone();
            let handle = tokio::spawn(async move {
                let _permit = match permits {
                    Some(semaphore) => match semaphore.acquire_owned().await {
                        Ok(permit) => Some(permit),
                        Err(_) => return TaskOutcome::Failed("resource limiter closed".to_string()),
                    },
                    None => None,
                };
                handler.handle(task, ctx).await
            });
            handles.push((task_id, handle));
        }

        let (ids, handles): (Vec<String>, Vec<_>) = handles.into_iter().unzip();
        let joined = join_all(handles).await;

        let mut succeeded = 0;
        let mut failed = 0;
        for (task_id, joined) in ids.into_iter().zip(joined) {
            let outcome = match joined {
                Ok(outcome) => outcome,
                Err(e) => {
                    error!(task_id = %task_id, error = %e, "task handler aborted");
                    TaskOutcome::Failed(format!("handler aborted: {e}"))
                }
            };

            match outcome {
                TaskOutcome::Completed(results) => {
                    let count = results.len();
                    graph.write().await.mark_completed(&task_id, results)?;
                    succeeded += 1;
                    self.event_bus
                        .emit(EventPayload::TaskCompleted {
                            task_id,
                            result_count: count,
                        })
                        .await;
                }
                TaskOutcome::Failed(reason) => {
                    warn!(task_id = %task_id, reason = %reason, "task failed");
                    graph.write().await.mark_failed(&task_id, reason.clone())?;
                    failed += 1;
                    self.event_bus
                        .emit(EventPayload::TaskFailed {
                            task_id,
                            error: reason,
                        })
                        .await;
                }
            }
        }

        info!(layer = layer_number, succeeded, failed, skipped, "layer finished");
        self.event_bus
            .emit(EventPayload::LayerCompleted {
                layer: layer_number,
                succeeded,
                failed,
            })
            .await;
        Ok(())
    }
}
