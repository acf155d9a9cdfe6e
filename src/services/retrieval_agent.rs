//! Retrieval tasks: search, then record hits as evidence.

use async_trait::async_trait;
use chrono::Utc;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{error, info};

use crate::domain::models::{KnowledgeNode, NodeType, Task};
use crate::domain::ports::{Retriever, SearchHit};
use crate::services::event_bus::EventPayload;
use crate::services::swarm_coordinator::{HandlerContext, TaskHandler, TaskOutcome};

/// Runs a task's query against the retriever.
pub struct RetrievalHandler {
    retriever: Arc<dyn Retriever>,
    max_results: usize,
}

impl RetrievalHandler {
    pub fn new(retriever: Arc<dyn Retriever>, max_results: usize) -> Self {
        Self {
            retriever,
            max_results,
        }
    }
}

fn evidence_node(task: &Task, hit: &SearchHit) -> KnowledgeNode {
    let mut node = KnowledgeNode::new(NodeType::Evidence, hit.snippet.clone())
        .with_metadata("title", json!(hit.title))
        .with_metadata("task", json!(task.id))
        .with_metadata("retrieved_at", json!(Utc::now().to_rfc3339()));
    if !hit.url.is_empty() {
        node = node.with_source(hit.url.clone());
    }
    if let Some(perspective) = &task.perspective {
        node = node.with_perspective(perspective.clone());
    }
    node
}

#[async_trait]
impl TaskHandler for RetrievalHandler {
    async fn handle(&self, task: Task, ctx: HandlerContext) -> TaskOutcome {
        ctx.event_bus
            .emit(EventPayload::RetrievalStarted {
                task_id: task.id.clone(),
                query: task.query.clone(),
            })
            .await;

        let hits = match self.retriever.search(&task.query, self.max_results).await {
            Ok(hits) => hits,
            Err(e) => {
                error!(task_id = %task.id, error = %e, "search failed");
                ctx.event_bus
                    .emit(EventPayload::RetrievalFailed {
                        task_id: task.id.clone(),
                        error: e.to_string(),
                    })
                    .await;
                return TaskOutcome::Failed(e.to_string());
            }
        };

        {
            let mut knowledge = ctx.knowledge.write().await;
            for hit in &hits {
                knowledge.add_node(evidence_node(&task, hit));
            }
        }

        info!(task_id = %task.id, count = hits.len(), retriever = self.retriever.name(), "search finished");
        ctx.event_bus
            .emit(EventPayload::RetrievalCompleted {
                task_id: task.id.clone(),
                count: hits.len(),
            })
            .await;

        let results: Vec<Value> = hits
            .iter()
            .filter_map(|hit| serde_json::to_value(hit).ok())
            .collect();
        TaskOutcome::Completed(results)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::mock::StaticRetriever;
    use crate::domain::models::{ConfidenceLevel, TaskKind};
    use crate::services::event_bus::drain;

    #[tokio::test]
    async fn test_hits_become_evidence() {
        let retriever = Arc::new(StaticRetriever::new().with_hits(
            "solar output",
            vec![SearchHit::new("NREL report", "https://www.nrel.gov/solar", "Panels yield 20%")],
        ));
        let handler = RetrievalHandler::new(retriever, 10);
        let ctx = HandlerContext::detached();
        let mut rx = ctx.event_bus.subscribe();

        let task = Task::new("r1", TaskKind::Retrieval, "solar output").with_perspective("engineer");
        let outcome = handler.handle(task, ctx.clone()).await;

        let TaskOutcome::Completed(results) = outcome else {
            panic!("expected completion");
        };
        assert_eq!(results.len(), 1);
        assert_eq!(results[0]["url"], "https://www.nrel.gov/solar");

        let knowledge = ctx.knowledge.read().await;
        let evidence = knowledge.get_by_type(NodeType::Evidence);
        assert_eq!(evidence.len(), 1);
        assert_eq!(evidence[0].confidence, ConfidenceLevel::Unverified);
        assert_eq!(evidence[0].sources, vec!["https://www.nrel.gov/solar".to_string()]);
        assert_eq!(evidence[0].metadata["task"], "r1");
        assert_eq!(evidence[0].perspectives, vec!["engineer".to_string()]);

        let names: Vec<_> = drain(&mut rx).iter().map(|e| e.name()).collect();
        assert_eq!(names, vec!["retrieval.start", "retrieval.result"]);
    }

    #[tokio::test]
    async fn test_search_failure_fails_task() {
        let retriever = Arc::new(StaticRetriever::new().failing_on("broken"));
        let handler = RetrievalHandler::new(retriever, 10);
        let ctx = HandlerContext::detached();
        let mut rx = ctx.event_bus.subscribe();

        let outcome = handler
            .handle(Task::new("r1", TaskKind::Retrieval, "broken"), ctx.clone())
            .await;

        assert!(matches!(outcome, TaskOutcome::Failed(_)));
        assert!(ctx.knowledge.read().await.is_empty());
        let names: Vec<_> = drain(&mut rx).iter().map(|e| e.name()).collect();
        assert_eq!(names, vec!["retrieval.start", "retrieval.error"]);
    }
}
