//! End-to-end runs of the coordinator with in-memory adapters.

mod common;

use async_trait::async_trait;
use std::sync::{Arc, Mutex};

use research_swarm::adapters::{MockResponse, ScriptedGenerator, ScriptedSandbox, StaticRetriever};
use research_swarm::domain::models::{
    ConcurrencyConfig, ConfidenceLevel, ExecutionResult, KnowledgeGraph, NodeType, Task, TaskGraph, TaskKind,
    TaskStatus, VerificationConfig,
};
use research_swarm::domain::ports::{GenerationConstraints, Message, SearchHit};
use research_swarm::services::event_bus::drain;
use research_swarm::services::task_graph_builder::{Complexity, Perspective};
use research_swarm::services::{
    run_conflict_resolution, CodeVerifier, ConflictDetector, ConflictResolver, DiscourseEngine,
    DiscourseHandler, EventBus, EventPayload, HandlerContext, HandlerRegistry, ResearchOutline,
    RetrievalHandler, SwarmCoordinator, TaskGraphBuilder, TaskHandler, TaskOutcome,
    VerificationHandler,
};
use tokio::sync::RwLock;

/// Records every dispatched task and fails the ones whose query is listed.
#[derive(Default)]
struct RecordingHandler {
    failing: Vec<String>,
    seen: Mutex<Vec<String>>,
}

#[async_trait]
impl TaskHandler for RecordingHandler {
    async fn handle(&self, task: Task, _ctx: HandlerContext) -> TaskOutcome {
        self.seen.lock().unwrap().push(task.id.clone());
        if self.failing.contains(&task.query) {
            TaskOutcome::Failed(format!("{} exploded", task.id))
        } else {
            TaskOutcome::Completed(vec![serde_json::json!({ "id": task.id })])
        }
    }
}

#[tokio::test]
async fn test_failed_task_blocks_only_its_dependents() {
    common::setup_test_logging();

    let handler = Arc::new(RecordingHandler {
        failing: vec!["b".to_string()],
        ..RecordingHandler::default()
    });
    let registry = HandlerRegistry::new().register(TaskKind::Retrieval, handler.clone());
    let (coordinator, bus) = common::coordinator(registry, &ConcurrencyConfig::default());
    let mut rx = bus.subscribe();

    let graph = TaskGraph::from_tasks([
        Task::new("A", TaskKind::Retrieval, "a"),
        Task::new("B", TaskKind::Retrieval, "b").depends_on("A"),
        Task::new("C", TaskKind::Retrieval, "c").depends_on("A"),
        Task::new("D", TaskKind::Retrieval, "d").depends_on("B"),
    ])
    .unwrap();
    let graph = Arc::new(RwLock::new(graph));

    let report = coordinator.run(Arc::clone(&graph)).await.unwrap();

    assert_eq!(report.completed, 2);
    assert_eq!(report.failed, 1);
    assert_eq!(report.skipped, 1);
    assert!(!report.is_clean());

    let seen = handler.seen.lock().unwrap().clone();
    assert!(!seen.contains(&"D".to_string()));
    assert_eq!(seen.len(), 3);

    let graph = graph.read().await;
    assert_eq!(graph.get_task("A").unwrap().status, TaskStatus::Completed);
    assert_eq!(graph.get_task("B").unwrap().status, TaskStatus::Failed);
    assert_eq!(graph.get_task("B").unwrap().error(), Some("B exploded"));
    assert_eq!(graph.get_task("C").unwrap().status, TaskStatus::Completed);
    assert_eq!(graph.get_task("D").unwrap().status, TaskStatus::Pending);

    let events = drain(&mut rx);
    assert!(events.iter().any(|e| matches!(
        &e.payload,
        EventPayload::TaskFailed { task_id, .. } if task_id == "B"
    )));
    assert!(matches!(
        events.last().map(|e| &e.payload),
        Some(EventPayload::RunCompleted { completed: 2, failed: 1, skipped: 1, .. })
    ));
}

fn claim_ids(message: &str) -> Vec<String> {
    message
        .lines()
        .filter(|line| line.starts_with('[') && line.contains("emissions"))
        .filter_map(|line| line[1..].split_once(']').map(|(id, _)| id.to_string()))
        .collect()
}

/// Answers each kind of call the pipeline makes, told apart by its
/// sampling settings.
fn research_generator() -> ScriptedGenerator {
    ScriptedGenerator::default().with_responder(|messages: &[Message], c: &GenerationConstraints| {
        let temp = |v: f32| c.temperature == Some(v);
        let prompt = messages.last().map(|m| m.content.as_str()).unwrap_or_default();

        if temp(0.7) && !c.json_mode {
            MockResponse::success("Field data shows large savings in cold climates.")
        } else if temp(0.6) && !c.json_mode {
            MockResponse::success("How were the baselines chosen?")
        } else if temp(0.3) && c.json_mode {
            MockResponse::success(
                r#"{"findings": [
                    {"claim": "Heat pumps cut household emissions", "confidence": 0.85},
                    {"claim": "Heat pumps barely change emissions", "confidence": 0.6}
                ]}"#,
            )
        } else if temp(0.1) && !c.json_mode {
            MockResponse::success("```python\nprint('checked')\n```")
        } else if temp(0.2) && c.json_mode {
            if prompt.contains("for logical inconsistencies") {
                let ids = claim_ids(prompt);
                MockResponse::success(
                    serde_json::json!({
                        "issues": [{
                            "node_ids": ids,
                            "description": "Opposite conclusions about emissions",
                            "severity": "high"
                        }]
                    })
                    .to_string(),
                )
            } else {
                MockResponse::success(r#"{"issues": []}"#)
            }
        } else if temp(0.1) && c.json_mode {
            MockResponse::success("no verdict today")
        } else {
            MockResponse::failure("unexpected call")
        }
    })
}

#[tokio::test]
async fn test_outline_runs_end_to_end() {
    common::setup_test_logging();

    let outline = ResearchOutline {
        query: "Do heat pumps reduce emissions".to_string(),
        complexity: Complexity::Complex,
        sub_questions: vec!["Do heat pumps reduce emissions".to_string()],
        perspectives: vec![Perspective {
            name: "engineer".to_string(),
            questions: vec!["heat pumps emissions data".to_string()],
        }],
    };
    let graph = TaskGraphBuilder::build(&outline).unwrap();
    assert_eq!(graph.get_topological_layers().unwrap().len(), 3);

    let generator = Arc::new(research_generator());
    let retriever = Arc::new(StaticRetriever::new().with_default_hits(vec![SearchHit::new(
        "Field study",
        "https://www.nature.com/articles/heat-pumps",
        "Field study of 500 installations",
    )]));
    let verdict = r#"{"verified": true, "evidence": "model agrees"}"#;
    let sandbox = Arc::new(ScriptedSandbox::new([
        ExecutionResult::completed(verdict, "", 0),
        ExecutionResult::completed(verdict, "", 0),
    ]));

    let bus = Arc::new(EventBus::default());
    let verifier = CodeVerifier::new(
        generator.clone(),
        sandbox.clone(),
        Arc::clone(&bus),
        &VerificationConfig::default(),
    );
    let registry = HandlerRegistry::new()
        .register(TaskKind::Retrieval, Arc::new(RetrievalHandler::new(retriever.clone(), 5)))
        .register(
            TaskKind::Discourse,
            Arc::new(DiscourseHandler::new(DiscourseEngine::new(generator.clone(), 3))),
        )
        .register(TaskKind::Verification, Arc::new(VerificationHandler::new(Arc::new(verifier))));
    let knowledge = Arc::new(RwLock::new(KnowledgeGraph::new()));
    let coordinator = SwarmCoordinator::new(
        registry,
        Arc::clone(&knowledge),
        Arc::clone(&bus),
        &ConcurrencyConfig::default(),
    );
    let mut rx = bus.subscribe();

    let report = coordinator.run(Arc::new(RwLock::new(graph))).await.unwrap();
    assert!(report.is_clean(), "{report:?}");
    assert_eq!(report.completed, 3);
    assert_eq!(retriever.call_count(), 1);
    assert_eq!(sandbox.execution_count(), 2);

    {
        let graph = knowledge.read().await;
        assert_eq!(graph.get_by_type(NodeType::Evidence).len(), 1);
        let claims = graph.get_by_type(NodeType::Claim);
        assert_eq!(claims.len(), 2);
        assert!(claims.iter().all(|c| c.confidence == ConfidenceLevel::Verified));
    }

    let detector = ConflictDetector::new(generator.clone());
    let resolver = ConflictResolver::new(generator.clone());
    let conflicts = run_conflict_resolution(&detector, &resolver, &knowledge, &bus)
        .await
        .unwrap();
    assert_eq!(conflicts.conflicts.len(), 1);
    assert_eq!(conflicts.fallback, 1);

    let graph = knowledge.read().await;
    assert_eq!(graph.get_contested_nodes().len(), 1);
    assert_eq!(graph.get_by_confidence(ConfidenceLevel::High).len(), 1);

    let events = drain(&mut rx);
    for name in [
        "retrieval.result",
        "discourse.complete",
        "verification.complete",
        "conflict.detected",
        "conflict.resolved",
    ] {
        assert!(events.iter().any(|e| e.payload.name() == name), "missing {name}");
    }
}
