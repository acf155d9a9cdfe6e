//! Conflict detection and the detect → resolve → apply pass.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info, instrument, warn};

use crate::domain::errors::DomainResult;
use crate::domain::models::{
    Conflict, ConsistencyLevel, KnowledgeGraph, ResolutionOutcome, Severity,
};
use crate::domain::ports::{GenerationConstraints, Message, TextGenerator};
use crate::services::conflict_resolver::{self, ConflictResolver};
use crate::services::event_bus::{EventBus, EventPayload};
use crate::services::extract_json_from_response;

const NODE_CONTENT_CHARS: usize = 200;
const CONTESTED_CONTENT_CHARS: usize = 80;

const AUDIT_SYSTEM_PROMPT: &str = "You are an epistemic consistency auditor. Given a set of claims \
from a research knowledge graph, check for {level} inconsistencies.\n\n\
Rules for each level:\n\
- logical: detect contradictions, fallacies, or mutually exclusive claims\n\
- temporal: detect anachronisms or conflicting timelines\n\
- numerical: detect contradictory statistics, figures, or measurements\n\
- source: detect when the same source is cited for opposing conclusions\n\
- perspective: detect when a single perspective contradicts itself\n\
- evidential: detect when evidence is used to support conflicting claims\n\
- inferential: detect flawed reasoning chains or unjustified leaps\n\n\
Return a JSON array. Each element must have:\n\
- \"node_ids\": list of node IDs involved\n\
- \"description\": brief explanation of the inconsistency\n\
- \"severity\": one of \"low\", \"medium\", \"high\", \"critical\"\n\n\
If no inconsistencies are found, return an empty array: []\n\
Return ONLY valid JSON. No markdown fences.";

/// Finds conflicts in a knowledge graph.
pub struct ConflictDetector {
    generator: Arc<dyn TextGenerator>,
}

impl ConflictDetector {
    pub fn new(generator: Arc<dyn TextGenerator>) -> Self {
        Self { generator }
    }

    /// One high-severity conflict per node already marked contested.
    pub fn pre_existing_conflicts(graph: &KnowledgeGraph) -> Vec<Conflict> {
        graph
            .get_contested_nodes()
            .into_iter()
            .map(|node| {
                let excerpt: String = node.content.chars().take(CONTESTED_CONTENT_CHARS).collect();
                Conflict::new(
                    vec![node.id.clone()],
                    format!("Node already CONTESTED: {excerpt}"),
                    Severity::High,
                    ConsistencyLevel::PreExisting,
                )
            })
            .collect()
    }

    /// Run every consistency level against the graph. An empty graph is not
    /// checked at all.
    #[instrument(skip(self, graph), fields(nodes = graph.len()))]
    pub async fn check_consistency(&self, graph: &KnowledgeGraph) -> Vec<Conflict> {
        let payload = node_payload(graph);
        if payload.is_empty() {
            info!("knowledge graph is empty, skipping consistency check");
            return Vec::new();
        }

        let mut issues = Vec::new();
        for level in ConsistencyLevel::CHECKED {
            let found = self.check_level(level, &payload).await;
            debug!(level = %level, issues = found.len(), "consistency level checked");
            issues.extend(found);
        }
        issues
    }

    async fn check_level(&self, level: ConsistencyLevel, payload: &str) -> Vec<Conflict> {
        let constraints = GenerationConstraints::new()
            .with_temperature(0.2)
            .with_max_tokens(2048)
            .json()
            .with_system_prompt(AUDIT_SYSTEM_PROMPT.replace("{level}", level.as_str()));
        let messages = [Message::user(format!(
            "Check these knowledge-graph nodes for {level} inconsistencies ({question}):\n\n{payload}",
            question = level.question(),
        ))];

        match self.generator.generate(&messages, &constraints).await {
            Ok(generation) => parse_issues(&generation.content, level),
            Err(e) => {
                warn!(level = %level, error = %e, "consistency check failed");
                Vec::new()
            }
        }
    }

    /// Pre-existing conflicts followed by everything the consistency check
    /// reports.
    pub async fn detect(&self, graph: &KnowledgeGraph) -> Vec<Conflict> {
        let mut conflicts = Self::pre_existing_conflicts(graph);
        info!(count = conflicts.len(), "pre-existing contested nodes");
        conflicts.extend(self.check_consistency(graph).await);
        conflicts
    }
}

#[derive(Debug, Deserialize)]
struct RawIssue {
    #[serde(default)]
    node_ids: Vec<String>,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    severity: Option<String>,
}

/// Parse a consistency-check response. Accepts a bare array or an object
/// wrapping one; anything else yields no issues.
fn parse_issues(response: &str, level: ConsistencyLevel) -> Vec<Conflict> {
    let parsed: Value = match serde_json::from_str(extract_json_from_response(response)) {
        Ok(value) => value,
        Err(e) => {
            warn!(level = %level, error = %e, "unparsable consistency response");
            return Vec::new();
        }
    };

    let items = match parsed {
        Value::Array(items) => items,
        Value::Object(map) => match map.into_iter().find_map(|(_, v)| match v {
            Value::Array(items) => Some(items),
            _ => None,
        }) {
            Some(items) => items,
            None => return Vec::new(),
        },
        _ => return Vec::new(),
    };

    items
        .into_iter()
        .filter(|item| !item.is_null())
        .map(|item| match item {
            Value::Object(_) => {
                let raw: RawIssue = serde_json::from_value(item).unwrap_or(RawIssue {
                    node_ids: Vec::new(),
                    description: None,
                    severity: None,
                });
                Conflict::new(
                    raw.node_ids,
                    raw.description
                        .unwrap_or_else(|| "Unspecified inconsistency".to_string()),
                    raw.severity
                        .as_deref()
                        .map_or(Severity::Medium, Severity::parse_lenient),
                    level,
                )
            }
            Value::String(text) => Conflict::new(Vec::new(), text, Severity::Low, level),
            other => Conflict::new(Vec::new(), other.to_string(), Severity::Low, level),
        })
        .collect()
}

/// One line per node: `[id] (confidence) content`.
fn node_payload(graph: &KnowledgeGraph) -> String {
    graph
        .nodes()
        .map(|node| {
            let content: String = node.content.chars().take(NODE_CONTENT_CHARS).collect();
            format!("[{}] ({}) {}", node.id, node.confidence, content)
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Summary of one conflict pass.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ConflictReport {
    pub conflicts: Vec<Conflict>,
    pub resolved: usize,
    pub fallback: usize,
    pub unresolved: usize,
}

/// Detect conflicts on a snapshot of the graph, resolve them, then apply
/// every decision under a single write lock.
pub async fn run_conflict_resolution(
    detector: &ConflictDetector,
    resolver: &ConflictResolver,
    knowledge: &RwLock<KnowledgeGraph>,
    event_bus: &EventBus,
) -> DomainResult<ConflictReport> {
    let snapshot = knowledge.read().await.clone();
    let mut conflicts = detector.detect(&snapshot).await;

    for conflict in &conflicts {
        event_bus
            .emit(EventPayload::ConflictDetected {
                node_ids: conflict.node_ids.clone(),
                severity: conflict.severity,
                description: conflict.description.clone(),
            })
            .await;
    }

    resolver.resolve_all(&mut conflicts, &snapshot).await;

    let mut report = ConflictReport::default();
    {
        let mut graph = knowledge.write().await;
        for resolution in conflicts.iter().filter_map(|c| c.resolution.as_ref()) {
            conflict_resolver::apply(&mut graph, resolution)?;
            match resolution.outcome {
                ResolutionOutcome::Resolved => report.resolved += 1,
                ResolutionOutcome::ResolvedFallback => report.fallback += 1,
                ResolutionOutcome::Unresolved => report.unresolved += 1,
            }
        }
    }

    for resolution in conflicts.iter().filter_map(|c| c.resolution.as_ref()) {
        event_bus
            .emit(EventPayload::ConflictResolved {
                winning_node_id: resolution.winning_node_id.clone(),
                rejected: resolution.rejected_node_ids.len(),
                outcome: resolution.outcome,
            })
            .await;
    }

    info!(
        conflicts = conflicts.len(),
        resolved = report.resolved,
        fallback = report.fallback,
        unresolved = report.unresolved,
        "conflict pass finished"
    );
    report.conflicts = conflicts;
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::mock::{MockResponse, ScriptedGenerator};
    use crate::domain::models::{ConfidenceLevel, KnowledgeNode, NodeType};
    use crate::services::event_bus::drain;

    #[test]
    fn test_parse_issue_defaults() {
        let issues = parse_issues(
            r#"[{"node_ids": ["a", "b"], "severity": "apocalyptic"}, {"description": "x", "severity": "HIGH"}, "loose text", null]"#,
            ConsistencyLevel::Logical,
        );
        assert_eq!(issues.len(), 3);
        assert_eq!(issues[0].description, "Unspecified inconsistency");
        assert_eq!(issues[0].severity, Severity::Medium);
        assert_eq!(issues[1].severity, Severity::High);
        assert!(issues[1].node_ids.is_empty());
        assert_eq!(issues[2].severity, Severity::Low);
        assert!(issues.iter().all(|c| c.level == ConsistencyLevel::Logical));
    }

    #[test]
    fn test_parse_wrapped_and_garbage() {
        let wrapped = parse_issues(
            r#"{"issues": [{"node_ids": ["a"], "description": "d"}]}"#,
            ConsistencyLevel::Numerical,
        );
        assert_eq!(wrapped.len(), 1);
        assert!(parse_issues("not json at all", ConsistencyLevel::Numerical).is_empty());
        assert!(parse_issues(r#"{"ok": true}"#, ConsistencyLevel::Numerical).is_empty());
    }

    #[test]
    fn test_contested_nodes_become_conflicts() {
        let mut graph = KnowledgeGraph::new();
        graph.add_node(
            KnowledgeNode::new(NodeType::Claim, "disputed")
                .with_id("c1")
                .with_confidence(ConfidenceLevel::Contested),
        );
        graph.add_node(KnowledgeNode::new(NodeType::Claim, "fine").with_id("c2"));

        let conflicts = ConflictDetector::pre_existing_conflicts(&graph);
        assert_eq!(conflicts.len(), 1);
        assert_eq!(conflicts[0].node_ids, vec!["c1".to_string()]);
        assert_eq!(conflicts[0].severity, Severity::High);
        assert_eq!(conflicts[0].description, "Node already CONTESTED: disputed");
    }

    #[tokio::test]
    async fn test_empty_graph_skips_check() {
        let generator = Arc::new(ScriptedGenerator::constant("[]"));
        let detector = ConflictDetector::new(generator.clone());
        assert!(detector.detect(&KnowledgeGraph::new()).await.is_empty());
        assert_eq!(generator.call_count(), 0);
    }

    #[tokio::test]
    async fn test_every_level_is_checked() {
        let generator = Arc::new(ScriptedGenerator::constant("[]"));
        let detector = ConflictDetector::new(generator.clone());
        let mut graph = KnowledgeGraph::new();
        graph.add_node(KnowledgeNode::new(NodeType::Claim, "x").with_id("n1"));

        detector.detect(&graph).await;
        let calls = generator.calls();
        assert_eq!(calls.len(), ConsistencyLevel::CHECKED.len());
        assert!(calls.iter().all(|c| c.constraints.json_mode));
        assert!(calls[0].messages[0].content.contains("[n1] (unverified) x"));
    }

    #[tokio::test]
    async fn test_full_pass_applies_resolutions() {
        let mut graph = KnowledgeGraph::new();
        graph.add_node(
            KnowledgeNode::new(NodeType::Claim, "Population is 8 billion")
                .with_id("a")
                .with_source("https://www.census.gov/popclock"),
        );
        graph.add_node(
            KnowledgeNode::new(NodeType::Claim, "Population is 5 billion")
                .with_id("b")
                .with_source("https://someone.blogspot.com/post"),
        );
        let knowledge = RwLock::new(graph);

        let mut responses = vec![MockResponse::success(
            r#"[{"node_ids": ["a", "b"], "description": "Population figures disagree", "severity": "high"}]"#,
        )];
        responses.extend((1..ConsistencyLevel::CHECKED.len()).map(|_| MockResponse::success("[]")));
        responses.push(MockResponse::success(
            r#"{"winning_node_id": "a", "rejected_node_ids": ["b"], "reason": "Census data", "confidence": 0.8}"#,
        ));
        let generator = Arc::new(ScriptedGenerator::new(responses));

        let bus = EventBus::default();
        let mut rx = bus.subscribe();
        let report = run_conflict_resolution(
            &ConflictDetector::new(generator.clone()),
            &ConflictResolver::new(generator),
            &knowledge,
            &bus,
        )
        .await
        .unwrap();

        assert_eq!(report.conflicts.len(), 1);
        assert_eq!(report.resolved, 1);

        let graph = knowledge.read().await;
        assert_eq!(graph.get_node("a").unwrap().confidence, ConfidenceLevel::High);
        assert_eq!(graph.get_node("b").unwrap().confidence, ConfidenceLevel::Contested);

        let names: Vec<_> = drain(&mut rx).iter().map(|e| e.name()).collect();
        assert_eq!(names, vec!["conflict.detected", "conflict.resolved"]);
    }
}
