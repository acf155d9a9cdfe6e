//! Probabilistic conflict resolution.
//!
//! Every node in a conflict gets a score from source credibility, recency
//! and corroboration. Scores are normalized into a distribution and handed,
//! together with short node summaries, to the text generator for a ruling.
//! When the ruling is missing or unusable the highest-probability node wins.

use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone, Utc};
use serde::Deserialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, instrument, warn};

use crate::domain::errors::DomainResult;
use crate::domain::models::{
    ConfidenceLevel, Conflict, KnowledgeGraph, KnowledgeNode, Resolution, ResolutionOutcome,
};
use crate::domain::ports::{GenerationConstraints, Message, TextGenerator};
use crate::services::extract_json_from_response;
use crate::services::source_hierarchy::rank_source;

const CREDIBILITY_WEIGHT: f64 = 0.4;
const RECENCY_WEIGHT: f64 = 0.3;
const CORROBORATION_WEIGHT: f64 = 0.3;

/// Credibility used for nodes without any source.
const UNSOURCED_CREDIBILITY: f64 = 0.2;
/// Recency used when no timestamp can be read.
const UNKNOWN_RECENCY: f64 = 0.5;
const RECENCY_HALF_LIFE_DAYS: f64 = 180.0;
const CORROBORATION_SATURATION: f64 = 5.0;

const SUMMARY_CHARS: usize = 150;
const FALLBACK_REASON: &str = "Fallback: highest transition probability";
const DEFAULT_REASON: &str = "Resolved by probability analysis";

const RESOLVE_SYSTEM_PROMPT: &str = "You are a conflict-resolution specialist for a research \
system. Given a conflict between claims and their transition-probability scores, decide which \
claim is most likely correct.\n\nReturn a JSON object with:\n\
- \"winning_node_id\": the ID of the most credible node\n\
- \"rejected_node_ids\": list of IDs for rejected nodes\n\
- \"reason\": a 1-2 sentence explanation\n\
- \"confidence\": float between 0.0 and 1.0\n\n\
Return ONLY valid JSON. No markdown fences.";

#[derive(Debug, Deserialize)]
struct Ruling {
    #[serde(default)]
    winning_node_id: Option<String>,
    #[serde(default)]
    reason: Option<String>,
    #[serde(default)]
    confidence: Option<f64>,
}

/// Average source credibility on a `[0, 1]` scale.
pub fn credibility_score(node: &KnowledgeNode) -> f64 {
    if node.sources.is_empty() {
        return UNSOURCED_CREDIBILITY;
    }
    let total: f64 = node.sources.iter().map(|s| f64::from(rank_source(s))).sum();
    total / node.sources.len() as f64 / 5.0
}

/// Exponential decay with a 180-day half-life, read from the `retrieved_at`
/// or `date` metadata key.
pub fn recency_score(node: &KnowledgeNode, now: DateTime<Utc>) -> f64 {
    let Some(timestamp) = node
        .metadata
        .get("retrieved_at")
        .or_else(|| node.metadata.get("date"))
        .and_then(parse_timestamp)
    else {
        return UNKNOWN_RECENCY;
    };
    let age_days = (now - timestamp).num_days() as f64;
    0.5_f64.powf(age_days / RECENCY_HALF_LIFE_DAYS).clamp(0.0, 1.0)
}

fn parse_timestamp(value: &Value) -> Option<DateTime<Utc>> {
    match value {
        Value::String(raw) => {
            let raw = raw.trim();
            if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
                return Some(dt.with_timezone(&Utc));
            }
            if let Ok(dt) = NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f") {
                return Some(Utc.from_utc_datetime(&dt));
            }
            NaiveDate::parse_from_str(raw, "%Y-%m-%d")
                .ok()
                .and_then(|d| d.and_hms_opt(0, 0, 0))
                .map(|dt| Utc.from_utc_datetime(&dt))
        }
        Value::Number(n) => n
            .as_f64()
            .and_then(|secs| DateTime::from_timestamp(secs as i64, 0)),
        _ => None,
    }
}

pub fn corroboration_score(node: &KnowledgeNode) -> f64 {
    (node.sources.len() as f64 / CORROBORATION_SATURATION).min(1.0)
}

/// Weighted score for one node; missing nodes score zero.
pub fn node_score(node: Option<&KnowledgeNode>, now: DateTime<Utc>) -> f64 {
    node.map_or(0.0, |node| {
        CREDIBILITY_WEIGHT * credibility_score(node)
            + RECENCY_WEIGHT * recency_score(node, now)
            + CORROBORATION_WEIGHT * corroboration_score(node)
    })
}

/// Transition probabilities for the nodes of a conflict. Scores are divided
/// by their sum; an all-zero vector is returned unchanged.
pub fn transition_probabilities(
    node_ids: &[String],
    graph: &KnowledgeGraph,
    now: DateTime<Utc>,
) -> BTreeMap<String, f64> {
    let mut scores: BTreeMap<String, f64> = node_ids
        .iter()
        .map(|id| (id.clone(), node_score(graph.get_node(id), now)))
        .collect();
    let total: f64 = scores.values().sum();
    if total > 0.0 {
        for p in scores.values_mut() {
            *p /= total;
        }
    }
    scores
}

/// Most probable node; ties go to the earliest id in `node_ids`.
fn most_probable(node_ids: &[String], probabilities: &BTreeMap<String, f64>) -> Option<String> {
    let mut best: Option<(&String, f64)> = None;
    for id in node_ids {
        let p = probabilities.get(id).copied().unwrap_or(0.0);
        if best.map_or(true, |(_, best_p)| p > best_p) {
            best = Some((id, p));
        }
    }
    best.map(|(id, _)| id.clone())
}

fn rejected_except(node_ids: &[String], winner: &str) -> Vec<String> {
    let mut rejected: Vec<String> = Vec::new();
    for id in node_ids {
        if id != winner && !rejected.contains(id) {
            rejected.push(id.clone());
        }
    }
    rejected
}

fn fallback(node_ids: &[String], probabilities: BTreeMap<String, f64>) -> Resolution {
    let Some(winner) = most_probable(node_ids, &probabilities) else {
        return Resolution::unresolved(probabilities);
    };
    Resolution {
        rejected_node_ids: rejected_except(node_ids, &winner),
        confidence: probabilities.get(&winner).copied().unwrap_or(0.0),
        winning_node_id: Some(winner),
        reason: FALLBACK_REASON.to_string(),
        probabilities,
        outcome: ResolutionOutcome::ResolvedFallback,
    }
}

/// Adjudicates conflicts with the text generator.
pub struct ConflictResolver {
    generator: Arc<dyn TextGenerator>,
}

impl ConflictResolver {
    pub fn new(generator: Arc<dyn TextGenerator>) -> Self {
        Self { generator }
    }

    /// Decide a single conflict. Never fails: generation problems fall back
    /// to the probability ranking and a conflict with no signal at all is
    /// reported as unresolved.
    #[instrument(skip(self, conflict, graph), fields(nodes = conflict.node_ids.len(), level = %conflict.level))]
    pub async fn resolve(&self, conflict: &Conflict, graph: &KnowledgeGraph) -> Resolution {
        let node_ids = &conflict.node_ids;
        let probabilities = transition_probabilities(node_ids, graph, Utc::now());
        if node_ids.is_empty() || probabilities.values().sum::<f64>() <= 0.0 {
            debug!("no usable signal, conflict left unresolved");
            return Resolution::unresolved(probabilities);
        }

        let constraints = GenerationConstraints::new()
            .with_temperature(0.1)
            .with_max_tokens(512)
            .json()
            .with_system_prompt(RESOLVE_SYSTEM_PROMPT);
        let messages = [Message::user(conflict_summary(conflict, &probabilities, graph))];

        let ruling = match self.generator.generate(&messages, &constraints).await {
            Ok(generation) => {
                match serde_json::from_str::<Ruling>(extract_json_from_response(&generation.content)) {
                    Ok(ruling) => ruling,
                    Err(e) => {
                        warn!(error = %e, "unparsable conflict ruling, using fallback");
                        return fallback(node_ids, probabilities);
                    }
                }
            }
            Err(e) => {
                warn!(error = %e, "conflict ruling failed, using fallback");
                return fallback(node_ids, probabilities);
            }
        };

        match ruling.winning_node_id {
            Some(winner) if probabilities.contains_key(&winner) => Resolution {
                rejected_node_ids: rejected_except(node_ids, &winner),
                winning_node_id: Some(winner),
                confidence: ruling.confidence.unwrap_or(0.5).clamp(0.0, 1.0),
                reason: ruling
                    .reason
                    .filter(|r| !r.trim().is_empty())
                    .unwrap_or_else(|| DEFAULT_REASON.to_string()),
                probabilities,
                outcome: ResolutionOutcome::Resolved,
            },
            other => {
                warn!(winner = ?other, "ruling named an unknown node, using fallback");
                fallback(node_ids, probabilities)
            }
        }
    }

    /// Resolve every conflict that involves at least one node, storing the
    /// decision on the conflict.
    pub async fn resolve_all(&self, conflicts: &mut [Conflict], graph: &KnowledgeGraph) {
        for conflict in conflicts.iter_mut().filter(|c| !c.node_ids.is_empty()) {
            conflict.resolution = Some(self.resolve(conflict, graph).await);
        }
    }
}

fn conflict_summary(
    conflict: &Conflict,
    probabilities: &BTreeMap<String, f64>,
    graph: &KnowledgeGraph,
) -> String {
    let mut lines = vec![
        format!("Conflict: {}", conflict.description),
        format!("Severity: {}", conflict.severity),
        String::new(),
        "Nodes and transition probabilities:".to_string(),
    ];
    for id in &conflict.node_ids {
        let content: String = graph.get_node(id).map_or_else(
            || "Unknown".to_string(),
            |n| n.content.chars().take(SUMMARY_CHARS).collect(),
        );
        let p = probabilities.get(id).copied().unwrap_or(0.0);
        lines.push(format!("Node {id}: P={p:.3} | {content}"));
    }
    lines.join("\n")
}

/// Write a resolution into the graph: the winner becomes `High`, every
/// rejected node becomes `Contested` with the reason attached. Ids that are
/// not in the graph are skipped.
pub fn apply(graph: &mut KnowledgeGraph, resolution: &Resolution) -> DomainResult<()> {
    let Some(winner) = &resolution.winning_node_id else {
        return Ok(());
    };
    if graph.contains(winner) {
        graph.set_confidence(winner, ConfidenceLevel::High)?;
    }
    for id in &resolution.rejected_node_ids {
        if !graph.contains(id) {
            debug!(node_id = %id, "rejected node not in graph");
            continue;
        }
        graph.set_confidence(id, ConfidenceLevel::Contested)?;
        graph.set_metadata(id, "contest_reason", Value::String(resolution.reason.clone()))?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::mock::{MockResponse, ScriptedGenerator};
    use crate::domain::models::{ConsistencyLevel, NodeType, Severity};
    use chrono::Duration;
    use serde_json::json;

    fn graph_with_two_claims() -> KnowledgeGraph {
        let mut graph = KnowledgeGraph::new();
        graph.add_node(
            KnowledgeNode::new(NodeType::Claim, "Boiling point is 100C at sea level")
                .with_id("strong")
                .with_source("https://www.nist.gov/water")
                .with_source("https://doi.org/10.1/x")
                .with_source("https://www.nature.com/articles/1"),
        );
        graph.add_node(
            KnowledgeNode::new(NodeType::Claim, "Boiling point is 90C at sea level")
                .with_id("weak")
                .with_source("https://www.reddit.com/r/askscience"),
        );
        graph
    }

    fn conflict() -> Conflict {
        Conflict::new(
            vec!["strong".to_string(), "weak".to_string()],
            "Boiling points disagree",
            Severity::High,
            ConsistencyLevel::Numerical,
        )
    }

    #[test]
    fn test_probabilities_sum_to_one() {
        let graph = graph_with_two_claims();
        let probs = transition_probabilities(&conflict().node_ids, &graph, Utc::now());
        let total: f64 = probs.values().sum();
        assert!((total - 1.0).abs() < 1e-9);
        assert!(probs["strong"] > probs["weak"]);
    }

    #[test]
    fn test_missing_node_scores_zero() {
        let graph = KnowledgeGraph::new();
        assert_eq!(node_score(graph.get_node("ghost"), Utc::now()), 0.0);
        let probs = transition_probabilities(&["ghost".to_string()], &graph, Utc::now());
        assert_eq!(probs["ghost"], 0.0);
    }

    #[test]
    fn test_recency_decay() {
        let now = Utc::now();
        let fresh = KnowledgeNode::new(NodeType::Evidence, "x")
            .with_metadata("retrieved_at", json!(now.to_rfc3339()));
        let old = KnowledgeNode::new(NodeType::Evidence, "x")
            .with_metadata("date", json!((now - Duration::days(180)).timestamp()));
        let unknown = KnowledgeNode::new(NodeType::Evidence, "x")
            .with_metadata("date", json!("sometime last year"));

        assert!((recency_score(&fresh, now) - 1.0).abs() < 1e-9);
        assert!((recency_score(&old, now) - 0.5).abs() < 0.01);
        assert_eq!(recency_score(&unknown, now), UNKNOWN_RECENCY);
    }

    #[test]
    fn test_future_timestamp_is_clamped() {
        let now = Utc::now();
        let node = KnowledgeNode::new(NodeType::Evidence, "x")
            .with_metadata("date", json!("2999-01-01"));
        assert_eq!(recency_score(&node, now), 1.0);
    }

    #[test]
    fn test_unsourced_credibility() {
        let node = KnowledgeNode::new(NodeType::Claim, "x");
        assert_eq!(credibility_score(&node), UNSOURCED_CREDIBILITY);
        assert_eq!(corroboration_score(&node), 0.0);
    }

    #[tokio::test]
    async fn test_ruling_is_applied() {
        let graph_before = graph_with_two_claims();
        let generator = Arc::new(ScriptedGenerator::constant(
            r#"{"winning_node_id": "strong", "rejected_node_ids": ["weak"], "reason": "Better sources", "confidence": 0.9}"#,
        ));
        let resolver = ConflictResolver::new(generator.clone());
        let resolution = resolver.resolve(&conflict(), &graph_before).await;

        assert_eq!(resolution.outcome, ResolutionOutcome::Resolved);
        assert_eq!(resolution.winning_node_id.as_deref(), Some("strong"));
        assert_eq!(resolution.rejected_node_ids, vec!["weak".to_string()]);
        assert_eq!(resolution.confidence, 0.9);

        let call = &generator.calls()[0];
        assert!(call.constraints.json_mode);
        assert!(call.messages[0].content.contains("Node strong: P="));

        let mut graph = graph_before;
        apply(&mut graph, &resolution).unwrap();
        assert_eq!(graph.get_node("strong").unwrap().confidence, ConfidenceLevel::High);
        let weak = graph.get_node("weak").unwrap();
        assert_eq!(weak.confidence, ConfidenceLevel::Contested);
        assert_eq!(weak.metadata["contest_reason"], json!("Better sources"));
    }

    #[tokio::test]
    async fn test_generation_failure_falls_back() {
        let graph = graph_with_two_claims();
        let resolver = ConflictResolver::new(Arc::new(ScriptedGenerator::new([
            MockResponse::failure("offline"),
        ])));
        let resolution = resolver.resolve(&conflict(), &graph).await;

        assert_eq!(resolution.outcome, ResolutionOutcome::ResolvedFallback);
        assert_eq!(resolution.winning_node_id.as_deref(), Some("strong"));
        assert_eq!(resolution.reason, FALLBACK_REASON);
        assert_eq!(resolution.confidence, resolution.probabilities["strong"]);
    }

    #[tokio::test]
    async fn test_unknown_winner_falls_back() {
        let graph = graph_with_two_claims();
        let resolver = ConflictResolver::new(Arc::new(ScriptedGenerator::constant(
            r#"{"winning_node_id": "someone-else", "reason": "?"}"#,
        )));
        let resolution = resolver.resolve(&conflict(), &graph).await;

        assert_eq!(resolution.outcome, ResolutionOutcome::ResolvedFallback);
        assert_eq!(resolution.winning_node_id.as_deref(), Some("strong"));
        assert_eq!(resolution.rejected_node_ids, vec!["weak".to_string()]);
    }

    #[tokio::test]
    async fn test_no_signal_is_unresolved() {
        let generator = Arc::new(ScriptedGenerator::constant("{}"));
        let resolver = ConflictResolver::new(generator.clone());
        let conflict = Conflict::new(
            vec!["a".to_string(), "b".to_string()],
            "ghosts",
            Severity::Low,
            ConsistencyLevel::Logical,
        );
        let resolution = resolver.resolve(&conflict, &KnowledgeGraph::new()).await;

        assert_eq!(resolution.outcome, ResolutionOutcome::Unresolved);
        assert!(resolution.winning_node_id.is_none());
        assert_eq!(resolution.confidence, 0.0);
        assert_eq!(generator.call_count(), 0);

        let mut graph = KnowledgeGraph::new();
        apply(&mut graph, &resolution).unwrap();
        assert!(graph.is_empty());
    }
}
