//! Arena-backed knowledge graph.
//!
//! Nodes live in a `Vec` and are addressed by string id through an index.
//! Edges are kept in their own list; parent and child links are derived from
//! `add_edge` and never written directly.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use uuid::Uuid;

use crate::domain::errors::{DomainError, DomainResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeType {
    Claim,
    Concept,
    Question,
    Evidence,
    Perspective,
}

impl std::fmt::Display for NodeType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Claim => write!(f, "claim"),
            Self::Concept => write!(f, "concept"),
            Self::Question => write!(f, "question"),
            Self::Evidence => write!(f, "evidence"),
            Self::Perspective => write!(f, "perspective"),
        }
    }
}

/// Confidence attached to a knowledge node.
///
/// `Unverified < Low < Medium < High < Verified` form an ordered scale.
/// `Contested` sits outside that scale: it marks a node that lost a conflict
/// or is known to be disputed, whatever its earlier level was.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConfidenceLevel {
    #[default]
    Unverified,
    Low,
    Medium,
    High,
    Verified,
    Contested,
}

impl ConfidenceLevel {
    /// Position on the ordered scale, `None` for `Contested`.
    pub const fn rank(self) -> Option<u8> {
        match self {
            Self::Unverified => Some(0),
            Self::Low => Some(1),
            Self::Medium => Some(2),
            Self::High => Some(3),
            Self::Verified => Some(4),
            Self::Contested => None,
        }
    }

    pub const fn is_contested(self) -> bool {
        matches!(self, Self::Contested)
    }

    /// Whether `self` is ranked and not below `other`. Always false when
    /// either side is contested.
    pub fn is_at_least(self, other: Self) -> bool {
        match (self.rank(), other.rank()) {
            (Some(a), Some(b)) => a >= b,
            _ => false,
        }
    }

    /// Bucket a finding score in `[0, 1]`.
    pub fn from_score(score: f64) -> Self {
        if score >= 0.8 {
            Self::High
        } else if score >= 0.5 {
            Self::Medium
        } else if score >= 0.3 {
            Self::Low
        } else {
            Self::Contested
        }
    }
}

impl std::fmt::Display for ConfidenceLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Unverified => write!(f, "unverified"),
            Self::Low => write!(f, "low"),
            Self::Medium => write!(f, "medium"),
            Self::High => write!(f, "high"),
            Self::Verified => write!(f, "verified"),
            Self::Contested => write!(f, "contested"),
        }
    }
}

/// A unit of knowledge produced by the pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KnowledgeNode {
    pub id: String,
    pub node_type: NodeType,
    pub content: String,
    #[serde(default)]
    pub confidence: ConfidenceLevel,
    #[serde(default)]
    pub sources: Vec<String>,
    #[serde(default)]
    pub evidence_ids: Vec<String>,
    #[serde(default)]
    pub perspectives: Vec<String>,
    #[serde(default)]
    pub metadata: HashMap<String, Value>,
    pub created_at: DateTime<Utc>,
}

impl KnowledgeNode {
    pub fn new(node_type: NodeType, content: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            node_type,
            content: content.into(),
            confidence: ConfidenceLevel::Unverified,
            sources: Vec::new(),
            evidence_ids: Vec::new(),
            perspectives: Vec::new(),
            metadata: HashMap::new(),
            created_at: Utc::now(),
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    pub const fn with_confidence(mut self, confidence: ConfidenceLevel) -> Self {
        self.confidence = confidence;
        self
    }

    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        push_unique(&mut self.sources, source.into());
        self
    }

    pub fn with_perspective(mut self, perspective: impl Into<String>) -> Self {
        push_unique(&mut self.perspectives, perspective.into());
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }
}

fn push_unique(list: &mut Vec<String>, item: String) {
    if !list.contains(&item) {
        list.push(item);
    }
}

/// Directed, labeled relation between two nodes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Edge {
    pub from: String,
    pub to: String,
    pub relation: String,
}

/// Additive update applied by [`KnowledgeGraph::merge_node`].
#[derive(Debug, Clone, Default)]
pub struct NodeUpdate {
    pub sources: Vec<String>,
    pub evidence_ids: Vec<String>,
    pub perspectives: Vec<String>,
    pub metadata: HashMap<String, Value>,
}

/// Aggregate counts over the graph.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct GraphStatistics {
    pub total_nodes: usize,
    pub total_edges: usize,
    pub by_type: BTreeMap<String, usize>,
    pub by_confidence: BTreeMap<String, usize>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct KnowledgeGraph {
    nodes: Vec<KnowledgeNode>,
    edges: Vec<Edge>,
    #[serde(skip)]
    index: HashMap<String, usize>,
    #[serde(skip)]
    parents: Vec<Option<usize>>,
    #[serde(skip)]
    children: Vec<Vec<usize>>,
}

impl KnowledgeGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn nodes(&self) -> impl Iterator<Item = &KnowledgeNode> {
        self.nodes.iter()
    }

    pub fn edges(&self) -> &[Edge] {
        &self.edges
    }

    fn slot(&self, id: &str) -> DomainResult<usize> {
        self.index
            .get(id)
            .copied()
            .ok_or_else(|| DomainError::NodeNotFound(id.to_string()))
    }

    pub fn contains(&self, id: &str) -> bool {
        self.index.contains_key(id)
    }

    pub fn get_node(&self, id: &str) -> Option<&KnowledgeNode> {
        self.index.get(id).map(|&slot| &self.nodes[slot])
    }

    pub fn get_node_mut(&mut self, id: &str) -> Option<&mut KnowledgeNode> {
        self.index.get(id).map(|&slot| &mut self.nodes[slot])
    }

    /// Insert a node and return its id. Inserting an id that already exists
    /// merges the new node's sources, evidence, perspectives and metadata
    /// into the stored one.
    pub fn add_node(&mut self, node: KnowledgeNode) -> String {
        let id = node.id.clone();
        if let Some(&slot) = self.index.get(&id) {
            let existing = &mut self.nodes[slot];
            for s in node.sources {
                push_unique(&mut existing.sources, s);
            }
            for e in node.evidence_ids {
                push_unique(&mut existing.evidence_ids, e);
            }
            for p in node.perspectives {
                push_unique(&mut existing.perspectives, p);
            }
            existing.metadata.extend(node.metadata);
            return id;
        }

        self.index.insert(id.clone(), self.nodes.len());
        self.nodes.push(node);
        self.parents.push(None);
        self.children.push(Vec::new());
        id
    }

    /// Connect two existing nodes. The first edge into `to` sets its parent.
    /// Re-adding an identical edge is a no-op; self-loops are rejected.
    pub fn add_edge(&mut self, from: &str, to: &str, relation: impl Into<String>) -> DomainResult<()> {
        let from_slot = self.slot(from)?;
        let to_slot = self.slot(to)?;
        if from_slot == to_slot {
            return Err(DomainError::ValidationFailed(format!(
                "node {from} cannot be linked to itself"
            )));
        }

        let edge = Edge {
            from: from.to_string(),
            to: to.to_string(),
            relation: relation.into(),
        };
        if self.edges.contains(&edge) {
            return Ok(());
        }
        self.edges.push(edge);
        if !self.children[from_slot].contains(&to_slot) {
            self.children[from_slot].push(to_slot);
        }
        if self.parents[to_slot].is_none() {
            self.parents[to_slot] = Some(from_slot);
        }
        Ok(())
    }

    pub fn get_children(&self, id: &str) -> DomainResult<Vec<&KnowledgeNode>> {
        let slot = self.slot(id)?;
        Ok(self.children[slot].iter().map(|&c| &self.nodes[c]).collect())
    }

    pub fn get_parent(&self, id: &str) -> DomainResult<Option<&KnowledgeNode>> {
        let slot = self.slot(id)?;
        Ok(self.parents[slot].map(|p| &self.nodes[p]))
    }

    /// Additive merge into an existing node. Re-applying the same update is a
    /// no-op.
    pub fn merge_node(&mut self, id: &str, update: NodeUpdate) -> DomainResult<()> {
        let slot = self.slot(id)?;
        let node = &mut self.nodes[slot];
        for s in update.sources {
            push_unique(&mut node.sources, s);
        }
        for e in update.evidence_ids {
            push_unique(&mut node.evidence_ids, e);
        }
        for p in update.perspectives {
            push_unique(&mut node.perspectives, p);
        }
        node.metadata.extend(update.metadata);
        Ok(())
    }

    pub fn set_confidence(&mut self, id: &str, confidence: ConfidenceLevel) -> DomainResult<()> {
        let slot = self.slot(id)?;
        self.nodes[slot].confidence = confidence;
        Ok(())
    }

    pub fn set_metadata(&mut self, id: &str, key: impl Into<String>, value: Value) -> DomainResult<()> {
        let slot = self.slot(id)?;
        self.nodes[slot].metadata.insert(key.into(), value);
        Ok(())
    }

    pub fn get_contested_nodes(&self) -> Vec<&KnowledgeNode> {
        self.nodes
            .iter()
            .filter(|n| n.confidence.is_contested())
            .collect()
    }

    /// Claims nobody has checked yet.
    pub fn get_unverified_claims(&self) -> Vec<&KnowledgeNode> {
        self.nodes
            .iter()
            .filter(|n| n.node_type == NodeType::Claim && n.confidence == ConfidenceLevel::Unverified)
            .collect()
    }

    pub fn get_by_confidence(&self, level: ConfidenceLevel) -> Vec<&KnowledgeNode> {
        self.nodes.iter().filter(|n| n.confidence == level).collect()
    }

    pub fn get_by_type(&self, node_type: NodeType) -> Vec<&KnowledgeNode> {
        self.nodes.iter().filter(|n| n.node_type == node_type).collect()
    }

    pub fn statistics(&self) -> GraphStatistics {
        let mut stats = GraphStatistics {
            total_nodes: self.nodes.len(),
            total_edges: self.edges.len(),
            ..GraphStatistics::default()
        };
        for node in &self.nodes {
            *stats.by_type.entry(node.node_type.to_string()).or_default() += 1;
            *stats
                .by_confidence
                .entry(node.confidence.to_string())
                .or_default() += 1;
        }
        stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_contested_is_outside_scale() {
        assert_eq!(ConfidenceLevel::Contested.rank(), None);
        assert!(ConfidenceLevel::Verified.is_at_least(ConfidenceLevel::High));
        assert!(!ConfidenceLevel::Contested.is_at_least(ConfidenceLevel::Unverified));
        assert!(!ConfidenceLevel::High.is_at_least(ConfidenceLevel::Contested));
    }

    #[test]
    fn test_score_buckets() {
        assert_eq!(ConfidenceLevel::from_score(0.9), ConfidenceLevel::High);
        assert_eq!(ConfidenceLevel::from_score(0.5), ConfidenceLevel::Medium);
        assert_eq!(ConfidenceLevel::from_score(0.3), ConfidenceLevel::Low);
        assert_eq!(ConfidenceLevel::from_score(0.1), ConfidenceLevel::Contested);
    }

    #[test]
    fn test_edge_requires_both_nodes() {
        let mut graph = KnowledgeGraph::new();
        let a = graph.add_node(KnowledgeNode::new(NodeType::Question, "why?"));
        assert!(matches!(
            graph.add_edge(&a, "nope", "answers"),
            Err(DomainError::NodeNotFound(_))
        ));
        assert!(graph.edges().is_empty());
    }

    #[test]
    fn test_first_parent_wins() {
        let mut graph = KnowledgeGraph::new();
        let p1 = graph.add_node(KnowledgeNode::new(NodeType::Question, "q1"));
        let p2 = graph.add_node(KnowledgeNode::new(NodeType::Question, "q2"));
        let c = graph.add_node(KnowledgeNode::new(NodeType::Claim, "c"));

        graph.add_edge(&p1, &c, "answers").unwrap();
        graph.add_edge(&p2, &c, "answers").unwrap();

        assert_eq!(graph.get_parent(&c).unwrap().unwrap().id, p1);
        assert_eq!(graph.get_children(&p2).unwrap().len(), 1);
        assert_eq!(graph.edges().len(), 2);
    }

    #[test]
    fn test_duplicate_edge_and_self_loop() {
        let mut graph = KnowledgeGraph::new();
        let q = graph.add_node(KnowledgeNode::new(NodeType::Question, "q"));
        let c = graph.add_node(KnowledgeNode::new(NodeType::Claim, "c"));

        graph.add_edge(&q, &c, "answers").unwrap();
        graph.add_edge(&q, &c, "answers").unwrap();
        graph.add_edge(&q, &c, "supports").unwrap();
        assert_eq!(graph.edges().len(), 2);
        assert_eq!(graph.get_children(&q).unwrap().len(), 1);

        assert!(matches!(
            graph.add_edge(&c, &c, "cites"),
            Err(DomainError::ValidationFailed(_))
        ));
        assert!(graph.get_parent(&q).unwrap().is_none());
        assert_eq!(graph.get_parent(&c).unwrap().unwrap().id, q);
    }

    #[test]
    fn test_merge_is_idempotent() {
        let mut graph = KnowledgeGraph::new();
        let id = graph.add_node(
            KnowledgeNode::new(NodeType::Claim, "rust is fast").with_source("https://a.org"),
        );
        let update = NodeUpdate {
            sources: vec!["https://a.org".into(), "https://b.org".into()],
            perspectives: vec!["engineer".into()],
            metadata: HashMap::from([("k".to_string(), json!(1))]),
            ..NodeUpdate::default()
        };
        graph.merge_node(&id, update.clone()).unwrap();
        graph.merge_node(&id, update).unwrap();

        let node = graph.get_node(&id).unwrap();
        assert_eq!(node.sources, vec!["https://a.org", "https://b.org"]);
        assert_eq!(node.perspectives, vec!["engineer"]);
        assert_eq!(node.metadata.get("k"), Some(&json!(1)));
    }

    #[test]
    fn test_queries_and_statistics() {
        let mut graph = KnowledgeGraph::new();
        graph.add_node(KnowledgeNode::new(NodeType::Claim, "a"));
        graph.add_node(
            KnowledgeNode::new(NodeType::Claim, "b").with_confidence(ConfidenceLevel::Contested),
        );
        graph.add_node(KnowledgeNode::new(NodeType::Evidence, "c"));

        assert_eq!(graph.get_unverified_claims().len(), 1);
        assert_eq!(graph.get_contested_nodes().len(), 1);
        assert_eq!(graph.get_by_confidence(ConfidenceLevel::Unverified).len(), 2);

        let stats = graph.statistics();
        assert_eq!(stats.total_nodes, 3);
        assert_eq!(stats.by_type.get("claim"), Some(&2));
        assert_eq!(stats.by_confidence.get("contested"), Some(&1));
    }
}
