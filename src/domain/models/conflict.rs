use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    #[default]
    Medium,
    High,
    Critical,
}

impl Severity {
    /// Parse a severity label, falling back to `Medium` for anything unknown.
    pub fn parse_lenient(raw: &str) -> Self {
        match raw.trim().to_lowercase().as_str() {
            "low" => Self::Low,
            "high" => Self::High,
            "critical" => Self::Critical,
            _ => Self::Medium,
        }
    }
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Low => write!(f, "low"),
            Self::Medium => write!(f, "medium"),
            Self::High => write!(f, "high"),
            Self::Critical => write!(f, "critical"),
        }
    }
}

/// Where a conflict was found.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConsistencyLevel {
    /// The node was already marked contested before detection ran.
    PreExisting,
    Logical,
    Temporal,
    Numerical,
    Source,
    Perspective,
    Evidential,
    Inferential,
}

impl ConsistencyLevel {
    /// Levels examined by the consistency check, in order.
    pub const CHECKED: [Self; 7] = [
        Self::Logical,
        Self::Temporal,
        Self::Numerical,
        Self::Source,
        Self::Perspective,
        Self::Evidential,
        Self::Inferential,
    ];

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::PreExisting => "pre_existing",
            Self::Logical => "logical",
            Self::Temporal => "temporal",
            Self::Numerical => "numerical",
            Self::Source => "source",
            Self::Perspective => "perspective",
            Self::Evidential => "evidential",
            Self::Inferential => "inferential",
        }
    }

    pub const fn question(self) -> &'static str {
        match self {
            Self::PreExisting => "Which claims were already disputed?",
            Self::Logical => "Do any claims directly contradict each other?",
            Self::Temporal => "Are there inconsistencies in dates, ordering or timelines?",
            Self::Numerical => "Do any figures, statistics or quantities disagree?",
            Self::Source => "Do credible sources disagree with each other?",
            Self::Perspective => "Do different viewpoints reach incompatible conclusions?",
            Self::Evidential => "Is any claim unsupported or undermined by the cited evidence?",
            Self::Inferential => "Do any conclusions fail to follow from their premises?",
        }
    }
}

impl std::fmt::Display for ConsistencyLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolutionOutcome {
    /// The text-generation capability picked the winner.
    Resolved,
    /// Generation failed or was unparsable; the highest-probability node won.
    ResolvedFallback,
    /// No usable signal at all.
    Unresolved,
}

/// Decision reached for a conflict.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Resolution {
    pub winning_node_id: Option<String>,
    pub rejected_node_ids: Vec<String>,
    pub confidence: f64,
    pub reason: String,
    pub probabilities: BTreeMap<String, f64>,
    pub outcome: ResolutionOutcome,
}

impl Resolution {
    pub fn unresolved(probabilities: BTreeMap<String, f64>) -> Self {
        Self {
            winning_node_id: None,
            rejected_node_ids: Vec::new(),
            confidence: 0.0,
            reason: "unresolved".to_string(),
            probabilities,
            outcome: ResolutionOutcome::Unresolved,
        }
    }
}

/// A set of knowledge nodes that disagree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Conflict {
    pub node_ids: Vec<String>,
    pub description: String,
    pub severity: Severity,
    pub level: ConsistencyLevel,
    #[serde(default)]
    pub resolution: Option<Resolution>,
}

impl Conflict {
    pub fn new(
        node_ids: Vec<String>,
        description: impl Into<String>,
        severity: Severity,
        level: ConsistencyLevel,
    ) -> Self {
        Self {
            node_ids,
            description: description.into(),
            severity,
            level,
            resolution: None,
        }
    }

    pub const fn is_resolved(&self) -> bool {
        self.resolution.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lenient_severity() {
        assert_eq!(Severity::parse_lenient("HIGH"), Severity::High);
        assert_eq!(Severity::parse_lenient("catastrophic"), Severity::Medium);
        assert!(Severity::Critical > Severity::Low);
    }
}
