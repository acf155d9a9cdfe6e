//! Builds the initial task graph from a research outline.
//!
//! Shape of the result:
//!
//! ```text
//! Retrieval (one per perspective question)
//!     └─> Discourse (per complex or contested sub-question, on related retrievals)
//!             └─> Verification (one per discourse task)
//! ```

use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::HashSet;
use tracing::info;

use crate::domain::errors::DomainResult;
use crate::domain::models::{Task, TaskGraph, TaskKind};

/// Words in a sub-question that suggest it is disputed.
const CONTESTED_KEYWORDS: &[&str] = &[
    "debate",
    "controversy",
    "contested",
    "disagree",
    "critique",
    "versus",
    "vs",
    "compare",
    "conflict",
];

/// Shared words needed to link a discourse task to a retrieval task.
const MIN_SHARED_WORDS: usize = 2;

const DISCOURSE_PRIORITY: i32 = 2;
const VERIFICATION_PRIORITY: i32 = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Complexity {
    Simple,
    #[default]
    Moderate,
    Complex,
    Expert,
}

impl Complexity {
    pub const fn is_complex(self) -> bool {
        matches!(self, Self::Complex | Self::Expert)
    }
}

/// A viewpoint with the questions it wants answered.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Perspective {
    pub name: String,
    #[serde(default)]
    pub questions: Vec<String>,
}

/// Parsed research intent plus the perspectives to cover.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResearchOutline {
    #[serde(default)]
    pub query: String,
    #[serde(default)]
    pub complexity: Complexity,
    #[serde(default)]
    pub sub_questions: Vec<String>,
    #[serde(default)]
    pub perspectives: Vec<Perspective>,
}

impl ResearchOutline {
    /// Parse YAML or JSON.
    pub fn parse(raw: &str) -> DomainResult<Self> {
        Ok(serde_yaml::from_str(raw)?)
    }
}

pub struct TaskGraphBuilder;

impl TaskGraphBuilder {
    pub fn build(outline: &ResearchOutline) -> DomainResult<TaskGraph> {
        let is_complex = outline.complexity.is_complex();
        let mut graph = TaskGraph::new();
        let mut retrievals: Vec<(String, HashSet<String>)> = Vec::new();

        for perspective in &outline.perspectives {
            for question in &perspective.questions {
                let task = Task::generated(TaskKind::Retrieval, question.clone())
                    .with_priority(i32::from(is_complex))
                    .with_perspective(perspective.name.clone())
                    .with_metadata("source_perspective", json!(perspective.name));
                retrievals.push((task.id.clone(), words(question)));
                graph.add_task(task)?;
            }
        }

        let mut discourse_ids = Vec::new();
        for sub_question in &outline.sub_questions {
            if !needs_discourse(sub_question, is_complex) {
                continue;
            }
            let sub_words = words(sub_question);
            let related = retrievals
                .iter()
                .filter(|(_, w)| w.intersection(&sub_words).count() >= MIN_SHARED_WORDS)
                .map(|(id, _)| id.clone());

            let task = Task::generated(TaskKind::Discourse, sub_question.clone())
                .with_priority(DISCOURSE_PRIORITY)
                .with_dependencies(related)
                .with_metadata("sub_question", json!(sub_question));
            discourse_ids.push((task.id.clone(), sub_question.clone()));
            graph.add_task(task)?;
        }

        for (discourse_id, sub_question) in discourse_ids {
            let task = Task::generated(
                TaskKind::Verification,
                format!("Verify claims from discourse: {sub_question}"),
            )
            .with_priority(VERIFICATION_PRIORITY)
            .depends_on(discourse_id.clone())
            .with_metadata("discourse_task", json!(discourse_id));
            graph.add_task(task)?;
        }

        info!(tasks = graph.len(), "built task graph");
        Ok(graph)
    }
}

fn needs_discourse(sub_question: &str, is_complex: bool) -> bool {
    if is_complex {
        return true;
    }
    let lower = sub_question.to_lowercase();
    CONTESTED_KEYWORDS.iter().any(|kw| lower.contains(kw))
}

fn words(text: &str) -> HashSet<String> {
    text.to_lowercase().split_whitespace().map(str::to_string).collect()
}
