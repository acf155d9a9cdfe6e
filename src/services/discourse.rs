//! Expert/interrogator debate.
//!
//! Two personas take turns on a research question: the expert argues from
//! the evidence gathered so far and the interrogator attacks the argument.
//! The transcript is then condensed into scored findings that become claim
//! nodes.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{error, info, instrument};

use crate::domain::models::{ConfidenceLevel, KnowledgeGraph, KnowledgeNode, NodeType, Task};
use crate::domain::ports::{GenerationConstraints, GenerationError, Message, TextGenerator};
use crate::services::event_bus::EventPayload;
use crate::services::extract_json_from_response;
use crate::services::swarm_coordinator::{HandlerContext, TaskHandler, TaskOutcome};

pub const MIN_TURNS: usize = 3;
pub const MAX_TURNS: usize = 5;

const CONTEXT_CHARS: usize = 3000;
const TRANSCRIPT_EXCERPT_CHARS: usize = 300;
const DEFAULT_PERSPECTIVE: &str = "general analyst";
const NO_CONTEXT: &str = "(no prior context)";

const INTERROGATOR_SYSTEM_PROMPT: &str = "You are a rigorous interrogator. Challenge the expert's \
claims, identify hidden assumptions, ask for evidence, and expose logical weaknesses.";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Speaker {
    Expert,
    Interrogator,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TranscriptEntry {
    pub turn: usize,
    pub speaker: Speaker,
    pub text: String,
}

/// A claim distilled from a debate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Finding {
    #[serde(default)]
    pub claim: String,
    #[serde(default = "default_finding_confidence")]
    pub confidence: f64,
    #[serde(default)]
    pub perspectives: Vec<String>,
}

const fn default_finding_confidence() -> f64 {
    0.5
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DiscourseResult {
    pub findings: Vec<Finding>,
    pub transcript: Vec<TranscriptEntry>,
}

/// Runs debates through the text generator.
pub struct DiscourseEngine {
    generator: Arc<dyn TextGenerator>,
    turns: usize,
}

impl DiscourseEngine {
    /// `turns` is clamped to `MIN_TURNS..=MAX_TURNS`.
    pub fn new(generator: Arc<dyn TextGenerator>, turns: usize) -> Self {
        Self {
            generator,
            turns: turns.clamp(MIN_TURNS, MAX_TURNS),
        }
    }

    pub const fn turns(&self) -> usize {
        self.turns
    }

    #[instrument(skip(self, context), fields(turns = self.turns))]
    pub async fn debate(
        &self,
        query: &str,
        perspective: &str,
        context: &str,
    ) -> Result<DiscourseResult, GenerationError> {
        let expert_constraints = GenerationConstraints::new()
            .with_temperature(0.7)
            .with_max_tokens(600)
            .with_system_prompt(format!(
                "You are a domain expert. Argue your position clearly, cite evidence from the \
                 provided context, and defend your claims. Perspective: {perspective}"
            ));
        let interrogator_constraints = GenerationConstraints::new()
            .with_temperature(0.6)
            .with_max_tokens(400)
            .with_system_prompt(INTERROGATOR_SYSTEM_PROMPT);

        let mut expert_messages = vec![Message::user(format!(
            "Research question: {query}\n\nContext from prior retrieval:\n{context}\n\n\
             Present your initial argument."
        ))];
        let mut interrogator_messages = vec![Message::user(format!(
            "A domain expert will present arguments about: {query}. \
             Your job is to challenge their claims rigorously."
        ))];
        let mut transcript = Vec::with_capacity(self.turns * 2);

        for turn in 1..=self.turns {
            let argument = self
                .generator
                .generate(&expert_messages, &expert_constraints)
                .await?
                .content;
            expert_messages.push(Message::assistant(argument.clone()));
            interrogator_messages.push(Message::user(argument.clone()));
            transcript.push(TranscriptEntry {
                turn,
                speaker: Speaker::Expert,
                text: argument,
            });

            let challenge = self
                .generator
                .generate(&interrogator_messages, &interrogator_constraints)
                .await?
                .content;
            interrogator_messages.push(Message::assistant(challenge.clone()));
            expert_messages.push(Message::user(challenge.clone()));
            transcript.push(TranscriptEntry {
                turn,
                speaker: Speaker::Interrogator,
                text: challenge,
            });
        }

        let findings = self.synthesize(query, &transcript).await?;
        Ok(DiscourseResult {
            findings,
            transcript,
        })
    }

    async fn synthesize(
        &self,
        query: &str,
        transcript: &[TranscriptEntry],
    ) -> Result<Vec<Finding>, GenerationError> {
        let condensed = transcript
            .iter()
            .map(|entry| {
                let speaker = match entry.speaker {
                    Speaker::Expert => "expert",
                    Speaker::Interrogator => "interrogator",
                };
                let excerpt: String = entry.text.chars().take(TRANSCRIPT_EXCERPT_CHARS).collect();
                format!("[{speaker} turn {}]: {excerpt}", entry.turn)
            })
            .collect::<Vec<_>>()
            .join("\n");
        let messages = [Message::user(format!(
            "Below is a debate transcript about: {query}\n\n{condensed}\n\n\
             Extract key findings as JSON: a list of objects with \"claim\" (string), \
             \"confidence\" (float 0-1), and \"perspectives\" (list of strings)."
        ))];
        let constraints = GenerationConstraints::new()
            .with_temperature(0.3)
            .with_max_tokens(800)
            .json();

        let raw = self.generator.generate(&messages, &constraints).await?.content;
        Ok(parse_findings(&raw))
    }
}

/// Findings from a synthesis response: a bare list or `{"findings": [...]}`.
/// Anything unparsable becomes one finding holding the raw text.
pub fn parse_findings(raw: &str) -> Vec<Finding> {
    let parsed: Result<Value, _> = serde_json::from_str(extract_json_from_response(raw));
    let items = match parsed {
        Ok(Value::Array(items)) => items,
        Ok(Value::Object(mut map)) => match map.remove("findings") {
            Some(Value::Array(items)) => items,
            _ => Vec::new(),
        },
        _ => {
            return vec![Finding {
                claim: raw.trim().to_string(),
                confidence: default_finding_confidence(),
                perspectives: Vec::new(),
            }]
        }
    };

    items
        .into_iter()
        .filter_map(|item| serde_json::from_value::<Finding>(item).ok())
        .filter(|finding| !finding.claim.trim().is_empty())
        .map(|mut finding| {
            finding.confidence = finding.confidence.clamp(0.0, 1.0);
            finding
        })
        .collect()
}

/// Evidence snippets joined with separators, stopping before `CONTEXT_CHARS`.
pub fn build_context(graph: &KnowledgeGraph) -> String {
    let mut parts: Vec<&str> = Vec::new();
    let mut total = 0;
    for node in graph.get_by_type(NodeType::Evidence) {
        let len = node.content.chars().count();
        if total + len > CONTEXT_CHARS {
            break;
        }
        parts.push(&node.content);
        total += len;
    }
    if parts.is_empty() {
        NO_CONTEXT.to_string()
    } else {
        parts.join("\n---\n")
    }
}

/// Task handler that debates the task query and records findings as
/// claims.
pub struct DiscourseHandler {
    engine: DiscourseEngine,
}

impl DiscourseHandler {
    pub fn new(engine: DiscourseEngine) -> Self {
        Self { engine }
    }
}

#[async_trait]
impl TaskHandler for DiscourseHandler {
    async fn handle(&self, task: Task, ctx: HandlerContext) -> TaskOutcome {
        let perspective = task
            .perspective
            .clone()
            .unwrap_or_else(|| DEFAULT_PERSPECTIVE.to_string());
        ctx.event_bus
            .emit(EventPayload::DiscourseStarted {
                task_id: task.id.clone(),
                perspective: perspective.clone(),
                turns: self.engine.turns(),
            })
            .await;

        let context = build_context(&*ctx.knowledge.read().await);
        let result = match self.engine.debate(&task.query, &perspective, &context).await {
            Ok(result) => result,
            Err(e) => {
                error!(task_id = %task.id, error = %e, "discourse failed");
                ctx.event_bus
                    .emit(EventPayload::DiscourseFailed {
                        task_id: task.id.clone(),
                        error: e.to_string(),
                    })
                    .await;
                return TaskOutcome::Failed(e.to_string());
            }
        };

        let mut claim_ids = Vec::with_capacity(result.findings.len());
        {
            let mut knowledge = ctx.knowledge.write().await;
            for finding in &result.findings {
                let mut node = KnowledgeNode::new(NodeType::Claim, finding.claim.clone())
                    .with_confidence(ConfidenceLevel::from_score(finding.confidence))
                    .with_metadata("task", json!(task.id))
                    .with_metadata("score", json!(finding.confidence));
                for p in &finding.perspectives {
                    node = node.with_perspective(p.clone());
                }
                claim_ids.push(knowledge.add_node(node));
            }
        }

        info!(task_id = %task.id, findings = result.findings.len(), "discourse finished");
        ctx.event_bus
            .emit(EventPayload::DiscourseCompleted {
                task_id: task.id.clone(),
                findings: result.findings.len(),
            })
            .await;

        TaskOutcome::Completed(vec![json!({
            "findings": result.findings,
            "transcript": result.transcript,
            "claim_node_ids": claim_ids,
        })])
    }
}
