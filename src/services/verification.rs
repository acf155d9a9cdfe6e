//! Code-based claim verification.
//!
//! A claim is turned into a small self-contained script that prints a JSON
//! verdict. The script runs in the sandbox; when it crashes, the error and
//! the previous code are sent back to the text generator for a fix. The
//! loop never runs more than `max_attempts` times, and a failed fix request
//! uses up an attempt just like a failed execution.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, instrument, warn};

use crate::domain::errors::DomainResult;
use crate::domain::models::{
    ConfidenceLevel, ExecutionResult, KnowledgeGraph, KnowledgeNode, NodeType, Task,
    VerificationConfig,
};
use crate::domain::ports::{GenerationConstraints, Message, Sandbox, TextGenerator};
use crate::services::event_bus::{EventBus, EventPayload};
use crate::services::swarm_coordinator::{HandlerContext, TaskHandler, TaskOutcome};

const VERIFIED_CONFIDENCE: f64 = 0.85;
const REFUTED_CONFIDENCE: f64 = 0.3;
const FAILURE_CONFIDENCE: f64 = 0.1;

const TIMEOUT_MESSAGE: &str = "Code execution timed out.";
const EXHAUSTED_MESSAGE: &str = "All retry attempts exhausted.";
const NO_OUTPUT: &str = "No output produced";

const GENERATION_SYSTEM_PROMPT: &str = "You write short Python 3 programs that check factual or \
numerical claims. The program must be self-contained, use only the standard library, never call \
input(), and print exactly one JSON object to stdout of the form \
{\"verified\": true|false, \"evidence\": \"<one sentence>\"}. Print nothing else. \
Return only the code.";

const FIX_SYSTEM_PROMPT: &str = "You repair Python 3 verification programs. Keep the same goal: \
print exactly one JSON object {\"verified\": true|false, \"evidence\": \"...\"} to stdout, use only \
the standard library and never call input(). Return only the corrected code.";

/// Result of verifying one claim.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VerificationOutcome {
    pub verified: bool,
    pub confidence: f64,
    pub evidence: String,
    /// Last program that was run (or generated).
    pub code: String,
    /// Output of the last execution, or the last error.
    pub output: String,
    /// Attempts consumed, including failed fix requests.
    pub attempts: u32,
}

impl VerificationOutcome {
    fn failure(reason: &str, code: String, output: String, attempts: u32) -> Self {
        Self {
            verified: false,
            confidence: FAILURE_CONFIDENCE,
            evidence: reason.to_string(),
            code,
            output,
            attempts,
        }
    }

    /// Confidence level a claim node should take after this outcome.
    pub fn confidence_level(&self) -> ConfidenceLevel {
        if self.verified && self.confidence >= 0.7 {
            ConfidenceLevel::Verified
        } else if self.verified {
            ConfidenceLevel::High
        } else if self.confidence >= 0.4 {
            ConfidenceLevel::Contested
        } else {
            ConfidenceLevel::Low
        }
    }
}

#[derive(Debug, Deserialize)]
struct Verdict {
    verified: bool,
    #[serde(default)]
    evidence: String,
}

/// Generates, runs and repairs verification code.
pub struct CodeVerifier {
    generator: Arc<dyn TextGenerator>,
    sandbox: Arc<dyn Sandbox>,
    event_bus: Arc<EventBus>,
    max_attempts: u32,
    timeout: Duration,
}

impl CodeVerifier {
    pub fn new(
        generator: Arc<dyn TextGenerator>,
        sandbox: Arc<dyn Sandbox>,
        event_bus: Arc<EventBus>,
        config: &VerificationConfig,
    ) -> Self {
        Self {
            generator,
            sandbox,
            event_bus,
            max_attempts: config.max_attempts.max(1),
            timeout: Duration::from_secs(config.timeout_secs),
        }
    }

    pub const fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Generate verification code for `claim` and run it through the retry
    /// loop.
    #[instrument(skip(self), fields(sandbox = self.sandbox.name()))]
    pub async fn verify_claim(&self, claim: &str) -> VerificationOutcome {
        let constraints = GenerationConstraints::new()
            .with_temperature(0.1)
            .with_max_tokens(2048)
            .with_system_prompt(GENERATION_SYSTEM_PROMPT);
        let messages = [Message::user(format!(
            "Write a program that verifies this claim:\n\n{claim}"
        ))];

        let code = match self.generator.generate(&messages, &constraints).await {
            Ok(generation) => clean_code(&generation.content),
            Err(e) => {
                warn!(error = %e, "verification code generation failed");
                let outcome = VerificationOutcome::failure(
                    "Verification code could not be generated.",
                    String::new(),
                    e.to_string(),
                    0,
                );
                self.publish_completed(&outcome).await;
                return outcome;
            }
        };

        self.run_with_retries(claim, code).await
    }

    /// Execute `code`, asking for fixes on failure, for at most
    /// `max_attempts` attempts.
    pub async fn run_with_retries(&self, claim: &str, mut code: String) -> VerificationOutcome {
        let mut pending_fix: Option<String> = None;
        let mut last_error = String::new();

        for attempt in 1..=self.max_attempts {
            if let Some(prior_error) = pending_fix.as_deref() {
                match self.request_fix(claim, &code, prior_error).await {
                    Ok(fixed) => {
                        code = fixed;
                        pending_fix = None;
                    }
                    Err(e) => {
                        warn!(attempt, error = %e, "fix request failed");
                        last_error = e;
                        self.publish_attempt(attempt, false).await;
                        continue;
                    }
                }
            }

            let result = self.sandbox.execute_code(&code, self.timeout).await;
            debug!(attempt, exit_code = result.exit_code, timed_out = result.timed_out, "verification run");

            if result.timed_out {
                self.publish_attempt(attempt, false).await;
                let outcome =
                    VerificationOutcome::failure(TIMEOUT_MESSAGE, code, result.stderr, attempt);
                self.publish_completed(&outcome).await;
                return outcome;
            }

            if result.is_success() {
                if let Some(verdict) = parse_verdict(&result.stdout) {
                    self.publish_attempt(attempt, true).await;
                    let outcome = VerificationOutcome {
                        verified: verdict.verified,
                        confidence: if verdict.verified {
                            VERIFIED_CONFIDENCE
                        } else {
                            REFUTED_CONFIDENCE
                        },
                        evidence: verdict.evidence,
                        code,
                        output: result.stdout,
                        attempts: attempt,
                    };
                    info!(attempt, verified = outcome.verified, "claim checked");
                    self.publish_completed(&outcome).await;
                    return outcome;
                }
            }

            self.publish_attempt(attempt, false).await;
            last_error = error_text(&result);
            pending_fix = Some(last_error.clone());
        }

        let outcome =
            VerificationOutcome::failure(EXHAUSTED_MESSAGE, code, last_error, self.max_attempts);
        self.publish_completed(&outcome).await;
        outcome
    }

    async fn request_fix(&self, claim: &str, code: &str, error: &str) -> Result<String, String> {
        let constraints = GenerationConstraints::new()
            .with_temperature(0.2)
            .with_max_tokens(2048)
            .with_system_prompt(FIX_SYSTEM_PROMPT);
        let messages = [Message::user(format!(
            "Claim: {claim}\n\nPrevious code:\n```python\n{code}\n```\n\nError output:\n{error}\n\n\
             Return the corrected code."
        ))];

        self.generator
            .generate(&messages, &constraints)
            .await
            .map(|generation| clean_code(&generation.content))
            .map_err(|e| e.to_string())
    }

    async fn publish_attempt(&self, attempt: u32, success: bool) {
        self.event_bus
            .emit(EventPayload::VerificationAttempt {
                attempt,
                max_attempts: self.max_attempts,
                success,
            })
            .await;
    }

    async fn publish_completed(&self, outcome: &VerificationOutcome) {
        self.event_bus
            .emit(EventPayload::VerificationCompleted {
                verified: outcome.verified,
                confidence: outcome.confidence,
                attempts: outcome.attempts,
            })
            .await;
    }
}

/// Verifies the claim a task points at: the `claim_node` metadata id, the
/// claims produced by the `discourse_task` metadata id, or else the task
/// query itself, recorded as a new claim.
pub struct VerificationHandler {
    verifier: Arc<CodeVerifier>,
}

impl VerificationHandler {
    pub fn new(verifier: Arc<CodeVerifier>) -> Self {
        Self { verifier }
    }

    async fn targets(task: &Task, ctx: &HandlerContext) -> Vec<(String, String)> {
        let knowledge = ctx.knowledge.read().await;
        if let Some(node) = task
            .metadata
            .get("claim_node")
            .and_then(Value::as_str)
            .and_then(|id| knowledge.get_node(id))
        {
            return vec![(node.id.clone(), node.content.clone())];
        }
        if let Some(source_task) = task.metadata.get("discourse_task").and_then(Value::as_str) {
            return knowledge
                .get_by_type(NodeType::Claim)
                .into_iter()
                .filter(|n| n.metadata.get("task").and_then(Value::as_str) == Some(source_task))
                .map(|n| (n.id.clone(), n.content.clone()))
                .collect();
        }
        Vec::new()
    }
}

#[async_trait]
impl TaskHandler for VerificationHandler {
    async fn handle(&self, task: Task, ctx: HandlerContext) -> TaskOutcome {
        let mut targets = Self::targets(&task, &ctx).await;
        if targets.is_empty() {
            let node = KnowledgeNode::new(NodeType::Claim, task.query.clone())
                .with_metadata("task", json!(task.id));
            let id = ctx.knowledge.write().await.add_node(node);
            targets.push((id, task.query.clone()));
        }

        let mut results = Vec::with_capacity(targets.len());
        for (node_id, claim) in targets {
            let outcome = self.verifier.verify_claim(&claim).await;
            let level = match apply_to_node(&mut *ctx.knowledge.write().await, &node_id, &outcome) {
                Ok(level) => level,
                Err(e) => return TaskOutcome::Failed(e.to_string()),
            };
            debug!(task_id = %task.id, node_id = %node_id, level = %level, "claim updated");
            results.push(json!({
                "claim_node": node_id,
                "level": level,
                "outcome": outcome,
            }));
        }
        TaskOutcome::Completed(results)
    }
}

/// Write an outcome onto a claim node and return the level it now has.
pub fn apply_to_node(
    graph: &mut KnowledgeGraph,
    node_id: &str,
    outcome: &VerificationOutcome,
) -> DomainResult<ConfidenceLevel> {
    let level = outcome.confidence_level();
    graph.set_confidence(node_id, level)?;
    graph.set_metadata(
        node_id,
        "verification",
        json!({
            "verified": outcome.verified,
            "confidence": outcome.confidence,
            "evidence": outcome.evidence,
            "attempts": outcome.attempts,
        }),
    )?;
    Ok(level)
}

/// Info strings dropped from a single-line fence.
const FENCE_LANGUAGES: &[&str] = &[
    "python", "python3", "py", "sh", "bash", "shell", "javascript", "js", "node",
];

/// Strip a surrounding Markdown code fence, if any.
pub fn clean_code(raw: &str) -> String {
    let trimmed = raw.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed.to_string();
    };
    // Drop the info string (e.g. `python`) on the opening line.
    let body = match rest.split_once('\n') {
        Some((_, body)) => body,
        None => strip_fence_language(rest),
    };
    let body = body.trim_end();
    body.strip_suffix("```").unwrap_or(body).trim().to_string()
}

fn strip_fence_language(line: &str) -> &str {
    match line.split_once(char::is_whitespace) {
        Some((info, code)) if FENCE_LANGUAGES.contains(&info.to_lowercase().as_str()) => code,
        _ => line,
    }
}

fn parse_verdict(stdout: &str) -> Option<Verdict> {
    let trimmed = stdout.trim();
    serde_json::from_str(trimmed).ok().or_else(|| {
        // Tolerate chatter before the verdict: take the last line.
        trimmed
            .lines()
            .last()
            .and_then(|line| serde_json::from_str(line.trim()).ok())
    })
}

fn error_text(result: &ExecutionResult) -> String {
    if let Some(error) = &result.error {
        return error.clone();
    }
    if !result.stderr.trim().is_empty() {
        return result.stderr.clone();
    }
    if !result.stdout.trim().is_empty() {
        return result.stdout.clone();
    }
    NO_OUTPUT.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::mock::{MockResponse, ScriptedGenerator, ScriptedSandbox};
    use crate::domain::models::TaskKind;

    fn verifier(
        generator: Arc<ScriptedGenerator>,
        sandbox: Arc<ScriptedSandbox>,
    ) -> CodeVerifier {
        CodeVerifier::new(
            generator,
            sandbox,
            Arc::new(EventBus::default()),
            &VerificationConfig::default(),
        )
    }

    fn crash() -> ExecutionResult {
        ExecutionResult::completed("", "NameError: name 'x' is not defined", 1)
    }

    fn verdict(verified: bool) -> ExecutionResult {
        ExecutionResult::completed(
            format!("{{\"verified\": {verified}, \"evidence\": \"2 + 2 = 4\"}}"),
            "",
            0,
        )
    }

    #[test]
    fn test_clean_code_strips_fences() {
        assert_eq!(clean_code("```python\nprint(1)\n```"), "print(1)");
        assert_eq!(clean_code("```\nprint(1)\n```\n"), "print(1)");
        assert_eq!(clean_code("  print(1)  "), "print(1)");
    }

    #[test]
    fn test_clean_code_single_line_fence() {
        assert_eq!(clean_code("```python print(1)```"), "print(1)");
        assert_eq!(clean_code("```print(1)```"), "print(1)");
        assert_eq!(clean_code("```exit 3```"), "exit 3");
    }

    #[test]
    fn test_error_text_fallbacks() {
        assert_eq!(error_text(&ExecutionResult::completed("out", "err", 1)), "err");
        assert_eq!(error_text(&ExecutionResult::completed("out", "", 1)), "out");
        assert_eq!(error_text(&ExecutionResult::completed("", "", 1)), NO_OUTPUT);
    }

    #[test]
    fn test_confidence_mapping() {
        let mut outcome = VerificationOutcome::failure("x", String::new(), String::new(), 1);
        assert_eq!(outcome.confidence_level(), ConfidenceLevel::Low);
        outcome.verified = true;
        outcome.confidence = VERIFIED_CONFIDENCE;
        assert_eq!(outcome.confidence_level(), ConfidenceLevel::Verified);
        outcome.confidence = 0.5;
        assert_eq!(outcome.confidence_level(), ConfidenceLevel::High);
        outcome.verified = false;
        assert_eq!(outcome.confidence_level(), ConfidenceLevel::Contested);
    }

    #[tokio::test]
    async fn test_first_attempt_success() {
        let generator = Arc::new(ScriptedGenerator::constant("print('ok')"));
        let sandbox = Arc::new(ScriptedSandbox::new([verdict(true)]));
        let outcome = verifier(generator.clone(), sandbox.clone())
            .verify_claim("2 + 2 = 4")
            .await;

        assert!(outcome.verified);
        assert_eq!(outcome.confidence, VERIFIED_CONFIDENCE);
        assert_eq!(outcome.attempts, 1);
        assert_eq!(sandbox.execution_count(), 1);
        assert_eq!(generator.call_count(), 1);
    }

    #[tokio::test]
    async fn test_never_exceeds_attempt_budget() {
        let generator = Arc::new(ScriptedGenerator::constant("```python\nprint(x)\n```"));
        let sandbox = Arc::new(ScriptedSandbox::new([crash(), crash(), crash(), crash()]));
        let outcome = verifier(generator.clone(), sandbox.clone())
            .verify_claim("claim")
            .await;

        assert!(!outcome.verified);
        assert_eq!(outcome.evidence, EXHAUSTED_MESSAGE);
        assert_eq!(outcome.confidence, FAILURE_CONFIDENCE);
        assert_eq!(sandbox.execution_count(), 3);
        // One initial generation plus two fixes; no fix after the last run.
        assert_eq!(generator.call_count(), 3);
        assert!(outcome.output.contains("NameError"));
    }

    #[tokio::test]
    async fn test_success_on_final_attempt() {
        let generator = Arc::new(ScriptedGenerator::constant("print(1)"));
        let sandbox = Arc::new(ScriptedSandbox::new([crash(), crash(), verdict(false)]));
        let outcome = verifier(generator, sandbox.clone()).verify_claim("claim").await;

        assert!(!outcome.verified);
        assert_eq!(outcome.confidence, REFUTED_CONFIDENCE);
        assert_eq!(outcome.attempts, 3);
        assert_eq!(sandbox.execution_count(), 3);
    }

    #[tokio::test]
    async fn test_failed_fix_consumes_attempt() {
        let generator = Arc::new(ScriptedGenerator::new([
            MockResponse::success("print(x)"),
            MockResponse::failure("rate limited"),
            MockResponse::success("print(1)"),
        ]));
        let sandbox = Arc::new(ScriptedSandbox::new([crash(), verdict(true)]));
        let outcome = verifier(generator, sandbox.clone()).verify_claim("claim").await;

        assert!(outcome.verified);
        assert_eq!(outcome.attempts, 3);
        assert_eq!(sandbox.execution_count(), 2);
        assert_eq!(sandbox.executed()[1], "print(1)");
    }

    #[tokio::test]
    async fn test_timeout_stops_immediately() {
        let generator = Arc::new(ScriptedGenerator::constant("while True: pass"));
        let sandbox = Arc::new(ScriptedSandbox::new([ExecutionResult::timed_out(
            Duration::from_secs(30),
            "",
        )]));
        let outcome = verifier(generator.clone(), sandbox.clone())
            .verify_claim("claim")
            .await;

        assert_eq!(outcome.evidence, TIMEOUT_MESSAGE);
        assert_eq!(outcome.attempts, 1);
        assert_eq!(sandbox.execution_count(), 1);
        assert_eq!(generator.call_count(), 1);
    }

    #[tokio::test]
    async fn test_unparsable_output_is_retried() {
        let generator = Arc::new(ScriptedGenerator::constant("print('yes')"));
        let sandbox = Arc::new(ScriptedSandbox::new([
            ExecutionResult::completed("yes", "", 0),
            verdict(true),
        ]));
        let outcome = verifier(generator.clone(), sandbox).verify_claim("claim").await;

        assert!(outcome.verified);
        assert_eq!(outcome.attempts, 2);
        let fix_prompt = &generator.calls()[1].messages[0].content;
        assert!(fix_prompt.contains("Error output:\nyes"));
    }

    #[tokio::test]
    async fn test_generation_failure_yields_failure_outcome() {
        let generator = Arc::new(ScriptedGenerator::new([]));
        let sandbox = Arc::new(ScriptedSandbox::default());
        let outcome = verifier(generator, sandbox.clone()).verify_claim("claim").await;

        assert!(!outcome.verified);
        assert_eq!(outcome.attempts, 0);
        assert_eq!(sandbox.execution_count(), 0);
    }

    #[test]
    fn test_apply_to_node_sets_level_and_metadata() {
        let mut graph = KnowledgeGraph::new();
        let id = graph.add_node(KnowledgeNode::new(NodeType::Claim, "2 + 2 = 4"));
        let outcome = VerificationOutcome {
            verified: true,
            confidence: VERIFIED_CONFIDENCE,
            evidence: "computed".to_string(),
            code: String::new(),
            output: String::new(),
            attempts: 1,
        };

        let level = apply_to_node(&mut graph, &id, &outcome).unwrap();
        assert_eq!(level, ConfidenceLevel::Verified);
        let node = graph.get_node(&id).unwrap();
        assert_eq!(node.confidence, ConfidenceLevel::Verified);
        assert_eq!(node.metadata["verification"]["attempts"], 1);
    }

    #[tokio::test]
    async fn test_handler_targets_claim_node() {
        let generator = Arc::new(ScriptedGenerator::constant("print(1)"));
        let sandbox = Arc::new(ScriptedSandbox::new([verdict(true)]));
        let handler = VerificationHandler::new(Arc::new(verifier(generator, sandbox)));
        let ctx = HandlerContext::detached();
        let claim_id = ctx
            .knowledge
            .write()
            .await
            .add_node(KnowledgeNode::new(NodeType::Claim, "2 + 2 = 4"));

        let task = Task::new("v1", TaskKind::Verification, "ignored")
            .with_metadata("claim_node", json!(claim_id));
        let outcome = handler.handle(task, ctx.clone()).await;

        assert!(matches!(outcome, TaskOutcome::Completed(ref r) if r.len() == 1));
        let knowledge = ctx.knowledge.read().await;
        assert_eq!(knowledge.len(), 1);
        assert_eq!(
            knowledge.get_node(&claim_id).unwrap().confidence,
            ConfidenceLevel::Verified
        );
    }

    #[tokio::test]
    async fn test_handler_falls_back_to_query() {
        let generator = Arc::new(ScriptedGenerator::constant("print(1)"));
        let sandbox = Arc::new(ScriptedSandbox::new([verdict(false)]));
        let handler = VerificationHandler::new(Arc::new(verifier(generator, sandbox)));
        let ctx = HandlerContext::detached();

        handler
            .handle(Task::new("v1", TaskKind::Verification, "2 + 2 = 5"), ctx.clone())
            .await;

        let knowledge = ctx.knowledge.read().await;
        let claims = knowledge.get_by_type(NodeType::Claim);
        assert_eq!(claims.len(), 1);
        assert_eq!(claims[0].content, "2 + 2 = 5");
        // Refuted with 0.3 confidence maps to Low.
        assert_eq!(claims[0].confidence, ConfidenceLevel::Low);
    }
}
