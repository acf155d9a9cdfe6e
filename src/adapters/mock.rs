//! In-memory adapters for tests and offline runs.

use async_trait::async_trait;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use crate::domain::models::ExecutionResult;
use crate::domain::ports::{
    Generation, GenerationConstraints, GenerationError, Message, RetrievalError, Retriever,
    Sandbox, SearchHit, TextGenerator, TokenUsage,
};

/// Scripted reply for one generation call.
#[derive(Debug, Clone)]
pub enum MockResponse {
    Success(String),
    Failure(String),
}

impl MockResponse {
    pub fn success(content: impl Into<String>) -> Self {
        Self::Success(content.into())
    }

    pub fn failure(error: impl Into<String>) -> Self {
        Self::Failure(error.into())
    }
}

type Responder =
    dyn Fn(&[Message], &GenerationConstraints) -> MockResponse + Send + Sync;

/// Recorded generation call.
#[derive(Debug, Clone)]
pub struct RecordedCall {
    pub messages: Vec<Message>,
    pub constraints: GenerationConstraints,
}

/// Text generator that replays a queue of responses, then falls back to a
/// responder function (or fails when none is set).
#[derive(Default)]
pub struct ScriptedGenerator {
    queue: Mutex<VecDeque<MockResponse>>,
    responder: Option<Arc<Responder>>,
    calls: Mutex<Vec<RecordedCall>>,
}

impl ScriptedGenerator {
    pub fn new(responses: impl IntoIterator<Item = MockResponse>) -> Self {
        Self {
            queue: Mutex::new(responses.into_iter().collect()),
            ..Self::default()
        }
    }

    /// Answer every call with `respond` once the queue is empty.
    pub fn with_responder<F>(mut self, respond: F) -> Self
    where
        F: Fn(&[Message], &GenerationConstraints) -> MockResponse + Send + Sync + 'static,
    {
        self.responder = Some(Arc::new(respond));
        self
    }

    /// Always answer with `content`.
    pub fn constant(content: impl Into<String>) -> Self {
        let content = content.into();
        Self::default().with_responder(move |_, _| MockResponse::success(content.clone()))
    }

    pub fn push(&self, response: MockResponse) {
        self.queue
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push_back(response);
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap_or_else(PoisonError::into_inner).len()
    }
}

#[async_trait]
impl TextGenerator for ScriptedGenerator {
    fn name(&self) -> &'static str {
        "scripted"
    }

    async fn generate(
        &self,
        messages: &[Message],
        constraints: &GenerationConstraints,
    ) -> Result<Generation, GenerationError> {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(RecordedCall {
                messages: messages.to_vec(),
                constraints: constraints.clone(),
            });

        let scripted = self
            .queue
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop_front();
        let response = match (scripted, &self.responder) {
            (Some(response), _) => response,
            (None, Some(respond)) => respond(messages, constraints),
            (None, None) => MockResponse::failure("no scripted response left"),
        };

        match response {
            MockResponse::Success(content) => Ok(Generation {
                usage: Some(TokenUsage {
                    input_tokens: messages.iter().map(|m| m.content.len() as u64).sum(),
                    output_tokens: content.len() as u64,
                }),
                content,
                model: "scripted".to_string(),
            }),
            MockResponse::Failure(error) => Err(GenerationError::Unavailable(error)),
        }
    }
}

/// Retriever with canned hits per query.
#[derive(Default)]
pub struct StaticRetriever {
    hits: HashMap<String, Vec<SearchHit>>,
    default_hits: Vec<SearchHit>,
    failing: HashSet<String>,
    calls: AtomicUsize,
}

impl StaticRetriever {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_hits(mut self, query: impl Into<String>, hits: Vec<SearchHit>) -> Self {
        self.hits.insert(query.into(), hits);
        self
    }

    /// Hits returned for any query without a specific entry.
    pub fn with_default_hits(mut self, hits: Vec<SearchHit>) -> Self {
        self.default_hits = hits;
        self
    }

    pub fn failing_on(mut self, query: impl Into<String>) -> Self {
        self.failing.insert(query.into());
        self
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Retriever for StaticRetriever {
    fn name(&self) -> &'static str {
        "static"
    }

    async fn search(&self, query: &str, max_results: usize) -> Result<Vec<SearchHit>, RetrievalError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.failing.contains(query) {
            return Err(RetrievalError::Request(format!("search failed for {query}")));
        }
        let hits = self.hits.get(query).unwrap_or(&self.default_hits);
        Ok(hits.iter().take(max_results).cloned().collect())
    }
}

/// Sandbox that replays queued results and records what it was asked to run.
#[derive(Default)]
pub struct ScriptedSandbox {
    results: Mutex<VecDeque<ExecutionResult>>,
    executed: Mutex<Vec<String>>,
}

impl ScriptedSandbox {
    pub fn new(results: impl IntoIterator<Item = ExecutionResult>) -> Self {
        Self {
            results: Mutex::new(results.into_iter().collect()),
            executed: Mutex::new(Vec::new()),
        }
    }

    /// Programs executed so far, in order.
    pub fn executed(&self) -> Vec<String> {
        self.executed
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn execution_count(&self) -> usize {
        self.executed.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    fn next(&self, program: &str) -> ExecutionResult {
        self.executed
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(program.to_string());
        self.results
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop_front()
            .unwrap_or_else(|| ExecutionResult::startup_failure("no scripted result left"))
    }
}

#[async_trait]
impl Sandbox for ScriptedSandbox {
    fn name(&self) -> &'static str {
        "scripted"
    }

    async fn execute_code(&self, source: &str, _timeout: Duration) -> ExecutionResult {
        self.next(source)
    }

    async fn execute_shell(&self, command: &str, _timeout: Duration) -> ExecutionResult {
        self.next(command)
    }
}
