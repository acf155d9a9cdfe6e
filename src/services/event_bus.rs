//! EventBus service for pipeline event streaming.
//!
//! Provides a broadcast-based event system with sequence numbering and
//! correlation tracking. The bus is constructed once and handed to every
//! component that publishes; a slow or absent subscriber never blocks a
//! publisher.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{broadcast, RwLock};
use uuid::Uuid;

use crate::domain::models::{ResolutionOutcome, Severity, TaskProgress};

/// Unique identifier for an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EventId(pub Uuid);

impl EventId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for EventId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for EventId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Monotonically increasing sequence number assigned by EventBus.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SequenceNumber(pub u64);

impl SequenceNumber {
    pub const fn zero() -> Self {
        Self(0)
    }
}

impl std::fmt::Display for SequenceNumber {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Event severity level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventSeverity {
    Debug,
    Info,
    Warning,
    Error,
}

impl std::fmt::Display for EventSeverity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Debug => write!(f, "debug"),
            Self::Info => write!(f, "info"),
            Self::Warning => write!(f, "warning"),
            Self::Error => write!(f, "error"),
        }
    }
}

/// Event category for filtering and routing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventCategory {
    Run,
    Task,
    Retrieval,
    Discourse,
    Verification,
    Conflict,
}

impl std::fmt::Display for EventCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Run => write!(f, "run"),
            Self::Task => write!(f, "task"),
            Self::Retrieval => write!(f, "retrieval"),
            Self::Discourse => write!(f, "discourse"),
            Self::Verification => write!(f, "verification"),
            Self::Conflict => write!(f, "conflict"),
        }
    }
}

/// Event envelope containing all event metadata.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UnifiedEvent {
    pub id: EventId,
    pub sequence: SequenceNumber,
    pub timestamp: DateTime<Utc>,
    pub severity: EventSeverity,
    pub category: EventCategory,
    pub task_id: Option<String>,
    pub correlation_id: Option<Uuid>,
    pub payload: EventPayload,
}

impl UnifiedEvent {
    /// Dotted event name, e.g. `task.failed`.
    pub const fn name(&self) -> &'static str {
        self.payload.name()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum EventPayload {
    // Run lifecycle
    RunStarted {
        total_tasks: usize,
        layer_count: usize,
    },
    LayerStarted {
        layer: usize,
        task_count: usize,
    },
    LayerCompleted {
        layer: usize,
        succeeded: usize,
        failed: usize,
    },
    Progress {
        layer: usize,
        progress: TaskProgress,
    },
    RunCompleted {
        completed: usize,
        failed: usize,
        skipped: usize,
        duration_ms: u64,
    },

    // Task lifecycle
    TaskStarted {
        task_id: String,
        kind: String,
        query: String,
    },
    TaskCompleted {
        task_id: String,
        result_count: usize,
    },
    TaskFailed {
        task_id: String,
        error: String,
    },

    // Retrieval
    RetrievalStarted {
        task_id: String,
        query: String,
    },
    RetrievalCompleted {
        task_id: String,
        count: usize,
    },
    RetrievalFailed {
        task_id: String,
        error: String,
    },

    // Discourse
    DiscourseStarted {
        task_id: String,
        perspective: String,
        turns: usize,
    },
    DiscourseCompleted {
        task_id: String,
        findings: usize,
    },
    DiscourseFailed {
        task_id: String,
        error: String,
    },

    // Verification
    VerificationAttempt {
        attempt: u32,
        max_attempts: u32,
        success: bool,
    },
    VerificationCompleted {
        verified: bool,
        confidence: f64,
        attempts: u32,
    },

    // Conflicts
    ConflictDetected {
        node_ids: Vec<String>,
        severity: Severity,
        description: String,
    },
    ConflictResolved {
        winning_node_id: Option<String>,
        rejected: usize,
        outcome: ResolutionOutcome,
    },
}

impl EventPayload {
    pub const fn name(&self) -> &'static str {
        match self {
            Self::RunStarted { .. } => "run.started",
            Self::LayerStarted { .. } => "layer.started",
            Self::LayerCompleted { .. } => "layer.completed",
            Self::Progress { .. } => "phase.progress",
            Self::RunCompleted { .. } => "run.completed",
            Self::TaskStarted { .. } => "task.started",
            Self::TaskCompleted { .. } => "task.completed",
            Self::TaskFailed { .. } => "task.failed",
            Self::RetrievalStarted { .. } => "retrieval.start",
            Self::RetrievalCompleted { .. } => "retrieval.result",
            Self::RetrievalFailed { .. } => "retrieval.error",
            Self::DiscourseStarted { .. } => "discourse.start",
            Self::DiscourseCompleted { .. } => "discourse.complete",
            Self::DiscourseFailed { .. } => "discourse.error",
            Self::VerificationAttempt { .. } => "verification.attempt",
            Self::VerificationCompleted { .. } => "verification.complete",
            Self::ConflictDetected { .. } => "conflict.detected",
            Self::ConflictResolved { .. } => "conflict.resolved",
        }
    }
}

/// Derive envelope fields from the payload.
impl From<EventPayload> for UnifiedEvent {
    fn from(payload: EventPayload) -> Self {
        let (severity, category, task_id) = match &payload {
            EventPayload::RunStarted { .. }
            | EventPayload::LayerStarted { .. }
            | EventPayload::Progress { .. } => (EventSeverity::Info, EventCategory::Run, None),
            EventPayload::LayerCompleted { failed, .. } => (
                if *failed > 0 { EventSeverity::Warning } else { EventSeverity::Info },
                EventCategory::Run,
                None,
            ),
            EventPayload::RunCompleted { failed, skipped, .. } => (
                if *failed > 0 || *skipped > 0 { EventSeverity::Warning } else { EventSeverity::Info },
                EventCategory::Run,
                None,
            ),
            EventPayload::TaskStarted { task_id, .. } | EventPayload::TaskCompleted { task_id, .. } => {
                (EventSeverity::Info, EventCategory::Task, Some(task_id.clone()))
            }
            EventPayload::TaskFailed { task_id, .. } => {
                (EventSeverity::Error, EventCategory::Task, Some(task_id.clone()))
            }
            EventPayload::RetrievalStarted { task_id, .. }
            | EventPayload::RetrievalCompleted { task_id, .. } => {
                (EventSeverity::Info, EventCategory::Retrieval, Some(task_id.clone()))
            }
            EventPayload::RetrievalFailed { task_id, .. } => {
                (EventSeverity::Warning, EventCategory::Retrieval, Some(task_id.clone()))
            }
            EventPayload::DiscourseStarted { task_id, .. }
            | EventPayload::DiscourseCompleted { task_id, .. } => {
                (EventSeverity::Info, EventCategory::Discourse, Some(task_id.clone()))
            }
            EventPayload::DiscourseFailed { task_id, .. } => {
                (EventSeverity::Warning, EventCategory::Discourse, Some(task_id.clone()))
            }
            EventPayload::VerificationAttempt { success, .. } => (
                if *success { EventSeverity::Info } else { EventSeverity::Debug },
                EventCategory::Verification,
                None,
            ),
            EventPayload::VerificationCompleted { .. } => {
                (EventSeverity::Info, EventCategory::Verification, None)
            }
            EventPayload::ConflictDetected { .. } => {
                (EventSeverity::Warning, EventCategory::Conflict, None)
            }
            EventPayload::ConflictResolved { .. } => {
                (EventSeverity::Info, EventCategory::Conflict, None)
            }
        };

        Self {
            id: EventId::new(),
            sequence: SequenceNumber::zero(),
            timestamp: Utc::now(),
            severity,
            category,
            task_id,
            correlation_id: None,
            payload,
        }
    }
}

/// Configuration for the EventBus.
#[derive(Debug, Clone)]
pub struct EventBusConfig {
    /// Channel capacity for the broadcast channel.
    pub channel_capacity: usize,
}

impl Default for EventBusConfig {
    fn default() -> Self {
        Self {
            channel_capacity: 1024,
        }
    }
}

/// Broadcast hub shared by every pipeline component.
pub struct EventBus {
    sender: broadcast::Sender<UnifiedEvent>,
    sequence: AtomicU64,
    correlation_context: Arc<RwLock<Option<Uuid>>>,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(EventBusConfig::default())
    }
}

impl EventBus {
    /// Create a new EventBus with the given configuration.
    pub fn new(config: EventBusConfig) -> Self {
        let (sender, _) = broadcast::channel(config.channel_capacity.max(1));
        Self {
            sender,
            sequence: AtomicU64::new(0),
            correlation_context: Arc::new(RwLock::new(None)),
        }
    }

    /// Publish an event, assigning its sequence number.
    pub async fn publish(&self, mut event: UnifiedEvent) {
        let seq = self.sequence.fetch_add(1, Ordering::SeqCst);
        event.sequence = SequenceNumber(seq);

        if event.correlation_id.is_none() {
            let ctx = self.correlation_context.read().await;
            event.correlation_id = *ctx;
        }

        tracing::trace!(event = event.name(), sequence = seq, "publishing event");

        // No subscribers is not an error
        let _ = self.sender.send(event);
    }

    /// Publish a payload, deriving the envelope.
    pub async fn emit(&self, payload: EventPayload) {
        self.publish(payload.into()).await;
    }

    /// Subscribe to every event published after this call.
    pub fn subscribe(&self) -> broadcast::Receiver<UnifiedEvent> {
        self.sender.subscribe()
    }

    /// Get the current sequence number.
    pub fn current_sequence(&self) -> SequenceNumber {
        SequenceNumber(self.sequence.load(Ordering::SeqCst))
    }

    /// Start a new correlation context for tracking related events.
    pub async fn start_correlation(&self) -> Uuid {
        let id = Uuid::new_v4();
        let mut ctx = self.correlation_context.write().await;
        *ctx = Some(id);
        id
    }

    /// End the current correlation context.
    pub async fn end_correlation(&self) {
        let mut ctx = self.correlation_context.write().await;
        *ctx = None;
    }

    /// Get the number of active subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

/// Drain every event currently buffered in a receiver.
pub fn drain(rx: &mut broadcast::Receiver<UnifiedEvent>) -> Vec<UnifiedEvent> {
    let mut events = Vec::new();
    loop {
        match rx.try_recv() {
            Ok(event) => events.push(event),
            Err(broadcast::error::TryRecvError::Lagged(_)) => {}
            Err(_) => break,
        }
    }
    events
}
