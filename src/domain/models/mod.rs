//! Domain models for tasks, knowledge, conflicts and configuration.

pub mod config;
pub mod conflict;
pub mod execution;
pub mod knowledge;
pub mod task;
pub mod task_graph;

pub use config::{
    ConcurrencyConfig, Config, DiscourseConfig, GenerationConfig, LoggingConfig,
    RetrievalConfig, SandboxConfig, SandboxMode, VerificationConfig,
};
pub use conflict::{Conflict, ConsistencyLevel, Resolution, ResolutionOutcome, Severity};
pub use execution::{ExecutionResult, NO_EXIT_CODE};
pub use knowledge::{
    ConfidenceLevel, Edge, GraphStatistics, KnowledgeGraph, KnowledgeNode, NodeType, NodeUpdate,
};
pub use task::{Task, TaskKind, TaskProgress, TaskStatus};
pub use task_graph::{LayerPartition, PlanFile, TaskGraph};
