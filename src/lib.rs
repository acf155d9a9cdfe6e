//! Research Swarm - layered task execution for multi-stage research
//!
//! Research work is modelled as a dependency graph of retrieval, discourse,
//! verification and synthesis tasks. The swarm coordinator runs the graph
//! one topological layer at a time, bounding external calls with
//! per-resource semaphores, and every stage writes into a shared knowledge
//! graph. Claims are verified by generating code and running it in an
//! isolated sandbox, and disagreeing nodes are settled by a weighted
//! conflict resolver.
//!
//! # Architecture
//!
//! - **Domain Layer** (`domain`): task and knowledge graphs, errors and ports
//! - **Service Layer** (`services`): coordinator, handlers, verification, conflicts
//! - **Adapters** (`adapters`): HTTP and in-memory implementations of the ports
//! - **Infrastructure Layer** (`infrastructure`): configuration, logging, sandboxes
//! - **CLI Layer** (`cli`): command-line interface
//!
//! # Example
//!
//! ```ignore
//! use research_swarm::{HandlerRegistry, SwarmCoordinator, TaskGraph};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let graph = TaskGraph::from_tasks(tasks)?;
//!     let report = coordinator.run(Arc::new(RwLock::new(graph))).await?;
//!     Ok(())
//! }
//! ```

pub mod adapters;
pub mod cli;
pub mod domain;
pub mod infrastructure;
pub mod services;

pub use domain::models::{
    ConfidenceLevel, Config, Conflict, ExecutionResult, KnowledgeGraph, KnowledgeNode, NodeType,
    PlanFile, Resolution, Task, TaskGraph, TaskKind, TaskStatus,
};
pub use domain::ports::{Retriever, Sandbox, TextGenerator};
pub use domain::{DomainError, DomainResult};
pub use infrastructure::config::{ConfigError, ConfigLoader};
pub use services::{
    CodeVerifier, ConflictResolver, EventBus, HandlerRegistry, SwarmCoordinator, SwarmReport,
    TaskHandler, TaskOutcome,
};
