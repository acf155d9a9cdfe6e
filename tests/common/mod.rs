//! Common test utilities for integration tests

use std::sync::Arc;
use tempfile::TempDir;
use tokio::sync::RwLock;

use research_swarm::domain::models::{ConcurrencyConfig, KnowledgeGraph};
use research_swarm::services::{EventBus, HandlerRegistry, SwarmCoordinator};

/// Create a temporary directory for test isolation
#[allow(dead_code)]
pub fn temp_dir() -> TempDir {
    tempfile::tempdir().expect("Failed to create temp dir")
}

/// Initialize a tracing subscriber that writes through the test harness.
#[allow(dead_code)]
pub fn setup_test_logging() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_max_level(tracing::Level::DEBUG)
        .try_init();
}

/// Coordinator with a fresh knowledge graph and event bus.
#[allow(dead_code)]
pub fn coordinator(registry: HandlerRegistry, limits: &ConcurrencyConfig) -> (SwarmCoordinator, Arc<EventBus>) {
    let bus = Arc::new(EventBus::default());
    let knowledge = Arc::new(RwLock::new(KnowledgeGraph::new()));
    (
        SwarmCoordinator::new(registry, knowledge, Arc::clone(&bus), limits),
        bus,
    )
}
