//! Builds the pipeline components a command needs from configuration.

use anyhow::{Context, Result};
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::adapters::{JinaRetriever, OpenAiCompatibleGenerator};
use crate::domain::models::{Config, KnowledgeGraph, TaskKind};
use crate::domain::ports::{Retriever, Sandbox, TextGenerator};
use crate::infrastructure::sandbox::create_sandbox;
use crate::services::{
    CodeVerifier, ConflictDetector, ConflictResolver, DiscourseEngine, DiscourseHandler, EventBus,
    HandlerRegistry, RetrievalHandler, SwarmCoordinator, VerificationHandler,
};

pub fn text_generator(config: &Config) -> Result<Arc<dyn TextGenerator>> {
    let generator = OpenAiCompatibleGenerator::from_config(&config.generation)
        .context("Failed to create text-generation client")?;
    Ok(Arc::new(generator))
}

pub fn retriever(config: &Config) -> Result<Arc<dyn Retriever>> {
    let retriever =
        JinaRetriever::from_config(&config.retrieval).context("Failed to create search client")?;
    Ok(Arc::new(retriever))
}

pub async fn sandbox(config: &Config) -> Arc<dyn Sandbox> {
    create_sandbox(&config.sandbox).await
}

pub fn verifier(
    config: &Config,
    generator: Arc<dyn TextGenerator>,
    sandbox: Arc<dyn Sandbox>,
    event_bus: Arc<EventBus>,
) -> CodeVerifier {
    CodeVerifier::new(generator, sandbox, event_bus, &config.verification)
}

/// Everything a full run needs, sharing one knowledge graph and event bus.
pub struct Pipeline {
    pub coordinator: SwarmCoordinator,
    pub detector: Option<ConflictDetector>,
    pub resolver: Option<ConflictResolver>,
    pub knowledge: Arc<RwLock<KnowledgeGraph>>,
    pub event_bus: Arc<EventBus>,
}

impl Pipeline {
    /// Wire real adapters into every handler.
    pub async fn connect(config: &Config, event_bus: Arc<EventBus>) -> Result<Self> {
        let generator = text_generator(config)?;
        let retriever = retriever(config)?;
        let sandbox = sandbox(config).await;

        let verifier = Arc::new(verifier(config, Arc::clone(&generator), sandbox, Arc::clone(&event_bus)));
        let registry = HandlerRegistry::new()
            .register(
                TaskKind::Retrieval,
                Arc::new(RetrievalHandler::new(retriever, config.retrieval.max_results)),
            )
            .register(
                TaskKind::Discourse,
                Arc::new(DiscourseHandler::new(DiscourseEngine::new(
                    Arc::clone(&generator),
                    config.discourse.turns,
                ))),
            )
            .register(TaskKind::Verification, Arc::new(VerificationHandler::new(verifier)));

        let knowledge = Arc::new(RwLock::new(KnowledgeGraph::new()));
        Ok(Self {
            coordinator: SwarmCoordinator::new(
                registry,
                Arc::clone(&knowledge),
                Arc::clone(&event_bus),
                &config.concurrency,
            ),
            detector: Some(ConflictDetector::new(Arc::clone(&generator))),
            resolver: Some(ConflictResolver::new(generator)),
            knowledge,
            event_bus,
        })
    }

    /// Every kind falls through to the pass-through handler; no external
    /// calls are made.
    pub fn dry_run(config: &Config, event_bus: Arc<EventBus>) -> Self {
        let knowledge = Arc::new(RwLock::new(KnowledgeGraph::new()));
        Self {
            coordinator: SwarmCoordinator::new(
                HandlerRegistry::new(),
                Arc::clone(&knowledge),
                Arc::clone(&event_bus),
                &config.concurrency,
            ),
            detector: None,
            resolver: None,
            knowledge,
            event_bus,
        }
    }
}
