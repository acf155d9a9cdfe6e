//! Services layer: the execution engine and the research stages it drives.

pub mod conflict_detector;
pub mod conflict_resolver;
pub mod discourse;
pub mod event_bus;
pub mod retrieval_agent;
pub mod source_hierarchy;
pub mod swarm_coordinator;
pub mod task_graph_builder;
pub mod verification;

pub use conflict_detector::{run_conflict_resolution, ConflictDetector, ConflictReport};
pub use conflict_resolver::ConflictResolver;
pub use discourse::{DiscourseEngine, DiscourseHandler};
pub use event_bus::{EventBus, EventBusConfig, EventPayload, UnifiedEvent};
pub use retrieval_agent::RetrievalHandler;
pub use swarm_coordinator::{
    HandlerContext, HandlerRegistry, SwarmCoordinator, SwarmReport, TaskHandler, TaskOutcome,
};
pub use task_graph_builder::{ResearchOutline, TaskGraphBuilder};
pub use verification::{CodeVerifier, VerificationHandler, VerificationOutcome};

/// Pull the JSON payload out of a model response that may wrap it in a
/// Markdown fence or surround it with prose.
pub(crate) fn extract_json_from_response(response: &str) -> &str {
    let trimmed = response.trim();

    if let Some(rest) = trimmed.strip_prefix("```") {
        let body = rest.split_once('\n').map_or(rest, |(_, body)| body);
        if let Some(end) = body.rfind("```") {
            return body[..end].trim();
        }
    }

    let starts = trimmed.find(['{', '[']);
    let ends = trimmed.rfind(['}', ']']);
    match (starts, ends) {
        (Some(start), Some(end)) if end > start => &trimmed[start..=end],
        _ => trimmed,
    }
}
