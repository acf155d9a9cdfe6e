//! Ports to the external capabilities the engine depends on.

pub mod retrieval;
pub mod sandbox;
pub mod text_generation;

pub use retrieval::{RetrievalError, Retriever, SearchHit};
pub use sandbox::Sandbox;
pub use text_generation::{
    Generation, GenerationConstraints, GenerationError, Message, Role, TextGenerator, TokenUsage,
};
