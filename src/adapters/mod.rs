//! Adapters for the text-generation and retrieval ports.

pub mod http_generator;
pub mod jina_search;
pub mod mock;

pub use http_generator::OpenAiCompatibleGenerator;
pub use jina_search::JinaRetriever;
pub use mock::{MockResponse, ScriptedGenerator, ScriptedSandbox, StaticRetriever};
