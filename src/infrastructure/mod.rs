//! Infrastructure layer: configuration, logging and execution sandboxes.

pub mod config;
pub mod logging;
pub mod sandbox;
