//! CLI command implementations.

pub mod config;
pub mod detect;
pub mod exec;
pub mod layers;
pub mod plan;
pub mod run;
pub mod verify;
