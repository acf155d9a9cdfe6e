//! Execution sandboxes
//!
//! - Container isolation through a docker-compatible CLI
//! - Host process isolation with process-group termination
//! - Runtime detection and fallback

pub mod container;
pub mod detector;
pub mod process;

pub use container::ContainerSandbox;
pub use detector::{create_sandbox, detect, probe_runtime};
pub use process::ProcessSandbox;
