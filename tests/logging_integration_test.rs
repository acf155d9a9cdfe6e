// Installs the global subscriber, so it lives in its own test binary.

use std::fs;
use std::time::Duration;

use research_swarm::infrastructure::logging::{LogConfig, LogFormat, LoggerImpl, RotationPolicy};
use tempfile::TempDir;
use tracing::{info, instrument};

#[instrument]
fn instrumented_add(a: i32, b: i32) -> i32 {
    info!("adding");
    a + b
}

#[test]
fn test_file_output_is_json() {
    let temp_dir = TempDir::new().unwrap();
    let config = LogConfig {
        level: "info".to_string(),
        format: LogFormat::Json,
        log_dir: Some(temp_dir.path().to_path_buf()),
        rotation: RotationPolicy::Never,
    };

    let logger = LoggerImpl::init(&config).unwrap();
    info!(task_id = "t-1", "task dispatched");
    assert_eq!(instrumented_add(5, 7), 12);

    drop(logger);
    std::thread::sleep(Duration::from_millis(100));

    let contents = fs::read_to_string(temp_dir.path().join("research-swarm.log")).unwrap();
    let lines: Vec<serde_json::Value> = contents
        .lines()
        .map(|line| serde_json::from_str(line).unwrap())
        .collect();

    assert!(lines
        .iter()
        .any(|l| l["fields"]["message"] == "task dispatched" && l["fields"]["task_id"] == "t-1"));
    assert!(lines.iter().any(|l| l["span"]["name"] == "instrumented_add"));

    let second = LoggerImpl::init(&LogConfig::default());
    assert!(second.is_err(), "a second global subscriber must be rejected");
}
