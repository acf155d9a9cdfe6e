use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Main configuration structure for the research swarm
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct Config {
    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Per-resource concurrency limits
    #[serde(default)]
    pub concurrency: ConcurrencyConfig,

    /// Execution sandbox configuration
    #[serde(default)]
    pub sandbox: SandboxConfig,

    /// Verification retry loop configuration
    #[serde(default)]
    pub verification: VerificationConfig,

    /// Text-generation backend
    #[serde(default)]
    pub generation: GenerationConfig,

    /// Retrieval backend
    #[serde(default)]
    pub retrieval: RetrievalConfig,

    /// Expert/interrogator debate settings
    #[serde(default)]
    pub discourse: DiscourseConfig,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct LoggingConfig {
    /// Log level: trace, debug, info, warn, error
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log format: json or pretty
    #[serde(default = "default_log_format")]
    pub format: String,

    /// Directory for rolling log files; stdout only when unset
    #[serde(default)]
    pub log_dir: Option<PathBuf>,

    /// Rotation for file output: daily, hourly or never
    #[serde(default = "default_rotation")]
    pub rotation: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

fn default_rotation() -> String {
    "daily".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
            log_dir: None,
            rotation: default_rotation(),
        }
    }
}

/// Semaphore sizes for the two external resource classes
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct ConcurrencyConfig {
    /// Concurrent retrieval calls
    #[serde(default = "default_retrieval_limit")]
    pub retrieval_limit: usize,

    /// Concurrent text-generation calls
    #[serde(default = "default_generation_limit")]
    pub generation_limit: usize,
}

const fn default_retrieval_limit() -> usize {
    5
}

const fn default_generation_limit() -> usize {
    3
}

impl Default for ConcurrencyConfig {
    fn default() -> Self {
        Self {
            retrieval_limit: default_retrieval_limit(),
            generation_limit: default_generation_limit(),
        }
    }
}

/// Isolation mechanism selection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SandboxMode {
    /// Probe for a container runtime and fall back to processes
    #[default]
    Auto,
    Container,
    Process,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct SandboxConfig {
    #[serde(default)]
    pub mode: SandboxMode,

    /// Container runtime binary (docker-compatible CLI)
    #[serde(default = "default_runtime")]
    pub runtime: String,

    /// Container image used for code execution
    #[serde(default = "default_image")]
    pub image: String,

    /// Interpreter used for code, both in containers and host processes
    #[serde(default = "default_interpreter")]
    pub interpreter: String,

    /// Default execution timeout
    #[serde(default = "default_sandbox_timeout")]
    pub timeout_secs: u64,

    /// Upper bound on the container runtime probe
    #[serde(default = "default_probe_timeout")]
    pub probe_timeout_secs: u64,

    /// Time between SIGTERM and SIGKILL on timeout
    #[serde(default = "default_grace_period")]
    pub grace_period_secs: u64,

    /// Container memory limit in docker notation
    #[serde(default = "default_memory_limit")]
    pub memory_limit: String,

    /// Container CPU share
    #[serde(default = "default_cpu_limit")]
    pub cpu_limit: f64,
}

fn default_runtime() -> String {
    "docker".to_string()
}

fn default_image() -> String {
    "python:3.11-slim".to_string()
}

fn default_interpreter() -> String {
    "python3".to_string()
}

const fn default_sandbox_timeout() -> u64 {
    60
}

const fn default_probe_timeout() -> u64 {
    10
}

const fn default_grace_period() -> u64 {
    2
}

fn default_memory_limit() -> String {
    "256m".to_string()
}

const fn default_cpu_limit() -> f64 {
    0.5
}

impl Default for SandboxConfig {
    fn default() -> Self {
        Self {
            mode: SandboxMode::default(),
            runtime: default_runtime(),
            image: default_image(),
            interpreter: default_interpreter(),
            timeout_secs: default_sandbox_timeout(),
            probe_timeout_secs: default_probe_timeout(),
            grace_period_secs: default_grace_period(),
            memory_limit: default_memory_limit(),
            cpu_limit: default_cpu_limit(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct VerificationConfig {
    /// Executions allowed per claim, including the first
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Timeout for each execution
    #[serde(default = "default_verification_timeout")]
    pub timeout_secs: u64,
}

const fn default_max_attempts() -> u32 {
    3
}

const fn default_verification_timeout() -> u64 {
    30
}

impl Default for VerificationConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            timeout_secs: default_verification_timeout(),
        }
    }
}

/// OpenAI-compatible chat completion endpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct GenerationConfig {
    #[serde(default = "default_generation_url")]
    pub base_url: String,

    #[serde(default = "default_model")]
    pub model: String,

    /// Environment variable holding the API key
    #[serde(default = "default_generation_key_env")]
    pub api_key_env: String,

    #[serde(default = "default_temperature")]
    pub temperature: f32,

    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    #[serde(default = "default_generation_timeout")]
    pub timeout_secs: u64,
}

fn default_generation_url() -> String {
    "https://api.openai.com/v1".to_string()
}

fn default_model() -> String {
    "gpt-4o".to_string()
}

fn default_generation_key_env() -> String {
    "OPENAI_API_KEY".to_string()
}

const fn default_temperature() -> f32 {
    0.2
}

const fn default_max_tokens() -> u32 {
    4096
}

const fn default_generation_timeout() -> u64 {
    120
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            base_url: default_generation_url(),
            model: default_model(),
            api_key_env: default_generation_key_env(),
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
            timeout_secs: default_generation_timeout(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct RetrievalConfig {
    #[serde(default = "default_retrieval_url")]
    pub base_url: String,

    /// Environment variable holding the API key; requests go unauthenticated
    /// when it is unset
    #[serde(default = "default_retrieval_key_env")]
    pub api_key_env: String,

    #[serde(default = "default_max_results")]
    pub max_results: usize,

    #[serde(default = "default_retrieval_timeout")]
    pub timeout_secs: u64,
}

fn default_retrieval_url() -> String {
    "https://s.jina.ai".to_string()
}

fn default_retrieval_key_env() -> String {
    "JINA_API_KEY".to_string()
}

const fn default_max_results() -> usize {
    10
}

const fn default_retrieval_timeout() -> u64 {
    30
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            base_url: default_retrieval_url(),
            api_key_env: default_retrieval_key_env(),
            max_results: default_max_results(),
            timeout_secs: default_retrieval_timeout(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct DiscourseConfig {
    /// Expert/interrogator exchanges, clamped to 3..=5 at runtime
    #[serde(default = "default_turns")]
    pub turns: usize,
}

const fn default_turns() -> usize {
    3
}

impl Default for DiscourseConfig {
    fn default() -> Self {
        Self {
            turns: default_turns(),
        }
    }
}
