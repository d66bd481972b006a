//! Runtime configuration
//!
//! `Settings` comes from the environment (and `.env`); `OrchestratorConfig`
//! is the value every engine component receives at construction.

use std::time::Duration;

use crate::agents::AgentError;
use crate::llm::ollama::DEFAULT_BASE_URL;

pub const DEFAULT_MODEL: &str = "gpt-oss:120b-cloud";
pub const DEFAULT_DATABASE_URL: &str = "sqlite://taskmesh.db?mode=rwc";

/// Process settings read from environment variables
#[derive(Debug, Clone)]
pub struct Settings {
    pub model_name: String,
    pub ollama_host: String,
    pub database_url: String,
    pub request_timeout: Duration,
}

impl Settings {
    /// Reads `MODEL_NAME`, `OLLAMA_HOST`, `DATABASE_URL` and `REQUEST_TIMEOUT_SECS`
    pub fn from_env() -> Result<Self, AgentError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, AgentError> {
        let request_timeout = match lookup("REQUEST_TIMEOUT_SECS") {
            Some(raw) => raw.trim().parse::<u64>().map(Duration::from_secs).map_err(|_| {
                AgentError::ConfigError(format!("REQUEST_TIMEOUT_SECS is not a number: {}", raw))
            })?,
            None => Duration::from_secs(300),
        };

        Ok(Self {
            model_name: lookup("MODEL_NAME").unwrap_or_else(|| DEFAULT_MODEL.to_string()),
            ollama_host: lookup("OLLAMA_HOST").unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
            database_url: lookup("DATABASE_URL").unwrap_or_else(|| {
                tracing::warn!("DATABASE_URL not set, using default");
                DEFAULT_DATABASE_URL.to_string()
            }),
            request_timeout,
        })
    }
}

/// Engine limits and timings
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    /// Model name passed to every chat call
    pub model: String,
    /// Outer attempts of the decomposer
    pub decomposition_attempts: usize,
    /// Model-call attempts per worker iteration
    pub call_attempts: usize,
    /// Pause between model-call attempts after a transient failure
    pub retry_delay: Duration,
    /// Pause between worker iterations
    pub iteration_pause: Duration,
    /// Longest the supervisor sleeps between poll cycles
    pub poll_interval: Duration,
    /// Attempts per review before the message is skipped
    pub review_attempts: usize,
    /// Pause between review attempts
    pub review_retry_delay: Duration,
}

impl OrchestratorConfig {
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            ..Self::default()
        }
    }
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            model: DEFAULT_MODEL.to_string(),
            decomposition_attempts: 3,
            call_attempts: 3,
            retry_delay: Duration::from_secs(5),
            iteration_pause: Duration::from_millis(100),
            poll_interval: Duration::from_millis(100),
            review_attempts: 3,
            review_retry_delay: Duration::from_secs(1),
        }
    }
}
