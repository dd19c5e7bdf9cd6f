//! Configuration management for Flowgate

use anyhow::{Context, Result};
use std::env;

/// Application configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Remote workflow engine configuration
    pub engine: WorkflowEngineConfig,
    /// Retry tuning overrides
    pub retry: RetryConfig,
    /// Execution wait configuration
    pub execution: ExecutionConfig,
    /// Telemetry configuration
    pub telemetry: TelemetryConfig,
}

#[derive(Debug, Clone)]
pub struct WorkflowEngineConfig {
    /// Base URL of the workflow engine API (e.g. https://engine.example/v1/)
    pub base_url: String,
    pub api_key: String,
    /// Per-request HTTP timeout in seconds
    pub request_timeout_secs: u64,
}

/// Operator overrides for the per-class attempt caps. `None` keeps the
/// built-in policy table.
#[derive(Debug, Clone, Default)]
pub struct RetryConfig {
    pub network_attempts: Option<u32>,
    pub remote_attempts: Option<u32>,
    pub refresh_attempts: Option<u32>,
}

#[derive(Debug, Clone)]
pub struct ExecutionConfig {
    /// Overall ceiling for a workflow execution wait, in seconds
    pub wait_ceiling_secs: u64,
    /// Delay between status polls, in milliseconds
    pub poll_interval_ms: u64,
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            wait_ceiling_secs: 600,
            poll_interval_ms: 2000,
        }
    }
}

#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    /// "json" or "text"
    pub log_format: String,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            log_format: "text".to_string(),
        }
    }
}

impl Config {
    /// Load a `.env` file if present, then read the environment.
    pub fn load() -> Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_env()
    }

    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            engine: WorkflowEngineConfig {
                base_url: env::var("WORKFLOW_ENGINE_URL")
                    .context("WORKFLOW_ENGINE_URL is required")?,
                api_key: env::var("WORKFLOW_ENGINE_API_KEY").unwrap_or_default(),
                request_timeout_secs: parse_or("WORKFLOW_ENGINE_TIMEOUT_SECS", 30)?,
            },
            retry: RetryConfig {
                network_attempts: parse_optional("RETRY_NETWORK_ATTEMPTS")?,
                remote_attempts: parse_optional("RETRY_REMOTE_ATTEMPTS")?,
                refresh_attempts: parse_optional("RETRY_REFRESH_ATTEMPTS")?,
            },
            execution: ExecutionConfig {
                wait_ceiling_secs: parse_or("EXECUTION_WAIT_CEILING_SECS", 600)?,
                poll_interval_ms: parse_or("EXECUTION_POLL_INTERVAL_MS", 2000)?,
            },
            telemetry: TelemetryConfig {
                log_format: env::var("LOG_FORMAT").unwrap_or_else(|_| "text".to_string()),
            },
        })
    }
}

fn parse_optional(key: &str) -> Result<Option<u32>> {
    match env::var(key) {
        Ok(raw) => {
            let value = raw.parse().with_context(|| format!("Invalid {key}"))?;
            Ok(Some(value))
        }
        Err(_) => Ok(None),
    }
}

/// Parse an env var, falling back to `default` only when the var is unset.
/// A value that is present but malformed is an error, not a silent default.
fn parse_or<T>(key: &str, default: T) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match env::var(key) {
        Ok(raw) => raw.parse().with_context(|| format!("Invalid {key}")),
        Err(_) => Ok(default),
    }
}
