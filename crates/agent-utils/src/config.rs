//! Configuration management utilities
//!
//! Configuration is layered: built-in defaults, then an optional JSON file,
//! then `AGENT_*` environment variables.

use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

/// Errors raised while loading configuration
#[derive(Error, Debug)]
pub enum ConfigLoadError {
    /// Config file could not be read
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    /// Config file is not valid JSON for [`Config`]
    #[error("Failed to parse config: {0}")]
    Parse(#[from] serde_json::Error),

    /// An environment override has an unusable value
    #[error("Invalid value for {key}: {value}")]
    InvalidValue {
        /// Environment variable name
        key: String,
        /// Offending value
        value: String,
    },
}

/// Environment variable names recognised by [`Config::apply_env_with`]
pub mod env {
    /// Log filter directive (e.g. "debug", "agent_runtime=trace")
    pub const LOG_LEVEL: &str = "AGENT_LOG_LEVEL";
    /// "text" or "json"
    pub const LOG_FORMAT: &str = "AGENT_LOG_FORMAT";
    /// Step ceiling per run
    pub const MAX_STEPS: &str = "AGENT_MAX_STEPS";
    /// Per model-call timeout in milliseconds
    pub const MODEL_TIMEOUT_MS: &str = "AGENT_MODEL_TIMEOUT_MS";
    /// Per tool-call timeout in milliseconds
    pub const TOOL_TIMEOUT_MS: &str = "AGENT_TOOL_TIMEOUT_MS";
    /// Transport retry budget for model calls
    pub const MODEL_RETRIES: &str = "AGENT_MODEL_RETRIES";
    /// Retry budget for timed-out calls
    pub const TIMEOUT_RETRIES: &str = "AGENT_TIMEOUT_RETRIES";
    /// Tool failures tolerated before the run fails
    pub const TOOL_RETRIES: &str = "AGENT_TOOL_RETRIES";
    /// Name of the agent that starts each run
    pub const START_AGENT: &str = "AGENT_START_AGENT";
}

/// Output format for the tracing subscriber
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human readable lines
    #[default]
    Text,
    /// One JSON object per event
    Json,
}

/// Defaults applied to every run unless overridden per call
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunnerSettings {
    /// Maximum number of steps before a run stops with a step-limit outcome
    pub max_steps: usize,
    /// Timeout for a single model invocation, in milliseconds
    pub model_timeout_ms: u64,
    /// Timeout for a single tool execution, in milliseconds
    pub tool_timeout_ms: u64,
    /// Retries for transport failures of a model call
    pub model_retries: u32,
    /// Retries for timed-out calls (model or tool)
    pub timeout_retries: u32,
    /// Tool executor failures fed back to the model before the run fails
    pub tool_retries: u32,
    /// Agent that starts the run instead of the registry's entry agent
    pub start_agent: Option<String>,
}

impl Default for RunnerSettings {
    fn default() -> Self {
        Self {
            max_steps: 10,
            model_timeout_ms: 120_000,
            tool_timeout_ms: 30_000,
            model_retries: 2,
            timeout_retries: 1,
            tool_retries: 3,
            start_agent: None,
        }
    }
}

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Application name
    pub app_name: String,
    /// Environment (dev, prod, etc.)
    pub environment: String,
    /// Tracing filter directive
    pub log_level: String,
    /// Tracing output format
    pub log_format: LogFormat,
    /// Runner defaults
    pub runner: RunnerSettings,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            app_name: "agent-rs".to_string(),
            environment: "development".to_string(),
            log_level: "info".to_string(),
            log_format: LogFormat::Text,
            runner: RunnerSettings::default(),
        }
    }
}

impl Config {
    /// Parse a JSON document; missing fields keep their defaults
    pub fn from_json_str(json: &str) -> Result<Self, ConfigLoadError> {
        Ok(serde_json::from_str(json)?)
    }

    /// Load a JSON config file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigLoadError> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_json_str(&raw)
    }

    /// Defaults overridden by the process environment
    pub fn from_env() -> Result<Self, ConfigLoadError> {
        let mut config = Self::default();
        config.apply_env_with(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    /// Apply `AGENT_*` overrides using the given lookup function
    ///
    /// Taking the lookup as a parameter keeps this testable without touching
    /// the real process environment.
    pub fn apply_env_with<F>(&mut self, lookup: F) -> Result<(), ConfigLoadError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(level) = lookup(env::LOG_LEVEL) {
            self.log_level = level;
        }
        if let Some(format) = lookup(env::LOG_FORMAT) {
            self.log_format = match format.to_ascii_lowercase().as_str() {
                "text" => LogFormat::Text,
                "json" => LogFormat::Json,
                _ => return Err(invalid(env::LOG_FORMAT, format)),
            };
        }
        if let Some(v) = lookup(env::MAX_STEPS) {
            self.runner.max_steps = parse_positive(env::MAX_STEPS, v)?;
        }
        if let Some(v) = lookup(env::MODEL_TIMEOUT_MS) {
            self.runner.model_timeout_ms = parse_num(env::MODEL_TIMEOUT_MS, v)?;
        }
        if let Some(v) = lookup(env::TOOL_TIMEOUT_MS) {
            self.runner.tool_timeout_ms = parse_num(env::TOOL_TIMEOUT_MS, v)?;
        }
        if let Some(v) = lookup(env::MODEL_RETRIES) {
            self.runner.model_retries = parse_num(env::MODEL_RETRIES, v)?;
        }
        if let Some(v) = lookup(env::TIMEOUT_RETRIES) {
            self.runner.timeout_retries = parse_num(env::TIMEOUT_RETRIES, v)?;
        }
        if let Some(v) = lookup(env::TOOL_RETRIES) {
            self.runner.tool_retries = parse_num(env::TOOL_RETRIES, v)?;
        }
        if let Some(agent) = lookup(env::START_AGENT).filter(|a| !a.trim().is_empty()) {
            self.runner.start_agent = Some(agent);
        }
        Ok(())
    }
}

fn invalid(key: &str, value: String) -> ConfigLoadError {
    ConfigLoadError::InvalidValue {
        key: key.to_string(),
        value,
    }
}

fn parse_num<T: std::str::FromStr>(key: &str, value: String) -> Result<T, ConfigLoadError> {
    value.trim().parse().map_err(|_| invalid(key, value))
}

fn parse_positive(key: &str, value: String) -> Result<usize, ConfigLoadError> {
    match value.trim().parse::<usize>() {
        Ok(n) if n > 0 => Ok(n),
        _ => Err(invalid(key, value)),
    }
}
