//! Error types for agent-core

use std::time::Duration;
use thiserror::Error;

/// Result type alias for agent-core
pub type Result<T> = std::result::Result<T, Error>;

/// Error type for agent runs
///
/// Retryable failures ([`Error::Transport`], [`Error::Timeout`]) are absorbed
/// by the runner within their budgets. [`Error::Validation`] is turned into
/// model-visible feedback. Everything else ends the run.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum Error {
    /// Bad agent or tool declaration, detected at construction
    #[error("Configuration error: {0}")]
    Config(String),

    /// Tool input does not satisfy its contract
    #[error("Validation failed: {0}")]
    Validation(String),

    /// Tool executor failed beyond the retry budget
    #[error("Tool '{tool}' failed: {message}")]
    ToolExecution {
        /// Tool name
        tool: String,
        /// Failure description
        message: String,
    },

    /// Model invocation failed in a way that may succeed on retry
    #[error("Transport error: {0}")]
    Transport(String),

    /// Model provider rejected the request (auth, bad request, unknown model)
    #[error("Model error: {0}")]
    Model(String),

    /// A model or tool call exceeded its deadline
    #[error("{operation} timed out after {timeout:?}")]
    Timeout {
        /// What timed out, e.g. "model call" or "tool 'burn_rate'"
        operation: String,
        /// The deadline that was exceeded
        timeout: Duration,
    },

    /// Handoff target is not reachable from the active agent
    #[error("Unknown agent: {0}")]
    UnknownAgent(String),

    /// Run was cancelled or its deadline passed
    #[error("Run cancelled")]
    Cancelled,

    /// Generic error message
    #[error("{0}")]
    Generic(String),
}

impl Error {
    /// Whether a bounded retry may fix this failure
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::Transport(_) | Error::Timeout { .. })
    }

    /// Convenience constructor for tool failures
    pub fn tool(tool: impl Into<String>, message: impl Into<String>) -> Self {
        Error::ToolExecution {
            tool: tool.into(),
            message: message.into(),
        }
    }
}
