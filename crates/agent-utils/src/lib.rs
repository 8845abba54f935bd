//! Shared utilities for agent-rs
//!
//! This crate provides common functionality used across the agent-rs workspace:
//! tracing bootstrap and the layered configuration that feeds the runner.

pub mod config;
pub mod logging;

pub use config::{Config, ConfigLoadError, LogFormat, RunnerSettings};
pub use logging::{init_tracing, init_tracing_with};
