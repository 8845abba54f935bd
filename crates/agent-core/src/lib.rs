//! Core abstractions for agent-rs
//!
//! This crate defines the types shared by every layer of a multi-agent run:
//! the run-scoped context, the handoff signal a tool returns to delegate
//! control, and the error taxonomy.

pub mod context;
pub mod error;
pub mod handoff;

pub use context::{ContextHandle, RunContext};
pub use error::{Error, Result};
pub use handoff::{HandoffSignal, ToolOutput};
