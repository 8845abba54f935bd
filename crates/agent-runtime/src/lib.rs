//! Agent runtime for multi-agent runs
//!
//! This crate provides the pieces that execute a run: immutable [`Agent`]
//! descriptors with synthesized handoff tools, the [`Runner`] loop with its
//! buffered ([`Runner::run`]) and streamed ([`Runner::run_stream`]) entry
//! points, per-run [`RunOptions`], and the optional [`MemoryProvider`] that
//! seeds history.

pub mod agent;
pub mod memory;
pub mod options;
pub mod registry;
pub mod result;
pub mod retry;
pub mod runner;
pub mod stream;

// Re-export key types
pub use agent::{Agent, AgentBuilder, Instructions, ModelSettings};
pub use memory::{InMemoryStore, MemoryProvider};
pub use options::{ConversationRef, RunOptions};
pub use registry::AgentRegistry;
pub use result::{RunOutcome, RunResult};
pub use retry::{RetryBudget, RetryPolicy};
pub use runner::{Runner, RunnerBuilder};
pub use stream::{AgentStatus, RunStream, Status, StreamChunk};
