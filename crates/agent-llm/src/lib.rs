//! Model-invocation layer for agent-rs
//!
//! This crate provides provider-agnostic abstractions for talking to Large
//! Language Models (LLMs). It includes:
//!
//! - Message types that make up a run's history
//! - Completion request/response types, buffered and streamed
//! - Tool declarations and tool calls for function calling
//! - The provider trait the runner drives
//! - A scripted provider for deterministic runs
//! - Concrete provider implementations (behind feature flags)

pub mod completion;
pub mod error;
pub mod messages;
pub mod provider;
pub mod scripted;
pub mod stream;
pub mod tools;

// Re-export main types
pub use completion::{CompletionRequest, CompletionResponse, StopReason, TokenUsage};
pub use error::{LLMError, Result};
pub use messages::{ContentBlock, Message, MessageContent, Role};
pub use provider::LLMProvider;
pub use scripted::{ScriptedProvider, ScriptedTurn};
pub use stream::{DeltaStream, StreamDelta};
pub use tools::{ToolCall, ToolDefinition};

// Provider implementations (feature-gated)
#[cfg(feature = "anthropic")]
pub mod providers;
