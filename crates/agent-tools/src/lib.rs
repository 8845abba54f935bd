//! Tool management and execution framework for agent-rs
//!
//! This crate provides a framework for defining the tools (functions) agents
//! can call, including the synthesized tools through which an agent hands a
//! run off to another agent.

pub mod function;
pub mod handoff;
pub mod registry;
pub mod tool;

pub use function::FnTool;
pub use handoff::{HANDOFF_TOOL_PREFIX, HandoffTool, handoff_tool_name, is_handoff};
pub use registry::ToolRegistry;
pub use tool::Tool;
