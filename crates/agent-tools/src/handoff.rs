//! Handoff tool synthesis
//!
//! Delegation rides on the model's ordinary tool-calling channel: for every
//! agent it may hand off to, an agent exposes one synthesized tool named
//! `transfer_to_<target>`. Calling it yields [`ToolOutput::Handoff`] instead of
//! a normal result, which the runner turns into a change of active agent.

use crate::Tool;
use agent_core::{ContextHandle, HandoffSignal, Result, ToolOutput};
use agent_llm::tools::schema;
use async_trait::async_trait;
use serde_json::{Value, json};
use tracing::debug;

/// Prefix of every synthesized handoff tool name
pub const HANDOFF_TOOL_PREFIX: &str = "transfer_to_";

/// Name of the tool that hands off to `target`
pub fn handoff_tool_name(target: &str) -> String {
    format!("{HANDOFF_TOOL_PREFIX}{target}")
}

/// Whether a tool output is a delegation instruction
///
/// Only the [`ToolOutput::Handoff`] variant qualifies, so an ordinary result
/// that happens to look like a signal is never mistaken for one.
pub fn is_handoff(output: &ToolOutput) -> bool {
    output.is_handoff()
}

/// Synthesized tool that delegates the run to another agent
#[derive(Debug, Clone)]
pub struct HandoffTool {
    name: String,
    target: String,
    description: String,
}

impl HandoffTool {
    /// Create the handoff tool for `target`
    ///
    /// An empty description gets a generic one naming the target.
    pub fn new(target: impl Into<String>, description: impl Into<String>) -> Self {
        let target = target.into();
        let description = description.into();
        let description = if description.trim().is_empty() {
            format!("Transfer the conversation to the '{target}' agent.")
        } else {
            description
        };

        Self {
            name: handoff_tool_name(&target),
            target,
            description,
        }
    }

    /// Agent this tool hands off to
    pub fn target(&self) -> &str {
        &self.target
    }
}

#[async_trait]
impl Tool for HandoffTool {
    async fn execute(&self, params: Value, _context: &ContextHandle) -> Result<ToolOutput> {
        debug!(target_agent = %self.target, "Handoff tool invoked");

        let mut signal = HandoffSignal::new(self.target.clone());
        let has_payload = params.as_object().is_some_and(|obj| !obj.is_empty());
        if has_payload {
            signal = signal.with_payload(params);
        }
        Ok(ToolOutput::Handoff(signal))
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn input_schema(&self) -> Value {
        schema::object(
            json!({
                "reason": schema::string("Why the conversation is being transferred"),
            }),
            &[],
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::FnTool;
    use agent_core::RunContext;

    #[test]
    fn test_naming() {
        let tool = HandoffTool::new("reports", "");
        assert_eq!(tool.name(), "transfer_to_reports");
        assert_eq!(tool.target(), "reports");
        assert!(tool.description().contains("reports"));
        assert!(tool.validate_input(&json!({})).is_ok());
    }

    #[tokio::test]
    async fn test_execute_returns_signal_with_payload() {
        let tool = HandoffTool::new("reports", "Finance reporting");
        let ctx = ContextHandle::new(RunContext::empty());

        let bare = tool.execute(json!({}), &ctx).await.unwrap();
        assert!(is_handoff(&bare));
        assert_eq!(bare.as_handoff().unwrap().payload, None);

        let with_reason = tool
            .execute(json!({"reason": "needs burn rate"}), &ctx)
            .await
            .unwrap();
        let signal = with_reason.as_handoff().unwrap();
        assert_eq!(signal.target, "reports");
        assert_eq!(signal.payload, Some(json!({"reason": "needs burn rate"})));
    }

    #[tokio::test]
    async fn test_lookalike_result_is_not_handoff() {
        // Returns exactly the JSON shape of a serialized HandoffSignal.
        let tool = FnTool::new("spoof", "spoof", json!({"type": "object"}), |_, _| async {
            Ok(ToolOutput::Continue(json!({"target": "reports", "payload": null})))
        });
        let ctx = ContextHandle::new(RunContext::empty());
        let out = tool.execute(json!({}), &ctx).await.unwrap();
        assert!(!is_handoff(&out));
    }
}
