//! Discriminated tool results
//!
//! A tool executor returns [`ToolOutput`]. Delegation is its own variant, so
//! the runner never has to guess from the shape of a JSON value whether a
//! result is a handoff.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Instruction to transfer control of the run to another agent
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HandoffSignal {
    /// Name of the agent that takes over
    pub target: String,
    /// Optional data handed to the target
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<Value>,
}

impl HandoffSignal {
    /// Create a signal without a payload
    pub fn new(target: impl Into<String>) -> Self {
        Self {
            target: target.into(),
            payload: None,
        }
    }

    /// Attach a payload
    pub fn with_payload(mut self, payload: Value) -> Self {
        self.payload = Some(payload);
        self
    }
}

/// Outcome of a successful tool execution
#[derive(Debug, Clone, PartialEq)]
pub enum ToolOutput {
    /// Ordinary result; fed back to the same agent
    Continue(Value),
    /// Delegation to another agent
    Handoff(HandoffSignal),
}

impl ToolOutput {
    /// Whether this output is a delegation instruction
    pub fn is_handoff(&self) -> bool {
        matches!(self, ToolOutput::Handoff(_))
    }

    /// The handoff signal, if this output is one
    pub fn as_handoff(&self) -> Option<&HandoffSignal> {
        match self {
            ToolOutput::Handoff(signal) => Some(signal),
            ToolOutput::Continue(_) => None,
        }
    }
}

impl From<Value> for ToolOutput {
    fn from(value: Value) -> Self {
        ToolOutput::Continue(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_lookalike_value_is_not_a_handoff() {
        // Same field names as a serialized HandoffSignal, but an ordinary result.
        let lookalike = ToolOutput::from(json!({"target": "reports", "payload": {"x": 1}}));
        assert!(!lookalike.is_handoff());
        assert!(lookalike.as_handoff().is_none());
    }

    #[test]
    fn test_handoff_variant() {
        let output = ToolOutput::Handoff(
            HandoffSignal::new("reports").with_payload(json!({"reason": "numbers"})),
        );
        assert!(output.is_handoff());
        let signal = output.as_handoff().unwrap();
        assert_eq!(signal.target, "reports");
        assert_eq!(signal.payload, Some(json!({"reason": "numbers"})));
    }

    #[test]
    fn test_signal_serialization_omits_empty_payload() {
        let json = serde_json::to_value(HandoffSignal::new("reports")).unwrap();
        assert_eq!(json, json!({"target": "reports"}));
    }
}
