//! Run results

use agent_core::ContextHandle;
use agent_llm::{Message, TokenUsage};

/// How a run ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    /// An agent produced a final message
    Completed,
    /// The step ceiling was reached first; partial output is kept
    StepLimitExceeded,
    /// Cancelled or past its deadline
    ///
    /// Results of in-flight calls are discarded. Tool calls of the last
    /// assistant turn that never got a result are answered with a
    /// "Cancelled" tool error, so the history can seed a later run.
    Aborted,
}

/// Everything a run produced
#[derive(Debug, Clone)]
pub struct RunResult {
    /// Text of the final assistant message, if the run completed
    pub final_output: Option<String>,
    /// Full history: seeded, input and produced messages
    pub messages: Vec<Message>,
    /// Agent active when the run ended
    pub last_agent: String,
    /// Every agent that held control, in order
    pub agent_trace: Vec<String>,
    /// Completed steps (model turns that produced a tool batch)
    pub steps: usize,
    /// Successful model invocations
    pub model_calls: usize,
    /// Token usage summed over all model calls
    pub usage: TokenUsage,
    /// How the run ended
    pub outcome: RunOutcome,
    /// The run's context, as the last tool left it
    pub context: ContextHandle,
    pub(crate) input_len: usize,
}

impl RunResult {
    /// Messages appended by the run itself
    pub fn new_messages(&self) -> &[Message] {
        &self.messages[self.input_len.min(self.messages.len())..]
    }

    /// Whether the run ended with a final message
    pub fn is_complete(&self) -> bool {
        self.outcome == RunOutcome::Completed
    }

    /// Final assistant message, if the run completed
    pub fn final_message(&self) -> Option<&Message> {
        if self.is_complete() {
            self.messages.last()
        } else {
            None
        }
    }
}
