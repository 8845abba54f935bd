//! Per-run options

use crate::RetryPolicy;
use agent_utils::RunnerSettings;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Conversation whose stored history seeds a run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConversationRef {
    /// Conversation identifier understood by the memory provider
    pub id: String,
    /// Most recent messages to load; `None` loads everything
    pub limit: Option<usize>,
}

impl ConversationRef {
    /// Reference a conversation without a limit
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            limit: None,
        }
    }

    /// Load at most `limit` messages
    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }
}

/// Options for a single run
///
/// # Example
///
/// ```
/// use agent_runtime::RunOptions;
/// use std::time::Duration;
///
/// let options = RunOptions::default()
///     .max_steps(4)
///     .tool_timeout(Duration::from_secs(5))
///     .start_agent("reports");
///
/// assert_eq!(options.max_steps, 4);
/// assert_eq!(options.start_agent.as_deref(), Some("reports"));
/// ```
#[derive(Debug, Clone)]
pub struct RunOptions {
    /// Step ceiling; also the maximum number of model turns
    pub max_steps: usize,

    /// Deadline for one model invocation
    pub model_timeout: Duration,

    /// Deadline for one tool execution
    pub tool_timeout: Duration,

    /// Retries for transport failures of one model call
    pub model_retries: u32,

    /// Retries for one timed-out model or tool call
    pub timeout_retries: u32,

    /// Tool executor failures fed back to the model before the run fails
    pub tool_retries: u32,

    /// Agent that starts the run instead of the entry agent
    pub start_agent: Option<String>,

    /// Execute the tool calls of one model turn concurrently
    pub parallel_tool_calls: bool,

    /// Backoff between retried model calls
    pub retry_policy: RetryPolicy,

    /// Wall-clock budget for the whole run
    pub run_timeout: Option<Duration>,

    /// Cancels the run at its next suspension point
    pub cancellation: CancellationToken,

    /// Stored conversation to seed history from
    pub conversation: Option<ConversationRef>,

    /// Chunks buffered ahead of a slow stream consumer
    pub channel_capacity: usize,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self::from_settings(&RunnerSettings::default())
    }
}

impl RunOptions {
    /// Options derived from configured runner settings
    pub fn from_settings(settings: &RunnerSettings) -> Self {
        Self {
            max_steps: settings.max_steps,
            model_timeout: Duration::from_millis(settings.model_timeout_ms),
            tool_timeout: Duration::from_millis(settings.tool_timeout_ms),
            model_retries: settings.model_retries,
            timeout_retries: settings.timeout_retries,
            tool_retries: settings.tool_retries,
            start_agent: settings.start_agent.clone(),
            parallel_tool_calls: false,
            retry_policy: RetryPolicy::default(),
            run_timeout: None,
            cancellation: CancellationToken::new(),
            conversation: None,
            channel_capacity: 64,
        }
    }

    /// Set the step ceiling
    pub fn max_steps(mut self, max_steps: usize) -> Self {
        self.max_steps = max_steps;
        self
    }

    /// Set the model call timeout
    pub fn model_timeout(mut self, timeout: Duration) -> Self {
        self.model_timeout = timeout;
        self
    }

    /// Set the tool call timeout
    pub fn tool_timeout(mut self, timeout: Duration) -> Self {
        self.tool_timeout = timeout;
        self
    }

    /// Set the transport retry budget
    pub fn model_retries(mut self, retries: u32) -> Self {
        self.model_retries = retries;
        self
    }

    /// Set the timeout retry budget
    pub fn timeout_retries(mut self, retries: u32) -> Self {
        self.timeout_retries = retries;
        self
    }

    /// Set the tool failure budget
    pub fn tool_retries(mut self, retries: u32) -> Self {
        self.tool_retries = retries;
        self
    }

    /// Start the run with `agent`
    pub fn start_agent(mut self, agent: impl Into<String>) -> Self {
        self.start_agent = Some(agent.into());
        self
    }

    /// Execute tool batches concurrently
    pub fn parallel_tool_calls(mut self, parallel: bool) -> Self {
        self.parallel_tool_calls = parallel;
        self
    }

    /// Set the backoff policy
    pub fn retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.retry_policy = policy;
        self
    }

    /// Abort the run once `timeout` has elapsed
    pub fn run_timeout(mut self, timeout: Duration) -> Self {
        self.run_timeout = Some(timeout);
        self
    }

    /// Use a caller-held cancellation token
    pub fn cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation = token;
        self
    }

    /// Seed history from a stored conversation
    pub fn conversation(mut self, conversation: ConversationRef) -> Self {
        self.conversation = Some(conversation);
        self
    }

    /// Set the stream buffer size
    pub fn channel_capacity(mut self, capacity: usize) -> Self {
        self.channel_capacity = capacity;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_follow_settings() {
        let options = RunOptions::default();
        assert_eq!(options.max_steps, 10);
        assert_eq!(options.model_timeout, Duration::from_secs(120));
        assert_eq!(options.tool_timeout, Duration::from_secs(30));
        assert_eq!(options.model_retries, 2);
        assert_eq!(options.timeout_retries, 1);
        assert_eq!(options.tool_retries, 3);
        assert!(!options.parallel_tool_calls);
        assert!(options.start_agent.is_none());
        assert!(!options.cancellation.is_cancelled());
    }

    #[test]
    fn test_from_custom_settings() {
        let settings = RunnerSettings {
            max_steps: 3,
            model_timeout_ms: 500,
            start_agent: Some("reports".into()),
            ..RunnerSettings::default()
        };
        let options = RunOptions::from_settings(&settings);
        assert_eq!(options.max_steps, 3);
        assert_eq!(options.model_timeout, Duration::from_millis(500));
        assert_eq!(options.start_agent.as_deref(), Some("reports"));
    }

    #[test]
    fn test_conversation_ref() {
        let options = RunOptions::default().conversation(ConversationRef::new("c-1").limit(20));
        let conversation = options.conversation.unwrap();
        assert_eq!(conversation.id, "c-1");
        assert_eq!(conversation.limit, Some(20));
    }
}
