//! Runner: executes multi-agent runs
//!
//! The runner implements the run loop:
//! 1. Call the model for the active agent with its instructions, tools
//!    (handoff tools included) and the full history
//! 2. If the reply has no tool calls, finish with it
//! 3. Otherwise execute the calls, append their results in call order and,
//!    if one of them handed off, switch the active agent
//! 4. Loop until a final message or the step ceiling
//!
//! A step is one model turn together with its tool batch; a handoff does not
//! cost an extra step, and the final turn is not counted.

mod driver;

use crate::memory::MemoryProvider;
use crate::stream::{ChunkSink, RunStream};
use crate::{Agent, AgentRegistry, RunOptions, RunResult};
use agent_core::{ContextHandle, Error, Result, RunContext};
use agent_llm::{LLMProvider, Message};
use driver::Driver;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{Instrument, info_span, warn};

/// Executes runs against a fixed set of agents
///
/// Cloning is cheap; clones share the provider, agents and memory.
///
/// # Example
///
/// ```
/// use agent_llm::{Message, ScriptedProvider, ScriptedTurn};
/// use agent_runtime::{Agent, RunOptions, Runner};
/// use std::sync::Arc;
///
/// # async fn example() -> agent_core::Result<()> {
/// let runner = Runner::builder()
///     .provider(Arc::new(ScriptedProvider::new([ScriptedTurn::text("Hello!")])))
///     .agent(Agent::builder("assistant").instructions("Be brief.").build()?)
///     .build()?;
///
/// let result = runner.run(vec![Message::user("Hi")], RunOptions::default()).await?;
/// assert_eq!(result.final_output.as_deref(), Some("Hello!"));
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct Runner {
    provider: Arc<dyn LLMProvider>,
    agents: Arc<AgentRegistry>,
    memory: Option<Arc<dyn MemoryProvider>>,
}

impl Runner {
    /// Create a new runner builder
    pub fn builder() -> RunnerBuilder {
        RunnerBuilder::new()
    }

    /// Create a runner over an existing registry
    pub fn new(provider: Arc<dyn LLMProvider>, agents: AgentRegistry) -> Result<Self> {
        if agents.is_empty() {
            return Err(Error::Config("runner needs at least one agent".to_string()));
        }
        for (agent, target) in agents.dangling_handoffs() {
            warn!(agent = %agent, target = %target, "Handoff target is not registered");
        }
        Ok(Self {
            provider,
            agents: Arc::new(agents),
            memory: None,
        })
    }

    /// Seed runs from `memory` when they name a conversation
    pub fn with_memory(mut self, memory: Arc<dyn MemoryProvider>) -> Self {
        self.memory = Some(memory);
        self
    }

    /// Get a reference to the agent registry
    pub fn agents(&self) -> &AgentRegistry {
        &self.agents
    }

    /// Get a reference to the LLM provider
    pub fn provider(&self) -> &Arc<dyn LLMProvider> {
        &self.provider
    }

    /// Run to completion with an empty context
    ///
    /// # Returns
    ///
    /// `Ok` for completed, step-limited and aborted runs (see
    /// [`RunResult::outcome`]); `Err` for fatal failures such as
    /// [`Error::UnknownAgent`] or an exhausted retry budget.
    pub async fn run(&self, messages: Vec<Message>, options: RunOptions) -> Result<RunResult> {
        self.run_with_context(messages, RunContext::empty(), options)
            .await
    }

    /// Run to completion with a caller-supplied context
    ///
    /// Every agent and tool of the run sees this exact context instance;
    /// [`RunResult::context`] hands it back.
    pub async fn run_with_context(
        &self,
        messages: Vec<Message>,
        context: impl Into<ContextHandle>,
        options: RunOptions,
    ) -> Result<RunResult> {
        Driver::new(self.clone(), context.into(), options, ChunkSink::disabled())
            .run(messages)
            .await
    }

    /// Run incrementally with an empty context
    ///
    /// Must be called within a tokio runtime; the run proceeds on a spawned
    /// task and suspends whenever the consumer falls behind.
    pub fn run_stream(&self, messages: Vec<Message>, options: RunOptions) -> RunStream {
        self.run_stream_with_context(messages, RunContext::empty(), options)
    }

    /// Run incrementally with a caller-supplied context
    pub fn run_stream_with_context(
        &self,
        messages: Vec<Message>,
        context: impl Into<ContextHandle>,
        options: RunOptions,
    ) -> RunStream {
        let (tx, rx) = mpsc::channel(options.channel_capacity.max(1));

        let cancel = options.cancellation.child_token();
        let cancel_on_drop = cancel.clone().drop_guard();
        let options = options.cancellation(cancel);

        let driver = Driver::new(self.clone(), context.into(), options, ChunkSink::channel(tx));
        let task = tokio::spawn(
            driver
                .run(messages)
                .instrument(info_span!("run_stream")),
        );

        RunStream::new(rx, task, cancel_on_drop)
    }
}

impl std::fmt::Debug for Runner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Runner")
            .field("provider", &self.provider.name())
            .field("agents", &self.agents.names())
            .field("memory", &self.memory.is_some())
            .finish()
    }
}

/// Builder for [`Runner`]
pub struct RunnerBuilder {
    provider: Option<Arc<dyn LLMProvider>>,
    agents: Vec<Arc<Agent>>,
    entry: Option<String>,
    memory: Option<Arc<dyn MemoryProvider>>,
}

impl RunnerBuilder {
    /// Create a new builder
    pub fn new() -> Self {
        Self {
            provider: None,
            agents: Vec::new(),
            entry: None,
            memory: None,
        }
    }

    /// Set the LLM provider
    pub fn provider(mut self, provider: Arc<dyn LLMProvider>) -> Self {
        self.provider = Some(provider);
        self
    }

    /// Add an agent; the first one added is the entry agent by default
    pub fn agent(mut self, agent: impl Into<Arc<Agent>>) -> Self {
        self.agents.push(agent.into());
        self
    }

    /// Choose the entry agent
    pub fn entry(mut self, name: impl Into<String>) -> Self {
        self.entry = Some(name.into());
        self
    }

    /// Set the memory provider
    pub fn memory(mut self, memory: Arc<dyn MemoryProvider>) -> Self {
        self.memory = Some(memory);
        self
    }

    /// Build the runner
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if:
    /// - No provider is set
    /// - No agents are added, or two share a name
    /// - The entry agent is not among them
    pub fn build(self) -> Result<Runner> {
        let provider = self
            .provider
            .ok_or_else(|| Error::Config("Provider not set".to_string()))?;

        let mut registry = AgentRegistry::new();
        for agent in self.agents {
            registry.register(agent)?;
        }
        if let Some(entry) = &self.entry {
            registry.set_entry(entry)?;
        }

        let runner = Runner::new(provider, registry)?;
        Ok(match self.memory {
            Some(memory) => runner.with_memory(memory),
            None => runner,
        })
    }
}

impl Default for RunnerBuilder {
    fn default() -> Self {
        Self::new()
    }
}
