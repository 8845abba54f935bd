//! Agent descriptors
//!
//! An [`Agent`] is an immutable bundle of instructions, declared tools,
//! reachable handoff targets and model settings. It holds no run state, so a
//! single instance can serve any number of concurrent runs.

use agent_core::{Error, Result, RunContext};
use agent_llm::ToolDefinition;
use agent_tools::{HandoffTool, Tool, ToolRegistry};
use std::sync::Arc;
use tracing::debug;

type InstructionsFn = dyn Fn(&RunContext) -> String + Send + Sync;

/// System instructions of an agent
#[derive(Clone)]
pub enum Instructions {
    /// Fixed text
    Static(String),
    /// Computed from the run context at the start of every model turn
    Dynamic(Arc<InstructionsFn>),
}

impl Instructions {
    /// Resolve against the current run context
    pub fn resolve(&self, context: &RunContext) -> String {
        match self {
            Instructions::Static(text) => text.clone(),
            Instructions::Dynamic(f) => f(context),
        }
    }
}

impl std::fmt::Debug for Instructions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Instructions::Static(text) => f.debug_tuple("Static").field(text).finish(),
            Instructions::Dynamic(_) => f.write_str("Dynamic(..)"),
        }
    }
}

/// Model selection for an agent
#[derive(Debug, Clone, PartialEq)]
pub struct ModelSettings {
    /// Model identifier passed to the provider
    pub model: String,
    /// Max tokens per completion
    pub max_tokens: usize,
    /// Sampling temperature
    pub temperature: Option<f32>,
}

impl Default for ModelSettings {
    fn default() -> Self {
        Self {
            model: "claude-sonnet-4-5-20250929".to_string(),
            max_tokens: 4096,
            temperature: None,
        }
    }
}

/// Immutable agent descriptor
///
/// # Example
///
/// ```
/// use agent_runtime::Agent;
///
/// let orchestrator = Agent::builder("orchestrator")
///     .instructions("Route finance questions to the reports agent.")
///     .handoff("reports")
///     .build()
///     .unwrap();
///
/// assert!(orchestrator.can_handoff_to("reports"));
/// assert_eq!(orchestrator.tools()[0].name(), "transfer_to_reports");
/// ```
#[derive(Clone)]
pub struct Agent {
    name: String,
    instructions: Instructions,
    tools: ToolRegistry,
    declared_tools: usize,
    handoffs: Vec<String>,
    model: ModelSettings,
}

impl Agent {
    /// Start building an agent
    pub fn builder(name: impl Into<String>) -> AgentBuilder {
        AgentBuilder::new(name)
    }

    /// Unique agent name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Declared tools followed by one handoff tool per target
    pub fn tools(&self) -> &[Arc<dyn Tool>] {
        self.tools.list_tools()
    }

    /// Number of tools declared by the caller, handoff tools excluded
    pub fn declared_tool_count(&self) -> usize {
        self.declared_tools
    }

    /// Look up a tool (declared or handoff) by name
    pub fn tool(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.get(name)
    }

    /// Declarations sent to the model, in order
    pub fn tool_definitions(&self) -> Vec<ToolDefinition> {
        self.tools.definitions()
    }

    /// Agents this one may hand off to
    pub fn handoff_targets(&self) -> &[String] {
        &self.handoffs
    }

    /// Whether `target` is a declared handoff target
    pub fn can_handoff_to(&self, target: &str) -> bool {
        self.handoffs.iter().any(|h| h == target)
    }

    /// Resolve the instructions for a model turn
    ///
    /// Dynamic instructions that resolve to blank text are a configuration
    /// error.
    pub fn instructions(&self, context: &RunContext) -> Result<String> {
        let text = self.instructions.resolve(context);
        if text.trim().is_empty() {
            return Err(Error::Config(format!(
                "agent '{}' resolved empty instructions",
                self.name
            )));
        }
        Ok(text)
    }

    /// Model settings
    pub fn model(&self) -> &ModelSettings {
        &self.model
    }
}

impl std::fmt::Debug for Agent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Agent")
            .field("name", &self.name)
            .field("instructions", &self.instructions)
            .field("tools", &self.tools)
            .field("handoffs", &self.handoffs)
            .field("model", &self.model)
            .finish()
    }
}

/// Builder for [`Agent`]
pub struct AgentBuilder {
    name: String,
    instructions: Option<Instructions>,
    tools: Vec<Arc<dyn Tool>>,
    handoffs: Vec<(String, String)>,
    model: ModelSettings,
}

impl AgentBuilder {
    /// Create a new builder
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            instructions: None,
            tools: Vec::new(),
            handoffs: Vec::new(),
            model: ModelSettings::default(),
        }
    }

    /// Set static instructions
    pub fn instructions(mut self, text: impl Into<String>) -> Self {
        self.instructions = Some(Instructions::Static(text.into()));
        self
    }

    /// Set instructions computed from the run context
    pub fn dynamic_instructions<F>(mut self, f: F) -> Self
    where
        F: Fn(&RunContext) -> String + Send + Sync + 'static,
    {
        self.instructions = Some(Instructions::Dynamic(Arc::new(f)));
        self
    }

    /// Declare a tool
    pub fn tool(self, tool: impl Tool + 'static) -> Self {
        self.tool_arc(Arc::new(tool))
    }

    /// Declare a shared tool
    pub fn tool_arc(mut self, tool: Arc<dyn Tool>) -> Self {
        self.tools.push(tool);
        self
    }

    /// Allow handing off to `target`
    pub fn handoff(self, target: impl Into<String>) -> Self {
        self.handoff_with(target, "")
    }

    /// Allow handing off to `target`, describing when to do so
    pub fn handoff_with(mut self, target: impl Into<String>, description: impl Into<String>) -> Self {
        self.handoffs.push((target.into(), description.into()));
        self
    }

    /// Replace the model settings
    pub fn model_settings(mut self, model: ModelSettings) -> Self {
        self.model = model;
        self
    }

    /// Set the model
    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.model.model = model.into();
        self
    }

    /// Set max tokens
    pub fn max_tokens(mut self, max_tokens: usize) -> Self {
        self.model.max_tokens = max_tokens;
        self
    }

    /// Set temperature
    pub fn temperature(mut self, temperature: f32) -> Self {
        self.model.temperature = Some(temperature);
        self
    }

    /// Build the agent
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if:
    /// - The name is empty
    /// - Instructions are missing or blank
    /// - Two tools share a name, a handoff target is listed twice, or a
    ///   declared tool collides with a synthesized handoff tool
    pub fn build(self) -> Result<Agent> {
        if self.name.trim().is_empty() {
            return Err(Error::Config("agent name must not be empty".to_string()));
        }

        let instructions = self
            .instructions
            .ok_or_else(|| Error::Config(format!("agent '{}' has no instructions", self.name)))?;
        if matches!(&instructions, Instructions::Static(text) if text.trim().is_empty()) {
            return Err(Error::Config(format!(
                "agent '{}' has empty instructions",
                self.name
            )));
        }

        let mut tools = ToolRegistry::new();
        for tool in self.tools {
            tools.register(tool).map_err(|e| in_agent(&self.name, e))?;
        }
        let declared_tools = tools.len();

        let mut handoffs: Vec<String> = Vec::with_capacity(self.handoffs.len());
        for (target, description) in self.handoffs {
            if target.trim().is_empty() {
                return Err(Error::Config(format!(
                    "agent '{}' declares a handoff with an empty target",
                    self.name
                )));
            }
            if handoffs.contains(&target) {
                return Err(Error::Config(format!(
                    "agent '{}' declares handoff target '{target}' twice",
                    self.name
                )));
            }
            tools
                .register(Arc::new(HandoffTool::new(target.clone(), description)))
                .map_err(|e| in_agent(&self.name, e))?;
            handoffs.push(target);
        }

        debug!(
            agent = %self.name,
            tool_count = declared_tools,
            handoff_count = handoffs.len(),
            "Agent built"
        );

        Ok(Agent {
            name: self.name,
            instructions,
            tools,
            declared_tools,
            handoffs,
            model: self.model,
        })
    }
}

fn in_agent(agent: &str, err: Error) -> Error {
    match err {
        Error::Config(msg) => Error::Config(format!("agent '{agent}': {msg}")),
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use agent_core::ToolOutput;
    use agent_tools::FnTool;
    use serde_json::json;

    fn noop(name: &str) -> FnTool {
        FnTool::new(name, "noop", json!({"type": "object"}), |_, _| async {
            Ok(ToolOutput::Continue(json!(null)))
        })
    }

    #[test]
    fn test_tools_include_handoffs_after_declared() {
        let agent = Agent::builder("reports")
            .instructions("Answer with numbers.")
            .tool(noop("burn_rate"))
            .handoff("orchestrator")
            .build()
            .unwrap();

        let names: Vec<_> = agent.tools().iter().map(|t| t.name().to_string()).collect();
        assert_eq!(names, vec!["burn_rate", "transfer_to_orchestrator"]);
        assert_eq!(agent.declared_tool_count(), 1);
        assert!(agent.can_handoff_to("orchestrator"));
        assert!(!agent.can_handoff_to("reports"));
        assert_eq!(agent.tool_definitions().len(), 2);
    }

    #[test]
    fn test_empty_instructions_rejected() {
        let err = Agent::builder("a").instructions("   ").build().unwrap_err();
        assert!(matches!(err, Error::Config(_)));

        let err = Agent::builder("a").build().unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_duplicate_tool_rejected() {
        let err = Agent::builder("a")
            .instructions("x")
            .tool(noop("burn_rate"))
            .tool(noop("burn_rate"))
            .build()
            .unwrap_err();
        assert!(matches!(err, Error::Config(msg) if msg.contains("burn_rate")));
    }

    #[test]
    fn test_duplicate_handoff_rejected() {
        let err = Agent::builder("a")
            .instructions("x")
            .handoff("reports")
            .handoff("reports")
            .build()
            .unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_tool_colliding_with_handoff_rejected() {
        let err = Agent::builder("a")
            .instructions("x")
            .tool(noop("transfer_to_reports"))
            .handoff("reports")
            .build()
            .unwrap_err();
        assert!(matches!(err, Error::Config(msg) if msg.contains("transfer_to_reports")));
    }

    #[test]
    fn test_dynamic_instructions_read_context() {
        let agent = Agent::builder("reports")
            .dynamic_instructions(|ctx| {
                format!(
                    "Report for {}",
                    ctx.value()["tenant"].as_str().unwrap_or("unknown")
                )
            })
            .build()
            .unwrap();

        let ctx = RunContext::new(json!({"tenant": "acme"}));
        assert_eq!(agent.instructions(&ctx).unwrap(), "Report for acme");
    }

    #[test]
    fn test_dynamic_instructions_resolving_blank_fail() {
        let agent = Agent::builder("quiet")
            .dynamic_instructions(|_| String::new())
            .build()
            .unwrap();
        assert!(matches!(
            agent.instructions(&RunContext::empty()),
            Err(Error::Config(_))
        ));
    }
}
