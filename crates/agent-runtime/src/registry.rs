//! Agent registry
//!
//! Resolves the runner's tagged active-agent name to a shared descriptor.

use crate::Agent;
use agent_core::{Error, Result};
use std::collections::HashMap;
use std::sync::Arc;

/// Name-keyed set of agents with a designated entry agent
#[derive(Debug, Clone, Default)]
pub struct AgentRegistry {
    agents: HashMap<String, Arc<Agent>>,
    order: Vec<String>,
    entry: Option<String>,
}

impl AgentRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an agent
    ///
    /// The first registered agent becomes the entry agent unless
    /// [`AgentRegistry::set_entry`] says otherwise.
    pub fn register(&mut self, agent: impl Into<Arc<Agent>>) -> Result<()> {
        let agent = agent.into();
        let name = agent.name().to_string();
        if self.agents.contains_key(&name) {
            return Err(Error::Config(format!("duplicate agent name '{name}'")));
        }
        if self.entry.is_none() {
            self.entry = Some(name.clone());
        }
        self.order.push(name.clone());
        self.agents.insert(name, agent);
        Ok(())
    }

    /// Choose the agent that starts runs by default
    pub fn set_entry(&mut self, name: &str) -> Result<()> {
        if !self.agents.contains_key(name) {
            return Err(Error::Config(format!("entry agent '{name}' is not registered")));
        }
        self.entry = Some(name.to_string());
        Ok(())
    }

    /// Default entry agent
    pub fn entry(&self) -> Option<&str> {
        self.entry.as_deref()
    }

    /// Resolve an agent by name
    pub fn get(&self, name: &str) -> Option<Arc<Agent>> {
        self.agents.get(name).cloned()
    }

    /// Resolve an agent by name or fail with [`Error::UnknownAgent`]
    pub fn resolve(&self, name: &str) -> Result<Arc<Agent>> {
        self.get(name)
            .ok_or_else(|| Error::UnknownAgent(name.to_string()))
    }

    /// Check whether an agent is registered
    pub fn contains(&self, name: &str) -> bool {
        self.agents.contains_key(name)
    }

    /// Registered agent names, in registration order
    pub fn names(&self) -> &[String] {
        &self.order
    }

    /// Handoff targets declared by registered agents but not registered themselves
    pub fn dangling_handoffs(&self) -> Vec<(String, String)> {
        self.order
            .iter()
            .filter_map(|name| self.agents.get(name))
            .flat_map(|agent| {
                agent
                    .handoff_targets()
                    .iter()
                    .filter(|target| !self.agents.contains_key(*target))
                    .map(|target| (agent.name().to_string(), target.clone()))
            })
            .collect()
    }

    /// Number of agents
    pub fn len(&self) -> usize {
        self.agents.len()
    }

    /// Check if the registry is empty
    pub fn is_empty(&self) -> bool {
        self.agents.is_empty()
    }
}
