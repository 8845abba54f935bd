//! Run-scoped context shared by every agent and tool in one run
//!
//! [`RunContext`] holds the caller's opaque value plus a metadata map the
//! runner and tools write into. A run owns exactly one instance, wrapped in a
//! [`ContextHandle`]; handoffs pass the same handle along, never a copy.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, MutexGuard};

/// Well-known metadata keys maintained by the runner
pub mod keys {
    /// Name of the agent currently in control
    pub const CURRENT_AGENT: &str = "current_agent";
    /// Identifier of the run that owns the context
    pub const RUN_ID: &str = "run_id";
    /// Payload carried by the most recent handoff, if any
    pub const HANDOFF_PAYLOAD: &str = "handoff_payload";
    /// Number of handoffs performed so far
    pub const HANDOFF_COUNT: &str = "handoff_count";
    /// Accumulated token usage (`{"input_tokens": .., "output_tokens": ..}`)
    pub const USAGE: &str = "usage";
}

/// Mutable state shared by all agents and tools of a single run
///
/// # Example
///
/// ```
/// use agent_core::RunContext;
/// use serde_json::json;
///
/// let mut ctx = RunContext::new(json!({"tenant": "acme"}));
/// ctx.set_metadata("current_agent", json!("orchestrator"));
///
/// assert_eq!(ctx.value()["tenant"], "acme");
/// assert_eq!(ctx.current_agent(), Some("orchestrator"));
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RunContext {
    /// Caller-supplied value, opaque to the runner
    value: Value,
    /// Key-value metadata written by the runner and tools
    metadata: HashMap<String, Value>,
}

impl RunContext {
    /// Create a context around a caller-supplied value
    pub fn new(value: Value) -> Self {
        Self {
            value,
            metadata: HashMap::new(),
        }
    }

    /// Create a context with an empty object as its value
    pub fn empty() -> Self {
        Self::new(Value::Object(serde_json::Map::new()))
    }

    // =========== Context Value ===========

    /// Get the caller-supplied value
    pub fn value(&self) -> &Value {
        &self.value
    }

    /// Get the caller-supplied value mutably
    pub fn value_mut(&mut self) -> &mut Value {
        &mut self.value
    }

    /// Replace the caller-supplied value
    pub fn set_value(&mut self, value: Value) {
        self.value = value;
    }

    // =========== Metadata ===========

    /// Insert a metadata entry
    pub fn set_metadata(&mut self, key: impl Into<String>, value: Value) {
        self.metadata.insert(key.into(), value);
    }

    /// Get a metadata entry
    pub fn metadata(&self, key: &str) -> Option<&Value> {
        self.metadata.get(key)
    }

    /// Remove a metadata entry
    pub fn remove_metadata(&mut self, key: &str) -> Option<Value> {
        self.metadata.remove(key)
    }

    /// All metadata entries
    pub fn metadata_map(&self) -> &HashMap<String, Value> {
        &self.metadata
    }

    /// Insert a typed metadata entry
    ///
    /// Serializes the value to JSON before storing.
    pub fn set_metadata_typed<T: Serialize>(
        &mut self,
        key: impl Into<String>,
        value: &T,
    ) -> crate::Result<()> {
        let json_value = serde_json::to_value(value).map_err(|e| {
            crate::Error::Generic(format!("Failed to serialize context metadata: {e}"))
        })?;
        self.metadata.insert(key.into(), json_value);
        Ok(())
    }

    /// Get a typed metadata entry
    pub fn metadata_typed<T: for<'de> Deserialize<'de>>(&self, key: &str) -> crate::Result<Option<T>> {
        match self.metadata.get(key) {
            None => Ok(None),
            Some(value) => serde_json::from_value(value.clone()).map(Some).map_err(|e| {
                crate::Error::Generic(format!("Failed to deserialize context metadata: {e}"))
            }),
        }
    }

    /// Name of the agent currently in control, as recorded by the runner
    pub fn current_agent(&self) -> Option<&str> {
        self.metadata(keys::CURRENT_AGENT).and_then(Value::as_str)
    }

    /// Number of handoffs performed so far
    pub fn handoff_count(&self) -> u64 {
        self.metadata(keys::HANDOFF_COUNT)
            .and_then(Value::as_u64)
            .unwrap_or(0)
    }

    /// Serialize the whole context, for logging
    pub fn to_json(&self) -> Value {
        serde_json::json!({
            "value": self.value,
            "metadata": self.metadata,
        })
    }
}

/// Shared reference to the single [`RunContext`] of a run
///
/// Cloning the handle clones the reference, not the context. Writers take the
/// lock for the duration of one mutation, which keeps concurrently executing
/// tools from losing each other's updates.
#[derive(Debug, Clone, Default)]
pub struct ContextHandle {
    inner: Arc<Mutex<RunContext>>,
}

impl ContextHandle {
    /// Wrap a context for sharing across a run
    pub fn new(context: RunContext) -> Self {
        Self {
            inner: Arc::new(Mutex::new(context)),
        }
    }

    /// Acquire exclusive access
    pub async fn lock(&self) -> MutexGuard<'_, RunContext> {
        self.inner.lock().await
    }

    /// Apply one mutation under the lock and return its result
    pub async fn update<R>(&self, f: impl FnOnce(&mut RunContext) -> R) -> R {
        let mut guard = self.inner.lock().await;
        f(&mut guard)
    }

    /// Copy of the current state, for logging and results
    pub async fn snapshot(&self) -> RunContext {
        self.inner.lock().await.clone()
    }

    /// Whether two handles point at the same context instance
    pub fn same_instance(&self, other: &ContextHandle) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl From<RunContext> for ContextHandle {
    fn from(context: RunContext) -> Self {
        Self::new(context)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::{Deserialize, Serialize};
    use serde_json::json;

    #[derive(Debug, Serialize, Deserialize, PartialEq)]
    struct Usage {
        input_tokens: u64,
        output_tokens: u64,
    }

    #[test]
    fn test_empty_context() {
        let ctx = RunContext::empty();
        assert_eq!(ctx.value(), &json!({}));
        assert!(ctx.metadata_map().is_empty());
        assert_eq!(ctx.handoff_count(), 0);
        assert!(ctx.current_agent().is_none());
    }

    #[test]
    fn test_typed_metadata() {
        let mut ctx = RunContext::default();
        let usage = Usage {
            input_tokens: 12,
            output_tokens: 3,
        };
        ctx.set_metadata_typed(keys::USAGE, &usage).unwrap();

        let back: Usage = ctx.metadata_typed(keys::USAGE).unwrap().unwrap();
        assert_eq!(back, usage);

        let missing: Option<Usage> = ctx.metadata_typed("missing").unwrap();
        assert!(missing.is_none());
    }

    #[test]
    fn test_to_json() {
        let mut ctx = RunContext::new(json!({"tenant": "acme"}));
        ctx.set_metadata(keys::CURRENT_AGENT, json!("reports"));

        let json = ctx.to_json();
        assert_eq!(json["value"]["tenant"], "acme");
        assert_eq!(json["metadata"]["current_agent"], "reports");
    }

    #[test]
    fn test_handle_clone_shares_instance() {
        let handle = ContextHandle::new(RunContext::empty());
        let other = handle.clone();
        assert!(handle.same_instance(&other));

        let unrelated = ContextHandle::new(RunContext::empty());
        assert!(!handle.same_instance(&unrelated));

        tokio_test::block_on(async {
            other
                .update(|ctx| ctx.set_metadata("seen_by", json!("other")))
                .await;
            let snapshot = handle.snapshot().await;
            assert_eq!(snapshot.metadata("seen_by"), Some(&json!("other")));
        });
    }

    #[tokio::test]
    async fn test_concurrent_updates_are_not_lost() {
        let handle = ContextHandle::new(RunContext::empty());

        let tasks: Vec<_> = (0..32)
            .map(|_| {
                let h = handle.clone();
                tokio::spawn(async move {
                    h.update(|ctx| {
                        let n = ctx.metadata("counter").and_then(Value::as_u64).unwrap_or(0);
                        ctx.set_metadata("counter", json!(n + 1));
                    })
                    .await;
                })
            })
            .collect();

        for task in tasks {
            task.await.unwrap();
        }

        let ctx = handle.snapshot().await;
        assert_eq!(ctx.metadata("counter"), Some(&json!(32)));
    }
}
