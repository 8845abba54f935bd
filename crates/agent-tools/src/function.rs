//! Closure-backed tools

use crate::Tool;
use agent_core::{ContextHandle, Result, ToolOutput};
use async_trait::async_trait;
use serde_json::Value;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

type BoxedHandler =
    Arc<dyn Fn(Value, ContextHandle) -> Pin<Box<dyn Future<Output = Result<ToolOutput>> + Send>> + Send + Sync>;

/// A [`Tool`] whose executor is an async closure
///
/// # Example
///
/// ```
/// use agent_core::ToolOutput;
/// use agent_llm::tools::schema;
/// use agent_tools::{FnTool, Tool};
/// use serde_json::json;
///
/// let tool = FnTool::new(
///     "echo",
///     "Echo the input back",
///     schema::object(json!({"text": schema::string("Text to echo")}), &["text"]),
///     |params, _ctx| async move { Ok(ToolOutput::Continue(params)) },
/// );
/// assert_eq!(tool.name(), "echo");
/// ```
#[derive(Clone)]
pub struct FnTool {
    name: String,
    description: String,
    input_schema: Value,
    handler: BoxedHandler,
}

impl FnTool {
    /// Create a tool from a name, description, schema and async executor
    pub fn new<F, Fut>(
        name: impl Into<String>,
        description: impl Into<String>,
        input_schema: Value,
        handler: F,
    ) -> Self
    where
        F: Fn(Value, ContextHandle) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<ToolOutput>> + Send + 'static,
    {
        Self {
            name: name.into(),
            description: description.into(),
            input_schema,
            handler: Arc::new(move |params, ctx| Box::pin(handler(params, ctx))),
        }
    }
}

impl std::fmt::Debug for FnTool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FnTool").field("name", &self.name).finish()
    }
}

#[async_trait]
impl Tool for FnTool {
    async fn execute(&self, params: Value, context: &ContextHandle) -> Result<ToolOutput> {
        (self.handler)(params, context.clone()).await
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn input_schema(&self) -> Value {
        self.input_schema.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use agent_core::RunContext;
    use serde_json::json;

    #[tokio::test]
    async fn test_closure_sees_shared_context() {
        let tool = FnTool::new("mark", "Mark the context", json!({"type": "object"}), |_, ctx| async move {
            ctx.update(|c| c.set_metadata("marked", json!(true))).await;
            Ok(ToolOutput::Continue(json!("ok")))
        });

        let ctx = ContextHandle::new(RunContext::empty());
        let out = tool.execute(json!({}), &ctx).await.unwrap();

        assert_eq!(out, ToolOutput::Continue(json!("ok")));
        assert_eq!(ctx.snapshot().await.metadata("marked"), Some(&json!(true)));
    }
}
