//! Tool trait definition

use agent_core::{ContextHandle, Error, Result, ToolOutput};
use agent_llm::ToolDefinition;
use agent_llm::tools::schema;
use async_trait::async_trait;
use serde_json::Value;

/// Trait for tools that agents can execute
///
/// Tools are functions that LLM agents can call to interact with the world.
/// Each tool must provide a name, description, and JSON schema for its input.
#[async_trait]
pub trait Tool: Send + Sync {
    /// Execute the tool with given parameters
    ///
    /// # Arguments
    ///
    /// * `params` - Tool input as JSON value (already checked by
    ///   [`Tool::validate_input`])
    /// * `context` - The run's shared context; lock it only for the duration
    ///   of a mutation
    ///
    /// # Returns
    ///
    /// Either an ordinary result or a handoff instruction. Expected failures
    /// should be [`Error::Validation`] so the model gets a chance to correct
    /// its call; anything else counts against the run's tool failure budget.
    async fn execute(&self, params: Value, context: &ContextHandle) -> Result<ToolOutput>;

    /// Get the tool's name
    ///
    /// Must be unique among the tools of one agent and match the name in
    /// [`ToolDefinition`]
    fn name(&self) -> &str;

    /// Get the tool's description
    ///
    /// This description helps the LLM understand when to use this tool
    fn description(&self) -> &str;

    /// Get the tool's input schema (JSON Schema format)
    fn input_schema(&self) -> Value;

    /// Check the model-supplied input against the tool's contract
    ///
    /// The default accepts any JSON object that carries every `required`
    /// field of [`Tool::input_schema`].
    fn validate_input(&self, params: &Value) -> Result<()> {
        let Some(object) = params.as_object() else {
            return Err(Error::Validation(format!(
                "input for '{}' must be a JSON object",
                self.name()
            )));
        };

        let input_schema = self.input_schema();
        let missing: Vec<&str> = schema::required_fields(&input_schema)
            .into_iter()
            .filter(|field| !object.contains_key(*field))
            .collect();

        if missing.is_empty() {
            Ok(())
        } else {
            Err(Error::Validation(format!(
                "input for '{}' is missing required field(s): {}",
                self.name(),
                missing.join(", ")
            )))
        }
    }

    /// Declaration sent to the model
    fn definition(&self) -> ToolDefinition {
        ToolDefinition::new(self.name(), self.description(), self.input_schema())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    struct DateRangeTool;

    #[async_trait]
    impl Tool for DateRangeTool {
        async fn execute(&self, params: Value, _context: &ContextHandle) -> Result<ToolOutput> {
            Ok(ToolOutput::Continue(params))
        }

        fn name(&self) -> &str {
            "burn_rate"
        }

        fn description(&self) -> &str {
            "Burn rate over a date range"
        }

        fn input_schema(&self) -> Value {
            schema::object(
                json!({
                    "from": schema::string("Start date"),
                    "to": schema::string("End date"),
                }),
                &["from", "to"],
            )
        }
    }

    #[test]
    fn test_validate_accepts_complete_input() {
        let tool = DateRangeTool;
        assert!(
            tool.validate_input(&json!({"from": "2024-01-01", "to": "2024-06-30"}))
                .is_ok()
        );
    }

    #[test]
    fn test_validate_reports_missing_fields() {
        let tool = DateRangeTool;
        let err = tool.validate_input(&json!({"from": "2024-01-01"})).unwrap_err();
        assert!(matches!(&err, Error::Validation(msg) if msg.contains("to")));
    }

    #[test]
    fn test_definition_mirrors_tool() {
        let def = DateRangeTool.definition();
        assert_eq!(def.name, "burn_rate");
        assert_eq!(def.input_schema["required"], json!(["from", "to"]));
    }

    #[test]
    fn test_validate_rejects_non_object() {
        let tool = DateRangeTool;
        let err = tool.validate_input(&json!("2024")).unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
    }
}
