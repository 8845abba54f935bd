//! LLM provider trait definition

use crate::{CompletionRequest, CompletionResponse, DeltaStream, Result};
use async_trait::async_trait;

/// Trait for LLM providers
///
/// Implementations of this trait provide access to different LLM services.
/// The runner talks to the model exclusively through this trait.
#[async_trait]
pub trait LLMProvider: Send + Sync {
    /// Generate a complete assistant message
    ///
    /// # Arguments
    ///
    /// * `request` - The completion request with messages, tools, and parameters
    ///
    /// # Returns
    ///
    /// The completion response with the assistant's message and metadata
    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse>;

    /// Generate the assistant message incrementally
    ///
    /// The default implementation calls [`LLMProvider::complete`] and replays
    /// the result, so every provider can serve streamed runs.
    async fn stream(&self, request: CompletionRequest) -> Result<DeltaStream> {
        let response = self.complete(request).await?;
        Ok(crate::stream::replay(response))
    }

    /// Get the provider name (e.g., "anthropic", "scripted")
    fn name(&self) -> &str;
}
