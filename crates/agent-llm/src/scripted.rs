//! Deterministic provider that replays a script
//!
//! `ScriptedProvider` answers each model call with the next [`ScriptedTurn`]
//! and records every request it receives. It backs the CLI demo and the
//! runner's test-suite, and gives identical answers to buffered and streamed
//! runs.

use crate::{
    CompletionRequest, CompletionResponse, ContentBlock, DeltaStream, LLMError, LLMProvider,
    Message, Result, StreamDelta, TokenUsage,
};
use async_trait::async_trait;
use serde_json::Value;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tracing::debug;

/// One scripted model answer
#[derive(Debug, Clone)]
pub enum ScriptedTurn {
    /// Final assistant text
    Text(String),
    /// Tool calls (name, arguments) in emission order, with optional lead-in text
    ToolCalls {
        /// Text emitted before the calls
        text: Option<String>,
        /// Calls to emit
        calls: Vec<(String, Value)>,
    },
    /// Transient failure (maps to a transport error)
    Fail(String),
    /// Permanent rejection (maps to a model error)
    Reject(String),
    /// Wait before answering with the inner turn
    Delayed(Duration, Box<ScriptedTurn>),
}

impl ScriptedTurn {
    /// Final text answer
    pub fn text(text: impl Into<String>) -> Self {
        ScriptedTurn::Text(text.into())
    }

    /// Single tool call
    pub fn tool_call(name: impl Into<String>, input: Value) -> Self {
        ScriptedTurn::ToolCalls {
            text: None,
            calls: vec![(name.into(), input)],
        }
    }

    /// Several tool calls in one turn
    pub fn tool_calls<N: Into<String>>(calls: impl IntoIterator<Item = (N, Value)>) -> Self {
        ScriptedTurn::ToolCalls {
            text: None,
            calls: calls.into_iter().map(|(n, v)| (n.into(), v)).collect(),
        }
    }

    /// Answer only after `delay`
    pub fn delayed(delay: Duration, turn: ScriptedTurn) -> Self {
        ScriptedTurn::Delayed(delay, Box::new(turn))
    }
}

/// Provider that replays [`ScriptedTurn`]s in order
pub struct ScriptedProvider {
    turns: Mutex<VecDeque<ScriptedTurn>>,
    fallback: Option<ScriptedTurn>,
    requests: Mutex<Vec<CompletionRequest>>,
    next_call_id: AtomicUsize,
    usage_per_call: TokenUsage,
}

impl ScriptedProvider {
    /// Create a provider that answers with `turns`, then fails
    pub fn new(turns: impl IntoIterator<Item = ScriptedTurn>) -> Self {
        Self {
            turns: Mutex::new(turns.into_iter().collect()),
            fallback: None,
            requests: Mutex::new(Vec::new()),
            next_call_id: AtomicUsize::new(1),
            usage_per_call: TokenUsage {
                input_tokens: 10,
                output_tokens: 5,
            },
        }
    }

    /// Answer with `turn` once the script is exhausted
    pub fn with_fallback(mut self, turn: ScriptedTurn) -> Self {
        self.fallback = Some(turn);
        self
    }

    /// Usage reported for every answered call
    pub fn with_usage(mut self, usage: TokenUsage) -> Self {
        self.usage_per_call = usage;
        self
    }

    /// Every request received so far, failed attempts included
    pub fn requests(&self) -> Vec<CompletionRequest> {
        lock(&self.requests).clone()
    }

    /// Number of model invocations received
    pub fn call_count(&self) -> usize {
        lock(&self.requests).len()
    }

    fn next_turn(&self, request: CompletionRequest) -> Result<ScriptedTurn> {
        lock(&self.requests).push(request);
        lock(&self.turns)
            .pop_front()
            .or_else(|| self.fallback.clone())
            .ok_or_else(|| LLMError::InvalidRequest("script exhausted".to_string()))
    }

    async fn resolve(&self, mut turn: ScriptedTurn) -> Result<CompletionResponse> {
        loop {
            match turn {
                ScriptedTurn::Delayed(delay, inner) => {
                    tokio::time::sleep(delay).await;
                    turn = *inner;
                }
                ScriptedTurn::Fail(reason) => return Err(LLMError::RequestFailed(reason)),
                ScriptedTurn::Reject(reason) => return Err(LLMError::InvalidRequest(reason)),
                ScriptedTurn::Text(text) => {
                    return Ok(CompletionResponse::from_message(
                        Message::assistant(text),
                        self.usage_per_call,
                    ));
                }
                ScriptedTurn::ToolCalls { text, calls } => {
                    let mut blocks = Vec::with_capacity(calls.len() + 1);
                    if let Some(text) = text {
                        blocks.push(ContentBlock::Text { text });
                    }
                    for (name, input) in calls {
                        let n = self.next_call_id.fetch_add(1, Ordering::Relaxed);
                        blocks.push(ContentBlock::ToolUse {
                            id: format!("call_{n}"),
                            name,
                            input,
                        });
                    }
                    return Ok(CompletionResponse::from_message(
                        Message::assistant_blocks(blocks),
                        self.usage_per_call,
                    ));
                }
            }
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[async_trait]
impl LLMProvider for ScriptedProvider {
    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse> {
        let turn = self.next_turn(request)?;
        debug!(?turn, "Scripted completion");
        self.resolve(turn).await
    }

    /// Streams text word by word so consumers see several deltas per turn
    async fn stream(&self, request: CompletionRequest) -> Result<DeltaStream> {
        let turn = self.next_turn(request)?;
        let response = self.resolve(turn).await?;

        let mut deltas: Vec<Result<StreamDelta>> = Vec::new();
        for delta in crate::stream::content_deltas(&response) {
            match delta {
                StreamDelta::Text(text) => deltas.extend(
                    text.split_inclusive(' ')
                        .map(|word| Ok(StreamDelta::Text(word.to_string()))),
                ),
                other => deltas.push(Ok(other)),
            }
        }
        deltas.push(Ok(StreamDelta::Completed(response)));

        Ok(Box::pin(futures::stream::iter(deltas)))
    }

    fn name(&self) -> &str {
        "scripted"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;
    use serde_json::json;

    fn request() -> CompletionRequest {
        CompletionRequest::builder("scripted").build()
    }

    #[tokio::test]
    async fn test_replays_in_order_and_records_requests() {
        let provider = ScriptedProvider::new([
            ScriptedTurn::tool_call("burn_rate", json!({"currency": "USD"})),
            ScriptedTurn::text("done"),
        ]);

        let first = provider.complete(request()).await.unwrap();
        let calls = first.message.tool_calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].id, "call_1");
        assert_eq!(calls[0].input["currency"], "USD");

        let second = provider.complete(request()).await.unwrap();
        assert_eq!(second.message.text().as_deref(), Some("done"));
        assert_eq!(provider.call_count(), 2);

        assert!(provider.complete(request()).await.is_err());
    }

    #[tokio::test]
    async fn test_failures_are_classified() {
        let provider = ScriptedProvider::new([
            ScriptedTurn::Fail("connection reset".into()),
            ScriptedTurn::Reject("bad key".into()),
        ]);
        assert!(provider.complete(request()).await.unwrap_err().is_transient());
        assert!(!provider.complete(request()).await.unwrap_err().is_transient());
    }

    #[tokio::test]
    async fn test_fallback_repeats() {
        let provider =
            ScriptedProvider::new(Vec::<ScriptedTurn>::new()).with_fallback(ScriptedTurn::tool_call("ping", json!({})));
        for expected in ["call_1", "call_2", "call_3"] {
            let response = provider.complete(request()).await.unwrap();
            assert_eq!(response.message.tool_calls()[0].id, expected);
        }
    }

    #[tokio::test]
    async fn test_stream_splits_text() {
        let provider = ScriptedProvider::new([ScriptedTurn::text("burn rate is flat")]);
        let deltas: Vec<StreamDelta> = provider
            .stream(request())
            .await
            .unwrap()
            .map(|d| d.unwrap())
            .collect()
            .await;

        let text: Vec<_> = deltas
            .iter()
            .filter_map(|d| match d {
                StreamDelta::Text(t) => Some(t.as_str()),
                _ => None,
            })
            .collect();
        assert_eq!(text, vec!["burn ", "rate ", "is ", "flat"]);
        assert!(matches!(deltas.last(), Some(StreamDelta::Completed(_))));
    }
}
