//! Incremental completion output
//!
//! A streamed completion is a single-pass sequence of [`StreamDelta`]s that
//! must end with [`StreamDelta::Completed`], carrying the assembled response.

use crate::{CompletionResponse, ContentBlock, MessageContent, Result};
use futures::Stream;
use std::pin::Pin;

/// One increment of a streamed completion
#[derive(Debug, Clone, PartialEq)]
pub enum StreamDelta {
    /// Assistant text fragment
    Text(String),
    /// The model started a tool call
    ToolCallStart {
        /// Call id
        id: String,
        /// Tool name
        name: String,
    },
    /// Fragment of a tool call's JSON arguments
    ToolCallInput {
        /// Call id
        id: String,
        /// Raw JSON fragment
        partial_json: String,
    },
    /// The full response; always the last item
    Completed(CompletionResponse),
}

/// Boxed stream of deltas returned by [`crate::LLMProvider::stream`]
pub type DeltaStream = Pin<Box<dyn Stream<Item = Result<StreamDelta>> + Send>>;

/// Replay a buffered response as a delta sequence
///
/// Used by providers without a native streaming endpoint.
pub fn replay(response: CompletionResponse) -> DeltaStream {
    let mut deltas = content_deltas(&response);
    deltas.push(StreamDelta::Completed(response));

    Box::pin(futures::stream::iter(deltas.into_iter().map(Ok)))
}

/// Deltas describing a response's content, without the closing `Completed`
pub fn content_deltas(response: &CompletionResponse) -> Vec<StreamDelta> {
    let mut deltas = Vec::new();

    match &response.message.content {
        Some(MessageContent::Text(text)) => deltas.push(StreamDelta::Text(text.clone())),
        Some(MessageContent::Blocks(blocks)) => {
            for block in blocks {
                match block {
                    ContentBlock::Text { text } => deltas.push(StreamDelta::Text(text.clone())),
                    ContentBlock::ToolUse { id, name, input } => {
                        deltas.push(StreamDelta::ToolCallStart {
                            id: id.clone(),
                            name: name.clone(),
                        });
                        deltas.push(StreamDelta::ToolCallInput {
                            id: id.clone(),
                            partial_json: input.to_string(),
                        });
                    }
                    ContentBlock::ToolResult { .. } => {}
                }
            }
        }
        None => {}
    }
    deltas
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Message, TokenUsage};
    use futures::StreamExt;
    use serde_json::json;

    #[test]
    fn test_replay_orders_blocks_then_completion() {
        let response = CompletionResponse::from_message(
            Message::assistant_blocks(vec![
                ContentBlock::Text {
                    text: "Routing.".into(),
                },
                ContentBlock::ToolUse {
                    id: "call_1".into(),
                    name: "transfer_to_reports".into(),
                    input: json!({}),
                },
            ]),
            TokenUsage::default(),
        );

        let deltas: Vec<StreamDelta> = tokio_test::block_on(
            replay(response.clone()).map(|d| d.unwrap()).collect::<Vec<_>>(),
        );

        assert_eq!(deltas.len(), 4);
        assert_eq!(deltas[0], StreamDelta::Text("Routing.".into()));
        assert!(matches!(&deltas[1], StreamDelta::ToolCallStart { name, .. } if name == "transfer_to_reports"));
        assert!(matches!(&deltas[2], StreamDelta::ToolCallInput { partial_json, .. } if partial_json == "{}"));
        assert_eq!(deltas[3], StreamDelta::Completed(response));
    }
}
