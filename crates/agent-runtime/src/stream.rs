//! Incremental run output
//!
//! A streamed run produces [`StreamChunk`]s through a bounded channel: the
//! consumer pulls, and the run suspends whenever the buffer is full. The
//! sequence is single-pass and always ends with a `final_message` or an
//! `error` chunk.

use crate::RunResult;
use agent_core::{Error, Result};
use agent_llm::Message;
use futures::{Stream, StreamExt};
use serde::Serialize;
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_stream::wrappers::ReceiverStream;
use tokio_util::sync::DropGuard;

/// Phase of the run loop
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    /// About to call the model for the active agent
    Routing,
    /// Processing the model's tool calls
    Executing,
    /// Finishing the run
    Completing,
}

/// Transient snapshot of what the run is doing; never part of history
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AgentStatus {
    /// Current phase
    pub status: Status,
    /// Active agent
    pub agent: String,
}

impl AgentStatus {
    /// Create a status snapshot
    pub fn new(status: Status, agent: impl Into<String>) -> Self {
        Self {
            status,
            agent: agent.into(),
        }
    }
}

/// One ordered unit of streamed output
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StreamChunk {
    /// Assistant text, forwarded as the model produces it
    TextDelta {
        /// Agent producing the text
        agent: String,
        /// Text fragment
        text: String,
    },
    /// The model started a tool call
    ToolCallStart {
        /// Agent that requested the call
        agent: String,
        /// Call id
        id: String,
        /// Tool name
        name: String,
    },
    /// A tool call finished
    ToolCallResult {
        /// Agent that requested the call
        agent: String,
        /// Call id
        id: String,
        /// Tool name
        name: String,
        /// Content fed back to the model
        content: String,
        /// Whether the model sees this as an error
        is_error: bool,
    },
    /// Run phase change
    AgentStatus(AgentStatus),
    /// Control moved to another agent
    Handoff {
        /// Agent giving up control
        from: String,
        /// Agent taking over
        to: String,
    },
    /// The run completed with this assistant message
    FinalMessage {
        /// Agent that answered
        agent: String,
        /// Final assistant message
        message: Message,
    },
    /// The run ended without a final message
    Error {
        /// What ended the run
        message: String,
    },
}

impl StreamChunk {
    /// Whether this chunk closes the sequence
    pub fn is_terminal(&self) -> bool {
        matches!(self, StreamChunk::FinalMessage { .. } | StreamChunk::Error { .. })
    }
}

/// Sending half used by the run loop
///
/// Buffered runs have no sink and every emit is a no-op. A closed channel
/// means the consumer went away, which cancels the run.
#[derive(Debug, Clone, Default)]
pub(crate) struct ChunkSink {
    tx: Option<mpsc::Sender<StreamChunk>>,
}

impl ChunkSink {
    pub(crate) fn disabled() -> Self {
        Self { tx: None }
    }

    pub(crate) fn channel(tx: mpsc::Sender<StreamChunk>) -> Self {
        Self { tx: Some(tx) }
    }

    pub(crate) fn is_streaming(&self) -> bool {
        self.tx.is_some()
    }

    pub(crate) async fn emit(&self, chunk: StreamChunk) -> Result<()> {
        match &self.tx {
            Some(tx) => tx.send(chunk).await.map_err(|_| Error::Cancelled),
            None => Ok(()),
        }
    }
}

/// Streamed run handle
///
/// Yields [`StreamChunk`]s as they are produced. [`RunStream::finish`]
/// resolves to the same [`RunResult`] a buffered run would return. Dropping
/// the stream cancels the run.
pub struct RunStream {
    chunks: ReceiverStream<StreamChunk>,
    task: JoinHandle<Result<RunResult>>,
    cancel_on_drop: DropGuard,
}

impl RunStream {
    pub(crate) fn new(
        rx: mpsc::Receiver<StreamChunk>,
        task: JoinHandle<Result<RunResult>>,
        cancel_on_drop: DropGuard,
    ) -> Self {
        Self {
            chunks: ReceiverStream::new(rx),
            task,
            cancel_on_drop,
        }
    }

    /// Wait for the run to end, discarding chunks not yet consumed
    pub async fn finish(self) -> Result<RunResult> {
        let RunStream {
            mut chunks,
            task,
            cancel_on_drop,
        } = self;

        while chunks.next().await.is_some() {}
        let result = task
            .await
            .map_err(|e| Error::Generic(format!("run task failed: {e}")))?;
        cancel_on_drop.disarm();
        result
    }

    /// Consume every chunk, then the final result
    pub async fn collect_all(mut self) -> (Vec<StreamChunk>, Result<RunResult>) {
        let mut chunks = Vec::new();
        while let Some(chunk) = self.next().await {
            chunks.push(chunk);
        }
        (chunks, self.finish().await)
    }
}

impl Stream for RunStream {
    type Item = StreamChunk;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        Pin::new(&mut self.chunks).poll_next(cx)
    }
}

impl std::fmt::Debug for RunStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RunStream")
            .field("finished", &self.task.is_finished())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_chunk_serialization() {
        let chunk = StreamChunk::AgentStatus(AgentStatus::new(Status::Routing, "orchestrator"));
        assert_eq!(
            serde_json::to_value(&chunk).unwrap(),
            json!({"type": "agent_status", "status": "routing", "agent": "orchestrator"})
        );

        let chunk = StreamChunk::Handoff {
            from: "orchestrator".into(),
            to: "reports".into(),
        };
        assert_eq!(
            serde_json::to_value(&chunk).unwrap(),
            json!({"type": "handoff", "from": "orchestrator", "to": "reports"})
        );
    }

    #[test]
    fn test_terminal_chunks() {
        assert!(StreamChunk::Error { message: "x".into() }.is_terminal());
        assert!(
            StreamChunk::FinalMessage {
                agent: "a".into(),
                message: Message::assistant("done"),
            }
            .is_terminal()
        );
        assert!(
            !StreamChunk::TextDelta {
                agent: "a".into(),
                text: "t".into(),
            }
            .is_terminal()
        );
    }

    #[tokio::test]
    async fn test_closed_sink_reports_cancellation() {
        let (tx, rx) = mpsc::channel(1);
        let sink = ChunkSink::channel(tx);
        drop(rx);

        let err = sink
            .emit(StreamChunk::Error { message: "x".into() })
            .await
            .unwrap_err();
        assert_eq!(err, Error::Cancelled);
        assert!(ChunkSink::disabled().emit(StreamChunk::Error { message: "x".into() }).await.is_ok());
    }
}
