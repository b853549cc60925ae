//! Run events emitted by an agent invocation

use futures::Stream;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::sync::mpsc;

use super::error::AgentError;

/// An event emitted during an agent run
///
/// The set is closed: anything a runtime emits that has no dedicated arm
/// is carried as `Other` and never surfaced to clients.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum RunEvent {
    /// The run has begun
    RunStarted,
    /// A tool invocation is starting
    ToolCallStarted { tool_name: String, tool_args: Value },
    /// A tool invocation finished
    ToolCallCompleted { tool_name: String, result: Value },
    /// An incremental piece of assistant text
    ContentDelta { text: String },
    /// The assistant finished producing text
    ContentCompleted,
    /// The complete final content of the run
    RunFinal { content: Value },
    /// The run finished successfully
    RunCompleted,
    /// The run failed
    RunError { error: String },
    /// Any event kind without a dedicated arm
    Other { kind: String },
}

/// Final output of a non-streaming agent run
#[derive(Debug, Clone)]
pub struct RunOutput {
    /// Final content, if the run produced any
    pub content: Option<Value>,
}

/// Streaming sequence of run events
pub struct RunEventStream {
    receiver: mpsc::Receiver<Result<RunEvent, AgentError>>,
}

impl RunEventStream {
    /// Create a channel pair for building an event stream
    pub fn channel(buffer: usize) -> (RunEventSender, Self) {
        let (tx, rx) = mpsc::channel(buffer);
        (RunEventSender { sender: tx }, Self { receiver: rx })
    }

    /// Drain the stream into the run's final output
    ///
    /// Content deltas are accumulated as a fallback for runtimes that never
    /// emit a `RunFinal`; a `RunError` or stream error short-circuits.
    pub async fn collect_output(mut self) -> Result<RunOutput, AgentError> {
        let mut text = String::new();
        let mut final_content: Option<Value> = None;

        while let Some(item) = self.receiver.recv().await {
            match item? {
                RunEvent::ContentDelta { text: delta } => text.push_str(&delta),
                RunEvent::RunFinal { content } => final_content = Some(content),
                RunEvent::RunError { error } => return Err(AgentError::Execution(error)),
                _ => {}
            }
        }

        let content = final_content.or(if text.is_empty() {
            None
        } else {
            Some(Value::String(text))
        });

        Ok(RunOutput { content })
    }
}

impl Stream for RunEventStream {
    type Item = Result<RunEvent, AgentError>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        Pin::new(&mut self.receiver).poll_recv(cx)
    }
}

/// Sender half for building a run event stream
#[derive(Clone)]
pub struct RunEventSender {
    sender: mpsc::Sender<Result<RunEvent, AgentError>>,
}

impl RunEventSender {
    /// Send an event; fails when the consumer has gone away
    pub async fn send(
        &self,
        event: RunEvent,
    ) -> Result<(), mpsc::error::SendError<Result<RunEvent, AgentError>>> {
        self.sender.send(Ok(event)).await
    }

    /// Send an error item
    pub async fn send_error(
        &self,
        error: AgentError,
    ) -> Result<(), mpsc::error::SendError<Result<RunEvent, AgentError>>> {
        self.sender.send(Err(error)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_collect_prefers_final_content() {
        let (tx, stream) = RunEventStream::channel(8);
        tokio::spawn(async move {
            let _ = tx.send(RunEvent::RunStarted).await;
            let _ = tx.send(RunEvent::ContentDelta { text: "partial".into() }).await;
            let _ = tx
                .send(RunEvent::RunFinal { content: json!("complete answer") })
                .await;
            let _ = tx.send(RunEvent::RunCompleted).await;
        });

        let output = stream.collect_output().await.unwrap();
        assert_eq!(output.content, Some(json!("complete answer")));
    }

    #[tokio::test]
    async fn test_collect_accumulates_deltas_without_final() {
        let (tx, stream) = RunEventStream::channel(8);
        tokio::spawn(async move {
            let _ = tx.send(RunEvent::ContentDelta { text: "a".into() }).await;
            let _ = tx.send(RunEvent::ContentDelta { text: "b".into() }).await;
        });

        let output = stream.collect_output().await.unwrap();
        assert_eq!(output.content, Some(json!("ab")));
    }

    #[tokio::test]
    async fn test_collect_propagates_run_error() {
        let (tx, stream) = RunEventStream::channel(8);
        tokio::spawn(async move {
            let _ = tx
                .send(RunEvent::RunError { error: "provider unavailable".into() })
                .await;
        });

        let err = stream.collect_output().await.unwrap_err();
        assert!(err.to_string().contains("provider unavailable"));
    }

    #[tokio::test]
    async fn test_collect_empty_stream_has_no_content() {
        let (tx, stream) = RunEventStream::channel(1);
        drop(tx);
        let output = stream.collect_output().await.unwrap();
        assert!(output.content.is_none());
    }

    #[test]
    fn test_event_wire_format_is_tagged() {
        let event = RunEvent::ToolCallStarted {
            tool_name: "sql_query".into(),
            tool_args: json!({"query": "SELECT 1"}),
        };
        let wire = serde_json::to_value(&event).unwrap();
        assert_eq!(wire["event"], "tool_call_started");
        assert_eq!(wire["tool_name"], "sql_query");
    }
}
