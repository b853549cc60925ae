//! Translation of run events into client-facing streams
//!
//! One mapping feeds the SSE chat stream, the other feeds voice sessions
//! with sanitized text deltas. Both consume the same `RunEvent` sequence.

use futures::{Stream, StreamExt};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Instant;
use tokio::sync::mpsc;
use tracing::debug;

use super::sanitize::sanitize_for_speech;
use crate::agents::event::{RunEvent, RunEventStream};
use crate::agents::message::Role;

const MAX_ARGS_CHARS: usize = 200;
const MAX_PREVIEW_CHARS: usize = 500;

/// A frame of the SSE chat stream
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StreamFrame {
    /// Always the first frame; announces the session id
    Session { session_id: String },
    /// A tool invocation is starting
    ToolStart {
        tool: String,
        icon: String,
        action: String,
        args: String,
    },
    /// A tool invocation finished
    ToolComplete {
        tool: String,
        icon: String,
        action: String,
        result_preview: String,
    },
    /// Incremental assistant text
    Content { content: String },
    /// Terminal failure frame; never followed by `done`
    Error { error: String },
    /// Terminal success frame
    Done { execution_time: f64 },
}

impl StreamFrame {
    /// Encode as an SSE data line
    pub fn to_sse(&self) -> String {
        let json = serde_json::to_string(self).unwrap_or_else(|_| "{}".to_string());
        format!("data: {}\n\n", json)
    }
}

/// Stream of SSE frames handed to the HTTP layer
pub struct FrameStream {
    receiver: mpsc::Receiver<StreamFrame>,
}

impl FrameStream {
    pub fn channel(buffer: usize) -> (FrameSender, Self) {
        let (tx, rx) = mpsc::channel(buffer);
        (FrameSender { sender: tx }, Self { receiver: rx })
    }
}

impl Stream for FrameStream {
    type Item = StreamFrame;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        Pin::new(&mut self.receiver).poll_recv(cx)
    }
}

/// Sender half of a frame stream
#[derive(Clone)]
pub struct FrameSender {
    sender: mpsc::Sender<StreamFrame>,
}

impl FrameSender {
    pub async fn send(&self, frame: StreamFrame) -> Result<(), mpsc::error::SendError<StreamFrame>> {
        self.sender.send(frame).await
    }
}

/// A sanitized text delta for the voice pipeline
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatDelta {
    pub role: Role,
    pub content: String,
}

/// Stream of voice deltas
pub struct ChatDeltaStream {
    receiver: mpsc::Receiver<ChatDelta>,
}

impl ChatDeltaStream {
    pub fn channel(buffer: usize) -> (ChatDeltaSender, Self) {
        let (tx, rx) = mpsc::channel(buffer);
        (ChatDeltaSender { sender: tx }, Self { receiver: rx })
    }
}

impl Stream for ChatDeltaStream {
    type Item = ChatDelta;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        Pin::new(&mut self.receiver).poll_recv(cx)
    }
}

/// Sender half of a voice delta stream
#[derive(Clone)]
pub struct ChatDeltaSender {
    sender: mpsc::Sender<ChatDelta>,
}

impl ChatDeltaSender {
    pub async fn send(&self, delta: ChatDelta) -> Result<(), mpsc::error::SendError<ChatDelta>> {
        self.sender.send(delta).await
    }
}

/// Icon and action phrase shown for a tool
pub(crate) fn tool_presentation(name: &str) -> (&'static str, String) {
    match name {
        "web_search" => ("🔍", "Searching the web".to_string()),
        "sql_query" => ("🗄️", "Querying the database".to_string()),
        "send_document" => ("📨", "Sending a document".to_string()),
        other => ("🔧", format!("Using {}", other)),
    }
}

/// Truncate to a character budget without splitting a code point
fn truncate_chars(text: &str, limit: usize) -> String {
    if text.chars().count() <= limit {
        text.to_string()
    } else {
        text.chars().take(limit).collect()
    }
}

/// Round to three decimal places for the `done` frame
pub(crate) fn round_millis(seconds: f64) -> f64 {
    (seconds * 1000.0).round() / 1000.0
}

fn content_to_text(content: &Value) -> String {
    match content {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Forward run events as SSE frames until the run terminates
///
/// Emits `error` XOR `done` as the last frame. The caller has already
/// sent the session frame.
pub(crate) async fn relay_sse(mut events: RunEventStream, sender: &FrameSender, started: Instant) {
    let mut streamed_content = false;

    while let Some(item) = events.next().await {
        let event = match item {
            Ok(event) => event,
            Err(e) => {
                let _ = sender.send(StreamFrame::Error { error: e.to_string() }).await;
                return;
            }
        };

        match event {
            RunEvent::ToolCallStarted { tool_name, tool_args } => {
                let (icon, action) = tool_presentation(&tool_name);
                let args = truncate_chars(&tool_args.to_string(), MAX_ARGS_CHARS);
                let frame = StreamFrame::ToolStart {
                    tool: tool_name,
                    icon: icon.to_string(),
                    action,
                    args,
                };
                if sender.send(frame).await.is_err() {
                    return;
                }
            }
            RunEvent::ToolCallCompleted { tool_name, result } => {
                let (icon, action) = tool_presentation(&tool_name);
                let preview = truncate_chars(&content_to_text(&result), MAX_PREVIEW_CHARS);
                let frame = StreamFrame::ToolComplete {
                    tool: tool_name,
                    icon: icon.to_string(),
                    action,
                    result_preview: preview,
                };
                if sender.send(frame).await.is_err() {
                    return;
                }
            }
            RunEvent::ContentDelta { text } => {
                if text.is_empty() {
                    continue;
                }
                streamed_content = true;
                if sender.send(StreamFrame::Content { content: text }).await.is_err() {
                    return;
                }
            }
            RunEvent::RunFinal { content } => {
                // Only surface the final content when nothing streamed
                if streamed_content {
                    continue;
                }
                let text = content_to_text(&content);
                if text.is_empty() {
                    continue;
                }
                streamed_content = true;
                if sender.send(StreamFrame::Content { content: text }).await.is_err() {
                    return;
                }
            }
            RunEvent::RunError { error } => {
                let _ = sender.send(StreamFrame::Error { error }).await;
                return;
            }
            RunEvent::RunStarted | RunEvent::ContentCompleted | RunEvent::RunCompleted => {}
            RunEvent::Other { kind } => {
                debug!(kind, "Ignoring unrecognized run event");
            }
        }
    }

    let execution_time = round_millis(started.elapsed().as_secs_f64());
    let _ = sender.send(StreamFrame::Done { execution_time }).await;
}

/// Forward run events as sanitized voice deltas
///
/// Only assistant text reaches the voice pipeline; tool activity and
/// errors are logged, never spoken.
pub(crate) async fn relay_voice(mut events: RunEventStream, sender: &ChatDeltaSender) {
    let mut streamed_content = false;

    while let Some(item) = events.next().await {
        let event = match item {
            Ok(event) => event,
            Err(e) => {
                debug!("Voice run ended with error: {}", e);
                return;
            }
        };

        match event {
            RunEvent::ContentDelta { text } => {
                let spoken = sanitize_for_speech(&text);
                if spoken.is_empty() {
                    continue;
                }
                streamed_content = true;
                let delta = ChatDelta {
                    role: Role::Assistant,
                    content: spoken,
                };
                if sender.send(delta).await.is_err() {
                    return;
                }
            }
            RunEvent::RunFinal { content } => {
                if streamed_content {
                    continue;
                }
                let spoken = sanitize_for_speech(&content_to_text(&content));
                if spoken.is_empty() {
                    continue;
                }
                streamed_content = true;
                let delta = ChatDelta {
                    role: Role::Assistant,
                    content: spoken,
                };
                if sender.send(delta).await.is_err() {
                    return;
                }
            }
            RunEvent::RunError { error } => {
                debug!("Voice run failed: {}", error);
                return;
            }
            RunEvent::Other { kind } => {
                debug!(kind, "Ignoring unrecognized run event");
            }
            _ => {}
        }
    }
}
