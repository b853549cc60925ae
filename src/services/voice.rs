//! Bridge between a real-time voice session and the chat agent
//!
//! The voice stack hands over the running conversation context on every
//! turn; the bridge extracts the latest user utterance, invokes the agent
//! and streams back sanitized text deltas for speech synthesis.

use std::sync::Arc;
use tracing::{debug, error};

use super::chat::ChatService;
use super::translator::{self, ChatDeltaStream};
use crate::agents::message::{Message, Role};

/// One voice session bound to a chat agent
pub struct VoiceSessionBridge {
    service: Arc<ChatService>,
    session_id: String,
    user_id: String,
}

impl VoiceSessionBridge {
    /// Create a bridge; the session id is typically the room name
    pub fn new(service: Arc<ChatService>, session_id: String, user_id: String) -> Self {
        Self {
            service,
            session_id,
            user_id,
        }
    }

    /// Run one conversational turn against the given context
    ///
    /// The context is scanned backward for the most recent user message;
    /// without one the returned stream is empty. Failures end the stream
    /// silently, nothing is spoken.
    pub fn chat_turn(&self, context: &[Message]) -> ChatDeltaStream {
        let (sender, deltas) = ChatDeltaStream::channel(64);

        let Some(input) = last_user_message(context) else {
            debug!(session_id = %self.session_id, "No user message in context, skipping turn");
            return deltas;
        };

        let service = self.service.clone();
        let session_id = self.session_id.clone();
        let user_id = self.user_id.clone();

        tokio::spawn(async move {
            match service.invoke_stream(&input, &session_id, &user_id).await {
                Ok(events) => translator::relay_voice(events, &sender).await,
                Err(e) => {
                    error!(session_id = %session_id, "Voice turn failed: {}", e);
                }
            }
        });

        deltas
    }
}

/// Most recent user utterance in the context, if any
fn last_user_message(context: &[Message]) -> Option<String> {
    context
        .iter()
        .rev()
        .find(|m| m.role == Role::User && !m.content.trim().is_empty())
        .map(|m| m.content.clone())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::chat::test_support::{
        test_spec, CountingToolFactory, EndlessRuntime, StaticFactory, StaticRuntime,
    };
    use futures::StreamExt;

    fn bridge(reply: &str) -> (VoiceSessionBridge, Arc<StaticRuntime>) {
        let runtime = Arc::new(StaticRuntime::new(reply));
        let service = Arc::new(ChatService::new(
            test_spec(),
            Arc::new(StaticFactory::new(runtime.clone())),
            Arc::new(CountingToolFactory::default()),
        ));
        (
            VoiceSessionBridge::new(service, "room-1".to_string(), "voice-user".to_string()),
            runtime,
        )
    }

    #[test]
    fn test_last_user_message_scans_backward() {
        let context = vec![
            Message::user("first question"),
            Message::assistant("first answer"),
            Message::user("second question"),
            Message::assistant("second answer"),
        ];
        assert_eq!(
            last_user_message(&context),
            Some("second question".to_string())
        );
    }

    #[test]
    fn test_blank_user_messages_are_skipped() {
        let context = vec![Message::user("real question"), Message::user("   ")];
        assert_eq!(
            last_user_message(&context),
            Some("real question".to_string())
        );
    }

    #[tokio::test]
    async fn test_turn_streams_sanitized_reply() {
        let (bridge, runtime) = bridge("**Tighten** the belt");
        let context = vec![Message::user("why does it squeal?")];

        let mut stream = bridge.chat_turn(&context);
        let mut spoken = String::new();
        while let Some(delta) = stream.next().await {
            assert_eq!(delta.role, Role::Assistant);
            spoken.push_str(&delta.content);
        }

        assert_eq!(spoken, "Tighten the belt");
        let requests = runtime.requests.lock().unwrap();
        assert_eq!(requests[0].0, "why does it squeal?");
    }

    #[tokio::test]
    async fn test_turn_dropped_by_consumer_stops_producer() {
        let (runtime, stopped) = EndlessRuntime::new();
        let service = Arc::new(ChatService::new(
            test_spec(),
            Arc::new(StaticFactory::new(runtime)),
            Arc::new(CountingToolFactory::default()),
        ));
        let bridge =
            VoiceSessionBridge::new(service, "room-1".to_string(), "voice-user".to_string());

        let mut stream = bridge.chat_turn(&[Message::user("hi")]);
        assert!(stream.next().await.is_some());
        drop(stream);

        tokio::time::timeout(std::time::Duration::from_secs(1), stopped.notified())
            .await
            .expect("producer kept running after the stream was dropped");
    }

    #[tokio::test]
    async fn test_turn_without_user_message_is_empty() {
        let (bridge, runtime) = bridge("unused");
        let context = vec![Message::assistant("hello, how can I help?")];

        let mut stream = bridge.chat_turn(&context);
        assert!(stream.next().await.is_none());
        assert!(runtime.requests.lock().unwrap().is_empty());
    }
}
