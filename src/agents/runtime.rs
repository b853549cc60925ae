//! LLM-backed agent runtime
//!
//! Runs the tool loop: stream a completion, execute any requested tools,
//! feed the results back, repeat until the model stops or the iteration
//! cap is hit. Conversation history is replayed from the store and the
//! exchange is persisted when the run completes.

use futures::StreamExt;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{debug, warn};

use super::event::{RunEvent, RunEventSender, RunEventStream};
use super::memory::ConversationStore;
use super::message::Message;
use super::provider::{CompletionRequest, FinishReason, LlmProvider};
use super::stream::ToolCallAccumulator;
use super::{AgentRuntime, AgentSpec, RunRequest};

/// Agent runtime driving an OpenAI-compatible chat completions provider
pub struct LlmAgentRuntime {
    spec: AgentSpec,
    llm: Arc<dyn LlmProvider>,
    memory: Arc<dyn ConversationStore>,
}

impl LlmAgentRuntime {
    pub fn new(
        spec: AgentSpec,
        llm: Arc<dyn LlmProvider>,
        memory: Arc<dyn ConversationStore>,
    ) -> Self {
        Self { spec, llm, memory }
    }
}

impl AgentRuntime for LlmAgentRuntime {
    fn run_stream(&self, request: RunRequest) -> RunEventStream {
        let (sender, stream) = RunEventStream::channel(64);
        let spec = self.spec.clone();
        let llm = self.llm.clone();
        let memory = self.memory.clone();

        tokio::spawn(async move {
            execute(spec, llm, memory, request, sender).await;
        });

        stream
    }
}

async fn execute(
    spec: AgentSpec,
    llm: Arc<dyn LlmProvider>,
    memory: Arc<dyn ConversationStore>,
    request: RunRequest,
    sender: RunEventSender,
) {
    if sender.send(RunEvent::RunStarted).await.is_err() {
        return;
    }

    let mut session = match memory.get_or_create(&request.session_id).await {
        Ok(session) => session,
        Err(e) => {
            let _ = sender.send(RunEvent::RunError { error: e.to_string() }).await;
            return;
        }
    };
    session.add_message(Message::user(&request.input));

    let mut messages = vec![Message::system(&spec.system_prompt)];
    let history_start = session.messages.len().saturating_sub(spec.history_limit);
    messages.extend(session.messages[history_start..].iter().cloned());

    let tool_definitions = request.tools.definitions();
    let mut final_content = String::new();

    for iteration in 0..spec.max_iterations {
        debug!(
            agent = %spec.name,
            session_id = %request.session_id,
            iteration,
            "Requesting completion"
        );

        let completion = CompletionRequest {
            messages: messages.clone(),
            model: Some(spec.model.clone()),
            tools: if tool_definitions.is_empty() {
                None
            } else {
                Some(tool_definitions.clone())
            },
            output_schema: spec.output_schema.clone(),
            ..Default::default()
        };

        let mut stream = llm.complete_stream(completion);
        let mut content = String::new();
        let mut accumulator = ToolCallAccumulator::new();
        let mut finish_reason = FinishReason::Stop;

        while let Some(item) = stream.next().await {
            match item {
                Ok(chunk) => {
                    if !chunk.content.is_empty() {
                        content.push_str(&chunk.content);
                        let delta = RunEvent::ContentDelta { text: chunk.content };
                        if sender.send(delta).await.is_err() {
                            return;
                        }
                    }
                    for delta in &chunk.tool_calls {
                        accumulator.apply_delta(delta);
                    }
                    if let Some(reason) = chunk.finish_reason {
                        finish_reason = reason;
                    }
                }
                Err(e) => {
                    let _ = sender.send(RunEvent::RunError { error: e.to_string() }).await;
                    return;
                }
            }
        }

        let tool_calls = accumulator.build();
        if tool_calls.is_empty() || finish_reason != FinishReason::ToolCalls {
            final_content = content;
            break;
        }

        messages.push(Message::assistant_with_tools(&content, tool_calls.clone()));

        for call in &tool_calls {
            let started = RunEvent::ToolCallStarted {
                tool_name: call.name.clone(),
                tool_args: call.arguments.clone(),
            };
            if sender.send(started).await.is_err() {
                return;
            }

            let result = match request.tools.get(&call.name) {
                Some(tool) => match tool.call(call.arguments.clone()).await {
                    Ok(text) => Value::String(text),
                    Err(e) => json!({ "error": e.to_string() }),
                },
                None => json!({ "error": format!("unknown tool: {}", call.name) }),
            };

            let completed = RunEvent::ToolCallCompleted {
                tool_name: call.name.clone(),
                result: result.clone(),
            };
            if sender.send(completed).await.is_err() {
                return;
            }

            messages.push(Message::tool_result(&call.id, &result));
        }
    }

    if sender.send(RunEvent::ContentCompleted).await.is_err() {
        return;
    }

    session.add_message(Message::assistant(&final_content));
    if let Err(e) = memory.save(&session).await {
        warn!(session_id = %request.session_id, "Failed to persist session: {}", e);
    }

    let content = if spec.output_schema.is_some() {
        serde_json::from_str(&final_content)
            .unwrap_or_else(|_| Value::String(final_content.clone()))
    } else {
        Value::String(final_content.clone())
    };

    let _ = sender.send(RunEvent::RunFinal { content }).await;
    let _ = sender.send(RunEvent::RunCompleted).await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agents::memory::InMemoryStore;
    use crate::agents::stream::{LlmStream, StreamChunk, ToolCallDelta};
    use crate::tools::{Tool, ToolSet};
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    struct ScriptedProvider {
        scripts: Mutex<VecDeque<Vec<StreamChunk>>>,
    }

    impl ScriptedProvider {
        fn new(scripts: Vec<Vec<StreamChunk>>) -> Self {
            Self {
                scripts: Mutex::new(scripts.into()),
            }
        }
    }

    impl LlmProvider for ScriptedProvider {
        fn model(&self) -> &str {
            "scripted"
        }

        fn complete_stream(&self, _request: CompletionRequest) -> LlmStream {
            let chunks = self
                .scripts
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_default();
            let (tx, stream) = LlmStream::channel(16);
            tokio::spawn(async move {
                for chunk in chunks {
                    if tx.send(chunk).await.is_err() {
                        return;
                    }
                }
            });
            stream
        }
    }

    struct EchoTool;

    #[async_trait]
    impl Tool for EchoTool {
        fn name(&self) -> &str {
            "echo"
        }

        fn description(&self) -> &str {
            "Echo the input back"
        }

        fn parameters(&self) -> Value {
            json!({"type": "object", "properties": {"text": {"type": "string"}}})
        }

        async fn call(&self, args: Value) -> anyhow::Result<String> {
            Ok(format!("echo: {}", args["text"].as_str().unwrap_or("")))
        }
    }

    fn spec() -> AgentSpec {
        AgentSpec {
            name: "test".to_string(),
            system_prompt: "be helpful".to_string(),
            model: "scripted".to_string(),
            output_schema: None,
            history_limit: 10,
            max_iterations: 5,
        }
    }

    fn tool_call_chunk() -> Vec<StreamChunk> {
        vec![
            StreamChunk {
                content: String::new(),
                tool_calls: vec![ToolCallDelta::new(0)
                    .with_id("call_1")
                    .with_name("echo")
                    .with_arguments(r#"{"text":"hi"}"#)],
                finish_reason: None,
            },
            StreamChunk::finish(FinishReason::ToolCalls),
        ]
    }

    fn request(tools: ToolSet) -> RunRequest {
        RunRequest {
            input: "hello".to_string(),
            session_id: "s1".to_string(),
            user_id: "u1".to_string(),
            tools,
        }
    }

    #[tokio::test]
    async fn test_plain_completion_run() {
        let provider = Arc::new(ScriptedProvider::new(vec![vec![
            StreamChunk::text("hi "),
            StreamChunk::text("there"),
            StreamChunk::finish(FinishReason::Stop),
        ]]));
        let store = Arc::new(InMemoryStore::new(100));
        let runtime = LlmAgentRuntime::new(spec(), provider, store.clone());

        let output = runtime.run(request(ToolSet::default())).await.unwrap();
        assert_eq!(output.content, Some(json!("hi there")));

        // Both sides of the exchange are persisted
        let session = store.load("s1").await.unwrap().unwrap();
        assert_eq!(session.message_count(), 2);
        assert_eq!(session.messages[1].content, "hi there");
    }

    #[tokio::test]
    async fn test_tool_loop_executes_and_continues() {
        let provider = Arc::new(ScriptedProvider::new(vec![
            tool_call_chunk(),
            vec![
                StreamChunk::text("done"),
                StreamChunk::finish(FinishReason::Stop),
            ],
        ]));
        let store = Arc::new(InMemoryStore::new(100));
        let runtime = LlmAgentRuntime::new(spec(), provider, store);
        let tools = ToolSet::new(vec![Arc::new(EchoTool)]);

        let mut events = Vec::new();
        let mut stream = runtime.run_stream(request(tools));
        while let Some(item) = stream.next().await {
            events.push(item.unwrap());
        }

        assert!(matches!(events[0], RunEvent::RunStarted));
        let started = events
            .iter()
            .any(|e| matches!(e, RunEvent::ToolCallStarted { tool_name, .. } if tool_name == "echo"));
        assert!(started);
        let completed = events.iter().any(|e| {
            matches!(e, RunEvent::ToolCallCompleted { result, .. } if result == &json!("echo: hi"))
        });
        assert!(completed);
        assert!(matches!(events.last(), Some(RunEvent::RunCompleted)));
    }

    #[tokio::test]
    async fn test_unknown_tool_reported_to_model() {
        let provider = Arc::new(ScriptedProvider::new(vec![
            tool_call_chunk(),
            vec![StreamChunk::finish(FinishReason::Stop)],
        ]));
        let store = Arc::new(InMemoryStore::new(100));
        let runtime = LlmAgentRuntime::new(spec(), provider, store);

        let mut stream = runtime.run_stream(request(ToolSet::default()));
        let mut saw_error_result = false;
        while let Some(item) = stream.next().await {
            if let RunEvent::ToolCallCompleted { result, .. } = item.unwrap() {
                saw_error_result = result["error"]
                    .as_str()
                    .is_some_and(|e| e.contains("unknown tool"));
            }
        }
        assert!(saw_error_result);
    }

    #[tokio::test]
    async fn test_structured_output_parsed_as_json() {
        let provider = Arc::new(ScriptedProvider::new(vec![vec![
            StreamChunk::text(r#"{"diagnostics":["check the belt"]}"#),
            StreamChunk::finish(FinishReason::Stop),
        ]]));
        let store = Arc::new(InMemoryStore::new(100));
        let mut structured = spec();
        structured.output_schema = Some(json!({"type": "object"}));
        let runtime = LlmAgentRuntime::new(structured, provider, store);

        let output = runtime.run(request(ToolSet::default())).await.unwrap();
        assert_eq!(
            output.content,
            Some(json!({"diagnostics": ["check the belt"]}))
        );
    }
}
