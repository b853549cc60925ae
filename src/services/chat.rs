//! Chat orchestration
//!
//! Owns agent readiness and per-invocation tool freshness: the runtime and
//! stable tools are built once, ephemeral tools are rebuilt for every
//! request and travel with it.

use std::sync::Arc;
use std::time::Instant;
use tokio::sync::OnceCell;
use tracing::{debug, info};
use uuid::Uuid;

use super::translator::{self, FrameStream, StreamFrame};
use crate::agents::error::{AgentError, AgentResult};
use crate::agents::event::{RunEventStream, RunOutput};
use crate::agents::{AgentRuntime, AgentSpec, RunRequest, RuntimeFactory};
use crate::config::LlmSettings;
use crate::tools::{Tool, ToolFactory, ToolSet};

/// System prompt for the troubleshooting chat agent
pub const CHAT_SYSTEM_PROMPT: &str = "\
You are a knowledgeable assistant for an industrial equipment marketplace. \
You help customers troubleshoot machines, find listings and understand \
product details.

Guidelines:
- Use the sql_query tool to look up listings, orders and customers in the \
marketplace database. Prefer the database over guessing.
- Use the web_search tool for general product knowledge, specifications and \
compatibility questions the database cannot answer.
- Never invent part numbers, prices or availability.
- Keep answers practical and concise. Offer concrete next steps.
- If a request involves anything dangerous (electrical work, pressurized \
systems), remind the customer to follow the safety procedures in the manual.";

/// Reply of a non-streaming chat invocation
#[derive(Debug, Clone)]
pub struct ChatReply {
    pub response: String,
    pub session_id: String,
}

struct Ready {
    runtime: Arc<dyn AgentRuntime>,
    stable: Vec<Arc<dyn Tool>>,
}

/// Orchestrates agent invocations for one agent description
pub struct ChatService {
    spec: AgentSpec,
    runtimes: Arc<dyn RuntimeFactory>,
    tools: Arc<dyn ToolFactory>,
    ready: OnceCell<Ready>,
}

impl ChatService {
    pub fn new(
        spec: AgentSpec,
        runtimes: Arc<dyn RuntimeFactory>,
        tools: Arc<dyn ToolFactory>,
    ) -> Self {
        Self {
            spec,
            runtimes,
            tools,
            ready: OnceCell::new(),
        }
    }

    /// Agent description for the chat agent
    pub fn chat_spec(llm: &LlmSettings) -> AgentSpec {
        AgentSpec {
            name: "chat".to_string(),
            system_prompt: CHAT_SYSTEM_PROMPT.to_string(),
            model: llm.model.clone(),
            output_schema: None,
            history_limit: 10,
            max_iterations: 5,
        }
    }

    /// Build the runtime and stable tools once; safe to call repeatedly
    ///
    /// A failed attempt leaves the service unready, so the next call
    /// retries the construction.
    pub async fn ensure_ready(&self) -> AgentResult<()> {
        self.readied().await.map(|_| ())
    }

    async fn readied(&self) -> AgentResult<&Ready> {
        self.ready
            .get_or_try_init(|| async {
                let runtime = self.runtimes.build(&self.spec).await?;
                let stable = self
                    .tools
                    .build_stable()
                    .await
                    .map_err(|e| AgentError::Initialization(e.to_string()))?;
                info!(agent = %self.spec.name, tools = stable.len(), "Agent ready");
                Ok(Ready { runtime, stable })
            })
            .await
    }

    /// Resolve the tools for one invocation: cached stable + fresh ephemeral
    async fn fresh_toolset(&self, ready: &Ready) -> AgentResult<ToolSet> {
        let ephemeral = self
            .tools
            .build_ephemeral()
            .await
            .map_err(|e| AgentError::ToolSetup(e.to_string()))?;
        let mut all = ready.stable.clone();
        all.extend(ephemeral);
        Ok(ToolSet::new(all))
    }

    /// Run one invocation and wait for the final output
    pub(crate) async fn invoke(
        &self,
        input: &str,
        session_id: &str,
        user_id: &str,
    ) -> AgentResult<RunOutput> {
        let ready = self.readied().await?;
        let tools = self.fresh_toolset(ready).await?;
        debug!(agent = %self.spec.name, session_id, user_id, "Invoking agent");
        ready
            .runtime
            .run(RunRequest {
                input: input.to_string(),
                session_id: session_id.to_string(),
                user_id: user_id.to_string(),
                tools,
            })
            .await
    }

    /// Run one invocation in streaming mode
    pub(crate) async fn invoke_stream(
        &self,
        input: &str,
        session_id: &str,
        user_id: &str,
    ) -> AgentResult<RunEventStream> {
        let ready = self.readied().await?;
        let tools = self.fresh_toolset(ready).await?;
        debug!(agent = %self.spec.name, session_id, user_id, "Invoking agent (streaming)");
        Ok(ready.runtime.run_stream(RunRequest {
            input: input.to_string(),
            session_id: session_id.to_string(),
            user_id: user_id.to_string(),
            tools,
        }))
    }

    /// Handle a chat message and return the complete reply
    pub async fn chat(
        &self,
        message: &str,
        session_id: Option<String>,
        user_id: &str,
    ) -> AgentResult<ChatReply> {
        let session_id = resolve_session_id(session_id);
        let started = Instant::now();

        let output = self.invoke(message, &session_id, user_id).await?;
        let response = output.content.map(response_text).unwrap_or_default();

        info!(
            session_id = %session_id,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Chat completed"
        );
        Ok(ChatReply { response, session_id })
    }

    /// Handle a chat message as an SSE frame stream
    ///
    /// The session frame is always first; setup failures become a terminal
    /// error frame after it.
    pub fn chat_stream(
        self: Arc<Self>,
        message: String,
        session_id: Option<String>,
        user_id: String,
    ) -> FrameStream {
        let service = self;
        let (sender, frames) = FrameStream::channel(64);

        tokio::spawn(async move {
            let started = Instant::now();
            let session_id = resolve_session_id(session_id);

            let session_frame = StreamFrame::Session {
                session_id: session_id.clone(),
            };
            if sender.send(session_frame).await.is_err() {
                return;
            }

            match service.invoke_stream(&message, &session_id, &user_id).await {
                Ok(events) => translator::relay_sse(events, &sender, started).await,
                Err(e) => {
                    let _ = sender.send(StreamFrame::Error { error: e.to_string() }).await;
                }
            }
        });

        frames
    }
}

/// Echo a supplied session id; otherwise mint a new one
pub(crate) fn resolve_session_id(supplied: Option<String>) -> String {
    supplied
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| Uuid::new_v4().to_string())
}

/// Render final content as the reply body
pub(crate) fn response_text(content: serde_json::Value) -> String {
    match content {
        serde_json::Value::String(s) => s,
        other => other.to_string(),
    }
}
