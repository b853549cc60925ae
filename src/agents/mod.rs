//! Agent runtime: the ports the services orchestrate against and the
//! default LLM-backed implementation behind them.

pub mod error;
pub mod event;
pub mod memory;
pub mod message;
pub mod provider;
pub mod runtime;
pub mod stream;

use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;

use crate::config::LlmSettings;
use crate::tools::ToolSet;
use error::{AgentError, AgentResult};
use event::{RunEventStream, RunOutput};
use memory::ConversationStore;
use provider::OpenAiProvider;
use runtime::LlmAgentRuntime;

/// Static description of an agent: prompt, model and run limits
#[derive(Debug, Clone)]
pub struct AgentSpec {
    /// Agent name, used for logging
    pub name: String,
    /// System prompt prepended to every invocation
    pub system_prompt: String,
    /// Model identifier
    pub model: String,
    /// JSON Schema the final answer must conform to, if structured
    pub output_schema: Option<Value>,
    /// Number of history messages replayed into each invocation
    pub history_limit: usize,
    /// Maximum tool-loop iterations per invocation
    pub max_iterations: u32,
}

/// A single agent invocation
///
/// The tool set is resolved per invocation and travels with the request,
/// so concurrent runs never share mutable tool state.
#[derive(Clone)]
pub struct RunRequest {
    /// User input text
    pub input: String,
    /// Conversation session id
    pub session_id: String,
    /// Requesting user id
    pub user_id: String,
    /// Tools available for this invocation only
    pub tools: ToolSet,
}

/// Port for executing agent invocations
#[async_trait]
pub trait AgentRuntime: Send + Sync {
    /// Execute an invocation, streaming events as they happen
    fn run_stream(&self, request: RunRequest) -> RunEventStream;

    /// Execute an invocation and wait for the final output
    async fn run(&self, request: RunRequest) -> AgentResult<RunOutput> {
        self.run_stream(request).collect_output().await
    }
}

/// Port for constructing agent runtimes
#[async_trait]
pub trait RuntimeFactory: Send + Sync {
    /// Build a runtime for the given agent description
    async fn build(&self, spec: &AgentSpec) -> AgentResult<Arc<dyn AgentRuntime>>;
}

/// Factory producing LLM-backed runtimes that share a conversation store
pub struct LlmRuntimeFactory {
    llm: LlmSettings,
    store: Arc<dyn ConversationStore>,
}

impl LlmRuntimeFactory {
    pub fn new(llm: LlmSettings, store: Arc<dyn ConversationStore>) -> Self {
        Self { llm, store }
    }
}

#[async_trait]
impl RuntimeFactory for LlmRuntimeFactory {
    async fn build(&self, spec: &AgentSpec) -> AgentResult<Arc<dyn AgentRuntime>> {
        let provider =
            OpenAiProvider::new(&self.llm, &spec.model).map_err(AgentError::Llm)?;
        Ok(Arc::new(LlmAgentRuntime::new(
            spec.clone(),
            Arc::new(provider),
            self.store.clone(),
        )))
    }
}
