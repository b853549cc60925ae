//! Structured listing diagnostics

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, warn};

use super::chat::{resolve_session_id, ChatService};
use super::translator::round_millis;
use crate::agents::error::AgentResult;
use crate::agents::{AgentSpec, RuntimeFactory};
use crate::config::LlmSettings;
use crate::tools::ToolFactory;

/// Upper bound on diagnoses returned per request
pub const MAX_DIAGNOSTICS: usize = 5;

/// System prompt for the diagnostics agent
pub const DIAGNOSTICS_SYSTEM_PROMPT: &str = "\
You are a diagnostics specialist for an industrial equipment marketplace. \
Given a listing id and an issue description, produce the most likely \
diagnoses.

Guidelines:
- Use the sql_query tool to read the listing table for the machine's make, \
model, age and service history before diagnosing.
- Return at most 5 diagnoses, each a single plain sentence a technician can \
act on, ordered from most to least likely.
- When a relevant manual exists, offer to deliver it with the send_document \
tool.
- Answer with the structured diagnostics output only.";

/// Wire shape of the structured model answer
#[derive(Debug, Serialize, Deserialize)]
struct DiagnosticsOutput {
    diagnostics: Vec<String>,
}

/// Result of a diagnostics request
#[derive(Debug, Clone)]
pub struct DiagnosticsReport {
    pub diagnostics: Vec<String>,
    pub listing_id: String,
    pub session_id: String,
    pub execution_time: f64,
}

/// Diagnostics agent service, reusing the chat orchestration core
pub struct DiagnosticsService {
    core: ChatService,
}

impl DiagnosticsService {
    pub fn new(
        spec: AgentSpec,
        runtimes: Arc<dyn RuntimeFactory>,
        tools: Arc<dyn ToolFactory>,
    ) -> Self {
        Self {
            core: ChatService::new(spec, runtimes, tools),
        }
    }

    /// Agent description for the diagnostics agent
    pub fn diagnostics_spec(llm: &LlmSettings) -> AgentSpec {
        AgentSpec {
            name: "diagnostics".to_string(),
            system_prompt: DIAGNOSTICS_SYSTEM_PROMPT.to_string(),
            model: llm.diagnostics_model().to_string(),
            output_schema: Some(output_schema()),
            history_limit: 6,
            max_iterations: 5,
        }
    }

    /// Build the runtime and stable tools once; safe to call repeatedly
    pub async fn ensure_ready(&self) -> AgentResult<()> {
        self.core.ensure_ready().await
    }

    /// Diagnose a reported issue against a listing
    ///
    /// Unparseable model output degrades to an empty list, never an error.
    pub async fn diagnose(
        &self,
        message: &str,
        listing_id: &str,
        session_id: Option<String>,
        user_id: &str,
    ) -> AgentResult<DiagnosticsReport> {
        let session_id = resolve_session_id(session_id);
        let started = Instant::now();

        let prompt = format!(
            "Listing ID: {}\nIssue description: {}\n\n\
             Analyze the issue and return the most likely diagnoses.",
            listing_id, message
        );

        let output = self.core.invoke(&prompt, &session_id, user_id).await?;
        let mut diagnostics = extract_diagnostics(output.content);
        diagnostics.truncate(MAX_DIAGNOSTICS);

        let execution_time = round_millis(started.elapsed().as_secs_f64());
        info!(
            listing_id,
            session_id = %session_id,
            count = diagnostics.len(),
            execution_time,
            "Diagnostics completed"
        );

        Ok(DiagnosticsReport {
            diagnostics,
            listing_id: listing_id.to_string(),
            session_id,
            execution_time,
        })
    }
}

/// JSON Schema for the structured diagnostics answer
pub fn output_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "diagnostics": {
                "type": "array",
                "items": { "type": "string" },
                "maxItems": MAX_DIAGNOSTICS
            }
        },
        "required": ["diagnostics"]
    })
}

/// Pull the diagnoses out of whatever shape the run produced
fn extract_diagnostics(content: Option<Value>) -> Vec<String> {
    let Some(content) = content else {
        return Vec::new();
    };

    let parsed = match content {
        Value::Object(_) => serde_json::from_value::<DiagnosticsOutput>(content),
        Value::String(text) => serde_json::from_str::<DiagnosticsOutput>(&text),
        _ => {
            warn!("Diagnostics run produced non-object content");
            return Vec::new();
        }
    };

    match parsed {
        Ok(output) => output.diagnostics,
        Err(e) => {
            warn!("Failed to parse diagnostics output: {}", e);
            Vec::new()
        }
    }
}
