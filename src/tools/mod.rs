//! Callable tool capabilities handed to the agent per invocation

pub mod retry;
pub mod search;
pub mod send_document;
pub mod sql;

use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;

use crate::agents::provider::ToolDefinition;
use crate::config::{DatabaseSettings, SearchSettings, WebhookSettings};
use search::WebSearchTool;
use send_document::SendDocumentTool;
use sql::SqlQueryTool;

/// A capability the model can call during a run
#[async_trait]
pub trait Tool: Send + Sync {
    /// Tool name as advertised to the model
    fn name(&self) -> &str;

    /// Description advertised to the model
    fn description(&self) -> &str;

    /// JSON Schema for the call arguments
    fn parameters(&self) -> Value;

    /// Execute the tool with the given arguments
    async fn call(&self, args: Value) -> anyhow::Result<String>;
}

/// The tools resolved for a single invocation
#[derive(Clone, Default)]
pub struct ToolSet {
    tools: Vec<Arc<dyn Tool>>,
}

impl ToolSet {
    pub fn new(tools: Vec<Arc<dyn Tool>>) -> Self {
        Self { tools }
    }

    /// Look up a tool by name
    pub fn get(&self, name: &str) -> Option<&Arc<dyn Tool>> {
        self.tools.iter().find(|t| t.name() == name)
    }

    /// Definitions advertised to the model
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        self.tools
            .iter()
            .map(|t| ToolDefinition {
                name: t.name().to_string(),
                description: t.description().to_string(),
                parameters: t.parameters(),
            })
            .collect()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

/// Port for resolving tools
///
/// Stable tools are built once and cached for the process lifetime;
/// ephemeral tools are rebuilt for every invocation so connection-scoped
/// state never leaks across requests.
#[async_trait]
pub trait ToolFactory: Send + Sync {
    /// Tools safe to share across invocations
    async fn build_stable(&self) -> anyhow::Result<Vec<Arc<dyn Tool>>>;

    /// Tools rebuilt per invocation
    async fn build_ephemeral(&self) -> anyhow::Result<Vec<Arc<dyn Tool>>>;
}

/// Default factory wiring the shipped tools from settings
pub struct StandardToolFactory {
    database: DatabaseSettings,
    search: SearchSettings,
    webhook: Option<WebhookSettings>,
}

impl StandardToolFactory {
    pub fn new(database: DatabaseSettings, search: SearchSettings) -> Self {
        Self {
            database,
            search,
            webhook: None,
        }
    }

    /// Also offer the document delivery tool when a webhook is configured
    pub fn with_webhook(mut self, webhook: Option<WebhookSettings>) -> Self {
        self.webhook = webhook;
        self
    }
}

#[async_trait]
impl ToolFactory for StandardToolFactory {
    async fn build_stable(&self) -> anyhow::Result<Vec<Arc<dyn Tool>>> {
        let mut tools: Vec<Arc<dyn Tool>> = vec![Arc::new(WebSearchTool::new(&self.search))];
        if let Some(webhook) = &self.webhook {
            tools.push(Arc::new(SendDocumentTool::new(webhook)));
        }
        Ok(tools)
    }

    async fn build_ephemeral(&self) -> anyhow::Result<Vec<Arc<dyn Tool>>> {
        // A fresh lazy pool per invocation, dropped with the request
        Ok(vec![Arc::new(SqlQueryTool::connect_lazy(&self.database)?)])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    struct DummyTool(&'static str);

    #[async_trait]
    impl Tool for DummyTool {
        fn name(&self) -> &str {
            self.0
        }

        fn description(&self) -> &str {
            "dummy"
        }

        fn parameters(&self) -> Value {
            json!({"type": "object", "properties": {}})
        }

        async fn call(&self, _args: Value) -> anyhow::Result<String> {
            Ok("ok".to_string())
        }
    }

    #[test]
    fn test_toolset_lookup_and_definitions() {
        let set = ToolSet::new(vec![Arc::new(DummyTool("a")), Arc::new(DummyTool("b"))]);
        assert_eq!(set.len(), 2);
        assert!(set.get("a").is_some());
        assert!(set.get("missing").is_none());

        let defs = set.definitions();
        assert_eq!(defs[1].name, "b");
        assert_eq!(defs[0].parameters["type"], "object");
    }

    #[tokio::test]
    async fn test_standard_factory_stable_tools() {
        let factory = StandardToolFactory::new(
            DatabaseSettings::default(),
            SearchSettings::default(),
        );
        let stable = factory.build_stable().await.unwrap();
        assert_eq!(stable.len(), 1);
        assert_eq!(stable[0].name(), "web_search");

        let with_webhook = StandardToolFactory::new(
            DatabaseSettings::default(),
            SearchSettings::default(),
        )
        .with_webhook(Some(WebhookSettings {
            url: "http://localhost/hook".to_string(),
            secret: None,
        }));
        let stable = with_webhook.build_stable().await.unwrap();
        assert_eq!(stable.len(), 2);
        assert_eq!(stable[1].name(), "send_document");
    }

    #[tokio::test]
    async fn test_standard_factory_rebuilds_ephemeral_tools() {
        let factory = StandardToolFactory::new(
            DatabaseSettings::default(),
            SearchSettings::default(),
        );
        let first = factory.build_ephemeral().await.unwrap();
        let second = factory.build_ephemeral().await.unwrap();
        assert_eq!(first.len(), 1);
        assert_eq!(first[0].name(), "sql_query");
        // Distinct instances per call
        assert!(!Arc::ptr_eq(&first[0], &second[0]));
    }
}
