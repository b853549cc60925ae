//! Web search tool backed by the DuckDuckGo instant answer API

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use std::time::Duration;
use tracing::debug;

use super::Tool;
use crate::config::SearchSettings;

/// Stable tool answering general product and troubleshooting questions
pub struct WebSearchTool {
    client: reqwest::Client,
    max_results: usize,
}

#[derive(Debug, Deserialize)]
struct SearchArgs {
    query: String,
}

#[derive(Debug, Deserialize)]
struct InstantAnswer {
    #[serde(rename = "AbstractText", default)]
    abstract_text: String,
    #[serde(rename = "AbstractURL", default)]
    abstract_url: String,
    #[serde(rename = "RelatedTopics", default)]
    related_topics: Vec<RelatedTopic>,
}

/// Related topics arrive either as plain results or as named groups
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RelatedTopic {
    Result {
        #[serde(rename = "Text")]
        text: String,
        #[serde(rename = "FirstURL", default)]
        first_url: String,
    },
    Group {
        #[serde(rename = "Topics", default)]
        topics: Vec<RelatedTopic>,
    },
}

impl WebSearchTool {
    pub fn new(settings: &SearchSettings) -> Self {
        Self {
            client: reqwest::Client::builder()
                .timeout(Duration::from_secs(settings.timeout_seconds))
                .build()
                .unwrap_or_default(),
            max_results: settings.max_results,
        }
    }

    async fn search(&self, query: &str) -> anyhow::Result<String> {
        debug!(query, "Running web search");

        let answer: InstantAnswer = self
            .client
            .get("https://api.duckduckgo.com/")
            .query(&[("q", query), ("format", "json"), ("no_html", "1")])
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        let mut lines = Vec::new();
        if !answer.abstract_text.is_empty() {
            if answer.abstract_url.is_empty() {
                lines.push(answer.abstract_text.clone());
            } else {
                lines.push(format!("{} ({})", answer.abstract_text, answer.abstract_url));
            }
        }
        collect_topics(&answer.related_topics, &mut lines, self.max_results);
        lines.truncate(self.max_results);

        if lines.is_empty() {
            Ok(format!("No results found for '{}'.", query))
        } else {
            Ok(lines.join("\n"))
        }
    }
}

fn collect_topics(topics: &[RelatedTopic], lines: &mut Vec<String>, limit: usize) {
    for topic in topics {
        if lines.len() >= limit {
            return;
        }
        match topic {
            RelatedTopic::Result { text, first_url } => {
                if text.is_empty() {
                    continue;
                }
                if first_url.is_empty() {
                    lines.push(text.clone());
                } else {
                    lines.push(format!("{} ({})", text, first_url));
                }
            }
            RelatedTopic::Group { topics } => collect_topics(topics, lines, limit),
        }
    }
}

#[async_trait]
impl Tool for WebSearchTool {
    fn name(&self) -> &str {
        "web_search"
    }

    fn description(&self) -> &str {
        "Search the web for current information. Use for product details, \
         compatibility questions and anything not found in the database."
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "query": {
                    "type": "string",
                    "description": "The search query"
                }
            },
            "required": ["query"]
        })
    }

    async fn call(&self, args: Value) -> anyhow::Result<String> {
        let args: SearchArgs = serde_json::from_value(args)?;
        self.search(&args.query).await
    }
}
