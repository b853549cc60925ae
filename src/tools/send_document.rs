//! Webhook document delivery tool
//!
//! Posts a delivery payload to the configured webhook and retries server
//! errors, timeouts and connection failures on the bounded backoff
//! schedule. Every outcome is reported back to the model as text; the
//! tool call itself never errs.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{error, info};

use super::retry::{run_with_retry, RetryPolicy, Sleeper, TokioSleeper};
use super::Tool;
use crate::config::WebhookSettings;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Stable tool delivering manuals and documents through a webhook
pub struct SendDocumentTool {
    client: reqwest::Client,
    webhook_url: String,
    secret: Option<String>,
    policy: RetryPolicy,
    sleeper: Arc<dyn Sleeper>,
}

#[derive(Debug, Deserialize)]
struct SendDocumentArgs {
    title: String,
    url: String,
    #[serde(default)]
    recipient: String,
}

#[derive(Debug, Serialize)]
struct DeliveryPayload<'a> {
    title: &'a str,
    url: &'a str,
    recipient: &'a str,
    timestamp: String,
}

#[derive(Debug, Error)]
enum DeliveryError {
    #[error("request timed out")]
    Timeout,
    #[error("received status {0}")]
    ServerError(u16),
    #[error("{0}")]
    Unreachable(String),
}

impl SendDocumentTool {
    pub fn new(settings: &WebhookSettings) -> Self {
        Self {
            client: reqwest::Client::builder()
                .timeout(REQUEST_TIMEOUT)
                .build()
                .unwrap_or_default(),
            webhook_url: settings.url.clone(),
            secret: settings.secret.clone(),
            policy: RetryPolicy::webhook_default(),
            sleeper: Arc::new(TokioSleeper),
        }
    }

    /// One delivery attempt; only statuses below 500 are accepted
    async fn attempt(&self, payload: &DeliveryPayload<'_>) -> Result<u16, DeliveryError> {
        let mut request = self.client.post(&self.webhook_url).json(payload);
        if let Some(secret) = &self.secret {
            request = request.header("Authorization", format!("Bearer {}", secret));
        }

        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                DeliveryError::Timeout
            } else {
                DeliveryError::Unreachable(e.to_string())
            }
        })?;

        let status = response.status().as_u16();
        if status >= 500 {
            Err(DeliveryError::ServerError(status))
        } else {
            Ok(status)
        }
    }

    /// Deliver a document, retrying transient failures; returns the outcome as text
    pub async fn send_document(&self, title: &str, url: &str, recipient: &str) -> String {
        let payload = DeliveryPayload {
            title,
            url,
            recipient,
            timestamp: chrono::Utc::now().to_rfc3339(),
        };

        let outcome = run_with_retry(&self.policy, self.sleeper.as_ref(), |_| true, |_| {
            self.attempt(&payload)
        })
        .await;

        let attempts = self.policy.max_attempts;
        match outcome {
            Ok(status) if (200..300).contains(&status) => {
                info!(title, recipient, "Document delivered");
                format!("Document '{}' has been sent successfully.", title)
            }
            Ok(status) => {
                error!(title, status, "Document delivery rejected");
                format!("Failed to send document '{}': received status {}.", title, status)
            }
            Err(DeliveryError::Timeout) => {
                error!(title, "Document delivery timed out");
                format!(
                    "Failed to send document '{}': the request timed out after {} attempts.",
                    title, attempts
                )
            }
            Err(DeliveryError::ServerError(status)) => {
                error!(title, status, "Document delivery failed");
                format!("Failed to send document '{}': received status {}.", title, status)
            }
            Err(DeliveryError::Unreachable(reason)) => {
                error!(title, %reason, "Delivery service unreachable");
                format!(
                    "Failed to send document '{}': could not reach the delivery service after {} attempts.",
                    title, attempts
                )
            }
        }
    }
}

#[async_trait]
impl Tool for SendDocumentTool {
    fn name(&self) -> &str {
        "send_document"
    }

    fn description(&self) -> &str {
        "Send a document (manual, datasheet, guide) to the customer through \
         the delivery service."
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "title": {
                    "type": "string",
                    "description": "Document title"
                },
                "url": {
                    "type": "string",
                    "description": "Location of the document"
                },
                "recipient": {
                    "type": "string",
                    "description": "Who should receive the document"
                }
            },
            "required": ["title", "url"]
        })
    }

    async fn call(&self, args: Value) -> anyhow::Result<String> {
        let args: SendDocumentArgs = serde_json::from_value(args)?;
        Ok(self
            .send_document(&args.title, &args.url, &args.recipient)
            .await)
    }
}
