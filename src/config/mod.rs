//! Application settings
//!
//! Loaded from an optional TOML file, overridable through `SHOPTALK_*`
//! environment variables and CLI flags.

use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::cli::Cli;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub server: ServerSettings,
    #[serde(default)]
    pub database: DatabaseSettings,
    #[serde(default)]
    pub llm: LlmSettings,
    #[serde(default)]
    pub search: SearchSettings,
    #[serde(default)]
    pub logging: LoggingSettings,
    /// Document delivery webhook; the tool is offered only when set
    #[serde(default)]
    pub webhook: Option<WebhookSettings>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerSettings {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseSettings {
    #[serde(default = "default_db_host")]
    pub host: String,
    #[serde(default = "default_db_port")]
    pub port: u16,
    #[serde(default = "default_db_user")]
    pub user: String,
    #[serde(default)]
    pub password: String,
    #[serde(default = "default_db_name")]
    pub name: String,
}

impl Default for DatabaseSettings {
    fn default() -> Self {
        Self {
            host: default_db_host(),
            port: default_db_port(),
            user: default_db_user(),
            password: String::new(),
            name: default_db_name(),
        }
    }
}

impl DatabaseSettings {
    /// Connection URL for the pool
    pub fn url(&self) -> String {
        format!(
            "mysql://{}:{}@{}:{}/{}",
            self.user, self.password, self.host, self.port, self.name
        )
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmSettings {
    #[serde(default = "default_model")]
    pub model: String,
    /// Model used by the diagnostics agent; falls back to `model`
    #[serde(default)]
    pub diagnostics_model: Option<String>,
    /// Base URL of an OpenAI-compatible API
    #[serde(default)]
    pub base_url: Option<String>,
    /// Environment variable holding the API key (default OPENAI_API_KEY)
    #[serde(default)]
    pub api_key_env: Option<String>,
    #[serde(default)]
    pub temperature: Option<f64>,
    #[serde(default)]
    pub max_tokens: Option<u32>,
}

impl Default for LlmSettings {
    fn default() -> Self {
        Self {
            model: default_model(),
            diagnostics_model: None,
            base_url: None,
            api_key_env: None,
            temperature: None,
            max_tokens: None,
        }
    }
}

impl LlmSettings {
    pub fn diagnostics_model(&self) -> &str {
        self.diagnostics_model.as_deref().unwrap_or(&self.model)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchSettings {
    #[serde(default = "default_search_timeout")]
    pub timeout_seconds: u64,
    #[serde(default = "default_search_results")]
    pub max_results: usize,
}

impl Default for SearchSettings {
    fn default() -> Self {
        Self {
            timeout_seconds: default_search_timeout(),
            max_results: default_search_results(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookSettings {
    /// Delivery endpoint
    pub url: String,
    /// Bearer token sent when set
    #[serde(default)]
    pub secret: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingSettings {
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    8000
}

fn default_db_host() -> String {
    "localhost".to_string()
}

fn default_db_port() -> u16 {
    3306
}

fn default_db_user() -> String {
    "shoptalk".to_string()
}

fn default_db_name() -> String {
    "marketplace".to_string()
}

fn default_model() -> String {
    "gpt-4o-mini".to_string()
}

fn default_search_timeout() -> u64 {
    20
}

fn default_search_results() -> usize {
    10
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Settings {
    /// Load settings from a config file path (missing file uses defaults)
    pub fn from_path(path: &Path) -> anyhow::Result<Self> {
        let settings = Config::builder()
            .add_source(File::from(path).required(false))
            .add_source(Environment::with_prefix("SHOPTALK").separator("__"))
            .build()?
            .try_deserialize()?;
        Ok(settings)
    }

    /// Load settings and apply CLI overrides
    pub fn new_with_cli(cli: &Cli) -> anyhow::Result<Self> {
        let mut settings = Self::from_path(&cli.config)?;
        settings.apply_cli_overrides(cli);
        Ok(settings)
    }

    fn apply_cli_overrides(&mut self, cli: &Cli) {
        if let Some(host) = &cli.host {
            self.server.host = host.clone();
        }
        if let Some(port) = cli.port {
            self.server.port = port;
        }
        if let Some(level) = &cli.log_level {
            self.logging.level = level.clone();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[test]
    fn test_defaults_when_file_missing() {
        let settings = Settings::from_path(Path::new("does-not-exist.toml")).unwrap();
        assert_eq!(settings.server.host, "127.0.0.1");
        assert_eq!(settings.server.port, 8000);
        assert_eq!(settings.llm.model, "gpt-4o-mini");
        assert!(settings.webhook.is_none());
        assert_eq!(settings.search.max_results, 10);
    }

    #[test]
    fn test_database_url() {
        let db = DatabaseSettings {
            host: "db.internal".to_string(),
            port: 3307,
            user: "app".to_string(),
            password: "pw".to_string(),
            name: "shop".to_string(),
        };
        assert_eq!(db.url(), "mysql://app:pw@db.internal:3307/shop");
    }

    #[test]
    fn test_diagnostics_model_fallback() {
        let mut llm = LlmSettings::default();
        assert_eq!(llm.diagnostics_model(), "gpt-4o-mini");
        llm.diagnostics_model = Some("gpt-4o".to_string());
        assert_eq!(llm.diagnostics_model(), "gpt-4o");
    }

    #[test]
    fn test_cli_overrides() {
        let cli = Cli::parse_from([
            "shoptalk",
            "--host",
            "0.0.0.0",
            "--port",
            "9000",
            "--log-level",
            "debug",
        ]);
        let settings = Settings::new_with_cli(&cli).unwrap();
        assert_eq!(settings.server.host, "0.0.0.0");
        assert_eq!(settings.server.port, 9000);
        assert_eq!(settings.logging.level, "debug");
    }
}
