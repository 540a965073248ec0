//! Static configuration
//!
//! Loaded once at startup: built-in defaults, then an optional JSON file,
//! then environment overrides (`.env` is honoured through `dotenv`).

use crate::aggregator::GroupingPolicy;
use crate::embedding::DEFAULT_DIMENSION;
use crate::error::LedgerChatError;
use crate::prompts::{CONTEXT_PLACEHOLDER, DEFAULT_SYSTEM_PROMPT};
use crate::Result;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::{debug, info};

pub const CONFIG_PATH_ENV: &str = "LEDGER_CHAT_CONFIG";
pub const DEFAULT_CONFIG_PATH: &str = "config.json";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ModelConfig {
    pub name: String,
    pub temperature: f32,
    pub max_tokens: u32,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            name: "gemini-2.0-flash".to_string(),
            temperature: 0.0,
            max_tokens: 1024,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LedgerConfig {
    pub base_url: String,
    pub token_url: String,
    pub client_id: Option<String>,
    #[serde(skip_serializing)]
    pub client_secret: Option<String>,
    pub page_size: usize,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            base_url: "https://secure.splitwise.com/api/v3.0".to_string(),
            token_url: "https://secure.splitwise.com/oauth/token".to_string(),
            client_id: None,
            client_secret: None,
            page_size: 100,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RetrievalConfig {
    pub grouping: GroupingPolicy,
    pub embedding_dimension: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            grouping: GroupingPolicy::default(),
            embedding_dimension: DEFAULT_DIMENSION,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AppConfig {
    pub model: ModelConfig,
    pub ledger: LedgerConfig,
    pub retrieval: RetrievalConfig,
    /// Answer-generation system prompt; `{context}` receives retrieved records.
    pub system_prompt: String,
    #[serde(skip_serializing)]
    pub gemini_api_key: String,
    pub api_port: u16,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            model: ModelConfig::default(),
            ledger: LedgerConfig::default(),
            retrieval: RetrievalConfig::default(),
            system_prompt: DEFAULT_SYSTEM_PROMPT.to_string(),
            gemini_api_key: String::new(),
            api_port: 8080,
        }
    }
}

impl AppConfig {
    /// Defaults, then `LEDGER_CHAT_CONFIG` (or `./config.json` if present),
    /// then environment variables.
    pub fn load() -> Result<Self> {
        dotenv::dotenv().ok();

        let mut config = match std::env::var(CONFIG_PATH_ENV) {
            Ok(path) => Self::from_file(&path)?,
            Err(_) if Path::new(DEFAULT_CONFIG_PATH).exists() => Self::from_file(DEFAULT_CONFIG_PATH)?,
            Err(_) => Self::default(),
        };

        config.apply_env(|key| std::env::var(key).ok())?;
        config.validate()?;

        info!(
            model = %config.model.name,
            grouping = ?config.retrieval.grouping,
            "Configuration loaded"
        );
        Ok(config)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        debug!(path = %path.display(), "Reading configuration file");
        let raw = std::fs::read_to_string(path)?;
        Self::from_json(&raw)
    }

    pub fn from_json(raw: &str) -> Result<Self> {
        serde_json::from_str(raw)
            .map_err(|e| LedgerChatError::ConfigError(format!("Invalid configuration: {}", e)))
    }

    /// Apply environment overrides through `lookup`.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(key) = lookup("GEMINI_API_KEY") {
            self.gemini_api_key = key;
        }
        if let Some(id) = lookup("SPLITWISE_CLIENT_ID") {
            self.ledger.client_id = Some(id);
        }
        if let Some(secret) = lookup("SPLITWISE_CLIENT_SECRET") {
            self.ledger.client_secret = Some(secret);
        }
        if let Some(url) = lookup("LEDGER_BASE_URL") {
            self.ledger.base_url = url;
        }
        if let Some(url) = lookup("LEDGER_TOKEN_URL") {
            self.ledger.token_url = url;
        }
        if let Some(port) = lookup("PORT").or_else(|| lookup("API_PORT")) {
            self.api_port = port
                .trim()
                .parse()
                .map_err(|_| LedgerChatError::ConfigError(format!("Invalid port: {}", port)))?;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if !self.system_prompt.contains(CONTEXT_PLACEHOLDER) {
            return Err(LedgerChatError::ConfigError(format!(
                "system_prompt must contain {}",
                CONTEXT_PLACEHOLDER
            )));
        }
        if self.model.max_tokens == 0 {
            return Err(LedgerChatError::ConfigError(
                "model.max_tokens must be positive".to_string(),
            ));
        }
        if self.ledger.page_size == 0 {
            return Err(LedgerChatError::ConfigError(
                "ledger.page_size must be positive".to_string(),
            ));
        }
        if self.retrieval.embedding_dimension == 0 {
            return Err(LedgerChatError::ConfigError(
                "retrieval.embedding_dimension must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_defaults_are_valid() {
        let config = AppConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.retrieval.grouping, GroupingPolicy::CalendarMonth);
        assert_eq!(config.ledger.page_size, 100);
    }

    #[test]
    fn test_partial_json_keeps_defaults() {
        let config = AppConfig::from_json(
            r#"{"model": {"name": "gemini-1.5-pro", "temperature": 0, "max_tokens": 100}}"#,
        )
        .unwrap();

        assert_eq!(config.model.name, "gemini-1.5-pro");
        assert_eq!(config.model.max_tokens, 100);
        assert_eq!(config.ledger, LedgerConfig::default());
        assert!(config.system_prompt.contains("{context}"));
    }

    #[test]
    fn test_grouping_policy_from_json() {
        let config = AppConfig::from_json(r#"{"retrieval": {"grouping": "month_name"}}"#).unwrap();
        assert_eq!(config.retrieval.grouping, GroupingPolicy::MonthName);
    }

    #[test]
    fn test_env_overrides() {
        let env: HashMap<&str, &str> = [
            ("GEMINI_API_KEY", "g-key"),
            ("SPLITWISE_CLIENT_ID", "id"),
            ("SPLITWISE_CLIENT_SECRET", "secret"),
            ("LEDGER_BASE_URL", "http://localhost:9000"),
            ("API_PORT", "3000"),
        ]
        .into_iter()
        .collect();

        let mut config = AppConfig::default();
        config
            .apply_env(|k| env.get(k).map(|v| v.to_string()))
            .unwrap();

        assert_eq!(config.gemini_api_key, "g-key");
        assert_eq!(config.ledger.client_id.as_deref(), Some("id"));
        assert_eq!(config.ledger.client_secret.as_deref(), Some("secret"));
        assert_eq!(config.ledger.base_url, "http://localhost:9000");
        assert_eq!(config.api_port, 3000);
    }

    #[test]
    fn test_bad_port_is_config_error() {
        let mut config = AppConfig::default();
        let err = config
            .apply_env(|k| (k == "PORT").then(|| "eighty".to_string()))
            .unwrap_err();
        assert!(matches!(err, LedgerChatError::ConfigError(_)));
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut config = AppConfig::default();
        config.system_prompt = "Answer the question.".into();
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.model.max_tokens = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_secrets_are_not_serialized() {
        let mut config = AppConfig::default();
        config.gemini_api_key = "g-key".into();
        config.ledger.client_secret = Some("secret".into());

        let json = serde_json::to_string(&config).unwrap();
        assert!(!json.contains("g-key"));
        assert!(!json.contains("secret"));
    }
}
