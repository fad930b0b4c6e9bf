use std::collections::HashMap;
use std::path::Path;

use serde::Deserialize;

use crate::error::GatewayError;
use crate::ollama::Dialect;

/// Operator configuration for the inference backend (`config.json`).
///
/// Read per request so that a broken or missing file surfaces as a
/// `ConfigError` on the endpoints that need it, and so tests can point
/// the state at a fixture file.
#[derive(Debug, Clone, Deserialize)]
pub struct GatewayConfig {
    pub ollama_url: String,
    pub ollama_model: String,
    pub extract_info_prompt: String,
    pub face_similarity_prompt: String,
    #[serde(default)]
    pub dialect: Dialect,
    /// Overrides the dialect's default request timeout.
    #[serde(default)]
    pub timeout_secs: Option<u64>,
    /// System role content for the chat dialect.
    #[serde(default)]
    pub system_prompt: Option<String>,
    /// Bearer token for hosted chat-completion deployments.
    #[serde(default)]
    pub api_key: Option<String>,
}

impl GatewayConfig {
    pub async fn load(path: &Path) -> Result<Self, GatewayError> {
        let raw = tokio::fs::read_to_string(path).await.map_err(|e| {
            GatewayError::Config {
                details: format!("cannot read {}: {e}", path.display()),
            }
        })?;
        serde_json::from_str(&raw).map_err(|e| GatewayError::Config {
            details: format!("malformed {}: {e}", path.display()),
        })
    }
}

fn default_language() -> String {
    ErrorConfig::DEFAULT_LANGUAGE.to_string()
}

fn default_log_errors() -> bool {
    true
}

fn default_log_file_path() -> String {
    "logs/app.log".to_string()
}

fn default_log_level() -> String {
    "INFO".to_string()
}

/// Where error log lines go.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogDestination {
    #[default]
    Console,
    File,
    Both,
}

/// Error reporting configuration (`error_config.json`): message locale,
/// logging sink, and whether failure details leak into responses.
/// Loaded once at startup.
#[derive(Debug, Clone, Deserialize)]
pub struct ErrorConfig {
    #[serde(default = "default_language")]
    pub language: String,
    #[serde(default = "default_log_errors")]
    pub log_errors: bool,
    #[serde(default)]
    pub log_destination: LogDestination,
    #[serde(default = "default_log_file_path")]
    pub log_file_path: String,
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default)]
    pub show_trace: bool,
    /// Error code -> locale -> message text.
    #[serde(default)]
    pub messages: HashMap<String, HashMap<String, String>>,
}

impl ErrorConfig {
    pub const DEFAULT_LANGUAGE: &'static str = "fr";

    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&raw)?)
    }
}

impl Default for ErrorConfig {
    fn default() -> Self {
        Self {
            language: default_language(),
            log_errors: default_log_errors(),
            log_destination: LogDestination::default(),
            log_file_path: default_log_file_path(),
            log_level: default_log_level(),
            show_trace: false,
            messages: HashMap::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn write_temp(name: &str, contents: &str) -> PathBuf {
        let path = std::env::temp_dir().join(format!("{}-{}", uuid::Uuid::new_v4(), name));
        std::fs::write(&path, contents).unwrap();
        path
    }

    #[tokio::test]
    async fn loads_gateway_config() {
        let path = write_temp(
            "config.json",
            r#"{
                "ollama_url": "http://localhost:11434",
                "ollama_model": "llava:13b",
                "extract_info_prompt": "extract fields as JSON",
                "face_similarity_prompt": "compare the two faces"
            }"#,
        );
        let config = GatewayConfig::load(&path).await.unwrap();
        assert_eq!(config.ollama_url, "http://localhost:11434");
        assert_eq!(config.ollama_model, "llava:13b");
        assert_eq!(config.dialect, Dialect::Generate);
        assert!(config.timeout_secs.is_none());
        std::fs::remove_file(path).ok();
    }

    #[tokio::test]
    async fn missing_config_is_config_error() {
        let path = std::env::temp_dir().join("does-not-exist-config.json");
        let err = GatewayConfig::load(&path).await.unwrap_err();
        assert_eq!(err.code(), "ConfigError");
    }

    #[tokio::test]
    async fn malformed_config_is_config_error() {
        let path = write_temp("config.json", "{not json");
        let err = GatewayConfig::load(&path).await.unwrap_err();
        assert_eq!(err.code(), "ConfigError");
        std::fs::remove_file(path).ok();
    }

    #[tokio::test]
    async fn chat_dialect_and_timeout_parse() {
        let path = write_temp(
            "config.json",
            r#"{
                "ollama_url": "http://localhost:8080",
                "ollama_model": "gpt-4o-mini",
                "extract_info_prompt": "p1",
                "face_similarity_prompt": "p2",
                "dialect": "chat",
                "timeout_secs": 90,
                "system_prompt": "Tu es un assistant OCR.",
                "api_key": "sk-test"
            }"#,
        );
        let config = GatewayConfig::load(&path).await.unwrap();
        assert_eq!(config.dialect, Dialect::Chat);
        assert_eq!(config.timeout_secs, Some(90));
        assert_eq!(config.system_prompt.as_deref(), Some("Tu es un assistant OCR."));
        assert_eq!(config.api_key.as_deref(), Some("sk-test"));
        std::fs::remove_file(path).ok();
    }

    #[test]
    fn error_config_defaults_fill_in() {
        let config: ErrorConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config.language, "fr");
        assert!(config.log_errors);
        assert_eq!(config.log_destination, LogDestination::Console);
        assert_eq!(config.log_level, "INFO");
        assert!(!config.show_trace);
        assert!(config.messages.is_empty());
    }

    #[test]
    fn error_config_parses_messages_table() {
        let config: ErrorConfig = serde_json::from_str(
            r#"{
                "language": "en",
                "log_destination": "both",
                "show_trace": true,
                "messages": {
                    "OllamaError": {"en": "model backend failed", "fr": "échec du backend"}
                }
            }"#,
        )
        .unwrap();
        assert_eq!(config.language, "en");
        assert_eq!(config.log_destination, LogDestination::Both);
        assert_eq!(
            config.messages["OllamaError"]["fr"],
            "échec du backend"
        );
    }
}
