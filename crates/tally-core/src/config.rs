use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::{Result, TallyError};

/// Top-level configuration for the Tally application.
///
/// Loaded from `~/.tally/config.toml` by default. Each section corresponds
/// to a bounded context or cross-cutting concern.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TallyConfig {
    #[serde(default)]
    pub general: GeneralConfig,
    #[serde(default)]
    pub provider: ProviderConfig,
    #[serde(default)]
    pub chat: ChatConfig,
}

impl TallyConfig {
    /// Load configuration from a TOML file.
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: TallyConfig = toml::from_str(&content)?;
        info!("Configuration loaded from {}", path.display());
        Ok(config)
    }

    /// Load configuration from a TOML file, falling back to defaults if the
    /// file does not exist or cannot be parsed.
    pub fn load_or_default(path: &Path) -> Self {
        match Self::load(path) {
            Ok(config) => config,
            Err(e) => {
                warn!(
                    "Failed to load config from {}: {}. Using defaults.",
                    path.display(),
                    e
                );
                Self::default()
            }
        }
    }

    /// Save the current configuration to a TOML file.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content =
            toml::to_string_pretty(self).map_err(|e| TallyError::Config(e.to_string()))?;
        std::fs::write(path, content)?;
        info!("Configuration saved to {}", path.display());
        Ok(())
    }
}

/// General application settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Data directory for the SQLite database.
    pub data_dir: String,
    /// Log level: trace, debug, info, warn, error.
    pub log_level: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            data_dir: "~/.tally/data".to_string(),
            log_level: "info".to_string(),
        }
    }
}

/// Language-model provider settings.
///
/// The client is constructed from this section at startup and passed into
/// the orchestrator explicitly; nothing reads provider state ambiently.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderConfig {
    /// Base URL of an OpenAI-compatible endpoint, e.g. `https://api.openai.com/v1`.
    pub base_url: String,
    /// Model name sent with every completion request.
    pub model: String,
    /// Bearer token. Usually left unset in the file and injected from the
    /// environment by the binary.
    pub api_key: Option<String>,
    /// Sampling temperature.
    pub temperature: f32,
    /// HTTP request timeout in milliseconds.
    pub request_timeout_ms: u64,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.openai.com/v1".to_string(),
            model: "gpt-3.5-turbo".to_string(),
            api_key: None,
            temperature: 0.7,
            request_timeout_ms: 30_000,
        }
    }
}

/// Conversation settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ChatConfig {
    /// Prior messages carried into each turn's conversation buffer.
    pub history_limit: u64,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self { history_limit: 10 }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = TallyConfig::default();
        assert_eq!(config.general.data_dir, "~/.tally/data");
        assert_eq!(config.general.log_level, "info");
        assert_eq!(config.provider.model, "gpt-3.5-turbo");
        assert!(config.provider.api_key.is_none());
        assert_eq!(config.chat.history_limit, 10);
    }

    #[test]
    fn test_partial_toml_fills_defaults() {
        let toml_str = r#"
            [provider]
            model = "gpt-4o-mini"
            base_url = "http://localhost:8000/v1"
        "#;
        let config: TallyConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.provider.model, "gpt-4o-mini");
        assert_eq!(config.provider.base_url, "http://localhost:8000/v1");
        // Untouched sections keep their defaults.
        assert_eq!(config.provider.temperature, 0.7);
        assert_eq!(config.chat.history_limit, 10);
        assert_eq!(config.general.log_level, "info");
    }

    #[test]
    fn test_save_and_load_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");

        let mut config = TallyConfig::default();
        config.provider.model = "gpt-4o".to_string();
        config.chat.history_limit = 25;
        config.save(&path).unwrap();

        let loaded = TallyConfig::load(&path).unwrap();
        assert_eq!(loaded.provider.model, "gpt-4o");
        assert_eq!(loaded.chat.history_limit, 25);
    }

    #[test]
    fn test_load_missing_file_errors() {
        let result = TallyConfig::load(Path::new("/nonexistent/tally/config.toml"));
        assert!(result.is_err());
    }

    #[test]
    fn test_load_or_default_on_missing_file() {
        let config = TallyConfig::load_or_default(Path::new("/nonexistent/tally/config.toml"));
        assert_eq!(config.provider.model, "gpt-3.5-turbo");
    }

    #[test]
    fn test_load_or_default_on_malformed_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "not [ valid toml").unwrap();

        let config = TallyConfig::load_or_default(&path);
        assert_eq!(config.general.data_dir, "~/.tally/data");
    }
}
