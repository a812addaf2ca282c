// src/infra/config.rs — Configuration loading (TOML)

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::infra::errors::JieyouError;
use crate::infra::paths;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub provider: ProviderConfig,

    #[serde(default)]
    pub chat: ChatConfig,

    #[serde(default)]
    pub database: DatabaseConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub cors_origins: Vec<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".into(),
            port: 8080,
            cors_origins: Vec::new(),
        }
    }
}

/// Upstream OpenAI-compatible completion endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderConfig {
    pub id: String,
    pub base_url: String,
    pub model: String,
    /// Name of the environment variable holding the API key.
    pub api_key_env: String,
    pub max_tokens: u32,
    pub temperature: Option<f32>,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            id: "hunyuan".into(),
            base_url: "https://api.hunyuan.cloud.tencent.com/v1".into(),
            model: "hunyuan-turbos-latest".into(),
            api_key_env: "HUNYUAN_TOKEN".into(),
            max_tokens: 600,
            temperature: None,
        }
    }
}

impl ProviderConfig {
    /// Read the API key from the configured environment variable.
    pub fn api_key(&self) -> Result<String, JieyouError> {
        match std::env::var(&self.api_key_env) {
            Ok(key) if !key.trim().is_empty() => Ok(key),
            _ => Err(JieyouError::Config(format!(
                "environment variable {} is empty",
                self.api_key_env
            ))),
        }
    }
}

pub const DEFAULT_SYSTEM_PROMPT: &str = "You are an addiction-recovery counselor. \
Help the user understand their urges, suggest concrete coping strategies, and \
encourage them step by step to break the habit. Be warm, direct and practical.";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ChatConfig {
    pub system_prompt: String,
    /// Number of prior turns sent upstream as context.
    pub history_window: u32,
    pub max_chats_per_day: u32,
    pub max_message_chars: usize,
    pub blocked_terms: Vec<String>,
    pub poll_interval_ms: u64,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            system_prompt: DEFAULT_SYSTEM_PROMPT.into(),
            history_window: 10,
            max_chats_per_day: 10,
            max_message_chars: 500,
            blocked_terms: vec!["openai".into(), "system".into()],
            poll_interval_ms: 50,
        }
    }
}

impl ChatConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(1))
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default)]
    pub path: Option<String>,
}

impl DatabaseConfig {
    pub fn resolved_path(&self) -> PathBuf {
        self.path
            .as_ref()
            .map(PathBuf::from)
            .unwrap_or_else(paths::db_path)
    }
}

impl Config {
    /// Load config from file, falling back to defaults.
    pub fn load() -> anyhow::Result<Self> {
        let path = paths::config_file_path();
        if path.exists() {
            Self::load_from(&path)
        } else {
            Ok(Self::default())
        }
    }

    pub fn load_from(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults_reasonable() {
        let c = Config::default();
        assert_eq!(c.server.port, 8080);
        assert_eq!(c.provider.model, "hunyuan-turbos-latest");
        assert_eq!(c.provider.max_tokens, 600);
        assert_eq!(c.chat.history_window, 10);
        assert_eq!(c.chat.max_chats_per_day, 10);
        assert_eq!(c.chat.max_message_chars, 500);
        assert_eq!(c.chat.poll_interval(), Duration::from_millis(50));
        assert!(c.database.path.is_none());
    }

    #[test]
    fn test_parse_minimal_toml() {
        let config: Config = toml::from_str("").unwrap();
        assert_eq!(config.chat.history_window, 10);
        assert_eq!(config.provider.api_key_env, "HUNYUAN_TOKEN");
    }

    #[test]
    fn test_partial_sections_keep_defaults() {
        let toml_str = r#"
[server]
port = 9090

[provider]
model = "hunyuan-lite"

[chat]
max_chats_per_day = 5
"#;
        let c: Config = toml::from_str(toml_str).unwrap();
        assert_eq!(c.server.port, 9090);
        assert_eq!(c.server.host, "127.0.0.1");
        assert_eq!(c.provider.model, "hunyuan-lite");
        assert_eq!(c.provider.api_key_env, "HUNYUAN_TOKEN");
        assert_eq!(c.chat.max_chats_per_day, 5);
        assert_eq!(c.chat.system_prompt, DEFAULT_SYSTEM_PROMPT);
        assert_eq!(c.chat.poll_interval_ms, 50);
    }

    #[test]
    fn test_parse_full_toml() {
        let toml_str = r#"
[server]
host = "0.0.0.0"
port = 9000
cors_origins = ["http://localhost:5173"]

[provider]
id = "deepseek"
base_url = "https://api.deepseek.com/v1"
model = "deepseek-chat"
api_key_env = "DEEPSEEK_API_KEY"
max_tokens = 1024
temperature = 0.3

[chat]
system_prompt = "Be brief."
history_window = 4
max_chats_per_day = 3
max_message_chars = 120
blocked_terms = ["jailbreak"]
poll_interval_ms = 20

[database]
path = "/tmp/jieyou-test.db"
"#;
        let config: Config = toml::from_str(toml_str).unwrap();
        assert_eq!(config.server.host, "0.0.0.0");
        assert_eq!(config.server.cors_origins.len(), 1);
        assert_eq!(config.provider.id, "deepseek");
        assert_eq!(config.provider.temperature, Some(0.3));
        assert_eq!(config.chat.history_window, 4);
        assert_eq!(config.chat.blocked_terms, vec!["jailbreak".to_string()]);
        assert_eq!(config.chat.poll_interval(), Duration::from_millis(20));
        assert_eq!(
            config.database.resolved_path(),
            PathBuf::from("/tmp/jieyou-test.db")
        );
    }

    #[test]
    fn test_zero_poll_interval_is_clamped() {
        let chat = ChatConfig {
            poll_interval_ms: 0,
            ..ChatConfig::default()
        };
        assert_eq!(chat.poll_interval(), Duration::from_millis(1));
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[server]\nhost = \"127.0.0.1\"\nport = 3001").unwrap();
        let config = Config::load_from(file.path()).unwrap();
        assert_eq!(config.server.port, 3001);
        assert_eq!(config.chat.max_chats_per_day, 10);
    }

    #[test]
    fn test_load_nonexistent_file() {
        let result = Config::load_from(Path::new("/nonexistent/config.toml"));
        assert!(result.is_err());
    }

    #[test]
    fn test_missing_api_key() {
        let provider = ProviderConfig {
            api_key_env: "JIEYOU_TEST_KEY_THAT_IS_NEVER_SET".into(),
            ..ProviderConfig::default()
        };
        assert!(matches!(provider.api_key(), Err(JieyouError::Config(_))));
    }

    #[test]
    fn test_serialize_roundtrip() {
        let config = Config::default();
        let serialized = toml::to_string(&config).unwrap();
        let deserialized: Config = toml::from_str(&serialized).unwrap();
        assert_eq!(deserialized.server.port, config.server.port);
        assert_eq!(deserialized.chat.blocked_terms, config.chat.blocked_terms);
    }
}
