//! Gateway configuration
//!
//! Configuration is loaded from YAML (or JSON, which is a YAML subset), then
//! environment overrides are applied:
//!
//! - `ACCESS_API_KEYS`: the accepted caller keys, either a JSON object (keys are
//!   used), a JSON array, or a comma separated list
//! - `<PROVIDER>_API_KEY`: replaces the `api_key` of provider `<provider>`
//!
//! A `.env` file in the working directory is honoured via `dotenvy`.
//!
//! ```yaml
//! default_provider: closeai
//! access_keys: [sk-local-1]
//! providers:
//!   openai:
//!     base_url: https://api.openai.com/v1/chat/completions
//!     adapter: openai
//!     models:
//!       gpt-4o-mini:
//! ```

mod provider;
mod store;

pub use provider::{ModelConfig, ParamConfig, ProviderConfig};
pub use store::{ConfigSnapshot, ConfigStore, StaticConfigStore};

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use secrecy::SecretString;
use serde::Deserialize;
use validator::Validate;

use crate::error::LlmError;

pub const DEFAULT_PROVIDER: &str = "closeai";
pub const ACCESS_KEYS_ENV: &str = "ACCESS_API_KEYS";

/// Root configuration document.
#[derive(Debug, Deserialize, Validate)]
pub struct GatewayConfig {
    #[serde(default = "default_provider")]
    pub default_provider: String,
    #[serde(default)]
    pub access_keys: Vec<String>,
    #[serde(default)]
    pub providers: BTreeMap<String, ProviderConfig>,
    #[serde(default)]
    pub proxy: ProxyConfig,
    #[serde(default)]
    #[validate(nested)]
    pub timeouts: TimeoutConfig,
    #[serde(default)]
    #[validate(nested)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub server: ServerConfig,
}

fn default_provider() -> String {
    DEFAULT_PROVIDER.to_string()
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            default_provider: default_provider(),
            access_keys: Vec::new(),
            providers: BTreeMap::new(),
            proxy: ProxyConfig::default(),
            timeouts: TimeoutConfig::default(),
            cache: CacheConfig::default(),
            logging: LoggingConfig::default(),
            server: ServerConfig::default(),
        }
    }
}

impl GatewayConfig {
    /// Parse a YAML (or JSON) document. No env overrides are applied.
    pub fn from_yaml_str(text: &str) -> Result<Self, LlmError> {
        let config: Self = serde_yaml::from_str(text)?;
        config.ensure_valid()?;
        Ok(config)
    }

    /// Load `.env`, read the file at `path`, then apply env overrides.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, LlmError> {
        if let Err(e) = dotenvy::dotenv() {
            tracing::debug!(error = %e, "no .env file loaded");
        }
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| {
            LlmError::ConfigurationError(format!(
                "Failed to read config file {}: {e}",
                path.display()
            ))
        })?;
        let mut config = Self::from_yaml_str(&text)?;
        config.apply_env_overrides(|name| std::env::var(name).ok());
        config.ensure_valid()?;
        tracing::info!(
            path = %path.display(),
            providers = config.providers.len(),
            access_keys = config.access_keys.len(),
            "configuration loaded"
        );
        Ok(config)
    }

    /// Apply `ACCESS_API_KEYS` and `<PROVIDER>_API_KEY` overrides.
    ///
    /// `lookup` abstracts the environment so tests stay hermetic.
    pub fn apply_env_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(raw) = lookup(ACCESS_KEYS_ENV).filter(|v| !v.trim().is_empty()) {
            self.access_keys = parse_access_keys(&raw);
        }
        for (name, provider) in self.providers.iter_mut() {
            let env_key = format!("{}_API_KEY", name.to_uppercase());
            if let Some(key) = lookup(&env_key).filter(|v| !v.is_empty()) {
                tracing::debug!(provider = %name, env = %env_key, "provider key overridden from environment");
                provider.api_key = SecretString::from(key);
            }
        }
    }

    /// Structural validation of every section.
    pub fn ensure_valid(&self) -> Result<(), LlmError> {
        self.validate()?;
        for (name, provider) in &self.providers {
            provider.validate().map_err(|e| {
                LlmError::ConfigurationError(format!("provider '{name}': {e}"))
            })?;
        }
        Ok(())
    }
}

/// Accepts a JSON object (its keys), a JSON array of strings, or a comma list.
pub fn parse_access_keys(raw: &str) -> Vec<String> {
    match serde_json::from_str::<serde_json::Value>(raw) {
        Ok(serde_json::Value::Object(map)) => map.keys().cloned().collect(),
        Ok(serde_json::Value::Array(items)) => items
            .iter()
            .filter_map(|v| v.as_str().map(str::to_string))
            .collect(),
        _ => raw
            .split(',')
            .map(str::trim)
            .filter(|k| !k.is_empty())
            .map(str::to_string)
            .collect(),
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ProxyConfig {
    pub http: Option<String>,
    pub https: Option<String>,
}

impl ProxyConfig {
    /// `https` wins, `http` is the fallback.
    pub fn preferred(&self) -> Option<&str> {
        self.https.as_deref().or(self.http.as_deref())
    }
}

/// Outbound timeouts in seconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Validate)]
#[serde(default)]
pub struct TimeoutConfig {
    #[validate(range(min = 1))]
    pub total_secs: u64,
    #[validate(range(min = 1))]
    pub connect_secs: u64,
    #[validate(range(min = 1))]
    pub read_secs: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            total_secs: 600,
            connect_secs: 30,
            read_secs: 180,
        }
    }
}

impl TimeoutConfig {
    pub fn total(&self) -> Duration {
        Duration::from_secs(self.total_secs)
    }

    pub fn connect(&self) -> Duration {
        Duration::from_secs(self.connect_secs)
    }

    pub fn read(&self) -> Duration {
        Duration::from_secs(self.read_secs)
    }
}

/// Adapter cache tuning.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Validate)]
#[serde(default)]
pub struct CacheConfig {
    /// Idle time after which an adapter is evicted
    #[validate(range(min = 1))]
    pub ttl_secs: u64,
    #[validate(range(min = 1))]
    pub reap_interval_secs: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl_secs: 30 * 60,
            reap_interval_secs: 5 * 60,
        }
    }
}

impl CacheConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }

    pub fn reap_interval(&self) -> Duration {
        Duration::from_secs(self.reap_interval_secs)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// `EnvFilter` directive, e.g. `info` or `llm_bridge=debug`
    pub level: String,
    pub format: LogFormat,
    /// Daily rolling log file; stdout only when unset
    pub file: Option<PathBuf>,
    /// Attach message bodies to request events
    pub log_messages: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Text,
            file: None,
            log_messages: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8000,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::ExposeSecret;
    use std::collections::HashMap;

    const SAMPLE: &str = r#"
access_keys: [sk-a]
proxy:
  http: http://127.0.0.1:7890
providers:
  openai:
    base_url: https://api.openai.com/v1/chat/completions
    api_key: from-file
    adapter: openai
    models:
      gpt-4o-mini:
  gemini:
    base_url: https://generativelanguage.googleapis.com/v1beta/models/gemini-2.0-flash:generateContent
    adapter: gemini
    requires_proxy: true
    models:
      gemini-2.0-flash: {}
"#;

    #[test]
    fn defaults_are_applied() {
        let cfg = GatewayConfig::from_yaml_str(SAMPLE).unwrap();
        assert_eq!(cfg.default_provider, "closeai");
        assert_eq!(cfg.timeouts, TimeoutConfig::default());
        assert_eq!(cfg.timeouts.total(), Duration::from_secs(600));
        assert_eq!(cfg.cache.ttl(), Duration::from_secs(1800));
        assert_eq!(cfg.cache.reap_interval(), Duration::from_secs(300));
        assert_eq!(cfg.logging.format, LogFormat::Text);
        assert_eq!(cfg.proxy.preferred(), Some("http://127.0.0.1:7890"));
    }

    #[test]
    fn json_documents_are_accepted() {
        let cfg = GatewayConfig::from_yaml_str(
            r#"{"default_provider": "openai", "access_keys": ["k"], "logging": {"format": "json"}}"#,
        )
        .unwrap();
        assert_eq!(cfg.default_provider, "openai");
        assert_eq!(cfg.logging.format, LogFormat::Json);
    }

    #[test]
    fn env_overrides_keys() {
        let mut cfg = GatewayConfig::from_yaml_str(SAMPLE).unwrap();
        let env: HashMap<&str, &str> = HashMap::from([
            ("ACCESS_API_KEYS", "k1, k2 ,,k3"),
            ("GEMINI_API_KEY", "g-secret"),
        ]);
        cfg.apply_env_overrides(|name| env.get(name).map(|v| v.to_string()));
        assert_eq!(cfg.access_keys, vec!["k1", "k2", "k3"]);
        assert_eq!(cfg.providers["gemini"].api_key.expose_secret(), "g-secret");
        assert_eq!(cfg.providers["openai"].api_key.expose_secret(), "from-file");
    }

    #[test]
    fn access_key_formats() {
        assert_eq!(parse_access_keys(r#"{"a": true, "b": "x"}"#), vec!["a", "b"]);
        assert_eq!(parse_access_keys(r#"["a", "b"]"#), vec!["a", "b"]);
        assert_eq!(parse_access_keys("a,b"), vec!["a", "b"]);
    }

    #[test]
    fn invalid_sections_are_rejected() {
        let err = GatewayConfig::from_yaml_str("timeouts: {total_secs: 0}").unwrap_err();
        assert!(matches!(err, LlmError::ConfigurationError(_)));

        let err = GatewayConfig::from_yaml_str(
            "providers: {x: {base_url: 'nope', adapter: openai}}",
        )
        .unwrap_err();
        assert!(err.to_string().contains("provider 'x'"));
    }
}
