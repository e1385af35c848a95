//! Provider and model configuration

use std::collections::BTreeMap;

use secrecy::SecretString;
use serde::{Deserialize, Deserializer};
use serde_json::{Map, Value};
use validator::Validate;

/// One upstream provider.
#[derive(Debug, Deserialize, Validate)]
pub struct ProviderConfig {
    /// Full endpoint URL the chat request is POSTed to
    #[validate(url)]
    pub base_url: String,
    /// Upstream credential. Never logged, never put in error details.
    #[serde(default = "empty_secret", deserialize_with = "deserialize_secret")]
    pub api_key: SecretString,
    #[serde(default)]
    pub requires_proxy: bool,
    /// Adapter dialect tag (`openai`, `gemini`, ...)
    #[validate(length(min = 1))]
    pub adapter: String,
    #[serde(default, deserialize_with = "deserialize_models")]
    pub models: BTreeMap<String, ModelConfig>,
}

impl ProviderConfig {
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>, adapter: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            api_key: SecretString::from(api_key.into()),
            requires_proxy: false,
            adapter: adapter.into(),
            models: BTreeMap::new(),
        }
    }

    pub fn with_model(mut self, name: impl Into<String>, config: ModelConfig) -> Self {
        self.models.insert(name.into(), config);
        self
    }

    pub fn with_proxy(mut self, requires_proxy: bool) -> Self {
        self.requires_proxy = requires_proxy;
        self
    }

    pub fn supports_model(&self, model: &str) -> bool {
        self.models.contains_key(model)
    }
}

/// Per-model settings.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    /// Overrides the total outbound timeout.
    pub timeout_secs: Option<u64>,
    pub param_config: ParamConfig,
}

impl ModelConfig {
    pub fn with_params(param_config: ParamConfig) -> Self {
        Self {
            timeout_secs: None,
            param_config,
        }
    }
}

/// Payload rewrite rules, applied in field order: update, add, rename, delete.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct ParamConfig {
    /// Always overwrite
    pub update_params: Map<String, Value>,
    /// Set only when absent
    pub add_params: Map<String, Value>,
    /// old key -> new key
    pub rename_params: BTreeMap<String, String>,
    pub delete_params: Vec<String>,
}

impl ParamConfig {
    pub fn is_empty(&self) -> bool {
        self.update_params.is_empty()
            && self.add_params.is_empty()
            && self.rename_params.is_empty()
            && self.delete_params.is_empty()
    }
}

fn empty_secret() -> SecretString {
    SecretString::from(String::new())
}

fn deserialize_secret<'de, D>(deserializer: D) -> Result<SecretString, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<String>::deserialize(deserializer)?;
    Ok(SecretString::from(raw.unwrap_or_default()))
}

// `model-name:` with no body is common in YAML; treat it as defaults.
fn deserialize_models<'de, D>(deserializer: D) -> Result<BTreeMap<String, ModelConfig>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<BTreeMap<String, Option<ModelConfig>>>::deserialize(deserializer)?;
    Ok(raw
        .unwrap_or_default()
        .into_iter()
        .map(|(name, config)| (name, config.unwrap_or_default()))
        .collect())
}
