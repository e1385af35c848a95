//! Read-only configuration access for the router

use std::collections::{BTreeMap, HashSet};
use std::sync::{Arc, RwLock};

use super::{GatewayConfig, ModelConfig, ProviderConfig, ProxyConfig};

/// Configuration as seen by the router.
///
/// Implementations may swap their contents at any time. The router takes one
/// [`ConfigSnapshot`] per request and resolves everything through it, so a
/// reload never mixes two configurations within a request.
pub trait ConfigStore: Send + Sync {
    /// The current configuration, whole.
    fn snapshot(&self) -> Arc<ConfigSnapshot>;

    /// Whether `api_key` is an accepted caller key.
    fn validate_api_key(&self, api_key: &str) -> bool {
        self.snapshot().validate_api_key(api_key)
    }

    /// Provider used for identifiers without a `provider/` prefix.
    fn default_provider(&self) -> String {
        self.snapshot().default_provider().to_string()
    }

    fn get_provider_config(&self, provider: &str) -> Option<Arc<ProviderConfig>> {
        self.snapshot().get_provider_config(provider)
    }

    fn get_model_config(&self, provider: &str, model: &str) -> Option<ModelConfig> {
        self.snapshot().get_model_config(provider, model)
    }

    /// Proxy URL to use, or `None` when the provider goes direct.
    fn get_proxy(&self, requires_proxy: bool) -> Option<String> {
        self.snapshot().get_proxy(requires_proxy)
    }

    /// Every configured provider, ordered by name.
    fn providers(&self) -> Vec<(String, Arc<ProviderConfig>)> {
        self.snapshot().providers()
    }
}

/// Immutable view of one configuration generation.
#[derive(Debug)]
pub struct ConfigSnapshot {
    access_keys: HashSet<String>,
    default_provider: String,
    providers: BTreeMap<String, Arc<ProviderConfig>>,
    proxy: ProxyConfig,
}

impl ConfigSnapshot {
    pub fn validate_api_key(&self, api_key: &str) -> bool {
        self.access_keys.contains(api_key)
    }

    pub fn default_provider(&self) -> &str {
        &self.default_provider
    }

    pub fn get_provider_config(&self, provider: &str) -> Option<Arc<ProviderConfig>> {
        self.providers.get(provider).cloned()
    }

    pub fn get_model_config(&self, provider: &str, model: &str) -> Option<ModelConfig> {
        self.providers.get(provider)?.models.get(model).cloned()
    }

    pub fn get_proxy(&self, requires_proxy: bool) -> Option<String> {
        if !requires_proxy {
            return None;
        }
        self.proxy.preferred().map(str::to_string)
    }

    pub fn providers(&self) -> Vec<(String, Arc<ProviderConfig>)> {
        self.providers
            .iter()
            .map(|(name, cfg)| (name.clone(), Arc::clone(cfg)))
            .collect()
    }
}

impl From<GatewayConfig> for ConfigSnapshot {
    fn from(config: GatewayConfig) -> Self {
        Self {
            access_keys: config.access_keys.into_iter().collect(),
            default_provider: config.default_provider,
            providers: config
                .providers
                .into_iter()
                .map(|(name, provider)| (name, Arc::new(provider)))
                .collect(),
            proxy: config.proxy,
        }
    }
}

/// In-memory store built from a [`GatewayConfig`], swappable via [`reload`](Self::reload).
#[derive(Debug)]
pub struct StaticConfigStore {
    inner: RwLock<Arc<ConfigSnapshot>>,
}

impl StaticConfigStore {
    pub fn new(config: GatewayConfig) -> Self {
        Self {
            inner: RwLock::new(Arc::new(ConfigSnapshot::from(config))),
        }
    }

    /// Atomically replace the whole configuration.
    pub fn reload(&self, config: GatewayConfig) {
        let snapshot = Arc::new(ConfigSnapshot::from(config));
        let providers = snapshot.providers.len();
        *self.inner.write().unwrap_or_else(|e| e.into_inner()) = snapshot;
        tracing::info!(providers, "configuration reloaded");
    }
}

impl ConfigStore for StaticConfigStore {
    fn snapshot(&self) -> Arc<ConfigSnapshot> {
        // A writer never panics mid-swap, so a poisoned snapshot is still whole.
        Arc::clone(&self.inner.read().unwrap_or_else(|e| e.into_inner()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(adapter: &str) -> GatewayConfig {
        let mut cfg = GatewayConfig {
            access_keys: vec!["sk-a".into()],
            ..Default::default()
        };
        cfg.proxy.https = Some("http://proxy:8080".into());
        cfg.providers.insert(
            "openai".into(),
            ProviderConfig::new("https://api.openai.com/v1/chat/completions", "k", adapter)
                .with_model("gpt-4o-mini", ModelConfig::default()),
        );
        cfg
    }

    #[test]
    fn lookups() {
        let store = StaticConfigStore::new(config("openai"));
        assert!(store.validate_api_key("sk-a"));
        assert!(!store.validate_api_key("sk-b"));
        assert_eq!(store.default_provider(), "closeai");
        assert!(store.get_provider_config("openai").is_some());
        assert!(store.get_provider_config("nope").is_none());
        assert!(store.get_model_config("openai", "gpt-4o-mini").is_some());
        assert!(store.get_model_config("openai", "gpt-5").is_none());
        assert_eq!(store.get_proxy(false), None);
        assert_eq!(store.get_proxy(true).as_deref(), Some("http://proxy:8080"));
    }

    #[test]
    fn reload_swaps_snapshot() {
        let store = StaticConfigStore::new(config("openai"));
        let before = store.get_provider_config("openai").unwrap();
        store.reload(config("gemini"));
        let after = store.get_provider_config("openai").unwrap();
        // Readers holding the old Arc are unaffected.
        assert_eq!(before.adapter, "openai");
        assert_eq!(after.adapter, "gemini");
    }

    #[test]
    fn snapshot_outlives_reload() {
        let store = StaticConfigStore::new(config("openai"));
        let snapshot = store.snapshot();
        let mut next = config("gemini");
        next.access_keys = vec!["sk-b".into()];
        next.default_provider = "openai".into();
        store.reload(next);

        // The held generation stays internally consistent.
        assert!(snapshot.validate_api_key("sk-a"));
        assert!(!snapshot.validate_api_key("sk-b"));
        assert_eq!(snapshot.default_provider(), "closeai");
        assert_eq!(snapshot.get_provider_config("openai").unwrap().adapter, "openai");

        assert!(store.validate_api_key("sk-b"));
        assert_eq!(store.default_provider(), "openai");
    }
}
