//! Adapter construction by dialect tag

use std::collections::HashMap;
use std::sync::Arc;

use crate::adapters::ProviderAdapter;
use crate::error::LlmError;

/// Constructor for one adapter dialect.
pub type AdapterConstructor = Arc<dyn Fn() -> Arc<dyn ProviderAdapter> + Send + Sync>;

/// Maps adapter tags (the `adapter:` field of a provider) to constructors.
#[derive(Clone, Default)]
pub struct AdapterFactory {
    constructors: HashMap<String, AdapterConstructor>,
}

impl std::fmt::Debug for AdapterFactory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut tags: Vec<_> = self.constructors.keys().collect();
        tags.sort();
        f.debug_struct("AdapterFactory").field("tags", &tags).finish()
    }
}

impl AdapterFactory {
    /// Empty factory; nothing can be built until tags are registered.
    pub fn new() -> Self {
        Self::default()
    }

    /// Factory with every dialect compiled into this build.
    pub fn with_defaults() -> Self {
        #[allow(unused_mut)]
        let mut factory = Self::new();
        #[cfg(feature = "openai")]
        factory.register(crate::adapters::openai::ADAPTER_TYPE, || {
            Arc::new(crate::adapters::OpenAiAdapter::new())
        });
        #[cfg(feature = "gemini")]
        factory.register(crate::adapters::gemini::ADAPTER_TYPE, || {
            Arc::new(crate::adapters::GeminiAdapter::new())
        });
        factory
    }

    /// Register (or replace) the constructor for `tag`.
    pub fn register<F>(&mut self, tag: impl Into<String>, constructor: F) -> &mut Self
    where
        F: Fn() -> Arc<dyn ProviderAdapter> + Send + Sync + 'static,
    {
        self.constructors.insert(tag.into(), Arc::new(constructor));
        self
    }

    pub fn supports(&self, tag: &str) -> bool {
        self.constructors.contains_key(tag)
    }

    /// Build a fresh adapter for `tag`.
    pub fn create(&self, tag: &str) -> Result<Arc<dyn ProviderAdapter>, LlmError> {
        let constructor = self
            .constructors
            .get(tag)
            .ok_or_else(|| LlmError::ValidationError(format!("Unsupported adapter type: {tag}")))?;
        Ok(constructor())
    }
}
