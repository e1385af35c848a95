//! Adapter instance cache
//!
//! Adapters are keyed by `provider:model`. Concurrent first use of a key is
//! deduplicated with a per-key async lock and a double check, so each key is
//! built at most once. Idle entries are evicted by a background reaper.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use super::factory::AdapterFactory;
use crate::adapters::ProviderAdapter;
use crate::config::CacheConfig;
use crate::error::LlmError;

struct CachedAdapter {
    adapter: Arc<dyn ProviderAdapter>,
    adapter_tag: String,
    last_used: Instant,
}

type BuildLocks = HashMap<String, Arc<tokio::sync::Mutex<()>>>;

pub struct AdapterCache {
    factory: AdapterFactory,
    ttl: Duration,
    reap_interval: Duration,
    entries: Mutex<HashMap<String, CachedAdapter>>,
    in_flight: Mutex<BuildLocks>,
}

impl std::fmt::Debug for AdapterCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AdapterCache")
            .field("factory", &self.factory)
            .field("ttl", &self.ttl)
            .field("reap_interval", &self.reap_interval)
            .field("len", &self.len())
            .finish()
    }
}

impl AdapterCache {
    pub fn new(factory: AdapterFactory, config: CacheConfig) -> Self {
        Self {
            factory,
            ttl: config.ttl(),
            reap_interval: config.reap_interval(),
            entries: Mutex::new(HashMap::new()),
            in_flight: Mutex::new(HashMap::new()),
        }
    }

    pub fn factory(&self) -> &AdapterFactory {
        &self.factory
    }

    /// Return the adapter for `provider:model`, building it on first use.
    ///
    /// A cached adapter built from a different tag (the provider's `adapter`
    /// was changed by a reload) is replaced.
    pub async fn get(
        &self,
        provider: &str,
        model: &str,
        adapter_tag: &str,
    ) -> Result<Arc<dyn ProviderAdapter>, LlmError> {
        let key = format!("{provider}:{model}");

        if let Some(adapter) = self.touch(&key, adapter_tag)? {
            return Ok(adapter);
        }

        // Held across build + insert so at most one builder runs per key.
        let build_lock = {
            let mut locks = self.lock_in_flight()?;
            Arc::clone(
                locks
                    .entry(key.clone())
                    .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(()))),
            )
        };
        let _guard = build_lock.lock().await;

        if let Some(adapter) = self.touch(&key, adapter_tag)? {
            return Ok(adapter);
        }

        let adapter = self.factory.create(adapter_tag)?;
        tracing::info!(key = %key, adapter = adapter_tag, "adapter constructed");
        self.lock_entries()?.insert(
            key,
            CachedAdapter {
                adapter: Arc::clone(&adapter),
                adapter_tag: adapter_tag.to_string(),
                last_used: Instant::now(),
            },
        );
        Ok(adapter)
    }

    /// Refresh and return a matching entry.
    fn touch(&self, key: &str, adapter_tag: &str) -> Result<Option<Arc<dyn ProviderAdapter>>, LlmError> {
        let mut entries = self.lock_entries()?;
        match entries.get_mut(key) {
            Some(entry) if entry.adapter_tag == adapter_tag => {
                entry.last_used = Instant::now();
                Ok(Some(Arc::clone(&entry.adapter)))
            }
            Some(entry) => {
                tracing::info!(
                    key,
                    cached = %entry.adapter_tag,
                    configured = adapter_tag,
                    "adapter tag changed, rebuilding"
                );
                entries.remove(key);
                Ok(None)
            }
            None => Ok(None),
        }
    }

    /// Drop entries idle longer than the TTL, plus their unused build locks.
    ///
    /// Returns the number of evicted adapters.
    pub fn evict_expired(&self) -> usize {
        let now = Instant::now();
        let evicted: Vec<String> = {
            let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
            let expired: Vec<String> = entries
                .iter()
                .filter(|(_, entry)| now.duration_since(entry.last_used) > self.ttl)
                .map(|(key, _)| key.clone())
                .collect();
            for key in &expired {
                entries.remove(key);
            }
            expired
        };

        {
            let entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
            let mut locks = self.in_flight.lock().unwrap_or_else(|e| e.into_inner());
            // A lock still referenced elsewhere belongs to a build in progress.
            locks.retain(|key, lock| entries.contains_key(key) || Arc::strong_count(lock) > 1);
        }

        if !evicted.is_empty() {
            tracing::info!(count = evicted.len(), keys = ?evicted, "evicted idle adapters");
        }
        evicted.len()
    }

    /// Run [`evict_expired`](Self::evict_expired) every reap interval until `token` fires.
    pub fn spawn_reaper(self: &Arc<Self>, token: CancellationToken) -> JoinHandle<()> {
        let cache = Arc::clone(self);
        let period = self.reap_interval;
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = ticker.tick() => {
                        cache.evict_expired();
                    }
                }
            }
            tracing::debug!("adapter cache reaper stopped");
        })
    }

    pub fn contains(&self, provider: &str, model: &str) -> bool {
        self.entries
            .lock()
            .map(|entries| entries.contains_key(&format!("{provider}:{model}")))
            .unwrap_or(false)
    }

    pub fn len(&self) -> usize {
        self.entries.lock().map(|entries| entries.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        self.entries.lock().unwrap_or_else(|e| e.into_inner()).clear();
        self.in_flight.lock().unwrap_or_else(|e| e.into_inner()).clear();
    }

    fn lock_entries(&self) -> Result<MutexGuard<'_, HashMap<String, CachedAdapter>>, LlmError> {
        self.entries
            .lock()
            .map_err(|e| LlmError::InternalError(format!("Adapter cache lock poisoned: {e}")))
    }

    fn lock_in_flight(&self) -> Result<MutexGuard<'_, BuildLocks>, LlmError> {
        self.in_flight
            .lock()
            .map_err(|e| LlmError::InternalError(format!("In-flight lock poisoned: {e}")))
    }

    #[cfg(test)]
    fn build_lock_count(&self) -> usize {
        self.in_flight.lock().unwrap().len()
    }
}
