//! Per-provider request counters

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

use serde::Serialize;

#[derive(Debug, Default)]
struct Counters {
    success: AtomicU64,
    failure: AtomicU64,
}

/// Monotonic success/failure counters keyed by provider.
///
/// Updates are relaxed; readers get an approximate view under load.
#[derive(Debug, Default)]
pub struct RequestStats {
    providers: RwLock<HashMap<String, Arc<Counters>>>,
}

/// Counter values for one provider.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ProviderStats {
    pub success: u64,
    pub failure: u64,
}

impl ProviderStats {
    pub fn total(&self) -> u64 {
        self.success + self.failure
    }
}

/// Point-in-time copy of every provider's counters.
pub type StatsSnapshot = BTreeMap<String, ProviderStats>;

impl RequestStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_success(&self, provider: &str) {
        self.counters(provider).success.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_failure(&self, provider: &str) {
        self.counters(provider).failure.fetch_add(1, Ordering::Relaxed);
    }

    pub fn get(&self, provider: &str) -> ProviderStats {
        let providers = self.providers.read().unwrap_or_else(|e| e.into_inner());
        providers.get(provider).map(|c| load(c)).unwrap_or_default()
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        let providers = self.providers.read().unwrap_or_else(|e| e.into_inner());
        providers
            .iter()
            .map(|(name, counters)| (name.clone(), load(counters)))
            .collect()
    }

    fn counters(&self, provider: &str) -> Arc<Counters> {
        if let Some(counters) = self
            .providers
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(provider)
        {
            return Arc::clone(counters);
        }
        let mut providers = self.providers.write().unwrap_or_else(|e| e.into_inner());
        Arc::clone(providers.entry(provider.to_string()).or_default())
    }
}

fn load(counters: &Counters) -> ProviderStats {
    ProviderStats {
        success: counters.success.load(Ordering::Relaxed),
        failure: counters.failure.load(Ordering::Relaxed),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counts_per_provider() {
        let stats = RequestStats::new();
        stats.record_success("openai");
        stats.record_success("openai");
        stats.record_failure("gemini");

        assert_eq!(stats.get("openai"), ProviderStats { success: 2, failure: 0 });
        assert_eq!(stats.get("gemini").total(), 1);
        assert_eq!(stats.get("missing"), ProviderStats::default());

        let snapshot = stats.snapshot();
        assert_eq!(snapshot.keys().collect::<Vec<_>>(), vec!["gemini", "openai"]);
        let json = serde_json::to_value(&snapshot).unwrap();
        assert_eq!(json["openai"]["success"], 2);
    }

    #[test]
    fn concurrent_updates_are_not_lost() {
        let stats = Arc::new(RequestStats::new());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let stats = Arc::clone(&stats);
                std::thread::spawn(move || {
                    for _ in 0..1000 {
                        stats.record_success("p");
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(stats.get("p").success, 8000);
    }
}
