//! Adapter registry: construction by tag and the per-key instance cache.

pub mod cache;
pub mod factory;

pub use cache::AdapterCache;
pub use factory::{AdapterConstructor, AdapterFactory};
