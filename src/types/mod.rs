//! Canonical message model shared by every adapter.

pub mod chat;
pub mod model_id;

pub use chat::*;
pub use model_id::{ModelIdentifier, PROVIDER_SEPARATOR};
