//! Per-model payload rewrites.

use serde_json::{Map, Value};

use crate::config::ParamConfig;

/// Apply `config` to `payload` in the fixed order update, add, rename, delete.
///
/// Map iteration is key-ordered, so the result is deterministic.
pub fn apply_param_config(payload: &mut Map<String, Value>, config: &ParamConfig) {
    for (key, value) in &config.update_params {
        payload.insert(key.clone(), value.clone());
    }
    for (key, value) in &config.add_params {
        if !payload.contains_key(key) {
            payload.insert(key.clone(), value.clone());
        }
    }
    for (old_key, new_key) in &config.rename_params {
        if let Some(value) = payload.remove(old_key) {
            payload.insert(new_key.clone(), value);
        }
    }
    for key in &config.delete_params {
        payload.remove(key);
    }
}
