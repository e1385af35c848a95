//! Model identifier parsing
//!
//! Inbound requests name their target as `provider/model`, optionally with an
//! inline annotation (`provider/model<tag>`) that must not take part in lookup.

use std::fmt;

use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};

/// Separator between provider and model in inbound identifiers.
pub const PROVIDER_SEPARATOR: char = '/';

lazy_static! {
    // Outermost trailing annotation: everything from the first `<` to a final `>`.
    static ref ANNOTATION: Regex =
        Regex::new(r"^(?P<name>[^<]*)<(?P<tag>.*)>$").expect("annotation pattern is valid");
}

/// A resolved `(provider, model)` pair.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ModelIdentifier {
    pub provider: String,
    pub model_name: String,
    /// Inline annotation stripped from the model name, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub annotation: Option<String>,
}

impl ModelIdentifier {
    /// Parse an inbound model string.
    ///
    /// Total: every input yields exactly one identifier. Strings without a
    /// separator are attributed to `default_provider`.
    pub fn parse(input: &str, default_provider: &str) -> Self {
        let (name, annotation) = match ANNOTATION.captures(input) {
            Some(caps) => (
                caps.name("name").map_or("", |m| m.as_str()),
                Some(caps["tag"].to_string()),
            ),
            None => (input, None),
        };

        let (provider, model_name) = match name.split_once(PROVIDER_SEPARATOR) {
            Some((provider, model)) => (provider, model),
            None => (default_provider, name),
        };

        Self {
            provider: provider.to_string(),
            model_name: model_name.to_string(),
            annotation,
        }
    }

    /// Key used by the adapter cache.
    pub fn cache_key(&self) -> String {
        format!("{}:{}", self.provider, self.model_name)
    }
}

impl fmt::Display for ModelIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}{}", self.provider, PROVIDER_SEPARATOR, self.model_name)
    }
}
