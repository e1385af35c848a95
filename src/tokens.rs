//! Token counting collaborator
//!
//! Counts are only used for request records, so an estimate is good enough.
//! Deployments wanting exact numbers plug in their own [`TokenCounter`].

use crate::types::ChatMessage;

/// Per-message framing overhead.
const MESSAGE_OVERHEAD: u64 = 4;
/// Overhead of the `role` and `name` fields.
const FIELD_OVERHEAD: u64 = 1;
/// Start/end markers of the message list.
const PRIMING_OVERHEAD: u64 = 2;

pub trait TokenCounter: Send + Sync {
    fn count_text(&self, text: &str, model: &str) -> u64;

    fn count_messages(&self, messages: &[ChatMessage], model: &str) -> u64 {
        let body: u64 = messages
            .iter()
            .map(|message| {
                let mut tokens = MESSAGE_OVERHEAD
                    + FIELD_OVERHEAD
                    + self.count_text(&message.role, model)
                    + self.count_text(&message.content.text(), model);
                if let Some(name) = &message.name {
                    tokens += FIELD_OVERHEAD + self.count_text(name, model);
                }
                tokens
            })
            .sum();
        body + PRIMING_OVERHEAD
    }
}

/// Roughly four characters per token.
#[derive(Debug, Clone, Copy, Default)]
pub struct HeuristicTokenCounter;

impl TokenCounter for HeuristicTokenCounter {
    fn count_text(&self, text: &str, _model: &str) -> u64 {
        (text.chars().count() as u64).div_ceil(4)
    }
}
