//! Token usage reported by the model-invocation layer.

use serde::{Deserialize, Serialize};

/// Usage metadata for one model call.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct UsageMetadata {
    pub input_tokens: u32,
    pub output_tokens: u32,
    pub total_tokens: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input_token_details: Option<InputTokenDetails>,
}

/// Breakdown of input tokens, when the provider reports one.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct InputTokenDetails {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cache_read: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cache_creation: Option<u32>,
}

impl UsageMetadata {
    pub fn new(input_tokens: u32, output_tokens: u32) -> Self {
        Self {
            input_tokens,
            output_tokens,
            total_tokens: input_tokens + output_tokens,
            input_token_details: None,
        }
    }

    /// Tokens the provider actually counted for the input context.
    ///
    /// Derived from `total_tokens` when present so providers that fold cache
    /// reads into the total are still comparable.
    pub fn context_tokens(&self) -> u32 {
        if self.total_tokens > 0 {
            self.total_tokens.saturating_sub(self.output_tokens)
        } else {
            self.input_tokens
        }
    }

    /// Merge another usage into this one (accumulate).
    pub fn merge(&mut self, other: &UsageMetadata) {
        self.input_tokens += other.input_tokens;
        self.output_tokens += other.output_tokens;
        self.total_tokens += other.total_tokens;
        if let Some(details) = &other.input_token_details {
            let mine = self.input_token_details.get_or_insert_with(Default::default);
            if let Some(v) = details.cache_read {
                *mine.cache_read.get_or_insert(0) += v;
            }
            if let Some(v) = details.cache_creation {
                *mine.cache_creation.get_or_insert(0) += v;
            }
        }
    }
}
