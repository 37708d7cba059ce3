//! Token estimation.

use crate::types::{ContentBlock, Message};

/// Injected capability that sizes one message in tokens.
///
/// Implementations may be heuristic or call a tokenizer; the pruner only
/// requires that the result is stable for a given message.
pub trait TokenCounter: Send + Sync {
    fn count(&self, message: &Message) -> usize;
}

impl<F> TokenCounter for F
where
    F: Fn(&Message) -> usize + Send + Sync,
{
    fn count(&self, message: &Message) -> usize {
        self(message)
    }
}

/// Character-based estimate, roughly four characters per token.
#[derive(Debug, Clone, Copy, Default)]
pub struct HeuristicTokenCounter;

impl TokenCounter for HeuristicTokenCounter {
    fn count(&self, message: &Message) -> usize {
        estimate_message_tokens(message)
    }
}

pub fn estimate_text_tokens(text: &str) -> usize {
    if text.is_empty() {
        return 0;
    }
    text.chars().count().div_ceil(4)
}

fn estimate_optional(text: Option<&String>) -> usize {
    text.map(|t| estimate_text_tokens(t)).unwrap_or(0)
}

pub fn estimate_message_tokens(message: &Message) -> usize {
    let mut tokens = 4usize;
    for block in message.blocks() {
        tokens += match &block {
            ContentBlock::Text { text } => estimate_text_tokens(text),
            ContentBlock::Thinking(thinking) => {
                estimate_text_tokens(&thinking.thinking)
                    + estimate_optional(thinking.signature.as_ref())
            }
            ContentBlock::ToolCall(call) => {
                estimate_optional(call.name.as_ref())
                    + estimate_text_tokens(&call.args.as_text())
                    + estimate_optional(call.output.as_ref())
                    + 8
            }
            ContentBlock::Image(image) => {
                estimate_optional(image.url.as_ref()) + estimate_optional(image.file_id.as_ref()) + 8
            }
            ContentBlock::AgentUpdate(update) => {
                estimate_optional(update.status.as_ref())
                    + estimate_optional(update.summary.as_ref())
                    + 8
            }
        };
    }
    for call in &message.tool_calls {
        tokens += estimate_text_tokens(&call.name) + estimate_text_tokens(&call.args.to_string()) + 8;
    }
    if let Some(id) = &message.tool_call_id {
        tokens += estimate_text_tokens(id);
    }
    if let Some(name) = &message.name {
        tokens += estimate_text_tokens(name);
    }
    tokens
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContextUsage {
    pub used_tokens: usize,
    pub context_window: usize,
    pub remaining_tokens: usize,
    pub usage_percent: u8,
}

/// How much of `context_window` the messages would occupy.
pub fn estimate_context_usage(messages: &[Message], context_window: usize) -> ContextUsage {
    let used_tokens = messages.iter().map(estimate_message_tokens).sum::<usize>();
    let remaining_tokens = context_window.saturating_sub(used_tokens);
    let usage_percent = if context_window == 0 {
        100
    } else {
        ((used_tokens.saturating_mul(100)) / context_window).min(100) as u8
    };

    ContextUsage {
        used_tokens,
        context_window,
        remaining_tokens,
        usage_percent,
    }
}
