//! Thinking-block retention for providers with visible reasoning.
//!
//! When a tool-using assistant turn carries a thinking block, that block must
//! travel with the turn. If pruning cuts the message that owns it, the block is
//! moved onto the oldest assistant message still in the window.

use crate::error::{Result, TurnError};
use crate::types::{Message, Role, ThinkingBlock};

/// Thinking block that must stay in the window, and the history index that owns it.
#[derive(Debug, Clone, PartialEq)]
pub struct ThinkingRequirement {
    pub owner: usize,
    pub block: ThinkingBlock,
}

/// Start of the newest uninterrupted run of `ai`/`tool` messages at or after `body_start`.
pub fn current_turn_start(history: &[Message], body_start: usize) -> Option<usize> {
    let mut start = None;
    for idx in (body_start..history.len()).rev() {
        match history[idx].role {
            Role::Ai | Role::Tool => start = Some(idx),
            _ => break,
        }
    }
    start
}

/// Find the thinking block the current turn must keep.
///
/// Returns `None` when the current turn made no tool round trip. A tool-using
/// turn without any assistant thinking block is malformed.
pub fn locate(history: &[Message], body_start: usize) -> Result<Option<ThinkingRequirement>> {
    let Some(run_start) = current_turn_start(history, body_start) else {
        return Ok(None);
    };
    let run = &history[run_start..];
    if !run.iter().any(|message| message.role == Role::Tool) {
        return Ok(None);
    }

    run.iter()
        .enumerate()
        .filter(|(_, message)| message.role == Role::Ai)
        .find_map(|(offset, message)| {
            message.thinking_block().map(|block| ThinkingRequirement {
                owner: run_start + offset,
                block: block.clone(),
            })
        })
        .map(Some)
        .ok_or_else(|| {
            TurnError::malformed_thinking(
                "the current tool-using turn has no assistant message with a thinking block",
            )
        })
}
