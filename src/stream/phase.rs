//! Per-turn token-type state machine.
//!
//! Transitions are evaluated once per delta, in priority order:
//!
//! | rule | condition | next state |
//! |------|-----------|------------|
//! | 1 | thinking blocks, or reasoning field set while content is empty | `Think` (switch: reasoning) |
//! | 2 | last switch was reasoning, state is not `Text`, delta has content or tool fragments | `Text` (switch: content) |
//! | 3 | plain content holds an opening tag followed by a closing tag | `ThinkAndText` |
//! | 3b | state is `Think` and plain content holds only a closing tag | `ThinkAndText` |
//! | 4 | plain content holds an opening tag only | `Think` |
//! | 5 | previous raw token held a closing tag | `Text` |
//!
//! Anything else keeps the current state.

use serde::{Deserialize, Serialize};
use strum::Display;

use super::inline::ThinkTags;
use super::step_key::{PhaseState, ReasoningPhase};
use crate::types::ProviderDelta;

/// Classification of the current delta.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum TokenState {
    #[default]
    Text,
    Think,
    ThinkAndText,
}

/// Why the machine last switched between reasoning and content.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum SwitchReason {
    Reasoning,
    Content,
}

/// Explicit finite-state machine over incoming deltas.
#[derive(Debug, Clone)]
pub struct PhaseMachine {
    tags: ThinkTags,
    state: TokenState,
    last_switch: Option<SwitchReason>,
    last_token: Option<String>,
}

impl Default for PhaseMachine {
    fn default() -> Self {
        Self::new(ThinkTags::default())
    }
}

impl PhaseMachine {
    pub fn new(tags: ThinkTags) -> Self {
        Self {
            tags,
            state: TokenState::Text,
            last_switch: None,
            last_token: None,
        }
    }

    pub fn state(&self) -> TokenState {
        self.state
    }

    pub fn last_switch(&self) -> Option<SwitchReason> {
        self.last_switch
    }

    pub fn tags(&self) -> &ThinkTags {
        &self.tags
    }

    /// Key-resolver view of the current phase.
    pub fn phase_state(&self, invoked_tools: usize) -> PhaseState {
        let phase = match (self.state, self.last_switch) {
            (TokenState::Think | TokenState::ThinkAndText, _) => ReasoningPhase::Reasoning,
            (TokenState::Text, Some(SwitchReason::Content)) => ReasoningPhase::PostReasoning,
            (TokenState::Text, _) => ReasoningPhase::Answer,
        };
        PhaseState {
            phase,
            invoked_tools,
        }
    }

    /// Apply the transition table to `delta` and return the resulting state.
    pub fn observe(&mut self, delta: &ProviderDelta) -> TokenState {
        let plain = delta.plain_text().unwrap_or_default();
        let content_empty = delta.content_text().is_empty();

        if let Some((next, reason)) = self.transition(delta, plain, content_empty) {
            self.state = next;
            if let Some(reason) = reason {
                self.last_switch = Some(reason);
            }
        }
        self.last_token = delta.plain_text().map(str::to_string);
        self.state
    }

    /// After a mixed delta has been demultiplexed, the answer half continues as text.
    pub fn settle_text(&mut self) {
        self.state = TokenState::Text;
        self.last_switch = Some(SwitchReason::Content);
    }

    fn transition(
        &self,
        delta: &ProviderDelta,
        plain: &str,
        content_empty: bool,
    ) -> Option<(TokenState, Option<SwitchReason>)> {
        if delta.has_thinking_blocks() || (delta.reasoning_text().is_some() && content_empty) {
            return Some((TokenState::Think, Some(SwitchReason::Reasoning)));
        }
        if self.last_switch == Some(SwitchReason::Reasoning)
            && self.state != TokenState::Text
            && (!content_empty || delta.has_tool_fragments())
        {
            return Some((TokenState::Text, Some(SwitchReason::Content)));
        }
        if self.tags.has_pair(plain) {
            return Some((TokenState::ThinkAndText, None));
        }
        if self.state == TokenState::Think
            && self.tags.has_close(plain)
            && !self.tags.has_open(plain)
        {
            return Some((TokenState::ThinkAndText, None));
        }
        if self.tags.has_open(plain) {
            return Some((TokenState::Think, None));
        }
        if self
            .last_token
            .as_deref()
            .is_some_and(|token| self.tags.has_close(token))
        {
            return Some((TokenState::Text, None));
        }
        None
    }
}
