//! Context window pruning.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::calibrate;
use super::estimate::{HeuristicTokenCounter, TokenCounter};
use super::thinking;
use crate::config::TurnConfig;
use crate::error::{Result, TurnError};
use crate::types::{ContentBlock, Message, Role, UsageMetadata};

/// History index to estimated token count.
pub type TokenMap = BTreeMap<usize, usize>;

/// Caller-supplied structural requirements for one pruning pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PruneConstraints {
    /// The target provider requires thinking blocks on tool-using turns.
    #[serde(default)]
    pub thinking_enabled: bool,
    /// Roles the window may open on. A `tool` message is never a valid start.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_roles: Option<Vec<Role>>,
}

impl PruneConstraints {
    pub fn with_thinking() -> Self {
        Self {
            thinking_enabled: true,
            start_roles: None,
        }
    }

    pub fn starting_with(mut self, roles: impl Into<Vec<Role>>) -> Self {
        self.start_roles = Some(roles.into());
        self
    }

    fn allows_start(&self, role: Role) -> bool {
        if role == Role::Tool {
            return false;
        }
        self.start_roles
            .as_ref()
            .map_or(true, |roles| roles.contains(&role))
    }
}

/// Retained region of history: an optional leading system message plus `[start, end)`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContextWindow {
    pub system_index: Option<usize>,
    pub start: usize,
    pub end: usize,
}

impl ContextWindow {
    /// History indices inside the window, in chronological order.
    pub fn indices(&self) -> impl Iterator<Item = usize> {
        self.system_index.into_iter().chain(self.start..self.end)
    }

    pub fn contains(&self, index: usize) -> bool {
        self.system_index == Some(index) || (self.start..self.end).contains(&index)
    }

    /// Number of retained non-system messages.
    pub fn len(&self) -> usize {
        self.end.saturating_sub(self.start)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Result of a pruning pass.
#[derive(Debug, Clone, PartialEq)]
pub struct PruneOutcome {
    /// Messages to send, in chronological order.
    pub context: Vec<Message>,
    /// The caller's map with missing entries filled in. Persist it.
    pub token_map: TokenMap,
    pub window: ContextWindow,
    /// Estimated tokens of `context`, excluding the reply reserve.
    pub context_tokens: usize,
    /// Non-system messages that fell outside the window, oldest first.
    pub pruned: Vec<Message>,
    /// Whether a cut-off thinking block was moved onto a retained message.
    pub thinking_reattached: bool,
}

#[derive(Debug, Clone, Copy)]
struct Span {
    start: usize,
    end: usize,
    tokens: usize,
}

impl Span {
    fn is_empty(&self) -> bool {
        self.start >= self.end
    }
}

/// Fits message history into a model's context window.
#[derive(Debug, Clone)]
pub struct ContextPruner<C = HeuristicTokenCounter> {
    counter: C,
    config: TurnConfig,
}

impl Default for ContextPruner<HeuristicTokenCounter> {
    fn default() -> Self {
        Self::new(HeuristicTokenCounter)
    }
}

impl<C: TokenCounter> ContextPruner<C> {
    pub fn new(counter: C) -> Self {
        Self {
            counter,
            config: TurnConfig::default(),
        }
    }

    pub fn with_config(mut self, config: TurnConfig) -> Self {
        self.config = config;
        self
    }

    pub fn config(&self) -> &TurnConfig {
        &self.config
    }

    pub fn counter(&self) -> &C {
        &self.counter
    }

    /// Copy of `token_map` with an estimate for every history index.
    ///
    /// Existing entries are kept as-is.
    pub fn complete_token_map(&self, history: &[Message], token_map: &TokenMap) -> TokenMap {
        let mut completed = token_map.clone();
        for (idx, message) in history.iter().enumerate() {
            completed
                .entry(idx)
                .or_insert_with(|| self.counter.count(message));
        }
        completed
    }

    /// Keep the newest messages that fit in `max_tokens`.
    ///
    /// A leading system message is always kept and paid for up front, as is
    /// the reply reserve. The window never opens on a `tool` message. With
    /// thinking enabled, the current turn's thinking block is kept even when
    /// the message that carried it is cut.
    pub fn prune(
        &self,
        history: &[Message],
        token_map: &TokenMap,
        max_tokens: usize,
        constraints: &PruneConstraints,
    ) -> Result<PruneOutcome> {
        let token_map = self.complete_token_map(history, token_map);
        let cost = |idx: usize| token_map.get(&idx).copied().unwrap_or(0);

        let system_index = history
            .first()
            .filter(|message| message.role == Role::System)
            .map(|_| 0);
        let system_tokens = system_index.map(cost).unwrap_or(0);
        let fixed = self.config.reply_reserve_tokens + system_tokens;
        let body_start = system_index.map_or(0, |idx| idx + 1);
        let end = history.len();
        let too_small = || TurnError::EmptyContextAfterPruning {
            max_tokens,
            required: fixed + smallest_window(history, &token_map, body_start, end, constraints),
        };

        let Some(budget) = max_tokens.checked_sub(fixed) else {
            return Err(too_small());
        };

        let baseline = scan(history, &token_map, body_start, end, budget, constraints);
        if baseline.is_empty() && body_start < end {
            return Err(too_small());
        }

        let mut span = baseline;
        let mut carried = None;
        if constraints.thinking_enabled {
            if let Some(requirement) = thinking::locate(history, body_start)? {
                if requirement.owner < baseline.start {
                    let block = ContentBlock::Thinking(requirement.block);
                    let thinking_cost = self.counter.count(&Message::ai_blocks(vec![block.clone()]));
                    let reduced = budget.checked_sub(thinking_cost).ok_or_else(|| {
                        TurnError::malformed_thinking(format!(
                            "thinking block needs {thinking_cost} tokens but only {budget} remain"
                        ))
                    })?;
                    span = scan(history, &token_map, body_start, end, reduced, constraints);
                    let carrier = (span.start..span.end)
                        .find(|&idx| history[idx].role == Role::Ai)
                        .ok_or_else(|| {
                            TurnError::malformed_thinking(
                                "no assistant message fits alongside the required thinking block",
                            )
                        })?;
                    carried = Some((carrier, block, thinking_cost));
                }
            }
        }

        let mut context = Vec::with_capacity(span.end - span.start + 1);
        if let Some(idx) = system_index {
            context.push(history[idx].clone());
        }
        let mut thinking_reattached = false;
        let mut context_tokens = system_tokens + span.tokens;
        for idx in span.start..span.end {
            let message = &history[idx];
            match &carried {
                Some((carrier, block, thinking_cost))
                    if *carrier == idx && message.thinking_block().is_none() =>
                {
                    context.push(message.with_leading_block(block.clone()));
                    context_tokens += thinking_cost;
                    thinking_reattached = true;
                }
                _ => context.push(message.clone()),
            }
        }

        let window = ContextWindow {
            system_index,
            start: span.start,
            end: span.end,
        };
        let pruned = history[body_start..span.start].to_vec();
        debug!(
            max_tokens,
            context_tokens,
            kept = window.len(),
            pruned = pruned.len(),
            thinking_reattached,
            "pruned context"
        );

        Ok(PruneOutcome {
            context,
            token_map,
            window,
            context_tokens,
            pruned,
            thinking_reattached,
        })
    }

    /// Recalibrate estimates after the call that used `window` returned `usage`.
    pub fn recalibrate(
        &self,
        token_map: &TokenMap,
        window: &ContextWindow,
        usage: &UsageMetadata,
        output_index: Option<usize>,
    ) -> TokenMap {
        calibrate::recalibrate(token_map, window, usage, output_index, &self.config)
    }
}

/// Backward scan from `end`, then trim the front until it opens on an allowed role.
fn scan(
    history: &[Message],
    token_map: &TokenMap,
    body_start: usize,
    end: usize,
    budget: usize,
    constraints: &PruneConstraints,
) -> Span {
    let cost = |idx: usize| token_map.get(&idx).copied().unwrap_or(0);
    let mut tokens = 0usize;
    let mut start = end;
    for idx in (body_start..end).rev() {
        let next = tokens + cost(idx);
        if next > budget {
            break;
        }
        tokens = next;
        start = idx;
    }

    while start < end && !constraints.allows_start(history[start].role) {
        tokens -= cost(start);
        start += 1;
    }
    Span { start, end, tokens }
}

/// Tokens of the shortest suffix that opens on an allowed role.
///
/// Falls back to the newest message alone when no suffix is valid.
fn smallest_window(
    history: &[Message],
    token_map: &TokenMap,
    body_start: usize,
    end: usize,
    constraints: &PruneConstraints,
) -> usize {
    let cost = |idx: usize| token_map.get(&idx).copied().unwrap_or(0);
    if body_start >= end {
        return 0;
    }
    match (body_start..end)
        .rev()
        .find(|&idx| constraints.allows_start(history[idx].role))
    {
        Some(start) => (start..end).map(cost).sum(),
        None => cost(end - 1),
    }
}
