//! Step key resolution.
//!
//! A step key correlates every delta that belongs to one logical step. It is
//! built from the per-chunk coordinates plus a phase marker, so a reasoning to
//! answer transition lands in a different step even within the same turn.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{Result, TurnError};
use crate::types::TurnMetadata;

/// Reasoning phase as seen by the key resolver.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReasoningPhase {
    /// No reasoning observed, or inline tags closed without a structured switch.
    #[default]
    Answer,
    /// Thinking-only or mixed thinking/text delta.
    Reasoning,
    /// Answer content that followed a reasoning phase.
    PostReasoning,
}

/// Agent phase state feeding the key.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PhaseState {
    pub phase: ReasoningPhase,
    /// Tool invocations already recorded for this turn.
    pub invoked_tools: usize,
}

/// Opaque correlation key for a run step.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StepKey(String);

impl StepKey {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for StepKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Builds step keys with a fixed separator.
#[derive(Debug, Clone)]
pub struct StepKeyResolver {
    separator: String,
}

impl Default for StepKeyResolver {
    fn default() -> Self {
        Self::new(crate::config::DEFAULT_STEP_KEY_SEPARATOR)
    }
}

impl StepKeyResolver {
    pub fn new(separator: impl Into<String>) -> Self {
        Self {
            separator: separator.into(),
        }
    }

    /// Derive the key for a delta's coordinates.
    ///
    /// Missing coordinates are an upstream contract violation and are not
    /// recovered from.
    pub fn resolve(&self, metadata: &TurnMetadata, state: &PhaseState) -> Result<StepKey> {
        let run_id = required(metadata.run_id.as_deref(), "run_id")?;
        let thread_id = required(metadata.thread_id.as_deref(), "thread_id")?;
        let node = required(metadata.node.as_deref(), "node")?;
        let turn = metadata
            .turn
            .ok_or(TurnError::MissingMetadata { field: "turn" })?;

        let mut parts = vec![
            run_id.to_string(),
            thread_id.to_string(),
            node.to_string(),
            turn.to_string(),
        ];
        match state.phase {
            ReasoningPhase::Reasoning => parts.push("reasoning".to_string()),
            ReasoningPhase::PostReasoning => parts.push("post-reasoning".to_string()),
            ReasoningPhase::Answer => {}
        }
        if state.invoked_tools > 0 {
            parts.push(state.invoked_tools.to_string());
        }
        Ok(StepKey(parts.join(&self.separator)))
    }
}

fn required<'a>(value: Option<&'a str>, field: &'static str) -> Result<&'a str> {
    value
        .filter(|v| !v.is_empty())
        .ok_or(TurnError::MissingMetadata { field })
}
