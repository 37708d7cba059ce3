//! Per-turn reconciliation state.
//!
//! Created at turn start and discarded at turn end. Nothing here is shared
//! between turns; an aborted turn simply drops its session.

use std::collections::{HashMap, HashSet};

use tracing::debug;

use super::inline::ThinkTags;
use super::phase::PhaseMachine;
use super::step_key::{PhaseState, StepKey, StepKeyResolver};
use crate::config::TurnConfig;
use crate::error::{Result, TurnError};
use crate::types::{RunStep, StepDetails, StepType, TurnMetadata, UsageMetadata};

/// State owned by one in-flight model turn.
#[derive(Debug, Clone)]
pub struct TurnSession {
    resolver: StepKeyResolver,
    pub(crate) machine: PhaseMachine,
    steps: Vec<RunStep>,
    step_positions: HashMap<String, usize>,
    steps_by_key: HashMap<StepKey, String>,
    pub(crate) tool_chunk_steps: HashMap<(StepKey, usize), String>,
    pub(crate) tool_call_steps: HashMap<String, String>,
    announced_fragments: HashSet<String>,
    tool_args: HashMap<String, String>,
    /// The previous chunk ended inside reasoning.
    pub(crate) reasoning_streak: bool,
    invoked_tool_ids: HashSet<String>,
    seen_chunk_ids: HashSet<String>,
    used_message_ids: HashSet<String>,
    preliminary_message_id: Option<String>,
    last_message_step: Option<String>,
    next_index: usize,
    agent_id: Option<String>,
    group_id: Option<String>,
}

impl Default for TurnSession {
    fn default() -> Self {
        Self::new(&TurnConfig::default())
    }
}

impl TurnSession {
    pub fn new(config: &TurnConfig) -> Self {
        let tags = ThinkTags::new(&config.think_open_tag, &config.think_close_tag);
        Self {
            resolver: StepKeyResolver::new(&config.step_key_separator),
            machine: PhaseMachine::new(tags),
            steps: Vec::new(),
            step_positions: HashMap::new(),
            steps_by_key: HashMap::new(),
            tool_chunk_steps: HashMap::new(),
            tool_call_steps: HashMap::new(),
            announced_fragments: HashSet::new(),
            tool_args: HashMap::new(),
            reasoning_streak: false,
            invoked_tool_ids: HashSet::new(),
            seen_chunk_ids: HashSet::new(),
            used_message_ids: HashSet::new(),
            preliminary_message_id: None,
            last_message_step: None,
            next_index: 0,
            agent_id: None,
            group_id: None,
        }
    }

    /// Stamp every step created by this session with multi-agent attribution.
    pub fn with_attribution(
        mut self,
        agent_id: Option<String>,
        group_id: Option<String>,
    ) -> Self {
        self.agent_id = agent_id;
        self.group_id = group_id;
        self
    }

    /// Continue content indices after parts produced by an earlier turn.
    pub fn with_start_index(mut self, index: usize) -> Self {
        self.next_index = index;
        self
    }

    pub fn steps(&self) -> &[RunStep] {
        &self.steps
    }

    pub fn step(&self, step_id: &str) -> Option<&RunStep> {
        self.step_positions
            .get(step_id)
            .and_then(|&pos| self.steps.get(pos))
    }

    pub fn step_id_for_key(&self, key: &StepKey) -> Option<&str> {
        self.steps_by_key.get(key).map(String::as_str)
    }

    pub fn invoked_tool_count(&self) -> usize {
        self.invoked_tool_ids.len()
    }

    pub fn phase_state(&self) -> PhaseState {
        self.machine.phase_state(self.invoked_tool_count())
    }

    /// Key for the current phase.
    pub fn step_key(&self, metadata: &TurnMetadata) -> Result<StepKey> {
        self.resolver.resolve(metadata, &self.phase_state())
    }

    pub fn resolve_key(&self, metadata: &TurnMetadata, state: &PhaseState) -> Result<StepKey> {
        self.resolver.resolve(metadata, state)
    }

    pub(crate) fn mark_seen(&mut self, chunk_id: &str) {
        self.seen_chunk_ids.insert(chunk_id.to_string());
    }

    /// Remember an id-bearing empty chunk as the id of the next message step.
    ///
    /// Returns `false` when the id was already seen.
    pub(crate) fn seed_preliminary_id(&mut self, chunk_id: &str) -> bool {
        if !self.seen_chunk_ids.insert(chunk_id.to_string()) {
            return false;
        }
        self.preliminary_message_id = Some(chunk_id.to_string());
        true
    }

    /// Accumulate argument text announced for a tool step.
    ///
    /// Fragments without any alphanumeric character (`}`, `"`, ...) are too
    /// common in ordinary answers to be treated as echoes on their own.
    pub(crate) fn record_tool_args(&mut self, step_id: &str, args: &str) {
        if args.is_empty() {
            return;
        }
        self.tool_args
            .entry(step_id.to_string())
            .or_default()
            .push_str(args);
        if args.chars().any(char::is_alphanumeric) {
            self.announced_fragments.insert(args.to_string());
        }
    }

    /// Whether `text` repeats a tool call's arguments or a distinctive fragment of them.
    pub(crate) fn echoes_tool_args(&self, text: &str) -> bool {
        self.announced_fragments.contains(text) || self.tool_args.values().any(|args| args == text)
    }

    pub(crate) fn record_invoked_tool(&mut self, tool_call_id: &str) {
        self.invoked_tool_ids.insert(tool_call_id.to_string());
    }

    fn next_message_id(&mut self, chunk_id: Option<&str>) -> String {
        let candidate = self
            .preliminary_message_id
            .take()
            .filter(|id| !self.used_message_ids.contains(id))
            .or_else(|| {
                chunk_id
                    .filter(|id| !id.is_empty() && !self.used_message_ids.contains(*id))
                    .map(str::to_string)
            })
            .unwrap_or_else(|| format!("msg_{}", uuid::Uuid::new_v4().simple()));
        self.used_message_ids.insert(candidate.clone());
        candidate
    }

    /// Message step for `key`, created if the key has none or maps to a tool step.
    ///
    /// Returns the step id and, when newly created, the step itself.
    pub(crate) fn ensure_message_step(
        &mut self,
        key: &StepKey,
        chunk_id: Option<&str>,
    ) -> Result<(String, Option<RunStep>)> {
        if let Some(existing) = self.steps_by_key.get(key) {
            let step = self
                .step(existing)
                .ok_or_else(|| TurnError::StepLookupMiss(key.to_string()))?;
            if step.step_type == StepType::MessageCreation {
                return Ok((existing.clone(), None));
            }
        }
        Ok(self.open_message_step(key, chunk_id))
    }

    /// Always create a new message step and point `key` at it.
    pub(crate) fn open_message_step(
        &mut self,
        key: &StepKey,
        chunk_id: Option<&str>,
    ) -> (String, Option<RunStep>) {
        let message_id = self.next_message_id(chunk_id);
        let step = self.create_step(Some(key), StepDetails::MessageCreation { message_id });
        self.last_message_step = Some(step.id.clone());
        (step.id.clone(), Some(step))
    }

    /// Register a new step at the next content index.
    pub(crate) fn create_step(&mut self, key: Option<&StepKey>, details: StepDetails) -> RunStep {
        let step_type = match &details {
            StepDetails::MessageCreation { .. } => StepType::MessageCreation,
            StepDetails::ToolCalls { .. } => StepType::ToolCalls,
        };
        let step = RunStep {
            id: format!("step_{}", uuid::Uuid::new_v4().simple()),
            step_type,
            index: self.next_index,
            details,
            agent_id: self.agent_id.clone(),
            group_id: self.group_id.clone(),
            usage: None,
        };
        self.next_index += 1;
        if let Some(key) = key {
            self.steps_by_key.insert(key.clone(), step.id.clone());
        }
        self.step_positions.insert(step.id.clone(), self.steps.len());
        self.steps.push(step.clone());
        debug!(
            step_id = %step.id,
            step_type = %step.step_type,
            index = step.index,
            key = key.map(StepKey::as_str).unwrap_or(""),
            "run step created"
        );
        step
    }

    /// Attach usage to the most recent message step.
    pub(crate) fn record_usage(&mut self, usage: &UsageMetadata) {
        let Some(step_id) = self.last_message_step.clone() else {
            return;
        };
        if let Some(&pos) = self.step_positions.get(&step_id) {
            self.steps[pos].record_usage(usage);
        }
    }
}
