//! Stream reconciliation engine.
//!
//! Consumes one turn's provider deltas in arrival order and produces the
//! normalized [`StreamEvent`] sequence. A step-created event is always emitted
//! before the first delta that targets the step.

use futures::{Stream, StreamExt};
use tracing::{debug, warn};

use super::phase::TokenState;
use super::session::TurnSession;
use super::step_key::{PhaseState, ReasoningPhase, StepKey};
use crate::config::TurnConfig;
use crate::error::{Result, TurnError};
use crate::events::{EventSink, StreamEvent};
use crate::types::{
    ProviderDelta, StepDetails, StreamChunk, ToolArgs, ToolCallChunk, ToolCallPart, TurnMetadata,
};

/// Reconciles heterogeneous provider deltas for a single model turn.
#[derive(Debug, Clone, Default)]
pub struct StreamReconciler {
    session: TurnSession,
}

impl StreamReconciler {
    pub fn new(config: &TurnConfig) -> Self {
        Self::with_session(TurnSession::new(config))
    }

    pub fn with_session(session: TurnSession) -> Self {
        Self { session }
    }

    pub fn session(&self) -> &TurnSession {
        &self.session
    }

    pub fn into_session(self) -> TurnSession {
        self.session
    }

    /// Classify one chunk and return the events it produces, in dispatch order.
    ///
    /// Fails only on contract violations: absent turn metadata or a missing
    /// coordinate. A step lookup miss is logged and the affected delta dropped.
    pub fn reconcile(&mut self, chunk: &StreamChunk) -> Result<Vec<StreamEvent>> {
        let metadata = chunk.metadata.as_ref().ok_or_else(|| {
            TurnError::ContextMissing("stream chunk has no turn metadata".to_string())
        })?;
        let delta = &chunk.delta;

        if delta.is_empty() {
            self.absorb_empty(delta);
            return Ok(Vec::new());
        }

        if let Some(id) = delta.id.as_deref() {
            self.session.mark_seen(id);
        }

        if self.echoes_tool_args(delta) {
            debug!(
                chunk_id = delta.id.as_deref().unwrap_or(""),
                "suppressing content that echoes tool-call arguments"
            );
            self.record_usage(delta);
            return Ok(Vec::new());
        }

        let prior_state = self.session.machine.state();
        let prior_phase = self.session.phase_state();
        let state = self.session.machine.observe(delta);

        let mut events = Vec::new();
        let outcome = match state {
            TokenState::Text => self.on_text(metadata, delta, prior_phase, &mut events),
            TokenState::Think => {
                self.on_think(metadata, delta, prior_state, prior_phase, &mut events)
            }
            TokenState::ThinkAndText => {
                self.on_think_and_text(metadata, delta, prior_state, prior_phase, &mut events)
            }
        };
        drop_on_lookup_miss(outcome)?;
        drop_on_lookup_miss(self.on_tool_fragments(metadata, delta, &mut events))?;

        self.session.reasoning_streak = self.session.machine.state() == TokenState::Think
            || delta.has_thinking_blocks()
            || delta.reasoning_text().is_some();
        self.record_usage(delta);
        Ok(events)
    }

    /// Reconcile one chunk and dispatch its events, awaiting each dispatch in turn.
    pub async fn handle_chunk<S>(&mut self, sink: &S, chunk: &StreamChunk) -> Result<()>
    where
        S: EventSink + ?Sized,
    {
        for event in self.reconcile(chunk)? {
            sink.dispatch(event).await?;
        }
        Ok(())
    }

    /// Drive a whole turn's chunk stream into `sink`, stopping at the first error.
    pub async fn consume<S, St>(&mut self, sink: &S, mut chunks: St) -> Result<()>
    where
        S: EventSink + ?Sized,
        St: Stream<Item = StreamChunk> + Unpin,
    {
        while let Some(chunk) = chunks.next().await {
            self.handle_chunk(sink, &chunk).await?;
        }
        Ok(())
    }

    /// Record the result of an externally executed tool.
    ///
    /// Emits `tool_call_completed` for the step that announced the call and
    /// counts the invocation so later step keys carry the tool-count suffix.
    pub fn complete_tool_call(
        &mut self,
        tool_call_id: &str,
        output: impl Into<String>,
        args: Option<serde_json::Value>,
    ) -> Vec<StreamEvent> {
        let Some(step_id) = self.session.tool_call_steps.get(tool_call_id).cloned() else {
            warn!(tool_call_id, "completion for a tool call that was never announced");
            return Vec::new();
        };
        let Some(step) = self.session.step(&step_id) else {
            warn!(tool_call_id, step_id = %step_id, "step lookup miss on tool completion");
            return Vec::new();
        };
        let announced = match &step.details {
            StepDetails::ToolCalls { tool_calls } => tool_calls
                .iter()
                .find(|call| call.id.as_deref() == Some(tool_call_id))
                .cloned()
                .unwrap_or_default(),
            StepDetails::MessageCreation { .. } => ToolCallPart::default(),
        };

        self.session.record_invoked_tool(tool_call_id);
        let tool_call = ToolCallPart {
            id: Some(tool_call_id.to_string()),
            name: announced.name,
            args: args.map(ToolArgs::Object).unwrap_or(announced.args),
            output: Some(output.into()),
            progress: Some(1.0),
        };
        vec![StreamEvent::ToolCallCompleted { step_id, tool_call }]
    }

    /// Async form of [`complete_tool_call`](Self::complete_tool_call).
    pub async fn dispatch_tool_completion<S>(
        &mut self,
        sink: &S,
        tool_call_id: &str,
        output: impl Into<String>,
        args: Option<serde_json::Value>,
    ) -> Result<()>
    where
        S: EventSink + ?Sized,
    {
        for event in self.complete_tool_call(tool_call_id, output, args) {
            sink.dispatch(event).await?;
        }
        Ok(())
    }

    fn absorb_empty(&mut self, delta: &ProviderDelta) {
        self.record_usage(delta);
        if delta.usage.is_some() {
            return;
        }
        match delta.id.as_deref().filter(|id| !id.is_empty()) {
            Some(id) if self.session.seed_preliminary_id(id) => {
                debug!(chunk_id = id, "seeded preliminary message id");
            }
            Some(id) => {
                warn!(chunk_id = id, "duplicate preliminary message id ignored");
            }
            None => debug!("dropping empty delta"),
        }
    }

    fn echoes_tool_args(&self, delta: &ProviderDelta) -> bool {
        !delta.has_tool_fragments()
            && delta
                .plain_text()
                .is_some_and(|text| !text.is_empty() && self.session.echoes_tool_args(text))
    }

    fn record_usage(&mut self, delta: &ProviderDelta) {
        if let Some(usage) = &delta.usage {
            self.session.record_usage(usage);
        }
    }

    fn on_text(
        &mut self,
        metadata: &TurnMetadata,
        delta: &ProviderDelta,
        prior_phase: PhaseState,
        events: &mut Vec<StreamEvent>,
    ) -> Result<()> {
        // Reasoning riding along with content belongs to the reasoning step,
        // which stays open while consecutive chunks keep carrying reasoning.
        if let Some(reasoning) = delta.reasoning_text() {
            let state = PhaseState {
                phase: ReasoningPhase::Reasoning,
                invoked_tools: prior_phase.invoked_tools,
            };
            let key = self.session.resolve_key(metadata, &state)?;
            let fresh = !self.session.reasoning_streak;
            self.push_reasoning(&key, delta, fresh, reasoning, events)?;
        }

        let text = delta.content_text();
        if text.is_empty() {
            return Ok(());
        }
        let key = self.session.step_key(metadata)?;
        let fresh = self.phase_changed(prior_phase);
        self.push_message(&key, delta, fresh, text, events)
    }

    fn on_think(
        &mut self,
        metadata: &TurnMetadata,
        delta: &ProviderDelta,
        prior_state: TokenState,
        prior_phase: PhaseState,
        events: &mut Vec<StreamEvent>,
    ) -> Result<()> {
        let key = self.session.step_key(metadata)?;
        let fresh = self.phase_changed(prior_phase);

        if delta.has_thinking_blocks() || delta.reasoning_text().is_some() {
            let mut reasoning = delta.thinking_block_text();
            if let Some(field) = delta.reasoning_text() {
                reasoning.push_str(&field);
            }
            if !reasoning.is_empty() {
                self.push_reasoning(&key, delta, fresh, reasoning, events)?;
            }
            let text = delta.content_text();
            if !text.is_empty() {
                self.session.machine.settle_text();
                let key = self.session.step_key(metadata)?;
                self.push_message(&key, delta, true, text, events)?;
            }
            return Ok(());
        }

        let content = delta.content_text();
        let tags = self.session.machine.tags().clone();
        if prior_state != TokenState::Think && tags.has_open(&content) {
            let split = tags.split(&content);
            let had_prefix = !split.text.is_empty();
            if had_prefix {
                // Answer text never lands on a reasoning key.
                let (prefix_phase, prefix_fresh) = match prior_phase.phase {
                    ReasoningPhase::Reasoning => (
                        PhaseState {
                            phase: ReasoningPhase::PostReasoning,
                            ..prior_phase
                        },
                        true,
                    ),
                    _ => (prior_phase, false),
                };
                let prefix_key = self.session.resolve_key(metadata, &prefix_phase)?;
                self.push_message(&prefix_key, delta, prefix_fresh, split.text, events)?;
            }
            if !split.thinking.is_empty() {
                self.push_reasoning(&key, delta, fresh || had_prefix, split.thinking, events)?;
            }
            return Ok(());
        }

        let reasoning = tags.strip_markers(&content);
        if reasoning.is_empty() {
            return Ok(());
        }
        self.push_reasoning(&key, delta, fresh, reasoning, events)
    }

    fn on_think_and_text(
        &mut self,
        metadata: &TurnMetadata,
        delta: &ProviderDelta,
        prior_state: TokenState,
        prior_phase: PhaseState,
        events: &mut Vec<StreamEvent>,
    ) -> Result<()> {
        let content = delta.content_text();
        let tags = self.session.machine.tags();
        let split = if prior_state == TokenState::Think {
            tags.split_continuation(&content)
        } else {
            tags.split(&content)
        };

        if !split.thinking.is_empty() {
            let key = self.session.step_key(metadata)?;
            let fresh = self.phase_changed(prior_phase);
            self.push_reasoning(&key, delta, fresh, split.thinking, events)?;
        }
        // The span is closed either way; what follows is answer text.
        self.session.machine.settle_text();
        if split.text.is_empty() {
            return Ok(());
        }

        let key = self.session.step_key(metadata)?;
        self.push_message(&key, delta, true, split.text, events)
    }

    fn on_tool_fragments(
        &mut self,
        metadata: &TurnMetadata,
        delta: &ProviderDelta,
        events: &mut Vec<StreamEvent>,
    ) -> Result<()> {
        if !delta.has_tool_fragments() {
            return Ok(());
        }
        let key = self.session.step_key(metadata)?;

        for call in &delta.tool_calls {
            if self.session.tool_call_steps.contains_key(&call.id) {
                continue;
            }
            let step_id = self.announce_tool_call(&key, ToolCallPart::from(call), events);
            self.session.record_tool_args(&step_id, &call.args.to_string());
        }

        for chunk in &delta.tool_call_chunks {
            self.on_tool_chunk(&key, chunk, events)?;
        }
        Ok(())
    }

    fn on_tool_chunk(
        &mut self,
        key: &StepKey,
        chunk: &ToolCallChunk,
        events: &mut Vec<StreamEvent>,
    ) -> Result<()> {
        let slot = (key.clone(), chunk.index);

        if chunk.is_committed() {
            let id = chunk.id.clone().unwrap_or_default();
            let step_id = match self.session.tool_call_steps.get(&id) {
                Some(step_id) => step_id.clone(),
                None => {
                    let part = ToolCallPart {
                        id: chunk.id.clone(),
                        name: chunk.name.clone(),
                        ..Default::default()
                    };
                    self.announce_tool_call(key, part, events)
                }
            };
            self.session.tool_chunk_steps.insert(slot.clone(), step_id);
        }

        let args = chunk.args.as_deref().unwrap_or_default();
        if chunk.is_committed() && args.is_empty() {
            return Ok(());
        }

        let step_id = match self.session.tool_chunk_steps.get(&slot) {
            Some(step_id) => step_id.clone(),
            None => {
                // Fragment arrived before its header.
                let step_id = self.announce_tool_call(key, ToolCallPart::default(), events);
                self.session.tool_chunk_steps.insert(slot, step_id.clone());
                step_id
            }
        };
        if self.session.step(&step_id).is_none() {
            return Err(TurnError::StepLookupMiss(step_id));
        }

        self.session.record_tool_args(&step_id, args);
        events.push(StreamEvent::ToolCallDelta {
            step_id,
            index: chunk.index,
            fragment: chunk.clone(),
        });
        Ok(())
    }

    fn announce_tool_call(
        &mut self,
        key: &StepKey,
        part: ToolCallPart,
        events: &mut Vec<StreamEvent>,
    ) -> String {
        let tool_call_id = part.id.clone();
        let step = self.session.create_step(
            Some(key),
            StepDetails::ToolCalls {
                tool_calls: vec![part],
            },
        );
        let step_id = step.id.clone();
        if let Some(id) = tool_call_id.filter(|id| !id.is_empty()) {
            self.session.tool_call_steps.insert(id, step_id.clone());
        }
        events.push(StreamEvent::StepCreated { step });
        step_id
    }

    fn phase_changed(&self, prior: PhaseState) -> bool {
        self.session.phase_state().phase != prior.phase
    }

    fn push_message(
        &mut self,
        key: &StepKey,
        delta: &ProviderDelta,
        fresh: bool,
        content: String,
        events: &mut Vec<StreamEvent>,
    ) -> Result<()> {
        let step_id = self.message_step(key, delta, fresh, events)?;
        events.push(StreamEvent::MessageDelta { step_id, content });
        Ok(())
    }

    fn push_reasoning(
        &mut self,
        key: &StepKey,
        delta: &ProviderDelta,
        fresh: bool,
        content: String,
        events: &mut Vec<StreamEvent>,
    ) -> Result<()> {
        let step_id = self.message_step(key, delta, fresh, events)?;
        events.push(StreamEvent::ReasoningDelta { step_id, content });
        Ok(())
    }

    fn message_step(
        &mut self,
        key: &StepKey,
        delta: &ProviderDelta,
        fresh: bool,
        events: &mut Vec<StreamEvent>,
    ) -> Result<String> {
        let chunk_id = delta.id.as_deref();
        let (step_id, created) = if fresh {
            self.session.open_message_step(key, chunk_id)
        } else {
            self.session.ensure_message_step(key, chunk_id)?
        };
        if let Some(step) = created {
            events.push(StreamEvent::StepCreated { step });
        }
        Ok(step_id)
    }
}

fn drop_on_lookup_miss(outcome: Result<()>) -> Result<()> {
    match outcome {
        Err(TurnError::StepLookupMiss(step)) => {
            warn!(step = %step, "step lookup miss, dropping delta");
            Ok(())
        }
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ContentBlock, ToolCall};
    use serde_json::json;

    fn chunk(delta: ProviderDelta) -> StreamChunk {
        StreamChunk::new(TurnMetadata::new("run", "thread", "agent", 1), delta)
    }

    fn kinds(events: &[StreamEvent]) -> Vec<&'static str> {
        events.iter().map(StreamEvent::kind).collect()
    }

    #[test]
    fn first_text_creates_step_then_delta() {
        let mut reconciler = StreamReconciler::default();
        let events = reconciler
            .reconcile(&chunk(ProviderDelta::text("Hi").with_id("run-1")))
            .unwrap();
        assert_eq!(kinds(&events), ["step_created", "message_delta"]);
        let StreamEvent::StepCreated { step } = &events[0] else {
            panic!("expected step_created");
        };
        assert_eq!(step.message_id(), Some("run-1"));

        let events = reconciler
            .reconcile(&chunk(ProviderDelta::text(" there").with_id("run-1")))
            .unwrap();
        assert_eq!(kinds(&events), ["message_delta"]);
    }

    #[test]
    fn missing_metadata_is_fatal() {
        let mut reconciler = StreamReconciler::default();
        let err = reconciler
            .reconcile(&StreamChunk {
                metadata: None,
                delta: ProviderDelta::text("x"),
            })
            .unwrap_err();
        assert!(matches!(err, TurnError::ContextMissing(_)));
    }

    #[test]
    fn empty_delta_seeds_preliminary_id() {
        let mut reconciler = StreamReconciler::default();
        let events = reconciler
            .reconcile(&chunk(ProviderDelta::default().with_id("pre-1")))
            .unwrap();
        assert!(events.is_empty());
        let events = reconciler
            .reconcile(&chunk(ProviderDelta::text("x").with_id("other")))
            .unwrap();
        let StreamEvent::StepCreated { step } = &events[0] else {
            panic!("expected step_created");
        };
        assert_eq!(step.message_id(), Some("pre-1"));
    }

    #[test]
    fn structured_reasoning_and_answer_use_distinct_steps() {
        let mut reconciler = StreamReconciler::default();
        let first = reconciler
            .reconcile(&chunk(ProviderDelta::blocks(vec![ContentBlock::thinking("plan")])))
            .unwrap();
        let second = reconciler
            .reconcile(&chunk(ProviderDelta::text("answer")))
            .unwrap();
        assert_eq!(kinds(&first), ["step_created", "reasoning_delta"]);
        assert_eq!(kinds(&second), ["step_created", "message_delta"]);
        assert_ne!(first[1].step_id(), second[1].step_id());
    }

    #[test]
    fn inline_pair_in_one_delta_splits_into_two_steps() {
        let mut reconciler = StreamReconciler::default();
        let events = reconciler
            .reconcile(&chunk(ProviderDelta::text("a<think>b</think>c")))
            .unwrap();
        assert_eq!(
            kinds(&events),
            ["step_created", "reasoning_delta", "step_created", "message_delta"]
        );
        assert_eq!(
            events[1],
            StreamEvent::ReasoningDelta {
                step_id: events[0].step_id().to_string(),
                content: "b".into()
            }
        );
        assert_eq!(
            events[3],
            StreamEvent::MessageDelta {
                step_id: events[2].step_id().to_string(),
                content: "ac".into()
            }
        );
    }

    #[test]
    fn committed_tool_chunk_announces_and_fragments_follow() {
        let mut reconciler = StreamReconciler::default();
        let header = reconciler
            .reconcile(&chunk(ProviderDelta::tool_chunk(ToolCallChunk::header(
                0, "call_1", "search",
            ))))
            .unwrap();
        assert_eq!(kinds(&header), ["step_created"]);

        let fragment = reconciler
            .reconcile(&chunk(ProviderDelta::tool_chunk(ToolCallChunk::fragment(
                0, "{\"q\":1}",
            ))))
            .unwrap();
        assert_eq!(kinds(&fragment), ["tool_call_delta"]);
        assert_eq!(fragment[0].step_id(), header[0].step_id());

        // Echoed argument text is not rendered as content.
        let echo = reconciler
            .reconcile(&chunk(ProviderDelta::text("{\"q\":1}")))
            .unwrap();
        assert!(echo.is_empty());
    }

    #[test]
    fn completion_counts_invoked_tools() {
        let mut reconciler = StreamReconciler::default();
        let delta = ProviderDelta {
            tool_calls: vec![ToolCall::new("call_1", "search", json!({"q": "x"}))],
            ..Default::default()
        };
        let announced = reconciler.reconcile(&chunk(delta)).unwrap();
        let events = reconciler.complete_tool_call("call_1", "result", None);
        assert_eq!(events.len(), 1);
        let StreamEvent::ToolCallCompleted { step_id, tool_call } = &events[0] else {
            panic!("expected tool_call_completed");
        };
        assert_eq!(step_id, announced[0].step_id());
        assert_eq!(tool_call.args, ToolArgs::Object(json!({"q": "x"})));
        assert_eq!(tool_call.progress, Some(1.0));
        assert_eq!(reconciler.session().invoked_tool_count(), 1);

        assert!(reconciler.complete_tool_call("missing", "x", None).is_empty());
    }
}
