//! Shared test helpers: chunk builders, a fixed-cost token counter, and sample histories.

#![allow(dead_code)]

use std::collections::HashSet;

use roci_turn::context::TokenMap;
use roci_turn::events::StreamEvent;
use roci_turn::stream::StreamReconciler;
use roci_turn::types::*;

pub fn meta() -> TurnMetadata {
    TurnMetadata::new("run_1", "thread_1", "agent", 1)
}

pub fn chunk(delta: ProviderDelta) -> StreamChunk {
    StreamChunk::new(meta(), delta)
}

/// Feed deltas through a fresh reconciler and collect every event.
pub fn reconcile_all(deltas: Vec<ProviderDelta>) -> (StreamReconciler, Vec<StreamEvent>) {
    let mut reconciler = StreamReconciler::default();
    let mut events = Vec::new();
    for delta in deltas {
        events.extend(reconciler.reconcile(&chunk(delta)).unwrap());
    }
    (reconciler, events)
}

pub fn kinds(events: &[StreamEvent]) -> Vec<&'static str> {
    events.iter().map(StreamEvent::kind).collect()
}

/// Step ids that received at least one event of `kind`.
pub fn steps_with(events: &[StreamEvent], kind: &str) -> HashSet<String> {
    events
        .iter()
        .filter(|event| event.kind() == kind)
        .map(|event| event.step_id().to_string())
        .collect()
}

/// Concatenated message deltas, in order.
pub fn message_text(events: &[StreamEvent]) -> String {
    events
        .iter()
        .filter_map(|event| match event {
            StreamEvent::MessageDelta { content, .. } => Some(content.as_str()),
            _ => None,
        })
        .collect()
}

/// Concatenated reasoning deltas, in order.
pub fn reasoning_text(events: &[StreamEvent]) -> String {
    events
        .iter()
        .filter_map(|event| match event {
            StreamEvent::ReasoningDelta { content, .. } => Some(content.as_str()),
            _ => None,
        })
        .collect()
}

pub fn token_map(costs: &[usize]) -> TokenMap {
    costs.iter().copied().enumerate().collect()
}

/// Counter that charges a flat cost per message; keeps expectations independent of text length.
pub fn flat_counter(cost: usize) -> impl Fn(&Message) -> usize + Send + Sync {
    move |_: &Message| cost
}

/// `[system(50), human(20), ai-with-tool-call(30), tool-result(15)]`.
pub fn tool_round_history() -> (Vec<Message>, TokenMap) {
    let history = vec![
        Message::system("You are a helpful assistant."),
        Message::human("What's the weather in Paris?"),
        Message::ai("Let me check.").with_tool_calls(vec![ToolCall::new(
            "call_1",
            "weather",
            serde_json::json!({"city": "Paris"}),
        )]),
        Message::tool("call_1", "18C and sunny"),
    ];
    (history, token_map(&[50, 20, 30, 15]))
}

/// Assistant message carrying a thinking block ahead of its text.
pub fn thinking_ai(thought: &str, text: &str) -> Message {
    Message::ai_blocks(vec![ContentBlock::thinking(thought), ContentBlock::text(text)])
}
