//! Tests for core types.

use pretty_assertions::assert_eq;
use roci_turn::types::*;
use serde_json::json;

#[test]
fn message_system() {
    let msg = Message::system("You are helpful.");
    assert_eq!(msg.role, Role::System);
    assert_eq!(msg.text(), "You are helpful.");
}

#[test]
fn message_tool_result_links_call() {
    let msg = Message::tool("call_1", "42");
    assert_eq!(msg.role, Role::Tool);
    assert_eq!(msg.tool_call_id.as_deref(), Some("call_1"));
}

#[test]
fn message_text_skips_non_text_blocks() {
    let msg = Message::ai_blocks(vec![
        ContentBlock::thinking("plan"),
        ContentBlock::text("Hello"),
        ContentBlock::ToolCall(ToolCallPart::default()),
        ContentBlock::text(" there"),
    ]);
    assert_eq!(msg.text(), "Hello there");
    assert_eq!(msg.thinking_block().unwrap().thinking, "plan");
}

#[test]
fn message_serde_roundtrip() {
    let msg = Message::ai_blocks(vec![ContentBlock::Thinking(ThinkingBlock {
        thinking: "plan".into(),
        signature: Some("sig".into()),
    })])
    .with_id("msg_1")
    .with_tool_calls(vec![ToolCall::new("call_1", "search", json!({"q": "x"}))]);
    let json = serde_json::to_string(&msg).unwrap();
    let deserialized: Message = serde_json::from_str(&json).unwrap();
    assert_eq!(deserialized, msg);
}

#[test]
fn plain_string_content_deserializes() {
    let msg: Message = serde_json::from_value(json!({"role": "human", "content": "hi"})).unwrap();
    assert_eq!(msg.content, MessageContent::Text("hi".into()));
    assert!(msg.timestamp.is_none());
}

#[test]
fn tool_args_untagged_forms() {
    let partial: ToolArgs = serde_json::from_value(json!("{\"x\":")).unwrap();
    assert_eq!(partial, ToolArgs::Partial("{\"x\":".into()));
    assert!(!partial.is_object());

    let object: ToolArgs = serde_json::from_value(json!({"x": 1})).unwrap();
    assert!(object.is_object());
    assert_eq!(object.as_text(), "{\"x\":1}");
    assert!(ToolArgs::default().is_empty());
}

#[test]
fn run_step_serializes_details_with_tag() {
    let step = RunStep {
        id: "step_1".into(),
        step_type: StepType::ToolCalls,
        index: 2,
        details: StepDetails::ToolCalls {
            tool_calls: vec![ToolCallPart {
                id: Some("call_1".into()),
                name: Some("search".into()),
                ..Default::default()
            }],
        },
        agent_id: Some("agent_a".into()),
        group_id: None,
        usage: None,
    };
    let json = serde_json::to_value(&step).unwrap();
    assert_eq!(json["type"], "tool_calls");
    assert_eq!(json["details"]["type"], "tool_calls");
    assert_eq!(json["details"]["tool_calls"][0]["name"], "search");
    assert!(json.get("group_id").is_none());
    assert_eq!(step.message_id(), None);
}

#[test]
fn run_step_usage_accumulates() {
    let mut step = RunStep {
        id: "step_1".into(),
        step_type: StepType::MessageCreation,
        index: 0,
        details: StepDetails::MessageCreation {
            message_id: "msg_1".into(),
        },
        agent_id: None,
        group_id: None,
        usage: None,
    };
    step.record_usage(&UsageMetadata::new(10, 2));
    step.record_usage(&UsageMetadata::new(0, 3));
    let usage = step.usage.unwrap();
    assert_eq!(usage.output_tokens, 5);
    assert_eq!(usage.total_tokens, 15);
}

#[test]
fn provider_delta_accessors() {
    let delta = ProviderDelta::blocks(vec![
        ContentBlock::thinking("a"),
        ContentBlock::text("b"),
        ContentBlock::thinking("c"),
    ]);
    assert!(delta.has_thinking_blocks());
    assert_eq!(delta.thinking_block_text(), "ac");
    assert_eq!(delta.content_text(), "b");
    assert_eq!(delta.plain_text(), None);
    assert!(!delta.is_empty());
    assert!(ProviderDelta::default().is_empty());
}

#[test]
fn provider_delta_deserializes_openai_shape() {
    let delta: ProviderDelta = serde_json::from_value(json!({
        "content": "Hi",
        "reasoning": {"summary": [{"text": "a"}, {"text": "b"}]},
        "tool_call_chunks": [{"index": 0, "id": "call_1", "name": "search", "args": ""}]
    }))
    .unwrap();
    assert_eq!(delta.plain_text(), Some("Hi"));
    assert_eq!(delta.reasoning_text().as_deref(), Some("ab"));
    assert!(delta.has_tool_fragments());
    assert!(delta.tool_call_chunks[0].is_committed());
}

#[test]
fn tool_chunk_without_id_is_a_fragment() {
    let fragment = ToolCallChunk::fragment(1, "{}");
    assert!(!fragment.is_committed());
    assert_eq!(fragment.index, 1);
}

#[test]
fn step_type_strum_names() {
    assert_eq!(StepType::MessageCreation.to_string(), "message_creation");
    assert_eq!("tool_calls".parse::<StepType>().unwrap(), StepType::ToolCalls);
    assert_eq!(ContentKind::AgentUpdate.to_string(), "agent_update");
}
