//! Normalized provider deltas consumed by the stream reconciler.

use serde::{Deserialize, Serialize};

use super::message::{ContentBlock, ToolCall};
use super::usage::UsageMetadata;

/// One incremental update from a provider, already normalized by the
/// provider adapter layer.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ProviderDelta {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<DeltaContent>,
    /// Provider-specific reasoning field (`reasoning_content`, `reasoning`, ...).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reasoning: Option<ReasoningField>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCall>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_call_chunks: Vec<ToolCallChunk>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage: Option<UsageMetadata>,
}

impl ProviderDelta {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            content: Some(DeltaContent::Text(text.into())),
            ..Default::default()
        }
    }

    pub fn blocks(blocks: Vec<ContentBlock>) -> Self {
        Self {
            content: Some(DeltaContent::Blocks(blocks)),
            ..Default::default()
        }
    }

    pub fn reasoning(text: impl Into<String>) -> Self {
        Self {
            reasoning: Some(ReasoningField::Text(text.into())),
            ..Default::default()
        }
    }

    pub fn tool_chunk(chunk: ToolCallChunk) -> Self {
        Self {
            tool_call_chunks: vec![chunk],
            ..Default::default()
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    /// Plain string content, if the delta carries string content.
    pub fn plain_text(&self) -> Option<&str> {
        match &self.content {
            Some(DeltaContent::Text(text)) => Some(text.as_str()),
            _ => None,
        }
    }

    /// Text carried as plain string or text blocks.
    pub fn content_text(&self) -> String {
        match &self.content {
            Some(DeltaContent::Text(text)) => text.clone(),
            Some(DeltaContent::Blocks(blocks)) => blocks
                .iter()
                .filter_map(|block| match block {
                    ContentBlock::Text { text } => Some(text.as_str()),
                    _ => None,
                })
                .collect(),
            None => String::new(),
        }
    }

    /// Thinking text carried as explicitly tagged blocks.
    pub fn thinking_block_text(&self) -> String {
        match &self.content {
            Some(DeltaContent::Blocks(blocks)) => blocks
                .iter()
                .filter_map(|block| match block {
                    ContentBlock::Thinking(thinking) => Some(thinking.thinking.as_str()),
                    _ => None,
                })
                .collect(),
            _ => String::new(),
        }
    }

    pub fn has_thinking_blocks(&self) -> bool {
        matches!(&self.content, Some(DeltaContent::Blocks(blocks))
            if blocks.iter().any(|b| matches!(b, ContentBlock::Thinking(_))))
    }

    pub fn reasoning_text(&self) -> Option<String> {
        self.reasoning
            .as_ref()
            .and_then(ReasoningField::text)
            .filter(|text| !text.is_empty())
    }

    pub fn has_tool_fragments(&self) -> bool {
        !self.tool_calls.is_empty() || !self.tool_call_chunks.is_empty()
    }

    /// A delta with no text, no reasoning, and no tool fragments.
    pub fn is_empty(&self) -> bool {
        self.content_text().is_empty()
            && self.thinking_block_text().is_empty()
            && self.reasoning_text().is_none()
            && !self.has_tool_fragments()
    }
}

/// Delta content: plain string or structured blocks.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum DeltaContent {
    Text(String),
    Blocks(Vec<ContentBlock>),
}

/// Reasoning carried outside the content field.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum ReasoningField {
    Text(String),
    Structured(serde_json::Value),
}

impl ReasoningField {
    /// Reasoning text, looking through `text` / `summary[].text` shapes for
    /// structured payloads.
    pub fn text(&self) -> Option<String> {
        match self {
            Self::Text(text) => Some(text.clone()),
            Self::Structured(value) => structured_reasoning_text(value),
        }
    }
}

fn structured_reasoning_text(value: &serde_json::Value) -> Option<String> {
    match value {
        serde_json::Value::String(text) => Some(text.clone()),
        serde_json::Value::Object(map) => {
            if let Some(text) = map.get("text").and_then(|v| v.as_str()) {
                return Some(text.to_string());
            }
            map.get("summary").and_then(structured_reasoning_text)
        }
        serde_json::Value::Array(items) => {
            let joined: String = items.iter().filter_map(structured_reasoning_text).collect();
            (!joined.is_empty()).then_some(joined)
        }
        _ => None,
    }
}

/// A fragment of a streamed tool call.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ToolCallChunk {
    pub index: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub args: Option<String>,
}

impl ToolCallChunk {
    pub fn fragment(index: usize, args: impl Into<String>) -> Self {
        Self {
            index,
            args: Some(args.into()),
            ..Default::default()
        }
    }

    pub fn header(index: usize, id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            index,
            id: Some(id.into()),
            name: Some(name.into()),
            args: None,
        }
    }

    /// Chunks carrying both id and name announce a committed tool call.
    pub fn is_committed(&self) -> bool {
        self.id.as_deref().is_some_and(|id| !id.is_empty())
            && self.name.as_deref().is_some_and(|name| !name.is_empty())
    }
}

/// Per-chunk coordinates supplied by the workflow engine.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct TurnMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub run_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thread_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub node: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub turn: Option<u32>,
}

impl TurnMetadata {
    pub fn new(
        run_id: impl Into<String>,
        thread_id: impl Into<String>,
        node: impl Into<String>,
        turn: u32,
    ) -> Self {
        Self {
            run_id: Some(run_id.into()),
            thread_id: Some(thread_id.into()),
            node: Some(node.into()),
            turn: Some(turn),
        }
    }
}

/// A provider delta paired with the coordinates it was produced under.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct StreamChunk {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<TurnMetadata>,
    pub delta: ProviderDelta,
}

impl StreamChunk {
    pub fn new(metadata: TurnMetadata, delta: ProviderDelta) -> Self {
        Self {
            metadata: Some(metadata),
            delta,
        }
    }
}
