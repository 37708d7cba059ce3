//! Message types shared by the stream reconciler and the context pruner.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// A message in a conversation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Message {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub role: Role,
    pub content: MessageContent,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCall>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
}

impl Message {
    fn new(role: Role, content: MessageContent) -> Self {
        Self {
            id: None,
            role,
            content,
            tool_calls: Vec::new(),
            tool_call_id: None,
            name: None,
            timestamp: Some(Utc::now()),
        }
    }

    /// Create a system message.
    pub fn system(text: impl Into<String>) -> Self {
        Self::new(Role::System, MessageContent::Text(text.into()))
    }

    /// Create a human message.
    pub fn human(text: impl Into<String>) -> Self {
        Self::new(Role::Human, MessageContent::Text(text.into()))
    }

    /// Create an AI message with plain text content.
    pub fn ai(text: impl Into<String>) -> Self {
        Self::new(Role::Ai, MessageContent::Text(text.into()))
    }

    /// Create an AI message from content blocks.
    pub fn ai_blocks(blocks: Vec<ContentBlock>) -> Self {
        Self::new(Role::Ai, MessageContent::Blocks(blocks))
    }

    /// Create a tool result message.
    pub fn tool(tool_call_id: impl Into<String>, text: impl Into<String>) -> Self {
        let mut message = Self::new(Role::Tool, MessageContent::Text(text.into()));
        message.tool_call_id = Some(tool_call_id.into());
        message
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn with_tool_calls(mut self, tool_calls: Vec<ToolCall>) -> Self {
        self.tool_calls = tool_calls;
        self
    }

    /// Concatenated text of all text content.
    pub fn text(&self) -> String {
        match &self.content {
            MessageContent::Text(text) => text.clone(),
            MessageContent::Blocks(blocks) => blocks
                .iter()
                .filter_map(|block| match block {
                    ContentBlock::Text { text } => Some(text.as_str()),
                    _ => None,
                })
                .collect::<Vec<_>>()
                .join(""),
        }
    }

    /// Content blocks of this message; plain string content is viewed as one text block.
    pub fn blocks(&self) -> Vec<ContentBlock> {
        match &self.content {
            MessageContent::Text(text) if text.is_empty() => Vec::new(),
            MessageContent::Text(text) => vec![ContentBlock::Text { text: text.clone() }],
            MessageContent::Blocks(blocks) => blocks.clone(),
        }
    }

    /// First thinking block carried by this message, if any.
    pub fn thinking_block(&self) -> Option<&ThinkingBlock> {
        match &self.content {
            MessageContent::Text(_) => None,
            MessageContent::Blocks(blocks) => blocks.iter().find_map(|block| match block {
                ContentBlock::Thinking(thinking) => Some(thinking),
                _ => None,
            }),
        }
    }

    /// Whether this message requested any tool calls, either in `tool_calls`
    /// or as inline tool-call blocks.
    pub fn has_tool_calls(&self) -> bool {
        if !self.tool_calls.is_empty() {
            return true;
        }
        matches!(&self.content, MessageContent::Blocks(blocks)
            if blocks.iter().any(|b| matches!(b, ContentBlock::ToolCall(_))))
    }

    /// Return a copy of this message with `block` placed before its existing content.
    pub fn with_leading_block(&self, block: ContentBlock) -> Self {
        let mut blocks = vec![block];
        blocks.extend(self.blocks());
        let mut message = self.clone();
        message.content = MessageContent::Blocks(blocks);
        message
    }
}

/// Conversation role.
#[derive(
    Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Display, EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Role {
    System,
    Human,
    Ai,
    Tool,
}

/// Message content: a plain string or an ordered list of blocks.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum MessageContent {
    Text(String),
    Blocks(Vec<ContentBlock>),
}

impl Default for MessageContent {
    fn default() -> Self {
        Self::Text(String::new())
    }
}

/// A single content block.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentBlock {
    Text { text: String },
    Thinking(ThinkingBlock),
    ToolCall(ToolCallPart),
    Image(ImagePart),
    AgentUpdate(AgentUpdate),
}

impl ContentBlock {
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text { text: text.into() }
    }

    pub fn thinking(thinking: impl Into<String>) -> Self {
        Self::Thinking(ThinkingBlock {
            thinking: thinking.into(),
            signature: None,
        })
    }

    /// Tag family of this block.
    pub fn kind(&self) -> ContentKind {
        match self {
            Self::Text { .. } => ContentKind::Text,
            Self::Thinking(_) => ContentKind::Thinking,
            Self::ToolCall(_) => ContentKind::ToolCall,
            Self::Image(_) => ContentKind::Image,
            Self::AgentUpdate(_) => ContentKind::AgentUpdate,
        }
    }
}

/// Tag family of a content block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ContentKind {
    Text,
    Thinking,
    ToolCall,
    Image,
    AgentUpdate,
}

/// Provider-surfaced reasoning content.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ThinkingBlock {
    pub thinking: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signature: Option<String>,
}

/// Tool-call content, possibly still streaming.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ToolCallPart {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default)]
    pub args: ToolArgs,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub progress: Option<f64>,
}

impl From<&ToolCall> for ToolCallPart {
    fn from(call: &ToolCall) -> Self {
        Self {
            id: Some(call.id.clone()),
            name: Some(call.name.clone()),
            args: ToolArgs::Object(call.args.clone()),
            output: None,
            progress: None,
        }
    }
}

/// Tool-call arguments: raw streamed JSON text, or a resolved object.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum ToolArgs {
    Partial(String),
    Object(serde_json::Value),
}

impl Default for ToolArgs {
    fn default() -> Self {
        Self::Partial(String::new())
    }
}

impl ToolArgs {
    pub fn is_object(&self) -> bool {
        matches!(self, Self::Object(_))
    }

    pub fn is_empty(&self) -> bool {
        match self {
            Self::Partial(text) => text.is_empty(),
            Self::Object(value) => value.is_null(),
        }
    }

    /// Textual form, used for token estimation and echo detection.
    pub fn as_text(&self) -> String {
        match self {
            Self::Partial(text) => text.clone(),
            Self::Object(value) => value.to_string(),
        }
    }
}

/// Image content.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ImagePart {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

/// Progress update from a sub-agent.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct AgentUpdate {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_id: Option<String>,
}

/// A committed tool call requested by the model.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ToolCall {
    pub id: String,
    pub name: String,
    pub args: serde_json::Value,
}

impl ToolCall {
    pub fn new(id: impl Into<String>, name: impl Into<String>, args: serde_json::Value) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            args,
        }
    }
}
