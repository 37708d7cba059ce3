//! Content aggregation.
//!
//! [`ContentAggregator`] folds turn events into the final ordered array of
//! content parts. It does not depend on live timing: replaying the same
//! events always yields the same parts.

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{Result, TurnError};
use crate::events::StreamEvent;
use crate::types::{
    AgentUpdate, ContentBlock, ImagePart, ThinkingBlock, ToolArgs, ToolCallPart,
};

/// One aggregated content part with its multi-agent attribution.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ContentPart {
    #[serde(flatten)]
    pub block: ContentBlock,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group_id: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq)]
struct Attribution {
    agent_id: Option<String>,
    group_id: Option<String>,
}

/// Pure reducer from [`StreamEvent`]s to content parts.
#[derive(Debug, Clone, Default)]
pub struct ContentAggregator {
    parts: Vec<Option<ContentPart>>,
    step_indices: HashMap<String, usize>,
    finalized: HashSet<usize>,
    attribution: HashMap<usize, Attribution>,
}

impl ContentAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold a complete event sequence.
    pub fn from_events<'a>(events: impl IntoIterator<Item = &'a StreamEvent>) -> Self {
        let mut aggregator = Self::new();
        for event in events {
            aggregator.apply(event);
        }
        aggregator
    }

    pub fn apply(&mut self, event: &StreamEvent) {
        match event {
            StreamEvent::StepCreated { step } => {
                self.step_indices.insert(step.id.clone(), step.index);
                if step.agent_id.is_some() || step.group_id.is_some() {
                    self.set_attribution(step.index, step.agent_id.clone(), step.group_id.clone());
                }
                if let crate::types::StepDetails::ToolCalls { tool_calls } = &step.details {
                    for call in tool_calls {
                        self.update_content(step.index, ContentBlock::ToolCall(call.clone()), false);
                    }
                }
            }
            StreamEvent::MessageDelta { step_id, content } => {
                if let Some(index) = self.index_for(step_id) {
                    self.update_content(index, ContentBlock::text(content.clone()), false);
                }
            }
            StreamEvent::ReasoningDelta { step_id, content } => {
                if let Some(index) = self.index_for(step_id) {
                    self.update_content(index, ContentBlock::thinking(content.clone()), false);
                }
            }
            StreamEvent::ToolCallDelta {
                step_id, fragment, ..
            } => {
                if let Some(index) = self.index_for(step_id) {
                    let part = ToolCallPart {
                        id: fragment.id.clone(),
                        name: fragment.name.clone(),
                        args: ToolArgs::Partial(fragment.args.clone().unwrap_or_default()),
                        ..Default::default()
                    };
                    self.update_content(index, ContentBlock::ToolCall(part), false);
                }
            }
            StreamEvent::ToolCallCompleted { step_id, tool_call } => {
                if let Some(index) = self.index_for(step_id) {
                    self.update_content(index, ContentBlock::ToolCall(tool_call.clone()), true);
                }
            }
        }
    }

    /// Tag a content index with multi-agent attribution; later updates keep it.
    pub fn set_attribution(
        &mut self,
        index: usize,
        agent_id: Option<String>,
        group_id: Option<String>,
    ) {
        let attribution = Attribution { agent_id, group_id };
        if let Some(Some(part)) = self.parts.get_mut(index) {
            part.agent_id = attribution.agent_id.clone();
            part.group_id = attribution.group_id.clone();
        }
        self.attribution.insert(index, attribution);
    }

    /// Merge `block` into the part at `index`.
    ///
    /// A tag mismatch with the existing part is logged and ignored.
    pub fn update_content(&mut self, index: usize, block: ContentBlock, final_update: bool) {
        if self.parts.len() <= index {
            self.parts.resize(index + 1, None);
        }
        let frozen = self.finalized.contains(&index);

        let merged = match self.parts[index].take() {
            None => Ok(finalize(block, final_update)),
            Some(existing) => match merge(&existing.block, block, frozen, final_update, index) {
                Ok(merged) => Ok(merged),
                Err(err) => {
                    self.parts[index] = Some(existing);
                    Err(err)
                }
            },
        };

        let block = match merged {
            Ok(block) => block,
            Err(err) => {
                warn!(index, error = %err, "ignoring content update");
                return;
            }
        };
        if final_update && matches!(block, ContentBlock::ToolCall(_)) {
            self.finalized.insert(index);
        }
        let attribution = self.attribution.get(&index).cloned().unwrap_or_default();
        self.parts[index] = Some(ContentPart {
            block,
            agent_id: attribution.agent_id,
            group_id: attribution.group_id,
        });
    }

    pub fn part(&self, index: usize) -> Option<&ContentPart> {
        self.parts.get(index).and_then(Option::as_ref)
    }

    pub fn parts(&self) -> impl Iterator<Item = &ContentPart> {
        self.parts.iter().flatten()
    }

    /// Parts in index order, skipping indices that never received content.
    pub fn into_parts(self) -> Vec<ContentPart> {
        self.parts.into_iter().flatten().collect()
    }

    /// Answer text across all text parts, one line per part.
    pub fn text(&self) -> String {
        self.join(|block| match block {
            ContentBlock::Text { text } => Some(text.as_str()),
            _ => None,
        })
    }

    /// Reasoning text across all thinking parts, one line per part.
    pub fn thinking(&self) -> String {
        self.join(|block| match block {
            ContentBlock::Thinking(thinking) => Some(thinking.thinking.as_str()),
            _ => None,
        })
    }

    fn join<'a>(&'a self, pick: impl Fn(&'a ContentBlock) -> Option<&'a str>) -> String {
        self.parts()
            .filter_map(|part| pick(&part.block))
            .filter(|text| !text.is_empty())
            .collect::<Vec<_>>()
            .join("\n")
    }

    fn index_for(&self, step_id: &str) -> Option<usize> {
        let index = self.step_indices.get(step_id).copied();
        if index.is_none() {
            warn!(step_id, "event for unknown step ignored");
        }
        index
    }
}

fn finalize(block: ContentBlock, final_update: bool) -> ContentBlock {
    match block {
        ContentBlock::ToolCall(mut call) if final_update => {
            call.progress = Some(1.0);
            ContentBlock::ToolCall(call)
        }
        other => other,
    }
}

fn merge(
    existing: &ContentBlock,
    incoming: ContentBlock,
    frozen: bool,
    final_update: bool,
    index: usize,
) -> Result<ContentBlock> {
    let merged = match (existing, incoming) {
        (ContentBlock::Text { text }, ContentBlock::Text { text: more }) => ContentBlock::Text {
            text: format!("{text}{more}"),
        },
        (ContentBlock::Thinking(existing), ContentBlock::Thinking(incoming)) => {
            ContentBlock::Thinking(ThinkingBlock {
                thinking: format!("{}{}", existing.thinking, incoming.thinking),
                signature: non_empty(incoming.signature).or_else(|| existing.signature.clone()),
            })
        }
        (ContentBlock::ToolCall(existing), ContentBlock::ToolCall(incoming)) => {
            ContentBlock::ToolCall(merge_tool_call(existing, incoming, frozen, final_update))
        }
        (ContentBlock::Image(existing), ContentBlock::Image(incoming)) => {
            ContentBlock::Image(ImagePart {
                url: incoming.url.or_else(|| existing.url.clone()),
                file_id: incoming.file_id.or_else(|| existing.file_id.clone()),
                mime_type: incoming.mime_type.or_else(|| existing.mime_type.clone()),
                detail: incoming.detail.or_else(|| existing.detail.clone()),
            })
        }
        (ContentBlock::AgentUpdate(existing), ContentBlock::AgentUpdate(incoming)) => {
            ContentBlock::AgentUpdate(AgentUpdate {
                agent_id: incoming.agent_id.or_else(|| existing.agent_id.clone()),
                status: incoming.status.or_else(|| existing.status.clone()),
                summary: incoming.summary.or_else(|| existing.summary.clone()),
                file_id: incoming.file_id.or_else(|| existing.file_id.clone()),
            })
        }
        (existing, incoming) => {
            return Err(TurnError::ContentTypeMismatch {
                index,
                existing: existing.kind(),
                incoming: incoming.kind(),
            })
        }
    };
    Ok(merged)
}

fn merge_tool_call(
    existing: &ToolCallPart,
    incoming: ToolCallPart,
    frozen: bool,
    final_update: bool,
) -> ToolCallPart {
    let id = non_empty(existing.id.clone()).or_else(|| non_empty(incoming.id.clone()));
    let name = non_empty(existing.name.clone()).or_else(|| non_empty(incoming.name.clone()));

    if frozen {
        return ToolCallPart {
            id,
            name,
            ..existing.clone()
        };
    }
    if final_update {
        let args = if incoming.args.is_object() || !incoming.args.is_empty() {
            incoming.args
        } else {
            existing.args.clone()
        };
        return ToolCallPart {
            id,
            name,
            args,
            output: incoming.output.or_else(|| existing.output.clone()),
            progress: Some(1.0),
        };
    }

    let args = match (&existing.args, incoming.args) {
        (_, incoming @ ToolArgs::Object(_)) => incoming,
        (ToolArgs::Object(value), ToolArgs::Partial(_)) => ToolArgs::Object(value.clone()),
        (ToolArgs::Partial(text), ToolArgs::Partial(more)) => {
            ToolArgs::Partial(format!("{text}{more}"))
        }
    };
    ToolCallPart {
        id,
        name,
        args,
        output: incoming.output.or_else(|| existing.output.clone()),
        progress: incoming.progress.or(existing.progress),
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.is_empty())
}
