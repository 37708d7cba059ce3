//! Run steps: stable units of work within a model turn.

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

use super::message::ToolCallPart;
use super::usage::UsageMetadata;

/// Kind of run step.
#[derive(
    Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Display, EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum StepType {
    MessageCreation,
    ToolCalls,
}

/// Type-specific step payload.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StepDetails {
    MessageCreation { message_id: String },
    ToolCalls { tool_calls: Vec<ToolCallPart> },
}

/// A step created for a step key.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RunStep {
    pub id: String,
    #[serde(rename = "type")]
    pub step_type: StepType,
    /// Position of this step's content in the flattened content-part array.
    pub index: usize,
    pub details: StepDetails,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage: Option<UsageMetadata>,
}

impl RunStep {
    /// Message id for message-creation steps.
    pub fn message_id(&self) -> Option<&str> {
        match &self.details {
            StepDetails::MessageCreation { message_id } => Some(message_id.as_str()),
            StepDetails::ToolCalls { .. } => None,
        }
    }

    pub fn record_usage(&mut self, usage: &UsageMetadata) {
        match &mut self.usage {
            Some(existing) => existing.merge(usage),
            None => self.usage = Some(usage.clone()),
        }
    }
}
