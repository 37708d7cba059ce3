//! Normalized turn events and the sinks they are dispatched to.

use std::sync::Mutex;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::error::{Result, TurnError};
use crate::types::{RunStep, ToolCallChunk, ToolCallPart};

/// Events produced while reconciling one model turn.
///
/// Consumers rely on `StepCreated` arriving before any delta for that step.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum StreamEvent {
    StepCreated {
        step: RunStep,
    },
    MessageDelta {
        step_id: String,
        content: String,
    },
    ReasoningDelta {
        step_id: String,
        content: String,
    },
    ToolCallDelta {
        step_id: String,
        index: usize,
        fragment: ToolCallChunk,
    },
    ToolCallCompleted {
        step_id: String,
        tool_call: ToolCallPart,
    },
}

impl StreamEvent {
    /// Step the event belongs to.
    pub fn step_id(&self) -> &str {
        match self {
            Self::StepCreated { step } => &step.id,
            Self::MessageDelta { step_id, .. }
            | Self::ReasoningDelta { step_id, .. }
            | Self::ToolCallDelta { step_id, .. }
            | Self::ToolCallCompleted { step_id, .. } => step_id,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::StepCreated { .. } => "step_created",
            Self::MessageDelta { .. } => "message_delta",
            Self::ReasoningDelta { .. } => "reasoning_delta",
            Self::ToolCallDelta { .. } => "tool_call_delta",
            Self::ToolCallCompleted { .. } => "tool_call_completed",
        }
    }
}

/// Async destination for turn events.
///
/// Implementations must preserve the order in which `dispatch` is awaited.
#[async_trait]
pub trait EventSink: Send + Sync {
    async fn dispatch(&self, event: StreamEvent) -> Result<()>;
}

/// Forwards events into a bounded tokio channel, waiting for capacity.
#[derive(Debug, Clone)]
pub struct ChannelSink {
    sender: mpsc::Sender<StreamEvent>,
}

impl ChannelSink {
    pub fn new(sender: mpsc::Sender<StreamEvent>) -> Self {
        Self { sender }
    }

    /// Create a sink together with the receiving half.
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<StreamEvent>) {
        let (sender, receiver) = mpsc::channel(capacity);
        (Self::new(sender), receiver)
    }
}

#[async_trait]
impl EventSink for ChannelSink {
    async fn dispatch(&self, event: StreamEvent) -> Result<()> {
        self.sender
            .send(event)
            .await
            .map_err(|e| TurnError::Dispatch(format!("receiver dropped before {}", e.0.kind())))
    }
}

/// Collects events in memory.
#[derive(Debug, Default)]
pub struct VecSink {
    events: Mutex<Vec<StreamEvent>>,
}

impl VecSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<StreamEvent> {
        self.events
            .lock()
            .map(|events| events.clone())
            .unwrap_or_default()
    }

    pub fn take(&self) -> Vec<StreamEvent> {
        self.events
            .lock()
            .map(|mut events| std::mem::take(&mut *events))
            .unwrap_or_default()
    }
}

#[async_trait]
impl EventSink for VecSink {
    async fn dispatch(&self, event: StreamEvent) -> Result<()> {
        self.events
            .lock()
            .map_err(|_| TurnError::Dispatch("event buffer poisoned".to_string()))?
            .push(event);
        Ok(())
    }
}
