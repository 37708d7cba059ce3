//! Convenience re-exports for common use.

pub use crate::aggregate::{ContentAggregator, ContentPart};
pub use crate::config::TurnConfig;
pub use crate::context::{
    ContextPruner, ContextWindow, HeuristicTokenCounter, PruneConstraints, PruneOutcome,
    TokenCounter, TokenMap,
};
pub use crate::error::{Result, TurnError};
pub use crate::events::{ChannelSink, EventSink, StreamEvent, VecSink};
pub use crate::stream::{StreamReconciler, TurnSession};
pub use crate::stream_transform::reconcile_stream;
pub use crate::types::{
    ContentBlock, Message, ProviderDelta, Role, RunStep, StreamChunk, ToolArgs, ToolCall,
    ToolCallChunk, ToolCallPart, TurnMetadata, UsageMetadata,
};
