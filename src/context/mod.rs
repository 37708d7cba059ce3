//! Context window management: estimation, pruning, thinking retention, recalibration.

pub mod calibrate;
pub mod estimate;
pub mod pruner;
pub mod thinking;

pub use calibrate::recalibrate;
pub use estimate::{
    estimate_context_usage, estimate_message_tokens, estimate_text_tokens, ContextUsage,
    HeuristicTokenCounter, TokenCounter,
};
pub use pruner::{ContextPruner, ContextWindow, PruneConstraints, PruneOutcome, TokenMap};
pub use thinking::ThinkingRequirement;
