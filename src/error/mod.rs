//! Error types for Roci turns.

pub mod unified;

pub use unified::{ErrorCategory, RecoverySuggestion, Severity};

use thiserror::Error;

use crate::types::ContentKind;

/// Primary error type for stream reconciliation and context pruning.
#[derive(Error, Debug)]
pub enum TurnError {
    #[error("Turn context missing: {0}")]
    ContextMissing(String),

    #[error("Missing turn metadata: {field}")]
    MissingMetadata { field: &'static str },

    #[error("No run step registered for {0}")]
    StepLookupMiss(String),

    #[error("Content type mismatch at index {index}: existing {existing}, incoming {incoming}")]
    ContentTypeMismatch {
        index: usize,
        existing: ContentKind,
        incoming: ContentKind,
    },

    #[error(
        "Malformed thinking sequence: {reason}. Increase the max context tokens or shorten the latest message"
    )]
    MalformedThinkingSequence { reason: String },

    #[error(
        "Context is empty after pruning: {required} tokens needed for the smallest valid context, {max_tokens} allowed. Increase the max context tokens or shorten the conversation"
    )]
    EmptyContextAfterPruning { max_tokens: usize, required: usize },

    #[error("Event dispatch failed: {0}")]
    Dispatch(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl TurnError {
    pub fn malformed_thinking(reason: impl Into<String>) -> Self {
        Self::MalformedThinkingSequence {
            reason: reason.into(),
        }
    }

    /// Classify this error into a category.
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::ContextMissing(_) | Self::MissingMetadata { .. } => ErrorCategory::Contract,
            Self::StepLookupMiss(_) | Self::ContentTypeMismatch { .. } => {
                ErrorCategory::Consistency
            }
            Self::MalformedThinkingSequence { .. } => ErrorCategory::Payload,
            Self::EmptyContextAfterPruning { .. } => ErrorCategory::Budget,
            Self::Dispatch(_) => ErrorCategory::Dispatch,
            Self::Configuration(_) | Self::Toml(_) => ErrorCategory::Configuration,
            Self::Serialization(_) => ErrorCategory::Serialization,
            Self::Io(_) => ErrorCategory::Io,
        }
    }

    /// Whether the turn must stop.
    pub fn severity(&self) -> Severity {
        match self.category() {
            ErrorCategory::Consistency => Severity::Degraded,
            _ => Severity::Fatal,
        }
    }

    pub fn is_fatal(&self) -> bool {
        self.severity() == Severity::Fatal
    }

    /// Retrying the same input cannot change the outcome of any of these.
    pub fn is_retryable(&self) -> bool {
        false
    }

    /// Suggest recovery actions.
    pub fn recovery_suggestion(&self) -> RecoverySuggestion {
        match self {
            Self::MalformedThinkingSequence { .. } => RecoverySuggestion::EnlargeBudget,
            Self::EmptyContextAfterPruning { .. } => RecoverySuggestion::ShortenMessage,
            _ => match self.category() {
                ErrorCategory::Contract => RecoverySuggestion::FixUpstreamMetadata,
                ErrorCategory::Consistency => RecoverySuggestion::ReportBug,
                ErrorCategory::Configuration => RecoverySuggestion::CheckConfiguration,
                _ => RecoverySuggestion::None,
            },
        }
    }
}

/// Convenience alias.
pub type Result<T> = std::result::Result<T, TurnError>;
