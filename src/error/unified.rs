//! Unified error classification and recovery.

use serde::{Deserialize, Serialize};

/// Broad error category for routing recovery logic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    /// Upstream broke a calling contract (missing coordinates or context).
    Contract,
    /// Internal bookkeeping drifted; the turn can continue.
    Consistency,
    /// The outgoing provider payload would violate a provider invariant.
    Payload,
    /// The token budget cannot hold the minimum context.
    Budget,
    Configuration,
    Dispatch,
    Serialization,
    Io,
}

/// How severe an error is for the current turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    /// Abort the turn.
    Fatal,
    /// Log, skip the offending item, and keep going.
    Degraded,
}

/// Suggested recovery action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecoverySuggestion {
    FixUpstreamMetadata,
    EnlargeBudget,
    ShortenMessage,
    CheckConfiguration,
    ReportBug,
    None,
}
