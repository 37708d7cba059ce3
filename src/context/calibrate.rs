//! Token-map recalibration from provider usage reports.

use tracing::{debug, warn};

use super::pruner::{ContextWindow, TokenMap};
use crate::config::TurnConfig;
use crate::types::UsageMetadata;

/// Rescale in-window estimates so they agree with what the provider counted.
///
/// `output_index` is the history index of the message the call produced; it
/// receives `output_tokens` directly and is excluded from the ratio. The ratio
/// is applied only to messages the window retained, and only when it falls
/// inside the configured band. Entries outside the window are never touched.
pub fn recalibrate(
    token_map: &TokenMap,
    window: &ContextWindow,
    usage: &UsageMetadata,
    output_index: Option<usize>,
    config: &TurnConfig,
) -> TokenMap {
    let mut updated = token_map.clone();
    if let Some(index) = output_index {
        updated.insert(index, usage.output_tokens as usize);
    }

    let indices: Vec<usize> = window
        .indices()
        .filter(|idx| Some(*idx) != output_index)
        .collect();
    let estimated: usize = indices
        .iter()
        .map(|idx| token_map.get(idx).copied().unwrap_or(0))
        .sum();
    let actual = usage.context_tokens() as usize;
    if estimated == 0 || actual == 0 {
        debug!(estimated, actual, "nothing to recalibrate");
        return updated;
    }

    let ratio = actual as f64 / estimated as f64;
    if !config.accepts_ratio(ratio) {
        warn!(
            ratio,
            min = config.calibration_min_ratio,
            max = config.calibration_max_ratio,
            "usage ratio outside accepted band, keeping estimates"
        );
        return updated;
    }

    for idx in indices {
        if let Some(tokens) = updated.get_mut(&idx) {
            *tokens = (*tokens as f64 * ratio).round() as usize;
        }
    }
    debug!(ratio, estimated, actual, "recalibrated token map");
    updated
}
