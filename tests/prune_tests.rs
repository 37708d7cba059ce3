//! Tests for context window pruning and recalibration.

mod common;

use pretty_assertions::assert_eq;
use roci_turn::config::TurnConfig;
use roci_turn::context::{ContextPruner, ContextWindow, PruneConstraints, TokenMap};
use roci_turn::error::{RecoverySuggestion, TurnError};
use roci_turn::types::*;

use common::*;

#[test]
fn tool_round_fits_whole() {
    let (history, map) = tool_round_history();
    let outcome = ContextPruner::default()
        .prune(&history, &map, 118, &PruneConstraints::default())
        .unwrap();
    assert_eq!(outcome.context, history);
    assert_eq!(outcome.context_tokens, 115);
    assert!(outcome.pruned.is_empty());
}

#[test]
fn tool_round_keeps_ai_and_tool_pair() {
    let (history, map) = tool_round_history();
    let outcome = ContextPruner::default()
        .prune(&history, &map, 98, &PruneConstraints::default())
        .unwrap();
    let roles: Vec<_> = outcome.context.iter().map(|m| m.role).collect();
    assert_eq!(roles, [Role::System, Role::Ai, Role::Tool]);
    assert_eq!(outcome.pruned, vec![history[1].clone()]);
    assert_eq!(
        outcome.window,
        ContextWindow {
            system_index: Some(0),
            start: 2,
            end: 4
        }
    );
}

#[test]
fn tool_round_never_sends_orphaned_result() {
    let (history, map) = tool_round_history();
    for budget in [70, 55] {
        let err = ContextPruner::default()
            .prune(&history, &map, budget, &PruneConstraints::default())
            .unwrap_err();
        // The smallest valid window is [system, ai, tool] plus the reply reserve.
        assert!(
            matches!(err, TurnError::EmptyContextAfterPruning { max_tokens, required: 98 } if max_tokens == budget),
            "budget {budget}: {err}"
        );
        assert_eq!(err.recovery_suggestion(), RecoverySuggestion::ShortenMessage);
    }
}

#[test]
fn result_always_fits_and_never_opens_on_tool() {
    let history = vec![
        Message::system("sys"),
        Message::human("one"),
        Message::ai("two"),
        Message::tool("call_1", "three"),
        Message::tool("call_2", "four"),
        Message::human("five"),
        Message::ai("six"),
        Message::tool("call_3", "seven"),
    ];
    let map = token_map(&[12, 7, 9, 4, 6, 11, 5, 8]);
    let pruner = ContextPruner::default();
    let reserve = pruner.config().reply_reserve_tokens;

    for budget in 0..=80 {
        match pruner.prune(&history, &map, budget, &PruneConstraints::default()) {
            Ok(outcome) => {
                assert!(outcome.context_tokens + reserve <= budget, "budget {budget}");
                let first = outcome.context.iter().find(|m| m.role != Role::System);
                assert!(first.map_or(true, |m| m.role != Role::Tool), "budget {budget}");
            }
            Err(err) => assert!(
                matches!(err, TurnError::EmptyContextAfterPruning { max_tokens, required } if required > max_tokens),
                "budget {budget}: {err}"
            ),
        }
    }
}

#[test]
fn history_without_body_keeps_system_only() {
    let history = vec![Message::system("sys")];
    let outcome = ContextPruner::default()
        .prune(&history, &token_map(&[10]), 20, &PruneConstraints::default())
        .unwrap();
    assert_eq!(outcome.context.len(), 1);
    assert!(outcome.window.is_empty());
}

fn thinking_history() -> (Vec<Message>, TokenMap) {
    let history = vec![
        Message::system("sys"),
        Message::human("Find the file"),
        thinking_ai("I should search first", "Searching"),
        Message::tool("call_1", "found a.txt"),
        Message::ai("Reading it"),
        Message::tool("call_2", "contents"),
    ];
    (history, token_map(&[10, 10, 20, 10, 10, 10]))
}

#[test]
fn surviving_thinking_owner_needs_nothing() {
    let (history, map) = thinking_history();
    let outcome = ContextPruner::new(flat_counter(5))
        .prune(&history, &map, 100, &PruneConstraints::with_thinking())
        .unwrap();
    assert!(!outcome.thinking_reattached);
    assert_eq!(outcome.context, history);
}

#[test]
fn cut_thinking_block_moves_to_oldest_retained_ai() {
    let (history, map) = thinking_history();
    let outcome = ContextPruner::new(flat_counter(5))
        .prune(&history, &map, 48, &PruneConstraints::with_thinking())
        .unwrap();

    assert!(outcome.thinking_reattached);
    assert_eq!(outcome.window.start, 4);
    assert_eq!(outcome.context.len(), 3);
    let carrier = &outcome.context[1];
    assert_eq!(carrier.role, Role::Ai);
    assert_eq!(
        carrier.thinking_block().map(|b| b.thinking.as_str()),
        Some("I should search first")
    );
    assert_eq!(carrier.text(), "Reading it");
    assert_eq!(outcome.context_tokens, 35);
    // The caller's history is untouched.
    assert!(history[4].thinking_block().is_none());
}

#[test]
fn thinking_without_room_is_malformed() {
    let (history, map) = thinking_history();
    let err = ContextPruner::new(flat_counter(5))
        .prune(&history, &map, 35, &PruneConstraints::with_thinking())
        .unwrap_err();
    assert!(matches!(err, TurnError::MalformedThinkingSequence { .. }));
    assert!(err.to_string().contains("Increase the max context tokens"));
    assert!(!err.is_retryable());
}

#[test]
fn tool_turn_without_thinking_block_is_malformed() {
    let history = vec![
        Message::human("q"),
        Message::ai("calling"),
        Message::tool("call_1", "out"),
    ];
    let map = token_map(&[5, 5, 5]);
    let pruner = ContextPruner::default();

    let err = pruner
        .prune(&history, &map, 100, &PruneConstraints::with_thinking())
        .unwrap_err();
    assert!(matches!(err, TurnError::MalformedThinkingSequence { .. }));

    assert!(pruner
        .prune(&history, &map, 100, &PruneConstraints::default())
        .is_ok());
}

#[test]
fn recalibration_follows_usage_ratio() {
    let (history, _) = tool_round_history();
    let map = token_map(&[50, 20, 30, 20]);
    let pruner = ContextPruner::default();
    let outcome = pruner
        .prune(&history, &map, 103, &PruneConstraints::default())
        .unwrap();
    assert_eq!(outcome.window.start, 2);
    let output_index = Some(history.len());

    // Ratio 1.0: unchanged apart from the output entry.
    let same = pruner.recalibrate(
        &outcome.token_map,
        &outcome.window,
        &UsageMetadata::new(100, 9),
        output_index,
    );
    assert_eq!(same, TokenMap::from([(0, 50), (1, 20), (2, 30), (3, 20), (4, 9)]));

    // Ratio 10.0: outside the band, estimates kept.
    let wild = pruner.recalibrate(
        &outcome.token_map,
        &outcome.window,
        &UsageMetadata::new(1000, 9),
        output_index,
    );
    assert_eq!(wild, same);

    // Ratio 1.5: in-window estimates scale, the pruned human message does not.
    let scaled = pruner.recalibrate(
        &outcome.token_map,
        &outcome.window,
        &UsageMetadata::new(150, 9),
        output_index,
    );
    assert_eq!(
        scaled,
        TokenMap::from([(0, 75), (1, 20), (2, 45), (3, 30), (4, 9)])
    );
}

#[test]
fn calibration_band_is_configurable() {
    let (history, _) = tool_round_history();
    let map = token_map(&[50, 20, 30, 20]);
    let config = TurnConfig::builder().calibration_max_ratio(20.0).build();
    let pruner = ContextPruner::default().with_config(config);
    let outcome = pruner
        .prune(&history, &map, 200, &PruneConstraints::default())
        .unwrap();
    let scaled = pruner.recalibrate(
        &outcome.token_map,
        &outcome.window,
        &UsageMetadata::new(1200, 0),
        None,
    );
    assert_eq!(scaled, TokenMap::from([(0, 500), (1, 200), (2, 300), (3, 200)]));
}
