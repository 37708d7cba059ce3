//! Roci Turn — stream reconciliation and context-window pruning for agent turns.
//!
//! Two halves share one message/step model:
//!
//! - [`stream`] turns heterogeneous provider deltas (plain text, inline
//!   `<think>` tags, structured reasoning, fragmented tool-call JSON) into one
//!   ordered stream of [`events::StreamEvent`]s, and [`aggregate`] folds those
//!   events into final content parts.
//! - [`context`] trims history to a model's context window while keeping tool
//!   results attached to their calls and thinking blocks attached to their turn,
//!   then recalibrates token estimates from real usage.
//!
//! # Quick Start
//!
//! ```no_run
//! use roci_turn::prelude::*;
//!
//! # fn example() -> roci_turn::error::Result<()> {
//! let mut reconciler = StreamReconciler::new(TurnConfig::global());
//! let chunk = StreamChunk::new(
//!     TurnMetadata::new("run_1", "thread_1", "agent", 1),
//!     ProviderDelta::text("Hello"),
//! );
//! let events = reconciler.reconcile(&chunk)?;
//! let content = ContentAggregator::from_events(&events);
//! println!("{}", content.text());
//!
//! let history = vec![Message::system("Be brief."), Message::human("Hi")];
//! let outcome = ContextPruner::default().prune(
//!     &history,
//!     &TokenMap::new(),
//!     4096,
//!     &PruneConstraints::default(),
//! )?;
//! println!("{} messages kept", outcome.context.len());
//! # Ok(())
//! # }
//! ```

pub mod aggregate;
pub mod config;
pub mod context;
pub mod error;
pub mod events;
pub mod prelude;
pub mod stream;
pub mod stream_transform;
pub mod types;
