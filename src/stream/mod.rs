//! Stream reconciliation: step keys, the phase machine, inline tags, and the engine.

pub mod engine;
pub mod inline;
pub mod phase;
pub mod session;
pub mod step_key;

pub use engine::StreamReconciler;
pub use inline::{InlineSplit, ThinkTags};
pub use phase::{PhaseMachine, SwitchReason, TokenState};
pub use session::TurnSession;
pub use step_key::{PhaseState, ReasoningPhase, StepKey, StepKeyResolver};
