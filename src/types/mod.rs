//! Core types for Roci turns.

pub mod message;
pub mod step;
pub mod stream;
pub mod usage;

pub use message::*;
pub use step::*;
pub use stream::*;
pub use usage::*;
