//! Execution sessions and their output fan-out

mod handle;
mod hub;

pub use handle::{ExecutionSession, ExitInfo, SessionState, INPUT_QUEUE_DEPTH};
pub use hub::{OutputHub, SessionEvent, Subscription};
