//! pyr-orchestrator: the PyRunner service
//!
//! Runs validated guest scripts as supervised child processes, fans their
//! output out to any number of websocket viewers, keeps the annotated view
//! of the managed scripts directory, and serves the HTTP control plane.

pub mod launcher;
pub mod orchestrator;
pub mod reconciler;
pub mod registry;
pub mod server;
pub mod session;
pub mod signals;
pub mod state;

pub use orchestrator::Orchestrator;
pub use reconciler::Reconciler;
pub use registry::ScriptRegistry;
pub use state::AppState;
