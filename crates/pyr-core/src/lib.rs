//! pyr-core: Shared building blocks for PyRunner
//!
//! Configuration, the error taxonomy, script names, the websocket/HTTP wire
//! vocabulary and the persisted autoboot designation. Used by the
//! orchestrator daemon and the `pyrunner` CLI.

pub mod autoboot;
pub mod config;
pub mod error;
pub mod ipc;
pub mod time;
pub mod types;

pub use autoboot::AutobootRegistrar;
pub use error::{ConfigError, RunnerError};
pub use types::{RunState, ScriptName};
