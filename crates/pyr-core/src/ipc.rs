//! Wire vocabulary shared by the server and its clients
//!
//! Websocket frames are JSON text tagged by `type`. HTTP responses reuse the
//! record types defined here.

use chrono::{DateTime, Utc};
use pyr_validator::{Dependencies, Validity};
use serde::{Deserialize, Serialize};

use crate::types::RunState;

/// Websocket message from a browser to the server
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientRequest {
    /// Start a script and subscribe to it
    Start { script: String },

    /// Stop a running script
    Stop { script: String },

    /// Write text to a running script's stdin
    Input { script: String, data: String },

    /// Attach to a running script, replaying its output so far
    Watch { script: String },

    /// Detach from a script
    Unwatch { script: String },

    /// Status of one script, or of every running script when omitted
    Status {
        #[serde(default)]
        script: Option<String>,
    },

    /// Terminate a guest script process this server does not own
    StopExternal { pid: u32 },
}

/// Websocket message from the server to a browser
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerEvent {
    /// Sent once when the socket opens
    Connected { hostname: String },

    /// A script started on this connection's request
    Started {
        script: String,
        pid: u32,
        start_time: DateTime<Utc>,
    },

    /// A chunk of script output
    Output { script: String, data: String },

    /// This viewer fell behind and `chunks` pieces of output were skipped
    OutputDropped { script: String, chunks: u64 },

    /// A script exited
    ProcessEnded {
        script: String,
        exit_code: Option<i32>,
        signal: Option<i32>,
        runtime: f64,
    },

    /// Attached to a running script; replayed output precedes this
    Watching {
        script: String,
        pid: u32,
        start_time: DateTime<Utc>,
    },

    /// Status of a single script
    Status {
        script: String,
        running: bool,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        pid: Option<u32>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        start_time: Option<DateTime<Utc>>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        runtime: Option<f64>,
    },

    /// Every running script
    AllStatus { running: Vec<RunningScript> },

    /// A request failed
    Error {
        message: String,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        errors: Vec<String>,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        missing: Vec<String>,
    },

    /// An external process was terminated
    ExternalStopped { pid: u32 },
}

impl ServerEvent {
    /// Plain error event
    pub fn error(message: impl Into<String>) -> Self {
        ServerEvent::Error {
            message: message.into(),
            errors: Vec::new(),
            missing: Vec::new(),
        }
    }
}

/// A live session as reported by status queries
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunningScript {
    pub script: String,
    pub pid: u32,
    pub start_time: DateTime<Utc>,
    pub runtime: f64,
}

/// One script in the managed directory, annotated with its verdict and
/// execution state
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScriptRecord {
    pub name: String,
    pub size: u64,
    pub modified: DateTime<Utc>,
    pub is_valid: bool,
    pub is_executable: bool,
    pub is_running: bool,
    pub has_log: bool,
    pub is_autoboot: bool,
    pub errors: Vec<String>,
    pub missing_deps: Vec<String>,
    pub validity: Validity,
    pub dependencies: Dependencies,
    pub state: RunState,
}

/// A guest script process running outside the orchestrator's control
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExternalProcess {
    pub pid: u32,
    pub name: String,
    pub cmdline: String,
}
