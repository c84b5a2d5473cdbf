//! Error types for PyRunner

use std::path::PathBuf;
use thiserror::Error;

/// Errors surfaced by the script registry, orchestrator and reconciler
///
/// All of these are recovered at the service boundary and turned into an
/// HTTP status or a websocket `error` event.
#[derive(Error, Debug)]
pub enum RunnerError {
    /// Uploaded source failed the security scan
    #[error("Script has validation errors")]
    ValidationFailure { errors: Vec<String> },

    /// Script imports siblings that are not in the managed directory
    #[error("Script has missing dependencies: {}", .0.join(", "))]
    MissingDependency(Vec<String>),

    /// A session for this name is already live
    #[error("Script is already running: {0}")]
    AlreadyRunning(String),

    /// No live session for this name
    #[error("Script is not running: {0}")]
    NotRunning(String),

    /// Current verdict forbids running the script; `reason` is a
    /// `ValidationFailure` or a `MissingDependency`
    #[error("Script is not executable: {name}")]
    NotExecutable {
        name: String,
        #[source]
        reason: Box<RunnerError>,
    },

    /// The script is not reading its input fast enough
    #[error("Input queue is full for {0}")]
    InputBacklog(String),

    /// The script closed its standard input
    #[error("Script has closed its input: {0}")]
    InputClosed(String),

    /// Script or process does not exist
    #[error("Not found: {0}")]
    NotFound(String),

    /// The interpreter could not be started
    #[error("Failed to start {name}: {source}")]
    ProcessSpawnFailure {
        name: String,
        #[source]
        source: std::io::Error,
    },

    /// Name is empty or would escape the managed directory
    #[error("Invalid script name: {0}")]
    InvalidName(String),

    /// Only `.py` files are accepted
    #[error("Only .py files are accepted: {0}")]
    UnsupportedFileType(String),

    /// Uploaded bytes are not UTF-8 text
    #[error("File is not valid UTF-8 text: {0}")]
    NotUtf8(String),

    /// Pid is owned by a live session or no longer runs a managed script
    #[error("Process {0} is not an external script process")]
    NotExternal(u32),

    /// Script is running and cannot be modified
    #[error("Cannot delete running script: {0}")]
    Busy(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl RunnerError {
    /// `NotExecutable` for a verdict. Validation errors take precedence
    /// over missing siblings.
    pub fn not_executable(
        name: impl Into<String>,
        errors: Vec<String>,
        missing: Vec<String>,
    ) -> Self {
        let reason = if errors.is_empty() {
            RunnerError::MissingDependency(missing)
        } else {
            RunnerError::ValidationFailure { errors }
        };
        RunnerError::NotExecutable {
            name: name.into(),
            reason: Box::new(reason),
        }
    }
}

/// Configuration-related errors
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Config file not found
    #[error("Config file not found: {0}")]
    NotFound(PathBuf),

    /// Invalid configuration
    #[error("Invalid config: {0}")]
    Invalid(String),

    /// TOML parse error
    #[error("TOML parse error: {0}")]
    Parse(#[from] toml::de::Error),

    /// TOML serialize error
    #[error("TOML serialize error: {0}")]
    Serialize(#[from] toml::ser::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_messages() {
        let err = RunnerError::MissingDependency(vec!["a".into(), "b".into()]);
        assert_eq!(err.to_string(), "Script has missing dependencies: a, b");

        let err = RunnerError::AlreadyRunning("blink.py".into());
        assert_eq!(err.to_string(), "Script is already running: blink.py");

        let err = RunnerError::NotExternal(42);
        assert_eq!(err.to_string(), "Process 42 is not an external script process");
    }

    #[test]
    fn test_not_executable_reason() {
        use std::error::Error as _;

        let err = RunnerError::not_executable("main.py", vec![], vec!["helper".into()]);
        assert_eq!(err.to_string(), "Script is not executable: main.py");
        let reason = err.source().map(|s| s.to_string());
        assert_eq!(reason.as_deref(), Some("Script has missing dependencies: helper"));

        let err = RunnerError::not_executable(
            "net.py",
            vec!["Line 1: Blocked import 'socket'".into()],
            vec!["helper".into()],
        );
        match err {
            RunnerError::NotExecutable { reason, .. } => {
                assert!(matches!(*reason, RunnerError::ValidationFailure { .. }))
            }
            other => panic!("unexpected {:?}", other),
        }
    }
}
