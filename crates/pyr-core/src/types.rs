//! Core domain types

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::RunnerError;

/// Extension every managed script carries
pub const SCRIPT_EXTENSION: &str = "py";

/// File name of a guest script inside the managed directory
///
/// Always a bare `<stem>.py` name: no separators, no parent references, no
/// leading dot.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ScriptName(String);

impl ScriptName {
    /// Check and wrap a script file name
    pub fn parse(name: impl Into<String>) -> Result<Self, RunnerError> {
        let name = name.into();

        if name.is_empty()
            || name.starts_with('.')
            || name.contains(['/', '\\', '\0'])
            || name.chars().any(char::is_control)
        {
            return Err(RunnerError::InvalidName(name));
        }

        match name.rsplit_once('.') {
            Some((stem, ext)) if ext == SCRIPT_EXTENSION && !stem.is_empty() => Ok(Self(name)),
            _ => Err(RunnerError::UnsupportedFileType(name)),
        }
    }

    /// Get the raw file name
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Module name other scripts import this one by
    pub fn module_name(&self) -> &str {
        self.0
            .strip_suffix(".py")
            .unwrap_or(&self.0)
    }
}

impl fmt::Display for ScriptName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl TryFrom<String> for ScriptName {
    type Error = RunnerError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::parse(s)
    }
}

impl From<ScriptName> for String {
    fn from(name: ScriptName) -> Self {
        name.0
    }
}

impl AsRef<str> for ScriptName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Whether a script currently has a live session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    Idle,
    Running,
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunState::Idle => write!(f, "idle"),
            RunState::Running => write!(f, "running"),
        }
    }
}
