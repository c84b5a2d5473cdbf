//! Runner configuration

use pyr_validator::ValidationPolicy;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use super::serde_utils::{duration_millis, duration_secs};

/// Configuration for the PyRunner service and the boot launcher
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RunnerConfig {
    /// Address the HTTP/websocket server binds to
    pub bind_address: String,

    /// Managed directory of guest scripts; also their working directory
    pub scripts_dir: PathBuf,

    /// Where `<script>.log` files are written when a session ends
    pub log_dir: PathBuf,

    /// File holding the autoboot designation
    pub autoboot_file: PathBuf,

    /// Interpreter used to run guest scripts
    pub interpreter: String,

    /// Arguments passed to the interpreter before the script path
    pub interpreter_args: Vec<String>,

    /// Largest accepted upload body, in bytes
    pub max_upload_bytes: usize,

    /// Output kept per session for late watchers and the log, in bytes
    pub replay_buffer_bytes: usize,

    /// How long a stopped script gets between SIGTERM and SIGKILL
    #[serde(with = "duration_millis")]
    pub stop_grace_period: Duration,

    /// How long shutdown waits for running scripts to exit
    #[serde(with = "duration_secs")]
    pub shutdown_timeout: Duration,

    /// Static validation block and allow lists
    pub validation: ValidationPolicy,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        let home = dirs::home_dir().unwrap_or_else(|| PathBuf::from("."));
        let state_dir = dirs::data_local_dir()
            .unwrap_or_else(|| home.clone())
            .join("pyrunner");

        Self {
            bind_address: "0.0.0.0:5000".to_string(),
            scripts_dir: home.join("pythoncode"),
            log_dir: state_dir.join("logs"),
            autoboot_file: super::default_config_dir().join("autoboot.txt"),
            interpreter: "python3".to_string(),
            interpreter_args: vec!["-u".to_string()],
            max_upload_bytes: 16 * 1024 * 1024,
            replay_buffer_bytes: 1024 * 1024,
            stop_grace_period: Duration::from_millis(500),
            shutdown_timeout: Duration::from_secs(5),
            validation: ValidationPolicy::default(),
        }
    }
}

impl RunnerConfig {
    /// Path of a script inside the managed directory
    pub fn script_path(&self, name: &str) -> PathBuf {
        self.scripts_dir.join(name)
    }

    /// Create the scripts and log directories if they are missing
    pub fn ensure_dirs(&self) -> std::io::Result<()> {
        std::fs::create_dir_all(&self.scripts_dir)?;
        std::fs::create_dir_all(&self.log_dir)?;
        if let Some(parent) = self.autoboot_file.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        Ok(())
    }

    /// A config rooted entirely under `root`, for tests and throwaway setups
    pub fn rooted_at(root: &Path) -> Self {
        Self {
            scripts_dir: root.join("code"),
            log_dir: root.join("logs"),
            autoboot_file: root.join("autoboot.txt"),
            ..Self::default()
        }
    }
}
