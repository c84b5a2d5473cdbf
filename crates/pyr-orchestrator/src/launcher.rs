//! Boot-time launcher
//!
//! Runs the designated autoboot script once, in the foreground, through the
//! same orchestrator the server uses. Output is copied to the launcher's
//! own stdout and persisted to the usual log file.

use std::sync::Arc;

use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

use pyr_core::config::RunnerConfig;
use pyr_core::{AutobootRegistrar, RunnerError, ScriptName};

use crate::orchestrator::Orchestrator;
use crate::registry::ScriptRegistry;
use crate::session::{ExitInfo, SessionEvent};

/// Result of a boot launch
#[derive(Debug, Clone, PartialEq)]
pub enum BootOutcome {
    /// Nothing is designated
    NoDesignation,
    /// The designated script ran and exited
    Exited { script: ScriptName, exit: ExitInfo },
}

impl BootOutcome {
    /// Process exit code for the launcher
    pub fn exit_code(&self) -> i32 {
        match self {
            BootOutcome::NoDesignation => 0,
            BootOutcome::Exited { exit, .. } => exit.shell_code(),
        }
    }
}

/// Run the autoboot script with output on stdout
pub async fn run_autoboot(
    config: RunnerConfig,
    cancel: CancellationToken,
) -> Result<BootOutcome, RunnerError> {
    run_autoboot_with(config, cancel, tokio::io::stdout()).await
}

/// Run the autoboot script, copying its output to `out`
///
/// Fails with `NotFound` when the designated script no longer exists and
/// `NotExecutable` when it does not pass validation. Cancelling `cancel`
/// stops the script the same way a stop request does.
pub async fn run_autoboot_with<W>(
    config: RunnerConfig,
    cancel: CancellationToken,
    mut out: W,
) -> Result<BootOutcome, RunnerError>
where
    W: AsyncWrite + Unpin,
{
    let autoboot = AutobootRegistrar::new(&config.autoboot_file, &config.scripts_dir);
    let Some(designated) = autoboot.get()? else {
        tracing::info!("No autoboot script designated");
        return Ok(BootOutcome::NoDesignation);
    };
    let name = ScriptName::parse(designated)?;

    let config = Arc::new(config);
    let registry = Arc::new(ScriptRegistry::new(&config));
    let orchestrator = Arc::new(Orchestrator::new(Arc::clone(&config), registry));

    let session = orchestrator.start(&name)?;
    tracing::info!("Autoboot started {} (pid {})", name, session.pid());

    let mut subscription = session.subscribe();
    for chunk in &subscription.history {
        copy_chunk(&mut out, chunk).await;
    }

    let exit = match subscription.ended.take() {
        Some(exit) => exit,
        None => {
            let mut stopping = false;
            loop {
                tokio::select! {
                    event = subscription.receiver.recv() => match event {
                        Ok(SessionEvent::Output(chunk)) => copy_chunk(&mut out, &chunk).await,
                        Ok(SessionEvent::Ended(exit)) => break exit,
                        Err(broadcast::error::RecvError::Lagged(n)) => {
                            tracing::warn!("Dropped {} output chunks of {}", n, name);
                        }
                        Err(broadcast::error::RecvError::Closed) => {
                            break ExitInfo {
                                exit_code: None,
                                signal: None,
                                runtime: session.runtime(),
                            };
                        }
                    },
                    _ = cancel.cancelled(), if !stopping => {
                        tracing::info!("Stopping autoboot script {}", name);
                        session.request_stop();
                        stopping = true;
                    }
                }
            }
        }
    };

    let _ = out.flush().await;
    Ok(BootOutcome::Exited { script: name, exit })
}

async fn copy_chunk<W: AsyncWrite + Unpin>(out: &mut W, chunk: &[u8]) {
    if let Err(e) = out.write_all(chunk).await {
        tracing::debug!("Failed to copy script output: {}", e);
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::time::Duration;
    use tempfile::TempDir;

    fn config(dir: &TempDir, shell: &str) -> RunnerConfig {
        let mut config = RunnerConfig::rooted_at(dir.path());
        config.interpreter = "/bin/sh".to_string();
        config.interpreter_args = vec!["-c".to_string(), shell.to_string()];
        config.stop_grace_period = Duration::from_millis(200);
        config.ensure_dirs().unwrap();
        config
    }

    fn designate(config: &RunnerConfig, file: &str, source: &str) {
        std::fs::write(config.scripts_dir.join(file), source).unwrap();
        let autoboot = AutobootRegistrar::new(&config.autoboot_file, &config.scripts_dir);
        autoboot.set(&ScriptName::parse(file).unwrap()).unwrap();
    }

    #[tokio::test]
    async fn test_no_designation_exits_zero() {
        let dir = TempDir::new().unwrap();
        let outcome = run_autoboot_with(config(&dir, "true"), CancellationToken::new(), Vec::new())
            .await
            .unwrap();
        assert_eq!(outcome, BootOutcome::NoDesignation);
        assert_eq!(outcome.exit_code(), 0);
    }

    #[tokio::test]
    async fn test_runs_designated_script_with_its_exit_code() {
        let dir = TempDir::new().unwrap();
        let config = config(&dir, "printf 'booted\\n'; exit 7");
        designate(&config, "boot.py", "print('booted')\n");

        let mut out = Vec::new();
        let outcome = run_autoboot_with(config, CancellationToken::new(), &mut out)
            .await
            .unwrap();

        assert_eq!(outcome.exit_code(), 7);
        assert_eq!(String::from_utf8(out).unwrap(), "booted\n");
        let log = std::fs::read_to_string(dir.path().join("logs/boot.py.log")).unwrap();
        assert!(log.contains("booted\n"));
    }

    #[tokio::test]
    async fn test_missing_and_invalid_scripts_fail() {
        let dir = TempDir::new().unwrap();
        let config = config(&dir, "true");

        designate(&config, "gone.py", "pass\n");
        std::fs::remove_file(config.scripts_dir.join("gone.py")).unwrap();
        let result = run_autoboot_with(config.clone(), CancellationToken::new(), Vec::new()).await;
        assert!(matches!(result, Err(RunnerError::NotFound(_))));

        designate(&config, "bad.py", "import socket\n");
        let result = run_autoboot_with(config, CancellationToken::new(), Vec::new()).await;
        assert!(matches!(result, Err(RunnerError::NotExecutable { .. })));
    }

    #[tokio::test]
    async fn test_cancel_stops_script() {
        let dir = TempDir::new().unwrap();
        let config = config(&dir, "sleep 5");
        designate(&config, "forever.py", "pass\n");

        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(100)).await;
            trigger.cancel();
        });

        let outcome = run_autoboot_with(config, cancel, Vec::new()).await.unwrap();
        assert_eq!(outcome.exit_code(), 128 + crate::signals::SIGTERM);
    }
}
