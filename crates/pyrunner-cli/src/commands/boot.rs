//! Boot command implementation

use anyhow::Result;
use tokio_util::sync::CancellationToken;

use pyr_core::config::RunnerConfig;
use pyr_core::time::format_runtime;
use pyr_core::RunnerError;
use pyr_orchestrator::launcher::{run_autoboot, BootOutcome};
use pyr_orchestrator::signals;

use crate::output::{print_error, print_info};

/// Run the autoboot script once and return the exit code to use
pub async fn boot_command(config: RunnerConfig) -> Result<i32> {
    let cancel = CancellationToken::new();
    signals::cancel_on_shutdown_signal(cancel.clone());

    match run_autoboot(config, cancel).await {
        Ok(outcome) => {
            match &outcome {
                BootOutcome::NoDesignation => print_info("No autoboot script configured"),
                BootOutcome::Exited { script, exit } => tracing::info!(
                    "{} exited (code {:?}, signal {:?}) after {}",
                    script,
                    exit.exit_code,
                    exit.signal,
                    format_runtime(exit.runtime)
                ),
            }
            Ok(outcome.exit_code())
        }
        Err(RunnerError::NotExecutable { name, reason }) => {
            print_error(&format!("Autoboot script {} is not executable", name));
            match *reason {
                RunnerError::ValidationFailure { errors } => {
                    for error in &errors {
                        eprintln!("  {}", error);
                    }
                }
                other => eprintln!("  {}", other),
            }
            Ok(1)
        }
        Err(e) => {
            print_error(&format!("Autoboot failed: {}", e));
            Ok(1)
        }
    }
}
