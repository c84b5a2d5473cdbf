//! Shared service state

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use pyr_core::config::RunnerConfig;
use pyr_core::ipc::{ExternalProcess, ScriptRecord};
use pyr_core::{AutobootRegistrar, RunnerError, ScriptName};

use crate::orchestrator::Orchestrator;
use crate::reconciler::Reconciler;
use crate::registry::{ScriptRegistry, UploadOutcome};

/// Everything the HTTP and websocket handlers need
pub struct AppState {
    /// Configuration
    pub config: Arc<RunnerConfig>,
    /// Managed scripts directory
    pub registry: Arc<ScriptRegistry>,
    /// Live sessions
    pub orchestrator: Arc<Orchestrator>,
    /// External process scanner
    pub reconciler: Arc<Reconciler>,
    /// Boot designation
    pub autoboot: Arc<AutobootRegistrar>,
    /// Host name reported to clients
    pub hostname: String,
    /// Fired to stop the server and close open websockets
    shutdown: CancellationToken,
}

impl AppState {
    pub fn new(config: RunnerConfig) -> Self {
        let config = Arc::new(config);
        let registry = Arc::new(ScriptRegistry::new(&config));
        let orchestrator = Arc::new(Orchestrator::new(
            Arc::clone(&config),
            Arc::clone(&registry),
        ));
        let reconciler = Arc::new(Reconciler::new(
            &config.scripts_dir,
            config.stop_grace_period,
        ));
        let autoboot = Arc::new(AutobootRegistrar::new(
            &config.autoboot_file,
            &config.scripts_dir,
        ));

        Self {
            config,
            registry,
            orchestrator,
            reconciler,
            autoboot,
            hostname: local_hostname(),
            shutdown: CancellationToken::new(),
        }
    }

    /// Token that stops the server when cancelled
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Records for every script in the managed directory
    pub fn list_scripts(&self) -> Result<Vec<ScriptRecord>, RunnerError> {
        let autoboot = self.autoboot.get()?;
        self.registry
            .list(|name| self.orchestrator.is_running(name), autoboot.as_deref())
    }

    /// Record for one script
    pub fn script_record(&self, name: &ScriptName) -> Result<ScriptRecord, RunnerError> {
        let autoboot = self.autoboot.get()?;
        self.registry.record(
            name,
            self.orchestrator.is_running(name),
            autoboot.as_deref(),
        )
    }

    /// Validate and save an uploaded script
    ///
    /// Waits out a start of the same name that is still checking its
    /// verdict, so a start never runs a file it did not validate.
    pub fn save_upload(&self, file_name: &str, bytes: &[u8]) -> Result<UploadOutcome, RunnerError> {
        let name = ScriptName::parse(file_name)?;
        self.orchestrator
            .while_not_starting(&name, || self.registry.save_upload(file_name, bytes))
    }

    /// Remove an idle script, its log, and its autoboot designation
    pub fn delete_script(&self, name: &ScriptName) -> Result<(), RunnerError> {
        self.orchestrator.while_idle(name, || {
            self.registry.delete(name)?;
            if self.autoboot.clear_if(name.as_str())? {
                tracing::info!("Cleared autoboot designation of deleted {}", name);
            }
            Ok(())
        })
    }

    /// Designate or clear `name` as the boot script
    ///
    /// Clearing only removes the designation when it currently names
    /// `name`. Returns the designation afterwards.
    pub fn set_autoboot(
        &self,
        name: &ScriptName,
        enabled: bool,
    ) -> Result<Option<String>, RunnerError> {
        if enabled {
            self.autoboot.set(name)?;
        } else {
            self.autoboot.clear_if(name.as_str())?;
        }
        self.autoboot.get()
    }

    /// Guest script processes this service does not own
    pub async fn external_processes(&self) -> Vec<ExternalProcess> {
        let owned = self.orchestrator.owned_pids();
        let reconciler = Arc::clone(&self.reconciler);
        match tokio::task::spawn_blocking(move || reconciler.scan(&owned)).await {
            Ok(found) => found,
            Err(e) => {
                tracing::warn!("Process scan failed: {}", e);
                Vec::new()
            }
        }
    }

    /// Terminate an external guest script process
    pub async fn stop_external(&self, pid: u32) -> Result<(), RunnerError> {
        let owned = self.orchestrator.owned_pids();
        self.reconciler.terminate(pid, &owned).await
    }
}

fn local_hostname() -> String {
    gethostname::gethostname().to_string_lossy().into_owned()
}
