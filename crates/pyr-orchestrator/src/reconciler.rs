//! External process reconciler
//!
//! Finds guest-script processes that were started outside this service
//! (from a shell, cron, a previous instance) and lets the operator stop
//! them. Nothing is cached; every call reads the process table.

use std::collections::HashSet;
use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use sysinfo::{Pid, ProcessRefreshKind, ProcessesToUpdate, System, UpdateKind};

use pyr_core::ipc::ExternalProcess;
use pyr_core::types::SCRIPT_EXTENSION;
use pyr_core::RunnerError;

use crate::signals::{is_process_alive, send_signal, SIGKILL, SIGTERM};

/// How often liveness is polled while waiting out the grace period
const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Scans the host process table for managed scripts
pub struct Reconciler {
    scripts_dir: PathBuf,
    grace: Duration,
}

impl Reconciler {
    pub fn new(scripts_dir: impl AsRef<Path>, grace: Duration) -> Self {
        let scripts_dir = scripts_dir.as_ref();
        Self {
            scripts_dir: std::fs::canonicalize(scripts_dir)
                .unwrap_or_else(|_| scripts_dir.to_path_buf()),
            grace,
        }
    }

    /// Every process running a managed script that is not in `owned`
    pub fn scan(&self, owned: &HashSet<u32>) -> Vec<ExternalProcess> {
        let mut system = System::new();
        system.refresh_processes_specifics(ProcessesToUpdate::All, true, refresh_kind());

        let own_pid = std::process::id();
        let mut found: Vec<ExternalProcess> = system
            .processes()
            .iter()
            .filter_map(|(pid, process)| {
                let pid = pid.as_u32();
                if pid == own_pid || owned.contains(&pid) {
                    return None;
                }
                let name = self.managed_script(process.cmd(), process.cwd())?;
                Some(ExternalProcess {
                    pid,
                    name,
                    cmdline: join_cmdline(process.cmd()),
                })
            })
            .collect();

        found.sort_by_key(|p| p.pid);
        found
    }

    /// Terminate an external script process
    ///
    /// The pid is checked again right before signalling: it must still run
    /// a managed script and must not belong to a live session. SIGKILL
    /// follows if it outlives the grace period and is still the same
    /// process.
    pub async fn terminate(&self, pid: u32, owned: &HashSet<u32>) -> Result<(), RunnerError> {
        if owned.contains(&pid) || pid == std::process::id() {
            return Err(RunnerError::NotExternal(pid));
        }

        let identity = match self.identify(pid) {
            Identified::Gone => return Err(RunnerError::NotFound(format!("process {}", pid))),
            Identified::Unmanaged => return Err(RunnerError::NotExternal(pid)),
            Identified::Script(identity) => identity,
        };

        tracing::info!("Terminating external process {} ({})", pid, identity.script);
        send_signal(pid, SIGTERM)?;

        let deadline = tokio::time::Instant::now() + self.grace;
        while tokio::time::Instant::now() < deadline {
            if !is_process_alive(pid) {
                return Ok(());
            }
            tokio::time::sleep(POLL_INTERVAL).await;
        }

        if !is_process_alive(pid) {
            return Ok(());
        }
        match self.identify(pid) {
            Identified::Script(current) if current == identity => {
                tracing::debug!("External process {} ignored SIGTERM, killing", pid);
                send_signal(pid, SIGKILL)?;
            }
            _ => tracing::debug!("pid {} no longer runs {}, not killing", pid, identity.script),
        }
        Ok(())
    }

    /// What `pid` is running right now
    fn identify(&self, pid: u32) -> Identified {
        let mut system = System::new();
        let target = Pid::from_u32(pid);
        system.refresh_processes_specifics(
            ProcessesToUpdate::Some(&[target]),
            true,
            refresh_kind(),
        );

        let Some(process) = system.process(target) else {
            return Identified::Gone;
        };
        match self.managed_script(process.cmd(), process.cwd()) {
            Some(script) => Identified::Script(ProcessIdentity {
                start_time: process.start_time(),
                script,
            }),
            None => Identified::Unmanaged,
        }
    }

    /// Name of the managed script a command line runs, if any
    fn managed_script<S: AsRef<OsStr>>(&self, cmd: &[S], cwd: Option<&Path>) -> Option<String> {
        let name = match_script_arg(cmd, cwd, &self.scripts_dir)?;
        self.scripts_dir.join(&name).is_file().then_some(name)
    }
}

/// A pid plus what tells it apart from a later process reusing it
#[derive(Debug, Clone, PartialEq, Eq)]
struct ProcessIdentity {
    start_time: u64,
    script: String,
}

#[derive(Debug, PartialEq, Eq)]
enum Identified {
    Gone,
    Unmanaged,
    Script(ProcessIdentity),
}

fn refresh_kind() -> ProcessRefreshKind {
    ProcessRefreshKind::new()
        .with_cmd(UpdateKind::Always)
        .with_cwd(UpdateKind::Always)
}

fn join_cmdline<S: AsRef<OsStr>>(cmd: &[S]) -> String {
    cmd.iter()
        .map(|a| a.as_ref().to_string_lossy())
        .collect::<Vec<_>>()
        .join(" ")
}

/// First argument naming a `.py` file directly inside `scripts_dir`
///
/// Relative arguments are resolved against the process's working
/// directory. `scripts_dir` must already be canonical.
pub fn match_script_arg<S: AsRef<OsStr>>(
    cmd: &[S],
    cwd: Option<&Path>,
    scripts_dir: &Path,
) -> Option<String> {
    // argv[0] is the interpreter
    cmd.iter().skip(1).find_map(|arg| {
        let arg = Path::new(arg.as_ref());
        if arg.extension() != Some(OsStr::new(SCRIPT_EXTENSION)) {
            return None;
        }

        let full = if arg.is_absolute() {
            arg.to_path_buf()
        } else {
            cwd?.join(arg)
        };
        let full = std::fs::canonicalize(&full).unwrap_or(full);

        if full.parent() != Some(scripts_dir) {
            return None;
        }
        full.file_name()?.to_str().map(str::to_string)
    })
}
