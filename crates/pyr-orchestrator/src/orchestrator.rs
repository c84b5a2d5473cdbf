//! Execution orchestrator
//!
//! Owns the name → session map. A name maps to at most one live session.
//! A start first reserves the name through the map's entry API, then
//! re-reads the verdict and spawns outside the map lock, so concurrent
//! starts of the same script yield exactly one child and a reserved script
//! cannot be deleted or replaced before it runs.

use std::collections::HashSet;
use std::process::Stdio;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::{Child, Command};
use tokio::task::JoinHandle;

use pyr_core::config::RunnerConfig;
use pyr_core::ipc::RunningScript;
use pyr_core::time::{format_runtime, log_timestamp};
use pyr_core::{RunnerError, ScriptName};

use crate::registry::ScriptRegistry;
use crate::session::{ExecutionSession, ExitInfo, SessionEvent, Subscription};
use crate::signals::{send_signal, SIGTERM};

const READ_CHUNK: usize = 4096;

/// How long to wait for the output pipes to drain after the child exits.
/// Grandchildren can keep them open indefinitely.
const DRAIN_TIMEOUT: Duration = Duration::from_secs(1);

/// A name's entry in the session map
enum Slot {
    /// Reserved by a start that is checking the verdict and spawning
    Starting,
    Live(Arc<ExecutionSession>),
}

impl Slot {
    fn live(&self) -> Option<&Arc<ExecutionSession>> {
        match self {
            Slot::Starting => None,
            Slot::Live(session) => Some(session),
        }
    }
}

/// Spawns, tracks and stops guest script processes
pub struct Orchestrator {
    config: Arc<RunnerConfig>,
    registry: Arc<ScriptRegistry>,
    sessions: DashMap<ScriptName, Slot>,
    next_id: AtomicU64,
}

impl Orchestrator {
    pub fn new(config: Arc<RunnerConfig>, registry: Arc<ScriptRegistry>) -> Self {
        Self {
            config,
            registry,
            sessions: DashMap::new(),
            next_id: AtomicU64::new(1),
        }
    }

    /// Start `name` as a child process
    ///
    /// Fails with `NotFound`, `NotExecutable`, `AlreadyRunning` or
    /// `ProcessSpawnFailure`. The returned session already has its
    /// supervisor running.
    pub fn start(self: &Arc<Self>, name: &ScriptName) -> Result<Arc<ExecutionSession>, RunnerError> {
        match self.sessions.entry(name.clone()) {
            Entry::Occupied(_) => return Err(RunnerError::AlreadyRunning(name.to_string())),
            Entry::Vacant(slot) => {
                slot.insert(Slot::Starting);
            }
        }

        let (session, child) = match self.check_and_spawn(name) {
            Ok(spawned) => spawned,
            Err(e) => {
                self.sessions
                    .remove_if(name, |_, slot| matches!(slot, Slot::Starting));
                return Err(e);
            }
        };
        self.sessions
            .insert(name.clone(), Slot::Live(Arc::clone(&session)));

        tracing::info!(
            "Started {} (pid {}, session {})",
            name,
            session.pid(),
            session.id()
        );
        self.supervise(Arc::clone(&session), child);
        Ok(session)
    }

    /// Ask a running script to stop
    ///
    /// Returns immediately; the exit is observed through the session's
    /// `Ended` event.
    pub fn stop(&self, name: &ScriptName) -> Result<(), RunnerError> {
        let session = self.get(name)?;
        session.request_stop();
        Ok(())
    }

    /// Queue bytes verbatim for a running script's stdin
    ///
    /// Returns once the bytes are queued; a script that does not read its
    /// input fills the queue and further input fails with `InputBacklog`.
    pub fn send_input(&self, name: &ScriptName, data: &[u8]) -> Result<(), RunnerError> {
        let session = self.get(name)?;
        session.queue_input(data)
    }

    /// Attach to a running script: history so far plus everything after
    pub fn watch(
        &self,
        name: &ScriptName,
    ) -> Result<(Arc<ExecutionSession>, Subscription), RunnerError> {
        let session = self.get(name)?;
        let subscription = session.subscribe();
        Ok((session, subscription))
    }

    /// Live session for `name`
    pub fn get(&self, name: &ScriptName) -> Result<Arc<ExecutionSession>, RunnerError> {
        self.sessions
            .get(name)
            .and_then(|slot| slot.live().cloned())
            .ok_or_else(|| RunnerError::NotRunning(name.to_string()))
    }

    pub fn is_running(&self, name: &ScriptName) -> bool {
        self.sessions
            .get(name)
            .is_some_and(|slot| slot.live().is_some())
    }

    /// Status of one script, `None` when idle
    pub fn status(&self, name: &ScriptName) -> Option<RunningScript> {
        self.get(name).ok().map(|s| s.running_script())
    }

    /// Every live session, sorted by name
    pub fn status_all(&self) -> Vec<RunningScript> {
        let mut running: Vec<RunningScript> = self
            .live_sessions()
            .iter()
            .map(|s| s.running_script())
            .collect();
        running.sort_by(|a, b| a.script.cmp(&b.script));
        running
    }

    /// Pids of every child this orchestrator owns
    pub fn owned_pids(&self) -> HashSet<u32> {
        self.live_sessions().iter().map(|s| s.pid()).collect()
    }

    /// Number of live sessions
    pub fn len(&self) -> usize {
        self.live_sessions().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn live_sessions(&self) -> Vec<Arc<ExecutionSession>> {
        self.sessions
            .iter()
            .filter_map(|slot| slot.live().cloned())
            .collect()
    }

    /// Run `f` while `name` is guaranteed to have no session
    ///
    /// The entry for `name` stays locked until `f` returns, so a concurrent
    /// start waits. `f` must not call back into the orchestrator.
    pub fn while_idle<T>(
        &self,
        name: &ScriptName,
        f: impl FnOnce() -> Result<T, RunnerError>,
    ) -> Result<T, RunnerError> {
        match self.sessions.entry(name.clone()) {
            Entry::Occupied(_) => Err(RunnerError::Busy(name.to_string())),
            Entry::Vacant(_slot) => f(),
        }
    }

    /// Run `f` while no start of `name` is between its verdict check and
    /// its spawn
    ///
    /// A live session does not block `f`. Same locking rules as
    /// [`Self::while_idle`].
    pub fn while_not_starting<T>(
        &self,
        name: &ScriptName,
        f: impl FnOnce() -> Result<T, RunnerError>,
    ) -> Result<T, RunnerError> {
        match self.sessions.entry(name.clone()) {
            Entry::Occupied(slot) if matches!(slot.get(), Slot::Starting) => {
                Err(RunnerError::Busy(name.to_string()))
            }
            _ => f(),
        }
    }

    /// Stop every session and wait up to `timeout` for them to exit
    pub async fn shutdown(&self, timeout: Duration) {
        let sessions = self.live_sessions();
        if sessions.is_empty() {
            return;
        }

        tracing::info!("Stopping {} running scripts", sessions.len());
        let mut waiters = Vec::with_capacity(sessions.len());
        for session in sessions {
            let subscription = session.subscribe();
            session.request_stop();
            waiters.push(wait_for_exit(subscription));
        }

        if tokio::time::timeout(timeout, futures::future::join_all(waiters))
            .await
            .is_err()
        {
            tracing::warn!("{} scripts still running at shutdown", self.len());
        }
    }

    /// Verdict check and spawn for a reserved name
    fn check_and_spawn(
        &self,
        name: &ScriptName,
    ) -> Result<(Arc<ExecutionSession>, Child), RunnerError> {
        let verdict = self.registry.verdict(name)?;
        if !verdict.is_executable() {
            return Err(RunnerError::not_executable(
                name.as_str(),
                verdict.errors,
                verdict.missing_deps,
            ));
        }
        self.spawn(name)
    }

    fn spawn(&self, name: &ScriptName) -> Result<(Arc<ExecutionSession>, Child), RunnerError> {
        let path = self.registry.script_path(name);

        let mut command = Command::new(&self.config.interpreter);
        command
            .args(&self.config.interpreter_args)
            .arg(&path)
            .current_dir(&self.config.scripts_dir)
            .env("PYTHONUNBUFFERED", "1")
            .env("TERM", "xterm")
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = command
            .spawn()
            .map_err(|source| RunnerError::ProcessSpawnFailure {
                name: name.to_string(),
                source,
            })?;

        let Some(pid) = child.id() else {
            return Err(RunnerError::ProcessSpawnFailure {
                name: name.to_string(),
                source: std::io::Error::new(std::io::ErrorKind::Other, "child exited at spawn"),
            });
        };

        let session = Arc::new(ExecutionSession::new(
            self.next_id.fetch_add(1, Ordering::Relaxed),
            name.clone(),
            pid,
            child.stdin.take(),
            self.config.replay_buffer_bytes,
        ));
        Ok((session, child))
    }

    /// Forward output, wait for exit (or stop), persist the log, remove the
    /// session, then tell subscribers
    fn supervise(self: &Arc<Self>, session: Arc<ExecutionSession>, mut child: Child) {
        let mut readers: Vec<JoinHandle<()>> = Vec::with_capacity(2);
        if let Some(stdout) = child.stdout.take() {
            readers.push(spawn_reader(Arc::clone(&session), stdout));
        }
        if let Some(stderr) = child.stderr.take() {
            readers.push(spawn_reader(Arc::clone(&session), stderr));
        }

        let orchestrator = Arc::clone(self);
        let grace = self.config.stop_grace_period;
        tokio::spawn(async move {
            let status = tokio::select! {
                status = child.wait() => status,
                _ = session.stop_token().cancelled() => {
                    terminate_child(&mut child, session.pid(), grace).await
                }
            };

            let status = match status {
                Ok(status) => Some(status),
                Err(e) => {
                    tracing::error!("Failed to wait for {}: {}", session.name(), e);
                    None
                }
            };

            for reader in readers {
                let abort = reader.abort_handle();
                if tokio::time::timeout(DRAIN_TIMEOUT, reader).await.is_err() {
                    abort.abort();
                }
            }
            session.close_input();

            let exit = ExitInfo::from_status(status, session.runtime());
            orchestrator.persist_log(&session, &exit).await;

            // Remove before notifying so a subscriber can restart at once
            orchestrator.sessions.remove_if(session.name(), |_, slot| {
                slot.live().is_some_and(|s| s.id() == session.id())
            });

            tracing::info!(
                "{} exited (code {:?}, signal {:?}) after {}",
                session.name(),
                exit.exit_code,
                exit.signal,
                format_runtime(exit.runtime)
            );
            session.hub().finish(exit);
        });
    }

    async fn persist_log(&self, session: &ExecutionSession, exit: &ExitInfo) {
        let (output, truncated) = session.hub().contents();
        let name = session.name();

        let mut content = format!(
            "=== Execution Log for {} ===\nTimestamp: {}\n{}\n\n",
            name,
            log_timestamp(&session.started_at()),
            "=".repeat(50)
        );
        if truncated {
            content.push_str("[earlier output truncated]\n");
        }
        content.push_str(&String::from_utf8_lossy(&output));
        if !content.ends_with('\n') {
            content.push('\n');
        }
        content.push_str(&format!(
            "\n=== Exited (code {}, signal {}) after {} ===\n",
            exit.exit_code.map_or_else(|| "-".to_string(), |c| c.to_string()),
            exit.signal.map_or_else(|| "-".to_string(), |s| s.to_string()),
            format_runtime(exit.runtime)
        ));

        let path = self.registry.log_path(name);
        let result = async {
            if let Some(parent) = path.parent() {
                tokio::fs::create_dir_all(parent).await?;
            }
            tokio::fs::write(&path, content).await
        }
        .await;

        if let Err(e) = result {
            tracing::error!("Failed to write log {}: {}", path.display(), e);
        }
    }
}

/// SIGTERM, then SIGKILL once `grace` has passed
async fn terminate_child(
    child: &mut Child,
    pid: u32,
    grace: Duration,
) -> std::io::Result<std::process::ExitStatus> {
    if let Err(e) = send_signal(pid, SIGTERM) {
        tracing::warn!("Failed to send SIGTERM to {}: {}", pid, e);
    }

    match tokio::time::timeout(grace, child.wait()).await {
        Ok(status) => status,
        Err(_) => {
            tracing::debug!("pid {} ignored SIGTERM, killing", pid);
            if let Err(e) = child.start_kill() {
                tracing::warn!("Failed to kill {}: {}", pid, e);
            }
            child.wait().await
        }
    }
}

fn spawn_reader<R>(session: Arc<ExecutionSession>, mut stream: R) -> JoinHandle<()>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut buf = vec![0u8; READ_CHUNK];
        loop {
            match stream.read(&mut buf).await {
                Ok(0) => break,
                Ok(n) => session.hub().publish(Bytes::copy_from_slice(&buf[..n])),
                Err(e) => {
                    tracing::debug!("Output stream for {} closed: {}", session.name(), e);
                    break;
                }
            }
        }
    })
}

/// Wait until a subscription sees the session end
pub async fn wait_for_exit(mut subscription: Subscription) -> Option<ExitInfo> {
    if let Some(exit) = subscription.ended.take() {
        return Some(exit);
    }

    loop {
        match subscription.receiver.recv().await {
            Ok(SessionEvent::Ended(exit)) => return Some(exit),
            Ok(SessionEvent::Output(_)) => {}
            Err(tokio::sync::broadcast::error::RecvError::Lagged(_)) => {}
            Err(tokio::sync::broadcast::error::RecvError::Closed) => return None,
        }
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn setup(shell: &str) -> (TempDir, Arc<Orchestrator>, Arc<ScriptRegistry>) {
        let dir = TempDir::new().unwrap();
        let mut config = RunnerConfig::rooted_at(dir.path());
        config.interpreter = "/bin/sh".to_string();
        config.interpreter_args = vec!["-c".to_string(), shell.to_string()];
        config.stop_grace_period = Duration::from_millis(200);
        config.ensure_dirs().unwrap();

        let config = Arc::new(config);
        let registry = Arc::new(ScriptRegistry::new(&config));
        let orchestrator = Arc::new(Orchestrator::new(config, Arc::clone(&registry)));
        (dir, orchestrator, registry)
    }

    fn add_script(registry: &ScriptRegistry, file: &str, source: &str) -> ScriptName {
        let outcome = registry.save_upload(file, source.as_bytes()).unwrap();
        assert!(outcome.saved_to.is_some(), "{:?}", outcome.verdict.errors);
        outcome.name
    }

    async fn collect_output(mut subscription: Subscription) -> (String, Option<ExitInfo>) {
        let mut out: Vec<u8> = subscription.history.concat();
        if let Some(exit) = subscription.ended.take() {
            return (String::from_utf8_lossy(&out).into_owned(), Some(exit));
        }
        loop {
            match subscription.receiver.recv().await {
                Ok(SessionEvent::Output(chunk)) => out.extend_from_slice(&chunk),
                Ok(SessionEvent::Ended(exit)) => {
                    return (String::from_utf8_lossy(&out).into_owned(), Some(exit))
                }
                Err(_) => return (String::from_utf8_lossy(&out).into_owned(), None),
            }
        }
    }

    #[tokio::test]
    async fn test_runs_to_completion_and_writes_log() {
        let (dir, orchestrator, registry) = setup("printf 'hello\\n'; exit 3");
        let name = add_script(&registry, "hello.py", "print('hello')\n");

        let session = orchestrator.start(&name).unwrap();
        let (output, exit) = collect_output(session.subscribe()).await;
        let exit = exit.unwrap();

        assert_eq!(output, "hello\n");
        assert_eq!(exit.exit_code, Some(3));
        assert!(!orchestrator.is_running(&name));

        let log = std::fs::read_to_string(dir.path().join("logs/hello.py.log")).unwrap();
        assert!(log.starts_with("=== Execution Log for hello.py ===\nTimestamp: "));
        assert!(log.contains(&format!("{}\n\nhello\n", "=".repeat(50))));
    }

    #[tokio::test]
    async fn test_stderr_is_forwarded() {
        let (_dir, orchestrator, registry) = setup("printf 'oops\\n' >&2");
        let name = add_script(&registry, "err.py", "pass\n");

        let session = orchestrator.start(&name).unwrap();
        let (output, _) = collect_output(session.subscribe()).await;
        assert_eq!(output, "oops\n");
    }

    #[tokio::test]
    async fn test_environment_and_cwd() {
        let (dir, orchestrator, registry) =
            setup("printf '%s %s %s\\n' \"$PYTHONUNBUFFERED\" \"$TERM\" \"$(pwd -P)\"");
        let name = add_script(&registry, "env.py", "pass\n");

        let session = orchestrator.start(&name).unwrap();
        let (output, _) = collect_output(session.subscribe()).await;

        let code_dir = std::fs::canonicalize(dir.path().join("code")).unwrap();
        assert_eq!(output, format!("1 xterm {}\n", code_dir.display()));
    }

    #[tokio::test]
    async fn test_script_path_is_passed_last() {
        let (dir, orchestrator, registry) = setup("printf '%s\\n' \"$0\"");
        let name = add_script(&registry, "argv.py", "pass\n");

        let session = orchestrator.start(&name).unwrap();
        let (output, _) = collect_output(session.subscribe()).await;
        assert_eq!(
            output.trim(),
            dir.path().join("code/argv.py").display().to_string()
        );
    }

    #[tokio::test]
    async fn test_input_reaches_stdin() {
        let (_dir, orchestrator, registry) = setup("read line; printf 'got %s\\n' \"$line\"");
        let name = add_script(&registry, "echo.py", "x = input()\n");

        let session = orchestrator.start(&name).unwrap();
        let subscription = session.subscribe();
        orchestrator.send_input(&name, b"ping\n").unwrap();

        let (output, _) = collect_output(subscription).await;
        assert_eq!(output, "got ping\n");
    }

    #[tokio::test]
    async fn test_double_start_is_rejected() {
        let (_dir, orchestrator, registry) = setup("sleep 5");
        let name = add_script(&registry, "sleepy.py", "pass\n");

        let first = orchestrator.start(&name).unwrap();
        let second = orchestrator.start(&name);
        assert!(matches!(second, Err(RunnerError::AlreadyRunning(_))));
        assert_eq!(orchestrator.len(), 1);

        orchestrator.stop(&name).unwrap();
        wait_for_exit(first.subscribe()).await;
    }

    #[tokio::test]
    async fn test_concurrent_starts_create_one_session() {
        let (_dir, orchestrator, registry) = setup("sleep 5");
        let name = add_script(&registry, "race.py", "pass\n");

        let mut tasks = Vec::new();
        for _ in 0..8 {
            let orchestrator = Arc::clone(&orchestrator);
            let name = name.clone();
            tasks.push(tokio::spawn(async move { orchestrator.start(&name).is_ok() }));
        }

        let mut started = 0;
        for task in tasks {
            if task.await.unwrap() {
                started += 1;
            }
        }
        assert_eq!(started, 1);
        assert_eq!(orchestrator.len(), 1);

        orchestrator.shutdown(Duration::from_secs(5)).await;
        assert!(orchestrator.is_empty());
    }

    #[tokio::test]
    async fn test_stop_then_restart() {
        let (_dir, orchestrator, registry) = setup("sleep 5");
        let name = add_script(&registry, "loop.py", "pass\n");

        let session = orchestrator.start(&name).unwrap();
        let subscription = session.subscribe();
        orchestrator.stop(&name).unwrap();
        // Repeated stop while stopping is harmless
        let _ = orchestrator.stop(&name);

        let exit = wait_for_exit(subscription).await.unwrap();
        assert_eq!(exit.signal, Some(SIGTERM));
        assert!(!orchestrator.is_running(&name));

        let again = orchestrator.start(&name).unwrap();
        assert_ne!(again.id(), session.id());
        orchestrator.stop(&name).unwrap();
        wait_for_exit(again.subscribe()).await;
    }

    #[tokio::test]
    async fn test_sigterm_ignored_escalates_to_kill() {
        let (_dir, orchestrator, registry) =
            setup("trap '' TERM; printf 'ready\\n'; while true; do sleep 0.05; done");
        let name = add_script(&registry, "stubborn.py", "pass\n");

        let session = orchestrator.start(&name).unwrap();
        let mut subscription = session.subscribe();
        // Wait for the trap to be installed
        if subscription.history.is_empty() {
            let _ = subscription.receiver.recv().await;
        }

        orchestrator.stop(&name).unwrap();
        let exit = wait_for_exit(session.subscribe()).await.unwrap();
        assert_eq!(exit.signal, Some(crate::signals::SIGKILL));
    }

    #[tokio::test]
    async fn test_errors_for_unknown_and_idle_scripts() {
        let (_dir, orchestrator, registry) = setup("true");
        let missing = ScriptName::parse("missing.py").unwrap();
        assert!(matches!(orchestrator.start(&missing), Err(RunnerError::NotFound(_))));

        let idle = add_script(&registry, "idle.py", "pass\n");
        assert!(matches!(orchestrator.stop(&idle), Err(RunnerError::NotRunning(_))));
        assert!(matches!(
            orchestrator.send_input(&idle, b"x"),
            Err(RunnerError::NotRunning(_))
        ));
        assert!(matches!(orchestrator.watch(&idle), Err(RunnerError::NotRunning(_))));
        assert!(orchestrator.status(&idle).is_none());
    }

    #[tokio::test]
    async fn test_not_executable_carries_missing_deps() {
        let (_dir, orchestrator, registry) = setup("true");
        let name = add_script(&registry, "main.py", "import helper\n");

        match orchestrator.start(&name) {
            Err(RunnerError::NotExecutable { reason, .. }) => match *reason {
                RunnerError::MissingDependency(missing) => assert_eq!(missing, vec!["helper"]),
                other => panic!("unexpected reason: {:?}", other),
            },
            other => panic!("unexpected: {:?}", other.map(|s| s.pid())),
        }
        // A failed start releases its reservation
        assert!(!orchestrator.is_running(&name));
        assert!(orchestrator.while_idle(&name, || Ok(())).is_ok());
    }

    #[tokio::test]
    async fn test_start_sees_file_replaced_before_it() {
        let (_dir, orchestrator, registry) = setup("true");
        let name = add_script(&registry, "swap.py", "pass\n");
        // Prime the verdict cache with the clean version
        assert!(registry.verdict(&name).unwrap().is_executable());

        std::fs::write(registry.script_path(&name), "import socket\n").unwrap();
        match orchestrator.start(&name) {
            Err(RunnerError::NotExecutable { reason, .. }) => {
                assert!(matches!(*reason, RunnerError::ValidationFailure { .. }))
            }
            other => panic!("unexpected: {:?}", other.map(|s| s.pid())),
        }
    }

    #[tokio::test]
    async fn test_reserved_name_blocks_replacement() {
        let (_dir, orchestrator, registry) = setup("sleep 5");
        let name = add_script(&registry, "held.py", "pass\n");

        orchestrator.sessions.insert(name.clone(), Slot::Starting);
        assert!(!orchestrator.is_running(&name));
        assert!(orchestrator.status_all().is_empty());
        assert!(matches!(
            orchestrator.start(&name),
            Err(RunnerError::AlreadyRunning(_))
        ));
        assert!(matches!(
            orchestrator.while_not_starting(&name, || Ok(())),
            Err(RunnerError::Busy(_))
        ));
        assert!(matches!(
            orchestrator.while_idle(&name, || Ok(())),
            Err(RunnerError::Busy(_))
        ));
        orchestrator.sessions.remove(&name);

        // A live session does not block replacement
        let session = orchestrator.start(&name).unwrap();
        assert!(orchestrator.while_not_starting(&name, || Ok(())).is_ok());
        orchestrator.stop(&name).unwrap();
        wait_for_exit(session.subscribe()).await;
    }

    #[tokio::test]
    async fn test_input_to_script_not_reading_is_refused_not_blocked() {
        let (_dir, orchestrator, registry) = setup("sleep 5");
        let name = add_script(&registry, "deaf.py", "pass\n");
        let session = orchestrator.start(&name).unwrap();

        let big = vec![b'x'; 256 * 1024];
        let mut refused = None;
        for attempt in 0..crate::session::INPUT_QUEUE_DEPTH + 2 {
            if let Err(e) = orchestrator.send_input(&name, &big) {
                refused = Some((attempt, e));
                break;
            }
        }
        assert!(matches!(refused, Some((_, RunnerError::InputBacklog(_)))));

        // Stopping still works while the writer is stuck on the pipe
        let subscription = session.subscribe();
        orchestrator.stop(&name).unwrap();
        let exit = tokio::time::timeout(Duration::from_secs(5), wait_for_exit(subscription))
            .await
            .unwrap();
        assert!(exit.is_some());
    }

    #[tokio::test]
    async fn test_late_watcher_gets_full_history() {
        let (_dir, orchestrator, registry) =
            setup("printf 'first\\n'; read _go; printf 'second\\n'");
        let name = add_script(&registry, "late.py", "pass\n");

        let session = orchestrator.start(&name).unwrap();
        // Wait until the first line has been produced
        let early = session.subscribe();
        let mut receiver = early.receiver;
        if early.history.is_empty() {
            let _ = receiver.recv().await;
        }

        let (_, watcher) = orchestrator.watch(&name).unwrap();
        orchestrator.send_input(&name, b"go\n").unwrap();

        let (output, _) = collect_output(watcher).await;
        assert_eq!(output, "first\nsecond\n");
    }

    #[tokio::test]
    async fn test_while_idle_rejects_running_script() {
        let (_dir, orchestrator, registry) = setup("sleep 5");
        let name = add_script(&registry, "busy.py", "pass\n");

        let session = orchestrator.start(&name).unwrap();
        let result = orchestrator.while_idle(&name, || Ok(()));
        assert!(matches!(result, Err(RunnerError::Busy(_))));
        assert_eq!(orchestrator.status_all().len(), 1);
        assert_eq!(orchestrator.owned_pids(), HashSet::from([session.pid()]));

        orchestrator.stop(&name).unwrap();
        wait_for_exit(session.subscribe()).await;
        assert!(orchestrator.while_idle(&name, || Ok(42)).is_ok());
    }
}
