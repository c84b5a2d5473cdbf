//! A live execution of one script

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use bytes::Bytes;
use chrono::{DateTime, Utc};
use tokio::io::AsyncWriteExt;
use tokio::process::ChildStdin;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio_util::sync::CancellationToken;

use pyr_core::ipc::RunningScript;
use pyr_core::{RunnerError, ScriptName};

use super::hub::{OutputHub, Subscription};

/// Input messages queued per session before further input is refused
pub const INPUT_QUEUE_DEPTH: usize = 32;

/// How a session's process ended
#[derive(Debug, Clone, PartialEq)]
pub struct ExitInfo {
    /// Exit status, when the process exited normally
    pub exit_code: Option<i32>,
    /// Terminating signal, when it was killed
    pub signal: Option<i32>,
    /// Wall time from spawn to exit
    pub runtime: Duration,
}

impl ExitInfo {
    pub fn from_status(status: Option<std::process::ExitStatus>, runtime: Duration) -> Self {
        let exit_code = status.and_then(|s| s.code());

        #[cfg(unix)]
        let signal = {
            use std::os::unix::process::ExitStatusExt;
            status.and_then(|s| s.signal())
        };
        #[cfg(not(unix))]
        let signal = None;

        Self {
            exit_code,
            signal,
            runtime,
        }
    }

    /// Code the boot launcher exits with
    pub fn shell_code(&self) -> i32 {
        match (self.exit_code, self.signal) {
            (Some(code), _) => code,
            (None, Some(signal)) => 128 + signal,
            (None, None) => 1,
        }
    }
}

/// Lifecycle of a live session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Running,
    Stopping,
}

/// One running child process and everything attached to it
pub struct ExecutionSession {
    id: u64,
    name: ScriptName,
    pid: u32,
    started_at: DateTime<Utc>,
    started: Instant,
    hub: OutputHub,
    /// Feeds the stdin writer task; `None` when the child has no stdin
    input: Option<mpsc::Sender<Bytes>>,
    input_closed: CancellationToken,
    stop: CancellationToken,
    stopping: AtomicBool,
}

impl ExecutionSession {
    pub(crate) fn new(
        id: u64,
        name: ScriptName,
        pid: u32,
        stdin: Option<ChildStdin>,
        replay_limit: usize,
    ) -> Self {
        let input_closed = CancellationToken::new();
        let input = stdin.map(|pipe| {
            let (tx, rx) = mpsc::channel(INPUT_QUEUE_DEPTH);
            tokio::spawn(write_stdin(name.clone(), pipe, rx, input_closed.clone()));
            tx
        });

        Self {
            id,
            name,
            pid,
            started_at: Utc::now(),
            started: Instant::now(),
            hub: OutputHub::new(replay_limit),
            input,
            input_closed,
            stop: CancellationToken::new(),
            stopping: AtomicBool::new(false),
        }
    }

    /// Distinguishes successive sessions of the same script
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn name(&self) -> &ScriptName {
        &self.name
    }

    pub fn pid(&self) -> u32 {
        self.pid
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    pub fn runtime(&self) -> Duration {
        self.started.elapsed()
    }

    pub fn state(&self) -> SessionState {
        if self.stopping.load(Ordering::Acquire) {
            SessionState::Stopping
        } else {
            SessionState::Running
        }
    }

    pub fn hub(&self) -> &OutputHub {
        &self.hub
    }

    /// Snapshot the output so far and follow what comes next
    pub fn subscribe(&self) -> Subscription {
        self.hub.subscribe()
    }

    /// Ask the supervisor to stop the process. Repeated calls are no-ops.
    pub fn request_stop(&self) {
        if !self.stopping.swap(true, Ordering::AcqRel) {
            tracing::info!("Stopping {} (pid {})", self.name, self.pid);
        }
        self.stop.cancel();
    }

    pub(crate) fn stop_token(&self) -> &CancellationToken {
        &self.stop
    }

    /// Queue `data` for the child's stdin
    ///
    /// Never waits on the pipe. Fails with `InputBacklog` when the child
    /// is not draining its input and `InputClosed` once the pipe is gone.
    pub fn queue_input(&self, data: &[u8]) -> Result<(), RunnerError> {
        let Some(input) = &self.input else {
            return Err(RunnerError::NotRunning(self.name.to_string()));
        };
        if self.input_closed.is_cancelled() {
            return Err(RunnerError::InputClosed(self.name.to_string()));
        }

        match input.try_send(Bytes::copy_from_slice(data)) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(_)) => Err(RunnerError::InputBacklog(self.name.to_string())),
            Err(TrySendError::Closed(_)) => Err(RunnerError::InputClosed(self.name.to_string())),
        }
    }

    /// Close stdin so the child sees EOF, dropping queued input
    pub(crate) fn close_input(&self) {
        self.input_closed.cancel();
    }

    /// Status as reported to clients
    pub fn running_script(&self) -> RunningScript {
        RunningScript {
            script: self.name.to_string(),
            pid: self.pid,
            start_time: self.started_at,
            runtime: pyr_core::time::runtime_secs(self.runtime()),
        }
    }
}

/// Drain the input queue into the child's stdin until either side closes
async fn write_stdin(
    name: ScriptName,
    mut pipe: ChildStdin,
    mut queue: mpsc::Receiver<Bytes>,
    closed: CancellationToken,
) {
    loop {
        let data = tokio::select! {
            _ = closed.cancelled() => break,
            data = queue.recv() => match data {
                Some(data) => data,
                None => break,
            },
        };

        let result = tokio::select! {
            _ = closed.cancelled() => break,
            result = write_all_flush(&mut pipe, &data) => result,
        };
        if let Err(e) = result {
            tracing::debug!("stdin of {} closed: {}", name, e);
            break;
        }
    }
}

async fn write_all_flush(pipe: &mut ChildStdin, data: &[u8]) -> std::io::Result<()> {
    pipe.write_all(data).await?;
    pipe.flush().await
}

impl std::fmt::Debug for ExecutionSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExecutionSession")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("pid", &self.pid)
            .field("state", &self.state())
            .finish()
    }
}
