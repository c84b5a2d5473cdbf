//! Per-connection websocket state
//!
//! A [`ClientSession`] turns [`ClientRequest`]s into orchestrator calls and
//! keeps one forwarding task per script the connection is subscribed to.
//! Everything it produces goes to a single outbound channel, so the order
//! a client sees is the order events were queued.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;

use pyr_core::ipc::{ClientRequest, ServerEvent};
use pyr_core::time::runtime_secs;
use pyr_core::{RunnerError, ScriptName};

use crate::session::{ExitInfo, SessionEvent, Subscription};
use crate::state::AppState;

/// Outbound queue depth per connection
pub const OUTBOUND_CAPACITY: usize = 256;

/// State for a single websocket connection
pub struct ClientSession {
    state: Arc<AppState>,
    outbound: mpsc::Sender<ServerEvent>,
    /// Forwarding task per subscribed script
    watches: HashMap<ScriptName, JoinHandle<()>>,
}

impl ClientSession {
    pub fn new(state: Arc<AppState>, outbound: mpsc::Sender<ServerEvent>) -> Self {
        Self {
            state,
            outbound,
            watches: HashMap::new(),
        }
    }

    /// Handle one JSON text frame
    pub async fn handle_text(&mut self, text: &str) {
        match serde_json::from_str::<ClientRequest>(text) {
            Ok(request) => self.handle(request).await,
            Err(e) => {
                self.send(ServerEvent::error(format!("Invalid request: {}", e)))
                    .await
            }
        }
    }

    /// Handle one request; failures become an `error` event
    pub async fn handle(&mut self, request: ClientRequest) {
        let result = match request {
            ClientRequest::Start { script } => self.start(script).await,
            ClientRequest::Stop { script } => self.stop(script),
            ClientRequest::Input { script, data } => self.input(script, data),
            ClientRequest::Watch { script } => self.watch(script),
            ClientRequest::Unwatch { script } => {
                self.unwatch(&script);
                Ok(())
            }
            ClientRequest::Status { script } => self.status(script).await,
            ClientRequest::StopExternal { pid } => self.stop_external(pid).await,
        };

        if let Err(e) = result {
            tracing::debug!("Request failed: {}", e);
            self.send(error_event(e)).await;
        }
    }

    /// Number of scripts this connection is subscribed to
    pub fn watch_count(&self) -> usize {
        self.watches.values().filter(|h| !h.is_finished()).count()
    }

    /// Drop every subscription
    pub fn close(&mut self) {
        for (_, handle) in self.watches.drain() {
            handle.abort();
        }
    }

    async fn start(&mut self, script: String) -> Result<(), RunnerError> {
        let name = ScriptName::parse(script)?;
        let session = self.state.orchestrator.start(&name)?;
        let subscription = session.subscribe();

        self.send(ServerEvent::Started {
            script: name.to_string(),
            pid: session.pid(),
            start_time: session.started_at(),
        })
        .await;
        self.attach(name, subscription, None);
        Ok(())
    }

    fn stop(&mut self, script: String) -> Result<(), RunnerError> {
        let name = ScriptName::parse(script)?;
        self.state.orchestrator.stop(&name)
    }

    fn input(&mut self, script: String, data: String) -> Result<(), RunnerError> {
        let name = ScriptName::parse(script)?;
        self.state.orchestrator.send_input(&name, data.as_bytes())
    }

    fn watch(&mut self, script: String) -> Result<(), RunnerError> {
        let name = ScriptName::parse(script)?;
        let (session, subscription) = self.state.orchestrator.watch(&name)?;
        let ack = ServerEvent::Watching {
            script: name.to_string(),
            pid: session.pid(),
            start_time: session.started_at(),
        };
        self.attach(name, subscription, Some(ack));
        Ok(())
    }

    fn unwatch(&mut self, script: &str) {
        if let Ok(name) = ScriptName::parse(script) {
            if let Some(handle) = self.watches.remove(&name) {
                handle.abort();
                tracing::debug!("Client unwatched {}", name);
            }
        }
    }

    async fn status(&mut self, script: Option<String>) -> Result<(), RunnerError> {
        let event = match script {
            Some(script) => {
                let name = ScriptName::parse(script)?;
                match self.state.orchestrator.status(&name) {
                    Some(running) => ServerEvent::Status {
                        script: running.script,
                        running: true,
                        pid: Some(running.pid),
                        start_time: Some(running.start_time),
                        runtime: Some(running.runtime),
                    },
                    None => ServerEvent::Status {
                        script: name.to_string(),
                        running: false,
                        pid: None,
                        start_time: None,
                        runtime: None,
                    },
                }
            }
            None => ServerEvent::AllStatus {
                running: self.state.orchestrator.status_all(),
            },
        };
        self.send(event).await;
        Ok(())
    }

    async fn stop_external(&mut self, pid: u32) -> Result<(), RunnerError> {
        self.state.stop_external(pid).await?;
        self.send(ServerEvent::ExternalStopped { pid }).await;
        Ok(())
    }

    /// Forward a subscription to this connection, replacing any previous
    /// subscription to the same script
    fn attach(&mut self, name: ScriptName, subscription: Subscription, ack: Option<ServerEvent>) {
        self.watches.retain(|_, handle| !handle.is_finished());
        if let Some(previous) = self.watches.remove(&name) {
            previous.abort();
        }

        let outbound = self.outbound.clone();
        let script = name.to_string();
        let handle = tokio::spawn(forward(script, subscription, ack, outbound));
        self.watches.insert(name, handle);
    }

    /// Queue an event for this connection
    pub async fn send(&self, event: ServerEvent) {
        if self.outbound.send(event).await.is_err() {
            tracing::trace!("Client outbound channel closed");
        }
    }
}

impl Drop for ClientSession {
    fn drop(&mut self) {
        self.close();
    }
}

/// Replay history, then stream live output until the session ends
///
/// A viewer that falls behind the broadcast gets an `output_dropped`
/// event in place of the chunks it missed.
pub(crate) async fn forward(
    script: String,
    mut subscription: Subscription,
    ack: Option<ServerEvent>,
    outbound: mpsc::Sender<ServerEvent>,
) {
    let mut decoder = Utf8Decoder::default();

    let replay = decoder.push(&subscription.history.concat());
    if !replay.is_empty() {
        let event = ServerEvent::Output {
            script: script.clone(),
            data: replay,
        };
        if outbound.send(event).await.is_err() {
            return;
        }
    }
    if let Some(ack) = ack {
        if outbound.send(ack).await.is_err() {
            return;
        }
    }

    let exit = match subscription.ended.take() {
        Some(exit) => Some(exit),
        None => loop {
            match subscription.receiver.recv().await {
                Ok(SessionEvent::Output(chunk)) => {
                    let data = decoder.push(&chunk);
                    if data.is_empty() {
                        continue;
                    }
                    let event = ServerEvent::Output {
                        script: script.clone(),
                        data,
                    };
                    if outbound.send(event).await.is_err() {
                        return;
                    }
                }
                Ok(SessionEvent::Ended(exit)) => break Some(exit),
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    tracing::warn!("Viewer of {} lagged, {} output chunks dropped", script, n);
                    // A character split across the gap cannot be completed
                    let partial = decoder.finish();
                    if !partial.is_empty() {
                        let event = ServerEvent::Output {
                            script: script.clone(),
                            data: partial,
                        };
                        if outbound.send(event).await.is_err() {
                            return;
                        }
                    }
                    let event = ServerEvent::OutputDropped {
                        script: script.clone(),
                        chunks: n,
                    };
                    if outbound.send(event).await.is_err() {
                        return;
                    }
                }
                Err(broadcast::error::RecvError::Closed) => break None,
            }
        },
    };

    let rest = decoder.finish();
    if !rest.is_empty() {
        let _ = outbound
            .send(ServerEvent::Output {
                script: script.clone(),
                data: rest,
            })
            .await;
    }
    if let Some(exit) = exit {
        let _ = outbound.send(process_ended(script, &exit)).await;
    }
}

fn process_ended(script: String, exit: &ExitInfo) -> ServerEvent {
    ServerEvent::ProcessEnded {
        script,
        exit_code: exit.exit_code,
        signal: exit.signal,
        runtime: runtime_secs(exit.runtime),
    }
}

/// Websocket `error` event for a failed request
pub fn error_event(err: RunnerError) -> ServerEvent {
    match err {
        RunnerError::NotExecutable { reason, .. } => error_event(*reason),
        RunnerError::MissingDependency(missing) => ServerEvent::Error {
            message: "Script has missing dependencies".to_string(),
            errors: Vec::new(),
            missing,
        },
        RunnerError::ValidationFailure { errors } => ServerEvent::Error {
            message: "Script has validation errors".to_string(),
            errors,
            missing: Vec::new(),
        },
        other => ServerEvent::error(other.to_string()),
    }
}

/// Incremental UTF-8 decoding of a byte stream
///
/// A multi-byte character split across chunks is held back until its
/// remaining bytes arrive. Invalid sequences become U+FFFD.
#[derive(Debug, Default)]
pub struct Utf8Decoder {
    pending: Vec<u8>,
}

impl Utf8Decoder {
    /// Decode as much of `pending + chunk` as is complete
    pub fn push(&mut self, chunk: &[u8]) -> String {
        self.pending.extend_from_slice(chunk);
        let split = self.pending.len() - incomplete_tail(&self.pending);
        let text = String::from_utf8_lossy(&self.pending[..split]).into_owned();
        self.pending.drain(..split);
        text
    }

    /// Decode whatever is left, lossily
    pub fn finish(&mut self) -> String {
        let text = String::from_utf8_lossy(&self.pending).into_owned();
        self.pending.clear();
        text
    }
}

/// Length of a truncated multi-byte sequence at the end of `bytes`
fn incomplete_tail(bytes: &[u8]) -> usize {
    let start = bytes.len().saturating_sub(3);
    for i in (start..bytes.len()).rev() {
        let byte = bytes[i];
        if byte & 0xC0 == 0x80 {
            continue;
        }
        let needed = match byte {
            0xC0..=0xDF => 2,
            0xE0..=0xEF => 3,
            0xF0..=0xF7 => 4,
            _ => 1,
        };
        let have = bytes.len() - i;
        return if have < needed { have } else { 0 };
    }
    0
}
