//! Per-session broadcast hub
//!
//! Output history and the live broadcast sender sit behind one lock.
//! Publishing appends and sends under that lock; subscribing snapshots the
//! history and subscribes under it, so a subscriber sees every chunk
//! exactly once: either in its snapshot or on its receiver.

use std::collections::VecDeque;
use std::sync::Mutex;

use bytes::{Bytes, BytesMut};
use tokio::sync::broadcast;

use super::ExitInfo;

/// Live events delivered to subscribers
#[derive(Debug, Clone)]
pub enum SessionEvent {
    /// A chunk of stdout or stderr, in arrival order
    Output(Bytes),
    /// The process exited; no events follow
    Ended(ExitInfo),
}

/// What a new subscriber starts from
#[derive(Debug)]
pub struct Subscription {
    /// Output produced before the subscription, oldest first
    pub history: Vec<Bytes>,
    /// Set if the session already ended; `receiver` will yield nothing
    pub ended: Option<ExitInfo>,
    /// Everything published after the snapshot
    pub receiver: broadcast::Receiver<SessionEvent>,
}

struct HubInner {
    history: VecDeque<Bytes>,
    history_bytes: usize,
    truncated: bool,
    ended: Option<ExitInfo>,
}

/// Bounded output history plus live fan-out for one session
pub struct OutputHub {
    inner: Mutex<HubInner>,
    tx: broadcast::Sender<SessionEvent>,
    limit: usize,
}

/// Live events buffered per subscriber before it lags
const CHANNEL_CAPACITY: usize = 1024;

impl OutputHub {
    /// Create a hub keeping at most `limit` bytes of history
    pub fn new(limit: usize) -> Self {
        Self::with_capacity(limit, CHANNEL_CAPACITY)
    }

    /// Like [`Self::new`] with `capacity` live events per subscriber
    pub fn with_capacity(limit: usize, capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self {
            inner: Mutex::new(HubInner {
                history: VecDeque::new(),
                history_bytes: 0,
                truncated: false,
                ended: None,
            }),
            tx,
            limit,
        }
    }

    /// Append a chunk and push it to every current subscriber
    pub fn publish(&self, chunk: Bytes) {
        if chunk.is_empty() {
            return;
        }

        let mut inner = self.lock();
        if inner.ended.is_some() {
            return;
        }

        inner.history_bytes += chunk.len();
        inner.history.push_back(chunk.clone());
        self.trim(&mut inner);

        // No receivers is fine
        let _ = self.tx.send(SessionEvent::Output(chunk));
    }

    /// Mark the session ended and notify subscribers
    pub fn finish(&self, exit: ExitInfo) {
        let mut inner = self.lock();
        if inner.ended.is_some() {
            return;
        }
        inner.ended = Some(exit.clone());
        let _ = self.tx.send(SessionEvent::Ended(exit));
    }

    /// Snapshot the history and subscribe to everything after it
    pub fn subscribe(&self) -> Subscription {
        let inner = self.lock();
        Subscription {
            history: inner.history.iter().cloned().collect(),
            ended: inner.ended.clone(),
            receiver: self.tx.subscribe(),
        }
    }

    /// Full retained output, and whether older output was dropped
    pub fn contents(&self) -> (Bytes, bool) {
        let inner = self.lock();
        let mut buf = BytesMut::with_capacity(inner.history_bytes);
        for chunk in &inner.history {
            buf.extend_from_slice(chunk);
        }
        (buf.freeze(), inner.truncated)
    }

    /// Number of live subscribers
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }

    fn trim(&self, inner: &mut HubInner) {
        while inner.history_bytes > self.limit {
            let Some(front) = inner.history.pop_front() else {
                break;
            };
            inner.truncated = true;

            let excess = inner.history_bytes - self.limit;
            if front.len() > excess {
                inner.history_bytes -= excess;
                inner.history.push_front(front.slice(excess..));
            } else {
                inner.history_bytes -= front.len();
            }
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HubInner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }
}
