//! Publish/subscribe transport for session output.
//!
//! The process manager publishes `{id, data}` chunks; any number of listeners
//! subscribe either to one session or to every session. Each channel is a
//! bounded `tokio::sync::broadcast`, so a slow listener loses its oldest
//! chunks instead of stalling the PTY reader. Delivery is at-most-once and
//! there is no replay for late subscribers.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::{RecvError, TryRecvError};

/// Events buffered per channel before lagging listeners start losing chunks.
pub const CHANNEL_CAPACITY: usize = 1024;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BusEvent {
    Output { id: String, data: String },
    /// Final event for a session; nothing follows it on that id.
    Closed { id: String, exit_code: Option<i32> },
}

impl BusEvent {
    pub fn session_id(&self) -> &str {
        match self {
            BusEvent::Output { id, .. } | BusEvent::Closed { id, .. } => id,
        }
    }
}

#[derive(Clone)]
pub struct EventBus {
    inner: Arc<BusInner>,
}

struct BusInner {
    channels: RwLock<HashMap<String, broadcast::Sender<BusEvent>>>,
    firehose: broadcast::Sender<BusEvent>,
    capacity: usize,
}

impl EventBus {
    pub fn new() -> Self {
        Self::with_capacity(CHANNEL_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        let (firehose, _) = broadcast::channel(capacity);
        Self {
            inner: Arc::new(BusInner {
                channels: RwLock::new(HashMap::new()),
                firehose,
                capacity,
            }),
        }
    }

    /// Deliver an event to the session's listeners and to every firehose listener.
    ///
    /// The registry lock is released before sending.
    pub fn publish(&self, event: BusEvent) {
        let sender = {
            let channels = self
                .inner
                .channels
                .read()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            channels.get(event.session_id()).cloned()
        };

        if let Some(sender) = sender {
            // No receivers is fine; the chunk is simply dropped.
            let _ = sender.send(event.clone());
        }
        let _ = self.inner.firehose.send(event);
    }

    /// Listen to one session. Only events published after this call are seen.
    pub fn subscribe(&self, id: &str) -> Subscription {
        let mut channels = self
            .inner
            .channels
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let sender = channels
            .entry(id.to_string())
            .or_insert_with(|| broadcast::channel(self.inner.capacity).0);
        Subscription {
            scope: Some(id.to_string()),
            receiver: sender.subscribe(),
        }
    }

    /// Listen to every session, like a server-log viewer.
    pub fn subscribe_all(&self) -> Subscription {
        Subscription {
            scope: None,
            receiver: self.inner.firehose.subscribe(),
        }
    }

    /// Drop the per-session channel. Listeners drain what is buffered, then see the end.
    pub fn remove(&self, id: &str) {
        let mut channels = self
            .inner
            .channels
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        channels.remove(id);
    }

    pub fn listener_count(&self, id: &str) -> usize {
        let channels = self
            .inner
            .channels
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        channels.get(id).map(|s| s.receiver_count()).unwrap_or(0)
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

/// Handle for one listener. Dropping it (or calling `unsubscribe`) deregisters.
pub struct Subscription {
    scope: Option<String>,
    receiver: broadcast::Receiver<BusEvent>,
}

impl Subscription {
    /// Next event, or `None` once the channel is gone.
    ///
    /// Lag is skipped over: the listener resumes at the oldest retained chunk.
    pub async fn recv(&mut self) -> Option<BusEvent> {
        loop {
            match self.receiver.recv().await {
                Ok(event) => return Some(event),
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!(scope = ?self.scope, skipped, "bus listener lagged, dropped oldest chunks");
                }
                Err(RecvError::Closed) => return None,
            }
        }
    }

    /// Non-blocking variant of [`Subscription::recv`]. `None` when nothing is buffered.
    pub fn try_recv(&mut self) -> Option<BusEvent> {
        loop {
            match self.receiver.try_recv() {
                Ok(event) => return Some(event),
                Err(TryRecvError::Lagged(skipped)) => {
                    tracing::warn!(scope = ?self.scope, skipped, "bus listener lagged, dropped oldest chunks");
                }
                Err(TryRecvError::Empty) | Err(TryRecvError::Closed) => return None,
            }
        }
    }

    pub fn scope(&self) -> Option<&str> {
        self.scope.as_deref()
    }

    pub fn unsubscribe(self) {}
}
