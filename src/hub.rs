//! Broadcast hub: the registry of live feed connections and the fan-out path.
//!
//! Each connection owns a bounded outbound queue drained by its own SSE task.
//! Broadcasting snapshots the registry, releases the lock, then try-sends to
//! every queue; a stalled or vanished consumer can only fail its own delivery
//! and is removed from the registry without touching anyone else.
//!
//! The registry lock is a `std::sync::Mutex` held only for map operations and
//! never across an await, which lets the feed guard deregister synchronously
//! from `Drop` when the transport disconnects.

use std::collections::HashMap;
use std::net::IpAddr;
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;

use crate::error::ApiError;
use crate::types::{Message, StatsSnapshot};

/// A pre-serialized SSE frame: event name plus JSON payload.
///
/// Serialized once at broadcast time, cloned per connection.
#[derive(Debug, Clone)]
pub struct Frame {
    pub event: &'static str,
    pub data: String,
}

impl Frame {
    pub fn history(messages: &[Message]) -> Self {
        Self {
            event: "history",
            data: serde_json::to_string(messages).expect("messages serialize"),
        }
    }

    pub fn message(message: &Message) -> Self {
        Self {
            event: "message",
            data: serde_json::to_string(message).expect("message serializes"),
        }
    }

    pub fn stats(stats: &StatsSnapshot) -> Self {
        Self {
            event: "stats",
            data: serde_json::to_string(stats).expect("stats serialize"),
        }
    }
}

struct LiveConnection {
    addr: IpAddr,
    tx: mpsc::Sender<Frame>,
}

#[derive(Default)]
struct Registry {
    connections: HashMap<u64, LiveConnection>,
    next_id: u64,
}

/// Holds every live delivery channel and fans events out to them.
pub struct BroadcastHub {
    registry: Mutex<Registry>,
    max_connections: usize,
    max_per_ip: usize,
    queue_depth: usize,
}

impl BroadcastHub {
    pub fn new(max_connections: usize, max_per_ip: usize, queue_depth: usize) -> Self {
        Self {
            registry: Mutex::new(Registry::default()),
            max_connections,
            max_per_ip,
            queue_depth,
        }
    }

    /// Admit a new feed connection.
    ///
    /// Admission checks run before any resource is held: the global cap
    /// rejects with a capacity error, the per-IP cap with a rate-limit error.
    /// On success the connection's queue is seeded with `history` and
    /// registered in the same critical section, so no concurrent broadcast
    /// can slip a live event in front of the replay.
    pub fn subscribe(
        self: &Arc<Self>,
        addr: IpAddr,
        history: Frame,
    ) -> Result<(FeedGuard, mpsc::Receiver<Frame>), ApiError> {
        let mut registry = self.registry.lock().expect("hub registry poisoned");

        if registry.connections.len() >= self.max_connections {
            tracing::warn!(ip = %addr, "feed admission refused: global cap reached");
            return Err(ApiError::AtCapacity);
        }
        let from_same_ip = registry
            .connections
            .values()
            .filter(|c| c.addr == addr)
            .count();
        if from_same_ip >= self.max_per_ip {
            tracing::warn!(ip = %addr, "feed admission refused: per-source cap reached");
            return Err(ApiError::RateLimited { retry_after: 60 });
        }

        let (tx, rx) = mpsc::channel(self.queue_depth);
        // Fresh queue with depth > 0: this cannot fail
        let _ = tx.try_send(history);

        registry.next_id += 1;
        let id = registry.next_id;
        registry.connections.insert(id, LiveConnection { addr, tx });

        tracing::debug!(connection = id, ip = %addr, "feed connection open");
        Ok((
            FeedGuard {
                hub: Arc::clone(self),
                id,
            },
            rx,
        ))
    }

    /// Fan an event out to every open connection, best-effort.
    ///
    /// A full or closed queue counts as a write failure for that connection
    /// only: it is removed and the client re-derives state from the history
    /// replay on reconnect.
    pub fn broadcast(&self, frame: Frame) {
        let targets: Vec<(u64, mpsc::Sender<Frame>)> = {
            let registry = self.registry.lock().expect("hub registry poisoned");
            registry
                .connections
                .iter()
                .map(|(id, conn)| (*id, conn.tx.clone()))
                .collect()
        };

        let mut dead = Vec::new();
        for (id, tx) in targets {
            if tx.try_send(frame.clone()).is_err() {
                dead.push(id);
            }
        }

        if !dead.is_empty() {
            let mut registry = self.registry.lock().expect("hub registry poisoned");
            for id in &dead {
                if registry.connections.remove(id).is_some() {
                    tracing::debug!(connection = id, "feed connection dropped on write failure");
                }
            }
        }
    }

    pub fn connection_count(&self) -> usize {
        self.registry
            .lock()
            .expect("hub registry poisoned")
            .connections
            .len()
    }

    fn deregister(&self, id: u64) {
        let mut registry = self.registry.lock().expect("hub registry poisoned");
        if registry.connections.remove(&id).is_some() {
            tracing::debug!(connection = id, "feed connection closed");
        }
    }
}

/// Keeps a connection's registry slot alive for as long as its SSE stream
/// exists; dropping it (transport disconnect) deregisters promptly so
/// capacity accounting stays accurate.
pub struct FeedGuard {
    hub: Arc<BroadcastHub>,
    id: u64,
}

impl std::fmt::Debug for FeedGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FeedGuard").field("id", &self.id).finish()
    }
}

impl Drop for FeedGuard {
    fn drop(&mut self) {
        self.hub.deregister(self.id);
    }
}
