use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::connection::ConnectionControl;
use crate::timeout::{HeartbeatHandler, TimeoutControl};

struct Entry {
    timeout: Arc<TimeoutControl>,
    control: Arc<ConnectionControl>,
}

/// Every live connection of an engine: ticked by the heartbeat and stopped on shutdown.
pub struct ConnectionManager {
    connections: Mutex<HashMap<u64, Entry>>,
    next_id: AtomicU64,
    count: watch::Sender<usize>,
}

impl Default for ConnectionManager {
    fn default() -> Self {
        Self::new()
    }
}

impl ConnectionManager {
    pub fn new() -> Self {
        let (count, _) = watch::channel(0);
        Self { connections: Mutex::new(HashMap::new()), next_id: AtomicU64::new(1), count }
    }

    pub fn next_id(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<u64, Entry>> {
        self.connections.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Tracks a connection until the returned guard is dropped.
    pub(crate) fn register(
        self: &Arc<Self>,
        id: u64,
        timeout: Arc<TimeoutControl>,
        control: Arc<ConnectionControl>,
    ) -> Registration {
        let len = {
            let mut connections = self.lock();
            connections.insert(id, Entry { timeout, control });
            connections.len()
        };
        self.count.send_replace(len);
        Registration { manager: Arc::clone(self), id }
    }

    fn unregister(&self, id: u64) {
        let len = {
            let mut connections = self.lock();
            connections.remove(&id);
            connections.len()
        };
        self.count.send_replace(len);
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn controls(&self) -> Vec<Arc<ConnectionControl>> {
        self.lock().values().map(|entry| Arc::clone(&entry.control)).collect()
    }

    /// Asks every connection to close after its in-flight request and waits up to `timeout`.
    /// Connections still open after that are aborted.
    ///
    /// Returns whether every connection closed in time.
    pub async fn shutdown(&self, timeout: Duration) -> bool {
        let mut count = self.count.subscribe();
        let controls = self.controls();
        debug!(connections = controls.len(), "stopping connections");
        for control in &controls {
            control.request_stop();
        }

        let closed = tokio::time::timeout(timeout, count.wait_for(|&n| n == 0)).await.is_ok_and(|r| r.is_ok());
        if !closed {
            warn!(remaining = self.len(), "not all connections closed gracefully");
            for control in self.controls() {
                control.abort();
            }
        }
        closed
    }
}

impl HeartbeatHandler for ConnectionManager {
    fn on_heartbeat(&self, now: Instant) {
        let timeouts: Vec<Arc<TimeoutControl>> = self.lock().values().map(|entry| Arc::clone(&entry.timeout)).collect();
        for timeout in timeouts {
            timeout.tick(now);
        }
    }
}

impl std::fmt::Debug for ConnectionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionManager").field("connections", &self.len()).finish_non_exhaustive()
    }
}

/// Unregisters its connection when dropped.
#[derive(Debug)]
pub(crate) struct Registration {
    manager: Arc<ConnectionManager>,
    id: u64,
}

impl Drop for Registration {
    fn drop(&mut self) {
        self.manager.unregister(self.id);
    }
}
