use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{trace, warn};

/// Something driven by the shared heartbeat.
pub trait HeartbeatHandler: Send + Sync {
    fn on_heartbeat(&self, now: Instant);
}

/// A background task calling every handler once per interval. Stopped when dropped.
#[derive(Debug)]
pub struct Heartbeat {
    handle: JoinHandle<()>,
}

impl Heartbeat {
    /// Spawns the heartbeat on the current tokio runtime.
    pub fn start(handlers: Vec<Arc<dyn HeartbeatHandler>>, interval: Duration) -> Self {
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                let now = ticker.tick().await;
                beat(&handlers, now, interval);
            }
        });
        Self { handle }
    }

    pub fn stop(&self) {
        self.handle.abort();
    }
}

impl Drop for Heartbeat {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

fn beat(handlers: &[Arc<dyn HeartbeatHandler>], now: Instant, interval: Duration) {
    for handler in handlers {
        handler.on_heartbeat(now);
    }
    let took = now.elapsed();
    if took > interval {
        warn!(took = ?took, interval = ?interval, "heartbeat took longer than its interval");
    } else {
        trace!(took = ?took, "heartbeat");
    }
}
