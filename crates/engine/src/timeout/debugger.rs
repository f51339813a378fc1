use std::sync::atomic::{AtomicBool, Ordering};

use tokio::time::Instant;

use crate::timeout::HeartbeatHandler;

/// Tells whether a debugger is attached to the process. While one is, no timeout fires.
pub trait DebuggerProbe: Send + Sync {
    fn is_attached(&self) -> bool;
}

/// Never attached.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoDebugger;

impl DebuggerProbe for NoDebugger {
    fn is_attached(&self) -> bool {
        false
    }
}

/// Reads the tracer of the current process, refreshed on every heartbeat.
///
/// Only Linux exposes it (`TracerPid` in `/proc/self/status`); elsewhere the probe always
/// reports no debugger.
#[derive(Debug, Default)]
pub struct ProcessDebugger {
    attached: AtomicBool,
}

impl ProcessDebugger {
    pub fn new() -> Self {
        let probe = Self::default();
        probe.refresh();
        probe
    }

    pub fn refresh(&self) {
        self.attached.store(tracer_attached(), Ordering::Relaxed);
    }
}

impl DebuggerProbe for ProcessDebugger {
    fn is_attached(&self) -> bool {
        self.attached.load(Ordering::Relaxed)
    }
}

impl HeartbeatHandler for ProcessDebugger {
    fn on_heartbeat(&self, _now: Instant) {
        self.refresh();
    }
}

#[cfg(target_os = "linux")]
fn tracer_attached() -> bool {
    std::fs::read_to_string("/proc/self/status").is_ok_and(|status| parse_tracer_pid(&status).is_some_and(|pid| pid != 0))
}

#[cfg(not(target_os = "linux"))]
fn tracer_attached() -> bool {
    false
}

#[cfg_attr(not(target_os = "linux"), allow(dead_code))]
fn parse_tracer_pid(status: &str) -> Option<u32> {
    status.lines().find_map(|line| line.strip_prefix("TracerPid:")).and_then(|pid| pid.trim().parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_tracer_pid() {
        let status = "Name:\tengine\nState:\tR (running)\nTracerPid:\t4242\nUid:\t0\n";
        assert_eq!(parse_tracer_pid(status), Some(4242));
        assert_eq!(parse_tracer_pid("TracerPid:\t0\n"), Some(0));
        assert_eq!(parse_tracer_pid("Name:\tengine\n"), None);
    }

    #[test]
    fn no_debugger_is_never_attached() {
        assert!(!NoDebugger.is_attached());
    }
}
