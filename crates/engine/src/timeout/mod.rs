//! Timeouts and minimum data rates driven by a shared heartbeat instead of per-connection
//! timers.

mod control;
mod date;
mod debugger;
mod heartbeat;

pub use control::{TimeoutControl, TimeoutHandler, TimeoutReason};
pub use date::{DateCache, DateValues};
pub use debugger::{DebuggerProbe, NoDebugger, ProcessDebugger};
pub use heartbeat::{Heartbeat, HeartbeatHandler};

#[cfg(test)]
pub use control::MockTimeoutHandler;
