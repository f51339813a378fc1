//! Per-connection deadlines and minimum data rates, evaluated on each heartbeat tick.
//!
//! Nothing here owns a timer. The heartbeat calls [`TimeoutControl::tick`] with the current
//! instant and the control decides what fired. Every deadline is measured from the last tick
//! plus one heartbeat interval, so a timeout never fires early and fires at most one interval
//! late.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::time::Instant;
use tracing::trace;

use crate::config::MinDataRate;
use crate::timeout::DebuggerProbe;

/// Why a connection timed out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TimeoutReason {
    KeepAlive,
    RequestHeaders,
    ReadDataRate,
    WriteDataRate,
    RequestBodyDrain,
}

/// Receives fired timeouts. Closing the connection is up to the implementation.
#[cfg_attr(test, mockall::automock)]
pub trait TimeoutHandler: Send + Sync {
    fn on_timeout(&self, reason: TimeoutReason);
}

pub struct TimeoutControl {
    handler: Arc<dyn TimeoutHandler>,
    debugger: Arc<dyn DebuggerProbe>,
    heartbeat_interval: Duration,
    state: Mutex<State>,
}

struct State {
    last_tick: Instant,
    timeout: Option<(Instant, TimeoutReason)>,
    read: ReadTiming,
    write: WriteTiming,
}

#[derive(Default)]
struct ReadTiming {
    rate: Option<MinDataRate>,
    /// Time spent waiting on the client, excluding paused intervals.
    elapsed: Duration,
    bytes: u64,
    /// Reading is suspended by backpressure from the application.
    paused: bool,
}

#[derive(Default)]
struct WriteTiming {
    pending: usize,
    deadline: Option<Instant>,
}

impl TimeoutControl {
    pub fn new(handler: Arc<dyn TimeoutHandler>, debugger: Arc<dyn DebuggerProbe>, heartbeat_interval: Duration) -> Self {
        let state = State {
            last_tick: Instant::now(),
            timeout: None,
            read: ReadTiming::default(),
            write: WriteTiming::default(),
        };
        Self { handler, debugger, heartbeat_interval, state: Mutex::new(state) }
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Arms the absolute timeout for `reason`, replacing any armed one.
    pub fn set_timeout(&self, duration: Duration, reason: TimeoutReason) {
        let mut state = self.lock();
        let deadline = state.last_tick + duration + self.heartbeat_interval;
        state.timeout = Some((deadline, reason));
    }

    pub fn cancel_timeout(&self) {
        self.lock().timeout = None;
    }

    /// The armed timeout, if any.
    pub fn timeout_reason(&self) -> Option<TimeoutReason> {
        self.lock().timeout.map(|(_, reason)| reason)
    }

    /// Starts enforcing `rate` on the request body.
    pub fn start_request_body(&self, rate: MinDataRate) {
        let mut state = self.lock();
        state.read = ReadTiming { rate: Some(rate), ..ReadTiming::default() };
    }

    pub fn stop_request_body(&self) {
        self.lock().read = ReadTiming::default();
    }

    /// Stops counting read time while reading from the transport is paused.
    pub fn pause_timing_reads(&self) {
        self.lock().read.paused = true;
    }

    pub fn resume_timing_reads(&self) {
        self.lock().read.paused = false;
    }

    pub fn bytes_read(&self, count: usize) {
        self.lock().read.bytes += count as u64;
    }

    /// Starts timing a write of `size` bytes against `rate`.
    ///
    /// The allowance of concurrent writes adds up, so a second write only moves the deadline
    /// later.
    pub fn start_timing_write(&self, size: usize, rate: MinDataRate) {
        let mut state = self.lock();
        let allowance = Duration::from_secs_f64(size as f64 / rate.bytes_per_second()).max(rate.grace_period());
        let base = match state.write.deadline {
            Some(deadline) if state.write.pending > 0 => deadline,
            _ => state.last_tick + self.heartbeat_interval,
        };
        state.write.deadline = Some(base + allowance);
        state.write.pending += 1;
    }

    pub fn stop_timing_write(&self) {
        let mut state = self.lock();
        state.write.pending = state.write.pending.saturating_sub(1);
        if state.write.pending == 0 {
            state.write.deadline = None;
        }
    }

    /// Evaluates every armed check at `now`. Each fired check is disarmed, so it fires once.
    pub fn tick(&self, now: Instant) {
        let mut fired: [Option<TimeoutReason>; 3] = [None; 3];
        {
            let mut state = self.lock();
            let since_last = now.saturating_duration_since(state.last_tick);
            state.last_tick = now;

            if self.debugger.is_attached() {
                return;
            }

            if let Some((deadline, reason)) = state.timeout
                && now >= deadline
            {
                state.timeout = None;
                fired[0] = Some(reason);
            }

            let read = &mut state.read;
            if let Some(rate) = read.rate
                && !read.paused
            {
                read.elapsed += since_last;
                if read.elapsed > rate.grace_period() {
                    let actual = read.bytes as f64 / read.elapsed.as_secs_f64();
                    if actual < rate.bytes_per_second() {
                        trace!(actual, minimum = rate.bytes_per_second(), "request body data rate below minimum");
                        read.rate = None;
                        fired[1] = Some(TimeoutReason::ReadDataRate);
                    }
                }
            }

            if let Some(deadline) = state.write.deadline
                && state.write.pending > 0
                && now >= deadline
            {
                state.write = WriteTiming::default();
                fired[2] = Some(TimeoutReason::WriteDataRate);
            }
        }

        for reason in fired.into_iter().flatten() {
            self.handler.on_timeout(reason);
        }
    }
}

impl std::fmt::Debug for TimeoutControl {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TimeoutControl").field("timeout", &self.timeout_reason()).finish_non_exhaustive()
    }
}
