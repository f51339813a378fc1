use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::buffer::ReadCanceller;
use crate::timeout::{TimeoutHandler, TimeoutReason};

/// The handles through which anything outside the request loop acts on a connection:
/// timeouts, the input side, graceful shutdown and aborts.
#[derive(Debug)]
pub struct ConnectionControl {
    id: u64,
    /// Cancelled on abort. Stops both transport pumps.
    abort: CancellationToken,
    /// Cancelled when the request loop is done. Stops the input pump only.
    closing: CancellationToken,
    input: ReadCanceller,
    stop_requested: AtomicBool,
    idle: AtomicBool,
    prevent_request_abort: AtomicBool,
    timed_out: Mutex<Option<TimeoutReason>>,
    request: Mutex<CancellationToken>,
}

impl ConnectionControl {
    pub fn new(id: u64, input: ReadCanceller) -> Self {
        let abort = CancellationToken::new();
        let closing = abort.child_token();
        Self {
            id,
            abort,
            closing,
            input,
            stop_requested: AtomicBool::new(false),
            idle: AtomicBool::new(true),
            prevent_request_abort: AtomicBool::new(false),
            timed_out: Mutex::new(None),
            request: Mutex::new(CancellationToken::new()),
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    fn lock_request(&self) -> MutexGuard<'_, CancellationToken> {
        self.request.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_timed_out(&self) -> MutexGuard<'_, Option<TimeoutReason>> {
        self.timed_out.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// A fresh abort token for the next request.
    pub(crate) fn begin_request(&self) -> CancellationToken {
        self.prevent_request_abort.store(false, Ordering::Release);
        let token = CancellationToken::new();
        if self.abort.is_cancelled() {
            token.cancel();
        }
        *self.lock_request() = token.clone();
        token
    }

    /// Marks whether the connection is waiting for the next request line.
    pub(crate) fn set_idle(&self, idle: bool) {
        self.idle.store(idle, Ordering::SeqCst);
    }

    /// Lets the request abort token survive the client closing its side.
    pub(crate) fn prevent_request_abort(&self) {
        self.prevent_request_abort.store(true, Ordering::Release);
    }

    /// Finishes the in-flight request and then closes, waking the connection right away if it
    /// sits idle between requests.
    pub fn request_stop(&self) {
        self.stop_requested.store(true, Ordering::SeqCst);
        if self.idle.load(Ordering::SeqCst) {
            self.input.cancel();
        }
    }

    pub fn is_stop_requested(&self) -> bool {
        self.stop_requested.load(Ordering::SeqCst)
    }

    /// Tears the connection down without finishing the response.
    pub fn abort(&self) {
        if self.abort.is_cancelled() {
            return;
        }
        debug!(connection_id = self.id, "connection aborted");
        self.stop_requested.store(true, Ordering::Release);
        self.abort.cancel();
        self.lock_request().cancel();
        self.input.cancel();
    }

    pub fn is_aborted(&self) -> bool {
        self.abort.is_cancelled()
    }

    pub(crate) fn abort_token(&self) -> &CancellationToken {
        &self.abort
    }

    pub(crate) fn closing_token(&self) -> &CancellationToken {
        &self.closing
    }

    /// The request loop finished; the input side can stop reading.
    pub(crate) fn close_input(&self) {
        self.closing.cancel();
    }

    /// The client closed its side of the connection.
    pub(crate) fn on_input_completed(&self) {
        if !self.prevent_request_abort.load(Ordering::Acquire) {
            self.lock_request().cancel();
        }
    }

    /// Takes the reason of a timeout that interrupted a read.
    pub(crate) fn take_timeout(&self) -> Option<TimeoutReason> {
        self.lock_timed_out().take()
    }
}

impl TimeoutHandler for ConnectionControl {
    fn on_timeout(&self, reason: TimeoutReason) {
        match reason {
            TimeoutReason::KeepAlive => {
                debug!(connection_id = self.id, "connection keep-alive timed out");
                self.request_stop();
            }
            TimeoutReason::RequestHeaders | TimeoutReason::ReadDataRate => {
                if reason == TimeoutReason::ReadDataRate {
                    info!(connection_id = self.id, "request body minimum data rate not satisfied");
                } else {
                    debug!(connection_id = self.id, "reading the request headers timed out");
                }
                *self.lock_timed_out() = Some(reason);
                self.input.cancel();
            }
            TimeoutReason::WriteDataRate => {
                info!(connection_id = self.id, "response minimum data rate not satisfied");
                self.abort();
            }
            TimeoutReason::RequestBodyDrain => {
                debug!(connection_id = self.id, "draining the request body timed out");
                self.abort();
            }
        }
    }
}
