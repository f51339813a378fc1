//! The HTTP/1.x request loop of one connection.
//!
//! [`Http1Connection`] reads request heads from the input pipe, hands each request to the
//! application through an [`HttpContext`], and writes the response into the output pipe. The
//! transport pumps on the other ends of both pipes live in [`super::transport`].

use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use bytes::Bytes;
use futures::FutureExt;
use http::StatusCode;
use tracing::{debug, error, info};

use crate::buffer::{PipeReader, PipeWriter, ReadBuffer};
use crate::codec::{HeaderBudget, HttpParser, ParseStatus};
use crate::handler::Handler;
use crate::protocol::{
    ApplicationErrors, BadRequest, BoxError, HttpError, PanicError, PayloadItem, RequestRejectionReason, ResponseError,
};
use crate::server::EngineContext;
use crate::timeout::{TimeoutControl, TimeoutReason};

use super::control::ConnectionControl;
use super::context::HttpContext;
use super::frame::{Frame, RequestState};
use super::output::OutputProducer;

pub(crate) struct Http1Connection {
    pub(crate) engine: Arc<EngineContext>,
    pub(crate) control: Arc<ConnectionControl>,
    timeout: Arc<TimeoutControl>,
    input: PipeReader,
    output: OutputProducer,
    parser: HttpParser,
    budget: HeaderBudget,
    /// Whether the request line of the head being read has been parsed.
    line_parsed: bool,
    pub(crate) frame: Frame,
}

impl Http1Connection {
    pub(crate) fn new(
        engine: Arc<EngineContext>,
        control: Arc<ConnectionControl>,
        timeout: Arc<TimeoutControl>,
        input: PipeReader,
        output: PipeWriter,
    ) -> Self {
        let limits = &engine.config.limits;
        let budget = HeaderBudget::new(limits.max_request_headers_count, limits.max_request_headers_total_size);
        let frame = Frame::new(control.begin_request());
        Self {
            engine,
            control,
            timeout,
            input,
            output: OutputProducer::new(output),
            parser: HttpParser::new(),
            budget,
            line_parsed: false,
            frame,
        }
    }

    fn connection_id(&self) -> u64 {
        self.control.id()
    }

    /// Serves requests until the connection should close, then completes the output.
    pub(crate) async fn process_requests<H>(&mut self, handler: &H)
    where
        H: Handler + Sync,
    {
        loop {
            match self.read_request_head().await {
                Ok(true) => {}
                Ok(false) => break,
                Err(HttpError::BadRequest { source }) => {
                    self.reject(source).await;
                    break;
                }
                Err(e) => {
                    debug!(connection_id = self.connection_id(), cause = %e, "reading the request head failed");
                    break;
                }
            }

            let app_error = self.dispatch(handler).await;
            self.finish_request(app_error).await;

            if !self.frame.keep_alive || self.control.is_aborted() || self.control.is_stop_requested() {
                break;
            }
            debug!(connection_id = self.connection_id(), "keeping the connection alive");
            let token = self.control.begin_request();
            self.frame.reset(token);
            self.budget.reset();
            self.line_parsed = false;
        }
        self.output.complete(None);
    }

    /// Reads and parses the next request head.
    ///
    /// Returns `false` when the connection should close without a response: the client went
    /// away between requests, or a stop was requested while idle.
    async fn read_request_head(&mut self) -> Result<bool, HttpError> {
        let engine = Arc::clone(&self.engine);
        let limits = &engine.config.limits;
        let path_base = engine.config.path_base.as_deref();

        self.control.set_idle(true);
        if self.control.is_stop_requested() {
            return Ok(false);
        }
        self.timeout.set_timeout(limits.keep_alive_timeout, TimeoutReason::KeepAlive);

        loop {
            let result = self.input.read().await?;
            let completed = result.is_completed();
            let canceled = result.is_canceled();
            let buffer = result.buffer();

            if !buffer.is_empty() && self.frame.state == RequestState::Pending {
                self.frame.state = RequestState::Started;
                self.control.set_idle(false);
                self.timeout.set_timeout(limits.request_headers_timeout, TimeoutReason::RequestHeaders);
            }

            let status = parse_head(
                &mut self.parser,
                &mut self.budget,
                &mut self.frame,
                &mut self.line_parsed,
                path_base,
                buffer,
                limits.max_request_line_size,
            )?;

            if status.done {
                self.input.advance(status.consumed, status.consumed)?;
                break;
            }
            self.input.advance(status.consumed, status.examined)?;

            if canceled {
                if self.control.take_timeout() == Some(TimeoutReason::RequestHeaders) {
                    return Err(BadRequest::new(RequestRejectionReason::RequestHeadersTimeout).into());
                }
                if self.control.is_aborted()
                    || (self.control.is_stop_requested() && self.frame.state == RequestState::Pending)
                {
                    return Ok(false);
                }
                continue;
            }

            if completed {
                if self.frame.state == RequestState::Pending {
                    debug!(connection_id = self.connection_id(), "client closed an idle connection");
                    return Ok(false);
                }
                let reason = if self.line_parsed {
                    RequestRejectionReason::InvalidRequestHeadersNoCrlf
                } else {
                    RequestRejectionReason::InvalidRequestLine
                };
                return Err(BadRequest::new(reason).into());
            }
        }

        self.timeout.cancel_timeout();
        self.frame.on_request_head(limits)?;
        Ok(true)
    }

    async fn dispatch<H>(&mut self, handler: &H) -> Option<BoxError>
    where
        H: Handler + Sync,
    {
        let mut ctx = HttpContext::new(self);
        match AssertUnwindSafe(handler.call(&mut ctx)).catch_unwind().await {
            Ok(Ok(())) => None,
            Ok(Err(e)) => Some(e.into()),
            Err(panic) => Some(Box::new(PanicError::from_payload(panic.as_ref()))),
        }
    }

    /// Everything after the application returned: error responses, the body drain, the
    /// response suffix and the completion callbacks.
    async fn finish_request(&mut self, app_error: Option<BoxError>) {
        if let Some(rejection) = self.frame.rejection.take() {
            if self.frame.has_response_started() {
                self.frame.keep_alive = false;
                self.control.abort();
            } else {
                self.reject(rejection).await;
                self.fire_on_completed().await;
                self.log_errors();
                return;
            }
        }

        if let Some(e) = app_error {
            self.frame.errors.push(e);
            if self.frame.has_response_started() {
                self.frame.keep_alive = false;
                self.control.abort();
            } else {
                self.frame.set_error_response(StatusCode::INTERNAL_SERVER_ERROR);
            }
        }

        if !self.control.is_aborted() {
            if let Err(e) = self.start_response(true) {
                self.frame.errors.push(Box::new(e));
            }
            self.drain_request_body().await;
            if let Err(e) = self.produce_end().await {
                self.frame.errors.push(Box::new(e));
                self.frame.keep_alive = false;
                self.control.abort();
            }
        }

        self.fire_on_completed().await;
        self.log_errors();
    }

    fn log_errors(&mut self) {
        if self.frame.errors.is_empty() {
            return;
        }
        let errors = ApplicationErrors::new(std::mem::take(&mut self.frame.errors));
        error!(connection_id = self.connection_id(), cause = %errors, "application error");
    }

    /// Answers a rejected request and gives up on keep-alive.
    async fn reject(&mut self, rejection: BadRequest) {
        info!(
            connection_id = self.connection_id(),
            reason = ?rejection.reason(),
            status = rejection.status().as_u16(),
            detail = rejection.detail().unwrap_or_default(),
            "connection bad request: {}",
            rejection.reason().message(),
        );
        self.frame.keep_alive = false;
        if self.frame.has_response_started() {
            self.control.abort();
            return;
        }
        self.frame.on_starting.clear();
        self.frame.set_error_response(rejection.status());
        if let Err(e) = self.produce_end().await {
            debug!(connection_id = self.connection_id(), cause = %e, "writing the rejection failed");
        }
    }

    /// Reads the rest of the request body so the next pipelined request starts on a message
    /// boundary.
    async fn drain_request_body(&mut self) {
        if !self.frame.keep_alive || self.frame.decoder.is_finished() {
            return;
        }
        if self.frame.expect_continue {
            // the client is still waiting for permission to send the body
            self.frame.keep_alive = false;
            return;
        }

        self.timeout
            .set_timeout(self.engine.config.limits.request_body_drain_timeout, TimeoutReason::RequestBodyDrain);
        loop {
            match self.read_body().await {
                Ok(Some(_)) => {}
                Ok(None) => break,
                Err(e) => {
                    debug!(connection_id = self.connection_id(), cause = %e, "draining the request body failed");
                    self.frame.keep_alive = false;
                    break;
                }
            }
        }
        self.timeout.cancel_timeout();
    }

    /// Runs the on-starting callbacks, latest registration first.
    fn fire_on_starting(&mut self) -> Result<(), ApplicationErrors> {
        let mut errors = Vec::new();
        while let Some(callback) = self.frame.on_starting.pop() {
            if let Err(e) = callback(&mut self.frame.response) {
                errors.push(e);
            }
        }
        if errors.is_empty() { Ok(()) } else { Err(ApplicationErrors::new(errors)) }
    }

    async fn fire_on_completed(&mut self) {
        let mut errors = Vec::new();
        while let Some(callback) = self.frame.on_completed.pop() {
            if let Err(e) = callback().await {
                errors.push(e);
            }
        }
        if !errors.is_empty() {
            self.frame.errors.push(Box::new(ApplicationErrors::new(errors)));
        }
    }

    /// Fixes the response head and writes it to the output. Does nothing once started.
    ///
    /// `app_completed` means no body follows, so the response can carry `Content-Length: 0`
    /// instead of being chunked. A failure in the on-starting callbacks is returned to the
    /// application while it runs; afterwards it turns the response into a 500.
    pub(crate) fn start_response(&mut self, app_completed: bool) -> Result<(), HttpError> {
        if self.frame.has_response_started() {
            return Ok(());
        }

        if let Err(errors) = self.fire_on_starting() {
            if !app_completed {
                return Err(errors.into());
            }
            self.frame.errors.push(Box::new(errors));
            self.frame.set_error_response(StatusCode::INTERNAL_SERVER_ERROR);
        }

        let date = self.engine.date.get();
        let stop_requested = self.control.is_stop_requested();
        let add_server_header = self.engine.config.add_server_header;
        if let Err(e) = self.frame.finalize_response_head(app_completed, stop_requested, add_server_header, &date) {
            if !app_completed {
                return Err(e.into());
            }
            self.frame.errors.push(Box::new(e));
            self.frame.set_error_response(StatusCode::INTERNAL_SERVER_ERROR);
            self.frame.finalize_response_head(true, stop_requested, add_server_header, &date)?;
        }

        self.output.write_head(&self.frame.response);
        Ok(())
    }

    pub(crate) async fn write(&mut self, data: &[u8]) -> Result<(), HttpError> {
        if self.frame.response_completed {
            return Err(ResponseError::Completed.into());
        }
        self.start_response(false)?;
        if data.is_empty() {
            return Ok(());
        }

        if self.frame.is_head() {
            debug!(connection_id = self.connection_id(), len = data.len(), "dropping a response body write to a HEAD request");
            return Ok(());
        }
        if self.frame.response.is_body_forbidden() {
            return Err(ResponseError::BodyNotAllowed { status: self.frame.response.status }.into());
        }

        if let Err(e) = self.output.write_body(&mut self.frame.encoder, data) {
            if matches!(e, ResponseError::TooManyBytesWritten { .. }) {
                self.frame.keep_alive = false;
            }
            return Err(e.into());
        }
        if self.frame.encoder.is_length_complete() {
            self.control.prevent_request_abort();
        }
        self.flush().await
    }

    pub(crate) async fn flush(&mut self) -> Result<(), HttpError> {
        self.start_response(false)?;
        Ok(self.output.flush().await?)
    }

    /// Writes the response suffix and flushes. Idempotent.
    pub(crate) async fn produce_end(&mut self) -> Result<(), HttpError> {
        if self.frame.response_completed {
            return Ok(());
        }
        self.start_response(true)?;
        self.frame.response_completed = true;
        self.frame.state = RequestState::Completed;

        if let Err(e) = self.output.finish_body(&mut self.frame.encoder) {
            self.frame.keep_alive = false;
            return Err(e.into());
        }
        Ok(self.output.flush().await?)
    }

    /// Reads the next piece of the request body, `None` at its end.
    pub(crate) async fn read_body(&mut self) -> Result<Option<Bytes>, HttpError> {
        if let Some(rejection) = &self.frame.rejection {
            return Err(rejection.clone().into());
        }
        if self.frame.decoder.is_finished() {
            return Ok(None);
        }

        if self.frame.expect_continue {
            self.frame.expect_continue = false;
            if !self.frame.has_response_started() {
                self.output.write_continue();
                self.output.flush().await?;
            }
        }

        let engine = Arc::clone(&self.engine);
        let limits = &engine.config.limits;
        if !self.frame.body_timing_started {
            self.frame.body_timing_started = true;
            if let Some(rate) = limits.min_request_body_data_rate {
                self.timeout.start_request_body(rate);
            }
        }

        self.timeout.resume_timing_reads();
        loop {
            let result = self.input.read().await?;
            let completed = result.is_completed();
            let canceled = result.is_canceled();
            let buffer = result.buffer();
            let (item, consumed) = decode_body(&mut self.frame, buffer);
            let buffered = buffer.len();

            let item = match item {
                Ok(item) => item,
                Err(rejection) => {
                    self.input.advance(consumed, consumed)?;
                    return Err(self.fail_body(rejection));
                }
            };

            match item {
                Some(PayloadItem::Chunk(bytes)) => {
                    self.input.advance(consumed, consumed)?;
                    self.timeout.bytes_read(consumed);
                    self.timeout.pause_timing_reads();
                    if let Err(rejection) = self.frame.on_body_bytes(bytes.len(), limits) {
                        return Err(self.fail_body(rejection));
                    }
                    return Ok(Some(bytes));
                }
                Some(PayloadItem::Eof) => {
                    self.input.advance(consumed, consumed)?;
                    self.timeout.bytes_read(consumed);
                    self.timeout.stop_request_body();
                    return Ok(None);
                }
                None => {
                    self.input.advance(consumed, buffered)?;
                    self.timeout.bytes_read(consumed);
                }
            }

            if canceled {
                if self.control.take_timeout() == Some(TimeoutReason::ReadDataRate) {
                    return Err(self.fail_body(BadRequest::new(RequestRejectionReason::RequestBodyTimeout)));
                }
                if self.control.is_aborted() {
                    self.timeout.stop_request_body();
                    return Err(HttpError::ConnectionAborted);
                }
                continue;
            }
            if completed {
                let reason = self.frame.decoder.incomplete_reason();
                return Err(self.fail_body(BadRequest::new(reason)));
            }
        }
    }

    fn fail_body(&mut self, rejection: BadRequest) -> HttpError {
        self.timeout.stop_request_body();
        self.frame.keep_alive = false;
        self.frame.rejection = Some(rejection.clone());
        rejection.into()
    }
}

/// Parses as much of the request head as `buffer` holds.
fn parse_head(
    parser: &mut HttpParser,
    budget: &mut HeaderBudget,
    frame: &mut Frame,
    line_parsed: &mut bool,
    path_base: Option<&str>,
    buffer: &ReadBuffer,
    max_line_size: usize,
) -> Result<ParseStatus, BadRequest> {
    let mut builder = frame.head_builder(path_base);
    let mut start = 0;
    if !*line_parsed {
        let line = parser.parse_request_line(&mut builder, buffer, max_line_size)?;
        if !line.done {
            return Ok(line);
        }
        *line_parsed = true;
        start = line.consumed;
    }
    parser.parse_headers(&mut builder, buffer, start, budget)
}

/// Decodes one body item from the front of `buffer`, returning it with the bytes it used.
fn decode_body(frame: &mut Frame, buffer: &ReadBuffer) -> (Result<Option<PayloadItem>, BadRequest>, usize) {
    let mut cursor = buffer.cursor();
    let item = frame.decoder.decode(&mut cursor);
    (item, cursor.position())
}
