use bytes::{Bytes, BytesMut};
use futures::future::BoxFuture;
use http::{Method, StatusCode};
use tokio_util::sync::CancellationToken;

use crate::codec::HttpVersion;
use crate::headers::{RequestHeaders, ResponseHeaders};
use crate::protocol::{BoxError, HttpError, ResponseError, ResponseHead};

use super::http1::Http1Connection;

/// The application's view of one request and its response.
///
/// Borrowed from the connection for the duration of [`crate::handler::Handler::call`]; the
/// underlying buffers are reused by the next request on the same connection.
pub struct HttpContext<'a> {
    conn: &'a mut Http1Connection,
}

impl<'a> HttpContext<'a> {
    pub(crate) fn new(conn: &'a mut Http1Connection) -> Self {
        Self { conn }
    }

    pub fn connection_id(&self) -> u64 {
        self.conn.control.id()
    }

    pub fn method(&self) -> &Method {
        &self.conn.frame.request.method
    }

    pub fn version(&self) -> HttpVersion {
        self.conn.frame.request.version
    }

    /// The request target exactly as sent.
    pub fn raw_target(&self) -> &str {
        &self.conn.frame.request.raw_target
    }

    /// The decoded path, without the path base.
    pub fn path(&self) -> &str {
        &self.conn.frame.request.path
    }

    pub fn path_base(&self) -> &str {
        &self.conn.frame.request.path_base
    }

    pub fn query(&self) -> &str {
        &self.conn.frame.request.query
    }

    pub fn request_headers(&self) -> &RequestHeaders {
        &self.conn.frame.request.headers
    }

    pub fn request_headers_mut(&mut self) -> &mut RequestHeaders {
        &mut self.conn.frame.request.headers
    }

    /// Reads the next piece of the request body, `None` once it has been read in full.
    ///
    /// A malformed body fails with [`HttpError::BadRequest`]; the engine then answers with the
    /// matching status if the response has not started.
    pub async fn read_body(&mut self) -> Result<Option<Bytes>, HttpError> {
        self.conn.read_body().await
    }

    pub async fn read_body_to_end(&mut self) -> Result<Bytes, HttpError> {
        let Some(first) = self.conn.read_body().await? else {
            return Ok(Bytes::new());
        };
        let Some(second) = self.conn.read_body().await? else {
            return Ok(first);
        };

        let mut body = BytesMut::with_capacity(first.len() + second.len());
        body.extend_from_slice(&first);
        body.extend_from_slice(&second);
        while let Some(chunk) = self.conn.read_body().await? {
            body.extend_from_slice(&chunk);
        }
        Ok(body.freeze())
    }

    pub fn status(&self) -> StatusCode {
        self.conn.frame.response.status
    }

    pub fn set_status(&mut self, status: StatusCode) -> Result<(), ResponseError> {
        self.ensure_not_started()?;
        self.conn.frame.response.status = status;
        Ok(())
    }

    /// Overrides the canonical reason phrase.
    pub fn set_reason(&mut self, reason: impl Into<String>) -> Result<(), ResponseError> {
        self.ensure_not_started()?;
        self.conn.frame.response.reason = Some(reason.into());
        Ok(())
    }

    pub fn response_headers(&self) -> &ResponseHeaders {
        &self.conn.frame.response.headers
    }

    /// Mutating the headers fails with a read-only error once the response has started.
    pub fn response_headers_mut(&mut self) -> &mut ResponseHeaders {
        &mut self.conn.frame.response.headers
    }

    pub fn has_response_started(&self) -> bool {
        self.conn.frame.has_response_started()
    }

    /// Writes a piece of the response body, starting the response first if needed.
    pub async fn write(&mut self, data: &[u8]) -> Result<(), HttpError> {
        self.conn.write(data).await
    }

    pub async fn flush(&mut self) -> Result<(), HttpError> {
        self.conn.flush().await
    }

    /// Sends the response head now. The body is chunked unless a length was declared.
    pub fn start_response(&mut self) -> Result<(), HttpError> {
        self.conn.start_response(false)
    }

    /// Finishes the response before the handler returns.
    pub async fn complete_response(&mut self) -> Result<(), HttpError> {
        self.conn.produce_end().await
    }

    /// Registers a callback run right before the response head is written.
    ///
    /// Callbacks run in reverse registration order.
    pub fn on_starting<F>(&mut self, callback: F)
    where
        F: FnOnce(&mut ResponseHead) -> Result<(), BoxError> + Send + 'static,
    {
        self.conn.frame.on_starting.push(Box::new(callback));
    }

    /// Registers a callback run after the response is complete, in reverse registration order.
    pub fn on_completed<F>(&mut self, callback: F)
    where
        F: FnOnce() -> BoxFuture<'static, Result<(), BoxError>> + Send + 'static,
    {
        self.conn.frame.on_completed.push(Box::new(callback));
    }

    /// Cancelled when the client goes away or the connection is aborted.
    pub fn request_aborted(&self) -> CancellationToken {
        self.conn.frame.request_aborted.clone()
    }

    /// Drops the connection without finishing the response.
    pub fn abort(&mut self) {
        self.conn.frame.keep_alive = false;
        self.conn.control.abort();
    }

    fn ensure_not_started(&self) -> Result<(), ResponseError> {
        if self.conn.frame.has_response_started() {
            return Err(ResponseError::AlreadyStarted);
        }
        Ok(())
    }
}

impl std::fmt::Debug for HttpContext<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpContext")
            .field("connection_id", &self.connection_id())
            .field("method", self.method())
            .field("raw_target", &self.raw_target())
            .finish_non_exhaustive()
    }
}
