//! Per-request state of an HTTP/1.x connection and the framing decisions made on it.
//!
//! A [`Frame`] lives as long as its connection and is reset in place between requests, so the
//! header dictionaries and string buffers are reused.

use bytes::Bytes;
use futures::future::BoxFuture;
use http::{HeaderValue, Method, StatusCode, Uri};
use tokio_util::sync::CancellationToken;

use crate::codec::body::{PayloadDecoder, PayloadEncoder};
use crate::codec::chars::is_host;
use crate::codec::path::{decode_path, strip_path_base};
use crate::codec::{HeadersHandler, HttpVersion, KnownMethod, RequestLineHandler, StartLine};
use crate::config::Limits;
use crate::headers::{ConnectionOptions, KnownHeader, final_coding_is_chunked};
use crate::protocol::{
    BadRequest, BoxError, PayloadSize, RequestHead, RequestRejectionReason, ResponseError, ResponseHead, TargetForm,
};
use crate::timeout::DateValues;
use crate::utils::ensure;

use RequestRejectionReason::*;

/// Runs right before the response head is written and may still change it.
pub type OnStarting = Box<dyn FnOnce(&mut ResponseHead) -> Result<(), BoxError> + Send>;

/// Runs after the response has been completed.
pub type OnCompleted = Box<dyn FnOnce() -> BoxFuture<'static, Result<(), BoxError>> + Send>;

pub(crate) const SERVER_NAME: &str = "micro-engine";
static SERVER_LINE: &[u8] = b"Server: micro-engine\r\n";
static CONNECTION_CLOSE: &[u8] = b"Connection: close\r\n";
static CONNECTION_KEEP_ALIVE: &[u8] = b"Connection: keep-alive\r\n";
static TRANSFER_ENCODING_CHUNKED: &[u8] = b"Transfer-Encoding: chunked\r\n";
static CONTENT_LENGTH_ZERO: &[u8] = b"Content-Length: 0\r\n";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum RequestState {
    /// Waiting for the first byte of a request.
    Pending,
    /// Reading the request line and headers.
    Started,
    /// The head is parsed and the application owns the request.
    HeadersParsed,
    ResponseStarted,
    Completed,
}

pub(crate) struct Frame {
    pub(crate) request: RequestHead,
    pub(crate) response: ResponseHead,
    pub(crate) state: RequestState,
    pub(crate) keep_alive: bool,
    pub(crate) decoder: PayloadDecoder,
    pub(crate) encoder: PayloadEncoder,
    pub(crate) body_bytes_read: u64,
    pub(crate) body_timing_started: bool,
    pub(crate) expect_continue: bool,
    pub(crate) response_completed: bool,
    pub(crate) on_starting: Vec<OnStarting>,
    pub(crate) on_completed: Vec<OnCompleted>,
    pub(crate) errors: Vec<BoxError>,
    /// A body read failure; answered with its status when the response has not started.
    pub(crate) rejection: Option<BadRequest>,
    pub(crate) request_aborted: CancellationToken,
}

impl Frame {
    pub(crate) fn new(request_aborted: CancellationToken) -> Self {
        Self {
            request: RequestHead::new(),
            response: ResponseHead::new(),
            state: RequestState::Pending,
            keep_alive: true,
            decoder: PayloadDecoder::empty(),
            encoder: PayloadEncoder::empty(),
            body_bytes_read: 0,
            body_timing_started: false,
            expect_continue: false,
            response_completed: false,
            on_starting: Vec::new(),
            on_completed: Vec::new(),
            errors: Vec::new(),
            rejection: None,
            request_aborted,
        }
    }

    pub(crate) fn reset(&mut self, request_aborted: CancellationToken) {
        self.request.reset();
        self.response.reset();
        self.state = RequestState::Pending;
        self.keep_alive = true;
        self.decoder = PayloadDecoder::empty();
        self.encoder = PayloadEncoder::empty();
        self.body_bytes_read = 0;
        self.body_timing_started = false;
        self.expect_continue = false;
        self.response_completed = false;
        self.on_starting.clear();
        self.on_completed.clear();
        self.errors.clear();
        self.rejection = None;
        self.request_aborted = request_aborted;
    }

    pub(crate) fn has_response_started(&self) -> bool {
        matches!(self.state, RequestState::ResponseStarted | RequestState::Completed)
    }

    pub(crate) fn is_head(&self) -> bool {
        self.request.method == Method::HEAD
    }

    /// Request-side checks once every header is in: keep-alive, Host and body framing.
    pub(crate) fn on_request_head(&mut self, limits: &Limits) -> Result<(), BadRequest> {
        let headers = &self.request.headers;
        let options = headers.get_known(KnownHeader::Connection).map(ConnectionOptions::parse).unwrap_or_default();
        self.keep_alive = match self.request.version {
            HttpVersion::Http11 => !options.close,
            HttpVersion::Http10 => options.keep_alive && !options.close,
        };

        self.validate_host()?;

        let size = self.request_payload(limits)?;
        self.decoder = PayloadDecoder::from_size(size);
        self.expect_continue = !size.is_empty()
            && self.request.version == HttpVersion::Http11
            && self
                .request
                .headers
                .first_known(KnownHeader::Expect)
                .is_some_and(|expect| expect.as_bytes().eq_ignore_ascii_case(b"100-continue"));
        self.state = RequestState::HeadersParsed;
        Ok(())
    }

    fn validate_host(&mut self) -> Result<(), BadRequest> {
        let (count, host) = match self.request.headers.get_known(KnownHeader::Host) {
            Some(values) => (values.len(), values.first().cloned()),
            None => (0, None),
        };
        ensure!(count <= 1, BadRequest::new(MultipleHostHeaders));

        if self.request.target_form == TargetForm::Absolute
            && let Some(authority) = &self.request.authority
        {
            // the authority of an absolute-form target wins over the Host header
            let value = HeaderValue::from_str(authority).map_err(|_| BadRequest::new(InvalidHostHeader))?;
            self.request.headers.set_known(KnownHeader::Host, value).map_err(|_| BadRequest::new(InvalidHostHeader))?;
            return Ok(());
        }

        match host {
            None if self.request.version == HttpVersion::Http11 => Err(BadRequest::new(MissingHostHeader)),
            None => Ok(()),
            Some(host) => {
                let bytes = host.as_bytes();
                ensure!(bytes.iter().all(|&b| is_host(b)), BadRequest::with_detail(InvalidHostHeader, bytes));
                Ok(())
            }
        }
    }

    fn request_payload(&self, limits: &Limits) -> Result<PayloadSize, BadRequest> {
        let headers = &self.request.headers;
        let version = self.request.version;

        if let Some(codings) = headers.get_known(KnownHeader::TransferEncoding) {
            ensure!(version == HttpVersion::Http11, BadRequest::new(TransferEncodingHttp10));
            ensure!(
                !headers.contains_known(KnownHeader::ContentLength),
                BadRequest::new(ContentLengthWithTransferEncoding)
            );
            ensure!(final_coding_is_chunked(codings), BadRequest::new(FinalTransferCodingNotChunked));
            return Ok(PayloadSize::Chunked);
        }

        if let Some(length) = headers.content_length() {
            if let Some(max) = limits.max_request_body_size {
                ensure!(length <= max, BadRequest::new(RequestBodyTooLarge));
            }
            return Ok(if length == 0 { PayloadSize::Empty } else { PayloadSize::Length(length) });
        }

        let method = &self.request.method;
        if self.keep_alive && (method == Method::POST || method == Method::PUT) {
            let reason = if version == HttpVersion::Http11 { LengthRequired } else { LengthRequiredHttp10 };
            return Err(BadRequest::new(reason));
        }
        Ok(PayloadSize::Empty)
    }

    /// Counts chunked body bytes against the configured maximum.
    pub(crate) fn on_body_bytes(&mut self, count: usize, limits: &Limits) -> Result<(), BadRequest> {
        self.body_bytes_read += count as u64;
        if self.decoder.is_chunked()
            && let Some(max) = limits.max_request_body_size
        {
            ensure!(self.body_bytes_read <= max, BadRequest::new(RequestBodyTooLarge));
        }
        Ok(())
    }

    /// Decides the response framing and adds the server-owned headers.
    pub(crate) fn finalize_response_head(
        &mut self,
        app_completed: bool,
        stop_requested: bool,
        add_server_header: bool,
        date: &DateValues,
    ) -> Result<(), ResponseError> {
        let status = self.response.status;
        let body_forbidden = self.response.is_body_forbidden();
        let is_head = self.is_head();
        let version = self.request.version;
        let headers = &mut self.response.headers;

        let options = headers.get_known(KnownHeader::Connection).map(ConnectionOptions::parse).unwrap_or_default();
        if options.close {
            self.keep_alive = false;
        }

        let transfer_encoding = headers.get_known(KnownHeader::TransferEncoding).map(final_coding_is_chunked);

        self.encoder = if body_forbidden {
            ensure!(transfer_encoding.is_none(), ResponseError::TransferEncodingNotAllowed { status });
            PayloadEncoder::empty()
        } else if let Some(chunked) = transfer_encoding {
            if !chunked {
                // only a final chunked coding delimits the body
                self.keep_alive = false;
            }
            PayloadEncoder::until_close()
        } else if let Some(length) = headers.content_length() {
            PayloadEncoder::fix_length(length)
        } else if app_completed {
            headers.set_raw(KnownHeader::ContentLength, HeaderValue::from_static("0"), Bytes::from_static(CONTENT_LENGTH_ZERO))?;
            PayloadEncoder::fix_length(0)
        } else if version == HttpVersion::Http11 && !is_head {
            headers.set_raw(
                KnownHeader::TransferEncoding,
                HeaderValue::from_static("chunked"),
                Bytes::from_static(TRANSFER_ENCODING_CHUNKED),
            )?;
            PayloadEncoder::chunked()
        } else if is_head {
            PayloadEncoder::empty()
        } else {
            self.keep_alive = false;
            PayloadEncoder::until_close()
        };

        if is_head {
            self.encoder = PayloadEncoder::empty();
        }

        if stop_requested {
            self.keep_alive = false;
        }

        if !self.keep_alive && !options.close {
            headers.set_raw(KnownHeader::Connection, HeaderValue::from_static("close"), Bytes::from_static(CONNECTION_CLOSE))?;
        } else if self.keep_alive && version == HttpVersion::Http10 && !options.keep_alive {
            headers.set_raw(
                KnownHeader::Connection,
                HeaderValue::from_static("keep-alive"),
                Bytes::from_static(CONNECTION_KEEP_ALIVE),
            )?;
        }

        if !headers.contains_known(KnownHeader::Date) {
            headers.set_raw(KnownHeader::Date, date.value.clone(), date.raw.clone())?;
        }
        if add_server_header && !headers.contains_known(KnownHeader::Server) {
            headers.set_raw(KnownHeader::Server, HeaderValue::from_static(SERVER_NAME), Bytes::from_static(SERVER_LINE))?;
        }

        headers.set_read_only();
        self.state = RequestState::ResponseStarted;
        Ok(())
    }

    /// Replaces whatever the application set with a bodiless error response.
    pub(crate) fn set_error_response(&mut self, status: StatusCode) {
        self.response.reset();
        self.response.status = status;
    }

    pub(crate) fn head_builder<'a>(&'a mut self, path_base: Option<&'a str>) -> RequestHeadBuilder<'a> {
        RequestHeadBuilder { head: &mut self.request, path_base }
    }
}

/// Fills a [`RequestHead`] from parser callbacks.
pub(crate) struct RequestHeadBuilder<'a> {
    head: &'a mut RequestHead,
    path_base: Option<&'a str>,
}

impl RequestHeadBuilder<'_> {
    fn set_path(&mut self, raw: &[u8], encoded: bool, has_dot_segments: bool) -> Result<(), BadRequest> {
        let decoded = decode_path(raw, encoded, has_dot_segments)?;
        match self.path_base.and_then(|base| strip_path_base(&decoded, base)) {
            Some(rest) => {
                let base_len = decoded.len() - rest.len();
                self.head.path_base.push_str(&decoded[..base_len]);
                self.head.path.push_str(rest);
            }
            None => self.head.path.push_str(&decoded),
        }
        Ok(())
    }
}

impl RequestLineHandler for RequestHeadBuilder<'_> {
    fn on_start_line(&mut self, line: StartLine<'_>) -> Result<(), BadRequest> {
        let head = &mut *self.head;
        head.method = match line.method.to_method() {
            Some(method) => method,
            None => Method::from_bytes(line.custom_method)
                .map_err(|_| BadRequest::with_detail(InvalidRequestLine, line.custom_method))?,
        };
        head.version = line.version;

        let target = std::str::from_utf8(line.target).map_err(|_| BadRequest::with_detail(InvalidRequestTarget, line.target))?;
        head.raw_target.push_str(target);

        let query =
            std::str::from_utf8(line.query).map_err(|_| BadRequest::with_detail(InvalidRequestTarget, line.target))?;

        match line.target.first() {
            Some(b'/') => {
                head.target_form = TargetForm::Origin;
                head.query.push_str(query);
                self.set_path(line.path, line.path_encoded, line.has_dot_segments)
            }
            Some(b'*') if line.target == b"*" && line.method == KnownMethod::Options => {
                head.target_form = TargetForm::Asterisk;
                Ok(())
            }
            _ if line.method == KnownMethod::Connect => {
                ensure!(line.target.iter().all(|&b| is_host(b)), BadRequest::with_detail(InvalidRequestTarget, line.target));
                head.target_form = TargetForm::Authority;
                head.authority = Some(target.to_owned());
                Ok(())
            }
            _ => {
                let uri = Uri::try_from(target).map_err(|_| BadRequest::with_detail(InvalidRequestTarget, line.target))?;
                let authority = match (uri.scheme(), uri.authority()) {
                    (Some(_), Some(authority)) => authority.as_str().to_owned(),
                    _ => return Err(BadRequest::with_detail(InvalidRequestTarget, line.target)),
                };
                head.target_form = TargetForm::Absolute;
                head.authority = Some(authority);
                head.query.push_str(uri.query().unwrap_or(""));
                let path = uri.path().as_bytes();
                let has_dots = path.split(|&b| b == b'/').any(|s| s == b"." || s == b"..");
                self.set_path(path, path.contains(&b'%'), has_dots)
            }
        }
    }
}

impl HeadersHandler for RequestHeadBuilder<'_> {
    fn on_header(&mut self, name: &[u8], value: &[u8]) -> Result<(), BadRequest> {
        self.head.headers.append_from_wire(name, value)
    }

    fn on_headers_complete(&mut self) -> Result<(), BadRequest> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer::ReadBuffer;
    use crate::codec::{HeaderBudget, HttpParser};
    use crate::timeout::DateCache;

    fn parse(raw: &str, path_base: Option<&str>) -> Result<Frame, BadRequest> {
        let mut buffer = ReadBuffer::new();
        buffer.push(Bytes::copy_from_slice(raw.as_bytes()));
        let mut frame = Frame::new(CancellationToken::new());
        let mut parser = HttpParser::new();
        let mut budget = HeaderBudget::new(100, 32 * 1024);
        let mut builder = frame.head_builder(path_base);
        let line = parser.parse_request_line(&mut builder, &buffer, 8192)?;
        let headers = parser.parse_headers(&mut builder, &buffer, line.consumed, &mut budget)?;
        assert!(headers.done);
        frame.on_request_head(&Limits::default())?;
        Ok(frame)
    }

    fn reason(raw: &str) -> RequestRejectionReason {
        parse(raw, None).err().map(|e| e.reason()).unwrap()
    }

    #[test]
    fn origin_form_request() {
        let frame = parse("GET /a/../b%20c?x=1 HTTP/1.1\r\nHost: example.com\r\n\r\n", None).unwrap();
        let request = &frame.request;
        assert_eq!(request.method, Method::GET);
        assert_eq!(request.raw_target, "/a/../b%20c?x=1");
        assert_eq!(request.path, "/b c");
        assert_eq!(request.query, "x=1");
        assert_eq!(request.target_form, TargetForm::Origin);
        assert!(frame.keep_alive);
        assert!(frame.decoder.is_empty());
    }

    #[test]
    fn path_base_is_split_off() {
        let frame = parse("GET /App/users HTTP/1.1\r\nHost: h\r\n\r\n", Some("/app")).unwrap();
        assert_eq!(frame.request.path_base, "/App");
        assert_eq!(frame.request.path, "/users");
    }

    #[test]
    fn absolute_form_overrides_host() {
        let frame = parse("GET http://real.example:8080/p?q HTTP/1.1\r\nHost: other\r\n\r\n", None).unwrap();
        assert_eq!(frame.request.target_form, TargetForm::Absolute);
        assert_eq!(frame.request.path, "/p");
        assert_eq!(frame.request.query, "q");
        assert_eq!(frame.request.headers.first_known(KnownHeader::Host).unwrap(), "real.example:8080");
    }

    #[test]
    fn authority_and_asterisk_forms() {
        let frame = parse("CONNECT example.com:443 HTTP/1.1\r\nHost: example.com:443\r\n\r\n", None).unwrap();
        assert_eq!(frame.request.target_form, TargetForm::Authority);
        assert_eq!(frame.request.authority.as_deref(), Some("example.com:443"));

        let frame = parse("OPTIONS * HTTP/1.1\r\nHost: h\r\n\r\n", None).unwrap();
        assert_eq!(frame.request.target_form, TargetForm::Asterisk);

        assert_eq!(reason("GET * HTTP/1.1\r\nHost: h\r\n\r\n"), InvalidRequestTarget);
        assert_eq!(reason("GET example.com HTTP/1.1\r\nHost: h\r\n\r\n"), InvalidRequestTarget);
    }

    #[test]
    fn host_validation() {
        assert_eq!(reason("GET / HTTP/1.1\r\n\r\n"), MissingHostHeader);
        assert_eq!(reason("GET / HTTP/1.1\r\nHost: a\r\nHost: b\r\n\r\n"), MultipleHostHeaders);
        assert_eq!(reason("GET / HTTP/1.1\r\nHost: a b\r\n\r\n"), InvalidHostHeader);
        assert!(parse("GET / HTTP/1.0\r\n\r\n", None).is_ok());
    }

    #[test]
    fn body_framing() {
        let frame = parse("POST / HTTP/1.1\r\nHost: h\r\nContent-Length: 5\r\n\r\n", None).unwrap();
        assert!(!frame.decoder.is_chunked() && !frame.decoder.is_empty());

        let frame = parse("POST / HTTP/1.1\r\nHost: h\r\nTransfer-Encoding: gzip, chunked\r\n\r\n", None).unwrap();
        assert!(frame.decoder.is_chunked());

        let raw = "POST / HTTP/1.1\r\nHost: h\r\nTransfer-Encoding: chunked\r\nContent-Length: 5\r\n\r\n";
        assert_eq!(reason(raw), ContentLengthWithTransferEncoding);
        assert_eq!(reason("POST / HTTP/1.1\r\nHost: h\r\nTransfer-Encoding: chunked, gzip\r\n\r\n"), FinalTransferCodingNotChunked);
        assert_eq!(reason("POST / HTTP/1.0\r\nTransfer-Encoding: chunked\r\n\r\n"), TransferEncodingHttp10);
        assert_eq!(reason("POST / HTTP/1.1\r\nHost: h\r\n\r\n"), LengthRequired);
        assert_eq!(reason("PUT / HTTP/1.0\r\nConnection: keep-alive\r\n\r\n"), LengthRequiredHttp10);
        assert!(parse("POST / HTTP/1.0\r\n\r\n", None).is_ok());
        assert_eq!(reason("POST / HTTP/1.1\r\nHost: h\r\nContent-Length: 30000001\r\n\r\n"), RequestBodyTooLarge);
    }

    #[test]
    fn keep_alive_defaults_per_version() {
        assert!(!parse("GET / HTTP/1.1\r\nHost: h\r\nConnection: close\r\n\r\n", None).unwrap().keep_alive);
        assert!(!parse("GET / HTTP/1.0\r\n\r\n", None).unwrap().keep_alive);
        assert!(parse("GET / HTTP/1.0\r\nConnection: keep-alive\r\n\r\n", None).unwrap().keep_alive);
    }

    #[test]
    fn expect_continue_needs_a_body() {
        let frame = parse("POST / HTTP/1.1\r\nHost: h\r\nContent-Length: 1\r\nExpect: 100-continue\r\n\r\n", None).unwrap();
        assert!(frame.expect_continue);
        let frame = parse("GET / HTTP/1.1\r\nHost: h\r\nExpect: 100-continue\r\n\r\n", None).unwrap();
        assert!(!frame.expect_continue);
    }

    fn finalize(frame: &mut Frame, app_completed: bool) -> Result<(), ResponseError> {
        let date = DateCache::new().get();
        frame.finalize_response_head(app_completed, false, true, &date)
    }

    #[test]
    fn completed_response_gets_zero_length() {
        let mut frame = parse("GET / HTTP/1.1\r\nHost: h\r\n\r\n", None).unwrap();
        finalize(&mut frame, true).unwrap();
        assert_eq!(frame.response.headers.content_length(), Some(0));
        assert!(frame.response.headers.raw(KnownHeader::Date).is_some());
        assert_eq!(frame.response.headers.first_known(KnownHeader::Server).unwrap(), SERVER_NAME);
        assert!(frame.keep_alive);
        assert!(frame.response.headers.is_read_only());
    }

    #[test]
    fn streaming_http11_response_is_auto_chunked() {
        let mut frame = parse("GET / HTTP/1.1\r\nHost: h\r\n\r\n", None).unwrap();
        finalize(&mut frame, false).unwrap();
        assert!(frame.encoder.is_chunked());
        assert_eq!(frame.response.headers.first_known(KnownHeader::TransferEncoding).unwrap(), "chunked");
    }

    #[test]
    fn streaming_http10_response_closes_instead_of_chunking() {
        let mut frame = parse("GET / HTTP/1.0\r\nConnection: keep-alive\r\n\r\n", None).unwrap();
        finalize(&mut frame, false).unwrap();
        assert!(!frame.encoder.is_chunked());
        assert!(!frame.keep_alive);
        assert!(!frame.response.headers.contains_known(KnownHeader::TransferEncoding));
        assert_eq!(frame.response.headers.first_known(KnownHeader::Connection).unwrap(), "close");
    }

    #[test]
    fn non_chunked_transfer_coding_disables_keep_alive() {
        let mut frame = parse("GET / HTTP/1.1\r\nHost: h\r\n\r\n", None).unwrap();
        frame.response.headers.set("Transfer-Encoding", HeaderValue::from_static("gzip")).unwrap();
        finalize(&mut frame, false).unwrap();
        assert!(!frame.keep_alive);
    }

    #[test]
    fn no_content_rejects_transfer_encoding() {
        let mut frame = parse("GET / HTTP/1.1\r\nHost: h\r\n\r\n", None).unwrap();
        frame.response.status = StatusCode::NO_CONTENT;
        frame.response.headers.set("Transfer-Encoding", HeaderValue::from_static("chunked")).unwrap();
        assert!(matches!(finalize(&mut frame, true), Err(ResponseError::TransferEncodingNotAllowed { .. })));
    }

    #[test]
    fn head_response_keeps_declared_length_without_body() {
        let mut frame = parse("HEAD / HTTP/1.1\r\nHost: h\r\n\r\n", None).unwrap();
        frame.response.headers.set("Content-Length", HeaderValue::from_static("10")).unwrap();
        finalize(&mut frame, false).unwrap();
        assert!(frame.encoder.is_empty());
        assert_eq!(frame.response.headers.content_length(), Some(10));
    }

    #[test]
    fn reset_clears_request_state() {
        let mut frame = parse("POST /x?y HTTP/1.1\r\nHost: h\r\nContent-Length: 3\r\nX-A: 1\r\n\r\n", None).unwrap();
        frame.errors.push("boom".into());
        frame.reset(CancellationToken::new());
        assert!(frame.request.headers.is_empty());
        assert!(frame.request.path.is_empty());
        assert!(frame.request.query.is_empty());
        assert!(frame.decoder.is_empty());
        assert!(frame.errors.is_empty());
        assert_eq!(frame.state, RequestState::Pending);
    }
}
