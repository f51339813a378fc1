use std::error::Error as StdError;
use std::io;
use std::sync::Arc;

use http::StatusCode;
use thiserror::Error;

use crate::utils::{MAX_ESCAPED_LEN, escape_bytes};

/// A failure coming out of application code.
pub type BoxError = Box<dyn StdError + Send + Sync>;

#[derive(Debug, Error)]
pub enum HttpError {
    #[error("bad request: {source}")]
    BadRequest {
        #[from]
        source: BadRequest,
    },

    #[error("response error: {source}")]
    Response {
        #[from]
        source: ResponseError,
    },

    #[error("pipe error: {source}")]
    Pipe {
        #[from]
        source: PipeError,
    },

    #[error("application error: {source}")]
    Application {
        #[from]
        source: ApplicationErrors,
    },

    #[error("io error: {source}")]
    Io {
        #[from]
        source: io::Error,
    },

    #[error("the connection was aborted")]
    ConnectionAborted,
}

/// Why a request was rejected before it reached the application.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RequestRejectionReason {
    InvalidRequestLine,
    InvalidRequestTarget,
    UnrecognizedHttpVersion,
    RequestLineTooLong,
    InvalidRequestHeader,
    InvalidRequestHeadersNoCrlf,
    HeadersCorruptedInvalidHeaderSequence,
    HeaderLineMustNotStartWithWhitespace,
    NoColonCharacterFoundInHeaderLine,
    WhitespaceIsNotAllowedInHeaderName,
    InvalidCharactersInHeaderName,
    InvalidCharactersInHeaderValue,
    MalformedRequestInvalidHeaders,
    HeadersExceedMaxTotalSize,
    TooManyHeaders,
    InvalidContentLength,
    MultipleContentLengths,
    LengthRequired,
    LengthRequiredHttp10,
    FinalTransferCodingNotChunked,
    TransferEncodingHttp10,
    ContentLengthWithTransferEncoding,
    BadChunkSizeData,
    BadChunkSuffix,
    BadChunkExtension,
    ChunkedRequestIncomplete,
    UnexpectedEndOfRequestContent,
    RequestBodyTooLarge,
    RequestHeadersTimeout,
    RequestBodyTimeout,
    MissingHostHeader,
    MultipleHostHeaders,
    InvalidHostHeader,
}

impl RequestRejectionReason {
    pub fn status(self) -> StatusCode {
        use RequestRejectionReason::*;
        match self {
            UnrecognizedHttpVersion => StatusCode::HTTP_VERSION_NOT_SUPPORTED,
            RequestLineTooLong => StatusCode::URI_TOO_LONG,
            HeadersExceedMaxTotalSize | TooManyHeaders => StatusCode::REQUEST_HEADER_FIELDS_TOO_LARGE,
            LengthRequired => StatusCode::LENGTH_REQUIRED,
            RequestBodyTooLarge => StatusCode::PAYLOAD_TOO_LARGE,
            RequestHeadersTimeout | RequestBodyTimeout => StatusCode::REQUEST_TIMEOUT,
            _ => StatusCode::BAD_REQUEST,
        }
    }

    pub fn message(self) -> &'static str {
        use RequestRejectionReason::*;
        match self {
            InvalidRequestLine => "invalid request line",
            InvalidRequestTarget => "invalid request target",
            UnrecognizedHttpVersion => "unrecognized HTTP version",
            RequestLineTooLong => "request line too long",
            InvalidRequestHeader => "invalid request header",
            InvalidRequestHeadersNoCrlf => "invalid request headers: missing final CRLF in header fields",
            HeadersCorruptedInvalidHeaderSequence => "malformed request: invalid headers",
            HeaderLineMustNotStartWithWhitespace => "header line must not start with whitespace",
            NoColonCharacterFoundInHeaderLine => "no ':' character found in header line",
            WhitespaceIsNotAllowedInHeaderName => "whitespace is not allowed in header name",
            InvalidCharactersInHeaderName => "invalid characters in header name",
            InvalidCharactersInHeaderValue => "invalid characters in header value",
            MalformedRequestInvalidHeaders => "malformed request: invalid headers",
            HeadersExceedMaxTotalSize => "request headers too long",
            TooManyHeaders => "request contains too many headers",
            InvalidContentLength => "invalid content-length",
            MultipleContentLengths => "multiple content-length headers",
            LengthRequired => "length required",
            LengthRequiredHttp10 => "length required for HTTP/1.0 request with body",
            FinalTransferCodingNotChunked => "the final transfer coding is not chunked",
            TransferEncodingHttp10 => "transfer-encoding is not supported on HTTP/1.0 requests",
            ContentLengthWithTransferEncoding => "content-length and transfer-encoding are both present",
            BadChunkSizeData => "bad chunk size data",
            BadChunkSuffix => "bad chunk suffix",
            BadChunkExtension => "bad chunk extension",
            ChunkedRequestIncomplete => "chunked request incomplete",
            UnexpectedEndOfRequestContent => "unexpected end of request content",
            RequestBodyTooLarge => "request body too large",
            RequestHeadersTimeout => "reading the request headers timed out",
            RequestBodyTimeout => "reading the request body timed out due to data arriving too slowly",
            MissingHostHeader => "request is missing Host header",
            MultipleHostHeaders => "multiple Host headers",
            InvalidHostHeader => "invalid Host header",
        }
    }
}

/// The distinguished request rejection: it always maps to a 4xx/5xx response and ends the
/// connection after that response.
#[derive(Debug, Clone, Error)]
#[error("{}{}", .reason.message(), detail_suffix(.detail.as_deref()))]
pub struct BadRequest {
    reason: RequestRejectionReason,
    detail: Option<String>,
}

impl BadRequest {
    pub fn new(reason: RequestRejectionReason) -> Self {
        Self { reason, detail: None }
    }

    /// Attaches an escaped copy of the offending bytes, only when INFO logs are enabled.
    pub fn with_detail(reason: RequestRejectionReason, bytes: &[u8]) -> Self {
        let detail = tracing::enabled!(tracing::Level::INFO).then(|| escape_bytes(bytes, MAX_ESCAPED_LEN));
        Self { reason, detail }
    }

    pub fn reason(&self) -> RequestRejectionReason {
        self.reason
    }

    pub fn status(&self) -> StatusCode {
        self.reason.status()
    }

    pub fn detail(&self) -> Option<&str> {
        self.detail.as_deref()
    }
}

impl From<RequestRejectionReason> for BadRequest {
    fn from(reason: RequestRejectionReason) -> Self {
        Self::new(reason)
    }
}

fn detail_suffix(detail: Option<&str>) -> String {
    detail.map(|detail| format!(": '{detail}'")).unwrap_or_default()
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum HeaderError {
    #[error("the response headers are read-only after the response has started")]
    ReadOnly,

    #[error("an item with the same key has already been added: {name}")]
    DuplicateKey { name: String },

    #[error("invalid content-length: {value}")]
    InvalidContentLength { value: String },

    #[error("invalid header name: {name}")]
    InvalidName { name: String },

    #[error("invalid header value for {name}")]
    InvalidValue { name: String },
}

impl HeaderError {
    pub fn duplicate_key<S: ToString>(name: S) -> Self {
        Self::DuplicateKey { name: name.to_string() }
    }

    pub fn invalid_content_length<S: ToString>(value: S) -> Self {
        Self::InvalidContentLength { value: value.to_string() }
    }

    pub fn invalid_name<S: ToString>(name: S) -> Self {
        Self::InvalidName { name: name.to_string() }
    }

    pub fn invalid_value<S: ToString>(name: S) -> Self {
        Self::InvalidValue { name: name.to_string() }
    }
}

#[derive(Debug, Clone, Error)]
pub enum PipeError {
    #[error("a read is already in progress, advance must be called before reading again")]
    ConcurrentRead,

    #[error("advance called without a preceding read")]
    NoActiveRead,

    #[error("invalid advance: consumed {consumed}, examined {examined}, buffered {buffered}")]
    InvalidAdvance { consumed: usize, examined: usize, buffered: usize },

    #[error("the writer failed: {source}")]
    Transport {
        #[source]
        source: Arc<io::Error>,
    },
}

impl PipeError {
    pub fn transport(e: io::Error) -> Self {
        Self::Transport { source: Arc::new(e) }
    }
}

#[derive(Debug, Error)]
pub enum ResponseError {
    #[error("response content-length mismatch: too many bytes written ({written} of {declared})")]
    TooManyBytesWritten { written: u64, declared: u64 },

    #[error("response content-length mismatch: too few bytes written ({written} of {declared})")]
    TooFewBytesWritten { written: u64, declared: u64 },

    #[error("writing to the response body is invalid for responses with status code {status}")]
    BodyNotAllowed { status: StatusCode },

    #[error("transfer-encoding set on a {status} response")]
    TransferEncodingNotAllowed { status: StatusCode },

    #[error("the response has already started")]
    AlreadyStarted,

    #[error("the response has already completed")]
    Completed,

    #[error("the response was aborted")]
    Aborted,

    #[error("header error: {source}")]
    Header {
        #[from]
        source: HeaderError,
    },

    #[error("io error: {source}")]
    Io {
        #[from]
        source: io::Error,
    },
}

/// Several failures reported by one request, in the order they happened.
#[derive(Debug, Error)]
#[error("{} application error(s){}", .errors.len(), join_errors(.errors))]
pub struct ApplicationErrors {
    errors: Vec<BoxError>,
}

impl ApplicationErrors {
    pub fn new(errors: Vec<BoxError>) -> Self {
        Self { errors }
    }

    pub fn errors(&self) -> &[BoxError] {
        &self.errors
    }

    pub fn into_inner(self) -> Vec<BoxError> {
        self.errors
    }
}

fn join_errors(errors: &[BoxError]) -> String {
    errors.iter().enumerate().map(|(i, e)| format!("{} {e}", if i == 0 { ':' } else { ';' })).collect()
}

/// A panic caught while running application code.
#[derive(Debug, Error)]
#[error("application panicked: {message}")]
pub struct PanicError {
    message: String,
}

impl PanicError {
    pub(crate) fn from_payload(payload: &(dyn std::any::Any + Send)) -> Self {
        let message = if let Some(s) = payload.downcast_ref::<&str>() {
            (*s).to_owned()
        } else if let Some(s) = payload.downcast_ref::<String>() {
            s.clone()
        } else {
            "unknown panic payload".to_owned()
        };
        Self { message }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejection_status_codes() {
        assert_eq!(RequestRejectionReason::RequestLineTooLong.status(), StatusCode::URI_TOO_LONG);
        assert_eq!(RequestRejectionReason::TooManyHeaders.status(), StatusCode::REQUEST_HEADER_FIELDS_TOO_LARGE);
        assert_eq!(RequestRejectionReason::LengthRequired.status(), StatusCode::LENGTH_REQUIRED);
        assert_eq!(RequestRejectionReason::LengthRequiredHttp10.status(), StatusCode::BAD_REQUEST);
        assert_eq!(RequestRejectionReason::RequestHeadersTimeout.status(), StatusCode::REQUEST_TIMEOUT);
        assert_eq!(RequestRejectionReason::UnrecognizedHttpVersion.status(), StatusCode::HTTP_VERSION_NOT_SUPPORTED);
        assert_eq!(RequestRejectionReason::RequestBodyTooLarge.status(), StatusCode::PAYLOAD_TOO_LARGE);
    }

    #[test]
    fn bad_request_display_without_detail() {
        let e = BadRequest::new(RequestRejectionReason::InvalidRequestLine);
        assert_eq!(e.to_string(), "invalid request line");
        assert_eq!(e.detail(), None);
    }

    #[test]
    fn bad_request_display_with_detail() {
        let e = BadRequest { reason: RequestRejectionReason::InvalidRequestTarget, detail: Some("/a\\x00".to_owned()) };
        assert_eq!(e.to_string(), "invalid request target: '/a\\x00'");
        assert!(e.source().is_none());
    }

    #[test]
    fn application_errors_display() {
        let errors = ApplicationErrors::new(vec!["first".into(), "second".into()]);
        assert_eq!(errors.to_string(), "2 application error(s): first; second");
        assert_eq!(ApplicationErrors::new(Vec::new()).to_string(), "0 application error(s)");
    }

    #[test]
    fn panic_payloads() {
        let e = PanicError::from_payload(&"boom");
        assert_eq!(e.to_string(), "application panicked: boom");
        let e = PanicError::from_payload(&String::from("bang"));
        assert_eq!(e.to_string(), "application panicked: bang");
    }
}
