//! The HTTP/1.x request-line and header-field parser.
//!
//! The parser is stateless between calls: it reports how far it got through a
//! [`ParseStatus`] and the caller hands it the same (grown) buffer again. Parsed pieces are
//! passed to a handler as borrowed slices, so nothing is allocated for the common case of a
//! line that sits inside a single buffer segment. A line spanning segments is first copied
//! into a scratch buffer and then goes through exactly the same line routine.

use tracing::trace;

use crate::buffer::ReadBuffer;
use crate::codec::chars::{is_target, is_token, is_whitespace};
use crate::codec::known::{HttpVersion, KnownMethod, known_method, known_version};
use crate::protocol::{BadRequest, RequestRejectionReason};
use crate::utils::ensure;

use RequestRejectionReason::*;

/// The pieces of a request line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StartLine<'a> {
    pub method: KnownMethod,
    /// The method token when `method` is [`KnownMethod::Custom`], empty otherwise.
    pub custom_method: &'a [u8],
    pub version: HttpVersion,
    /// The raw request target.
    pub target: &'a [u8],
    /// The target up to the query.
    pub path: &'a [u8],
    /// The query without its `?`.
    pub query: &'a [u8],
    /// The path contains `%`.
    pub path_encoded: bool,
    /// The path contains a `.` or `..` segment.
    pub has_dot_segments: bool,
}

pub trait RequestLineHandler {
    fn on_start_line(&mut self, line: StartLine<'_>) -> Result<(), BadRequest>;
}

pub trait HeadersHandler {
    fn on_header(&mut self, name: &[u8], value: &[u8]) -> Result<(), BadRequest>;

    fn on_headers_complete(&mut self) -> Result<(), BadRequest>;
}

/// How far a parse call got. Both offsets are absolute positions in the buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParseStatus {
    pub done: bool,
    pub consumed: usize,
    pub examined: usize,
}

impl ParseStatus {
    fn done(consumed: usize) -> Self {
        Self { done: true, consumed, examined: consumed }
    }

    fn incomplete(consumed: usize, examined: usize) -> Self {
        Self { done: false, consumed, examined }
    }
}

/// Header count and byte allowance left for the current request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HeaderBudget {
    max_count: usize,
    max_bytes: usize,
    remaining_count: usize,
    remaining_bytes: usize,
}

impl HeaderBudget {
    pub fn new(max_count: usize, max_bytes: usize) -> Self {
        Self { max_count, max_bytes, remaining_count: max_count, remaining_bytes: max_bytes }
    }

    pub fn reset(&mut self) {
        self.remaining_count = self.max_count;
        self.remaining_bytes = self.max_bytes;
    }
}

#[derive(Debug, Default)]
pub struct HttpParser {
    scratch: Vec<u8>,
}

impl HttpParser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses the request line at the start of `buffer`.
    ///
    /// Fails with [`RequestRejectionReason::RequestLineTooLong`] as soon as `max_line_size`
    /// bytes are buffered without a line feed.
    pub fn parse_request_line<H: RequestLineHandler>(
        &mut self,
        handler: &mut H,
        buffer: &ReadBuffer,
        max_line_size: usize,
    ) -> Result<ParseStatus, BadRequest> {
        let first = buffer.first_segment();
        let window = &first[..first.len().min(max_line_size)];
        if let Some(lf) = memchr::memchr(b'\n', window) {
            parse_start_line(handler, &first[..=lf])?;
            return Ok(ParseStatus::done(lf + 1));
        }

        let lf = if buffer.is_single_segment() { None } else { buffer.find_byte(0, b'\n', max_line_size) };
        match lf {
            Some(lf) => {
                let line = buffer.contiguous(0..lf + 1, &mut self.scratch);
                parse_start_line(handler, line)?;
                Ok(ParseStatus::done(lf + 1))
            }
            None => {
                ensure!(buffer.len() < max_line_size, BadRequest::new(RequestLineTooLong));
                Ok(ParseStatus::incomplete(0, buffer.len()))
            }
        }
    }

    /// Parses header lines starting at `start` up to and including the blank line.
    pub fn parse_headers<H: HeadersHandler>(
        &mut self,
        handler: &mut H,
        buffer: &ReadBuffer,
        start: usize,
        budget: &mut HeaderBudget,
    ) -> Result<ParseStatus, BadRequest> {
        let mut consumed = start;
        loop {
            let Some(lf) = buffer.find_byte(consumed, b'\n', budget.remaining_bytes) else {
                ensure!(buffer.len() - consumed < budget.remaining_bytes, BadRequest::new(HeadersExceedMaxTotalSize));
                return Ok(ParseStatus::incomplete(consumed, buffer.len()));
            };

            budget.remaining_bytes -= lf + 1 - consumed;
            let line = buffer.contiguous(consumed..lf + 1, &mut self.scratch);
            consumed = lf + 1;

            if line == b"\r\n" {
                handler.on_headers_complete()?;
                return Ok(ParseStatus::done(consumed));
            }

            ensure!(budget.remaining_count > 0, BadRequest::new(TooManyHeaders));
            budget.remaining_count -= 1;
            parse_header_line(handler, line)?;
        }
    }
}

fn trim_line_end(line: &[u8]) -> &[u8] {
    let mut end = line.len();
    while end > 0 && matches!(line[end - 1], b'\r' | b'\n') {
        end -= 1;
    }
    &line[..end]
}

fn is_dot_segment(segment: &[u8]) -> bool {
    segment == b"." || segment == b".."
}

/// Length of a custom method token, which must be followed by a space.
fn custom_method_len(line: &[u8]) -> Option<usize> {
    let space = line.iter().position(|&b| !is_token(b))?;
    (space > 0 && line[space] == b' ').then_some(space)
}

/// `line` holds one request line including its line feed.
fn parse_start_line<H: RequestLineHandler>(handler: &mut H, line: &[u8]) -> Result<(), BadRequest> {
    let reject = |reason: RequestRejectionReason| BadRequest::with_detail(reason, trim_line_end(line));
    let len = line.len();

    let (method, method_len) = match known_method(line) {
        Some(known) => known,
        None => (KnownMethod::Custom, custom_method_len(line).ok_or_else(|| reject(InvalidRequestLine))?),
    };
    let custom_method = if method == KnownMethod::Custom { &line[..method_len] } else { &[] };

    let target_start = method_len + 1;
    let mut i = target_start;
    let mut segment_start = target_start;
    let mut path_encoded = false;
    let mut has_dot_segments = false;
    let mut query_start = None;
    while i < len {
        match line[i] {
            b' ' => break,
            b'?' => {
                query_start = Some(i);
                break;
            }
            b'/' => {
                has_dot_segments |= i > target_start && is_dot_segment(&line[segment_start..i]);
                segment_start = i + 1;
            }
            b'%' => path_encoded = true,
            b'\r' | b'\n' => return Err(reject(InvalidRequestLine)),
            b if !is_target(b) => return Err(reject(InvalidRequestTarget)),
            _ => {}
        }
        i += 1;
    }
    let path_end = i;
    has_dot_segments |= segment_start > target_start && is_dot_segment(&line[segment_start..path_end]);

    if let Some(q) = query_start {
        i = q + 1;
        while i < len && line[i] != b' ' {
            match line[i] {
                b'\r' | b'\n' => return Err(reject(InvalidRequestLine)),
                b if !is_target(b) => return Err(reject(InvalidRequestTarget)),
                _ => i += 1,
            }
        }
    }
    ensure!(i < len && i > target_start, reject(InvalidRequestLine));

    let target = &line[target_start..i];
    let path = &line[target_start..path_end];
    let query = query_start.map_or(&[][..], |q| &line[q + 1..i]);

    ensure!(len >= 2 && line[len - 2] == b'\r', reject(InvalidRequestLine));
    let token = &line[i + 1..len - 2];
    let version = match known_version(token) {
        Some(version) => version,
        None if token.is_empty() || token.contains(&b' ') || token.contains(&b'\r') => {
            return Err(reject(InvalidRequestLine));
        }
        None => return Err(BadRequest::with_detail(UnrecognizedHttpVersion, token)),
    };

    trace!(method = ?method, target = %String::from_utf8_lossy(target), "parsed request line");
    handler.on_start_line(StartLine { method, custom_method, version, target, path, query, path_encoded, has_dot_segments })
}

/// `line` holds one header line including its line feed.
fn parse_header_line<H: HeadersHandler>(handler: &mut H, line: &[u8]) -> Result<(), BadRequest> {
    let reject = |reason: RequestRejectionReason| BadRequest::with_detail(reason, trim_line_end(line));
    let len = line.len();
    ensure!(len >= 2 && line[len - 2] == b'\r', reject(InvalidRequestHeadersNoCrlf));
    let end = len - 2;
    ensure!(!is_whitespace(line[0]), reject(HeaderLineMustNotStartWithWhitespace));

    let mut colon = None;
    for (i, &b) in line[..end].iter().enumerate() {
        match b {
            b':' => {
                colon = Some(i);
                break;
            }
            b' ' | b'\t' => return Err(reject(WhitespaceIsNotAllowedInHeaderName)),
            b'\r' => return Err(reject(HeadersCorruptedInvalidHeaderSequence)),
            b if !is_token(b) => return Err(reject(InvalidCharactersInHeaderName)),
            _ => {}
        }
    }
    let colon = colon.ok_or_else(|| reject(NoColonCharacterFoundInHeaderLine))?;
    ensure!(colon > 0, reject(InvalidRequestHeader));

    let mut value_start = colon + 1;
    while value_start < end && is_whitespace(line[value_start]) {
        value_start += 1;
    }
    let mut value_end = value_start;
    for (i, &b) in line[..end].iter().enumerate().skip(value_start) {
        if b == b'\r' {
            return Err(reject(HeadersCorruptedInvalidHeaderSequence));
        }
        if !is_whitespace(b) {
            value_end = i + 1;
        }
    }

    handler.on_header(&line[..colon], &line[value_start..value_end])
}

#[cfg(test)]
mod tests {
    use bytes::Bytes;
    use indoc::indoc;

    use super::*;

    #[derive(Debug, Default, PartialEq, Eq)]
    struct Recorder {
        method: Option<KnownMethod>,
        custom_method: Vec<u8>,
        version: Option<HttpVersion>,
        target: Vec<u8>,
        path: Vec<u8>,
        query: Vec<u8>,
        path_encoded: bool,
        has_dot_segments: bool,
        headers: Vec<(String, String)>,
        complete: bool,
    }

    impl RequestLineHandler for Recorder {
        fn on_start_line(&mut self, line: StartLine<'_>) -> Result<(), BadRequest> {
            self.method = Some(line.method);
            self.custom_method = line.custom_method.to_vec();
            self.version = Some(line.version);
            self.target = line.target.to_vec();
            self.path = line.path.to_vec();
            self.query = line.query.to_vec();
            self.path_encoded = line.path_encoded;
            self.has_dot_segments = line.has_dot_segments;
            Ok(())
        }
    }

    impl HeadersHandler for Recorder {
        fn on_header(&mut self, name: &[u8], value: &[u8]) -> Result<(), BadRequest> {
            self.headers.push((String::from_utf8_lossy(name).into_owned(), String::from_utf8_lossy(value).into_owned()));
            Ok(())
        }

        fn on_headers_complete(&mut self) -> Result<(), BadRequest> {
            self.complete = true;
            Ok(())
        }
    }

    fn buffer_of(parts: &[&[u8]]) -> ReadBuffer {
        let mut buffer = ReadBuffer::new();
        for part in parts {
            buffer.push(Bytes::copy_from_slice(part));
        }
        buffer
    }

    fn parse_line(input: &str) -> Result<Recorder, BadRequest> {
        let mut recorder = Recorder::default();
        let status = HttpParser::new().parse_request_line(&mut recorder, &buffer_of(&[input.as_bytes()]), 8192)?;
        assert!(status.done);
        Ok(recorder)
    }

    fn line_error(input: &str) -> RequestRejectionReason {
        match parse_line(input) {
            Ok(recorder) => panic!("expected rejection for {input:?}, parsed {recorder:?}"),
            Err(e) => e.reason(),
        }
    }

    fn parse_all(buffer: &ReadBuffer) -> Result<(Recorder, usize), BadRequest> {
        let mut parser = HttpParser::new();
        let mut recorder = Recorder::default();
        let line = parser.parse_request_line(&mut recorder, buffer, 8192)?;
        assert!(line.done);
        let mut budget = HeaderBudget::new(100, 32 * 1024);
        let headers = parser.parse_headers(&mut recorder, buffer, line.consumed, &mut budget)?;
        assert!(headers.done);
        Ok((recorder, headers.consumed))
    }

    #[test]
    fn simple_get() {
        let recorder = parse_line("GET / HTTP/1.1\r\n").unwrap();
        assert_eq!(recorder.method, Some(KnownMethod::Get));
        assert_eq!(recorder.version, Some(HttpVersion::Http11));
        assert_eq!(recorder.target, b"/");
        assert_eq!(recorder.path, b"/");
        assert!(recorder.query.is_empty());
        assert!(!recorder.path_encoded);
    }

    #[test]
    fn target_with_query_and_encoding() {
        let recorder = parse_line("POST /a%20b/c?x=1&y=%2F HTTP/1.0\r\n").unwrap();
        assert_eq!(recorder.method, Some(KnownMethod::Post));
        assert_eq!(recorder.version, Some(HttpVersion::Http10));
        assert_eq!(recorder.target, b"/a%20b/c?x=1&y=%2F");
        assert_eq!(recorder.path, b"/a%20b/c");
        assert_eq!(recorder.query, b"x=1&y=%2F");
        assert!(recorder.path_encoded);
    }

    #[test]
    fn detects_dot_segments() {
        assert!(parse_line("GET /a/../b HTTP/1.1\r\n").unwrap().has_dot_segments);
        assert!(parse_line("GET /a/. HTTP/1.1\r\n").unwrap().has_dot_segments);
        assert!(!parse_line("GET /a/.b/c.. HTTP/1.1\r\n").unwrap().has_dot_segments);
        assert!(!parse_line("GET /a?../ HTTP/1.1\r\n").unwrap().has_dot_segments);
    }

    #[test]
    fn custom_method() {
        let recorder = parse_line("PURGE /cache HTTP/1.1\r\n").unwrap();
        assert_eq!(recorder.method, Some(KnownMethod::Custom));
        assert_eq!(recorder.custom_method, b"PURGE");
    }

    #[test]
    fn rejects_malformed_request_lines() {
        assert_eq!(line_error("GET  HTTP/1.1\r\n"), InvalidRequestLine);
        assert_eq!(line_error("G(T / HTTP/1.1\r\n"), InvalidRequestLine);
        assert_eq!(line_error(" GET / HTTP/1.1\r\n"), InvalidRequestLine);
        assert_eq!(line_error("GET /\r\n"), InvalidRequestLine);
        assert_eq!(line_error("GET / HTTP/1.1\n"), InvalidRequestLine);
        assert_eq!(line_error("GET / \r\n"), InvalidRequestLine);
        assert_eq!(line_error("GET / HTTP/1.1 extra\r\n"), InvalidRequestLine);
        assert_eq!(line_error("GET /a\x01b HTTP/1.1\r\n"), InvalidRequestTarget);
        assert_eq!(line_error("GET / HTTP/2.0\r\n"), UnrecognizedHttpVersion);
        assert_eq!(line_error("GET / HTTP/1.1\r\r\n"), InvalidRequestLine);
    }

    #[test]
    fn unrecognized_version_maps_to_505() {
        let e = parse_line("GET / HTTP/3.0\r\n").unwrap_err();
        assert_eq!(e.status(), http::StatusCode::HTTP_VERSION_NOT_SUPPORTED);
    }

    #[test]
    fn request_line_too_long() {
        let long = format!("GET /{} HTTP/1.1\r\n", "a".repeat(100));
        let mut recorder = Recorder::default();
        let e = HttpParser::new().parse_request_line(&mut recorder, &buffer_of(&[long.as_bytes()]), 64).unwrap_err();
        assert_eq!(e.reason(), RequestLineTooLong);
        assert_eq!(e.status(), http::StatusCode::URI_TOO_LONG);

        let partial = buffer_of(&[&long.as_bytes()[..40], &long.as_bytes()[40..70]]);
        let e = HttpParser::new().parse_request_line(&mut recorder, &partial, 64).unwrap_err();
        assert_eq!(e.reason(), RequestLineTooLong);
    }

    #[test]
    fn incomplete_request_line_examines_everything() {
        let mut recorder = Recorder::default();
        let status = HttpParser::new().parse_request_line(&mut recorder, &buffer_of(&[b"GET / HT"]), 8192).unwrap();
        assert_eq!(status, ParseStatus { done: false, consumed: 0, examined: 8 });
        assert_eq!(recorder.method, None);
    }

    #[test]
    fn headers_with_optional_whitespace() {
        let request = indoc! {"
            GET /index.html HTTP/1.1\r
            Host: example.com\r
            Accept:text/html \t\r
            X-Empty:\r
            X-Inner: a b  c\r
            \r
        "};
        let (recorder, consumed) = parse_all(&buffer_of(&[request.as_bytes()])).unwrap();
        assert_eq!(consumed, request.len());
        assert!(recorder.complete);
        assert_eq!(
            recorder.headers,
            vec![
                ("Host".to_owned(), "example.com".to_owned()),
                ("Accept".to_owned(), "text/html".to_owned()),
                ("X-Empty".to_owned(), String::new()),
                ("X-Inner".to_owned(), "a b  c".to_owned()),
            ]
        );
    }

    #[test]
    fn segmented_input_parses_identically() {
        let request = b"POST /submit?id=7 HTTP/1.1\r\nHost: localhost\r\nContent-Length: 5\r\nX-Trace:  abc \r\n\r\n";
        let (expected, expected_consumed) = parse_all(&buffer_of(&[&request[..]])).unwrap();

        for split in 1..request.len() {
            let buffer = buffer_of(&[&request[..split], &request[split..]]);
            let (recorder, consumed) = parse_all(&buffer).unwrap();
            assert_eq!(recorder, expected, "split at {split}");
            assert_eq!(consumed, expected_consumed);
        }
    }

    #[test]
    fn one_byte_segments_parse_identically() {
        let request = indoc! {"
            PUT /files/a%2Fb?replace=true HTTP/1.1\r
            Host: localhost:8080\r
            Content-Type:application/json\r
            Content-Length: 17\r
            X-Trace:  abc \t\r
            X-Empty:\r
            \r
        "};
        let (expected, expected_consumed) = parse_all(&buffer_of(&[request.as_bytes()])).unwrap();
        assert_eq!(expected.headers.len(), 5);

        let segments: Vec<&[u8]> = request.as_bytes().chunks(1).collect();
        let buffer = buffer_of(&segments);
        assert!(!buffer.is_single_segment());
        let (recorder, consumed) = parse_all(&buffer).unwrap();
        assert_eq!(recorder, expected);
        assert_eq!(consumed, expected_consumed);
        assert_eq!(consumed, request.len());
    }

    #[test]
    fn headers_resume_after_more_data() {
        let mut parser = HttpParser::new();
        let mut recorder = Recorder::default();
        let mut budget = HeaderBudget::new(100, 1024);

        let first = buffer_of(&[b"Host: a\r\nAcc"]);
        let status = parser.parse_headers(&mut recorder, &first, 0, &mut budget).unwrap();
        assert_eq!(status, ParseStatus { done: false, consumed: 9, examined: 12 });

        let second = buffer_of(&[b"Accept: */*\r\n\r\n"]);
        let status = parser.parse_headers(&mut recorder, &second, 0, &mut budget).unwrap();
        assert!(status.done);
        assert_eq!(recorder.headers.len(), 2);
        assert_eq!(recorder.headers[1], ("Accept".to_owned(), "*/*".to_owned()));
    }

    fn header_error(headers: &[u8]) -> RequestRejectionReason {
        let mut recorder = Recorder::default();
        let mut budget = HeaderBudget::new(100, 1024);
        HttpParser::new().parse_headers(&mut recorder, &buffer_of(&[headers]), 0, &mut budget).unwrap_err().reason()
    }

    #[test]
    fn rejects_malformed_headers() {
        assert_eq!(header_error(b" Host: a\r\n\r\n"), HeaderLineMustNotStartWithWhitespace);
        assert_eq!(header_error(b"\tHost: a\r\n\r\n"), HeaderLineMustNotStartWithWhitespace);
        assert_eq!(header_error(b"Host : a\r\n\r\n"), WhitespaceIsNotAllowedInHeaderName);
        assert_eq!(header_error(b"Host a\r\n\r\n"), WhitespaceIsNotAllowedInHeaderName);
        assert_eq!(header_error(b"Hosta\r\n\r\n"), NoColonCharacterFoundInHeaderLine);
        assert_eq!(header_error(b"Ho(st: a\r\n\r\n"), InvalidCharactersInHeaderName);
        assert_eq!(header_error(b": a\r\n\r\n"), InvalidRequestHeader);
        assert_eq!(header_error(b"Host: a\n\r\n"), InvalidRequestHeadersNoCrlf);
        assert_eq!(header_error(b"Host: a\rb\r\n\r\n"), HeadersCorruptedInvalidHeaderSequence);
    }

    #[test]
    fn enforces_header_count() {
        let mut recorder = Recorder::default();
        let mut budget = HeaderBudget::new(2, 1024);
        let buffer = buffer_of(&[b"A: 1\r\nB: 2\r\nC: 3\r\n\r\n"]);
        let e = HttpParser::new().parse_headers(&mut recorder, &buffer, 0, &mut budget).unwrap_err();
        assert_eq!(e.reason(), TooManyHeaders);
        assert_eq!(e.status(), http::StatusCode::REQUEST_HEADER_FIELDS_TOO_LARGE);
        assert_eq!(recorder.headers.len(), 2);
    }

    #[test]
    fn enforces_total_header_size() {
        let mut parser = HttpParser::new();
        let mut recorder = Recorder::default();

        // exactly at the limit is fine
        let input = b"A: 1\r\n\r\n";
        let mut budget = HeaderBudget::new(100, input.len());
        assert!(parser.parse_headers(&mut recorder, &buffer_of(&[input]), 0, &mut budget).unwrap().done);

        let mut budget = HeaderBudget::new(100, input.len() - 1);
        let e = parser.parse_headers(&mut recorder, &buffer_of(&[input]), 0, &mut budget).unwrap_err();
        assert_eq!(e.reason(), HeadersExceedMaxTotalSize);

        // an unterminated line is rejected as soon as it cannot fit
        let mut budget = HeaderBudget::new(100, 8);
        let e = parser.parse_headers(&mut recorder, &buffer_of(&[b"X-Long: abcdef"]), 0, &mut budget).unwrap_err();
        assert_eq!(e.reason(), HeadersExceedMaxTotalSize);
    }
}
