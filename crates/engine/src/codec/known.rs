//! Word-sized matching of the common methods and protocol versions.
//!
//! The first eight bytes of a request line are loaded into a `u64` and compared against a
//! masked pattern per method. Every pattern includes the trailing space, so the method
//! length falls out of the match and a short buffer can never match by accident.

use http::{Method, Version};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HttpVersion {
    Http10,
    Http11,
}

impl HttpVersion {
    pub fn as_str(self) -> &'static str {
        match self {
            HttpVersion::Http10 => "HTTP/1.0",
            HttpVersion::Http11 => "HTTP/1.1",
        }
    }

    pub fn to_http(self) -> Version {
        match self {
            HttpVersion::Http10 => Version::HTTP_10,
            HttpVersion::Http11 => Version::HTTP_11,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KnownMethod {
    Get,
    Put,
    Post,
    Head,
    Trace,
    Patch,
    Delete,
    Connect,
    Options,
    /// Any other token; the bytes are carried separately.
    Custom,
}

impl KnownMethod {
    pub fn to_method(self) -> Option<Method> {
        let method = match self {
            KnownMethod::Get => Method::GET,
            KnownMethod::Put => Method::PUT,
            KnownMethod::Post => Method::POST,
            KnownMethod::Head => Method::HEAD,
            KnownMethod::Trace => Method::TRACE,
            KnownMethod::Patch => Method::PATCH,
            KnownMethod::Delete => Method::DELETE,
            KnownMethod::Connect => Method::CONNECT,
            KnownMethod::Options => Method::OPTIONS,
            KnownMethod::Custom => return None,
        };
        Some(method)
    }
}

struct Pattern<T> {
    value: u64,
    mask: u64,
    len: usize,
    item: T,
}

impl<T> Pattern<T> {
    const fn new(bytes: &[u8], item: T) -> Self {
        let mut value = 0u64;
        let mut i = 0;
        while i < bytes.len() {
            value |= (bytes[i] as u64) << (8 * i);
            i += 1;
        }
        let mask = if bytes.len() >= 8 { u64::MAX } else { (1u64 << (8 * bytes.len())) - 1 };
        Self { value, mask, len: bytes.len(), item }
    }
}

const METHODS: [Pattern<KnownMethod>; 9] = [
    Pattern::new(b"GET ", KnownMethod::Get),
    Pattern::new(b"POST ", KnownMethod::Post),
    Pattern::new(b"PUT ", KnownMethod::Put),
    Pattern::new(b"HEAD ", KnownMethod::Head),
    Pattern::new(b"DELETE ", KnownMethod::Delete),
    Pattern::new(b"PATCH ", KnownMethod::Patch),
    Pattern::new(b"OPTIONS ", KnownMethod::Options),
    Pattern::new(b"CONNECT ", KnownMethod::Connect),
    Pattern::new(b"TRACE ", KnownMethod::Trace),
];

const VERSIONS: [Pattern<HttpVersion>; 2] =
    [Pattern::new(b"HTTP/1.1", HttpVersion::Http11), Pattern::new(b"HTTP/1.0", HttpVersion::Http10)];

#[inline]
fn load_word(bytes: &[u8]) -> u64 {
    let mut word = [0u8; 8];
    let n = bytes.len().min(8);
    word[..n].copy_from_slice(&bytes[..n]);
    u64::from_le_bytes(word)
}

/// Matches a known method at the start of `line`, returning it with its length (without
/// the space).
#[inline]
pub(crate) fn known_method(line: &[u8]) -> Option<(KnownMethod, usize)> {
    let word = load_word(line);
    METHODS.iter().find(|p| word & p.mask == p.value).map(|p| (p.item, p.len - 1))
}

/// Matches an exact version token.
#[inline]
pub(crate) fn known_version(token: &[u8]) -> Option<HttpVersion> {
    if token.len() != 8 {
        return None;
    }
    let word = load_word(token);
    VERSIONS.iter().find(|p| word == p.value).map(|p| p.item)
}
