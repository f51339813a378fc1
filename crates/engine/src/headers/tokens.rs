//! Parsing of comma-separated header token lists.

use crate::headers::HeaderValues;

/// The tokens of a Connection header that change how a connection is handled.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ConnectionOptions {
    pub close: bool,
    pub keep_alive: bool,
    pub upgrade: bool,
}

impl ConnectionOptions {
    pub fn parse(values: &HeaderValues) -> Self {
        let mut options = Self::default();
        for token in tokens(values) {
            if token.eq_ignore_ascii_case(b"close") {
                options.close = true;
            } else if token.eq_ignore_ascii_case(b"keep-alive") {
                options.keep_alive = true;
            } else if token.eq_ignore_ascii_case(b"upgrade") {
                options.upgrade = true;
            }
        }
        options
    }
}

/// Whether the last transfer coding listed is `chunked`.
pub fn final_coding_is_chunked(values: &HeaderValues) -> bool {
    tokens(values).last().is_some_and(|token| token.eq_ignore_ascii_case(b"chunked"))
}

/// Non-empty comma-separated tokens across every value, trimmed of spaces and tabs.
fn tokens(values: &HeaderValues) -> impl Iterator<Item = &[u8]> {
    values
        .iter()
        .flat_map(|value| value.as_bytes().split(|&b| b == b','))
        .map(|token| token.trim_ascii())
        .filter(|token| !token.is_empty())
}
