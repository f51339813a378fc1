//! Byte-level HTTP/1.x codecs: the request-line and header parser, request target decoding and
//! body framing.

pub mod body;
pub(crate) mod chars;
mod known;
mod parser;
pub(crate) mod path;

pub use known::{HttpVersion, KnownMethod};
pub use parser::{HeaderBudget, HeadersHandler, HttpParser, ParseStatus, RequestLineHandler, StartLine};
