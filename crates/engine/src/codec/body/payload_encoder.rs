use std::io::Write;

use crate::codec::body::chunked_encoder::ChunkedEncoder;
use crate::codec::body::length_encoder::LengthEncoder;
use crate::protocol::ResponseError;

/// Response body framing chosen when the response starts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PayloadEncoder {
    kind: Kind,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Kind {
    Length(LengthEncoder),
    Chunked(ChunkedEncoder),
    /// The body ends when the connection closes.
    UntilClose,
    /// Nothing may be written (HEAD, 1xx, 204, 205, 304).
    NoBody,
}

impl PayloadEncoder {
    pub fn empty() -> Self {
        Self { kind: Kind::NoBody }
    }

    pub fn chunked() -> Self {
        Self { kind: Kind::Chunked(ChunkedEncoder::new()) }
    }

    pub fn fix_length(size: u64) -> Self {
        Self { kind: Kind::Length(LengthEncoder::new(size)) }
    }

    pub fn until_close() -> Self {
        Self { kind: Kind::UntilClose }
    }

    pub fn is_chunked(&self) -> bool {
        matches!(self.kind, Kind::Chunked(_))
    }

    pub fn is_empty(&self) -> bool {
        matches!(self.kind, Kind::NoBody)
    }

    /// A declared length has been written in full.
    pub fn is_length_complete(&self) -> bool {
        matches!(&self.kind, Kind::Length(encoder) if encoder.is_finished())
    }

    pub fn encode<W: Write>(&mut self, data: &[u8], dst: &mut W) -> Result<(), ResponseError> {
        match &mut self.kind {
            Kind::Length(encoder) => encoder.encode(data, dst),
            Kind::Chunked(encoder) => encoder.encode(data, dst),
            Kind::UntilClose => Ok(dst.write_all(data)?),
            Kind::NoBody => Ok(()),
        }
    }

    /// Writes the body suffix. Calling it again writes nothing.
    pub fn finish<W: Write>(&mut self, dst: &mut W) -> Result<(), ResponseError> {
        match &mut self.kind {
            Kind::Length(encoder) => encoder.finish(),
            Kind::Chunked(encoder) => encoder.finish(dst),
            Kind::UntilClose | Kind::NoBody => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_body_drops_writes() {
        let mut encoder = PayloadEncoder::empty();
        let mut out = Vec::new();
        encoder.encode(b"ignored", &mut out).unwrap();
        encoder.finish(&mut out).unwrap();
        assert!(out.is_empty());
    }

    #[test]
    fn until_close_passes_through() {
        let mut encoder = PayloadEncoder::until_close();
        let mut out = Vec::new();
        encoder.encode(b"raw", &mut out).unwrap();
        encoder.finish(&mut out).unwrap();
        assert_eq!(out, b"raw");
    }

    #[test]
    fn length_completion() {
        let mut encoder = PayloadEncoder::fix_length(2);
        let mut out = Vec::new();
        assert!(!encoder.is_length_complete());
        encoder.encode(b"ok", &mut out).unwrap();
        assert!(encoder.is_length_complete());
        assert!(!PayloadEncoder::chunked().is_length_complete());
    }
}
