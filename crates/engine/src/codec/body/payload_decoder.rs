use bytes::Buf;

use crate::codec::body::chunked_decoder::ChunkedDecoder;
use crate::codec::body::length_decoder::LengthDecoder;
use crate::protocol::{BadRequest, PayloadItem, PayloadSize, RequestRejectionReason};

/// Request body framing chosen from the request head.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PayloadDecoder {
    kind: Kind,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Kind {
    Length(LengthDecoder),
    Chunked(ChunkedDecoder),
    NoBody,
}

impl PayloadDecoder {
    pub fn empty() -> Self {
        Self { kind: Kind::NoBody }
    }

    pub fn chunked() -> Self {
        Self { kind: Kind::Chunked(ChunkedDecoder::new()) }
    }

    /// A zero length decodes as no body.
    pub fn fix_length(size: u64) -> Self {
        if size == 0 {
            return Self::empty();
        }
        Self { kind: Kind::Length(LengthDecoder::new(size)) }
    }

    pub fn from_size(size: PayloadSize) -> Self {
        match size {
            PayloadSize::Length(n) => Self::fix_length(n),
            PayloadSize::Chunked => Self::chunked(),
            PayloadSize::Empty => Self::empty(),
        }
    }

    pub fn is_chunked(&self) -> bool {
        matches!(self.kind, Kind::Chunked(_))
    }

    pub fn is_empty(&self) -> bool {
        matches!(self.kind, Kind::NoBody)
    }

    /// The whole payload has been decoded.
    pub fn is_finished(&self) -> bool {
        match &self.kind {
            Kind::Length(decoder) => decoder.remaining() == 0,
            Kind::Chunked(decoder) => decoder.is_finished(),
            Kind::NoBody => true,
        }
    }

    /// What the transport ending before [`PayloadDecoder::is_finished`] means.
    pub fn incomplete_reason(&self) -> RequestRejectionReason {
        if self.is_chunked() {
            RequestRejectionReason::ChunkedRequestIncomplete
        } else {
            RequestRejectionReason::UnexpectedEndOfRequestContent
        }
    }

    /// Decodes the next piece of the body from `src`, `Ok(None)` meaning more input is needed.
    pub fn decode<B: Buf>(&mut self, src: &mut B) -> Result<Option<PayloadItem>, BadRequest> {
        match &mut self.kind {
            Kind::Length(decoder) => Ok(decoder.decode(src)),
            Kind::Chunked(decoder) => decoder.decode(src),
            Kind::NoBody => Ok(Some(PayloadItem::Eof)),
        }
    }
}

#[cfg(test)]
mod tests {
    use bytes::BytesMut;

    use super::*;

    #[test]
    fn no_body_is_eof_right_away() {
        let mut decoder = PayloadDecoder::from_size(PayloadSize::Empty);
        let mut buffer = BytesMut::from(&b"GET / HTTP/1.1\r\n"[..]);
        assert!(decoder.decode(&mut buffer).unwrap().unwrap().is_eof());
        assert_eq!(buffer.len(), 16);
        assert!(decoder.is_finished());
    }

    #[test]
    fn zero_length_is_no_body() {
        assert!(PayloadDecoder::fix_length(0).is_empty());
    }

    #[test]
    fn incomplete_reasons() {
        assert_eq!(PayloadDecoder::chunked().incomplete_reason(), RequestRejectionReason::ChunkedRequestIncomplete);
        assert_eq!(PayloadDecoder::fix_length(3).incomplete_reason(), RequestRejectionReason::UnexpectedEndOfRequestContent);
    }

    #[test]
    fn length_then_pipelined_request() {
        let mut decoder = PayloadDecoder::fix_length(4);
        let mut buffer = BytesMut::from(&b"pingGET / HTTP/1.1\r\n"[..]);
        let item = decoder.decode(&mut buffer).unwrap().unwrap();
        assert_eq!(item, PayloadItem::Chunk(bytes::Bytes::from_static(b"ping")));
        assert!(decoder.is_finished());
        assert!(decoder.decode(&mut buffer).unwrap().unwrap().is_eof());
        assert_eq!(&buffer[..], b"GET / HTTP/1.1\r\n");
    }
}
