use bytes::Buf;

use crate::protocol::PayloadItem;

/// Reads a body framed by Content-Length (RFC 9112 section 6.2).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LengthDecoder {
    remaining: u64,
}

impl LengthDecoder {
    pub fn new(length: u64) -> Self {
        Self { remaining: length }
    }

    pub fn remaining(&self) -> u64 {
        self.remaining
    }

    /// Hands out at most the current contiguous piece of `src`, `None` when `src` is empty.
    /// Bytes past the declared length are left for the next request.
    pub fn decode<B: Buf>(&mut self, src: &mut B) -> Option<PayloadItem> {
        if self.remaining == 0 {
            return Some(PayloadItem::Eof);
        }

        let contiguous = src.chunk().len();
        if contiguous == 0 {
            return None;
        }
        let len = usize::try_from(self.remaining).map_or(contiguous, |remaining| remaining.min(contiguous));
        self.remaining -= len as u64;
        Some(PayloadItem::Chunk(src.copy_to_bytes(len)))
    }
}

#[cfg(test)]
mod tests {
    use bytes::{Bytes, BytesMut};

    use super::*;

    #[test]
    fn test_basic() {
        let mut buffer: BytesMut = BytesMut::from(&b"101234567890abcdef\r\n\r\n"[..]);

        let mut length_decoder = LengthDecoder::new(10);
        let payload = length_decoder.decode(&mut buffer).unwrap();
        assert_eq!(payload, PayloadItem::Chunk(Bytes::from_static(b"1012345678")));
        assert_eq!(length_decoder.remaining(), 0);

        assert!(length_decoder.decode(&mut buffer).unwrap().is_eof());
        assert_eq!(&buffer[..], b"90abcdef\r\n\r\n");
    }

    #[test]
    fn test_partial_body() {
        let mut buffer: BytesMut = BytesMut::from(&b"abc"[..]);
        let mut length_decoder = LengthDecoder::new(5);

        let payload = length_decoder.decode(&mut buffer).unwrap();
        assert_eq!(payload, PayloadItem::Chunk(Bytes::from_static(b"abc")));
        assert_eq!(length_decoder.remaining(), 2);
        assert!(length_decoder.decode(&mut buffer).is_none());
    }

    #[test]
    fn test_zero_length() {
        let mut buffer = BytesMut::new();
        assert!(LengthDecoder::new(0).decode(&mut buffer).unwrap().is_eof());
    }
}
