//! The chunked transfer coding of RFC 9112 section 7.1.
//!
//! The decoder works over any [`Buf`], so it reads straight out of the segmented input
//! buffer and hands out chunk data as slices of the segments it arrived in.

use bytes::{Buf, Bytes};
use tracing::trace;

use crate::protocol::{BadRequest, PayloadItem, RequestRejectionReason};

use RequestRejectionReason::{BadChunkExtension, BadChunkSizeData, BadChunkSuffix};

/// Where the decoder is within the chunked framing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    /// Hex digits of the chunk size.
    Size,
    /// Whitespace after the size; no more digits may follow.
    SizeWhitespace,
    /// A chunk extension, skipped up to its CR.
    Extension,
    SizeLf,
    Data,
    DataCr,
    DataLf,
    /// Start of a line after the last chunk: a trailer field or the final CRLF.
    LineStart,
    /// A trailer field, skipped up to its CR.
    Trailer,
    TrailerLf,
    EndLf,
    Done,
}

/// Incremental decoder for a chunked request body. Trailer fields are read and dropped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkedDecoder {
    phase: Phase,
    /// Size of the current chunk while in [`Phase::Size`], then the data left to read.
    size: u64,
    /// Hex digits seen on the current size line.
    digits: u8,
}

impl Default for ChunkedDecoder {
    fn default() -> Self {
        Self::new()
    }
}

impl ChunkedDecoder {
    pub fn new() -> Self {
        Self { phase: Phase::Size, size: 0, digits: 0 }
    }

    pub fn is_finished(&self) -> bool {
        self.phase == Phase::Done
    }

    /// Decodes from `src`, advancing it past everything it used.
    ///
    /// Returns `Ok(None)` when `src` ran out before the next chunk or the end of the body.
    pub fn decode<B: Buf>(&mut self, src: &mut B) -> Result<Option<PayloadItem>, BadRequest> {
        loop {
            if self.phase == Phase::Done {
                trace!("finished reading chunked data");
                return Ok(Some(PayloadItem::Eof));
            }
            if !src.has_remaining() {
                return Ok(None);
            }

            if self.phase == Phase::Data {
                let bytes = self.take_data(src);
                trace!(len = bytes.len(), "read chunked bytes");
                return Ok(Some(PayloadItem::Chunk(bytes)));
            }

            let byte = src.get_u8();
            self.phase = self.next_phase(byte).map_err(BadRequest::new)?;
        }
    }

    /// Takes chunk data, never more than the current contiguous piece of `src`, so the
    /// returned bytes share memory with the input.
    fn take_data<B: Buf>(&mut self, src: &mut B) -> Bytes {
        let contiguous = src.chunk().len();
        let len = usize::try_from(self.size).map_or(contiguous, |size| size.min(contiguous));
        self.size -= len as u64;
        if self.size == 0 {
            self.phase = Phase::DataCr;
        }
        src.copy_to_bytes(len)
    }

    fn next_phase(&mut self, byte: u8) -> Result<Phase, RequestRejectionReason> {
        use Phase::*;

        let next = match (self.phase, byte) {
            // a size line needs at least one hex digit
            (Size, b'\t' | b' ' | b';' | b'\r') if self.digits == 0 => return Err(BadChunkSizeData),
            (Size | SizeWhitespace, b'\t' | b' ') => SizeWhitespace,
            (Size | SizeWhitespace, b';') => Extension,
            (Size | SizeWhitespace | Extension, b'\r') => SizeLf,
            (Size, _) => {
                let digit = hex_digit(byte).ok_or(BadChunkSizeData)?;
                self.size = self.size.checked_mul(16).and_then(|size| size.checked_add(digit)).ok_or(BadChunkSizeData)?;
                self.digits = self.digits.saturating_add(1);
                Size
            }
            (SizeWhitespace, _) => return Err(BadChunkSizeData),
            (Extension, b'\n') => return Err(BadChunkExtension),
            (Extension, _) => Extension,
            (SizeLf, b'\n') if self.size == 0 => LineStart,
            (SizeLf, b'\n') => Data,
            (SizeLf, _) => return Err(BadChunkSizeData),
            (DataCr, b'\r') => DataLf,
            (DataLf, b'\n') => {
                self.digits = 0;
                Size
            }
            (DataCr | DataLf, _) => return Err(BadChunkSuffix),
            (LineStart, b'\r') => EndLf,
            (Trailer, b'\r') => TrailerLf,
            (LineStart | Trailer, _) => Trailer,
            (TrailerLf, b'\n') => LineStart,
            (EndLf, b'\n') => Done,
            (TrailerLf | EndLf, _) => return Err(BadChunkSuffix),
            (Data | Done, _) => self.phase,
        };
        Ok(next)
    }
}

fn hex_digit(byte: u8) -> Option<u64> {
    char::from(byte).to_digit(16).map(u64::from)
}
