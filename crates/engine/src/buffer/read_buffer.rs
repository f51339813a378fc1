use std::collections::VecDeque;
use std::ops::Range;

use bytes::{Buf, Bytes, BytesMut};

/// The bytes a reader currently holds: a sequence of non-empty segments, usually backed by
/// pool blocks.
#[derive(Debug, Default)]
pub struct ReadBuffer {
    segments: VecDeque<Bytes>,
    len: usize,
}

impl ReadBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn is_single_segment(&self) -> bool {
        self.segments.len() <= 1
    }

    pub fn first_segment(&self) -> &[u8] {
        self.segments.front().map_or(&[], |s| &s[..])
    }

    pub fn segments(&self) -> impl Iterator<Item = &[u8]> {
        self.segments.iter().map(|s| &s[..])
    }

    /// A [`Buf`] view starting at the first byte. Reading through it does not consume.
    pub fn cursor(&self) -> Cursor<'_> {
        Cursor { buffer: self, segment: 0, offset: 0, remaining: self.len }
    }

    /// Position of the first `byte` in `[from, from + limit)`.
    pub fn find_byte(&self, from: usize, byte: u8, limit: usize) -> Option<usize> {
        let end = from.saturating_add(limit).min(self.len);
        let mut base = 0;
        for segment in &self.segments {
            let segment_end = base + segment.len();
            if segment_end > from {
                let start = from.saturating_sub(base);
                let stop = end.min(segment_end) - base;
                if start < stop
                    && let Some(i) = memchr::memchr(byte, &segment[start..stop])
                {
                    return Some(base + start + i);
                }
            }
            base = segment_end;
            if base >= end {
                break;
            }
        }
        None
    }

    /// Returns `range` as one slice, borrowing when it lies inside a single segment and
    /// copying into `scratch` otherwise.
    pub fn contiguous<'a>(&'a self, range: Range<usize>, scratch: &'a mut Vec<u8>) -> &'a [u8] {
        assert!(range.start <= range.end && range.end <= self.len, "range out of bounds");
        let mut base = 0;
        for segment in &self.segments {
            let segment_end = base + segment.len();
            if range.start >= base && range.end <= segment_end {
                return &segment[range.start - base..range.end - base];
            }
            if segment_end > range.start {
                break;
            }
            base = segment_end;
        }

        scratch.clear();
        let mut cursor = self.cursor();
        cursor.advance(range.start);
        let mut wanted = range.len();
        while wanted > 0 {
            let chunk = cursor.chunk();
            let n = chunk.len().min(wanted);
            scratch.extend_from_slice(&chunk[..n]);
            cursor.advance(n);
            wanted -= n;
        }
        &scratch[..]
    }

    /// Copies everything into one buffer.
    pub fn to_bytes(&self) -> Bytes {
        if self.segments.len() == 1 {
            return self.segments[0].clone();
        }
        let mut bytes = BytesMut::with_capacity(self.len);
        for segment in &self.segments {
            bytes.extend_from_slice(segment);
        }
        bytes.freeze()
    }

    pub(crate) fn push(&mut self, segment: Bytes) {
        if segment.is_empty() {
            return;
        }
        self.len += segment.len();
        self.segments.push_back(segment);
    }

    /// Drops `count` bytes from the front.
    pub(crate) fn consume(&mut self, mut count: usize) {
        assert!(count <= self.len, "consumed past the end of the buffer");
        self.len -= count;
        while count > 0 {
            let Some(front) = self.segments.front_mut() else {
                break;
            };
            if front.len() <= count {
                count -= front.len();
                self.segments.pop_front();
            } else {
                front.advance(count);
                count = 0;
            }
        }
    }

    pub(crate) fn clear(&mut self) {
        self.segments.clear();
        self.len = 0;
    }
}

/// A [`Buf`] over a [`ReadBuffer`] that tracks how far it has been advanced.
#[derive(Debug, Clone)]
pub struct Cursor<'a> {
    buffer: &'a ReadBuffer,
    segment: usize,
    offset: usize,
    remaining: usize,
}

impl Cursor<'_> {
    /// Bytes advanced so far.
    pub fn position(&self) -> usize {
        self.buffer.len - self.remaining
    }
}

impl Buf for Cursor<'_> {
    fn remaining(&self) -> usize {
        self.remaining
    }

    fn chunk(&self) -> &[u8] {
        self.buffer.segments.get(self.segment).map_or(&[], |s| &s[self.offset..])
    }

    fn advance(&mut self, mut cnt: usize) {
        assert!(cnt <= self.remaining, "advanced past the end of the buffer");
        self.remaining -= cnt;
        while cnt > 0 {
            let left = self.buffer.segments[self.segment].len() - self.offset;
            if cnt < left {
                self.offset += cnt;
                return;
            }
            cnt -= left;
            self.segment += 1;
            self.offset = 0;
        }
    }

    fn copy_to_bytes(&mut self, len: usize) -> Bytes {
        if let Some(segment) = self.buffer.segments.get(self.segment)
            && self.offset + len <= segment.len()
        {
            let bytes = segment.slice(self.offset..self.offset + len);
            self.advance(len);
            return bytes;
        }

        assert!(len <= self.remaining, "advanced past the end of the buffer");
        let mut bytes = BytesMut::with_capacity(len);
        let mut wanted = len;
        while wanted > 0 {
            let chunk = self.chunk();
            let n = chunk.len().min(wanted);
            bytes.extend_from_slice(&chunk[..n]);
            self.advance(n);
            wanted -= n;
        }
        bytes.freeze()
    }
}
