//! A single-producer single-consumer byte stream with backpressure.
//!
//! The writer leases free space from pool blocks, stages what it wrote and commits it as
//! immutable segments. The reader receives everything committed so far as a [`ReadBuffer`]
//! and reports back how much it *consumed* (may be released) and how much it *examined*
//! (was looked at). A read only completes again once something new arrives past the
//! examined position, so a parser that needs more bytes never spins.
//!
//! When the unconsumed byte count reaches the pause threshold, [`PipeWriter::flush`] waits
//! until the reader brings it back down to the resume threshold.

use std::collections::VecDeque;
use std::fmt;
use std::future::poll_fn;
use std::io;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::task::{Context, Poll, Waker};

use bytes::Bytes;

use crate::buffer::pool::{Block, MemoryPool};
use crate::buffer::read_buffer::ReadBuffer;
use crate::protocol::PipeError;
use crate::utils::ensure;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PipeOptions {
    pub pause_writer_threshold: Option<usize>,
    pub resume_writer_threshold: usize,
}

impl PipeOptions {
    pub fn unbounded() -> Self {
        Self { pause_writer_threshold: None, resume_writer_threshold: 0 }
    }

    /// Pauses at `max` unconsumed bytes and resumes at half of it.
    pub fn bounded(max: Option<usize>) -> Self {
        match max {
            Some(max) => Self { pause_writer_threshold: Some(max), resume_writer_threshold: max / 2 },
            None => Self::unbounded(),
        }
    }
}

pub fn pipe(pool: MemoryPool, options: PipeOptions) -> (PipeWriter, PipeReader) {
    let shared = Arc::new(Shared { state: Mutex::new(State::default()), options });
    let writer = PipeWriter {
        shared: Arc::clone(&shared),
        pool,
        tail: None,
        staged: Vec::new(),
        unflushed: 0,
        completed: false,
    };
    let reader = PipeReader { shared, buffer: ReadBuffer::new(), reading: false, completed: false };
    (writer, reader)
}

struct Shared {
    state: Mutex<State>,
    options: PipeOptions,
}

#[derive(Default)]
struct State {
    segments: VecDeque<Bytes>,
    unconsumed: usize,
    ready: bool,
    paused: bool,
    read_canceled: bool,
    flush_canceled: bool,
    writer_completed: bool,
    writer_error: Option<PipeError>,
    reader_completed: bool,
    reader_waker: Option<Waker>,
    writer_waker: Option<Waker>,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn cancel_pending_read(&self) {
        let waker = {
            let mut state = self.lock();
            state.read_canceled = true;
            state.reader_waker.take()
        };
        wake(waker);
    }
}

fn wake(waker: Option<Waker>) {
    if let Some(waker) = waker {
        waker.wake();
    }
}

fn register(slot: &mut Option<Waker>, waker: &Waker) {
    match slot {
        Some(current) if current.will_wake(waker) => {}
        _ => *slot = Some(waker.clone()),
    }
}

/// The outcome of [`PipeReader::read`].
#[derive(Debug)]
pub struct ReadResult<'a> {
    buffer: &'a ReadBuffer,
    completed: bool,
    canceled: bool,
}

impl<'a> ReadResult<'a> {
    pub fn buffer(&self) -> &'a ReadBuffer {
        self.buffer
    }

    /// The writer is done; nothing arrives after `buffer`.
    pub fn is_completed(&self) -> bool {
        self.completed
    }

    /// The read was woken by [`ReadCanceller::cancel`] rather than by data.
    pub fn is_canceled(&self) -> bool {
        self.canceled
    }
}

pub struct PipeReader {
    shared: Arc<Shared>,
    buffer: ReadBuffer,
    reading: bool,
    completed: bool,
}

impl PipeReader {
    /// Waits for unexamined data, completion or cancellation.
    ///
    /// Each read must be followed by [`PipeReader::advance`] before the next one.
    pub async fn read(&mut self) -> Result<ReadResult<'_>, PipeError> {
        let (completed, canceled) = poll_fn(|cx| self.fill(Some(cx))).await?;
        Ok(ReadResult { buffer: &self.buffer, completed, canceled })
    }

    /// Like [`PipeReader::read`] but returns `None` instead of waiting.
    pub fn try_read(&mut self) -> Result<Option<ReadResult<'_>>, PipeError> {
        match self.fill(None) {
            Poll::Ready(result) => {
                let (completed, canceled) = result?;
                Ok(Some(ReadResult { buffer: &self.buffer, completed, canceled }))
            }
            Poll::Pending => Ok(None),
        }
    }

    fn fill(&mut self, cx: Option<&mut Context<'_>>) -> Poll<Result<(bool, bool), PipeError>> {
        if self.reading {
            return Poll::Ready(Err(PipeError::ConcurrentRead));
        }

        let mut state = self.shared.lock();
        if let Some(e) = &state.writer_error {
            return Poll::Ready(Err(e.clone()));
        }

        let canceled = std::mem::take(&mut state.read_canceled);
        if canceled || state.ready || state.writer_completed {
            for segment in state.segments.drain(..) {
                self.buffer.push(segment);
            }
            self.reading = true;
            return Poll::Ready(Ok((state.writer_completed, canceled)));
        }

        if let Some(cx) = cx {
            register(&mut state.reader_waker, cx.waker());
        }
        Poll::Pending
    }

    /// Releases `consumed` bytes and records that everything up to `examined` was looked at.
    pub fn advance(&mut self, consumed: usize, examined: usize) -> Result<(), PipeError> {
        ensure!(self.reading, PipeError::NoActiveRead);
        let buffered = self.buffer.len();
        ensure!(consumed <= examined && examined <= buffered, PipeError::InvalidAdvance { consumed, examined, buffered });

        self.reading = false;
        self.buffer.consume(consumed);

        let waker = {
            let mut state = self.shared.lock();
            state.unconsumed -= consumed;
            if examined < buffered {
                state.ready = true;
            } else if state.segments.is_empty() {
                state.ready = false;
            }

            if state.paused && state.unconsumed <= self.shared.options.resume_writer_threshold {
                state.paused = false;
                state.writer_waker.take()
            } else {
                None
            }
        };
        wake(waker);
        Ok(())
    }

    /// Wakes a pending (or the next) read with a canceled result.
    pub fn cancel_pending_read(&self) {
        self.shared.cancel_pending_read();
    }

    pub fn canceller(&self) -> ReadCanceller {
        ReadCanceller { shared: Arc::clone(&self.shared) }
    }

    /// Stops reading. The writer sees its flushes complete from now on.
    pub fn complete(&mut self) {
        if self.completed {
            return;
        }
        self.completed = true;
        self.reading = false;
        self.buffer.clear();

        let waker = {
            let mut state = self.shared.lock();
            state.reader_completed = true;
            state.segments.clear();
            state.unconsumed = 0;
            state.paused = false;
            state.writer_waker.take()
        };
        wake(waker);
    }
}

impl Drop for PipeReader {
    fn drop(&mut self) {
        self.complete();
    }
}

impl fmt::Debug for PipeReader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PipeReader").field("buffered", &self.buffer.len()).field("reading", &self.reading).finish()
    }
}

/// A handle able to interrupt the reader from elsewhere, e.g. a timeout.
#[derive(Clone)]
pub struct ReadCanceller {
    shared: Arc<Shared>,
}

impl ReadCanceller {
    pub fn cancel(&self) {
        self.shared.cancel_pending_read();
    }
}

impl fmt::Debug for ReadCanceller {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReadCanceller").finish_non_exhaustive()
    }
}

/// The outcome of [`PipeWriter::flush`].
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct FlushResult {
    canceled: bool,
    completed: bool,
}

impl FlushResult {
    /// The reader is gone; written data is discarded.
    pub fn is_completed(&self) -> bool {
        self.completed
    }

    pub fn is_canceled(&self) -> bool {
        self.canceled
    }
}

pub struct PipeWriter {
    shared: Arc<Shared>,
    pool: MemoryPool,
    tail: Option<Block>,
    staged: Vec<Bytes>,
    unflushed: usize,
    completed: bool,
}

impl PipeWriter {
    /// Free space of at least `size_hint` bytes when the hint fits in a block, otherwise
    /// whatever the current block has left.
    pub fn lease(&mut self, size_hint: usize) -> &mut [u8] {
        let needs_block = self.tail.as_ref().is_none_or(|block| {
            let free = block.writable_len();
            free == 0 || (free < size_hint && size_hint <= self.pool.block_size())
        });
        if needs_block {
            self.retire_tail();
        }
        let pool = &self.pool;
        self.tail.get_or_insert_with(|| pool.rent()).writable()
    }

    /// Marks `count` leased bytes as written. They are not visible to the reader before a
    /// commit.
    pub fn advance(&mut self, count: usize) {
        match self.tail.as_mut() {
            Some(block) => {
                block.stage(count);
                self.unflushed += count;
            }
            None => assert_eq!(count, 0, "advance without a leased buffer"),
        }
    }

    /// Copies `data` into leased space, spanning blocks as needed.
    pub fn put_slice(&mut self, mut data: &[u8]) {
        while !data.is_empty() {
            let buf = self.lease(1);
            let n = buf.len().min(data.len());
            buf[..n].copy_from_slice(&data[..n]);
            self.advance(n);
            data = &data[n..];
        }
    }

    /// Staged bytes not yet visible to the reader.
    pub fn unflushed_len(&self) -> usize {
        self.unflushed
    }

    /// Publishes staged bytes and wakes the reader. Returns `false` once the reader is gone.
    pub fn commit(&mut self) -> bool {
        if let Some(segment) = self.tail.as_mut().and_then(Block::take_staged) {
            self.staged.push(segment);
        }
        let count = std::mem::take(&mut self.unflushed);

        let waker = {
            let mut state = self.shared.lock();
            if state.reader_completed {
                self.staged.clear();
                return false;
            }
            if count == 0 {
                return true;
            }
            state.segments.extend(self.staged.drain(..));
            state.unconsumed += count;
            state.ready = true;
            if let Some(pause) = self.shared.options.pause_writer_threshold
                && state.unconsumed >= pause
            {
                state.paused = true;
            }
            state.reader_waker.take()
        };
        wake(waker);
        true
    }

    /// Advances by `count` and commits.
    pub fn produce(&mut self, count: usize) -> bool {
        self.advance(count);
        self.commit()
    }

    /// Commits, then waits while the reader is over the pause threshold.
    pub async fn flush(&mut self) -> FlushResult {
        if !self.commit() {
            return FlushResult { canceled: false, completed: true };
        }
        poll_fn(|cx| self.poll_flush(cx)).await
    }

    fn poll_flush(&mut self, cx: &mut Context<'_>) -> Poll<FlushResult> {
        let mut state = self.shared.lock();
        if state.reader_completed {
            return Poll::Ready(FlushResult { canceled: false, completed: true });
        }
        if std::mem::take(&mut state.flush_canceled) {
            return Poll::Ready(FlushResult { canceled: true, completed: false });
        }
        if !state.paused {
            return Poll::Ready(FlushResult::default());
        }
        register(&mut state.writer_waker, cx.waker());
        Poll::Pending
    }

    /// Wakes a flush waiting on backpressure with a canceled result.
    pub fn cancel_pending_flush(&self) {
        let waker = {
            let mut state = self.shared.lock();
            state.flush_canceled = true;
            state.writer_waker.take()
        };
        wake(waker);
    }

    pub fn is_reader_completed(&self) -> bool {
        self.shared.lock().reader_completed
    }

    /// Commits what is staged and marks the end of the stream, optionally with a failure the
    /// reader will observe on its next read.
    pub fn complete(&mut self, error: Option<io::Error>) {
        if self.completed {
            return;
        }
        self.commit();
        self.completed = true;
        self.retire_tail();

        let waker = {
            let mut state = self.shared.lock();
            state.writer_completed = true;
            state.writer_error = error.map(PipeError::transport);
            state.reader_waker.take()
        };
        wake(waker);
    }

    fn retire_tail(&mut self) {
        if let Some(mut block) = self.tail.take() {
            if let Some(segment) = block.take_staged() {
                self.staged.push(segment);
            }
            self.pool.give_back(block);
        }
    }
}

impl Drop for PipeWriter {
    fn drop(&mut self) {
        self.complete(None);
    }
}

impl io::Write for PipeWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.put_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.commit();
        Ok(())
    }
}

impl fmt::Debug for PipeWriter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PipeWriter").field("unflushed", &self.unflushed).field("completed", &self.completed).finish()
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use futures::FutureExt;

    use super::*;

    fn new_pipe(block_size: usize, options: PipeOptions) -> (PipeWriter, PipeReader) {
        pipe(MemoryPool::new(block_size), options)
    }

    #[tokio::test]
    async fn committed_bytes_reach_the_reader() {
        let (mut writer, mut reader) = new_pipe(8, PipeOptions::unbounded());
        writer.put_slice(b"hello world");
        assert_eq!(writer.unflushed_len(), 11);
        assert!(writer.commit());

        let result = reader.read().await.unwrap();
        assert!(!result.is_completed());
        assert!(!result.is_canceled());
        assert_eq!(&result.buffer().to_bytes()[..], b"hello world");
        assert!(!result.buffer().is_single_segment());
        reader.advance(11, 11).unwrap();
    }

    #[tokio::test]
    async fn staged_bytes_are_invisible_before_commit() {
        let (mut writer, mut reader) = new_pipe(16, PipeOptions::unbounded());
        let buf = writer.lease(4);
        buf[..4].copy_from_slice(b"GET ");
        writer.advance(4);
        assert!(reader.read().now_or_never().is_none());

        writer.commit();
        let result = reader.read().await.unwrap();
        assert_eq!(result.buffer().first_segment(), b"GET ");
    }

    #[tokio::test]
    async fn read_before_advance_is_rejected() {
        let (mut writer, mut reader) = new_pipe(16, PipeOptions::unbounded());
        writer.put_slice(b"abc");
        writer.commit();
        let _ = reader.read().await.unwrap();
        assert!(matches!(reader.read().await, Err(PipeError::ConcurrentRead)));
        assert!(matches!(reader.advance(4, 4), Err(PipeError::InvalidAdvance { .. })));
        assert!(matches!(reader.advance(2, 1), Err(PipeError::InvalidAdvance { .. })));
        reader.advance(0, 3).unwrap();
        assert!(matches!(reader.advance(0, 0), Err(PipeError::NoActiveRead)));
    }

    #[tokio::test]
    async fn examined_data_waits_for_more() {
        let (mut writer, mut reader) = new_pipe(16, PipeOptions::unbounded());
        writer.put_slice(b"GET / HT");
        writer.commit();

        let result = reader.read().await.unwrap();
        assert_eq!(result.buffer().len(), 8);
        reader.advance(0, 8).unwrap();
        assert!(reader.read().now_or_never().is_none());

        writer.put_slice(b"TP/1.1\r\n");
        writer.commit();
        let result = reader.read().await.unwrap();
        assert_eq!(result.buffer().len(), 16);
        reader.advance(16, 16).unwrap();
    }

    #[tokio::test]
    async fn partially_examined_data_is_returned_again() {
        let (mut writer, mut reader) = new_pipe(16, PipeOptions::unbounded());
        writer.put_slice(b"abcdef");
        writer.commit();
        let _ = reader.read().await.unwrap();
        reader.advance(2, 4).unwrap();

        let result = reader.read().now_or_never().unwrap().unwrap();
        assert_eq!(result.buffer().first_segment(), b"cdef");
    }

    #[tokio::test]
    async fn flush_waits_for_the_reader_to_catch_up() {
        let options = PipeOptions { pause_writer_threshold: Some(8), resume_writer_threshold: 4 };
        let (mut writer, mut reader) = new_pipe(64, options);
        writer.put_slice(b"0123456789");

        let mut flush = Box::pin(writer.flush());
        assert!(futures::poll!(&mut flush).is_pending());

        let _ = reader.read().await.unwrap();
        reader.advance(3, 3).unwrap();
        assert!(futures::poll!(&mut flush).is_pending());

        let result = reader.read().now_or_never().unwrap().unwrap();
        assert_eq!(result.buffer().len(), 7);
        reader.advance(3, 7).unwrap();
        let result = flush.await;
        assert!(!result.is_completed());
        assert!(!result.is_canceled());
    }

    #[tokio::test]
    async fn canceled_read_returns_immediately() {
        let (_writer, mut reader) = new_pipe(16, PipeOptions::unbounded());
        let canceller = reader.canceller();
        canceller.cancel();
        let result = reader.read().await.unwrap();
        assert!(result.is_canceled());
        assert!(result.buffer().is_empty());
        reader.advance(0, 0).unwrap();
        assert!(reader.read().now_or_never().is_none());
    }

    #[tokio::test]
    async fn canceled_flush_returns_immediately() {
        let options = PipeOptions { pause_writer_threshold: Some(2), resume_writer_threshold: 1 };
        let (mut writer, _reader) = new_pipe(16, options);
        writer.put_slice(b"abc");
        writer.commit();
        writer.cancel_pending_flush();
        let result = writer.flush().await;
        assert!(result.is_canceled());
    }

    #[tokio::test]
    async fn dropping_the_writer_completes_the_reader() {
        let (mut writer, mut reader) = new_pipe(16, PipeOptions::unbounded());
        writer.write_all(b"tail").unwrap();
        drop(writer);

        let result = reader.read().await.unwrap();
        assert!(result.is_completed());
        assert_eq!(result.buffer().first_segment(), b"tail");
    }

    #[tokio::test]
    async fn writer_failure_reaches_the_reader() {
        let (mut writer, mut reader) = new_pipe(16, PipeOptions::unbounded());
        writer.complete(Some(io::Error::from(io::ErrorKind::ConnectionReset)));
        assert!(matches!(reader.read().await, Err(PipeError::Transport { .. })));
    }

    #[tokio::test]
    async fn flush_completes_once_the_reader_is_gone() {
        let (mut writer, reader) = new_pipe(16, PipeOptions::bounded(Some(4)));
        drop(reader);
        writer.put_slice(b"abcdef");
        assert!(writer.flush().await.is_completed());
        assert!(writer.is_reader_completed());
    }
}
