//! Fixed-size memory blocks shared by the pipes of every connection.
//!
//! A [`Block`] is a `block_size` region. The writer side fills it from the front: bytes become
//! *staged* when written and leave the block as frozen [`Bytes`] when committed, so readers
//! hold on to the block memory without copying. Once the writer retires a block it goes back
//! to the pool, which keeps it until every `Bytes` handle pointing into it has been dropped
//! and only then hands the memory out again.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use bytes::{Bytes, BytesMut};
use crossbeam::queue::SegQueue;

/// How many retired blocks `rent` inspects before allocating.
const RECLAIM_ATTEMPTS: usize = 4;

#[derive(Clone)]
pub struct MemoryPool {
    inner: Arc<PoolInner>,
}

struct PoolInner {
    block_size: usize,
    max_retained: usize,
    retired: SegQueue<BytesMut>,
    allocated: AtomicUsize,
    reused: AtomicUsize,
}

/// Counters describing how the pool served its blocks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolStats {
    pub allocated: usize,
    pub reused: usize,
    pub retained: usize,
}

impl MemoryPool {
    pub fn new(block_size: usize) -> Self {
        Self::with_max_retained(block_size, 1024)
    }

    pub fn with_max_retained(block_size: usize, max_retained: usize) -> Self {
        assert!(block_size > 0, "block size must be greater than zero");
        let inner = PoolInner {
            block_size,
            max_retained,
            retired: SegQueue::new(),
            allocated: AtomicUsize::new(0),
            reused: AtomicUsize::new(0),
        };
        Self { inner: Arc::new(inner) }
    }

    pub fn block_size(&self) -> usize {
        self.inner.block_size
    }

    /// Hands out an empty block, reusing retired memory when no reader still references it.
    pub fn rent(&self) -> Block {
        let block_size = self.inner.block_size;
        for _ in 0..RECLAIM_ATTEMPTS.min(self.inner.retired.len()) {
            let Some(mut data) = self.inner.retired.pop() else {
                break;
            };
            if data.try_reclaim(block_size) {
                data.resize(block_size, 0);
                self.inner.reused.fetch_add(1, Ordering::Relaxed);
                return Block::new(data);
            }
            self.inner.retired.push(data);
        }

        self.inner.allocated.fetch_add(1, Ordering::Relaxed);
        Block::new(BytesMut::zeroed(block_size))
    }

    /// Takes back a block the writer is done with. Staged bytes that were never committed are
    /// discarded.
    pub fn give_back(&self, block: Block) {
        if self.inner.retired.len() >= self.inner.max_retained {
            return;
        }
        let mut data = block.data;
        data.clear();
        self.inner.retired.push(data);
    }

    pub fn stats(&self) -> PoolStats {
        PoolStats {
            allocated: self.inner.allocated.load(Ordering::Relaxed),
            reused: self.inner.reused.load(Ordering::Relaxed),
            retained: self.inner.retired.len(),
        }
    }
}

impl fmt::Debug for MemoryPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemoryPool").field("block_size", &self.inner.block_size).field("stats", &self.stats()).finish()
    }
}

/// A writable block. `data[..staged]` holds bytes written but not yet committed,
/// `data[staged..]` is free space.
#[derive(Debug)]
pub struct Block {
    data: BytesMut,
    staged: usize,
}

impl Block {
    fn new(data: BytesMut) -> Self {
        Self { data, staged: 0 }
    }

    /// Free space after the staged bytes.
    pub fn writable(&mut self) -> &mut [u8] {
        &mut self.data[self.staged..]
    }

    pub fn writable_len(&self) -> usize {
        self.data.len() - self.staged
    }

    pub fn staged_len(&self) -> usize {
        self.staged
    }

    /// Marks `count` bytes of free space as written.
    pub fn stage(&mut self, count: usize) {
        assert!(count <= self.writable_len(), "staged past the end of the block");
        self.staged += count;
    }

    /// Splits the staged bytes off as an immutable segment.
    pub fn take_staged(&mut self) -> Option<Bytes> {
        if self.staged == 0 {
            return None;
        }
        let segment = self.data.split_to(self.staged).freeze();
        self.staged = 0;
        Some(segment)
    }
}
