//! Pooled memory blocks and the byte pipes connecting the transport to the request frame.

mod pipe;
mod pool;
mod read_buffer;

pub use pipe::{FlushResult, PipeOptions, PipeReader, PipeWriter, ReadCanceller, ReadResult, pipe};
pub use pool::{Block, MemoryPool, PoolStats};
pub use read_buffer::{Cursor, ReadBuffer};
