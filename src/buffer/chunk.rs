//! Size-bounded FIFO of encoded WebM chunks
//!
//! Sits between a single producer (the encoder side) and a single consumer
//! (the uploader side). The producer appends bytes to the chunk being
//! assembled and marks chunk boundaries with [`ChunkBuffer::finish_chunk`];
//! the consumer polls [`ChunkBuffer::is_chunk_ready`] and copies chunks out
//! with [`ChunkBuffer::read_chunk`].
//!
//! All state lives behind one mutex that is only held for the in-memory
//! copy, never across I/O.

use bytes::{Bytes, BytesMut};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::error::BufferError;

/// One completed unit of encoded media
#[derive(Debug, Clone)]
pub struct Chunk {
    /// Chunk payload
    pub data: Bytes,
    /// Sequence number, starting at 0
    pub sequence: u64,
    /// Time the chunk was completed, relative to buffer creation
    pub timestamp: Duration,
}

impl Chunk {
    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn info(&self) -> ChunkInfo {
        ChunkInfo {
            sequence: self.sequence,
            timestamp: self.timestamp,
            length: self.data.len(),
        }
    }
}

/// Metadata of a chunk handed to the consumer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkInfo {
    pub sequence: u64,
    pub timestamp: Duration,
    pub length: usize,
}

struct Inner {
    /// Completed chunks, oldest first
    ready: VecDeque<Chunk>,
    /// Chunk currently being assembled
    assembling: BytesMut,
    /// Bytes held in `ready` plus `assembling`
    buffered: usize,
    next_sequence: u64,
}

impl Inner {
    fn available(&self, capacity: usize) -> usize {
        capacity - self.buffered
    }

    fn append(&mut self, capacity: usize, data: &[u8]) -> Result<(), BufferError> {
        let chunk = self.assembling.len() + data.len();
        if chunk > capacity {
            return Err(BufferError::ChunkTooLarge { chunk, capacity });
        }
        let available = self.available(capacity);
        if data.len() > available {
            return Err(BufferError::BufferFull {
                requested: data.len(),
                available,
            });
        }
        self.assembling.extend_from_slice(data);
        self.buffered += data.len();
        Ok(())
    }

    fn complete(&mut self, epoch: Instant) -> Option<u64> {
        if self.assembling.is_empty() {
            return None;
        }
        let sequence = self.next_sequence;
        self.next_sequence += 1;
        let data = self.assembling.split().freeze();
        self.ready.push_back(Chunk {
            data,
            sequence,
            timestamp: epoch.elapsed(),
        });
        Some(sequence)
    }
}

/// Ordered, capacity-bounded chunk buffer
pub struct ChunkBuffer {
    inner: Mutex<Inner>,
    capacity: usize,
    epoch: Instant,
}

impl ChunkBuffer {
    /// Create a buffer holding at most `capacity` bytes
    pub fn new(capacity: usize) -> Result<Self, BufferError> {
        if capacity == 0 {
            return Err(BufferError::InvalidArgument(
                "capacity must be greater than zero".into(),
            ));
        }

        Ok(Self {
            inner: Mutex::new(Inner {
                ready: VecDeque::new(),
                assembling: BytesMut::new(),
                buffered: 0,
                next_sequence: 0,
            }),
            capacity,
            epoch: Instant::now(),
        })
    }

    /// Append bytes to the chunk being assembled.
    ///
    /// Fails with [`BufferError::BufferFull`] when the total buffered size
    /// would exceed capacity. Nothing is written in that case; the caller
    /// must retry once the consumer has drained some chunks. Fails with
    /// [`BufferError::ChunkTooLarge`] instead when the chunk alone would
    /// exceed capacity, since retrying can never succeed.
    pub fn write(&self, data: &[u8]) -> Result<(), BufferError> {
        self.inner.lock().append(self.capacity, data)
    }

    /// Mark a chunk boundary. The bytes assembled so far become a ready
    /// chunk. Returns its sequence number, or `None` if nothing was
    /// assembled.
    pub fn finish_chunk(&self) -> Option<u64> {
        self.inner.lock().complete(self.epoch)
    }

    /// Append `data` and mark a boundary in one step
    pub fn write_chunk(&self, data: &[u8]) -> Result<u64, BufferError> {
        if data.is_empty() {
            return Err(BufferError::InvalidArgument("empty chunk".into()));
        }
        let mut inner = self.inner.lock();
        if !inner.assembling.is_empty() {
            return Err(BufferError::InvalidArgument(
                "a partial chunk is being assembled".into(),
            ));
        }
        inner.append(self.capacity, data)?;
        inner
            .complete(self.epoch)
            .ok_or_else(|| BufferError::InvalidArgument("empty chunk".into()))
    }

    /// Length of the oldest ready chunk, if any
    pub fn is_chunk_ready(&self) -> Option<usize> {
        self.inner.lock().ready.front().map(Chunk::len)
    }

    /// Copy the oldest ready chunk into `destination` and remove it.
    ///
    /// `destination` must be exactly as long as the chunk; partial reads
    /// are rejected with [`BufferError::InvalidArgument`] and leave the
    /// buffer untouched.
    pub fn read_chunk(&self, destination: &mut [u8]) -> Result<ChunkInfo, BufferError> {
        let mut inner = self.inner.lock();
        let length = inner
            .ready
            .front()
            .map(Chunk::len)
            .ok_or(BufferError::Empty)?;
        if destination.len() != length {
            return Err(BufferError::InvalidArgument(format!(
                "read length {} does not match chunk length {}",
                destination.len(),
                length
            )));
        }

        let Some(chunk) = inner.ready.pop_front() else {
            return Err(BufferError::Empty);
        };
        inner.buffered -= length;
        drop(inner);

        destination.copy_from_slice(&chunk.data);
        Ok(chunk.info())
    }

    /// Discard everything, including a partially assembled chunk.
    /// Returns the number of ready chunks dropped.
    pub fn clear(&self) -> usize {
        let mut inner = self.inner.lock();
        let dropped = inner.ready.len();
        let bytes = inner.buffered;
        inner.ready.clear();
        inner.assembling.clear();
        inner.buffered = 0;
        drop(inner);

        if bytes > 0 {
            tracing::warn!("Discarded {} chunks ({} bytes) from chunk buffer", dropped, bytes);
        }
        dropped
    }

    /// Configured capacity in bytes
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Bytes currently held (ready chunks plus the partial chunk)
    pub fn buffered_bytes(&self) -> usize {
        self.inner.lock().buffered
    }

    /// Number of chunks waiting for the consumer
    pub fn ready_chunks(&self) -> usize {
        self.inner.lock().ready.len()
    }
}

/// Thread-safe handle to a chunk buffer
pub type SharedChunkBuffer = Arc<ChunkBuffer>;

/// Create a new shared chunk buffer
pub fn create_shared_buffer(capacity: usize) -> Result<SharedChunkBuffer, BufferError> {
    ChunkBuffer::new(capacity).map(Arc::new)
}

#[cfg(test)]
mod tests {
    use super::*;

    const KB: usize = 1024;

    fn read_next(buffer: &ChunkBuffer) -> (ChunkInfo, Vec<u8>) {
        let length = buffer.is_chunk_ready().unwrap();
        let mut out = vec![0u8; length];
        let info = buffer.read_chunk(&mut out).unwrap();
        (info, out)
    }

    #[test]
    fn test_zero_capacity_rejected() {
        assert!(matches!(
            ChunkBuffer::new(0),
            Err(BufferError::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_fifo_order() {
        let buffer = ChunkBuffer::new(64 * KB).unwrap();

        buffer.write(b"head").unwrap();
        buffer.write(b"er").unwrap();
        assert_eq!(buffer.is_chunk_ready(), None);
        assert_eq!(buffer.finish_chunk(), Some(0));
        buffer.write_chunk(b"cluster-1").unwrap();
        buffer.write_chunk(b"cluster-2").unwrap();

        let (info, data) = read_next(&buffer);
        assert_eq!(info.sequence, 0);
        assert_eq!(data, b"header");

        let (info, data) = read_next(&buffer);
        assert_eq!(info.sequence, 1);
        assert_eq!(data, b"cluster-1");

        let (info, data) = read_next(&buffer);
        assert_eq!(info.sequence, 2);
        assert_eq!(data, b"cluster-2");

        assert_eq!(buffer.is_chunk_ready(), None);
        assert_eq!(buffer.buffered_bytes(), 0);
    }

    #[test]
    fn test_partial_chunk_not_ready() {
        let buffer = ChunkBuffer::new(KB).unwrap();
        buffer.write(&[1, 2, 3]).unwrap();

        assert_eq!(buffer.is_chunk_ready(), None);
        assert_eq!(buffer.read_chunk(&mut [0u8; 3]), Err(BufferError::Empty));
        assert_eq!(buffer.finish_chunk(), Some(0));
        assert_eq!(buffer.is_chunk_ready(), Some(3));
        assert_eq!(buffer.finish_chunk(), None);
    }

    #[test]
    fn test_read_length_mismatch_leaves_buffer_unchanged() {
        let buffer = ChunkBuffer::new(KB).unwrap();
        buffer.write_chunk(&[7u8; 100]).unwrap();

        let mut short = vec![0u8; 99];
        assert!(matches!(
            buffer.read_chunk(&mut short),
            Err(BufferError::InvalidArgument(_))
        ));
        let mut long = vec![0u8; 101];
        assert!(matches!(
            buffer.read_chunk(&mut long),
            Err(BufferError::InvalidArgument(_))
        ));

        assert_eq!(buffer.is_chunk_ready(), Some(100));
        assert_eq!(buffer.buffered_bytes(), 100);
        let (info, data) = read_next(&buffer);
        assert_eq!(info.length, 100);
        assert_eq!(data, vec![7u8; 100]);
    }

    #[test]
    fn test_capacity_scenario() {
        let buffer = ChunkBuffer::new(1024 * KB).unwrap();
        let chunk = vec![0xABu8; 400 * KB];

        buffer.write_chunk(&chunk).unwrap();
        buffer.write_chunk(&chunk).unwrap();
        let err = buffer.write_chunk(&chunk).unwrap_err();
        assert_eq!(
            err,
            BufferError::BufferFull {
                requested: 400 * KB,
                available: 224 * KB,
            }
        );
        assert_eq!(buffer.ready_chunks(), 2);
        assert_eq!(buffer.buffered_bytes(), 800 * KB);

        read_next(&buffer);
        assert_eq!(buffer.write_chunk(&chunk).unwrap(), 2);
        assert!(buffer.buffered_bytes() <= buffer.capacity());
    }

    #[test]
    fn test_partial_write_counts_against_capacity() {
        let buffer = ChunkBuffer::new(10).unwrap();
        buffer.write_chunk(&[0u8; 3]).unwrap();
        buffer.write(&[0u8; 3]).unwrap();
        assert!(matches!(
            buffer.write(&[0u8; 5]),
            Err(BufferError::BufferFull { requested: 5, available: 4 })
        ));
        buffer.write(&[0u8; 4]).unwrap();
        assert_eq!(buffer.finish_chunk(), Some(1));
        assert_eq!(buffer.buffered_bytes(), 10);
    }

    #[test]
    fn test_chunk_larger_than_capacity() {
        let buffer = ChunkBuffer::new(10).unwrap();
        buffer.write_chunk(&[0u8; 4]).unwrap();
        buffer.write(&[0u8; 6]).unwrap();

        // Draining the ready chunk would not help, whatever the consumer does
        assert_eq!(
            buffer.write(&[0u8; 5]),
            Err(BufferError::ChunkTooLarge {
                chunk: 11,
                capacity: 10
            })
        );
        assert_eq!(buffer.buffered_bytes(), 10);
        assert_eq!(buffer.ready_chunks(), 1);

        let buffer = ChunkBuffer::new(10).unwrap();
        assert!(matches!(
            buffer.write_chunk(&[0u8; 11]),
            Err(BufferError::ChunkTooLarge { chunk: 11, .. })
        ));
        assert_eq!(buffer.buffered_bytes(), 0);
    }

    #[test]
    fn test_write_chunk_rejects_open_chunk() {
        let buffer = ChunkBuffer::new(KB).unwrap();
        buffer.write(b"partial").unwrap();
        assert!(matches!(
            buffer.write_chunk(b"whole"),
            Err(BufferError::InvalidArgument(_))
        ));
        assert_eq!(buffer.buffered_bytes(), 7);
    }

    #[test]
    fn test_clear() {
        let buffer = ChunkBuffer::new(KB).unwrap();
        buffer.write_chunk(b"one").unwrap();
        buffer.write_chunk(b"two").unwrap();
        buffer.write(b"three").unwrap();

        assert_eq!(buffer.clear(), 2);
        assert_eq!(buffer.buffered_bytes(), 0);
        assert_eq!(buffer.is_chunk_ready(), None);

        // Sequence numbers keep counting after a clear
        assert_eq!(buffer.write_chunk(b"four").unwrap(), 2);
    }

    #[test]
    fn test_timestamps_monotonic() {
        let buffer = ChunkBuffer::new(KB).unwrap();
        buffer.write_chunk(b"a").unwrap();
        std::thread::sleep(Duration::from_millis(5));
        buffer.write_chunk(b"b").unwrap();

        let (first, _) = read_next(&buffer);
        let (second, _) = read_next(&buffer);
        assert!(second.timestamp > first.timestamp);
    }
}
