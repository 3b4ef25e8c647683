//! Consumer step moving ready chunks from the buffer to the uploader

use crate::buffer::{ChunkBuffer, ChunkInfo};
use crate::constants::DEFAULT_READ_BUFFER_SIZE;
use crate::error::Result;
use crate::upload::HttpUploader;

/// Moves one chunk at a time from a [`ChunkBuffer`] into an
/// [`HttpUploader`].
///
/// The read buffer belongs to the consumer and grows when a chunk larger
/// than any seen so far shows up; the producer is never involved.
pub struct ChunkPump {
    read_buf: Vec<u8>,
    chunks_sent: u64,
}

impl ChunkPump {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_READ_BUFFER_SIZE)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            read_buf: vec![0u8; capacity],
            chunks_sent: 0,
        }
    }

    /// Hand the oldest ready chunk to the uploader if it is idle.
    /// Returns the chunk moved, or `None` when there was nothing to do.
    pub fn pump(
        &mut self,
        buffer: &ChunkBuffer,
        uploader: &HttpUploader,
    ) -> Result<Option<ChunkInfo>> {
        if !uploader.upload_complete() {
            return Ok(None);
        }
        let Some(length) = buffer.is_chunk_ready() else {
            return Ok(None);
        };

        if length > self.read_buf.len() {
            tracing::debug!("growing read buffer {} -> {}", self.read_buf.len(), length);
            self.read_buf.resize(length, 0);
        }

        let info = buffer.read_chunk(&mut self.read_buf[..length])?;
        tracing::debug!("starting upload of chunk {} ({} bytes)", info.sequence, length);
        if let Err(e) = uploader.upload_buffer(&self.read_buf[..length]) {
            tracing::error!("Chunk {} lost, upload could not start: {}", info.sequence, e);
            return Err(e.into());
        }

        self.chunks_sent += 1;
        Ok(Some(info))
    }

    /// Current read buffer size
    pub fn read_buffer_size(&self) -> usize {
        self.read_buf.len()
    }

    pub fn chunks_sent(&self) -> u64 {
        self.chunks_sent
    }
}

impl Default for ChunkPump {
    fn default() -> Self {
        Self::new()
    }
}
