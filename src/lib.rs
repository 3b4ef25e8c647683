//! # WebM Live Uploader
//!
//! Chunked streaming of live WebM output to an HTTP server.
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌──────────────────────┐        ┌───────────────────────────────────────┐
//! │ External encoder     │ writes │ growing .webm file                    │
//! │ (capture, VPx/Vorbis,│───────▶│ EBML header | Cluster | Cluster | ... │
//! │  WebM muxing)        │        └───────────────────┬───────────────────┘
//! └──────────────────────┘                            │
//!                                                     ▼
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │ FileChunkSource (source::file) - producer thread                        │
//! │   reads appended bytes, splits at Cluster IDs (buffer::webm)            │
//! └───────────────────────────────────┬─────────────────────────────────────┘
//!                                     │ write / finish_chunk
//!                                     ▼
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │ ChunkBuffer (buffer::chunk) - FIFO, bounded by bytes, one mutex         │
//! └───────────────────────────────────┬─────────────────────────────────────┘
//!                                     │ is_chunk_ready / read_chunk
//!                                     ▼
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │ ChunkPump (pump) - main thread, 100ms tick, growable read buffer        │
//! └───────────────────────────────────┬─────────────────────────────────────┘
//!                                     │ upload_complete / upload_buffer
//!                                     ▼
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │ HttpUploader (upload::uploader) - worker thread, one chunk in flight    │
//! │   ChunkTransport -> HTTP POST (raw body or multipart form)              │
//! └───────────────────────────────────┬─────────────────────────────────────┘
//!                                     │ StatsTracker (own lock)
//!                                     ▼
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │ ProgressReporter (progress) - snapshot reads for the terminal line      │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Both worker-owning components follow the Init/Run/Stop contract in
//! [`control`] and are stopped in reverse start order.

pub mod buffer;
pub mod config;
pub mod control;
pub mod error;
pub mod progress;
pub mod pump;
pub mod source;
pub mod upload;

pub use error::{Error, Result};

/// Application-wide constants
pub mod constants {
    /// Default chunk buffer capacity (8 MiB)
    pub const DEFAULT_BUFFER_CAPACITY: usize = 8 * 1024 * 1024;

    /// Initial consumer read buffer size
    pub const DEFAULT_READ_BUFFER_SIZE: usize = 100 * 1024;

    /// Bytes read from the source file per read call
    pub const DEFAULT_READ_SIZE: usize = 64 * 1024;

    /// Source and main loop polling interval
    pub const DEFAULT_POLL_INTERVAL_MS: u64 = 100;

    /// TCP connect timeout for uploads
    pub const DEFAULT_CONNECT_TIMEOUT_MS: u64 = 10_000;

    /// Granularity of upload progress reporting
    pub const UPLOAD_SLICE_SIZE: usize = 16 * 1024;

    /// Value of the `agent` query parameter
    pub const AGENT_QUERY_VALUE: &str = "p";

    /// Value of the `itag` query parameter identifying WebM
    pub const WEBM_ITAG_QUERY_VALUE: &str = "43";

    pub const WEBM_MIME_TYPE: &str = "video/webm";

    /// Form field carrying the chunk in form POSTs
    pub const FORM_FILE_FIELD: &str = "webm_file";
}
