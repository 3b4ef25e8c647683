//! Chunk upload scheduling over HTTP

pub mod settings;
pub mod stats;
pub mod transport;
pub mod uploader;

pub use settings::{normalize_target_url, PostMode, UploadTarget, UploaderSettings};
pub use stats::{StatsTracker, TransferProgress, UploadStats};
pub use transport::{ChunkTransport, HttpTransport};
pub use uploader::HttpUploader;
