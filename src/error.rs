//! Error types for the live upload pipeline

use thiserror::Error;

/// Main error type for the crate
#[derive(Error, Debug)]
pub enum Error {
    #[error("Buffer error: {0}")]
    Buffer(#[from] BufferError),

    #[error("Upload error: {0}")]
    Upload(#[from] UploadError),

    #[error("Source error: {0}")]
    Source(#[from] SourceError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Lifecycle error: {0}")]
    Lifecycle(#[from] LifecycleError),
}

/// Chunk buffer errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BufferError {
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Buffer full: {requested} bytes requested, {available} available")]
    BufferFull { requested: usize, available: usize },

    /// The chunk being assembled would outgrow the whole buffer, so no
    /// amount of draining makes room for it
    #[error("Chunk of {chunk} bytes exceeds buffer capacity {capacity}")]
    ChunkTooLarge { chunk: usize, capacity: usize },

    #[error("No chunk ready")]
    Empty,
}

/// Uploader errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum UploadError {
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Uploader not initialized")]
    NotInitialized,

    #[error("Uploader already initialized")]
    AlreadyInitialized,

    #[error("Uploader not running")]
    NotRunning,

    #[error("Uploader already running")]
    AlreadyRunning,

    #[error("Uploader stopped")]
    Stopped,

    #[error("Upload already in progress")]
    UploadInProgress,

    #[error("Upload statistics not yet available")]
    StatsUnavailable,

    #[error("Transport initialization failed: {0}")]
    TransportInitFailed(String),

    #[error("Transfer failed: {0}")]
    TransportTransferFailed(String),

    #[error("Server returned HTTP {status}")]
    HttpStatus { status: u16 },
}

/// Chunk source errors
#[derive(Error, Debug)]
pub enum SourceError {
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Source not initialized")]
    NotInitialized,

    #[error("Source already initialized")]
    AlreadyInitialized,

    #[error("Source already running")]
    AlreadyRunning,

    #[error("Source stopped")]
    Stopped,

    #[error("Failed to spawn worker: {0}")]
    Spawn(String),

    #[error("Chunk does not fit in a {capacity} byte buffer")]
    ChunkTooLarge { capacity: usize },

    #[error("Buffer error: {0}")]
    Buffer(#[from] BufferError),

    #[error("Read failed: {0}")]
    Io(#[from] std::io::Error),
}

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Cannot parse entry, should be name:value, got={0}")]
    BadEntry(String),

    #[error("Failed to read {path}: {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },

    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid value for {field}: {reason}")]
    Invalid { field: &'static str, reason: String },
}

/// Component state machine violations
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleError {
    #[error("Component not initialized")]
    NotInitialized,

    #[error("Component already initialized")]
    AlreadyInitialized,

    #[error("Component already running")]
    AlreadyRunning,

    #[error("Component stopped")]
    Stopped,
}

impl From<LifecycleError> for UploadError {
    fn from(err: LifecycleError) -> Self {
        match err {
            LifecycleError::NotInitialized => UploadError::NotInitialized,
            LifecycleError::AlreadyInitialized => UploadError::AlreadyInitialized,
            LifecycleError::AlreadyRunning => UploadError::AlreadyRunning,
            LifecycleError::Stopped => UploadError::Stopped,
        }
    }
}

impl From<LifecycleError> for SourceError {
    fn from(err: LifecycleError) -> Self {
        match err {
            LifecycleError::NotInitialized => SourceError::NotInitialized,
            LifecycleError::AlreadyInitialized => SourceError::AlreadyInitialized,
            LifecycleError::AlreadyRunning => SourceError::AlreadyRunning,
            LifecycleError::Stopped => SourceError::Stopped,
        }
    }
}

/// Result type alias for the crate
pub type Result<T> = std::result::Result<T, Error>;
