//! Encoder-side chunk producers

pub mod file;

pub use file::{FileChunkSource, SourceSettings};
