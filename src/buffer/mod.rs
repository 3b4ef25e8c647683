//! Chunk buffering between the encoder side and the uploader

pub mod chunk;
pub mod webm;

pub use chunk::{create_shared_buffer, Chunk, ChunkBuffer, ChunkInfo, SharedChunkBuffer};
pub use webm::{ClusterSplitter, Piece, CLUSTER_ID};
