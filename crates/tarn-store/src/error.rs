//! Error types for the block store.
use tarn_core::error::CodecError;
use tarn_core::types::BlockHash;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("block not found: {0}")] BlockNotFound(BlockHash),
    #[error("incomplete range {start}-{stop}: expected {expected} blocks, found {found}")]
    IncompleteRange { start: u32, stop: u32, expected: usize, found: usize },
    #[error("corrupt block store: {0}")] CorruptStore(String),
    #[error("header hash mismatch: expected {expected}, computed {computed}")]
    HashMismatch { expected: BlockHash, computed: BlockHash },
    #[error("no generator for main chain block at height {0}")] MissingGenerator(u32),
    #[error("{0} requires the v2 schema")] UnsupportedSchema(&'static str),
    #[error("database: {0}")] Database(#[from] sqlx::Error),
    #[error("codec: {0}")] Codec(#[from] CodecError),
    #[error("compression: {0}")] Compression(#[from] std::io::Error),
}
