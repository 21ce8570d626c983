//! # tarn-store — Durable block storage for the Tarn full node.
//!
//! Persists full blocks and their derived records in SQLite, tracks
//! main-chain membership and the current peak across reorgs, and serves
//! lookups through a bounded in-memory cache:
//! - [`db::DbPool`] — serialized writer / concurrent reader connection pools
//! - [`schema::SchemaBackend`] — the two supported on-disk layouts
//! - [`block_store::BlockStore`] — the persistence engine itself

pub mod block_store;
pub mod cache;
pub mod compression;
pub mod db;
pub mod error;
pub mod schema;

pub use block_store::BlockStore;
pub use db::{DbPool, SchemaVersion};
pub use error::StoreError;
