//! SQLite connection pools: one serialized writer, many readers.
//!
//! All mutations go through the single writer connection, so multi-statement
//! operations from one caller cannot interleave with another writer. Readers
//! run without transactions and may observe a commit between two statements;
//! code that needs a consistent view must tolerate that (see
//! [`crate::block_store::BlockStore::get_peak`]).

use std::path::Path;

use sqlx::Sqlite;
use sqlx::pool::PoolConnection;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};

use crate::error::StoreError;

/// On-disk layout generation. Fixed for the lifetime of a store file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchemaVersion {
    /// Split-table layout with hex keys and an `is_peak` flag.
    V1,
    /// Single-table layout with binary keys, a main-chain flag, a peak
    /// pointer table, and zstd-compressed payloads.
    V2,
}

/// Upper bound on bound parameters per statement; batched `IN (...)` queries
/// are chunked to stay under it.
const HOST_PARAMETER_LIMIT: usize = 900;

const READER_CONNECTIONS: u32 = 4;

/// Shared handle to the block store database.
pub struct DbPool {
    writer: SqlitePool,
    reader: SqlitePool,
    schema_version: SchemaVersion,
}

impl DbPool {
    /// Open (creating if missing) the database at `path` with the given
    /// schema generation. Uses WAL journaling so readers never block the
    /// writer.
    pub async fn open(path: impl AsRef<Path>, schema_version: SchemaVersion) -> Result<Self, StoreError> {
        let options = SqliteConnectOptions::new()
            .filename(path.as_ref())
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal);

        let writer = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options.clone())
            .await?;
        let reader = SqlitePoolOptions::new()
            .max_connections(READER_CONNECTIONS)
            .connect_with(options)
            .await?;

        Ok(Self {
            writer,
            reader,
            schema_version,
        })
    }

    pub fn schema_version(&self) -> SchemaVersion {
        self.schema_version
    }

    pub fn host_parameter_limit(&self) -> usize {
        HOST_PARAMETER_LIMIT
    }

    /// Acquire the writer connection. Waits until no other writer holds it.
    pub async fn writer(&self) -> Result<PoolConnection<Sqlite>, StoreError> {
        Ok(self.writer.acquire().await?)
    }

    /// Acquire a reader connection.
    pub async fn reader(&self) -> Result<PoolConnection<Sqlite>, StoreError> {
        Ok(self.reader.acquire().await?)
    }
}
