//! The two on-disk layouts behind one backend interface.
//!
//! A backend is chosen once when the store is opened and never changes for
//! the life of the file. All SQL lives here. Payload compression is a layout
//! concern: the v2 backend stores zstd-compressed block bytes and always
//! hands decompressed bytes back; v1 stores raw bytes. The engine never
//! branches on layout.

use std::collections::HashMap;

use async_trait::async_trait;
use sqlx::{Connection, Row, SqliteConnection};
use tracing::info;

use tarn_core::types::BlockHash;

use crate::compression;
use crate::error::StoreError;

/// Row values for a newly accepted block.
///
/// `block_bytes` is the uncompressed canonical encoding; each backend applies
/// its own payload encoding before writing.
pub struct NewBlockRow<'a> {
    pub header_hash: BlockHash,
    pub prev_hash: BlockHash,
    pub height: u32,
    pub sub_epoch_summary: Option<Vec<u8>>,
    pub fully_compactified: bool,
    pub is_transaction_block: bool,
    pub block_bytes: &'a [u8],
    pub record_bytes: &'a [u8],
}

/// Serialized block record plus decompressed block bytes for one row.
pub struct RecordPair {
    pub record_bytes: Vec<u8>,
    pub block_bytes: Vec<u8>,
}

/// One on-disk layout. Implementations must not assume the other layout's
/// tables exist.
#[async_trait]
pub trait SchemaBackend: Send + Sync {
    /// Create tables and indexes. Idempotent; safe on every startup.
    async fn create_tables(&self, conn: &mut SqliteConnection) -> Result<(), StoreError>;

    /// Insert a block row; a duplicate header hash is a silent no-op.
    async fn insert_block(
        &self,
        conn: &mut SqliteConnection,
        row: &NewBlockRow<'_>,
    ) -> Result<(), StoreError>;

    /// Overwrite the stored payload and compaction flag for an existing row.
    async fn update_proof(
        &self,
        conn: &mut SqliteConnection,
        hash: &BlockHash,
        block_bytes: &[u8],
        fully_compactified: bool,
    ) -> Result<(), StoreError>;

    /// Mark a batch of rows as main-chain members. Every hash must already
    /// exist; anything else is store corruption. No-op under v1.
    async fn set_in_chain(
        &self,
        conn: &mut SqliteConnection,
        hashes: &[BlockHash],
    ) -> Result<(), StoreError>;

    /// Clear the main-chain flag above `height`. No-op under v1.
    async fn rollback(&self, conn: &mut SqliteConnection, height: u32) -> Result<(), StoreError>;

    /// Point the peak slot at `hash`.
    async fn set_peak(&self, conn: &mut SqliteConnection, hash: &BlockHash)
    -> Result<(), StoreError>;

    /// Current peak hash and height, if any.
    async fn peak(
        &self,
        conn: &mut SqliteConnection,
    ) -> Result<Option<(BlockHash, u32)>, StoreError>;

    /// Stored payload for one block, decompressed.
    async fn block_bytes(
        &self,
        conn: &mut SqliteConnection,
        hash: &BlockHash,
    ) -> Result<Option<Vec<u8>>, StoreError>;

    /// Payloads for every row (any fork) at the given heights. Order is not
    /// guaranteed.
    async fn block_bytes_at_heights(
        &self,
        conn: &mut SqliteConnection,
        heights: &[u32],
    ) -> Result<Vec<Vec<u8>>, StoreError>;

    /// Payloads keyed by hash for the requested rows; absent hashes are
    /// simply absent from the map.
    async fn block_bytes_by_hash(
        &self,
        conn: &mut SqliteConnection,
        hashes: &[BlockHash],
    ) -> Result<HashMap<BlockHash, Vec<u8>>, StoreError>;

    /// `(height, payload)` for main-chain rows at the given heights. v2 only.
    async fn main_chain_blocks_at_heights(
        &self,
        conn: &mut SqliteConnection,
        heights: &[u32],
    ) -> Result<Vec<(u32, Vec<u8>)>, StoreError>;

    /// Record and payload bytes for one row.
    async fn record_pair(
        &self,
        conn: &mut SqliteConnection,
        hash: &BlockHash,
    ) -> Result<Option<RecordPair>, StoreError>;

    /// Record and payload bytes for the requested rows.
    async fn record_pairs_by_hash(
        &self,
        conn: &mut SqliteConnection,
        hashes: &[BlockHash],
    ) -> Result<Vec<(BlockHash, RecordPair)>, StoreError>;

    /// Record and payload bytes for every row (any fork) in the inclusive
    /// height range.
    async fn record_pairs_in_range(
        &self,
        conn: &mut SqliteConnection,
        start: u32,
        stop: u32,
    ) -> Result<Vec<(BlockHash, RecordPair)>, StoreError>;

    /// Main-chain payloads in the inclusive height range, ascending by
    /// height. v2 only; completeness is checked by the engine.
    async fn main_chain_block_bytes_in_range(
        &self,
        conn: &mut SqliteConnection,
        start: u32,
        stop: u32,
    ) -> Result<Vec<Vec<u8>>, StoreError>;

    /// Compaction flag for one row.
    async fn is_fully_compactified(
        &self,
        conn: &mut SqliteConnection,
        hash: &BlockHash,
    ) -> Result<Option<bool>, StoreError>;

    /// Count rows with the given compaction state (main-chain only under v2).
    async fn count_compactified(
        &self,
        conn: &mut SqliteConnection,
        compactified: bool,
    ) -> Result<u64, StoreError>;

    /// Up to `limit` random heights whose blocks are not compactified.
    async fn random_not_compactified_heights(
        &self,
        conn: &mut SqliteConnection,
        limit: u32,
    ) -> Result<Vec<u32>, StoreError>;

    /// Insert or replace the challenge segments blob for a sub-epoch.
    async fn upsert_segments(
        &self,
        conn: &mut SqliteConnection,
        hash: &BlockHash,
        bytes: &[u8],
    ) -> Result<(), StoreError>;

    /// Challenge segments blob for a sub-epoch, if stored.
    async fn segments(
        &self,
        conn: &mut SqliteConnection,
        hash: &BlockHash,
    ) -> Result<Option<Vec<u8>>, StoreError>;
}

fn placeholders(n: usize) -> String {
    vec!["?"; n].join(",")
}

/// v2: single `full_blocks` table with binary keys, an explicit main-chain
/// flag, a peak pointer table, and compressed payloads.
pub struct ModernSchema {
    max_params: usize,
}

impl ModernSchema {
    pub fn new(max_params: usize) -> Self {
        Self { max_params }
    }
}

#[async_trait]
impl SchemaBackend for ModernSchema {
    async fn create_tables(&self, conn: &mut SqliteConnection) -> Result<(), StoreError> {
        info!("creating v2 block store tables and indexes");
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS full_blocks(\
             header_hash blob PRIMARY KEY,\
             prev_hash blob,\
             height bigint,\
             sub_epoch_summary blob,\
             is_fully_compactified tinyint,\
             in_main_chain tinyint,\
             block blob,\
             block_record blob)",
        )
        .execute(&mut *conn)
        .await?;

        // Single-row table holding the current peak hash; the fixed key makes
        // the upsert trivial.
        sqlx::query("CREATE TABLE IF NOT EXISTS current_peak(key int PRIMARY KEY, hash blob)")
            .execute(&mut *conn)
            .await?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS sub_epoch_segments_v3(\
             ses_block_hash blob PRIMARY KEY,\
             challenge_segments blob)",
        )
        .execute(&mut *conn)
        .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS height ON full_blocks(height)")
            .execute(&mut *conn)
            .await?;
        sqlx::query(
            "CREATE INDEX IF NOT EXISTS is_fully_compactified ON \
             full_blocks(is_fully_compactified, in_main_chain) WHERE in_main_chain=1",
        )
        .execute(&mut *conn)
        .await?;
        sqlx::query(
            "CREATE INDEX IF NOT EXISTS main_chain ON \
             full_blocks(height, in_main_chain) WHERE in_main_chain=1",
        )
        .execute(&mut *conn)
        .await?;
        Ok(())
    }

    async fn insert_block(
        &self,
        conn: &mut SqliteConnection,
        row: &NewBlockRow<'_>,
    ) -> Result<(), StoreError> {
        let compressed = compression::compress(row.block_bytes)?;
        sqlx::query("INSERT OR IGNORE INTO full_blocks VALUES(?, ?, ?, ?, ?, ?, ?, ?)")
            .bind(&row.header_hash.0[..])
            .bind(&row.prev_hash.0[..])
            .bind(i64::from(row.height))
            .bind(row.sub_epoch_summary.as_deref())
            .bind(i64::from(row.fully_compactified))
            // a freshly added block is never canonical yet
            .bind(0i64)
            .bind(&compressed[..])
            .bind(row.record_bytes)
            .execute(&mut *conn)
            .await?;
        Ok(())
    }

    async fn update_proof(
        &self,
        conn: &mut SqliteConnection,
        hash: &BlockHash,
        block_bytes: &[u8],
        fully_compactified: bool,
    ) -> Result<(), StoreError> {
        let compressed = compression::compress(block_bytes)?;
        sqlx::query("UPDATE full_blocks SET block=?, is_fully_compactified=? WHERE header_hash=?")
            .bind(&compressed[..])
            .bind(i64::from(fully_compactified))
            .bind(&hash.0[..])
            .execute(&mut *conn)
            .await?;
        Ok(())
    }

    async fn set_in_chain(
        &self,
        conn: &mut SqliteConnection,
        hashes: &[BlockHash],
    ) -> Result<(), StoreError> {
        let mut tx = conn.begin().await?;
        let mut affected = 0u64;
        for hash in hashes {
            affected += sqlx::query("UPDATE full_blocks SET in_main_chain=1 WHERE header_hash=?")
                .bind(&hash.0[..])
                .execute(&mut *tx)
                .await?
                .rows_affected();
        }
        if affected != hashes.len() as u64 {
            return Err(StoreError::CorruptStore(format!(
                "set_in_chain updated {affected} of {} rows; every hash must exist",
                hashes.len()
            )));
        }
        tx.commit().await?;
        Ok(())
    }

    async fn rollback(&self, conn: &mut SqliteConnection, height: u32) -> Result<(), StoreError> {
        sqlx::query("UPDATE full_blocks SET in_main_chain=0 WHERE height>? AND in_main_chain=1")
            .bind(i64::from(height))
            .execute(&mut *conn)
            .await?;
        Ok(())
    }

    async fn set_peak(
        &self,
        conn: &mut SqliteConnection,
        hash: &BlockHash,
    ) -> Result<(), StoreError> {
        sqlx::query("INSERT OR REPLACE INTO current_peak VALUES(?, ?)")
            .bind(0i64)
            .bind(&hash.0[..])
            .execute(&mut *conn)
            .await?;
        Ok(())
    }

    async fn peak(
        &self,
        conn: &mut SqliteConnection,
    ) -> Result<Option<(BlockHash, u32)>, StoreError> {
        let pointer = sqlx::query("SELECT hash FROM current_peak WHERE key=0")
            .fetch_optional(&mut *conn)
            .await?;
        let Some(pointer) = pointer else {
            return Ok(None);
        };
        let hash = BlockHash::from_slice(&pointer.get::<Vec<u8>, _>(0))?;
        // The pointer can dangle relative to a concurrent writer; report
        // "no peak" rather than failing a best-effort status query.
        let height = sqlx::query("SELECT height FROM full_blocks WHERE header_hash=?")
            .bind(&hash.0[..])
            .fetch_optional(&mut *conn)
            .await?;
        match height {
            Some(row) => Ok(Some((hash, row.get::<i64, _>(0) as u32))),
            None => Ok(None),
        }
    }

    async fn block_bytes(
        &self,
        conn: &mut SqliteConnection,
        hash: &BlockHash,
    ) -> Result<Option<Vec<u8>>, StoreError> {
        let row = sqlx::query("SELECT block FROM full_blocks WHERE header_hash=?")
            .bind(&hash.0[..])
            .fetch_optional(&mut *conn)
            .await?;
        match row {
            Some(row) => Ok(Some(compression::decompress(&row.get::<Vec<u8>, _>(0))?)),
            None => Ok(None),
        }
    }

    async fn block_bytes_at_heights(
        &self,
        conn: &mut SqliteConnection,
        heights: &[u32],
    ) -> Result<Vec<Vec<u8>>, StoreError> {
        let mut out = Vec::new();
        for chunk in heights.chunks(self.max_params) {
            let sql = format!(
                "SELECT block FROM full_blocks WHERE height IN ({})",
                placeholders(chunk.len())
            );
            let mut query = sqlx::query(&sql);
            for height in chunk {
                query = query.bind(i64::from(*height));
            }
            for row in query.fetch_all(&mut *conn).await? {
                out.push(compression::decompress(&row.get::<Vec<u8>, _>(0))?);
            }
        }
        Ok(out)
    }

    async fn block_bytes_by_hash(
        &self,
        conn: &mut SqliteConnection,
        hashes: &[BlockHash],
    ) -> Result<HashMap<BlockHash, Vec<u8>>, StoreError> {
        let mut out = HashMap::new();
        for chunk in hashes.chunks(self.max_params) {
            let sql = format!(
                "SELECT header_hash, block FROM full_blocks WHERE header_hash IN ({})",
                placeholders(chunk.len())
            );
            let mut query = sqlx::query(&sql);
            for hash in chunk {
                query = query.bind(&hash.0[..]);
            }
            for row in query.fetch_all(&mut *conn).await? {
                let hash = BlockHash::from_slice(&row.get::<Vec<u8>, _>(0))?;
                out.insert(hash, compression::decompress(&row.get::<Vec<u8>, _>(1))?);
            }
        }
        Ok(out)
    }

    async fn main_chain_blocks_at_heights(
        &self,
        conn: &mut SqliteConnection,
        heights: &[u32],
    ) -> Result<Vec<(u32, Vec<u8>)>, StoreError> {
        let mut out = Vec::new();
        for chunk in heights.chunks(self.max_params) {
            let sql = format!(
                "SELECT height, block FROM full_blocks \
                 WHERE in_main_chain=1 AND height IN ({})",
                placeholders(chunk.len())
            );
            let mut query = sqlx::query(&sql);
            for height in chunk {
                query = query.bind(i64::from(*height));
            }
            for row in query.fetch_all(&mut *conn).await? {
                let height = row.get::<i64, _>(0) as u32;
                out.push((height, compression::decompress(&row.get::<Vec<u8>, _>(1))?));
            }
        }
        Ok(out)
    }

    async fn record_pair(
        &self,
        conn: &mut SqliteConnection,
        hash: &BlockHash,
    ) -> Result<Option<RecordPair>, StoreError> {
        let row = sqlx::query("SELECT block_record, block FROM full_blocks WHERE header_hash=?")
            .bind(&hash.0[..])
            .fetch_optional(&mut *conn)
            .await?;
        match row {
            Some(row) => Ok(Some(RecordPair {
                record_bytes: row.get::<Vec<u8>, _>(0),
                block_bytes: compression::decompress(&row.get::<Vec<u8>, _>(1))?,
            })),
            None => Ok(None),
        }
    }

    async fn record_pairs_by_hash(
        &self,
        conn: &mut SqliteConnection,
        hashes: &[BlockHash],
    ) -> Result<Vec<(BlockHash, RecordPair)>, StoreError> {
        let mut out = Vec::new();
        for chunk in hashes.chunks(self.max_params) {
            let sql = format!(
                "SELECT header_hash, block_record, block FROM full_blocks \
                 WHERE header_hash IN ({})",
                placeholders(chunk.len())
            );
            let mut query = sqlx::query(&sql);
            for hash in chunk {
                query = query.bind(&hash.0[..]);
            }
            for row in query.fetch_all(&mut *conn).await? {
                let hash = BlockHash::from_slice(&row.get::<Vec<u8>, _>(0))?;
                out.push((
                    hash,
                    RecordPair {
                        record_bytes: row.get::<Vec<u8>, _>(1),
                        block_bytes: compression::decompress(&row.get::<Vec<u8>, _>(2))?,
                    },
                ));
            }
        }
        Ok(out)
    }

    async fn record_pairs_in_range(
        &self,
        conn: &mut SqliteConnection,
        start: u32,
        stop: u32,
    ) -> Result<Vec<(BlockHash, RecordPair)>, StoreError> {
        let rows = sqlx::query(
            "SELECT header_hash, block_record, block FROM full_blocks \
             WHERE height >= ? AND height <= ?",
        )
        .bind(i64::from(start))
        .bind(i64::from(stop))
        .fetch_all(&mut *conn)
        .await?;
        let mut out = Vec::with_capacity(rows.len());
        for row in rows {
            let hash = BlockHash::from_slice(&row.get::<Vec<u8>, _>(0))?;
            out.push((
                hash,
                RecordPair {
                    record_bytes: row.get::<Vec<u8>, _>(1),
                    block_bytes: compression::decompress(&row.get::<Vec<u8>, _>(2))?,
                },
            ));
        }
        Ok(out)
    }

    async fn main_chain_block_bytes_in_range(
        &self,
        conn: &mut SqliteConnection,
        start: u32,
        stop: u32,
    ) -> Result<Vec<Vec<u8>>, StoreError> {
        let rows = sqlx::query(
            "SELECT block FROM full_blocks \
             WHERE height >= ? AND height <= ? AND in_main_chain=1 ORDER BY height",
        )
        .bind(i64::from(start))
        .bind(i64::from(stop))
        .fetch_all(&mut *conn)
        .await?;
        let mut out = Vec::with_capacity(rows.len());
        for row in rows {
            out.push(compression::decompress(&row.get::<Vec<u8>, _>(0))?);
        }
        Ok(out)
    }

    async fn is_fully_compactified(
        &self,
        conn: &mut SqliteConnection,
        hash: &BlockHash,
    ) -> Result<Option<bool>, StoreError> {
        let row = sqlx::query("SELECT is_fully_compactified FROM full_blocks WHERE header_hash=?")
            .bind(&hash.0[..])
            .fetch_optional(&mut *conn)
            .await?;
        Ok(row.map(|row| row.get::<i64, _>(0) != 0))
    }

    async fn count_compactified(
        &self,
        conn: &mut SqliteConnection,
        compactified: bool,
    ) -> Result<u64, StoreError> {
        // the partial index only covers main-chain rows
        let count: i64 = sqlx::query_scalar(
            "SELECT count(*) FROM full_blocks WHERE is_fully_compactified=? AND in_main_chain=1",
        )
        .bind(i64::from(compactified))
        .fetch_one(&mut *conn)
        .await?;
        Ok(count as u64)
    }

    async fn random_not_compactified_heights(
        &self,
        conn: &mut SqliteConnection,
        limit: u32,
    ) -> Result<Vec<u32>, StoreError> {
        let rows = sqlx::query(
            "SELECT height FROM full_blocks \
             WHERE in_main_chain=1 AND is_fully_compactified=0 ORDER BY RANDOM() LIMIT ?",
        )
        .bind(i64::from(limit))
        .fetch_all(&mut *conn)
        .await?;
        Ok(rows
            .into_iter()
            .map(|row| row.get::<i64, _>(0) as u32)
            .collect())
    }

    async fn upsert_segments(
        &self,
        conn: &mut SqliteConnection,
        hash: &BlockHash,
        bytes: &[u8],
    ) -> Result<(), StoreError> {
        sqlx::query("INSERT OR REPLACE INTO sub_epoch_segments_v3 VALUES(?, ?)")
            .bind(&hash.0[..])
            .bind(bytes)
            .execute(&mut *conn)
            .await?;
        Ok(())
    }

    async fn segments(
        &self,
        conn: &mut SqliteConnection,
        hash: &BlockHash,
    ) -> Result<Option<Vec<u8>>, StoreError> {
        let row = sqlx::query(
            "SELECT challenge_segments FROM sub_epoch_segments_v3 WHERE ses_block_hash=?",
        )
        .bind(&hash.0[..])
        .fetch_optional(&mut *conn)
        .await?;
        Ok(row.map(|row| row.get::<Vec<u8>, _>(0)))
    }
}

/// v1: split `full_blocks`/`block_records` tables with hex keys, raw
/// payloads, and the peak as an `is_peak` flag on the record row.
pub struct LegacySchema {
    max_params: usize,
}

impl LegacySchema {
    pub fn new(max_params: usize) -> Self {
        Self { max_params }
    }
}

#[async_trait]
impl SchemaBackend for LegacySchema {
    async fn create_tables(&self, conn: &mut SqliteConnection) -> Result<(), StoreError> {
        info!("creating v1 block store tables and indexes");
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS full_blocks(header_hash text PRIMARY KEY, height bigint, \
             is_block tinyint, is_fully_compactified tinyint, block blob)",
        )
        .execute(&mut *conn)
        .await?;
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS block_records(header_hash text PRIMARY KEY, \
             prev_hash text, height bigint, block blob, sub_epoch_summary blob, \
             is_peak tinyint, is_block tinyint)",
        )
        .execute(&mut *conn)
        .await?;
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS sub_epoch_segments_v3(ses_block_hash text PRIMARY KEY, \
             challenge_segments blob)",
        )
        .execute(&mut *conn)
        .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS full_block_height ON full_blocks(height)")
            .execute(&mut *conn)
            .await?;
        sqlx::query(
            "CREATE INDEX IF NOT EXISTS is_fully_compactified ON \
             full_blocks(is_fully_compactified)",
        )
        .execute(&mut *conn)
        .await?;
        sqlx::query("CREATE INDEX IF NOT EXISTS height ON block_records(height)")
            .execute(&mut *conn)
            .await?;
        sqlx::query("CREATE INDEX IF NOT EXISTS peak ON block_records(is_peak)")
            .execute(&mut *conn)
            .await?;
        Ok(())
    }

    async fn insert_block(
        &self,
        conn: &mut SqliteConnection,
        row: &NewBlockRow<'_>,
    ) -> Result<(), StoreError> {
        // both tables or neither
        let mut tx = conn.begin().await?;
        sqlx::query("INSERT OR IGNORE INTO full_blocks VALUES(?, ?, ?, ?, ?)")
            .bind(row.header_hash.to_hex())
            .bind(i64::from(row.height))
            .bind(i64::from(row.is_transaction_block))
            .bind(i64::from(row.fully_compactified))
            .bind(row.block_bytes)
            .execute(&mut *tx)
            .await?;
        sqlx::query("INSERT OR IGNORE INTO block_records VALUES(?, ?, ?, ?, ?, ?, ?)")
            .bind(row.header_hash.to_hex())
            .bind(row.prev_hash.to_hex())
            .bind(i64::from(row.height))
            .bind(row.record_bytes)
            .bind(row.sub_epoch_summary.as_deref())
            .bind(0i64)
            .bind(i64::from(row.is_transaction_block))
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(())
    }

    async fn update_proof(
        &self,
        conn: &mut SqliteConnection,
        hash: &BlockHash,
        block_bytes: &[u8],
        fully_compactified: bool,
    ) -> Result<(), StoreError> {
        sqlx::query("UPDATE full_blocks SET block=?, is_fully_compactified=? WHERE header_hash=?")
            .bind(block_bytes)
            .bind(i64::from(fully_compactified))
            .bind(hash.to_hex())
            .execute(&mut *conn)
            .await?;
        Ok(())
    }

    async fn set_in_chain(
        &self,
        _conn: &mut SqliteConnection,
        _hashes: &[BlockHash],
    ) -> Result<(), StoreError> {
        // v1 has no main-chain flag
        Ok(())
    }

    async fn rollback(&self, _conn: &mut SqliteConnection, _height: u32) -> Result<(), StoreError> {
        // v1 consumers manage peak/height consistency themselves
        Ok(())
    }

    async fn set_peak(
        &self,
        conn: &mut SqliteConnection,
        hash: &BlockHash,
    ) -> Result<(), StoreError> {
        let mut tx = conn.begin().await?;
        sqlx::query("UPDATE block_records SET is_peak=0 WHERE is_peak=1")
            .execute(&mut *tx)
            .await?;
        sqlx::query("UPDATE block_records SET is_peak=1 WHERE header_hash=?")
            .bind(hash.to_hex())
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(())
    }

    async fn peak(
        &self,
        conn: &mut SqliteConnection,
    ) -> Result<Option<(BlockHash, u32)>, StoreError> {
        let row = sqlx::query("SELECT header_hash, height FROM block_records WHERE is_peak=1")
            .fetch_optional(&mut *conn)
            .await?;
        match row {
            Some(row) => Ok(Some((
                BlockHash::from_hex(&row.get::<String, _>(0))?,
                row.get::<i64, _>(1) as u32,
            ))),
            None => Ok(None),
        }
    }

    async fn block_bytes(
        &self,
        conn: &mut SqliteConnection,
        hash: &BlockHash,
    ) -> Result<Option<Vec<u8>>, StoreError> {
        let row = sqlx::query("SELECT block FROM full_blocks WHERE header_hash=?")
            .bind(hash.to_hex())
            .fetch_optional(&mut *conn)
            .await?;
        Ok(row.map(|row| row.get::<Vec<u8>, _>(0)))
    }

    async fn block_bytes_at_heights(
        &self,
        conn: &mut SqliteConnection,
        heights: &[u32],
    ) -> Result<Vec<Vec<u8>>, StoreError> {
        let mut out = Vec::new();
        for chunk in heights.chunks(self.max_params) {
            let sql = format!(
                "SELECT block FROM full_blocks WHERE height IN ({})",
                placeholders(chunk.len())
            );
            let mut query = sqlx::query(&sql);
            for height in chunk {
                query = query.bind(i64::from(*height));
            }
            for row in query.fetch_all(&mut *conn).await? {
                out.push(row.get::<Vec<u8>, _>(0));
            }
        }
        Ok(out)
    }

    async fn block_bytes_by_hash(
        &self,
        conn: &mut SqliteConnection,
        hashes: &[BlockHash],
    ) -> Result<HashMap<BlockHash, Vec<u8>>, StoreError> {
        let mut out = HashMap::new();
        for chunk in hashes.chunks(self.max_params) {
            let sql = format!(
                "SELECT header_hash, block FROM full_blocks WHERE header_hash IN ({})",
                placeholders(chunk.len())
            );
            let mut query = sqlx::query(&sql);
            for hash in chunk {
                query = query.bind(hash.to_hex());
            }
            for row in query.fetch_all(&mut *conn).await? {
                let hash = BlockHash::from_hex(&row.get::<String, _>(0))?;
                out.insert(hash, row.get::<Vec<u8>, _>(1));
            }
        }
        Ok(out)
    }

    async fn main_chain_blocks_at_heights(
        &self,
        _conn: &mut SqliteConnection,
        _heights: &[u32],
    ) -> Result<Vec<(u32, Vec<u8>)>, StoreError> {
        Err(StoreError::UnsupportedSchema("get_generators_at"))
    }

    async fn record_pair(
        &self,
        conn: &mut SqliteConnection,
        hash: &BlockHash,
    ) -> Result<Option<RecordPair>, StoreError> {
        let row = sqlx::query(
            "SELECT block_records.block, full_blocks.block \
             FROM block_records JOIN full_blocks \
             ON block_records.header_hash = full_blocks.header_hash \
             WHERE block_records.header_hash = ?",
        )
        .bind(hash.to_hex())
        .fetch_optional(&mut *conn)
        .await?;
        Ok(row.map(|row| RecordPair {
            record_bytes: row.get::<Vec<u8>, _>(0),
            block_bytes: row.get::<Vec<u8>, _>(1),
        }))
    }

    async fn record_pairs_by_hash(
        &self,
        conn: &mut SqliteConnection,
        hashes: &[BlockHash],
    ) -> Result<Vec<(BlockHash, RecordPair)>, StoreError> {
        let mut out = Vec::new();
        for chunk in hashes.chunks(self.max_params) {
            let sql = format!(
                "SELECT block_records.header_hash, block_records.block, full_blocks.block \
                 FROM block_records JOIN full_blocks \
                 ON block_records.header_hash = full_blocks.header_hash \
                 WHERE block_records.header_hash IN ({})",
                placeholders(chunk.len())
            );
            let mut query = sqlx::query(&sql);
            for hash in chunk {
                query = query.bind(hash.to_hex());
            }
            for row in query.fetch_all(&mut *conn).await? {
                let hash = BlockHash::from_hex(&row.get::<String, _>(0))?;
                out.push((
                    hash,
                    RecordPair {
                        record_bytes: row.get::<Vec<u8>, _>(1),
                        block_bytes: row.get::<Vec<u8>, _>(2),
                    },
                ));
            }
        }
        Ok(out)
    }

    async fn record_pairs_in_range(
        &self,
        conn: &mut SqliteConnection,
        start: u32,
        stop: u32,
    ) -> Result<Vec<(BlockHash, RecordPair)>, StoreError> {
        let rows = sqlx::query(
            "SELECT block_records.header_hash, block_records.block, full_blocks.block \
             FROM block_records JOIN full_blocks \
             ON block_records.header_hash = full_blocks.header_hash \
             WHERE block_records.height >= ? AND block_records.height <= ? \
             AND full_blocks.height >= ? AND full_blocks.height <= ?",
        )
        .bind(i64::from(start))
        .bind(i64::from(stop))
        .bind(i64::from(start))
        .bind(i64::from(stop))
        .fetch_all(&mut *conn)
        .await?;
        let mut out = Vec::with_capacity(rows.len());
        for row in rows {
            let hash = BlockHash::from_hex(&row.get::<String, _>(0))?;
            out.push((
                hash,
                RecordPair {
                    record_bytes: row.get::<Vec<u8>, _>(1),
                    block_bytes: row.get::<Vec<u8>, _>(2),
                },
            ));
        }
        Ok(out)
    }

    async fn main_chain_block_bytes_in_range(
        &self,
        _conn: &mut SqliteConnection,
        _start: u32,
        _stop: u32,
    ) -> Result<Vec<Vec<u8>>, StoreError> {
        Err(StoreError::UnsupportedSchema("get_block_bytes_in_range"))
    }

    async fn is_fully_compactified(
        &self,
        conn: &mut SqliteConnection,
        hash: &BlockHash,
    ) -> Result<Option<bool>, StoreError> {
        let row = sqlx::query("SELECT is_fully_compactified FROM full_blocks WHERE header_hash=?")
            .bind(hash.to_hex())
            .fetch_optional(&mut *conn)
            .await?;
        Ok(row.map(|row| row.get::<i64, _>(0) != 0))
    }

    async fn count_compactified(
        &self,
        conn: &mut SqliteConnection,
        compactified: bool,
    ) -> Result<u64, StoreError> {
        let count: i64 =
            sqlx::query_scalar("SELECT count(*) FROM full_blocks WHERE is_fully_compactified=?")
                .bind(i64::from(compactified))
                .fetch_one(&mut *conn)
                .await?;
        Ok(count as u64)
    }

    async fn random_not_compactified_heights(
        &self,
        conn: &mut SqliteConnection,
        limit: u32,
    ) -> Result<Vec<u32>, StoreError> {
        // Orphan forks share heights with chain blocks and there is no
        // main-chain flag, so a height counts as compactified only when every
        // block at that height is. A compact orphan can therefore hide an
        // uncompacted chain block; the occasional stale block is harmless.
        let rows = sqlx::query(
            "SELECT height FROM full_blocks GROUP BY height \
             HAVING sum(is_fully_compactified)=0 ORDER BY RANDOM() LIMIT ?",
        )
        .bind(i64::from(limit))
        .fetch_all(&mut *conn)
        .await?;
        Ok(rows
            .into_iter()
            .map(|row| row.get::<i64, _>(0) as u32)
            .collect())
    }

    async fn upsert_segments(
        &self,
        conn: &mut SqliteConnection,
        hash: &BlockHash,
        bytes: &[u8],
    ) -> Result<(), StoreError> {
        sqlx::query("INSERT OR REPLACE INTO sub_epoch_segments_v3 VALUES(?, ?)")
            .bind(hash.to_hex())
            .bind(bytes)
            .execute(&mut *conn)
            .await?;
        Ok(())
    }

    async fn segments(
        &self,
        conn: &mut SqliteConnection,
        hash: &BlockHash,
    ) -> Result<Option<Vec<u8>>, StoreError> {
        let row = sqlx::query(
            "SELECT challenge_segments FROM sub_epoch_segments_v3 WHERE ses_block_hash=?",
        )
        .bind(hash.to_hex())
        .fetch_optional(&mut *conn)
        .await?;
        Ok(row.map(|row| row.get::<Vec<u8>, _>(0)))
    }
}
