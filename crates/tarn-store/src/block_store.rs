//! The block persistence engine.
//!
//! Orchestrates schema initialization, compressed writes, record derivation,
//! peak/main-chain transitions, rollback, and compaction queries. Point
//! lookups consult the record cache first and fall back to the durable store;
//! the durable store is always the source of truth.

use std::collections::HashMap;
use std::num::NonZeroUsize;
use std::sync::Arc;

use tracing::{error, info};

use tarn_core::block_record::{BlockRecord, BlockRecordDb};
use tarn_core::block_utils::{
    GeneratorBlockInfo, PlotFilterInfo, block_info_from_block, generator_from_block,
    plot_filter_info_from_block,
};
use tarn_core::segments::{SubEpochChallengeSegment, SubEpochSegments};
use tarn_core::types::{BlockHash, FullBlock, SerializedProgram};

use crate::cache::SharedLru;
use crate::db::{DbPool, SchemaVersion};
use crate::error::StoreError;
use crate::schema::{LegacySchema, ModernSchema, NewBlockRow, SchemaBackend};

const BLOCK_CACHE_CAPACITY: usize = 1000;
const SEGMENT_CACHE_CAPACITY: usize = 50;

/// Durable store for full blocks and their derived records.
///
/// One instance is constructed at node startup and shared behind an `Arc`;
/// it owns its caches and a handle to the externally owned connection pool.
pub struct BlockStore {
    db: Arc<DbPool>,
    backend: Box<dyn SchemaBackend>,
    block_cache: SharedLru<BlockHash, FullBlock>,
    segment_cache: SharedLru<BlockHash, Vec<SubEpochChallengeSegment>>,
}

impl BlockStore {
    /// Open the store over `db`, creating tables and indexes if missing.
    ///
    /// The backend is fixed here from the pool's schema version and never
    /// changes for the life of the store.
    pub async fn open(db: Arc<DbPool>) -> Result<Self, StoreError> {
        let backend: Box<dyn SchemaBackend> = match db.schema_version() {
            SchemaVersion::V2 => Box::new(ModernSchema::new(db.host_parameter_limit())),
            SchemaVersion::V1 => Box::new(LegacySchema::new(db.host_parameter_limit())),
        };
        let store = Self {
            db,
            backend,
            block_cache: SharedLru::new(NonZeroUsize::new(BLOCK_CACHE_CAPACITY).unwrap()),
            segment_cache: SharedLru::new(NonZeroUsize::new(SEGMENT_CACHE_CAPACITY).unwrap()),
        };
        info!("initializing block store");
        let mut conn = store.db.writer().await?;
        store.backend.create_tables(&mut conn).await?;
        Ok(store)
    }

    /// Persist a newly accepted block and its derived record.
    ///
    /// Inserting a hash that already exists is a silent no-op (block
    /// propagation can race). The cache is updated unconditionally: coherence
    /// only needs freshest-version-wins. The block is not marked as part of
    /// the main chain; see [`BlockStore::set_in_chain`].
    pub async fn add_full_block(
        &self,
        header_hash: BlockHash,
        block: &FullBlock,
        record: &BlockRecord,
    ) -> Result<(), StoreError> {
        self.block_cache.put(header_hash, block.clone());

        let record_bytes = BlockRecordDb::from_record(record).to_bytes()?;
        let sub_epoch_summary = record
            .sub_epoch_summary_included
            .as_ref()
            .map(|ses| ses.to_bytes())
            .transpose()?;
        let block_bytes = block.to_bytes()?;
        let row = NewBlockRow {
            header_hash,
            prev_hash: block.prev_header_hash,
            height: block.height,
            sub_epoch_summary,
            fully_compactified: block.is_fully_compactified(),
            is_transaction_block: block.is_transaction_block(),
            block_bytes: &block_bytes,
            record_bytes: &record_bytes,
        };

        let mut conn = self.db.writer().await?;
        self.backend.insert_block(&mut conn, &row).await
    }

    /// Replace the stored payload of an existing block with a compacted
    /// version and recompute its compaction flag.
    ///
    /// The block must hash to `header_hash`; a mismatch is a caller bug, not
    /// a recoverable condition.
    pub async fn replace_proof(
        &self,
        header_hash: BlockHash,
        block: &FullBlock,
    ) -> Result<(), StoreError> {
        let computed = block.header_hash();
        if computed != header_hash {
            return Err(StoreError::HashMismatch {
                expected: header_hash,
                computed,
            });
        }

        self.block_cache.put(header_hash, block.clone());

        let block_bytes = block.to_bytes()?;
        let mut conn = self.db.writer().await?;
        self.backend
            .update_proof(
                &mut conn,
                &header_hash,
                &block_bytes,
                block.is_fully_compactified(),
            )
            .await
    }

    /// Mark a batch of already-stored blocks as main-chain members.
    ///
    /// Fails with [`StoreError::CorruptStore`] if any hash has no row.
    /// No-op under the v1 schema.
    pub async fn set_in_chain(&self, header_hashes: &[BlockHash]) -> Result<(), StoreError> {
        let mut conn = self.db.writer().await?;
        self.backend.set_in_chain(&mut conn, header_hashes).await
    }

    /// Revoke main-chain membership above `height`. Blocks are kept for
    /// potential re-adoption. No-op under the v1 schema.
    pub async fn rollback(&self, height: u32) -> Result<(), StoreError> {
        let mut conn = self.db.writer().await?;
        self.backend.rollback(&mut conn, height).await
    }

    /// Drop a block from the cache during rollback. Best effort: the block
    /// may never have been cached.
    pub fn rollback_cache_block(&self, header_hash: &BlockHash) {
        self.block_cache.remove(header_hash);
    }

    /// Point the peak at `header_hash`.
    ///
    /// Acquires the writer connection for itself; the update is durable once
    /// this returns and cannot be grouped into a caller's transaction.
    pub async fn set_peak(&self, header_hash: BlockHash) -> Result<(), StoreError> {
        let mut conn = self.db.writer().await?;
        self.backend.set_peak(&mut conn, &header_hash).await
    }

    /// Current peak hash and height, if a peak has been set and its row
    /// exists. A dangling pointer reads as no peak.
    pub async fn get_peak(&self) -> Result<Option<(BlockHash, u32)>, StoreError> {
        let mut conn = self.db.reader().await?;
        self.backend.peak(&mut conn).await
    }

    /// Fetch a block, cache first. A durable hit populates the cache.
    pub async fn get_full_block(
        &self,
        header_hash: &BlockHash,
    ) -> Result<Option<FullBlock>, StoreError> {
        if let Some(cached) = self.block_cache.get(header_hash) {
            return Ok(Some(cached));
        }
        let mut conn = self.db.reader().await?;
        let Some(bytes) = self.backend.block_bytes(&mut conn, header_hash).await? else {
            return Ok(None);
        };
        let block = FullBlock::from_bytes(&bytes)?;
        self.block_cache.put(*header_hash, block.clone());
        Ok(Some(block))
    }

    /// Fetch a block's canonical encoding, cache first. A durable hit does
    /// not populate the cache.
    pub async fn get_full_block_bytes(
        &self,
        header_hash: &BlockHash,
    ) -> Result<Option<Vec<u8>>, StoreError> {
        if let Some(cached) = self.block_cache.get(header_hash) {
            return Ok(Some(cached.to_bytes()?));
        }
        let mut conn = self.db.reader().await?;
        self.backend.block_bytes(&mut conn, header_hash).await
    }

    /// Fetch every stored block (any fork) at the given heights. Order
    /// relative to `heights` is not guaranteed.
    pub async fn get_full_blocks_at(&self, heights: &[u32]) -> Result<Vec<FullBlock>, StoreError> {
        if heights.is_empty() {
            return Ok(Vec::new());
        }
        let mut conn = self.db.reader().await?;
        let rows = self.backend.block_bytes_at_heights(&mut conn, heights).await?;
        rows.iter()
            .map(|bytes| Ok(FullBlock::from_bytes(bytes)?))
            .collect()
    }

    /// Generator-related fields of a block, extracted by the cheap parser
    /// when possible.
    pub async fn get_block_info(
        &self,
        header_hash: &BlockHash,
    ) -> Result<Option<GeneratorBlockInfo>, StoreError> {
        if let Some(cached) = self.block_cache.get(header_hash) {
            return Ok(Some(GeneratorBlockInfo::from_block(&cached)));
        }
        let mut conn = self.db.reader().await?;
        let Some(bytes) = self.backend.block_bytes(&mut conn, header_hash).await? else {
            return Ok(None);
        };
        match block_info_from_block(&bytes) {
            Ok(info) => Ok(Some(info)),
            Err(e) => {
                // A cheap-parser bug must cost performance, never data.
                error!("cheap parser failed for block {header_hash}: {e}");
                let block = FullBlock::from_bytes(&bytes)?;
                Ok(Some(GeneratorBlockInfo::from_block(&block)))
            }
        }
    }

    /// Transaction generator of a block, if the block exists and has one.
    pub async fn get_generator(
        &self,
        header_hash: &BlockHash,
    ) -> Result<Option<SerializedProgram>, StoreError> {
        if let Some(cached) = self.block_cache.get(header_hash) {
            return Ok(cached.transactions_generator);
        }
        let mut conn = self.db.reader().await?;
        let Some(bytes) = self.backend.block_bytes(&mut conn, header_hash).await? else {
            return Ok(None);
        };
        match generator_from_block(&bytes) {
            Ok(generator) => Ok(generator),
            Err(e) => {
                error!("cheap parser failed for block {header_hash}: {e}");
                Ok(FullBlock::from_bytes(&bytes)?.transactions_generator)
            }
        }
    }

    /// Generators of the main-chain blocks at the given heights, in input
    /// order. Every requested height must have a main-chain transaction
    /// block with a generator. v2 only.
    pub async fn get_generators_at(
        &self,
        heights: &[u32],
    ) -> Result<Vec<SerializedProgram>, StoreError> {
        if heights.is_empty() {
            return Ok(Vec::new());
        }
        let mut conn = self.db.reader().await?;
        let rows = self
            .backend
            .main_chain_blocks_at_heights(&mut conn, heights)
            .await?;

        let mut generators: HashMap<u32, SerializedProgram> = HashMap::new();
        for (height, bytes) in rows {
            let generator = match generator_from_block(&bytes) {
                Ok(generator) => generator,
                Err(e) => {
                    error!("cheap parser failed for block at height {height}: {e}");
                    FullBlock::from_bytes(&bytes)?.transactions_generator
                }
            };
            let generator = generator.ok_or(StoreError::MissingGenerator(height))?;
            generators.insert(height, generator);
        }

        // non-destructive lookups: the input may repeat a height
        heights
            .iter()
            .map(|height| {
                generators.get(height).cloned().ok_or_else(|| {
                    StoreError::CorruptStore(format!("no main chain block at height {height}"))
                })
            })
            .collect()
    }

    /// Fetch the consensus record of a block, re-deriving the plot-filter
    /// hashes from the stored bytes.
    pub async fn get_block_record(
        &self,
        header_hash: &BlockHash,
    ) -> Result<Option<BlockRecord>, StoreError> {
        let mut conn = self.db.reader().await?;
        let Some(pair) = self.backend.record_pair(&mut conn, header_hash).await? else {
            return Ok(None);
        };
        let record_db = BlockRecordDb::from_bytes(&pair.record_bytes)?;
        let plot_filter = self.plot_filter_for(header_hash, &pair.block_bytes)?;
        Ok(Some(record_db.into_record(plot_filter)))
    }

    /// Fetch consensus records for all `header_hashes`, in input order.
    /// Fails if any requested block is absent.
    pub async fn get_block_records_by_hash(
        &self,
        header_hashes: &[BlockHash],
    ) -> Result<Vec<BlockRecord>, StoreError> {
        if header_hashes.is_empty() {
            return Ok(Vec::new());
        }
        let mut conn = self.db.reader().await?;
        let pairs = self
            .backend
            .record_pairs_by_hash(&mut conn, header_hashes)
            .await?;

        let mut all_records: HashMap<BlockHash, BlockRecord> = HashMap::new();
        for (hash, pair) in pairs {
            let record_db = BlockRecordDb::from_bytes(&pair.record_bytes)?;
            let plot_filter = self.plot_filter_for(&hash, &pair.block_bytes)?;
            all_records.insert(hash, record_db.into_record(plot_filter));
        }

        // non-destructive lookups: the input may repeat a hash
        header_hashes
            .iter()
            .map(|hash| {
                all_records
                    .get(hash)
                    .cloned()
                    .ok_or(StoreError::BlockNotFound(*hash))
            })
            .collect()
    }

    /// Fetch block encodings for all `header_hashes`, in input order. Fails
    /// if any requested block is absent.
    pub async fn get_block_bytes_by_hash(
        &self,
        header_hashes: &[BlockHash],
    ) -> Result<Vec<Vec<u8>>, StoreError> {
        if header_hashes.is_empty() {
            return Ok(Vec::new());
        }
        let mut conn = self.db.reader().await?;
        let all_bytes = self
            .backend
            .block_bytes_by_hash(&mut conn, header_hashes)
            .await?;

        header_hashes
            .iter()
            .map(|hash| {
                all_bytes
                    .get(hash)
                    .cloned()
                    .ok_or(StoreError::BlockNotFound(*hash))
            })
            .collect()
    }

    /// Fetch blocks for all `header_hashes`, in input order, populating the
    /// cache for every block fetched. Fails if any requested block is absent.
    pub async fn get_blocks_by_hash(
        &self,
        header_hashes: &[BlockHash],
    ) -> Result<Vec<FullBlock>, StoreError> {
        if header_hashes.is_empty() {
            return Ok(Vec::new());
        }
        let mut conn = self.db.reader().await?;
        let all_bytes = self
            .backend
            .block_bytes_by_hash(&mut conn, header_hashes)
            .await?;

        let mut all_blocks: HashMap<BlockHash, FullBlock> = HashMap::new();
        for (hash, bytes) in all_bytes {
            let block = FullBlock::from_bytes(&bytes)?;
            self.block_cache.put(hash, block.clone());
            all_blocks.insert(hash, block);
        }

        header_hashes
            .iter()
            .map(|hash| {
                all_blocks
                    .get(hash)
                    .cloned()
                    .ok_or(StoreError::BlockNotFound(*hash))
            })
            .collect()
    }

    /// Consensus records for every stored block (any fork) in the inclusive
    /// height range, keyed by hash.
    pub async fn get_block_records_in_range(
        &self,
        start: u32,
        stop: u32,
    ) -> Result<HashMap<BlockHash, BlockRecord>, StoreError> {
        let mut conn = self.db.reader().await?;
        let pairs = self
            .backend
            .record_pairs_in_range(&mut conn, start, stop)
            .await?;
        let mut out = HashMap::with_capacity(pairs.len());
        for (hash, pair) in pairs {
            let record_db = BlockRecordDb::from_bytes(&pair.record_bytes)?;
            let plot_filter = self.plot_filter_for(&hash, &pair.block_bytes)?;
            out.insert(hash, record_db.into_record(plot_filter));
        }
        Ok(out)
    }

    /// Consensus records for every block within `blocks_n` of the peak, plus
    /// the peak hash. Empty with no peak hash if no peak is set.
    pub async fn get_block_records_close_to_peak(
        &self,
        blocks_n: u32,
    ) -> Result<(HashMap<BlockHash, BlockRecord>, Option<BlockHash>), StoreError> {
        let Some((peak_hash, peak_height)) = self.get_peak().await? else {
            return Ok((HashMap::new(), None));
        };
        let start = peak_height.saturating_sub(blocks_n);
        let records = self.get_block_records_in_range(start, u32::MAX).await?;
        Ok((records, Some(peak_hash)))
    }

    /// Block encodings for the main chain over the inclusive height range,
    /// ascending by height. The range must be fully populated: a gap means
    /// the store's invariants are broken. v2 only.
    pub async fn get_block_bytes_in_range(
        &self,
        start: u32,
        stop: u32,
    ) -> Result<Vec<Vec<u8>>, StoreError> {
        let mut conn = self.db.reader().await?;
        let rows = self
            .backend
            .main_chain_block_bytes_in_range(&mut conn, start, stop)
            .await?;
        let expected = (i64::from(stop) - i64::from(start) + 1).max(0) as usize;
        if rows.len() != expected {
            return Err(StoreError::IncompleteRange {
                start,
                stop,
                expected,
                found: rows.len(),
            });
        }
        Ok(rows)
    }

    /// Compaction flag of a block, if stored. Runs on the writer scope so a
    /// compaction worker sees its own in-flight updates.
    pub async fn is_fully_compactified(
        &self,
        header_hash: &BlockHash,
    ) -> Result<Option<bool>, StoreError> {
        let mut conn = self.db.writer().await?;
        self.backend.is_fully_compactified(&mut conn, header_hash).await
    }

    /// Number of compactified blocks (main-chain only under v2).
    pub async fn count_compactified_blocks(&self) -> Result<u64, StoreError> {
        let mut conn = self.db.reader().await?;
        self.backend.count_compactified(&mut conn, true).await
    }

    /// Number of not-yet-compactified blocks (main-chain only under v2).
    pub async fn count_uncompactified_blocks(&self) -> Result<u64, StoreError> {
        let mut conn = self.db.reader().await?;
        self.backend.count_compactified(&mut conn, false).await
    }

    /// Up to `number` random heights whose blocks still need compaction.
    pub async fn get_random_not_compactified(&self, number: u32) -> Result<Vec<u32>, StoreError> {
        let mut conn = self.db.reader().await?;
        self.backend
            .random_not_compactified_heights(&mut conn, number)
            .await
    }

    /// Store (or replace) the challenge segments for a sub-epoch boundary.
    pub async fn persist_sub_epoch_challenge_segments(
        &self,
        ses_block_hash: BlockHash,
        segments: &[SubEpochChallengeSegment],
    ) -> Result<(), StoreError> {
        let bytes = SubEpochSegments {
            challenge_segments: segments.to_vec(),
        }
        .to_bytes()?;
        let mut conn = self.db.writer().await?;
        self.backend
            .upsert_segments(&mut conn, &ses_block_hash, &bytes)
            .await?;
        self.segment_cache.put(ses_block_hash, segments.to_vec());
        Ok(())
    }

    /// Fetch the challenge segments for a sub-epoch boundary, cache first.
    pub async fn get_sub_epoch_challenge_segments(
        &self,
        ses_block_hash: &BlockHash,
    ) -> Result<Option<Vec<SubEpochChallengeSegment>>, StoreError> {
        if let Some(cached) = self.segment_cache.get(ses_block_hash) {
            return Ok(Some(cached));
        }
        let mut conn = self.db.reader().await?;
        let Some(bytes) = self.backend.segments(&mut conn, ses_block_hash).await? else {
            return Ok(None);
        };
        let segments = SubEpochSegments::from_bytes(&bytes)?.challenge_segments;
        self.segment_cache.put(*ses_block_hash, segments.clone());
        Ok(Some(segments))
    }

    /// Derive the plot-filter hashes from stored block bytes, falling back
    /// to a full decode if the cheap parser fails.
    fn plot_filter_for(
        &self,
        header_hash: &BlockHash,
        block_bytes: &[u8],
    ) -> Result<PlotFilterInfo, StoreError> {
        match plot_filter_info_from_block(block_bytes) {
            Ok(info) => Ok(info),
            Err(e) => {
                error!("cheap parser failed for block {header_hash}: {e}");
                let block = FullBlock::from_bytes(block_bytes)?;
                Ok(PlotFilterInfo {
                    pos_ss_cc_challenge_hash: block.pos_ss_cc_challenge_hash,
                    cc_sp_hash: block.cc_sp_hash,
                })
            }
        }
    }
}
