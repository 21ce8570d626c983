//! Integration tests for the block store over both on-disk schemas.

use std::sync::Arc;

use tarn_core::block_record::BlockRecord;
use tarn_core::segments::{SubEpochChallengeSegment, SubSlotData};
use tarn_core::types::{
    BlockHash, ClassgroupElement, FullBlock, SerializedProgram, VdfProof,
};
use tarn_store::{BlockStore, DbPool, SchemaVersion, StoreError};

async fn open_db(dir: &tempfile::TempDir, version: SchemaVersion) -> Arc<DbPool> {
    Arc::new(
        DbPool::open(dir.path().join("blockchain.sqlite"), version)
            .await
            .unwrap(),
    )
}

fn make_block(height: u32, prev: BlockHash, seed: u8, generator: Option<Vec<u8>>) -> FullBlock {
    FullBlock {
        prev_header_hash: prev,
        height,
        pos_ss_cc_challenge_hash: BlockHash([seed.wrapping_add(1); 32]),
        cc_sp_hash: BlockHash([seed.wrapping_add(2); 32]),
        transactions_info_hash: generator.as_ref().map(|_| BlockHash([seed; 32])),
        transactions_generator: generator.map(SerializedProgram),
        transactions_generator_ref_list: vec![],
        foliage_data: vec![seed; 32],
        challenge_chain_ip_proof: VdfProof {
            witness_type: 0,
            witness: vec![seed; 100],
            normalized_to_identity: false,
        },
        reward_chain_ip_proof: VdfProof {
            witness_type: 0,
            witness: vec![seed.wrapping_add(3); 100],
            normalized_to_identity: false,
        },
    }
}

fn make_record(header_hash: BlockHash, block: &FullBlock) -> BlockRecord {
    BlockRecord {
        header_hash,
        prev_hash: block.prev_header_hash,
        height: block.height,
        weight: u128::from(block.height) * 10,
        total_iters: u128::from(block.height) * 1_000_000,
        signage_point_index: 2,
        challenge_vdf_output: ClassgroupElement(vec![1; 100]),
        infused_challenge_vdf_output: None,
        reward_infusion_new_challenge: BlockHash([20; 32]),
        challenge_block_info_hash: BlockHash([21; 32]),
        sub_slot_iters: 1 << 20,
        pool_puzzle_hash: BlockHash([22; 32]),
        farmer_puzzle_hash: BlockHash([23; 32]),
        required_iters: 777,
        deficit: 15,
        overflow: false,
        prev_transaction_block_height: block.height.saturating_sub(1),
        pos_ss_cc_challenge_hash: block.pos_ss_cc_challenge_hash,
        cc_sp_hash: block.cc_sp_hash,
        timestamp: Some(1_700_000_000 + u64::from(block.height)),
        prev_transaction_block_hash: None,
        fees: None,
        reward_claims_incorporated: None,
        finished_challenge_slot_hashes: None,
        finished_infused_challenge_slot_hashes: None,
        finished_reward_slot_hashes: None,
        sub_epoch_summary_included: None,
    }
}

/// Build a linked chain of `len` blocks starting at height 0.
fn make_chain(len: u32, seed: u8) -> Vec<(BlockHash, FullBlock, BlockRecord)> {
    let mut prev = BlockHash::ZERO;
    let mut out = Vec::new();
    for height in 0..len {
        let block = make_block(
            height,
            prev,
            seed.wrapping_add(height as u8),
            Some(vec![height as u8, seed]),
        );
        let hash = block.header_hash();
        let record = make_record(hash, &block);
        prev = hash;
        out.push((hash, block, record));
    }
    out
}

async fn add_chain(store: &BlockStore, chain: &[(BlockHash, FullBlock, BlockRecord)]) {
    for (hash, block, record) in chain {
        store.add_full_block(*hash, block, record).await.unwrap();
    }
}

fn compacted(block: &FullBlock) -> FullBlock {
    let mut compacted = block.clone();
    compacted.challenge_chain_ip_proof = VdfProof {
        witness_type: 0,
        witness: vec![],
        normalized_to_identity: true,
    };
    compacted.reward_chain_ip_proof = VdfProof {
        witness_type: 0,
        witness: vec![],
        normalized_to_identity: true,
    };
    compacted
}

fn sample_segments(n: u32) -> Vec<SubEpochChallengeSegment> {
    (0..n)
        .map(|i| SubEpochChallengeSegment {
            sub_epoch_n: i,
            sub_slots: vec![SubSlotData {
                proof_of_space: Some(vec![i as u8; 48]),
                cc_signage_point: None,
                cc_infusion_point: Some(VdfProof {
                    witness_type: 0,
                    witness: vec![i as u8; 33],
                    normalized_to_identity: false,
                }),
                total_iters: Some(u128::from(i) << 32),
            }],
            rc_slot_end_info: Some(ClassgroupElement(vec![i as u8; 100])),
        })
        .collect()
}

#[tokio::test]
async fn add_and_get_roundtrip_v2() {
    let dir = tempfile::tempdir().unwrap();
    let db = open_db(&dir, SchemaVersion::V2).await;
    let store = BlockStore::open(db.clone()).await.unwrap();

    let (hash, block, record) = make_chain(1, 1).remove(0);
    store.add_full_block(hash, &block, &record).await.unwrap();

    // cache hit
    assert_eq!(store.get_full_block(&hash).await.unwrap(), Some(block.clone()));
    assert_eq!(
        store.get_full_block_bytes(&hash).await.unwrap(),
        Some(block.to_bytes().unwrap())
    );

    // reopen: cold cache, durable read through decompression
    let store = BlockStore::open(db).await.unwrap();
    assert_eq!(store.get_full_block(&hash).await.unwrap(), Some(block.clone()));
    assert_eq!(
        store.get_full_block_bytes(&hash).await.unwrap(),
        Some(block.to_bytes().unwrap())
    );
    assert_eq!(
        store.get_full_block(&BlockHash([9; 32])).await.unwrap(),
        None
    );
}

#[tokio::test]
async fn duplicate_add_keeps_first_payload() {
    let dir = tempfile::tempdir().unwrap();
    let db = open_db(&dir, SchemaVersion::V2).await;
    let store = BlockStore::open(db.clone()).await.unwrap();

    let (hash, block, record) = make_chain(1, 1).remove(0);
    store.add_full_block(hash, &block, &record).await.unwrap();

    // a second insert under the same key must not replace the row
    let mut other = block.clone();
    other.foliage_data = vec![0xff; 32];
    store.add_full_block(hash, &other, &record).await.unwrap();

    let store = BlockStore::open(db).await.unwrap();
    assert_eq!(store.get_full_block(&hash).await.unwrap(), Some(block));
}

#[tokio::test]
async fn main_chain_range_completeness() {
    let dir = tempfile::tempdir().unwrap();
    let db = open_db(&dir, SchemaVersion::V2).await;
    let store = BlockStore::open(db).await.unwrap();

    let chain = make_chain(5, 1);
    add_chain(&store, &chain).await;
    let hashes: Vec<BlockHash> = chain.iter().map(|(h, _, _)| *h).collect();

    // skip an interior height: the range query must refuse the gap
    store
        .set_in_chain(&[hashes[0], hashes[1], hashes[3], hashes[4]])
        .await
        .unwrap();
    match store.get_block_bytes_in_range(0, 4).await {
        Err(StoreError::IncompleteRange { expected: 5, found: 4, .. }) => {}
        other => panic!("expected IncompleteRange, got {other:?}"),
    }

    store.set_in_chain(&[hashes[2]]).await.unwrap();
    let bytes = store.get_block_bytes_in_range(0, 4).await.unwrap();
    assert_eq!(bytes.len(), 5);
    for (i, (_, block, _)) in chain.iter().enumerate() {
        assert_eq!(bytes[i], block.to_bytes().unwrap());
    }
}

#[tokio::test]
async fn set_in_chain_unknown_hash_is_corruption() {
    let dir = tempfile::tempdir().unwrap();
    let db = open_db(&dir, SchemaVersion::V2).await;
    let store = BlockStore::open(db).await.unwrap();

    let chain = make_chain(2, 1);
    add_chain(&store, &chain).await;

    let err = store
        .set_in_chain(&[chain[0].0, BlockHash([0xee; 32])])
        .await
        .unwrap_err();
    assert!(matches!(err, StoreError::CorruptStore(_)), "{err:?}");
}

#[tokio::test]
async fn rollback_revokes_and_fork_restores() {
    let dir = tempfile::tempdir().unwrap();
    let db = open_db(&dir, SchemaVersion::V2).await;
    let store = BlockStore::open(db).await.unwrap();

    let chain = make_chain(6, 1);
    add_chain(&store, &chain).await;
    let hashes: Vec<BlockHash> = chain.iter().map(|(h, _, _)| *h).collect();
    store.set_in_chain(&hashes).await.unwrap();
    assert_eq!(store.get_block_bytes_in_range(0, 5).await.unwrap().len(), 6);

    store.rollback(2).await.unwrap();
    for hash in &hashes[3..] {
        store.rollback_cache_block(hash);
    }
    // heights 3..=5 lost canonical status; blocks are still stored
    assert!(store.get_block_bytes_in_range(0, 5).await.is_err());
    assert!(
        store
            .get_full_block(&hashes[5])
            .await
            .unwrap()
            .is_some()
    );
    // removing an uncached block is fine
    store.rollback_cache_block(&BlockHash([0xaa; 32]));

    // adopt a competing fork over the rolled-back heights
    let mut prev = hashes[2];
    let mut fork_hashes = Vec::new();
    for height in 3..6u32 {
        let block = make_block(height, prev, 0x40 + height as u8, Some(vec![height as u8]));
        let hash = block.header_hash();
        let record = make_record(hash, &block);
        store.add_full_block(hash, &block, &record).await.unwrap();
        prev = hash;
        fork_hashes.push(hash);
    }
    store.set_in_chain(&fork_hashes).await.unwrap();
    assert_eq!(store.get_block_bytes_in_range(0, 5).await.unwrap().len(), 6);
}

#[tokio::test]
async fn replace_proof_compacts_in_place() {
    let dir = tempfile::tempdir().unwrap();
    let db = open_db(&dir, SchemaVersion::V2).await;
    let store = BlockStore::open(db).await.unwrap();

    let (hash, block, record) = make_chain(1, 7).remove(0);
    store.add_full_block(hash, &block, &record).await.unwrap();
    store.set_in_chain(&[hash]).await.unwrap();

    assert_eq!(store.is_fully_compactified(&hash).await.unwrap(), Some(false));
    assert_eq!(store.count_compactified_blocks().await.unwrap(), 0);
    assert_eq!(store.count_uncompactified_blocks().await.unwrap(), 1);

    store.replace_proof(hash, &compacted(&block)).await.unwrap();

    assert_eq!(store.is_fully_compactified(&hash).await.unwrap(), Some(true));
    assert_eq!(store.count_compactified_blocks().await.unwrap(), 1);
    assert_eq!(store.count_uncompactified_blocks().await.unwrap(), 0);
    assert!(store.get_random_not_compactified(10).await.unwrap().is_empty());

    // identity fields are untouched
    let stored = store.get_block_record(&hash).await.unwrap().unwrap();
    assert_eq!(stored.height, block.height);
    assert_eq!(stored.prev_hash, block.prev_header_hash);

    assert_eq!(
        store.is_fully_compactified(&BlockHash([5; 32])).await.unwrap(),
        None
    );
}

#[tokio::test]
async fn replace_proof_rejects_wrong_hash() {
    let dir = tempfile::tempdir().unwrap();
    let db = open_db(&dir, SchemaVersion::V2).await;
    let store = BlockStore::open(db).await.unwrap();

    let chain = make_chain(2, 1);
    add_chain(&store, &chain).await;

    let err = store
        .replace_proof(chain[0].0, &compacted(&chain[1].1))
        .await
        .unwrap_err();
    assert!(matches!(err, StoreError::HashMismatch { .. }), "{err:?}");
}

#[tokio::test]
async fn bulk_reads_preserve_order_and_require_completeness() {
    let dir = tempfile::tempdir().unwrap();
    let db = open_db(&dir, SchemaVersion::V2).await;
    let store = BlockStore::open(db).await.unwrap();

    let chain = make_chain(3, 1);
    add_chain(&store, &chain).await;
    let (a, b, c) = (chain[0].0, chain[1].0, chain[2].0);

    let records = store.get_block_records_by_hash(&[c, a, b]).await.unwrap();
    assert_eq!(
        records.iter().map(|r| r.header_hash).collect::<Vec<_>>(),
        vec![c, a, b]
    );
    let records_rev = store.get_block_records_by_hash(&[a, b, c]).await.unwrap();
    assert_eq!(
        records_rev.iter().map(|r| r.height).collect::<Vec<_>>(),
        vec![0, 1, 2]
    );

    let blocks = store.get_blocks_by_hash(&[b, c]).await.unwrap();
    assert_eq!(blocks, vec![chain[1].1.clone(), chain[2].1.clone()]);

    let bytes = store.get_block_bytes_by_hash(&[c, a]).await.unwrap();
    assert_eq!(bytes[0], chain[2].1.to_bytes().unwrap());
    assert_eq!(bytes[1], chain[0].1.to_bytes().unwrap());

    let missing = BlockHash([0xcc; 32]);
    assert!(matches!(
        store.get_block_records_by_hash(&[a, missing]).await,
        Err(StoreError::BlockNotFound(h)) if h == missing
    ));
    assert!(store.get_block_bytes_by_hash(&[missing]).await.is_err());
    assert!(store.get_blocks_by_hash(&[missing]).await.is_err());
    assert!(store.get_block_records_by_hash(&[]).await.unwrap().is_empty());
}

#[tokio::test]
async fn bulk_reads_serve_repeated_inputs() {
    let dir = tempfile::tempdir().unwrap();
    let db = open_db(&dir, SchemaVersion::V2).await;
    let store = BlockStore::open(db).await.unwrap();

    let chain = make_chain(2, 1);
    add_chain(&store, &chain).await;
    let (a, b) = (chain[0].0, chain[1].0);

    // a hash repeated in the request yields its block once per occurrence
    let records = store.get_block_records_by_hash(&[a, a, b]).await.unwrap();
    assert_eq!(
        records.iter().map(|r| r.header_hash).collect::<Vec<_>>(),
        vec![a, a, b]
    );

    let bytes = store.get_block_bytes_by_hash(&[b, a, b]).await.unwrap();
    assert_eq!(bytes[0], chain[1].1.to_bytes().unwrap());
    assert_eq!(bytes[1], chain[0].1.to_bytes().unwrap());
    assert_eq!(bytes[2], bytes[0]);

    let blocks = store.get_blocks_by_hash(&[a, a]).await.unwrap();
    assert_eq!(blocks, vec![chain[0].1.clone(), chain[0].1.clone()]);

    store.set_in_chain(&[a, b]).await.unwrap();
    let generators = store.get_generators_at(&[1, 1, 0]).await.unwrap();
    assert_eq!(
        generators,
        vec![
            chain[1].1.transactions_generator.clone().unwrap(),
            chain[1].1.transactions_generator.clone().unwrap(),
            chain[0].1.transactions_generator.clone().unwrap(),
        ]
    );
}

#[tokio::test]
async fn range_and_height_queries() {
    let dir = tempfile::tempdir().unwrap();
    let db = open_db(&dir, SchemaVersion::V2).await;
    let store = BlockStore::open(db).await.unwrap();

    let chain = make_chain(5, 1);
    add_chain(&store, &chain).await;
    // an orphan sharing height 2
    let orphan = make_block(2, chain[1].0, 0x60, None);
    let orphan_hash = orphan.header_hash();
    store
        .add_full_block(orphan_hash, &orphan, &make_record(orphan_hash, &orphan))
        .await
        .unwrap();

    let records = store.get_block_records_in_range(1, 3).await.unwrap();
    assert_eq!(records.len(), 4); // heights 1,2,2,3
    assert!(records.contains_key(&orphan_hash));
    assert_eq!(records[&chain[3].0].height, 3);

    let blocks = store.get_full_blocks_at(&[2]).await.unwrap();
    assert_eq!(blocks.len(), 2);
    assert!(store.get_full_blocks_at(&[]).await.unwrap().is_empty());
}

#[tokio::test]
async fn peak_tracking_v2() {
    let dir = tempfile::tempdir().unwrap();
    let db = open_db(&dir, SchemaVersion::V2).await;
    let store = BlockStore::open(db).await.unwrap();

    assert_eq!(store.get_peak().await.unwrap(), None);
    let (records, peak) = store.get_block_records_close_to_peak(10).await.unwrap();
    assert!(records.is_empty());
    assert_eq!(peak, None);

    let chain = make_chain(4, 1);
    add_chain(&store, &chain).await;
    let tip = chain[3].0;
    store.set_peak(tip).await.unwrap();
    assert_eq!(store.get_peak().await.unwrap(), Some((tip, 3)));

    // a replaced peak wins
    store.set_peak(chain[2].0).await.unwrap();
    assert_eq!(store.get_peak().await.unwrap(), Some((chain[2].0, 2)));

    // a dangling pointer reads as no peak
    store.set_peak(BlockHash([0x77; 32])).await.unwrap();
    assert_eq!(store.get_peak().await.unwrap(), None);

    store.set_peak(tip).await.unwrap();
    let (records, peak) = store.get_block_records_close_to_peak(1).await.unwrap();
    assert_eq!(peak, Some(tip));
    assert_eq!(records.len(), 2); // heights 2 and 3
}

#[tokio::test]
async fn generators_at_main_chain() {
    let dir = tempfile::tempdir().unwrap();
    let db = open_db(&dir, SchemaVersion::V2).await;
    let store = BlockStore::open(db).await.unwrap();

    let mut prev = BlockHash::ZERO;
    let mut hashes = Vec::new();
    let mut blocks = Vec::new();
    for height in 0..4u32 {
        // height 3 has no generator
        let generator = (height < 3).then(|| vec![height as u8, 0xab]);
        let block = make_block(height, prev, height as u8, generator);
        let hash = block.header_hash();
        store
            .add_full_block(hash, &block, &make_record(hash, &block))
            .await
            .unwrap();
        prev = hash;
        hashes.push(hash);
        blocks.push(block);
    }
    store.set_in_chain(&hashes).await.unwrap();

    let generators = store.get_generators_at(&[2, 1]).await.unwrap();
    assert_eq!(
        generators,
        vec![
            blocks[2].transactions_generator.clone().unwrap(),
            blocks[1].transactions_generator.clone().unwrap(),
        ]
    );
    assert!(store.get_generators_at(&[]).await.unwrap().is_empty());

    assert!(matches!(
        store.get_generators_at(&[3]).await,
        Err(StoreError::MissingGenerator(3))
    ));
    assert!(matches!(
        store.get_generators_at(&[9]).await,
        Err(StoreError::CorruptStore(_))
    ));
}

#[tokio::test]
async fn block_info_and_generator_accessors() {
    let dir = tempfile::tempdir().unwrap();
    let db = open_db(&dir, SchemaVersion::V2).await;
    let store = BlockStore::open(db.clone()).await.unwrap();

    let (hash, block, record) = make_chain(1, 5).remove(0);
    store.add_full_block(hash, &block, &record).await.unwrap();

    // cache-hit path
    let info = store.get_block_info(&hash).await.unwrap().unwrap();
    assert_eq!(info.prev_header_hash, block.prev_header_hash);
    assert_eq!(info.transactions_generator, block.transactions_generator);

    // durable path through the cheap parser
    let store = BlockStore::open(db).await.unwrap();
    let info = store.get_block_info(&hash).await.unwrap().unwrap();
    assert_eq!(info.transactions_generator, block.transactions_generator);
    assert_eq!(
        store.get_generator(&hash).await.unwrap(),
        block.transactions_generator
    );
    assert_eq!(store.get_generator(&BlockHash([3; 32])).await.unwrap(), None);
    assert_eq!(store.get_block_info(&BlockHash([3; 32])).await.unwrap(), None);
}

#[tokio::test]
async fn sub_epoch_segments_roundtrip() {
    let dir = tempfile::tempdir().unwrap();
    let db = open_db(&dir, SchemaVersion::V2).await;
    let store = BlockStore::open(db.clone()).await.unwrap();

    let ses_hash = BlockHash([0x33; 32]);
    let segments = sample_segments(3);
    store
        .persist_sub_epoch_challenge_segments(ses_hash, &segments)
        .await
        .unwrap();

    // cache hit
    assert_eq!(
        store.get_sub_epoch_challenge_segments(&ses_hash).await.unwrap(),
        Some(segments.clone())
    );

    // durable read after cache eviction
    let store = BlockStore::open(db).await.unwrap();
    assert_eq!(
        store.get_sub_epoch_challenge_segments(&ses_hash).await.unwrap(),
        Some(segments.clone())
    );
    assert_eq!(
        store
            .get_sub_epoch_challenge_segments(&BlockHash([0x44; 32]))
            .await
            .unwrap(),
        None
    );

    // upsert replaces
    let replacement = sample_segments(1);
    store
        .persist_sub_epoch_challenge_segments(ses_hash, &replacement)
        .await
        .unwrap();
    assert_eq!(
        store.get_sub_epoch_challenge_segments(&ses_hash).await.unwrap(),
        Some(replacement)
    );
}

#[tokio::test]
async fn legacy_roundtrip_and_peak() {
    let dir = tempfile::tempdir().unwrap();
    let db = open_db(&dir, SchemaVersion::V1).await;
    let store = BlockStore::open(db.clone()).await.unwrap();

    let chain = make_chain(3, 1);
    add_chain(&store, &chain).await;
    let (hash, block) = (chain[2].0, chain[2].1.clone());

    let store = BlockStore::open(db).await.unwrap();
    assert_eq!(store.get_full_block(&hash).await.unwrap(), Some(block.clone()));
    assert_eq!(
        store.get_full_block_bytes(&hash).await.unwrap(),
        Some(block.to_bytes().unwrap())
    );

    let record = store.get_block_record(&hash).await.unwrap().unwrap();
    assert_eq!(record, chain[2].2);

    let records = store
        .get_block_records_by_hash(&[chain[1].0, chain[0].0])
        .await
        .unwrap();
    assert_eq!(
        records.iter().map(|r| r.height).collect::<Vec<_>>(),
        vec![1, 0]
    );

    assert_eq!(store.get_peak().await.unwrap(), None);
    store.set_peak(chain[1].0).await.unwrap();
    assert_eq!(store.get_peak().await.unwrap(), Some((chain[1].0, 1)));
    // the peak flag moves
    store.set_peak(chain[2].0).await.unwrap();
    assert_eq!(store.get_peak().await.unwrap(), Some((chain[2].0, 2)));

    let records = store.get_block_records_in_range(0, 1).await.unwrap();
    assert_eq!(records.len(), 2);
}

#[tokio::test]
async fn legacy_unsupported_and_noop_operations() {
    let dir = tempfile::tempdir().unwrap();
    let db = open_db(&dir, SchemaVersion::V1).await;
    let store = BlockStore::open(db).await.unwrap();

    let chain = make_chain(2, 1);
    add_chain(&store, &chain).await;

    // no main-chain flag under v1
    store.set_in_chain(&[chain[0].0, chain[1].0]).await.unwrap();
    store.rollback(0).await.unwrap();

    assert!(matches!(
        store.get_block_bytes_in_range(0, 1).await,
        Err(StoreError::UnsupportedSchema(_))
    ));
    assert!(matches!(
        store.get_generators_at(&[0]).await,
        Err(StoreError::UnsupportedSchema(_))
    ));
}

#[tokio::test]
async fn legacy_compaction_grouping() {
    let dir = tempfile::tempdir().unwrap();
    let db = open_db(&dir, SchemaVersion::V1).await;
    let store = BlockStore::open(db).await.unwrap();

    let chain = make_chain(3, 1);
    add_chain(&store, &chain).await;
    // an orphan at height 1, already compacted
    let orphan = compacted(&make_block(1, chain[0].0, 0x50, None));
    let orphan_hash = orphan.header_hash();
    store
        .add_full_block(orphan_hash, &orphan, &make_record(orphan_hash, &orphan))
        .await
        .unwrap();

    // counts are not main-chain filtered under v1
    assert_eq!(store.count_compactified_blocks().await.unwrap(), 1);
    assert_eq!(store.count_uncompactified_blocks().await.unwrap(), 3);

    // sampling groups by height: the compact orphan hides height 1
    let mut heights = store.get_random_not_compactified(10).await.unwrap();
    heights.sort_unstable();
    assert_eq!(heights, vec![0, 2]);

    store
        .replace_proof(chain[0].0, &compacted(&chain[0].1))
        .await
        .unwrap();
    let heights = store.get_random_not_compactified(10).await.unwrap();
    assert_eq!(heights, vec![2]);
}

#[tokio::test]
async fn random_not_compactified_v2() {
    let dir = tempfile::tempdir().unwrap();
    let db = open_db(&dir, SchemaVersion::V2).await;
    let store = BlockStore::open(db).await.unwrap();

    let chain = make_chain(4, 1);
    add_chain(&store, &chain).await;
    let hashes: Vec<BlockHash> = chain.iter().map(|(h, _, _)| *h).collect();
    // only heights 0..=2 are canonical
    store.set_in_chain(&hashes[..3]).await.unwrap();

    let mut heights = store.get_random_not_compactified(10).await.unwrap();
    heights.sort_unstable();
    assert_eq!(heights, vec![0, 1, 2]);

    let heights = store.get_random_not_compactified(2).await.unwrap();
    assert_eq!(heights.len(), 2);
}
