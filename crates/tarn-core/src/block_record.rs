//! Consensus block records and their persisted projection.

use serde::{Deserialize, Serialize};

use crate::block_utils::PlotFilterInfo;
use crate::error::CodecError;
use crate::types::{BlockHash, ClassgroupElement, Coin, SubEpochSummary};

/// The full consensus view of a block: everything the chain logic needs
/// without the block body.
///
/// Two fields (`pos_ss_cc_challenge_hash`, `cc_sp_hash`) are re-derived from
/// the stored block bytes on every load rather than persisted; see
/// [`BlockRecordDb`].
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct BlockRecord {
    pub header_hash: BlockHash,
    pub prev_hash: BlockHash,
    pub height: u32,
    pub weight: u128,
    pub total_iters: u128,
    pub signage_point_index: u8,
    pub challenge_vdf_output: ClassgroupElement,
    pub infused_challenge_vdf_output: Option<ClassgroupElement>,
    pub reward_infusion_new_challenge: BlockHash,
    pub challenge_block_info_hash: BlockHash,
    pub sub_slot_iters: u64,
    pub pool_puzzle_hash: BlockHash,
    pub farmer_puzzle_hash: BlockHash,
    pub required_iters: u64,
    pub deficit: u8,
    pub overflow: bool,
    pub prev_transaction_block_height: u32,
    pub pos_ss_cc_challenge_hash: BlockHash,
    pub cc_sp_hash: BlockHash,
    pub timestamp: Option<u64>,
    pub prev_transaction_block_hash: Option<BlockHash>,
    pub fees: Option<u64>,
    pub reward_claims_incorporated: Option<Vec<Coin>>,
    pub finished_challenge_slot_hashes: Option<Vec<BlockHash>>,
    pub finished_infused_challenge_slot_hashes: Option<Vec<BlockHash>>,
    pub finished_reward_slot_hashes: Option<Vec<BlockHash>>,
    pub sub_epoch_summary_included: Option<SubEpochSummary>,
}

/// The subset of [`BlockRecord`] fields that is persisted.
///
/// This shape must never grow new required fields: old rows would become
/// undecodable. Extensions go in a new table or column, never here.
#[derive(
    Serialize, Deserialize, Clone, Debug, PartialEq, Eq,
    bincode::Encode, bincode::Decode,
)]
pub struct BlockRecordDb {
    pub header_hash: BlockHash,
    pub prev_hash: BlockHash,
    pub height: u32,
    pub weight: u128,
    pub total_iters: u128,
    pub signage_point_index: u8,
    pub challenge_vdf_output: ClassgroupElement,
    pub infused_challenge_vdf_output: Option<ClassgroupElement>,
    pub reward_infusion_new_challenge: BlockHash,
    pub challenge_block_info_hash: BlockHash,
    pub sub_slot_iters: u64,
    pub pool_puzzle_hash: BlockHash,
    pub farmer_puzzle_hash: BlockHash,
    pub required_iters: u64,
    pub deficit: u8,
    pub overflow: bool,
    pub prev_transaction_block_height: u32,
    pub timestamp: Option<u64>,
    pub prev_transaction_block_hash: Option<BlockHash>,
    pub fees: Option<u64>,
    pub reward_claims_incorporated: Option<Vec<Coin>>,
    pub finished_challenge_slot_hashes: Option<Vec<BlockHash>>,
    pub finished_infused_challenge_slot_hashes: Option<Vec<BlockHash>>,
    pub finished_reward_slot_hashes: Option<Vec<BlockHash>>,
    pub sub_epoch_summary_included: Option<SubEpochSummary>,
}

impl BlockRecordDb {
    /// Project a consensus record down to its persisted fields.
    pub fn from_record(record: &BlockRecord) -> Self {
        Self {
            header_hash: record.header_hash,
            prev_hash: record.prev_hash,
            height: record.height,
            weight: record.weight,
            total_iters: record.total_iters,
            signage_point_index: record.signage_point_index,
            challenge_vdf_output: record.challenge_vdf_output.clone(),
            infused_challenge_vdf_output: record.infused_challenge_vdf_output.clone(),
            reward_infusion_new_challenge: record.reward_infusion_new_challenge,
            challenge_block_info_hash: record.challenge_block_info_hash,
            sub_slot_iters: record.sub_slot_iters,
            pool_puzzle_hash: record.pool_puzzle_hash,
            farmer_puzzle_hash: record.farmer_puzzle_hash,
            required_iters: record.required_iters,
            deficit: record.deficit,
            overflow: record.overflow,
            prev_transaction_block_height: record.prev_transaction_block_height,
            timestamp: record.timestamp,
            prev_transaction_block_hash: record.prev_transaction_block_hash,
            fees: record.fees,
            reward_claims_incorporated: record.reward_claims_incorporated.clone(),
            finished_challenge_slot_hashes: record.finished_challenge_slot_hashes.clone(),
            finished_infused_challenge_slot_hashes: record
                .finished_infused_challenge_slot_hashes
                .clone(),
            finished_reward_slot_hashes: record.finished_reward_slot_hashes.clone(),
            sub_epoch_summary_included: record.sub_epoch_summary_included.clone(),
        }
    }

    /// Rebuild the full consensus record from the stored projection plus the
    /// plot-filter hashes derived from block bytes.
    pub fn into_record(self, plot_filter: PlotFilterInfo) -> BlockRecord {
        BlockRecord {
            header_hash: self.header_hash,
            prev_hash: self.prev_hash,
            height: self.height,
            weight: self.weight,
            total_iters: self.total_iters,
            signage_point_index: self.signage_point_index,
            challenge_vdf_output: self.challenge_vdf_output,
            infused_challenge_vdf_output: self.infused_challenge_vdf_output,
            reward_infusion_new_challenge: self.reward_infusion_new_challenge,
            challenge_block_info_hash: self.challenge_block_info_hash,
            sub_slot_iters: self.sub_slot_iters,
            pool_puzzle_hash: self.pool_puzzle_hash,
            farmer_puzzle_hash: self.farmer_puzzle_hash,
            required_iters: self.required_iters,
            deficit: self.deficit,
            overflow: self.overflow,
            prev_transaction_block_height: self.prev_transaction_block_height,
            pos_ss_cc_challenge_hash: plot_filter.pos_ss_cc_challenge_hash,
            cc_sp_hash: plot_filter.cc_sp_hash,
            timestamp: self.timestamp,
            prev_transaction_block_hash: self.prev_transaction_block_hash,
            fees: self.fees,
            reward_claims_incorporated: self.reward_claims_incorporated,
            finished_challenge_slot_hashes: self.finished_challenge_slot_hashes,
            finished_infused_challenge_slot_hashes: self.finished_infused_challenge_slot_hashes,
            finished_reward_slot_hashes: self.finished_reward_slot_hashes,
            sub_epoch_summary_included: self.sub_epoch_summary_included,
        }
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, CodecError> {
        bincode::encode_to_vec(self, bincode::config::standard())
            .map_err(|e| CodecError::Encode(e.to_string()))
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, CodecError> {
        let (record, _) = bincode::decode_from_slice(bytes, bincode::config::standard())
            .map_err(|e| CodecError::Decode(e.to_string()))?;
        Ok(record)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn sample_record(height: u32) -> BlockRecord {
        BlockRecord {
            header_hash: BlockHash([height as u8; 32]),
            prev_hash: BlockHash([1; 32]),
            height,
            weight: 1000,
            total_iters: 5_000_000,
            signage_point_index: 4,
            challenge_vdf_output: ClassgroupElement(vec![7; 100]),
            infused_challenge_vdf_output: None,
            reward_infusion_new_challenge: BlockHash([2; 32]),
            challenge_block_info_hash: BlockHash([3; 32]),
            sub_slot_iters: 1 << 20,
            pool_puzzle_hash: BlockHash([4; 32]),
            farmer_puzzle_hash: BlockHash([5; 32]),
            required_iters: 12345,
            deficit: 15,
            overflow: false,
            prev_transaction_block_height: height.saturating_sub(1),
            pos_ss_cc_challenge_hash: BlockHash([6; 32]),
            cc_sp_hash: BlockHash([7; 32]),
            timestamp: Some(1_700_000_000),
            prev_transaction_block_hash: Some(BlockHash([8; 32])),
            fees: Some(500),
            reward_claims_incorporated: Some(vec![Coin {
                parent_coin_info: BlockHash([9; 32]),
                puzzle_hash: BlockHash([10; 32]),
                amount: 1_750_000_000_000,
            }]),
            finished_challenge_slot_hashes: None,
            finished_infused_challenge_slot_hashes: None,
            finished_reward_slot_hashes: None,
            sub_epoch_summary_included: None,
        }
    }

    #[test]
    fn projection_roundtrip_restores_record() {
        let record = sample_record(42);
        let db = BlockRecordDb::from_record(&record);
        let restored = db.into_record(PlotFilterInfo {
            pos_ss_cc_challenge_hash: record.pos_ss_cc_challenge_hash,
            cc_sp_hash: record.cc_sp_hash,
        });
        assert_eq!(restored, record);
    }

    #[test]
    fn db_bytes_roundtrip() {
        let db = BlockRecordDb::from_record(&sample_record(9));
        let bytes = db.to_bytes().unwrap();
        assert_eq!(BlockRecordDb::from_bytes(&bytes).unwrap(), db);
    }

    proptest! {
        #[test]
        fn db_bytes_roundtrip_any(
            height in 0u32..5_000_000,
            weight in 0u128..u128::MAX / 2,
            deficit in 0u8..16,
            timestamp in proptest::option::of(0u64..u64::MAX),
            fees in proptest::option::of(0u64..u64::MAX),
        ) {
            let mut record = sample_record(height);
            record.weight = weight;
            record.deficit = deficit;
            record.timestamp = timestamp;
            record.fees = fees;
            let db = BlockRecordDb::from_record(&record);
            let bytes = db.to_bytes().unwrap();
            prop_assert_eq!(BlockRecordDb::from_bytes(&bytes).unwrap(), db);
        }
    }
}
