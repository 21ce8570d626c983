//! Cheap partial parsers over stored block bytes.
//!
//! A `FullBlock` encoding puts the fields needed here in a fixed prefix, so
//! these parsers decode only that prefix and never touch the proof tail.
//! They may fail on unexpected input; callers must fall back to
//! [`FullBlock::from_bytes`], which must succeed on any valid stored block.

use crate::error::CodecError;
use crate::types::{BlockHash, FullBlock, SerializedProgram};

/// The two challenge hashes consumed by the plot filter, re-derived from
/// block bytes instead of being persisted in the block record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlotFilterInfo {
    pub pos_ss_cc_challenge_hash: BlockHash,
    pub cc_sp_hash: BlockHash,
}

/// Generator-related fields of a block, extracted without a full decode.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneratorBlockInfo {
    pub prev_header_hash: BlockHash,
    pub transactions_generator: Option<SerializedProgram>,
    pub transactions_generator_ref_list: Vec<u32>,
}

impl GeneratorBlockInfo {
    /// Build from a fully decoded block (the fallback path).
    pub fn from_block(block: &FullBlock) -> Self {
        Self {
            prev_header_hash: block.prev_header_hash,
            transactions_generator: block.transactions_generator.clone(),
            transactions_generator_ref_list: block.transactions_generator_ref_list.clone(),
        }
    }
}

// Prefix mirrors of `FullBlock`. Decoding stops after the listed fields;
// trailing bytes are ignored.

#[derive(bincode::Decode)]
struct PlotFilterPrefix {
    _prev_header_hash: BlockHash,
    _height: u32,
    pos_ss_cc_challenge_hash: BlockHash,
    cc_sp_hash: BlockHash,
}

#[derive(bincode::Decode)]
struct GeneratorPrefix {
    prev_header_hash: BlockHash,
    _height: u32,
    _pos_ss_cc_challenge_hash: BlockHash,
    _cc_sp_hash: BlockHash,
    transactions_generator: Option<SerializedProgram>,
    transactions_generator_ref_list: Vec<u32>,
}

/// Extract the plot-filter hashes from encoded block bytes.
pub fn plot_filter_info_from_block(bytes: &[u8]) -> Result<PlotFilterInfo, CodecError> {
    let (prefix, _): (PlotFilterPrefix, usize) =
        bincode::decode_from_slice(bytes, bincode::config::standard())
            .map_err(|e| CodecError::Decode(e.to_string()))?;
    Ok(PlotFilterInfo {
        pos_ss_cc_challenge_hash: prefix.pos_ss_cc_challenge_hash,
        cc_sp_hash: prefix.cc_sp_hash,
    })
}

/// Extract generator block info from encoded block bytes.
pub fn block_info_from_block(bytes: &[u8]) -> Result<GeneratorBlockInfo, CodecError> {
    let (prefix, _): (GeneratorPrefix, usize) =
        bincode::decode_from_slice(bytes, bincode::config::standard())
            .map_err(|e| CodecError::Decode(e.to_string()))?;
    Ok(GeneratorBlockInfo {
        prev_header_hash: prefix.prev_header_hash,
        transactions_generator: prefix.transactions_generator,
        transactions_generator_ref_list: prefix.transactions_generator_ref_list,
    })
}

/// Extract only the transaction generator from encoded block bytes.
pub fn generator_from_block(bytes: &[u8]) -> Result<Option<SerializedProgram>, CodecError> {
    Ok(block_info_from_block(bytes)?.transactions_generator)
}
