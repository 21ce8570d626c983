//! Core chain types: hashes, VDF proofs, full blocks.
//!
//! The `FullBlock` wire encoding (bincode, standard config) is a persisted
//! format: the cheap-parse prefix fields must stay first and in order. See
//! [`crate::block_utils`].

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::CodecError;

/// A 32-byte hash value.
///
/// Used for block header hashes, challenge hashes, and puzzle hashes.
#[derive(
    Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Default,
    bincode::Encode, bincode::Decode,
)]
pub struct BlockHash(pub [u8; 32]);

impl BlockHash {
    /// The zero hash (32 zero bytes).
    pub const ZERO: Self = Self([0u8; 32]);

    /// Create a BlockHash from a byte array.
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Create a BlockHash from a byte slice, checking the length.
    pub fn from_slice(bytes: &[u8]) -> Result<Self, CodecError> {
        let arr: [u8; 32] = bytes
            .try_into()
            .map_err(|_| CodecError::InvalidHashLength(bytes.len()))?;
        Ok(Self(arr))
    }

    /// Parse a BlockHash from a lowercase hex string.
    pub fn from_hex(s: &str) -> Result<Self, CodecError> {
        let bytes = hex::decode(s).map_err(|e| CodecError::InvalidHex(e.to_string()))?;
        Self::from_slice(&bytes)
    }

    /// Return the underlying bytes.
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Hex encoding of the hash.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl fmt::Display for BlockHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for byte in &self.0 {
            write!(f, "{byte:02x}")?;
        }
        Ok(())
    }
}

impl From<[u8; 32]> for BlockHash {
    fn from(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }
}

impl AsRef<[u8]> for BlockHash {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

/// A serialized CLVM-style transaction generator program.
#[derive(
    Serialize, Deserialize, Clone, Debug, PartialEq, Eq,
    bincode::Encode, bincode::Decode,
)]
pub struct SerializedProgram(pub Vec<u8>);

/// A classgroup element, the output of a VDF.
#[derive(
    Serialize, Deserialize, Clone, Debug, PartialEq, Eq, Default,
    bincode::Encode, bincode::Decode,
)]
pub struct ClassgroupElement(pub Vec<u8>);

/// A proof that a VDF was evaluated correctly.
///
/// `normalized_to_identity` marks a compacted proof: smaller, equivalent, and
/// produced after the block was first accepted.
#[derive(
    Serialize, Deserialize, Clone, Debug, PartialEq, Eq,
    bincode::Encode, bincode::Decode,
)]
pub struct VdfProof {
    pub witness_type: u8,
    pub witness: Vec<u8>,
    pub normalized_to_identity: bool,
}

/// A coin created by a reward claim.
#[derive(
    Serialize, Deserialize, Clone, Debug, PartialEq, Eq,
    bincode::Encode, bincode::Decode,
)]
pub struct Coin {
    pub parent_coin_info: BlockHash,
    pub puzzle_hash: BlockHash,
    pub amount: u64,
}

/// Summary of a finished sub-epoch, included in the first block after the
/// boundary.
#[derive(
    Serialize, Deserialize, Clone, Debug, PartialEq, Eq,
    bincode::Encode, bincode::Decode,
)]
pub struct SubEpochSummary {
    pub prev_subepoch_summary_hash: BlockHash,
    pub reward_chain_hash: BlockHash,
    pub num_blocks_overflow: u8,
    pub new_difficulty: Option<u64>,
    pub new_sub_slot_iters: Option<u64>,
}

impl SubEpochSummary {
    pub fn to_bytes(&self) -> Result<Vec<u8>, CodecError> {
        bincode::encode_to_vec(self, bincode::config::standard())
            .map_err(|e| CodecError::Encode(e.to_string()))
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, CodecError> {
        let (ses, _) = bincode::decode_from_slice(bytes, bincode::config::standard())
            .map_err(|e| CodecError::Decode(e.to_string()))?;
        Ok(ses)
    }
}

/// A complete block as stored and gossiped.
///
/// Field order is part of the persisted encoding: the first six fields form
/// the cheap-parse prefix read by [`crate::block_utils`] without touching the
/// proof tail.
#[derive(
    Serialize, Deserialize, Clone, Debug, PartialEq, Eq,
    bincode::Encode, bincode::Decode,
)]
pub struct FullBlock {
    /// Header hash of the previous block.
    pub prev_header_hash: BlockHash,
    /// Height of this block in the chain.
    pub height: u32,
    /// Proof-of-space sub-slot challenge hash (plot filter input).
    pub pos_ss_cc_challenge_hash: BlockHash,
    /// Challenge-chain signage point hash (plot filter input).
    pub cc_sp_hash: BlockHash,
    /// Transaction generator program, if this block carries transactions.
    pub transactions_generator: Option<SerializedProgram>,
    /// Heights of previous blocks whose generators this block references.
    pub transactions_generator_ref_list: Vec<u32>,
    /// Hash of the transactions info; present exactly on transaction blocks.
    pub transactions_info_hash: Option<BlockHash>,
    /// Opaque foliage payload (signatures, pool target, and so on).
    pub foliage_data: Vec<u8>,
    /// Challenge chain infusion point VDF proof.
    pub challenge_chain_ip_proof: VdfProof,
    /// Reward chain infusion point VDF proof.
    pub reward_chain_ip_proof: VdfProof,
}

impl FullBlock {
    /// Compute the header hash (BLAKE3 over everything except the VDF proofs).
    ///
    /// Proofs are excluded so that replacing a proof with a compacted
    /// equivalent keeps the block identity stable.
    pub fn header_hash(&self) -> BlockHash {
        let mut hasher = blake3::Hasher::new();
        hasher.update(self.prev_header_hash.as_ref());
        hasher.update(&self.height.to_le_bytes());
        hasher.update(self.pos_ss_cc_challenge_hash.as_ref());
        hasher.update(self.cc_sp_hash.as_ref());
        match &self.transactions_generator {
            Some(generator) => {
                hasher.update(&[1]);
                hasher.update(&(generator.0.len() as u64).to_le_bytes());
                hasher.update(&generator.0);
            }
            None => {
                hasher.update(&[0]);
            }
        }
        for height in &self.transactions_generator_ref_list {
            hasher.update(&height.to_le_bytes());
        }
        match &self.transactions_info_hash {
            Some(hash) => {
                hasher.update(&[1]);
                hasher.update(hash.as_ref());
            }
            None => {
                hasher.update(&[0]);
            }
        }
        hasher.update(&self.foliage_data);
        BlockHash(hasher.finalize().into())
    }

    /// Whether this block is a transaction block.
    pub fn is_transaction_block(&self) -> bool {
        self.transactions_info_hash.is_some()
    }

    /// Whether every VDF proof in this block has been compacted.
    pub fn is_fully_compactified(&self) -> bool {
        self.challenge_chain_ip_proof.normalized_to_identity
            && self.reward_chain_ip_proof.normalized_to_identity
    }

    /// Canonical encoding (bincode with standard config).
    pub fn to_bytes(&self) -> Result<Vec<u8>, CodecError> {
        bincode::encode_to_vec(self, bincode::config::standard())
            .map_err(|e| CodecError::Encode(e.to_string()))
    }

    /// Decode a block from its canonical encoding.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, CodecError> {
        let (block, _) = bincode::decode_from_slice(bytes, bincode::config::standard())
            .map_err(|e| CodecError::Decode(e.to_string()))?;
        Ok(block)
    }
}
