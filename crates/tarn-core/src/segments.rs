//! Weight-proof challenge segments, keyed by sub-epoch boundary block.

use serde::{Deserialize, Serialize};

use crate::error::CodecError;
use crate::types::{ClassgroupElement, VdfProof};

/// Challenge data for one sub-slot inside a segment.
#[derive(
    Serialize, Deserialize, Clone, Debug, PartialEq, Eq,
    bincode::Encode, bincode::Decode,
)]
pub struct SubSlotData {
    pub proof_of_space: Option<Vec<u8>>,
    pub cc_signage_point: Option<VdfProof>,
    pub cc_infusion_point: Option<VdfProof>,
    pub total_iters: Option<u128>,
}

/// One challenge segment of a sub-epoch, as used to build weight proofs.
#[derive(
    Serialize, Deserialize, Clone, Debug, PartialEq, Eq,
    bincode::Encode, bincode::Decode,
)]
pub struct SubEpochChallengeSegment {
    pub sub_epoch_n: u32,
    pub sub_slots: Vec<SubSlotData>,
    pub rc_slot_end_info: Option<ClassgroupElement>,
}

/// Wrapper holding the ordered segments of one sub-epoch; this is the shape
/// persisted in the segments table.
#[derive(
    Serialize, Deserialize, Clone, Debug, PartialEq, Eq,
    bincode::Encode, bincode::Decode,
)]
pub struct SubEpochSegments {
    pub challenge_segments: Vec<SubEpochChallengeSegment>,
}

impl SubEpochSegments {
    pub fn to_bytes(&self) -> Result<Vec<u8>, CodecError> {
        bincode::encode_to_vec(self, bincode::config::standard())
            .map_err(|e| CodecError::Encode(e.to_string()))
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, CodecError> {
        let (segments, _) = bincode::decode_from_slice(bytes, bincode::config::standard())
            .map_err(|e| CodecError::Decode(e.to_string()))?;
        Ok(segments)
    }
}
