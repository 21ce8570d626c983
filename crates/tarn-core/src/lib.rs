//! # tarn-core
//! Chain value types and codecs for the Tarn node.

pub mod block_record;
pub mod block_utils;
pub mod error;
pub mod segments;
pub mod types;
