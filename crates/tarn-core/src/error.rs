//! Error types for Tarn codecs.
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CodecError {
    #[error("encode: {0}")] Encode(String),
    #[error("decode: {0}")] Decode(String),
    #[error("invalid hash length: {0}")] InvalidHashLength(usize),
    #[error("invalid hex: {0}")] InvalidHex(String),
}
