//! zstd adapter for stored block payloads (v2 schema only).

use std::io;

const LEVEL: i32 = 3;

pub fn compress(bytes: &[u8]) -> io::Result<Vec<u8>> {
    zstd::stream::encode_all(bytes, LEVEL)
}

pub fn decompress(bytes: &[u8]) -> io::Result<Vec<u8>> {
    zstd::stream::decode_all(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrip() {
        let data = vec![0xa5u8; 4096];
        let compressed = compress(&data).unwrap();
        assert!(compressed.len() < data.len());
        assert_eq!(decompress(&compressed).unwrap(), data);
    }

    #[test]
    fn garbage_fails() {
        assert!(decompress(b"not zstd").is_err());
    }
}
