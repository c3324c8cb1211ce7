//! The "fast LZ" compression primitive spec §4.B treats as a black box.
//! Implemented with `lz4_flex`: below `COMPRESSION_THRESHOLD` bytes the
//! payload is framed uncompressed (spec §4.B point 2 — "below it the
//! compressor may emit uncompressed framing").

use crate::error::Error;

/// Below this size the binary adapter skips compression outright (spec
/// §4.B / §6: "compression threshold 512 bytes").
pub const COMPRESSION_THRESHOLD: usize = 512;

const FLAG_RAW: u8 = 0;
const FLAG_COMPRESSED: u8 = 1;

/// Compresses `data`, prefixing a one-byte flag so `decompress` knows
/// whether the rest of the buffer is raw or LZ4-framed.
pub fn compress(data: &[u8]) -> Vec<u8> {
    if data.len() < COMPRESSION_THRESHOLD {
        let mut out = Vec::with_capacity(data.len() + 1);
        out.push(FLAG_RAW);
        out.extend_from_slice(data);
        return out;
    }

    let compressed = lz4_flex::block::compress_prepend_size(data);
    let mut out = Vec::with_capacity(compressed.len() + 1);
    out.push(FLAG_COMPRESSED);
    out.extend_from_slice(&compressed);
    out
}

pub fn decompress(data: &[u8]) -> Result<Vec<u8>, Error> {
    let (flag, rest) = data
        .split_first()
        .ok_or_else(|| Error::CompressionError("empty compressed payload".into()))?;

    match *flag {
        FLAG_RAW => Ok(rest.to_vec()),
        FLAG_COMPRESSED => lz4_flex::block::decompress_size_prepended(rest)
            .map_err(|e| Error::CompressionError(e.to_string())),
        other => Err(Error::CompressionError(format!(
            "unknown compression flag byte {other}"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrip_small_payload_is_stored_raw() {
        let data = b"small".to_vec();
        let framed = compress(&data);
        assert_eq!(framed[0], FLAG_RAW);
        assert_eq!(decompress(&framed).unwrap(), data);
    }

    #[test]
    fn roundtrip_large_payload_is_compressed() {
        let data = vec![b'x'; 4096];
        let framed = compress(&data);
        assert_eq!(framed[0], FLAG_COMPRESSED);
        assert!(framed.len() < data.len());
        assert_eq!(decompress(&framed).unwrap(), data);
    }

    #[test]
    fn roundtrip_random_large_payload() {
        let data: Vec<u8> = (0..3_000_000u32).map(|i| (i % 256) as u8).collect();
        let framed = compress(&data);
        assert_eq!(decompress(&framed).unwrap(), data);
    }
}
