//! Per-block pipeline: filters, codec, checksums, and the stored fallback.
//!
//! # Encode
//! The CRC32 is taken over the original block bytes before anything else, so
//! the decode side can verify end-to-end after the full inverse pipeline no
//! matter which codec or filter ran. Any codec failure, and any compressed
//! form that is not strictly smaller than the original block, falls back to
//! a stored block: flags cleared, payload verbatim. Encoding therefore never
//! fails.
//!
//! # Decode
//! Verification order: codec, inverse filter, length, CRC32. A codec error
//! here is fatal (there is no fallback on read); a filter or checksum
//! mismatch is reported as block corruption.

use crc32fast::Hasher;

use crate::codec::Algorithm;
use crate::error::TzpError;
use crate::filter;
use crate::index::{BlockEntry, BLOCK_FLAG_HYBRID};
use crate::strategy::BlockStrategy;

// ── Encode ───────────────────────────────────────────────────────────────────

/// One compressed block, ready for assembly. `entry.payload_offset` is
/// filled in by the orchestrator once all blocks are in hand.
#[derive(Debug, Clone)]
pub struct EncodedBlock {
    pub entry:   BlockEntry,
    pub payload: Vec<u8>,
}

/// Run one block through filters and codec, with the stored fallback.
pub fn encode_block(data: &[u8], strategy: &BlockStrategy) -> EncodedBlock {
    let crc = crc32(data);

    if strategy.algorithm == Algorithm::Stored {
        return stored_block(data, crc);
    }

    let filtered = filter::apply(strategy.filters, data);
    match strategy.algorithm.compress(&filtered) {
        // The compressed form must beat the original block, not the
        // filtered intermediate.
        Ok(payload) if payload.len() < data.len() => {
            let mut flags = strategy.filters;
            if matches!(strategy.algorithm, Algorithm::Hybrid { .. }) {
                flags |= BLOCK_FLAG_HYBRID;
            }
            EncodedBlock {
                entry: BlockEntry {
                    payload_offset:  0,
                    compressed_size: payload.len() as u32,
                    original_size:   data.len() as u32,
                    algorithm:       strategy.algorithm.code(),
                    level:           strategy.algorithm.level_byte(),
                    flags,
                    crc32:           crc,
                },
                payload,
            }
        }
        _ => stored_block(data, crc),
    }
}

fn stored_block(data: &[u8], crc: u32) -> EncodedBlock {
    EncodedBlock {
        entry: BlockEntry {
            payload_offset:  0,
            compressed_size: data.len() as u32,
            original_size:   data.len() as u32,
            algorithm:       Algorithm::Stored.code(),
            level:           0,
            flags:           0,
            crc32:           crc,
        },
        payload: data.to_vec(),
    }
}

// ── Decode ───────────────────────────────────────────────────────────────────

/// Reverse the pipeline for one block and verify its checksum.
///
/// `block_index` only labels errors; the entry and payload fully describe
/// the block, so any block decodes independently of the rest of the file.
pub fn decode_block(
    block_index: usize,
    entry:       &BlockEntry,
    payload:     &[u8],
) -> Result<Vec<u8>, TzpError> {
    let algorithm = entry.decoded_algorithm().ok_or_else(|| {
        TzpError::MalformedIndex(format!(
            "entry {block_index}: unknown algorithm/level pair ({:#04x}, {})",
            entry.algorithm, entry.level
        ))
    })?;

    let original_len = entry.original_size as usize;
    let filtered = algorithm
        .decompress(payload, original_len)
        .map_err(|e| TzpError::CodecFailure {
            algorithm: entry.algorithm,
            level:     entry.level,
            message:   e.to_string(),
        })?;

    let data = filter::invert(entry.flags, &filtered)
        .ok_or(TzpError::BlockChecksumMismatch { index: block_index })?;

    if data.len() != original_len || crc32(&data) != entry.crc32 {
        return Err(TzpError::BlockChecksumMismatch { index: block_index });
    }

    Ok(data)
}

/// CRC32 (IEEE polynomial 0xEDB88320) over `data`.
pub fn crc32(data: &[u8]) -> u32 {
    let mut hasher = Hasher::new();
    hasher.update(data);
    hasher.finalize()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::CODE_STORED;
    use crate::index::{BLOCK_FLAG_DELTA, BLOCK_FLAG_RLE};

    fn strategy(filters: u16, algorithm: Algorithm) -> BlockStrategy {
        BlockStrategy { filters, algorithm }
    }

    #[test]
    fn roundtrip_plain_zstd() {
        let data = b"a block of text that zstd will happily shrink ".repeat(40);
        let encoded = encode_block(&data, &strategy(0, Algorithm::Zstd { level: 6 }));
        assert!(encoded.payload.len() < data.len());
        assert_eq!(decode_block(0, &encoded.entry, &encoded.payload).unwrap(), data);
    }

    #[test]
    fn roundtrip_with_rle_filter() {
        let data = vec![b'A'; 4096];
        let encoded = encode_block(
            &data,
            &strategy(BLOCK_FLAG_RLE, Algorithm::Zstd { level: 6 }),
        );
        assert_eq!(encoded.entry.flags, BLOCK_FLAG_RLE);
        assert!(encoded.payload.len() < 64);
        assert_eq!(decode_block(0, &encoded.entry, &encoded.payload).unwrap(), data);
    }

    #[test]
    fn roundtrip_with_delta_filter() {
        let data: Vec<u8> = (0u32..65536).flat_map(|v| v.to_le_bytes()).collect();
        let encoded = encode_block(
            &data,
            &strategy(BLOCK_FLAG_DELTA, Algorithm::Zstd { level: 6 }),
        );
        assert_eq!(encoded.entry.flags, BLOCK_FLAG_DELTA);
        assert_eq!(decode_block(0, &encoded.entry, &encoded.payload).unwrap(), data);
    }

    #[test]
    fn hybrid_sets_its_flag() {
        let data = b"hybrid pipeline material ".repeat(200);
        let encoded = encode_block(
            &data,
            &strategy(0, Algorithm::Hybrid { lz4_level: 9, zstd_level: 19 }),
        );
        assert_eq!(encoded.entry.flags & BLOCK_FLAG_HYBRID, BLOCK_FLAG_HYBRID);
        assert_eq!(decode_block(0, &encoded.entry, &encoded.payload).unwrap(), data);
    }

    #[test]
    fn incompressible_falls_back_to_stored() {
        let mut state = 42u64;
        let mut data = Vec::with_capacity(65536);
        while data.len() < 65536 {
            state ^= state << 13;
            state ^= state >> 7;
            state ^= state << 17;
            data.extend_from_slice(&state.to_le_bytes());
        }
        let encoded = encode_block(&data, &strategy(0, Algorithm::Zstd { level: 19 }));
        assert_eq!(encoded.entry.algorithm, CODE_STORED);
        assert_eq!(encoded.entry.flags, 0);
        assert_eq!(encoded.payload, data);
        assert_eq!(decode_block(3, &encoded.entry, &encoded.payload).unwrap(), data);
    }

    #[test]
    fn tiny_block_falls_back_to_stored() {
        // A handful of bytes can never shrink past the codec framing.
        let data = b"xy";
        let encoded = encode_block(data, &strategy(0, Algorithm::Lz4Fast));
        assert_eq!(encoded.entry.algorithm, CODE_STORED);
        assert_eq!(encoded.payload, data);
    }

    #[test]
    fn payload_corruption_is_detected() {
        let data = b"checksummed block contents, repeated a few times ".repeat(30);
        let encoded = encode_block(&data, &strategy(0, Algorithm::Lz4Fast));
        let mut payload = encoded.payload.clone();
        // Flip one bit past the LZ4 size prefix.
        payload[10] ^= 0x01;
        let err = decode_block(7, &encoded.entry, &payload);
        assert!(matches!(
            err,
            Err(TzpError::BlockChecksumMismatch { index: 7 }) | Err(TzpError::CodecFailure { .. })
        ));
    }

    #[test]
    fn crc_covers_original_not_payload() {
        let data = vec![b'B'; 2048];
        let encoded = encode_block(
            &data,
            &strategy(BLOCK_FLAG_RLE, Algorithm::Zstd { level: 6 }),
        );
        assert_eq!(encoded.entry.crc32, crc32(&data));
        assert_ne!(encoded.entry.crc32, crc32(&encoded.payload));
    }
}
