//! Codec adapters: the closed algorithm set and its wire encoding.
//!
//! # Identity rules
//! Every block names its codec through two bytes in its index entry: an
//! `algorithm_code` and a `level`. The set of codes is closed and
//! version-gated; readers reject unknown codes instead of negotiating.
//!
//! ```text
//! Code   Algorithm              Level byte
//! 0x00   stored                 0
//! 0x01   LZ4 fast               0
//! 0x02   LZ4-HC                 1..=12
//! 0x03   Zstd fast              1..=3
//! 0x04   Zstd balanced          6..=9
//! 0x05   Zstd high              15..=19
//! 0x06   Zstd max               22
//! 0x07   hybrid (LZ4-HC+Zstd)   high nibble: LZ4-HC level,
//!                               low nibble: Zstd index (0=15, 1=19, 2=22)
//! 0x08   adaptive               reserved, never emitted in v3.1
//! ```
//!
//! # Payload conventions
//! Every LZ4 payload (fast and HC) carries a LE u32 size prefix, so one
//! decoder handles both. Zstd frames embed their content size; no prefix is
//! added. A hybrid payload is the Zstd frame wrapping the LZ4-HC output.
//!
//! Compressor state is cached thread-local, keyed by Zstd level. Workers
//! never share a compressor.

use std::cell::RefCell;
use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::io;

use thiserror::Error;

// ── Wire codes ───────────────────────────────────────────────────────────────

pub const CODE_STORED:        u8 = 0x00;
pub const CODE_LZ4_FAST:      u8 = 0x01;
pub const CODE_LZ4_HC:        u8 = 0x02;
pub const CODE_ZSTD_FAST:     u8 = 0x03;
pub const CODE_ZSTD_BALANCED: u8 = 0x04;
pub const CODE_ZSTD_HIGH:     u8 = 0x05;
pub const CODE_ZSTD_MAX:      u8 = 0x06;
pub const CODE_HYBRID:        u8 = 0x07;
/// Reserved for future per-block adaptive re-selection. Never written.
pub const CODE_ADAPTIVE:      u8 = 0x08;

/// Zstd levels addressable by the hybrid low nibble.
const HYBRID_ZSTD_LEVELS: [u8; 3] = [15, 19, 22];

// ── Error type ───────────────────────────────────────────────────────────────

/// Failure inside a codec adapter.
///
/// On the compression side this error never leaves the block pipeline: the
/// pipeline substitutes a stored block. On the decode side it is surfaced
/// as a fatal `CodecFailure`.
#[derive(Error, Debug)]
pub enum CodecError {
    #[error("compression failed: {0}")]
    Compression(String),
    #[error("decompression failed: {0}")]
    Decompression(String),
}

// ── Algorithm ────────────────────────────────────────────────────────────────

/// Closed set of per-block compression algorithms.
///
/// The `(algorithm_code, level)` byte pair in the block index is the
/// serialization of this variant; [`Algorithm::from_wire`] is the inverse.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Algorithm {
    Stored,
    Lz4Fast,
    Lz4Hc { level: u8 },
    Zstd { level: u8 },
    Hybrid { lz4_level: u8, zstd_level: u8 },
}

impl Algorithm {
    /// The on-disk algorithm code. Zstd levels map onto the banded codes.
    pub fn code(self) -> u8 {
        match self {
            Algorithm::Stored        => CODE_STORED,
            Algorithm::Lz4Fast       => CODE_LZ4_FAST,
            Algorithm::Lz4Hc { .. }  => CODE_LZ4_HC,
            Algorithm::Zstd { level } => match level {
                0..=3   => CODE_ZSTD_FAST,
                4..=9   => CODE_ZSTD_BALANCED,
                10..=19 => CODE_ZSTD_HIGH,
                _       => CODE_ZSTD_MAX,
            },
            Algorithm::Hybrid { .. } => CODE_HYBRID,
        }
    }

    /// The on-disk level byte.
    pub fn level_byte(self) -> u8 {
        match self {
            Algorithm::Stored  => 0,
            Algorithm::Lz4Fast => 0,
            Algorithm::Lz4Hc { level } => level,
            Algorithm::Zstd { level }  => level,
            Algorithm::Hybrid { lz4_level, zstd_level } => {
                let idx = HYBRID_ZSTD_LEVELS
                    .iter()
                    .position(|&l| l == zstd_level)
                    .unwrap_or(1) as u8;
                (lz4_level << 4) | idx
            }
        }
    }

    /// Decode the `(algorithm_code, level)` pair from an index entry.
    ///
    /// Returns `None` for unknown codes, the reserved adaptive code, or a
    /// level outside the code's band.
    pub fn from_wire(code: u8, level: u8) -> Option<Self> {
        match code {
            CODE_STORED if level == 0   => Some(Algorithm::Stored),
            CODE_LZ4_FAST if level == 0 => Some(Algorithm::Lz4Fast),
            CODE_LZ4_HC if (1..=12).contains(&level) => Some(Algorithm::Lz4Hc { level }),
            CODE_ZSTD_FAST if (1..=3).contains(&level) => Some(Algorithm::Zstd { level }),
            CODE_ZSTD_BALANCED if (6..=9).contains(&level) => Some(Algorithm::Zstd { level }),
            CODE_ZSTD_HIGH if (15..=19).contains(&level) => Some(Algorithm::Zstd { level }),
            CODE_ZSTD_MAX if level == 22 => Some(Algorithm::Zstd { level }),
            CODE_HYBRID => {
                let lz4_level = level >> 4;
                let idx = (level & 0x0F) as usize;
                if !(1..=12).contains(&lz4_level) || idx >= HYBRID_ZSTD_LEVELS.len() {
                    return None;
                }
                Some(Algorithm::Hybrid {
                    lz4_level,
                    zstd_level: HYBRID_ZSTD_LEVELS[idx],
                })
            }
            _ => None,
        }
    }

    /// Histogram/diagnostic name for the banded code (never parsed back).
    pub fn name(self) -> &'static str {
        match self.code() {
            CODE_STORED        => "stored",
            CODE_LZ4_FAST      => "lz4",
            CODE_LZ4_HC        => "lz4hc",
            CODE_ZSTD_FAST     => "zstd_fast",
            CODE_ZSTD_BALANCED => "zstd_balanced",
            CODE_ZSTD_HIGH     => "zstd_high",
            CODE_ZSTD_MAX      => "zstd_max",
            _                  => "hybrid",
        }
    }

    /// Compress one (possibly preprocessed) block.
    pub fn compress(self, data: &[u8]) -> Result<Vec<u8>, CodecError> {
        match self {
            Algorithm::Stored  => Ok(data.to_vec()),
            Algorithm::Lz4Fast => Ok(lz4_flex::compress_prepend_size(data)),
            Algorithm::Lz4Hc { level } => lz4_hc_compress(data, level),
            Algorithm::Zstd { level }  => zstd_compress(data, i32::from(level)),
            Algorithm::Hybrid { lz4_level, zstd_level } => {
                let stage1 = lz4_hc_compress(data, lz4_level)?;
                zstd_compress(&stage1, i32::from(zstd_level))
            }
        }
    }

    /// Decompress one block payload back to its (preprocessed) form.
    ///
    /// `original_len` is the decoded size the caller expects; it bounds the
    /// stored copy only, since LZ4 payloads are size-prefixed and Zstd
    /// frames are self-terminating.
    pub fn decompress(self, data: &[u8], original_len: usize) -> Result<Vec<u8>, CodecError> {
        match self {
            Algorithm::Stored => {
                if data.len() != original_len {
                    return Err(CodecError::Decompression(format!(
                        "stored payload is {} bytes, expected {original_len}",
                        data.len()
                    )));
                }
                Ok(data.to_vec())
            }
            Algorithm::Lz4Fast | Algorithm::Lz4Hc { .. } => lz4_decompress(data),
            Algorithm::Zstd { .. } => zstd_decompress(data),
            Algorithm::Hybrid { .. } => {
                let stage1 = zstd_decompress(data)?;
                lz4_decompress(&stage1)
            }
        }
    }
}

// ── Adapter internals ────────────────────────────────────────────────────────

thread_local! {
    // Reusable Zstd compressor contexts, keyed by level. Thread-local so
    // workers never contend on shared codec state.
    static ZSTD_COMPRESSORS: RefCell<HashMap<i32, zstd::bulk::Compressor<'static>>> =
        RefCell::new(HashMap::new());
}

fn zstd_compress(data: &[u8], level: i32) -> Result<Vec<u8>, CodecError> {
    ZSTD_COMPRESSORS
        .with(|cache| -> io::Result<Vec<u8>> {
            let mut cache = cache.borrow_mut();
            let compressor = match cache.entry(level) {
                Entry::Occupied(e) => e.into_mut(),
                Entry::Vacant(v)   => v.insert(zstd::bulk::Compressor::new(level)?),
            };
            compressor.compress(data)
        })
        .map_err(|e| CodecError::Compression(e.to_string()))
}

fn zstd_decompress(data: &[u8]) -> Result<Vec<u8>, CodecError> {
    zstd::decode_all(data).map_err(|e| CodecError::Decompression(e.to_string()))
}

fn lz4_hc_compress(data: &[u8], level: u8) -> Result<Vec<u8>, CodecError> {
    // prepend_size=true writes the same LE u32 prefix lz4_flex emits, so the
    // decode path below handles fast and HC payloads uniformly.
    lz4::block::compress(
        data,
        Some(lz4::block::CompressionMode::HIGHCOMPRESSION(i32::from(level))),
        true,
    )
    .map_err(|e| CodecError::Compression(e.to_string()))
}

fn lz4_decompress(data: &[u8]) -> Result<Vec<u8>, CodecError> {
    lz4_flex::decompress_size_prepended(data)
        .map_err(|e| CodecError::Decompression(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &[u8] =
        b"the quick brown fox jumps over the lazy dog, the quick brown fox again";

    #[test]
    fn wire_roundtrip_all_variants() {
        let algos = [
            Algorithm::Stored,
            Algorithm::Lz4Fast,
            Algorithm::Lz4Hc { level: 9 },
            Algorithm::Zstd { level: 3 },
            Algorithm::Zstd { level: 6 },
            Algorithm::Zstd { level: 15 },
            Algorithm::Zstd { level: 22 },
            Algorithm::Hybrid { lz4_level: 9, zstd_level: 19 },
        ];
        for algo in algos {
            let decoded = Algorithm::from_wire(algo.code(), algo.level_byte());
            assert_eq!(decoded, Some(algo), "{algo:?}");
        }
    }

    #[test]
    fn hybrid_level_byte_packing() {
        let algo = Algorithm::Hybrid { lz4_level: 9, zstd_level: 19 };
        assert_eq!(algo.code(), 0x07);
        assert_eq!(algo.level_byte(), 0x91);
    }

    #[test]
    fn unknown_codes_rejected() {
        assert_eq!(Algorithm::from_wire(CODE_ADAPTIVE, 0), None);
        assert_eq!(Algorithm::from_wire(0xFF, 0), None);
        // Level outside the band.
        assert_eq!(Algorithm::from_wire(CODE_ZSTD_BALANCED, 22), None);
        assert_eq!(Algorithm::from_wire(CODE_STORED, 1), None);
    }

    #[test]
    fn lz4_fast_and_hc_share_one_decoder() {
        for algo in [Algorithm::Lz4Fast, Algorithm::Lz4Hc { level: 9 }] {
            let compressed = algo.compress(SAMPLE).unwrap();
            let restored = algo.decompress(&compressed, SAMPLE.len()).unwrap();
            assert_eq!(restored, SAMPLE, "{algo:?}");
        }
    }

    #[test]
    fn zstd_levels_roundtrip() {
        for level in [1u8, 3, 6, 9, 15, 19, 22] {
            let algo = Algorithm::Zstd { level };
            let compressed = algo.compress(SAMPLE).unwrap();
            let restored = algo.decompress(&compressed, SAMPLE.len()).unwrap();
            assert_eq!(restored, SAMPLE, "level {level}");
        }
    }

    #[test]
    fn hybrid_roundtrip() {
        let algo = Algorithm::Hybrid { lz4_level: 9, zstd_level: 19 };
        let data: Vec<u8> = SAMPLE.iter().cycle().take(8192).copied().collect();
        let compressed = algo.compress(&data).unwrap();
        assert!(compressed.len() < data.len());
        assert_eq!(algo.decompress(&compressed, data.len()).unwrap(), data);
    }

    #[test]
    fn stored_length_mismatch_fails() {
        let err = Algorithm::Stored.decompress(SAMPLE, SAMPLE.len() + 1);
        assert!(err.is_err());
    }
}
