//! Block index: fixed-stride entries describing every block.
//!
//! # On-disk layout (24 bytes per entry, all fields little-endian)
//!
//! ```text
//! Offset  Size  Field
//!    0      8   payload_offset   relative to the payload region start (LE u64)
//!    8      4   compressed_size  on-disk payload bytes (LE u32)
//!   12      4   original_size    uncompressed block bytes (LE u32)
//!   16      1   algorithm_code   (u8, see codec module)
//!   17      1   level            (u8)
//!   18      2   block_flags      (LE u16, see the BLOCK_FLAG_* constants)
//!   20      4   crc32            of the ORIGINAL block bytes (LE u32)
//! ```
//!
//! # Checksums
//! `crc32` (IEEE polynomial 0xEDB88320) always covers the original,
//! pre-preprocess block bytes. The reader verifies it after running the full
//! inverse pipeline, so end-to-end corruption is caught regardless of which
//! codec or transform a block used.
//!
//! # Invariants
//! Entries appear in input order. `payload_offset` values start at zero and
//! each equals the previous entry's `payload_offset + compressed_size`; the
//! original sizes sum to the header's original length. Stored blocks carry
//! no flags and equal sizes. [`validate_entries`] checks all of this before
//! any payload byte is touched.

use crate::codec::{Algorithm, CODE_STORED};
use crate::container::ContainerHeader;
use crate::error::TzpError;

/// Fixed byte size of one block index entry.
pub const ENTRY_SIZE: usize = 24;

// ── Block flags ──────────────────────────────────────────────────────────────

/// Delta preprocessing over 4-byte LE integers was applied before the codec.
pub const BLOCK_FLAG_DELTA:  u16 = 1 << 0;
/// Byte-wise run-length preprocessing was applied before the codec.
pub const BLOCK_FLAG_RLE:    u16 = 1 << 1;
/// Type-specific transform (reserved, never set in v3.1).
pub const BLOCK_FLAG_TYPED:  u16 = 1 << 2;
/// The block payload is a multi-pass hybrid (LZ4-HC then Zstd).
pub const BLOCK_FLAG_HYBRID: u16 = 1 << 3;

/// Bits 4..=15 plus the reserved type-specific bit must be zero in v3.1.
pub const BLOCK_FLAG_RESERVED_MASK: u16 =
    !(BLOCK_FLAG_DELTA | BLOCK_FLAG_RLE | BLOCK_FLAG_HYBRID);

// ── Entry ────────────────────────────────────────────────────────────────────

/// One decoded block index entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockEntry {
    pub payload_offset:  u64,
    pub compressed_size: u32,
    pub original_size:   u32,
    pub algorithm:       u8,
    pub level:           u8,
    pub flags:           u16,
    /// CRC32 of the original (pre-preprocess) block bytes.
    pub crc32:           u32,
}

impl BlockEntry {
    /// Serialize to exactly [`ENTRY_SIZE`] bytes.
    pub fn to_bytes(&self) -> [u8; ENTRY_SIZE] {
        let mut buf = [0u8; ENTRY_SIZE];
        buf[0..8].copy_from_slice(&self.payload_offset.to_le_bytes());
        buf[8..12].copy_from_slice(&self.compressed_size.to_le_bytes());
        buf[12..16].copy_from_slice(&self.original_size.to_le_bytes());
        buf[16] = self.algorithm;
        buf[17] = self.level;
        buf[18..20].copy_from_slice(&self.flags.to_le_bytes());
        buf[20..24].copy_from_slice(&self.crc32.to_le_bytes());
        buf
    }

    /// Deserialize from [`ENTRY_SIZE`] bytes. Field-level validation happens
    /// in [`validate_entries`], once the whole index is in hand.
    pub fn from_bytes(buf: &[u8; ENTRY_SIZE]) -> Self {
        Self {
            payload_offset:  u64::from_le_bytes(buf[0..8].try_into().unwrap()),
            compressed_size: u32::from_le_bytes(buf[8..12].try_into().unwrap()),
            original_size:   u32::from_le_bytes(buf[12..16].try_into().unwrap()),
            algorithm:       buf[16],
            level:           buf[17],
            flags:           u16::from_le_bytes(buf[18..20].try_into().unwrap()),
            crc32:           u32::from_le_bytes(buf[20..24].try_into().unwrap()),
        }
    }

    #[inline]
    pub fn is_stored(&self) -> bool {
        self.algorithm == CODE_STORED
    }

    /// The algorithm this entry declares, or `None` for an unknown pair.
    #[inline]
    pub fn decoded_algorithm(&self) -> Option<Algorithm> {
        Algorithm::from_wire(self.algorithm, self.level)
    }
}

// ── Validation ───────────────────────────────────────────────────────────────

/// Check the whole index against the header and the payload region length.
///
/// Fails with [`TzpError::MalformedIndex`] naming the first offending entry.
/// Runs before any payload read, so a bit flip in the index is detected here
/// or, if it survives these structural checks, by a later checksum failure.
pub fn validate_entries(
    entries:     &[BlockEntry],
    header:      &ContainerHeader,
    payload_len: u64,
) -> Result<(), TzpError> {
    let malformed = |msg: String| Err(TzpError::MalformedIndex(msg));

    if entries.len() != header.block_count as usize {
        return malformed(format!(
            "{} entries, header declares {}",
            entries.len(),
            header.block_count
        ));
    }

    let mut expected_offset = 0u64;
    let mut total_original  = 0u64;

    for (i, entry) in entries.iter().enumerate() {
        if entry.payload_offset != expected_offset {
            return malformed(format!(
                "entry {i}: payload_offset {} is not contiguous (expected {expected_offset})",
                entry.payload_offset
            ));
        }
        if entry.original_size == 0 {
            return malformed(format!("entry {i}: zero original_size"));
        }
        if entry.flags & BLOCK_FLAG_RESERVED_MASK != 0 {
            return malformed(format!(
                "entry {i}: reserved flag bits set ({:#06x})",
                entry.flags
            ));
        }
        if entry.decoded_algorithm().is_none() {
            return malformed(format!(
                "entry {i}: unknown algorithm/level pair ({:#04x}, {})",
                entry.algorithm, entry.level
            ));
        }
        if entry.is_stored() {
            if entry.compressed_size != entry.original_size {
                return malformed(format!(
                    "entry {i}: stored block with compressed_size {} != original_size {}",
                    entry.compressed_size, entry.original_size
                ));
            }
            if entry.flags != 0 {
                return malformed(format!("entry {i}: stored block with flags set"));
            }
        }
        let is_hybrid = entry.algorithm == crate::codec::CODE_HYBRID;
        if is_hybrid != (entry.flags & BLOCK_FLAG_HYBRID != 0) {
            return malformed(format!("entry {i}: hybrid flag disagrees with algorithm"));
        }

        expected_offset += u64::from(entry.compressed_size);
        total_original  += u64::from(entry.original_size);
    }

    if expected_offset != payload_len {
        return malformed(format!(
            "payload region is {payload_len} bytes, index accounts for {expected_offset}"
        ));
    }
    if total_original != header.original_len {
        return malformed(format!(
            "original sizes sum to {total_original}, header declares {}",
            header.original_len
        ));
    }

    Ok(())
}
