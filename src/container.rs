//! Container header, format anchor at offset 0.
//!
//! # On-disk layout (48 bytes, all numeric fields little-endian)
//!
//! ```text
//! Offset  Size  Field
//!    0      4   magic           = 0x54 0x5A 0x50 0x03  ("TZP\3")
//!    4      2   version         = 0x0301  (LE u16, on-disk bytes 01 03)
//!    6      2   global flags    (see the FLAG_* constants)
//!    8      8   original length (LE u64)
//!   16      4   block count     (LE u32)
//!   20      4   base block size (LE u32)
//!   24      8   global hash: first 8 bytes of SHA-256(original input)
//!   32      4   metadata length in bytes (LE u32)
//!   36     12   reserved, zero-filled
//! ```
//!
//! Immediately after the header: `metadata_len` bytes of compact JSON
//! (`metadata.rs`), then `block_count * 24` bytes of block index
//! (`index.rs`), then the payload region with no padding.
//!
//! # Endianness
//! Every numeric field is little-endian. This is frozen for version 3.1;
//! a big-endian variant would carry a distinct magic number.

use crate::error::TzpError;

// ── Constants ────────────────────────────────────────────────────────────────

/// On-disk magic, the first four bytes of every container.
pub const MAGIC: [u8; 4] = [0x54, 0x5A, 0x50, 0x03]; // "TZP\x03"

/// Current format version as a LE u16 (v3.1, on-disk bytes `01 03`).
pub const FORMAT_VERSION: u16 = 0x0301;

/// Fixed byte size of the container header.
pub const HEADER_SIZE: usize = 48;

// ── Global flags ─────────────────────────────────────────────────────────────

/// Content analysis was performed before planning.
pub const FLAG_ANALYZED:        u16 = 1 << 0;
/// Adaptive dictionaries (reserved, must be 0 in v3.1).
pub const FLAG_DICTIONARIES:    u16 = 1 << 1;
/// At least one block carries a reversible preprocessing transform.
pub const FLAG_PREPROCESSED:    u16 = 1 << 2;
/// At least one block used the multi-pass hybrid codec.
pub const FLAG_HYBRID:          u16 = 1 << 3;
/// Block sizing was driven by the analysis report.
pub const FLAG_ADAPTIVE_BLOCKS: u16 = 1 << 4;
/// Pattern optimization (boundary snapping) adjusted the block plan.
pub const FLAG_PATTERN_OPT:     u16 = 1 << 5;

/// Bits 6..=15 plus the dictionary bit must be zero in v3.1.
pub const FLAG_RESERVED_MASK: u16 = !(FLAG_ANALYZED
    | FLAG_PREPROCESSED
    | FLAG_HYBRID
    | FLAG_ADAPTIVE_BLOCKS
    | FLAG_PATTERN_OPT);

// ── Header ───────────────────────────────────────────────────────────────────

/// Decoded representation of the 48-byte container header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerHeader {
    pub flags:           u16,
    pub original_len:    u64,
    pub block_count:     u32,
    pub base_block_size: u32,
    /// First 8 bytes of SHA-256 over the original input.
    pub global_hash:     [u8; 8],
    pub metadata_len:    u32,
}

impl ContainerHeader {
    /// Serialize to exactly [`HEADER_SIZE`] bytes.
    pub fn to_bytes(&self) -> [u8; HEADER_SIZE] {
        let mut buf = [0u8; HEADER_SIZE];
        buf[0..4].copy_from_slice(&MAGIC);
        buf[4..6].copy_from_slice(&FORMAT_VERSION.to_le_bytes());
        buf[6..8].copy_from_slice(&self.flags.to_le_bytes());
        buf[8..16].copy_from_slice(&self.original_len.to_le_bytes());
        buf[16..20].copy_from_slice(&self.block_count.to_le_bytes());
        buf[20..24].copy_from_slice(&self.base_block_size.to_le_bytes());
        buf[24..32].copy_from_slice(&self.global_hash);
        buf[32..36].copy_from_slice(&self.metadata_len.to_le_bytes());
        // buf[36..48] reserved, stays zero
        buf
    }

    /// Parse and validate a 48-byte header.
    ///
    /// Fails with [`TzpError::UnsupportedFormat`] on a magic or version
    /// mismatch, or when reserved flag bits are set. The caller must not
    /// read any further section if this returns an error.
    pub fn from_bytes(buf: &[u8; HEADER_SIZE]) -> Result<Self, TzpError> {
        if buf[0..4] != MAGIC {
            return Err(TzpError::UnsupportedFormat("bad magic".into()));
        }

        let version = u16::from_le_bytes([buf[4], buf[5]]);
        if version != FORMAT_VERSION {
            return Err(TzpError::UnsupportedFormat(format!(
                "version {version:#06x} (this build reads {FORMAT_VERSION:#06x})"
            )));
        }

        let flags = u16::from_le_bytes([buf[6], buf[7]]);
        if flags & FLAG_RESERVED_MASK != 0 {
            return Err(TzpError::UnsupportedFormat(format!(
                "reserved flag bits set ({flags:#06x})"
            )));
        }

        Ok(Self {
            flags,
            original_len:    u64::from_le_bytes(buf[8..16].try_into().unwrap()),
            block_count:     u32::from_le_bytes(buf[16..20].try_into().unwrap()),
            base_block_size: u32::from_le_bytes(buf[20..24].try_into().unwrap()),
            global_hash:     buf[24..32].try_into().unwrap(),
            metadata_len:    u32::from_le_bytes(buf[32..36].try_into().unwrap()),
        })
    }

    #[inline]
    pub fn has_flag(&self, flag: u16) -> bool {
        self.flags & flag != 0
    }
}
