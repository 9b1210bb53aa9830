//! Reversible preprocessing transforms applied before the codec.
//!
//! Two filters exist in v3.1, each a pure `forward`/`inverse` pair:
//!
//! - **Delta**: the block is treated as a sequence of 4-byte LE integers;
//!   each word is replaced by its wrapping difference from the previous
//!   word. Slowly varying numeric data turns into near-constant small
//!   values that every codec handles far better. Trailing bytes that do
//!   not fill a word pass through unchanged. Length-preserving.
//! - **Run-length**: a control-byte stream. Every token is one control
//!   byte followed by its operand bytes:
//!   ```text
//!   0x00..=0x7F  literal: the next control+1 bytes are copied verbatim
//!   0x80..=0xFF  run: the next byte repeats (control - 0x80) + 3 times
//!   ```
//!   A literal token carries 1..=128 bytes, a run token 3..=130 copies;
//!   longer stretches simply emit further tokens. Runs of one or two bytes
//!   stay literal, since a run token costs two bytes. Not
//!   length-preserving.
//!
//! At most one filter is active per block; the selector guarantees this and
//! [`apply`]/[`invert`] dispatch on the block flag bits. Inverse failures
//! mean the payload is corrupt; the caller maps them to a checksum error.

use crate::index::{BLOCK_FLAG_DELTA, BLOCK_FLAG_RLE};

/// Run-token control bytes start here; smaller controls mean literals.
const RUN_TOKEN_BASE: u8 = 0x80;

/// Shortest run worth a run token (a token costs two bytes).
const RUN_MIN: usize = 3;

/// Longest run one token can carry: `RUN_MIN` plus the 7-bit count space.
const RUN_MAX: usize = RUN_MIN + 0x7F;

/// Longest literal stretch one token can carry.
const LITERAL_MAX: usize = 0x80;

// ── Delta ────────────────────────────────────────────────────────────────────

/// Forward delta transform over 4-byte LE words. Length-preserving.
pub fn delta_forward(data: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(data.len());
    let mut prev = 0u32;
    let mut chunks = data.chunks_exact(4);
    for chunk in &mut chunks {
        let value = u32::from_le_bytes(chunk.try_into().unwrap());
        out.extend_from_slice(&value.wrapping_sub(prev).to_le_bytes());
        prev = value;
    }
    out.extend_from_slice(chunks.remainder());
    out
}

/// Inverse of [`delta_forward`].
pub fn delta_inverse(data: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(data.len());
    let mut acc = 0u32;
    let mut chunks = data.chunks_exact(4);
    for chunk in &mut chunks {
        let diff = u32::from_le_bytes(chunk.try_into().unwrap());
        acc = acc.wrapping_add(diff);
        out.extend_from_slice(&acc.to_le_bytes());
    }
    out.extend_from_slice(chunks.remainder());
    out
}

// ── Run-length ───────────────────────────────────────────────────────────────

/// Byte-wise run-length encoding into the control-byte stream.
pub fn rle_forward(data: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(data.len() / 2 + 8);
    let mut literal_start = 0usize;
    let mut pos = 0usize;

    while pos < data.len() {
        let byte = data[pos];
        let mut end = pos + 1;
        while end < data.len() && data[end] == byte && end - pos < RUN_MAX {
            end += 1;
        }
        let run = end - pos;

        if run >= RUN_MIN {
            emit_literals(&mut out, &data[literal_start..pos]);
            out.push(RUN_TOKEN_BASE + (run - RUN_MIN) as u8);
            out.push(byte);
            literal_start = end;
        }
        pos = end;
    }
    emit_literals(&mut out, &data[literal_start..]);
    out
}

/// Emit pending literal bytes, splitting at the per-token cap.
fn emit_literals(out: &mut Vec<u8>, mut pending: &[u8]) {
    while !pending.is_empty() {
        let take = pending.len().min(LITERAL_MAX);
        out.push((take - 1) as u8);
        out.extend_from_slice(&pending[..take]);
        pending = &pending[take..];
    }
}

/// Decode a [`rle_forward`] stream. `None` means the stream is corrupt.
pub fn rle_inverse(data: &[u8]) -> Option<Vec<u8>> {
    let mut out = Vec::with_capacity(data.len() * 2);
    let mut pos = 0usize;

    while pos < data.len() {
        let control = data[pos];
        pos += 1;
        if control < RUN_TOKEN_BASE {
            let count = control as usize + 1;
            if data.len() - pos < count {
                return None;
            }
            out.extend_from_slice(&data[pos..pos + count]);
            pos += count;
        } else {
            let count = (control - RUN_TOKEN_BASE) as usize + RUN_MIN;
            let byte = *data.get(pos)?;
            pos += 1;
            out.resize(out.len() + count, byte);
        }
    }
    Some(out)
}

// ── Flag dispatch ────────────────────────────────────────────────────────────

/// Run the filter named by the delta/rle flag bits. At most one is set.
pub fn apply(flags: u16, data: &[u8]) -> Vec<u8> {
    if flags & BLOCK_FLAG_DELTA != 0 {
        delta_forward(data)
    } else if flags & BLOCK_FLAG_RLE != 0 {
        rle_forward(data)
    } else {
        data.to_vec()
    }
}

/// Undo [`apply`]. `None` means the filtered bytes are corrupt.
pub fn invert(flags: u16, data: &[u8]) -> Option<Vec<u8>> {
    if flags & BLOCK_FLAG_DELTA != 0 {
        Some(delta_inverse(data))
    } else if flags & BLOCK_FLAG_RLE != 0 {
        rle_inverse(data)
    } else {
        Some(data.to_vec())
    }
}
