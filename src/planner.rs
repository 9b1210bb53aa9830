//! Adaptive block planner: partitions the input into compression blocks.
//!
//! The base block size is chosen from the analysis report, then the input is
//! cut into base-sized chunks (last chunk may be shorter). For structured
//! text, each internal boundary is snapped to a nearby record delimiter so
//! blocks end on line feeds or closing brackets, which keeps records whole
//! and helps the codec.
//!
//! The planner is deterministic: identical input and report always produce
//! the identical plan.

use crate::analyzer::{AnalysisReport, ContentClass};

/// Smallest base block size: 64 KiB.
pub const BLOCK_64K: u32 = 64 * 1024;
/// Default base for text-like and plain binary content: 1 MiB.
pub const BLOCK_1M: u32 = 1024 * 1024;
/// Base for structured text: 2 MiB.
pub const BLOCK_2M: u32 = 2 * 1024 * 1024;
/// Base for highly repetitive or highly compressible content: 8 MiB.
pub const BLOCK_8M: u32 = 8 * 1024 * 1024;

// ── Plan ─────────────────────────────────────────────────────────────────────

/// Ordered `(offset, length)` partition of `[0, input_len)`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockPlan {
    pub base_block_size: u32,
    pub blocks:          Vec<(usize, usize)>,
    /// Internal boundaries moved by delimiter snapping.
    pub snapped_boundaries: usize,
}

impl BlockPlan {
    pub fn block_count(&self) -> usize {
        self.blocks.len()
    }
}

// ── Planning ─────────────────────────────────────────────────────────────────

/// Base block size for a given input length and analysis report.
///
/// The text-like classes keep their own bases no matter how compressible
/// the input scores; delimiter snapping is a property of the class, and an
/// oversized base would collapse medium inputs into a single block. The
/// compressibility override applies only to classes with no base of their
/// own.
pub fn base_block_size(input_len: usize, report: &AnalysisReport) -> u32 {
    if input_len < BLOCK_64K as usize {
        return BLOCK_64K;
    }
    match report.content_class {
        ContentClass::Compressed | ContentClass::Media => BLOCK_64K,
        ContentClass::StructuredText => BLOCK_2M,
        ContentClass::Text | ContentClass::SourceCode => BLOCK_1M,
        ContentClass::Repetitive => BLOCK_8M,
        _ if report.compressibility >= 0.7 => BLOCK_8M,
        // binary (including low compressibility), executable, unknown
        _ => BLOCK_1M,
    }
}

/// Partition `data` into the block plan described by `report`.
pub fn plan_blocks(data: &[u8], report: &AnalysisReport) -> BlockPlan {
    let base = base_block_size(data.len(), report);

    if data.is_empty() {
        return BlockPlan {
            base_block_size: base,
            blocks: Vec::new(),
            snapped_boundaries: 0,
        };
    }

    let base_usize = base as usize;
    let mut boundaries: Vec<usize> = (base_usize..data.len()).step_by(base_usize).collect();
    let mut snapped = 0usize;

    if report.content_class == ContentClass::StructuredText {
        let window = base_usize / 16;
        let mut prev = 0usize;
        for boundary in boundaries.iter_mut() {
            if let Some(adjusted) = snap_boundary(data, *boundary, window, prev) {
                if adjusted != *boundary {
                    snapped += 1;
                }
                *boundary = adjusted;
            }
            prev = *boundary;
        }
    }

    let mut blocks = Vec::with_capacity(boundaries.len() + 1);
    let mut start = 0usize;
    for &boundary in &boundaries {
        blocks.push((start, boundary - start));
        start = boundary;
    }
    blocks.push((start, data.len() - start));

    BlockPlan {
        base_block_size: base,
        blocks,
        snapped_boundaries: snapped,
    }
}

/// Snap one internal boundary to the nearest delimiter within `±window`.
///
/// A line feed wins; failing that, the nearest `}` or `]`. The snapped
/// boundary sits just after the delimiter so the record stays in the
/// preceding block. Returns `None` when no snap keeps boundaries strictly
/// increasing, in which case the original boundary stands.
fn snap_boundary(data: &[u8], boundary: usize, window: usize, prev: usize) -> Option<usize> {
    let lo = boundary.saturating_sub(window).max(prev + 1);
    let hi = (boundary + window).min(data.len() - 1);
    if lo > hi {
        return None;
    }

    let candidate = nearest_byte(data, boundary, lo, hi, |b| b == b'\n')
        .or_else(|| nearest_byte(data, boundary, lo, hi, |b| b == b'}' || b == b']'))?;

    // Delimiter ends the preceding block.
    let snapped = candidate + 1;
    if snapped > prev && snapped < data.len() {
        Some(snapped)
    } else {
        None
    }
}

/// Index in `[lo, hi]` closest to `center` whose byte satisfies `pred`.
fn nearest_byte(
    data: &[u8],
    center: usize,
    lo: usize,
    hi: usize,
    pred: impl Fn(u8) -> bool,
) -> Option<usize> {
    for distance in 0..=(hi - lo) {
        if center >= distance && center - distance >= lo && pred(data[center - distance]) {
            return Some(center - distance);
        }
        if center + distance <= hi && pred(data[center + distance]) {
            return Some(center + distance);
        }
    }
    None
}
