//! Per-block strategy selection: profile + analysis -> codec and filters.
//!
//! The selector looks at one block's local entropy plus the global analysis
//! report and emits a [`BlockStrategy`]. Rules apply in a fixed order, the
//! first match wins; blocks that look incompressible are stored outright so
//! no codec time is wasted on them.

use serde::{Deserialize, Serialize};

use crate::analyzer::{entropy, AnalysisReport, ContentClass, HIGH_ENTROPY};
use crate::codec::Algorithm;
use crate::index::{BLOCK_FLAG_DELTA, BLOCK_FLAG_RLE};

// ── Profile ──────────────────────────────────────────────────────────────────

/// User-selected speed/ratio preset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Profile {
    Lightning,
    Fast,
    Balanced,
    High,
    Max,
}

impl Profile {
    /// Parse from a CLI string.
    pub fn from_name(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "lightning" => Some(Profile::Lightning),
            "fast"      => Some(Profile::Fast),
            "balanced"  => Some(Profile::Balanced),
            "high"      => Some(Profile::High),
            "max"       => Some(Profile::Max),
            _           => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Profile::Lightning => "lightning",
            Profile::Fast      => "fast",
            Profile::Balanced  => "balanced",
            Profile::High      => "high",
            Profile::Max       => "max",
        }
    }
}

impl Default for Profile {
    fn default() -> Self {
        Profile::Balanced
    }
}

// ── Strategy ─────────────────────────────────────────────────────────────────

/// What the pipeline should do to one block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockStrategy {
    /// Delta/RLE filter bits (block flag encoding; at most one set).
    pub filters:   u16,
    pub algorithm: Algorithm,
}

/// Pick the strategy for one block.
pub fn select_strategy(block: &[u8], report: &AnalysisReport, profile: Profile) -> BlockStrategy {
    let local_entropy = entropy(block);

    if local_entropy >= HIGH_ENTROPY
        || matches!(
            report.content_class,
            ContentClass::Compressed | ContentClass::Media | ContentClass::Executable
        )
    {
        return BlockStrategy {
            filters:   0,
            algorithm: Algorithm::Stored,
        };
    }

    let text_like = matches!(
        report.content_class,
        ContentClass::Text | ContentClass::SourceCode | ContentClass::StructuredText
    );

    let algorithm = match profile {
        Profile::Lightning | Profile::Fast if text_like => Algorithm::Lz4Fast,
        Profile::Lightning if report.repetition_factor >= 0.5 => Algorithm::Lz4Hc { level: 9 },
        Profile::Lightning => Algorithm::Lz4Fast,
        Profile::Fast      => Algorithm::Zstd { level: 3 },
        Profile::Balanced  => Algorithm::Zstd { level: 6 },
        Profile::High      => Algorithm::Zstd { level: 15 },
        Profile::Max if report.compressibility >= 0.5 => Algorithm::Hybrid {
            lz4_level:  9,
            zstd_level: 19,
        },
        Profile::Max => Algorithm::Zstd { level: 22 },
    };

    BlockStrategy {
        filters: filter_flags(block),
        algorithm,
    }
}

// ── Filter eligibility ───────────────────────────────────────────────────────

/// Delta and RLE eligibility; at most one bit comes back, delta winning.
fn filter_flags(block: &[u8]) -> u16 {
    if wants_delta(block) {
        BLOCK_FLAG_DELTA
    } else if wants_rle(block) {
        BLOCK_FLAG_RLE
    } else {
        0
    }
}

/// A block wants delta when it reads as 4-byte LE integers whose successive
/// differences vary at least 4x less than the raw values. Constant data has
/// zero variance both ways and is RLE territory instead.
fn wants_delta(block: &[u8]) -> bool {
    if block.len() < 64 {
        return false;
    }
    let values: Vec<f64> = block
        .chunks_exact(4)
        .map(|c| f64::from(u32::from_le_bytes(c.try_into().unwrap())))
        .collect();

    let value_var = variance(&values);
    if value_var <= 0.0 {
        return false;
    }
    let diffs: Vec<f64> = values.windows(2).map(|w| w[1] - w[0]).collect();
    variance(&diffs) * 4.0 <= value_var
}

/// A block wants RLE when one byte value covers at least 30% of it.
fn wants_rle(block: &[u8]) -> bool {
    if block.is_empty() {
        return false;
    }
    let mut counts = [0u64; 256];
    for &b in block {
        counts[b as usize] += 1;
    }
    let max = counts.iter().copied().max().unwrap_or(0);
    max * 10 >= block.len() as u64 * 3
}

fn variance(values: &[f64]) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    let mean = values.iter().sum::<f64>() / values.len() as f64;
    values.iter().map(|v| (v - mean) * (v - mean)).sum::<f64>() / values.len() as f64
}
