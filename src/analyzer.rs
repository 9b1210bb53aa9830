//! Content analyzer: classifies input and estimates compressibility.
//!
//! The analyzer is a pure function `(&[u8], Option<&str>) -> AnalysisReport`
//! with no hidden state. It never fails; degenerate input yields a
//! conservative report (`unknown`, compressibility 0.5). Its output drives
//! block planning and strategy selection and is serialized into the
//! container's metadata section.
//!
//! # Sampling policy
//! Files up to 64 KiB are analyzed whole. Larger files use a deterministic
//! sample: the first, middle, and last 16 KiB concatenated. `sample_size`
//! records the bytes actually examined.

use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

/// Inputs at or below this size are analyzed in full.
pub const SAMPLE_THRESHOLD: usize = 64 * 1024;

/// Segment size for the first/middle/last sampling of large inputs.
pub const SAMPLE_SEGMENT: usize = 16 * 1024;

/// Shannon entropy at or above this is treated as incompressible.
pub const HIGH_ENTROPY: f64 = 7.5;

// ── Content class ────────────────────────────────────────────────────────────

/// Coarse classification of the input, resolved in a fixed priority order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContentClass {
    Text,
    StructuredText,
    SourceCode,
    Binary,
    Executable,
    Media,
    Compressed,
    Repetitive,
    Unknown,
}

impl ContentClass {
    /// Diagnostic name (matches the metadata serialization).
    pub fn name(self) -> &'static str {
        match self {
            ContentClass::Text           => "text",
            ContentClass::StructuredText => "structured_text",
            ContentClass::SourceCode     => "source_code",
            ContentClass::Binary         => "binary",
            ContentClass::Executable     => "executable",
            ContentClass::Media          => "media",
            ContentClass::Compressed     => "compressed",
            ContentClass::Repetitive     => "repetitive",
            ContentClass::Unknown        => "unknown",
        }
    }
}

// ── Report ───────────────────────────────────────────────────────────────────

/// Immutable analysis result, built once per input before partitioning.
#[derive(Debug, Clone, PartialEq)]
pub struct AnalysisReport {
    /// Shannon entropy of the sample, bits per byte in `[0, 8]`.
    pub entropy:            f64,
    /// Mean repeated-window ratio over window sizes 4/8/16, in `[0, 1]`.
    pub pattern_density:    f64,
    /// Mean earlier-match ratio over window sizes 32/64, in `[0, 1]`.
    pub repetition_factor:  f64,
    pub content_class:      ContentClass,
    /// Heuristic ratio in `[0, 1]`; 1 means highly compressible.
    pub compressibility:    f64,
    /// Bytes actually examined (whole input or the 48 KiB sample).
    pub sample_size:        u64,
}

impl AnalysisReport {
    /// Conservative fallback for degenerate input.
    fn conservative() -> Self {
        Self {
            entropy:           0.0,
            pattern_density:   0.0,
            repetition_factor: 0.0,
            content_class:     ContentClass::Unknown,
            compressibility:   0.5,
            sample_size:       0,
        }
    }
}

// ── Entry point ──────────────────────────────────────────────────────────────

/// Analyze `data`, optionally steered by a filename hint.
pub fn analyze(data: &[u8], name_hint: Option<&str>) -> AnalysisReport {
    if data.is_empty() {
        return AnalysisReport::conservative();
    }

    let sample = build_sample(data);
    let entropy_bits = entropy(&sample);
    let pattern_density = pattern_density(&sample);
    let repetition_factor = repetition_factor(&sample);

    let content_class = classify(
        data,
        &sample,
        name_hint,
        entropy_bits,
        repetition_factor,
    );

    let compressibility = ((8.0 - entropy_bits) / 8.0 * 0.7
        + pattern_density * 0.2
        + repetition_factor * 0.1)
        .clamp(0.0, 1.0);

    AnalysisReport {
        entropy: entropy_bits,
        pattern_density,
        repetition_factor,
        content_class,
        compressibility,
        sample_size: sample.len() as u64,
    }
}

/// First, middle, and last [`SAMPLE_SEGMENT`] bytes for large inputs;
/// the whole input otherwise.
fn build_sample(data: &[u8]) -> Vec<u8> {
    if data.len() <= SAMPLE_THRESHOLD {
        return data.to_vec();
    }
    let mid_start = data.len() / 2 - SAMPLE_SEGMENT / 2;
    let mut sample = Vec::with_capacity(3 * SAMPLE_SEGMENT);
    sample.extend_from_slice(&data[..SAMPLE_SEGMENT]);
    sample.extend_from_slice(&data[mid_start..mid_start + SAMPLE_SEGMENT]);
    sample.extend_from_slice(&data[data.len() - SAMPLE_SEGMENT..]);
    sample
}

// ── Statistics ───────────────────────────────────────────────────────────────

/// Shannon entropy in bits per byte, `0.0` for empty input.
pub fn entropy(data: &[u8]) -> f64 {
    if data.is_empty() {
        return 0.0;
    }

    let mut frequencies = [0u64; 256];
    for &byte in data {
        frequencies[byte as usize] += 1;
    }

    let len = data.len() as f64;
    let mut h = 0.0;
    for &count in &frequencies {
        if count > 0 {
            let p = count as f64 / len;
            h -= p * p.log2();
        }
    }
    h
}

/// Mean, over window sizes 4/8/16, of the ratio of windows seen at least
/// twice to distinct windows.
fn pattern_density(sample: &[u8]) -> f64 {
    let mut sum = 0.0;
    for w in [4usize, 8, 16] {
        sum += window_repeat_ratio(sample, w);
    }
    sum / 3.0
}

fn window_repeat_ratio(sample: &[u8], w: usize) -> f64 {
    if sample.len() < w {
        return 0.0;
    }
    let mut counts: HashMap<&[u8], u32> = HashMap::new();
    for window in sample.windows(w) {
        *counts.entry(window).or_insert(0) += 1;
    }
    let distinct = counts.len();
    let repeated = counts.values().filter(|&&c| c >= 2).count();
    (repeated as f64 / distinct as f64).min(1.0)
}

/// Mean, over window sizes 32/64, of the fraction of windows whose content
/// exactly matches any earlier window.
fn repetition_factor(sample: &[u8]) -> f64 {
    let mut sum = 0.0;
    for w in [32usize, 64] {
        sum += earlier_match_ratio(sample, w);
    }
    sum / 2.0
}

fn earlier_match_ratio(sample: &[u8], w: usize) -> f64 {
    if sample.len() < w {
        return 0.0;
    }
    let mut seen: HashSet<&[u8]> = HashSet::new();
    let mut matched = 0usize;
    let total = sample.len() - w + 1;
    for window in sample.windows(w) {
        if !seen.insert(window) {
            matched += 1;
        }
    }
    matched as f64 / total as f64
}

// ── Classification ───────────────────────────────────────────────────────────

fn classify(
    data: &[u8],
    sample: &[u8],
    name_hint: Option<&str>,
    entropy_bits: f64,
    repetition: f64,
) -> ContentClass {
    if entropy_bits >= HIGH_ENTROPY {
        return ContentClass::Compressed;
    }

    if let Some(class) = name_hint.and_then(extension_class) {
        return class;
    }

    if let Some(class) = magic_class(data) {
        return class;
    }

    if let Ok(text) = std::str::from_utf8(sample) {
        if looks_structured(sample) {
            return ContentClass::StructuredText;
        }
        if looks_like_source(text) {
            return ContentClass::SourceCode;
        }
        // A purely repetitive byte fill is valid UTF-8 too; the repetition
        // signal outranks a plain-text verdict.
        if repetition >= 0.5 {
            return ContentClass::Repetitive;
        }
        return ContentClass::Text;
    }

    if repetition >= 0.5 {
        return ContentClass::Repetitive;
    }

    ContentClass::Binary
}

/// Fixed table of telltale filename extensions.
fn extension_class(name: &str) -> Option<ContentClass> {
    let ext = name.rsplit('.').next()?.to_ascii_lowercase();
    match ext.as_str() {
        "jpg" | "jpeg" | "png" | "gif" | "mp3" | "mp4" | "avi" => Some(ContentClass::Media),
        "zip" | "gz" | "xz" | "7z" | "bz2" | "zst"             => Some(ContentClass::Compressed),
        "exe" | "dll" | "so"                                   => Some(ContentClass::Executable),
        _ => None,
    }
}

/// Well-known magic numbers in the first 8 bytes.
fn magic_class(data: &[u8]) -> Option<ContentClass> {
    if data.len() < 4 {
        return None;
    }
    let class = match &data[..4] {
        [0xFF, 0xD8, 0xFF, _]    => ContentClass::Media,      // JPEG
        [0x89, 0x50, 0x4E, 0x47] => ContentClass::Media,      // PNG
        [0x47, 0x49, 0x46, 0x38] => ContentClass::Media,      // GIF
        [0x52, 0x49, 0x46, 0x46] => ContentClass::Media,      // RIFF (AVI/WAV)
        [0x49, 0x44, 0x33, _]    => ContentClass::Media,      // MP3 (ID3 tag)
        [0x1F, 0x8B, _, _]       => ContentClass::Compressed, // gzip
        [0x50, 0x4B, 0x03, 0x04] => ContentClass::Compressed, // zip
        [0xFD, 0x37, 0x7A, 0x58] => ContentClass::Compressed, // xz
        [0x37, 0x7A, 0xBC, 0xAF] => ContentClass::Compressed, // 7z
        [0x42, 0x5A, 0x68, _]    => ContentClass::Compressed, // bzip2
        [0x28, 0xB5, 0x2F, 0xFD] => ContentClass::Compressed, // zstd
        [0x54, 0x5A, 0x50, 0x03] => ContentClass::Compressed, // tzp container
        [0x7F, 0x45, 0x4C, 0x46] => ContentClass::Executable, // ELF
        [0x4D, 0x5A, _, _]       => ContentClass::Executable, // PE/DOS
        _ => {
            // MP4: "ftyp" brand at offset 4.
            if data.len() >= 8 && &data[4..8] == b"ftyp" {
                ContentClass::Media
            } else {
                return None;
            }
        }
    };
    Some(class)
}

/// JSON-shaped text: either a complete JSON value, or the punctuation is
/// dominated by JSON structural characters and dense enough to matter.
fn looks_structured(sample: &[u8]) -> bool {
    if serde_json::from_slice::<serde_json::Value>(sample).is_ok() {
        return true;
    }
    let mut structural = 0usize;
    let mut candidates = 0usize;
    for &b in sample {
        if b.is_ascii_punctuation() {
            candidates += 1;
            if matches!(b, b'{' | b'}' | b'[' | b']' | b'"' | b':' | b',') {
                structural += 1;
            }
        }
    }
    // At least 80% of punctuation is structural, and structural characters
    // make up a meaningful share of the sample.
    candidates > 0 && structural * 5 >= candidates * 4 && structural * 16 >= sample.len()
}

const SOURCE_KEYWORDS: [&str; 13] = [
    "fn ", "pub ", "use ", "let ", "def ", "import ", "class ", "#include",
    "void ", "return ", "function ", "const ", "static ",
];

/// Source-shaped text: several distinct keywords, or a high semicolon
/// density per line.
fn looks_like_source(text: &str) -> bool {
    let distinct = SOURCE_KEYWORDS
        .iter()
        .filter(|kw| text.contains(**kw))
        .count();
    if distinct >= 3 {
        return true;
    }
    let lines = text.bytes().filter(|&b| b == b'\n').count() + 1;
    let semicolons = text.bytes().filter(|&b| b == b';').count();
    semicolons as f64 / lines as f64 >= 0.25 && semicolons >= 4
}
