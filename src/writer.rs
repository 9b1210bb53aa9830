//! Compressing orchestrator: analysis, planning, parallel block encoding,
//! and container assembly.
//!
//! The orchestrator owns the output exclusively. The input buffer is shared
//! read-only across workers; each worker picks its block slice, runs the
//! pipeline on private buffers, and returns an owned block by value. Results
//! are slotted by block index, so the final file bytes never depend on
//! scheduling. Container layout: header, metadata, block index, payload
//! region (see `container.rs`).
//!
//! File output goes through a temporary file in the destination directory,
//! renamed into place on success. A cancelled or failed run leaves nothing
//! behind.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};
use tempfile::NamedTempFile;

use crate::analyzer::{analyze, AnalysisReport};
use crate::codec::CODE_HYBRID;
use crate::container::{
    ContainerHeader, FLAG_ADAPTIVE_BLOCKS, FLAG_ANALYZED, FLAG_HYBRID, FLAG_PATTERN_OPT,
    FLAG_PREPROCESSED, HEADER_SIZE,
};
use crate::error::TzpError;
use crate::index::{BLOCK_FLAG_DELTA, BLOCK_FLAG_RLE, ENTRY_SIZE};
use crate::metadata::Metadata;
use crate::pipeline::{encode_block, EncodedBlock};
use crate::planner::plan_blocks;
use crate::pool::{default_workers, run_indexed, CancelToken};
use crate::strategy::{select_strategy, Profile};

// ── Options & stats ──────────────────────────────────────────────────────────

/// Configuration for a compression run.
#[derive(Debug, Clone, Default)]
pub struct CompressOptions {
    pub profile: Profile,
    /// Worker thread count; 0 means one per logical CPU.
    pub threads: usize,
    /// Filename hint passed to the analyzer.
    pub name_hint: Option<String>,
}

/// Summary of a finished compression run.
#[derive(Debug, Clone)]
pub struct CompressStats {
    pub original_len:    u64,
    pub container_len:   u64,
    pub block_count:     u32,
    pub base_block_size: u32,
    pub report:          AnalysisReport,
}

impl CompressStats {
    /// Container bytes per original byte; 1.0 for empty input.
    pub fn ratio(&self) -> f64 {
        if self.original_len == 0 {
            return 1.0;
        }
        self.container_len as f64 / self.original_len as f64
    }
}

// ── Entry points ─────────────────────────────────────────────────────────────

/// Compress `data` into a complete container image.
pub fn compress_bytes(
    data:   &[u8],
    opts:   &CompressOptions,
    cancel: &CancelToken,
) -> Result<Vec<u8>, TzpError> {
    Ok(compress_to_vec(data, opts, cancel)?.0)
}

/// Compress `input` into `output`, atomically.
pub fn compress_file(
    input:  &Path,
    output: &Path,
    opts:   &CompressOptions,
    cancel: &CancelToken,
) -> Result<CompressStats, TzpError> {
    let data = fs::read(input)?;

    let mut opts = opts.clone();
    if opts.name_hint.is_none() {
        opts.name_hint = input
            .file_name()
            .map(|n| n.to_string_lossy().into_owned());
    }

    let (image, stats) = compress_to_vec(&data, &opts, cancel)?;
    write_atomically(output, &image)?;
    Ok(stats)
}

/// Write `bytes` to a temporary file next to `path`, then rename into place.
pub(crate) fn write_atomically(path: &Path, bytes: &[u8]) -> Result<(), TzpError> {
    let parent: PathBuf = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => PathBuf::from("."),
    };
    let mut tmp = NamedTempFile::new_in(parent)?;
    tmp.write_all(bytes)?;
    tmp.persist(path).map_err(|e| TzpError::Io(e.error))?;
    Ok(())
}

// ── Assembly ─────────────────────────────────────────────────────────────────

fn compress_to_vec(
    data:   &[u8],
    opts:   &CompressOptions,
    cancel: &CancelToken,
) -> Result<(Vec<u8>, CompressStats), TzpError> {
    let report = analyze(data, opts.name_hint.as_deref());
    let plan = plan_blocks(data, &report);
    let global_hash = truncated_sha256(data);

    // Fan the blocks out. Encoding never fails (stored fallback), so the
    // only error out of the pool is cancellation.
    let workers = if opts.threads == 0 {
        default_workers(plan.block_count())
    } else {
        opts.threads
    };
    let profile = opts.profile;
    let blocks: Vec<EncodedBlock> = run_indexed(workers, plan.block_count(), cancel, |i| {
        let (offset, len) = plan.blocks[i];
        let block = &data[offset..offset + len];
        let strategy = select_strategy(block, &report, profile);
        Ok(encode_block(block, &strategy))
    })?;

    // Assign payload offsets in block order and derive the global flags.
    let mut flags = FLAG_ANALYZED;
    if !blocks.is_empty() {
        flags |= FLAG_ADAPTIVE_BLOCKS;
    }
    if plan.snapped_boundaries > 0 {
        flags |= FLAG_PATTERN_OPT;
    }

    let mut entries = Vec::with_capacity(blocks.len());
    let mut payload_len = 0u64;
    for block in &blocks {
        let mut entry = block.entry;
        entry.payload_offset = payload_len;
        payload_len += u64::from(entry.compressed_size);

        if entry.flags & (BLOCK_FLAG_DELTA | BLOCK_FLAG_RLE) != 0 {
            flags |= FLAG_PREPROCESSED;
        }
        if entry.algorithm == CODE_HYBRID {
            flags |= FLAG_HYBRID;
        }
        entries.push(entry);
    }

    let metadata = Metadata::new(&report, opts.profile, &entries).to_bytes()?;

    let header = ContainerHeader {
        flags,
        original_len:    data.len() as u64,
        block_count:     entries.len() as u32,
        base_block_size: plan.base_block_size,
        global_hash,
        metadata_len:    metadata.len() as u32,
    };

    // Single-pass image: header, metadata, index, payload region.
    let total = HEADER_SIZE
        + metadata.len()
        + entries.len() * ENTRY_SIZE
        + payload_len as usize;
    let mut image = Vec::with_capacity(total);
    image.extend_from_slice(&header.to_bytes());
    image.extend_from_slice(&metadata);
    for entry in &entries {
        image.extend_from_slice(&entry.to_bytes());
    }
    for block in &blocks {
        image.extend_from_slice(&block.payload);
    }
    debug_assert_eq!(image.len(), total);

    let stats = CompressStats {
        original_len:    data.len() as u64,
        container_len:   image.len() as u64,
        block_count:     entries.len() as u32,
        base_block_size: plan.base_block_size,
        report,
    };
    Ok((image, stats))
}

/// First 8 bytes of SHA-256 over `data`.
pub(crate) fn truncated_sha256(data: &[u8]) -> [u8; 8] {
    let mut hasher = Sha256::new();
    hasher.update(data);
    let digest = hasher.finalize();
    let mut out = [0u8; 8];
    out.copy_from_slice(&digest[..8]);
    out
}
