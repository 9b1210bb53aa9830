//! Container reader: parse, validate, decode in parallel, verify.
//!
//! Reading proceeds strictly outside-in: the 48-byte header first, then the
//! metadata section, then the block index with its monotonicity invariants,
//! and only then any payload byte. Blocks decode independently (in parallel
//! when several are present) and are reassembled in index order; the global
//! hash is checked last, over the fully reassembled output.
//!
//! Checksum failures are fatal for the whole file. Nothing is ever written
//! for a file that fails verification.

use std::fs;
use std::io::Read;
use std::path::Path;

use crate::container::{ContainerHeader, HEADER_SIZE};
use crate::error::TzpError;
use crate::index::{validate_entries, BlockEntry, ENTRY_SIZE};
use crate::metadata::Metadata;
use crate::pipeline::decode_block;
use crate::pool::{default_workers, run_indexed, CancelToken};
use crate::writer::{truncated_sha256, write_atomically};

// ── Parsed view ──────────────────────────────────────────────────────────────

/// Header, metadata, and index of a container, before any payload work.
#[derive(Debug, Clone)]
pub struct ContainerInfo {
    pub header:   ContainerHeader,
    pub metadata: Metadata,
    pub entries:  Vec<BlockEntry>,
}

/// Summary of a finished decompression run.
#[derive(Debug, Clone)]
pub struct DecompressStats {
    pub container_len: u64,
    pub original_len:  u64,
    pub block_count:   u32,
}

// ── Parsing ──────────────────────────────────────────────────────────────────

/// Split a container image into its validated sections and the payload
/// region. No payload byte is inspected here.
pub fn parse_container(data: &[u8]) -> Result<(ContainerInfo, &[u8]), TzpError> {
    if data.len() < HEADER_SIZE {
        return Err(TzpError::UnsupportedFormat(format!(
            "{} bytes is shorter than the {HEADER_SIZE}-byte header",
            data.len()
        )));
    }
    let header = ContainerHeader::from_bytes(data[..HEADER_SIZE].try_into().unwrap())?;

    let metadata_end = HEADER_SIZE + header.metadata_len as usize;
    if metadata_end > data.len() {
        return Err(TzpError::CorruptMetadata(
            "metadata section extends past end of file".into(),
        ));
    }
    let metadata = Metadata::from_bytes(&data[HEADER_SIZE..metadata_end])?;

    let index_len = header.block_count as usize * ENTRY_SIZE;
    let index_end = metadata_end + index_len;
    if index_end > data.len() {
        return Err(TzpError::MalformedIndex(
            "block index extends past end of file".into(),
        ));
    }
    let entries: Vec<BlockEntry> = data[metadata_end..index_end]
        .chunks_exact(ENTRY_SIZE)
        .map(|chunk| BlockEntry::from_bytes(chunk.try_into().unwrap()))
        .collect();

    let payload = &data[index_end..];
    validate_entries(&entries, &header, payload.len() as u64)?;

    Ok((ContainerInfo { header, metadata, entries }, payload))
}

/// Read only the header, metadata, and index of a container file.
pub fn inspect_file(path: &Path) -> Result<ContainerInfo, TzpError> {
    let mut file = fs::File::open(path)?;
    let file_len = file.metadata()?.len();

    let mut header_buf = [0u8; HEADER_SIZE];
    file.read_exact(&mut header_buf)?;
    let header = ContainerHeader::from_bytes(&header_buf)?;

    let mut metadata_buf = vec![0u8; header.metadata_len as usize];
    file.read_exact(&mut metadata_buf)
        .map_err(|_| TzpError::CorruptMetadata("metadata section extends past end of file".into()))?;
    let metadata = Metadata::from_bytes(&metadata_buf)?;

    let index_len = header.block_count as usize * ENTRY_SIZE;
    let mut index_buf = vec![0u8; index_len];
    file.read_exact(&mut index_buf)
        .map_err(|_| TzpError::MalformedIndex("block index extends past end of file".into()))?;
    let entries: Vec<BlockEntry> = index_buf
        .chunks_exact(ENTRY_SIZE)
        .map(|chunk| BlockEntry::from_bytes(chunk.try_into().unwrap()))
        .collect();

    let consumed = HEADER_SIZE as u64 + u64::from(header.metadata_len) + index_len as u64;
    validate_entries(&entries, &header, file_len - consumed)?;

    Ok(ContainerInfo { header, metadata, entries })
}

// ── Decompression ────────────────────────────────────────────────────────────

/// Decompress a container image back to the original bytes.
pub fn decompress_bytes(
    data:    &[u8],
    threads: usize,
    cancel:  &CancelToken,
) -> Result<Vec<u8>, TzpError> {
    let (info, payload) = parse_container(data)?;
    decode_all(&info, payload, threads, cancel)
}

/// Decompress `input` into `output`, atomically.
pub fn decompress_file(
    input:   &Path,
    output:  &Path,
    threads: usize,
    cancel:  &CancelToken,
) -> Result<DecompressStats, TzpError> {
    let data = fs::read(input)?;
    let (info, payload) = parse_container(&data)?;
    let restored = decode_all(&info, payload, threads, cancel)?;
    write_atomically(output, &restored)?;
    Ok(DecompressStats {
        container_len: data.len() as u64,
        original_len:  restored.len() as u64,
        block_count:   info.header.block_count,
    })
}

/// Decode every block in parallel, reassemble in order, verify the whole.
fn decode_all(
    info:    &ContainerInfo,
    payload: &[u8],
    threads: usize,
    cancel:  &CancelToken,
) -> Result<Vec<u8>, TzpError> {
    let entries = &info.entries;
    let workers = if threads == 0 {
        default_workers(entries.len())
    } else {
        threads
    };
    let blocks: Vec<Vec<u8>> = run_indexed(workers, entries.len(), cancel, |i| {
        let entry = &entries[i];
        let start = entry.payload_offset as usize;
        let end = start + entry.compressed_size as usize;
        decode_block(i, entry, &payload[start..end])
    })?;

    let mut out = Vec::with_capacity(info.header.original_len as usize);
    for block in &blocks {
        out.extend_from_slice(block);
    }

    // The global hash covers the reassembled whole; checked only after
    // every block is back in place.
    if truncated_sha256(&out) != info.header.global_hash {
        return Err(TzpError::GlobalChecksumMismatch);
    }

    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::CancelToken;
    use crate::writer::{compress_bytes, CompressOptions};

    fn compress(data: &[u8]) -> Vec<u8> {
        compress_bytes(data, &CompressOptions::default(), &CancelToken::new()).unwrap()
    }

    #[test]
    fn short_input_is_unsupported() {
        assert!(matches!(
            decompress_bytes(b"TZP", 0, &CancelToken::new()),
            Err(TzpError::UnsupportedFormat(_))
        ));
    }

    #[test]
    fn foreign_bytes_are_unsupported() {
        let garbage = vec![0x11u8; 256];
        assert!(matches!(
            decompress_bytes(&garbage, 0, &CancelToken::new()),
            Err(TzpError::UnsupportedFormat(_))
        ));
    }

    #[test]
    fn truncated_metadata_is_detected() {
        let image = compress(b"some content worth compressing");
        let truncated = &image[..HEADER_SIZE + 4];
        assert!(matches!(
            decompress_bytes(truncated, 0, &CancelToken::new()),
            Err(TzpError::CorruptMetadata(_))
        ));
    }

    #[test]
    fn truncated_payload_is_detected() {
        let image = compress(&vec![7u8; 100_000]);
        let truncated = &image[..image.len() - 1];
        assert!(matches!(
            decompress_bytes(truncated, 0, &CancelToken::new()),
            Err(TzpError::MalformedIndex(_))
        ));
    }

    #[test]
    fn parse_exposes_sections() {
        let data = b"parse me, please".repeat(100);
        let image = compress(&data);
        let (info, payload) = parse_container(&image).unwrap();
        assert_eq!(info.header.original_len, data.len() as u64);
        assert_eq!(info.entries.len(), info.header.block_count as usize);
        let total: u64 = info.entries.iter().map(|e| u64::from(e.compressed_size)).sum();
        assert_eq!(total, payload.len() as u64);
    }
}
