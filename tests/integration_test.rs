use proptest::prelude::*;

use tzp::container::{FLAG_PATTERN_OPT, FLAG_PREPROCESSED, HEADER_SIZE};
use tzp::index::{BLOCK_FLAG_DELTA, BLOCK_FLAG_RLE, ENTRY_SIZE};
use tzp::pool::CancelToken;
use tzp::reader::{decompress_bytes, parse_container};
use tzp::writer::{compress_bytes, CompressOptions};
use tzp::{decode_block, ContainerHeader, ContentClass, Profile, TzpError};

// ── helpers ──────────────────────────────────────────────────────────────────

fn compress(data: &[u8]) -> Vec<u8> {
    compress_with(data, Profile::Balanced)
}

fn compress_with(data: &[u8], profile: Profile) -> Vec<u8> {
    let opts = CompressOptions { profile, threads: 0, name_hint: None };
    compress_bytes(data, &opts, &CancelToken::new()).unwrap()
}

fn decompress(image: &[u8]) -> Vec<u8> {
    decompress_bytes(image, 0, &CancelToken::new()).unwrap()
}

fn header_of(image: &[u8]) -> ContainerHeader {
    ContainerHeader::from_bytes(image[..HEADER_SIZE].try_into().unwrap()).unwrap()
}

/// Deterministic pseudo-random fill (xorshift64).
fn xorshift64_bytes(mut state: u64, len: usize) -> Vec<u8> {
    let mut out = Vec::with_capacity(len + 8);
    while out.len() < len {
        state ^= state << 13;
        state ^= state >> 7;
        state ^= state << 17;
        out.extend_from_slice(&state.to_le_bytes());
    }
    out.truncate(len);
    out
}

fn payload_region_start(image: &[u8]) -> usize {
    let header = header_of(image);
    HEADER_SIZE + header.metadata_len as usize + header.block_count as usize * ENTRY_SIZE
}

// ── round-trip basics ────────────────────────────────────────────────────────

#[test]
fn empty_input_roundtrips() {
    let image = compress(b"");
    let header = header_of(&image);
    assert_eq!(header.block_count, 0);
    assert_eq!(header.original_len, 0);
    // Payload region is empty: the file ends right after the metadata.
    assert_eq!(image.len(), HEADER_SIZE + header.metadata_len as usize);
    assert_eq!(decompress(&image), b"");
}

#[test]
fn single_byte_roundtrips() {
    let image = compress(b"Q");
    assert_eq!(decompress(&image), b"Q");
}

#[test]
fn block_boundary_lengths_roundtrip() {
    // The 64 KiB base applies to high-entropy input; exercise one byte
    // under, exactly at, and one byte over the block size.
    for len in [65_535usize, 65_536, 65_537] {
        let data = xorshift64_bytes(7, len);
        let restored = decompress(&compress(&data));
        assert_eq!(restored, data, "length {len}");
    }
}

#[test]
fn utf8_text_roundtrips() {
    let mut text = String::new();
    for i in 0..4000 {
        text.push_str(&format!("line {i}: même les accents väl — and more\n"));
    }
    let restored = decompress(&compress(text.as_bytes()));
    assert_eq!(restored, text.as_bytes());
}

#[test]
fn container_file_as_input_roundtrips() {
    let inner = compress(b"nested container material, compressed twice over");
    let outer = compress(&inner);
    // A container's own magic reads as already-compressed content.
    let (info, _) = parse_container(&outer).unwrap();
    assert_eq!(info.metadata.content_class, ContentClass::Compressed);
    assert_eq!(decompress(&outer), inner);
}

#[test]
fn every_profile_roundtrips() {
    let mut data = Vec::new();
    data.extend_from_slice(&b"mixed content: some text first, ".repeat(200));
    data.extend_from_slice(&vec![0u8; 20_000]);
    data.extend_from_slice(&xorshift64_bytes(11, 20_000));

    for profile in [
        Profile::Lightning,
        Profile::Fast,
        Profile::Balanced,
        Profile::High,
        Profile::Max,
    ] {
        let image = compress_with(&data, profile);
        assert_eq!(decompress(&image), data, "{profile:?}");
    }
}

// ── determinism ──────────────────────────────────────────────────────────────

#[test]
fn output_is_deterministic_across_runs_and_thread_counts() {
    let data = xorshift64_bytes(3, 500_000);
    let once = compress(&data);
    let twice = compress(&data);
    assert_eq!(once, twice);

    for threads in [1usize, 2, 8] {
        let opts = CompressOptions { profile: Profile::Balanced, threads, name_hint: None };
        let image = compress_bytes(&data, &opts, &CancelToken::new()).unwrap();
        assert_eq!(image, once, "{threads} threads");
    }
}

// ── literal scenarios ────────────────────────────────────────────────────────

#[test]
fn repeated_byte_engages_rle() {
    let data = vec![b'A'; 1024];
    let image = compress(&data);

    let (info, _) = parse_container(&image).unwrap();
    assert_eq!(info.metadata.content_class, ContentClass::Repetitive);
    assert_eq!(info.entries.len(), 1);
    let entry = &info.entries[0];
    assert_eq!(entry.flags & BLOCK_FLAG_RLE, BLOCK_FLAG_RLE);
    assert!(entry.compressed_size < 64, "payload is {} B", entry.compressed_size);
    assert!(info.header.has_flag(FLAG_PREPROCESSED));

    assert_eq!(decompress(&image), data);
}

#[test]
fn random_megabyte_is_stored_verbatim() {
    let data = xorshift64_bytes(1, 1024 * 1024);
    let image = compress(&data);

    let (info, _) = parse_container(&image).unwrap();
    assert_eq!(info.metadata.content_class, ContentClass::Compressed);
    assert!(info.metadata.entropy > 7.9);
    for entry in &info.entries {
        assert!(entry.is_stored());
        assert_eq!(entry.compressed_size, entry.original_size);
    }
    // Container size is the input plus pure framing overhead.
    let overhead = HEADER_SIZE
        + info.header.metadata_len as usize
        + info.entries.len() * ENTRY_SIZE;
    assert_eq!(image.len(), data.len() + overhead);

    assert_eq!(decompress(&image), data);
}

#[test]
fn repeated_json_classifies_structured_and_roundtrips() {
    let data = br#"{"a":1,"b":2,"c":3}"#.repeat(100_000);
    let image = compress(&data);
    let (info, _) = parse_container(&image).unwrap();
    assert_eq!(info.metadata.content_class, ContentClass::StructuredText);
    assert_eq!(decompress(&image), data);
}

#[test]
fn structured_boundaries_snap_to_closing_brace() {
    // Enough records to force at least one internal 2 MiB boundary.
    let data = br#"{"a":1,"b":2,"c":3}"#.repeat(150_000);
    let image = compress(&data);

    let (info, _) = parse_container(&image).unwrap();
    assert!(info.entries.len() >= 2);
    assert!(info.header.has_flag(FLAG_PATTERN_OPT));
    let first_len = info.entries[0].original_size as usize;
    assert_eq!(data[first_len - 1], b'}', "block 0 should end on a record");

    assert_eq!(decompress(&image), data);
}

#[test]
fn integer_sequence_engages_delta() {
    let data: Vec<u8> = (0u32..262_144).flat_map(|v| v.to_le_bytes()).collect();
    assert_eq!(data.len(), 1024 * 1024);
    let image = compress(&data);

    let (info, _) = parse_container(&image).unwrap();
    assert!(
        info.entries.iter().any(|e| e.flags & BLOCK_FLAG_DELTA != 0),
        "no block carries the delta flag"
    );
    assert!(info.header.has_flag(FLAG_PREPROCESSED));

    assert_eq!(decompress(&image), data);
}

// ── corruption detection ─────────────────────────────────────────────────────

#[test]
fn payload_byte_flip_fails_block_checksum() {
    let data = vec![b'A'; 1024];
    let mut image = compress(&data);

    let offset = payload_region_start(&image) + 10;
    assert!(offset < image.len(), "payload shorter than expected");
    image[offset] ^= 0xFF;

    let err = decompress_bytes(&image, 0, &CancelToken::new());
    assert!(matches!(
        err,
        Err(TzpError::BlockChecksumMismatch { index: 0 }) | Err(TzpError::CodecFailure { .. })
    ));
}

#[test]
fn every_payload_bit_flip_is_detected() {
    // High-entropy input keeps the single block stored, so every payload
    // byte is an original byte and every flip must trip the block CRC.
    let data = xorshift64_bytes(21, 2000);
    let image = compress(&data);
    let start = payload_region_start(&image);
    assert_eq!(image.len() - start, data.len(), "block should be stored");

    for byte in start..image.len() {
        for bit in 0..8 {
            let mut corrupt = image.clone();
            corrupt[byte] ^= 1 << bit;
            let result = decompress_bytes(&corrupt, 0, &CancelToken::new());
            assert!(
                matches!(result, Err(TzpError::BlockChecksumMismatch { index: 0 })),
                "flip of byte {byte} bit {bit} went undetected"
            );
        }
    }
}

#[test]
fn index_bit_flips_are_detected_or_harmless() {
    let data = b"index corruption probe ".repeat(200);
    let image = compress(&data);
    let header = header_of(&image);
    let index_start = HEADER_SIZE + header.metadata_len as usize;
    let index_len = header.block_count as usize * ENTRY_SIZE;

    for byte in index_start..index_start + index_len {
        for bit in 0..8 {
            let mut corrupt = image.clone();
            corrupt[byte] ^= 1 << bit;
            match decompress_bytes(&corrupt, 0, &CancelToken::new()) {
                // A flip that survives the structural checks must still
                // reproduce the input exactly (e.g. a level change within
                // the same codec band does not alter the payload bytes).
                Ok(restored) => assert_eq!(
                    restored, data,
                    "flip of byte {byte} bit {bit} silently changed the output"
                ),
                Err(
                    TzpError::MalformedIndex(_)
                    | TzpError::BlockChecksumMismatch { .. }
                    | TzpError::GlobalChecksumMismatch
                    | TzpError::CodecFailure { .. },
                ) => {}
                Err(other) => panic!("unexpected error for byte {byte} bit {bit}: {other}"),
            }
        }
    }
}

#[test]
fn header_hash_flip_fails_global_checksum() {
    let data = b"whole-file hash coverage".repeat(50);
    let mut image = compress(&data);
    // Byte 24 is the first byte of the global hash.
    image[24] ^= 0x01;
    assert!(matches!(
        decompress_bytes(&image, 0, &CancelToken::new()),
        Err(TzpError::GlobalChecksumMismatch)
    ));
}

// ── structural properties ────────────────────────────────────────────────────

#[test]
fn index_is_monotonic_and_sizes_sum() {
    let data = xorshift64_bytes(5, 300_000);
    let image = compress(&data);
    let (info, payload) = parse_container(&image).unwrap();

    let mut expected_offset = 0u64;
    let mut total = 0u64;
    for entry in &info.entries {
        assert_eq!(entry.payload_offset, expected_offset);
        expected_offset += u64::from(entry.compressed_size);
        total += u64::from(entry.original_size);
    }
    assert_eq!(expected_offset, payload.len() as u64);
    assert_eq!(total, info.header.original_len);
}

#[test]
fn any_single_block_decodes_independently() {
    let data = xorshift64_bytes(9, 200_000);
    let image = compress(&data);
    let (info, payload) = parse_container(&image).unwrap();
    assert!(info.entries.len() > 1);

    let mut input_offset = 0usize;
    for (i, entry) in info.entries.iter().enumerate() {
        let start = entry.payload_offset as usize;
        let end = start + entry.compressed_size as usize;
        let block = decode_block(i, entry, &payload[start..end]).unwrap();
        assert_eq!(
            block,
            &data[input_offset..input_offset + entry.original_size as usize],
            "block {i}"
        );
        input_offset += entry.original_size as usize;
    }
}

// ── property tests ───────────────────────────────────────────────────────────

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn arbitrary_bytes_roundtrip(data in proptest::collection::vec(any::<u8>(), 0..65_536)) {
        let image = compress(&data);
        prop_assert_eq!(decompress(&image), data);
    }

    #[test]
    fn repetitive_bytes_roundtrip(byte in any::<u8>(), len in 0usize..100_000) {
        let data = vec![byte; len];
        let image = compress(&data);
        prop_assert_eq!(decompress(&image), data);
    }
}
