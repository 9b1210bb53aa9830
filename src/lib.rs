//! # tzp — adaptive block-compression container, reference implementation
//!
//! Format guarantees (frozen in v3.1):
//! - All numeric fields are little-endian; never negotiated
//! - Fixed 48-byte header: magic "TZP\3", version, lengths, global hash
//! - Every block is independently decodable from its 24-byte index entry
//!   and payload slice alone
//! - Every index entry carries a CRC32 of the ORIGINAL block bytes, so
//!   corruption is caught end-to-end regardless of codec or preprocessing
//! - The global hash (first 8 bytes of SHA-256 of the input) seals the
//!   reassembled whole
//! - The algorithm set is closed and version-gated; readers reject unknown
//!   codes instead of negotiating
//! - Output bytes are deterministic for a fixed profile: scheduling may
//!   reorder work, never the file

pub mod analyzer;
pub mod codec;
pub mod container;
pub mod error;
pub mod filter;
pub mod index;
pub mod metadata;
pub mod pipeline;
pub mod planner;
pub mod pool;
pub mod reader;
pub mod strategy;
pub mod writer;

// Flat re-exports for the most common types.
pub use analyzer::{analyze, AnalysisReport, ContentClass};
pub use codec::{Algorithm, CodecError};
pub use container::{ContainerHeader, HEADER_SIZE, MAGIC};
pub use error::TzpError;
pub use index::{BlockEntry, ENTRY_SIZE};
pub use metadata::Metadata;
pub use pipeline::{decode_block, encode_block, EncodedBlock};
pub use planner::{plan_blocks, BlockPlan};
pub use pool::CancelToken;
pub use reader::{decompress_bytes, decompress_file, inspect_file, ContainerInfo};
pub use strategy::{select_strategy, BlockStrategy, Profile};
pub use writer::{compress_bytes, compress_file, CompressOptions, CompressStats};
