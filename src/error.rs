//! Crate-wide error type and the CLI exit-code mapping.

use std::io;
use thiserror::Error;

/// Every error the engine can surface to a caller.
///
/// Compression-side codec failures never appear here: the block pipeline
/// recovers them locally by falling back to a stored block. A
/// [`TzpError::CodecFailure`] can therefore only originate on the decode
/// side, where no fallback exists.
#[derive(Error, Debug)]
pub enum TzpError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Magic or version mismatch, or reserved header bits set.
    #[error("not a tzp container: {0}")]
    UnsupportedFormat(String),

    /// The metadata section failed to parse, or carried unknown keys.
    #[error("corrupt metadata section: {0}")]
    CorruptMetadata(String),

    /// A block index entry violates the layout invariants.
    #[error("malformed block index: {0}")]
    MalformedIndex(String),

    /// A decoded block did not match the CRC32 stored in its index entry.
    #[error("block {index} checksum mismatch")]
    BlockChecksumMismatch { index: usize },

    /// The reassembled output did not match the header's global hash.
    #[error("global checksum mismatch")]
    GlobalChecksumMismatch,

    /// A codec rejected its input while decoding a block.
    #[error("codec failure (algorithm {algorithm:#04x}, level {level}): {message}")]
    CodecFailure {
        algorithm: u8,
        level:     u8,
        message:   String,
    },

    /// The cancellation token was triggered; no output was produced.
    #[error("operation cancelled")]
    Cancelled,

    /// Invalid invocation (bad arguments, refusing to overwrite, ...).
    #[error("{0}")]
    Usage(String),
}

impl TzpError {
    /// Process exit code: 0 success, 1 usage, 2 I/O, 3 corrupt input, 4 cancelled.
    pub fn exit_code(&self) -> i32 {
        match self {
            TzpError::Usage(_)     => 1,
            TzpError::Io(_)        => 2,
            TzpError::Cancelled    => 4,
            _                      => 3,
        }
    }
}
