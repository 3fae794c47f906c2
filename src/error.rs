//! Error types for the streaming extractor.

use std::sync::Arc;

use thiserror::Error;

/// Fatal parse errors.
///
/// Every variant ends the whole task: ZIP records are chained by offsets, so
/// once one record is misread nothing after it can be trusted. The same value
/// is delivered to an open entry stream and returned to the caller, hence
/// `Clone`.
#[derive(Debug, Clone, Error)]
pub enum Error {
    /// Input ended before a fixed-size record was complete.
    #[error("malformed {record}: needed {needed} bytes but input ended with {available}")]
    MalformedHeader {
        record: &'static str,
        needed: usize,
        available: usize,
    },

    /// Unknown signature at a record boundary.
    #[error("unrecognized magic number 0x{magic:08x} at offset {offset}")]
    UnrecognizedMagic { magic: u32, offset: u64 },

    /// A declared name length exceeds the configured maximum.
    #[error("file name too long: {length} bytes (limit {limit})")]
    OversizedName { length: usize, limit: usize },

    /// Internal sizing invariant violated.
    #[error("buffer overflow: {0}")]
    BufferOverflow(String),

    /// `consume` called while another task is active on the same instance.
    #[error("each extractor can run only one task at a time")]
    ConcurrentUseViolation,

    /// `reset` called while a task is active.
    #[error("extractor is busy and cannot be reset")]
    ResetWhileRunning,

    /// The extraction stopped before the entry ended, without an error of
    /// its own.
    #[error("extraction was cancelled")]
    Cancelled,

    /// Input ended inside entry content or before its data descriptor.
    #[error("input ended inside content of {path:?}")]
    TruncatedContent { path: String },

    /// An extra field does not fit in the header's extra area.
    #[error("malformed extra field 0x{id:04x}: {reason}")]
    MalformedExtraField { id: u16, reason: String },

    /// The upstream byte source failed or was aborted.
    #[error("source error: {0}")]
    Source(Arc<anyhow::Error>),

    /// No decoder for the entry's compression method.
    #[error("unsupported compression method {0}")]
    UnsupportedCompression(u16),

    /// The decode stage rejected the entry payload.
    #[error("decompression failed: {0}")]
    Decompress(String),

    /// Invalid extractor configuration.
    #[error("invalid configuration: {0}")]
    Config(&'static str),
}

impl From<anyhow::Error> for Error {
    fn from(err: anyhow::Error) -> Self {
        Error::Source(Arc::new(err))
    }
}

/// Result alias used throughout the engine.
pub type Result<T> = std::result::Result<T, Error>;
