//! Error types for Zelos
//!
//! Provides a unified error type for all operations.

use std::path::PathBuf;

use thiserror::Error;

/// Result type alias using ZelosError
pub type Result<T> = std::result::Result<T, ZelosError>;

/// Unified error type for Zelos operations
#[derive(Debug, Error)]
pub enum ZelosError {
    // -------------------------------------------------------------------------
    // I/O Errors
    // -------------------------------------------------------------------------
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // -------------------------------------------------------------------------
    // Lookup Errors
    // -------------------------------------------------------------------------
    #[error("Document not found: {key}")]
    NotFound { key: String },

    // -------------------------------------------------------------------------
    // Storage Errors
    // -------------------------------------------------------------------------
    /// A record failed validation (checksum, framing or payload).
    /// The bytes on disk are damaged; retrying will not help.
    #[error("Corrupt record at offset {offset}: {reason}")]
    CorruptRecord { offset: u64, reason: String },

    /// A read addressed bytes past the end of the backing file.
    /// The index should never hold such a location, so this is always a bug.
    #[error("Offset out of range: {offset}+{length} exceeds file size {file_len}")]
    OffsetOutOfRange {
        offset: u64,
        length: u64,
        file_len: u64,
    },

    // -------------------------------------------------------------------------
    // Lifecycle Errors
    // -------------------------------------------------------------------------
    #[error("Collection '{0}' is closed")]
    CollectionClosed(String),

    #[error("Container is closed")]
    ContainerClosed,

    #[error("Backing file is locked by another container: {}", .0.display())]
    FileLocked(PathBuf),

    // -------------------------------------------------------------------------
    // Concurrency Errors
    // -------------------------------------------------------------------------
    #[error("Timed out waiting for the write section of collection '{0}'")]
    Busy(String),

    // -------------------------------------------------------------------------
    // Input Errors
    // -------------------------------------------------------------------------
    #[error("Invalid key: {0}")]
    InvalidKey(String),

    #[error("Invalid collection name: {0:?}")]
    InvalidCollectionName(String),

    // -------------------------------------------------------------------------
    // Serialization Errors
    // -------------------------------------------------------------------------
    #[error("Serialization error: {0}")]
    Serialization(String),

    // -------------------------------------------------------------------------
    // Configuration Errors
    // -------------------------------------------------------------------------
    #[error("Configuration error: {0}")]
    Config(String),
}

impl ZelosError {
    /// Build a `CorruptRecord` error
    pub fn corrupt(offset: u64, reason: impl Into<String>) -> Self {
        ZelosError::CorruptRecord {
            offset,
            reason: reason.into(),
        }
    }

    /// Rebase a `CorruptRecord` error onto the record's file offset.
    /// Other variants pass through unchanged.
    pub fn at_offset(self, base: u64) -> Self {
        match self {
            ZelosError::CorruptRecord { offset, reason } => ZelosError::CorruptRecord {
                offset: base + offset,
                reason,
            },
            other => other,
        }
    }

    /// Whether the operation may succeed if simply retried
    pub fn is_retryable(&self) -> bool {
        matches!(self, ZelosError::Busy(_) | ZelosError::FileLocked(_))
    }
}

impl From<serde_json::Error> for ZelosError {
    fn from(e: serde_json::Error) -> Self {
        ZelosError::Serialization(e.to_string())
    }
}
