//! Commit log error types.
//!
//! The error taxonomy is deliberately small. Anything that threatens the
//! durability contract (failed write, failed fsync, failed segment
//! allocation, live-path codec failure) is fatal: the log records the
//! failure, refuses further writes, and reports [`CommitLogError::Poisoned`]
//! from then on. Resource exhaustion is never an error — writers block and
//! the stall is visible only through metrics and latency.

use crate::codec::CodecError;

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, CommitLogError>;

/// Errors reported by the commit log.
#[derive(Debug, thiserror::Error)]
pub enum CommitLogError {
    /// The entry cannot fit in a single segment. Entries are never split
    /// across segments, so this is an immediate caller error.
    #[error("entry of {size} bytes exceeds the largest writable entry ({limit} bytes)")]
    EntryTooLarge {
        /// Size of the rejected entry in bytes.
        size: u64,
        /// Largest entry the configured segment capacity can hold.
        limit: u64,
    },

    /// An I/O operation on a segment failed. Durability can no longer be
    /// guaranteed; the log is poisoned.
    #[error("commit log I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A compression or encryption stage failed.
    #[error(transparent)]
    Codec(#[from] CodecError),

    /// The supplied configuration failed validation.
    #[error("invalid commit log configuration: {0}")]
    Config(#[from] crate::config::ConfigError),

    /// The log was closed and no longer accepts operations.
    #[error("commit log is closed")]
    Closed,

    /// An earlier fatal failure (I/O or codec) halted the log; the original
    /// failure is carried in the message.
    #[error("commit log halted by earlier fatal error: {0}")]
    Poisoned(String),
}
