//! Commit log configuration.
//!
//! Chosen once at startup and immutable for the run. Segments already on
//! disk keep whatever codec wrote them (each chunk records its own codec
//! identity), so a config change only affects segments created afterwards.

use std::time::Duration;

use crate::codec::{CompressorKind, EncryptionKey};
use crate::format::SEGMENT_HEADER_SIZE;
use crate::sync::SyncMode;

/// Commit log configuration parameters.
#[derive(Debug, Clone)]
pub struct CommitLogConfig {
    /// Maximum segment size in bytes (default: 32 MiB). Segments are
    /// preallocated to this size; an entry must fit in a single segment.
    pub segment_capacity: u64,

    /// Chunk compressor (default: none).
    pub compressor: CompressorKind,

    /// Chunk encryption key. `None` disables encryption.
    pub encryption_key: Option<EncryptionKey>,

    /// Durability discipline (default: periodic, 10 s interval).
    pub sync_mode: SyncMode,

    /// Maximum concurrently checked-out staging buffers (default: 3).
    pub buffer_pool_size: usize,

    /// Initial capacity of each staging buffer (default: 128 KiB).
    pub staging_buffer_capacity: usize,
}

impl Default for CommitLogConfig {
    fn default() -> Self {
        CommitLogConfig {
            segment_capacity: 32 * 1024 * 1024,
            compressor: CompressorKind::None,
            encryption_key: None,
            sync_mode: SyncMode::default(),
            buffer_pool_size: 3,
            staging_buffer_capacity: 128 * 1024,
        }
    }
}

impl CommitLogConfig {
    /// Create a configuration with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set segment capacity (builder pattern).
    pub fn with_segment_capacity(mut self, bytes: u64) -> Self {
        self.segment_capacity = bytes;
        self
    }

    /// Set the chunk compressor.
    pub fn with_compressor(mut self, compressor: CompressorKind) -> Self {
        self.compressor = compressor;
        self
    }

    /// Enable encryption with the given key.
    pub fn with_encryption(mut self, key: EncryptionKey) -> Self {
        self.encryption_key = Some(key);
        self
    }

    /// Set the durability discipline.
    pub fn with_sync_mode(mut self, mode: SyncMode) -> Self {
        self.sync_mode = mode;
        self
    }

    /// Set the staging buffer pool size.
    pub fn with_buffer_pool_size(mut self, buffers: usize) -> Self {
        self.buffer_pool_size = buffers;
        self
    }

    /// Set the initial staging buffer capacity.
    pub fn with_staging_buffer_capacity(mut self, bytes: usize) -> Self {
        self.staging_buffer_capacity = bytes;
        self
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.segment_capacity < 1024 {
            return Err(ConfigError::SegmentCapacityTooSmall);
        }
        if self.segment_capacity <= SEGMENT_HEADER_SIZE as u64 {
            return Err(ConfigError::SegmentCapacityTooSmall);
        }
        if self.buffer_pool_size == 0 {
            return Err(ConfigError::EmptyBufferPool);
        }
        match self.sync_mode {
            SyncMode::Periodic { interval } if interval.is_zero() => {
                return Err(ConfigError::ZeroSyncInterval);
            }
            SyncMode::Group { timeout, threshold_bytes } => {
                if timeout.is_zero() {
                    return Err(ConfigError::ZeroGroupTimeout);
                }
                if threshold_bytes == 0 {
                    return Err(ConfigError::ZeroGroupThreshold);
                }
            }
            _ => {}
        }
        Ok(())
    }

    /// Configuration tuned for tests: tiny segments for fast rotation and
    /// batch durability for determinism.
    pub fn for_testing() -> Self {
        CommitLogConfig {
            segment_capacity: 64 * 1024,
            compressor: CompressorKind::None,
            encryption_key: None,
            sync_mode: SyncMode::Batch,
            buffer_pool_size: 2,
            staging_buffer_capacity: 16 * 1024,
        }
    }
}

/// Configuration validation errors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    /// Segment capacity must be at least 1 KiB.
    #[error("segment capacity must be at least 1KiB")]
    SegmentCapacityTooSmall,

    /// At least one staging buffer is required.
    #[error("buffer pool must hold at least one buffer")]
    EmptyBufferPool,

    /// The periodic sync interval must be nonzero.
    #[error("periodic sync interval must be nonzero")]
    ZeroSyncInterval,

    /// The group commit timeout must be nonzero.
    #[error("group commit timeout must be nonzero")]
    ZeroGroupTimeout,

    /// The group commit byte threshold must be nonzero.
    #[error("group commit byte threshold must be nonzero")]
    ZeroGroupThreshold,
}
