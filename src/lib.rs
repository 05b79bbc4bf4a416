//! Segmented commit log for the Ember storage engine.
//!
//! Every mutation is made crash-durable here before it is acknowledged,
//! independent of when the in-memory tables are flushed to long-term
//! storage. This crate covers the commit-log segment lifecycle and sync
//! engine:
//!
//! - Segments: preallocated, recycled backing files allocated ahead of
//!   need by a dedicated background thread
//! - Codec pipeline: pluggable compression (none/LZ4/Snappy/Deflate/Zstd)
//!   and AES-256-GCM encryption with a fresh IV per chunk
//! - Sync disciplines: batch, periodic and group-commit durability
//! - Backpressure: writers block (never error) when segment or staging
//!   buffer supply runs out, surfaced through the metrics registry
//! - Replay: forward-only recovery that truncates at a torn tail and
//!   stops (never skips) at corruption
//!
//! Mutation encoding, the memtable and its flush policy, compaction and
//! the request path are external collaborators: they hand this crate
//! serialized entry bytes and flush notifications, and get back durable
//! [`LogPosition`]s and a replay stream.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod buffer_pool;
pub mod codec;
pub mod commit_log;
pub mod config;
pub mod error;
pub mod format;
pub mod metrics;
pub mod position;
pub mod recovery;
pub mod segment;
pub mod sync;

pub use buffer_pool::{BufferLease, BufferPool};
pub use codec::{CodecError, CompressorKind, EncryptionKey};
pub use commit_log::CommitLog;
pub use config::{CommitLogConfig, ConfigError};
pub use error::{CommitLogError, Result};
pub use metrics::{CommitLogMetrics, MetricsSnapshot};
pub use position::LogPosition;
pub use recovery::{Replayer, ReplayResult, ReplayStop, TruncateInfo};
pub use segment::{Segment, SegmentState};
pub use sync::SyncMode;
