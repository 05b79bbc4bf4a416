//! Commit log facade.
//!
//! [`CommitLog`] is the public entry point: it owns the segment manager,
//! the codec pipeline, the staging buffer pool and the sync service, and
//! exposes the five operations the surrounding engine uses — `add`,
//! `sync`, `wait_for_sync`, `discard_segments_before`/`on_flushed` and
//! `recover`. There is no process-global instance: construct one and pass
//! the handle (or an `Arc` of it) to whatever writes mutations.
//!
//! ```no_run
//! use ember_commitlog::{CommitLog, CommitLogConfig};
//!
//! # fn main() -> ember_commitlog::Result<()> {
//! let log = CommitLog::open("/var/lib/ember/commitlog", CommitLogConfig::default())?;
//! let position = log.add(b"serialized mutation")?;
//! log.wait_for_sync(position)?;
//! # Ok(())
//! # }
//! ```

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tracing::{debug, info};
use uuid::Uuid;

use crate::buffer_pool::BufferPool;
use crate::codec::CodecPipeline;
use crate::config::CommitLogConfig;
use crate::error::{CommitLogError, Result};
use crate::format::{chunk_overhead, encode_chunk, SegmentFile, SEGMENT_HEADER_SIZE};
use crate::metrics::{CommitLogMetrics, MetricsSnapshot};
use crate::position::LogPosition;
use crate::recovery::Replayer;
use crate::segment::{Segment, SegmentManager};
use crate::sync::SyncService;

#[cfg(doc)]
use crate::sync::SyncMode;

/// The commit log of a storage engine.
///
/// Many writer threads may call [`add`](CommitLog::add) concurrently. One
/// background thread pre-allocates segments; in Periodic and Group modes a
/// second runs durability barriers. Entries from a single writer get
/// strictly increasing positions in call order; entries from concurrent
/// writers are ordered by their append into the active segment, and replay
/// reproduces exactly that order.
pub struct CommitLog {
    dir: PathBuf,
    config: CommitLogConfig,
    pipeline: CodecPipeline,
    pool: BufferPool,
    manager: Arc<SegmentManager>,
    syncer: SyncService,
    metrics: Arc<CommitLogMetrics>,
    closed: AtomicBool,
}

impl CommitLog {
    /// Open (or create) a commit log in `dir`.
    ///
    /// Existing segment files are left untouched — replay them with
    /// [`recover`](CommitLog::recover) *before* opening. New segments are
    /// numbered above the highest id found on disk, so ids are never
    /// reused across restarts.
    pub fn open(dir: impl AsRef<Path>, config: CommitLogConfig) -> Result<Self> {
        config.validate()?;
        let dir = dir.as_ref().to_path_buf();
        std::fs::create_dir_all(&dir)?;

        let existing = SegmentFile::list_segment_ids(&dir)?;
        let first_id = existing.last().map_or(1, |max| max + 1);
        let log_id = *Uuid::new_v4().as_bytes();

        let metrics = Arc::new(CommitLogMetrics::new());
        let manager = Arc::new(SegmentManager::start(
            dir.clone(),
            log_id,
            config.segment_capacity,
            first_id,
            Arc::clone(&metrics),
        ));
        let syncer = SyncService::start(config.sync_mode, Arc::clone(&manager), Arc::clone(&metrics));
        let pipeline = CodecPipeline::new(config.compressor, config.encryption_key.as_ref());
        let pool = BufferPool::new(
            config.buffer_pool_size,
            config.staging_buffer_capacity,
            Arc::clone(&metrics),
        );

        info!(
            dir = %dir.display(),
            first_segment = first_id,
            mode = config.sync_mode.name(),
            compressor = config.compressor.name(),
            encrypted = pipeline.is_encrypted(),
            "commit log opened"
        );

        Ok(CommitLog {
            dir,
            config,
            pipeline,
            pool,
            manager,
            syncer,
            metrics,
            closed: AtomicBool::new(false),
        })
    }

    /// Largest entry this log accepts: an entry must fit in a single
    /// segment together with its chunk framing.
    pub fn max_entry_len(&self) -> u64 {
        self.config.segment_capacity
            - SEGMENT_HEADER_SIZE as u64
            - chunk_overhead(self.pipeline.is_encrypted())
    }

    /// Append one entry and return its position.
    ///
    /// The entry is compressed, encrypted and framed, appended to the
    /// active segment (rotating — and possibly blocking on allocation —
    /// when full), then held to the configured [`SyncMode`]'s durability
    /// guarantee before returning.
    pub fn add(&self, entry: &[u8]) -> Result<LogPosition> {
        if self.closed.load(Ordering::Acquire) {
            return Err(CommitLogError::Closed);
        }
        let limit = self.max_entry_len();
        if entry.len() as u64 > limit {
            return Err(CommitLogError::EntryTooLarge {
                size: entry.len() as u64,
                limit,
            });
        }

        let chunk = {
            let mut scratch = self.pool.acquire();
            match encode_chunk(entry, &self.pipeline, &mut scratch) {
                Ok(chunk) => chunk,
                Err(e) => {
                    // A codec failure on the live path means bytes can no
                    // longer be trusted to round-trip; halt the log.
                    self.manager.poison(format!("live-path codec failure: {e}"));
                    return Err(e.into());
                }
            }
        };

        // Incompressible input can inflate past the raw-size limit.
        let usable = self.config.segment_capacity - SEGMENT_HEADER_SIZE as u64;
        if chunk.len() as u64 > usable {
            return Err(CommitLogError::EntryTooLarge {
                size: entry.len() as u64,
                limit,
            });
        }

        let (segment, offset) = self.append_to_active(&chunk)?;
        self.metrics.record_append(chunk.len() as u64);

        let end_offset = offset + chunk.len() as u64;
        self.syncer.post_append(&segment, end_offset, chunk.len() as u64)?;

        Ok(LogPosition::new(segment.id(), offset))
    }

    fn append_to_active(&self, chunk: &[u8]) -> Result<(Arc<Segment>, u64)> {
        loop {
            let segment = self.manager.active_segment()?;
            match segment.append_chunk(chunk) {
                Ok(Some(offset)) => return Ok((segment, offset)),
                Ok(None) => self.manager.advance(segment.id()),
                Err(e) => {
                    self.manager.poison(format!("segment append failed: {e}"));
                    return Err(CommitLogError::Io(e));
                }
            }
        }
    }

    /// Force everything appended so far durable. Blocks until complete.
    ///
    /// In Periodic mode this is the only way to make durability catch up
    /// with the write cursor before the next interval tick.
    pub fn sync(&self) -> Result<()> {
        if self.closed.load(Ordering::Acquire) {
            return Err(CommitLogError::Closed);
        }
        self.syncer.request_sync()
    }

    /// Return once `position` is durable, forcing a sync if it is not
    /// already.
    pub fn wait_for_sync(&self, position: LogPosition) -> Result<()> {
        if self.closed.load(Ordering::Acquire) {
            return Err(CommitLogError::Closed);
        }
        if self.is_durable(position) {
            return Ok(());
        }
        self.syncer.request_sync()
    }

    /// Whether a position issued by this log is already durable.
    ///
    /// Positions for segments no longer live were durable before their
    /// segment was reclaimed.
    fn is_durable(&self, position: LogPosition) -> bool {
        match self.manager.find_segment(position.segment_id) {
            Some(segment) => {
                let sync_cursor = segment.sync_cursor();
                sync_cursor == segment.write_cursor() && sync_cursor > position.offset
            }
            None => true,
        }
    }

    /// Mark every segment with id below `position`'s segment Recyclable;
    /// their backing files are reclaimed asynchronously.
    ///
    /// The caller (the flush layer) is responsible for only passing
    /// positions whose preceding segments hold no unflushed data.
    pub fn discard_segments_before(&self, position: LogPosition) {
        self.manager.discard_before(position);
    }

    /// Reclamation callback for the flush layer: segments holding only
    /// data at positions before `position` are now safe to reclaim.
    pub fn on_flushed(&self, position: LogPosition) {
        self.discard_segments_before(position);
    }

    /// Replay the log in `dir` from the beginning.
    ///
    /// Consumed once at startup, before the engine accepts new writes.
    /// Pass the key the log was written with if encryption was enabled.
    pub fn recover(
        dir: impl AsRef<Path>,
        encryption_key: Option<&crate::codec::EncryptionKey>,
    ) -> Result<Replayer> {
        Replayer::open(dir.as_ref(), encryption_key)
    }

    /// Point-in-time metrics snapshot.
    pub fn metrics(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }

    /// Directory holding the segment files.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// The active configuration.
    pub fn config(&self) -> &CommitLogConfig {
        &self.config
    }

    /// Flush everything and stop the background threads.
    ///
    /// Idempotent. The final sync result is returned; the threads are
    /// stopped regardless.
    pub fn close(&self) -> Result<()> {
        if self.closed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        let sync_result = self.syncer.request_sync();
        self.syncer.shutdown();
        self.manager.shutdown();
        debug!(dir = %self.dir.display(), "commit log closed");
        sync_result
    }
}

impl Drop for CommitLog {
    fn drop(&mut self) {
        let _ = self.close();
    }
}

impl std::fmt::Debug for CommitLog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommitLog")
            .field("dir", &self.dir)
            .field("mode", &self.config.sync_mode.name())
            .field("pipeline", &self.pipeline)
            .field("closed", &self.closed.load(Ordering::Relaxed))
            .finish()
    }
}
