//! Commit log segments.
//!
//! A [`Segment`] couples a preallocated backing file with its write and
//! sync cursors and its lifecycle state. The write path serializes on the
//! segment's file mutex, so chunk reservation and the byte write are one
//! atomic step: replay order is exactly file append order, and the sync
//! cursor can never pass bytes that were reserved but not yet written.

pub mod manager;

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};

use parking_lot::Mutex;

use crate::format::SegmentFile;

pub use manager::SegmentManager;

/// Lifecycle state of a segment.
///
/// Transitions run strictly forward: a segment is built in the background
/// (`Allocating`), promoted to `Active` when the log starts writing into
/// it, demoted to `Draining` once full, marked `Recyclable` when the flush
/// layer reports its contents durable elsewhere, and `Discarded` when its
/// backing file has been reused or deleted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum SegmentState {
    /// Being prepared by the background allocator.
    Allocating = 0,
    /// Receiving new appends.
    Active = 1,
    /// Full; holds data not yet reclaimed.
    Draining = 2,
    /// Safe to reclaim; awaiting the allocator.
    Recyclable = 3,
    /// Backing file reused or deleted.
    Discarded = 4,
}

impl SegmentState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => SegmentState::Allocating,
            1 => SegmentState::Active,
            2 => SegmentState::Draining,
            3 => SegmentState::Recyclable,
            _ => SegmentState::Discarded,
        }
    }
}

/// One bounded span of the commit log.
#[derive(Debug)]
pub struct Segment {
    id: u64,
    capacity: u64,
    path: PathBuf,
    file: Mutex<SegmentFile>,
    write_cursor: AtomicU64,
    sync_cursor: AtomicU64,
    state: AtomicU8,
}

impl Segment {
    /// Wrap a freshly built segment file. The segment starts in
    /// [`SegmentState::Allocating`]; the manager promotes it.
    pub(crate) fn new(file: SegmentFile) -> Self {
        let position = file.size();
        Segment {
            id: file.segment_id(),
            capacity: file.capacity(),
            path: file.path().to_path_buf(),
            write_cursor: AtomicU64::new(position),
            sync_cursor: AtomicU64::new(position),
            file: Mutex::new(file),
            state: AtomicU8::new(SegmentState::Allocating as u8),
        }
    }

    /// Segment id.
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Configured capacity in bytes.
    pub fn capacity(&self) -> u64 {
        self.capacity
    }

    /// Path to the backing file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Current lifecycle state.
    pub fn state(&self) -> SegmentState {
        SegmentState::from_u8(self.state.load(Ordering::Acquire))
    }

    pub(crate) fn set_state(&self, state: SegmentState) {
        self.state.store(state as u8, Ordering::Release);
    }

    /// Next free offset in the backing file.
    pub fn write_cursor(&self) -> u64 {
        self.write_cursor.load(Ordering::Acquire)
    }

    /// Highest offset known durable.
    pub fn sync_cursor(&self) -> u64 {
        self.sync_cursor.load(Ordering::Acquire)
    }

    /// Whether bytes have been appended that are not yet durable.
    pub fn has_unsynced(&self) -> bool {
        self.sync_cursor() < self.write_cursor()
    }

    /// Append an encoded chunk.
    ///
    /// Returns the chunk's offset, or `None` if the chunk does not fit —
    /// the caller then rotates to a fresh segment. The write cursor never
    /// passes the capacity.
    pub fn append_chunk(&self, chunk: &[u8]) -> std::io::Result<Option<u64>> {
        let mut file = self.file.lock();
        if file.remaining() < chunk.len() as u64 {
            return Ok(None);
        }
        let offset = file.write(chunk)?;
        self.write_cursor.store(file.size(), Ordering::Release);
        Ok(Some(offset))
    }

    /// Force appended bytes durable and advance the sync cursor.
    ///
    /// The fsync runs on a cloned handle outside the file lock so
    /// concurrent appends are not blocked for the duration of the barrier.
    /// Returns the durable cursor.
    pub fn sync(&self) -> std::io::Result<u64> {
        let (handle, cursor) = {
            let file = self.file.lock();
            (file.sync_handle()?, file.size())
        };
        handle.sync_data()?;
        self.sync_cursor.fetch_max(cursor, Ordering::AcqRel);
        Ok(cursor)
    }
}
