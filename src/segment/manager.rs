//! Segment lifecycle management.
//!
//! The manager owns the ordered set of live segments and a dedicated
//! allocator thread that keeps at most one spare segment ready ahead of
//! need. Steady-state writers therefore never wait for file creation;
//! a writer blocking here means the sustained write rate has outrun
//! allocation throughput (disk creation speed or reclamation lag), which
//! is surfaced through the allocation-stall metric rather than an error.

use std::path::PathBuf;
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Instant;

use parking_lot::{Condvar, Mutex, MutexGuard};
use tracing::{debug, error, warn};

use crate::error::{CommitLogError, Result};
use crate::format::SegmentFile;
use crate::metrics::CommitLogMetrics;
use crate::position::LogPosition;
use crate::segment::{Segment, SegmentState};

/// Owner of the segment set and the background allocator.
pub struct SegmentManager {
    shared: Arc<ManagerShared>,
    allocator: Mutex<Option<JoinHandle<()>>>,
}

struct ManagerShared {
    dir: PathBuf,
    log_id: [u8; 16],
    capacity: u64,
    metrics: Arc<CommitLogMetrics>,
    state: Mutex<ManagerState>,
    /// Writers waiting for a ready segment.
    segment_ready: Condvar,
    /// Allocator waiting for work.
    allocator_wake: Condvar,
}

struct ManagerState {
    active: Option<Arc<Segment>>,
    spare: Option<Arc<Segment>>,
    /// Full segments holding data not yet reclaimed, ascending by id.
    draining: Vec<Arc<Segment>>,
    /// Reclaimed files awaiting reuse or deletion.
    recyclable: Vec<(u64, PathBuf)>,
    next_id: u64,
    /// A stall episode is currently open.
    stalled: bool,
    failure: Option<String>,
    shutdown: bool,
}

enum AllocatorJob {
    Build {
        id: u64,
        reuse: Option<(u64, PathBuf)>,
    },
    Delete(Vec<(u64, PathBuf)>),
}

impl SegmentManager {
    /// Start a manager writing into `dir`, numbering segments from
    /// `first_id`, and spawn the allocator thread.
    pub fn start(
        dir: PathBuf,
        log_id: [u8; 16],
        capacity: u64,
        first_id: u64,
        metrics: Arc<CommitLogMetrics>,
    ) -> Self {
        let shared = Arc::new(ManagerShared {
            dir,
            log_id,
            capacity,
            metrics,
            state: Mutex::new(ManagerState {
                active: None,
                spare: None,
                draining: Vec::new(),
                recyclable: Vec::new(),
                next_id: first_id,
                stalled: false,
                failure: None,
                shutdown: false,
            }),
            segment_ready: Condvar::new(),
            allocator_wake: Condvar::new(),
        });

        let worker = Arc::clone(&shared);
        let handle = std::thread::Builder::new()
            .name("ember-commitlog-alloc".to_string())
            .spawn(move || allocator_loop(&worker))
            .expect("failed to spawn segment allocator thread");

        SegmentManager {
            shared,
            allocator: Mutex::new(Some(handle)),
        }
    }

    /// The segment currently accepting appends, promoting the spare or
    /// blocking until one is ready.
    ///
    /// Blocking here opens (or joins) a stall episode: the first blocked
    /// writer increments the allocation-stall counter and attributes the
    /// episode's duration; writers piling onto the same stall do not count
    /// again.
    pub fn active_segment(&self) -> Result<Arc<Segment>> {
        let mut st = self.shared.state.lock();
        loop {
            if let Some(msg) = &st.failure {
                return Err(CommitLogError::Poisoned(msg.clone()));
            }
            if st.shutdown {
                return Err(CommitLogError::Closed);
            }
            if let Some(active) = &st.active {
                return Ok(Arc::clone(active));
            }
            if let Some(spare) = st.spare.take() {
                spare.set_state(SegmentState::Active);
                st.active = Some(Arc::clone(&spare));
                debug!(segment_id = spare.id(), "activated commit log segment");
                self.shared.allocator_wake.notify_one();
                return Ok(spare);
            }
            self.wait_for_segment(&mut st);
        }
    }

    /// Demote the exhausted segment so the next `active_segment` call
    /// promotes its successor. A no-op if another writer already rotated.
    pub fn advance(&self, exhausted_id: u64) {
        let mut st = self.shared.state.lock();
        let rotate = match &st.active {
            Some(active) => active.id() == exhausted_id,
            None => false,
        };
        if !rotate {
            return;
        }

        let old = st.active.take().expect("checked above");
        old.set_state(SegmentState::Draining);
        debug!(
            segment_id = old.id(),
            fill = old.write_cursor(),
            "commit log segment full, rotating"
        );
        st.draining.push(old);
    }

    fn wait_for_segment(&self, st: &mut MutexGuard<'_, ManagerState>) {
        let opens_episode = !st.stalled;
        if opens_episode {
            st.stalled = true;
        }
        let blocked_at = Instant::now();

        while st.spare.is_none()
            && st.active.is_none()
            && st.failure.is_none()
            && !st.shutdown
        {
            self.shared.segment_ready.wait(st);
        }

        if opens_episode {
            st.stalled = false;
            self.shared
                .metrics
                .record_allocation_stall(blocked_at.elapsed());
        }
    }

    /// Mark every segment with id below `position`'s segment Recyclable.
    ///
    /// The allocator reclaims them asynchronously: the next needed spare is
    /// rebuilt from a reclaimed file, surplus files are deleted. Sequencing
    /// this against the flush layer is the caller's contract; the active
    /// segment is never eligible.
    pub fn discard_before(&self, position: LogPosition) {
        let mut st = self.shared.state.lock();
        let mut kept = Vec::with_capacity(st.draining.len());
        let mut reclaimed = 0usize;

        for seg in std::mem::take(&mut st.draining) {
            if seg.id() < position.segment_id {
                seg.set_state(SegmentState::Recyclable);
                st.recyclable.push((seg.id(), seg.path().to_path_buf()));
                reclaimed += 1;
            } else {
                kept.push(seg);
            }
        }
        st.draining = kept;

        if reclaimed > 0 {
            debug!(
                count = reclaimed,
                up_to = %position,
                "segments released for reclamation"
            );
            self.shared.allocator_wake.notify_one();
        }
    }

    /// Segments with unsynced bytes, oldest first, active last.
    pub fn segments_to_sync(&self) -> Vec<Arc<Segment>> {
        let st = self.shared.state.lock();
        let mut out: Vec<Arc<Segment>> = st
            .draining
            .iter()
            .filter(|s| s.has_unsynced())
            .cloned()
            .collect();
        if let Some(active) = &st.active {
            if active.has_unsynced() {
                out.push(Arc::clone(active));
            }
        }
        out
    }

    /// Look up a live (active or draining) segment by id.
    pub fn find_segment(&self, segment_id: u64) -> Option<Arc<Segment>> {
        let st = self.shared.state.lock();
        if let Some(active) = &st.active {
            if active.id() == segment_id {
                return Some(Arc::clone(active));
            }
        }
        st.draining
            .iter()
            .find(|s| s.id() == segment_id)
            .cloned()
    }

    /// Record a fatal failure: the log stops accepting writes and every
    /// blocked writer is woken with the error.
    pub fn poison(&self, msg: String) {
        let mut st = self.shared.state.lock();
        if st.failure.is_none() {
            error!(error = %msg, "commit log poisoned");
            st.failure = Some(msg);
        }
        drop(st);
        self.shared.segment_ready.notify_all();
        self.shared.allocator_wake.notify_all();
    }

    /// Error out if the log has been poisoned or shut down.
    pub fn check_healthy(&self) -> Result<()> {
        let st = self.shared.state.lock();
        if let Some(msg) = &st.failure {
            return Err(CommitLogError::Poisoned(msg.clone()));
        }
        if st.shutdown {
            return Err(CommitLogError::Closed);
        }
        Ok(())
    }

    /// Stop the allocator and release unused backing files.
    ///
    /// The active and draining segments stay on disk for recovery; the
    /// never-written spare and any reclaimed files are deleted.
    pub fn shutdown(&self) {
        let (spare_path, leftover) = {
            let mut st = self.shared.state.lock();
            if st.shutdown {
                (None, Vec::new())
            } else {
                st.shutdown = true;
                let spare_path = st.spare.take().map(|s| {
                    s.set_state(SegmentState::Discarded);
                    s.path().to_path_buf()
                });
                (spare_path, std::mem::take(&mut st.recyclable))
            }
        };

        self.shared.segment_ready.notify_all();
        self.shared.allocator_wake.notify_all();
        if let Some(handle) = self.allocator.lock().take() {
            let _ = handle.join();
        }

        if let Some(path) = spare_path {
            let _ = std::fs::remove_file(path);
        }
        for (id, path) in leftover {
            match std::fs::remove_file(&path) {
                Ok(()) => {
                    self.shared.metrics.record_segment_deleted();
                    debug!(segment_id = id, "deleted reclaimed segment at shutdown");
                }
                Err(e) => warn!(segment_id = id, error = %e, "failed to delete reclaimed segment"),
            }
        }
    }
}

fn allocator_loop(shared: &ManagerShared) {
    loop {
        let job = {
            let mut st = shared.state.lock();
            loop {
                if st.shutdown {
                    return;
                }
                if st.failure.is_none() && st.spare.is_none() {
                    let id = st.next_id;
                    st.next_id += 1;
                    break AllocatorJob::Build {
                        id,
                        reuse: st.recyclable.pop(),
                    };
                }
                if !st.recyclable.is_empty() {
                    break AllocatorJob::Delete(std::mem::take(&mut st.recyclable));
                }
                shared.allocator_wake.wait(&mut st);
            }
        };

        match job {
            AllocatorJob::Build { id, reuse } => {
                let recycled = reuse.is_some();
                let built = match &reuse {
                    Some((old_id, path)) => {
                        debug!(from = old_id, segment_id = id, "rebuilding reclaimed segment file");
                        SegmentFile::recycle(path, &shared.dir, id, shared.log_id, shared.capacity)
                    }
                    None => SegmentFile::create(&shared.dir, id, shared.log_id, shared.capacity),
                };

                match built {
                    Ok(file) => {
                        let segment = Arc::new(Segment::new(file));
                        let mut st = shared.state.lock();
                        if st.shutdown {
                            drop(st);
                            let _ = std::fs::remove_file(segment.path());
                            return;
                        }
                        if recycled {
                            shared.metrics.record_segment_recycled();
                        } else {
                            shared.metrics.record_segment_allocated();
                        }
                        debug!(segment_id = id, recycled, "spare commit log segment ready");
                        st.spare = Some(segment);
                        drop(st);
                        shared.segment_ready.notify_all();
                    }
                    Err(e) => {
                        let msg = format!("segment allocation failed: {e}");
                        error!(segment_id = id, error = %e, "segment allocation failed; halting writes");
                        let mut st = shared.state.lock();
                        st.failure = Some(msg);
                        drop(st);
                        shared.segment_ready.notify_all();
                        return;
                    }
                }
            }
            AllocatorJob::Delete(files) => {
                for (id, path) in files {
                    match std::fs::remove_file(&path) {
                        Ok(()) => {
                            shared.metrics.record_segment_deleted();
                            debug!(segment_id = id, "deleted reclaimed segment file");
                        }
                        Err(e) => {
                            warn!(segment_id = id, error = %e, "failed to delete reclaimed segment")
                        }
                    }
                }
            }
        }
    }
}
