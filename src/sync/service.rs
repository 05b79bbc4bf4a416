//! Sync discipline execution.
//!
//! One [`SyncService`] per commit log runs the configured discipline.
//! Batch mode syncs on the calling thread; Periodic and Group modes run a
//! dedicated flusher thread, since a durability barrier is blocking I/O
//! and must not share an execution context with request-serving code.
//! A failed barrier poisons the whole log: durability is never silently
//! downgraded or retried.

use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Instant;

use parking_lot::{Condvar, Mutex, MutexGuard};
use tracing::{error, trace};

use crate::error::{CommitLogError, Result};
use crate::metrics::CommitLogMetrics;
use crate::segment::{Segment, SegmentManager};
use crate::sync::SyncMode;

pub(crate) struct SyncService {
    shared: Arc<SyncShared>,
    flusher: Mutex<Option<JoinHandle<()>>>,
}

struct SyncShared {
    mode: SyncMode,
    manager: Arc<SegmentManager>,
    metrics: Arc<CommitLogMetrics>,
    state: Mutex<SyncState>,
    /// Wakes the flusher: first write of an epoch, threshold reached,
    /// explicit sync, shutdown.
    wake: Condvar,
    /// Wakes writers waiting for their epoch to complete.
    epoch_done: Condvar,
}

struct SyncState {
    /// Open coalescing epoch (group mode).
    epoch: u64,
    /// All epochs at or below this are durable.
    completed: u64,
    /// Bytes appended into the open epoch.
    pending_bytes: u64,
    /// An explicit sync wants the open epoch closed now.
    sync_requested: bool,
    failure: Option<String>,
    shutdown: bool,
}

impl SyncService {
    pub(crate) fn start(
        mode: SyncMode,
        manager: Arc<SegmentManager>,
        metrics: Arc<CommitLogMetrics>,
    ) -> Self {
        let shared = Arc::new(SyncShared {
            mode,
            manager,
            metrics,
            state: Mutex::new(SyncState {
                epoch: 1,
                completed: 0,
                pending_bytes: 0,
                sync_requested: false,
                failure: None,
                shutdown: false,
            }),
            wake: Condvar::new(),
            epoch_done: Condvar::new(),
        });

        let flusher = if mode.runs_background_flusher() {
            let worker = Arc::clone(&shared);
            let handle = std::thread::Builder::new()
                .name("ember-commitlog-sync".to_string())
                .spawn(move || match worker.mode {
                    SyncMode::Periodic { interval } => periodic_loop(&worker, interval),
                    SyncMode::Group { timeout, threshold_bytes } => {
                        group_loop(&worker, timeout, threshold_bytes)
                    }
                    SyncMode::Batch => unreachable!("batch mode runs no flusher"),
                })
                .expect("failed to spawn commit log sync thread");
            Some(handle)
        } else {
            None
        };

        SyncService {
            shared,
            flusher: Mutex::new(flusher),
        }
    }

    /// Apply the discipline after a chunk landed at `end_offset` in
    /// `segment`. Blocks per mode; returns once the mode's guarantee holds.
    pub(crate) fn post_append(
        &self,
        segment: &Segment,
        end_offset: u64,
        appended: u64,
    ) -> Result<()> {
        match self.shared.mode {
            SyncMode::Batch => self.batch_sync(segment, end_offset),
            SyncMode::Periodic { .. } => Ok(()),
            SyncMode::Group { threshold_bytes, .. } => {
                self.group_wait(appended, threshold_bytes)
            }
        }
    }

    /// Force everything appended so far durable. Valid in every mode.
    pub(crate) fn request_sync(&self) -> Result<()> {
        match self.shared.mode {
            SyncMode::Group { .. } => self.group_request_sync(),
            _ => {
                let mut st = self.shared.state.lock();
                if let Some(msg) = &st.failure {
                    return Err(CommitLogError::Poisoned(msg.clone()));
                }
                self.barrier(&mut st)
            }
        }
    }

    fn batch_sync(&self, segment: &Segment, end_offset: u64) -> Result<()> {
        if segment.sync_cursor() >= end_offset {
            return Ok(());
        }

        let _pending = self.shared.metrics.writer_waiting();
        let mut st = self.shared.state.lock();
        if let Some(msg) = &st.failure {
            return Err(CommitLogError::Poisoned(msg.clone()));
        }
        // A writer that queued behind us may already have carried our
        // bytes past the barrier.
        if segment.sync_cursor() >= end_offset {
            return Ok(());
        }
        self.barrier(&mut st)
    }

    /// Run one durability barrier while holding the sync lock; on failure
    /// poison the log and report the I/O error to this caller.
    fn barrier(&self, st: &mut MutexGuard<'_, SyncState>) -> Result<()> {
        match sync_segments(&self.shared.manager, &self.shared.metrics) {
            Ok(()) => Ok(()),
            Err(e) => {
                let msg = format!("durability barrier failed: {e}");
                error!(error = %e, "durability barrier failed; halting writes");
                st.failure = Some(msg.clone());
                self.shared.manager.poison(msg);
                Err(CommitLogError::Io(e))
            }
        }
    }

    fn group_wait(&self, appended: u64, threshold_bytes: u64) -> Result<()> {
        let mut st = self.shared.state.lock();
        if let Some(msg) = &st.failure {
            return Err(CommitLogError::Poisoned(msg.clone()));
        }
        if st.shutdown {
            return Err(CommitLogError::Closed);
        }

        let my_epoch = st.epoch;
        let first_of_epoch = st.pending_bytes == 0;
        st.pending_bytes += appended;
        if first_of_epoch || st.pending_bytes >= threshold_bytes {
            self.shared.wake.notify_one();
        }

        // Durability is not abandoned once requested: even during shutdown
        // the flusher drains every open epoch (or records a failure)
        // before exiting, so this wait always terminates.
        let _pending = self.shared.metrics.writer_waiting();
        while st.completed < my_epoch {
            if let Some(msg) = &st.failure {
                return Err(CommitLogError::Poisoned(msg.clone()));
            }
            self.shared.epoch_done.wait(&mut st);
        }
        Ok(())
    }

    fn group_request_sync(&self) -> Result<()> {
        let mut st = self.shared.state.lock();
        if let Some(msg) = &st.failure {
            return Err(CommitLogError::Poisoned(msg.clone()));
        }
        if st.shutdown {
            return Err(CommitLogError::Closed);
        }

        let my_epoch = st.epoch;
        st.sync_requested = true;
        self.shared.wake.notify_one();

        let _pending = self.shared.metrics.writer_waiting();
        while st.completed < my_epoch {
            if let Some(msg) = &st.failure {
                return Err(CommitLogError::Poisoned(msg.clone()));
            }
            self.shared.epoch_done.wait(&mut st);
        }
        Ok(())
    }

    /// Stop the flusher thread. Group mode drains the open epoch first.
    pub(crate) fn shutdown(&self) {
        {
            let mut st = self.shared.state.lock();
            st.shutdown = true;
        }
        self.shared.wake.notify_all();
        self.shared.epoch_done.notify_all();
        if let Some(handle) = self.flusher.lock().take() {
            let _ = handle.join();
        }
    }
}

/// fsync every segment with unsynced bytes, oldest first.
fn sync_segments(manager: &SegmentManager, metrics: &CommitLogMetrics) -> std::io::Result<()> {
    let segments = manager.segments_to_sync();
    if segments.is_empty() {
        return Ok(());
    }

    let start = Instant::now();
    for segment in &segments {
        segment.sync()?;
    }
    metrics.record_sync(start.elapsed());
    trace!(segments = segments.len(), "durability barrier complete");
    Ok(())
}

fn periodic_loop(shared: &SyncShared, interval: std::time::Duration) {
    let mut st = shared.state.lock();
    loop {
        if st.shutdown {
            return;
        }
        let _ = shared.wake.wait_for(&mut st, interval);
        if st.shutdown {
            return;
        }

        let result = MutexGuard::unlocked(&mut st, || {
            sync_segments(&shared.manager, &shared.metrics)
        });
        if let Err(e) = result {
            let msg = format!("periodic durability barrier failed: {e}");
            error!(error = %e, "periodic durability barrier failed; halting writes");
            st.failure = Some(msg.clone());
            shared.manager.poison(msg);
            return;
        }
    }
}

fn group_loop(shared: &SyncShared, timeout: std::time::Duration, threshold_bytes: u64) {
    let mut st = shared.state.lock();
    loop {
        if st.shutdown && st.pending_bytes == 0 && !st.sync_requested {
            return;
        }
        if st.pending_bytes == 0 && !st.sync_requested {
            shared.wake.wait(&mut st);
            continue;
        }

        // An epoch is open: let writers coalesce for up to `timeout`
        // unless the threshold already fired or shutdown is draining.
        if st.pending_bytes < threshold_bytes && !st.sync_requested && !st.shutdown {
            let _ = shared.wake.wait_for(&mut st, timeout);
        }

        let closing = st.epoch;
        st.epoch += 1;
        st.pending_bytes = 0;
        st.sync_requested = false;

        let result = MutexGuard::unlocked(&mut st, || {
            sync_segments(&shared.manager, &shared.metrics)
        });
        match result {
            Ok(()) => {
                st.completed = closing;
                shared.epoch_done.notify_all();
            }
            Err(e) => {
                let msg = format!("group durability barrier failed: {e}");
                error!(error = %e, "group durability barrier failed; halting writes");
                st.failure = Some(msg.clone());
                shared.manager.poison(msg);
                shared.epoch_done.notify_all();
                return;
            }
        }
    }
}
