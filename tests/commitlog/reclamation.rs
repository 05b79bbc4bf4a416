//! Segment Reclamation Tests
//!
//! The flush layer reports which positions are flushed elsewhere; segments
//! wholly before that point are reclaimed (reused or deleted) and never
//! reappear at replay.

use crate::common::*;
use std::time::Duration;
use tempfile::tempdir;

fn fill_segments(log: &CommitLog, entries: usize) -> Vec<LogPosition> {
    let entry_len = (log.max_entry_len() / 2) as usize;
    (0..entries)
        .map(|i| log.add(&entry_bytes(i as u64, entry_len)).unwrap())
        .collect()
}

#[test]
fn discarded_segments_never_replay() {
    let dir = tempdir().unwrap();
    let config = batch_config().with_segment_capacity(2048);
    let log = CommitLog::open(dir.path(), config).unwrap();

    // Two half-segment entries per segment: spread across several files.
    let positions = fill_segments(&log, 10);
    let cutoff = positions[6];
    assert!(
        cutoff.segment_id > positions[0].segment_id,
        "test needs the cutoff in a later segment"
    );

    log.discard_segments_before(cutoff);
    log.close().unwrap();

    let result = CommitLog::recover(dir.path(), None).unwrap().read_all();
    assert_eq!(result.stop, ReplayStop::EndOfLog);
    assert!(!result.entries.is_empty());
    for (pos, _) in &result.entries {
        assert!(
            pos.segment_id >= cutoff.segment_id,
            "entry at {pos} replayed from a discarded segment (cutoff {cutoff})"
        );
    }
}

#[test]
fn on_flushed_is_the_reclamation_callback() {
    let dir = tempdir().unwrap();
    let config = batch_config().with_segment_capacity(2048);
    let log = CommitLog::open(dir.path(), config).unwrap();

    let positions = fill_segments(&log, 8);
    let cutoff = *positions.last().unwrap();
    log.on_flushed(cutoff);
    log.close().unwrap();

    for (pos, _) in CommitLog::recover(dir.path(), None).unwrap() {
        assert!(pos.segment_id >= cutoff.segment_id);
    }
}

#[test]
fn reclaimed_files_are_reused_or_deleted() {
    let dir = tempdir().unwrap();
    let config = batch_config().with_segment_capacity(2048);
    let log = CommitLog::open(dir.path(), config).unwrap();

    let positions = fill_segments(&log, 12);
    log.discard_segments_before(*positions.last().unwrap());

    // Give the allocator time to rebuild or delete the reclaimed files.
    std::thread::sleep(Duration::from_millis(300));
    let snap = log.metrics();
    assert!(
        snap.segments_recycled + snap.segments_deleted > 0,
        "reclaimed backing files must be reused or deleted"
    );
    log.close().unwrap();

    // Nothing before the cutoff is left on disk.
    let remaining = segment_paths(dir.path());
    assert!(!remaining.is_empty());
    assert!(remaining.len() < 6, "reclaimed files must not accumulate");
}

#[test]
fn discard_of_the_active_segment_is_a_no_op() {
    let dir = tempdir().unwrap();
    let log = CommitLog::open(dir.path(), batch_config()).unwrap();

    let entry = entry_bytes(1, 100);
    let pos = log.add(&entry).unwrap();
    // The cutoff names the active segment itself: nothing is before it.
    log.discard_segments_before(pos);
    log.close().unwrap();

    let result = CommitLog::recover(dir.path(), None).unwrap().read_all();
    assert_eq!(result.entries.len(), 1);
    assert_eq!(result.entries[0].1, entry);
}
