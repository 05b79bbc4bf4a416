//! Crash Recovery Tests
//!
//! Simulates torn writes and on-disk corruption by damaging segment files
//! behind the log's back, then verifies replay recovers the valid prefix
//! and stops — never skips — at damage.

use crate::common::*;
use tempfile::tempdir;

/// Write `count` batch-mode entries and return the log's entries plus the
/// single segment file they landed in.
fn written_log(dir: &std::path::Path, count: u64) -> (Vec<Vec<u8>>, std::path::PathBuf) {
    let log = CommitLog::open(dir, batch_config()).unwrap();
    let entries: Vec<Vec<u8>> = (0..count).map(|i| entry_bytes(i, 120)).collect();
    for entry in &entries {
        log.add(entry).unwrap();
    }
    log.close().unwrap();

    let paths = segment_paths(dir);
    assert_eq!(paths.len(), 1, "all entries must fit one segment");
    (entries, paths[0].clone())
}

#[test]
fn torn_tail_recovers_the_prefix() {
    let dir = tempdir().unwrap();
    let (entries, segment) = written_log(dir.path(), 10);

    // Zero out the data region from mid-chunk on: the last chunks become a
    // torn tail indistinguishable from a crash mid-write. The file is
    // preallocated, so the damage must land inside the written prefix.
    let size = file_size(&segment);
    let cut: u64 = 32 + 400;
    overwrite_at(&segment, cut, &vec![0u8; (size - cut) as usize]);

    let replayer = CommitLog::recover(dir.path(), None).unwrap();
    let result = replayer.read_all();

    assert!(
        matches!(result.stop, ReplayStop::TornTail { .. } | ReplayStop::EndOfLog),
        "a zeroed tail is a torn write, not corruption: {:?}",
        result.stop
    );
    assert!(!result.entries.is_empty(), "the intact prefix must survive");
    assert!(result.entries.len() < entries.len());
    for (i, (_, entry)) in result.entries.iter().enumerate() {
        assert_eq!(entry, &entries[i], "prefix entry {} differs", i);
    }
}

#[test]
fn truncated_segment_recovers_the_prefix() {
    let dir = tempdir().unwrap();
    let (entries, segment) = written_log(dir.path(), 10);

    // Cut inside the written chunks, not the preallocated zero tail.
    truncate_file(&segment, 32 + 700);

    let result = CommitLog::recover(dir.path(), None).unwrap().read_all();
    assert!(!result.entries.is_empty());
    assert!(result.entries.len() < entries.len());
    for (i, (_, entry)) in result.entries.iter().enumerate() {
        assert_eq!(entry, &entries[i]);
    }
}

#[test]
fn mid_file_corruption_stops_replay_without_skipping() {
    let dir = tempdir().unwrap();
    let (_, segment) = written_log(dir.path(), 10);

    // Flip bytes early in the data region, leaving plenty of intact chunks
    // after the damage.
    overwrite_at(&segment, 200, &[0xFF; 16]);

    let replayer = CommitLog::recover(dir.path(), None).unwrap();
    let result = replayer.read_all();

    assert!(
        matches!(result.stop, ReplayStop::CorruptChunk { .. }),
        "non-zero damage is corruption, not a torn tail: {:?}",
        result.stop
    );
    assert!(
        result.entries.len() < 3,
        "replay must stop at the damage, not resume beyond it"
    );
}

#[test]
fn recovery_before_first_write_is_empty() {
    let dir = tempdir().unwrap();
    {
        let log = CommitLog::open(dir.path(), batch_config()).unwrap();
        log.close().unwrap();
    }

    let result = CommitLog::recover(dir.path(), None).unwrap().read_all();
    assert_eq!(result.stop, ReplayStop::EndOfLog);
    assert!(result.entries.is_empty());
}

#[test]
fn replay_then_reopen_never_reuses_segment_ids() {
    let dir = tempdir().unwrap();
    let (entries, _) = written_log(dir.path(), 5);

    let replayed = CommitLog::recover(dir.path(), None).unwrap().read_all();
    assert_eq!(replayed.entries.len(), entries.len());
    let old_max = replayed
        .entries
        .iter()
        .map(|(pos, _)| pos.segment_id)
        .max()
        .unwrap();

    // New writes land in fresh segments above everything replayed.
    let log = CommitLog::open(dir.path(), batch_config()).unwrap();
    let pos = log.add(b"after recovery").unwrap();
    assert!(pos.segment_id > old_max);
    log.close().unwrap();
}
