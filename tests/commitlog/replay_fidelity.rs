//! Replay Fidelity Tests
//!
//! For any sequence of appended entries, replay must reproduce the exact
//! original byte sequences in the exact append order, for every compressor
//! and with encryption on or off.

use crate::common::*;
use tempfile::tempdir;

#[test]
fn replay_reproduces_entries_across_codec_matrix() {
    for (compressor, key) in codec_matrix() {
        let dir = tempdir().unwrap();
        let mut config = batch_config().with_compressor(compressor);
        if let Some(key) = &key {
            config = config.with_encryption(key.clone());
        }

        let entries: Vec<Vec<u8>> = (0..40)
            .map(|i| entry_bytes(i, 50 + (i as usize * 37) % 400))
            .collect();

        let log = CommitLog::open(dir.path(), config).unwrap();
        let mut positions = Vec::new();
        for entry in &entries {
            positions.push(log.add(entry).unwrap());
        }
        log.close().unwrap();

        let replayer = CommitLog::recover(dir.path(), key.as_ref()).unwrap();
        let result = replayer.read_all();

        assert_eq!(
            result.stop,
            ReplayStop::EndOfLog,
            "{} encrypted={}: clean log must replay to the end",
            compressor.name(),
            key.is_some()
        );
        assert_eq!(result.entries.len(), entries.len());
        for (i, (pos, replayed)) in result.entries.iter().enumerate() {
            assert_eq!(
                replayed,
                &entries[i],
                "{} encrypted={}: entry {} bytes differ",
                compressor.name(),
                key.is_some(),
                i
            );
            assert_eq!(*pos, positions[i]);
        }
    }
}

#[test]
fn replay_preserves_order_across_segment_rotation() {
    let dir = tempdir().unwrap();
    let config = batch_config().with_segment_capacity(1024);
    let log = CommitLog::open(dir.path(), config).unwrap();

    let entries: Vec<Vec<u8>> = (0..30).map(|i| entry_bytes(i, 300)).collect();
    for entry in &entries {
        log.add(entry).unwrap();
    }
    log.close().unwrap();

    assert!(
        segment_paths(dir.path()).len() > 1,
        "30 x 300B entries in 1KiB segments must span several files"
    );

    let replayed: Vec<_> = CommitLog::recover(dir.path(), None).unwrap().collect();
    assert_eq!(replayed.len(), entries.len());
    for (i, (pos, entry)) in replayed.iter().enumerate() {
        assert_eq!(entry, &entries[i]);
        if i > 0 {
            assert!(*pos > replayed[i - 1].0, "positions must ascend");
        }
    }
}

#[test]
fn empty_entries_replay_as_empty() {
    let dir = tempdir().unwrap();
    let log = CommitLog::open(dir.path(), batch_config()).unwrap();

    log.add(b"").unwrap();
    log.add(b"between").unwrap();
    log.add(b"").unwrap();
    log.close().unwrap();

    let entries: Vec<_> = CommitLog::recover(dir.path(), None).unwrap().collect();
    assert_eq!(entries.len(), 3);
    assert!(entries[0].1.is_empty());
    assert_eq!(entries[1].1, b"between");
    assert!(entries[2].1.is_empty());
}

#[test]
fn largest_entry_exactly_fills_a_segment() {
    let dir = tempdir().unwrap();
    let config = batch_config().with_segment_capacity(2048);
    let log = CommitLog::open(dir.path(), config).unwrap();

    // An incompressible max-size entry leaves no slack in its segment.
    let max = log.max_entry_len() as usize;
    let full_a = entry_bytes(1, max);
    let full_b = entry_bytes(2, max);
    let a = log.add(&full_a).unwrap();
    let b = log.add(&full_b).unwrap();
    assert_ne!(a.segment_id, b.segment_id, "each filled its own segment");
    log.close().unwrap();

    let result = CommitLog::recover(dir.path(), None).unwrap().read_all();
    assert_eq!(result.stop, ReplayStop::EndOfLog);
    assert_eq!(result.entries.len(), 2);
    assert_eq!(result.entries[0].1, full_a);
    assert_eq!(result.entries[1].1, full_b);
}

#[test]
fn replay_is_repeatable_over_the_same_files() {
    let dir = tempdir().unwrap();
    let log = CommitLog::open(dir.path(), batch_config()).unwrap();
    for i in 0..10 {
        log.add(&entry_bytes(i, 100)).unwrap();
    }
    log.close().unwrap();

    let first: Vec<_> = CommitLog::recover(dir.path(), None).unwrap().collect();
    let second: Vec<_> = CommitLog::recover(dir.path(), None).unwrap().collect();
    assert_eq!(first, second);
}
