//! Stress Tests
//!
//! Heavy-workload tests, all marked #[ignore] for opt-in execution.
//! Run with: cargo test --test commitlog stress -- --ignored

use crate::common::*;
use std::sync::Arc;
use std::time::Instant;
use tempfile::tempdir;

/// 10K entry replay.
#[test]
#[ignore]
fn stress_large_log_recovery() {
    let dir = tempdir().unwrap();
    let config = CommitLogConfig::new()
        .with_segment_capacity(1024 * 1024)
        .with_compressor(CompressorKind::Lz4)
        .with_sync_mode(SyncMode::Periodic {
            interval: std::time::Duration::from_millis(100),
        });
    let log = CommitLog::open(dir.path(), config).unwrap();

    for i in 0..10_000u64 {
        log.add(&entry_bytes(i, 64 + (i as usize % 512))).unwrap();
    }
    log.close().unwrap();

    let start = Instant::now();
    let result = CommitLog::recover(dir.path(), None).unwrap().read_all();
    println!("10K entry replay took: {:?}", start.elapsed());

    assert_eq!(result.stop, ReplayStop::EndOfLog);
    assert_eq!(result.entries.len(), 10_000);
    for (i, (_, entry)) in result.entries.iter().enumerate() {
        assert_eq!(entry, &entry_bytes(i as u64, 64 + (i % 512)));
    }
}

/// Eight writers hammering one group-commit log.
#[test]
#[ignore]
fn stress_concurrent_group_commit() {
    let dir = tempdir().unwrap();
    let config = CommitLogConfig::new()
        .with_segment_capacity(512 * 1024)
        .with_sync_mode(SyncMode::Group {
            timeout: std::time::Duration::from_millis(10),
            threshold_bytes: 64 * 1024,
        });
    let log = Arc::new(CommitLog::open(dir.path(), config).unwrap());

    let handles: Vec<_> = (0..8u64)
        .map(|thread_id| {
            let log = Arc::clone(&log);
            std::thread::spawn(move || {
                for i in 0..1_000 {
                    log.add(&entry_bytes(thread_id * 10_000 + i, 200)).unwrap();
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    let snap = log.metrics();
    assert_eq!(snap.entries_appended, 8_000);
    assert!(
        snap.sync_calls < 8_000,
        "group commit must coalesce under load"
    );
    log.close().unwrap();

    let result = CommitLog::recover(dir.path(), None).unwrap().read_all();
    assert_eq!(result.entries.len(), 8_000);
}

/// Sustained rotation with continuous reclamation.
#[test]
#[ignore]
fn stress_rotation_with_reclamation() {
    let dir = tempdir().unwrap();
    let config = CommitLogConfig::new()
        .with_segment_capacity(16 * 1024)
        .with_sync_mode(SyncMode::Batch);
    let log = CommitLog::open(dir.path(), config).unwrap();

    let mut last = LogPosition::new(0, 0);
    for i in 0..5_000u64 {
        last = log.add(&entry_bytes(i, 512)).unwrap();
        if i % 500 == 0 {
            log.on_flushed(last);
        }
    }
    log.on_flushed(last);
    log.close().unwrap();

    // Reclamation kept pace: only the live tail of segments remains.
    assert!(
        segment_paths(dir.path()).len() < 20,
        "reclaimed segments must not accumulate on disk"
    );
}
