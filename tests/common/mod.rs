//! Shared test utilities for the integration suites.
//!
//! Import via `#[path = "../common/mod.rs"] mod common;` from a suite's
//! main.rs.

#![allow(dead_code)]
#![allow(unused_imports)]

use std::fs::OpenOptions;
use std::io::{Seek, SeekFrom, Write};
use std::path::Path;

pub use ember_commitlog::{
    CommitLog, CommitLogConfig, CommitLogError, CompressorKind, EncryptionKey, LogPosition,
    ReplayStop, Replayer, SyncMode,
};

/// Every supported compressor.
pub const ALL_COMPRESSORS: [CompressorKind; 5] = [
    CompressorKind::None,
    CompressorKind::Lz4,
    CompressorKind::Snappy,
    CompressorKind::Deflate,
    CompressorKind::Zstd,
];

/// The full compressor × encryption matrix: ten codec configurations.
pub fn codec_matrix() -> Vec<(CompressorKind, Option<EncryptionKey>)> {
    let mut matrix = Vec::with_capacity(ALL_COMPRESSORS.len() * 2);
    for compressor in ALL_COMPRESSORS {
        matrix.push((compressor, None));
        matrix.push((compressor, Some(EncryptionKey::generate())));
    }
    matrix
}

/// Batch-mode config with small segments so tests rotate quickly.
pub fn batch_config() -> CommitLogConfig {
    CommitLogConfig::new()
        .with_segment_capacity(8 * 1024)
        .with_sync_mode(SyncMode::Batch)
}

/// Simulate a process crash: drop the log on the floor without the final
/// sync or thread shutdown that `close` performs. Whatever fsync already
/// happened is all that is guaranteed on disk.
pub fn crash(log: CommitLog) {
    std::mem::forget(log);
}

/// Deterministic, mildly compressible entry payload.
pub fn entry_bytes(seed: u64, len: usize) -> Vec<u8> {
    let mut out = Vec::with_capacity(len);
    let mut x = seed.wrapping_mul(0x9E37_79B9_7F4A_7C15) | 1;
    while out.len() < len {
        x ^= x << 13;
        x ^= x >> 7;
        x ^= x << 17;
        // Bias toward a small alphabet so compressors have something to do.
        out.push(b'a' + (x % 16) as u8);
    }
    out
}

pub fn file_size(path: &Path) -> u64 {
    std::fs::metadata(path).unwrap().len()
}

pub fn truncate_file(path: &Path, len: u64) {
    let file = OpenOptions::new().write(true).open(path).unwrap();
    file.set_len(len).unwrap();
}

pub fn overwrite_at(path: &Path, offset: u64, bytes: &[u8]) {
    let mut file = OpenOptions::new().write(true).open(path).unwrap();
    file.seek(SeekFrom::Start(offset)).unwrap();
    file.write_all(bytes).unwrap();
}

/// All segment file paths in `dir`, ascending by segment id.
pub fn segment_paths(dir: &Path) -> Vec<std::path::PathBuf> {
    let mut paths: Vec<_> = std::fs::read_dir(dir)
        .unwrap()
        .map(|e| e.unwrap().path())
        .filter(|p| p.extension().is_some_and(|ext| ext == "seg"))
        .collect();
    paths.sort();
    paths
}
