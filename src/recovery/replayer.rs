//! Forward-only replay over segment files.
//!
//! The replayer walks segments in ascending id order and decodes chunks
//! lazily. Two failure shapes are distinguished:
//!
//! - a *torn tail* — a partial chunk followed by the zero-filled
//!   preallocation in the last segment, the signature of a crash mid-write.
//!   Replay stops there and reports the truncation point; this is expected
//!   after a crash, never an error.
//! - anything else — a checksum mismatch over non-zero data, an
//!   undecodable payload, an unreadable file. Replay stops at that point
//!   and does **not** skip ahead: resuming past a bad chunk would break
//!   the position-ordering guarantee.

use std::collections::VecDeque;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::codec::{EncryptionContext, EncryptionKey};
use crate::error::Result;
use crate::format::{chunk_extent, decode_chunk, ChunkError, SegmentFile, SEGMENT_HEADER_SIZE};
use crate::position::LogPosition;

/// Why replay stopped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReplayStop {
    /// Still iterating.
    InProgress,
    /// Every segment was consumed to its end of data.
    EndOfLog,
    /// A partial chunk at the tail of the last segment (crash mid-write).
    /// Everything before it was replayed.
    TornTail {
        /// Segment holding the torn chunk.
        segment_id: u64,
        /// File offset where valid data ends.
        offset: u64,
    },
    /// A chunk failed its checksum over non-zero data, or carried an
    /// unusable header. Data corruption; replay stops to preserve order.
    CorruptChunk {
        /// Segment holding the corrupt chunk.
        segment_id: u64,
        /// File offset of the corrupt chunk.
        offset: u64,
    },
    /// The chunk checksum was valid but decompression or decryption
    /// failed (wrong key, codec mismatch).
    CodecFailure {
        /// Segment holding the failing chunk.
        segment_id: u64,
        /// File offset of the failing chunk.
        offset: u64,
        /// Failure description.
        detail: String,
    },
    /// A segment file could not be read.
    Io {
        /// Segment whose file failed.
        segment_id: u64,
        /// Failure description.
        detail: String,
    },
}

/// Where the last segment's valid data ends, when a torn tail was found.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TruncateInfo {
    /// Segment with the torn tail.
    pub segment_id: u64,
    /// File offset where valid data ends.
    pub valid_end: u64,
    /// Size of the segment file on disk.
    pub original_size: u64,
}

impl TruncateInfo {
    /// Bytes past the last valid chunk.
    pub fn bytes_to_truncate(&self) -> u64 {
        self.original_size - self.valid_end
    }
}

/// Result of replaying everything at once via [`Replayer::read_all`].
#[derive(Debug)]
pub struct ReplayResult {
    /// Decoded entries in append order.
    pub entries: Vec<(LogPosition, Vec<u8>)>,
    /// Why replay stopped.
    pub stop: ReplayStop,
    /// Truncation point, when the last segment ended in a torn chunk.
    pub truncate_info: Option<TruncateInfo>,
}

struct SegmentCursor {
    segment_id: u64,
    /// Segment contents after the header.
    data: Vec<u8>,
    /// Read offset within `data`.
    offset: usize,
    is_last: bool,
}

/// Lazy, finite, forward-only iterator over `(LogPosition, entry)`.
///
/// Iterate it (by value or `&mut`), then inspect
/// [`stop_reason`](Replayer::stop_reason) and
/// [`truncate_info`](Replayer::truncate_info) for how it ended.
pub struct Replayer {
    dir: PathBuf,
    encryption: Option<EncryptionContext>,
    pending: VecDeque<u64>,
    current: Option<SegmentCursor>,
    stop: ReplayStop,
    truncate_info: Option<TruncateInfo>,
}

impl Replayer {
    /// Open a replayer over the segment files in `dir`.
    ///
    /// A missing directory replays as an empty log. Pass the key the log
    /// was written with if encryption was enabled.
    pub fn open(dir: &Path, encryption_key: Option<&EncryptionKey>) -> Result<Self> {
        let pending = if dir.exists() {
            SegmentFile::list_segment_ids(dir)?.into()
        } else {
            VecDeque::new()
        };
        debug!(dir = %dir.display(), segments = pending.len(), "replaying commit log");

        Ok(Replayer {
            dir: dir.to_path_buf(),
            encryption: encryption_key.map(EncryptionContext::new),
            pending,
            current: None,
            stop: ReplayStop::InProgress,
            truncate_info: None,
        })
    }

    /// Why iteration stopped; [`ReplayStop::InProgress`] until exhausted.
    pub fn stop_reason(&self) -> &ReplayStop {
        &self.stop
    }

    /// Truncation point of a torn tail, once iteration has stopped there.
    pub fn truncate_info(&self) -> Option<&TruncateInfo> {
        self.truncate_info.as_ref()
    }

    /// Drain the replayer into a [`ReplayResult`].
    pub fn read_all(mut self) -> ReplayResult {
        let mut entries = Vec::new();
        for item in &mut self {
            entries.push(item);
        }
        ReplayResult {
            entries,
            stop: self.stop,
            truncate_info: self.truncate_info,
        }
    }

    /// Open the next pending segment, or mark end of log.
    fn open_next_segment(&mut self) -> bool {
        let Some(segment_id) = self.pending.pop_front() else {
            self.stop = ReplayStop::EndOfLog;
            return false;
        };

        let read = SegmentFile::open_read(&self.dir, segment_id)
            .and_then(|mut file| file.read_data());
        match read {
            Ok(data) => {
                self.current = Some(SegmentCursor {
                    segment_id,
                    data,
                    offset: 0,
                    is_last: self.pending.is_empty(),
                });
                true
            }
            Err(e) => {
                warn!(segment_id, error = %e, "failed to read segment during replay");
                self.stop = ReplayStop::Io {
                    segment_id,
                    detail: e.to_string(),
                };
                false
            }
        }
    }

    fn fail_at(&mut self, cursor_offset: usize, error: ChunkError) {
        let cursor = self.current.as_ref().expect("failing within a segment");
        let file_offset = (SEGMENT_HEADER_SIZE + cursor_offset) as u64;

        let torn = cursor.is_last
            && matches!(
                error,
                ChunkError::Incomplete | ChunkError::ChecksumMismatch { .. }
            )
            && tail_is_zero_after(&cursor.data, cursor_offset);

        if torn {
            warn!(
                segment_id = cursor.segment_id,
                offset = file_offset,
                "torn chunk at segment tail; truncating replay"
            );
            self.truncate_info = Some(TruncateInfo {
                segment_id: cursor.segment_id,
                valid_end: file_offset,
                original_size: (SEGMENT_HEADER_SIZE + cursor.data.len()) as u64,
            });
            self.stop = ReplayStop::TornTail {
                segment_id: cursor.segment_id,
                offset: file_offset,
            };
            return;
        }

        self.stop = match error {
            ChunkError::Codec(e) => {
                warn!(
                    segment_id = cursor.segment_id,
                    offset = file_offset,
                    error = %e,
                    "chunk failed to decode; stopping replay"
                );
                ReplayStop::CodecFailure {
                    segment_id: cursor.segment_id,
                    offset: file_offset,
                    detail: e.to_string(),
                }
            }
            e => {
                warn!(
                    segment_id = cursor.segment_id,
                    offset = file_offset,
                    error = %e,
                    "corrupt chunk; stopping replay"
                );
                ReplayStop::CorruptChunk {
                    segment_id: cursor.segment_id,
                    offset: file_offset,
                }
            }
        };
    }
}

/// Whether everything after the chunk starting at `offset` (beyond its
/// declared extent) is the zero-filled preallocation.
fn tail_is_zero_after(data: &[u8], offset: usize) -> bool {
    let extent = chunk_extent(&data[offset..]).unwrap_or(0);
    let after = (offset + extent).min(data.len());
    data[after..].iter().all(|&b| b == 0)
}

impl Iterator for Replayer {
    type Item = (LogPosition, Vec<u8>);

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if self.stop != ReplayStop::InProgress {
                return None;
            }

            if self.current.is_none() && !self.open_next_segment() {
                return None;
            }
            let cursor = self.current.as_mut().expect("opened above");

            match decode_chunk(&cursor.data[cursor.offset..], self.encryption.as_ref()) {
                Ok(Some(decoded)) => {
                    let position = LogPosition::new(
                        cursor.segment_id,
                        (SEGMENT_HEADER_SIZE + cursor.offset) as u64,
                    );
                    cursor.offset += decoded.consumed;
                    return Some((position, decoded.entry));
                }
                Ok(None) => {
                    // End of valid data in this segment.
                    self.current = None;
                }
                Err(e) => {
                    let offset = cursor.offset;
                    self.fail_at(offset, e);
                    return None;
                }
            }
        }
    }
}

impl std::iter::FusedIterator for Replayer {}
