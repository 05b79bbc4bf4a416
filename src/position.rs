//! Log positions.
//!
//! A [`LogPosition`] identifies a single entry in the commit log by the
//! segment that holds it and the byte offset of its chunk within that
//! segment file. Segment ids increase monotonically and are never reused,
//! so positions are totally ordered across the whole log.

use std::fmt;

/// Position of an entry in the commit log.
///
/// Positions are immutable once issued. Callers use them to assert
/// "everything at or before this position is durable" and to drive segment
/// reclamation once the corresponding in-memory state has been flushed
/// elsewhere.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct LogPosition {
    /// Segment that holds the entry.
    pub segment_id: u64,

    /// Byte offset of the entry's chunk within the segment file.
    pub offset: u64,
}

impl LogPosition {
    /// Create a position from a segment id and byte offset.
    pub const fn new(segment_id: u64, offset: u64) -> Self {
        LogPosition { segment_id, offset }
    }
}

impl fmt::Display for LogPosition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.segment_id, self.offset)
    }
}
