//! Binary on-disk formats.
//!
//! - `segment_file`: segment file handle, header layout, preallocation and
//!   recycling of backing files
//! - `chunk`: the framed chunk record written for every appended entry

pub mod chunk;
pub mod segment_file;

pub use chunk::{
    chunk_extent, chunk_overhead, decode_chunk, encode_chunk, ChunkError, DecodedChunk,
    CHUNK_CRC_SIZE, CHUNK_HEADER_BASE, FLAG_ENCRYPTED,
};
pub use segment_file::{
    SegmentFile, SegmentHeader, SEGMENT_FORMAT_VERSION, SEGMENT_HEADER_SIZE, SEGMENT_MAGIC,
};
