//! Chunk compressors.
//!
//! Compression operates on whole chunks, never whole segments, so a segment
//! can mix chunk sizes without re-compressing earlier data. Compressors
//! append into caller-provided buffers; the staging buffers come from the
//! bounded [`BufferPool`](crate::buffer_pool::BufferPool) so the number of
//! in-flight transformations stays capped.

use std::io::Write;

use super::CodecError;

/// Compressor selection.
///
/// Ids are recorded per chunk on disk and must never change meaning. Zero
/// is reserved: an all-zero chunk header marks the zero-filled tail of a
/// preallocated segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CompressorKind {
    /// Store chunks uncompressed.
    None,
    /// LZ4 block compression (fast, modest ratio).
    Lz4,
    /// Snappy raw-block compression.
    Snappy,
    /// DEFLATE (zlib raw stream).
    Deflate,
    /// Zstandard at the default level.
    Zstd,
}

impl CompressorKind {
    /// On-disk codec id for this compressor.
    pub fn id(self) -> u8 {
        match self {
            CompressorKind::None => 1,
            CompressorKind::Lz4 => 2,
            CompressorKind::Snappy => 3,
            CompressorKind::Deflate => 4,
            CompressorKind::Zstd => 5,
        }
    }

    /// Resolve an on-disk codec id.
    pub fn from_id(id: u8) -> Option<Self> {
        match id {
            1 => Some(CompressorKind::None),
            2 => Some(CompressorKind::Lz4),
            3 => Some(CompressorKind::Snappy),
            4 => Some(CompressorKind::Deflate),
            5 => Some(CompressorKind::Zstd),
            _ => None,
        }
    }

    /// Human-readable name.
    pub fn name(self) -> &'static str {
        match self {
            CompressorKind::None => "none",
            CompressorKind::Lz4 => "lz4",
            CompressorKind::Snappy => "snappy",
            CompressorKind::Deflate => "deflate",
            CompressorKind::Zstd => "zstd",
        }
    }
}

/// A whole-chunk compressor.
///
/// Implementations must be `Send + Sync`; a single instance serves all
/// writer threads concurrently.
pub trait Compressor: Send + Sync {
    /// Which compressor this is.
    fn kind(&self) -> CompressorKind;

    /// Upper bound on the compressed size of `raw_len` input bytes.
    fn max_compressed_len(&self, raw_len: usize) -> usize;

    /// Compress `raw`, appending the output to `out`.
    fn compress(&self, raw: &[u8], out: &mut Vec<u8>) -> Result<(), CodecError>;

    /// Decompress `stored` (known to expand to exactly `raw_len` bytes),
    /// appending the output to `out`.
    fn decompress(&self, stored: &[u8], raw_len: usize, out: &mut Vec<u8>)
        -> Result<(), CodecError>;
}

/// Resolve the process-wide instance for a compressor choice.
pub fn compressor_for(kind: CompressorKind) -> &'static dyn Compressor {
    match kind {
        CompressorKind::None => &NoopCompressor,
        CompressorKind::Lz4 => &Lz4Compressor,
        CompressorKind::Snappy => &SnappyCompressor,
        CompressorKind::Deflate => &DeflateCompressor,
        CompressorKind::Zstd => &ZSTD,
    }
}

/// Resolve a compressor from its on-disk chunk id.
pub fn compressor_for_id(id: u8) -> Result<&'static dyn Compressor, CodecError> {
    CompressorKind::from_id(id)
        .map(compressor_for)
        .ok_or(CodecError::UnknownCodec(id))
}

fn check_len(expected: usize, actual: usize) -> Result<(), CodecError> {
    if expected != actual {
        return Err(CodecError::LengthMismatch { expected, actual });
    }
    Ok(())
}

/// Identity "compressor": chunks are stored verbatim.
struct NoopCompressor;

impl Compressor for NoopCompressor {
    fn kind(&self) -> CompressorKind {
        CompressorKind::None
    }

    fn max_compressed_len(&self, raw_len: usize) -> usize {
        raw_len
    }

    fn compress(&self, raw: &[u8], out: &mut Vec<u8>) -> Result<(), CodecError> {
        out.extend_from_slice(raw);
        Ok(())
    }

    fn decompress(
        &self,
        stored: &[u8],
        raw_len: usize,
        out: &mut Vec<u8>,
    ) -> Result<(), CodecError> {
        check_len(raw_len, stored.len())?;
        out.extend_from_slice(stored);
        Ok(())
    }
}

struct Lz4Compressor;

impl Compressor for Lz4Compressor {
    fn kind(&self) -> CompressorKind {
        CompressorKind::Lz4
    }

    fn max_compressed_len(&self, raw_len: usize) -> usize {
        lz4_flex::block::get_maximum_output_size(raw_len)
    }

    fn compress(&self, raw: &[u8], out: &mut Vec<u8>) -> Result<(), CodecError> {
        let start = out.len();
        out.resize(start + self.max_compressed_len(raw.len()), 0);
        let written = lz4_flex::block::compress_into(raw, &mut out[start..]).map_err(|e| {
            CodecError::Compress {
                codec: "lz4",
                detail: e.to_string(),
            }
        })?;
        out.truncate(start + written);
        Ok(())
    }

    fn decompress(
        &self,
        stored: &[u8],
        raw_len: usize,
        out: &mut Vec<u8>,
    ) -> Result<(), CodecError> {
        let start = out.len();
        out.resize(start + raw_len, 0);
        let written =
            lz4_flex::block::decompress_into(stored, &mut out[start..]).map_err(|e| {
                CodecError::Decompress {
                    codec: "lz4",
                    detail: e.to_string(),
                }
            })?;
        check_len(raw_len, written)?;
        Ok(())
    }
}

struct SnappyCompressor;

impl Compressor for SnappyCompressor {
    fn kind(&self) -> CompressorKind {
        CompressorKind::Snappy
    }

    fn max_compressed_len(&self, raw_len: usize) -> usize {
        snap::raw::max_compress_len(raw_len)
    }

    fn compress(&self, raw: &[u8], out: &mut Vec<u8>) -> Result<(), CodecError> {
        let start = out.len();
        out.resize(start + self.max_compressed_len(raw.len()), 0);
        let written = snap::raw::Encoder::new()
            .compress(raw, &mut out[start..])
            .map_err(|e| CodecError::Compress {
                codec: "snappy",
                detail: e.to_string(),
            })?;
        out.truncate(start + written);
        Ok(())
    }

    fn decompress(
        &self,
        stored: &[u8],
        raw_len: usize,
        out: &mut Vec<u8>,
    ) -> Result<(), CodecError> {
        let start = out.len();
        out.resize(start + raw_len, 0);
        let written = snap::raw::Decoder::new()
            .decompress(stored, &mut out[start..])
            .map_err(|e| CodecError::Decompress {
                codec: "snappy",
                detail: e.to_string(),
            })?;
        check_len(raw_len, written)?;
        Ok(())
    }
}

struct DeflateCompressor;

impl Compressor for DeflateCompressor {
    fn kind(&self) -> CompressorKind {
        CompressorKind::Deflate
    }

    fn max_compressed_len(&self, raw_len: usize) -> usize {
        // DEFLATE stored blocks add at most 5 bytes per 16 KiB plus a
        // small stream overhead.
        raw_len + raw_len / 16_384 * 5 + 64
    }

    fn compress(&self, raw: &[u8], out: &mut Vec<u8>) -> Result<(), CodecError> {
        let mut encoder = flate2::write::DeflateEncoder::new(out, flate2::Compression::default());
        encoder
            .write_all(raw)
            .and_then(|_| encoder.finish().map(|_| ()))
            .map_err(|e| CodecError::Compress {
                codec: "deflate",
                detail: e.to_string(),
            })
    }

    fn decompress(
        &self,
        stored: &[u8],
        raw_len: usize,
        out: &mut Vec<u8>,
    ) -> Result<(), CodecError> {
        let start = out.len();
        let mut decoder = flate2::write::DeflateDecoder::new(&mut *out);
        let written = decoder
            .write_all(stored)
            .and_then(|_| decoder.finish())
            .map(|w| w.len() - start)
            .map_err(|e| CodecError::Decompress {
                codec: "deflate",
                detail: e.to_string(),
            })?;
        check_len(raw_len, written)?;
        Ok(())
    }
}

struct ZstdCompressor {
    level: i32,
}

static ZSTD: ZstdCompressor = ZstdCompressor {
    level: zstd::DEFAULT_COMPRESSION_LEVEL,
};

impl Compressor for ZstdCompressor {
    fn kind(&self) -> CompressorKind {
        CompressorKind::Zstd
    }

    fn max_compressed_len(&self, raw_len: usize) -> usize {
        zstd::zstd_safe::compress_bound(raw_len)
    }

    fn compress(&self, raw: &[u8], out: &mut Vec<u8>) -> Result<(), CodecError> {
        let start = out.len();
        out.resize(start + self.max_compressed_len(raw.len()), 0);
        let written = zstd::bulk::compress_to_buffer(raw, &mut out[start..], self.level)
            .map_err(|e| CodecError::Compress {
                codec: "zstd",
                detail: e.to_string(),
            })?;
        out.truncate(start + written);
        Ok(())
    }

    fn decompress(
        &self,
        stored: &[u8],
        raw_len: usize,
        out: &mut Vec<u8>,
    ) -> Result<(), CodecError> {
        let start = out.len();
        out.resize(start + raw_len, 0);
        let written = zstd::bulk::decompress_to_buffer(stored, &mut out[start..]).map_err(|e| {
            CodecError::Decompress {
                codec: "zstd",
                detail: e.to_string(),
            }
        })?;
        check_len(raw_len, written)?;
        Ok(())
    }
}
