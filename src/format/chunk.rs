//! Chunk record format.
//!
//! Every appended entry becomes one chunk. Segments are preallocated and
//! zero-filled, so the decoder treats an all-zero header as the end of
//! valid data; codec ids are nonzero to keep that marker unambiguous.
//!
//! # Chunk Layout
//!
//! ```text
//! ┌──────────────────────┬───────────────────┬──────────┬───────┐
//! │ uncompressed len (4) │ stored len (4)    │ codec id │ flags │
//! ├──────────────────────┴───────────────────┴──────────┴───────┤
//! │ IV (12 bytes, present iff flags bit 0)                      │
//! ├─────────────────────────────────────────────────────────────┤
//! │ payload (stored len bytes)                                  │
//! ├─────────────────────────────────────────────────────────────┤
//! │ CRC32 of header + IV + payload (4 bytes)                    │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! All integers are little-endian. The payload is the entry bytes after
//! compression and, when enabled, encryption (ciphertext plus GCM tag).

use crc32fast::Hasher;

use crate::codec::{
    compressor_for_id, CodecError, CodecPipeline, EncryptionContext, NONCE_SIZE, TAG_SIZE,
};

/// Fixed chunk header size before the optional IV.
pub const CHUNK_HEADER_BASE: usize = 10;

/// Trailing checksum size.
pub const CHUNK_CRC_SIZE: usize = 4;

/// Flag bit: payload is encrypted and the header carries an IV.
pub const FLAG_ENCRYPTED: u8 = 0b0000_0001;

/// Framing overhead added to a payload, excluding compression effects.
///
/// Encrypted chunks additionally carry the IV and the GCM tag.
pub fn chunk_overhead(encrypted: bool) -> u64 {
    let base = (CHUNK_HEADER_BASE + CHUNK_CRC_SIZE) as u64;
    if encrypted {
        base + (NONCE_SIZE + TAG_SIZE) as u64
    } else {
        base
    }
}

/// Chunk decoding failures.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ChunkError {
    /// The buffer ends before the chunk's declared extent.
    #[error("chunk extends past end of data")]
    Incomplete,

    /// Stored and computed checksums disagree.
    #[error("chunk checksum mismatch: stored {stored:08x}, computed {computed:08x}")]
    ChecksumMismatch {
        /// Checksum recorded in the chunk.
        stored: u32,
        /// Checksum computed over the data read back.
        computed: u32,
    },

    /// The chunk checksum is valid but a flag bit is unknown to this build.
    #[error("unsupported chunk flags: {0:#04x}")]
    UnsupportedFlags(u8),

    /// Decompression or decryption failed.
    #[error(transparent)]
    Codec(#[from] CodecError),
}

/// A successfully decoded chunk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedChunk {
    /// The original entry bytes.
    pub entry: Vec<u8>,
    /// Total encoded size of the chunk, for advancing the read cursor.
    pub consumed: usize,
}

/// Encode one entry into a framed chunk.
///
/// `scratch` stages the compressed payload and is cleared first; callers
/// pass a leased pool buffer so concurrent encodes stay bounded.
pub fn encode_chunk(
    entry: &[u8],
    pipeline: &CodecPipeline,
    scratch: &mut Vec<u8>,
) -> Result<Vec<u8>, CodecError> {
    scratch.clear();
    pipeline.compressor().compress(entry, scratch)?;
    let codec_id = pipeline.compressor().kind().id();

    match pipeline.encryption() {
        Some(ctx) => {
            let (nonce, ciphertext) = ctx.encrypt(scratch)?;
            Ok(assemble(
                entry.len(),
                codec_id,
                FLAG_ENCRYPTED,
                Some(&nonce),
                &ciphertext,
            ))
        }
        None => Ok(assemble(entry.len(), codec_id, 0, None, scratch)),
    }
}

fn assemble(
    raw_len: usize,
    codec_id: u8,
    flags: u8,
    iv: Option<&[u8; NONCE_SIZE]>,
    payload: &[u8],
) -> Vec<u8> {
    let iv_len = iv.map_or(0, |v| v.len());
    let mut chunk =
        Vec::with_capacity(CHUNK_HEADER_BASE + iv_len + payload.len() + CHUNK_CRC_SIZE);

    chunk.extend_from_slice(&(raw_len as u32).to_le_bytes());
    chunk.extend_from_slice(&(payload.len() as u32).to_le_bytes());
    chunk.push(codec_id);
    chunk.push(flags);
    if let Some(iv) = iv {
        chunk.extend_from_slice(iv);
    }
    chunk.extend_from_slice(payload);

    let crc = compute_crc(&chunk);
    chunk.extend_from_slice(&crc.to_le_bytes());
    chunk
}

/// Total encoded extent of the chunk starting at `buf[0]`, from its header
/// alone. `None` if the buffer is too short to hold a header.
///
/// Used by the replayer to decide whether the bytes after a failed chunk
/// are the zero-filled tail of a torn write.
pub fn chunk_extent(buf: &[u8]) -> Option<usize> {
    if buf.len() < CHUNK_HEADER_BASE {
        return None;
    }
    let stored_len = u32::from_le_bytes(buf[4..8].try_into().unwrap()) as usize;
    let iv_len = if buf[9] & FLAG_ENCRYPTED != 0 {
        NONCE_SIZE
    } else {
        0
    };
    Some(CHUNK_HEADER_BASE + iv_len + stored_len + CHUNK_CRC_SIZE)
}

/// Decode the chunk at the start of `buf`.
///
/// Returns `Ok(None)` when `buf` starts with the zero-filled tail of a
/// preallocated segment (end of valid data). The checksum is verified
/// before any codec stage runs, so corruption is reported as
/// [`ChunkError::ChecksumMismatch`] rather than a codec failure.
pub fn decode_chunk(
    buf: &[u8],
    encryption: Option<&EncryptionContext>,
) -> Result<Option<DecodedChunk>, ChunkError> {
    if buf.len() < CHUNK_HEADER_BASE {
        if buf.iter().all(|&b| b == 0) {
            return Ok(None);
        }
        return Err(ChunkError::Incomplete);
    }

    let raw_len = u32::from_le_bytes(buf[0..4].try_into().unwrap()) as usize;
    let stored_len = u32::from_le_bytes(buf[4..8].try_into().unwrap()) as usize;
    let codec_id = buf[8];
    let flags = buf[9];

    // Zeroed tail of a preallocated segment: no codec id is ever zero.
    if raw_len == 0 && stored_len == 0 && codec_id == 0 {
        return Ok(None);
    }

    let encrypted = flags & FLAG_ENCRYPTED != 0;
    let iv_len = if encrypted { NONCE_SIZE } else { 0 };
    let total = CHUNK_HEADER_BASE + iv_len + stored_len + CHUNK_CRC_SIZE;
    if buf.len() < total {
        return Err(ChunkError::Incomplete);
    }

    let body = &buf[..total - CHUNK_CRC_SIZE];
    let stored_crc = u32::from_le_bytes(buf[total - CHUNK_CRC_SIZE..total].try_into().unwrap());
    let computed = compute_crc(body);
    if computed != stored_crc {
        return Err(ChunkError::ChecksumMismatch {
            stored: stored_crc,
            computed,
        });
    }

    if flags & !FLAG_ENCRYPTED != 0 {
        return Err(ChunkError::UnsupportedFlags(flags));
    }

    let compressor = compressor_for_id(codec_id)?;
    let payload = &buf[CHUNK_HEADER_BASE + iv_len..total - CHUNK_CRC_SIZE];

    let mut entry = Vec::with_capacity(raw_len);
    if encrypted {
        let ctx = encryption.ok_or(ChunkError::Codec(CodecError::MissingKey))?;
        let iv: [u8; NONCE_SIZE] = buf[CHUNK_HEADER_BASE..CHUNK_HEADER_BASE + NONCE_SIZE]
            .try_into()
            .unwrap();
        let compressed = ctx.decrypt(&iv, payload)?;
        compressor.decompress(&compressed, raw_len, &mut entry)?;
    } else {
        compressor.decompress(payload, raw_len, &mut entry)?;
    }

    Ok(Some(DecodedChunk {
        entry,
        consumed: total,
    }))
}

fn compute_crc(data: &[u8]) -> u32 {
    let mut hasher = Hasher::new();
    hasher.update(data);
    hasher.finalize()
}
