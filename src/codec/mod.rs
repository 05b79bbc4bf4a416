//! Chunk transformation pipeline.
//!
//! Every entry appended to the log passes through this pipeline before it
//! reaches a segment file: raw bytes → compress → encrypt. Both stages are
//! pluggable; "no compression" and "no encryption" are first-class
//! configurations, and every chunk records which compressor produced it so
//! replay needs no external state beyond the decryption key.

pub mod compress;
pub mod encrypt;

pub use compress::{compressor_for, compressor_for_id, Compressor, CompressorKind};
pub use encrypt::{EncryptionContext, EncryptionKey, KEY_SIZE, NONCE_SIZE, TAG_SIZE};

/// Codec stage failures.
///
/// Carries enough context to distinguish a wrong-key or wrong-codec error
/// from plain data corruption.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CodecError {
    /// Compression failed on the live write path.
    #[error("compression failed ({codec}): {detail}")]
    Compress {
        /// Compressor that failed.
        codec: &'static str,
        /// Human-readable failure description.
        detail: String,
    },

    /// Decompression failed during replay.
    #[error("decompression failed ({codec}): {detail}")]
    Decompress {
        /// Compressor that failed.
        codec: &'static str,
        /// Human-readable failure description.
        detail: String,
    },

    /// A chunk names a compressor this build does not know.
    #[error("unknown compressor id: {0}")]
    UnknownCodec(u8),

    /// Decompressed output did not match the length recorded in the chunk.
    #[error("decoded length {actual} does not match recorded length {expected}")]
    LengthMismatch {
        /// Length recorded in the chunk header.
        expected: usize,
        /// Length actually produced.
        actual: usize,
    },

    /// Encryption failed on the live write path.
    #[error("encryption failed: {0}")]
    Encrypt(String),

    /// Decryption (or authentication) failed during replay.
    #[error("decryption failed: {0}")]
    Decrypt(String),

    /// An encryption key of the wrong size was supplied.
    #[error("encryption key must be {expected} bytes, got {actual}")]
    InvalidKeySize {
        /// Required key size in bytes.
        expected: usize,
        /// Size of the supplied key material.
        actual: usize,
    },

    /// A chunk is flagged as encrypted but no key was configured.
    #[error("chunk is encrypted but no encryption key is configured")]
    MissingKey,
}

/// The compress-then-encrypt pipeline applied to every chunk.
///
/// Chosen once at startup and immutable for the process lifetime. Segments
/// written under an earlier configuration remain readable because each
/// chunk records its own codec identity.
pub struct CodecPipeline {
    compressor: &'static dyn Compressor,
    encryption: Option<EncryptionContext>,
}

impl CodecPipeline {
    /// Build a pipeline from a compressor choice and an optional key.
    pub fn new(compressor: CompressorKind, key: Option<&EncryptionKey>) -> Self {
        CodecPipeline {
            compressor: compressor_for(compressor),
            encryption: key.map(EncryptionContext::new),
        }
    }

    /// The configured compressor.
    pub fn compressor(&self) -> &'static dyn Compressor {
        self.compressor
    }

    /// The configured encryption context, if encryption is enabled.
    pub fn encryption(&self) -> Option<&EncryptionContext> {
        self.encryption.as_ref()
    }

    /// Whether chunks produced by this pipeline are encrypted.
    pub fn is_encrypted(&self) -> bool {
        self.encryption.is_some()
    }
}

impl std::fmt::Debug for CodecPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CodecPipeline")
            .field("compressor", &self.compressor.kind())
            .field("encrypted", &self.is_encrypted())
            .finish()
    }
}
