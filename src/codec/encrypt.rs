//! Chunk encryption using AES-256-GCM.
//!
//! Encryption wraps the (possibly compressed) chunk payload with a fresh
//! random 96-bit nonce per chunk. The nonce is stored in the chunk header
//! next to the payload, so decryption needs no state beyond the key. The
//! GCM authentication tag doubles as an integrity check on the payload in
//! addition to the chunk checksum.

use aes_gcm::aead::generic_array::GenericArray;
use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes256Gcm, Nonce};
use rand::RngCore;
use zeroize::{Zeroize, ZeroizeOnDrop};

use super::CodecError;

/// AES-256 key size in bytes.
pub const KEY_SIZE: usize = 32;
/// GCM nonce size in bytes.
pub const NONCE_SIZE: usize = 12;
/// GCM authentication tag size in bytes.
pub const TAG_SIZE: usize = 16;

/// Commit log encryption key.
///
/// Key material is zeroized when the value is dropped.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct EncryptionKey {
    bytes: [u8; KEY_SIZE],
}

impl EncryptionKey {
    /// Generate a fresh random key.
    #[must_use]
    pub fn generate() -> Self {
        let mut bytes = [0u8; KEY_SIZE];
        rand::thread_rng().fill_bytes(&mut bytes);
        EncryptionKey { bytes }
    }

    /// Build a key from raw bytes.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::InvalidKeySize`] unless exactly 32 bytes are
    /// supplied.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, CodecError> {
        if bytes.len() != KEY_SIZE {
            return Err(CodecError::InvalidKeySize {
                expected: KEY_SIZE,
                actual: bytes.len(),
            });
        }
        let mut key = [0u8; KEY_SIZE];
        key.copy_from_slice(bytes);
        Ok(EncryptionKey { bytes: key })
    }

    /// Raw key bytes. Do not log or persist the result.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8; KEY_SIZE] {
        &self.bytes
    }
}

impl std::fmt::Debug for EncryptionKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EncryptionKey")
            .field("bytes", &"[REDACTED]")
            .finish()
    }
}

/// Per-process encryption context: the cipher instance shared by all
/// writers and the replayer.
#[derive(Clone)]
pub struct EncryptionContext {
    cipher: Aes256Gcm,
}

impl EncryptionContext {
    /// Build a context from a key.
    #[must_use]
    pub fn new(key: &EncryptionKey) -> Self {
        let cipher = Aes256Gcm::new(GenericArray::from_slice(key.as_bytes()));
        EncryptionContext { cipher }
    }

    /// Encrypt a chunk payload under a fresh random nonce.
    ///
    /// Returns the nonce (to be stored in the chunk header) and the
    /// ciphertext with the 16-byte authentication tag appended.
    pub fn encrypt(&self, plaintext: &[u8]) -> Result<([u8; NONCE_SIZE], Vec<u8>), CodecError> {
        let mut nonce = [0u8; NONCE_SIZE];
        rand::thread_rng().fill_bytes(&mut nonce);

        let ciphertext = self
            .cipher
            .encrypt(Nonce::from_slice(&nonce), plaintext)
            .map_err(|_| CodecError::Encrypt("AES-GCM encryption error".to_string()))?;

        Ok((nonce, ciphertext))
    }

    /// Decrypt a chunk payload using the nonce stored in its header.
    ///
    /// Fails if the ciphertext was tampered with or the key is wrong.
    pub fn decrypt(
        &self,
        nonce: &[u8; NONCE_SIZE],
        ciphertext: &[u8],
    ) -> Result<Vec<u8>, CodecError> {
        self.cipher
            .decrypt(Nonce::from_slice(nonce), ciphertext)
            .map_err(|_| {
                CodecError::Decrypt("AES-GCM authentication failed".to_string())
            })
    }
}

impl std::fmt::Debug for EncryptionContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EncryptionContext").finish_non_exhaustive()
    }
}
