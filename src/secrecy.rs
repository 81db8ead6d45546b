//! Passcode minting, hashing and relay encryption.
//!
//! # Algorithms
//!
//! - **Passcode**: 12 characters from `[A-Za-z0-9]`, drawn from the OS CSPRNG
//! - **Digest**: SHA-256, lowercase hex
//! - **Encryption**: AES-256-CBC with PKCS#7 padding
//!
//! # Key material
//!
//! The AES key is not derived by a KDF. It is the 32 ASCII bytes found at
//! `splice_index..splice_index + 32` of the key-material digest's hex text,
//! and the IV is a fixed 16-byte string shared by every encryption. Both are
//! part of the wire format: ciphertexts already handed out can only be
//! decrypted if these stay exactly as they were. A reused IV leaks equality
//! of first blocks under the same key; this is a known limitation kept for
//! compatibility with existing chains.

use std::fmt;

use cbc::cipher::{block_padding::NoPadding, BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use rand::distributions::Alphanumeric;
use rand::rngs::OsRng;
use rand::Rng;
use sha2::{Digest as _, Sha256};
use zeroize::{Zeroize, ZeroizeOnDrop, Zeroizing};

use crate::types::{Ciphertext, Digest, RelayError, Result, DIGEST_HEX_LEN};

// =============================================================================
// Constants
// =============================================================================

/// Passcode length in characters
pub const SECRET_LEN: usize = 12;

/// AES block size (16 bytes)
pub const BLOCK_SIZE: usize = 16;

/// AES-256 key width, taken from the digest's hex text
pub const KEY_WIDTH: usize = 32;

/// CBC initialization vector length
pub const IV_LEN: usize = 16;

type Aes256CbcEnc = cbc::Encryptor<aes::Aes256>;
type Aes256CbcDec = cbc::Decryptor<aes::Aes256>;

// =============================================================================
// Secret
// =============================================================================

/// Plaintext passcode. Exists only in memory and is wiped on drop.
#[derive(Clone, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
pub struct Secret(String);

impl Secret {
    pub fn new(passcode: impl Into<String>) -> Self {
        Self(passcode.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Secret(<redacted>)")
    }
}

// =============================================================================
// Codec
// =============================================================================

/// Mints passcodes and moves them in and out of relay ciphertexts.
#[derive(Clone)]
pub struct SecrecyCodec {
    iv: [u8; IV_LEN],
    splice_index: usize,
}

impl fmt::Debug for SecrecyCodec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SecrecyCodec")
            .field("splice_index", &self.splice_index)
            .finish_non_exhaustive()
    }
}

impl SecrecyCodec {
    /// Build a codec, checking the key window fits inside a digest.
    ///
    /// This is the startup check: once it passes, every well-formed digest
    /// can key the cipher.
    pub fn new(iv: &str, splice_index: usize) -> Result<Self> {
        let iv: [u8; IV_LEN] = iv.as_bytes().try_into().map_err(|_| {
            RelayError::Config(format!(
                "AES IV must be exactly {} bytes, got {}",
                IV_LEN,
                iv.len()
            ))
        })?;

        if splice_index + KEY_WIDTH > DIGEST_HEX_LEN {
            return Err(RelayError::Config(format!(
                "AES splice index {} leaves fewer than {} digest characters for the key",
                splice_index, KEY_WIDTH
            )));
        }

        Ok(Self { iv, splice_index })
    }

    /// Generate a fresh passcode.
    pub fn mint() -> Secret {
        let passcode: String = OsRng
            .sample_iter(&Alphanumeric)
            .take(SECRET_LEN)
            .map(char::from)
            .collect();
        Secret(passcode)
    }

    /// SHA-256 of the passcode, hex-encoded.
    pub fn digest(secret: &Secret) -> Digest {
        Self::digest_str(secret.expose())
    }

    /// SHA-256 of an arbitrary string, hex-encoded.
    pub fn digest_str(value: &str) -> Digest {
        Digest::new(hex::encode(Sha256::digest(value.as_bytes())))
    }

    /// Encrypt a passcode under the key window of `key_material`.
    pub fn encrypt(&self, secret: &Secret, key_material: &Digest) -> Result<Ciphertext> {
        let key = self.key_window(key_material)?;

        // Holds plaintext until encrypted in place
        let mut buffer = Zeroizing::new(pad(secret.expose().as_bytes(), BLOCK_SIZE));
        let len = buffer.len();
        let encrypted = Aes256CbcEnc::new_from_slices(key, &self.iv)
            .map_err(|e| RelayError::Crypto(format!("Cipher init failed: {e}")))?
            .encrypt_padded_mut::<NoPadding>(&mut buffer[..], len)
            .map_err(|e| RelayError::Crypto(format!("Encryption failed: {e}")))?;

        Ok(Ciphertext::new(hex::encode(encrypted)))
    }

    /// Decrypt a relay ciphertext back to its passcode.
    ///
    /// # Errors
    ///
    /// Returns a crypto error if the ciphertext is not hex, is not a whole
    /// number of blocks, or unpads to garbage (usually the wrong key).
    pub fn decrypt(&self, ciphertext: &Ciphertext, key_material: &Digest) -> Result<Secret> {
        let key = self.key_window(key_material)?;

        // Wiped on every return path, including failed unpadding
        let mut buffer = Zeroizing::new(
            hex::decode(ciphertext.as_str())
                .map_err(|e| RelayError::Crypto(format!("Ciphertext is not hex: {e}")))?,
        );
        if buffer.is_empty() || buffer.len() % BLOCK_SIZE != 0 {
            return Err(RelayError::Crypto(format!(
                "Ciphertext length {} is not a positive multiple of {}",
                buffer.len(),
                BLOCK_SIZE
            )));
        }

        let decrypted = Aes256CbcDec::new_from_slices(key, &self.iv)
            .map_err(|e| RelayError::Crypto(format!("Cipher init failed: {e}")))?
            .decrypt_padded_mut::<NoPadding>(&mut buffer[..])
            .map_err(|e| RelayError::Crypto(format!("Decryption failed: {e}")))?;

        let plaintext = unpad(decrypted, BLOCK_SIZE)?;
        let passcode = std::str::from_utf8(plaintext)
            .map_err(|_| RelayError::Crypto("Decrypted passcode is not UTF-8".into()))?
            .to_string();

        Ok(Secret(passcode))
    }

    /// The 32 key bytes sliced out of the digest text.
    fn key_window<'a>(&self, key_material: &'a Digest) -> Result<&'a [u8]> {
        key_material
            .as_str()
            .as_bytes()
            .get(self.splice_index..self.splice_index + KEY_WIDTH)
            .ok_or_else(|| {
                RelayError::Config(format!(
                    "Key material is {} characters, key window needs {}",
                    key_material.as_str().len(),
                    self.splice_index + KEY_WIDTH
                ))
            })
    }
}

// =============================================================================
// Padding
// =============================================================================

/// PKCS#7 pad to a multiple of `block_size`. Always adds at least one byte.
pub fn pad(data: &[u8], block_size: usize) -> Vec<u8> {
    let padding = block_size - data.len() % block_size;
    let mut padded = Vec::with_capacity(data.len() + padding);
    padded.extend_from_slice(data);
    padded.resize(data.len() + padding, padding as u8);
    padded
}

/// Strip PKCS#7 padding, checking every pad byte.
pub fn unpad(data: &[u8], block_size: usize) -> Result<&[u8]> {
    let invalid = || RelayError::Crypto("Invalid padding".into());

    let &last = data.last().ok_or_else(invalid)?;
    let padding = usize::from(last);
    if padding == 0 || padding > block_size || padding > data.len() {
        return Err(invalid());
    }

    let (body, tail) = data.split_at(data.len() - padding);
    if tail.iter().any(|&b| b != last) {
        return Err(invalid());
    }
    Ok(body)
}

// =============================================================================
// Tests
// =============================================================================
