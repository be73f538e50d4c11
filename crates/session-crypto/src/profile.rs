//! Profile picture encryption.
//!
//! Avatars are encrypted with AES-256-GCM under a 32-byte profile key
//! that travels inside messages next to the avatar URL. The uploaded
//! blob is laid out as:
//!
//! ```text
//! iv(12) ‖ ciphertext ‖ tag(16)
//! ```

use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes256Gcm, Key, Nonce};
use rand::rngs::OsRng;
use rand::RngCore;
use session_types::{Result, SessionError};
use zeroize::{Zeroize, ZeroizeOnDrop};

/// Profile key length in bytes.
pub const PROFILE_KEY_LEN: usize = 32;

/// AES-GCM nonce length in bytes.
pub const PROFILE_IV_LEN: usize = 12;

/// AES-GCM tag length in bytes.
pub const PROFILE_TAG_LEN: usize = 16;

// ---------------------------------------------------------------------------
// ProfileKey
// ---------------------------------------------------------------------------

/// 256-bit key shared with contacts so they can open our avatar.
///
/// Zeroized on drop.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct ProfileKey([u8; PROFILE_KEY_LEN]);

impl ProfileKey {
    /// Draws a fresh key from OS entropy.
    pub fn generate() -> Self {
        let mut bytes = [0u8; PROFILE_KEY_LEN];
        OsRng.fill_bytes(&mut bytes);
        Self(bytes)
    }

    /// Wraps key bytes received on the wire.
    pub fn from_slice(bytes: &[u8]) -> Result<Self> {
        let array: [u8; PROFILE_KEY_LEN] = bytes.try_into().map_err(|_| SessionError::CryptoError {
            reason: format!("profile key must be {PROFILE_KEY_LEN} bytes, got {}", bytes.len()),
        })?;
        Ok(Self(array))
    }

    pub fn as_bytes(&self) -> &[u8; PROFILE_KEY_LEN] {
        &self.0
    }

    fn cipher(&self) -> Aes256Gcm {
        Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(&self.0))
    }
}

// ---------------------------------------------------------------------------
// Encrypt / Decrypt
// ---------------------------------------------------------------------------

/// Encrypts avatar bytes under `key` with a random IV.
pub fn encrypt_profile(data: &[u8], key: &ProfileKey) -> Result<Vec<u8>> {
    let mut iv = [0u8; PROFILE_IV_LEN];
    OsRng.fill_bytes(&mut iv);
    encrypt_profile_with_iv(data, key, &iv)
}

/// Encrypts with a caller-supplied IV. The IV must never repeat under
/// the same key.
pub fn encrypt_profile_with_iv(data: &[u8], key: &ProfileKey, iv: &[u8; PROFILE_IV_LEN]) -> Result<Vec<u8>> {
    let ciphertext = key
        .cipher()
        .encrypt(Nonce::from_slice(iv), data)
        .map_err(|e| SessionError::CryptoError {
            reason: format!("profile encryption failed: {e}"),
        })?;

    let mut out = Vec::with_capacity(PROFILE_IV_LEN + ciphertext.len());
    out.extend_from_slice(iv);
    out.extend_from_slice(&ciphertext);
    Ok(out)
}

/// Decrypts a blob produced by [`encrypt_profile`].
///
/// # Errors
///
/// Returns [`SessionError::CryptoError`] if the blob is shorter than
/// `iv ‖ tag` plus one byte, or if authentication fails (wrong key or
/// tampered data).
pub fn decrypt_profile(data: &[u8], key: &ProfileKey) -> Result<Vec<u8>> {
    let min_len = PROFILE_IV_LEN + PROFILE_TAG_LEN + 1;
    if data.len() < min_len {
        return Err(SessionError::CryptoError {
            reason: format!("profile blob too short: {} < {min_len}", data.len()),
        });
    }

    let (iv, ciphertext) = data.split_at(PROFILE_IV_LEN);
    key.cipher()
        .decrypt(Nonce::from_slice(iv), ciphertext)
        .map_err(|_| SessionError::CryptoError {
            reason: "profile decryption failed: authentication tag mismatch".into(),
        })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    type TestResult = std::result::Result<(), SessionError>;

    #[test]
    fn roundtrip() -> TestResult {
        let key = ProfileKey::generate();
        let blob = encrypt_profile(b"avatar bytes", &key)?;
        assert_eq!(blob.len(), PROFILE_IV_LEN + 12 + PROFILE_TAG_LEN);
        assert_eq!(decrypt_profile(&blob, &key)?, b"avatar bytes");
        Ok(())
    }

    #[test]
    fn iv_is_prepended() -> TestResult {
        let key = ProfileKey::from_slice(&[9u8; 32])?;
        let iv = [3u8; PROFILE_IV_LEN];
        let blob = encrypt_profile_with_iv(b"x", &key, &iv)?;
        assert_eq!(&blob[..PROFILE_IV_LEN], &iv);
        Ok(())
    }

    #[test]
    fn tampered_blob_rejected() -> TestResult {
        let key = ProfileKey::generate();
        let mut blob = encrypt_profile(b"avatar bytes", &key)?;
        let last = blob.len() - 1;
        blob[last] ^= 0x01;
        assert!(matches!(decrypt_profile(&blob, &key), Err(SessionError::CryptoError { .. })));

        let mut blob = encrypt_profile(b"avatar bytes", &key)?;
        blob[PROFILE_IV_LEN] ^= 0x80;
        assert!(decrypt_profile(&blob, &key).is_err());
        Ok(())
    }

    #[test]
    fn wrong_key_rejected() -> TestResult {
        let blob = encrypt_profile(b"avatar bytes", &ProfileKey::generate())?;
        assert!(decrypt_profile(&blob, &ProfileKey::generate()).is_err());
        Ok(())
    }

    #[test]
    fn bad_lengths_rejected() {
        assert!(ProfileKey::from_slice(b"short").is_err());
        let key = ProfileKey::generate();
        let too_short = vec![0u8; PROFILE_IV_LEN + PROFILE_TAG_LEN];
        assert!(matches!(decrypt_profile(&too_short, &key), Err(SessionError::CryptoError { .. })));
    }
}
