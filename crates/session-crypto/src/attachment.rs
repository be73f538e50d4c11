//! Attachment encryption (Encrypt-then-MAC).
//!
//! Every attachment gets a fresh 64-byte key: the first half is the
//! AES-256-CBC key, the second half the HMAC-SHA256 key. The uploaded
//! blob is
//!
//! ```text
//! iv(16) ‖ AES-256-CBC(PKCS#7(plaintext)) ‖ HMAC-SHA256(iv ‖ ciphertext)
//! ```
//!
//! and its SHA-256 digest travels in the attachment pointer next to
//! the key, so the recipient can check the download before decrypting.

use aes::cipher::block_padding::Pkcs7;
use aes::cipher::{BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use hmac::{Hmac, Mac};
use rand::rngs::OsRng;
use rand::RngCore;
use session_types::{Result, SessionError};
use sha2::{Digest, Sha256};
use zeroize::{Zeroize, ZeroizeOnDrop};

type Aes256CbcEnc = cbc::Encryptor<aes::Aes256>;
type Aes256CbcDec = cbc::Decryptor<aes::Aes256>;
type HmacSha256 = Hmac<Sha256>;

/// Combined AES + HMAC key length in bytes.
pub const ATTACHMENT_KEY_LEN: usize = 64;

/// CBC IV length in bytes.
pub const ATTACHMENT_IV_LEN: usize = 16;

/// HMAC-SHA256 tag length in bytes.
pub const ATTACHMENT_MAC_LEN: usize = 32;

/// Largest attachment the file server accepts.
pub const MAX_ATTACHMENT_SIZE: usize = 10_000_000;

/// Smallest padded attachment size.
const MIN_PADDED_SIZE: usize = 541;

// ---------------------------------------------------------------------------
// AttachmentKey
// ---------------------------------------------------------------------------

/// Per-attachment key material. Zeroized on drop.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct AttachmentKey([u8; ATTACHMENT_KEY_LEN]);

impl AttachmentKey {
    /// Draws a fresh key from OS entropy.
    pub fn generate() -> Self {
        let mut bytes = [0u8; ATTACHMENT_KEY_LEN];
        OsRng.fill_bytes(&mut bytes);
        Self(bytes)
    }

    /// Wraps the key carried in an attachment pointer.
    pub fn from_slice(bytes: &[u8]) -> Result<Self> {
        let array: [u8; ATTACHMENT_KEY_LEN] = bytes.try_into().map_err(|_| SessionError::CryptoError {
            reason: format!(
                "attachment key must be {ATTACHMENT_KEY_LEN} bytes, got {}",
                bytes.len()
            ),
        })?;
        Ok(Self(array))
    }

    pub fn as_bytes(&self) -> &[u8; ATTACHMENT_KEY_LEN] {
        &self.0
    }

    fn aes_key(&self) -> &[u8] {
        &self.0[..32]
    }

    fn mac_key(&self) -> &[u8] {
        &self.0[32..]
    }

    fn mac(&self) -> Result<HmacSha256> {
        HmacSha256::new_from_slice(self.mac_key()).map_err(|e| SessionError::CryptoError {
            reason: format!("HMAC-SHA256 key init failed: {e}"),
        })
    }
}

// ---------------------------------------------------------------------------
// Padding
// ---------------------------------------------------------------------------

/// Size an attachment of `len` bytes is padded to: the next power of
/// 1.05, at least 541 bytes, capped at [`MAX_ATTACHMENT_SIZE`] for
/// inputs that fit under it.
pub fn padded_size(len: usize) -> usize {
    let exponent = ((len.max(1) as f64).ln() / 1.05f64.ln()).ceil();
    let bucket = (1.05f64.powf(exponent).floor() as usize).max(len);
    let size = bucket.max(MIN_PADDED_SIZE);
    if size > MAX_ATTACHMENT_SIZE && len <= MAX_ATTACHMENT_SIZE {
        MAX_ATTACHMENT_SIZE
    } else {
        size
    }
}

/// Zero-fills `data` up to [`padded_size`] to hide its real length.
pub fn pad_attachment(data: &[u8]) -> Vec<u8> {
    let mut padded = data.to_vec();
    padded.resize(padded_size(data.len()), 0);
    padded
}

// ---------------------------------------------------------------------------
// Encrypt / Decrypt
// ---------------------------------------------------------------------------

/// Output of [`encrypt_attachment`]: the blob to upload plus the key
/// and digest to put in the attachment pointer.
pub struct EncryptedAttachment {
    pub ciphertext: Vec<u8>,
    pub digest: [u8; 32],
    pub key: AttachmentKey,
}

/// Encrypts `data` under a fresh key and IV, optionally padding it
/// first.
pub fn encrypt_attachment(data: &[u8], pad: bool) -> Result<EncryptedAttachment> {
    let key = AttachmentKey::generate();
    let mut iv = [0u8; ATTACHMENT_IV_LEN];
    OsRng.fill_bytes(&mut iv);

    let (ciphertext, digest) = if pad {
        encrypt_attachment_with(&pad_attachment(data), &key, &iv)?
    } else {
        encrypt_attachment_with(data, &key, &iv)?
    };
    Ok(EncryptedAttachment { ciphertext, digest, key })
}

/// Encrypts with explicit key material. Returns the blob and its
/// SHA-256 digest.
pub fn encrypt_attachment_with(
    plaintext: &[u8],
    key: &AttachmentKey,
    iv: &[u8; ATTACHMENT_IV_LEN],
) -> Result<(Vec<u8>, [u8; 32])> {
    let ciphertext = Aes256CbcEnc::new_from_slices(key.aes_key(), iv)
        .map_err(|e| SessionError::CryptoError {
            reason: format!("AES-CBC init failed: {e}"),
        })?
        .encrypt_padded_vec_mut::<Pkcs7>(plaintext);

    let mut blob = Vec::with_capacity(ATTACHMENT_IV_LEN + ciphertext.len() + ATTACHMENT_MAC_LEN);
    blob.extend_from_slice(iv);
    blob.extend_from_slice(&ciphertext);

    let mut mac = key.mac()?;
    mac.update(&blob);
    blob.extend_from_slice(&mac.finalize().into_bytes());

    let digest: [u8; 32] = Sha256::digest(&blob).into();
    Ok((blob, digest))
}

/// Verifies and decrypts a downloaded attachment.
///
/// `size` is the plaintext length announced in the pointer; padding
/// beyond it is cut off.
///
/// # Errors
///
/// Returns [`SessionError::CryptoError`] if:
/// - the key is not 64 bytes or the blob is shorter than `iv ‖ mac`,
/// - the HMAC or the SHA-256 digest does not match,
/// - PKCS#7 unpadding fails,
/// - `size` exceeds the decrypted length.
pub fn decrypt_attachment(data: &[u8], key: &[u8], digest: &[u8], size: Option<usize>) -> Result<Vec<u8>> {
    let key = AttachmentKey::from_slice(key)?;
    if data.len() < ATTACHMENT_IV_LEN + ATTACHMENT_MAC_LEN {
        return Err(SessionError::CryptoError {
            reason: format!("attachment too short: {} bytes", data.len()),
        });
    }

    let (authenticated, tag) = data.split_at(data.len() - ATTACHMENT_MAC_LEN);
    let mut mac = key.mac()?;
    mac.update(authenticated);
    mac.verify_slice(tag).map_err(|_| SessionError::CryptoError {
        reason: "bad attachment MAC".into(),
    })?;

    let computed = Sha256::digest(data);
    if computed.as_slice() != digest {
        return Err(SessionError::CryptoError {
            reason: "bad attachment digest".into(),
        });
    }

    let (iv, ciphertext) = authenticated.split_at(ATTACHMENT_IV_LEN);
    let mut plaintext = Aes256CbcDec::new_from_slices(key.aes_key(), iv)
        .map_err(|e| SessionError::CryptoError {
            reason: format!("AES-CBC init failed: {e}"),
        })?
        .decrypt_padded_vec_mut::<Pkcs7>(ciphertext)
        .map_err(|_| SessionError::CryptoError {
            reason: "attachment padding is invalid".into(),
        })?;

    if let Some(size) = size {
        if size > plaintext.len() {
            return Err(SessionError::CryptoError {
                reason: format!("attachment size {size} exceeds decrypted length {}", plaintext.len()),
            });
        }
        plaintext.truncate(size);
    }
    Ok(plaintext)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    type TestResult = std::result::Result<(), SessionError>;

    #[test]
    fn padded_size_buckets() {
        assert_eq!(padded_size(0), MIN_PADDED_SIZE);
        assert_eq!(padded_size(3), MIN_PADDED_SIZE);
        assert!(padded_size(1000) >= 1000);
        assert!(padded_size(1000) < 1050);
        assert_eq!(padded_size(MAX_ATTACHMENT_SIZE - 1), MAX_ATTACHMENT_SIZE);
    }

    #[test]
    fn padded_roundtrip() -> TestResult {
        let enc = encrypt_attachment(b"hello world", true)?;
        assert!(enc.ciphertext.len() > MIN_PADDED_SIZE);
        let plain = decrypt_attachment(&enc.ciphertext, enc.key.as_bytes(), &enc.digest, Some(11))?;
        assert_eq!(plain, b"hello world");
        Ok(())
    }

    #[test]
    fn unpadded_roundtrip_without_size() -> TestResult {
        let enc = encrypt_attachment(b"abc", false)?;
        assert_eq!(enc.ciphertext.len(), ATTACHMENT_IV_LEN + 16 + ATTACHMENT_MAC_LEN);
        let plain = decrypt_attachment(&enc.ciphertext, enc.key.as_bytes(), &enc.digest, None)?;
        assert_eq!(plain, b"abc");
        Ok(())
    }

    #[test]
    fn digest_covers_whole_blob() -> TestResult {
        let enc = encrypt_attachment(b"data", true)?;
        let expected: [u8; 32] = Sha256::digest(&enc.ciphertext).into();
        assert_eq!(enc.digest, expected);
        Ok(())
    }

    #[test]
    fn bad_digest_rejected() -> TestResult {
        let enc = encrypt_attachment(b"data", true)?;
        let mut digest = enc.digest;
        digest[0] ^= 0xFF;
        let err = decrypt_attachment(&enc.ciphertext, enc.key.as_bytes(), &digest, Some(4));
        assert!(matches!(err, Err(SessionError::CryptoError { reason }) if reason.contains("digest")));
        Ok(())
    }

    #[test]
    fn tampered_ciphertext_fails_mac() -> TestResult {
        let enc = encrypt_attachment(b"data", true)?;
        let mut blob = enc.ciphertext.clone();
        blob[ATTACHMENT_IV_LEN + 1] ^= 0x01;
        let digest: [u8; 32] = Sha256::digest(&blob).into();
        let err = decrypt_attachment(&blob, enc.key.as_bytes(), &digest, None);
        assert!(matches!(err, Err(SessionError::CryptoError { reason }) if reason.contains("MAC")));
        Ok(())
    }

    #[test]
    fn oversized_announced_length_rejected() -> TestResult {
        let enc = encrypt_attachment(b"abc", false)?;
        let err = decrypt_attachment(&enc.ciphertext, enc.key.as_bytes(), &enc.digest, Some(4));
        assert!(matches!(err, Err(SessionError::CryptoError { .. })));
        Ok(())
    }

    #[test]
    fn bad_key_and_short_blob_rejected() -> TestResult {
        let enc = encrypt_attachment(b"abc", false)?;
        assert!(decrypt_attachment(&enc.ciphertext, &[0u8; 32], &enc.digest, None).is_err());
        assert!(decrypt_attachment(&[0u8; 40], enc.key.as_bytes(), &enc.digest, None).is_err());
        Ok(())
    }
}
