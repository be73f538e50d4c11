//! Sealed-box encryption for one-to-one messages.
//!
//! The sender signs `plaintext ‖ sender_ed_pub ‖ recipient_x25519_pub`,
//! appends its Ed25519 public key and the signature to the plaintext,
//! and seals the result anonymously to the recipient's X25519 key:
//!
//! ```text
//! seal(recipient_x25519, plaintext ‖ ed_pub(32) ‖ sig(64))
//! ```
//!
//! Opening reverses this and authenticates the sender, whose
//! [`SessionId`] is derived from the embedded Ed25519 key.

use curve25519_dalek::scalar::clamp_integer;
use rand::rngs::OsRng;
use session_types::{Result, SessionError, SessionId};
use zeroize::Zeroizing;

use crate::identity::Identity;
use crate::signing::{verify, Ed25519PublicKey, Signature};

/// Trailer length: Ed25519 public key plus signature.
const TRAILER_LEN: usize = Ed25519PublicKey::LEN + Signature::LEN;

/// A successfully opened and authenticated message.
#[derive(Debug)]
pub struct Opened {
    /// Inner plaintext (still padded, if the sender padded it).
    pub plaintext: Vec<u8>,
    /// The authenticated sender.
    pub sender: SessionId,
    /// The sender's Ed25519 key, as embedded in the ciphertext.
    pub sender_ed25519: Ed25519PublicKey,
}

fn verification_data(plaintext: &[u8], sender: &Ed25519PublicKey, recipient: &[u8; 32]) -> Vec<u8> {
    let mut data = Vec::with_capacity(plaintext.len() + 64);
    data.extend_from_slice(plaintext);
    data.extend_from_slice(sender.as_bytes());
    data.extend_from_slice(recipient);
    data
}

/// Signs and seals `plaintext` for `recipient`.
pub fn seal_for_recipient(sender: &Identity, recipient: &SessionId, plaintext: &[u8]) -> Result<Vec<u8>> {
    let recipient_x25519 = recipient.x25519_bytes();
    let ed_pub = sender.ed25519_public_key();
    let signature = sender.sign(&verification_data(plaintext, &ed_pub, recipient_x25519));

    let mut inner = Zeroizing::new(Vec::with_capacity(plaintext.len() + TRAILER_LEN));
    inner.extend_from_slice(plaintext);
    inner.extend_from_slice(ed_pub.as_bytes());
    inner.extend_from_slice(signature.as_bytes());

    crypto_box::PublicKey::from(*recipient_x25519)
        .seal(&mut OsRng, &inner)
        .map_err(|e| SessionError::CryptoError {
            reason: format!("sealing failed: {e}"),
        })
}

/// Opens a sealed message addressed to `recipient` and verifies the
/// sender's signature.
///
/// # Errors
///
/// - [`SessionError::CryptoError`] if the box cannot be opened or is
///   too short to carry a trailer.
/// - [`SessionError::SignatureVerificationFailed`] if the signature
///   does not match.
pub fn open_sealed(recipient: &Identity, ciphertext: &[u8]) -> Result<Opened> {
    let secret = Zeroizing::new(clamp_integer(*recipient.x25519_secret_bytes()));
    let inner = Zeroizing::new(
        crypto_box::SecretKey::from(*secret)
            .unseal(ciphertext)
            .map_err(|e| SessionError::CryptoError {
                reason: format!("unsealing failed: {e}"),
            })?,
    );

    if inner.len() <= TRAILER_LEN {
        return Err(SessionError::CryptoError {
            reason: format!("sealed payload too short: {} bytes", inner.len()),
        });
    }

    let split = inner.len() - TRAILER_LEN;
    let (plaintext, trailer) = inner.split_at(split);
    let (ed_bytes, sig_bytes) = trailer.split_at(Ed25519PublicKey::LEN);

    let mut ed_arr = [0u8; 32];
    ed_arr.copy_from_slice(ed_bytes);
    let sender_ed25519 = Ed25519PublicKey::from_bytes(ed_arr);
    let signature = Signature::from_slice(sig_bytes)?;

    verify(
        &sender_ed25519,
        &verification_data(plaintext, &sender_ed25519, recipient.x25519_public_key()),
        &signature,
    )?;

    let sender = sender_ed25519
        .to_session_id()
        .map_err(|e| SessionError::SignatureVerificationFailed {
            reason: format!("sender key unusable: {e}"),
        })?;

    Ok(Opened {
        plaintext: plaintext.to_vec(),
        sender,
        sender_ed25519,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mnemonic::Seed;
    use crate::ready;

    fn identity(byte: u8) -> std::result::Result<Identity, SessionError> {
        Identity::from_seed(&ready::init()?, Seed::from_bytes(&[byte; 16])?)
    }

    #[test]
    fn seal_then_open() -> std::result::Result<(), SessionError> {
        let alice = identity(1)?;
        let bob = identity(2)?;
        let sealed = seal_for_recipient(&alice, &bob.session_id(), b"hello bob")?;
        let opened = open_sealed(&bob, &sealed)?;
        assert_eq!(opened.plaintext, b"hello bob");
        assert_eq!(opened.sender, alice.session_id());
        assert_eq!(opened.sender_ed25519, alice.ed25519_public_key());
        Ok(())
    }

    #[test]
    fn wrong_recipient_cannot_open() -> std::result::Result<(), SessionError> {
        let alice = identity(1)?;
        let bob = identity(2)?;
        let eve = identity(3)?;
        let sealed = seal_for_recipient(&alice, &bob.session_id(), b"secret")?;
        assert!(matches!(open_sealed(&eve, &sealed), Err(SessionError::CryptoError { .. })));
        Ok(())
    }

    #[test]
    fn corrupted_ciphertext_rejected() -> std::result::Result<(), SessionError> {
        let alice = identity(1)?;
        let bob = identity(2)?;
        let mut sealed = seal_for_recipient(&alice, &bob.session_id(), b"x")?;
        let last = sealed.len() - 1;
        sealed[last] ^= 0x01;
        assert!(open_sealed(&bob, &sealed).is_err());
        Ok(())
    }

    #[test]
    fn forged_signature_rejected() -> std::result::Result<(), SessionError> {
        let alice = identity(1)?;
        let bob = identity(2)?;
        let ed_pub = alice.ed25519_public_key();

        // Valid box, but the signature covers a different recipient.
        let bogus_sig = alice.sign(b"unrelated");
        let mut inner = b"forged".to_vec();
        inner.extend_from_slice(ed_pub.as_bytes());
        inner.extend_from_slice(bogus_sig.as_bytes());
        let sealed = crypto_box::PublicKey::from(*bob.x25519_public_key())
            .seal(&mut OsRng, &inner)
            .map_err(|e| SessionError::CryptoError { reason: e.to_string() })?;

        assert!(matches!(
            open_sealed(&bob, &sealed),
            Err(SessionError::SignatureVerificationFailed { .. })
        ));
        Ok(())
    }
}
