//! One-time crypto initialization.
//!
//! [`init`] runs a sign/verify self-test once per process and hands
//! back a [`CryptoReady`] token. Identity and signing entry points take
//! the token by reference, so they cannot be reached before
//! initialization has succeeded.

use std::sync::OnceLock;

use ed25519_dalek::{Signer, SigningKey, Verifier};
use session_types::{Result, SessionError};

static SELF_TEST: OnceLock<std::result::Result<(), String>> = OnceLock::new();

/// Proof that [`init`] completed successfully.
///
/// Cannot be constructed outside this module.
#[derive(Clone, Copy, Debug)]
pub struct CryptoReady {
    _private: (),
}

/// Initializes the crypto layer.
///
/// Idempotent: the self-test runs on the first call only and later
/// calls return the cached outcome.
///
/// # Errors
///
/// Returns [`SessionError::CryptoError`] if the self-test fails.
pub fn init() -> Result<CryptoReady> {
    match SELF_TEST.get_or_init(self_test) {
        Ok(()) => Ok(CryptoReady { _private: () }),
        Err(reason) => Err(SessionError::CryptoError {
            reason: reason.clone(),
        }),
    }
}

fn self_test() -> std::result::Result<(), String> {
    let key = SigningKey::from_bytes(&[0x42u8; 32]);
    let message = b"session crypto self-test";
    let signature = key.sign(message);
    key.verifying_key()
        .verify(message, &signature)
        .map_err(|e| format!("ed25519 self-test failed: {e}"))?;

    let secret = x25519_dalek::StaticSecret::from([0x24u8; 32]);
    let public = x25519_dalek::PublicKey::from(&secret);
    if public.as_bytes() == &[0u8; 32] {
        return Err("x25519 self-test produced the identity point".into());
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn init_is_idempotent() -> std::result::Result<(), SessionError> {
        let _first = init()?;
        let _second = init()?;
        Ok(())
    }
}
