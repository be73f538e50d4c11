//! Identity derivation and ownership.
//!
//! An [`Identity`] is expanded deterministically from a [`Seed`]:
//!
//! 1. The seed, zero-padded to 32 bytes, is the Ed25519 secret seed.
//! 2. The X25519 secret is `clamp(SHA-512(seed32)[..32])`, the same
//!    scalar Ed25519 signs with.
//! 3. The X25519 public key is the Montgomery form of the Ed25519
//!    public key, and the [`SessionId`] is `05 ‖ x25519_pub`.
//!
//! [`IdentityManager`] owns the current identity behind an
//! `RwLock<Option<Arc<Identity>>>`. Replacing it swaps the `Arc`, so
//! callers that already cloned the old one finish against a consistent
//! key.

use std::sync::{Arc, RwLock};

use curve25519_dalek::scalar::clamp_integer;
use ed25519_dalek::{Signer, SigningKey};
use session_types::{Result, SessionError, SessionId};
use zeroize::{Zeroize, Zeroizing};

use crate::hash::sha512;
use crate::mnemonic::{self, Mnemonic, Seed};
use crate::ready::CryptoReady;
use crate::signing::{Ed25519PublicKey, Signature};

// ---------------------------------------------------------------------------
// Identity
// ---------------------------------------------------------------------------

/// A user's long-term key material.
pub struct Identity {
    seed: Seed,
    signing_key: SigningKey,
    x25519_secret: x25519_dalek::StaticSecret,
    x25519_public: [u8; 32],
    session_id: SessionId,
}

// Identity does not implement Clone/Debug to prevent leakage.

impl Identity {
    /// Expands a seed into a full identity.
    ///
    /// # Errors
    ///
    /// [`SessionError::InvalidSeed`] if the derived Ed25519 key does not
    /// map to a Montgomery point.
    pub fn from_seed(_ready: &CryptoReady, seed: Seed) -> Result<Self> {
        let mut ed_seed = seed.to_ed25519_seed();
        let signing_key = SigningKey::from_bytes(&ed_seed);

        let mut expanded = sha512(&ed_seed);
        ed_seed.zeroize();
        let mut scalar_bytes = [0u8; 32];
        scalar_bytes.copy_from_slice(&expanded[..32]);
        expanded.zeroize();
        let x25519_secret = x25519_dalek::StaticSecret::from(clamp_integer(scalar_bytes));
        scalar_bytes.zeroize();

        let ed_public = Ed25519PublicKey::from_bytes(signing_key.verifying_key().to_bytes());
        let x25519_public = ed_public.to_x25519().map_err(|e| SessionError::InvalidSeed {
            reason: e.to_string(),
        })?;

        let derived = x25519_dalek::PublicKey::from(&x25519_secret);
        if derived.as_bytes() != &x25519_public {
            return Err(SessionError::InvalidSeed {
                reason: "x25519 key does not match ed25519 key".into(),
            });
        }

        Ok(Self {
            seed,
            signing_key,
            x25519_secret,
            x25519_public,
            session_id: SessionId::from_x25519(x25519_public),
        })
    }

    /// Decodes a mnemonic and expands it into an identity.
    pub fn from_mnemonic(ready: &CryptoReady, phrase: &str) -> Result<Self> {
        let seed = mnemonic::mnemonic_to_seed(phrase)?;
        Self::from_seed(ready, seed)
    }

    /// The account's Session ID.
    pub fn session_id(&self) -> SessionId {
        self.session_id
    }

    /// The Ed25519 public key.
    pub fn ed25519_public_key(&self) -> Ed25519PublicKey {
        Ed25519PublicKey::from_bytes(self.signing_key.verifying_key().to_bytes())
    }

    /// The X25519 public key (no prefix).
    pub fn x25519_public_key(&self) -> &[u8; 32] {
        &self.x25519_public
    }

    /// Re-encodes the seed as an English mnemonic.
    pub fn mnemonic(&self) -> Result<Mnemonic> {
        mnemonic::seed_to_mnemonic(&self.seed)
    }

    /// Signs `message` with the Ed25519 key.
    pub fn sign(&self, message: &[u8]) -> Signature {
        Signature::from_bytes(self.signing_key.sign(message).to_bytes())
    }

    /// `SHA-512(seed32)`: the clamped-scalar half and the nonce half
    /// used by blinded signing.
    pub(crate) fn expanded_secret(&self) -> Zeroizing<[u8; 64]> {
        let mut ed_seed = self.seed.to_ed25519_seed();
        let expanded = Zeroizing::new(sha512(&ed_seed));
        ed_seed.zeroize();
        expanded
    }

    /// Raw X25519 secret bytes for sealed-box opening.
    pub(crate) fn x25519_secret_bytes(&self) -> Zeroizing<[u8; 32]> {
        Zeroizing::new(self.x25519_secret.to_bytes())
    }
}

// ---------------------------------------------------------------------------
// IdentityManager
// ---------------------------------------------------------------------------

/// Holds the identity currently in use by one client.
pub struct IdentityManager {
    ready: CryptoReady,
    current: RwLock<Option<Arc<Identity>>>,
}

impl IdentityManager {
    /// Creates an empty manager. Requires a completed [`crate::ready::init`].
    pub fn new(ready: &CryptoReady) -> Self {
        Self {
            ready: *ready,
            current: RwLock::new(None),
        }
    }

    /// Replaces the current identity with one derived from `phrase`.
    ///
    /// On error the previous identity stays in place.
    pub fn set_mnemonic(&self, phrase: &str) -> Result<SessionId> {
        let identity = Identity::from_mnemonic(&self.ready, phrase)?;
        self.install(identity)
    }

    /// Replaces the current identity with one derived from `seed`.
    pub fn set_seed(&self, seed: Seed) -> Result<SessionId> {
        let identity = Identity::from_seed(&self.ready, seed)?;
        self.install(identity)
    }

    fn install(&self, identity: Identity) -> Result<SessionId> {
        let session_id = identity.session_id();
        let mut guard = self.current.write().map_err(|e| SessionError::CryptoError {
            reason: format!("identity lock poisoned: {e}"),
        })?;
        *guard = Some(Arc::new(identity));
        Ok(session_id)
    }

    /// Returns a handle to the current identity.
    ///
    /// # Errors
    ///
    /// [`SessionError::NotInitialized`] if no mnemonic or seed has been set.
    pub fn current(&self) -> Result<Arc<Identity>> {
        let guard = self.current.read().map_err(|e| SessionError::CryptoError {
            reason: format!("identity lock poisoned: {e}"),
        })?;
        guard.clone().ok_or_else(|| SessionError::NotInitialized {
            reason: "no identity set; call set_mnemonic first".into(),
        })
    }

    /// The current Session ID.
    pub fn session_id(&self) -> Result<SessionId> {
        Ok(self.current()?.session_id())
    }

    /// `true` once an identity has been installed.
    pub fn is_initialized(&self) -> bool {
        self.current().is_ok()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ready;

    const PUFFIN: &str =
        "puffin luxury annoyed rustled memoir faxed smidgen puddle kiwi nylon utopia zinger kiwi";

    #[test]
    fn puffin_session_id() -> std::result::Result<(), SessionError> {
        let ready = ready::init()?;
        let identity = Identity::from_mnemonic(&ready, PUFFIN)?;
        assert_eq!(
            identity.session_id().to_string(),
            "054830367d369d94605247999a375dbd0a0f65fdec5de1535612bcb6d4de452c69"
        );
        Ok(())
    }

    #[test]
    fn mnemonic_roundtrips_through_identity() -> std::result::Result<(), SessionError> {
        let ready = ready::init()?;
        let identity = Identity::from_mnemonic(&ready, PUFFIN)?;
        assert_eq!(identity.mnemonic()?.as_str(), PUFFIN);
        Ok(())
    }

    #[test]
    fn x25519_secret_matches_public() -> std::result::Result<(), SessionError> {
        let ready = ready::init()?;
        let identity = Identity::from_seed(&ready, Seed::from_bytes(&[9u8; 32])?)?;
        let secret = x25519_dalek::StaticSecret::from(*identity.x25519_secret_bytes());
        let public = x25519_dalek::PublicKey::from(&secret);
        assert_eq!(public.as_bytes(), identity.x25519_public_key());
        Ok(())
    }

    #[test]
    fn manager_starts_uninitialized() -> std::result::Result<(), SessionError> {
        let manager = IdentityManager::new(&ready::init()?);
        assert!(!manager.is_initialized());
        assert!(matches!(manager.current(), Err(SessionError::NotInitialized { .. })));
        Ok(())
    }

    #[test]
    fn manager_replaces_identity_atomically() -> std::result::Result<(), SessionError> {
        let manager = IdentityManager::new(&ready::init()?);
        manager.set_mnemonic(PUFFIN)?;
        let held = manager.current()?;

        let new_id = manager.set_seed(Seed::from_bytes(&[1u8; 16])?)?;
        assert_ne!(held.session_id(), new_id);
        assert_eq!(manager.session_id()?, new_id);
        // The old handle still signs with the old key.
        let sig = held.sign(b"in flight");
        crate::signing::verify(&held.ed25519_public_key(), b"in flight", &sig)?;
        Ok(())
    }

    #[test]
    fn failed_set_keeps_previous_identity() -> std::result::Result<(), SessionError> {
        let manager = IdentityManager::new(&ready::init()?);
        let id = manager.set_mnemonic(PUFFIN)?;
        assert!(manager.set_mnemonic("not a phrase").is_err());
        assert_eq!(manager.session_id()?, id);
        Ok(())
    }
}
