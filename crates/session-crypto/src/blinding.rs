//! 15-blinded keys for open-group servers.
//!
//! For a server public key `S` and identity scalar `a`:
//!
//! ```text
//! k  = Blake2b-512(S) mod L
//! ka = k · a mod L
//! kA = ka · B
//! ```
//!
//! `kA` is the per-server pseudonymous public key, published as
//! `15 ‖ hex(kA)`. Signatures made with `ka` verify as ordinary
//! Ed25519 signatures under `kA`.

use curve25519_dalek::edwards::EdwardsPoint;
use curve25519_dalek::scalar::{clamp_integer, Scalar};
use session_types::BlindedId;
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::hash::{blake2b_512, sha512_multipart};
use crate::identity::Identity;
use crate::signing::{Ed25519PublicKey, Signature};

/// Per-server blinded keypair. Zeroized on drop.
#[derive(Zeroize, ZeroizeOnDrop)]
pub struct BlindedKeyPair {
    secret: Scalar,
    public: [u8; 32],
}

// BlindedKeyPair does not implement Clone/Debug to prevent leakage.

impl BlindedKeyPair {
    /// The blinded public key `kA`.
    pub fn public_key(&self) -> &[u8; 32] {
        &self.public
    }

    /// `kA` as an Ed25519 public key, for verification.
    pub fn ed25519_public_key(&self) -> Ed25519PublicKey {
        Ed25519PublicKey::from_bytes(self.public)
    }

    /// The `15`-prefixed blinded identifier.
    pub fn blinded_id(&self) -> BlindedId {
        BlindedId::from_blinded_pubkey(self.public)
    }
}

/// Blinding factor `k` for a server key.
pub fn blinding_factor(server_pk: &[u8; 32]) -> Scalar {
    Scalar::from_bytes_mod_order_wide(&blake2b_512(server_pk))
}

/// Derives the blinded keypair of `identity` for one server.
pub fn derive_blinded_keypair(identity: &Identity, server_pk: &[u8; 32]) -> BlindedKeyPair {
    let k = blinding_factor(server_pk);

    let expanded = identity.expanded_secret();
    let mut a_bytes = [0u8; 32];
    a_bytes.copy_from_slice(&expanded[..32]);
    let mut a = Scalar::from_bytes_mod_order(clamp_integer(a_bytes));
    a_bytes.zeroize();

    let secret = k * a;
    a.zeroize();
    let public = EdwardsPoint::mul_base(&secret).compress().to_bytes();

    BlindedKeyPair { secret, public }
}

/// Shorthand for the blinded ID of `identity` on one server.
pub fn blind_session_id(identity: &Identity, server_pk: &[u8; 32]) -> BlindedId {
    derive_blinded_keypair(identity, server_pk).blinded_id()
}

/// Signs `message` with a blinded key.
///
/// The nonce is derived from the second half of the identity's
/// expanded secret, the blinded public key, and the message:
///
/// ```text
/// r    = SHA-512(h[32..] ‖ kA ‖ M) mod L
/// R    = r · B
/// hram = SHA-512(R ‖ kA ‖ M) mod L
/// s    = r + hram · ka
/// ```
pub fn sign_blinded(identity: &Identity, keypair: &BlindedKeyPair, message: &[u8]) -> Signature {
    let expanded = identity.expanded_secret();
    let mut r = Scalar::from_bytes_mod_order_wide(&sha512_multipart(&[
        &expanded[32..],
        &keypair.public[..],
        message,
    ]));
    let sig_r = EdwardsPoint::mul_base(&r).compress().to_bytes();

    let hram = Scalar::from_bytes_mod_order_wide(&sha512_multipart(&[
        &sig_r[..],
        &keypair.public[..],
        message,
    ]));
    let s = r + hram * keypair.secret;
    r.zeroize();

    let mut out = [0u8; 64];
    out[..32].copy_from_slice(&sig_r);
    out[32..].copy_from_slice(s.as_bytes());
    Signature::from_bytes(out)
}
