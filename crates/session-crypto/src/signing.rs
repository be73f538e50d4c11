//! Ed25519 node authentication.
//!
//! Storage-node requests are authenticated by signing the UTF-8 string
//! `method ‖ namespace ‖ timestamp_ms`, where the namespace is left out
//! entirely for the default namespace `0`. The signature is
//! deterministic (RFC 8032), so a fixed identity, method, namespace and
//! timestamp always produce the same bytes.

use std::fmt;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use curve25519_dalek::edwards::CompressedEdwardsY;
use ed25519_dalek::VerifyingKey;
use session_types::{Clock, Namespace, Result, SessionError, SessionId, Timestamp};

use crate::identity::Identity;

// ---------------------------------------------------------------------------
// Ed25519PublicKey
// ---------------------------------------------------------------------------

/// Ed25519 public key (32 bytes).
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub struct Ed25519PublicKey([u8; 32]);

impl Ed25519PublicKey {
    /// Fixed byte length of an Ed25519 public key.
    pub const LEN: usize = 32;

    /// Creates an [`Ed25519PublicKey`] from raw bytes.
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Parses a 64-character hex public key.
    pub fn from_hex(s: &str) -> Result<Self> {
        let bytes = hex::decode(s).map_err(|e| SessionError::CryptoError {
            reason: format!("invalid ed25519 public key hex: {e}"),
        })?;
        let arr: [u8; 32] = bytes.try_into().map_err(|v: Vec<u8>| SessionError::CryptoError {
            reason: format!("ed25519 public key must be 32 bytes, got {}", v.len()),
        })?;
        Ok(Self(arr))
    }

    /// Returns the underlying 32-byte array.
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Lower-case hex encoding.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Maps the Edwards point to its Montgomery (X25519) form.
    ///
    /// # Errors
    ///
    /// [`SessionError::CryptoError`] if the bytes are not a valid
    /// compressed Edwards point.
    pub fn to_x25519(&self) -> Result<[u8; 32]> {
        let point = CompressedEdwardsY(self.0)
            .decompress()
            .ok_or_else(|| SessionError::CryptoError {
                reason: "ed25519 public key is not a valid curve point".into(),
            })?;
        Ok(point.to_montgomery().to_bytes())
    }

    /// The [`SessionId`] of the account owning this key.
    pub fn to_session_id(&self) -> Result<SessionId> {
        Ok(SessionId::from_x25519(self.to_x25519()?))
    }
}

impl fmt::Display for Ed25519PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

// ---------------------------------------------------------------------------
// Signature
// ---------------------------------------------------------------------------

/// Ed25519 signature (64 bytes).
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Signature([u8; 64]);

impl Signature {
    /// Fixed byte length of an Ed25519 signature.
    pub const LEN: usize = 64;

    /// Creates a [`Signature`] from raw bytes.
    pub fn from_bytes(bytes: [u8; 64]) -> Self {
        Self(bytes)
    }

    /// Creates a [`Signature`] from a slice, checking its length.
    pub fn from_slice(bytes: &[u8]) -> Result<Self> {
        let arr: [u8; 64] = bytes.try_into().map_err(|_| SessionError::CryptoError {
            reason: format!("signature must be 64 bytes, got {}", bytes.len()),
        })?;
        Ok(Self(arr))
    }

    /// Decodes a standard (padded) base64 signature.
    pub fn from_base64(s: &str) -> Result<Self> {
        let bytes = BASE64.decode(s).map_err(|e| SessionError::CryptoError {
            reason: format!("invalid signature base64: {e}"),
        })?;
        Self::from_slice(&bytes)
    }

    /// Returns the underlying 64-byte array.
    pub fn as_bytes(&self) -> &[u8; 64] {
        &self.0
    }

    /// Standard (padded) base64 encoding.
    pub fn to_base64(&self) -> String {
        BASE64.encode(self.0)
    }
}

// ---------------------------------------------------------------------------
// SignatureParams
// ---------------------------------------------------------------------------

/// Authentication fields attached to one storage-node request.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct SignatureParams {
    /// Signer's Ed25519 public key, hex.
    pub pubkey_ed25519: String,
    /// Ed25519 signature over the node-auth payload, base64.
    pub signature: String,
    /// Timestamp in milliseconds that was signed.
    pub timestamp: Timestamp,
    /// Namespace that was signed.
    pub namespace: Namespace,
    /// Request method that was signed.
    pub method: String,
}

/// Builds the node-auth payload string.
///
/// ```
/// use session_crypto::signing::node_auth_payload;
/// use session_types::{Namespace, Timestamp};
///
/// let ts = Timestamp::from_millis(1752458289343);
/// assert_eq!(node_auth_payload("retrieve", Namespace(2), ts), "retrieve21752458289343");
/// assert_eq!(node_auth_payload("retrieve", Namespace::DEFAULT, ts), "retrieve1752458289343");
/// ```
pub fn node_auth_payload(method: &str, namespace: Namespace, timestamp: Timestamp) -> String {
    if namespace.is_default() {
        format!("{method}{timestamp}")
    } else {
        format!("{method}{namespace}{timestamp}")
    }
}

/// Signs a node request at the clock's current time.
pub fn sign_node_request(
    identity: &Identity,
    method: &str,
    namespace: Namespace,
    clock: &dyn Clock,
) -> SignatureParams {
    sign_node_request_at(identity, method, namespace, clock.now())
}

/// Signs a node request at an explicit timestamp.
pub fn sign_node_request_at(
    identity: &Identity,
    method: &str,
    namespace: Namespace,
    timestamp: Timestamp,
) -> SignatureParams {
    let payload = node_auth_payload(method, namespace, timestamp);
    let signature = identity.sign(payload.as_bytes());
    SignatureParams {
        pubkey_ed25519: identity.ed25519_public_key().to_hex(),
        signature: signature.to_base64(),
        timestamp,
        namespace,
        method: method.to_string(),
    }
}

/// Checks a [`SignatureParams`] against its own method, namespace and
/// timestamp.
pub fn verify_node_request(params: &SignatureParams) -> Result<()> {
    let public_key = Ed25519PublicKey::from_hex(&params.pubkey_ed25519)?;
    let signature = Signature::from_base64(&params.signature)?;
    let payload = node_auth_payload(&params.method, params.namespace, params.timestamp);
    verify(&public_key, payload.as_bytes(), &signature)
}

// ---------------------------------------------------------------------------
// Verification
// ---------------------------------------------------------------------------

/// Verifies an Ed25519 signature against a public key and message.
///
/// Returns `Ok(())` if the signature is valid, or
/// [`SessionError::SignatureVerificationFailed`] otherwise.
pub fn verify(public_key: &Ed25519PublicKey, message: &[u8], signature: &Signature) -> Result<()> {
    let vk = VerifyingKey::from_bytes(&public_key.0).map_err(|e| {
        SessionError::SignatureVerificationFailed {
            reason: format!("invalid public key: {e}"),
        }
    })?;
    let sig = ed25519_dalek::Signature::from_bytes(&signature.0);
    vk.verify_strict(message, &sig)
        .map_err(|e| SessionError::SignatureVerificationFailed {
            reason: e.to_string(),
        })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
