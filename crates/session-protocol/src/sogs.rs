//! Open-group (SOGS) request authentication.
//!
//! Every request carries four headers. The signature covers
//!
//! ```text
//! server_pk(32) ‖ nonce(16) ‖ ascii(timestamp_secs) ‖ method ‖ path [‖ blake2b-512(body)]
//! ```
//!
//! Blinded requests sign with the per-server `15`-blinded key; the
//! unblinded form signs with the plain identity key and announces it
//! with a `00` prefix.

use base64::engine::general_purpose::STANDARD as B64;
use base64::Engine as _;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use session_crypto::blinding::{derive_blinded_keypair, sign_blinded};
use session_crypto::hash::blake2b_512;
use session_crypto::Identity;
use session_types::{Clock, Result, Timestamp};

use crate::messages::ContentMessage;
use crate::padding;

/// Length of the random per-request nonce.
pub const NONCE_LEN: usize = 16;

/// Prefix announcing an unblinded Ed25519 key.
const UNBLINDED_PREFIX: &str = "00";

// ---------------------------------------------------------------------------
// Headers
// ---------------------------------------------------------------------------

/// Authentication headers for one SOGS request.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct SogsHeaders {
    #[serde(rename = "X-SOGS-Pubkey")]
    pub pubkey: String,
    /// Unix seconds, decimal.
    #[serde(rename = "X-SOGS-Timestamp")]
    pub timestamp: String,
    /// Base64.
    #[serde(rename = "X-SOGS-Nonce")]
    pub nonce: String,
    /// Base64.
    #[serde(rename = "X-SOGS-Signature")]
    pub signature: String,
}

impl SogsHeaders {
    /// `(name, value)` pairs in a fixed order.
    pub fn to_pairs(&self) -> [(&'static str, &str); 4] {
        [
            ("X-SOGS-Pubkey", self.pubkey.as_str()),
            ("X-SOGS-Timestamp", self.timestamp.as_str()),
            ("X-SOGS-Nonce", self.nonce.as_str()),
            ("X-SOGS-Signature", self.signature.as_str()),
        ]
    }
}

/// The parts of an HTTP request that are signed.
#[derive(Clone, Copy, Debug)]
pub struct SogsRequest<'a> {
    pub server_pk: &'a [u8; 32],
    pub method: &'a str,
    /// Path including the leading slash and any query string.
    pub path: &'a str,
    pub body: Option<&'a [u8]>,
    /// Use the blinded key (the default for modern servers).
    pub blind: bool,
}

// ---------------------------------------------------------------------------
// Signing
// ---------------------------------------------------------------------------

/// Bytes signed for a request.
pub fn signing_payload(request: &SogsRequest<'_>, nonce: &[u8; NONCE_LEN], timestamp_secs: u64) -> Vec<u8> {
    let ts = timestamp_secs.to_string();
    let mut payload = Vec::with_capacity(32 + NONCE_LEN + ts.len() + request.method.len() + request.path.len() + 64);
    payload.extend_from_slice(request.server_pk);
    payload.extend_from_slice(nonce);
    payload.extend_from_slice(ts.as_bytes());
    payload.extend_from_slice(request.method.as_bytes());
    payload.extend_from_slice(request.path.as_bytes());
    if let Some(body) = request.body.filter(|b| !b.is_empty()) {
        payload.extend_from_slice(&blake2b_512(body));
    }
    payload
}

/// Signs a request with an explicit nonce and timestamp.
pub fn sign_sogs_request_with(
    identity: &Identity,
    request: &SogsRequest<'_>,
    nonce: [u8; NONCE_LEN],
    timestamp: Timestamp,
) -> SogsHeaders {
    let secs = timestamp.as_secs();
    let payload = signing_payload(request, &nonce, secs);

    let (pubkey, signature) = if request.blind {
        let keypair = derive_blinded_keypair(identity, request.server_pk);
        let sig = sign_blinded(identity, &keypair, &payload);
        (keypair.blinded_id().to_string(), sig)
    } else {
        let pubkey = format!("{UNBLINDED_PREFIX}{}", identity.ed25519_public_key().to_hex());
        (pubkey, identity.sign(&payload))
    };

    SogsHeaders {
        pubkey,
        timestamp: secs.to_string(),
        nonce: B64.encode(nonce),
        signature: signature.to_base64(),
    }
}

/// Signs a request with a random nonce and the clock's current time.
pub fn sign_sogs_request(identity: &Identity, request: &SogsRequest<'_>, clock: &dyn Clock) -> SogsHeaders {
    let mut nonce = [0u8; NONCE_LEN];
    rand::rngs::OsRng.fill_bytes(&mut nonce);
    sign_sogs_request_with(identity, request, nonce, clock.now())
}

// ---------------------------------------------------------------------------
// Room messages
// ---------------------------------------------------------------------------

/// A message body ready to post to a room.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct SogsMessage {
    /// Base64 of the padded content.
    pub data: String,
    /// Base64 signature over the padded content.
    pub signature: String,
}

/// Pads and signs `message` for posting to the room server `server_pk`.
///
/// Room messages are not encrypted; the signature lets other members
/// attribute them to the (blinded) sender.
pub fn encode_sogs_message(
    identity: &Identity,
    server_pk: &[u8; 32],
    message: &dyn ContentMessage,
    blind: bool,
) -> Result<SogsMessage> {
    let padded = padding::pad(&message.plaintext()?);
    let signature = if blind {
        let keypair = derive_blinded_keypair(identity, server_pk);
        sign_blinded(identity, &keypair, &padded)
    } else {
        identity.sign(&padded)
    };
    Ok(SogsMessage {
        data: B64.encode(&padded),
        signature: signature.to_base64(),
    })
}
