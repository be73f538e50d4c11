//! Outbound pipeline.
//!
//! Turns a [`RawMessage`] into stored bytes on the recipient's swarm:
//!
//! 1. Pad the serialized content to a 160-byte block boundary.
//! 2. Sign and seal it for the recipient (or the group encryption key).
//! 3. Wrap it in an [`Envelope`]; only closed-group envelopes carry a
//!    `source`.
//! 4. Submit the encoded envelope through the [`Transport`], attaching
//!    `store` auth when writing to one of our own non-default
//!    namespaces.

use session_crypto::sealed::seal_for_recipient;
use session_crypto::signing::sign_node_request;
use session_crypto::Identity;
use session_protocol::content::{Envelope, EnvelopeType};
use session_protocol::messages::RawMessage;
use session_protocol::{encode_envelope, padding, ttl};
use session_types::{Clock, Result, SessionError, SessionId, Timestamp};

use crate::transport::{SubmitRequest, Transport};

/// Node-auth method signed for authenticated stores.
const STORE_METHOD: &str = "store";

/// Result of a successful submit.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct SendReceipt {
    pub identifier: String,
    /// Sent timestamp of the message.
    pub timestamp: Timestamp,
    /// Storage hash, if the transport reported one.
    pub hash: Option<String>,
}

/// Pads, seals and wraps `raw`.
///
/// One-to-one messages are sealed to `raw.recipient`. Closed-group
/// messages are sealed to `group_encryption_key` and carry the group's
/// id as envelope source.
///
/// # Errors
///
/// - [`SessionError::CryptoError`] if sealing fails, or a closed-group
///   message has no group encryption key.
pub fn encrypt_raw(
    identity: &Identity,
    raw: &RawMessage,
    group_encryption_key: Option<&SessionId>,
) -> Result<Envelope> {
    let padded = padding::pad(&raw.plaintext);
    match raw.envelope_type {
        EnvelopeType::SessionMessage => {
            let sealed = seal_for_recipient(identity, &raw.recipient, &padded)?;
            Ok(Envelope::session_message(raw.timestamp, sealed))
        }
        EnvelopeType::ClosedGroupMessage => {
            let key = group_encryption_key.ok_or_else(|| SessionError::CryptoError {
                reason: format!("no encryption key for closed group {}", raw.recipient),
            })?;
            let sealed = seal_for_recipient(identity, key, &padded)?;
            Ok(Envelope::closed_group_message(
                raw.recipient.to_string(),
                raw.timestamp,
                sealed,
            ))
        }
    }
}

/// Encrypts `raw` and stores it on the recipient's swarm.
///
/// # Errors
///
/// Propagates encryption failures and the transport's
/// [`SessionError::TransportError`].
pub async fn send_raw(
    transport: &dyn Transport,
    identity: &Identity,
    clock: &dyn Clock,
    raw: &RawMessage,
    group_encryption_key: Option<&SessionId>,
) -> Result<SendReceipt> {
    let envelope = encrypt_raw(identity, raw, group_encryption_key)?;

    let own_namespace = raw.recipient == identity.session_id() && !raw.namespace.is_default();
    let auth = own_namespace.then(|| sign_node_request(identity, STORE_METHOD, raw.namespace, clock));

    let request = SubmitRequest {
        recipient: raw.recipient,
        namespace: raw.namespace,
        data: encode_envelope(&envelope),
        ttl_ms: raw.ttl_ms.unwrap_or(ttl::DEFAULT_TTL_MS),
        timestamp: raw.timestamp,
        auth,
    };

    let ack = transport.submit(request).await.map_err(|e| {
        tracing::warn!(identifier = %raw.identifier, recipient = %raw.recipient, %e, "submit failed");
        e
    })?;

    tracing::debug!(
        identifier = %raw.identifier,
        recipient = %raw.recipient,
        namespace = %raw.namespace,
        "message stored"
    );

    Ok(SendReceipt {
        identifier: raw.identifier.clone(),
        timestamp: raw.timestamp,
        hash: ack.hash,
    })
}
