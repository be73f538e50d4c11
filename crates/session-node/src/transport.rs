//! Network seam.
//!
//! The engine never speaks HTTP or onion requests itself. A
//! [`Transport`] implementation moves bytes to and from the user's
//! swarm; the poller and the outgoing pipeline only see the requests
//! and responses defined here.

use async_trait::async_trait;
use session_crypto::signing::SignatureParams;
use session_types::{Namespace, Result, SessionId, Timestamp};

/// A signed `retrieve` request for one namespace.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct FetchRequest {
    /// Owner of the swarm being read.
    pub pubkey: SessionId,
    pub namespace: Namespace,
    /// Hash of the newest message already seen; empty on first poll.
    pub last_hash: String,
    pub auth: SignatureParams,
}

/// One stored message as returned by a storage node.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct StoredMessage {
    /// Server-assigned message hash.
    pub hash: String,
    /// Serialized envelope.
    pub data: Vec<u8>,
}

/// A `store` request for one serialized envelope.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct SubmitRequest {
    pub recipient: SessionId,
    pub namespace: Namespace,
    /// Serialized envelope.
    pub data: Vec<u8>,
    pub ttl_ms: u64,
    pub timestamp: Timestamp,
    /// Present when writing to one of our own authenticated namespaces.
    pub auth: Option<SignatureParams>,
}

/// Storage acknowledgement.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct SubmitAck {
    pub hash: Option<String>,
}

/// Capability set consumed from the network layer.
///
/// Both methods fail with [`session_types::SessionError::TransportError`];
/// the poller answers that with backoff, senders get it returned.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Returns messages newer than `request.last_hash`, oldest first.
    async fn fetch_messages(&self, request: &FetchRequest) -> Result<Vec<StoredMessage>>;

    /// Stores one envelope on the recipient's swarm.
    async fn submit(&self, request: SubmitRequest) -> Result<SubmitAck>;
}
