//! Wire protocol for the Session messaging network.
//!
//! Covers the envelope/content schema, the in-memory message model,
//! outgoing message composition and open-group request signing.
//!
//! # Modules
//!
//! - [`proto`]: field-numbered wire structs
//! - [`attachments`]: attachment pointer key/digest fill and check
//! - [`content`]: `Envelope`, `Content` and the `Payload` sum type
//! - [`codec`]: strict encode/decode between bytes and [`content`] types
//! - [`messages`]: outgoing message kinds sharing a `MessageMeta`
//! - [`padding`]: block padding applied before encryption
//! - [`sogs`]: open-group request headers and room message encoding
//! - [`dedup`]: bounded cache of already-dispatched messages
//! - [`ttl`]: storage TTL constants

pub mod attachments;
pub mod codec;
pub mod content;
pub mod dedup;
pub mod messages;
pub mod padding;
pub mod proto;
pub mod sogs;
pub mod ttl;

pub use codec::{decode_content, decode_envelope, encode_content, encode_envelope};
pub use content::{Content, Decoded, Envelope, EnvelopeType, Payload};
