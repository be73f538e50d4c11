//! Field-numbered wire structs for the Session signal schema.
//!
//! These mirror the proto2 schema one-to-one: every scalar is
//! `Option`al so presence survives a round trip, and enums are carried
//! as raw `int32` values. Required-field and enum-range checks happen
//! in [`crate::content`] when converting to the in-memory types.
//!
//! Nested schema messages are flattened into top-level structs with a
//! parent prefix (`DataMessage.Quote` → [`Quote`], `ConfigurationMessage.Contact`
//! → [`ConfigurationContact`]).

// ---------------------------------------------------------------------------
// Envelope
// ---------------------------------------------------------------------------

/// Outer wrapper stored on swarm nodes.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Envelope {
    /// `SESSION_MESSAGE = 6`, `CLOSED_GROUP_MESSAGE = 7`. Required.
    #[prost(int32, optional, tag = "1")]
    pub r#type: Option<i32>,
    #[prost(string, optional, tag = "2")]
    pub source: Option<String>,
    /// Required.
    #[prost(uint64, optional, tag = "5")]
    pub timestamp: Option<u64>,
    #[prost(uint32, optional, tag = "7")]
    pub source_device: Option<u32>,
    #[prost(bytes = "vec", optional, tag = "8")]
    pub content: Option<Vec<u8>>,
    #[prost(uint64, optional, tag = "10")]
    pub server_timestamp: Option<u64>,
}

// ---------------------------------------------------------------------------
// Content
// ---------------------------------------------------------------------------

/// One-of-many payload container. At most one payload field may be set.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Content {
    #[prost(message, optional, tag = "1")]
    pub data_message: Option<DataMessage>,
    #[prost(message, optional, tag = "3")]
    pub call_message: Option<CallMessage>,
    #[prost(message, optional, tag = "5")]
    pub receipt_message: Option<ReceiptMessage>,
    #[prost(message, optional, tag = "6")]
    pub typing_message: Option<TypingMessage>,
    #[prost(message, optional, tag = "7")]
    pub configuration_message: Option<ConfigurationMessage>,
    #[prost(message, optional, tag = "8")]
    pub data_extraction_notification: Option<DataExtractionNotification>,
    #[prost(message, optional, tag = "9")]
    pub unsend_message: Option<Unsend>,
    #[prost(message, optional, tag = "10")]
    pub message_request_response: Option<MessageRequestResponse>,
    #[prost(message, optional, tag = "11")]
    pub shared_config_message: Option<SharedConfigMessage>,
    /// `UNKNOWN = 0`, `DELETE_AFTER_READ = 1`, `DELETE_AFTER_SEND = 2`.
    #[prost(int32, optional, tag = "12")]
    pub expiration_type: Option<i32>,
    /// Seconds.
    #[prost(uint32, optional, tag = "13")]
    pub expiration_timer: Option<u32>,
}

// ---------------------------------------------------------------------------
// Small control payloads
// ---------------------------------------------------------------------------

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct TypingMessage {
    /// Required.
    #[prost(uint64, optional, tag = "1")]
    pub timestamp: Option<u64>,
    /// `STARTED = 0`, `STOPPED = 1`. Required.
    #[prost(int32, optional, tag = "2")]
    pub action: Option<i32>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Unsend {
    /// Required.
    #[prost(uint64, optional, tag = "1")]
    pub timestamp: Option<u64>,
    /// Required.
    #[prost(string, optional, tag = "2")]
    pub author: Option<String>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct MessageRequestResponse {
    /// Required.
    #[prost(bool, optional, tag = "1")]
    pub is_approved: Option<bool>,
    #[prost(bytes = "vec", optional, tag = "2")]
    pub profile_key: Option<Vec<u8>>,
    #[prost(message, optional, tag = "3")]
    pub profile: Option<LokiProfile>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct SharedConfigMessage {
    /// `USER_PROFILE = 1`, `CONTACTS = 2`, `CONVO_INFO_VOLATILE = 3`,
    /// `USER_GROUPS = 4`. Required.
    #[prost(int32, optional, tag = "1")]
    pub kind: Option<i32>,
    /// Required.
    #[prost(int64, optional, tag = "2")]
    pub seqno: Option<i64>,
    /// Required.
    #[prost(bytes = "vec", optional, tag = "3")]
    pub data: Option<Vec<u8>>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ReceiptMessage {
    /// `DELIVERY = 0`, `READ = 1`. Required.
    #[prost(int32, optional, tag = "1")]
    pub r#type: Option<i32>,
    #[prost(uint64, repeated, packed = "false", tag = "2")]
    pub timestamp: Vec<u64>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct DataExtractionNotification {
    /// `SCREENSHOT = 1`, `MEDIA_SAVED = 2`. Required.
    #[prost(int32, optional, tag = "1")]
    pub r#type: Option<i32>,
    #[prost(uint64, optional, tag = "2")]
    pub timestamp: Option<u64>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct CallMessage {
    /// `PRE_OFFER = 6`, `OFFER = 1`, `ANSWER = 2`, `PROVISIONAL_ANSWER = 3`,
    /// `ICE_CANDIDATES = 4`, `END_CALL = 5`. Required.
    #[prost(int32, optional, tag = "1")]
    pub r#type: Option<i32>,
    #[prost(string, repeated, tag = "2")]
    pub sdps: Vec<String>,
    #[prost(uint32, repeated, packed = "false", tag = "3")]
    pub sdp_m_line_indexes: Vec<u32>,
    #[prost(string, repeated, tag = "4")]
    pub sdp_mids: Vec<String>,
    /// Required.
    #[prost(string, optional, tag = "5")]
    pub uuid: Option<String>,
}

// ---------------------------------------------------------------------------
// DataMessage and nested types
// ---------------------------------------------------------------------------

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct DataMessage {
    #[prost(string, optional, tag = "1")]
    pub body: Option<String>,
    #[prost(message, repeated, tag = "2")]
    pub attachments: Vec<AttachmentPointer>,
    #[prost(uint32, optional, tag = "4")]
    pub flags: Option<u32>,
    #[prost(uint32, optional, tag = "5")]
    pub expire_timer: Option<u32>,
    #[prost(bytes = "vec", optional, tag = "6")]
    pub profile_key: Option<Vec<u8>>,
    #[prost(uint64, optional, tag = "7")]
    pub timestamp: Option<u64>,
    #[prost(message, optional, tag = "8")]
    pub quote: Option<Quote>,
    #[prost(message, repeated, tag = "10")]
    pub preview: Vec<Preview>,
    #[prost(message, optional, tag = "11")]
    pub reaction: Option<Reaction>,
    #[prost(message, optional, tag = "101")]
    pub profile: Option<LokiProfile>,
    #[prost(message, optional, tag = "102")]
    pub open_group_invitation: Option<OpenGroupInvitation>,
    #[prost(message, optional, tag = "104")]
    pub closed_group_control_message: Option<ClosedGroupControlMessage>,
    #[prost(string, optional, tag = "105")]
    pub sync_target: Option<String>,
    #[prost(bool, optional, tag = "106")]
    pub blocks_community_message_requests: Option<bool>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct AttachmentPointer {
    /// Required.
    #[prost(fixed64, optional, tag = "1")]
    pub id: Option<u64>,
    #[prost(string, optional, tag = "2")]
    pub content_type: Option<String>,
    #[prost(bytes = "vec", optional, tag = "3")]
    pub key: Option<Vec<u8>>,
    #[prost(uint32, optional, tag = "4")]
    pub size: Option<u32>,
    #[prost(bytes = "vec", optional, tag = "5")]
    pub thumbnail: Option<Vec<u8>>,
    #[prost(bytes = "vec", optional, tag = "6")]
    pub digest: Option<Vec<u8>>,
    #[prost(string, optional, tag = "7")]
    pub file_name: Option<String>,
    #[prost(uint32, optional, tag = "8")]
    pub flags: Option<u32>,
    #[prost(uint32, optional, tag = "9")]
    pub width: Option<u32>,
    #[prost(uint32, optional, tag = "10")]
    pub height: Option<u32>,
    #[prost(string, optional, tag = "11")]
    pub caption: Option<String>,
    #[prost(string, optional, tag = "101")]
    pub url: Option<String>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Quote {
    /// Timestamp of the quoted message. Required.
    #[prost(uint64, optional, tag = "1")]
    pub id: Option<u64>,
    /// Required.
    #[prost(string, optional, tag = "2")]
    pub author: Option<String>,
    #[prost(string, optional, tag = "3")]
    pub text: Option<String>,
    #[prost(message, repeated, tag = "4")]
    pub attachments: Vec<QuotedAttachment>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct QuotedAttachment {
    #[prost(string, optional, tag = "1")]
    pub content_type: Option<String>,
    #[prost(string, optional, tag = "2")]
    pub file_name: Option<String>,
    #[prost(message, optional, tag = "3")]
    pub thumbnail: Option<AttachmentPointer>,
    #[prost(uint32, optional, tag = "4")]
    pub flags: Option<u32>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Preview {
    /// Required.
    #[prost(string, optional, tag = "1")]
    pub url: Option<String>,
    #[prost(string, optional, tag = "2")]
    pub title: Option<String>,
    #[prost(message, optional, tag = "3")]
    pub image: Option<AttachmentPointer>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Reaction {
    /// Timestamp of the reacted-to message. Required.
    #[prost(uint64, optional, tag = "1")]
    pub id: Option<u64>,
    /// Required.
    #[prost(string, optional, tag = "2")]
    pub author: Option<String>,
    #[prost(string, optional, tag = "3")]
    pub emoji: Option<String>,
    /// `REACT = 0`, `REMOVE = 1`. Required.
    #[prost(int32, optional, tag = "4")]
    pub action: Option<i32>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct LokiProfile {
    #[prost(string, optional, tag = "1")]
    pub display_name: Option<String>,
    #[prost(string, optional, tag = "2")]
    pub profile_picture: Option<String>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct OpenGroupInvitation {
    /// Required.
    #[prost(string, optional, tag = "1")]
    pub url: Option<String>,
    /// Required.
    #[prost(string, optional, tag = "3")]
    pub name: Option<String>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ClosedGroupControlMessage {
    /// `NEW = 1`, `ENCRYPTION_KEY_PAIR = 3`, `NAME_CHANGE = 4`,
    /// `MEMBERS_ADDED = 5`, `MEMBERS_REMOVED = 6`, `MEMBER_LEFT = 7`,
    /// `ENCRYPTION_KEY_PAIR_REQUEST = 8`. Required.
    #[prost(int32, optional, tag = "1")]
    pub r#type: Option<i32>,
    #[prost(bytes = "vec", optional, tag = "2")]
    pub public_key: Option<Vec<u8>>,
    #[prost(string, optional, tag = "3")]
    pub name: Option<String>,
    #[prost(message, optional, tag = "4")]
    pub encryption_key_pair: Option<KeyPair>,
    #[prost(bytes = "vec", repeated, tag = "5")]
    pub members: Vec<Vec<u8>>,
    #[prost(bytes = "vec", repeated, tag = "6")]
    pub admins: Vec<Vec<u8>>,
    #[prost(message, repeated, tag = "7")]
    pub wrappers: Vec<KeyPairWrapper>,
    #[prost(uint32, optional, tag = "8")]
    pub expiration_timer: Option<u32>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct KeyPairWrapper {
    /// Required.
    #[prost(bytes = "vec", optional, tag = "1")]
    pub public_key: Option<Vec<u8>>,
    /// Required.
    #[prost(bytes = "vec", optional, tag = "2")]
    pub encrypted_key_pair: Option<Vec<u8>>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct KeyPair {
    /// Required.
    #[prost(bytes = "vec", optional, tag = "1")]
    pub public_key: Option<Vec<u8>>,
    /// Required.
    #[prost(bytes = "vec", optional, tag = "2")]
    pub private_key: Option<Vec<u8>>,
}

// ---------------------------------------------------------------------------
// Legacy ConfigurationMessage
// ---------------------------------------------------------------------------

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ConfigurationMessage {
    #[prost(message, repeated, tag = "1")]
    pub closed_groups: Vec<ConfigurationClosedGroup>,
    #[prost(string, repeated, tag = "2")]
    pub open_groups: Vec<String>,
    #[prost(string, optional, tag = "3")]
    pub display_name: Option<String>,
    #[prost(string, optional, tag = "4")]
    pub profile_picture: Option<String>,
    #[prost(bytes = "vec", optional, tag = "5")]
    pub profile_key: Option<Vec<u8>>,
    #[prost(message, repeated, tag = "6")]
    pub contacts: Vec<ConfigurationContact>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ConfigurationClosedGroup {
    #[prost(bytes = "vec", optional, tag = "1")]
    pub public_key: Option<Vec<u8>>,
    #[prost(string, optional, tag = "2")]
    pub name: Option<String>,
    #[prost(message, optional, tag = "3")]
    pub encryption_key_pair: Option<KeyPair>,
    #[prost(bytes = "vec", repeated, tag = "4")]
    pub members: Vec<Vec<u8>>,
    #[prost(bytes = "vec", repeated, tag = "5")]
    pub admins: Vec<Vec<u8>>,
    #[prost(uint32, optional, tag = "6")]
    pub expiration_timer: Option<u32>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ConfigurationContact {
    /// Required.
    #[prost(bytes = "vec", optional, tag = "1")]
    pub public_key: Option<Vec<u8>>,
    /// Required.
    #[prost(string, optional, tag = "2")]
    pub name: Option<String>,
    #[prost(string, optional, tag = "3")]
    pub profile_picture: Option<String>,
    #[prost(bytes = "vec", optional, tag = "4")]
    pub profile_key: Option<Vec<u8>>,
    #[prost(bool, optional, tag = "5")]
    pub is_approved: Option<bool>,
    #[prost(bool, optional, tag = "6")]
    pub is_blocked: Option<bool>,
    #[prost(bool, optional, tag = "7")]
    pub did_approve_me: Option<bool>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use prost::Message;

    #[test]
    fn envelope_field_numbers_on_the_wire() {
        let env = Envelope {
            r#type: Some(6),
            timestamp: Some(1),
            ..Default::default()
        };
        // tag 1 varint 6, tag 5 varint 1
        assert_eq!(env.encode_to_vec(), vec![0x08, 0x06, 0x28, 0x01]);
    }

    #[test]
    fn receipt_timestamps_are_unpacked() {
        let receipt = ReceiptMessage {
            r#type: Some(1),
            timestamp: vec![1, 2],
        };
        assert_eq!(receipt.encode_to_vec(), vec![0x08, 0x01, 0x10, 0x01, 0x10, 0x02]);
    }

    #[test]
    fn unknown_fields_are_skipped() -> std::result::Result<(), prost::DecodeError> {
        // field 99 (varint) = 5, then typing timestamp = 7
        let bytes = [0x98, 0x06, 0x05, 0x08, 0x07];
        let typing = TypingMessage::decode(&bytes[..])?;
        assert_eq!(typing.timestamp, Some(7));
        assert_eq!(typing.action, None);
        Ok(())
    }
}
