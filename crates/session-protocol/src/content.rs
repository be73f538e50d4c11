//! In-memory message model.
//!
//! The wire schema expresses "one of" as nine optional fields; here it
//! is the [`Payload`] sum type, so a [`Content`] can never hold two
//! payloads at once. Required wire fields become plain (non-`Option`)
//! fields and wire enums become Rust enums. Conversion to and from
//! [`crate::proto`] lives in [`crate::codec`].

use session_types::{Result, SessionError, Timestamp};

use crate::proto;

// ---------------------------------------------------------------------------
// Wire enums
// ---------------------------------------------------------------------------

macro_rules! wire_enum {
    (
        $(#[$meta:meta])*
        $name:ident ($field:literal) {
            $($(#[$vmeta:meta])* $variant:ident = $value:literal),+ $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
        pub enum $name {
            $($(#[$vmeta])* $variant = $value),+
        }

        impl $name {
            /// Qualified schema field name, used in decode errors.
            pub const FIELD: &'static str = $field;

            /// Maps a raw wire value to a variant.
            ///
            /// # Errors
            ///
            /// [`SessionError::UnknownEnumValue`] for values outside the
            /// declared range.
            pub fn from_wire(value: i32) -> Result<Self> {
                match value {
                    $($value => Ok(Self::$variant),)+
                    other => Err(SessionError::UnknownEnumValue {
                        field: $field,
                        value: other,
                    }),
                }
            }

            /// The raw wire value.
            pub fn to_wire(self) -> i32 {
                self as i32
            }
        }
    };
}

wire_enum! {
    /// How the envelope content is addressed.
    EnvelopeType ("Envelope.type") {
        SessionMessage = 6,
        ClosedGroupMessage = 7,
    }
}

wire_enum! {
    /// Disappearing-message mode.
    ExpirationType ("Content.expirationType") {
        Unknown = 0,
        DeleteAfterRead = 1,
        DeleteAfterSend = 2,
    }
}

wire_enum! {
    TypingAction ("TypingMessage.action") {
        Started = 0,
        Stopped = 1,
    }
}

wire_enum! {
    ReceiptType ("ReceiptMessage.type") {
        Delivery = 0,
        Read = 1,
    }
}

wire_enum! {
    DataExtractionType ("DataExtractionNotification.type") {
        Screenshot = 1,
        MediaSaved = 2,
    }
}

wire_enum! {
    SharedConfigKind ("SharedConfigMessage.kind") {
        UserProfile = 1,
        Contacts = 2,
        ConvoInfoVolatile = 3,
        UserGroups = 4,
    }
}

wire_enum! {
    /// WebRTC signalling step.
    CallType ("CallMessage.type") {
        PreOffer = 6,
        Offer = 1,
        Answer = 2,
        ProvisionalAnswer = 3,
        IceCandidates = 4,
        EndCall = 5,
    }
}

wire_enum! {
    ReactionAction ("Reaction.action") {
        React = 0,
        Remove = 1,
    }
}

wire_enum! {
    /// Legacy closed-group membership operation.
    ClosedGroupControlType ("ClosedGroupControlMessage.type") {
        New = 1,
        EncryptionKeyPair = 3,
        NameChange = 4,
        MembersAdded = 5,
        MembersRemoved = 6,
        MemberLeft = 7,
        EncryptionKeyPairRequest = 8,
    }
}

// ---------------------------------------------------------------------------
// Envelope
// ---------------------------------------------------------------------------

/// Outer wrapper around an (encrypted) [`Content`].
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Envelope {
    pub kind: EnvelopeType,
    /// Group public key for closed-group messages; `None` otherwise.
    pub source: Option<String>,
    pub timestamp: Timestamp,
    pub source_device: Option<u32>,
    /// Absent for heartbeat envelopes.
    pub content: Option<Vec<u8>>,
    pub server_timestamp: Option<u64>,
}

impl Envelope {
    /// A one-to-one envelope. Never carries a source.
    pub fn session_message(timestamp: Timestamp, content: Vec<u8>) -> Self {
        Self {
            kind: EnvelopeType::SessionMessage,
            source: None,
            timestamp,
            source_device: None,
            content: Some(content),
            server_timestamp: None,
        }
    }

    /// A closed-group envelope with the group key as source.
    pub fn closed_group_message(group: String, timestamp: Timestamp, content: Vec<u8>) -> Self {
        Self {
            kind: EnvelopeType::ClosedGroupMessage,
            source: Some(group),
            timestamp,
            source_device: None,
            content: Some(content),
            server_timestamp: None,
        }
    }

    /// `true` if the envelope carries no content.
    pub fn is_heartbeat(&self) -> bool {
        self.content.as_ref().map_or(true, |c| c.is_empty())
    }
}

// ---------------------------------------------------------------------------
// Payloads
// ---------------------------------------------------------------------------

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct TypingMessage {
    pub timestamp: Timestamp,
    pub action: TypingAction,
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ReceiptMessage {
    pub kind: ReceiptType,
    pub timestamps: Vec<Timestamp>,
}

/// Request to delete a previously sent message.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Unsend {
    /// Timestamp of the message to delete.
    pub timestamp: Timestamp,
    pub author: String,
}

#[derive(Clone, Debug, PartialEq)]
pub struct MessageRequestResponse {
    pub is_approved: bool,
    pub profile_key: Option<Vec<u8>>,
    pub profile: Option<proto::LokiProfile>,
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct SharedConfigMessage {
    pub kind: SharedConfigKind,
    pub seqno: i64,
    pub data: Vec<u8>,
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct DataExtractionNotification {
    pub kind: DataExtractionType,
    pub timestamp: Option<Timestamp>,
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct CallMessage {
    pub kind: CallType,
    pub sdps: Vec<String>,
    pub sdp_m_line_indexes: Vec<u32>,
    pub sdp_mids: Vec<String>,
    pub uuid: String,
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Reaction {
    /// Timestamp of the message reacted to.
    pub id: u64,
    /// Session ID of that message's author.
    pub author: String,
    pub emoji: Option<String>,
    pub action: ReactionAction,
}

#[derive(Clone, Debug, PartialEq)]
pub struct ClosedGroupControl {
    pub kind: ClosedGroupControlType,
    pub public_key: Option<Vec<u8>>,
    pub name: Option<String>,
    pub encryption_key_pair: Option<proto::KeyPair>,
    pub members: Vec<Vec<u8>>,
    pub admins: Vec<Vec<u8>>,
    pub wrappers: Vec<proto::KeyPairWrapper>,
    pub expiration_timer: Option<u32>,
}

/// A visible message or one of its control variants.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct DataMessage {
    pub body: Option<String>,
    pub attachments: Vec<proto::AttachmentPointer>,
    pub flags: Option<u32>,
    /// Legacy expiry, set only when no content-level expiration is used.
    pub expire_timer: Option<u32>,
    pub profile_key: Option<Vec<u8>>,
    pub timestamp: Option<Timestamp>,
    pub quote: Option<proto::Quote>,
    pub preview: Vec<proto::Preview>,
    pub reaction: Option<Reaction>,
    pub profile: Option<proto::LokiProfile>,
    pub open_group_invitation: Option<proto::OpenGroupInvitation>,
    pub closed_group_control: Option<ClosedGroupControl>,
    pub sync_target: Option<String>,
    pub blocks_community_message_requests: Option<bool>,
}

/// The single payload a [`Content`] carries.
#[derive(Clone, Debug, PartialEq)]
pub enum Payload {
    Data(DataMessage),
    Call(CallMessage),
    Receipt(ReceiptMessage),
    Typing(TypingMessage),
    Configuration(proto::ConfigurationMessage),
    DataExtraction(DataExtractionNotification),
    Unsend(Unsend),
    MessageRequestResponse(MessageRequestResponse),
    SharedConfig(SharedConfigMessage),
}

impl Payload {
    /// Schema field name of this variant inside `Content`.
    pub fn field_name(&self) -> &'static str {
        match self {
            Self::Data(_) => "dataMessage",
            Self::Call(_) => "callMessage",
            Self::Receipt(_) => "receiptMessage",
            Self::Typing(_) => "typingMessage",
            Self::Configuration(_) => "configurationMessage",
            Self::DataExtraction(_) => "dataExtractionNotification",
            Self::Unsend(_) => "unsendMessage",
            Self::MessageRequestResponse(_) => "messageRequestResponse",
            Self::SharedConfig(_) => "sharedConfigMessage",
        }
    }
}

// ---------------------------------------------------------------------------
// Content
// ---------------------------------------------------------------------------

/// Decrypted message body. `payload == None` is a valid empty content.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Content {
    pub payload: Option<Payload>,
    pub expiration_type: Option<ExpirationType>,
    /// Seconds.
    pub expiration_timer: Option<u32>,
}

impl Content {
    /// Starts building a content value.
    pub fn builder() -> ContentBuilder {
        ContentBuilder::default()
    }

    /// Content holding only `payload`.
    pub fn with_payload(payload: Payload) -> Self {
        Self {
            payload: Some(payload),
            ..Self::default()
        }
    }

    /// The data message, if that is the payload.
    pub fn data_message(&self) -> Option<&DataMessage> {
        match &self.payload {
            Some(Payload::Data(data)) => Some(data),
            _ => None,
        }
    }
}

/// Builder enforcing the single-payload rule at construction time.
#[derive(Debug, Default)]
pub struct ContentBuilder {
    content: Content,
}

impl ContentBuilder {
    /// Sets the payload.
    ///
    /// # Errors
    ///
    /// [`SessionError::MultiplePayloadsSet`] if a payload was already set.
    pub fn payload(mut self, payload: Payload) -> Result<Self> {
        if let Some(existing) = &self.content.payload {
            return Err(SessionError::MultiplePayloadsSet {
                first: existing.field_name(),
                second: payload.field_name(),
            });
        }
        self.content.payload = Some(payload);
        Ok(self)
    }

    /// Sets the content-level expiration fields.
    pub fn expiration(mut self, kind: ExpirationType, timer_secs: u32) -> Self {
        self.content.expiration_type = Some(kind);
        self.content.expiration_timer = Some(timer_secs);
        self
    }

    pub fn build(self) -> Content {
        self.content
    }
}

// ---------------------------------------------------------------------------
// Decoded
// ---------------------------------------------------------------------------

/// A decoded value plus the non-fatal problems found while decoding.
///
/// Warnings are [`SessionError::UnknownEnumValue`] for optional enum
/// fields that were dropped.
#[derive(Debug)]
pub struct Decoded<T> {
    pub value: T,
    pub warnings: Vec<SessionError>,
}

impl<T> Decoded<T> {
    /// A value decoded without warnings.
    pub fn clean(value: T) -> Self {
        Self {
            value,
            warnings: Vec::new(),
        }
    }

    /// Discards the warnings.
    pub fn into_value(self) -> T {
        self.value
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn enum_ranges() {
        assert_eq!(EnvelopeType::from_wire(6).ok(), Some(EnvelopeType::SessionMessage));
        assert_eq!(CallType::from_wire(6).ok(), Some(CallType::PreOffer));
        assert!(matches!(
            EnvelopeType::from_wire(1),
            Err(SessionError::UnknownEnumValue { field: "Envelope.type", value: 1 })
        ));
        assert_eq!(ClosedGroupControlType::MemberLeft.to_wire(), 7);
        assert!(ClosedGroupControlType::from_wire(2).is_err());
    }

    #[test]
    fn builder_rejects_second_payload() {
        let typing = Payload::Typing(TypingMessage {
            timestamp: Timestamp::from_millis(1),
            action: TypingAction::Started,
        });
        let result = Content::builder()
            .payload(Payload::Data(DataMessage::default()))
            .and_then(|b| b.payload(typing));
        match result {
            Err(SessionError::MultiplePayloadsSet { first, second }) => {
                assert_eq!(first, "dataMessage");
                assert_eq!(second, "typingMessage");
            }
            other => panic!("expected MultiplePayloadsSet, got {other:?}"),
        }
    }

    #[test]
    fn builder_sets_expiration() -> std::result::Result<(), SessionError> {
        let content = Content::builder()
            .expiration(ExpirationType::DeleteAfterSend, 60)
            .payload(Payload::Data(DataMessage::default()))?
            .build();
        assert_eq!(content.expiration_type, Some(ExpirationType::DeleteAfterSend));
        assert_eq!(content.expiration_timer, Some(60));
        assert!(content.data_message().is_some());
        Ok(())
    }

    #[test]
    fn session_envelope_has_no_source() {
        let env = Envelope::session_message(Timestamp::from_millis(1), vec![1]);
        assert!(env.source.is_none());
        assert!(!env.is_heartbeat());
        let group = Envelope::closed_group_message("05ab".into(), Timestamp::from_millis(1), vec![]);
        assert_eq!(group.source.as_deref(), Some("05ab"));
        assert!(group.is_heartbeat());
    }
}
