//! Outgoing message kinds.
//!
//! Every kind carries a shared [`MessageMeta`] and implements
//! [`ContentMessage`], whose provided methods compose the expiration
//! fields, the payload and the TTL into a [`Content`]. There is no
//! hierarchy: a kind opts into disappearing-message behavior by
//! returning `true` from [`ContentMessage::is_expirable`].

use rand::RngCore;
use session_crypto::profile::{self, ProfileKey};
use session_types::{Namespace, Result, SessionError, SessionId, Timestamp};

use crate::codec;
use crate::content::{
    CallMessage, CallType, ClosedGroupControl, ClosedGroupControlType, Content, DataExtractionNotification,
    DataExtractionType, DataMessage, EnvelopeType, ExpirationType, MessageRequestResponse, Payload, Reaction,
    ReactionAction, ReceiptMessage, ReceiptType, SharedConfigKind, SharedConfigMessage, TypingAction,
    TypingMessage, Unsend,
};
use crate::proto;
use crate::ttl;

// ---------------------------------------------------------------------------
// Shared metadata
// ---------------------------------------------------------------------------

/// Disappearing-message settings.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Expiration {
    pub kind: ExpirationType,
    pub timer_secs: u32,
}

impl Expiration {
    pub fn after_send(timer_secs: u32) -> Self {
        Self {
            kind: ExpirationType::DeleteAfterSend,
            timer_secs,
        }
    }

    pub fn after_read(timer_secs: u32) -> Self {
        Self {
            kind: ExpirationType::DeleteAfterRead,
            timer_secs,
        }
    }

    /// Timer carried only in the legacy `DataMessage.expireTimer` field.
    pub fn legacy(timer_secs: u32) -> Self {
        Self {
            kind: ExpirationType::Unknown,
            timer_secs,
        }
    }
}

/// Fields common to every outgoing message.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct MessageMeta {
    /// Sent-at time, also the envelope timestamp.
    pub timestamp: Timestamp,
    /// Local tracking identifier (32 hex chars). Never sent.
    pub identifier: String,
    pub expiration: Option<Expiration>,
}

impl MessageMeta {
    /// Metadata with a fresh random identifier.
    pub fn new(timestamp: Timestamp) -> Self {
        let mut id = [0u8; 16];
        rand::rngs::OsRng.fill_bytes(&mut id);
        Self {
            timestamp,
            identifier: hex::encode(id),
            expiration: None,
        }
    }

    pub fn with_identifier(mut self, identifier: impl Into<String>) -> Self {
        self.identifier = identifier.into();
        self
    }

    pub fn with_expiration(mut self, expiration: Expiration) -> Self {
        self.expiration = Some(expiration);
        self
    }

    /// Value for `DataMessage.expireTimer`: only set when the content
    /// carries no explicit expiration mode.
    pub fn legacy_expire_timer(&self) -> Option<u32> {
        self.expiration
            .filter(|e| e.kind == ExpirationType::Unknown)
            .map(|e| e.timer_secs)
    }

    /// TTL for an expirable message: the delete-after-send timer, if
    /// one is set.
    pub fn expirable_ttl_ms(&self) -> Option<u64> {
        match self.expiration {
            Some(Expiration {
                kind: ExpirationType::DeleteAfterSend,
                timer_secs,
            }) => Some(u64::from(timer_secs) * 1000),
            _ => None,
        }
    }
}

/// Sender profile attached to visible messages and request responses.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct Profile {
    pub display_name: String,
    pub avatar: Option<Avatar>,
}

/// Location and decryption key of a profile picture.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Avatar {
    pub url: String,
    pub key: Vec<u8>,
}

impl Avatar {
    /// Encrypts `picture` under `key`. Returns the blob to upload and
    /// the avatar to advertise once it is stored at `url`.
    pub fn seal(picture: &[u8], key: &ProfileKey, url: impl Into<String>) -> Result<(Vec<u8>, Self)> {
        let blob = profile::encrypt_profile(picture, key)?;
        let avatar = Self {
            url: url.into(),
            key: key.as_bytes().to_vec(),
        };
        Ok((blob, avatar))
    }

    /// Decrypts a downloaded avatar with the advertised key.
    pub fn open(&self, downloaded: &[u8]) -> Result<Vec<u8>> {
        let key = ProfileKey::from_slice(&self.key)?;
        profile::decrypt_profile(downloaded, &key)
    }
}

impl Profile {
    pub fn named(display_name: impl Into<String>) -> Self {
        Self {
            display_name: display_name.into(),
            avatar: None,
        }
    }

    /// Splits into the wire profile and the profile key.
    pub fn to_wire(&self) -> (Option<proto::LokiProfile>, Option<Vec<u8>>) {
        if self.display_name.is_empty() && self.avatar.is_none() {
            return (None, None);
        }
        let picture = self
            .avatar
            .as_ref()
            .filter(|a| !a.url.is_empty() && !a.key.is_empty())
            .map(|a| a.url.clone());
        let profile = proto::LokiProfile {
            display_name: (!self.display_name.is_empty()).then(|| self.display_name.clone()),
            profile_picture: picture,
        };
        (Some(profile), self.avatar.as_ref().map(|a| a.key.clone()))
    }
}

// ---------------------------------------------------------------------------
// ContentMessage
// ---------------------------------------------------------------------------

/// A message kind that serializes to a single [`Content`].
pub trait ContentMessage: Send + Sync {
    fn meta(&self) -> &MessageMeta;

    /// The kind-specific payload.
    fn payload(&self) -> Payload;

    /// Whether the content-level expiration fields are emitted.
    fn is_expirable(&self) -> bool {
        false
    }

    /// Storage TTL in milliseconds, or `None` when the kind has no
    /// policy of its own and the sender's default applies.
    fn ttl_ms(&self) -> Option<u64> {
        if self.is_expirable() {
            self.meta().expirable_ttl_ms()
        } else {
            None
        }
    }

    fn to_content(&self) -> Result<Content> {
        let mut builder = Content::builder();
        if self.is_expirable() {
            if let Some(exp) = self.meta().expiration {
                builder = builder.expiration(exp.kind, exp.timer_secs);
            }
        }
        Ok(builder.payload(self.payload())?.build())
    }

    /// Serialized [`Content`], ready for padding and encryption.
    fn plaintext(&self) -> Result<Vec<u8>> {
        Ok(codec::encode_content(&self.to_content()?))
    }
}

// ---------------------------------------------------------------------------
// Visible
// ---------------------------------------------------------------------------

/// An ordinary chat message.
#[derive(Clone, Debug, PartialEq)]
pub struct VisibleMessage {
    pub meta: MessageMeta,
    pub body: Option<String>,
    pub attachments: Vec<proto::AttachmentPointer>,
    pub quote: Option<proto::Quote>,
    pub preview: Vec<proto::Preview>,
    pub reaction: Option<Reaction>,
    pub profile: Option<Profile>,
    /// Conversation a self-synced copy belongs to.
    pub sync_target: Option<String>,
}

impl VisibleMessage {
    pub fn text(meta: MessageMeta, body: impl Into<String>) -> Self {
        Self {
            meta,
            body: Some(body.into()),
            attachments: Vec::new(),
            quote: None,
            preview: Vec::new(),
            reaction: None,
            profile: None,
            sync_target: None,
        }
    }

    /// A reaction to the message `(id, author)`.
    pub fn reaction(meta: MessageMeta, id: Timestamp, author: &SessionId, emoji: &str, remove: bool) -> Self {
        let mut msg = Self::text(meta, String::new());
        msg.body = None;
        msg.reaction = Some(Reaction {
            id: id.as_millis(),
            author: author.to_string(),
            emoji: Some(emoji.to_string()),
            action: if remove {
                ReactionAction::Remove
            } else {
                ReactionAction::React
            },
        });
        msg
    }

    pub fn with_profile(mut self, profile: Profile) -> Self {
        self.profile = Some(profile);
        self
    }
}

impl ContentMessage for VisibleMessage {
    fn meta(&self) -> &MessageMeta {
        &self.meta
    }

    fn is_expirable(&self) -> bool {
        true
    }

    fn payload(&self) -> Payload {
        let (profile, profile_key) = self.profile.as_ref().map(Profile::to_wire).unwrap_or((None, None));
        Payload::Data(DataMessage {
            body: self.body.clone(),
            attachments: self.attachments.clone(),
            expire_timer: self.meta.legacy_expire_timer(),
            profile_key,
            timestamp: Some(self.meta.timestamp),
            quote: self.quote.clone(),
            preview: self.preview.clone(),
            reaction: self.reaction.clone(),
            profile,
            sync_target: self.sync_target.clone(),
            ..DataMessage::default()
        })
    }
}

// ---------------------------------------------------------------------------
// Control messages
// ---------------------------------------------------------------------------

/// Typing indicator. Short-lived on the swarm.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct TypingIndicator {
    pub meta: MessageMeta,
    pub is_typing: bool,
    /// Defaults to zero on the wire when absent.
    pub typing_timestamp: Option<Timestamp>,
}

impl ContentMessage for TypingIndicator {
    fn meta(&self) -> &MessageMeta {
        &self.meta
    }

    fn ttl_ms(&self) -> Option<u64> {
        Some(ttl::TYPING_TTL_MS)
    }

    fn payload(&self) -> Payload {
        Payload::Typing(TypingMessage {
            timestamp: self.typing_timestamp.unwrap_or_default(),
            action: if self.is_typing {
                TypingAction::Started
            } else {
                TypingAction::Stopped
            },
        })
    }
}

/// Read or delivery receipt for a set of message timestamps.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Receipt {
    pub meta: MessageMeta,
    pub kind: ReceiptType,
    pub timestamps: Vec<Timestamp>,
}

impl Receipt {
    pub fn read(meta: MessageMeta, timestamps: Vec<Timestamp>) -> Self {
        Self {
            meta,
            kind: ReceiptType::Read,
            timestamps,
        }
    }

    pub fn delivery(meta: MessageMeta, timestamps: Vec<Timestamp>) -> Self {
        Self {
            meta,
            kind: ReceiptType::Delivery,
            timestamps,
        }
    }
}

impl ContentMessage for Receipt {
    fn meta(&self) -> &MessageMeta {
        &self.meta
    }

    fn payload(&self) -> Payload {
        Payload::Receipt(ReceiptMessage {
            kind: self.kind,
            timestamps: self.timestamps.clone(),
        })
    }
}

/// Deletes a message for everyone. `meta.timestamp` is the timestamp
/// of the message being deleted.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct UnsendRequest {
    pub meta: MessageMeta,
    pub author: SessionId,
}

impl ContentMessage for UnsendRequest {
    fn meta(&self) -> &MessageMeta {
        &self.meta
    }

    fn payload(&self) -> Payload {
        Payload::Unsend(Unsend {
            timestamp: self.meta.timestamp,
            author: self.author.to_string(),
        })
    }
}

/// Screenshot / media-saved notice.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct DataExtraction {
    pub meta: MessageMeta,
    pub kind: DataExtractionType,
    pub extraction_timestamp: Timestamp,
}

impl ContentMessage for DataExtraction {
    fn meta(&self) -> &MessageMeta {
        &self.meta
    }

    fn is_expirable(&self) -> bool {
        true
    }

    fn payload(&self) -> Payload {
        Payload::DataExtraction(DataExtractionNotification {
            kind: self.kind,
            timestamp: Some(self.extraction_timestamp),
        })
    }
}

/// Acceptance of a message request.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct RequestResponse {
    pub meta: MessageMeta,
    pub profile: Option<Profile>,
}

impl ContentMessage for RequestResponse {
    fn meta(&self) -> &MessageMeta {
        &self.meta
    }

    fn payload(&self) -> Payload {
        let (profile, profile_key) = self.profile.as_ref().map(Profile::to_wire).unwrap_or((None, None));
        Payload::MessageRequestResponse(MessageRequestResponse {
            is_approved: true,
            profile_key,
            profile,
        })
    }
}

/// Opaque config blob pushed to one of the user's config namespaces.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct SharedConfig {
    pub meta: MessageMeta,
    pub kind: SharedConfigKind,
    pub seqno: i64,
    pub data: Vec<u8>,
}

impl SharedConfig {
    /// Namespace this config kind is stored under.
    pub fn namespace(&self) -> Namespace {
        match self.kind {
            SharedConfigKind::UserProfile => Namespace::USER_PROFILE,
            SharedConfigKind::Contacts => Namespace::CONTACTS,
            SharedConfigKind::ConvoInfoVolatile => Namespace::CONVO_INFO_VOLATILE,
            SharedConfigKind::UserGroups => Namespace::USER_GROUPS,
        }
    }
}

impl ContentMessage for SharedConfig {
    fn meta(&self) -> &MessageMeta {
        &self.meta
    }

    fn ttl_ms(&self) -> Option<u64> {
        Some(ttl::SHARED_CONFIG_TTL_MS)
    }

    fn payload(&self) -> Payload {
        Payload::SharedConfig(SharedConfigMessage {
            kind: self.kind,
            seqno: self.seqno,
            data: self.data.clone(),
        })
    }
}

/// Legacy account configuration sync.
#[derive(Clone, Debug, PartialEq)]
pub struct Configuration {
    meta: MessageMeta,
    message: proto::ConfigurationMessage,
}

impl Configuration {
    /// Builds a legacy configuration message.
    ///
    /// # Errors
    ///
    /// [`SessionError::ProtocolError`] if there are no closed groups, no
    /// open groups, or no display name.
    pub fn new(
        meta: MessageMeta,
        closed_groups: Vec<proto::ConfigurationClosedGroup>,
        open_groups: Vec<String>,
        display_name: String,
        contacts: Vec<proto::ConfigurationContact>,
    ) -> Result<Self> {
        let missing = if closed_groups.is_empty() {
            Some("closed groups")
        } else if open_groups.is_empty() {
            Some("open groups")
        } else if display_name.is_empty() {
            Some("display name")
        } else {
            None
        };
        if let Some(what) = missing {
            return Err(SessionError::ProtocolError {
                reason: format!("configuration message requires {what}"),
            });
        }
        Ok(Self {
            meta,
            message: proto::ConfigurationMessage {
                closed_groups,
                open_groups,
                display_name: Some(display_name),
                contacts,
                ..Default::default()
            },
        })
    }

    pub fn with_avatar(mut self, avatar: Avatar) -> Self {
        self.message.profile_picture = Some(avatar.url);
        self.message.profile_key = Some(avatar.key);
        self
    }
}

impl ContentMessage for Configuration {
    fn meta(&self) -> &MessageMeta {
        &self.meta
    }

    fn payload(&self) -> Payload {
        Payload::Configuration(self.message.clone())
    }
}

/// Legacy closed-group membership update, carried in a data message.
#[derive(Clone, Debug, PartialEq)]
pub struct GroupControl {
    pub meta: MessageMeta,
    pub control: ClosedGroupControl,
}

impl GroupControl {
    /// A `MEMBER_LEFT` notice.
    pub fn member_left(meta: MessageMeta) -> Self {
        Self {
            meta,
            control: ClosedGroupControl {
                kind: ClosedGroupControlType::MemberLeft,
                public_key: None,
                name: None,
                encryption_key_pair: None,
                members: Vec::new(),
                admins: Vec::new(),
                wrappers: Vec::new(),
                expiration_timer: None,
            },
        }
    }
}

impl ContentMessage for GroupControl {
    fn meta(&self) -> &MessageMeta {
        &self.meta
    }

    fn is_expirable(&self) -> bool {
        true
    }

    fn payload(&self) -> Payload {
        Payload::Data(DataMessage {
            expire_timer: self.meta.legacy_expire_timer(),
            timestamp: Some(self.meta.timestamp),
            closed_group_control: Some(self.control.clone()),
            ..DataMessage::default()
        })
    }
}

/// WebRTC call signalling.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct CallSignal {
    pub meta: MessageMeta,
    pub kind: CallType,
    pub sdps: Vec<String>,
    pub sdp_m_line_indexes: Vec<u32>,
    pub sdp_mids: Vec<String>,
    pub uuid: String,
}

impl ContentMessage for CallSignal {
    fn meta(&self) -> &MessageMeta {
        &self.meta
    }

    fn ttl_ms(&self) -> Option<u64> {
        Some(ttl::CALL_TTL_MS)
    }

    fn payload(&self) -> Payload {
        Payload::Call(CallMessage {
            kind: self.kind,
            sdps: self.sdps.clone(),
            sdp_m_line_indexes: self.sdp_m_line_indexes.clone(),
            sdp_mids: self.sdp_mids.clone(),
            uuid: self.uuid.clone(),
        })
    }
}

// ---------------------------------------------------------------------------
// RawMessage
// ---------------------------------------------------------------------------

/// A message ready for encryption and storage.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct RawMessage {
    pub identifier: String,
    pub timestamp: Timestamp,
    pub plaintext: Vec<u8>,
    /// Session ID of a contact, or the group key for closed groups.
    pub recipient: SessionId,
    /// `None` defers to the sender's default TTL.
    pub ttl_ms: Option<u64>,
    pub envelope_type: EnvelopeType,
    pub namespace: Namespace,
}

/// Serializes `message` for `recipient`.
///
/// # Errors
///
/// [`SessionError::ProtocolError`] if the TTL is zero (for example a
/// delete-after-send timer of zero seconds).
pub fn to_raw_message(
    recipient: &SessionId,
    message: &dyn ContentMessage,
    namespace: Namespace,
    is_group: bool,
) -> Result<RawMessage> {
    let ttl_ms = message.ttl_ms();
    if ttl_ms == Some(0) {
        return Err(SessionError::ProtocolError {
            reason: "TTL must be positive".into(),
        });
    }
    Ok(RawMessage {
        identifier: message.meta().identifier.clone(),
        timestamp: message.meta().timestamp,
        plaintext: message.plaintext()?,
        recipient: *recipient,
        ttl_ms,
        envelope_type: if is_group {
            EnvelopeType::ClosedGroupMessage
        } else {
            EnvelopeType::SessionMessage
        },
        namespace,
    })
}
