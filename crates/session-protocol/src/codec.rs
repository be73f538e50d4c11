//! Encoding and decoding of envelopes and content.
//!
//! Decoding is strict about schema-required fields and the
//! single-payload rule, lenient about unknown fields (ignored) and
//! unknown values of optional enums (dropped, reported as warnings).

use prost::Message;
use session_types::{Result, SessionError, Timestamp};

use crate::content::{
    CallMessage, CallType, ClosedGroupControl, ClosedGroupControlType, Content, DataExtractionNotification,
    DataExtractionType, DataMessage, Decoded, Envelope, EnvelopeType, ExpirationType, MessageRequestResponse,
    Payload, Reaction, ReactionAction, ReceiptMessage, ReceiptType, SharedConfigKind, SharedConfigMessage,
    TypingAction, TypingMessage, Unsend,
};
use crate::proto;

// ---------------------------------------------------------------------------
// Public API
// ---------------------------------------------------------------------------

/// Serializes an envelope.
pub fn encode_envelope(envelope: &Envelope) -> Vec<u8> {
    envelope_to_wire(envelope).encode_to_vec()
}

/// Parses an envelope.
///
/// # Errors
///
/// - [`SessionError::ProtocolError`] for malformed bytes.
/// - [`SessionError::MissingRequiredField`] if `type` or `timestamp`
///   is absent.
/// - [`SessionError::UnknownEnumValue`] for an undefined `type`.
pub fn decode_envelope(bytes: &[u8]) -> Result<Envelope> {
    let wire = proto::Envelope::decode(bytes).map_err(|e| SessionError::ProtocolError {
        reason: format!("malformed envelope: {e}"),
    })?;
    envelope_from_wire(wire)
}

/// Serializes a content value.
pub fn encode_content(content: &Content) -> Vec<u8> {
    content_to_wire(content).encode_to_vec()
}

/// Parses a content value.
///
/// Zero bytes decode to an empty [`Content`].
///
/// # Errors
///
/// - [`SessionError::ProtocolError`] for malformed bytes.
/// - [`SessionError::MultiplePayloadsSet`] if more than one payload
///   field is present.
/// - [`SessionError::MissingRequiredField`] /
///   [`SessionError::UnknownEnumValue`] for invalid required fields of
///   the payload.
pub fn decode_content(bytes: &[u8]) -> Result<Decoded<Content>> {
    let wire = proto::Content::decode(bytes).map_err(|e| SessionError::ProtocolError {
        reason: format!("malformed content: {e}"),
    })?;
    content_from_wire(wire)
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn require<T>(value: Option<T>, message: &'static str, field: &'static str) -> Result<T> {
    value.ok_or(SessionError::MissingRequiredField { message, field })
}

fn required_enum<E>(
    value: Option<i32>,
    message: &'static str,
    field: &'static str,
    parse: fn(i32) -> Result<E>,
) -> Result<E> {
    parse(require(value, message, field)?)
}

fn optional_enum<E>(value: Option<i32>, parse: fn(i32) -> Result<E>, warnings: &mut Vec<SessionError>) -> Option<E> {
    match value.map(parse) {
        Some(Ok(v)) => Some(v),
        Some(Err(e)) => {
            warnings.push(e);
            None
        }
        None => None,
    }
}

// ---------------------------------------------------------------------------
// Envelope
// ---------------------------------------------------------------------------

fn envelope_to_wire(envelope: &Envelope) -> proto::Envelope {
    proto::Envelope {
        r#type: Some(envelope.kind.to_wire()),
        source: envelope.source.clone(),
        timestamp: Some(envelope.timestamp.as_millis()),
        source_device: envelope.source_device,
        content: envelope.content.clone(),
        server_timestamp: envelope.server_timestamp,
    }
}

fn envelope_from_wire(wire: proto::Envelope) -> Result<Envelope> {
    Ok(Envelope {
        kind: required_enum(wire.r#type, "Envelope", "type", EnvelopeType::from_wire)?,
        source: wire.source,
        timestamp: Timestamp::from_millis(require(wire.timestamp, "Envelope", "timestamp")?),
        source_device: wire.source_device,
        content: wire.content,
        server_timestamp: wire.server_timestamp,
    })
}

// ---------------------------------------------------------------------------
// Content
// ---------------------------------------------------------------------------

fn content_to_wire(content: &Content) -> proto::Content {
    let mut wire = proto::Content {
        expiration_type: content.expiration_type.map(ExpirationType::to_wire),
        expiration_timer: content.expiration_timer,
        ..Default::default()
    };
    match &content.payload {
        None => {}
        Some(Payload::Data(m)) => wire.data_message = Some(data_to_wire(m)),
        Some(Payload::Call(m)) => wire.call_message = Some(call_to_wire(m)),
        Some(Payload::Receipt(m)) => {
            wire.receipt_message = Some(proto::ReceiptMessage {
                r#type: Some(m.kind.to_wire()),
                timestamp: m.timestamps.iter().map(Timestamp::as_millis).collect(),
            })
        }
        Some(Payload::Typing(m)) => {
            wire.typing_message = Some(proto::TypingMessage {
                timestamp: Some(m.timestamp.as_millis()),
                action: Some(m.action.to_wire()),
            })
        }
        Some(Payload::Configuration(m)) => wire.configuration_message = Some(m.clone()),
        Some(Payload::DataExtraction(m)) => {
            wire.data_extraction_notification = Some(proto::DataExtractionNotification {
                r#type: Some(m.kind.to_wire()),
                timestamp: m.timestamp.map(|t| t.as_millis()),
            })
        }
        Some(Payload::Unsend(m)) => {
            wire.unsend_message = Some(proto::Unsend {
                timestamp: Some(m.timestamp.as_millis()),
                author: Some(m.author.clone()),
            })
        }
        Some(Payload::MessageRequestResponse(m)) => {
            wire.message_request_response = Some(proto::MessageRequestResponse {
                is_approved: Some(m.is_approved),
                profile_key: m.profile_key.clone(),
                profile: m.profile.clone(),
            })
        }
        Some(Payload::SharedConfig(m)) => {
            wire.shared_config_message = Some(proto::SharedConfigMessage {
                kind: Some(m.kind.to_wire()),
                seqno: Some(m.seqno),
                data: Some(m.data.clone()),
            })
        }
    }
    wire
}

fn present_payloads(wire: &proto::Content) -> Vec<&'static str> {
    [
        (wire.data_message.is_some(), "dataMessage"),
        (wire.call_message.is_some(), "callMessage"),
        (wire.receipt_message.is_some(), "receiptMessage"),
        (wire.typing_message.is_some(), "typingMessage"),
        (wire.configuration_message.is_some(), "configurationMessage"),
        (wire.data_extraction_notification.is_some(), "dataExtractionNotification"),
        (wire.unsend_message.is_some(), "unsendMessage"),
        (wire.message_request_response.is_some(), "messageRequestResponse"),
        (wire.shared_config_message.is_some(), "sharedConfigMessage"),
    ]
    .into_iter()
    .filter_map(|(set, name)| set.then_some(name))
    .collect()
}

fn content_from_wire(wire: proto::Content) -> Result<Decoded<Content>> {
    let present = present_payloads(&wire);
    if let [first, second, ..] = present[..] {
        return Err(SessionError::MultiplePayloadsSet { first, second });
    }

    let mut warnings = Vec::new();
    let expiration_type = optional_enum(wire.expiration_type, ExpirationType::from_wire, &mut warnings);

    let payload = if let Some(m) = wire.data_message {
        Some(Payload::Data(data_from_wire(m)?))
    } else if let Some(m) = wire.call_message {
        Some(Payload::Call(call_from_wire(m)?))
    } else if let Some(m) = wire.receipt_message {
        Some(Payload::Receipt(ReceiptMessage {
            kind: required_enum(m.r#type, "ReceiptMessage", "type", ReceiptType::from_wire)?,
            timestamps: m.timestamp.into_iter().map(Timestamp::from_millis).collect(),
        }))
    } else if let Some(m) = wire.typing_message {
        Some(Payload::Typing(TypingMessage {
            timestamp: Timestamp::from_millis(require(m.timestamp, "TypingMessage", "timestamp")?),
            action: required_enum(m.action, "TypingMessage", "action", TypingAction::from_wire)?,
        }))
    } else if let Some(m) = wire.configuration_message {
        check_configuration(&m)?;
        Some(Payload::Configuration(m))
    } else if let Some(m) = wire.data_extraction_notification {
        Some(Payload::DataExtraction(DataExtractionNotification {
            kind: required_enum(
                m.r#type,
                "DataExtractionNotification",
                "type",
                DataExtractionType::from_wire,
            )?,
            timestamp: m.timestamp.map(Timestamp::from_millis),
        }))
    } else if let Some(m) = wire.unsend_message {
        Some(Payload::Unsend(Unsend {
            timestamp: Timestamp::from_millis(require(m.timestamp, "Unsend", "timestamp")?),
            author: require(m.author, "Unsend", "author")?,
        }))
    } else if let Some(m) = wire.message_request_response {
        Some(Payload::MessageRequestResponse(MessageRequestResponse {
            is_approved: require(m.is_approved, "MessageRequestResponse", "isApproved")?,
            profile_key: m.profile_key,
            profile: m.profile,
        }))
    } else if let Some(m) = wire.shared_config_message {
        Some(Payload::SharedConfig(SharedConfigMessage {
            kind: required_enum(m.kind, "SharedConfigMessage", "kind", SharedConfigKind::from_wire)?,
            seqno: require(m.seqno, "SharedConfigMessage", "seqno")?,
            data: require(m.data, "SharedConfigMessage", "data")?,
        }))
    } else {
        None
    };

    Ok(Decoded {
        value: Content {
            payload,
            expiration_type,
            expiration_timer: wire.expiration_timer,
        },
        warnings,
    })
}

// ---------------------------------------------------------------------------
// DataMessage
// ---------------------------------------------------------------------------

fn data_to_wire(m: &DataMessage) -> proto::DataMessage {
    proto::DataMessage {
        body: m.body.clone(),
        attachments: m.attachments.clone(),
        flags: m.flags,
        expire_timer: m.expire_timer,
        profile_key: m.profile_key.clone(),
        timestamp: m.timestamp.map(|t| t.as_millis()),
        quote: m.quote.clone(),
        preview: m.preview.clone(),
        reaction: m.reaction.as_ref().map(|r| proto::Reaction {
            id: Some(r.id),
            author: Some(r.author.clone()),
            emoji: r.emoji.clone(),
            action: Some(r.action.to_wire()),
        }),
        profile: m.profile.clone(),
        open_group_invitation: m.open_group_invitation.clone(),
        closed_group_control_message: m.closed_group_control.as_ref().map(|c| proto::ClosedGroupControlMessage {
            r#type: Some(c.kind.to_wire()),
            public_key: c.public_key.clone(),
            name: c.name.clone(),
            encryption_key_pair: c.encryption_key_pair.clone(),
            members: c.members.clone(),
            admins: c.admins.clone(),
            wrappers: c.wrappers.clone(),
            expiration_timer: c.expiration_timer,
        }),
        sync_target: m.sync_target.clone(),
        blocks_community_message_requests: m.blocks_community_message_requests,
    }
}

fn data_from_wire(m: proto::DataMessage) -> Result<DataMessage> {
    for attachment in &m.attachments {
        check_attachment(attachment)?;
    }
    if let Some(quote) = &m.quote {
        require(quote.id, "DataMessage.Quote", "id")?;
        require(quote.author.as_ref(), "DataMessage.Quote", "author")?;
        for quoted in &quote.attachments {
            if let Some(thumbnail) = &quoted.thumbnail {
                check_attachment(thumbnail)?;
            }
        }
    }
    for preview in &m.preview {
        require(preview.url.as_ref(), "DataMessage.Preview", "url")?;
        if let Some(image) = &preview.image {
            check_attachment(image)?;
        }
    }
    if let Some(invite) = &m.open_group_invitation {
        require(invite.url.as_ref(), "DataMessage.OpenGroupInvitation", "url")?;
        require(invite.name.as_ref(), "DataMessage.OpenGroupInvitation", "name")?;
    }

    let reaction = match m.reaction {
        Some(r) => Some(Reaction {
            id: require(r.id, "DataMessage.Reaction", "id")?,
            author: require(r.author, "DataMessage.Reaction", "author")?,
            emoji: r.emoji,
            action: required_enum(r.action, "DataMessage.Reaction", "action", ReactionAction::from_wire)?,
        }),
        None => None,
    };

    let closed_group_control = match m.closed_group_control_message {
        Some(c) => {
            if let Some(pair) = &c.encryption_key_pair {
                check_key_pair(pair)?;
            }
            for wrapper in &c.wrappers {
                require(wrapper.public_key.as_ref(), "KeyPairWrapper", "publicKey")?;
                require(wrapper.encrypted_key_pair.as_ref(), "KeyPairWrapper", "encryptedKeyPair")?;
            }
            Some(ClosedGroupControl {
                kind: required_enum(
                    c.r#type,
                    "DataMessage.ClosedGroupControlMessage",
                    "type",
                    ClosedGroupControlType::from_wire,
                )?,
                public_key: c.public_key,
                name: c.name,
                encryption_key_pair: c.encryption_key_pair,
                members: c.members,
                admins: c.admins,
                wrappers: c.wrappers,
                expiration_timer: c.expiration_timer,
            })
        }
        None => None,
    };

    Ok(DataMessage {
        body: m.body,
        attachments: m.attachments,
        flags: m.flags,
        expire_timer: m.expire_timer,
        profile_key: m.profile_key,
        timestamp: m.timestamp.map(Timestamp::from_millis),
        quote: m.quote,
        preview: m.preview,
        reaction,
        profile: m.profile,
        open_group_invitation: m.open_group_invitation,
        closed_group_control,
        sync_target: m.sync_target,
        blocks_community_message_requests: m.blocks_community_message_requests,
    })
}

fn check_attachment(attachment: &proto::AttachmentPointer) -> Result<()> {
    require(attachment.id, "AttachmentPointer", "id").map(|_| ())
}

fn check_key_pair(pair: &proto::KeyPair) -> Result<()> {
    require(pair.public_key.as_ref(), "KeyPair", "publicKey")?;
    require(pair.private_key.as_ref(), "KeyPair", "privateKey")?;
    Ok(())
}

fn check_configuration(m: &proto::ConfigurationMessage) -> Result<()> {
    for group in &m.closed_groups {
        if let Some(pair) = &group.encryption_key_pair {
            check_key_pair(pair)?;
        }
    }
    for contact in &m.contacts {
        require(contact.public_key.as_ref(), "ConfigurationMessage.Contact", "publicKey")?;
        require(contact.name.as_ref(), "ConfigurationMessage.Contact", "name")?;
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// CallMessage
// ---------------------------------------------------------------------------

fn call_to_wire(m: &CallMessage) -> proto::CallMessage {
    proto::CallMessage {
        r#type: Some(m.kind.to_wire()),
        sdps: m.sdps.clone(),
        sdp_m_line_indexes: m.sdp_m_line_indexes.clone(),
        sdp_mids: m.sdp_mids.clone(),
        uuid: Some(m.uuid.clone()),
    }
}

fn call_from_wire(m: proto::CallMessage) -> Result<CallMessage> {
    Ok(CallMessage {
        kind: required_enum(m.r#type, "CallMessage", "type", CallType::from_wire)?,
        sdps: m.sdps,
        sdp_m_line_indexes: m.sdp_m_line_indexes,
        sdp_mids: m.sdp_mids,
        uuid: require(m.uuid, "CallMessage", "uuid")?,
    })
}
