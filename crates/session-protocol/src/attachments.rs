//! Attachment pointers.
//!
//! Glue between [`session_crypto::attachment`] and the wire: fills the
//! `key`, `digest` and `size` of an [`proto::AttachmentPointer`] after
//! upload, and checks them when a recipient downloads the file.

use session_crypto::attachment::{self, EncryptedAttachment};
use session_types::{Result, SessionError};

use crate::proto;

/// Where the file server stored an encrypted attachment.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct UploadedFile {
    pub id: u64,
    pub url: String,
}

/// Builds the pointer for an uploaded attachment. `plaintext_len` is
/// the unpadded length, which the recipient truncates to.
pub fn pointer_for(
    encrypted: &EncryptedAttachment,
    upload: &UploadedFile,
    content_type: &str,
    file_name: Option<&str>,
    plaintext_len: usize,
) -> Result<proto::AttachmentPointer> {
    let size = u32::try_from(plaintext_len).map_err(|_| SessionError::ProtocolError {
        reason: format!("attachment of {plaintext_len} bytes is too large"),
    })?;
    Ok(proto::AttachmentPointer {
        id: Some(upload.id),
        content_type: Some(content_type.to_string()),
        key: Some(encrypted.key.as_bytes().to_vec()),
        size: Some(size),
        digest: Some(encrypted.digest.to_vec()),
        file_name: file_name.map(str::to_string),
        url: Some(upload.url.clone()),
        ..proto::AttachmentPointer::default()
    })
}

/// Verifies and decrypts `downloaded` against its pointer.
///
/// # Errors
///
/// - [`SessionError::MissingRequiredField`] if the pointer has no key
///   or digest.
/// - [`SessionError::CryptoError`] if the MAC, digest or size check
///   fails.
pub fn open_pointer(pointer: &proto::AttachmentPointer, downloaded: &[u8]) -> Result<Vec<u8>> {
    let key = pointer.key.as_deref().ok_or(SessionError::MissingRequiredField {
        message: "AttachmentPointer",
        field: "key",
    })?;
    let digest = pointer.digest.as_deref().ok_or(SessionError::MissingRequiredField {
        message: "AttachmentPointer",
        field: "digest",
    })?;
    let size = pointer.size.map(|s| s as usize).filter(|&s| s > 0);
    attachment::decrypt_attachment(downloaded, key, digest, size)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec;
    use crate::messages::{ContentMessage, MessageMeta, VisibleMessage};
    use session_crypto::attachment::encrypt_attachment;
    use session_types::Timestamp;

    type TestResult = std::result::Result<(), SessionError>;

    fn upload() -> UploadedFile {
        UploadedFile {
            id: 42,
            url: "http://files.example/file/42".into(),
        }
    }

    #[test]
    fn pointer_survives_the_wire_and_opens() -> TestResult {
        let file = b"%PDF-1.4 tiny";
        let encrypted = encrypt_attachment(file, true)?;
        let pointer = pointer_for(&encrypted, &upload(), "application/pdf", Some("a.pdf"), file.len())?;

        let mut msg = VisibleMessage::text(MessageMeta::new(Timestamp::from_millis(1)), "see attached");
        msg.attachments.push(pointer);
        let bytes = codec::encode_content(&msg.to_content()?);
        let decoded = codec::decode_content(&bytes)?.value;
        let received = decoded
            .data_message()
            .and_then(|d| d.attachments.first().cloned())
            .ok_or(SessionError::ProtocolError {
                reason: "attachment pointer lost".into(),
            })?;

        assert_eq!(received.size, Some(file.len() as u32));
        assert_eq!(received.digest.as_deref(), Some(&encrypted.digest[..]));
        assert_eq!(open_pointer(&received, &encrypted.ciphertext)?, file);
        Ok(())
    }

    #[test]
    fn tampered_download_rejected() -> TestResult {
        let encrypted = encrypt_attachment(b"payload", true)?;
        let pointer = pointer_for(&encrypted, &upload(), "text/plain", None, 7)?;
        let mut download = encrypted.ciphertext.clone();
        let last = download.len() - 1;
        download[last] ^= 0x01;
        assert!(matches!(
            open_pointer(&pointer, &download),
            Err(SessionError::CryptoError { .. })
        ));
        Ok(())
    }

    #[test]
    fn pointer_without_digest_is_rejected() -> TestResult {
        let encrypted = encrypt_attachment(b"payload", false)?;
        let mut pointer = pointer_for(&encrypted, &upload(), "text/plain", None, 7)?;
        pointer.digest = None;
        assert!(matches!(
            open_pointer(&pointer, &encrypted.ciphertext),
            Err(SessionError::MissingRequiredField { field: "digest", .. })
        ));
        Ok(())
    }
}
