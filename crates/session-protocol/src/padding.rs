//! Block padding for encrypted payloads.
//!
//! The plaintext is followed by a `0x80` terminator and zero-filled up
//! to one byte short of a multiple of [`BLOCK_SIZE`]. Unpadding scans
//! backwards past the zeros to the terminator.

use session_types::{Result, SessionError};

/// Padding block size in bytes.
pub const BLOCK_SIZE: usize = 160;

const TERMINATOR: u8 = 0x80;

/// Length of the padded form of an `unpadded_len`-byte message.
pub fn padded_len(unpadded_len: usize) -> usize {
    let with_terminator = unpadded_len + 2;
    with_terminator.div_ceil(BLOCK_SIZE) * BLOCK_SIZE - 1
}

/// Pads `plaintext`.
pub fn pad(plaintext: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(padded_len(plaintext.len()));
    out.extend_from_slice(plaintext);
    out.push(TERMINATOR);
    out.resize(padded_len(plaintext.len()), 0);
    out
}

/// Removes padding added by [`pad`].
///
/// Input whose last non-zero byte is not the terminator is returned
/// unchanged, so unpadded payloads from older clients still decode.
///
/// # Errors
///
/// [`SessionError::ProtocolError`] if the input is empty or all zeros.
pub fn unpad(padded: &[u8]) -> Result<&[u8]> {
    match padded.iter().rposition(|&b| b != 0) {
        Some(i) if padded[i] == TERMINATOR => Ok(&padded[..i]),
        Some(_) => Ok(padded),
        None => Err(SessionError::ProtocolError {
            reason: "padded payload has no terminator".into(),
        }),
    }
}
