//! Core shared types for the Session protocol engine.
//!
//! Identifiers, the millisecond [`Timestamp`], the injectable [`Clock`],
//! and the central [`SessionError`] live here so the crypto, protocol
//! and node crates can share them without depending on each other.

pub mod config;

use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};
use thiserror::Error;

// ---------------------------------------------------------------------------
// SessionId
// ---------------------------------------------------------------------------

/// User-facing Session address: `0x05` prefix followed by the 32-byte
/// X25519 public key, rendered as 66 hex characters.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub struct SessionId([u8; 32]);

impl SessionId {
    /// Prefix byte identifying a standard (unblinded) account.
    pub const PREFIX: u8 = 0x05;

    /// Length of the hex form, including the prefix.
    pub const HEX_LEN: usize = 66;

    /// Creates a `SessionId` from a raw X25519 public key.
    pub fn from_x25519(pubkey: [u8; 32]) -> Self {
        Self(pubkey)
    }

    /// Returns the X25519 public key without the prefix.
    pub fn x25519_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Returns the 33-byte prefixed form.
    pub fn to_prefixed_bytes(&self) -> [u8; 33] {
        let mut out = [0u8; 33];
        out[0] = Self::PREFIX;
        out[1..].copy_from_slice(&self.0);
        out
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02x}{}", Self::PREFIX, hex::encode(self.0))
    }
}

impl FromStr for SessionId {
    type Err = SessionError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let key = parse_prefixed_key(s, Self::PREFIX, "session id")?;
        Ok(Self(key))
    }
}

// ---------------------------------------------------------------------------
// BlindedId
// ---------------------------------------------------------------------------

/// Per-server pseudonymous identifier used by open groups: `0x15`
/// prefix followed by the 32-byte blinded Ed25519 public key.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub struct BlindedId([u8; 32]);

impl BlindedId {
    /// Prefix byte for 15-blinded identifiers.
    pub const PREFIX: u8 = 0x15;

    /// Creates a `BlindedId` from the blinded public key.
    pub fn from_blinded_pubkey(pubkey: [u8; 32]) -> Self {
        Self(pubkey)
    }

    /// Returns the blinded public key without the prefix.
    pub fn pubkey_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl fmt::Display for BlindedId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02x}{}", Self::PREFIX, hex::encode(self.0))
    }
}

impl FromStr for BlindedId {
    type Err = SessionError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let key = parse_prefixed_key(s, Self::PREFIX, "blinded id")?;
        Ok(Self(key))
    }
}

/// Parses `<prefix byte as hex><64 hex chars>` into the 32-byte key.
fn parse_prefixed_key(s: &str, prefix: u8, what: &str) -> Result<[u8; 32]> {
    let bytes = hex::decode(s).map_err(|_| SessionError::ProtocolError {
        reason: format!("invalid hex encoding for {what}"),
    })?;
    if bytes.len() != 33 {
        return Err(SessionError::ProtocolError {
            reason: format!("expected 33 bytes for {what}, got {}", bytes.len()),
        });
    }
    if bytes[0] != prefix {
        return Err(SessionError::ProtocolError {
            reason: format!("{what} must start with {prefix:02x}, got {:02x}", bytes[0]),
        });
    }
    let mut arr = [0u8; 32];
    arr.copy_from_slice(&bytes[1..]);
    Ok(arr)
}

// ---------------------------------------------------------------------------
// Namespace
// ---------------------------------------------------------------------------

/// Storage-node namespace a message is stored under.
///
/// Open-ended on the wire, so this is a newtype with well-known
/// constants rather than a closed enum.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub struct Namespace(pub i32);

impl Namespace {
    /// One-to-one user messages.
    pub const DEFAULT: Self = Self(0);
    /// User profile shared config.
    pub const USER_PROFILE: Self = Self(2);
    /// Contacts shared config.
    pub const CONTACTS: Self = Self(3);
    /// Conversation info (volatile) shared config.
    pub const CONVO_INFO_VOLATILE: Self = Self(4);
    /// User groups shared config.
    pub const USER_GROUPS: Self = Self(5);
    /// Legacy closed group messages.
    pub const CLOSED_GROUP_MESSAGES: Self = Self(-10);

    /// Returns the raw namespace number.
    pub fn value(&self) -> i32 {
        self.0
    }

    /// `true` for the default namespace, which node-auth payloads omit.
    pub fn is_default(&self) -> bool {
        self.0 == 0
    }
}

impl fmt::Display for Namespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// Timestamp
// ---------------------------------------------------------------------------

/// Milliseconds since the Unix epoch, unsigned 64-bit.
///
/// Every wire timestamp in the protocol uses this unit; open-group
/// request signing derives whole seconds via [`Timestamp::as_secs`].
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize)]
pub struct Timestamp(u64);

impl Timestamp {
    /// Creates a `Timestamp` from milliseconds since the epoch.
    pub const fn from_millis(ms: u64) -> Self {
        Self(ms)
    }

    /// Returns milliseconds since the epoch.
    pub fn as_millis(&self) -> u64 {
        self.0
    }

    /// Returns whole seconds since the epoch (truncating).
    pub fn as_secs(&self) -> u64 {
        self.0 / 1000
    }

    /// Returns `self + ms`, saturating at `u64::MAX`.
    pub fn saturating_add_millis(&self, ms: u64) -> Self {
        Self(self.0.saturating_add(ms))
    }

    /// Milliseconds elapsed from `earlier` to `self`, or zero if
    /// `earlier` is in the future.
    pub fn millis_since(&self, earlier: Timestamp) -> u64 {
        self.0.saturating_sub(earlier.0)
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// Clock
// ---------------------------------------------------------------------------

/// Source of the current time.
///
/// Signing and polling take a `Clock` instead of reading the system
/// time directly, so signatures are reproducible under test.
pub trait Clock: Send + Sync {
    /// Returns the current time.
    fn now(&self) -> Timestamp;
}

/// Wall-clock time via `chrono::Utc`.
#[derive(Clone, Copy, Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Timestamp {
        let ms = chrono::Utc::now().timestamp_millis();
        Timestamp(u64::try_from(ms).unwrap_or(0))
    }
}

/// Manually driven clock for deterministic tests and replays.
#[derive(Debug, Default)]
pub struct FixedClock(AtomicU64);

impl FixedClock {
    /// Creates a clock frozen at `ts`.
    pub fn new(ts: Timestamp) -> Self {
        Self(AtomicU64::new(ts.as_millis()))
    }

    /// Moves the clock to `ts`.
    pub fn set(&self, ts: Timestamp) {
        self.0.store(ts.as_millis(), Ordering::SeqCst);
    }

    /// Advances the clock by `ms` milliseconds.
    pub fn advance(&self, ms: u64) {
        self.0.fetch_add(ms, Ordering::SeqCst);
    }
}

impl Clock for FixedClock {
    fn now(&self) -> Timestamp {
        Timestamp(self.0.load(Ordering::SeqCst))
    }
}

// ---------------------------------------------------------------------------
// SessionError
// ---------------------------------------------------------------------------

/// Central error type for the Session protocol engine.
///
/// All crates in the workspace convert their internal errors into
/// variants of this enum.
#[derive(Debug, Error)]
pub enum SessionError {
    /// Seed or phrase has an unsupported length.
    #[error("invalid seed length: expected {expected}, got {got}")]
    InvalidSeedLength {
        /// Human-readable description of the accepted sizes.
        expected: String,
        /// The length actually supplied.
        got: usize,
    },

    /// The trailing checksum word does not match the phrase.
    #[error("invalid mnemonic checksum: {reason}")]
    InvalidChecksum {
        /// Which word was expected.
        reason: String,
    },

    /// A phrase word is not present in any candidate wordlist.
    #[error("unknown mnemonic word: '{word}'")]
    UnknownWord {
        /// The offending word.
        word: String,
    },

    /// Seed material cannot be turned into an identity.
    #[error("invalid seed: {reason}")]
    InvalidSeed {
        /// Human-readable description of the failure.
        reason: String,
    },

    /// A signature did not verify against the claimed key.
    #[error("signature verification failed: {reason}")]
    SignatureVerificationFailed {
        /// Human-readable description of the failure.
        reason: String,
    },

    /// A field marked required in the wire schema was absent.
    #[error("missing required field {message}.{field}")]
    MissingRequiredField {
        /// Schema message the field belongs to.
        message: &'static str,
        /// Field name.
        field: &'static str,
    },

    /// An enum field carried a value outside the declared range.
    #[error("unknown enum value {value} for field {field}")]
    UnknownEnumValue {
        /// Qualified field name.
        field: &'static str,
        /// The raw value received.
        value: i32,
    },

    /// More than one payload variant was set on a Content.
    #[error("multiple content payloads set: {first} and {second}")]
    MultiplePayloadsSet {
        /// The payload set first.
        first: &'static str,
        /// The conflicting payload.
        second: &'static str,
    },

    /// Fetching or submitting over the network collaborator failed.
    #[error("transport error: {reason}")]
    TransportError {
        /// Human-readable description of the transport failure.
        reason: String,
    },

    /// A cryptographic primitive failed (encryption, key conversion).
    #[error("crypto error: {reason}")]
    CryptoError {
        /// Human-readable description of the cryptographic failure.
        reason: String,
    },

    /// Malformed bytes or identifiers at the protocol layer.
    #[error("protocol error: {reason}")]
    ProtocolError {
        /// Human-readable description of the protocol failure.
        reason: String,
    },

    /// A configuration value is invalid or missing.
    #[error("config error: {reason}")]
    ConfigError {
        /// Human-readable description of the configuration problem.
        reason: String,
    },

    /// An operation needs state that has not been set up yet.
    #[error("not initialized: {reason}")]
    NotInitialized {
        /// What is missing.
        reason: String,
    },
}

impl SessionError {
    /// `true` for errors caused by local state rather than by the
    /// message being processed. These abort a poll batch instead of
    /// being counted as a dropped message.
    pub fn is_fatal_to_batch(&self) -> bool {
        matches!(self, Self::ConfigError { .. } | Self::NotInitialized { .. })
    }
}

// ---------------------------------------------------------------------------
// Result alias
// ---------------------------------------------------------------------------

/// Convenience result type using [`SessionError`].
pub type Result<T> = std::result::Result<T, SessionError>;

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    const PUFFIN_ID: &str = "054830367d369d94605247999a375dbd0a0f65fdec5de1535612bcb6d4de452c69";

    #[test]
    fn session_id_roundtrip_hex() -> std::result::Result<(), SessionError> {
        let id: SessionId = PUFFIN_ID.parse()?;
        assert_eq!(id.to_string(), PUFFIN_ID);
        assert_eq!(id.to_prefixed_bytes()[0], 0x05);
        Ok(())
    }

    #[test]
    fn session_id_rejects_wrong_prefix() {
        let wrong = format!("15{}", &PUFFIN_ID[2..]);
        assert!(wrong.parse::<SessionId>().is_err());
    }

    #[test]
    fn session_id_rejects_bad_length_and_hex() {
        assert!("05abcd".parse::<SessionId>().is_err());
        assert!("zz".repeat(33).parse::<SessionId>().is_err());
    }

    #[test]
    fn blinded_id_display_has_15_prefix() -> std::result::Result<(), SessionError> {
        let id = BlindedId::from_blinded_pubkey([0xAB; 32]);
        let s = id.to_string();
        assert!(s.starts_with("15"));
        assert_eq!(s.len(), 66);
        let parsed: BlindedId = s.parse()?;
        assert_eq!(parsed, id);
        Ok(())
    }

    #[test]
    fn timestamp_units() {
        let ts = Timestamp::from_millis(1_700_000_001_999);
        assert_eq!(ts.as_secs(), 1_700_000_001);
        assert_eq!(ts.saturating_add_millis(1).as_millis(), 1_700_000_002_000);
        assert_eq!(Timestamp::from_millis(5).millis_since(Timestamp::from_millis(9)), 0);
    }

    #[test]
    fn fixed_clock_is_controllable() {
        let clock = FixedClock::new(Timestamp::from_millis(1000));
        assert_eq!(clock.now().as_millis(), 1000);
        clock.advance(500);
        assert_eq!(clock.now().as_millis(), 1500);
        clock.set(Timestamp::from_millis(42));
        assert_eq!(clock.now().as_millis(), 42);
    }

    #[test]
    fn system_clock_is_after_2020() {
        assert!(SystemClock.now().as_millis() > 1_577_836_800_000);
    }

    #[test]
    fn namespace_default_detection() {
        assert!(Namespace::DEFAULT.is_default());
        assert!(!Namespace::USER_PROFILE.is_default());
        assert_eq!(Namespace::CLOSED_GROUP_MESSAGES.to_string(), "-10");
    }

    #[test]
    fn fatal_classification() {
        let err = SessionError::NotInitialized {
            reason: "no identity".into(),
        };
        assert!(err.is_fatal_to_batch());
        // Two payloads on the wire is the sender's fault, not ours.
        let err = SessionError::MultiplePayloadsSet {
            first: "dataMessage",
            second: "typingMessage",
        };
        assert!(!err.is_fatal_to_batch());
        let err = SessionError::MissingRequiredField {
            message: "Envelope",
            field: "timestamp",
        };
        assert!(!err.is_fatal_to_batch());
        assert!(err.to_string().contains("Envelope.timestamp"));
    }

    #[test]
    fn timestamp_serde_json_is_plain_number() -> std::result::Result<(), Box<dyn std::error::Error>> {
        let json = serde_json::to_string(&Timestamp::from_millis(17))?;
        assert_eq!(json, "17");
        Ok(())
    }
}
