//! Storage TTLs, in milliseconds.

use session_types::config::FOURTEEN_DAYS_MS;

/// Default for ordinary messages.
pub const DEFAULT_TTL_MS: u64 = FOURTEEN_DAYS_MS;

pub const TYPING_TTL_MS: u64 = 20 * 1000;

pub const SHARED_CONFIG_TTL_MS: u64 = 30 * 24 * 60 * 60 * 1000;

/// Call signalling is useless once the call attempt is over.
pub const CALL_TTL_MS: u64 = 5 * 60 * 1000;
