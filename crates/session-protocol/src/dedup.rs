//! Bounded cache of already-dispatched messages.
//!
//! A message is identified by its [`DedupKey`]: `(source, timestamp,
//! blake2b-256(content))`. The [`DedupCache`] remembers keys for a
//! retention window and never holds more than `capacity` entries.
//!
//! Implementation: `HashSet` for O(1) lookup + `VecDeque` in insertion
//! order. Expired entries are evicted from the front on every insert;
//! when the cache is still full, the oldest entry goes.

use std::collections::{HashSet, VecDeque};

use session_crypto::hash::blake2b_256;
use session_types::Timestamp;

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

/// Default maximum number of entries.
pub const DEFAULT_DEDUP_CAPACITY: usize = 10_000;

// ---------------------------------------------------------------------------
// DedupKey
// ---------------------------------------------------------------------------

/// Identity of one inbound message.
#[derive(Clone, Debug, Eq, PartialEq, Hash)]
pub struct DedupKey {
    /// Verified sender, else envelope source, else empty.
    pub source: String,
    pub timestamp: Timestamp,
    pub content_hash: [u8; 32],
}

impl DedupKey {
    /// Builds a key, hashing `content`.
    pub fn new(source: impl Into<String>, timestamp: Timestamp, content: &[u8]) -> Self {
        Self {
            source: source.into(),
            timestamp,
            content_hash: blake2b_256(content),
        }
    }
}

// ---------------------------------------------------------------------------
// DedupCache
// ---------------------------------------------------------------------------

/// Bounded set of recently seen [`DedupKey`]s.
pub struct DedupCache {
    seen: HashSet<DedupKey>,
    /// Insertion order with insertion time, for eviction.
    order: VecDeque<(DedupKey, Timestamp)>,
    capacity: usize,
    retention_ms: u64,
}

impl DedupCache {
    /// Creates a cache. A capacity of 0 is treated as 1.
    pub fn new(capacity: usize, retention_ms: u64) -> Self {
        let cap = capacity.max(1);
        Self {
            seen: HashSet::with_capacity(cap.min(DEFAULT_DEDUP_CAPACITY)),
            order: VecDeque::with_capacity(cap.min(DEFAULT_DEDUP_CAPACITY)),
            capacity: cap,
            retention_ms,
        }
    }

    /// Records `key` as seen at `now`.
    ///
    /// Returns `true` if the key was new, `false` if it is a duplicate.
    pub fn insert(&mut self, key: DedupKey, now: Timestamp) -> bool {
        self.evict_expired(now);

        if self.seen.contains(&key) {
            return false;
        }

        if self.seen.len() >= self.capacity {
            if let Some((oldest, _)) = self.order.pop_front() {
                self.seen.remove(&oldest);
            }
        }

        self.seen.insert(key.clone());
        self.order.push_back((key, now));
        true
    }

    /// Returns `true` if `key` is currently remembered.
    pub fn contains(&self, key: &DedupKey) -> bool {
        self.seen.contains(key)
    }

    /// Drops entries inserted more than the retention window before `now`.
    pub fn evict_expired(&mut self, now: Timestamp) {
        while let Some((_, inserted)) = self.order.front() {
            if now.millis_since(*inserted) <= self.retention_ms {
                break;
            }
            if let Some((key, _)) = self.order.pop_front() {
                self.seen.remove(&key);
            }
        }
    }

    pub fn len(&self) -> usize {
        self.seen.len()
    }

    pub fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }
}
