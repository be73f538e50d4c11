//! Shared fixtures: an in-memory swarm and two known identities.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use session_crypto::ready;
use session_node::transport::{FetchRequest, StoredMessage, SubmitAck, SubmitRequest, Transport};
use session_node::Session;
use session_types::config::SessionConfig;
use session_types::{Clock, FixedClock, Namespace, Result, SessionError, SessionId, Timestamp};

pub type TestResult = std::result::Result<(), SessionError>;

pub const HIJACK: &str =
    "hijack cocoa furnished tacit jaunt polar invoke anchor efficient tiger identity opacity cocoa";
pub const PUFFIN: &str =
    "puffin luxury annoyed rustled memoir faxed smidgen puddle kiwi nylon utopia zinger kiwi";

pub const START: Timestamp = Timestamp::from_millis(1_752_458_289_343);

// ---------------------------------------------------------------------------
// MemoryTransport
// ---------------------------------------------------------------------------

/// Stores submitted envelopes per `(owner, namespace)` and serves them
/// back after `last_hash`, like a single storage node would.
#[derive(Default)]
pub struct MemoryTransport {
    swarms: Mutex<HashMap<(SessionId, Namespace), Vec<StoredMessage>>>,
    next_hash: AtomicU64,
    failures_left: AtomicU32,
    pub fetches: Mutex<Vec<FetchRequest>>,
    pub submits: Mutex<Vec<SubmitRequest>>,
}

impl MemoryTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Appends raw bytes to a swarm under a fresh hash.
    pub fn inject(&self, owner: SessionId, namespace: Namespace, data: Vec<u8>) -> String {
        let hash = format!("hash-{}", self.next_hash.fetch_add(1, Ordering::SeqCst));
        self.swarms
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .entry((owner, namespace))
            .or_default()
            .push(StoredMessage {
                hash: hash.clone(),
                data,
            });
        hash
    }

    /// Everything stored for `owner` in `namespace`.
    pub fn stored(&self, owner: SessionId, namespace: Namespace) -> Vec<StoredMessage> {
        self.swarms
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(&(owner, namespace))
            .cloned()
            .unwrap_or_default()
    }

    /// Makes the next `n` fetches fail.
    pub fn fail_next(&self, n: u32) {
        self.failures_left.store(n, Ordering::SeqCst);
    }

    pub fn fetch_count(&self) -> usize {
        self.fetches.lock().unwrap_or_else(|e| e.into_inner()).len()
    }
}

#[async_trait]
impl Transport for MemoryTransport {
    async fn fetch_messages(&self, request: &FetchRequest) -> Result<Vec<StoredMessage>> {
        self.fetches
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(request.clone());

        let failing = self
            .failures_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            return Err(SessionError::TransportError {
                reason: "swarm unreachable".into(),
            });
        }

        let messages = self.stored(request.pubkey, request.namespace);
        let start = messages
            .iter()
            .position(|m| m.hash == request.last_hash)
            .map_or(0, |i| i + 1);
        Ok(messages[start..].to_vec())
    }

    async fn submit(&self, request: SubmitRequest) -> Result<SubmitAck> {
        let hash = self.inject(request.recipient, request.namespace, request.data.clone());
        self.submits
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(request);
        Ok(SubmitAck { hash: Some(hash) })
    }
}

// ---------------------------------------------------------------------------
// Sessions
// ---------------------------------------------------------------------------

pub fn clock() -> Arc<FixedClock> {
    Arc::new(FixedClock::new(START))
}

/// A session logged in with `phrase`, sharing `transport` and `clock`.
pub fn session(
    transport: &Arc<MemoryTransport>,
    clock: &Arc<FixedClock>,
    config: SessionConfig,
    phrase: &str,
) -> std::result::Result<Session, SessionError> {
    let ready = ready::init()?;
    let transport: Arc<dyn Transport> = transport.clone();
    let clock: Arc<dyn Clock> = clock.clone();
    let session = Session::new(&ready, transport, config)?.with_clock(clock);
    session.set_mnemonic(phrase)?;
    Ok(session)
}

/// Config with a short schedule for the timer-driven tests.
pub fn fast_config() -> SessionConfig {
    let mut config = SessionConfig::default();
    config.poller.interval_ms = 1_000;
    config.poller.backoff_base_ms = 100;
    config.poller.backoff_cap_ms = 400;
    config
}
