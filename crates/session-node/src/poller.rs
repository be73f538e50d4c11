//! Swarm poller.
//!
//! One [`Poller`] owns a schedule, a per-namespace cursor and a bounded
//! dedup cache. Each cycle runs
//!
//! ```text
//! Idle ──tick──▶ Fetching ──ok──▶ Dispatching ──▶ Idle
//!                    │
//!                    └──err──▶ Backoff ──delay──▶ Idle
//! ```
//!
//! and every stored message goes through decode envelope, open and
//! verify (when configured), unpad, decode content, dedup and dispatch.
//! Per-message failures are counted in [`PollerStats`] and never abort
//! the batch.
//!
//! [`PollerHandle::stop`] is cooperative: an in-flight fetch completes,
//! but once `stop` returns no handler or subscriber sees another event.
//! Stops issued from inside a handler do not wait for the target's
//! current event.

use std::cell::Cell;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use session_crypto::sealed::open_sealed;
use session_crypto::signing::sign_node_request;
use session_crypto::{Identity, IdentityManager};
use session_protocol::content::EnvelopeType;
use session_protocol::dedup::{DedupCache, DedupKey};
use session_protocol::{decode_content, decode_envelope, padding};
use session_types::config::PollerConfig;
use session_types::{Clock, Namespace, Result, SessionError, Timestamp};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::events::{EventKind, HandlerRegistry, MessageEvent};
use crate::transport::{FetchRequest, StoredMessage, Transport};

/// Node-auth method signed for every fetch.
const RETRIEVE_METHOD: &str = "retrieve";

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

// ---------------------------------------------------------------------------
// State and stats
// ---------------------------------------------------------------------------

/// Observable phase of a poller.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum PollerState {
    Idle,
    Fetching,
    Dispatching,
    Backoff,
    Stopped,
}

/// Running counters. Every dropped message lands in exactly one
/// `dropped_*` bucket.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct PollerStats {
    /// Fetch requests issued, one per namespace per cycle.
    pub polls: u64,
    pub fetch_failures: u64,
    /// Reset to zero by the next fully successful cycle.
    pub consecutive_failures: u32,
    /// Stored messages returned by the transport.
    pub received: u64,
    pub dispatched: u64,
    pub duplicates: u64,
    pub heartbeats: u64,
    /// Envelope or content failed to decode.
    pub dropped_malformed: u64,
    /// Sender signature did not verify.
    pub dropped_signature: u64,
    /// Content could not be opened with our keys.
    pub dropped_undecryptable: u64,
    /// Non-fatal decode warnings (unknown optional enum values).
    pub warnings: u64,
}

/// Collaborators a running poller needs from its owner.
#[derive(Clone)]
pub struct PollerContext {
    pub identities: Arc<IdentityManager>,
    pub handlers: Arc<HandlerRegistry>,
    pub clock: Arc<dyn Clock>,
}

/// Delay before retrying after `failures` consecutive fetch failures:
/// `base * 2^(failures - 1)`, capped.
pub fn backoff_delay(config: &PollerConfig, failures: u32) -> Duration {
    let exponent = failures.saturating_sub(1).min(32);
    let ms = config
        .backoff_base_ms
        .saturating_mul(1u64 << exponent)
        .min(config.backoff_cap_ms);
    Duration::from_millis(ms)
}

// ---------------------------------------------------------------------------
// DispatchGate
// ---------------------------------------------------------------------------

/// Serializes dispatch against `close`.
///
/// `close` waits for an in-progress dispatch on another thread to
/// finish, unless the calling thread is itself inside a dispatch (of
/// this or any other gate). A handler that stops a poller therefore
/// only raises the flag: the target finishes its current event and
/// skips the rest of its batch. Two handlers stopping each other's
/// pollers cannot deadlock.
#[derive(Default)]
struct DispatchGate {
    stopped: AtomicBool,
    lock: Mutex<()>,
}

thread_local! {
    /// Number of gates this thread is currently dispatching through.
    static DISPATCH_DEPTH: Cell<u32> = const { Cell::new(0) };
}

fn in_dispatch() -> bool {
    DISPATCH_DEPTH.with(|d| d.get() > 0)
}

struct DepthGuard;

impl DepthGuard {
    fn enter() -> Self {
        DISPATCH_DEPTH.with(|d| d.set(d.get() + 1));
        Self
    }
}

impl Drop for DepthGuard {
    fn drop(&mut self) {
        DISPATCH_DEPTH.with(|d| d.set(d.get().saturating_sub(1)));
    }
}

impl DispatchGate {
    fn is_closed(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }

    /// Runs `f` unless the gate is closed. Returns whether it ran.
    fn run(&self, f: impl FnOnce()) -> bool {
        let _held = lock(&self.lock);
        if self.is_closed() {
            return false;
        }
        let _depth = DepthGuard::enter();
        f();
        true
    }

    fn close(&self) {
        self.stopped.store(true, Ordering::SeqCst);
        if in_dispatch() {
            return;
        }
        drop(lock(&self.lock));
    }
}

// ---------------------------------------------------------------------------
// Poller
// ---------------------------------------------------------------------------

struct Shared {
    state: Mutex<PollerState>,
    stats: Mutex<PollerStats>,
    cursors: Mutex<HashMap<Namespace, String>>,
    dedup: Mutex<DedupCache>,
    gate: DispatchGate,
}

impl Shared {
    fn set_state(&self, next: PollerState) {
        let mut state = lock(&self.state);
        *state = if self.gate.is_closed() { PollerState::Stopped } else { next };
    }

    fn bump(&self, f: impl FnOnce(&mut PollerStats)) {
        f(&mut lock(&self.stats));
    }
}

/// Polls one swarm on a fixed schedule.
pub struct Poller {
    transport: Arc<dyn Transport>,
    config: PollerConfig,
    namespaces: Vec<Namespace>,
    shared: Arc<Shared>,
}

impl Poller {
    /// Creates a poller for the default namespace.
    ///
    /// # Errors
    ///
    /// [`SessionError::ConfigError`] if `config` does not validate.
    pub fn new(transport: Arc<dyn Transport>, config: PollerConfig) -> Result<Self> {
        config.validate()?;
        let dedup = DedupCache::new(config.dedup_capacity, config.dedup_retention_ms);
        Ok(Self {
            transport,
            config,
            namespaces: vec![Namespace::DEFAULT],
            shared: Arc::new(Shared {
                state: Mutex::new(PollerState::Idle),
                stats: Mutex::new(PollerStats::default()),
                cursors: Mutex::new(HashMap::new()),
                dedup: Mutex::new(dedup),
                gate: DispatchGate::default(),
            }),
        })
    }

    /// Replaces the polled namespaces. Each cycle fetches them in order.
    pub fn with_namespaces(mut self, namespaces: Vec<Namespace>) -> Result<Self> {
        if namespaces.is_empty() {
            return Err(SessionError::ConfigError {
                reason: "poller needs at least one namespace".into(),
            });
        }
        self.namespaces = namespaces;
        Ok(self)
    }

    pub fn namespaces(&self) -> &[Namespace] {
        &self.namespaces
    }

    pub fn config(&self) -> &PollerConfig {
        &self.config
    }

    pub fn state(&self) -> PollerState {
        *lock(&self.shared.state)
    }

    pub fn stats(&self) -> PollerStats {
        lock(&self.shared.stats).clone()
    }

    /// Hash of the newest message seen in `namespace`.
    pub fn last_hash(&self, namespace: Namespace) -> Option<String> {
        lock(&self.shared.cursors).get(&namespace).cloned()
    }

    /// Runs one fetch-and-dispatch cycle over every namespace.
    ///
    /// Returns the number of events dispatched.
    ///
    /// # Errors
    ///
    /// - [`SessionError::NotInitialized`] if no identity is set.
    /// - The transport's error if a fetch fails. Namespaces already
    ///   processed in this cycle keep their progress.
    pub async fn poll_once(&self, ctx: &PollerContext) -> Result<usize> {
        if self.shared.gate.is_closed() {
            return Ok(0);
        }
        let identity = ctx.identities.current()?;
        let mut dispatched = 0;

        for &namespace in &self.namespaces {
            if self.shared.gate.is_closed() {
                break;
            }
            let batch = self.fetch(&identity, namespace, ctx.clock.as_ref()).await?;
            dispatched += self.dispatch_batch(&identity, namespace, &batch, ctx)?;
            // Decrypt and decode are CPU-bound; let other tasks run
            // between namespaces.
            tokio::task::yield_now().await;
        }

        self.shared.bump(|s| s.consecutive_failures = 0);
        self.shared.set_state(PollerState::Idle);
        Ok(dispatched)
    }

    async fn fetch(&self, identity: &Identity, namespace: Namespace, clock: &dyn Clock) -> Result<Vec<StoredMessage>> {
        self.shared.set_state(PollerState::Fetching);
        let request = FetchRequest {
            pubkey: identity.session_id(),
            namespace,
            last_hash: self.last_hash(namespace).unwrap_or_default(),
            auth: sign_node_request(identity, RETRIEVE_METHOD, namespace, clock),
        };
        self.shared.bump(|s| s.polls += 1);

        match self.transport.fetch_messages(&request).await {
            Ok(batch) => {
                if let Some(newest) = batch.last() {
                    lock(&self.shared.cursors).insert(namespace, newest.hash.clone());
                }
                self.shared.bump(|s| s.received += batch.len() as u64);
                tracing::debug!(%namespace, count = batch.len(), "fetched messages");
                Ok(batch)
            }
            Err(e) => {
                self.shared.bump(|s| {
                    s.fetch_failures += 1;
                    s.consecutive_failures = s.consecutive_failures.saturating_add(1);
                });
                self.shared.set_state(PollerState::Backoff);
                tracing::warn!(%namespace, %e, "fetch failed");
                Err(e)
            }
        }
    }

    fn dispatch_batch(
        &self,
        identity: &Identity,
        namespace: Namespace,
        batch: &[StoredMessage],
        ctx: &PollerContext,
    ) -> Result<usize> {
        self.shared.set_state(PollerState::Dispatching);
        let mut dispatched = 0;

        for stored in batch {
            let event = match self.process(identity, namespace, stored, ctx.clock.now()) {
                Ok(Some(event)) => event,
                Ok(None) => continue,
                Err(e) if e.is_fatal_to_batch() => return Err(e),
                Err(e) => {
                    self.record_drop(&e, &stored.hash);
                    continue;
                }
            };

            if self.shared.gate.run(|| ctx.handlers.dispatch(&event)) {
                dispatched += 1;
                self.shared.bump(|s| s.dispatched += 1);
            } else {
                break;
            }
        }
        Ok(dispatched)
    }

    /// Turns one stored message into an event, or `None` for heartbeats
    /// and duplicates.
    fn process(
        &self,
        identity: &Identity,
        namespace: Namespace,
        stored: &StoredMessage,
        now: Timestamp,
    ) -> Result<Option<MessageEvent>> {
        let envelope = decode_envelope(&stored.data)?;
        let body = match envelope.content.as_deref() {
            Some(body) if !envelope.is_heartbeat() => body,
            _ => {
                self.shared.bump(|s| s.heartbeats += 1);
                return Ok(None);
            }
        };

        let (sender, plaintext) = if self.config.verify_signatures {
            match envelope.kind {
                EnvelopeType::SessionMessage => {
                    let opened = open_sealed(identity, body)?;
                    (Some(opened.sender), padding::unpad(&opened.plaintext)?.to_vec())
                }
                EnvelopeType::ClosedGroupMessage => {
                    return Err(SessionError::CryptoError {
                        reason: "no closed-group encryption key available".into(),
                    });
                }
            }
        } else {
            (None, body.to_vec())
        };

        let decoded = decode_content(&plaintext)?;
        if !decoded.warnings.is_empty() {
            for warning in &decoded.warnings {
                tracing::debug!(hash = %stored.hash, %warning, "content decoded with warning");
            }
            let n = decoded.warnings.len() as u64;
            self.shared.bump(|s| s.warnings += n);
        }

        let source = sender
            .map(|s| s.to_string())
            .or_else(|| envelope.source.clone())
            .unwrap_or_default();
        let key = DedupKey::new(source, envelope.timestamp, &plaintext);
        if !lock(&self.shared.dedup).insert(key, now) {
            self.shared.bump(|s| s.duplicates += 1);
            tracing::trace!(hash = %stored.hash, "duplicate message skipped");
            return Ok(None);
        }

        let content = decoded.into_value();
        Ok(Some(MessageEvent {
            kind: EventKind::classify(&content),
            namespace,
            envelope_type: envelope.kind,
            sender,
            source: envelope.source,
            timestamp: envelope.timestamp,
            server_timestamp: envelope.server_timestamp,
            hash: stored.hash.clone(),
            content,
        }))
    }

    fn record_drop(&self, error: &SessionError, hash: &str) {
        self.shared.bump(|s| match error {
            SessionError::SignatureVerificationFailed { .. } => s.dropped_signature += 1,
            SessionError::CryptoError { .. } => s.dropped_undecryptable += 1,
            _ => s.dropped_malformed += 1,
        });
        tracing::debug!(%hash, %error, "dropped message");
    }

    /// Spawns the polling loop on the current tokio runtime.
    ///
    /// # Errors
    ///
    /// [`SessionError::NotInitialized`] when called outside a runtime.
    pub fn start(self, ctx: PollerContext) -> Result<PollerHandle> {
        let runtime = tokio::runtime::Handle::try_current().map_err(|e| SessionError::NotInitialized {
            reason: format!("poller needs a tokio runtime: {e}"),
        })?;
        let (stop_tx, stop_rx) = watch::channel(false);
        let shared = Arc::clone(&self.shared);
        let task = runtime.spawn(run_loop(self, ctx, stop_rx));

        Ok(PollerHandle {
            inner: Arc::new(HandleInner {
                shared,
                stop_tx,
                task: Mutex::new(Some(task)),
            }),
        })
    }
}

async fn run_loop(poller: Poller, ctx: PollerContext, mut stop_rx: watch::Receiver<bool>) {
    let mut ticker = tokio::time::interval(Duration::from_millis(poller.config.interval_ms));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    tracing::info!(namespaces = ?poller.namespaces, "poller started");

    loop {
        tokio::select! {
            _ = ticker.tick() => {}
            _ = stop_rx.changed() => break,
        }
        if poller.shared.gate.is_closed() {
            break;
        }

        if let Err(e) = poller.poll_once(&ctx).await {
            let failures = poller.stats().consecutive_failures;
            let delay = backoff_delay(&poller.config, failures);
            tracing::warn!(%e, failures, delay_ms = delay.as_millis() as u64, "poll failed, backing off");
            poller.shared.set_state(PollerState::Backoff);
            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                _ = stop_rx.changed() => break,
            }
            poller.shared.set_state(PollerState::Idle);
            ticker.reset();
        }
    }

    poller.shared.gate.close();
    poller.shared.set_state(PollerState::Stopped);
    tracing::info!("poller stopped");
}

// ---------------------------------------------------------------------------
// PollerHandle
// ---------------------------------------------------------------------------

struct HandleInner {
    shared: Arc<Shared>,
    stop_tx: watch::Sender<bool>,
    task: Mutex<Option<JoinHandle<()>>>,
}

/// Control handle for a started [`Poller`]. Cheap to clone; dropping
/// every clone stops the loop.
#[derive(Clone)]
pub struct PollerHandle {
    inner: Arc<HandleInner>,
}

impl PollerHandle {
    /// Stops the poller. Idempotent.
    ///
    /// Outside any handler it blocks until an in-progress dispatch
    /// finishes, so no event is delivered after it returns. Called from
    /// a handler (of this or another poller) it does not wait: the
    /// target delivers at most the event it is dispatching, then skips
    /// the rest of its batch.
    pub fn stop(&self) {
        self.inner.shared.gate.close();
        self.inner.shared.set_state(PollerState::Stopped);
        let _ = self.inner.stop_tx.send(true);
    }

    /// Waits for the loop task to exit. Returns immediately on the
    /// second call.
    pub async fn join(&self) {
        let task = lock(&self.inner.task).take();
        if let Some(task) = task {
            if let Err(e) = task.await {
                tracing::error!(%e, "poller task failed");
            }
        }
    }

    pub fn is_stopped(&self) -> bool {
        self.inner.shared.gate.is_closed()
    }

    pub fn state(&self) -> PollerState {
        *lock(&self.inner.shared.state)
    }

    pub fn stats(&self) -> PollerStats {
        lock(&self.inner.shared.stats).clone()
    }
}
