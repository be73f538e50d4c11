//! Inbound message events and subscriber registry.
//!
//! Subscribers either register a synchronous callback for one
//! [`EventKind`] via [`HandlerRegistry::on`], or take a broadcast
//! receiver via [`HandlerRegistry::subscribe`] and consume every event
//! asynchronously.

use std::collections::BTreeMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use session_protocol::content::{Content, EnvelopeType, Payload, ReceiptType};
use session_types::{Namespace, SessionId, Timestamp};
use tokio::sync::broadcast;

// ---------------------------------------------------------------------------
// EventKind
// ---------------------------------------------------------------------------

/// Coarse classification of a decoded message.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, PartialOrd, Ord)]
pub enum EventKind {
    /// A visible message (text, attachments, quotes, sync copies).
    Message,
    /// A reaction added to or removed from a message.
    Reaction,
    /// An unsend request.
    MessageDeleted,
    /// A read receipt.
    MessageRead,
    Typing,
    Call,
    /// Everything else: config sync, delivery receipts, data-extraction
    /// notices, request responses, empty content.
    Control,
}

impl EventKind {
    /// Classifies `content` by its payload.
    pub fn classify(content: &Content) -> Self {
        match &content.payload {
            Some(Payload::Data(data)) if data.reaction.is_some() => Self::Reaction,
            Some(Payload::Data(_)) => Self::Message,
            Some(Payload::Unsend(_)) => Self::MessageDeleted,
            Some(Payload::Receipt(r)) if r.kind == ReceiptType::Read => Self::MessageRead,
            Some(Payload::Typing(_)) => Self::Typing,
            Some(Payload::Call(_)) => Self::Call,
            _ => Self::Control,
        }
    }
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Message => "message",
            Self::Reaction => "reaction",
            Self::MessageDeleted => "message_deleted",
            Self::MessageRead => "message_read",
            Self::Typing => "typing",
            Self::Call => "call",
            Self::Control => "control",
        };
        f.write_str(name)
    }
}

// ---------------------------------------------------------------------------
// MessageEvent
// ---------------------------------------------------------------------------

/// A decoded, verified and deduplicated inbound message.
#[derive(Clone, Debug, PartialEq)]
pub struct MessageEvent {
    pub kind: EventKind,
    pub namespace: Namespace,
    pub envelope_type: EnvelopeType,
    /// Authenticated sender, when the content was sealed.
    pub sender: Option<SessionId>,
    /// Envelope source (closed-group key), if any.
    pub source: Option<String>,
    pub timestamp: Timestamp,
    pub server_timestamp: Option<u64>,
    /// Storage hash of the carrying message.
    pub hash: String,
    pub content: Content,
}

// ---------------------------------------------------------------------------
// HandlerRegistry
// ---------------------------------------------------------------------------

/// Synchronous event callback.
pub type Handler = Arc<dyn Fn(&MessageEvent) + Send + Sync>;

/// Token returned by [`HandlerRegistry::on`], used to unregister.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, PartialOrd, Ord)]
pub struct HandlerId(u64);

/// Callback table plus broadcast fan-out.
pub struct HandlerRegistry {
    next_id: AtomicU64,
    handlers: Mutex<BTreeMap<HandlerId, (EventKind, Handler)>>,
    broadcast: broadcast::Sender<MessageEvent>,
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

impl HandlerRegistry {
    /// Creates a registry whose broadcast channel buffers `capacity`
    /// events per lagging receiver.
    pub fn new(capacity: usize) -> Self {
        let (broadcast, _) = broadcast::channel(capacity.max(1));
        Self {
            next_id: AtomicU64::new(1),
            handlers: Mutex::new(BTreeMap::new()),
            broadcast,
        }
    }

    /// Registers `handler` for events of `kind`.
    pub fn on<F>(&self, kind: EventKind, handler: F) -> HandlerId
    where
        F: Fn(&MessageEvent) + Send + Sync + 'static,
    {
        let id = HandlerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        lock(&self.handlers).insert(id, (kind, Arc::new(handler)));
        id
    }

    /// Unregisters a handler. Returns `false` if it was not registered.
    pub fn off(&self, id: HandlerId) -> bool {
        lock(&self.handlers).remove(&id).is_some()
    }

    /// Receiver for every dispatched event, regardless of kind.
    pub fn subscribe(&self) -> broadcast::Receiver<MessageEvent> {
        self.broadcast.subscribe()
    }

    pub fn handler_count(&self) -> usize {
        lock(&self.handlers).len()
    }

    /// Delivers `event` to matching callbacks in registration order,
    /// then to broadcast subscribers.
    ///
    /// The callback table is snapshotted first, so handlers may call
    /// [`on`](Self::on) or [`off`](Self::off) without deadlocking. A
    /// panicking handler is logged and skipped; later handlers and
    /// subscribers still see the event.
    pub fn dispatch(&self, event: &MessageEvent) {
        let matching: Vec<Handler> = lock(&self.handlers)
            .values()
            .filter(|(kind, _)| *kind == event.kind)
            .map(|(_, handler)| Arc::clone(handler))
            .collect();

        for handler in matching {
            if catch_unwind(AssertUnwindSafe(|| handler(event))).is_err() {
                tracing::error!(kind = %event.kind, hash = %event.hash, "event handler panicked");
            }
        }

        // No receivers is not an error.
        let _ = self.broadcast.send(event.clone());
    }
}

impl Default for HandlerRegistry {
    fn default() -> Self {
        Self::new(1024)
    }
}
