//! The `Session` facade: identity, subscriptions, pollers and sending
//! behind one handle.
//!
//! ```ignore
//! let session = Session::new(&ready::init()?, transport, SessionConfig::default())?;
//! session.set_mnemonic(phrase)?;
//! session.on(EventKind::Message, |event| println!("{:?}", event.content));
//! session.add_poller(session.default_poller()?)?;
//! session.send_message(&peer, "hello").await?;
//! ```

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use session_crypto::{CryptoReady, IdentityManager};
use session_protocol::messages::{
    to_raw_message, ContentMessage, MessageMeta, Receipt, TypingIndicator, UnsendRequest, VisibleMessage,
};
use session_types::config::SessionConfig;
use session_types::{Clock, Namespace, Result, SessionId, SystemClock, Timestamp};
use tokio::sync::broadcast;

use crate::events::{EventKind, HandlerId, HandlerRegistry, MessageEvent};
use crate::outgoing::{self, SendReceipt};
use crate::poller::{Poller, PollerContext, PollerHandle};
use crate::transport::Transport;

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

/// One client of the Session network.
///
/// Dropping the facade stops every poller it started.
pub struct Session {
    config: SessionConfig,
    identities: Arc<IdentityManager>,
    handlers: Arc<HandlerRegistry>,
    transport: Arc<dyn Transport>,
    clock: Arc<dyn Clock>,
    pollers: Mutex<Vec<PollerHandle>>,
}

impl Session {
    /// Creates a facade with no identity. Call [`set_mnemonic`](Self::set_mnemonic)
    /// before polling or sending.
    ///
    /// # Errors
    ///
    /// [`SessionError::ConfigError`](session_types::SessionError::ConfigError)
    /// if `config` does not validate.
    pub fn new(ready: &CryptoReady, transport: Arc<dyn Transport>, config: SessionConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            handlers: Arc::new(HandlerRegistry::new(config.event_channel_size)),
            identities: Arc::new(IdentityManager::new(ready)),
            transport,
            clock: Arc::new(SystemClock),
            pollers: Mutex::new(Vec::new()),
            config,
        })
    }

    /// Replaces the time source used for signing and message timestamps.
    /// Pollers added afterwards use it too.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    // -----------------------------------------------------------------------
    // Identity
    // -----------------------------------------------------------------------

    /// Derives and installs the identity for `phrase`.
    ///
    /// Running pollers pick up the new identity on their next cycle;
    /// a cycle already in flight finishes with the old one.
    pub fn set_mnemonic(&self, phrase: &str) -> Result<SessionId> {
        let session_id = self.identities.set_mnemonic(phrase)?;
        tracing::info!(%session_id, "identity set");
        Ok(session_id)
    }

    pub fn get_session_id(&self) -> Result<SessionId> {
        self.identities.session_id()
    }

    /// `true` once an identity is installed.
    pub fn is_authorized(&self) -> bool {
        self.identities.is_initialized()
    }

    // -----------------------------------------------------------------------
    // Events
    // -----------------------------------------------------------------------

    pub fn on<F>(&self, kind: EventKind, handler: F) -> HandlerId
    where
        F: Fn(&MessageEvent) + Send + Sync + 'static,
    {
        self.handlers.on(kind, handler)
    }

    pub fn off(&self, id: HandlerId) -> bool {
        self.handlers.off(id)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<MessageEvent> {
        self.handlers.subscribe()
    }

    // -----------------------------------------------------------------------
    // Pollers
    // -----------------------------------------------------------------------

    /// A poller over this session's transport with the configured
    /// defaults, polling the default namespace.
    pub fn default_poller(&self) -> Result<Poller> {
        Poller::new(Arc::clone(&self.transport), self.config.poller.clone())
    }

    fn context(&self) -> PollerContext {
        PollerContext {
            identities: Arc::clone(&self.identities),
            handlers: Arc::clone(&self.handlers),
            clock: Arc::clone(&self.clock),
        }
    }

    /// Starts `poller` against this session's identity and handlers.
    ///
    /// # Errors
    ///
    /// [`SessionError::NotInitialized`](session_types::SessionError::NotInitialized)
    /// if no identity is set or no tokio runtime is running.
    pub fn add_poller(&self, poller: Poller) -> Result<PollerHandle> {
        self.identities.current()?;
        let handle = poller.start(self.context())?;
        lock(&self.pollers).push(handle.clone());
        Ok(handle)
    }

    /// Runs one cycle of `poller` inline, without scheduling it.
    pub async fn poll_once(&self, poller: &Poller) -> Result<usize> {
        poller.poll_once(&self.context()).await
    }

    pub fn poller_count(&self) -> usize {
        lock(&self.pollers).len()
    }

    /// Stops and forgets every poller started through this facade.
    pub fn stop_all_pollers(&self) {
        let pollers = std::mem::take(&mut *lock(&self.pollers));
        for handle in &pollers {
            handle.stop();
        }
        if !pollers.is_empty() {
            tracing::info!(count = pollers.len(), "pollers stopped");
        }
    }

    // -----------------------------------------------------------------------
    // Sending
    // -----------------------------------------------------------------------

    fn meta(&self) -> MessageMeta {
        MessageMeta::new(self.clock.now())
    }

    /// Encrypts and stores `message` on `to`'s swarm.
    ///
    /// Messages whose kind has no specific TTL use
    /// `config.default_ttl_ms`.
    pub async fn send(&self, to: &SessionId, message: &dyn ContentMessage) -> Result<SendReceipt> {
        let identity = self.identities.current()?;
        let mut raw = to_raw_message(to, message, Namespace::DEFAULT, false)?;
        raw.ttl_ms.get_or_insert(self.config.default_ttl_ms);
        outgoing::send_raw(self.transport.as_ref(), &identity, self.clock.as_ref(), &raw, None).await
    }

    /// Sends a plain text message.
    pub async fn send_message(&self, to: &SessionId, text: &str) -> Result<SendReceipt> {
        let message = VisibleMessage::text(self.meta(), text);
        self.send(to, &message).await
    }

    /// Asks `to` to delete the message we sent at `sent_at`.
    pub async fn delete_message(&self, to: &SessionId, sent_at: Timestamp) -> Result<SendReceipt> {
        let message = UnsendRequest {
            meta: MessageMeta::new(sent_at),
            author: self.get_session_id()?,
        };
        self.send(to, &message).await
    }

    /// Sends a read receipt for messages `to` sent at `timestamps`.
    pub async fn mark_messages_as_read(&self, to: &SessionId, timestamps: Vec<Timestamp>) -> Result<SendReceipt> {
        self.send(to, &Receipt::read(self.meta(), timestamps)).await
    }

    pub async fn show_typing_indicator(&self, to: &SessionId, is_typing: bool) -> Result<SendReceipt> {
        let now = self.clock.now();
        let message = TypingIndicator {
            meta: MessageMeta::new(now),
            is_typing,
            typing_timestamp: Some(now),
        };
        self.send(to, &message).await
    }

    /// Reacts with `emoji` to the message `author` sent at `message_ts`.
    pub async fn add_reaction(
        &self,
        to: &SessionId,
        message_ts: Timestamp,
        author: &SessionId,
        emoji: &str,
    ) -> Result<SendReceipt> {
        let message = VisibleMessage::reaction(self.meta(), message_ts, author, emoji, false);
        self.send(to, &message).await
    }

    pub async fn remove_reaction(
        &self,
        to: &SessionId,
        message_ts: Timestamp,
        author: &SessionId,
        emoji: &str,
    ) -> Result<SendReceipt> {
        let message = VisibleMessage::reaction(self.meta(), message_ts, author, emoji, true);
        self.send(to, &message).await
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.stop_all_pollers();
    }
}
