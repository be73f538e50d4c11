//! Poller behaviour against an in-memory swarm.
//!
//! Cycles are driven inline with `poll_once` where ordering matters;
//! the scheduled loop is exercised under paused tokio time.

mod common;

use std::sync::{Arc, Mutex};
use std::time::Duration;

use rand::rngs::OsRng;
use session_crypto::signing::verify_node_request;
use session_crypto::{ready, Identity};
use session_node::poller::{Poller, PollerHandle, PollerState};
use session_node::transport::Transport;
use session_node::{EventKind, MessageEvent};
use session_protocol::content::{Content, Envelope, Payload, TypingAction, TypingMessage};
use session_protocol::{encode_content, encode_envelope, padding};
use session_types::config::{PollerConfig, SessionConfig};
use session_types::{Namespace, SessionError};

use common::{clock, fast_config, session, MemoryTransport, TestResult, HIJACK, PUFFIN, START};

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn collect(session: &session_node::Session, kind: EventKind) -> Arc<Mutex<Vec<MessageEvent>>> {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    session.on(kind, move |event| {
        sink.lock().unwrap_or_else(|e| e.into_inner()).push(event.clone());
    });
    seen
}

fn count(seen: &Arc<Mutex<Vec<MessageEvent>>>) -> usize {
    seen.lock().unwrap_or_else(|e| e.into_inner()).len()
}

/// A sealed message from `from` to `to` whose embedded signature covers
/// the wrong bytes.
fn forged(from: &Identity, to: &Identity, plaintext: &[u8]) -> std::result::Result<Vec<u8>, SessionError> {
    let mut inner = padding::pad(plaintext);
    inner.extend_from_slice(from.ed25519_public_key().as_bytes());
    inner.extend_from_slice(from.sign(b"something else").as_bytes());
    let sealed = crypto_box::PublicKey::from(*to.x25519_public_key())
        .seal(&mut OsRng, &inner)
        .map_err(|e| SessionError::CryptoError { reason: e.to_string() })?;
    Ok(encode_envelope(&Envelope::session_message(START, sealed)))
}

// ---------------------------------------------------------------------------
// Dispatch
// ---------------------------------------------------------------------------

#[tokio::test]
async fn sent_message_is_received_with_verified_sender() -> TestResult {
    let transport = MemoryTransport::new();
    let clock = clock();
    let alice = session(&transport, &clock, SessionConfig::default(), HIJACK)?;
    let bob = session(&transport, &clock, SessionConfig::default(), PUFFIN)?;
    let bob_id = bob.get_session_id()?;
    let messages = collect(&bob, EventKind::Message);

    let receipt = alice.send_message(&bob_id, "hello bob").await?;
    assert_eq!(receipt.timestamp, START);

    let poller = bob.default_poller()?;
    assert_eq!(bob.poll_once(&poller).await?, 1);

    let events = messages.lock().unwrap_or_else(|e| e.into_inner()).clone();
    assert_eq!(events.len(), 1);
    let event = &events[0];
    assert_eq!(event.sender, Some(alice.get_session_id()?));
    assert_eq!(event.timestamp, START);
    assert_eq!(Some(event.hash.clone()), receipt.hash);
    assert_eq!(
        event.content.data_message().and_then(|d| d.body.as_deref()),
        Some("hello bob")
    );
    assert_eq!(poller.last_hash(Namespace::DEFAULT), receipt.hash);
    Ok(())
}

#[tokio::test]
async fn same_envelope_in_two_cycles_dispatches_once() -> TestResult {
    let transport = MemoryTransport::new();
    let clock = clock();
    let alice = session(&transport, &clock, SessionConfig::default(), HIJACK)?;
    let bob = session(&transport, &clock, SessionConfig::default(), PUFFIN)?;
    let bob_id = bob.get_session_id()?;
    let messages = collect(&bob, EventKind::Message);

    alice.send_message(&bob_id, "once").await?;
    let poller = bob.default_poller()?;
    assert_eq!(bob.poll_once(&poller).await?, 1);

    // The same bytes come back under a new storage hash.
    let stored = transport.stored(bob_id, Namespace::DEFAULT);
    let replay = transport.inject(bob_id, Namespace::DEFAULT, stored[0].data.clone());
    assert_eq!(bob.poll_once(&poller).await?, 0);

    assert_eq!(count(&messages), 1);
    let stats = poller.stats();
    assert_eq!(stats.received, 2);
    assert_eq!(stats.dispatched, 1);
    assert_eq!(stats.duplicates, 1);
    assert_eq!(poller.last_hash(Namespace::DEFAULT), Some(replay));
    Ok(())
}

#[tokio::test]
async fn bad_entries_are_dropped_and_counted() -> TestResult {
    let transport = MemoryTransport::new();
    let clock = clock();
    let alice = session(&transport, &clock, SessionConfig::default(), HIJACK)?;
    let bob = session(&transport, &clock, SessionConfig::default(), PUFFIN)?;
    let bob_id = bob.get_session_id()?;
    let messages = collect(&bob, EventKind::Message);

    let r = ready::init()?;
    let alice_key = Identity::from_mnemonic(&r, HIJACK)?;
    let bob_key = Identity::from_mnemonic(&r, PUFFIN)?;
    let text = encode_content(&Content::with_payload(Payload::Typing(TypingMessage {
        timestamp: START,
        action: TypingAction::Started,
    })));

    let heartbeat = Envelope {
        content: None,
        ..Envelope::session_message(START, Vec::new())
    };
    transport.inject(bob_id, Namespace::DEFAULT, encode_envelope(&heartbeat));
    transport.inject(bob_id, Namespace::DEFAULT, vec![0xff, 0xff, 0xff, 0xff]);
    transport.inject(
        bob_id,
        Namespace::DEFAULT,
        encode_envelope(&Envelope::session_message(START, vec![7u8; 120])),
    );
    transport.inject(bob_id, Namespace::DEFAULT, forged(&alice_key, &bob_key, &text)?);
    transport.inject(
        bob_id,
        Namespace::DEFAULT,
        encode_envelope(&Envelope::closed_group_message(bob_id.to_string(), START, vec![1u8; 64])),
    );
    alice.send_message(&bob_id, "the real one").await?;

    let poller = bob.default_poller()?;
    assert_eq!(bob.poll_once(&poller).await?, 1);
    assert_eq!(count(&messages), 1);

    let stats = poller.stats();
    assert_eq!(stats.received, 6);
    assert_eq!(stats.heartbeats, 1);
    assert_eq!(stats.dropped_malformed, 1);
    assert_eq!(stats.dropped_undecryptable, 2);
    assert_eq!(stats.dropped_signature, 1);
    assert_eq!(stats.dispatched, 1);
    Ok(())
}

#[tokio::test]
async fn unsealed_content_when_verification_is_off() -> TestResult {
    let transport = MemoryTransport::new();
    let clock = clock();
    let bob = session(&transport, &clock, SessionConfig::default(), PUFFIN)?;
    let bob_id = bob.get_session_id()?;
    let typing = collect(&bob, EventKind::Typing);

    let content = encode_content(&Content::with_payload(Payload::Typing(TypingMessage {
        timestamp: START,
        action: TypingAction::Started,
    })));
    transport.inject(
        bob_id,
        Namespace::DEFAULT,
        encode_envelope(&Envelope::session_message(START, content)),
    );

    let config = PollerConfig {
        verify_signatures: false,
        ..PollerConfig::default()
    };
    let dyn_transport: Arc<dyn Transport> = transport.clone();
    let poller = Poller::new(dyn_transport, config)?;
    assert_eq!(bob.poll_once(&poller).await?, 1);

    let events = typing.lock().unwrap_or_else(|e| e.into_inner()).clone();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].sender, None);
    Ok(())
}

#[tokio::test]
async fn broadcast_subscribers_see_every_kind() -> TestResult {
    let transport = MemoryTransport::new();
    let clock = clock();
    let alice = session(&transport, &clock, SessionConfig::default(), HIJACK)?;
    let bob = session(&transport, &clock, SessionConfig::default(), PUFFIN)?;
    let bob_id = bob.get_session_id()?;
    let mut rx = bob.subscribe();

    alice.send_message(&bob_id, "text").await?;
    clock.advance(1);
    alice.show_typing_indicator(&bob_id, true).await?;

    let poller = bob.default_poller()?;
    assert_eq!(bob.poll_once(&poller).await?, 2);

    let first = rx.try_recv().map_err(|e| SessionError::ProtocolError { reason: e.to_string() })?;
    let second = rx.try_recv().map_err(|e| SessionError::ProtocolError { reason: e.to_string() })?;
    assert_eq!(first.kind, EventKind::Message);
    assert_eq!(second.kind, EventKind::Typing);
    Ok(())
}

// ---------------------------------------------------------------------------
// Fetch requests
// ---------------------------------------------------------------------------

#[tokio::test]
async fn each_namespace_gets_a_signed_retrieve() -> TestResult {
    let transport = MemoryTransport::new();
    let clock = clock();
    let bob = session(&transport, &clock, SessionConfig::default(), PUFFIN)?;

    let dyn_transport: Arc<dyn Transport> = transport.clone();
    let poller = Poller::new(dyn_transport, PollerConfig::default())?
        .with_namespaces(vec![Namespace::DEFAULT, Namespace::USER_PROFILE])?;
    bob.poll_once(&poller).await?;

    let fetches = transport.fetches.lock().unwrap_or_else(|e| e.into_inner()).clone();
    assert_eq!(fetches.len(), 2);
    assert_eq!(fetches[0].namespace, Namespace::DEFAULT);
    assert_eq!(fetches[1].namespace, Namespace::USER_PROFILE);
    for fetch in &fetches {
        assert_eq!(fetch.pubkey, bob.get_session_id()?);
        assert_eq!(fetch.last_hash, "");
        assert_eq!(fetch.auth.method, "retrieve");
        assert_eq!(fetch.auth.timestamp, START);
        assert_eq!(fetch.auth.namespace, fetch.namespace);
        verify_node_request(&fetch.auth)?;
    }
    Ok(())
}

#[test]
fn empty_namespace_list_is_rejected() -> TestResult {
    let transport: Arc<dyn Transport> = MemoryTransport::new();
    let result = Poller::new(transport, PollerConfig::default())?.with_namespaces(Vec::new());
    assert!(matches!(result, Err(SessionError::ConfigError { .. })));
    Ok(())
}

#[test]
fn invalid_config_is_rejected() {
    let transport: Arc<dyn Transport> = MemoryTransport::new();
    let config = PollerConfig {
        interval_ms: 0,
        ..PollerConfig::default()
    };
    assert!(matches!(
        Poller::new(transport, config),
        Err(SessionError::ConfigError { .. })
    ));
}

// ---------------------------------------------------------------------------
// Failure and backoff
// ---------------------------------------------------------------------------

#[tokio::test]
async fn consecutive_failures_reset_on_success() -> TestResult {
    let transport = MemoryTransport::new();
    let clock = clock();
    let bob = session(&transport, &clock, SessionConfig::default(), PUFFIN)?;
    let poller = bob.default_poller()?;

    transport.fail_next(2);
    for _ in 0..2 {
        assert!(matches!(
            bob.poll_once(&poller).await,
            Err(SessionError::TransportError { .. })
        ));
    }
    assert_eq!(poller.state(), PollerState::Backoff);
    assert_eq!(poller.stats().consecutive_failures, 2);

    bob.poll_once(&poller).await?;
    let stats = poller.stats();
    assert_eq!(poller.state(), PollerState::Idle);
    assert_eq!(stats.fetch_failures, 2);
    assert_eq!(stats.consecutive_failures, 0);
    assert_eq!(stats.polls, 3);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn scheduled_loop_backs_off_then_recovers() -> TestResult {
    let transport = MemoryTransport::new();
    let clock = clock();
    let bob = session(&transport, &clock, fast_config(), PUFFIN)?;

    transport.fail_next(3);
    let handle = bob.add_poller(bob.default_poller()?)?;

    // Failures at 0 s, 1.1 s and 2.3 s; success at 3.7 s.
    tokio::time::sleep(Duration::from_millis(4_000)).await;
    let stats = handle.stats();
    assert_eq!(stats.fetch_failures, 3);
    assert_eq!(stats.consecutive_failures, 0);
    assert_eq!(transport.fetch_count(), 4);

    handle.stop();
    handle.join().await;
    Ok(())
}

// ---------------------------------------------------------------------------
// Stop
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn stop_is_idempotent_and_final() -> TestResult {
    let transport = MemoryTransport::new();
    let clock = clock();
    let alice = session(&transport, &clock, fast_config(), HIJACK)?;
    let bob = session(&transport, &clock, fast_config(), PUFFIN)?;
    let bob_id = bob.get_session_id()?;
    let messages = collect(&bob, EventKind::Message);

    let handle = bob.add_poller(bob.default_poller()?)?;
    tokio::time::sleep(Duration::from_millis(1_500)).await;
    handle.stop();
    handle.stop();
    assert!(handle.is_stopped());
    assert_eq!(handle.state(), PollerState::Stopped);
    handle.join().await;
    handle.join().await;

    let fetches = transport.fetch_count();
    alice.send_message(&bob_id, "too late").await?;
    tokio::time::sleep(Duration::from_millis(5_000)).await;

    assert_eq!(count(&messages), 0);
    assert_eq!(transport.fetch_count(), fetches);
    assert_eq!(handle.stats().dispatched, 0);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn stop_from_handler_halts_the_batch() -> TestResult {
    let transport = MemoryTransport::new();
    let clock = clock();
    let alice = session(&transport, &clock, fast_config(), HIJACK)?;
    let bob = session(&transport, &clock, fast_config(), PUFFIN)?;
    let bob_id = bob.get_session_id()?;

    alice.send_message(&bob_id, "first").await?;
    clock.advance(1);
    alice.send_message(&bob_id, "second").await?;

    let slot: Arc<Mutex<Option<PollerHandle>>> = Arc::new(Mutex::new(None));
    let seen = Arc::new(Mutex::new(0usize));
    {
        let slot = Arc::clone(&slot);
        let seen = Arc::clone(&seen);
        bob.on(EventKind::Message, move |_| {
            *seen.lock().unwrap_or_else(|e| e.into_inner()) += 1;
            let handle = slot.lock().unwrap_or_else(|e| e.into_inner()).clone();
            if let Some(handle) = handle {
                handle.stop();
            }
        });
    }

    let handle = bob.add_poller(bob.default_poller()?)?;
    *slot.lock().unwrap_or_else(|e| e.into_inner()) = Some(handle.clone());
    handle.join().await;

    assert_eq!(*seen.lock().unwrap_or_else(|e| e.into_inner()), 1);
    assert!(handle.is_stopped());
    assert_eq!(handle.stats().dispatched, 1);
    Ok(())
}

#[tokio::test]
async fn panicking_handler_does_not_end_the_batch() -> TestResult {
    let transport = MemoryTransport::new();
    let clock = clock();
    let alice = session(&transport, &clock, SessionConfig::default(), HIJACK)?;
    let bob = session(&transport, &clock, SessionConfig::default(), PUFFIN)?;
    let bob_id = bob.get_session_id()?;

    alice.send_message(&bob_id, "first").await?;
    clock.advance(1);
    alice.send_message(&bob_id, "second").await?;

    bob.on(EventKind::Message, |event| {
        if event.content.data_message().and_then(|d| d.body.as_deref()) == Some("first") {
            panic!("handler bug");
        }
    });
    let seen = collect(&bob, EventKind::Message);

    let poller = bob.default_poller()?;
    assert_eq!(bob.poll_once(&poller).await?, 2);
    assert_eq!(count(&seen), 2);
    assert_eq!(poller.stats().dispatched, 2);
    assert_eq!(poller.state(), PollerState::Idle);
    Ok(())
}

#[tokio::test]
async fn stop_all_pollers_stops_every_handle() -> TestResult {
    let transport = MemoryTransport::new();
    let clock = clock();
    let bob = session(&transport, &clock, fast_config(), PUFFIN)?;

    let a = bob.add_poller(bob.default_poller()?)?;
    let b = bob.add_poller(bob.default_poller()?.with_namespaces(vec![Namespace::USER_PROFILE])?)?;
    assert_eq!(bob.poller_count(), 2);

    bob.stop_all_pollers();
    assert_eq!(bob.poller_count(), 0);
    assert!(a.is_stopped() && b.is_stopped());
    a.join().await;
    b.join().await;
    Ok(())
}

#[tokio::test]
async fn poll_once_after_new_identity_uses_it() -> TestResult {
    let transport = MemoryTransport::new();
    let clock = clock();
    let bob = session(&transport, &clock, SessionConfig::default(), PUFFIN)?;
    let poller = bob.default_poller()?;
    bob.poll_once(&poller).await?;

    let alice_id = bob.set_mnemonic(HIJACK)?;
    bob.poll_once(&poller).await?;

    let fetches = transport.fetches.lock().unwrap_or_else(|e| e.into_inner()).clone();
    assert_ne!(fetches[0].pubkey, alice_id);
    assert_eq!(fetches[1].pubkey, alice_id);
    assert_eq!(fetches[1].auth.timestamp, START);
    Ok(())
}
