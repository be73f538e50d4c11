//! Cross-implementation vectors for identity, node auth and blinding.
//!
//! Node-auth signatures were captured from the reference TypeScript
//! client for the `hijack …` account; blinded values were produced by
//! libsodium's `crypto_core_ed25519_*` primitives.

use session_crypto::blinding::{derive_blinded_keypair, sign_blinded};
use session_crypto::signing::{
    node_auth_payload, sign_node_request, sign_node_request_at, verify, verify_node_request,
    Signature,
};
use session_crypto::{ready, Identity};
use session_types::{FixedClock, Namespace, SessionError, Timestamp};

const HIJACK: &str =
    "hijack cocoa furnished tacit jaunt polar invoke anchor efficient tiger identity opacity cocoa";
const HIJACK_ED25519: &str = "ec3fca413647b79fd655706839f139cc72d1de7a1e45b77f27ce483831e8d46e";
const HIJACK_SESSION_ID: &str = "05d817255499c77684e7ad518b079dd8dbb133922b71632c37e57b98246d82bf72";

fn hijack() -> std::result::Result<Identity, SessionError> {
    Identity::from_mnemonic(&ready::init()?, HIJACK)
}

// ===================================================================
// Identity
// ===================================================================

#[test]
fn hijack_keys() -> std::result::Result<(), SessionError> {
    let id = hijack()?;
    assert_eq!(id.ed25519_public_key().to_hex(), HIJACK_ED25519);
    assert_eq!(id.session_id().to_string(), HIJACK_SESSION_ID);
    assert_eq!(&id.ed25519_public_key().to_session_id()?, &id.session_id());
    Ok(())
}

// ===================================================================
// Node auth
// ===================================================================

#[test]
fn node_auth_namespace_2() -> std::result::Result<(), SessionError> {
    let id = hijack()?;
    let params = sign_node_request_at(&id, "retrieve", Namespace(2), Timestamp::from_millis(1752459333155));
    assert_eq!(
        params.signature,
        "9ayAXiTqKrC73t4AqskUQW9s1sA/yQ0aS5u4rsdKrju8kudUZFrPAoQdAsvtlBrFTRNmMRMjb78ijYUmmWpICA=="
    );
    assert_eq!(params.pubkey_ed25519, HIJACK_ED25519);
    Ok(())
}

#[test]
fn node_auth_default_namespace_omits_it() -> std::result::Result<(), SessionError> {
    let id = hijack()?;
    let params = sign_node_request_at(&id, "retrieve", Namespace::DEFAULT, Timestamp::from_millis(1752459333154));
    assert_eq!(
        params.signature,
        "c2r6M6xue2MsloA1ocu2WUXVpecDb0fKiC5nhPfV1g+DsDfRSfFMJ9UsulfEIIyrrNv1g/+ZC/T5Z6VvQyEFAQ=="
    );
    Ok(())
}

#[test]
fn node_auth_with_injected_clock_is_reproducible() -> std::result::Result<(), SessionError> {
    let id = hijack()?;
    let clock = FixedClock::new(Timestamp::from_millis(1752458289343));
    for _ in 0..3 {
        let params = sign_node_request(&id, "retrieve", Namespace(2), &clock);
        assert_eq!(
            params.signature,
            "SBDGLKi3DwrZcIMG26chKJ5JXuUeTfdjmnoiAWaG6nrqteDXVtOXz1h97Rl7ROIEi2NJWJsyuvMvo3uRTw7CCA=="
        );
        verify_node_request(&params)?;
    }
    Ok(())
}

#[test]
fn node_auth_rejects_other_method() -> std::result::Result<(), SessionError> {
    let id = hijack()?;
    let ts = Timestamp::from_millis(1752458289343);
    let params = sign_node_request_at(&id, "retrieve", Namespace(2), ts);
    let sig = Signature::from_base64(&params.signature)?;
    let other = node_auth_payload("store", Namespace(2), ts);
    assert!(matches!(
        verify(&id.ed25519_public_key(), other.as_bytes(), &sig),
        Err(SessionError::SignatureVerificationFailed { .. })
    ));
    Ok(())
}

// ===================================================================
// Blinding
// ===================================================================

#[test]
fn blinded_id_vector() -> std::result::Result<(), SessionError> {
    let id = hijack()?;
    let kp = derive_blinded_keypair(&id, &[0x11; 32]);
    assert_eq!(
        kp.blinded_id().to_string(),
        "157c855475ef6f63537d945a1fe60f41965753eb7787ab4f44bad4b5ec548ef8a4"
    );
    Ok(())
}

#[test]
fn blinded_signature_vector() -> std::result::Result<(), SessionError> {
    let id = hijack()?;
    let kp = derive_blinded_keypair(&id, &[0x11; 32]);
    let sig = sign_blinded(&id, &kp, b"hello sogs");
    assert_eq!(
        hex::encode(sig.as_bytes()),
        "dd37e98d26fd47357938e85b3b88c3bb5b47402a55b6219888f546a8836936c7\
         04869053da3f5bd51151613d42c6b92b3be2a8d83d8164cc86db16ab92504300"
    );
    verify(&kp.ed25519_public_key(), b"hello sogs", &sig)?;
    Ok(())
}
