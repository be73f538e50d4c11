//! Cryptographic core of the Session protocol engine.
//!
//! This crate is the **sole** location for key material. Other crates
//! hold an [`identity::Identity`] and call into it; they never touch
//! raw secret bytes.
//!
//! # Modules
//!
//! - [`ready`]: one-time initialization returning a [`ready::CryptoReady`] token
//! - [`wordlist`] / [`mnemonic`]: seed ↔ phrase codec with checksum word
//! - [`identity`]: seed → Ed25519/X25519 keys and Session ID
//! - [`signing`]: node-auth payloads, Ed25519 verification
//! - [`blinding`]: 15-blinded per-server keys and signatures
//! - [`sealed`]: signed sealed-box encryption for one-to-one messages
//! - [`attachment`]: AES-CBC + HMAC attachment encryption with digest
//! - [`profile`]: AES-GCM avatar encryption under a profile key
//! - [`hash`]: Blake2b and SHA-512 helpers

pub mod attachment;
pub mod blinding;
pub mod hash;
pub mod identity;
pub mod mnemonic;
pub mod profile;
pub mod ready;
pub mod sealed;
pub mod signing;
pub mod wordlist;

pub use identity::{Identity, IdentityManager};
pub use ready::CryptoReady;
