//! Mnemonic ↔ seed codec.
//!
//! A seed of 16 or 32 bytes is split into 4-byte little-endian
//! groups. Each group `x` becomes three word indices over a list of
//! `n` words:
//!
//! ```text
//! w1 = x mod n
//! w2 = (x / n + w1) mod n
//! w3 = (x / n² + w2) mod n
//! ```
//!
//! A trailing checksum word repeats one of the data words, chosen by
//! `CRC32(concat of each word's prefix) mod word_count`. A 16-byte
//! seed therefore encodes to 13 words and a 32-byte seed to 25.

use rand::rngs::OsRng;
use rand::RngCore;
use session_types::{Result, SessionError};
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::wordlist::{self, Wordlist};

/// Seed sizes the codec accepts, in bytes.
pub const SUPPORTED_SEED_LENGTHS: [usize; 2] = [16, 32];

/// Words produced per 4-byte group.
const WORDS_PER_GROUP: usize = 3;

// ---------------------------------------------------------------------------
// Mnemonic
// ---------------------------------------------------------------------------

/// A space-separated mnemonic phrase including its checksum word.
///
/// Zeroized on drop.
#[derive(Zeroize, ZeroizeOnDrop)]
pub struct Mnemonic(String);

impl Mnemonic {
    /// Returns the phrase as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns the individual words.
    pub fn words(&self) -> Vec<&str> {
        self.0.split_whitespace().collect()
    }

    /// Returns the number of words, checksum included.
    pub fn word_count(&self) -> usize {
        self.0.split_whitespace().count()
    }
}

// ---------------------------------------------------------------------------
// Seed
// ---------------------------------------------------------------------------

/// Raw identity entropy: 16 or 32 bytes. Zeroized on drop.
#[derive(Zeroize, ZeroizeOnDrop)]
pub struct Seed(Vec<u8>);

impl Seed {
    /// Wraps raw bytes, rejecting unsupported lengths.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        check_seed_length(bytes.len())?;
        Ok(Self(bytes.to_vec()))
    }

    /// Parses a hex-encoded seed.
    pub fn from_hex(seed_hex: &str) -> Result<Self> {
        let mut bytes = hex::decode(seed_hex.trim()).map_err(|e| SessionError::InvalidSeed {
            reason: format!("seed is not valid hex: {e}"),
        })?;
        let seed = Self::from_bytes(&bytes);
        bytes.zeroize();
        seed
    }

    /// Returns the raw seed bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Returns the seed length in bytes.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Always `false` for a constructed seed.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Lower-case hex encoding of the seed.
    pub fn to_hex(&self) -> String {
        hex::encode(&self.0)
    }

    /// The 32-byte Ed25519 seed: the raw seed, zero-padded on the
    /// right when only 16 bytes long.
    pub fn to_ed25519_seed(&self) -> [u8; 32] {
        let mut out = [0u8; 32];
        out[..self.0.len()].copy_from_slice(&self.0);
        out
    }
}

// Seed does not implement Clone/Debug to prevent leakage.

fn check_seed_length(len: usize) -> Result<()> {
    if SUPPORTED_SEED_LENGTHS.contains(&len) {
        Ok(())
    } else {
        Err(SessionError::InvalidSeedLength {
            expected: "16 or 32 bytes".into(),
            got: len,
        })
    }
}

/// Number of words (checksum included) a seed of `seed_len` bytes
/// encodes to.
pub fn phrase_word_count(seed_len: usize) -> usize {
    seed_len / 4 * WORDS_PER_GROUP + 1
}

// ---------------------------------------------------------------------------
// Encoding
// ---------------------------------------------------------------------------

/// Encodes a seed as an English mnemonic.
pub fn seed_to_mnemonic(seed: &Seed) -> Result<Mnemonic> {
    encode_with(&wordlist::ENGLISH, seed.as_bytes())
}

/// Encodes a hex seed as an English mnemonic.
pub fn encode(seed_hex: &str) -> Result<Mnemonic> {
    let seed = Seed::from_hex(seed_hex)?;
    seed_to_mnemonic(&seed)
}

/// Generates a fresh 16-byte seed from OS entropy and returns its
/// mnemonic.
pub fn generate_mnemonic() -> Result<Mnemonic> {
    let mut entropy = [0u8; 16];
    OsRng.fill_bytes(&mut entropy);
    let result = encode_with(&wordlist::ENGLISH, &entropy);
    entropy.zeroize();
    result
}

/// Encodes raw seed bytes against a specific wordlist.
pub fn encode_with(list: &Wordlist, seed: &[u8]) -> Result<Mnemonic> {
    check_seed_length(seed.len())?;
    let n = list.len() as u64;

    let mut words: Vec<&'static str> = Vec::with_capacity(phrase_word_count(seed.len()));
    for group in seed.chunks_exact(4) {
        let x = u64::from(u32::from_le_bytes([group[0], group[1], group[2], group[3]]));
        let w1 = x % n;
        let w2 = (x / n + w1) % n;
        let w3 = (x / n / n + w2) % n;
        for idx in [w1, w2, w3] {
            let word = list.word(idx as usize).ok_or_else(|| SessionError::CryptoError {
                reason: format!("word index {idx} out of range"),
            })?;
            words.push(word);
        }
    }

    let checksum = checksum_word(list, &words).ok_or_else(|| SessionError::CryptoError {
        reason: "cannot compute checksum of empty phrase".into(),
    })?;
    words.push(checksum);

    Ok(Mnemonic(words.join(" ")))
}

/// Picks the checksum word for `data_words`.
fn checksum_word<'w>(list: &Wordlist, data_words: &[&'w str]) -> Option<&'w str> {
    if data_words.is_empty() {
        return None;
    }
    let mut hasher = crc32fast::Hasher::new();
    for word in data_words {
        hasher.update(list.prefix(word).as_bytes());
    }
    let index = hasher.finalize() as usize % data_words.len();
    data_words.get(index).copied()
}

// ---------------------------------------------------------------------------
// Decoding
// ---------------------------------------------------------------------------

/// Decodes a phrase into its seed, trying every built-in wordlist.
///
/// # Errors
///
/// - [`SessionError::InvalidSeedLength`] if the word count is not 13 or 25.
/// - [`SessionError::UnknownWord`] if no wordlist contains every data word.
/// - [`SessionError::InvalidChecksum`] if the last word does not match.
pub fn mnemonic_to_seed(phrase: &str) -> Result<Seed> {
    decode_with(&wordlist::ALL, phrase)
}

/// Decodes a phrase and returns the seed as lower-case hex.
pub fn decode(phrase: &str) -> Result<String> {
    Ok(mnemonic_to_seed(phrase)?.to_hex())
}

/// Decodes against the given wordlists, in order. The first list that
/// knows every data word decides the result.
pub fn decode_with(lists: &[&Wordlist], phrase: &str) -> Result<Seed> {
    let words: Vec<&str> = phrase.split_whitespace().collect();

    let accepted = SUPPORTED_SEED_LENGTHS.map(phrase_word_count);
    if !accepted.contains(&words.len()) {
        return Err(SessionError::InvalidSeedLength {
            expected: format!("{} or {} words", accepted[0], accepted[1]),
            got: words.len(),
        });
    }

    // The checksum word is compared verbatim, so only data words are
    // looked up.
    let data_words = &words[..words.len() - 1];
    let mut first_unknown: Option<&str> = None;
    for list in lists {
        match indices_in(list, data_words) {
            Ok(indices) => return decode_indices(list, &words, &indices),
            Err(word) => {
                first_unknown.get_or_insert(word);
            }
        }
    }

    Err(SessionError::UnknownWord {
        word: first_unknown.unwrap_or_default().to_string(),
    })
}

/// Resolves every word against `list`, or returns the first miss.
fn indices_in<'p>(list: &Wordlist, words: &[&'p str]) -> std::result::Result<Vec<u64>, &'p str> {
    words
        .iter()
        .map(|word| list.index_of(word).map(|i| i as u64).ok_or(*word))
        .collect()
}

fn decode_indices(list: &Wordlist, words: &[&str], indices: &[u64]) -> Result<Seed> {
    let n = list.len() as u64;
    let (data_words, checksum) = words.split_at(words.len() - 1);

    let expected = checksum_word(list, data_words).unwrap_or_default();
    let supplied = checksum.first().copied().unwrap_or_default();
    if expected != supplied {
        return Err(SessionError::InvalidChecksum {
            reason: format!("expected checksum word '{expected}'"),
        });
    }

    let mut bytes = Vec::with_capacity(data_words.len() / WORDS_PER_GROUP * 4);
    for triple in indices.chunks_exact(WORDS_PER_GROUP) {
        let (w1, w2, w3) = (triple[0], triple[1], triple[2]);
        let x = w1 + n * ((n - w1 + w2) % n) + n * n * ((n - w2 + w3) % n);
        if x > u64::from(u32::MAX) {
            bytes.zeroize();
            return Err(SessionError::InvalidSeed {
                reason: "word triple does not map to a 32-bit group".into(),
            });
        }
        bytes.extend_from_slice(&(x as u32).to_le_bytes());
    }

    let seed = Seed::from_bytes(&bytes);
    bytes.zeroize();
    seed
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
