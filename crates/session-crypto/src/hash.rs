//! Hash helpers used across the protocol.
//!
//! Blake2b-512 feeds the blinding factor and the SOGS body hash,
//! Blake2b-256 keys the poller's dedup cache, and SHA-512 expands
//! seeds into Ed25519/X25519 scalars.

use blake2::digest::consts::U32;
use blake2::{Blake2b, Blake2b512, Digest};
use sha2::Sha512;

type Blake2b256 = Blake2b<U32>;

/// Computes the Blake2b digest with a 64-byte output.
pub fn blake2b_512(data: &[u8]) -> [u8; 64] {
    let mut out = [0u8; 64];
    out.copy_from_slice(&Blake2b512::digest(data));
    out
}

/// Computes the Blake2b digest with a 32-byte output.
///
/// Not a truncation of [`blake2b_512`]: the output length is part of
/// the Blake2b parameter block.
pub fn blake2b_256(data: &[u8]) -> [u8; 32] {
    let mut out = [0u8; 32];
    out.copy_from_slice(&Blake2b256::digest(data));
    out
}

/// Computes SHA-512 of `data`.
pub fn sha512(data: &[u8]) -> [u8; 64] {
    sha512_multipart(&[data])
}

/// Computes SHA-512 over the concatenation of `parts` without
/// allocating the concatenation.
pub fn sha512_multipart(parts: &[&[u8]]) -> [u8; 64] {
    let mut hasher = Sha512::new();
    for part in parts {
        hasher.update(part);
    }
    let mut out = [0u8; 64];
    out.copy_from_slice(&hasher.finalize());
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blake2b_512_empty_input() {
        let expected = "786a02f742015903c6c6fd852552d272912f4740e15847618a86e217f71f5419\
                        d25e1031afee585313896444934eb04b903a685b1448b755d56f701afe9be2ce";
        assert_eq!(hex::encode(blake2b_512(b"")), expected);
    }

    #[test]
    fn blake2b_256_empty_input() {
        let expected = "0e5751c026e543b2e8ab2eb06099daa1d1e5df47778f7787faab45cdf12fe3a8";
        assert_eq!(hex::encode(blake2b_256(b"")), expected);
    }

    #[test]
    fn sha512_abc() {
        let expected = "ddaf35a193617abacc417349ae20413112e6fa4e89a97ea20a9eeee64b55d39a\
                        2192992a274fc1a836ba3c23a3feebbd454d4423643ce80e2a9ac94fa54ca49f";
        assert_eq!(hex::encode(sha512(b"abc")), expected);
    }

    #[test]
    fn multipart_matches_concatenation() {
        assert_eq!(sha512_multipart(&[b"ab", b"", b"c"]), sha512(b"abc"));
    }
}
