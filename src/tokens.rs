//! Response token generation
//!
//! Stateless; every call draws from the operating system CSPRNG. Uniqueness
//! against stored tickets is the caller's job.

use rand::rngs::OsRng;
use rand::{Rng, RngCore};

/// Default byte length for full-entropy tokens (64 hex characters)
pub const FULL_TOKEN_BYTES: usize = 32;

/// Default length for short, human-transcribable tokens
pub const SHORT_TOKEN_LEN: usize = 8;

/// Alphabet for short tokens: no `0/O`, `1/I/L`
pub const SHORT_ALPHABET: &[u8] = b"ABCDEFGHJKMNPQRSTUVWXYZ23456789";

/// Hex-encoded token of `byte_len` random bytes
pub fn full_token(byte_len: usize) -> String {
    let mut bytes = vec![0u8; byte_len];
    OsRng.fill_bytes(&mut bytes);
    hex::encode(bytes)
}

/// Token of `len` characters drawn uniformly from [`SHORT_ALPHABET`]
pub fn short_token(len: usize) -> String {
    let mut rng = OsRng;
    (0..len)
        .map(|_| SHORT_ALPHABET[rng.gen_range(0..SHORT_ALPHABET.len())] as char)
        .collect()
}

/// Shareable response URL: `{base_url}/r/{token}`
pub fn response_url(base_url: &str, token: &str) -> String {
    format!("{}/r/{}", base_url.trim_end_matches('/'), token)
}
