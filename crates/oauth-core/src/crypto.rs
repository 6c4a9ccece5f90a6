//! Random secrets, hashing and PKCE verification.

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use rand::Rng;
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

use crate::model::PkceMethod;

/// Length of authorization codes (~190 bits of entropy)
pub const CODE_LENGTH: usize = 32;

/// Length of refresh tokens and client secrets
pub const SECRET_LENGTH: usize = 48;

/// Generate a cryptographically secure random string
pub fn generate_random_string(len: usize) -> String {
    const CHARSET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789";
    let mut rng = rand::rng();
    (0..len)
        .map(|_| {
            let idx = rng.random_range(0..CHARSET.len());
            CHARSET[idx] as char
        })
        .collect()
}

/// Hash a token/code/secret for storage (raw values are never stored)
pub fn hash_token(token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    URL_SAFE_NO_PAD.encode(hasher.finalize())
}

/// `BASE64URL(SHA256(verifier))`, the S256 code challenge for a verifier.
pub fn pkce_challenge(verifier: &str) -> String {
    hash_token(verifier)
}

pub fn constant_time_eq(a: &str, b: &str) -> bool {
    a.as_bytes().ct_eq(b.as_bytes()).into()
}

/// Check a `code_verifier` against the challenge stored with a code.
pub fn verify_pkce(method: PkceMethod, challenge: &str, verifier: &str) -> bool {
    match method {
        PkceMethod::S256 => constant_time_eq(&pkce_challenge(verifier), challenge),
        PkceMethod::Plain => constant_time_eq(verifier, challenge),
    }
}
