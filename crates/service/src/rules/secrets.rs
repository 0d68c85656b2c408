//! Random login nonces and email one-time codes.

use rand::distributions::Alphanumeric;
use rand::Rng;
use sha2::{Digest, Sha256};

pub const OTP_LENGTH: usize = 6;

pub fn generate_nonce() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(32)
        .map(char::from)
        .collect()
}

pub fn generate_otp() -> String {
    let code: u32 = rand::thread_rng().gen_range(0..1_000_000);
    format!("{:0width$}", code, width = OTP_LENGTH)
}

pub fn hash_secret(secret: &str) -> String {
    hex::encode(Sha256::digest(secret.trim().as_bytes()))
}

/// Compares a submitted code against its stored hash without early exit.
pub fn verify_secret(candidate: &str, stored_hash: &str) -> bool {
    let candidate = hash_secret(candidate);
    if candidate.len() != stored_hash.len() {
        return false;
    }
    candidate
        .bytes()
        .zip(stored_hash.bytes())
        .fold(0u8, |acc, (a, b)| acc | (a ^ b))
        == 0
}
