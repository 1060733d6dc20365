//! CSRF state generation
//!
//! A state value binds an authorization request to its callback. It must be
//! unpredictable, so it is drawn from the thread-local CSPRNG (seeded from the
//! OS) and rendered as lowercase hex.

use rand::RngExt;

use crate::constants::STATE_BYTES;

/// Generate a 64-character lowercase hex state from 32 random bytes.
pub fn generate_state() -> String {
    generate_state_with_len(STATE_BYTES)
}

/// Generate a state from `len` random bytes (`2 * len` hex characters).
pub fn generate_state_with_len(len: usize) -> String {
    let mut bytes = vec![0u8; len];
    rand::rng().fill(&mut bytes[..]);
    hex::encode(bytes)
}
