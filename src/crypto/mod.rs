//! Cryptographic context.
//!
//! Initialized once per daemon run and shared with the node database and
//! router. Primitives themselves are out of scope: hashing is SHA-256 and
//! randomness comes from the thread RNG.

use rand::RngCore;
use sha2::{Digest, Sha256};

use crate::subsystem::Crypto;

/// Process-local crypto context with a random identity.
pub struct CryptoContext {
    identity: [u8; 32],
}

impl CryptoContext {
    pub fn new() -> Self {
        let mut identity = [0u8; 32];
        rand::thread_rng().fill_bytes(&mut identity);
        tracing::debug!(identity = %hex::encode(&identity[..8]), "Crypto context initialized");
        Self { identity }
    }

    /// Random identity generated at startup.
    pub fn identity(&self) -> &[u8; 32] {
        &self.identity
    }
}

impl Default for CryptoContext {
    fn default() -> Self {
        Self::new()
    }
}

impl Crypto for CryptoContext {
    fn shorthash(&self, data: &[u8]) -> [u8; 32] {
        Sha256::digest(data).into()
    }

    fn random_bytes(&self, buf: &mut [u8]) {
        rand::thread_rng().fill_bytes(buf);
    }
}
