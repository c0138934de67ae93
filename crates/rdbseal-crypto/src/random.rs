//! Nonce generation

use rand::rngs::OsRng;
use rand::RngCore;

use crate::NONCE_SIZE;

/// Source of fresh 96-bit nonces. Implementations must be backed by a
/// cryptographically secure generator: a repeated nonce under the same key
/// breaks GCM confidentiality.
pub trait NonceSource: Send + Sync {
    fn fill_nonce(&self, nonce: &mut [u8; NONCE_SIZE]);

    fn next_nonce(&self) -> [u8; NONCE_SIZE] {
        let mut nonce = [0u8; NONCE_SIZE];
        self.fill_nonce(&mut nonce);
        nonce
    }
}

/// Nonces straight from the operating system CSPRNG.
#[derive(Debug, Default, Clone, Copy)]
pub struct OsNonceSource;

impl NonceSource for OsNonceSource {
    fn fill_nonce(&self, nonce: &mut [u8; NONCE_SIZE]) {
        OsRng.fill_bytes(nonce);
    }
}
