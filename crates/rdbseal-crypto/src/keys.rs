//! Key material: the externally supplied base64 string and its decoded form

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use zeroize::Zeroize;

use crate::error::{CryptoError, CryptoResult};
use crate::KEY_SIZE;

/// A decoded 256-bit AES key. Zeroized on drop.
#[derive(Clone)]
pub struct SealKey {
    bytes: [u8; KEY_SIZE],
}

impl SealKey {
    pub fn from_bytes(bytes: [u8; KEY_SIZE]) -> Self {
        Self { bytes }
    }

    /// Decode a base64 key string.
    ///
    /// Empty, non-base64, and wrong-length input all map to
    /// [`CryptoError::Configuration`]; nothing is padded or truncated.
    pub fn from_base64(encoded: &str) -> CryptoResult<Self> {
        if encoded.is_empty() {
            return Err(CryptoError::Configuration(
                "encryption key is empty".into(),
            ));
        }

        let mut decoded = STANDARD
            .decode(encoded)
            .map_err(|e| CryptoError::Configuration(format!("encryption key is not valid base64: {e}")))?;

        if decoded.len() != KEY_SIZE {
            let len = decoded.len();
            decoded.zeroize();
            return Err(CryptoError::Configuration(format!(
                "encryption key must be {KEY_SIZE} bytes, got {len}"
            )));
        }

        let mut bytes = [0u8; KEY_SIZE];
        bytes.copy_from_slice(&decoded);
        decoded.zeroize();
        Ok(Self::from_bytes(bytes))
    }

    pub fn as_bytes(&self) -> &[u8; KEY_SIZE] {
        &self.bytes
    }
}

impl Drop for SealKey {
    fn drop(&mut self) {
        self.bytes.zeroize();
    }
}

impl std::fmt::Debug for SealKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SealKey")
            .field("bytes", &"[REDACTED]")
            .finish()
    }
}
