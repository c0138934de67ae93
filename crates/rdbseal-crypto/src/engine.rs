//! AES-256-GCM with detached nonce and tag
//!
//! The engine keeps the key in its base64 form and decodes it at the moment
//! an operation starts, so a missing or malformed key is reported as
//! [`CryptoError::Configuration`] before the cipher is ever touched.
//! A [`CipherSession`] holds the decoded cipher for the span of one logical
//! operation (one buffer, or one whole stream).

use std::sync::Arc;

use aes_gcm::{
    aead::{AeadInPlace, KeyInit},
    Aes256Gcm, Nonce, Tag,
};
use secrecy::{ExposeSecret, SecretString};
use zeroize::Zeroize;

use crate::error::{CryptoError, CryptoResult};
use crate::keys::SealKey;
use crate::random::{NonceSource, OsNonceSource};
use crate::{NONCE_SIZE, TAG_SIZE};

/// Output of a single encryption: ciphertext plus the nonce and tag needed to
/// open it. `ciphertext.len()` always equals the plaintext length.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sealed {
    pub ciphertext: Vec<u8>,
    pub nonce: [u8; NONCE_SIZE],
    pub tag: [u8; TAG_SIZE],
}

/// Stateless encrypt/decrypt entry point around an externally supplied key.
pub struct CipherEngine {
    key: SecretString,
    nonces: Arc<dyn NonceSource>,
}

impl CipherEngine {
    pub fn new(key: SecretString) -> Self {
        Self {
            key,
            nonces: Arc::new(OsNonceSource),
        }
    }

    /// Build from a base64 key string. The string is not validated here.
    pub fn from_base64(key: impl Into<String>) -> Self {
        Self::new(SecretString::from(key.into()))
    }

    /// Replace the nonce generator. Only swap in a cryptographically secure one.
    pub fn with_nonce_source(mut self, nonces: Arc<dyn NonceSource>) -> Self {
        self.nonces = nonces;
        self
    }

    /// Decode the key and key the cipher for one operation.
    pub fn session(&self) -> CryptoResult<CipherSession> {
        let key = SealKey::from_base64(self.key.expose_secret())?;
        Ok(CipherSession {
            cipher: Aes256Gcm::new(key.as_bytes().into()),
            nonces: Arc::clone(&self.nonces),
        })
    }

    pub fn encrypt(&self, plaintext: &[u8]) -> CryptoResult<Sealed> {
        self.session()?.encrypt(plaintext)
    }

    pub fn decrypt(
        &self,
        ciphertext: &[u8],
        nonce: &[u8; NONCE_SIZE],
        tag: &[u8; TAG_SIZE],
    ) -> CryptoResult<Vec<u8>> {
        self.session()?.decrypt(ciphertext, nonce, tag)
    }
}

impl std::fmt::Debug for CipherEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CipherEngine")
            .field("key", &"[REDACTED]")
            .finish_non_exhaustive()
    }
}

/// A keyed cipher scoped to one operation.
pub struct CipherSession {
    cipher: Aes256Gcm,
    nonces: Arc<dyn NonceSource>,
}

impl CipherSession {
    /// Encrypt under a freshly generated nonce.
    pub fn encrypt(&self, plaintext: &[u8]) -> CryptoResult<Sealed> {
        let nonce = self.nonces.next_nonce();
        let mut buffer = plaintext.to_vec();

        let tag = self
            .cipher
            .encrypt_in_place_detached(Nonce::from_slice(&nonce), b"", &mut buffer)
            .map_err(|_| {
                buffer.zeroize();
                CryptoError::Configuration(format!(
                    "plaintext of {} bytes exceeds the AES-GCM message limit",
                    plaintext.len()
                ))
            })?;

        let mut tag_bytes = [0u8; TAG_SIZE];
        tag_bytes.copy_from_slice(&tag);

        Ok(Sealed {
            ciphertext: buffer,
            nonce,
            tag: tag_bytes,
        })
    }

    /// Verify the tag and decrypt. On failure nothing is returned and the
    /// working buffer is wiped.
    pub fn decrypt(
        &self,
        ciphertext: &[u8],
        nonce: &[u8; NONCE_SIZE],
        tag: &[u8; TAG_SIZE],
    ) -> CryptoResult<Vec<u8>> {
        let mut buffer = ciphertext.to_vec();

        match self.cipher.decrypt_in_place_detached(
            Nonce::from_slice(nonce),
            b"",
            &mut buffer,
            Tag::from_slice(tag),
        ) {
            Ok(()) => Ok(buffer),
            Err(_) => {
                buffer.zeroize();
                Err(CryptoError::Authentication)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine;
    use std::sync::atomic::{AtomicU64, Ordering};

    fn zero_key_engine() -> CipherEngine {
        CipherEngine::from_base64(STANDARD.encode([0u8; 32]))
    }

    #[test]
    fn test_encrypt_decrypt_roundtrip() {
        let engine = zero_key_engine();
        let sealed = engine.encrypt(b"hello redis").unwrap();

        assert_eq!(sealed.ciphertext.len(), 11);
        assert_ne!(sealed.ciphertext, b"hello redis");

        let plain = engine
            .decrypt(&sealed.ciphertext, &sealed.nonce, &sealed.tag)
            .unwrap();
        assert_eq!(plain, b"hello redis");
    }

    #[test]
    fn test_encrypt_decrypt_empty() {
        let engine = zero_key_engine();
        let sealed = engine.encrypt(b"").unwrap();

        assert!(sealed.ciphertext.is_empty());
        let plain = engine
            .decrypt(&sealed.ciphertext, &sealed.nonce, &sealed.tag)
            .unwrap();
        assert!(plain.is_empty());
    }

    #[test]
    fn test_empty_key_fails_on_encrypt_and_decrypt() {
        let engine = CipherEngine::from_base64("");

        let err = engine.encrypt(b"data").unwrap_err();
        assert!(matches!(err, CryptoError::Configuration(_)));

        let err = engine
            .decrypt(b"data", &[0u8; NONCE_SIZE], &[0u8; TAG_SIZE])
            .unwrap_err();
        assert!(matches!(err, CryptoError::Configuration(_)));
    }

    #[test]
    fn test_decrypt_wrong_key() {
        let engine1 = zero_key_engine();
        let engine2 = CipherEngine::from_base64(STANDARD.encode([1u8; 32]));

        let sealed = engine1.encrypt(b"secret data").unwrap();
        let result = engine2.decrypt(&sealed.ciphertext, &sealed.nonce, &sealed.tag);

        assert!(matches!(result, Err(CryptoError::Authentication)));
    }

    #[test]
    fn test_tampered_tag() {
        let engine = zero_key_engine();
        let mut sealed = engine.encrypt(b"secret data").unwrap();
        sealed.tag[15] ^= 0x01;

        let result = engine.decrypt(&sealed.ciphertext, &sealed.nonce, &sealed.tag);
        assert!(result.unwrap_err().is_authentication_failure());
    }

    #[test]
    fn test_tampered_nonce() {
        let engine = zero_key_engine();
        let mut sealed = engine.encrypt(b"secret data").unwrap();
        sealed.nonce[0] ^= 0x80;

        let result = engine.decrypt(&sealed.ciphertext, &sealed.nonce, &sealed.tag);
        assert!(result.unwrap_err().is_authentication_failure());
    }

    struct CountingNonces(AtomicU64);

    impl NonceSource for CountingNonces {
        fn fill_nonce(&self, nonce: &mut [u8; NONCE_SIZE]) {
            let n = self.0.fetch_add(1, Ordering::SeqCst);
            nonce[..8].copy_from_slice(&n.to_be_bytes());
            nonce[8..].fill(0);
        }
    }

    #[test]
    fn test_custom_nonce_source_used() {
        let engine = zero_key_engine().with_nonce_source(Arc::new(CountingNonces(AtomicU64::new(5))));

        let first = engine.encrypt(b"a").unwrap();
        let second = engine.encrypt(b"a").unwrap();

        assert_eq!(&first.nonce[..8], &5u64.to_be_bytes());
        assert_eq!(&second.nonce[..8], &6u64.to_be_bytes());
        assert_ne!(first.ciphertext, second.ciphertext);
    }

    #[test]
    fn test_session_reuse_across_calls() {
        let engine = zero_key_engine();
        let session = engine.session().unwrap();

        let a = session.encrypt(b"chunk one").unwrap();
        let b = session.encrypt(b"chunk two").unwrap();
        assert_ne!(a.nonce, b.nonce);

        assert_eq!(session.decrypt(&b.ciphertext, &b.nonce, &b.tag).unwrap(), b"chunk two");
        assert_eq!(session.decrypt(&a.ciphertext, &a.nonce, &a.tag).unwrap(), b"chunk one");
    }

    #[test]
    fn test_debug_redacts_key() {
        let engine = CipherEngine::from_base64("c2VjcmV0LWtleQ==");
        assert!(!format!("{engine:?}").contains("c2VjcmV0"));
    }
}
