//! Self-describing package format
//!
//! ```text
//! [12 bytes: nonce][N bytes: ciphertext][16 bytes: GCM tag]
//! ```
//!
//! N equals the plaintext length, so a package is always exactly
//! `PACKAGE_OVERHEAD` (28) bytes longer than what it protects. N may be zero.

use crate::engine::{CipherEngine, CipherSession, Sealed};
use crate::error::{CryptoError, CryptoResult};
use crate::{NONCE_SIZE, PACKAGE_OVERHEAD, TAG_SIZE};

/// Borrowed view of a package split into its three sections.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PackageParts<'a> {
    pub nonce: &'a [u8; NONCE_SIZE],
    pub ciphertext: &'a [u8],
    pub tag: &'a [u8; TAG_SIZE],
}

impl<'a> PackageParts<'a> {
    /// Split a blob into nonce, ciphertext, and tag without decrypting.
    pub fn parse(blob: &'a [u8]) -> CryptoResult<Self> {
        if blob.len() < PACKAGE_OVERHEAD {
            return Err(CryptoError::MalformedPackage {
                len: blob.len(),
                min: PACKAGE_OVERHEAD,
            });
        }

        let (nonce, rest) = blob.split_at(NONCE_SIZE);
        let (ciphertext, tag) = rest.split_at(rest.len() - TAG_SIZE);

        Ok(Self {
            nonce: nonce.try_into().map_err(|_| CryptoError::MalformedPackage {
                len: blob.len(),
                min: PACKAGE_OVERHEAD,
            })?,
            ciphertext,
            tag: tag.try_into().map_err(|_| CryptoError::MalformedPackage {
                len: blob.len(),
                min: PACKAGE_OVERHEAD,
            })?,
        })
    }
}

/// Lay out a sealed buffer as `nonce || ciphertext || tag`.
pub fn assemble(sealed: &Sealed) -> Vec<u8> {
    let mut blob = Vec::with_capacity(sealed.ciphertext.len() + PACKAGE_OVERHEAD);
    blob.extend_from_slice(&sealed.nonce);
    blob.extend_from_slice(&sealed.ciphertext);
    blob.extend_from_slice(&sealed.tag);
    blob
}

/// Encrypt `plaintext` into a package.
pub fn encode_package(session: &CipherSession, plaintext: &[u8]) -> CryptoResult<Vec<u8>> {
    let sealed = session.encrypt(plaintext)?;
    Ok(assemble(&sealed))
}

/// Verify and decrypt a package produced by [`encode_package`].
pub fn decode_package(session: &CipherSession, blob: &[u8]) -> CryptoResult<Vec<u8>> {
    let parts = PackageParts::parse(blob)?;
    session.decrypt(parts.ciphertext, parts.nonce, parts.tag)
}

impl CipherEngine {
    pub fn encode_package(&self, plaintext: &[u8]) -> CryptoResult<Vec<u8>> {
        encode_package(&self.session()?, plaintext)
    }

    /// The key is checked before the blob: with an unusable key every input,
    /// short or not, reports [`CryptoError::Configuration`].
    pub fn decode_package(&self, blob: &[u8]) -> CryptoResult<Vec<u8>> {
        decode_package(&self.session()?, blob)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine;
    use proptest::prelude::*;

    fn zero_key_engine() -> CipherEngine {
        CipherEngine::from_base64(STANDARD.encode([0u8; 32]))
    }

    #[test]
    fn test_hello_redis_package() {
        let engine = zero_key_engine();

        let blob = engine.encode_package(b"hello redis").unwrap();
        assert_eq!(blob.len(), 39);

        let plain = engine.decode_package(&blob).unwrap();
        assert_eq!(plain, b"hello redis");
    }

    #[test]
    fn test_empty_package_roundtrip() {
        let engine = zero_key_engine();

        let blob = engine.encode_package(b"").unwrap();
        assert_eq!(blob.len(), PACKAGE_OVERHEAD);

        let parts = PackageParts::parse(&blob).unwrap();
        assert!(parts.ciphertext.is_empty());
        assert!(engine.decode_package(&blob).unwrap().is_empty());
    }

    #[test]
    fn test_short_package_rejected() {
        let engine = zero_key_engine();
        let err = engine.decode_package(&[0u8; 27]).unwrap_err();

        assert!(matches!(
            err,
            CryptoError::MalformedPackage { len: 27, min: 28 }
        ));
    }

    #[test]
    fn test_short_package_parse_needs_no_key() {
        assert!(matches!(
            PackageParts::parse(b""),
            Err(CryptoError::MalformedPackage { len: 0, .. })
        ));
    }

    #[test]
    fn test_unusable_key_reported_before_short_package() {
        let engine = CipherEngine::from_base64("");
        assert!(matches!(
            engine.decode_package(&[0u8; 27]),
            Err(CryptoError::Configuration(_))
        ));
    }

    #[test]
    fn test_layout() {
        let engine = zero_key_engine();
        let session = engine.session().unwrap();
        let sealed = session.encrypt(b"layout check").unwrap();
        let blob = assemble(&sealed);

        assert_eq!(&blob[..NONCE_SIZE], &sealed.nonce);
        assert_eq!(&blob[NONCE_SIZE..blob.len() - TAG_SIZE], sealed.ciphertext.as_slice());
        assert_eq!(&blob[blob.len() - TAG_SIZE..], &sealed.tag);
    }

    #[test]
    fn test_every_bit_flip_detected() {
        let engine = zero_key_engine();
        let blob = engine.encode_package(b"tamper").unwrap();

        for byte in 0..blob.len() {
            for bit in 0..8 {
                let mut tampered = blob.clone();
                tampered[byte] ^= 1 << bit;
                let err = engine.decode_package(&tampered).unwrap_err();
                assert!(
                    err.is_authentication_failure(),
                    "flip at byte {byte} bit {bit} must fail authentication"
                );
            }
        }
    }

    proptest! {
        #[test]
        fn package_roundtrip_and_size(data in proptest::collection::vec(any::<u8>(), 0..=8192)) {
            let engine = zero_key_engine();
            let blob = engine.encode_package(&data).unwrap();
            prop_assert_eq!(blob.len(), data.len() + PACKAGE_OVERHEAD);
            let plain = engine.decode_package(&blob).unwrap();
            prop_assert_eq!(plain, data);
        }
    }
}
