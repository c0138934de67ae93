//! Base64 JSON records for sealing short UTF-8 text
//!
//! Two shapes, matching the two single-shot payload forms:
//! - [`EncryptedTextPayload`]: ciphertext, IV (nonce), and tag as separate fields
//! - [`EncryptedTextPackagePayload`]: one base64 package (`nonce || ciphertext || tag`)

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::{Deserialize, Serialize};

use crate::engine::CipherEngine;
use crate::error::{CryptoError, CryptoResult};
use crate::{NONCE_SIZE, TAG_SIZE};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EncryptedTextPayload {
    pub base64_encoded_encrypted_text: String,
    pub iv: String,
    pub tag: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EncryptedTextPackagePayload {
    pub base64_encrypted_package: String,
}

impl EncryptedTextPayload {
    pub fn seal(engine: &CipherEngine, text: &str) -> CryptoResult<Self> {
        let sealed = engine.encrypt(text.as_bytes())?;
        Ok(Self {
            base64_encoded_encrypted_text: STANDARD.encode(&sealed.ciphertext),
            iv: STANDARD.encode(sealed.nonce),
            tag: STANDARD.encode(sealed.tag),
        })
    }

    pub fn open(&self, engine: &CipherEngine) -> CryptoResult<String> {
        let ciphertext = decode_field("base64EncodedEncryptedText", &self.base64_encoded_encrypted_text)?;
        let nonce: [u8; NONCE_SIZE] = decode_array("iv", &self.iv)?;
        let tag: [u8; TAG_SIZE] = decode_array("tag", &self.tag)?;

        let plaintext = engine.decrypt(&ciphertext, &nonce, &tag)?;
        into_text(plaintext)
    }
}

impl EncryptedTextPackagePayload {
    pub fn seal(engine: &CipherEngine, text: &str) -> CryptoResult<Self> {
        let blob = engine.encode_package(text.as_bytes())?;
        Ok(Self {
            base64_encrypted_package: STANDARD.encode(blob),
        })
    }

    pub fn open(&self, engine: &CipherEngine) -> CryptoResult<String> {
        let blob = decode_field("base64EncryptedPackage", &self.base64_encrypted_package)?;
        into_text(engine.decode_package(&blob)?)
    }
}

fn decode_field(name: &str, value: &str) -> CryptoResult<Vec<u8>> {
    STANDARD
        .decode(value)
        .map_err(|e| CryptoError::MalformedPayload(format!("{name}: {e}")))
}

fn decode_array<const N: usize>(name: &str, value: &str) -> CryptoResult<[u8; N]> {
    let bytes = decode_field(name, value)?;
    let len = bytes.len();
    bytes
        .try_into()
        .map_err(|_| CryptoError::MalformedPayload(format!("{name}: expected {N} bytes, got {len}")))
}

fn into_text(plaintext: Vec<u8>) -> CryptoResult<String> {
    String::from_utf8(plaintext)
        .map_err(|_| CryptoError::MalformedPayload("decrypted bytes are not valid UTF-8".into()))
}
