//! Out-of-band nonce/tag manifest
//!
//! Split framing writes bare ciphertext with no per-chunk framing, so the
//! nonce and tag of every chunk travel here instead, in chunk order. Entries
//! carry no lengths: chunk `i` covers bytes `[i * chunk_size, (i + 1) * chunk_size)`
//! of the ciphertext, and the last entry covers whatever remains.
//!
//! Whole framing reuses the same container with a single entry and no chunk
//! size.
//!
//! Serialized as JSON with nonce and tag in standard base64.

use rdbseal_core::Framing;
use serde::{Deserialize, Serialize};

use crate::error::{CryptoError, CryptoResult};
use crate::{MAX_CHUNK_SIZE, NONCE_SIZE, TAG_SIZE};

pub const MANIFEST_VERSION: u32 = 1;

/// Nonce and tag for one chunk
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestEntry {
    /// Chunk index (0-based)
    pub index: u64,
    #[serde(with = "base64_array")]
    pub nonce: [u8; NONCE_SIZE],
    #[serde(with = "base64_array")]
    pub tag: [u8; TAG_SIZE],
}

/// Ordered, append-only list of per-chunk nonce/tag pairs
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkManifest {
    /// Manifest format version
    pub version: u32,
    /// Framing the ciphertext was produced with (split or whole)
    pub framing: Framing,
    /// Plaintext (and ciphertext) bytes per chunk; `None` for whole framing
    pub chunk_size: Option<usize>,
    entries: Vec<ManifestEntry>,
}

impl ChunkManifest {
    /// Empty manifest for split framing.
    pub fn split(chunk_size: usize) -> Self {
        Self {
            version: MANIFEST_VERSION,
            framing: Framing::Split,
            chunk_size: Some(chunk_size),
            entries: Vec::new(),
        }
    }

    /// Single-entry manifest for whole framing.
    pub fn whole(nonce: [u8; NONCE_SIZE], tag: [u8; TAG_SIZE]) -> Self {
        Self {
            version: MANIFEST_VERSION,
            framing: Framing::Whole,
            chunk_size: None,
            entries: vec![ManifestEntry { index: 0, nonce, tag }],
        }
    }

    /// Append the next chunk's nonce and tag.
    pub fn push(&mut self, nonce: [u8; NONCE_SIZE], tag: [u8; TAG_SIZE]) -> &ManifestEntry {
        let index = self.entries.len() as u64;
        self.entries.push(ManifestEntry { index, nonce, tag });
        &self.entries[self.entries.len() - 1]
    }

    pub fn entries(&self) -> &[ManifestEntry] {
        &self.entries
    }

    pub fn iter(&self) -> std::slice::Iter<'_, ManifestEntry> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Number of entries a ciphertext of `ciphertext_len` bytes requires.
    pub fn expected_entries(&self, ciphertext_len: u64) -> u64 {
        match self.chunk_size {
            Some(size) if size > 0 => ciphertext_len.div_ceil(size as u64),
            _ => 1,
        }
    }

    /// Check that this manifest can drive decryption of `ciphertext_len` bytes.
    pub fn validate_against(&self, ciphertext_len: u64) -> CryptoResult<()> {
        if self.version != MANIFEST_VERSION {
            return Err(CryptoError::MalformedManifest(format!(
                "unsupported manifest version {} (expected {MANIFEST_VERSION})",
                self.version
            )));
        }

        match (self.framing, self.chunk_size) {
            (Framing::Split, Some(size)) if size > MAX_CHUNK_SIZE => {
                return Err(CryptoError::MalformedManifest(format!(
                    "chunk size {size} exceeds the maximum of {MAX_CHUNK_SIZE}"
                )));
            }
            (Framing::Split, Some(size)) if size > 0 => {}
            (Framing::Whole, None) => {}
            (framing, size) => {
                return Err(CryptoError::MalformedManifest(format!(
                    "framing {framing} with chunk size {size:?} is not a valid manifest"
                )));
            }
        }

        if let Some(pos) = self
            .entries
            .iter()
            .enumerate()
            .position(|(i, e)| e.index != i as u64)
        {
            return Err(CryptoError::MalformedManifest(format!(
                "entry {pos} has index {} (entries must be in chunk order)",
                self.entries[pos].index
            )));
        }

        let expected = self.expected_entries(ciphertext_len);
        if self.entries.len() as u64 != expected {
            return Err(CryptoError::MalformedManifest(format!(
                "{} entries for {ciphertext_len} bytes of ciphertext (expected {expected})",
                self.entries.len()
            )));
        }
        Ok(())
    }

    /// Serialize to JSON bytes
    pub fn to_bytes(&self) -> CryptoResult<Vec<u8>> {
        Ok(serde_json::to_vec_pretty(self)?)
    }

    /// Deserialize from JSON bytes
    pub fn from_bytes(data: &[u8]) -> CryptoResult<Self> {
        Ok(serde_json::from_slice(data)?)
    }
}

impl<'a> IntoIterator for &'a ChunkManifest {
    type Item = &'a ManifestEntry;
    type IntoIter = std::slice::Iter<'a, ManifestEntry>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.iter()
    }
}

mod base64_array {
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine;
    use serde::{de, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer, const N: usize>(
        bytes: &[u8; N],
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>, const N: usize>(
        deserializer: D,
    ) -> Result<[u8; N], D::Error> {
        let encoded = String::deserialize(deserializer)?;
        let decoded = STANDARD.decode(encoded.as_bytes()).map_err(de::Error::custom)?;
        let len = decoded.len();
        decoded
            .try_into()
            .map_err(|_| de::Error::custom(format!("expected {N} bytes, got {len}")))
    }
}
